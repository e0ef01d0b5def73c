use thiserror::Error;

pub mod candidate;
pub mod diagnostics;
pub mod matrix;
pub mod ranking;
pub mod structure;
pub mod thresholds;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("{what}: expected {expected}, found {found}")]
    Shape {
        what: String,
        expected: String,
        found: String,
    },
    #[error("duplicate {kind} name: {name}")]
    DuplicateName { kind: &'static str, name: String },
    #[error("{0}")]
    Invalid(String),
}

impl ModelError {
    pub fn shape(what: impl Into<String>, expected: impl ToString, found: impl ToString) -> Self {
        ModelError::Shape {
            what: what.into(),
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }
}

pub fn clip01(x: f64) -> f64 {
    if x < 0.0 {
        0.0
    } else if x > 1.0 {
        1.0
    } else {
        x
    }
}
