use std::collections::HashSet;
use std::sync::Arc;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::input::InputError;
use crate::model::ModelError;
use crate::model::matrix::{ExpressionMatrix, bits_eq, ensure_unique};
use crate::pipeline::PipelineError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Segment {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl Segment {
    pub fn length(&self) -> f64 {
        let dx = self.x1 - self.x0;
        let dy = self.y1 - self.y0;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x0.is_finite() && self.y0.is_finite() && self.x1.is_finite() && self.y1.is_finite()
    }

    /// Distance from `(px, py)` to the segment and the offset of the closest point along it.
    pub fn project(&self, px: f64, py: f64) -> (f64, f64) {
        let dx = self.x1 - self.x0;
        let dy = self.y1 - self.y0;
        let len2 = dx * dx + dy * dy;
        let t = if len2 > 0.0 {
            (((px - self.x0) * dx + (py - self.y0) * dy) / len2).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let cx = self.x0 + t * dx;
        let cy = self.y0 + t * dy;
        let dist = ((px - cx) * (px - cx) + (py - cy) * (py - cy)).sqrt();
        (dist, t * len2.sqrt())
    }
}

impl PartialEq for Segment {
    fn eq(&self, other: &Self) -> bool {
        self.x0.to_bits() == other.x0.to_bits()
            && self.y0.to_bits() == other.y0.to_bits()
            && self.x1.to_bits() == other.x1.to_bits()
            && self.y1.to_bits() == other.y1.to_bits()
    }
}

/// One column per trajectory branch; NaN marks cells that are not on the branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pseudotime {
    pub branches: Vec<String>,
    pub values: Array2<f64>,
}

impl Pseudotime {
    pub fn on_trajectory(&self, cell: usize) -> bool {
        self.values.row(cell).iter().any(|v| v.is_finite())
    }
}

impl PartialEq for Pseudotime {
    fn eq(&self, other: &Self) -> bool {
        self.branches == other.branches && bits_eq(&self.values, &other.values)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub cells: Vec<String>,
    pub embedding: Array2<f64>,
    pub pseudotime: Pseudotime,
    pub fit_line: Vec<Segment>,
    pub normalized: Option<ExpressionMatrix>,
}

impl Candidate {
    pub fn new(
        id: String,
        cells: Vec<String>,
        embedding: Array2<f64>,
        pseudotime: Pseudotime,
        fit_line: Vec<Segment>,
        normalized: Option<ExpressionMatrix>,
    ) -> Result<Self, ModelError> {
        let candidate = Self {
            id,
            cells,
            embedding,
            pseudotime,
            fit_line,
            normalized,
        };
        candidate.validate()?;
        Ok(candidate)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.id.trim().is_empty() {
            return Err(ModelError::Invalid("candidate id is empty".to_string()));
        }
        let n = self.cells.len();
        ensure_unique("cell", &self.cells)?;
        if self.embedding.dim() != (n, 2) {
            let (rows, cols) = self.embedding.dim();
            return Err(ModelError::shape(
                format!("candidate {} embedding", self.id),
                format!("{n}x2"),
                format!("{rows}x{cols}"),
            ));
        }
        if self.pseudotime.values.nrows() != n {
            return Err(ModelError::shape(
                format!("candidate {} pseudotime rows", self.id),
                n,
                self.pseudotime.values.nrows(),
            ));
        }
        if self.pseudotime.values.ncols() != self.pseudotime.branches.len() {
            return Err(ModelError::shape(
                format!("candidate {} pseudotime branches", self.id),
                self.pseudotime.branches.len(),
                self.pseudotime.values.ncols(),
            ));
        }
        if let Some(normalized) = &self.normalized {
            normalized.validate()?;
        }
        Ok(())
    }

    pub fn n_cells(&self) -> usize {
        self.cells.len()
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.cells == other.cells
            && bits_eq(&self.embedding, &other.embedding)
            && self.pseudotime == other.pseudotime
            && self.fit_line == other.fit_line
            && self.normalized == other.normalized
    }
}

/// A validated, non-empty set of candidates with unique ids.
#[derive(Debug, Clone)]
pub struct CandidateBatch {
    candidates: Vec<Arc<Candidate>>,
}

impl CandidateBatch {
    pub fn new(candidates: Vec<Candidate>) -> Result<Self, PipelineError> {
        if candidates.is_empty() {
            return Err(PipelineError::InputMissing(
                "candidate batch is empty".to_string(),
            ));
        }
        let mut seen = HashSet::with_capacity(candidates.len());
        for candidate in &candidates {
            if !seen.insert(candidate.id.as_str()) {
                return Err(PipelineError::DuplicateCandidateId(candidate.id.clone()));
            }
        }
        // hand-built candidates bypass Candidate::new
        for candidate in &candidates {
            candidate.validate().map_err(|source| InputError::Model {
                context: format!("candidate {}", candidate.id),
                source,
            })?;
        }
        Ok(Self {
            candidates: candidates.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn as_slice(&self) -> &[Arc<Candidate>] {
        &self.candidates
    }
}
