use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod blob;
pub mod candidate;
pub mod hash;
pub mod table;

use crate::model::ModelError;
use crate::model::candidate::Candidate;
use crate::model::matrix::ExpressionMatrix;
use crate::model::structure::StructureCheckResult;
use blob::{BLOB_EXTENSION, read_blob};
use candidate::load_candidate_dir;
use table::read_table;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("missing input: {0}")]
    MissingInput(String),
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("parse error in {file} line {line}: {msg}")]
    Parse {
        file: String,
        line: usize,
        msg: String,
    },
    #[error("invalid blob: {0}")]
    Blob(String),
    #[error("{context}: {source}")]
    Model {
        context: String,
        #[source]
        source: ModelError,
    },
}

impl InputError {
    pub fn model(path: &Path, source: ModelError) -> Self {
        InputError::Model {
            context: path.display().to_string(),
            source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Table { delimiter: char, gzip: bool },
    Blob,
}

pub fn detect_format(path: &Path) -> Result<FileFormat, InputError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    let (stem, gzip) = match name.strip_suffix(".gz") {
        Some(stem) => (stem, true),
        None => (name.as_str(), false),
    };
    let ext = stem.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
    match (ext, gzip) {
        ("tsv" | "txt", _) => Ok(FileFormat::Table {
            delimiter: '\t',
            gzip,
        }),
        ("csv", _) => Ok(FileFormat::Table {
            delimiter: ',',
            gzip,
        }),
        (BLOB_EXTENSION, false) => Ok(FileFormat::Blob),
        _ => Err(InputError::UnsupportedFormat(format!(
            "{}: expected .tsv, .txt or .csv (optionally .gz), or .{BLOB_EXTENSION}",
            path.display()
        ))),
    }
}

fn ensure_exists(path: &Path) -> Result<(), InputError> {
    if path.exists() {
        Ok(())
    } else {
        Err(InputError::MissingInput(format!(
            "{} does not exist",
            path.display()
        )))
    }
}

/// Loads a genes x cells matrix from a delimited table or an expression blob.
pub fn load_expression(path: &Path) -> Result<ExpressionMatrix, InputError> {
    ensure_exists(path)?;
    let matrix = match detect_format(path)? {
        FileFormat::Blob => read_blob::<ExpressionMatrix>(path)?,
        FileFormat::Table { .. } => {
            let table = read_table(path)?;
            ExpressionMatrix::new(table.row_names, table.col_names, table.values)
                .map_err(|source| InputError::model(path, source))?
        }
    };
    tracing::info!(
        "loaded expression matrix {}: {} genes x {} cells",
        path.display(),
        matrix.n_genes(),
        matrix.n_cells()
    );
    Ok(matrix)
}

/// Loads one candidate from a bundle directory or a candidate blob.
pub fn load_candidate(path: &Path) -> Result<Candidate, InputError> {
    ensure_exists(path)?;
    if path.is_dir() {
        return load_candidate_dir(path);
    }
    match detect_format(path)? {
        FileFormat::Blob => read_blob::<Candidate>(path),
        FileFormat::Table { .. } => Err(InputError::UnsupportedFormat(format!(
            "{}: a candidate is a bundle directory or a .{BLOB_EXTENSION} blob",
            path.display()
        ))),
    }
}

pub fn load_candidates(paths: &[PathBuf]) -> Result<Vec<Candidate>, InputError> {
    let mut out = Vec::with_capacity(paths.len());
    for path in paths {
        let candidate = load_candidate(path)?;
        tracing::info!(
            "loaded candidate {} from {}: {} cells, {} branches, {} fit segments",
            candidate.id,
            path.display(),
            candidate.n_cells(),
            candidate.pseudotime.branches.len(),
            candidate.fit_line.len()
        );
        out.push(candidate);
    }
    Ok(out)
}

pub fn load_structure(path: &Path) -> Result<StructureCheckResult, InputError> {
    ensure_exists(path)?;
    match detect_format(path)? {
        FileFormat::Blob => read_blob::<StructureCheckResult>(path),
        FileFormat::Table { .. } => Err(InputError::UnsupportedFormat(format!(
            "{}: a stored structure check is a .{BLOB_EXTENSION} blob",
            path.display()
        ))),
    }
}

#[cfg(test)]
#[path = "../../tests/src_inline/input/tests.rs"]
mod tests;
