use thiserror::Error;

use crate::input::InputError;
use crate::model::thresholds::PolicyError;

pub mod controller;
pub mod stage0_input;
pub mod stage1_explain;
pub mod stage1_structure;
pub mod stage2_diagnostics;
pub mod stage3_rank;
pub mod stage4_report;

#[cfg(test)]
#[path = "../../tests/src_inline/pipeline/fixtures.rs"]
pub(crate) mod fixtures;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("input missing: {0}")]
    InputMissing(String),
    #[error(
        "dataset mismatch: {detail} (raw {raw_genes}x{raw_cells}, normalized {norm_genes}x{norm_cells})"
    )]
    DatasetMismatch {
        raw_genes: usize,
        raw_cells: usize,
        norm_genes: usize,
        norm_cells: usize,
        detail: String,
    },
    #[error("duplicate candidate id in batch: {0}")]
    DuplicateCandidateId(String),
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("policy: {0}")]
    Policy(#[from] PolicyError),
    #[error("worker pool: {0}")]
    WorkerPool(String),
}

/// Failure of one diagnostic check on one candidate; recorded as a note, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckError {
    #[error("degenerate candidate: {0}")]
    Degenerate(String),
    #[error("input missing: {0}")]
    InputMissing(String),
}
