use std::sync::Arc;

use crate::model::matrix::{ExpressionMatrix, MatrixPair};
use crate::pipeline::PipelineError;

/// G0: both matrices present, same dimensions, same cell order.
pub fn pair_matrices(
    raw: Option<&Arc<ExpressionMatrix>>,
    normalized: Option<&Arc<ExpressionMatrix>>,
) -> Result<MatrixPair, PipelineError> {
    let (raw, normalized) = match (raw, normalized) {
        (Some(raw), Some(normalized)) => (raw, normalized),
        (None, None) => {
            return Err(PipelineError::InputMissing(
                "raw and normalized matrices not loaded".to_string(),
            ));
        }
        (None, Some(_)) => {
            return Err(PipelineError::InputMissing(
                "raw matrix not loaded".to_string(),
            ));
        }
        (Some(_), None) => {
            return Err(PipelineError::InputMissing(
                "normalized matrix not loaded".to_string(),
            ));
        }
    };
    ensure_paired(raw, normalized)?;
    Ok(MatrixPair {
        raw: Arc::clone(raw),
        normalized: Arc::clone(normalized),
    })
}

pub fn ensure_paired(raw: &ExpressionMatrix, normalized: &ExpressionMatrix) -> Result<(), PipelineError> {
    let mismatch = |detail: String| {
        let (raw_genes, raw_cells) = raw.dims();
        let (norm_genes, norm_cells) = normalized.dims();
        PipelineError::DatasetMismatch {
            raw_genes,
            raw_cells,
            norm_genes,
            norm_cells,
            detail,
        }
    };

    if raw.dims() != normalized.dims() {
        return Err(mismatch("dimensions differ".to_string()));
    }
    if let Some(idx) = raw
        .cells
        .iter()
        .zip(&normalized.cells)
        .position(|(a, b)| a != b)
    {
        return Err(mismatch(format!(
            "cell order differs at column {idx} ({} vs {})",
            raw.cells[idx], normalized.cells[idx]
        )));
    }
    if raw.n_cells() == 0 || raw.n_genes() == 0 {
        return Err(PipelineError::InputMissing(
            "dataset has no cells or no genes".to_string(),
        ));
    }
    if raw.genes != normalized.genes {
        tracing::debug!("raw and normalized gene names differ; pairing by position");
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/src_inline/pipeline/stage0_input.rs"]
mod tests;
