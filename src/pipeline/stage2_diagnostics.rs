use std::collections::HashMap;

use ndarray::Array2;
use rayon::ThreadPool;
use rayon::prelude::*;

use crate::model::candidate::{Candidate, CandidateBatch, Segment};
use crate::model::diagnostics::DiagnosticRow;
use crate::model::matrix::ExpressionMatrix;
use crate::model::structure::StructureCheckResult;
use crate::model::thresholds::PolicyProfile;
use crate::numeric::graph::{euclidean_mst, split_mst};
use crate::numeric::neighbors::knn;
use crate::numeric::{Points, gene_stats, top_variable_genes};
use crate::pipeline::{CheckError, PipelineError};

/// Shared, read-only inputs of every per-candidate check.
#[derive(Debug, Clone, Copy)]
pub struct DiagnosticContext<'a> {
    pub structure: &'a StructureCheckResult,
    pub normalized: Option<&'a ExpressionMatrix>,
    pub policy: &'a PolicyProfile,
}

pub fn build_worker_pool(
    reserve_threads: usize,
    threads: Option<usize>,
) -> Result<ThreadPool, PipelineError> {
    let available = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let size = threads
        .unwrap_or_else(|| available.saturating_sub(reserve_threads))
        .max(1);
    tracing::debug!("worker pool: {} threads ({} available)", size, available);
    rayon::ThreadPoolBuilder::new()
        .num_threads(size)
        .thread_name(|i| format!("trajqc-worker-{i}"))
        .build()
        .map_err(|e| PipelineError::WorkerPool(e.to_string()))
}

pub fn run_stage2(
    batch: &CandidateBatch,
    ctx: &DiagnosticContext<'_>,
    pool: &ThreadPool,
) -> Vec<DiagnosticRow> {
    tracing::info!(
        "stage2: {} candidates on {} threads",
        batch.len(),
        pool.current_num_threads()
    );
    let mut rows = pool.install(|| {
        batch
            .as_slice()
            .par_iter()
            .map(|candidate| evaluate_candidate(candidate, ctx))
            .collect::<Vec<_>>()
    });
    rows.sort_by(|a, b| a.id.cmp(&b.id));
    rows
}

pub fn evaluate_candidate(candidate: &Candidate, ctx: &DiagnosticContext<'_>) -> DiagnosticRow {
    let policy = ctx.policy;
    let normalized = candidate.normalized.as_ref().or(ctx.normalized);

    let ((dc, simi), (gof, ushape)) = rayon::join(
        || {
            rayon::join(
                || {
                    check_low_dim_disconnection(
                        &candidate.embedding,
                        policy.min_connected_cells,
                        policy.lowdim_gap_factor,
                    )
                },
                || match normalized {
                    Some(normalized) => {
                        check_similarity_retention(normalized, candidate, ctx.structure, policy)
                    }
                    None => Err(CheckError::InputMissing(
                        "no normalized matrix for this candidate or dataset".to_string(),
                    )),
                },
            )
        },
        || {
            rayon::join(
                || check_goodness_of_fit(&candidate.embedding, policy.gof_cells_per_bin),
                || {
                    detect_ambiguous_region(
                        candidate,
                        policy.fold_arc_fraction,
                        policy.fold_tolerance,
                    )
                },
            )
        },
    );

    let mut notes = Vec::new();
    let row = DiagnosticRow {
        id: candidate.id.clone(),
        dc_check: record(&candidate.id, "dcCheck", dc, &mut notes),
        simi_retain: record(&candidate.id, "simiRetain", simi, &mut notes),
        gof: record(&candidate.id, "gof", gof, &mut notes),
        ushape: record(&candidate.id, "ushape", ushape, &mut notes),
        notes,
    };
    tracing::debug!(
        "candidate {}: dcCheck={:?} simiRetain={:?} gof={:?} ushape={:?}",
        row.id,
        row.dc_check,
        row.simi_retain,
        row.gof,
        row.ushape
    );
    row
}

fn record<T>(
    id: &str,
    check: &str,
    outcome: Result<T, CheckError>,
    notes: &mut Vec<String>,
) -> Option<T> {
    match outcome {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!("candidate {}: {} undefined: {}", id, check, err);
            notes.push(format!("{check}: {err}"));
            None
        }
    }
}

/// True when the embedding forms a single connected group.
pub fn check_low_dim_disconnection(
    embedding: &Array2<f64>,
    min_connected_cells: usize,
    gap_factor: f64,
) -> Result<bool, CheckError> {
    let rows = finite_rows(embedding);
    if rows.len() < 2 {
        return Err(CheckError::Degenerate(format!(
            "{} cells with finite coordinates, need 2",
            rows.len()
        )));
    }
    let points = Points::from_rows(embedding, &rows);
    let edges = euclidean_mst(&points);
    // one accepted cut is enough to answer
    let partition = split_mst(points.len(), &edges, gap_factor, min_connected_cells, 2);
    Ok(partition.k == 1)
}

/// Share of cells whose embedding neighbourhood keeps their high-dimensional
/// neighbours from the same cluster.
pub fn check_similarity_retention(
    normalized: &ExpressionMatrix,
    candidate: &Candidate,
    high_dim: &StructureCheckResult,
    policy: &PolicyProfile,
) -> Result<f64, CheckError> {
    let columns = name_index(&normalized.cells);
    let labels = high_dim
        .cells
        .iter()
        .zip(&high_dim.clusters)
        .map(|(cell, &label)| (cell.as_str(), label))
        .collect::<HashMap<_, _>>();

    let mut emb_rows = Vec::new();
    let mut norm_cols = Vec::new();
    let mut cell_labels = Vec::new();
    for row in finite_rows(&candidate.embedding) {
        let cell = candidate.cells[row].as_str();
        if let (Some(&col), Some(&label)) = (columns.get(cell), labels.get(cell)) {
            emb_rows.push(row);
            norm_cols.push(col);
            cell_labels.push(label);
        }
    }
    let m = emb_rows.len();
    if m < 3 {
        return Err(CheckError::Degenerate(format!(
            "{m} cells shared between embedding, normalized matrix and clusters"
        )));
    }

    let stats = gene_stats(normalized.values.view(), &norm_cols);
    let genes = top_variable_genes(&stats, policy.hvg_genes);
    if genes.is_empty() {
        return Err(CheckError::Degenerate(
            "no variable gene across shared cells".to_string(),
        ));
    }
    let high = Points::from_expression(normalized.values.view(), &genes, &norm_cols);
    let low = Points::from_rows(&candidate.embedding, &emb_rows);
    let k = policy.retain_neighbors.min(m - 1);

    let (high_nn, low_nn) = rayon::join(|| knn(&high, k), || knn(&low, k));

    let retained = (0..m)
        .filter(|&i| {
            let mut high_set = high_nn[i].clone();
            high_set.sort_unstable();
            let agree = low_nn[i]
                .iter()
                .filter(|&&j| cell_labels[j] == cell_labels[i] && high_set.binary_search(&j).is_ok())
                .count();
            agree as f64 / k as f64 >= policy.retain_min_overlap
        })
        .count();
    Ok(retained as f64 / m as f64)
}

/// Occupied fraction of a g x g grid over the embedding's bounding box.
pub fn check_goodness_of_fit(embedding: &Array2<f64>, cells_per_bin: f64) -> Result<f64, CheckError> {
    let rows = finite_rows(embedding);
    let n = rows.len();
    if n < 2 {
        return Err(CheckError::Degenerate(format!(
            "{n} cells with finite coordinates, need 2"
        )));
    }
    let bbox = BoundingBox::of_rows(embedding, &rows);
    let (x_range, y_range) = (bbox.x_max - bbox.x_min, bbox.y_max - bbox.y_min);
    if x_range <= 0.0 || y_range <= 0.0 {
        return Err(CheckError::Degenerate(
            "embedding has zero extent along an axis".to_string(),
        ));
    }

    // never more bins per axis than sqrt(n), whatever the bin density asks for
    let max_g = ((n as f64).sqrt().ceil() as usize).max(2);
    let g = (n as f64 / cells_per_bin).sqrt().round().max(2.0).min(max_g as f64) as usize;
    let mut occupied = vec![false; g * g];
    let bin = |v: f64, lo: f64, range: f64| (((v - lo) / range * g as f64).floor() as usize).min(g - 1);
    for &r in &rows {
        let bx = bin(embedding[[r, 0]], bbox.x_min, x_range);
        let by = bin(embedding[[r, 1]], bbox.y_min, y_range);
        occupied[by * g + bx] = true;
    }
    let filled = occupied.iter().filter(|&&o| o).count();
    Ok(filled as f64 / (g * g) as f64)
}

/// Fraction of on-trajectory cells lying where the fitted curve folds back on itself.
pub fn detect_ambiguous_region(
    candidate: &Candidate,
    fold_arc_fraction: f64,
    fold_tolerance: f64,
) -> Result<f64, CheckError> {
    if candidate.pseudotime.branches.is_empty() {
        return Err(CheckError::Degenerate("no pseudotime branch".to_string()));
    }
    let curves = FitCurves::build(&candidate.fit_line);
    if curves.segments.is_empty() {
        return Err(CheckError::Degenerate(
            "fit line has no finite segment of positive length".to_string(),
        ));
    }
    let embedding = &candidate.embedding;
    let cells = finite_rows(embedding)
        .into_iter()
        .filter(|&r| candidate.pseudotime.on_trajectory(r))
        .collect::<Vec<_>>();
    if cells.is_empty() {
        return Err(CheckError::Degenerate(
            "no cell lies on a trajectory branch".to_string(),
        ));
    }
    let diagonal = BoundingBox::of_rows(embedding, &cells).diagonal();
    if diagonal <= 0.0 {
        return Err(CheckError::Degenerate(
            "on-trajectory cells have zero extent".to_string(),
        ));
    }
    let tolerance = fold_tolerance * diagonal;

    let ambiguous = cells
        .par_iter()
        .filter(|&&r| curves.is_ambiguous(embedding[[r, 0]], embedding[[r, 1]], fold_arc_fraction, tolerance))
        .count();
    Ok(ambiguous as f64 / cells.len() as f64)
}

/// Fit segments grouped into continuous curves, with arc length offsets.
struct FitCurves {
    segments: Vec<Segment>,
    curve: Vec<usize>,
    arc_start: Vec<f64>,
    length: Vec<f64>,
}

impl FitCurves {
    fn build(fit_line: &[Segment]) -> Self {
        let segments = fit_line
            .iter()
            .copied()
            .filter(|s| s.is_finite() && s.length() > 0.0)
            .collect::<Vec<_>>();
        let scale = segments
            .iter()
            .flat_map(|s| [s.x0, s.y0, s.x1, s.y1])
            .fold(1.0f64, |m, v| m.max(v.abs()));
        let eps = 1e-9 * scale;

        let mut curve = Vec::with_capacity(segments.len());
        let mut arc_start = Vec::with_capacity(segments.len());
        let mut length: Vec<f64> = Vec::new();
        for (i, seg) in segments.iter().enumerate() {
            let joined = i > 0 && {
                let prev = &segments[i - 1];
                (prev.x1 - seg.x0).abs() <= eps && (prev.y1 - seg.y0).abs() <= eps
            };
            if !joined {
                length.push(0.0);
            }
            let c = length.len() - 1;
            curve.push(c);
            arc_start.push(length[c]);
            length[c] += seg.length();
        }
        Self {
            segments,
            curve,
            arc_start,
            length,
        }
    }

    fn is_ambiguous(&self, x: f64, y: f64, fold_arc_fraction: f64, tolerance: f64) -> bool {
        let projections = self
            .segments
            .iter()
            .zip(&self.arc_start)
            .map(|(seg, &start)| {
                let (dist, offset) = seg.project(x, y);
                (dist, start + offset)
            })
            .collect::<Vec<_>>();
        let Some((best, &(d_best, s_best))) = projections
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.0.total_cmp(&b.1.0))
        else {
            return false;
        };
        let c = self.curve[best];
        let min_separation = fold_arc_fraction * self.length[c];
        projections.iter().enumerate().any(|(j, &(d, s))| {
            j != best
                && self.curve[j] == c
                && (s - s_best).abs() >= min_separation
                && d <= d_best + tolerance
        })
    }
}

struct BoundingBox {
    x_min: f64,
    x_max: f64,
    y_min: f64,
    y_max: f64,
}

impl BoundingBox {
    fn of_rows(embedding: &Array2<f64>, rows: &[usize]) -> Self {
        let mut bbox = BoundingBox {
            x_min: f64::INFINITY,
            x_max: f64::NEG_INFINITY,
            y_min: f64::INFINITY,
            y_max: f64::NEG_INFINITY,
        };
        for &r in rows {
            let (x, y) = (embedding[[r, 0]], embedding[[r, 1]]);
            bbox.x_min = bbox.x_min.min(x);
            bbox.x_max = bbox.x_max.max(x);
            bbox.y_min = bbox.y_min.min(y);
            bbox.y_max = bbox.y_max.max(y);
        }
        bbox
    }

    fn diagonal(&self) -> f64 {
        let dx = self.x_max - self.x_min;
        let dy = self.y_max - self.y_min;
        (dx * dx + dy * dy).sqrt()
    }
}

fn finite_rows(embedding: &Array2<f64>) -> Vec<usize> {
    (0..embedding.nrows())
        .filter(|&r| embedding[[r, 0]].is_finite() && embedding[[r, 1]].is_finite())
        .collect()
}

fn name_index(names: &[String]) -> HashMap<&str, usize> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect()
}

#[cfg(test)]
#[path = "../../tests/src_inline/pipeline/stage2_diagnostics.rs"]
mod tests;
