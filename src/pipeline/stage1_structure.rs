use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::input::hash::Fnv64;
use crate::model::clip01;
use crate::model::matrix::{ExpressionMatrix, MatrixPair};
use crate::model::structure::{Explanation, ProceedGate, StructureCheckResult};
use crate::model::thresholds::PolicyProfile;
use crate::numeric::graph::{euclidean_mst, split_mst};
use crate::numeric::spectral::{permute_columns, top_covariance_eigenvalue};
use crate::numeric::{Points, gene_stats, top_variable_genes};
use crate::pipeline::PipelineError;
use crate::pipeline::stage0_input::ensure_paired;
use crate::pipeline::stage1_explain::explain;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighDimDisconnection {
    pub if_connected: bool,
    pub clusters: Vec<u32>,
    pub k: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Homogeneity {
    pub signal_pct: f64,
    pub observed: f64,
    pub null_mean: f64,
    pub simulations: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage1Source {
    Computed,
    Loaded,
}

impl Stage1Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage1Source::Computed => "computed",
            Stage1Source::Loaded => "loaded",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Stage1Output {
    pub result: Arc<StructureCheckResult>,
    pub gate: ProceedGate,
    pub source: Stage1Source,
    pub homogeneity: Option<Homogeneity>,
    pub explanation: Explanation,
}

pub fn check_high_dim_disconnection(
    raw: &ExpressionMatrix,
    normalized: &ExpressionMatrix,
    max_clusters: usize,
    policy: &PolicyProfile,
) -> Result<HighDimDisconnection, PipelineError> {
    ensure_paired(raw, normalized)?;
    let points = hvg_points(normalized, policy.hvg_genes);
    Ok(disconnection(&points, max_clusters, policy))
}

pub fn check_homogeneity(
    normalized: &ExpressionMatrix,
    num_simulations: usize,
    seed: u64,
    policy: &PolicyProfile,
) -> Homogeneity {
    let points = hvg_points(normalized, policy.hvg_genes);
    homogeneity(&points, num_simulations, seed, policy.power_iterations)
}

/// Computes the structure check of a paired dataset from scratch.
pub fn run_stage1(pair: &MatrixPair, policy: &PolicyProfile) -> Result<Stage1Output, PipelineError> {
    tracing::debug!(
        "stage1: {} cells, {} genes, up to {} highly variable genes",
        pair.normalized.n_cells(),
        pair.normalized.n_genes(),
        policy.hvg_genes
    );

    let (split, homog) = rayon::join(
        || check_high_dim_disconnection(&pair.raw, &pair.normalized, policy.max_clusters, policy),
        || check_homogeneity(&pair.normalized, policy.num_simulations, policy.seed, policy),
    );
    let split = split?;

    let result = StructureCheckResult {
        if_connected: split.if_connected,
        clusters: split.clusters,
        k: split.k,
        signal_pct: homog.signal_pct,
        cells: pair.normalized.cells.clone(),
        dataset_fingerprint: dataset_fingerprint(pair),
    };
    let gate = ProceedGate::evaluate(&result, policy.signal_threshold);
    let explanation = explain(&pair.normalized, &result, &gate, policy);

    tracing::info!(
        "stage1: k={} connected={} signal_pct={:.3} (observed {:.4}, null mean {:.4}) proceed={}",
        result.k,
        result.if_connected,
        result.signal_pct,
        homog.observed,
        homog.null_mean,
        gate.proceed
    );

    Ok(Stage1Output {
        result: Arc::new(result),
        gate,
        source: Stage1Source::Computed,
        homogeneity: Some(homog),
        explanation,
    })
}

/// Wraps a previously stored result. The explanation is only rebuilt when the
/// stored cells line up with the given matrix.
pub fn stage1_from_loaded(
    result: Arc<StructureCheckResult>,
    normalized: Option<&ExpressionMatrix>,
    policy: &PolicyProfile,
) -> Stage1Output {
    let gate = ProceedGate::evaluate(&result, policy.signal_threshold);
    let explanation = match normalized {
        Some(normalized) if normalized.cells == result.cells => {
            explain(normalized, &result, &gate, policy)
        }
        _ => Explanation::default(),
    };
    tracing::info!(
        "stage1: reusing stored result k={} signal_pct={:.3} proceed={}",
        result.k,
        result.signal_pct,
        gate.proceed
    );
    Stage1Output {
        result,
        gate,
        source: Stage1Source::Loaded,
        homogeneity: None,
        explanation,
    }
}

pub fn dataset_fingerprint(pair: &MatrixPair) -> u64 {
    let mut hasher = Fnv64::new();
    for matrix in [&pair.raw, &pair.normalized] {
        let (genes, cells) = matrix.dims();
        hasher.update_u64(genes as u64);
        hasher.update_u64(cells as u64);
        for name in matrix.genes.iter().chain(&matrix.cells) {
            hasher.update_str(name);
        }
        for v in matrix.values.iter() {
            hasher.update_u64(v.to_bits());
        }
    }
    hasher.finish()
}

fn hvg_points(normalized: &ExpressionMatrix, hvg_genes: usize) -> Points {
    let cells = (0..normalized.n_cells()).collect::<Vec<_>>();
    let stats = gene_stats(normalized.values.view(), &cells);
    let genes = top_variable_genes(&stats, hvg_genes);
    Points::from_expression(normalized.values.view(), &genes, &cells)
}

fn disconnection(points: &Points, max_clusters: usize, policy: &PolicyProfile) -> HighDimDisconnection {
    let edges = euclidean_mst(points);
    let partition = split_mst(
        points.len(),
        &edges,
        policy.gap_factor,
        policy.min_cluster_cells,
        max_clusters,
    );
    HighDimDisconnection {
        if_connected: partition.k <= 1,
        clusters: partition.labels,
        k: partition.k,
    }
}

fn homogeneity(points: &Points, num_simulations: usize, seed: u64, iterations: usize) -> Homogeneity {
    let observed = top_covariance_eigenvalue(points, iterations);
    let nulls = (0..num_simulations)
        .into_par_iter()
        .map(|i| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(i as u64));
            let permuted = permute_columns(points, &mut rng);
            top_covariance_eigenvalue(&permuted, iterations)
        })
        .collect::<Vec<_>>();
    let null_mean = if nulls.is_empty() {
        0.0
    } else {
        nulls.iter().sum::<f64>() / nulls.len() as f64
    };

    let signal_pct = if observed > 0.0 && !nulls.is_empty() {
        clip01(1.0 - null_mean / observed)
    } else {
        0.0
    };
    Homogeneity {
        signal_pct,
        observed,
        null_mean,
        simulations: nulls.len(),
    }
}

#[cfg(test)]
#[path = "../../tests/src_inline/pipeline/stage1_structure.rs"]
mod tests;
