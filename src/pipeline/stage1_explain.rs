use rayon::prelude::*;

use crate::model::matrix::ExpressionMatrix;
use crate::model::structure::{
    ClusterMarkers, Explanation, GeneVariance, MarkerGene, ProceedGate, StructureCheckResult,
};
use crate::model::thresholds::PolicyProfile;
use crate::numeric::gene_stats;

pub fn explain(
    normalized: &ExpressionMatrix,
    result: &StructureCheckResult,
    gate: &ProceedGate,
    policy: &PolicyProfile,
) -> Explanation {
    let markers = (!result.if_connected)
        .then(|| cluster_markers(normalized, &result.clusters, result.k, policy.marker_genes));
    let variable_genes = (!gate.signal_ok).then(|| variable_genes(normalized, policy.marker_genes));
    Explanation {
        markers,
        variable_genes,
    }
}

/// Per cluster, genes ranked by Welch t statistic of cluster vs rest; only positive t kept.
pub fn cluster_markers(
    normalized: &ExpressionMatrix,
    clusters: &[u32],
    k: usize,
    top_n: usize,
) -> Vec<ClusterMarkers> {
    (1..=k as u32)
        .into_par_iter()
        .map(|cluster| {
            let (inside, outside): (Vec<usize>, Vec<usize>) =
                (0..clusters.len()).partition(|&c| clusters[c] == cluster);
            let mut genes = (0..normalized.n_genes())
                .filter_map(|g| {
                    let row = normalized.values.row(g);
                    let (mean_in, var_in) = mean_var(inside.iter().map(|&c| row[c]))?;
                    let (mean_out, var_out) = mean_var(outside.iter().map(|&c| row[c]))?;
                    let se = (var_in / inside.len() as f64 + var_out / outside.len() as f64).sqrt();
                    if se.is_nan() || se <= 0.0 {
                        return None;
                    }
                    let t_stat = (mean_in - mean_out) / se;
                    (t_stat > 0.0).then(|| MarkerGene {
                        gene: normalized.genes[g].clone(),
                        t_stat,
                        mean_in,
                        mean_out,
                    })
                })
                .collect::<Vec<_>>();
            genes.sort_by(|a, b| b.t_stat.total_cmp(&a.t_stat).then_with(|| a.gene.cmp(&b.gene)));
            genes.truncate(top_n);
            ClusterMarkers {
                cluster,
                n_cells: inside.len(),
                genes,
            }
        })
        .collect()
}

pub fn variable_genes(normalized: &ExpressionMatrix, top_n: usize) -> Vec<GeneVariance> {
    let cells = (0..normalized.n_cells()).collect::<Vec<_>>();
    let stats = gene_stats(normalized.values.view(), &cells);
    let mut order = (0..normalized.n_genes()).collect::<Vec<_>>();
    order.sort_by(|&a, &b| {
        stats.variance[b]
            .total_cmp(&stats.variance[a])
            .then(a.cmp(&b))
    });
    order
        .into_iter()
        .take(top_n)
        .map(|g| GeneVariance {
            gene: normalized.genes[g].clone(),
            mean: stats.mean[g],
            variance: stats.variance[g],
        })
        .collect()
}

// sample mean and variance, NaN read as zero
fn mean_var(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    let values = values
        .map(|v| if v.is_finite() { v } else { 0.0 })
        .collect::<Vec<_>>();
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / (n - 1.0);
    Some((mean, var))
}

#[cfg(test)]
#[path = "../../tests/src_inline/pipeline/stage1_explain.rs"]
mod tests;
