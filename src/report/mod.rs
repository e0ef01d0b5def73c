use serde::Serialize;

use crate::model::ranking::RankedResult;
use crate::model::structure::Explanation;

pub mod json;
pub mod text;

#[derive(Debug, Clone, Serialize)]
pub struct DatasetSummary {
    pub n_genes: usize,
    pub n_cells: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterSize {
    pub cluster: u32,
    pub n_cells: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StructureSummary {
    pub source: String,
    pub if_connected: bool,
    pub k: usize,
    pub cluster_sizes: Vec<ClusterSize>,
    pub signal_pct: f64,
    pub signal_threshold: f64,
    pub signal_ok: bool,
    pub proceed: bool,
    pub observed_eigenvalue: Option<f64>,
    pub null_mean_eigenvalue: Option<f64>,
    pub simulations: Option<usize>,
    pub fingerprint: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankingSummary {
    pub viable: bool,
    pub n_candidates: usize,
    pub n_ranked: usize,
    pub recommended: Vec<String>,
    pub rows: Vec<RankedResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryData {
    pub tool: String,
    pub version: String,
    pub policy: String,
    pub state: String,
    pub message: Option<String>,
    pub dataset: Option<DatasetSummary>,
    pub structure: Option<StructureSummary>,
    pub explanation: Option<Explanation>,
    pub ranking: Option<RankingSummary>,
}

pub fn format_metric(v: Option<f64>) -> String {
    match v {
        Some(v) if v.is_finite() => format!("{:.6}", v),
        _ => "NA".to_string(),
    }
}

pub fn format_flag(v: Option<bool>) -> &'static str {
    match v {
        Some(true) => "TRUE",
        Some(false) => "FALSE",
        None => "NA",
    }
}

pub fn format_rank(rank: Option<usize>) -> String {
    rank.map_or_else(|| "NA".to_string(), |r| r.to_string())
}

#[cfg(test)]
#[path = "../../tests/src_inline/report/mod.rs"]
mod tests;
