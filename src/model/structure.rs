use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::model::ModelError;

/// High-dimensional structure of the primary dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureCheckResult {
    pub if_connected: bool,
    pub clusters: Vec<u32>,
    pub k: usize,
    pub signal_pct: f64,
    pub cells: Vec<String>,
    pub dataset_fingerprint: u64,
}

impl StructureCheckResult {
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.clusters.len() != self.cells.len() {
            return Err(ModelError::shape(
                "structure check clusters",
                self.cells.len(),
                self.clusters.len(),
            ));
        }
        let distinct = self.clusters.iter().copied().collect::<BTreeSet<_>>();
        if !self.clusters.is_empty() && distinct.len() != self.k {
            return Err(ModelError::shape(
                "structure check cluster count",
                self.k,
                distinct.len(),
            ));
        }
        if distinct.iter().any(|&c| c == 0 || c as usize > self.k) {
            return Err(ModelError::Invalid(format!(
                "cluster ids must lie in 1..={}",
                self.k
            )));
        }
        if self.if_connected != (self.k <= 1) {
            return Err(ModelError::Invalid(format!(
                "ifConnected={} contradicts k={}",
                self.if_connected, self.k
            )));
        }
        if !(0.0..=1.0).contains(&self.signal_pct) {
            return Err(ModelError::Invalid(format!(
                "signalPct {} outside [0, 1]",
                self.signal_pct
            )));
        }
        Ok(())
    }

    pub fn cluster_sizes(&self) -> Vec<(u32, usize)> {
        let mut sizes = vec![0usize; self.k];
        for &c in &self.clusters {
            sizes[(c - 1) as usize] += 1;
        }
        sizes
            .into_iter()
            .enumerate()
            .map(|(idx, n)| (idx as u32 + 1, n))
            .collect()
    }
}

impl PartialEq for StructureCheckResult {
    fn eq(&self, other: &Self) -> bool {
        self.if_connected == other.if_connected
            && self.clusters == other.clusters
            && self.k == other.k
            && self.signal_pct.to_bits() == other.signal_pct.to_bits()
            && self.cells == other.cells
            && self.dataset_fingerprint == other.dataset_fingerprint
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProceedGate {
    pub signal_pct: f64,
    pub threshold: f64,
    pub if_connected: bool,
    pub signal_ok: bool,
    pub proceed: bool,
}

impl ProceedGate {
    pub fn evaluate(result: &StructureCheckResult, threshold: f64) -> Self {
        Self::from_parts(result.signal_pct, result.if_connected, threshold)
    }

    pub fn from_parts(signal_pct: f64, if_connected: bool, threshold: f64) -> Self {
        let signal_ok = signal_pct >= threshold;
        Self {
            signal_pct,
            threshold,
            if_connected,
            signal_ok,
            proceed: signal_ok && if_connected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerGene {
    pub gene: String,
    pub t_stat: f64,
    pub mean_in: f64,
    pub mean_out: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterMarkers {
    pub cluster: u32,
    pub n_cells: usize,
    pub genes: Vec<MarkerGene>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneVariance {
    pub gene: String,
    pub mean: f64,
    pub variance: f64,
}

/// Why the dataset did not pass the structure gate.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Explanation {
    pub markers: Option<Vec<ClusterMarkers>>,
    pub variable_genes: Option<Vec<GeneVariance>>,
}

impl Explanation {
    pub fn is_empty(&self) -> bool {
        self.markers.is_none() && self.variable_genes.is_none()
    }
}
