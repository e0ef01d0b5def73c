use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("IO error reading policy: {0}")]
    Io(#[from] std::io::Error),
    #[error("policy JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown policy preset: {0} (use default|strict)")]
    UnknownPreset(String),
    #[error("invalid policy: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub simi_retain: f64,
    pub gof: f64,
    pub ushape: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyProfile {
    pub name: String,

    pub signal_threshold: f64,
    pub max_clusters: usize,
    pub hvg_genes: usize,
    pub gap_factor: f64,
    pub min_cluster_cells: usize,
    pub num_simulations: usize,
    pub seed: u64,
    pub power_iterations: usize,
    pub marker_genes: usize,

    pub min_connected_cells: usize,
    pub lowdim_gap_factor: f64,
    pub retain_neighbors: usize,
    pub retain_min_overlap: f64,
    pub gof_cells_per_bin: f64,
    pub fold_arc_fraction: f64,
    pub fold_tolerance: f64,

    pub weights: ScoreWeights,
    pub min_recommend_score: f64,
    pub recommend_margin: f64,

    pub reserve_threads: usize,
}

impl Default for PolicyProfile {
    fn default() -> Self {
        Self::default_v1()
    }
}

impl PolicyProfile {
    pub fn default_v1() -> Self {
        Self {
            name: "default_v1".to_string(),
            signal_threshold: 0.46,
            max_clusters: 10,
            hvg_genes: 500,
            gap_factor: 3.0,
            min_cluster_cells: 10,
            num_simulations: 20,
            seed: 42,
            power_iterations: 60,
            marker_genes: 10,
            min_connected_cells: 10,
            lowdim_gap_factor: 3.0,
            retain_neighbors: 15,
            retain_min_overlap: 0.2,
            gof_cells_per_bin: 5.0,
            fold_arc_fraction: 0.25,
            fold_tolerance: 0.02,
            weights: ScoreWeights {
                simi_retain: 1.0,
                gof: 1.0,
                ushape: 1.0,
            },
            min_recommend_score: 0.5,
            recommend_margin: 0.05,
            reserve_threads: 1,
        }
    }

    pub fn strict_v1() -> Self {
        let mut base = Self::default_v1();
        base.name = "strict_v1".to_string();
        base.signal_threshold = 0.5;
        base
    }

    pub fn preset(name: &str) -> Result<Self, PolicyError> {
        match name {
            "default" | "default_v1" => Ok(Self::default_v1()),
            "strict" | "strict_v1" => Ok(Self::strict_v1()),
            other => Err(PolicyError::UnknownPreset(other.to_string())),
        }
    }

    /// Applies the keys present in a JSON object on top of `self`.
    pub fn with_overrides(self, overrides: serde_json::Value) -> Result<Self, PolicyError> {
        let mut base = serde_json::to_value(&self)?;
        merge_json(&mut base, overrides);
        let merged: PolicyProfile = serde_json::from_value(base)?;
        merged.validate()?;
        Ok(merged)
    }

    pub fn with_overrides_file(self, path: &Path) -> Result<Self, PolicyError> {
        let text = std::fs::read_to_string(path)?;
        let overrides: serde_json::Value = serde_json::from_str(&text)?;
        self.with_overrides(overrides)
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        let unit = [
            ("signal_threshold", self.signal_threshold),
            ("retain_min_overlap", self.retain_min_overlap),
            ("fold_arc_fraction", self.fold_arc_fraction),
            ("fold_tolerance", self.fold_tolerance),
            ("min_recommend_score", self.min_recommend_score),
            ("recommend_margin", self.recommend_margin),
        ];
        for (name, value) in unit {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(PolicyError::Invalid(format!(
                    "{name} must be finite and within [0, 1]; got {value}"
                )));
            }
        }
        for (name, value) in [
            ("gap_factor", self.gap_factor),
            ("lowdim_gap_factor", self.lowdim_gap_factor),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(PolicyError::Invalid(format!(
                    "{name} must be positive; got {value}"
                )));
            }
        }
        if !self.gof_cells_per_bin.is_finite() || self.gof_cells_per_bin < 1.0 {
            return Err(PolicyError::Invalid(format!(
                "gof_cells_per_bin must be at least 1; got {}",
                self.gof_cells_per_bin
            )));
        }
        if self.max_clusters == 0 {
            return Err(PolicyError::Invalid("max_clusters must be >= 1".to_string()));
        }
        for (name, value) in [
            ("hvg_genes", self.hvg_genes),
            ("num_simulations", self.num_simulations),
            ("power_iterations", self.power_iterations),
            ("retain_neighbors", self.retain_neighbors),
        ] {
            if value == 0 {
                return Err(PolicyError::Invalid(format!("{name} must be >= 1")));
            }
        }
        if self.reserve_threads == 0 {
            return Err(PolicyError::Invalid(
                "reserve_threads must keep at least one core free".to_string(),
            ));
        }
        let w = self.weights;
        for (name, value) in [
            ("weights.simi_retain", w.simi_retain),
            ("weights.gof", w.gof),
            ("weights.ushape", w.ushape),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(PolicyError::Invalid(format!(
                    "{name} must be finite and non-negative; got {value}"
                )));
            }
        }
        if w.simi_retain + w.gof + w.ushape <= 0.0 {
            return Err(PolicyError::Invalid(
                "at least one score weight must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn merge_json(base: &mut serde_json::Value, overrides: serde_json::Value) {
    match (base, overrides) {
        (serde_json::Value::Object(base), serde_json::Value::Object(overrides)) => {
            for (key, value) in overrides {
                match base.get_mut(&key) {
                    Some(slot) => merge_json(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

#[cfg(test)]
#[path = "../../tests/src_inline/model/thresholds.rs"]
mod tests;
