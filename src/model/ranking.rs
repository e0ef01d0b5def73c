use serde::Serialize;

use crate::model::structure::ProceedGate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Decision {
    Recommended,
    NotRecommended,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Recommended => "Recommended",
            Decision::NotRecommended => "NotRecommended",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedResult {
    pub id: String,
    pub dc_check: Option<bool>,
    pub simi_retain: Option<f64>,
    pub gof: Option<f64>,
    pub ushape: Option<f64>,
    pub score: Option<f64>,
    pub rank: Option<usize>,
    pub decision: Decision,
    pub note: String,
}

/// Ranked rows first (by rank), then unranked rows by id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedTable {
    pub rows: Vec<RankedResult>,
    pub viable: bool,
    pub context: Option<ProceedGate>,
}

impl RankedTable {
    pub fn ranked(&self) -> impl Iterator<Item = &RankedResult> + '_ {
        self.rows.iter().filter(|row| row.rank.is_some())
    }

    pub fn recommended(&self) -> impl Iterator<Item = &RankedResult> + '_ {
        self.rows
            .iter()
            .filter(|row| row.decision == Decision::Recommended)
    }
}
