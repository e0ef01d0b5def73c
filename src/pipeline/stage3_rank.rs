use crate::model::diagnostics::DiagnosticRow;
use crate::model::ranking::{Decision, RankedResult, RankedTable};
use crate::model::structure::ProceedGate;
use crate::model::thresholds::{PolicyProfile, ScoreWeights};

#[derive(Debug, Clone)]
pub struct Stage3Inputs<'a> {
    pub rows: &'a [DiagnosticRow],
    pub policy: &'a PolicyProfile,
    pub context: Option<ProceedGate>,
}

/// Weighted mean of simiRetain, gof and 1 - ushape.
pub fn composite_score(simi_retain: f64, gof: f64, ushape: f64, weights: &ScoreWeights) -> f64 {
    let total = weights.simi_retain + weights.gof + weights.ushape;
    if total <= 0.0 {
        return 0.0;
    }
    (weights.simi_retain * simi_retain + weights.gof * gof + weights.ushape * (1.0 - ushape))
        / total
}

pub fn run_stage3(inputs: &Stage3Inputs<'_>) -> RankedTable {
    let policy = inputs.policy;
    let viable = inputs.rows.iter().any(|row| row.dc_check == Some(true));

    let mut ranked = Vec::new();
    let mut unranked = Vec::new();
    for row in inputs.rows {
        let score = match (row.dc_check, row.simi_retain, row.gof, row.ushape) {
            (Some(_), Some(simi), Some(gof), Some(ushape)) => {
                Some(composite_score(simi, gof, ushape, &policy.weights))
            }
            _ => None,
        };

        let mut notes = row.notes.clone();
        let missing = row.missing_checks();
        if !missing.is_empty() {
            notes.push(format!("missing {}", missing.join(", ")));
        }
        if row.dc_check == Some(false) {
            notes.push("disconnected in embedding".to_string());
        }
        if !viable {
            notes.push("no candidate passed dcCheck".to_string());
        }

        let eligible = viable && row.dc_check == Some(true) && score.is_some();
        if !eligible {
            notes.push("excluded from ranking".to_string());
        }
        let result = RankedResult {
            id: row.id.clone(),
            dc_check: row.dc_check,
            simi_retain: row.simi_retain,
            gof: row.gof,
            ushape: row.ushape,
            score,
            rank: None,
            decision: Decision::NotRecommended,
            note: notes.join("; "),
        };
        if eligible {
            ranked.push(result);
        } else {
            unranked.push(result);
        }
    }

    ranked.sort_by(|a, b| {
        let sa = a.score.unwrap_or(f64::NEG_INFINITY);
        let sb = b.score.unwrap_or(f64::NEG_INFINITY);
        sb.total_cmp(&sa).then_with(|| a.id.cmp(&b.id))
    });
    let top = ranked.first().and_then(|r| r.score);
    for (idx, row) in ranked.iter_mut().enumerate() {
        row.rank = Some(idx + 1);
        if let (Some(score), Some(top)) = (row.score, top) {
            if score >= policy.min_recommend_score && top - score <= policy.recommend_margin {
                row.decision = Decision::Recommended;
            }
        }
    }
    unranked.sort_by(|a, b| a.id.cmp(&b.id));

    tracing::info!(
        "stage3: {} ranked, {} excluded, {} recommended, viable={}",
        ranked.len(),
        unranked.len(),
        ranked
            .iter()
            .filter(|r| r.decision == Decision::Recommended)
            .count(),
        viable
    );

    ranked.extend(unranked);
    RankedTable {
        rows: ranked,
        viable,
        context: inputs.context,
    }
}

#[cfg(test)]
#[path = "../../tests/src_inline/pipeline/stage3_rank.rs"]
mod tests;
