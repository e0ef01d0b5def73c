use std::sync::Arc;

use rayon::ThreadPool;

use crate::model::candidate::{Candidate, CandidateBatch};
use crate::model::diagnostics::DiagnosticRow;
use crate::model::matrix::{ExpressionMatrix, MatrixPair};
use crate::model::ranking::RankedTable;
use crate::model::structure::StructureCheckResult;
use crate::model::thresholds::PolicyProfile;
use crate::pipeline::PipelineError;
use crate::pipeline::stage0_input::pair_matrices;
use crate::pipeline::stage1_structure::{
    Stage1Output, Stage1Source, dataset_fingerprint, run_stage1, stage1_from_loaded,
};
use crate::pipeline::stage2_diagnostics::{DiagnosticContext, build_worker_pool, run_stage2};
use crate::pipeline::stage3_rank::{Stage3Inputs, run_stage3};

/// Where evaluation stopped. Each variant is a gate outcome, not an error.
#[derive(Debug, Clone)]
pub enum PipelineState {
    AwaitingInput(String),
    DatasetRejected(String),
    NotSuitable(Arc<Stage1Output>),
    AwaitingCandidates(Arc<Stage1Output>),
    Ranked {
        stage1: Arc<Stage1Output>,
        diagnostics: Arc<Vec<DiagnosticRow>>,
        ranking: Arc<RankedTable>,
    },
}

impl PipelineState {
    pub fn label(&self) -> &'static str {
        match self {
            PipelineState::AwaitingInput(_) => "awaiting_input",
            PipelineState::DatasetRejected(_) => "dataset_rejected",
            PipelineState::NotSuitable(_) => "not_suitable",
            PipelineState::AwaitingCandidates(_) => "awaiting_candidates",
            PipelineState::Ranked { .. } => "ranked",
        }
    }

    pub fn stage1(&self) -> Option<&Arc<Stage1Output>> {
        match self {
            PipelineState::NotSuitable(stage1)
            | PipelineState::AwaitingCandidates(stage1)
            | PipelineState::Ranked { stage1, .. } => Some(stage1),
            _ => None,
        }
    }

    pub fn ranking(&self) -> Option<&Arc<RankedTable>> {
        match self {
            PipelineState::Ranked { ranking, .. } => Some(ranking),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounts {
    pub stage1: usize,
    pub diagnostics: usize,
    pub ranking: usize,
}

#[derive(Debug)]
struct Slot<T> {
    value: Arc<T>,
    version: u64,
}

impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            version: self.version,
        }
    }
}

#[derive(Debug)]
struct Memo<T> {
    key: Vec<u64>,
    value: Arc<T>,
}

impl<T> Clone for Memo<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            value: Arc::clone(&self.value),
        }
    }
}

fn lookup<T>(memo: &Option<Memo<T>>, key: &[u64]) -> Option<Arc<T>> {
    memo.as_ref()
        .filter(|m| m.key == key)
        .map(|m| Arc::clone(&m.value))
}

fn version_of<T>(slot: &Option<Slot<T>>) -> u64 {
    slot.as_ref().map_or(0, |s| s.version)
}

/// Inputs, derived values and the worker pool of one interactive session.
/// The session is the only writer; evaluation may run detached on a snapshot.
pub struct Session {
    counter: u64,
    policy: Slot<PolicyProfile>,
    raw: Option<Slot<ExpressionMatrix>>,
    normalized: Option<Slot<ExpressionMatrix>>,
    stored_stage1: Option<Slot<StructureCheckResult>>,
    candidates: Option<Slot<CandidateBatch>>,
    pool: Arc<ThreadPool>,
    stage1: Option<Memo<Stage1Output>>,
    diagnostics: Option<Memo<Vec<DiagnosticRow>>>,
    ranking: Option<Memo<RankedTable>>,
    runs: RunCounts,
    state: Option<PipelineState>,
}

impl Session {
    pub fn new(policy: PolicyProfile, threads: Option<usize>) -> Result<Self, PipelineError> {
        policy.validate()?;
        let pool = build_worker_pool(policy.reserve_threads, threads)?;
        Ok(Self {
            counter: 1,
            policy: Slot {
                value: Arc::new(policy),
                version: 1,
            },
            raw: None,
            normalized: None,
            stored_stage1: None,
            candidates: None,
            pool: Arc::new(pool),
            stage1: None,
            diagnostics: None,
            ranking: None,
            runs: RunCounts::default(),
            state: None,
        })
    }

    fn next_version(&mut self) -> u64 {
        self.counter += 1;
        self.counter
    }

    fn slot<T>(&mut self, value: T) -> Slot<T> {
        Slot {
            value: Arc::new(value),
            version: self.next_version(),
        }
    }

    pub fn policy(&self) -> &PolicyProfile {
        &self.policy.value
    }

    pub fn set_policy(&mut self, policy: PolicyProfile) -> Result<(), PipelineError> {
        policy.validate()?;
        self.policy = self.slot(policy);
        Ok(())
    }

    pub fn set_raw(&mut self, raw: ExpressionMatrix) {
        self.raw = Some(self.slot(raw));
    }

    pub fn set_normalized(&mut self, normalized: ExpressionMatrix) {
        self.normalized = Some(self.slot(normalized));
    }

    pub fn set_stored_stage1(&mut self, result: StructureCheckResult) {
        self.stored_stage1 = Some(self.slot(result));
    }

    /// Replaces the candidate batch. A rejected batch leaves the previous one in place.
    pub fn set_candidates(&mut self, candidates: Vec<Candidate>) -> Result<(), PipelineError> {
        let batch = CandidateBatch::new(candidates)?;
        self.candidates = Some(self.slot(batch));
        Ok(())
    }

    pub fn clear_dataset(&mut self) {
        self.raw = None;
        self.normalized = None;
    }

    pub fn clear_candidates(&mut self) {
        self.candidates = None;
    }

    pub fn run_counts(&self) -> RunCounts {
        self.runs
    }

    pub fn state(&self) -> Option<&PipelineState> {
        self.state.as_ref()
    }

    fn versions(&self) -> Vec<u64> {
        vec![
            self.policy.version,
            version_of(&self.raw),
            version_of(&self.normalized),
            version_of(&self.stored_stage1),
            version_of(&self.candidates),
        ]
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            versions: self.versions(),
            policy: self.policy.clone(),
            raw: self.raw.clone(),
            normalized: self.normalized.clone(),
            stored_stage1: self.stored_stage1.clone(),
            candidates: self.candidates.clone(),
            pool: Arc::clone(&self.pool),
            stage1: self.stage1.clone(),
            diagnostics: self.diagnostics.clone(),
            ranking: self.ranking.clone(),
        }
    }

    /// Commits a detached evaluation. Returns `None` and drops the result when any
    /// input changed after the snapshot was taken.
    pub fn absorb(&mut self, eval: Evaluation) -> Option<PipelineState> {
        if eval.versions != self.versions() {
            tracing::debug!("dropping stale evaluation ({})", eval.state.label());
            return None;
        }
        if let Some(memo) = eval.stage1 {
            self.stage1 = Some(memo);
            self.runs.stage1 += eval.ran.stage1;
        }
        if let Some(memo) = eval.diagnostics {
            self.diagnostics = Some(memo);
            self.runs.diagnostics += eval.ran.diagnostics;
        }
        if let Some(memo) = eval.ranking {
            self.ranking = Some(memo);
            self.runs.ranking += eval.ran.ranking;
        }
        self.state = Some(eval.state.clone());
        Some(eval.state)
    }

    pub fn evaluate(&mut self) -> PipelineState {
        let eval = self.snapshot().run();
        let state = eval.state.clone();
        self.absorb(eval);
        state
    }
}

/// Frozen inputs and memos; `run` may execute on any thread.
pub struct Snapshot {
    versions: Vec<u64>,
    policy: Slot<PolicyProfile>,
    raw: Option<Slot<ExpressionMatrix>>,
    normalized: Option<Slot<ExpressionMatrix>>,
    stored_stage1: Option<Slot<StructureCheckResult>>,
    candidates: Option<Slot<CandidateBatch>>,
    pool: Arc<ThreadPool>,
    stage1: Option<Memo<Stage1Output>>,
    diagnostics: Option<Memo<Vec<DiagnosticRow>>>,
    ranking: Option<Memo<RankedTable>>,
}

pub struct Evaluation {
    versions: Vec<u64>,
    state: PipelineState,
    stage1: Option<Memo<Stage1Output>>,
    diagnostics: Option<Memo<Vec<DiagnosticRow>>>,
    ranking: Option<Memo<RankedTable>>,
    ran: RunCounts,
}

impl Evaluation {
    pub fn state(&self) -> &PipelineState {
        &self.state
    }
}

impl Snapshot {
    pub fn run(self) -> Evaluation {
        let mut eval = Evaluation {
            versions: self.versions.clone(),
            state: PipelineState::AwaitingInput(String::new()),
            stage1: None,
            diagnostics: None,
            ranking: None,
            ran: RunCounts::default(),
        };
        eval.state = match self.advance(&mut eval) {
            Ok(state) => state,
            Err(PipelineError::InputMissing(msg)) => PipelineState::AwaitingInput(msg),
            Err(err @ PipelineError::DatasetMismatch { .. }) => {
                tracing::warn!("{}", err);
                PipelineState::DatasetRejected(err.to_string())
            }
            Err(err) => PipelineState::DatasetRejected(err.to_string()),
        };
        eval
    }

    fn advance(&self, eval: &mut Evaluation) -> Result<PipelineState, PipelineError> {
        let policy = &*self.policy.value;
        let stored = self.stored_stage1.as_ref().map(|s| &s.value);

        // G0
        let pair = match (&self.raw, &self.normalized, stored) {
            (Some(raw), Some(normalized), _) => {
                Some(pair_matrices(Some(&raw.value), Some(&normalized.value))?)
            }
            (raw, normalized, Some(_)) => {
                if raw.is_some() || normalized.is_some() {
                    tracing::warn!(
                        "only one matrix loaded; the stored structure check stands in for stage1"
                    );
                }
                None
            }
            (raw, normalized, None) => Some(pair_matrices(
                raw.as_ref().map(|s| &s.value),
                normalized.as_ref().map(|s| &s.value),
            )?),
        };

        // G1
        let stage1_key = vec![
            self.policy.version,
            version_of(&self.raw),
            version_of(&self.normalized),
            version_of(&self.stored_stage1),
        ];
        let stage1 = match lookup(&self.stage1, &stage1_key) {
            Some(stage1) => stage1,
            None => {
                let stage1 = Arc::new(
                    self.pool
                        .install(|| compute_stage1(pair.as_ref(), stored, policy))?,
                );
                eval.ran.stage1 = 1;
                eval.stage1 = Some(Memo {
                    key: stage1_key.clone(),
                    value: Arc::clone(&stage1),
                });
                stage1
            }
        };
        if !stage1.gate.proceed {
            if stage1.source == Stage1Source::Computed {
                return Ok(PipelineState::NotSuitable(stage1));
            }
            tracing::warn!(
                "stored structure check fails the gate (signal_pct={:.3}, connected={}); continuing with it",
                stage1.gate.signal_pct,
                stage1.gate.if_connected
            );
        }

        // G2
        let Some(batch) = &self.candidates else {
            return Ok(PipelineState::AwaitingCandidates(stage1));
        };

        // G3
        let mut downstream_key = stage1_key;
        downstream_key.push(batch.version);
        let diagnostics = match lookup(&self.diagnostics, &downstream_key) {
            Some(rows) => rows,
            None => {
                let ctx = DiagnosticContext {
                    structure: &stage1.result,
                    normalized: pair
                        .as_ref()
                        .map(|p| &*p.normalized)
                        .or(self.normalized.as_ref().map(|s| &*s.value)),
                    policy,
                };
                let rows = Arc::new(run_stage2(&batch.value, &ctx, &self.pool));
                eval.ran.diagnostics = 1;
                eval.diagnostics = Some(Memo {
                    key: downstream_key.clone(),
                    value: Arc::clone(&rows),
                });
                rows
            }
        };
        let ranking = match lookup(&self.ranking, &downstream_key) {
            Some(table) => table,
            None => {
                let table = Arc::new(run_stage3(&Stage3Inputs {
                    rows: &diagnostics,
                    policy,
                    context: Some(stage1.gate),
                }));
                eval.ran.ranking = 1;
                eval.ranking = Some(Memo {
                    key: downstream_key,
                    value: Arc::clone(&table),
                });
                table
            }
        };

        Ok(PipelineState::Ranked {
            stage1,
            diagnostics,
            ranking,
        })
    }
}

fn compute_stage1(
    pair: Option<&MatrixPair>,
    stored: Option<&Arc<StructureCheckResult>>,
    policy: &PolicyProfile,
) -> Result<Stage1Output, PipelineError> {
    match (pair, stored) {
        (Some(pair), Some(stored)) => {
            if stored.dataset_fingerprint == dataset_fingerprint(pair)
                && stored.cells == pair.normalized.cells
            {
                Ok(stage1_from_loaded(
                    Arc::clone(stored),
                    Some(&pair.normalized),
                    policy,
                ))
            } else {
                tracing::warn!("stored structure check belongs to another dataset; recomputing");
                run_stage1(pair, policy)
            }
        }
        (Some(pair), None) => run_stage1(pair, policy),
        (None, Some(stored)) => Ok(stage1_from_loaded(Arc::clone(stored), None, policy)),
        (None, None) => Err(PipelineError::InputMissing(
            "raw and normalized matrices not loaded".to_string(),
        )),
    }
}

#[cfg(test)]
#[path = "../../tests/src_inline/pipeline/controller.rs"]
mod tests;
