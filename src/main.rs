mod input;
mod logging;
mod model;
mod numeric;
mod pipeline;
mod report;

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use thiserror::Error;

use crate::input::blob::write_blob;
use crate::input::{InputError, load_candidate, load_candidates, load_expression, load_structure};
use crate::model::thresholds::{PolicyError, PolicyProfile};
use crate::pipeline::PipelineError;
use crate::pipeline::controller::{PipelineState, Session};
use crate::pipeline::stage4_report::{Stage4Input, write_reports};

const TOOL_NAME: &str = "kira-trajectoryqc";

#[derive(Debug, Parser)]
#[command(
    name = "kira-trajectoryqc",
    version,
    about = "Checks whether a scRNA-seq dataset suits trajectory fitting and ranks candidate embeddings"
)]
struct Cli {
    /// Debug-level logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the gated pipeline and write reports
    Run(RunArgs),
    /// Pack a candidate bundle directory into a .ktq blob
    PackCandidate(PackArgs),
    /// Pack an expression table into a .ktq blob
    PackMatrix(PackArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    #[arg(long)]
    raw: Option<PathBuf>,
    #[arg(long)]
    normalized: Option<PathBuf>,
    /// Stored structure check (.ktq) to reuse or stand in for the dataset
    #[arg(long)]
    stage1: Option<PathBuf>,
    #[arg(long = "candidate")]
    candidates: Vec<PathBuf>,
    #[arg(long)]
    out: PathBuf,
    /// Policy preset: default or strict
    #[arg(long, default_value = "default")]
    policy: String,
    /// JSON file overriding individual policy fields
    #[arg(long)]
    policy_file: Option<PathBuf>,
    #[arg(long)]
    threads: Option<usize>,
    #[arg(long, value_enum, default_value_t = RunMode::Standalone)]
    run_mode: RunMode,
}

#[derive(Debug, Args)]
struct PackArgs {
    #[arg(long)]
    input: PathBuf,
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RunMode {
    Standalone,
    Pipeline,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("policy: {0}")]
    Policy(#[from] PolicyError),
}

fn main() {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);
    match execute(cli.command) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            tracing::error!("{err}");
            std::process::exit(1);
        }
    }
}

fn execute(command: Command) -> Result<i32, CliError> {
    match command {
        Command::Run(args) => {
            let state = run_pipeline(&args)?;
            Ok(exit_code(&state))
        }
        Command::PackCandidate(args) => {
            let candidate = load_candidate(&args.input)?;
            write_blob(&args.out, &candidate)?;
            tracing::info!("packed candidate {} into {}", candidate.id, args.out.display());
            Ok(0)
        }
        Command::PackMatrix(args) => {
            let matrix = load_expression(&args.input)?;
            write_blob(&args.out, &matrix)?;
            tracing::info!("packed matrix into {}", args.out.display());
            Ok(0)
        }
    }
}

fn run_pipeline(args: &RunArgs) -> Result<PipelineState, CliError> {
    let policy = resolve_policy(&args.policy, args.policy_file.as_deref())?;
    tracing::info!("policy: {}", policy.name);
    let mut session = Session::new(policy, args.threads)?;

    let mut dataset = None;
    if let Some(path) = &args.raw {
        session.set_raw(load_expression(path)?);
    }
    if let Some(path) = &args.normalized {
        let normalized = load_expression(path)?;
        dataset = Some(normalized.dims());
        session.set_normalized(normalized);
    }
    if let Some(path) = &args.stage1 {
        session.set_stored_stage1(load_structure(path)?);
    }
    if !args.candidates.is_empty() {
        session.set_candidates(load_candidates(&args.candidates)?)?;
    }

    let state = session.evaluate();
    match &state {
        PipelineState::AwaitingInput(msg) => tracing::warn!("awaiting input: {}", msg),
        PipelineState::DatasetRejected(msg) => tracing::error!("dataset rejected: {}", msg),
        PipelineState::NotSuitable(_) => {
            tracing::warn!("dataset not suitable for trajectory fitting; candidates not evaluated")
        }
        PipelineState::AwaitingCandidates(_) => {
            tracing::info!("structure gate passed; no candidates supplied")
        }
        PipelineState::Ranked { ranking, .. } => {
            if let Some(top) = ranking.ranked().next() {
                tracing::info!("top candidate: {} ({})", top.id, top.decision.as_str());
            }
        }
    }

    let out_dir = resolve_output_dir(&args.out, args.run_mode);
    write_reports(
        &Stage4Input {
            state: &state,
            policy: session.policy(),
            dataset,
            tool_name: TOOL_NAME.to_string(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        },
        &out_dir,
    )?;
    Ok(state)
}

fn resolve_policy(preset: &str, policy_file: Option<&Path>) -> Result<PolicyProfile, PolicyError> {
    let base = PolicyProfile::preset(preset)?;
    match policy_file {
        Some(path) => base.with_overrides_file(path),
        None => Ok(base),
    }
}

fn resolve_output_dir(base: &Path, run_mode: RunMode) -> PathBuf {
    match run_mode {
        RunMode::Standalone => base.to_path_buf(),
        RunMode::Pipeline => base.join(TOOL_NAME),
    }
}

fn exit_code(state: &PipelineState) -> i32 {
    match state {
        PipelineState::DatasetRejected(_) => 2,
        PipelineState::AwaitingInput(_) => 3,
        _ => 0,
    }
}

#[cfg(test)]
#[path = "../tests/src_inline/main_inline.rs"]
mod tests;
