use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::*;

static DIR_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn make_temp_dir() -> PathBuf {
    let mut dir = std::env::temp_dir();
    let id = DIR_COUNTER.fetch_add(1, Ordering::SeqCst);
    dir.push(format!("kira_trajectoryqc_cli_{}_{}", std::process::id(), id));
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn run_args(extra: &[&str]) -> RunArgs {
    let mut argv = vec!["kira-trajectoryqc", "run", "--out", "out"];
    argv.extend_from_slice(extra);
    match Cli::try_parse_from(argv).unwrap().command {
        Command::Run(args) => args,
        other => panic!("unexpected command {other:?}"),
    }
}

fn write_matrix(path: &Path, cells: usize, genes: usize, scale: f64) {
    let mut body = String::from("gene");
    for j in 0..cells {
        body.push_str(&format!("\tc{j}"));
    }
    body.push('\n');
    for g in 0..genes {
        body.push_str(&format!("g{g}"));
        for j in 0..cells {
            let t = (j as f64).powf(1.3);
            body.push_str(&format!("\t{}", scale * (1.0 + 0.1 * g as f64) * t));
        }
        body.push('\n');
    }
    fs::write(path, body).unwrap();
}

fn write_bundle(dir: &Path, cells: usize) {
    fs::create_dir_all(dir).unwrap();
    let mut embedding = String::from("cell\tx\ty\n");
    let mut pseudotime = String::from("cell\tlineage1\n");
    for j in 0..cells {
        let t = (j as f64).powf(1.3);
        embedding.push_str(&format!("c{j}\t{t}\t{}\n", ((j * 7) % 5) as f64 * 0.5));
        pseudotime.push_str(&format!("c{j}\t{t}\n"));
    }
    fs::write(dir.join("embedding.tsv"), embedding).unwrap();
    fs::write(dir.join("pseudotime.tsv"), pseudotime).unwrap();
    fs::write(dir.join("fitline.tsv"), "segment\tx0\ty0\tx1\ty1\ns1\t0\t0\t300\t0\n").unwrap();
}

#[test]
fn test_run_defaults() {
    let args = run_args(&[]);
    assert_eq!(args.run_mode, RunMode::Standalone);
    assert_eq!(args.policy, "default");
    assert!(args.candidates.is_empty());
    assert!(args.raw.is_none());
}

#[test]
fn test_run_collects_repeated_candidates() {
    let args = run_args(&[
        "--candidate",
        "a",
        "--candidate",
        "b.ktq",
        "--policy",
        "strict",
        "--run-mode",
        "pipeline",
        "--threads",
        "3",
    ]);
    assert_eq!(args.candidates, vec![PathBuf::from("a"), PathBuf::from("b.ktq")]);
    assert_eq!(args.policy, "strict");
    assert_eq!(args.run_mode, RunMode::Pipeline);
    assert_eq!(args.threads, Some(3));
}

#[test]
fn test_run_requires_out() {
    assert!(Cli::try_parse_from(["kira-trajectoryqc", "run"]).is_err());
    assert!(
        Cli::try_parse_from(["kira-trajectoryqc", "run", "--out", "o", "--run-mode", "x"]).is_err()
    );
}

#[test]
fn test_global_verbose_flag() {
    let cli = Cli::try_parse_from([
        "kira-trajectoryqc",
        "pack-candidate",
        "--input",
        "d",
        "--out",
        "d.ktq",
        "-v",
    ])
    .unwrap();
    assert!(cli.verbose);
    assert!(matches!(cli.command, Command::PackCandidate(_)));
}

#[test]
fn test_resolve_output_dir_pipeline() {
    let out = resolve_output_dir(Path::new("/tmp/out"), RunMode::Pipeline);
    assert_eq!(out, PathBuf::from("/tmp/out/kira-trajectoryqc"));
}

#[test]
fn test_resolve_output_dir_standalone() {
    let out = resolve_output_dir(Path::new("/tmp/out"), RunMode::Standalone);
    assert_eq!(out, PathBuf::from("/tmp/out"));
}

#[test]
fn test_resolve_policy_with_override_file() {
    let dir = make_temp_dir();
    let path = dir.join("policy.json");
    fs::write(&path, r#"{"signal_threshold": 0.6, "weights": {"gof": 0.0}}"#).unwrap();
    let policy = resolve_policy("strict", Some(&path)).unwrap();
    assert_eq!(policy.name, "strict_v1");
    assert_eq!(policy.signal_threshold, 0.6);
    assert_eq!(policy.weights.gof, 0.0);
    assert_eq!(policy.weights.simi_retain, 1.0);

    fs::write(&path, r#"{"no_such_field": 1}"#).unwrap();
    assert!(resolve_policy("default", Some(&path)).is_err());
    assert!(matches!(
        resolve_policy("lax", None),
        Err(PolicyError::UnknownPreset(_))
    ));
}

#[test]
fn test_exit_codes() {
    assert_eq!(exit_code(&PipelineState::DatasetRejected(String::new())), 2);
    assert_eq!(exit_code(&PipelineState::AwaitingInput(String::new())), 3);
}

#[test]
fn test_run_pipeline_end_to_end() {
    let dir = make_temp_dir();
    write_matrix(&dir.join("raw.tsv"), 40, 6, 10.0);
    write_matrix(&dir.join("norm.tsv"), 40, 6, 1.0);
    write_bundle(&dir.join("traj_a"), 40);

    let out = dir.join("out");
    let args = RunArgs {
        raw: Some(dir.join("raw.tsv")),
        normalized: Some(dir.join("norm.tsv")),
        stage1: None,
        candidates: vec![dir.join("traj_a")],
        out: out.clone(),
        policy: "default".to_string(),
        policy_file: None,
        threads: Some(2),
        run_mode: RunMode::Pipeline,
    };
    let state = run_pipeline(&args).unwrap();
    assert_eq!(exit_code(&state), 0);

    let out_dir = out.join("kira-trajectoryqc");
    let summary: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out_dir.join("summary.json")).unwrap()).unwrap();
    assert_eq!(summary["state"], state.label());
    assert_eq!(summary["dataset"]["n_cells"], 40);
    assert!(out_dir.join("report.txt").exists());
    assert!(out_dir.join("structure.tsv").exists());
    assert!(out_dir.join("stage1.ktq").exists());

    // the stored result is picked up on a second run without the dataset
    let rerun = RunArgs {
        raw: None,
        normalized: None,
        stage1: Some(out_dir.join("stage1.ktq")),
        candidates: Vec::new(),
        out: dir.join("out2"),
        policy: "default".to_string(),
        policy_file: None,
        threads: Some(1),
        run_mode: RunMode::Standalone,
    };
    let state = run_pipeline(&rerun).unwrap();
    assert_eq!(state.stage1().unwrap().source.as_str(), "loaded");
    assert!(!dir.join("out2").join("stage1.ktq").exists());
}

#[test]
fn test_run_pipeline_rejects_duplicate_candidates() {
    let dir = make_temp_dir();
    write_bundle(&dir.join("a").join("same"), 10);
    write_bundle(&dir.join("b").join("same"), 10);
    let args = RunArgs {
        raw: None,
        normalized: None,
        stage1: None,
        candidates: vec![dir.join("a").join("same"), dir.join("b").join("same")],
        out: dir.join("out"),
        policy: "default".to_string(),
        policy_file: None,
        threads: Some(1),
        run_mode: RunMode::Standalone,
    };
    assert!(matches!(
        run_pipeline(&args),
        Err(CliError::Pipeline(PipelineError::DuplicateCandidateId(_)))
    ));
}

#[test]
fn test_pack_candidate_round_trip() {
    let dir = make_temp_dir();
    write_bundle(&dir.join("traj_b"), 12);
    let blob = dir.join("traj_b.ktq");
    let code = execute(Command::PackCandidate(PackArgs {
        input: dir.join("traj_b"),
        out: blob.clone(),
    }))
    .unwrap();
    assert_eq!(code, 0);
    assert_eq!(
        load_candidate(&blob).unwrap(),
        load_candidate(&dir.join("traj_b")).unwrap()
    );
}

#[test]
fn test_pack_matrix_round_trip() {
    let dir = make_temp_dir();
    write_matrix(&dir.join("norm.tsv"), 5, 3, 1.0);
    let blob = dir.join("norm.ktq");
    execute(Command::PackMatrix(PackArgs {
        input: dir.join("norm.tsv"),
        out: blob.clone(),
    }))
    .unwrap();
    assert_eq!(
        load_expression(&blob).unwrap(),
        load_expression(&dir.join("norm.tsv")).unwrap()
    );
}
