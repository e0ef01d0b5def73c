use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::*;

static DIR_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn make_bundle(name: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    let id = DIR_COUNTER.fetch_add(1, Ordering::SeqCst);
    dir.push(format!("kira_trajectoryqc_bundle_{}_{}", std::process::id(), id));
    dir.push(name);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_basic(dir: &Path) {
    fs::write(
        dir.join("embedding.tsv"),
        "cell\tUMAP1\tUMAP2\tUMAP3\nc1\t0\t0\t9\nc2\t1\t0.5\t9\nc3\t2\t1\t9\n",
    )
    .unwrap();
    fs::write(
        dir.join("pseudotime.tsv"),
        "cell\tlineage1\tlineage2\nc3\t2\tNA\nc1\t0\tNA\nextra\t5\t5\n",
    )
    .unwrap();
    fs::write(
        dir.join("fitline.csv"),
        "segment,x0,y0,x1,y1\ns1,0,0,1,0.5\ns2,1,0.5,2,1\n",
    )
    .unwrap();
}

#[test]
fn test_bundle_loads_and_aligns_pseudotime() {
    let dir = make_bundle("slingshot_umap");
    write_basic(&dir);

    let candidate = load_candidate_dir(&dir).unwrap();
    assert_eq!(candidate.id, "slingshot_umap");
    assert_eq!(candidate.cells, vec!["c1", "c2", "c3"]);
    assert_eq!(candidate.embedding.dim(), (3, 2));
    assert_eq!(candidate.embedding[[1, 1]], 0.5);
    assert_eq!(candidate.pseudotime.branches, vec!["lineage1", "lineage2"]);
    assert_eq!(candidate.pseudotime.values[[0, 0]], 0.0);
    assert_eq!(candidate.pseudotime.values[[2, 0]], 2.0);
    assert!(!candidate.pseudotime.on_trajectory(1));
    assert_eq!(candidate.fit_line.len(), 2);
    assert_eq!(candidate.fit_line[1].x0, 1.0);
    assert!(candidate.normalized.is_none());
}

#[test]
fn test_bundle_with_own_normalized_counts() {
    let dir = make_bundle("with_norm");
    write_basic(&dir);
    fs::write(
        dir.join("normalized.tsv"),
        "gene\tc1\tc2\tc3\ng1\t0\t1\t2\n",
    )
    .unwrap();
    let candidate = load_candidate_dir(&dir).unwrap();
    let norm = candidate.normalized.unwrap();
    assert_eq!(norm.dims(), (1, 3));
}

#[test]
fn test_bundle_missing_fitline() {
    let dir = make_bundle("no_fit");
    write_basic(&dir);
    fs::remove_file(dir.join("fitline.csv")).unwrap();
    assert!(matches!(
        load_candidate_dir(&dir),
        Err(InputError::MissingInput(_))
    ));
}

#[test]
fn test_fit_line_positional_columns() {
    let dir = make_bundle("positional");
    write_basic(&dir);
    fs::remove_file(dir.join("fitline.csv")).unwrap();
    fs::write(dir.join("fitline.tsv"), "a\tb\tc\td\ns1\t0\t0\t3\t4\n").unwrap();
    let candidate = load_candidate_dir(&dir).unwrap();
    assert_eq!(candidate.fit_line[0].length(), 5.0);
}

#[test]
fn test_embedding_needs_two_columns() {
    let dir = make_bundle("one_dim");
    write_basic(&dir);
    fs::write(dir.join("embedding.tsv"), "cell\tx\nc1\t0\n").unwrap();
    assert!(matches!(
        load_candidate_dir(&dir),
        Err(InputError::InvalidInput(_))
    ));
}
