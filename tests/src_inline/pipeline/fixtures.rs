use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::model::candidate::{Candidate, Pseudotime, Segment};
use crate::model::matrix::ExpressionMatrix;
use crate::model::thresholds::PolicyProfile;

pub fn names(prefix: &str, n: usize) -> Vec<String> {
    (0..n).map(|i| format!("{prefix}{i}")).collect()
}

/// Unevenly spaced positions in [0, 1]; no two gaps are equal.
pub fn positions(n: usize) -> Vec<f64> {
    let last = ((n.max(2) - 1) as f64).powf(1.3);
    (0..n).map(|j| (j as f64).powf(1.3) / last).collect()
}

fn rank_one(genes: usize, ts: &[f64]) -> Array2<f64> {
    Array2::from_shape_fn((genes, ts.len()), |(g, j)| (1.0 + 0.1 * g as f64) * ts[j])
}

fn pair_from(values: Array2<f64>) -> (ExpressionMatrix, ExpressionMatrix) {
    let (genes, cells) = values.dim();
    let counts = values.mapv(|v| (v * 10.0).round());
    let raw = ExpressionMatrix::new(names("g", genes), names("c", cells), counts).unwrap();
    let normalized = ExpressionMatrix::new(names("g", genes), names("c", cells), values).unwrap();
    (raw, normalized)
}

/// Every gene a multiple of one latent position: one connected, strongly structured group.
pub fn line_dataset(cells: usize, genes: usize) -> (ExpressionMatrix, ExpressionMatrix) {
    pair_from(rank_one(genes, &positions(cells)))
}

/// Same latent structure with a wide empty gap in the middle.
pub fn two_group_dataset(per_group: usize, genes: usize) -> (ExpressionMatrix, ExpressionMatrix) {
    let step = 0.3 / (per_group - 1) as f64;
    let ts = (0..per_group)
        .map(|i| i as f64 * step)
        .chain((0..per_group).map(|i| 0.7 + i as f64 * step))
        .collect::<Vec<_>>();
    pair_from(rank_one(genes, &ts))
}

/// Independent uniform noise per gene and cell.
pub fn noise_dataset(cells: usize, genes: usize, seed: u64) -> (ExpressionMatrix, ExpressionMatrix) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let values = Array2::from_shape_fn((genes, cells), |_| rng.gen_range(0.0..1.0));
    pair_from(values)
}

/// Embedding following the latent order, fitted by one straight segment.
pub fn line_candidate(id: &str, cells: usize) -> Candidate {
    let ts = positions(cells);
    let embedding = Array2::from_shape_fn((cells, 2), |(j, axis)| {
        if axis == 0 {
            ts[j]
        } else {
            ((j * 7) % 5) as f64 * 0.01
        }
    });
    Candidate::new(
        id.to_string(),
        names("c", cells),
        embedding,
        Pseudotime {
            branches: vec!["lineage1".to_string()],
            values: Array2::from_shape_fn((cells, 1), |(j, _)| ts[j]),
        },
        vec![Segment {
            x0: 0.0,
            y0: 0.0,
            x1: 1.0,
            y1: 0.0,
        }],
        None,
    )
    .unwrap()
}

/// Embedding split into two far groups.
pub fn split_candidate(id: &str, cells: usize) -> Candidate {
    let mut candidate = line_candidate(id, cells);
    for j in cells / 2..cells {
        candidate.embedding[[j, 0]] += 50.0;
    }
    candidate
}

pub fn test_policy() -> PolicyProfile {
    let mut policy = PolicyProfile::default_v1();
    policy.num_simulations = 8;
    policy.min_cluster_cells = 5;
    policy.min_connected_cells = 5;
    policy
}
