use std::cmp::Ordering;

use rayon::prelude::*;

use crate::numeric::{Points, sq_dist};

fn by_distance(a: &(f64, usize), b: &(f64, usize)) -> Ordering {
    a.0.total_cmp(&b.0).then(a.1.cmp(&b.1))
}

/// The `k` nearest neighbours of every point, self excluded, nearest first.
pub fn knn(points: &Points, k: usize) -> Vec<Vec<usize>> {
    let n = points.len();
    let k = k.min(n.saturating_sub(1));
    if k == 0 {
        return vec![Vec::new(); n];
    }
    (0..n)
        .into_par_iter()
        .map(|i| {
            let anchor = points.row(i);
            let mut dists = (0..n)
                .filter(|&j| j != i)
                .map(|j| (sq_dist(anchor, points.row(j)), j))
                .collect::<Vec<_>>();
            if k < dists.len() {
                dists.select_nth_unstable_by(k, by_distance);
                dists.truncate(k);
            }
            dists.sort_by(by_distance);
            dists.into_iter().map(|(_, j)| j).collect()
        })
        .collect()
}

#[cfg(test)]
#[path = "../../tests/src_inline/numeric/neighbors.rs"]
mod tests;
