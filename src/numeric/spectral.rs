use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::numeric::{Points, dot};

/// Largest eigenvalue of the (population) covariance of `points`, by power iteration
/// from a fixed start vector.
pub fn top_covariance_eigenvalue(points: &Points, iterations: usize) -> f64 {
    let n = points.len();
    let d = points.dim();
    if n < 2 || d == 0 {
        return 0.0;
    }
    let centered = points.centered();

    let mut v = (0..d)
        .map(|j| 1.0 + (j % 7) as f64 * 0.01)
        .collect::<Vec<_>>();
    if !normalize(&mut v) {
        return 0.0;
    }

    let mut xv = vec![0.0f64; n];
    let mut w = vec![0.0f64; d];
    for _ in 0..iterations {
        for (i, slot) in xv.iter_mut().enumerate() {
            *slot = dot(centered.row(i), &v);
        }
        w.iter_mut().for_each(|x| *x = 0.0);
        for (i, &s) in xv.iter().enumerate() {
            for (wj, &xij) in w.iter_mut().zip(centered.row(i)) {
                *wj += s * xij;
            }
        }
        if !normalize(&mut w) {
            return 0.0;
        }
        std::mem::swap(&mut v, &mut w);
    }

    let mut rayleigh = 0.0f64;
    for i in 0..n {
        let p = dot(centered.row(i), &v);
        rayleigh += p * p;
    }
    rayleigh / n as f64
}

/// Shuffles every column independently; marginal distributions stay, co-variation goes.
pub fn permute_columns(points: &Points, rng: &mut ChaCha8Rng) -> Points {
    let mut out = points.clone();
    for j in 0..points.dim() {
        let mut column = points.column(j);
        for i in (1..column.len()).rev() {
            let swap = rng.gen_range(0..=i);
            column.swap(i, swap);
        }
        out.set_column(j, &column);
    }
    out
}

fn normalize(v: &mut [f64]) -> bool {
    let norm = dot(v, v).sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return false;
    }
    for x in v.iter_mut() {
        *x /= norm;
    }
    true
}

#[cfg(test)]
#[path = "../../tests/src_inline/numeric/spectral.rs"]
mod tests;
