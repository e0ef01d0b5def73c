pub mod graph;
pub mod neighbors;
pub mod spectral;

use ndarray::{Array2, ArrayView2};

/// Row-major point cloud: `len` points of `dim` coordinates each.
#[derive(Debug, Clone, PartialEq)]
pub struct Points {
    len: usize,
    dim: usize,
    data: Vec<f64>,
}

impl Points {
    pub fn zeros(len: usize, dim: usize) -> Self {
        Self {
            len,
            dim,
            data: vec![0.0; len * dim],
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    #[inline]
    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.dim..(i + 1) * self.dim]
    }

    #[inline]
    pub fn row_mut(&mut self, i: usize) -> &mut [f64] {
        &mut self.data[i * self.dim..(i + 1) * self.dim]
    }

    /// Selected rows of an `n x dim` coordinate matrix.
    pub fn from_rows(matrix: &Array2<f64>, rows: &[usize]) -> Self {
        let dim = matrix.ncols();
        let mut out = Self::zeros(rows.len(), dim);
        for (i, &r) in rows.iter().enumerate() {
            for (slot, &v) in out.row_mut(i).iter_mut().zip(matrix.row(r).iter()) {
                *slot = v;
            }
        }
        out
    }

    /// Cells as points over the selected genes of a genes x cells matrix.
    /// Non-finite expression values count as zero.
    pub fn from_expression(values: ArrayView2<f64>, genes: &[usize], cells: &[usize]) -> Self {
        let mut out = Self::zeros(cells.len(), genes.len());
        for (i, &cell) in cells.iter().enumerate() {
            let row = out.row_mut(i);
            for (j, &gene) in genes.iter().enumerate() {
                let v = values[[gene, cell]];
                row[j] = if v.is_finite() { v } else { 0.0 };
            }
        }
        out
    }

    pub fn centered(&self) -> Self {
        let mut means = vec![0.0f64; self.dim];
        for i in 0..self.len {
            for (m, &v) in means.iter_mut().zip(self.row(i)) {
                *m += v;
            }
        }
        if self.len > 0 {
            for m in &mut means {
                *m /= self.len as f64;
            }
        }
        let mut out = self.clone();
        for i in 0..self.len {
            for (v, &m) in out.row_mut(i).iter_mut().zip(&means) {
                *v -= m;
            }
        }
        out
    }

    pub fn column(&self, j: usize) -> Vec<f64> {
        (0..self.len).map(|i| self.data[i * self.dim + j]).collect()
    }

    pub fn set_column(&mut self, j: usize, values: &[f64]) {
        for (i, &v) in values.iter().enumerate().take(self.len) {
            self.data[i * self.dim + j] = v;
        }
    }
}

#[inline]
pub fn sq_dist(a: &[f64], b: &[f64]) -> f64 {
    let mut acc = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        let d = x - y;
        acc += d * d;
    }
    acc
}

#[inline]
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    let mut acc = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        acc += x * y;
    }
    acc
}

#[derive(Debug, Clone)]
pub struct GeneStats {
    pub mean: Vec<f64>,
    pub variance: Vec<f64>,
}

/// Per-gene mean and population variance over the given cells (columns).
pub fn gene_stats(values: ArrayView2<f64>, cells: &[usize]) -> GeneStats {
    let n_genes = values.nrows();
    let mut mean = vec![0.0f64; n_genes];
    let mut variance = vec![0.0f64; n_genes];
    if cells.is_empty() {
        return GeneStats { mean, variance };
    }
    let n = cells.len() as f64;
    for gene in 0..n_genes {
        let row = values.row(gene);
        let mut sum = 0.0f64;
        for &cell in cells {
            let v = row[cell];
            if v.is_finite() {
                sum += v;
            }
        }
        let m = sum / n;
        let mut ss = 0.0f64;
        for &cell in cells {
            let v = row[cell];
            let d = if v.is_finite() { v - m } else { -m };
            ss += d * d;
        }
        mean[gene] = m;
        variance[gene] = ss / n;
    }
    GeneStats { mean, variance }
}

/// Indices (ascending) of the `n_top` genes with the largest positive variance.
pub fn top_variable_genes(stats: &GeneStats, n_top: usize) -> Vec<usize> {
    let mut order = (0..stats.variance.len())
        .filter(|&g| stats.variance[g] > 0.0)
        .collect::<Vec<_>>();
    order.sort_by(|&a, &b| {
        stats.variance[b]
            .total_cmp(&stats.variance[a])
            .then(a.cmp(&b))
    });
    order.truncate(n_top);
    order.sort_unstable();
    order
}

pub fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() - 1) as f64 * p).ceil() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

#[cfg(test)]
#[path = "../../tests/src_inline/numeric/mod.rs"]
mod tests;
