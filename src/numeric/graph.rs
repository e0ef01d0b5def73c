use crate::numeric::{Points, quantile_sorted, sq_dist};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MstEdge {
    pub a: usize,
    pub b: usize,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    /// 1-based cluster id per point, numbered by the smallest point index in each cluster.
    pub labels: Vec<u32>,
    pub k: usize,
}

/// Prim's algorithm over the complete Euclidean graph. O(n^2) distance evaluations,
/// O(n) memory; ties resolve to the smallest point index.
pub fn euclidean_mst(points: &Points) -> Vec<MstEdge> {
    let n = points.len();
    if n < 2 {
        return Vec::new();
    }
    let mut in_tree = vec![false; n];
    let mut best = vec![f64::INFINITY; n];
    let mut parent = vec![0usize; n];
    in_tree[0] = true;
    for j in 1..n {
        best[j] = sq_dist(points.row(0), points.row(j));
    }

    let mut edges = Vec::with_capacity(n - 1);
    for _ in 1..n {
        let mut next = None;
        let mut next_d = f64::INFINITY;
        for j in 0..n {
            if in_tree[j] {
                continue;
            }
            if next.is_none() || best[j] < next_d {
                next = Some(j);
                next_d = best[j];
            }
        }
        let Some(next) = next else {
            break;
        };
        in_tree[next] = true;
        edges.push(MstEdge {
            a: parent[next],
            b: next,
            weight: next_d.sqrt(),
        });
        let anchor = points.row(next);
        for j in 0..n {
            if in_tree[j] {
                continue;
            }
            let d = sq_dist(anchor, points.row(j));
            if d < best[j] {
                best[j] = d;
                parent[j] = next;
            }
        }
    }
    edges
}

/// Cuts the longest MST edges that exceed `gap_factor` times the median positive edge,
/// keeping every cluster at `min_size` points or more and at most `max_clusters` clusters.
pub fn split_mst(
    n: usize,
    edges: &[MstEdge],
    gap_factor: f64,
    min_size: usize,
    max_clusters: usize,
) -> Partition {
    let min_size = min_size.max(1);
    let mut cut = vec![false; edges.len()];

    if let Some(threshold) = gap_threshold(edges, gap_factor) {
        let mut order = (0..edges.len())
            .filter(|&i| edges[i].weight > threshold)
            .collect::<Vec<_>>();
        order.sort_by(|&a, &b| edges[b].weight.total_cmp(&edges[a].weight).then(a.cmp(&b)));

        let mut n_cut = 0usize;
        for idx in order {
            if n_cut + 1 >= max_clusters {
                break;
            }
            cut[idx] = true;
            let (_, sizes) = components(n, edges, &cut);
            if sizes.iter().all(|&s| s >= min_size) {
                n_cut += 1;
            } else {
                cut[idx] = false;
            }
        }
    }

    let (labels, sizes) = components(n, edges, &cut);
    Partition {
        labels,
        k: sizes.len(),
    }
}

fn gap_threshold(edges: &[MstEdge], gap_factor: f64) -> Option<f64> {
    let mut positive = edges
        .iter()
        .map(|e| e.weight)
        .filter(|w| *w > 0.0)
        .collect::<Vec<_>>();
    if positive.is_empty() {
        return None;
    }
    positive.sort_by(f64::total_cmp);
    Some(gap_factor * quantile_sorted(&positive, 0.5))
}

fn components(n: usize, edges: &[MstEdge], cut: &[bool]) -> (Vec<u32>, Vec<usize>) {
    let mut uf = UnionFind::new(n);
    for (edge, &is_cut) in edges.iter().zip(cut) {
        if !is_cut {
            uf.union(edge.a, edge.b);
        }
    }
    let mut label_of_root = vec![0u32; n];
    let mut labels = vec![0u32; n];
    let mut sizes = Vec::new();
    for i in 0..n {
        let root = uf.find(i);
        if label_of_root[root] == 0 {
            sizes.push(0usize);
            label_of_root[root] = sizes.len() as u32;
        }
        let label = label_of_root[root];
        labels[i] = label;
        sizes[(label - 1) as usize] += 1;
    }
    (labels, sizes)
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return;
        }
        if ra < rb {
            self.parent[rb] = ra;
        } else {
            self.parent[ra] = rb;
        }
    }
}

#[cfg(test)]
#[path = "../../tests/src_inline/numeric/graph.rs"]
mod tests;
