//! Brute-force HDBSCAN with soft membership probabilities.
//!
//! Pipeline of one fit:
//!
//! 1. core distances (distance to the `min_samples`-th nearest point, the point itself included)
//! 2. Prim's minimum spanning tree over mutual reachability distances
//! 3. single-linkage hierarchy (union-find)
//! 4. condensed tree at `min_cluster_size`
//! 5. excess-of-mass cluster selection (the root is never selected)
//! 6. labels (`-1` = noise) and membership probabilities
//!
//! There is no distance cut-off: the hierarchy alone decides the clusters.

use std::collections::VecDeque;

use nalgebra::DMatrix;
use thiserror::Error;

/// Label of points that belong to no selected cluster.
pub const NOISE: i32 = -1;

/// Reasons a single fit cannot be carried out. Recoverable: the sweep skips the iteration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClusterFitError {
    #[error("{points} points cannot be clustered with min_samples = {min_samples}")]
    TooFewPoints { points: usize, min_samples: usize },

    #[error("feature row {0} contains a non-finite coordinate")]
    NonFinite(usize),

    #[error("degenerate cluster hierarchy: {0}")]
    DegenerateHierarchy(String),
}

/// Labels and membership probabilities of one fit.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterRun {
    pub min_cluster_size: usize,
    /// Per point: cluster label `0..n_clusters`, or `NOISE`.
    pub labels: Vec<i32>,
    /// Per point: membership strength in `[0, 1]`; 0 for noise.
    pub probabilities: Vec<f64>,
}

impl ClusterRun {
    pub fn n_clusters(&self) -> usize {
        self.labels
            .iter()
            .copied()
            .max()
            .map_or(0, |max| usize::try_from(max + 1).unwrap_or(0))
    }

    pub fn is_all_noise(&self) -> bool {
        self.labels.iter().all(|&l| l == NOISE)
    }

    /// Points carrying `label` with membership probability of at least `min_probability`.
    pub fn members(&self, label: i32, min_probability: f64) -> Vec<usize> {
        self.labels
            .iter()
            .zip(&self.probabilities)
            .enumerate()
            .filter(|(_, (l, p))| **l == label && **p >= min_probability)
            .map(|(i, _)| i)
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
struct MstEdge {
    a: usize,
    b: usize,
    distance: f64,
}

#[derive(Debug, Clone, Copy)]
struct LinkageNode {
    left: usize,
    right: usize,
    distance: f64,
    size: usize,
}

/// One row of the condensed tree: `child` (point or cluster) leaves `parent` at `lambda`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct CondensedEdge {
    parent: usize,
    child: usize,
    lambda: f64,
    size: usize,
}

/// Union-find over the `2n - 1` nodes of the single-linkage hierarchy.
struct UnionFind {
    parent: Vec<usize>,
    size: Vec<usize>,
    next_label: usize,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        let total = 2 * n - 1;
        let mut size = vec![0; total];
        size[..n].fill(1);
        Self {
            parent: (0..total).collect(),
            size,
            next_label: n,
        }
    }

    fn find(&mut self, mut node: usize) -> usize {
        let mut root = node;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let label = self.next_label;
        self.parent[a] = label;
        self.parent[b] = label;
        self.size[label] = self.size[a] + self.size[b];
        self.next_label += 1;
    }
}

/// HDBSCAN parameters for one fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hdbscan {
    pub min_cluster_size: usize,
    pub min_samples: usize,
}

impl Hdbscan {
    /// `min_samples` follows `min_cluster_size`.
    pub fn new(min_cluster_size: usize) -> Self {
        Self {
            min_cluster_size,
            min_samples: min_cluster_size,
        }
    }

    /// Cluster the rows of `points` (one point per row, Euclidean metric).
    pub fn fit(&self, points: &DMatrix<f64>) -> Result<ClusterRun, ClusterFitError> {
        let n = points.nrows();
        let min_samples = self.min_samples.max(1);
        if n < 2 || n < min_samples || self.min_cluster_size < 2 {
            return Err(ClusterFitError::TooFewPoints {
                points: n,
                min_samples,
            });
        }
        if let Some(row) = (0..n).find(|&i| points.row(i).iter().any(|v| !v.is_finite())) {
            return Err(ClusterFitError::NonFinite(row));
        }

        let distances = pairwise_distances(points);
        let core = core_distances(&distances, min_samples);
        let mst = prim_mst(&distances, &core);
        let hierarchy = single_linkage(&mst, n);
        let condensed = self.condense(&hierarchy, n);
        let stability = stabilities(&condensed, n);
        if let Some(bad) = stability.iter().position(|s| s.is_nan()) {
            return Err(ClusterFitError::DegenerateHierarchy(format!(
                "stability of cluster {} is undefined",
                n + bad
            )));
        }
        let selected = select_clusters(&condensed, stability, n);
        let (labels, probabilities) = label_points(&condensed, &selected, n);

        Ok(ClusterRun {
            min_cluster_size: self.min_cluster_size,
            labels,
            probabilities,
        })
    }

    fn condense(&self, hierarchy: &[LinkageNode], n: usize) -> Vec<CondensedEdge> {
        let root = 2 * (n - 1);
        let size_of = |node: usize| if node < n { 1 } else { hierarchy[node - n].size };

        let mut relabel = vec![0usize; root + 1];
        relabel[root] = n;
        let mut next_label = n + 1;
        let mut ignore = vec![false; root + 1];
        let mut tree = Vec::with_capacity(2 * n);

        for node in bfs_hierarchy(hierarchy, root, n) {
            if node < n || ignore[node] {
                continue;
            }
            let link = hierarchy[node - n];
            let lambda = lambda_of(link.distance);
            let parent = relabel[node];
            let (left_size, right_size) = (size_of(link.left), size_of(link.right));
            let left_big = left_size >= self.min_cluster_size;
            let right_big = right_size >= self.min_cluster_size;

            // A branch too small to be a cluster sheds all of its points at this lambda.
            let mut shed = |branch: usize, tree: &mut Vec<CondensedEdge>| {
                for sub in bfs_hierarchy(hierarchy, branch, n) {
                    if sub < n {
                        tree.push(CondensedEdge {
                            parent,
                            child: sub,
                            lambda,
                            size: 1,
                        });
                    }
                    ignore[sub] = true;
                }
            };

            match (left_big, right_big) {
                (true, true) => {
                    for (child, size) in [(link.left, left_size), (link.right, right_size)] {
                        relabel[child] = next_label;
                        tree.push(CondensedEdge {
                            parent,
                            child: next_label,
                            lambda,
                            size,
                        });
                        next_label += 1;
                    }
                }
                (false, false) => {
                    shed(link.left, &mut tree);
                    shed(link.right, &mut tree);
                }
                (false, true) => {
                    relabel[link.right] = parent;
                    shed(link.left, &mut tree);
                }
                (true, false) => {
                    relabel[link.left] = parent;
                    shed(link.right, &mut tree);
                }
            }
        }
        tree
    }
}

fn lambda_of(distance: f64) -> f64 {
    if distance > 0.0 { 1.0 / distance } else { f64::INFINITY }
}

fn pairwise_distances(points: &DMatrix<f64>) -> DMatrix<f64> {
    let n = points.nrows();
    DMatrix::from_fn(n, n, |i, j| points.row(i).metric_distance(&points.row(j)))
}

fn core_distances(distances: &DMatrix<f64>, min_samples: usize) -> Vec<f64> {
    (0..distances.nrows())
        .map(|i| {
            let mut row: Vec<f64> = distances.row(i).iter().copied().collect();
            row.sort_by(f64::total_cmp);
            row[min_samples - 1]
        })
        .collect()
}

fn prim_mst(distances: &DMatrix<f64>, core: &[f64]) -> Vec<MstEdge> {
    let n = distances.nrows();
    let mut in_tree = vec![false; n];
    let mut best = vec![f64::INFINITY; n];
    let mut edges = Vec::with_capacity(n - 1);
    let mut current = 0;

    for _ in 1..n {
        in_tree[current] = true;
        let mut next = current;
        let mut next_distance = f64::INFINITY;
        for other in 0..n {
            if in_tree[other] {
                continue;
            }
            let reach = core[current].max(core[other]).max(distances[(current, other)]);
            if reach < best[other] {
                best[other] = reach;
            }
            if best[other] < next_distance || next == current {
                next = other;
                next_distance = best[other];
            }
        }
        edges.push(MstEdge {
            a: current,
            b: next,
            distance: next_distance,
        });
        current = next;
    }
    edges.sort_by(|x, y| x.distance.total_cmp(&y.distance));
    edges
}

fn single_linkage(mst: &[MstEdge], n: usize) -> Vec<LinkageNode> {
    let mut uf = UnionFind::new(n);
    mst.iter()
        .map(|edge| {
            let left = uf.find(edge.a);
            let right = uf.find(edge.b);
            let node = LinkageNode {
                left,
                right,
                distance: edge.distance,
                size: uf.size[left] + uf.size[right],
            };
            uf.union(left, right);
            node
        })
        .collect()
}

fn bfs_hierarchy(hierarchy: &[LinkageNode], root: usize, n: usize) -> Vec<usize> {
    let mut queue = VecDeque::from([root]);
    let mut order = Vec::new();
    while let Some(node) = queue.pop_front() {
        order.push(node);
        if node >= n {
            let link = hierarchy[node - n];
            queue.push_back(link.left);
            queue.push_back(link.right);
        }
    }
    order
}

/// Stability per cluster id `n + k`, indexed by `k`. The root is born at lambda 0.
fn stabilities(tree: &[CondensedEdge], n: usize) -> Vec<f64> {
    let n_clusters = tree
        .iter()
        .map(|e| e.parent.max(if e.child >= n { e.child } else { n }))
        .max()
        .map_or(1, |max| max - n + 1);

    let mut birth = vec![0.0; n_clusters];
    for e in tree.iter().filter(|e| e.child >= n) {
        birth[e.child - n] = e.lambda;
    }
    let mut stability = vec![0.0; n_clusters];
    for e in tree {
        stability[e.parent - n] += (e.lambda - birth[e.parent - n]) * e.size as f64;
    }
    stability
}

fn child_clusters(tree: &[CondensedEdge], cluster: usize, n: usize) -> impl Iterator<Item = usize> + '_ {
    tree.iter()
        .filter(move |e| e.parent == cluster && e.child >= n)
        .map(|e| e.child)
}

/// Excess-of-mass selection. Returns the selected cluster ids in ascending order.
fn select_clusters(tree: &[CondensedEdge], mut stability: Vec<f64>, n: usize) -> Vec<usize> {
    let n_clusters = stability.len();
    let mut is_cluster = vec![true; n_clusters];
    is_cluster[0] = false;

    for cluster in (n + 1..n + n_clusters).rev() {
        let subtree: f64 = child_clusters(tree, cluster, n).map(|c| stability[c - n]).sum();
        if subtree > stability[cluster - n] {
            is_cluster[cluster - n] = false;
            stability[cluster - n] = subtree;
        } else {
            let mut queue: VecDeque<usize> = child_clusters(tree, cluster, n).collect();
            while let Some(sub) = queue.pop_front() {
                is_cluster[sub - n] = false;
                queue.extend(child_clusters(tree, sub, n));
            }
        }
    }

    (0..n_clusters)
        .filter(|&k| is_cluster[k])
        .map(|k| n + k)
        .collect()
}

fn label_points(tree: &[CondensedEdge], selected: &[usize], n: usize) -> (Vec<i32>, Vec<f64>) {
    let total = tree.iter().map(|e| e.child.max(e.parent)).max().map_or(n + 1, |m| m + 1);
    let mut parent_of = vec![None; total];
    let mut point_lambda = vec![0.0; n];
    // Largest lambda at which anything leaves each cluster.
    let mut death = vec![0.0f64; total];
    for e in tree {
        parent_of[e.child] = Some(e.parent);
        if e.child < n {
            point_lambda[e.child] = e.lambda;
        }
        death[e.parent] = death[e.parent].max(e.lambda);
    }

    let mut labels = vec![NOISE; n];
    let mut probabilities = vec![0.0; n];
    for point in 0..n {
        let mut node = parent_of[point];
        while let Some(cluster) = node {
            if let Ok(label) = selected.binary_search(&cluster) {
                labels[point] = i32::try_from(label).unwrap_or(NOISE);
                let max_lambda = death[cluster];
                let lambda = point_lambda[point];
                probabilities[point] = if max_lambda == 0.0 || !lambda.is_finite() {
                    1.0
                } else {
                    lambda.min(max_lambda) / max_lambda
                };
                break;
            }
            node = parent_of[cluster];
        }
    }
    (labels, probabilities)
}
