//! Isolation forest internals.
//!
//! An ensemble of randomized partitioning trees over the fixed-order
//! numeric feature space. Points that need fewer random splits to
//! isolate score higher (more anomalous). Given a fixed seed the grown
//! forest, and therefore every score, is fully reproducible.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::models::FEATURE_COUNT;

/// Standard subsample size from the isolation forest literature
pub const DEFAULT_SUBSAMPLE: usize = 256;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    /// Grow one tree over a subsample, splitting on a random feature
    /// with value spread at a uniform random threshold.
    fn grow(samples: &[[f64; FEATURE_COUNT]], height_limit: usize, rng: &mut StdRng) -> Self {
        let mut tree = Tree { nodes: Vec::new() };
        let indices: Vec<usize> = (0..samples.len()).collect();
        tree.grow_node(samples, &indices, 0, height_limit, rng);
        tree
    }

    fn grow_node(
        &mut self,
        samples: &[[f64; FEATURE_COUNT]],
        indices: &[usize],
        depth: usize,
        height_limit: usize,
        rng: &mut StdRng,
    ) -> usize {
        if indices.len() <= 1 || depth >= height_limit {
            self.nodes.push(Node::Leaf {
                size: indices.len(),
            });
            return self.nodes.len() - 1;
        }

        // Only features with spread in this partition are splittable
        let splittable: Vec<(usize, f64, f64)> = (0..FEATURE_COUNT)
            .filter_map(|f| {
                let mut min = f64::INFINITY;
                let mut max = f64::NEG_INFINITY;
                for &i in indices {
                    min = min.min(samples[i][f]);
                    max = max.max(samples[i][f]);
                }
                (max > min).then_some((f, min, max))
            })
            .collect();

        let Some(&(feature, min, max)) = splittable.choose(rng) else {
            self.nodes.push(Node::Leaf {
                size: indices.len(),
            });
            return self.nodes.len() - 1;
        };

        let threshold = rng.gen_range(min..max);
        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| samples[i][feature] < threshold);

        // Reserve the split slot before recursing so child offsets land after it
        let slot = self.nodes.len();
        self.nodes.push(Node::Leaf { size: 0 });
        let left = self.grow_node(samples, &left_idx, depth + 1, height_limit, rng);
        let right = self.grow_node(samples, &right_idx, depth + 1, height_limit, rng);
        self.nodes[slot] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        slot
    }

    /// Path length from the root to the leaf holding `point`, with the
    /// standard adjustment for unresolved leaves.
    fn path_length(&self, point: &[f64; FEATURE_COUNT]) -> f64 {
        let mut node = 0usize;
        let mut depth = 0f64;
        loop {
            match &self.nodes[node] {
                Node::Leaf { size } => return depth + average_path_length(*size),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if point[*feature] < *threshold {
                        *left
                    } else {
                        *right
                    };
                    depth += 1.0;
                }
            }
        }
    }
}

/// Expected path length of an unsuccessful BST search over n points;
/// normalizes raw depths into the (0, 1] anomaly score.
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// A fully grown isolation forest. Immutable after `fit`.
#[derive(Debug, Clone)]
pub struct IsolationForest {
    trees: Vec<Tree>,
    subsample: usize,
}

impl IsolationForest {
    /// Fit an ensemble of `n_trees` trees, each grown on a random
    /// subsample of at most `DEFAULT_SUBSAMPLE` points.
    ///
    /// `keep_going` is polled between trees; an abandoned fit returns
    /// `None` and nothing partial escapes.
    pub fn fit(
        data: &[[f64; FEATURE_COUNT]],
        n_trees: usize,
        seed: u64,
        keep_going: impl Fn() -> bool,
    ) -> Option<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        let subsample = DEFAULT_SUBSAMPLE.min(data.len());
        let height_limit = (subsample as f64).log2().ceil().max(1.0) as usize;

        let mut trees = Vec::with_capacity(n_trees);
        let mut indices: Vec<usize> = (0..data.len()).collect();
        for _ in 0..n_trees {
            if !keep_going() {
                return None;
            }
            indices.shuffle(&mut rng);
            let sample: Vec<[f64; FEATURE_COUNT]> =
                indices[..subsample].iter().map(|&i| data[i]).collect();
            trees.push(Tree::grow(&sample, height_limit, &mut rng));
        }

        Some(IsolationForest { trees, subsample })
    }

    /// Anomaly score in (0, 1]: `2^(-E[h(x)] / c(subsample))`.
    /// Higher means fewer splits to isolate, i.e. more anomalous.
    pub fn score(&self, point: &[f64; FEATURE_COUNT]) -> f64 {
        let mean_path: f64 = self
            .trees
            .iter()
            .map(|t| t.path_length(point))
            .sum::<f64>()
            / self.trees.len() as f64;
        let c = average_path_length(self.subsample).max(1.0);
        2f64.powf(-mean_path / c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Clustered "normal" vectors with mild jitter plus controllable outliers
    fn normal_point(i: usize) -> [f64; FEATURE_COUNT] {
        let mut p = [0.0; FEATURE_COUNT];
        p[0] = 3.0 + (i % 3) as f64; // attempt_count
        p[1] = (i % 2) as f64; // failure_count
        p[2] = p[1] / p[0]; // failure_ratio
        p[3] = 1.0 + (i % 2) as f64; // distinct ips
        p[4] = 1.0;
        p[5] = 1.0;
        p[6] = 1.0;
        p[7] = 60.0 + (i % 7) as f64 * 10.0;
        p[8] = 0.5;
        p[9] = 0.8;
        p[12] = 86_400.0;
        p
    }

    fn outlier_point() -> [f64; FEATURE_COUNT] {
        let mut p = [0.0; FEATURE_COUNT];
        p[0] = 20.0;
        p[1] = 20.0;
        p[2] = 1.0;
        p[3] = 15.0;
        p[4] = 8.0;
        p[5] = 4.0;
        p[6] = 6.0;
        p[7] = 86_400.0;
        p[10] = 15.0;
        p[11] = 8.0;
        p[12] = 30.0;
        p
    }

    fn training() -> Vec<[f64; FEATURE_COUNT]> {
        (0..200).map(normal_point).collect()
    }

    #[test]
    fn test_outlier_scores_higher() {
        let data = training();
        let forest = IsolationForest::fit(&data, 100, 42, || true).unwrap();

        let normal_scores: Vec<f64> = data.iter().map(|p| forest.score(p)).collect();
        let max_normal = normal_scores.iter().cloned().fold(f64::MIN, f64::max);
        let outlier = forest.score(&outlier_point());

        assert!(
            outlier > max_normal,
            "outlier {} should exceed max normal {}",
            outlier,
            max_normal
        );
    }

    #[test]
    fn test_scores_in_unit_interval() {
        let data = training();
        let forest = IsolationForest::fit(&data, 50, 7, || true).unwrap();
        for p in &data {
            let s = forest.score(p);
            assert!(s > 0.0 && s <= 1.0, "score {} out of range", s);
        }
    }

    #[test]
    fn test_fixed_seed_is_deterministic() {
        let data = training();
        let a = IsolationForest::fit(&data, 50, 42, || true).unwrap();
        let b = IsolationForest::fit(&data, 50, 42, || true).unwrap();

        let p = outlier_point();
        assert_eq!(a.score(&p), b.score(&p));
        assert_eq!(a.score(&data[3]), b.score(&data[3]));
    }

    #[test]
    fn test_cancelled_fit_returns_none() {
        let data = training();
        assert!(IsolationForest::fit(&data, 50, 42, || false).is_none());
    }

    #[test]
    fn test_average_path_length_monotone() {
        assert_eq!(average_path_length(0), 0.0);
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        assert!(average_path_length(256) > average_path_length(16));
    }
}
