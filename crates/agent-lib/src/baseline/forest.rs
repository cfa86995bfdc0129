//! Isolation forest anomaly scorer
//!
//! Anomalies are isolated by fewer random axis-aligned splits than normal
//! points. Each tree is grown on a random sub-sample; a point's score is the
//! normalized mean depth at which the trees isolate it. The decision
//! boundary is fixed at fit time from the contamination rate.

use crate::models::{Verdict, FEATURE_COUNT};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Euler–Mascheroni constant
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Standardized sample row
pub type Row = [f64; FEATURE_COUNT];

/// Forest hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    /// Upper bound on the per-tree sub-sample size
    pub max_samples: usize,
    /// Expected share of anomalies in the training data
    pub contamination: f64,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_samples: 256,
            contamination: 0.0001,
            seed: 42,
        }
    }
}

/// Flattened tree node; children always have a larger index than their parent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        size: usize,
    },
}

/// Single isolation tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    fn grow(data: &[Row], indices: &mut [usize], height_limit: usize, rng: &mut StdRng) -> Self {
        let mut nodes = Vec::new();
        build_node(&mut nodes, data, indices, 0, height_limit, rng);
        Self { nodes }
    }

    /// Depth of the leaf reached by `x`, adjusted for unresolved leaf size
    pub fn path_length(&self, x: &Row) -> f64 {
        let mut idx = 0;
        let mut depth = 0.0;
        loop {
            match &self.nodes[idx] {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if x[*feature] <= *threshold { *left } else { *right };
                    depth += 1.0;
                }
                Node::Leaf { size } => return depth + average_path_length(*size),
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn validate(&self) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            if let Node::Split {
                feature,
                threshold,
                left,
                right,
            } = node
            {
                if *feature >= FEATURE_COUNT {
                    return Err(format!("node {} splits on unknown feature {}", idx, feature));
                }
                if !threshold.is_finite() {
                    return Err(format!("node {} has a non-finite threshold", idx));
                }
                let in_range = |child: usize| child > idx && child < self.nodes.len();
                if !in_range(*left) || !in_range(*right) {
                    return Err(format!("node {} has out-of-order children", idx));
                }
            }
        }
        Ok(())
    }
}

fn build_node(
    nodes: &mut Vec<Node>,
    data: &[Row],
    indices: &mut [usize],
    depth: usize,
    height_limit: usize,
    rng: &mut StdRng,
) -> usize {
    let id = nodes.len();
    nodes.push(Node::Leaf {
        size: indices.len(),
    });

    if depth >= height_limit || indices.len() <= 1 {
        return id;
    }

    // Only features that still vary inside this node can split it
    let candidates: Vec<(usize, f64, f64)> = (0..FEATURE_COUNT)
        .filter_map(|f| {
            let (lo, hi) = indices.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
                (lo.min(data[i][f]), hi.max(data[i][f]))
            });
            (lo < hi).then_some((f, lo, hi))
        })
        .collect();
    if candidates.is_empty() {
        return id;
    }

    let (feature, lo, hi) = candidates[rng.gen_range(0..candidates.len())];
    let threshold = rng.gen_range(lo..hi);

    // Partition in place: values <= threshold first
    let mut split = 0;
    for k in 0..indices.len() {
        if data[indices[k]][feature] <= threshold {
            indices.swap(split, k);
            split += 1;
        }
    }

    let (left_part, right_part) = indices.split_at_mut(split);
    let left = build_node(nodes, data, left_part, depth + 1, height_limit, rng);
    let right = build_node(nodes, data, right_part, depth + 1, height_limit, rng);

    nodes[id] = Node::Split {
        feature,
        threshold,
        left,
        right,
    };
    id
}

/// Average path length of an unsuccessful BST search over `n` points
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Fitted isolation forest with its decision offset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationForest {
    pub params: ForestParams,
    /// Sub-sample size actually used per tree
    pub sample_size: usize,
    /// Score at the contamination percentile of the training data
    pub offset: f64,
    trees: Vec<IsolationTree>,
}

impl IsolationForest {
    /// Fit on standardized rows. Returns `None` for empty input.
    pub fn fit(data: &[Row], params: ForestParams) -> Option<Self> {
        if data.is_empty() {
            return None;
        }

        let sample_size = params.max_samples.clamp(1, data.len());
        let height_limit = (sample_size.max(2) as f64).log2().ceil() as usize;
        let mut rng = StdRng::seed_from_u64(params.seed);

        let trees = (0..params.n_estimators.max(1))
            .map(|_| {
                let mut indices =
                    rand::seq::index::sample(&mut rng, data.len(), sample_size).into_vec();
                IsolationTree::grow(data, &mut indices, height_limit, &mut rng)
            })
            .collect();

        let mut forest = Self {
            params,
            sample_size,
            offset: 0.0,
            trees,
        };

        let mut training_scores: Vec<f64> = data.iter().map(|x| forest.score_sample(x)).collect();
        forest.offset = percentile(&mut training_scores, forest.params.contamination * 100.0);
        Some(forest)
    }

    /// Opposite of the anomaly score: in [-1, 0), higher is more normal
    pub fn score_sample(&self, x: &Row) -> f64 {
        let mean_depth =
            self.trees.iter().map(|t| t.path_length(x)).sum::<f64>() / self.trees.len() as f64;
        let normalizer = average_path_length(self.sample_size).max(f64::EPSILON);
        -(2f64.powf(-mean_depth / normalizer))
    }

    /// Signed margin from the decision boundary; negative means anomalous
    pub fn decision_function(&self, x: &Row) -> f64 {
        self.score_sample(x) - self.offset
    }

    pub fn predict(&self, x: &Row) -> Verdict {
        if self.decision_function(x) < 0.0 {
            Verdict::Anomaly
        } else {
            Verdict::Normal
        }
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    /// Total nodes across all trees
    pub fn node_count(&self) -> usize {
        self.trees.iter().map(IsolationTree::node_count).sum()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.trees.is_empty() {
            return Err("forest has no trees".to_string());
        }
        if !self.offset.is_finite() {
            return Err("forest offset is not finite".to_string());
        }
        if self.sample_size == 0 {
            return Err("forest sample size is zero".to_string());
        }
        self.trees.iter().try_for_each(IsolationTree::validate)
    }
}

/// Linear-interpolated percentile; sorts `values` in place
fn percentile(values: &mut [f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let rank = (p / 100.0).clamp(0.0, 1.0) * (values.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    values[lo] + (values[hi] - values[lo]) * frac
}
