//! Gradient-boosted regression trees.
//!
//! Shared ensemble backing both the demand regressor and the late-delivery
//! classifier. Trees are fit to loss gradients with exact variance-reduction
//! splits; row and column subsampling are driven by a seeded RNG so training
//! is reproducible.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Ensemble hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GbdtParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    /// Fraction of rows sampled (without replacement) per tree.
    pub subsample: f64,
    /// Fraction of features sampled per tree.
    pub colsample: f64,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

impl Default for GbdtParams {
    fn default() -> Self {
        Self {
            n_trees: 200,
            max_depth: 6,
            learning_rate: 0.05,
            subsample: 0.8,
            colsample: 0.8,
            min_samples_leaf: 5,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Node {
    feature: usize,
    threshold: f64,
    left: usize,
    right: usize,
    value: f64,
    is_leaf: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn predict(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            let node = &self.nodes[idx];
            if node.is_leaf {
                return node.value;
            }
            idx = if row[node.feature] <= node.threshold {
                node.left
            } else {
                node.right
            };
        }
    }
}

struct TreeBuilder<'a> {
    x: &'a [Vec<f64>],
    target: &'a [f64],
    weights: &'a [f64],
    features: &'a [usize],
    max_depth: usize,
    min_samples_leaf: usize,
    nodes: Vec<Node>,
    /// Accumulated split gain per feature, for importances.
    gains: &'a mut [f64],
}

impl TreeBuilder<'_> {
    fn weighted_leaf(&self, rows: &[usize]) -> f64 {
        let mut sum = 0.0;
        let mut w = 0.0;
        for &i in rows {
            sum += self.weights[i] * self.target[i];
            w += self.weights[i];
        }
        if w > 0.0 {
            sum / w
        } else {
            0.0
        }
    }

    fn push_leaf(&mut self, rows: &[usize]) -> usize {
        let value = self.weighted_leaf(rows);
        self.nodes.push(Node {
            feature: 0,
            threshold: 0.0,
            left: 0,
            right: 0,
            value,
            is_leaf: true,
        });
        self.nodes.len() - 1
    }

    /// Best split over the sampled features by weighted variance reduction.
    fn best_split(&self, rows: &[usize]) -> Option<(usize, f64, f64)> {
        let mut total_sum = 0.0;
        let mut total_w = 0.0;
        for &i in rows {
            total_sum += self.weights[i] * self.target[i];
            total_w += self.weights[i];
        }
        if total_w <= 0.0 {
            return None;
        }
        let base_score = total_sum * total_sum / total_w;

        let mut best: Option<(usize, f64, f64)> = None;
        let mut sorted = rows.to_vec();

        for &feature in self.features {
            sorted.sort_by(|&a, &b| self.x[a][feature].total_cmp(&self.x[b][feature]));

            let mut left_sum = 0.0;
            let mut left_w = 0.0;
            for (pos, &i) in sorted.iter().enumerate().take(sorted.len() - 1) {
                left_sum += self.weights[i] * self.target[i];
                left_w += self.weights[i];

                let here = self.x[i][feature];
                let next = self.x[sorted[pos + 1]][feature];
                if here == next {
                    continue;
                }
                if pos + 1 < self.min_samples_leaf || sorted.len() - pos - 1 < self.min_samples_leaf
                {
                    continue;
                }

                let right_sum = total_sum - left_sum;
                let right_w = total_w - left_w;
                if left_w <= 0.0 || right_w <= 0.0 {
                    continue;
                }
                let gain =
                    left_sum * left_sum / left_w + right_sum * right_sum / right_w - base_score;
                if gain > best.map_or(1e-12, |(_, _, g)| g) {
                    best = Some((feature, (here + next) / 2.0, gain));
                }
            }
        }
        best
    }

    fn build(&mut self, rows: &[usize], depth: usize) -> usize {
        if depth >= self.max_depth || rows.len() < 2 * self.min_samples_leaf {
            return self.push_leaf(rows);
        }
        let Some((feature, threshold, gain)) = self.best_split(rows) else {
            return self.push_leaf(rows);
        };
        self.gains[feature] += gain;

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
            rows.iter().partition(|&&i| self.x[i][feature] <= threshold);

        // Reserve the split node before recursing so child indices are stable.
        self.nodes.push(Node {
            feature,
            threshold,
            left: 0,
            right: 0,
            value: 0.0,
            is_leaf: false,
        });
        let node_idx = self.nodes.len() - 1;
        let left = self.build(&left_rows, depth + 1);
        let right = self.build(&right_rows, depth + 1);
        self.nodes[node_idx].left = left;
        self.nodes[node_idx].right = right;
        node_idx
    }
}

fn fit_tree(
    x: &[Vec<f64>],
    target: &[f64],
    weights: &[f64],
    params: &GbdtParams,
    rng: &mut StdRng,
    gains: &mut [f64],
) -> Tree {
    let n_rows = x.len();
    let n_features = x[0].len();

    let mut rows: Vec<usize> = (0..n_rows).collect();
    rows.shuffle(rng);
    let sampled_rows = ((n_rows as f64 * params.subsample).round() as usize).clamp(1, n_rows);
    rows.truncate(sampled_rows);

    let mut features: Vec<usize> = (0..n_features).collect();
    features.shuffle(rng);
    let sampled_cols =
        ((n_features as f64 * params.colsample).round() as usize).clamp(1, n_features);
    features.truncate(sampled_cols);

    let mut builder = TreeBuilder {
        x,
        target,
        weights,
        features: &features,
        max_depth: params.max_depth,
        min_samples_leaf: params.min_samples_leaf,
        nodes: Vec::new(),
        gains,
    };
    // The root is always node 0; build() pushes it first on this path.
    builder.build(&rows, 0);
    Tree {
        nodes: builder.nodes,
    }
}

/// Gradient-boosted regressor with squared loss.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GbdtRegressor {
    params: GbdtParams,
    base_score: f64,
    trees: Vec<Tree>,
    feature_gains: Vec<f64>,
}

impl GbdtRegressor {
    pub fn fit(x: &[Vec<f64>], y: &[f64], params: GbdtParams) -> Self {
        debug_assert_eq!(x.len(), y.len());
        let base_score = crate::ml::metrics::mean(y);
        let weights = vec![1.0; x.len()];
        let mut gains = vec![0.0; x[0].len()];
        let mut rng = StdRng::seed_from_u64(params.seed);

        let mut predictions = vec![base_score; x.len()];
        let mut trees = Vec::with_capacity(params.n_trees);
        let mut residuals = vec![0.0; x.len()];

        for _ in 0..params.n_trees {
            for i in 0..x.len() {
                residuals[i] = y[i] - predictions[i];
            }
            let tree = fit_tree(x, &residuals, &weights, &params, &mut rng, &mut gains);
            for (i, row) in x.iter().enumerate() {
                predictions[i] += params.learning_rate * tree.predict(row);
            }
            trees.push(tree);
        }

        Self {
            params,
            base_score,
            trees,
            feature_gains: gains,
        }
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut score = self.base_score;
        for tree in &self.trees {
            score += self.params.learning_rate * tree.predict(row);
        }
        score
    }

    pub fn predict_batch(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter().map(|r| self.predict(r)).collect()
    }

    /// Normalized total split gain per feature.
    pub fn feature_importances(&self) -> Vec<f64> {
        normalize_gains(&self.feature_gains)
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Gradient-boosted binary classifier with logistic loss.
///
/// `scale_pos_weight` multiplies the sample weight of positive rows, the
/// standard correction when the positive class is the minority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GbdtClassifier {
    params: GbdtParams,
    base_score: f64,
    trees: Vec<Tree>,
    feature_gains: Vec<f64>,
}

impl GbdtClassifier {
    pub fn fit(x: &[Vec<f64>], y: &[u8], scale_pos_weight: f64, params: GbdtParams) -> Self {
        debug_assert_eq!(x.len(), y.len());
        let weights: Vec<f64> = y
            .iter()
            .map(|&label| if label == 1 { scale_pos_weight } else { 1.0 })
            .collect();

        let pos: f64 = y
            .iter()
            .zip(&weights)
            .filter(|(&l, _)| l == 1)
            .map(|(_, w)| w)
            .sum();
        let neg: f64 = y
            .iter()
            .zip(&weights)
            .filter(|(&l, _)| l == 0)
            .map(|(_, w)| w)
            .sum();
        let base_score = if pos > 0.0 && neg > 0.0 {
            (pos / neg).ln()
        } else {
            0.0
        };

        let mut gains = vec![0.0; x[0].len()];
        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut raw_scores = vec![base_score; x.len()];
        let mut trees = Vec::with_capacity(params.n_trees);
        let mut residuals = vec![0.0; x.len()];

        for _ in 0..params.n_trees {
            for i in 0..x.len() {
                residuals[i] = y[i] as f64 - sigmoid(raw_scores[i]);
            }
            let tree = fit_tree(x, &residuals, &weights, &params, &mut rng, &mut gains);
            for (i, row) in x.iter().enumerate() {
                raw_scores[i] += params.learning_rate * tree.predict(row);
            }
            trees.push(tree);
        }

        Self {
            params,
            base_score,
            trees,
            feature_gains: gains,
        }
    }

    /// Probability of the positive (late) class.
    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        let mut score = self.base_score;
        for tree in &self.trees {
            score += self.params.learning_rate * tree.predict(row);
        }
        sigmoid(score)
    }

    pub fn predict(&self, row: &[f64]) -> u8 {
        u8::from(self.predict_proba(row) > 0.5)
    }

    pub fn feature_importances(&self) -> Vec<f64> {
        normalize_gains(&self.feature_gains)
    }
}

fn normalize_gains(gains: &[f64]) -> Vec<f64> {
    let total: f64 = gains.iter().sum();
    if total <= 0.0 {
        return vec![0.0; gains.len()];
    }
    gains.iter().map(|g| g / total).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_params(n_trees: usize) -> GbdtParams {
        GbdtParams {
            n_trees,
            max_depth: 3,
            learning_rate: 0.3,
            subsample: 1.0,
            colsample: 1.0,
            min_samples_leaf: 1,
            seed: 42,
        }
    }

    #[test]
    fn regressor_learns_a_step_function() {
        let x: Vec<Vec<f64>> = (0..40).map(|i| vec![i as f64]).collect();
        let y: Vec<f64> = (0..40).map(|i| if i < 20 { 5.0 } else { 25.0 }).collect();

        let model = GbdtRegressor::fit(&x, &y, small_params(50));
        assert!((model.predict(&[5.0]) - 5.0).abs() < 1.0);
        assert!((model.predict(&[35.0]) - 25.0).abs() < 1.0);
    }

    #[test]
    fn regressor_is_deterministic_for_a_fixed_seed() {
        let x: Vec<Vec<f64>> = (0..30).map(|i| vec![i as f64, (i * 7 % 13) as f64]).collect();
        let y: Vec<f64> = (0..30).map(|i| (i * i) as f64).collect();

        let a = GbdtRegressor::fit(&x, &y, GbdtParams::default());
        let b = GbdtRegressor::fit(&x, &y, GbdtParams::default());
        assert_eq!(a.predict(&[12.0, 3.0]), b.predict(&[12.0, 3.0]));
    }

    #[test]
    fn classifier_separates_linearly_separable_classes() {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..30 {
            x.push(vec![i as f64]);
            y.push(u8::from(i >= 15));
        }

        let model = GbdtClassifier::fit(&x, &y, 1.0, small_params(50));
        assert!(model.predict_proba(&[2.0]) < 0.2);
        assert!(model.predict_proba(&[28.0]) > 0.8);
        assert_eq!(model.predict(&[2.0]), 0);
        assert_eq!(model.predict(&[28.0]), 1);
    }

    #[test]
    fn importances_sum_to_one_and_favor_the_informative_feature() {
        let x: Vec<Vec<f64>> = (0..40).map(|i| vec![i as f64, 1.0]).collect();
        let y: Vec<f64> = (0..40).map(|i| i as f64 * 2.0).collect();

        let model = GbdtRegressor::fit(&x, &y, small_params(20));
        let importances = model.feature_importances();
        assert!((importances.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(importances[0] > importances[1]);
    }
}
