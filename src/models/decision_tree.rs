//! Дерево решений (классификация, критерий Джини)

use ndarray::{Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::{FeatureError, Result};
use crate::models::{check_training_set, Estimator};

#[derive(Debug, Clone)]
enum TreeNode {
    Leaf {
        class: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

fn class_counts(y: &Array1<usize>, indices: &[usize], n_classes: usize) -> Vec<usize> {
    let mut counts = vec![0; n_classes];
    for &i in indices {
        counts[y[i]] += 1;
    }
    counts
}

fn gini(counts: &[usize], n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let n = n as f64;
    1.0 - counts
        .iter()
        .map(|&c| (c as f64 / n).powi(2))
        .sum::<f64>()
}

/// Самый частый класс; при равенстве меньший индекс
fn majority(counts: &[usize]) -> usize {
    let mut best = 0;
    for (class, &count) in counts.iter().enumerate() {
        if count > counts[best] {
            best = class;
        }
    }
    best
}

#[derive(Debug, Clone)]
pub struct DecisionTreeClassifier {
    max_depth: usize,
    min_samples_split: usize,
    max_features: Option<usize>,
    seed: u64,
    root: Option<TreeNode>,
    n_features: usize,
    importances: Option<Array1<f64>>,
}

impl DecisionTreeClassifier {
    pub fn new() -> Self {
        Self {
            max_depth: 10,
            min_samples_split: 2,
            max_features: None,
            seed: 42,
            root: None,
            n_features: 0,
            importances: None,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_min_samples_split(mut self, min_samples_split: usize) -> Self {
        self.min_samples_split = min_samples_split.max(2);
        self
    }

    /// Число случайных признаков, перебираемых в каждом узле
    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features.max(1));
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn candidate_features(&self, rng: &mut StdRng) -> Vec<usize> {
        match self.max_features {
            Some(m) if m < self.n_features => {
                let mut features = rand::seq::index::sample(rng, self.n_features, m).into_vec();
                features.sort_unstable();
                features
            }
            _ => (0..self.n_features).collect(),
        }
    }

    fn best_split(
        &self,
        x: &Array2<f64>,
        y: &Array1<usize>,
        indices: &[usize],
        parent_counts: &[usize],
        features: &[usize],
    ) -> Option<BestSplit> {
        let n = indices.len();
        let mut best: Option<BestSplit> = None;

        for &feature in features {
            let mut order = indices.to_vec();
            order.sort_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));

            let mut left = vec![0; parent_counts.len()];
            for i in 0..n - 1 {
                left[y[order[i]]] += 1;
                let value = x[[order[i], feature]];
                let next = x[[order[i + 1], feature]];
                if next <= value {
                    continue;
                }

                let n_left = i + 1;
                let n_right = n - n_left;
                let right: Vec<usize> = parent_counts
                    .iter()
                    .zip(&left)
                    .map(|(p, l)| p - l)
                    .collect();
                let impurity = (n_left as f64 * gini(&left, n_left)
                    + n_right as f64 * gini(&right, n_right))
                    / n as f64;

                if best
                    .as_ref()
                    .map_or(true, |b| impurity < b.impurity - 1e-12)
                {
                    best = Some(BestSplit {
                        feature,
                        threshold: (value + next) / 2.0,
                        impurity,
                    });
                }
            }
        }
        best
    }

    #[allow(clippy::too_many_arguments)]
    fn build_tree(
        &self,
        x: &Array2<f64>,
        y: &Array1<usize>,
        n_classes: usize,
        depth: usize,
        indices: Vec<usize>,
        importances: &mut Array1<f64>,
        rng: &mut StdRng,
    ) -> TreeNode {
        let counts = class_counts(y, &indices, n_classes);
        let leaf = TreeNode::Leaf {
            class: majority(&counts),
        };

        let parent = gini(&counts, indices.len());
        if depth >= self.max_depth || indices.len() < self.min_samples_split || parent <= 0.0 {
            return leaf;
        }

        let features = self.candidate_features(rng);
        let improves =
            |s: &Option<BestSplit>| s.as_ref().map_or(false, |s| parent - s.impurity > 1e-12);
        let mut split = self.best_split(x, y, &indices, &counts, &features);
        if !improves(&split) && features.len() < self.n_features {
            // среди случайных признаков не нашлось порога, перебираем все
            let all: Vec<usize> = (0..self.n_features).collect();
            split = self.best_split(x, y, &indices, &counts, &all);
        }
        let split = match split {
            Some(split) if parent - split.impurity > 1e-12 => split,
            _ => return leaf,
        };

        importances[split.feature] += indices.len() as f64 * (parent - split.impurity);

        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| x[[i, split.feature]] <= split.threshold);

        TreeNode::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: Box::new(self.build_tree(x, y, n_classes, depth + 1, left, importances, rng)),
            right: Box::new(self.build_tree(x, y, n_classes, depth + 1, right, importances, rng)),
        }
    }

    fn predict_single(&self, node: &TreeNode, sample: ArrayView1<f64>) -> usize {
        match node {
            TreeNode::Leaf { class } => *class,
            TreeNode::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if sample[*feature] <= *threshold {
                    self.predict_single(left, sample)
                } else {
                    self.predict_single(right, sample)
                }
            }
        }
    }
}

impl Default for DecisionTreeClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Estimator for DecisionTreeClassifier {
    fn name(&self) -> &'static str {
        "decision_tree"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
        check_training_set(x, y)?;

        self.n_features = x.ncols();
        let n_classes = y.iter().copied().max().unwrap_or(0) + 1;
        let mut importances = Array1::zeros(self.n_features);
        let mut rng = StdRng::seed_from_u64(self.seed);

        let root = self.build_tree(
            x,
            y,
            n_classes,
            0,
            (0..x.nrows()).collect(),
            &mut importances,
            &mut rng,
        );

        let total = importances.sum();
        if total > 0.0 {
            importances /= total;
        }
        self.root = Some(root);
        self.importances = Some(importances);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
        let root = self
            .root
            .as_ref()
            .ok_or_else(|| FeatureError::InvalidConfig("Model not trained".to_string()))?;
        if x.ncols() != self.n_features {
            return Err(FeatureError::InvalidConfig(format!(
                "Model was trained on {} features, got {}",
                self.n_features,
                x.ncols()
            )));
        }
        Ok(x.rows()
            .into_iter()
            .map(|row| self.predict_single(root, row))
            .collect())
    }

    fn feature_importances(&self) -> Result<Array1<f64>> {
        self.importances
            .clone()
            .ok_or_else(|| FeatureError::InvalidConfig("Model not trained".to_string()))
    }
}
