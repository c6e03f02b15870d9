//! Случайный лес из деревьев решений

use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{FeatureError, Result};
use crate::models::{check_training_set, DecisionTreeClassifier, Estimator};

#[derive(Debug, Clone)]
pub struct RandomForestClassifier {
    n_trees: usize,
    max_depth: usize,
    seed: u64,
    trees: Vec<DecisionTreeClassifier>,
}

impl RandomForestClassifier {
    pub fn new(n_trees: usize) -> Self {
        Self {
            n_trees: n_trees.max(1),
            max_depth: 10,
            seed: 42,
            trees: Vec::new(),
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn n_trees(&self) -> usize {
        self.n_trees
    }
}

impl Default for RandomForestClassifier {
    fn default() -> Self {
        Self::new(100)
    }
}

impl Estimator for RandomForestClassifier {
    fn name(&self) -> &'static str {
        "random_forest"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
        check_training_set(x, y)?;

        let n_samples = x.nrows();
        // sqrt(n_features) признаков на узел
        let max_features = ((x.ncols() as f64).sqrt().floor() as usize).max(1);
        let mut rng = StdRng::seed_from_u64(self.seed);

        self.trees.clear();
        for _ in 0..self.n_trees {
            // Бутстрэп-выборка
            let indices: Vec<usize> = (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect();
            let x_sample = x.select(Axis(0), &indices);
            let y_sample = y.select(Axis(0), &indices);

            let mut tree = DecisionTreeClassifier::new()
                .with_max_depth(self.max_depth)
                .with_max_features(max_features)
                .with_seed(rng.gen());
            tree.fit(&x_sample, &y_sample)?;
            self.trees.push(tree);
        }

        tracing::debug!(
            trees = self.trees.len(),
            max_features,
            "Random forest trained"
        );
        Ok(())
    }

    /// Голосование большинством; при равенстве меньший класс
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
        if self.trees.is_empty() {
            return Err(FeatureError::InvalidConfig("Model not trained".to_string()));
        }
        let votes: Vec<Array1<usize>> = self
            .trees
            .iter()
            .map(|t| t.predict(x))
            .collect::<Result<_>>()?;
        let n_classes = votes
            .iter()
            .flat_map(|v| v.iter().copied())
            .max()
            .unwrap_or(0)
            + 1;

        Ok((0..x.nrows())
            .map(|row| {
                let mut counts = vec![0usize; n_classes];
                for v in &votes {
                    counts[v[row]] += 1;
                }
                let mut best = 0;
                for (class, &count) in counts.iter().enumerate() {
                    if count > counts[best] {
                        best = class;
                    }
                }
                best
            })
            .collect())
    }

    fn feature_importances(&self) -> Result<Array1<f64>> {
        let first = self
            .trees
            .first()
            .ok_or_else(|| FeatureError::InvalidConfig("Model not trained".to_string()))?;
        let mut total = first.feature_importances()?;
        for tree in &self.trees[1..] {
            total += &tree.feature_importances()?;
        }
        let sum = total.sum();
        if sum > 0.0 {
            total /= sum;
        }
        Ok(total)
    }
}
