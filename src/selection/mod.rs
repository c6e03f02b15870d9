//! Отбор признаков: статистические оценки, рекурсивное исключение, важность по модели

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{FeatureError, Result};
use crate::models::Estimator;
use crate::observer::{Emitter, TransformObserver};
use crate::types::{OrderedScalar, Table};

/// Число корзин для оценки взаимной информации
const MI_BINS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreFunction {
    /// F-статистика однофакторного дисперсионного анализа
    FClassif,
    Chi2,
    MutualInfo,
}

impl ScoreFunction {
    pub fn name(&self) -> &'static str {
        match self {
            ScoreFunction::FClassif => "f_classif",
            ScoreFunction::Chi2 => "chi2",
            ScoreFunction::MutualInfo => "mutual_info",
        }
    }

    /// Оценка каждой колонки `x`; классы `y` в `0..n_classes`
    pub fn score(
        &self,
        x: &Array2<f64>,
        y: &Array1<usize>,
        n_classes: usize,
    ) -> Result<Vec<f64>> {
        match self {
            ScoreFunction::FClassif => Ok(x
                .axis_iter(Axis(1))
                .map(|col| f_statistic(&col.to_vec(), y, n_classes))
                .collect()),
            ScoreFunction::Chi2 => {
                if x.iter().any(|v| *v < 0.0) {
                    return Err(FeatureError::InvalidConfig(
                        "chi2 requires non-negative feature values".to_string(),
                    ));
                }
                Ok(x
                    .axis_iter(Axis(1))
                    .map(|col| chi_square(&col.to_vec(), y, n_classes))
                    .collect())
            }
            ScoreFunction::MutualInfo => Ok(x
                .axis_iter(Axis(1))
                .map(|col| mutual_information(&col.to_vec(), y, n_classes))
                .collect()),
        }
    }
}

impl fmt::Display for ScoreFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ScoreFunction {
    type Err = FeatureError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "f_classif" | "anova" | "f" => Ok(ScoreFunction::FClassif),
            "chi2" | "chi_square" => Ok(ScoreFunction::Chi2),
            "mutual_info" | "mutual_info_classif" | "mi" => Ok(ScoreFunction::MutualInfo),
            _ => Err(FeatureError::UnknownMethod {
                kind: "score function",
                name: s.to_string(),
            }),
        }
    }
}

fn f_statistic(values: &[f64], y: &Array1<usize>, n_classes: usize) -> f64 {
    let n = values.len();
    let mut sums = vec![0.0; n_classes];
    let mut counts = vec![0usize; n_classes];
    for (v, &c) in values.iter().zip(y.iter()) {
        sums[c] += v;
        counts[c] += 1;
    }
    let groups = counts.iter().filter(|&&c| c > 0).count();
    if groups < 2 || n <= groups {
        return f64::NAN;
    }

    let grand_mean = values.iter().sum::<f64>() / n as f64;
    let means: Vec<f64> = sums
        .iter()
        .zip(&counts)
        .map(|(s, &c)| if c > 0 { s / c as f64 } else { 0.0 })
        .collect();

    let between: f64 = means
        .iter()
        .zip(&counts)
        .map(|(m, &c)| c as f64 * (m - grand_mean).powi(2))
        .sum();
    let within: f64 = values
        .iter()
        .zip(y.iter())
        .map(|(v, &c)| (v - means[c]).powi(2))
        .sum();

    let between = between / (groups - 1) as f64;
    let within = within / (n - groups) as f64;
    between / within
}

fn chi_square(values: &[f64], y: &Array1<usize>, n_classes: usize) -> f64 {
    let n = values.len() as f64;
    let total: f64 = values.iter().sum();
    let mut observed = vec![0.0; n_classes];
    let mut class_counts = vec![0usize; n_classes];
    for (v, &c) in values.iter().zip(y.iter()) {
        observed[c] += v;
        class_counts[c] += 1;
    }
    observed
        .iter()
        .zip(&class_counts)
        .filter(|(_, count)| **count > 0)
        .map(|(obs, &count)| {
            let expected = total * count as f64 / n;
            (obs - expected).powi(2) / expected
        })
        .sum()
}

fn mutual_information(values: &[f64], y: &Array1<usize>, n_classes: usize) -> f64 {
    let n = values.len();
    if n == 0 {
        return f64::NAN;
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let width = (max - min) / MI_BINS as f64;

    let mut joint = vec![vec![0usize; n_classes]; MI_BINS];
    for (v, &c) in values.iter().zip(y.iter()) {
        let bin = if width > 0.0 {
            (((v - min) / width) as usize).min(MI_BINS - 1)
        } else {
            0
        };
        joint[bin][c] += 1;
    }

    let n = n as f64;
    let bin_totals: Vec<usize> = joint.iter().map(|row| row.iter().sum()).collect();
    let class_totals: Vec<usize> = (0..n_classes)
        .map(|c| joint.iter().map(|row| row[c]).sum())
        .collect();

    let mut mi = 0.0;
    for (b, row) in joint.iter().enumerate() {
        for (c, &count) in row.iter().enumerate() {
            if count == 0 {
                continue;
            }
            let p_joint = count as f64 / n;
            let p_bin = bin_totals[b] as f64 / n;
            let p_class = class_totals[c] as f64 / n;
            mi += p_joint * (p_joint / (p_bin * p_class)).ln();
        }
    }
    mi.max(0.0)
}

/// Индексы по убыванию оценки; NaN в конце, при равенстве исходный порядок
fn rank_descending(scores: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| match (scores[a].is_nan(), scores[b].is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => scores[b].total_cmp(&scores[a]),
    });
    order
}

/// Числовая матрица признаков и закодированная цель
struct TrainingSet {
    x: Array2<f64>,
    y: Array1<usize>,
    n_classes: usize,
}

#[derive(Debug)]
pub struct FeatureSelector {
    table: Table,
    target: String,
    features: Vec<String>,
    emitter: Emitter,
}

impl FeatureSelector {
    pub fn new(table: &Table, target: &str) -> Result<Self> {
        Self::with_observer(table, target, crate::observer::default_observer())
    }

    pub fn with_observer(
        table: &Table,
        target: &str,
        observer: Arc<dyn TransformObserver>,
    ) -> Result<Self> {
        let emitter = Emitter::new("feature_selection").with_observer(observer);
        table.column(target).map_err(|e| emitter.fail(e))?;

        let features = table
            .column_names()
            .into_iter()
            .filter(|name| *name != target)
            .map(str::to_string)
            .collect();
        emitter.info("Feature selector initialized with a table and target column");
        Ok(Self {
            table: table.clone(),
            target: target.to_string(),
            features,
            emitter,
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn feature_names(&self) -> &[String] {
        &self.features
    }

    fn training_set(&self, operation: &str) -> Result<TrainingSet> {
        if self.features.is_empty() {
            return Err(FeatureError::Degenerate(
                "No feature columns besides the target".to_string(),
            ));
        }

        let mut columns = Vec::with_capacity(self.features.len());
        for name in &self.features {
            let column = self.table.column(name)?;
            let values = column.data.numeric_values().ok_or_else(|| {
                FeatureError::type_mismatch(name, "numeric", column.kind())
            })?;
            let values: Option<Vec<f64>> = values.into_iter().collect();
            let values = values.ok_or_else(|| FeatureError::MissingValues {
                column: name.clone(),
                operation: operation.to_string(),
            })?;
            columns.push(values);
        }

        let target = &self.table.column(&self.target)?.data;
        let cells: Vec<OrderedScalar> = (0..target.len())
            .map(|row| target.cell(row).map(OrderedScalar))
            .collect::<Option<_>>()
            .ok_or_else(|| FeatureError::MissingValues {
                column: self.target.clone(),
                operation: operation.to_string(),
            })?;

        // классы: отсортированные уникальные значения цели
        let mut classes: BTreeMap<OrderedScalar, usize> = BTreeMap::new();
        for cell in &cells {
            classes.entry(cell.clone()).or_insert(0);
        }
        for (index, code) in classes.values_mut().enumerate() {
            *code = index;
        }
        let y: Array1<usize> = cells.iter().map(|c| classes[c]).collect();

        let x = Array2::from_shape_fn((self.table.n_rows(), columns.len()), |(i, j)| {
            columns[j][i]
        });
        Ok(TrainingSet {
            x,
            y,
            n_classes: classes.len(),
        })
    }

    fn check_count(&self, k: usize) -> Result<()> {
        if k == 0 || k > self.features.len() {
            return Err(FeatureError::InvalidConfig(format!(
                "Number of features to select must be between 1 and {}, got {}",
                self.features.len(),
                k
            )));
        }
        Ok(())
    }

    /// Колонки исходной таблицы в заданном порядке
    fn restrict(&self, indices: &[usize]) -> Result<Table> {
        let names: Vec<&str> = indices.iter().map(|&i| self.features[i].as_str()).collect();
        self.table.select(&names)
    }

    /// Оценки всех признаков, по убыванию
    pub fn scores(&self, score_func: ScoreFunction) -> Result<Vec<(String, f64)>> {
        let set = self
            .training_set("feature scoring")
            .map_err(|e| self.emitter.fail(e))?;
        let scores = score_func
            .score(&set.x, &set.y, set.n_classes)
            .map_err(|e| self.emitter.fail(e))?;
        Ok(rank_descending(&scores)
            .into_iter()
            .map(|i| (self.features[i].clone(), scores[i]))
            .collect())
    }

    /// k лучших признаков по статистической оценке, в исходном порядке колонок
    pub fn select_k_best(&self, score_func: ScoreFunction, k: usize) -> Result<Table> {
        self.check_count(k).map_err(|e| self.emitter.fail(e))?;
        let set = self
            .training_set("select_k_best")
            .map_err(|e| self.emitter.fail(e))?;
        let scores = score_func
            .score(&set.x, &set.y, set.n_classes)
            .map_err(|e| self.emitter.fail(e))?;

        let mut selected: Vec<usize> = rank_descending(&scores).into_iter().take(k).collect();
        selected.sort_unstable();
        let result = self.restrict(&selected)?;
        self.emitter.info(format!(
            "SelectKBest ({}) selected the top {} features: {}",
            score_func,
            k,
            result.column_names().join(", ")
        ));
        Ok(result)
    }

    /// Рекурсивное исключение: на каждом шаге убирается наименее важный признак
    pub fn recursive_feature_elimination<E: Estimator>(
        &self,
        mut estimator: E,
        n_features_to_select: usize,
    ) -> Result<Table> {
        self.check_count(n_features_to_select)
            .map_err(|e| self.emitter.fail(e))?;
        let set = self
            .training_set("recursive feature elimination")
            .map_err(|e| self.emitter.fail(e))?;

        let mut remaining: Vec<usize> = (0..self.features.len()).collect();
        while remaining.len() > n_features_to_select {
            let x = set.x.select(Axis(1), &remaining);
            let importances = estimator
                .fit(&x, &set.y)
                .and_then(|_| estimator.feature_importances())
                .map_err(|e| self.emitter.fail(e))?;

            let weakest = match rank_descending(&importances.to_vec()).last() {
                Some(&weakest) => weakest,
                None => break,
            };
            self.emitter.debug(format!(
                "Eliminated '{}'",
                self.features[remaining[weakest]]
            ));
            remaining.remove(weakest);
        }

        let result = self.restrict(&remaining)?;
        self.emitter.info(format!(
            "RFE with {} selected the top {} features: {}",
            estimator.name(),
            n_features_to_select,
            result.column_names().join(", ")
        ));
        Ok(result)
    }

    /// Все признаки, упорядоченные по убыванию важности
    pub fn feature_importance<E: Estimator>(&self, mut model: E) -> Result<Table> {
        let set = self
            .training_set("feature importance")
            .map_err(|e| self.emitter.fail(e))?;
        let importances = model
            .fit(&set.x, &set.y)
            .and_then(|_| model.feature_importances())
            .map_err(|e| self.emitter.fail(e))?;

        let ranked = rank_descending(&importances.to_vec());
        let result = self.restrict(&ranked)?;
        self.emitter.info(format!(
            "Features ranked by importance: {}",
            result.column_names().join(", ")
        ));
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DecisionTreeClassifier, RandomForestClassifier};
    use crate::observer::{EventLevel, RecordingObserver};
    use crate::types::Column;

    fn table() -> Table {
        Table::new(vec![
            Column::float(
                "noise",
                vec![Some(1.0), Some(3.0), Some(2.0), Some(1.0), Some(3.0), Some(2.0)],
            ),
            Column::float(
                "signal",
                vec![Some(0.0), Some(1.0), Some(0.5), Some(9.0), Some(10.0), Some(9.5)],
            ),
            Column::integer("weak", vec![Some(1), Some(1), Some(2), Some(2), Some(2), Some(2)]),
            Column::text(
                "label",
                vec![Some("no"), Some("no"), Some("no"), Some("yes"), Some("yes"), Some("yes")],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn unknown_target_is_rejected() {
        let err = FeatureSelector::new(&table(), "missing").unwrap_err();
        assert!(matches!(err, FeatureError::ColumnNotFound { .. }));
    }

    #[test]
    fn k_best_keeps_column_order() {
        let selector = FeatureSelector::new(&table(), "label").unwrap();
        let out = selector.select_k_best(ScoreFunction::FClassif, 2).unwrap();
        assert_eq!(out.column_names(), vec!["signal", "weak"]);
        assert_eq!(out.n_rows(), 6);

        let scores = selector.scores(ScoreFunction::FClassif).unwrap();
        assert_eq!(scores[0].0, "signal");
        assert_eq!(scores[2], ("noise".to_string(), 0.0));
    }

    #[test]
    fn chi2_and_mutual_information_prefer_signal() {
        let selector = FeatureSelector::new(&table(), "label").unwrap();
        for func in [ScoreFunction::Chi2, ScoreFunction::MutualInfo] {
            let out = selector.select_k_best(func, 1).unwrap();
            assert_eq!(out.column_names(), vec!["signal"], "{}", func);
        }
    }

    #[test]
    fn chi2_rejects_negative_values() {
        let t = Table::new(vec![
            Column::float("a", vec![Some(-1.0), Some(2.0)]),
            Column::integer("y", vec![Some(0), Some(1)]),
        ])
        .unwrap();
        let selector = FeatureSelector::new(&t, "y").unwrap();
        assert!(matches!(
            selector.select_k_best(ScoreFunction::Chi2, 1),
            Err(FeatureError::InvalidConfig(_))
        ));
    }

    #[test]
    fn k_out_of_range() {
        let selector = FeatureSelector::new(&table(), "label").unwrap();
        assert!(selector.select_k_best(ScoreFunction::FClassif, 0).is_err());
        assert!(selector.select_k_best(ScoreFunction::FClassif, 4).is_err());
    }

    #[test]
    fn text_features_and_missing_values_fail() {
        let mut t = table();
        t.push_column(Column::text("city", vec![Some("a"); 6])).unwrap();
        let selector = FeatureSelector::new(&t, "label").unwrap();
        assert!(matches!(
            selector.select_k_best(ScoreFunction::FClassif, 1),
            Err(FeatureError::TypeMismatch { .. })
        ));

        let t = Table::new(vec![
            Column::float("a", vec![Some(1.0), None]),
            Column::integer("y", vec![Some(0), Some(1)]),
        ])
        .unwrap();
        let selector = FeatureSelector::new(&t, "y").unwrap();
        assert!(matches!(
            selector.select_k_best(ScoreFunction::FClassif, 1),
            Err(FeatureError::MissingValues { .. })
        ));
    }

    #[test]
    fn rfe_keeps_the_separating_feature() {
        let observer = RecordingObserver::new();
        let selector = FeatureSelector::with_observer(&table(), "label", observer.clone()).unwrap();
        let out = selector
            .recursive_feature_elimination(DecisionTreeClassifier::new(), 1)
            .unwrap();
        assert_eq!(out.column_names(), vec!["signal"]);
        assert_eq!(observer.messages(EventLevel::Debug).len(), 2);
    }

    #[test]
    fn importance_ranks_every_feature() {
        let selector = FeatureSelector::new(&table(), "label").unwrap();
        let out = selector
            .feature_importance(RandomForestClassifier::new(20))
            .unwrap();
        assert_eq!(out.n_cols(), 3);
        assert_eq!(out.column_names()[0], "signal");
    }

    #[test]
    fn rank_puts_nan_last_and_keeps_ties() {
        assert_eq!(rank_descending(&[1.0, f64::NAN, 3.0, 1.0]), vec![2, 0, 3, 1]);
    }
}
