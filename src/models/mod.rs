//! Модели для оценки важности признаков

pub mod decision_tree;
pub mod random_forest;

use ndarray::{Array1, Array2};

use crate::error::Result;

pub use decision_tree::DecisionTreeClassifier;
pub use random_forest::RandomForestClassifier;

/// Классификатор, умеющий сообщать важность признаков.
/// Классы закодированы индексами `0..n_classes`.
pub trait Estimator {
    fn name(&self) -> &'static str;

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<()>;

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>>;

    /// Неотрицательные веса по колонкам `x`, в сумме 1 (или все нули)
    fn feature_importances(&self) -> Result<Array1<f64>>;
}

/// Проверка размеров обучающей выборки
pub(crate) fn check_training_set(x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
    use crate::error::FeatureError;

    if x.nrows() == 0 || x.ncols() == 0 {
        return Err(FeatureError::Degenerate("Empty dataset".to_string()));
    }
    if x.nrows() != y.len() {
        return Err(FeatureError::InvalidConfig(format!(
            "Feature matrix has {} rows but target has {}",
            x.nrows(),
            y.len()
        )));
    }
    Ok(())
}
