//! Полиномиальные признаки

use std::sync::Arc;

use crate::error::{FeatureError, Result};
use crate::observer::{Emitter, TransformObserver};
use crate::types::{Column, ColumnKind, Table};

/// Все сочетания с повторениями индексов `0..n` длины `k` в лексикографическом порядке
fn combinations_with_replacement(n: usize, k: usize) -> Vec<Vec<usize>> {
    let mut result = Vec::new();
    if n == 0 || k == 0 {
        return result;
    }
    let mut current = vec![0; k];
    loop {
        result.push(current.clone());
        // ищем самую правую позицию, которую можно увеличить
        let mut i = k;
        while i > 0 && current[i - 1] == n - 1 {
            i -= 1;
        }
        if i == 0 {
            break;
        }
        let next = current[i - 1] + 1;
        for slot in current.iter_mut().skip(i - 1) {
            *slot = next;
        }
    }
    result
}

/// Наибольшая поддерживаемая степень
pub const MAX_DEGREE: usize = 5;

/// Предел числа генерируемых колонок
pub const MAX_TERMS: usize = 10_000;

/// Число мономов степени 1..=degree от width переменных: C(width + degree, degree) - 1
fn term_count(width: usize, degree: usize) -> Option<usize> {
    let mut count = 1usize;
    for i in 1..=degree {
        count = count.checked_mul(width.checked_add(i)?)? / i;
    }
    Some(count - 1)
}

fn check_degree(degree: usize) -> Result<()> {
    if degree < 1 || degree > MAX_DEGREE {
        return Err(FeatureError::InvalidConfig(format!(
            "Degree must be an integer between 1 and {}, got {}",
            MAX_DEGREE, degree
        )));
    }
    Ok(())
}

/// Имя терма: "a", "a^2", "a b", "a^2 b"
fn term_name(names: &[String], combo: &[usize]) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut i = 0;
    while i < combo.len() {
        let mut power = 1;
        while i + power < combo.len() && combo[i + power] == combo[i] {
            power += 1;
        }
        let name = &names[combo[i]];
        parts.push(if power == 1 {
            name.clone()
        } else {
            format!("{}^{}", name, power)
        });
        i += power;
    }
    parts.join(" ")
}

#[derive(Debug)]
pub struct PolynomialFeatures {
    degree: usize,
    emitter: Emitter,
}

impl PolynomialFeatures {
    pub fn new(degree: usize) -> Result<Self> {
        let emitter = Emitter::new("polynomial");
        check_degree(degree).map_err(|e| emitter.fail(e))?;
        emitter.info(format!("Initialized polynomial features with degree {}", degree));
        Ok(Self { degree, emitter })
    }

    pub fn with_observer(mut self, observer: Arc<dyn TransformObserver>) -> Self {
        self.emitter = self.emitter.with_observer(observer);
        self
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    /// Строит таблицу из всех мономов степени 1..=degree без свободного члена
    pub fn fit_transform(&mut self, table: &Table, degree: Option<usize>) -> Result<Table> {
        if let Some(degree) = degree {
            check_degree(degree).map_err(|e| self.emitter.fail(e))?;
            self.degree = degree;
            self.emitter.info(format!("Polynomial degree updated to {}", degree));
        }

        let numeric: Vec<&Column> = table
            .columns()
            .iter()
            .filter(|c| c.kind().is_numeric())
            .collect();
        if numeric.is_empty() {
            return Err(self.emitter.fail(FeatureError::Degenerate(
                "No numeric columns found in the table".to_string(),
            )));
        }

        let categorical: Vec<&str> = table
            .columns()
            .iter()
            .filter(|c| c.kind() == ColumnKind::Text)
            .map(|c| c.name.as_str())
            .collect();
        if !categorical.is_empty() {
            return Err(self.emitter.fail(FeatureError::type_mismatch(
                &categorical.join(", "),
                "numeric",
                ColumnKind::Text,
            )));
        }

        match term_count(numeric.len(), self.degree) {
            Some(count) if count <= MAX_TERMS => {}
            _ => {
                return Err(self.emitter.fail(FeatureError::InvalidConfig(format!(
                    "Polynomial expansion of {} columns with degree {} exceeds {} features",
                    numeric.len(),
                    self.degree,
                    MAX_TERMS
                ))))
            }
        }

        let names: Vec<String> = numeric.iter().map(|c| c.name.clone()).collect();
        let values: Vec<Vec<Option<f64>>> = numeric
            .iter()
            .map(|c| c.data.numeric_values().unwrap_or_default())
            .collect();
        let n_rows = table.n_rows();

        let mut terms = Vec::new();
        for d in 1..=self.degree {
            for combo in combinations_with_replacement(names.len(), d) {
                let column: Vec<Option<f64>> = (0..n_rows)
                    .map(|row| {
                        combo
                            .iter()
                            .try_fold(1.0, |acc, &j| values[j][row].map(|v| acc * v))
                    })
                    .collect();
                terms.push(Column::float(term_name(&names, &combo), column));
            }
        }

        if terms.is_empty() {
            return Err(self.emitter.fail(FeatureError::Degenerate(
                "Polynomial expansion produced no features".to_string(),
            )));
        }

        self.emitter.info(format!(
            "Polynomial features transformation produced {} columns",
            terms.len()
        ));
        Table::new(terms).map_err(|e| self.emitter.fail(e))
    }

    /// Заменяет выбранные колонки их полиномиальными признаками в конце таблицы
    pub fn apply<S: AsRef<str>>(&mut self, table: &Table, columns: &[S]) -> Result<Table> {
        if columns.is_empty() {
            return Err(self.emitter.fail(FeatureError::InvalidConfig(
                "Select at least one column for polynomial features".to_string(),
            )));
        }
        let subset = table.select(columns).map_err(|e| self.emitter.fail(e))?;
        let terms = self.fit_transform(&subset, None)?;

        let mut result = table.clone();
        result
            .drop_columns(columns)
            .map_err(|e| self.emitter.fail(e))?;
        for column in terms.into_columns() {
            result.push_column(column).map_err(|e| self.emitter.fail(e))?;
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::{EventLevel, RecordingObserver};
    use crate::types::ColumnData;

    #[test]
    fn combinations_are_ordered() {
        assert_eq!(
            combinations_with_replacement(3, 2),
            vec![
                vec![0, 0],
                vec![0, 1],
                vec![0, 2],
                vec![1, 1],
                vec![1, 2],
                vec![2, 2]
            ]
        );
        assert_eq!(combinations_with_replacement(2, 3).len(), 4);
    }

    #[test]
    fn zero_degree_is_rejected() {
        assert!(matches!(
            PolynomialFeatures::new(0),
            Err(FeatureError::InvalidConfig(_))
        ));
        let mut poly = PolynomialFeatures::new(2).unwrap();
        let t = Table::new(vec![Column::float("a", vec![Some(1.0)])]).unwrap();
        assert!(poly.fit_transform(&t, Some(0)).is_err());
        assert_eq!(poly.degree(), 2);
    }

    #[test]
    fn degree_above_limit_is_rejected() {
        assert!(matches!(
            PolynomialFeatures::new(MAX_DEGREE + 1),
            Err(FeatureError::InvalidConfig(_))
        ));
        assert!(matches!(
            PolynomialFeatures::new(usize::MAX),
            Err(FeatureError::InvalidConfig(_))
        ));
        assert!(PolynomialFeatures::new(MAX_DEGREE).is_ok());
    }

    #[test]
    fn term_count_matches_binomial() {
        assert_eq!(term_count(2, 2), Some(5));
        assert_eq!(term_count(3, 3), Some(19));
        assert_eq!(term_count(usize::MAX, 2), None);
    }

    #[test]
    fn too_many_terms_are_rejected() {
        let columns = (0..60)
            .map(|i| Column::float(format!("f{}", i), vec![Some(1.0)]))
            .collect();
        let t = Table::new(columns).unwrap();
        // C(65, 5) - 1 мономов
        let err = PolynomialFeatures::new(5)
            .unwrap()
            .fit_transform(&t, None)
            .unwrap_err();
        assert!(matches!(err, FeatureError::InvalidConfig(_)));
    }

    #[test]
    fn clashing_term_names_are_logged() {
        let observer = RecordingObserver::new();
        let t = Table::new(vec![
            Column::float("a", vec![Some(2.0)]),
            Column::float("a^2", vec![Some(4.0)]),
        ])
        .unwrap();
        let err = PolynomialFeatures::new(2)
            .unwrap()
            .with_observer(observer.clone())
            .fit_transform(&t, None)
            .unwrap_err();
        assert!(matches!(err, FeatureError::DuplicateColumn { .. }));
        assert_eq!(observer.messages(EventLevel::Error).len(), 1);
    }

    #[test]
    fn degree_two_on_two_columns() {
        let t = Table::new(vec![
            Column::float("a", vec![Some(2.0), Some(3.0)]),
            Column::integer("b", vec![Some(5), None]),
        ])
        .unwrap();
        let out = PolynomialFeatures::new(2)
            .unwrap()
            .fit_transform(&t, None)
            .unwrap();
        assert_eq!(out.column_names(), vec!["a", "b", "a^2", "a b", "b^2"]);
        assert_eq!(
            out.column("a b").unwrap().data,
            ColumnData::Float(vec![Some(10.0), None])
        );
        assert_eq!(
            out.column("a^2").unwrap().data,
            ColumnData::Float(vec![Some(4.0), Some(9.0)])
        );
    }

    #[test]
    fn text_columns_are_rejected() {
        let t = Table::new(vec![
            Column::float("a", vec![Some(1.0)]),
            Column::text("c", vec![Some("x")]),
        ])
        .unwrap();
        let err = PolynomialFeatures::new(2)
            .unwrap()
            .fit_transform(&t, None)
            .unwrap_err();
        assert!(matches!(err, FeatureError::TypeMismatch { .. }));
    }

    #[test]
    fn no_numeric_columns_is_degenerate() {
        let t = Table::new(vec![Column::boolean("f", vec![Some(true)])]).unwrap();
        let err = PolynomialFeatures::new(1)
            .unwrap()
            .fit_transform(&t, None)
            .unwrap_err();
        assert!(matches!(err, FeatureError::Degenerate(_)));
    }

    #[test]
    fn apply_replaces_selected_columns() {
        let t = Table::new(vec![
            Column::text("name", vec![Some("x"), Some("y")]),
            Column::float("a", vec![Some(2.0), Some(3.0)]),
        ])
        .unwrap();
        let out = PolynomialFeatures::new(3).unwrap().apply(&t, &["a"]).unwrap();
        assert_eq!(out.column_names(), vec!["name", "a", "a^2", "a^3"]);
        assert_eq!(
            out.column("a^3").unwrap().data,
            ColumnData::Float(vec![Some(8.0), Some(27.0)])
        );
    }
}
