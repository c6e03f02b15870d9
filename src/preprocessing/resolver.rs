//! Проверка наличия колонок и применимости стратегий к их типам

use std::collections::BTreeMap;

use crate::error::{FeatureError, Result};
use crate::preprocessing::imputation::ImputeStrategy;
use crate::types::{Column, ColumnKind, Scalar, Table};

pub struct ColumnStrategyResolver<'a> {
    table: &'a Table,
}

impl<'a> ColumnStrategyResolver<'a> {
    pub fn new(table: &'a Table) -> Self {
        Self { table }
    }

    pub fn column(&self, name: &str) -> Result<&'a Column> {
        self.table.column(name)
    }

    /// Колонка должна существовать и быть числовой (float или integer)
    pub fn numeric(&self, name: &str) -> Result<&'a Column> {
        let column = self.column(name)?;
        if !column.kind().is_numeric() {
            return Err(FeatureError::type_mismatch(name, "numeric", column.kind()));
        }
        Ok(column)
    }

    /// Колонка должна существовать и быть категориальной (текст)
    pub fn categorical(&self, name: &str) -> Result<&'a Column> {
        let column = self.column(name)?;
        if column.kind() != ColumnKind::Text {
            return Err(FeatureError::type_mismatch(
                name,
                "categorical (text)",
                column.kind(),
            ));
        }
        Ok(column)
    }

    pub fn numeric_all<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<&'a Column>> {
        names.iter().map(|n| self.numeric(n.as_ref())).collect()
    }

    pub fn categorical_all<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<&'a Column>> {
        names.iter().map(|n| self.categorical(n.as_ref())).collect()
    }

    /// Проверяет, что стратегия применима к колонке
    pub fn imputation(&self, name: &str, strategy: &ImputeStrategy) -> Result<&'a Column> {
        let column = self.column(name)?;
        match strategy {
            ImputeStrategy::Mean | ImputeStrategy::Median => {
                if !column.kind().is_numeric() {
                    return Err(FeatureError::type_mismatch(
                        name,
                        &format!("numeric ({} strategy)", strategy),
                        column.kind(),
                    ));
                }
            }
            ImputeStrategy::Mode => {}
            ImputeStrategy::Constant(value) => {
                let compatible = match column.kind() {
                    ColumnKind::Float | ColumnKind::Integer => value.as_f64().is_some(),
                    ColumnKind::Text => matches!(value, Scalar::Text(_)),
                    ColumnKind::Boolean => matches!(value, Scalar::Bool(_)),
                    ColumnKind::DateTime => matches!(value, Scalar::DateTime(_)),
                };
                if !compatible {
                    return Err(FeatureError::type_mismatch(
                        name,
                        &format!("column matching fill value '{}'", value),
                        column.kind(),
                    ));
                }
            }
        }
        Ok(column)
    }

    /// Стратегии по умолчанию для колонок с пропусками: числовые → mean, прочие → mode
    pub fn suggest_imputation(&self) -> BTreeMap<String, ImputeStrategy> {
        self.table
            .columns()
            .iter()
            .filter(|c| c.data.missing_count() > 0)
            .map(|c| {
                let strategy = if c.kind().is_numeric() {
                    ImputeStrategy::Mean
                } else {
                    ImputeStrategy::Mode
                };
                (c.name.clone(), strategy)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Table {
        Table::new(vec![
            Column::float("price", vec![Some(1.0), None]),
            Column::text("city", vec![None, Some("x")]),
            Column::integer("qty", vec![Some(1), Some(2)]),
        ])
        .unwrap()
    }

    #[test]
    fn numeric_rejects_text() {
        let t = table();
        let r = ColumnStrategyResolver::new(&t);
        assert!(r.numeric("qty").is_ok());
        let err = r.numeric("city").unwrap_err();
        assert!(matches!(err, FeatureError::TypeMismatch { .. }));
        let err = r.numeric("nope").unwrap_err();
        assert!(matches!(err, FeatureError::ColumnNotFound { .. }));
    }

    #[test]
    fn constant_must_match_kind() {
        let t = table();
        let r = ColumnStrategyResolver::new(&t);
        assert!(r
            .imputation("price", &ImputeStrategy::Constant(Scalar::Number(0.0)))
            .is_ok());
        assert!(r
            .imputation("city", &ImputeStrategy::Constant(Scalar::Number(0.0)))
            .is_err());
        assert!(r
            .imputation("city", &ImputeStrategy::Constant(Scalar::Text("n/a".into())))
            .is_ok());
    }

    #[test]
    fn suggestions_cover_only_columns_with_gaps() {
        let t = table();
        let suggested = ColumnStrategyResolver::new(&t).suggest_imputation();
        assert_eq!(suggested.len(), 2);
        assert_eq!(suggested["price"], ImputeStrategy::Mean);
        assert_eq!(suggested["city"], ImputeStrategy::Mode);
    }
}
