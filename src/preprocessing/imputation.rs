//! Заполнение пропусков

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{FeatureError, Result};
use crate::observer::{Emitter, TransformObserver};
use crate::preprocessing::resolver::ColumnStrategyResolver;
use crate::stats;
use crate::types::{ColumnData, Scalar, Table};

/// Стратегия заполнения для одной колонки
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StrategyRepr", into = "StrategyRepr")]
pub enum ImputeStrategy {
    Mean,
    Median,
    Mode,
    Constant(Scalar),
}

impl fmt::Display for ImputeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImputeStrategy::Mean => f.write_str("mean"),
            ImputeStrategy::Median => f.write_str("median"),
            ImputeStrategy::Mode => f.write_str("mode"),
            ImputeStrategy::Constant(v) => write!(f, "constant({})", v),
        }
    }
}

fn named_strategy(name: &str) -> Option<ImputeStrategy> {
    match name {
        "mean" => Some(ImputeStrategy::Mean),
        "median" => Some(ImputeStrategy::Median),
        "mode" => Some(ImputeStrategy::Mode),
        _ => None,
    }
}

/// "mean" / "median" / "mode" или число
impl FromStr for ImputeStrategy {
    type Err = FeatureError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(strategy) = named_strategy(s) {
            return Ok(strategy);
        }
        s.parse::<f64>()
            .map(|v| ImputeStrategy::Constant(Scalar::Number(v)))
            .map_err(|_| FeatureError::UnknownMethod {
                kind: "imputation strategy",
                name: s.to_string(),
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum ConstantRepr {
    Bool(bool),
    Number(f64),
    Text(String),
}

/// В JSON: `"mean"`, `3.5`, `true` или `{"constant": "unknown"}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum StrategyRepr {
    Bool(bool),
    Number(f64),
    Named(String),
    Constant { constant: ConstantRepr },
}

impl TryFrom<StrategyRepr> for ImputeStrategy {
    type Error = FeatureError;

    fn try_from(repr: StrategyRepr) -> Result<Self> {
        Ok(match repr {
            StrategyRepr::Bool(b) => ImputeStrategy::Constant(Scalar::Bool(b)),
            StrategyRepr::Number(v) => ImputeStrategy::Constant(Scalar::Number(v)),
            StrategyRepr::Named(name) => {
                named_strategy(&name).ok_or(FeatureError::UnknownMethod {
                    kind: "imputation strategy",
                    name,
                })?
            }
            StrategyRepr::Constant { constant } => ImputeStrategy::Constant(match constant {
                ConstantRepr::Bool(b) => Scalar::Bool(b),
                ConstantRepr::Number(v) => Scalar::Number(v),
                ConstantRepr::Text(s) => Scalar::Text(s),
            }),
        })
    }
}

impl From<ImputeStrategy> for StrategyRepr {
    fn from(strategy: ImputeStrategy) -> Self {
        match strategy {
            ImputeStrategy::Mean | ImputeStrategy::Median | ImputeStrategy::Mode => {
                StrategyRepr::Named(strategy.to_string())
            }
            ImputeStrategy::Constant(Scalar::Bool(b)) => StrategyRepr::Bool(b),
            ImputeStrategy::Constant(Scalar::Number(v)) => StrategyRepr::Number(v),
            ImputeStrategy::Constant(other) => StrategyRepr::Constant {
                constant: ConstantRepr::Text(other.to_string()),
            },
        }
    }
}

/// Наиболее частое значение; при равенстве частот берётся наименьшее
pub fn mode(data: &ColumnData) -> Option<Scalar> {
    let mut values: Vec<Scalar> = (0..data.len()).filter_map(|i| data.cell(i)).collect();
    values.sort_by(|a, b| a.total_cmp(b));

    let mut best: Option<(usize, usize)> = None;
    let mut start = 0;
    while start < values.len() {
        let mut end = start + 1;
        while end < values.len() && values[end].total_cmp(&values[start]).is_eq() {
            end += 1;
        }
        let count = end - start;
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((start, count));
        }
        start = end;
    }

    let (idx, _) = best?;
    Some(values.swap_remove(idx))
}

fn fill_column(name: &str, data: &ColumnData, fill: &Scalar) -> Result<ColumnData> {
    let filled = match (data, fill) {
        (ColumnData::Float(v), Scalar::Number(x)) => {
            ColumnData::Float(v.iter().map(|c| Some(c.unwrap_or(*x))).collect())
        }
        (ColumnData::Integer(v), Scalar::Number(x)) => {
            if x.fract() == 0.0 && x.is_finite() {
                let x = *x as i64;
                ColumnData::Integer(v.iter().map(|c| Some(c.unwrap_or(x))).collect())
            } else {
                // дробное заполнение переводит колонку во float
                ColumnData::Float(
                    v.iter()
                        .map(|c| Some(c.map(|c| c as f64).unwrap_or(*x)))
                        .collect(),
                )
            }
        }
        (ColumnData::Text(v), Scalar::Text(x)) => ColumnData::Text(
            v.iter()
                .map(|c| Some(c.clone().unwrap_or_else(|| x.clone())))
                .collect(),
        ),
        (ColumnData::Boolean(v), Scalar::Bool(x)) => {
            ColumnData::Boolean(v.iter().map(|c| Some(c.unwrap_or(*x))).collect())
        }
        (ColumnData::DateTime(v), Scalar::DateTime(x)) => {
            ColumnData::DateTime(v.iter().map(|c| Some(c.unwrap_or(*x))).collect())
        }
        (data, fill) => {
            return Err(FeatureError::type_mismatch(
                name,
                &format!("column matching fill value '{}'", fill),
                data.kind(),
            ))
        }
    };
    Ok(filled)
}

/// Заполнение пропусков: значения считаются в `fit` и переиспользуются в `transform`
#[derive(Debug)]
pub struct Imputer {
    strategies: BTreeMap<String, ImputeStrategy>,
    fill_values: BTreeMap<String, Scalar>,
    is_fitted: bool,
    emitter: Emitter,
}

impl Imputer {
    pub fn new(strategies: BTreeMap<String, ImputeStrategy>) -> Self {
        Self {
            strategies,
            fill_values: BTreeMap::new(),
            is_fitted: false,
            emitter: Emitter::new("imputer"),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn TransformObserver>) -> Self {
        self.emitter = self.emitter.with_observer(observer);
        self
    }

    pub fn strategies(&self) -> &BTreeMap<String, ImputeStrategy> {
        &self.strategies
    }

    pub fn fill_values(&self) -> &BTreeMap<String, Scalar> {
        &self.fill_values
    }

    fn compute_fill_value(
        &self,
        table: &Table,
        column: &str,
        strategy: &ImputeStrategy,
    ) -> Result<Scalar> {
        let resolver = ColumnStrategyResolver::new(table);
        let col = resolver.imputation(column, strategy)?;
        self.emitter.debug(format!(
            "Computing fill value for column '{}' with strategy '{}'",
            column, strategy
        ));

        let empty = || {
            FeatureError::Degenerate(format!(
                "Column '{}' has no values to compute {} from",
                column, strategy
            ))
        };

        match strategy {
            ImputeStrategy::Constant(v) => Ok(v.clone()),
            ImputeStrategy::Mean | ImputeStrategy::Median => {
                let values = col
                    .data
                    .numeric_values()
                    .map(|v| stats::present(&v))
                    .unwrap_or_default();
                let value = if *strategy == ImputeStrategy::Mean {
                    stats::mean(&values)
                } else {
                    stats::median(&values)
                };
                value.map(Scalar::Number).ok_or_else(empty)
            }
            ImputeStrategy::Mode => mode(&col.data).ok_or_else(empty),
        }
    }

    /// Вычисляет значения заполнения; при ошибке прежнее состояние не меняется
    pub fn fit(&mut self, table: &Table) -> Result<&mut Self> {
        self.emitter.info(format!(
            "Fitting imputer on {} columns",
            self.strategies.len()
        ));
        let mut fill_values = BTreeMap::new();
        for (column, strategy) in &self.strategies {
            let value = self
                .compute_fill_value(table, column, strategy)
                .map_err(|e| self.emitter.fail(e))?;
            fill_values.insert(column.clone(), value);
        }
        self.fill_values = fill_values;
        self.is_fitted = true;
        Ok(self)
    }

    /// Новая таблица с заполненными пропусками; исходная не меняется
    pub fn transform(&self, table: &Table) -> Result<Table> {
        if !self.is_fitted {
            return Err(self
                .emitter
                .fail(FeatureError::InvalidConfig("Imputer not fitted".to_string())));
        }
        self.emitter.info("Transforming table using the computed fill values");

        // сначала проверяем все колонки, потом меняем
        let resolver = ColumnStrategyResolver::new(table);
        for (column, fill) in &self.fill_values {
            resolver
                .imputation(column, &ImputeStrategy::Constant(fill.clone()))
                .map_err(|e| self.emitter.fail(e))?;
        }

        let mut result = table.clone();
        for (column, fill) in &self.fill_values {
            let data = fill_column(column, &result.column(column)?.data, fill)?;
            result.replace_data(column, data)?;
            self.emitter.debug(format!(
                "Filled missing values in column '{}' with '{}'",
                column, fill
            ));
        }
        Ok(result)
    }

    pub fn fit_transform(&mut self, table: &Table) -> Result<Table> {
        self.emitter.info("Fitting and transforming table in one step");
        self.fit(table)?;
        self.transform(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::{EventLevel, RecordingObserver};
    use crate::types::Column;

    fn strategies(pairs: &[(&str, ImputeStrategy)]) -> BTreeMap<String, ImputeStrategy> {
        pairs
            .iter()
            .map(|(c, s)| (c.to_string(), s.clone()))
            .collect()
    }

    fn table() -> Table {
        Table::new(vec![
            Column::float("age", vec![Some(20.0), None, Some(40.0), Some(30.0)]),
            Column::text("city", vec![Some("b"), Some("a"), None, Some("b")]),
            Column::integer("kids", vec![Some(1), None, Some(2), Some(2)]),
        ])
        .unwrap()
    }

    #[test]
    fn mean_fills_only_missing_cells() {
        let mut imputer = Imputer::new(strategies(&[("age", ImputeStrategy::Mean)]));
        let out = imputer.fit_transform(&table()).unwrap();
        assert_eq!(
            out.column("age").unwrap().data,
            ColumnData::Float(vec![Some(20.0), Some(30.0), Some(40.0), Some(30.0)])
        );
        // прочие колонки не тронуты
        assert_eq!(out.column("city").unwrap(), table().column("city").unwrap());
    }

    #[test]
    fn median_and_mode() {
        let mut imputer = Imputer::new(strategies(&[
            ("kids", ImputeStrategy::Median),
            ("city", ImputeStrategy::Mode),
        ]));
        let out = imputer.fit_transform(&table()).unwrap();
        assert_eq!(
            out.column("kids").unwrap().data,
            ColumnData::Integer(vec![Some(1), Some(2), Some(2), Some(2)])
        );
        assert_eq!(
            out.column("city").unwrap().data,
            ColumnData::Text(vec![
                Some("b".into()),
                Some("a".into()),
                Some("b".into()),
                Some("b".into())
            ])
        );
    }

    #[test]
    fn mode_ties_pick_smallest() {
        let data = ColumnData::Text(vec![Some("z".into()), Some("y".into()), None]);
        assert_eq!(mode(&data), Some(Scalar::Text("y".into())));
    }

    #[test]
    fn fractional_fill_promotes_integer_column() {
        let mut imputer = Imputer::new(strategies(&[("kids", ImputeStrategy::Mean)]));
        let out = imputer.fit_transform(&table()).unwrap();
        let data = &out.column("kids").unwrap().data;
        assert_eq!(data.kind(), crate::types::ColumnKind::Float);
        assert_eq!(data.cell(1), Some(Scalar::Number(5.0 / 3.0)));
    }

    #[test]
    fn fit_on_one_table_transform_another() {
        let mut imputer = Imputer::new(strategies(&[("age", ImputeStrategy::Mean)]));
        imputer.fit(&table()).unwrap();
        let other = Table::new(vec![Column::float("age", vec![None, Some(1.0)])]).unwrap();
        let out = imputer.transform(&other).unwrap();
        assert_eq!(
            out.column("age").unwrap().data,
            ColumnData::Float(vec![Some(30.0), Some(1.0)])
        );
    }

    #[test]
    fn missing_column_fails_at_fit_and_transform() {
        let mut imputer = Imputer::new(strategies(&[("nope", ImputeStrategy::Mode)]));
        let err = imputer.fit(&table()).unwrap_err();
        assert!(matches!(err, FeatureError::ColumnNotFound { .. }));

        let mut imputer = Imputer::new(strategies(&[("age", ImputeStrategy::Mean)]));
        imputer.fit(&table()).unwrap();
        let other = Table::new(vec![Column::float("x", vec![None])]).unwrap();
        let err = imputer.transform(&other).unwrap_err();
        assert!(matches!(err, FeatureError::ColumnNotFound { .. }));
    }

    #[test]
    fn mean_on_text_is_type_error_and_logged() {
        let observer = RecordingObserver::new();
        let mut imputer = Imputer::new(strategies(&[("city", ImputeStrategy::Mean)]))
            .with_observer(observer.clone());
        let err = imputer.fit(&table()).unwrap_err();
        assert!(matches!(err, FeatureError::TypeMismatch { .. }));
        assert_eq!(observer.messages(EventLevel::Error).len(), 1);
    }

    #[test]
    fn all_missing_column_is_degenerate() {
        let t = Table::new(vec![Column::float("x", vec![None, None])]).unwrap();
        let mut imputer = Imputer::new(strategies(&[("x", ImputeStrategy::Median)]));
        let err = imputer.fit(&t).unwrap_err();
        assert!(matches!(err, FeatureError::Degenerate(_)));
    }

    #[test]
    fn transform_before_fit_fails() {
        let imputer = Imputer::new(BTreeMap::new());
        assert!(matches!(
            imputer.transform(&table()),
            Err(FeatureError::InvalidConfig(_))
        ));
    }

    #[test]
    fn strategy_parsing() {
        assert_eq!("mean".parse::<ImputeStrategy>().unwrap(), ImputeStrategy::Mean);
        assert_eq!(
            "0".parse::<ImputeStrategy>().unwrap(),
            ImputeStrategy::Constant(Scalar::Number(0.0))
        );
        assert!(matches!(
            "average".parse::<ImputeStrategy>(),
            Err(FeatureError::UnknownMethod { .. })
        ));

        let parsed: BTreeMap<String, ImputeStrategy> = serde_json::from_str(
            r#"{"a":"median","b":-1,"c":{"constant":"unknown"},"d":true}"#,
        )
        .unwrap();
        assert_eq!(parsed["a"], ImputeStrategy::Median);
        assert_eq!(parsed["b"], ImputeStrategy::Constant(Scalar::Number(-1.0)));
        assert_eq!(
            parsed["c"],
            ImputeStrategy::Constant(Scalar::Text("unknown".into()))
        );
        assert_eq!(parsed["d"], ImputeStrategy::Constant(Scalar::Bool(true)));
        assert!(serde_json::from_str::<ImputeStrategy>(r#""average""#).is_err());
    }
}
