//! Масштабирование числовых колонок

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{FeatureError, Result};
use crate::observer::{Emitter, TransformObserver};
use crate::preprocessing::resolver::ColumnStrategyResolver;
use crate::stats;
use crate::types::{ColumnData, Table};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingMethod {
    /// (x - mean) / std
    Standard,
    /// (x - min) / (max - min)
    MinMax,
    /// (x - median) / IQR
    Robust,
    /// x / max|x|
    MaxAbs,
}

impl ScalingMethod {
    pub const ALL: [ScalingMethod; 4] = [
        ScalingMethod::Standard,
        ScalingMethod::MinMax,
        ScalingMethod::Robust,
        ScalingMethod::MaxAbs,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ScalingMethod::Standard => "standard",
            ScalingMethod::MinMax => "min_max",
            ScalingMethod::Robust => "robust",
            ScalingMethod::MaxAbs => "max_abs",
        }
    }
}

impl fmt::Display for ScalingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ScalingMethod {
    type Err = FeatureError;

    fn from_str(s: &str) -> Result<Self> {
        let key: String = s
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        // принимаются и имена вида "StandardScaler"
        let key = key.strip_suffix("scaler").unwrap_or(&key);
        match key {
            "standard" | "zscore" => Ok(ScalingMethod::Standard),
            "minmax" => Ok(ScalingMethod::MinMax),
            "robust" => Ok(ScalingMethod::Robust),
            "maxabs" => Ok(ScalingMethod::MaxAbs),
            _ => Err(FeatureError::UnknownMethod {
                kind: "scaling method",
                name: s.to_string(),
            }),
        }
    }
}

/// Параметры одной колонки: x' = (x - center) / scale
#[derive(Debug, Clone)]
pub struct ColumnScaler {
    method: ScalingMethod,
    center: Option<f64>,
    scale: Option<f64>,
    is_fitted: bool,
}

impl ColumnScaler {
    pub fn new(method: ScalingMethod) -> Self {
        Self {
            method,
            center: None,
            scale: None,
            is_fitted: false,
        }
    }

    pub fn fit(&mut self, values: &[Option<f64>]) -> Result<()> {
        let present = stats::present(values);
        if present.is_empty() {
            return Err(FeatureError::Degenerate("Empty column".to_string()));
        }

        let (center, scale) = match self.method {
            ScalingMethod::Standard => {
                let mean = stats::mean(&present).unwrap_or(0.0);
                let std = stats::variance(&present, 0).unwrap_or(0.0).sqrt();
                (mean, std)
            }
            ScalingMethod::MinMax => {
                let (min, max) = stats::min_max(&present).unwrap_or((0.0, 0.0));
                (min, max - min)
            }
            ScalingMethod::Robust => {
                let sorted = stats::sorted(&present);
                let q1 = stats::quantile_sorted(&sorted, 0.25).unwrap_or(0.0);
                let median = stats::quantile_sorted(&sorted, 0.5).unwrap_or(0.0);
                let q3 = stats::quantile_sorted(&sorted, 0.75).unwrap_or(0.0);
                (median, q3 - q1)
            }
            ScalingMethod::MaxAbs => {
                let max_abs = present.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
                (0.0, max_abs)
            }
        };

        self.center = Some(center);
        // Избегаем деления на ноль
        self.scale = Some(if scale.abs() < 1e-10 { 1.0 } else { scale });
        self.is_fitted = true;
        Ok(())
    }

    pub fn transform(&self, values: &[Option<f64>]) -> Result<Vec<Option<f64>>> {
        if !self.is_fitted {
            return Err(FeatureError::InvalidConfig("Scaler not fitted".to_string()));
        }
        let center = self.center.unwrap_or(0.0);
        let scale = self.scale.unwrap_or(1.0);
        Ok(values
            .iter()
            .map(|v| v.map(|v| (v - center) / scale))
            .collect())
    }

    pub fn fit_transform(&mut self, values: &[Option<f64>]) -> Result<Vec<Option<f64>>> {
        self.fit(values)?;
        self.transform(values)
    }
}

/// Реестр методов масштабирования; параметры считаются заново при каждом вызове
#[derive(Debug)]
pub struct Scaler {
    emitter: Emitter,
}

impl Scaler {
    pub fn new() -> Self {
        Self {
            emitter: Emitter::new("scaler"),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn TransformObserver>) -> Self {
        self.emitter = self.emitter.with_observer(observer);
        self
    }

    pub fn methods(&self) -> Vec<&'static str> {
        ScalingMethod::ALL.iter().map(|m| m.name()).collect()
    }

    pub fn method(&self, name: &str) -> Result<ScalingMethod> {
        name.parse().map_err(|e| self.emitter.fail(e))
    }

    fn apply<S: AsRef<str>>(
        &self,
        table: &Table,
        columns: &[S],
        method: ScalingMethod,
    ) -> Result<Table> {
        let resolver = ColumnStrategyResolver::new(table);
        let targets = resolver
            .numeric_all(columns)
            .map_err(|e| self.emitter.fail(e))?;

        let mut scaled = Vec::with_capacity(targets.len());
        for column in targets {
            let values = column.data.numeric_values().unwrap_or_default();
            let mut scaler = ColumnScaler::new(method);
            let out = scaler.fit_transform(&values).map_err(|e| {
                self.emitter.fail(match e {
                    FeatureError::Degenerate(_) => FeatureError::Degenerate(format!(
                        "Column '{}' has no values to fit {} scaling",
                        column.name, method
                    )),
                    other => other,
                })
            })?;
            scaled.push((column.name.clone(), out));
        }

        let mut result = table.clone();
        for (name, values) in scaled {
            result.replace_data(&name, ColumnData::Float(values))?;
        }
        self.emitter.info(format!(
            "Applied {} scaling to {} columns",
            method,
            columns.len()
        ));
        Ok(result)
    }

    /// Масштабирует все числовые колонки таблицы
    pub fn scale(&self, table: &Table, method: ScalingMethod) -> Result<Table> {
        let columns = table.numeric_column_names();
        if columns.is_empty() {
            return Err(self.emitter.fail(FeatureError::Degenerate(
                "No numeric columns to scale".to_string(),
            )));
        }
        self.apply(table, &columns, method)
    }

    /// Масштабирует только указанные колонки; все они должны быть числовыми
    pub fn scale_columns<S: AsRef<str>>(
        &self,
        table: &Table,
        columns: &[S],
        method: ScalingMethod,
    ) -> Result<Table> {
        self.apply(table, columns, method)
    }
}

impl Default for Scaler {
    fn default() -> Self {
        Self::new()
    }
}
