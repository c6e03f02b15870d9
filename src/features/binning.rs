//! Разбиение числовых колонок на интервалы

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{FeatureError, Result};
use crate::observer::{Emitter, TransformObserver};
use crate::preprocessing::resolver::ColumnStrategyResolver;
use crate::stats;
use crate::types::{Column, Table};

/// Наибольшее число интервалов для equal_width и equal_frequency
pub const MAX_BINS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinningStrategy {
    EqualWidth,
    EqualFrequency,
    Custom,
}

impl fmt::Display for BinningStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BinningStrategy::EqualWidth => "equal_width",
            BinningStrategy::EqualFrequency => "equal_frequency",
            BinningStrategy::Custom => "custom",
        })
    }
}

impl FromStr for BinningStrategy {
    type Err = FeatureError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "equal_width" => Ok(BinningStrategy::EqualWidth),
            "equal_frequency" => Ok(BinningStrategy::EqualFrequency),
            "custom" => Ok(BinningStrategy::Custom),
            other => Err(FeatureError::UnknownMethod {
                kind: "binning strategy",
                name: other.to_string(),
            }),
        }
    }
}

/// Число с не более чем тремя знаками после запятой
fn format_edge(v: f64) -> String {
    let s = format!("{:.3}", v);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

/// Метки интервалов: первый `[lo, hi]` если нижняя граница включена, остальные `(lo, hi]`
fn interval_labels(edges: &[f64], include_lowest: bool) -> Vec<String> {
    edges
        .windows(2)
        .enumerate()
        .map(|(i, w)| {
            let open = if i == 0 && include_lowest { '[' } else { '(' };
            format!("{}{}, {}]", open, format_edge(w[0]), format_edge(w[1]))
        })
        .collect()
}

/// Номер интервала `(edges[i], edges[i+1]]`; первый интервал включает левую границу
fn bin_index(edges: &[f64], value: f64, include_lowest: bool) -> Option<usize> {
    let n = edges.len();
    if n < 2 || value.is_nan() {
        return None;
    }
    if include_lowest && value == edges[0] {
        return Some(0);
    }
    if value <= edges[0] || value > edges[n - 1] {
        return None;
    }
    // первая граница >= value
    let pos = edges.partition_point(|&e| e < value);
    Some(pos - 1)
}

#[derive(Debug)]
pub struct BinningTransformer {
    columns: Vec<String>,
    strategy: BinningStrategy,
    bins: usize,
    custom_bins: Option<Vec<f64>>,
    edges: BTreeMap<String, Vec<f64>>,
    emitter: Emitter,
}

impl BinningTransformer {
    pub fn new(
        columns: Vec<String>,
        strategy: BinningStrategy,
        bins: usize,
        custom_bins: Option<Vec<f64>>,
    ) -> Result<Self> {
        let emitter = Emitter::new("binning");
        match strategy {
            BinningStrategy::Custom => {
                let edges = custom_bins.as_deref().unwrap_or(&[]);
                if edges.len() < 2 {
                    return Err(emitter.fail(FeatureError::InvalidConfig(
                        "Custom bins must be a list with at least two elements".to_string(),
                    )));
                }
                if edges.windows(2).any(|w| !(w[0] < w[1])) {
                    return Err(emitter.fail(FeatureError::InvalidConfig(
                        "Custom bins must increase monotonically".to_string(),
                    )));
                }
            }
            _ => {
                if bins < 1 || bins > MAX_BINS {
                    return Err(emitter.fail(FeatureError::InvalidConfig(format!(
                        "Number of bins must be between 1 and {}, got {}",
                        MAX_BINS, bins
                    ))));
                }
            }
        }
        emitter.info(format!("Initialized binning with strategy '{}'", strategy));
        Ok(Self {
            columns,
            strategy,
            bins,
            custom_bins,
            edges: BTreeMap::new(),
            emitter,
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn TransformObserver>) -> Self {
        self.emitter = self.emitter.with_observer(observer);
        self
    }

    /// Границы, посчитанные при последнем `fit_transform`
    pub fn edges(&self) -> &BTreeMap<String, Vec<f64>> {
        &self.edges
    }

    /// Границы интервалов для значений колонки
    pub fn compute_edges(&self, values: &[f64]) -> Result<Vec<f64>> {
        match self.strategy {
            BinningStrategy::Custom => Ok(self.custom_bins.clone().unwrap_or_default()),
            BinningStrategy::EqualWidth => {
                let (mut min, mut max) = stats::min_max(values)
                    .ok_or_else(|| FeatureError::Degenerate("no values to bin".to_string()))?;
                if min == max {
                    let pad = if min != 0.0 { 0.001 * min.abs() } else { 0.001 };
                    min -= pad;
                    max += pad;
                    let step = (max - min) / self.bins as f64;
                    return Ok((0..=self.bins).map(|i| min + step * i as f64).collect());
                }
                let step = (max - min) / self.bins as f64;
                let mut edges: Vec<f64> = (0..=self.bins).map(|i| min + step * i as f64).collect();
                edges[self.bins] = max;
                // нижняя граница слегка расширяется, чтобы минимум попал в первый интервал
                edges[0] -= (max - min) * 0.001;
                Ok(edges)
            }
            BinningStrategy::EqualFrequency => {
                let sorted = stats::sorted(values);
                let mut edges: Vec<f64> = Vec::new();
                for i in 0..=self.bins {
                    let q = stats::quantile_sorted(&sorted, i as f64 / self.bins as f64)
                        .ok_or_else(|| FeatureError::Degenerate("no values to bin".to_string()))?;
                    // повторяющиеся границы схлопываются
                    if edges.last().map_or(true, |last| *last < q) {
                        edges.push(q);
                    }
                }
                if edges.len() < 2 {
                    return Err(FeatureError::Degenerate(
                        "bin edges collapse to a single value".to_string(),
                    ));
                }
                Ok(edges)
            }
        }
    }

    fn bin_column(&self, table: &Table, name: &str) -> Result<(Column, Vec<f64>)> {
        let column = ColumnStrategyResolver::new(table).numeric(name)?;
        let values = column.data.numeric_values().unwrap_or_default();
        let edges = self
            .compute_edges(&stats::present(&values))
            .map_err(|e| match e {
                FeatureError::Degenerate(msg) => {
                    FeatureError::Degenerate(format!("Failed to bin column '{}': {}", name, msg))
                }
                other => other,
            })?;

        let include_lowest = self.strategy != BinningStrategy::EqualWidth;
        let labels = interval_labels(&edges, include_lowest);
        let binned: Vec<Option<String>> = values
            .iter()
            .map(|v| {
                v.and_then(|v| bin_index(&edges, v, include_lowest))
                    .map(|i| labels[i].clone())
            })
            .collect();
        Ok((Column::text(format!("{}_binned", name), binned), edges))
    }

    /// Добавляет `<колонка>_binned` для каждой колонки по очереди.
    /// При ошибке на очередной колонке уже добавленные колонки остаются в таблице.
    pub fn fit_transform(&mut self, table: &mut Table) -> Result<()> {
        self.edges.clear();
        for name in self.columns.clone() {
            let (column, edges) = self
                .bin_column(table, &name)
                .map_err(|e| self.emitter.fail(e))?;
            table.set_column(column)?;
            let effective = edges.len() - 1;
            if effective < self.bins && self.strategy == BinningStrategy::EqualFrequency {
                self.emitter.warn(format!(
                    "Column '{}' has repeated quantiles: {} of {} bins remain",
                    name, effective, self.bins
                ));
            }
            self.edges.insert(name.clone(), edges);
            self.emitter.info(format!(
                "Successfully binned column '{}' with strategy '{}'",
                name, self.strategy
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::{EventLevel, RecordingObserver};
    use crate::types::ColumnData;

    fn labels(table: &Table, name: &str) -> Vec<Option<String>> {
        match &table.column(name).unwrap().data {
            ColumnData::Text(v) => v.clone(),
            other => panic!("unexpected {:?}", other.kind()),
        }
    }

    #[test]
    fn equal_width_covers_range() {
        let mut t = Table::new(vec![Column::float(
            "x",
            (0..=8).map(|v| Some(v as f64)).collect(),
        )])
        .unwrap();
        let mut binner =
            BinningTransformer::new(vec!["x".into()], BinningStrategy::EqualWidth, 4, None)
                .unwrap();
        binner.fit_transform(&mut t).unwrap();

        let edges = &binner.edges()["x"];
        assert_eq!(edges.len(), 5);
        assert!(edges[0] < 0.0 && edges[4] == 8.0);
        assert_eq!(&edges[1..], &[2.0, 4.0, 6.0, 8.0]);

        let out = labels(&t, "x_binned");
        assert_eq!(out[0].as_deref(), Some("(-0.008, 2]"));
        assert_eq!(out[2].as_deref(), Some("(-0.008, 2]"));
        assert_eq!(out[3].as_deref(), Some("(2, 4]"));
        assert_eq!(out[8].as_deref(), Some("(6, 8]"));
        // исходная колонка сохраняется
        assert_eq!(t.column_names(), vec!["x", "x_binned"]);
    }

    #[test]
    fn equal_frequency_collapses_duplicate_edges() {
        let mut t = Table::new(vec![Column::float(
            "x",
            vec![Some(1.0), Some(1.0), Some(1.0), Some(1.0), Some(2.0), Some(3.0)],
        )])
        .unwrap();
        let observer = RecordingObserver::new();
        let mut binner =
            BinningTransformer::new(vec!["x".into()], BinningStrategy::EqualFrequency, 4, None)
                .unwrap()
                .with_observer(observer.clone());
        binner.fit_transform(&mut t).unwrap();
        assert_eq!(binner.edges()["x"], vec![1.0, 1.75, 3.0]);
        let warnings = observer.messages(EventLevel::Warn);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("2 of 4 bins"));
        let out = labels(&t, "x_binned");
        assert!(out.iter().all(|l| l.is_some()));
        assert_eq!(out[0].as_deref(), Some("[1, 1.75]"));
    }

    #[test]
    fn equal_frequency_on_constant_column_fails() {
        let mut t = Table::new(vec![Column::float("k", vec![Some(3.0); 4])]).unwrap();
        let mut binner =
            BinningTransformer::new(vec!["k".into()], BinningStrategy::EqualFrequency, 3, None)
                .unwrap();
        let err = binner.fit_transform(&mut t).unwrap_err();
        assert!(matches!(err, FeatureError::Degenerate(_)));
    }

    #[test]
    fn custom_edges_and_out_of_range() {
        let mut t = Table::new(vec![Column::integer(
            "age",
            vec![Some(0), Some(17), Some(18), Some(65), Some(90), None],
        )])
        .unwrap();
        let mut binner = BinningTransformer::new(
            vec!["age".into()],
            BinningStrategy::Custom,
            0,
            Some(vec![0.0, 18.0, 65.0]),
        )
        .unwrap();
        binner.fit_transform(&mut t).unwrap();
        let out = labels(&t, "age_binned");
        assert_eq!(out[0].as_deref(), Some("[0, 18]"));
        assert_eq!(out[2].as_deref(), Some("[0, 18]"));
        assert_eq!(out[3].as_deref(), Some("(18, 65]"));
        assert_eq!(out[4], None);
        assert_eq!(out[5], None);
    }

    #[test]
    fn malformed_custom_bins_are_rejected() {
        for edges in [None, Some(vec![1.0]), Some(vec![3.0, 1.0])] {
            let err = BinningTransformer::new(vec!["x".into()], BinningStrategy::Custom, 0, edges)
                .unwrap_err();
            assert!(matches!(err, FeatureError::InvalidConfig(_)));
        }
        assert!(matches!(
            "quantile".parse::<BinningStrategy>(),
            Err(FeatureError::UnknownMethod { .. })
        ));
    }

    #[test]
    fn bin_count_is_bounded() {
        for bins in [0, MAX_BINS + 1, usize::MAX] {
            for strategy in [BinningStrategy::EqualWidth, BinningStrategy::EqualFrequency] {
                let err = BinningTransformer::new(vec!["x".into()], strategy, bins, None)
                    .unwrap_err();
                assert!(matches!(err, FeatureError::InvalidConfig(_)));
            }
        }

        let mut t = Table::new(vec![Column::float("x", vec![Some(0.0), Some(1.0)])]).unwrap();
        let mut binner =
            BinningTransformer::new(vec!["x".into()], BinningStrategy::EqualWidth, MAX_BINS, None)
                .unwrap();
        binner.fit_transform(&mut t).unwrap();
        assert_eq!(binner.edges()["x"].len(), MAX_BINS + 1);
    }

    #[test]
    fn failure_keeps_earlier_columns() {
        let mut t = Table::new(vec![
            Column::float("a", vec![Some(1.0), Some(2.0)]),
            Column::text("b", vec![Some("x"), Some("y")]),
        ])
        .unwrap();
        let mut binner = BinningTransformer::new(
            vec!["a".into(), "b".into()],
            BinningStrategy::EqualWidth,
            2,
            None,
        )
        .unwrap();
        let err = binner.fit_transform(&mut t).unwrap_err();
        assert!(matches!(err, FeatureError::TypeMismatch { .. }));
        assert!(t.has_column("a_binned"));
        assert!(!t.has_column("b_binned"));
    }
}
