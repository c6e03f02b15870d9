//! Группировка и агрегирование

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{FeatureError, Result};
use crate::observer::{Emitter, TransformObserver};
use crate::stats;
use crate::types::{Column, ColumnData, ColumnKind, OrderedScalar, Scalar, Table};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggFunc {
    Sum,
    Mean,
    Median,
    Min,
    Max,
    Count,
    Nunique,
    Std,
    Var,
    First,
    Last,
}

impl AggFunc {
    pub fn name(&self) -> &'static str {
        match self {
            AggFunc::Sum => "sum",
            AggFunc::Mean => "mean",
            AggFunc::Median => "median",
            AggFunc::Min => "min",
            AggFunc::Max => "max",
            AggFunc::Count => "count",
            AggFunc::Nunique => "nunique",
            AggFunc::Std => "std",
            AggFunc::Var => "var",
            AggFunc::First => "first",
            AggFunc::Last => "last",
        }
    }

    fn accepts(&self, kind: ColumnKind) -> bool {
        match self {
            AggFunc::Sum | AggFunc::Mean | AggFunc::Median | AggFunc::Std | AggFunc::Var => {
                kind.is_numeric()
            }
            AggFunc::Min | AggFunc::Max => kind.is_numeric() || kind == ColumnKind::Text,
            AggFunc::Count | AggFunc::Nunique | AggFunc::First | AggFunc::Last => true,
        }
    }

    fn output_kind(&self, input: ColumnKind) -> ColumnKind {
        match self {
            AggFunc::Count | AggFunc::Nunique => ColumnKind::Integer,
            AggFunc::Min | AggFunc::Max | AggFunc::First | AggFunc::Last => input,
            _ => ColumnKind::Float,
        }
    }

    /// Значения группы без пропусков
    fn reduce(&self, cells: &[Scalar]) -> Option<Scalar> {
        let numbers = || cells.iter().filter_map(Scalar::as_f64).collect::<Vec<_>>();
        match self {
            AggFunc::Sum => Some(Scalar::Number(numbers().iter().sum())),
            AggFunc::Mean => stats::mean(&numbers()).map(Scalar::Number),
            AggFunc::Median => stats::median(&numbers()).map(Scalar::Number),
            AggFunc::Std => stats::variance(&numbers(), 1).map(|v| Scalar::Number(v.sqrt())),
            AggFunc::Var => stats::variance(&numbers(), 1).map(Scalar::Number),
            AggFunc::Min => cells.iter().min_by(|a, b| a.total_cmp(b)).cloned(),
            AggFunc::Max => cells.iter().max_by(|a, b| a.total_cmp(b)).cloned(),
            AggFunc::Count => Some(Scalar::Number(cells.len() as f64)),
            AggFunc::Nunique => {
                let unique: BTreeSet<OrderedScalar> =
                    cells.iter().cloned().map(OrderedScalar).collect();
                Some(Scalar::Number(unique.len() as f64))
            }
            AggFunc::First => cells.first().cloned(),
            AggFunc::Last => cells.last().cloned(),
        }
    }
}

impl fmt::Display for AggFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AggFunc {
    type Err = FeatureError;

    fn from_str(s: &str) -> Result<Self> {
        let func = match s.trim().to_ascii_lowercase().as_str() {
            "sum" => AggFunc::Sum,
            "mean" | "avg" => AggFunc::Mean,
            "median" => AggFunc::Median,
            "min" => AggFunc::Min,
            "max" => AggFunc::Max,
            "count" => AggFunc::Count,
            "nunique" => AggFunc::Nunique,
            "std" => AggFunc::Std,
            "var" => AggFunc::Var,
            "first" => AggFunc::First,
            "last" => AggFunc::Last,
            _ => {
                return Err(FeatureError::UnknownMethod {
                    kind: "aggregation function",
                    name: s.to_string(),
                })
            }
        };
        Ok(func)
    }
}

#[derive(Debug)]
pub struct AggregationTransformer {
    group_by: Vec<String>,
    agg_funcs: Vec<(String, AggFunc)>,
    emitter: Emitter,
}

impl AggregationTransformer {
    pub fn new(group_by: Vec<String>, agg_funcs: Vec<(String, AggFunc)>) -> Result<Self> {
        let emitter = Emitter::new("aggregation");
        if group_by.is_empty() {
            return Err(emitter.fail(FeatureError::InvalidConfig(
                "At least one group-by column is required".to_string(),
            )));
        }
        if agg_funcs.is_empty() {
            return Err(emitter.fail(FeatureError::InvalidConfig(
                "At least one aggregation is required".to_string(),
            )));
        }
        // каждое имя становится колонкой результата ровно один раз
        let mut seen = BTreeSet::new();
        let names = group_by
            .iter()
            .chain(agg_funcs.iter().map(|(name, _)| name));
        for name in names {
            if !seen.insert(name.as_str()) {
                return Err(emitter.fail(FeatureError::InvalidConfig(format!(
                    "Column '{}' is listed more than once for aggregation",
                    name
                ))));
            }
        }
        emitter.info("Initialized aggregation transformer");
        Ok(Self {
            group_by,
            agg_funcs,
            emitter,
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn TransformObserver>) -> Self {
        self.emitter = self.emitter.with_observer(observer);
        self
    }

    fn validate(&self, table: &Table) -> Result<()> {
        for name in &self.group_by {
            table.column(name)?;
        }
        for (name, func) in &self.agg_funcs {
            let column = table.column(name)?;
            if !func.accepts(column.kind()) {
                return Err(FeatureError::type_mismatch(
                    name,
                    &format!("column supporting '{}'", func),
                    column.kind(),
                ));
            }
        }
        Ok(())
    }

    /// Одна строка на каждое сочетание значений ключей; группы по возрастанию ключа,
    /// строки с пропуском в ключе отбрасываются
    pub fn fit_transform(&self, table: &Table) -> Result<Table> {
        self.validate(table).map_err(|e| self.emitter.fail(e))?;

        let keys: Vec<&ColumnData> = self
            .group_by
            .iter()
            .map(|n| table.column(n).map(|c| &c.data))
            .collect::<Result<_>>()?;

        let mut groups: BTreeMap<Vec<OrderedScalar>, Vec<usize>> = BTreeMap::new();
        for row in 0..table.n_rows() {
            let key: Option<Vec<OrderedScalar>> =
                keys.iter().map(|k| k.cell(row).map(OrderedScalar)).collect();
            if let Some(key) = key {
                groups.entry(key).or_default().push(row);
            }
        }

        let mut columns = Vec::with_capacity(self.group_by.len() + self.agg_funcs.len());
        for (i, name) in self.group_by.iter().enumerate() {
            let values = groups.keys().map(|k| Some(k[i].0.clone())).collect();
            columns.push(Column::new(
                name.as_str(),
                ColumnData::from_scalars(keys[i].kind(), values),
            ));
        }

        for (name, func) in &self.agg_funcs {
            let data = &table.column(name)?.data;
            let values = groups
                .values()
                .map(|rows| {
                    let cells: Vec<Scalar> = rows.iter().filter_map(|&r| data.cell(r)).collect();
                    func.reduce(&cells)
                })
                .collect();
            columns.push(Column::new(
                name.as_str(),
                ColumnData::from_scalars(func.output_kind(data.kind()), values),
            ));
        }

        let result = Table::new(columns).map_err(|e| self.emitter.fail(e))?;
        self.emitter
            .info(format!("Aggregation produced {} groups", result.n_rows()));
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Table {
        Table::new(vec![
            Column::text("g", vec![Some("B"), Some("A"), Some("A"), None]),
            Column::float("x", vec![Some(5.0), Some(1.0), Some(2.0), Some(9.0)]),
            Column::text("tag", vec![Some("u"), Some("v"), None, Some("w")]),
        ])
        .unwrap()
    }

    #[test]
    fn sums_per_group_in_key_order() {
        let agg = AggregationTransformer::new(vec!["g".into()], vec![("x".into(), AggFunc::Sum)])
            .unwrap();
        let out = agg.fit_transform(&table()).unwrap();
        assert_eq!(out.column_names(), vec!["g", "x"]);
        assert_eq!(
            out.column("g").unwrap().data,
            ColumnData::Text(vec![Some("A".into()), Some("B".into())])
        );
        assert_eq!(
            out.column("x").unwrap().data,
            ColumnData::Float(vec![Some(3.0), Some(5.0)])
        );
    }

    #[test]
    fn count_and_first_skip_missing() {
        let agg = AggregationTransformer::new(
            vec!["g".into()],
            vec![("tag".into(), AggFunc::Count), ("x".into(), AggFunc::Max)],
        )
        .unwrap();
        let out = agg.fit_transform(&table()).unwrap();
        assert_eq!(
            out.column("tag").unwrap().data,
            ColumnData::Integer(vec![Some(1), Some(1)])
        );
        assert_eq!(
            out.column("x").unwrap().data,
            ColumnData::Float(vec![Some(2.0), Some(5.0)])
        );
    }

    #[test]
    fn std_of_single_value_is_missing() {
        let agg = AggregationTransformer::new(vec!["g".into()], vec![("x".into(), AggFunc::Std)])
            .unwrap();
        let out = agg.fit_transform(&table()).unwrap();
        let std = out.column("x").unwrap().data.cell(0).unwrap().as_f64().unwrap();
        assert!((std - 0.5_f64.sqrt()).abs() < 1e-12);
        assert_eq!(out.column("x").unwrap().data.cell(1), None);
    }

    #[test]
    fn unknown_columns_and_bad_types() {
        let agg = AggregationTransformer::new(vec!["nope".into()], vec![("x".into(), AggFunc::Sum)])
            .unwrap();
        assert!(matches!(
            agg.fit_transform(&table()),
            Err(FeatureError::ColumnNotFound { .. })
        ));

        let agg = AggregationTransformer::new(vec!["g".into()], vec![("tag".into(), AggFunc::Mean)])
            .unwrap();
        assert!(matches!(
            agg.fit_transform(&table()),
            Err(FeatureError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn groups_by_two_keys() {
        let t = Table::new(vec![
            Column::text(
                "region",
                vec![Some("west"), Some("east"), Some("west"), Some("east"), Some("west")],
            ),
            Column::integer(
                "year",
                vec![Some(2024), Some(2023), Some(2023), Some(2023), Some(2024)],
            ),
            Column::float(
                "sales",
                vec![Some(1.0), Some(2.0), Some(4.0), Some(8.0), Some(16.0)],
            ),
        ])
        .unwrap();
        let agg = AggregationTransformer::new(
            vec!["region".into(), "year".into()],
            vec![("sales".into(), AggFunc::Sum)],
        )
        .unwrap();
        let out = agg.fit_transform(&t).unwrap();

        assert_eq!(out.n_rows(), 3);
        assert_eq!(out.column_names(), vec!["region", "year", "sales"]);
        assert_eq!(
            out.column("region").unwrap().data,
            ColumnData::Text(vec![Some("east".into()), Some("west".into()), Some("west".into())])
        );
        assert_eq!(
            out.column("year").unwrap().data,
            ColumnData::Integer(vec![Some(2023), Some(2023), Some(2024)])
        );
        assert_eq!(
            out.column("sales").unwrap().data,
            ColumnData::Float(vec![Some(10.0), Some(4.0), Some(17.0)])
        );
    }

    #[test]
    fn construction_checks() {
        assert!(AggregationTransformer::new(vec![], vec![("x".into(), AggFunc::Sum)]).is_err());
        assert!(AggregationTransformer::new(vec!["g".into()], vec![]).is_err());

        let twice = vec![("x".into(), AggFunc::Sum), ("x".into(), AggFunc::Mean)];
        assert!(matches!(
            AggregationTransformer::new(vec!["g".into()], twice),
            Err(FeatureError::InvalidConfig(_))
        ));
        let key_reused = vec![("g".into(), AggFunc::Count)];
        assert!(matches!(
            AggregationTransformer::new(vec!["g".into()], key_reused),
            Err(FeatureError::InvalidConfig(_))
        ));
        assert_eq!("avg".parse::<AggFunc>().unwrap(), AggFunc::Mean);
        assert!("mode".parse::<AggFunc>().is_err());
    }
}
