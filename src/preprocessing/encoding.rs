//! Кодирование категориальных колонок

use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{FeatureError, Result};
use crate::observer::{Emitter, TransformObserver};
use crate::preprocessing::resolver::ColumnStrategyResolver;
use crate::types::{Column, ColumnData, Table};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    Label,
    OneHot,
}

impl FromStr for Encoding {
    type Err = FeatureError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "label" => Ok(Encoding::Label),
            "one_hot" | "one-hot" | "onehot" => Ok(Encoding::OneHot),
            other => Err(FeatureError::UnknownMethod {
                kind: "encoding",
                name: other.to_string(),
            }),
        }
    }
}

/// Категории колонки в лексикографическом порядке
pub fn categories(values: &[Option<String>]) -> Vec<String> {
    values
        .iter()
        .flatten()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[derive(Debug)]
pub struct Encoder {
    emitter: Emitter,
}

impl Encoder {
    pub fn new() -> Self {
        Self {
            emitter: Emitter::new("encoder"),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn TransformObserver>) -> Self {
        self.emitter = self.emitter.with_observer(observer);
        self
    }

    /// Все колонки должны существовать, быть текстовыми и без пропусков
    fn validate<'a, S: AsRef<str>>(
        &self,
        table: &'a Table,
        columns: &[S],
        operation: &str,
    ) -> Result<Vec<&'a [Option<String>]>> {
        let resolver = ColumnStrategyResolver::new(table);
        let mut validated = Vec::with_capacity(columns.len());
        for name in columns {
            let name = name.as_ref();
            let column = resolver
                .categorical(name)
                .map_err(|e| self.emitter.fail(e))?;
            if column.data.missing_count() > 0 {
                return Err(self.emitter.fail(FeatureError::MissingValues {
                    column: name.to_string(),
                    operation: operation.to_string(),
                }));
            }
            if let ColumnData::Text(values) = &column.data {
                validated.push(values.as_slice());
            }
        }
        Ok(validated)
    }

    /// Заменяет каждую категорию её номером 0..n-1 в лексикографическом порядке
    pub fn label_encode<S: AsRef<str>>(&self, table: &Table, columns: &[S]) -> Result<Table> {
        let validated = self.validate(table, columns, "label encoding")?;

        let mut result = table.clone();
        for (name, values) in columns.iter().zip(validated) {
            let cats = categories(values);
            let codes = values
                .iter()
                .map(|v| {
                    v.as_ref()
                        .and_then(|v| cats.binary_search(v).ok())
                        .map(|code| code as i64)
                })
                .collect();
            result.replace_data(name.as_ref(), ColumnData::Integer(codes))?;
            self.emitter.info(format!(
                "Label encoding applied to column '{}' ({} categories)",
                name.as_ref(),
                cats.len()
            ));
        }
        Ok(result)
    }

    /// Индикаторные колонки `<колонка>_<категория>` без первой категории; исходные колонки удаляются
    pub fn one_hot_encode<S: AsRef<str>>(&self, table: &Table, columns: &[S]) -> Result<Table> {
        let validated = self.validate(table, columns, "one-hot encoding")?;

        let mut indicators = Vec::new();
        for (name, values) in columns.iter().zip(validated) {
            let cats = categories(values);
            for cat in cats.iter().skip(1) {
                let flags = values
                    .iter()
                    .map(|v| Some(i64::from(v.as_deref() == Some(cat.as_str()))))
                    .collect();
                indicators.push(Column::integer(format!("{}_{}", name.as_ref(), cat), flags));
            }
            if let Some(dropped) = cats.first() {
                self.emitter.debug(format!(
                    "Column '{}': dropped first category '{}'",
                    name.as_ref(),
                    dropped
                ));
            }
        }

        let mut result = table.clone();
        result.drop_columns(columns)?;
        for column in indicators {
            result.push_column(column).map_err(|e| self.emitter.fail(e))?;
        }

        let names: Vec<&str> = columns.iter().map(|c| c.as_ref()).collect();
        self.emitter.info(format!(
            "One-hot encoding applied to columns: {}",
            names.join(", ")
        ));
        Ok(result)
    }

    pub fn encode<S: AsRef<str>>(
        &self,
        table: &Table,
        encoding: Encoding,
        columns: &[S],
    ) -> Result<Table> {
        match encoding {
            Encoding::Label => self.label_encode(table, columns),
            Encoding::OneHot => self.one_hot_encode(table, columns),
        }
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}
