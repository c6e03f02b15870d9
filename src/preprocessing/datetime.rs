//! Извлечение календарных признаков из колонки даты/времени

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{FeatureError, Result};
use crate::observer::{Emitter, TransformObserver};
use crate::types::{Column, ColumnData, Table};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y"];

/// Разбор даты/времени из строки в одном из распространённых форматов
pub fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    // календарные поля берутся из времени в том виде, как оно записано
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_local());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(value, f).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(value, f).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateTimeField {
    Year,
    Month,
    Day,
    DayOfWeek,
}

impl DateTimeField {
    pub const ALL: [DateTimeField; 4] = [
        DateTimeField::Year,
        DateTimeField::Month,
        DateTimeField::Day,
        DateTimeField::DayOfWeek,
    ];

    pub fn suffix(&self) -> &'static str {
        match self {
            DateTimeField::Year => "year",
            DateTimeField::Month => "month",
            DateTimeField::Day => "day",
            DateTimeField::DayOfWeek => "day_of_week",
        }
    }

    fn extract(&self, dt: &NaiveDateTime) -> i64 {
        match self {
            DateTimeField::Year => dt.year() as i64,
            DateTimeField::Month => dt.month() as i64,
            DateTimeField::Day => dt.day() as i64,
            // понедельник = 0
            DateTimeField::DayOfWeek => dt.weekday().num_days_from_monday() as i64,
        }
    }
}

impl FromStr for DateTimeField {
    type Err = FeatureError;

    fn from_str(s: &str) -> Result<Self> {
        let key: String = s
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        match key.as_str() {
            "year" => Ok(DateTimeField::Year),
            "month" => Ok(DateTimeField::Month),
            "day" => Ok(DateTimeField::Day),
            "dayofweek" | "weekday" => Ok(DateTimeField::DayOfWeek),
            _ => Err(FeatureError::UnknownMethod {
                kind: "datetime field",
                name: s.to_string(),
            }),
        }
    }
}

/// Владеет таблицей; исходная колонка приводится к datetime при создании
#[derive(Debug)]
pub struct DateTimeExtractor {
    table: Table,
    column: String,
    parsed: Vec<Option<NaiveDateTime>>,
    emitter: Emitter,
}

impl DateTimeExtractor {
    pub fn new(table: Table, column: &str) -> Result<Self> {
        Self::with_observer(table, column, crate::observer::default_observer())
    }

    pub fn with_observer(
        mut table: Table,
        column: &str,
        observer: Arc<dyn TransformObserver>,
    ) -> Result<Self> {
        let emitter = Emitter::new("datetime").with_observer(observer);
        let source = table.column(column).map_err(|e| emitter.fail(e))?;

        let parsed = match &source.data {
            ColumnData::DateTime(values) => values.clone(),
            ColumnData::Text(values) => values
                .iter()
                .map(|v| match v {
                    None => Ok(None),
                    Some(s) => parse_datetime(s).map(Some).ok_or_else(|| {
                        FeatureError::DateTimeParse {
                            column: column.to_string(),
                            value: s.clone(),
                        }
                    }),
                })
                .collect::<Result<Vec<_>>>()
                .map_err(|e| emitter.fail(e))?,
            other => {
                return Err(emitter.fail(FeatureError::type_mismatch(
                    column,
                    "datetime",
                    other.kind(),
                )))
            }
        };

        table.replace_data(column, ColumnData::DateTime(parsed.clone()))?;
        emitter.info(format!("Parsed column '{}' as datetime", column));

        Ok(Self {
            table,
            column: column.to_string(),
            parsed,
            emitter,
        })
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn into_table(self) -> Table {
        self.table
    }

    /// Добавляет или перезаписывает колонку `<source>_<field>`
    pub fn extract(&mut self, field: DateTimeField) -> &Table {
        let name = format!("{}_{}", self.column, field.suffix());
        let values = self
            .parsed
            .iter()
            .map(|v| v.as_ref().map(|dt| field.extract(dt)))
            .collect();
        // длина совпадает с таблицей по построению
        if let Err(e) = self.table.set_column(Column::integer(name.as_str(), values)) {
            self.emitter.fail(e);
        } else {
            self.emitter.debug(format!("Extracted '{}'", name));
        }
        &self.table
    }

    pub fn extract_year(&mut self) -> &Table {
        self.extract(DateTimeField::Year)
    }

    pub fn extract_month(&mut self) -> &Table {
        self.extract(DateTimeField::Month)
    }

    pub fn extract_day(&mut self) -> &Table {
        self.extract(DateTimeField::Day)
    }

    pub fn extract_day_of_week(&mut self) -> &Table {
        self.extract(DateTimeField::DayOfWeek)
    }

    pub fn extract_features(&mut self, fields: &[DateTimeField]) -> &Table {
        for field in fields {
            self.extract(*field);
        }
        self.emitter.info(format!(
            "Extracted {} datetime features from '{}'",
            fields.len(),
            self.column
        ));
        &self.table
    }

    pub fn extract_all(&mut self) -> &Table {
        self.extract_features(&DateTimeField::ALL)
    }
}
