/// Типы данных: таблица, колонки, скалярные значения

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{FeatureError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Float,
    Integer,
    Text,
    DateTime,
    Boolean,
}

impl ColumnKind {
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnKind::Float | ColumnKind::Integer)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnKind::Float => "float",
            ColumnKind::Integer => "integer",
            ColumnKind::Text => "text",
            ColumnKind::DateTime => "datetime",
            ColumnKind::Boolean => "boolean",
        }
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Одно непустое значение ячейки
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Number(f64),
    Text(String),
    DateTime(NaiveDateTime),
}

impl Scalar {
    fn rank(&self) -> u8 {
        match self {
            Scalar::Bool(_) => 0,
            Scalar::Number(_) => 1,
            Scalar::Text(_) => 2,
            Scalar::DateTime(_) => 3,
        }
    }

    /// Полный порядок: внутри одного варианта естественный, между вариантами по рангу
    pub fn total_cmp(&self, other: &Scalar) -> Ordering {
        match (self, other) {
            (Scalar::Bool(a), Scalar::Bool(b)) => a.cmp(b),
            (Scalar::Number(a), Scalar::Number(b)) => a.total_cmp(b),
            (Scalar::Text(a), Scalar::Text(b)) => a.cmp(b),
            (Scalar::DateTime(a), Scalar::DateTime(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Number(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(v) => write!(f, "{}", v),
            Scalar::Number(v) => write!(f, "{}", v),
            Scalar::Text(v) => f.write_str(v),
            Scalar::DateTime(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

/// Обёртка с `Ord` для ключей группировки и множеств значений
#[derive(Debug, Clone)]
pub(crate) struct OrderedScalar(pub Scalar);

impl PartialEq for OrderedScalar {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OrderedScalar {}

impl PartialOrd for OrderedScalar {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedScalar {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Значения колонки; `None` означает пропуск
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "values", rename_all = "snake_case")]
pub enum ColumnData {
    Float(Vec<Option<f64>>),
    Integer(Vec<Option<i64>>),
    Text(Vec<Option<String>>),
    DateTime(Vec<Option<NaiveDateTime>>),
    Boolean(Vec<Option<bool>>),
}

impl ColumnData {
    pub fn kind(&self) -> ColumnKind {
        match self {
            ColumnData::Float(_) => ColumnKind::Float,
            ColumnData::Integer(_) => ColumnKind::Integer,
            ColumnData::Text(_) => ColumnKind::Text,
            ColumnData::DateTime(_) => ColumnKind::DateTime,
            ColumnData::Boolean(_) => ColumnKind::Boolean,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnData::Float(v) => v.len(),
            ColumnData::Integer(v) => v.len(),
            ColumnData::Text(v) => v.len(),
            ColumnData::DateTime(v) => v.len(),
            ColumnData::Boolean(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_missing(&self, row: usize) -> bool {
        match self {
            ColumnData::Float(v) => v[row].is_none(),
            ColumnData::Integer(v) => v[row].is_none(),
            ColumnData::Text(v) => v[row].is_none(),
            ColumnData::DateTime(v) => v[row].is_none(),
            ColumnData::Boolean(v) => v[row].is_none(),
        }
    }

    pub fn missing_count(&self) -> usize {
        (0..self.len()).filter(|&i| self.is_missing(i)).count()
    }

    /// Значения числовой колонки как f64; `None` для нечисловых колонок
    pub fn numeric_values(&self) -> Option<Vec<Option<f64>>> {
        match self {
            ColumnData::Float(v) => Some(v.clone()),
            ColumnData::Integer(v) => Some(v.iter().map(|x| x.map(|x| x as f64)).collect()),
            _ => None,
        }
    }

    pub fn cell(&self, row: usize) -> Option<Scalar> {
        match self {
            ColumnData::Float(v) => v[row].map(Scalar::Number),
            ColumnData::Integer(v) => v[row].map(|x| Scalar::Number(x as f64)),
            ColumnData::Text(v) => v[row].clone().map(Scalar::Text),
            ColumnData::DateTime(v) => v[row].map(Scalar::DateTime),
            ColumnData::Boolean(v) => v[row].map(Scalar::Bool),
        }
    }

    /// Собирает колонку заданного типа; значения другого типа становятся пропусками
    pub fn from_scalars(kind: ColumnKind, values: Vec<Option<Scalar>>) -> ColumnData {
        match kind {
            ColumnKind::Float => ColumnData::Float(
                values.into_iter().map(|v| v.and_then(|s| s.as_f64())).collect(),
            ),
            ColumnKind::Integer => ColumnData::Integer(
                values
                    .into_iter()
                    .map(|v| v.and_then(|s| s.as_f64()).map(|x| x as i64))
                    .collect(),
            ),
            ColumnKind::Text => ColumnData::Text(
                values
                    .into_iter()
                    .map(|v| match v {
                        Some(Scalar::Text(s)) => Some(s),
                        _ => None,
                    })
                    .collect(),
            ),
            ColumnKind::DateTime => ColumnData::DateTime(
                values
                    .into_iter()
                    .map(|v| match v {
                        Some(Scalar::DateTime(d)) => Some(d),
                        _ => None,
                    })
                    .collect(),
            ),
            ColumnKind::Boolean => ColumnData::Boolean(
                values
                    .into_iter()
                    .map(|v| match v {
                        Some(Scalar::Bool(b)) => Some(b),
                        _ => None,
                    })
                    .collect(),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn float(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self::new(name, ColumnData::Float(values))
    }

    pub fn integer(name: impl Into<String>, values: Vec<Option<i64>>) -> Self {
        Self::new(name, ColumnData::Integer(values))
    }

    pub fn text<S: Into<String>>(name: impl Into<String>, values: Vec<Option<S>>) -> Self {
        Self::new(
            name,
            ColumnData::Text(values.into_iter().map(|v| v.map(Into::into)).collect()),
        )
    }

    pub fn datetime(name: impl Into<String>, values: Vec<Option<NaiveDateTime>>) -> Self {
        Self::new(name, ColumnData::DateTime(values))
    }

    pub fn boolean(name: impl Into<String>, values: Vec<Option<bool>>) -> Self {
        Self::new(name, ColumnData::Boolean(values))
    }

    pub fn kind(&self) -> ColumnKind {
        self.data.kind()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Deserialize)]
struct RawTable {
    columns: Vec<Column>,
}

impl TryFrom<RawTable> for Table {
    type Error = FeatureError;

    fn try_from(raw: RawTable) -> Result<Self> {
        Table::new(raw.columns)
    }
}

/// Упорядоченный набор именованных колонок одинаковой длины
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "RawTable")]
pub struct Table {
    columns: Vec<Column>,
}

impl Table {
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let mut table = Table::default();
        for column in columns {
            table.push_column(column)?;
        }
        Ok(table)
    }

    pub fn n_rows(&self) -> usize {
        self.columns.first().map(|c| c.len()).unwrap_or(0)
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn column(&self, name: &str) -> Result<&Column> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| FeatureError::not_found(name))
    }

    /// Имена числовых колонок в порядке таблицы
    pub fn numeric_column_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.kind().is_numeric())
            .map(|c| c.name.clone())
            .collect()
    }

    fn check_length(&self, column: &Column) -> Result<()> {
        if !self.columns.is_empty() && column.len() != self.n_rows() {
            return Err(FeatureError::LengthMismatch {
                column: column.name.clone(),
                expected: self.n_rows(),
                actual: column.len(),
            });
        }
        Ok(())
    }

    /// Добавляет колонку в конец; имя должно быть новым
    pub fn push_column(&mut self, column: Column) -> Result<()> {
        if self.has_column(&column.name) {
            return Err(FeatureError::DuplicateColumn {
                column: column.name,
            });
        }
        self.check_length(&column)?;
        self.columns.push(column);
        Ok(())
    }

    /// Заменяет колонку с тем же именем на месте или добавляет в конец
    pub fn set_column(&mut self, column: Column) -> Result<()> {
        match self.position(&column.name) {
            Some(idx) => {
                if self.columns.len() > 1 {
                    self.check_length(&column)?;
                }
                self.columns[idx] = column;
                Ok(())
            }
            None => self.push_column(column),
        }
    }

    /// Заменяет данные существующей колонки, сохраняя её позицию
    pub fn replace_data(&mut self, name: &str, data: ColumnData) -> Result<()> {
        let idx = self.position(name).ok_or_else(|| FeatureError::not_found(name))?;
        if data.len() != self.n_rows() {
            return Err(FeatureError::LengthMismatch {
                column: name.to_string(),
                expected: self.n_rows(),
                actual: data.len(),
            });
        }
        self.columns[idx].data = data;
        Ok(())
    }

    /// Удаляет колонки; сначала проверяет все имена
    pub fn drop_columns<S: AsRef<str>>(&mut self, names: &[S]) -> Result<()> {
        for name in names {
            self.column(name.as_ref())?;
        }
        let drop: HashSet<&str> = names.iter().map(|n| n.as_ref()).collect();
        self.columns.retain(|c| !drop.contains(c.name.as_str()));
        Ok(())
    }

    /// Новая таблица из указанных колонок в указанном порядке
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Table> {
        let columns = names
            .iter()
            .map(|n| self.column(n.as_ref()).cloned())
            .collect::<Result<Vec<_>>>()?;
        Table::new(columns)
    }

    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }
}
