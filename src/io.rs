//! Чтение и запись таблиц в CSV

use std::io::{Read, Write};
use std::path::Path;

use csv::{ReaderBuilder, Writer};

use crate::error::{FeatureError, Result};
use crate::types::{Column, ColumnData, Table};

/// Значения, которые считаются пропуском
const MISSING_TOKENS: &[&str] = &["", "NA", "NaN", "nan", "null", "None"];

fn is_missing(token: &str) -> bool {
    MISSING_TOKENS.contains(&token.trim())
}

fn parse_bool(token: &str) -> Option<bool> {
    match token.trim().to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Integer → Float → Boolean → Text; колонка из одних пропусков становится Float
fn infer_column(name: String, raw: Vec<Option<String>>) -> Column {
    let present = || raw.iter().flatten().map(|s| s.trim());

    let data = if present().all(|s| s.parse::<i64>().is_ok()) && present().next().is_some() {
        ColumnData::Integer(
            raw.iter()
                .map(|v| v.as_deref().and_then(|s| s.trim().parse().ok()))
                .collect(),
        )
    } else if present().all(|s| s.parse::<f64>().is_ok()) {
        ColumnData::Float(
            raw.iter()
                .map(|v| v.as_deref().and_then(|s| s.trim().parse().ok()))
                .collect(),
        )
    } else if present().all(|s| parse_bool(s).is_some()) {
        ColumnData::Boolean(raw.iter().map(|v| v.as_deref().and_then(parse_bool)).collect())
    } else {
        ColumnData::Text(raw)
    };
    Column::new(name, data)
}

pub fn read_csv<R: Read>(reader: R) -> Result<Table> {
    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(reader);
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
        return Err(FeatureError::Degenerate(
            "CSV input has no header row".to_string(),
        ));
    }

    let mut raw: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
    for record in reader.records() {
        let record = record?;
        for (values, field) in raw.iter_mut().zip(record.iter()) {
            values.push(if is_missing(field) {
                None
            } else {
                Some(field.to_string())
            });
        }
    }

    let columns = headers
        .into_iter()
        .zip(raw)
        .map(|(name, values)| infer_column(name, values))
        .collect();
    let table = Table::new(columns)?;
    tracing::debug!(
        rows = table.n_rows(),
        columns = table.n_cols(),
        "CSV parsed"
    );
    Ok(table)
}

pub fn read_csv_path<P: AsRef<Path>>(path: P) -> Result<Table> {
    let file = std::fs::File::open(path)?;
    read_csv(file)
}

fn format_cell(data: &ColumnData, row: usize) -> String {
    match data {
        ColumnData::Float(v) => v[row].map(|x| format!("{:?}", x)),
        ColumnData::Integer(v) => v[row].map(|x| x.to_string()),
        ColumnData::Text(v) => v[row].clone(),
        ColumnData::DateTime(v) => v[row].map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string()),
        ColumnData::Boolean(v) => v[row].map(|b| b.to_string()),
    }
    .unwrap_or_default()
}

/// Пропуски записываются пустыми ячейками
pub fn write_csv<W: Write>(table: &Table, writer: W) -> Result<()> {
    let mut writer = Writer::from_writer(writer);
    writer.write_record(table.column_names())?;
    for row in 0..table.n_rows() {
        writer.write_record(table.columns().iter().map(|c| format_cell(&c.data, row)))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_csv_path<P: AsRef<Path>>(table: &Table, path: P) -> Result<()> {
    let file = std::fs::File::create(path)?;
    write_csv(table, file)
}

pub fn to_csv_string(table: &Table) -> Result<String> {
    let mut buffer = Vec::new();
    write_csv(table, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| FeatureError::Degenerate(e.to_string()))
}
