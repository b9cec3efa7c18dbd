//! Serialization-agnostic report rows and their text renderers

use serde::Serialize;
use std::fmt::{self, Write};

use crate::compare::ComparisonResult;
use crate::metrics::{AggregateSnapshot, GroupedSnapshot};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Text(String),
    Number(f64),
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Text(s) => f.write_str(s),
            Cell::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for Cell {
    fn from(v: &str) -> Self {
        Cell::Text(v.to_string())
    }
}

impl From<String> for Cell {
    fn from(v: String) -> Self {
        Cell::Text(v)
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::Number(v)
    }
}

impl From<u64> for Cell {
    fn from(v: u64) -> Self {
        Cell::Number(v as f64)
    }
}

/// One report line: ordered column name -> value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportRow(Vec<(String, Cell)>);

impl ExportRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &str, value: impl Into<Cell>) -> Self {
        self.0.push((column.to_string(), value.into()));
        self
    }

    pub fn get(&self, column: &str) -> Option<&Cell> {
        self.0.iter().find(|(c, _)| c == column).map(|(_, v)| v)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(c, _)| c.as_str())
    }
}

impl Serialize for ExportRow {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (column, value) in &self.0 {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn metric_columns(row: ExportRow, s: &AggregateSnapshot) -> ExportRow {
    row.with("impressions", s.impressions)
        .with("clicks", s.clicks)
        .with("ctr", round2(s.ctr_percent()))
        .with("investment", round2(s.investment))
        .with("revenue", round2(s.revenue))
        .with("roi", round2(s.roi()))
        .with("roas", round2(s.roas()))
}

pub fn snapshot_row(label: &str, snapshot: &AggregateSnapshot) -> ExportRow {
    metric_columns(ExportRow::new().with("label", label), snapshot)
}

pub fn grouped_rows(buckets: &[GroupedSnapshot]) -> Vec<ExportRow> {
    buckets
        .iter()
        .map(|b| snapshot_row(&b.bucket.to_string(), &b.snapshot))
        .collect()
}

/// Two rows (A and B) carrying the shared verdict
pub fn comparison_rows(result: &ComparisonResult) -> Vec<ExportRow> {
    let winner = serde_json::to_value(result.winner)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();

    [("A", &result.a), ("B", &result.b)]
        .into_iter()
        .map(|(label, snapshot)| {
            snapshot_row(label, snapshot)
                .with("winner", winner.as_str())
                .with("confidence", round2(result.confidence))
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Tsv,
    Html,
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Tsv => "text/tab-separated-values; charset=utf-8",
            ExportFormat::Html => "text/html; charset=utf-8",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Tsv => "tsv",
            ExportFormat::Html => "html",
        }
    }

    pub fn render(&self, rows: &[ExportRow]) -> String {
        match self {
            ExportFormat::Csv => to_csv(rows),
            ExportFormat::Tsv => to_tsv(rows),
            ExportFormat::Html => to_html_table(rows),
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "tsv" | "excel" => Ok(ExportFormat::Tsv),
            "html" | "pdf" => Ok(ExportFormat::Html),
            other => Err(format!("unsupported export format '{other}'")),
        }
    }
}

/// Header is taken from the first row
fn header(rows: &[ExportRow]) -> Vec<String> {
    rows.first()
        .map(|r| r.columns().map(str::to_string).collect())
        .unwrap_or_default()
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

pub fn to_csv(rows: &[ExportRow]) -> String {
    let columns = header(rows);
    let mut out = String::new();
    out.push_str(&columns.iter().map(|c| csv_field(c)).collect::<Vec<_>>().join(","));
    out.push('\n');
    for row in rows {
        let line = columns
            .iter()
            .map(|c| row.get(c).map(|v| csv_field(&v.to_string())).unwrap_or_default())
            .collect::<Vec<_>>()
            .join(",");
        out.push_str(&line);
        out.push('\n');
    }
    out
}

fn tsv_field(value: &str) -> String {
    value.replace(['\t', '\n', '\r'], " ")
}

pub fn to_tsv(rows: &[ExportRow]) -> String {
    let columns = header(rows);
    let mut out = String::new();
    out.push_str(&columns.iter().map(|c| tsv_field(c)).collect::<Vec<_>>().join("\t"));
    out.push('\n');
    for row in rows {
        let line = columns
            .iter()
            .map(|c| row.get(c).map(|v| tsv_field(&v.to_string())).unwrap_or_default())
            .collect::<Vec<_>>()
            .join("\t");
        out.push_str(&line);
        out.push('\n');
    }
    out
}

fn html_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Printable table; the caller wraps it in a page if needed
pub fn to_html_table(rows: &[ExportRow]) -> String {
    let columns = header(rows);
    let mut out = String::from("<table>\n<thead><tr>");
    for c in &columns {
        let _ = write!(out, "<th>{}</th>", html_escape(c));
    }
    out.push_str("</tr></thead>\n<tbody>\n");
    for row in rows {
        out.push_str("<tr>");
        for c in &columns {
            let value = row.get(c).map(|v| v.to_string()).unwrap_or_default();
            let _ = write!(out, "<td>{}</td>", html_escape(&value));
        }
        out.push_str("</tr>\n");
    }
    out.push_str("</tbody>\n</table>\n");
    out
}
