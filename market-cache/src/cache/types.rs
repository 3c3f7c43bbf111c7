//! Core type definitions for the cache system

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Cache key type: `{subject}_{kind}_{hash}`
pub type CacheKey = String;

/// Category of cached data
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DataKind {
    /// Price/volume history for a symbol
    QuoteSeries,

    /// News articles
    News,

    /// Financial statements and ratios
    Fundamentals,

    /// Any other category; routed to the cache root
    Custom(String),
}

impl DataKind {
    /// The built-in kinds, each of which owns a partition per market class
    pub const BUILTIN: [DataKind; 3] = [DataKind::QuoteSeries, DataKind::News, DataKind::Fundamentals];

    /// Stable label used in keys, file names and metadata records
    pub fn label(&self) -> &str {
        match self {
            DataKind::QuoteSeries => "quote_series",
            DataKind::News => "news",
            DataKind::Fundamentals => "fundamentals",
            DataKind::Custom(name) => name,
        }
    }

    /// Parse a label; unknown labels become [`DataKind::Custom`]
    pub fn parse(label: &str) -> Self {
        match label {
            "quote_series" | "quotes" | "stock_data" => DataKind::QuoteSeries,
            "news" => DataKind::News,
            "fundamentals" => DataKind::Fundamentals,
            other => DataKind::Custom(other.to_string()),
        }
    }

    pub fn is_builtin(&self) -> bool {
        !matches!(self, DataKind::Custom(_))
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl From<String> for DataKind {
    fn from(s: String) -> Self {
        DataKind::parse(&s)
    }
}

impl From<DataKind> for String {
    fn from(kind: DataKind) -> Self {
        kind.label().to_string()
    }
}

/// Market classification derived from the shape of a subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketClass {
    /// Six-digit numeric exchange codes (e.g. `600519`)
    Domestic,

    /// Everything else (e.g. `AAPL`, `0700.HK`)
    International,
}

impl MarketClass {
    pub const ALL: [MarketClass; 2] = [MarketClass::Domestic, MarketClass::International];

    /// Classify a subject. Total and pure: every subject maps to exactly one class.
    pub fn classify(subject: &str) -> Self {
        if subject.len() == 6 && subject.bytes().all(|b| b.is_ascii_digit()) {
            MarketClass::Domestic
        } else {
            MarketClass::International
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MarketClass::Domestic => "domestic",
            MarketClass::International => "international",
        }
    }
}

impl fmt::Display for MarketClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// On-disk encoding of a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Csv,
    Txt,
}

impl FileFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            FileFormat::Csv => "csv",
            FileFormat::Txt => "txt",
        }
    }
}

/// Rows with named columns. Cells are kept as their textual representation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Create an empty table with the given header
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a row (builder style)
    pub fn with_row<I, S>(mut self, row: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push_row(row);
        self
    }

    pub fn push_row<I, S>(&mut self, row: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rows.push(row.into_iter().map(Into::into).collect());
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of a named column, if present
    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.get(idx).map(String::as_str).unwrap_or(""))
                .collect(),
        )
    }

    /// Encode as CSV with a header line.
    ///
    /// A table without columns encodes as empty text. Empty rows, or rows in
    /// a table without columns, have no CSV form and are rejected.
    pub fn to_csv(&self) -> Result<String> {
        if self.columns.is_empty() && !self.rows.is_empty() {
            return Err(crate::error::CacheError::Serialization(
                "table has rows but no columns".to_string(),
            ));
        }
        if let Some(idx) = self.rows.iter().position(Vec::is_empty) {
            return Err(crate::error::CacheError::Serialization(format!(
                "row {} has no cells",
                idx
            )));
        }
        if self.columns.is_empty() {
            return Ok(String::new());
        }

        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_writer(Vec::new());
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| crate::error::CacheError::Other(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| crate::error::CacheError::Serialization(e.to_string()))
    }

    /// Decode CSV produced by [`Table::to_csv`]
    pub fn from_csv(content: &str) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(content.as_bytes());

        let columns = reader.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            rows.push(record?.iter().map(str::to_string).collect());
        }

        Ok(Self { columns, rows })
    }
}

/// Content handed to the cache by an upstream fetcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Tabular(Table),
    Text(String),
}

impl Payload {
    pub fn format(&self) -> FileFormat {
        match self {
            Payload::Tabular(_) => FileFormat::Csv,
            Payload::Text(_) => FileFormat::Txt,
        }
    }

    /// Serialized form written to disk; also what the size gate measures
    pub fn to_text(&self) -> Result<String> {
        match self {
            Payload::Tabular(table) => table.to_csv(),
            Payload::Text(text) => Ok(text.clone()),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            Payload::Tabular(_) => None,
        }
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Payload::Tabular(table) => Some(table),
            Payload::Text(_) => None,
        }
    }
}

impl From<Table> for Payload {
    fn from(table: Table) -> Self {
        Payload::Tabular(table)
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

/// Aggregate view over the metadata partition
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CacheStats {
    /// Number of metadata records
    pub total_entries: usize,

    pub quote_series_count: usize,
    pub news_count: usize,
    pub fundamentals_count: usize,
    pub custom_count: usize,

    /// Metadata-only entries (size gate veto or payload gone)
    pub skipped_count: usize,

    /// Bytes of payload files still on disk
    pub total_size_bytes: u64,

    /// Record count per `{market}_{kind}` partition
    pub partitions: BTreeMap<String, usize>,
}

impl CacheStats {
    pub fn total_size_mb(&self) -> f64 {
        let mb = self.total_size_bytes as f64 / (1024.0 * 1024.0);
        (mb * 100.0).round() / 100.0
    }

    /// Entries whose payload is on disk
    pub fn cached_count(&self) -> usize {
        self.total_entries.saturating_sub(self.skipped_count)
    }

    /// Share of entries that exist only as metadata, as a percentage
    pub fn skip_rate(&self) -> f64 {
        if self.total_entries == 0 {
            0.0
        } else {
            (self.skipped_count as f64 / self.total_entries as f64) * 100.0
        }
    }

    pub(crate) fn record_kind(&mut self, kind: &DataKind) {
        match kind {
            DataKind::QuoteSeries => self.quote_series_count += 1,
            DataKind::News => self.news_count += 1,
            DataKind::Fundamentals => self.fundamentals_count += 1,
            DataKind::Custom(_) => self.custom_count += 1,
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheStats {{ entries: {}, quote_series: {}, news: {}, fundamentals: {}, skipped: {}, size: {:.2} MB }}",
            self.total_entries,
            self.quote_series_count,
            self.news_count,
            self.fundamentals_count,
            self.skipped_count,
            self.total_size_mb()
        )
    }
}
