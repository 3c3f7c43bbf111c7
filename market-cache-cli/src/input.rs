//! Command-line input parsing

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use market_cache::{Payload, QueryParams, Table};
use std::io::Read;
use std::path::Path;
use std::time::Duration;

/// How `save` interprets its input
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PayloadFormat {
    /// Plain text, stored as-is
    Text,
    /// CSV with a header row
    Csv,
}

/// Parse a `name=value` query parameter
pub fn parse_param(raw: &str) -> Result<(String, String)> {
    let Some((name, value)) = raw.split_once('=') else {
        bail!("invalid parameter {:?}, expected name=value", raw);
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("invalid parameter {:?}, name is empty", raw);
    }
    Ok((name.to_string(), value.trim().to_string()))
}

/// Collect repeated `--param` values; later duplicates win
pub fn collect_params(raw: &[String]) -> Result<QueryParams> {
    let mut params = QueryParams::new();
    for item in raw {
        let (name, value) = parse_param(item)?;
        params.insert(name, value);
    }
    Ok(params)
}

/// TTL override from a number of hours, saturating on overflow
pub fn ttl_from_hours(hours: u64) -> Duration {
    Duration::from_secs(hours.saturating_mul(3600))
}

/// Read a payload from `path`, or stdin when `path` is `-` or absent
pub fn read_payload(path: Option<&Path>, format: PayloadFormat) -> Result<Payload> {
    let content = match path {
        Some(p) if p != Path::new("-") => std::fs::read_to_string(p)
            .with_context(|| format!("Failed to read {:?}", p))?,
        _ => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            buf
        }
    };

    match format {
        PayloadFormat::Text => Ok(Payload::Text(content)),
        PayloadFormat::Csv => {
            let table = Table::from_csv(&content).context("Input is not valid CSV")?;
            Ok(Payload::Tabular(table))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_param() {
        assert_eq!(
            parse_param("start_date=2024-01-01").unwrap(),
            ("start_date".to_string(), "2024-01-01".to_string())
        );
        assert_eq!(parse_param("q=a=b").unwrap().1, "a=b");
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=x").is_err());
    }

    #[test]
    fn test_collect_params_last_wins() {
        let params = collect_params(&["a=1".to_string(), "a=2".to_string()]).unwrap();
        assert_eq!(params.get("a").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_ttl_from_hours() {
        assert_eq!(ttl_from_hours(2), Duration::from_secs(7200));
        assert_eq!(ttl_from_hours(u64::MAX), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_read_payload_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("quotes.csv");
        std::fs::write(&path, "date,close\n2024-01-02,185.64\n").unwrap();

        let payload = read_payload(Some(&path), PayloadFormat::Csv).unwrap();
        let table = payload.as_table().unwrap();
        assert_eq!(table.columns, vec!["date", "close"]);
        assert_eq!(table.len(), 1);

        let payload = read_payload(Some(&path), PayloadFormat::Text).unwrap();
        assert!(payload.as_text().unwrap().starts_with("date,close"));
    }
}
