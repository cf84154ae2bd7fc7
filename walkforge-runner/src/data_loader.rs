//! Candle loading from CSV.
//!
//! Expected header: `open_time,open,high,low,close,volume` (`volume` may be
//! omitted). `open_time` is either an RFC 3339 timestamp, a naive
//! `YYYY-MM-DD HH:MM:SS` UTC timestamp, or integer epoch milliseconds.
//! Rows must already be in ascending time order; the loaded series is
//! validated by [`CandleSeries::new`] and any integrity problem is an error.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use walkforge_core::{Candle, CandleError, CandleSeries};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed CSV row at line {line}")]
    Csv {
        line: u64,
        #[source]
        source: csv::Error,
    },
    #[error("unrecognised open_time `{value}` at line {line}")]
    Timestamp { line: u64, value: String },
    #[error("no candles between {start} and {end}")]
    EmptyRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[error("candle data failed validation")]
    Series(#[from] CandleError),
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    open_time: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
}

/// Parse an `open_time` cell.
pub fn parse_open_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ms) = raw.parse::<i64>() {
        return Utc.timestamp_millis_opt(ms).single();
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Read and validate candles from any CSV source.
pub fn read_candles<R: Read>(reader: R) -> Result<CandleSeries, LoadError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut candles = Vec::new();
    for record in rdr.deserialize::<CsvRow>() {
        let row = record.map_err(|source| LoadError::Csv {
            line: source.position().map(|p| p.line()).unwrap_or_default(),
            source,
        })?;
        // Header is line 1.
        let line = candles.len() as u64 + 2;
        let open_time = parse_open_time(&row.open_time).ok_or_else(|| LoadError::Timestamp {
            line,
            value: row.open_time.clone(),
        })?;
        candles.push(Candle {
            open_time,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        });
    }
    Ok(CandleSeries::new(candles)?)
}

/// Load candles from a CSV file.
pub fn load_candles_csv(path: &Path) -> Result<CandleSeries, LoadError> {
    let file = std::fs::File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let series = read_candles(std::io::BufReader::new(file))?;
    debug!(
        path = %path.display(),
        candles = series.len(),
        first = %series.first_time(),
        last = %series.last_time(),
        "loaded candles"
    );
    Ok(series)
}

/// Load candles and keep only those in `[start, end)`.
pub fn load_candles_in_range(
    path: &Path,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<CandleSeries, LoadError> {
    let series = load_candles_csv(path)?;
    let slice = series.slice(start, end);
    if slice.is_empty() {
        return Err(LoadError::EmptyRange { start, end });
    }
    Ok(CandleSeries::new(slice.to_vec())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CSV: &str = "\
open_time,open,high,low,close,volume
2024-01-01T00:00:00Z,100,101,99,100.5,10
2024-01-01T00:15:00Z,100.5,102,100,101.5,12
1704069000000,101.5,103,101,102.5,9
2024-01-01 00:45:00,102.5,103,102,102.8,7
";

    #[test]
    fn parses_all_timestamp_forms() {
        let series = read_candles(CSV.as_bytes()).unwrap();
        assert_eq!(series.len(), 4);
        let times: Vec<_> = series.candles().iter().map(|c| c.open_time.timestamp()).collect();
        let t0 = 1_704_067_200;
        assert_eq!(times, vec![t0, t0 + 900, t0 + 1800, t0 + 2700]);
        assert_eq!(series.candles()[1].close, 101.5);
    }

    #[test]
    fn volume_column_is_optional() {
        let csv = "open_time,open,high,low,close\n2024-01-01T00:00:00Z,1,1,1,1\n";
        let series = read_candles(csv.as_bytes()).unwrap();
        assert_eq!(series.candles()[0].volume, 0.0);
    }

    #[test]
    fn bad_timestamp_reports_line() {
        let csv = "open_time,open,high,low,close\n2024-01-01T00:00:00Z,1,1,1,1\nyesterday,1,1,1,1\n";
        let err = read_candles(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, LoadError::Timestamp { line: 3, .. }));
    }

    #[test]
    fn out_of_order_rows_fail_validation() {
        let csv = "open_time,open,high,low,close\n\
                   2024-01-01T00:15:00Z,1,1,1,1\n\
                   2024-01-01T00:00:00Z,1,1,1,1\n";
        let err = read_candles(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, LoadError::Series(CandleError::NonMonotonic { .. })));
    }

    #[test]
    fn non_numeric_price_is_csv_error() {
        let csv = "open_time,open,high,low,close\n2024-01-01T00:00:00Z,abc,1,1,1\n";
        assert!(matches!(
            read_candles(csv.as_bytes()).unwrap_err(),
            LoadError::Csv { .. }
        ));
    }

    #[test]
    fn loads_file_and_filters_range() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CSV.as_bytes()).unwrap();

        let all = load_candles_csv(file.path()).unwrap();
        assert_eq!(all.len(), 4);

        let start = parse_open_time("2024-01-01T00:15:00Z").unwrap();
        let end = parse_open_time("2024-01-01T00:45:00Z").unwrap();
        let ranged = load_candles_in_range(file.path(), start, end).unwrap();
        assert_eq!(ranged.len(), 2);
        assert_eq!(ranged.first_time(), start);

        let late = parse_open_time("2025-01-01T00:00:00Z").unwrap();
        assert!(matches!(
            load_candles_in_range(file.path(), late, late + chrono::Duration::days(1)),
            Err(LoadError::EmptyRange { .. })
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_candles_csv(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }
}
