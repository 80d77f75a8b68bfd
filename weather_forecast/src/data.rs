//! Loading and validation of observation tables

use crate::error::{ForecastError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use tracing::{debug, info};

/// Timestamp column
pub const DS: &str = "ds";
/// Target column
pub const Y: &str = "y";
/// Humidity column
pub const HUMIDITY: &str = "humidity";

/// Columns every input must provide once aliases are resolved
pub const REQUIRED_COLUMNS: [&str; 3] = [DS, Y, HUMIDITY];

/// Accepted input synonyms and the canonical column they stand for
pub const COLUMN_ALIASES: &[(&str, &str)] = &[("temperature_celsius", Y)];

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

/// One validated input row. Target and humidity may still be missing.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// Observation timestamp
    pub ds: NaiveDateTime,
    /// Target reading
    pub y: Option<f64>,
    /// Humidity reading
    pub humidity: Option<f64>,
}

/// Validated observations ordered by strictly increasing timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationTable {
    records: Vec<RawRecord>,
}

/// Data loader for observation tables
#[derive(Debug)]
pub struct DataLoader;

impl DataLoader {
    /// Load observations from a CSV file
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<ObservationTable> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ForecastError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let file = File::open(path)?;
        let df = CsvReader::new(file)
            .infer_schema(None)
            .has_header(true)
            .finish()
            .map_err(|e| {
                ForecastError::ParseError(format!("failed to read {}: {}", path.display(), e))
            })?;

        let table = Self::from_dataframe(df)?;
        info!(path = %path.display(), rows = table.len(), "loaded observations");
        Ok(table)
    }

    /// Validate an in-memory DataFrame
    pub fn from_dataframe(mut df: DataFrame) -> Result<ObservationTable> {
        Self::resolve_aliases(&mut df)?;
        Self::check_required_columns(&df)?;

        let dates = Self::parse_dates(&df)?;
        let targets = Self::numeric_column(&df, Y)?;
        let humidity = Self::numeric_column(&df, HUMIDITY)?;

        let records = dates
            .into_iter()
            .zip(targets)
            .zip(humidity)
            .map(|((ds, y), humidity)| RawRecord { ds, y, humidity })
            .collect();

        ObservationTable::new(records)
    }

    /// Rename accepted synonyms to their canonical names
    fn resolve_aliases(df: &mut DataFrame) -> Result<()> {
        for (alias, canonical) in COLUMN_ALIASES {
            let names: Vec<String> = df
                .get_column_names()
                .iter()
                .map(|name| name.to_string())
                .collect();
            let has_alias = names.iter().any(|name| name == alias);
            let has_canonical = names.iter().any(|name| name == canonical);

            if has_alias && !has_canonical {
                df.rename(alias, canonical)?;
            } else if has_alias {
                debug!(alias, canonical, "canonical column present, ignoring alias");
            }
        }

        Ok(())
    }

    /// Check that every required column exists
    fn check_required_columns(df: &DataFrame) -> Result<()> {
        let names = df.get_column_names();
        for column in REQUIRED_COLUMNS {
            if !names.contains(&column) {
                return Err(ForecastError::SchemaError {
                    column: column.to_string(),
                });
            }
        }

        Ok(())
    }

    /// Parse the timestamp column
    fn parse_dates(df: &DataFrame) -> Result<Vec<NaiveDateTime>> {
        let series = df
            .column(DS)?
            .cast(&DataType::Utf8)
            .map_err(|e| ForecastError::DateFormatError(format!("column '{}': {}", DS, e)))?;
        let values = series.utf8()?;

        values
            .into_iter()
            .enumerate()
            .map(|(row, value)| {
                let text = value.ok_or_else(|| {
                    ForecastError::DateFormatError(format!("row {}: empty timestamp", row + 1))
                })?;
                parse_timestamp(text).ok_or_else(|| {
                    ForecastError::DateFormatError(format!(
                        "row {}: cannot parse '{}' as a date",
                        row + 1,
                        text
                    ))
                })
            })
            .collect()
    }

    /// Read a numeric column, keeping missing cells
    fn numeric_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
        let series = df
            .column(name)?
            .strict_cast(&DataType::Float64)
            .map_err(|e| {
                ForecastError::ParseError(format!("column '{}' is not numeric: {}", name, e))
            })?;

        Ok(series.f64()?.into_iter().collect())
    }
}

impl ObservationTable {
    /// Create a table, sorting by timestamp and rejecting duplicates
    pub fn new(mut records: Vec<RawRecord>) -> Result<Self> {
        if records.is_empty() {
            return Err(ForecastError::DataError(
                "Observation table is empty".to_string(),
            ));
        }

        records.sort_by_key(|record| record.ds);
        if let Some(pair) = records.windows(2).find(|pair| pair[0].ds == pair[1].ds) {
            return Err(ForecastError::DataError(format!(
                "Duplicate timestamp: {}",
                pair[0].ds
            )));
        }

        Ok(Self { records })
    }

    /// Get the records
    pub fn records(&self) -> &[RawRecord] {
        &self.records
    }

    /// Get the timestamps
    pub fn dates(&self) -> Vec<NaiveDateTime> {
        self.records.iter().map(|record| record.ds).collect()
    }

    /// Get the raw target readings
    pub fn targets(&self) -> Vec<Option<f64>> {
        self.records.iter().map(|record| record.y).collect()
    }

    /// Get the raw humidity readings
    pub fn humidity(&self) -> Vec<Option<f64>> {
        self.records.iter().map(|record| record.humidity).collect()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Get the number of rows
    pub fn len(&self) -> usize {
        self.records.len()
    }
}

/// Parse a timestamp in any of the accepted layouts.
///
/// Offsets are normalised to UTC.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }

    None
}

/// Format timestamps for export: dates only when every value is midnight
pub fn format_timestamps(dates: &[NaiveDateTime]) -> Vec<String> {
    let midnight = chrono::NaiveTime::from_hms_opt(0, 0, 0);
    let date_only = dates.iter().all(|ds| Some(ds.time()) == midnight);
    let format = if date_only {
        "%Y-%m-%d"
    } else {
        "%Y-%m-%d %H:%M:%S"
    };

    dates.iter().map(|ds| ds.format(format).to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn date(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[rstest]
    #[case("2023-01-05", date(2023, 1, 5))]
    #[case("2023/01/05", date(2023, 1, 5))]
    #[case("01/05/2023", date(2023, 1, 5))]
    #[case("2023-01-05 00:00:00", date(2023, 1, 5))]
    #[case("2023-01-05T00:00:00", date(2023, 1, 5))]
    #[case(" 2023-01-05 ", date(2023, 1, 5))]
    #[case("2023-01-05T02:00:00+02:00", date(2023, 1, 5))]
    fn test_parse_timestamp_layouts(#[case] text: &str, #[case] expected: NaiveDateTime) {
        assert_eq!(parse_timestamp(text), Some(expected));
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp("2023-13-01"), None);
    }

    #[test]
    fn test_table_sorts_and_rejects_duplicates() {
        let records = vec![
            RawRecord { ds: date(2023, 1, 2), y: Some(2.0), humidity: Some(50.0) },
            RawRecord { ds: date(2023, 1, 1), y: Some(1.0), humidity: None },
        ];
        let table = ObservationTable::new(records.clone()).unwrap();
        assert_eq!(table.dates(), vec![date(2023, 1, 1), date(2023, 1, 2)]);
        assert_eq!(table.targets(), vec![Some(1.0), Some(2.0)]);

        let mut duplicated = records;
        duplicated.push(RawRecord { ds: date(2023, 1, 2), y: None, humidity: None });
        assert!(matches!(
            ObservationTable::new(duplicated),
            Err(ForecastError::DataError(_))
        ));
        assert!(ObservationTable::new(Vec::new()).is_err());
    }

    #[test]
    fn test_format_timestamps() {
        let dates = vec![date(2023, 1, 1), date(2023, 1, 2)];
        assert_eq!(format_timestamps(&dates), vec!["2023-01-01", "2023-01-02"]);

        let with_time = vec![date(2023, 1, 1), date(2023, 1, 1) + chrono::Duration::hours(6)];
        assert_eq!(
            format_timestamps(&with_time),
            vec!["2023-01-01 00:00:00", "2023-01-01 06:00:00"]
        );
    }
}
