//! CSV loader for historical price bars.
//!
//! Expected layout is one row per bar with a header:
//!
//! ```text
//! date,price
//! 2024-01-01,42280.5
//! 2024-01-02,44950.1
//! ```
//!
//! `timestamp` is accepted in place of `date`, and `close` in place of
//! `price`. Extra columns are ignored. Rows are sorted by date after reading.

use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use serde::Deserialize;

use crate::error::DataError;

use super::feed::PriceHistory;
use super::types::PricePoint;

#[derive(Debug, Deserialize)]
struct PriceRow {
    #[serde(alias = "timestamp")]
    date: NaiveDate,
    #[serde(alias = "close")]
    price: f64,
}

/// Loads price bars from CSV into a [`PriceHistory`].
pub struct PriceLoader;

impl PriceLoader {
    /// Load from a CSV file on disk.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<PriceHistory, DataError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    /// Load from any reader producing CSV.
    pub fn from_reader<R: Read>(reader: R) -> Result<PriceHistory, DataError> {
        let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

        let mut points = Vec::new();
        for row in csv_reader.deserialize::<PriceRow>() {
            let row = row?;
            points.push(PricePoint::new(row.date, row.price));
        }

        points.sort_by_key(|p| p.date);
        PriceHistory::new(points)
    }
}
