//! FEWS table construction: normalized station and time-series rows, their
//! deterministic column sets and CSV serialization.

pub mod columns;
pub mod error;
pub mod series_table;
pub mod station_table;

use std::cmp::Ordering;
use std::path::Path;

use polars::prelude::*;

use crate::fews::error::TableError;

/// Reads a FEWS CSV table back into a DataFrame.
pub fn read_fews_csv(path: &Path) -> Result<DataFrame, TableError> {
    CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .map_err(|e| TableError::CsvRead {
            path: path.to_path_buf(),
            source: e,
        })?
        .finish()
        .map_err(|e| TableError::CsvRead {
            path: path.to_path_buf(),
            source: e,
        })
}

/// Identifier ordering: numeric when both sides parse as integers, lexical
/// otherwise. Keeps a5 integer ids in natural order while federated hex ids
/// sort as strings.
pub(crate) fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(left), Ok(right)) => left.cmp(&right),
        _ => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_ids_sort_numerically() {
        assert_eq!(compare_ids("9", "12"), Ordering::Less);
        assert_eq!(compare_ids("100", "100"), Ordering::Equal);
    }

    #[test]
    fn non_numeric_ids_sort_lexically() {
        assert_eq!(compare_ids("ABC", "ABD"), Ordering::Less);
        assert_eq!(compare_ids("12", "A1"), Ordering::Less);
    }
}
