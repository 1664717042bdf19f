//! Coordinates within the replication stream.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A totally ordered coordinate in the MySQL binary log.
///
/// A position names a binlog file, a byte offset inside that file, and a row
/// ordinal. The offset is the end position of the event that produced the
/// position (the point a replica would resume from). The row ordinal orders
/// the rows decoded from a single rows event, which all share the same offset.
///
/// Files are ordered by the numeric sequence suffix MySQL appends on rotation
/// (`mysql-bin.000099` < `mysql-bin.000100`), not lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogPosition {
    /// Binlog file name (e.g., "mysql-bin.000012")
    pub file: String,
    /// Byte offset within the file
    pub offset: u64,
    /// Ordinal of the row within its rows event (0 for commit markers)
    #[serde(default, skip_serializing_if = "is_zero")]
    pub row: u32,
}

fn is_zero(v: &u32) -> bool {
    *v == 0
}

/// Error returned when parsing a `file:offset` position string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid binlog position '{input}': expected 'file:offset'")]
pub struct PositionParseError {
    pub input: String,
}

impl LogPosition {
    /// Create a position at a file offset.
    pub fn new(file: impl Into<String>, offset: u64) -> Self {
        Self {
            file: file.into(),
            offset,
            row: 0,
        }
    }

    /// Create the position of one row inside a rows event.
    pub fn with_row(mut self, row: u32) -> Self {
        self.row = row;
        self
    }

    /// Numeric sequence suffix of the file name, if it has one.
    pub fn file_sequence(&self) -> Option<u64> {
        file_sequence(&self.file)
    }

    fn sort_key(&self) -> (Option<u64>, &str, u64, u32) {
        (self.file_sequence(), &self.file, self.offset, self.row)
    }
}

/// Parse the numeric suffix of a binlog file name (`mysql-bin.000012` → 12).
pub fn file_sequence(file: &str) -> Option<u64> {
    let (_, suffix) = file.rsplit_once('.')?;
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}

impl Ord for LogPosition {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl PartialOrd for LogPosition {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for LogPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.row == 0 {
            write!(f, "{}:{}", self.file, self.offset)
        } else {
            write!(f, "{}:{}#{}", self.file, self.offset, self.row)
        }
    }
}

impl FromStr for LogPosition {
    type Err = PositionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || PositionParseError {
            input: s.to_string(),
        };
        let (file, rest) = s.trim().rsplit_once(':').ok_or_else(err)?;
        if file.is_empty() {
            return Err(err());
        }
        let (offset, row) = match rest.split_once('#') {
            Some((offset, row)) => (offset, row.parse().map_err(|_| err())?),
            None => (rest, 0),
        };
        let offset = offset.parse().map_err(|_| err())?;
        Ok(Self {
            file: file.to_string(),
            offset,
            row,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orders_by_file_sequence_then_offset() {
        let a = LogPosition::new("mysql-bin.000099", 9_000);
        let b = LogPosition::new("mysql-bin.000100", 4);
        let c = LogPosition::new("mysql-bin.000100", 120);
        assert!(a < b);
        assert!(b < c);

        // Lexicographic order would get this wrong
        let d = LogPosition::new("mysql-bin.999999", 4);
        let e = LogPosition::new("mysql-bin.1000000", 4);
        assert!(d < e);
    }

    #[test]
    fn test_rows_within_one_event_are_ordered() {
        let base = LogPosition::new("mysql-bin.000001", 500);
        let first = base.clone().with_row(1);
        let second = base.clone().with_row(2);
        assert!(base < first);
        assert!(first < second);
        assert!(second < LogPosition::new("mysql-bin.000001", 501));
    }

    #[test]
    fn test_parse_and_display() {
        let pos: LogPosition = "mysql-bin.000003:1949".parse().unwrap();
        assert_eq!(pos, LogPosition::new("mysql-bin.000003", 1949));
        assert_eq!(pos.to_string(), "mysql-bin.000003:1949");

        let row: LogPosition = "binlog.000001:77#3".parse().unwrap();
        assert_eq!(row.row, 3);
        assert_eq!(row.to_string(), "binlog.000001:77#3");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("no-offset".parse::<LogPosition>().is_err());
        assert!(":12".parse::<LogPosition>().is_err());
        assert!("mysql-bin.000001:abc".parse::<LogPosition>().is_err());
    }

    #[test]
    fn test_file_sequence() {
        assert_eq!(file_sequence("mysql-bin.000012"), Some(12));
        assert_eq!(file_sequence("binlog"), None);
        assert_eq!(file_sequence("binlog.index"), None);
    }

    #[test]
    fn test_serde_omits_zero_row() {
        let pos = LogPosition::new("mysql-bin.000001", 4);
        let json = serde_json::to_value(&pos).unwrap();
        assert_eq!(json, serde_json::json!({"file": "mysql-bin.000001", "offset": 4}));
        let back: LogPosition = serde_json::from_value(json).unwrap();
        assert_eq!(back, pos);
    }
}
