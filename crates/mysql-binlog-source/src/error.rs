//! Errors raised by the binlog reader.

use sync_core::LogPosition;
use thiserror::Error;

/// Failure of the Log Reader.
///
/// Only [`SourceError::Connection`] is transient; every other variant is
/// fatal for the process.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Network failure or server-side disconnect. Retried by the caller.
    #[error("replication connection error: {0}")]
    Connection(String),

    /// The replication stream could not be decoded.
    #[error("binlog protocol error: {0}")]
    Protocol(String),

    /// The requested resume point is no longer retained by the server.
    #[error("binlog position {requested} is unavailable (oldest retained file: {}): {detail}", oldest.as_deref().unwrap_or("unknown"))]
    PositionUnavailable {
        requested: LogPosition,
        oldest: Option<String>,
        detail: String,
    },

    /// Server or client configuration does not allow row-based replication.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The server rejected the replication credentials or privileges.
    #[error("authentication error: {0}")]
    Authentication(String),
}

impl SourceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::Connection(_))
    }

    /// Classify a client error raised while talking to the server.
    pub(crate) fn from_mysql(err: mysql_async::Error, requested: &LogPosition) -> Self {
        match err {
            mysql_async::Error::Server(e) => match e.code {
                // ER_MASTER_FATAL_ERROR_READING_BINLOG
                1236 => SourceError::PositionUnavailable {
                    requested: requested.clone(),
                    oldest: None,
                    detail: e.message,
                },
                // ER_ACCESS_DENIED_ERROR, ER_SPECIFIC_ACCESS_DENIED_ERROR, ER_DBACCESS_DENIED_ERROR
                1045 | 1227 | 1044 => SourceError::Authentication(e.message),
                // ER_NO_BINARY_LOGGING
                1381 => SourceError::Configuration(e.message),
                _ => SourceError::Connection(format!("server error {}: {}", e.code, e.message)),
            },
            mysql_async::Error::Url(e) => SourceError::Configuration(e.to_string()),
            other => SourceError::Connection(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_connection_errors_are_transient() {
        assert!(SourceError::Connection("reset".into()).is_transient());
        assert!(!SourceError::Protocol("bad".into()).is_transient());
        assert!(!SourceError::Configuration("ROW".into()).is_transient());
    }

    #[test]
    fn test_position_unavailable_names_oldest_file() {
        let err = SourceError::PositionUnavailable {
            requested: LogPosition::new("mysql-bin.000001", 4),
            oldest: Some("mysql-bin.000007".into()),
            detail: "purged".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("mysql-bin.000001:4"));
        assert!(msg.contains("mysql-bin.000007"));
    }
}
