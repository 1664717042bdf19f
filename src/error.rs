//! Fatal outcomes of a sync run and their exit codes.

use search_sink::SinkError;
use search_sync_mysql_binlog_source::SourceError;

/// Exit status for a clean shutdown.
pub const EXIT_OK: i32 = 0;
/// Exit status for fatal errors without a more specific code.
pub const EXIT_FATAL: i32 = 1;
/// Exit status for configuration and authentication failures.
pub const EXIT_CONFIG: i32 = 2;
/// Exit status when the resume position was purged; a full reindex is required.
pub const EXIT_REINDEX: i32 = 3;

/// An error that stops the process.
///
/// Transient conditions are retried inside the pipeline and never become a
/// `SyncError`.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("configuration error: {0:#}")]
    Configuration(anyhow::Error),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("{0}; a full reindex is required")]
    PositionUnavailable(String),

    #[error("replication protocol error: {0}")]
    Protocol(String),

    #[error("search index error: {0}")]
    Index(String),

    #[error("checkpoint error: {0:#}")]
    Checkpoint(anyhow::Error),

    #[error("{0:#}")]
    Other(anyhow::Error),
}

impl SyncError {
    pub fn config(message: impl Into<String>) -> Self {
        SyncError::Configuration(anyhow::anyhow!(message.into()))
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            SyncError::Configuration(_) | SyncError::Authentication(_) => EXIT_CONFIG,
            SyncError::PositionUnavailable(_) => EXIT_REINDEX,
            SyncError::Protocol(_)
            | SyncError::Index(_)
            | SyncError::Checkpoint(_)
            | SyncError::Other(_) => EXIT_FATAL,
        }
    }
}

impl From<SourceError> for SyncError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::PositionUnavailable { .. } => SyncError::PositionUnavailable(err.to_string()),
            SourceError::Configuration(_) => SyncError::Configuration(err.into()),
            SourceError::Authentication(_) => SyncError::Authentication(err.to_string()),
            SourceError::Protocol(_) => SyncError::Protocol(err.to_string()),
            SourceError::Connection(_) => SyncError::Other(err.into()),
        }
    }
}

impl From<SinkError> for SyncError {
    fn from(err: SinkError) -> Self {
        match err {
            SinkError::Authentication(_) => SyncError::Authentication(err.to_string()),
            SinkError::Protocol(_) | SinkError::Transport(_) => SyncError::Index(err.to_string()),
        }
    }
}

impl From<index_mapping::MappingError> for SyncError {
    fn from(err: index_mapping::MappingError) -> Self {
        SyncError::Configuration(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_core::LogPosition;

    #[test]
    fn test_exit_codes() {
        let purged = SyncError::from(SourceError::PositionUnavailable {
            requested: LogPosition::new("mysql-bin.000001", 4),
            oldest: Some("mysql-bin.000007".into()),
            detail: "purged".into(),
        });
        assert_eq!(purged.exit_code(), EXIT_REINDEX);

        let bad_format = SyncError::from(SourceError::Configuration("binlog_format is STATEMENT".into()));
        assert_eq!(bad_format.exit_code(), EXIT_CONFIG);

        let denied = SyncError::from(SourceError::Authentication("access denied".into()));
        assert_eq!(denied.exit_code(), EXIT_CONFIG);

        let decode = SyncError::from(SourceError::Protocol("bad rows event".into()));
        assert_eq!(decode.exit_code(), EXIT_FATAL);

        let index_auth = SyncError::from(SinkError::Authentication("401".into()));
        assert_eq!(index_auth.exit_code(), EXIT_CONFIG);

        assert_eq!(SyncError::config("no tables").exit_code(), EXIT_CONFIG);
    }
}
