//! MySQL binlog checkpoint management
//!
//! This module provides the checkpoint type persisted by the pipeline and a
//! helper that captures the server's current binlog coordinate.

use anyhow::Result;
use chrono::{DateTime, Utc};
use mysql_async::prelude::Queryable;
use serde::{Deserialize, Serialize};
use sync_core::LogPosition;

use crate::SourceError;

/// MySQL binlog checkpoint: a commit position plus the time it was taken.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MySQLBinlogCheckpoint {
    /// Position just past a committed transaction
    pub position: LogPosition,
    /// Timestamp when checkpoint was created
    pub timestamp: DateTime<Utc>,
}

impl MySQLBinlogCheckpoint {
    pub fn new(position: LogPosition) -> Self {
        Self {
            position,
            timestamp: Utc::now(),
        }
    }
}

impl checkpoint::Checkpoint for MySQLBinlogCheckpoint {
    const DATABASE_TYPE: &'static str = "mysql-binlog";

    fn to_cli_string(&self) -> String {
        self.position.to_string()
    }

    fn from_cli_string(s: &str) -> Result<Self> {
        let position: LogPosition = s
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid MySQL binlog checkpoint: {e}"))?;
        Ok(Self::new(position))
    }
}

/// Get the server's current binlog coordinate.
///
/// This is a GENERATION operation: it reads the position the next
/// transaction will be written at, for use as a bootstrap marker.
pub async fn get_current_checkpoint(
    conn: &mut mysql_async::Conn,
) -> Result<MySQLBinlogCheckpoint, SourceError> {
    let here = LogPosition::new("", 0);

    // MySQL 8.2+ renamed the statement; older servers only know the old one.
    let row: Option<mysql_async::Row> = match conn.query_first("SHOW BINARY LOG STATUS").await {
        Ok(row) => row,
        Err(mysql_async::Error::Server(e)) if e.code == 1064 => conn
            .query_first("SHOW MASTER STATUS")
            .await
            .map_err(|e| SourceError::from_mysql(e, &here))?,
        Err(e) => return Err(SourceError::from_mysql(e, &here)),
    };

    let row = row.ok_or_else(|| {
        SourceError::Configuration("binary logging is disabled on the source server".to_string())
    })?;
    let file: String = row
        .get(0)
        .ok_or_else(|| SourceError::Protocol("binlog status without File column".to_string()))?;
    let offset: u64 = row
        .get(1)
        .ok_or_else(|| SourceError::Protocol("binlog status without Position column".to_string()))?;

    Ok(MySQLBinlogCheckpoint::new(LogPosition::new(file, offset)))
}
