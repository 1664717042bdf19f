//! Checkpoint management for search-sync
//!
//! Provides storage-agnostic checkpoint file handling with support for
//! source-specific checkpoint types.
//!
//! # Architecture
//!
//! This crate provides a generic checkpoint system that:
//! - Defines the `Checkpoint` trait for source-specific checkpoint types
//! - Provides `CheckpointFile` wrapper for storage-agnostic serialization
//! - Manages checkpoint saving/loading via `SyncManager`
//! - Supports multiple storage backends via `CheckpointStore` trait
//!
//! ## Storage Backends
//!
//! - `FilesystemStore` - One JSON file per phase, replaced atomically
//! - `MemoryStore` - In-process store used by tests and dry runs
//!
//! ## Phases
//!
//! Two records are kept side by side:
//! - `SyncPhase::FullSyncStart` - the bootstrap marker captured before a bulk reindex
//! - `SyncPhase::Incremental` - the running checkpoint advanced by the pipeline

mod file;
mod filesystem;
mod manager;
mod memory;
mod phase;
pub mod store;

#[cfg(test)]
mod tests;

// Re-export file types
pub use file::CheckpointFile;

// Re-export manager types
pub use manager::{Loaded, SyncManager};

// Re-export phase types
pub use phase::SyncPhase;

// Re-export store trait
pub use store::CheckpointStore;

// Re-export storage implementations
pub use filesystem::FilesystemStore;
pub use memory::MemoryStore;

/// Trait that source-specific checkpoints must implement.
///
/// This trait defines the interface for checkpoint types, enabling
/// storage-agnostic checkpoint file handling while preserving
/// source-specific data structures.
///
/// # Example
///
/// ```rust
/// use checkpoint::Checkpoint;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// pub struct OffsetCheckpoint {
///     pub offset: u64,
/// }
///
/// impl Checkpoint for OffsetCheckpoint {
///     const DATABASE_TYPE: &'static str = "offset";
///
///     fn to_cli_string(&self) -> String {
///         self.offset.to_string()
///     }
///
///     fn from_cli_string(s: &str) -> anyhow::Result<Self> {
///         Ok(Self { offset: s.parse()? })
///     }
/// }
/// ```
pub trait Checkpoint: serde::Serialize + for<'de> serde::Deserialize<'de> + Clone {
    /// Source type identifier (e.g., "mysql-binlog").
    ///
    /// This constant is used to:
    /// - Identify the checkpoint type in serialized files
    /// - Validate checkpoint type when loading from file
    const DATABASE_TYPE: &'static str;

    /// Convert to CLI-friendly string format.
    ///
    /// The returned string should be parseable by `from_cli_string()`.
    fn to_cli_string(&self) -> String;

    /// Parse from CLI string format.
    fn from_cli_string(s: &str) -> anyhow::Result<Self>
    where
        Self: Sized;
}
