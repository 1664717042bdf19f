//! Unit tests for the checkpoint crate.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tempfile::TempDir;

use crate::{
    Checkpoint, CheckpointFile, CheckpointStore, FilesystemStore, Loaded, MemoryStore,
    SyncManager, SyncPhase,
};

/// Test checkpoint type for unit tests.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
struct TestCheckpoint {
    file: String,
    offset: u64,
}

impl Checkpoint for TestCheckpoint {
    const DATABASE_TYPE: &'static str = "test";

    fn to_cli_string(&self) -> String {
        format!("{}:{}", self.file, self.offset)
    }

    fn from_cli_string(s: &str) -> anyhow::Result<Self> {
        let (file, offset) = s
            .rsplit_once(':')
            .ok_or_else(|| anyhow::anyhow!("Invalid test checkpoint format: expected 'file:offset'"))?;
        Ok(Self {
            file: file.to_string(),
            offset: offset.parse()?,
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct OtherCheckpoint {
    value: i64,
}

impl Checkpoint for OtherCheckpoint {
    const DATABASE_TYPE: &'static str = "other";

    fn to_cli_string(&self) -> String {
        self.value.to_string()
    }

    fn from_cli_string(s: &str) -> anyhow::Result<Self> {
        Ok(Self { value: s.parse()? })
    }
}

fn cp(offset: u64) -> TestCheckpoint {
    TestCheckpoint {
        file: "mysql-bin.000003".to_string(),
        offset,
    }
}

// ============================================================================
// CheckpointFile Tests
// ============================================================================

#[test]
fn test_checkpoint_file_roundtrip() {
    let original = cp(4711);
    let file = CheckpointFile::new(&original, SyncPhase::Incremental, "v1").unwrap();

    let json = serde_json::to_string_pretty(&file).unwrap();
    let loaded: CheckpointFile = serde_json::from_str(&json).unwrap();

    assert_eq!(loaded.database_type(), "test");
    assert_eq!(loaded.phase(), SyncPhase::Incremental);
    assert_eq!(loaded.generation(), "v1");
    assert_eq!(loaded.parse::<TestCheckpoint>().unwrap(), original);
}

#[test]
fn test_checkpoint_type_mismatch() {
    let file = CheckpointFile::new(&cp(1), SyncPhase::Incremental, "v1").unwrap();
    let err = file.parse::<OtherCheckpoint>().unwrap_err();
    assert!(err.to_string().contains("Checkpoint type mismatch"));
}

#[test]
fn test_checkpoint_file_without_generation_defaults_to_empty() {
    let json = r#"{
        "database_type": "test",
        "checkpoint": {"file": "mysql-bin.000001", "offset": 4},
        "phase": "FullSyncStart",
        "created_at": "2024-01-01T00:00:00Z"
    }"#;
    let file: CheckpointFile = serde_json::from_str(json).unwrap();
    assert_eq!(file.generation(), "");
    assert_eq!(file.phase(), SyncPhase::FullSyncStart);
}

#[test]
fn test_sync_phase_as_str() {
    assert_eq!(SyncPhase::FullSyncStart.as_str(), "full_sync_start");
    assert_eq!(SyncPhase::Incremental.as_str(), "incremental");
    assert_eq!(SyncPhase::Incremental.to_string(), "incremental");
}

#[test]
fn test_checkpoint_cli_string_roundtrip() {
    let parsed = TestCheckpoint::from_cli_string(&cp(99).to_cli_string()).unwrap();
    assert_eq!(parsed, cp(99));
    assert!(TestCheckpoint::from_cli_string("no-offset").is_err());
}

// ============================================================================
// FilesystemStore Tests
// ============================================================================

#[tokio::test]
async fn test_filesystem_store_missing_is_none() {
    let dir = TempDir::new().unwrap();
    let store = FilesystemStore::new(dir.path().join("does-not-exist-yet"));
    assert!(store.read(SyncPhase::Incremental).await.unwrap().is_none());
}

#[tokio::test]
async fn test_filesystem_store_replaces_record() {
    let dir = TempDir::new().unwrap();
    let store = FilesystemStore::new(dir.path());

    for offset in [10, 20, 30] {
        let file = CheckpointFile::new(&cp(offset), SyncPhase::Incremental, "v1").unwrap();
        store.write(&file).await.unwrap();
    }

    let loaded = store.read(SyncPhase::Incremental).await.unwrap().unwrap();
    assert_eq!(loaded.parse::<TestCheckpoint>().unwrap().offset, 30);

    // Exactly one record file, no leftover temporary files
    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(names, vec!["incremental.json".to_string()]);
}

#[tokio::test]
async fn test_filesystem_store_separate_phases() {
    let dir = TempDir::new().unwrap();
    let store = FilesystemStore::new(dir.path());

    let marker = CheckpointFile::new(&cp(4), SyncPhase::FullSyncStart, "v1").unwrap();
    let running = CheckpointFile::new(&cp(900), SyncPhase::Incremental, "v1").unwrap();
    store.write(&marker).await.unwrap();
    store.write(&running).await.unwrap();

    assert!(store.path_for(SyncPhase::FullSyncStart).exists());
    let m = store.read(SyncPhase::FullSyncStart).await.unwrap().unwrap();
    let r = store.read(SyncPhase::Incremental).await.unwrap().unwrap();
    assert_eq!(m.parse::<TestCheckpoint>().unwrap().offset, 4);
    assert_eq!(r.parse::<TestCheckpoint>().unwrap().offset, 900);
}

#[tokio::test]
async fn test_filesystem_store_corrupt_file_is_error() {
    let dir = TempDir::new().unwrap();
    let store = FilesystemStore::new(dir.path());
    std::fs::write(store.path_for(SyncPhase::Incremental), "{not json").unwrap();
    assert!(store.read(SyncPhase::Incremental).await.is_err());
}

#[tokio::test]
async fn test_directory_sync_reports_failures() {
    let dir = TempDir::new().unwrap();
    assert!(crate::filesystem::sync_dir(&dir.path().join("gone")).await.is_err());
    #[cfg(unix)]
    crate::filesystem::sync_dir(dir.path()).await.unwrap();
}

// ============================================================================
// SyncManager Tests
// ============================================================================

#[tokio::test]
async fn test_sync_manager_save_and_load() {
    let dir = TempDir::new().unwrap();
    let manager = SyncManager::new(Arc::new(FilesystemStore::new(dir.path())), "v1");

    assert_eq!(
        manager.load::<TestCheckpoint>(SyncPhase::Incremental).await.unwrap(),
        Loaded::NotInitialized
    );

    manager.save(&cp(120), SyncPhase::Incremental).await.unwrap();
    let loaded = manager
        .load::<TestCheckpoint>(SyncPhase::Incremental)
        .await
        .unwrap();
    assert_eq!(loaded, Loaded::Current(cp(120)));
}

#[tokio::test]
async fn test_sync_manager_other_generation() {
    let store = Arc::new(MemoryStore::new());
    let old = SyncManager::new(store.clone(), "v1");
    old.save(&cp(5), SyncPhase::Incremental).await.unwrap();

    let new = SyncManager::new(store.clone(), "v2");
    let loaded = new.load::<TestCheckpoint>(SyncPhase::Incremental).await.unwrap();
    assert_eq!(
        loaded,
        Loaded::OtherGeneration {
            found: "v1".to_string()
        }
    );
    assert!(loaded.current().is_none());
}

#[tokio::test]
async fn test_sync_manager_type_mismatch_is_error() {
    let store = Arc::new(MemoryStore::new());
    let manager = SyncManager::new(store, "v1");
    manager
        .save(&OtherCheckpoint { value: 1 }, SyncPhase::Incremental)
        .await
        .unwrap();
    assert!(manager
        .load::<TestCheckpoint>(SyncPhase::Incremental)
        .await
        .is_err());
}

#[tokio::test]
async fn test_memory_store_counts_writes() {
    let store = Arc::new(MemoryStore::new());
    let manager = SyncManager::new(store.clone(), "v1");
    manager.save(&cp(1), SyncPhase::FullSyncStart).await.unwrap();
    manager.save(&cp(2), SyncPhase::Incremental).await.unwrap();
    manager.save(&cp(3), SyncPhase::Incremental).await.unwrap();
    assert_eq!(store.write_count(), 3);
}
