//! Backup around a patch run: back up, patch, restore.

use super::fixtures::{definition, patches, payload, write_archive};
use assets_patcher::backup::{backup_path, BackupError, BackupManager};
use assets_patcher::engine::{PatchEngine, RecordingObserver};
use filetime::FileTime;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_patch_then_restore_gives_original_bytes() {
    let dir = TempDir::new().unwrap();
    let path = write_archive(dir.path(), &[("TextAsset", "a", b"original text")]);
    let original = fs::read(&path).unwrap();
    let patches = patches(vec![definition("p", "original", &[("original", "patched")])]);

    let manager = BackupManager::new();
    manager.create_backup(&path).unwrap();
    PatchEngine::default()
        .apply(&path, &patches, &mut RecordingObserver::default())
        .unwrap();

    assert_eq!(payload(&path, "a"), b"patched text");
    assert!(!manager.matches_backup(&path).unwrap());

    manager.restore_backup(&path).unwrap();
    assert_eq!(fs::read(&path).unwrap(), original);
    assert!(manager.matches_backup(&path).unwrap());
}

#[test]
fn test_info_sees_backup() {
    let dir = TempDir::new().unwrap();
    let path = write_archive(
        dir.path(),
        &[("TextAsset", "a", b"x"), ("AudioClip", "b", b"y")],
    );
    let engine = PatchEngine::default();

    assert!(!engine.info(&path).unwrap().backup_exists);
    BackupManager::new().create_backup(&path).unwrap();

    let info = engine.info(&path).unwrap();
    assert!(info.backup_exists);
    assert_eq!(info.total_objects, 2);
    assert_eq!(info.text_assets, 1);
}

#[test]
fn test_backup_keeps_modification_time() {
    let dir = TempDir::new().unwrap();
    let path = write_archive(dir.path(), &[("TextAsset", "a", b"x")]);
    let stamp = FileTime::from_unix_time(1_600_000_000, 0);
    filetime::set_file_mtime(&path, stamp).unwrap();

    let backup = BackupManager::new().create_backup(&path).unwrap();

    let meta = fs::metadata(&backup).unwrap();
    assert_eq!(FileTime::from_last_modification_time(&meta), stamp);
    assert_eq!(backup, backup_path(&path));
}

#[test]
fn test_restore_without_backup_leaves_file_alone() {
    let dir = TempDir::new().unwrap();
    let path = write_archive(dir.path(), &[("TextAsset", "a", b"x")]);
    let before = fs::read(&path).unwrap();

    let err = BackupManager::new().restore_backup(&path).unwrap_err();

    assert!(matches!(err, BackupError::BackupNotFound { .. }));
    assert_eq!(fs::read(&path).unwrap(), before);
}
