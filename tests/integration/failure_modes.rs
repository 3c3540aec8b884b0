//! Failed, cancelled and partially skipped runs. Whatever happens before the
//! commit, the original file must come out byte-identical.

use super::fixtures::{definition, patches, payload, write_archive, FailingArchive, LockedArchive};
use assets_patcher::config::PatchCollection;
use assets_patcher::container::{BlobArchive, ContainerAccess};
use assets_patcher::engine::{
    temp_path, ApplyObserver, CancellationToken, EngineError, EngineOptions, EngineState,
    NoopObserver, PatchEngine, RecordingObserver,
};
use assets_patcher::ValidationError;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

const NOT_UTF8: &[u8] = b"\xff\xfe broken";

#[test]
fn test_bad_patches_fail_before_file_is_opened() {
    let dir = TempDir::new().unwrap();
    let path = write_archive(dir.path(), &[("TextAsset", "a", b"abc")]);
    let before = fs::read(&path).unwrap();
    let patches = patches(vec![definition("broken", "(", &[("a", "b")])]);

    let mut observer = RecordingObserver::default();
    let err = PatchEngine::default()
        .apply(&path, &patches, &mut observer)
        .unwrap_err();

    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::InvalidLocatorPattern { index: 0, .. })
    ));
    assert_eq!(fs::read(&path).unwrap(), before);
    assert_eq!(observer.states, vec![EngineState::Failed]);
    assert!(observer.progress.is_empty());
}

#[test]
fn test_empty_rule_list_rejected_at_apply() {
    let dir = TempDir::new().unwrap();
    let path = write_archive(dir.path(), &[("TextAsset", "a", b"abc")]);
    let patches = patches(vec![definition("nothing", "a", &[])]);

    let err = PatchEngine::default()
        .apply(&path, &patches, &mut NoopObserver)
        .unwrap_err();

    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::EmptyRules { .. })
    ));
}

#[test]
fn test_corrupt_container_untouched() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("resources.assets");
    fs::write(&path, b"definitely not an archive").unwrap();
    let patches = patches(vec![definition("p", "a", &[("a", "b")])]);

    let mut observer = RecordingObserver::default();
    let err = PatchEngine::default()
        .apply(&path, &patches, &mut observer)
        .unwrap_err();

    assert!(matches!(err, EngineError::ContainerLoadError { .. }));
    assert_eq!(fs::read(&path).unwrap(), b"definitely not an archive");
    assert!(!temp_path(&path).exists());
    assert_eq!(
        observer.states,
        vec![EngineState::Loading, EngineState::Failed]
    );
    assert!(observer
        .logs
        .last()
        .unwrap()
        .starts_with("Error during patching: failed to load container"));
}

#[test]
fn test_serialize_failure_removes_temp_and_keeps_original() {
    let dir = TempDir::new().unwrap();
    let path = write_archive(dir.path(), &[("TextAsset", "a", b"abc")]);
    let before = fs::read(&path).unwrap();
    let patches = patches(vec![definition("p", "abc", &[("abc", "xyz")])]);

    let engine = PatchEngine::<FailingArchive>::for_container(EngineOptions::default());
    let mut observer = RecordingObserver::default();
    let err = engine.apply(&path, &patches, &mut observer).unwrap_err();

    assert!(matches!(err, EngineError::SerializeError { .. }));
    assert_eq!(fs::read(&path).unwrap(), before);
    assert!(!temp_path(&path).exists());
    assert_eq!(observer.progress.last(), Some(&50.0));
    assert_eq!(
        &observer.states[observer.states.len() - 2..],
        &[EngineState::Serializing, EngineState::Failed]
    );
}

#[test]
fn test_undecodable_object_is_skipped() {
    let dir = TempDir::new().unwrap();
    let path = write_archive(
        dir.path(),
        &[
            ("TextAsset", "garbled", NOT_UTF8),
            ("TextAsset", "fine", b"HELLO there"),
        ],
    );
    let patches = patches(vec![definition("T", "HELLO", &[("HELLO", "WORLD")])]);

    let mut observer = RecordingObserver::default();
    let report = PatchEngine::default()
        .apply(&path, &patches, &mut observer)
        .unwrap();

    assert_eq!(payload(&path, "fine"), b"WORLD there");
    assert_eq!(payload(&path, "garbled"), NOT_UTF8);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].name, "garbled");
    assert!(observer
        .logs
        .iter()
        .any(|m| m.starts_with("Skipping object 'garbled': payload is not valid UTF-8")));
    assert_eq!(observer.states.last(), Some(&EngineState::Done));
}

#[test]
fn test_strict_mode_aborts_on_undecodable_object() {
    let dir = TempDir::new().unwrap();
    let path = write_archive(
        dir.path(),
        &[
            ("TextAsset", "fine", b"HELLO there"),
            ("TextAsset", "garbled", NOT_UTF8),
        ],
    );
    let before = fs::read(&path).unwrap();
    let patches = patches(vec![definition("T", "HELLO", &[("HELLO", "WORLD")])]);

    let engine = PatchEngine::new(EngineOptions {
        strict: true,
        ..EngineOptions::default()
    });
    let err = engine
        .apply(&path, &patches, &mut NoopObserver)
        .unwrap_err();

    match err {
        EngineError::PayloadDecodeError { object, .. } => assert_eq!(object, "garbled"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(fs::read(&path).unwrap(), before);
    assert!(!temp_path(&path).exists());
}

#[test]
fn test_unencodable_result_is_skipped() {
    let dir = TempDir::new().unwrap();
    let path = write_archive(
        dir.path(),
        &[("TextAsset", "a", b"path=C:"), ("TextAsset", "b", b"path=D:")],
    );
    // A lone trailing backslash is not a valid escape sequence.
    let patches = patches(vec![
        definition("Trail", "C:", &[("C:$", r"C:\")]),
        definition("Drive", "D:", &[("D:", "E:")]),
    ]);

    let mut observer = RecordingObserver::default();
    let report = PatchEngine::default()
        .apply(&path, &patches, &mut observer)
        .unwrap();

    assert_eq!(payload(&path, "a"), b"path=C:");
    assert_eq!(payload(&path, "b"), b"path=E:");
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].name, "a");
    assert_eq!(report.patched_objects, vec!["b"]);
}

#[test]
fn test_rejected_write_back_is_skipped() {
    let dir = TempDir::new().unwrap();
    let path = write_archive(
        dir.path(),
        &[
            ("TextAsset", "locked_intro", b"tea"),
            ("TextAsset", "outro", b"tea"),
        ],
    );
    let patches = patches(vec![definition("Coffee", "tea", &[("tea", "coffee")])]);

    let engine = PatchEngine::<LockedArchive>::for_container(EngineOptions::default());
    let report = engine
        .apply(&path, &patches, &mut RecordingObserver::default())
        .unwrap();

    assert_eq!(payload(&path, "locked_intro"), b"tea");
    assert_eq!(payload(&path, "outro"), b"coffee");
    assert_eq!(report.skipped[0].name, "locked_intro");
}

#[test]
fn test_missing_container() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("missing.assets");
    let patches = patches(vec![definition("p", "a", &[("a", "b")])]);

    let err = PatchEngine::default()
        .apply(&path, &patches, &mut NoopObserver)
        .unwrap_err();

    assert!(matches!(err, EngineError::ContainerNotFound { .. }));
    assert!(!path.exists());
    assert!(!temp_path(&path).exists());
}

/// Cancels the run the first time progress is reported.
struct CancelOnProgress(CancellationToken);

impl ApplyObserver for CancelOnProgress {
    fn on_progress(&mut self, _percent: f64) {
        self.0.cancel();
    }
}

#[test]
fn test_cancel_between_objects() {
    let dir = TempDir::new().unwrap();
    let path = write_archive(
        dir.path(),
        &[("TextAsset", "a", b"abc"), ("TextAsset", "b", b"abc")],
    );
    let before = fs::read(&path).unwrap();
    let patches = patches(vec![definition("p", "abc", &[("abc", "xyz")])]);

    let token = CancellationToken::new();
    let engine = PatchEngine::default().with_cancellation(token.clone());
    let err = engine
        .apply(&path, &patches, &mut CancelOnProgress(token))
        .unwrap_err();

    assert!(matches!(err, EngineError::Cancelled));
    assert_eq!(fs::read(&path).unwrap(), before);
    assert!(!temp_path(&path).exists());
}

/// Cancels once serialization has finished.
struct CancelAtSerialized(CancellationToken);

impl ApplyObserver for CancelAtSerialized {
    fn on_progress(&mut self, percent: f64) {
        if percent >= 75.0 {
            self.0.cancel();
        }
    }
}

#[test]
fn test_cancel_before_commit_removes_temp() {
    let dir = TempDir::new().unwrap();
    let path = write_archive(dir.path(), &[("TextAsset", "a", b"abc")]);
    let before = fs::read(&path).unwrap();
    let patches = patches(vec![definition("p", "abc", &[("abc", "xyz")])]);

    let token = CancellationToken::new();
    let engine = PatchEngine::default().with_cancellation(token.clone());
    let err = engine
        .apply(&path, &patches, &mut CancelAtSerialized(token))
        .unwrap_err();

    assert!(matches!(err, EngineError::Cancelled));
    assert_eq!(fs::read(&path).unwrap(), before);
    assert!(!temp_path(&path).exists());
}

/// Tries to start a second run on the same file while the first is loading.
struct Reentrant {
    path: PathBuf,
    patches: PatchCollection,
    nested: Option<Result<(), EngineError>>,
}

impl ApplyObserver for Reentrant {
    fn on_log(&mut self, message: &str) {
        if message == "Assets file loaded successfully" && self.nested.is_none() {
            let result = PatchEngine::default()
                .apply(&self.path, &self.patches, &mut NoopObserver)
                .map(|_| ());
            self.nested = Some(result);
        }
    }
}

#[test]
fn test_concurrent_run_on_same_path_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_archive(dir.path(), &[("TextAsset", "a", b"abc")]);
    let patches = patches(vec![definition("p", "abc", &[("abc", "xyz")])]);

    let mut observer = Reentrant {
        path: path.clone(),
        patches: patches.clone(),
        nested: None,
    };
    PatchEngine::default()
        .apply(&path, &patches, &mut observer)
        .unwrap();

    assert!(matches!(
        observer.nested,
        Some(Err(EngineError::AlreadyRunning { .. }))
    ));
    assert_eq!(payload(&path, "a"), b"xyz");
    assert!(!assets_patcher::engine::is_running(&path));
}

/// Swaps the container for a non-empty directory right before the rename,
/// keeping the original bytes aside.
struct BlockCommit {
    path: PathBuf,
    aside: PathBuf,
}

impl ApplyObserver for BlockCommit {
    fn on_state(&mut self, state: EngineState) {
        if state == EngineState::Committing {
            fs::rename(&self.path, &self.aside).unwrap();
            fs::create_dir(&self.path).unwrap();
            fs::write(self.path.join("occupied"), b"x").unwrap();
        }
    }
}

#[test]
fn test_failed_rename_keeps_temp_file() {
    let dir = TempDir::new().unwrap();
    let path = write_archive(dir.path(), &[("TextAsset", "a", b"abc")]);
    let before = fs::read(&path).unwrap();
    let patches = patches(vec![definition("p", "abc", &[("abc", "xyz")])]);

    let mut observer = BlockCommit {
        path: path.clone(),
        aside: dir.path().join("aside.assets"),
    };
    let err = PatchEngine::default()
        .apply(&path, &patches, &mut observer)
        .unwrap_err();

    match &err {
        EngineError::CommitError { temp_path: t, path: p, .. } => {
            assert_eq!(t, &temp_path(&path));
            assert_eq!(p, &path);
        }
        other => panic!("unexpected error: {other}"),
    }
    // the temp file stays behind with the patched archive in it
    let temp = temp_path(&path);
    assert!(temp.is_file());
    let patched = BlobArchive::open(&temp).unwrap();
    assert_eq!(patched.find("a").unwrap().payload, b"xyz");
    // whatever sat at the destination was not replaced
    assert!(path.join("occupied").is_file());
    assert_eq!(fs::read(dir.path().join("aside.assets")).unwrap(), before);
}
