//! Successful runs: matching, rewriting, reporting, commit.

use super::fixtures::{definition, patches, payload, write_archive};
use assets_patcher::engine::{
    temp_path, Callbacks, EngineEvent, EngineOptions, EngineState, PatchEngine, RecordingObserver,
};
use assets_patcher::TextCodec;
use std::fs;
use std::sync::mpsc;
use std::thread;
use tempfile::TempDir;

#[test]
fn test_hello_world_scenario() {
    let dir = TempDir::new().unwrap();
    let path = write_archive(dir.path(), &[("TextAsset", "greeting", b"say HELLO now")]);
    let patches = patches(vec![definition("T", "HELLO", &[("HELLO", "WORLD")])]);

    let mut logs = Vec::new();
    let mut progress = Vec::new();
    let report = {
        let mut observer = Callbacks::new(
            |m: &str| logs.push(m.to_string()),
            |p| progress.push(p),
        );
        PatchEngine::default()
            .apply(&path, &patches, &mut observer)
            .unwrap()
    };

    assert_eq!(payload(&path, "greeting"), b"say WORLD now");
    assert_eq!(
        logs.iter().filter(|m| m.as_str() == "Applied patch: T").count(),
        1
    );
    assert_eq!(progress.last(), Some(&100.0));
    assert_eq!(report.definitions_matched(), 1);

    assert_eq!(
        logs,
        vec![
            "Loading assets file...",
            "Assets file loaded successfully",
            "Searching for objects to patch...",
            "Found asset file for patch: T",
            "Applied patch: T",
            "Saving patched data...",
            "Patching complete! Applied 1 patches.",
        ]
    );
}

#[test]
fn test_commit_leaves_no_temp_file() {
    let dir = TempDir::new().unwrap();
    let path = write_archive(
        dir.path(),
        &[
            ("TextAsset", "a", b"alpha"),
            ("Texture2D", "tex", b"alpha"),
            ("TextAsset", "b", b"beta"),
        ],
    );
    let patches = patches(vec![definition("p", "alpha", &[("alpha", "ALPHA")])]);

    let report = PatchEngine::default()
        .apply(&path, &patches, &mut RecordingObserver::default())
        .unwrap();

    assert!(!temp_path(&path).exists());
    assert_eq!(payload(&path, "a"), b"ALPHA");
    // only TextAssets are considered
    assert_eq!(payload(&path, "tex"), b"alpha");
    assert_eq!(payload(&path, "b"), b"beta");
    assert_eq!(report.objects_scanned, 3);
    assert_eq!(report.text_assets, 2);
    assert_eq!(report.patched_objects, vec!["a"]);
}

#[test]
fn test_progress_phases() {
    let dir = TempDir::new().unwrap();
    let path = write_archive(
        dir.path(),
        &[
            ("TextAsset", "a", b"1"),
            ("TextAsset", "b", b"2"),
            ("Mesh", "c", b"3"),
            ("TextAsset", "d", b"4"),
        ],
    );
    let patches = patches(vec![definition("p", "1", &[("1", "one")])]);

    let mut observer = RecordingObserver::default();
    PatchEngine::default()
        .apply(&path, &patches, &mut observer)
        .unwrap();

    assert_eq!(observer.progress, vec![12.5, 25.0, 37.5, 50.0, 75.0, 100.0]);
    assert!(observer.progress.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_one_object_two_definitions_in_order() {
    let dir = TempDir::new().unwrap();
    let path = write_archive(dir.path(), &[("TextAsset", "shop", b"price=10 item=sword")]);
    let patches = patches(vec![
        definition("Cheaper", "price=", &[(r"price=\d+", "price=1")]),
        definition("Sharper", "sword", &[("sword", "great sword"), ("price=1", "price=2")]),
    ]);

    let mut observer = RecordingObserver::default();
    let report = PatchEngine::default()
        .apply(&path, &patches, &mut observer)
        .unwrap();

    assert_eq!(payload(&path, "shop"), b"price=2 item=great sword");
    assert_eq!(report.definitions_matched(), 2);

    let applied: Vec<_> = observer
        .logs
        .iter()
        .filter(|m| m.starts_with("Applied patch:"))
        .collect();
    assert_eq!(applied, vec!["Applied patch: Cheaper", "Applied patch: Sharper"]);
}

#[test]
fn test_definition_matching_many_objects_counts_once() {
    let dir = TempDir::new().unwrap();
    let path = write_archive(
        dir.path(),
        &[
            ("TextAsset", "one", b"gold"),
            ("TextAsset", "two", b"gold"),
            ("TextAsset", "three", b"silver"),
        ],
    );
    let patches = patches(vec![
        definition("Gold", "gold", &[("gold", "GOLD")]),
        definition("Bronze", "bronze", &[("bronze", "BRONZE")]),
    ]);

    let mut observer = RecordingObserver::default();
    let report = PatchEngine::default()
        .apply(&path, &patches, &mut observer)
        .unwrap();

    assert_eq!(report.definitions_matched(), 1);
    assert_eq!(
        report.outcome("Gold").unwrap().matched_objects,
        vec!["one", "two"]
    );
    assert!(!report.outcome("Bronze").unwrap().matched());
    assert_eq!(
        observer.logs.last().map(String::as_str),
        Some("Patching complete! Applied 1 patches.")
    );
}

#[test]
fn test_locator_match_without_rule_match_still_commits() {
    let dir = TempDir::new().unwrap();
    let path = write_archive(dir.path(), &[("TextAsset", "a", b"marker only")]);
    let patches = patches(vec![definition("p", "marker", &[("absent", "x")])]);

    let report = PatchEngine::default()
        .apply(&path, &patches, &mut RecordingObserver::default())
        .unwrap();

    assert_eq!(report.definitions_matched(), 1);
    assert!(report.patched_objects.is_empty());
    assert_eq!(payload(&path, "a"), b"marker only");
}

#[test]
fn test_escaped_view_exposes_newlines_and_non_ascii() {
    let dir = TempDir::new().unwrap();
    let path = write_archive(
        dir.path(),
        &[("TextAsset", "menu", "Caf\u{e9}\nOpen".as_bytes())],
    );
    // Rules see "Caf\xe9\nOpen", backslashes included.
    let patches = patches(vec![definition(
        "Rename",
        r"Caf\\xe9",
        &[(r"Caf\\xe9\\nOpen", r"Bistro\nClosed")],
    )]);

    PatchEngine::default()
        .apply(&path, &patches, &mut RecordingObserver::default())
        .unwrap();

    assert_eq!(payload(&path, "menu"), b"Bistro\nClosed");
}

#[test]
fn test_utf8_codec_matches_raw_text() {
    let dir = TempDir::new().unwrap();
    let path = write_archive(
        dir.path(),
        &[("TextAsset", "menu", "Caf\u{e9}\nOpen".as_bytes())],
    );
    let patches = patches(vec![definition(
        "Rename",
        "Café",
        &[("(?m)^Open$", "Closed")],
    )]);

    let engine = PatchEngine::new(EngineOptions {
        codec: TextCodec::Utf8,
        ..EngineOptions::default()
    });
    engine
        .apply(&path, &patches, &mut RecordingObserver::default())
        .unwrap();

    assert_eq!(payload(&path, "menu"), "Caf\u{e9}\nClosed".as_bytes());
}

#[test]
fn test_events_drained_on_another_thread() {
    let dir = TempDir::new().unwrap();
    let path = write_archive(dir.path(), &[("TextAsset", "a", b"ping")]);
    let patches = patches(vec![definition("pong", "ping", &[("ping", "pong")])]);

    let (tx, rx) = mpsc::channel();
    let worker = {
        let path = path.clone();
        thread::spawn(move || {
            let mut tx = tx;
            PatchEngine::default().apply(&path, &patches, &mut tx)
        })
    };

    let events: Vec<EngineEvent> = rx.iter().collect();
    let report = worker.join().unwrap().unwrap();

    assert_eq!(report.definitions_matched(), 1);
    assert_eq!(events.last(), Some(&EngineEvent::State(EngineState::Done)));
    assert!(events.contains(&EngineEvent::Progress(100.0)));
    assert!(events.contains(&EngineEvent::Log("Applied patch: pong".to_string())));
    assert_eq!(payload(&path, "a"), b"pong");
}

#[test]
fn test_scan_reports_without_writing() {
    let dir = TempDir::new().unwrap();
    let path = write_archive(
        dir.path(),
        &[("TextAsset", "a", b"red"), ("TextAsset", "b", b"blue")],
    );
    let before = fs::read(&path).unwrap();
    let patches = patches(vec![
        definition("Red", "red", &[("red", "crimson")]),
        definition("Green", "green", &[("green", "lime")]),
    ]);

    let mut observer = RecordingObserver::default();
    let report = PatchEngine::default()
        .scan(&path, &patches, &mut observer)
        .unwrap();

    assert_eq!(fs::read(&path).unwrap(), before);
    assert!(!temp_path(&path).exists());
    assert_eq!(report.changes.len(), 1);
    assert_eq!(report.changes[0].name, "a");
    assert_eq!(report.changes[0].after, b"crimson");
    assert_eq!(
        observer.logs.last().map(String::as_str),
        Some("Test complete. 1/2 patches would match.")
    );    assert!(!observer
        .logs
        .iter()
        .any(|m| m.starts_with("Applied patch:") || m.starts_with("Found asset file")));
}

#[test]
fn test_second_apply_is_stable_when_rules_are_idempotent() {
    let dir = TempDir::new().unwrap();
    let path = write_archive(dir.path(), &[("TextAsset", "a", b"volume=3")]);
    let patches = patches(vec![definition("Max", "volume=", &[(r"volume=\d+", "volume=10")])]);

    let engine = PatchEngine::default();
    engine
        .apply(&path, &patches, &mut RecordingObserver::default())
        .unwrap();
    let once = fs::read(&path).unwrap();
    engine
        .apply(&path, &patches, &mut RecordingObserver::default())
        .unwrap();

    assert_eq!(fs::read(&path).unwrap(), once);
    assert_eq!(payload(&path, "a"), b"volume=10");
}
