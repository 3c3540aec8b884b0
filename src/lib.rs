//! Assets Patcher: regex-driven patching of text assets inside game asset
//! containers.
//!
//! A patch collection is a JSON list of named definitions. Each definition
//! carries a *locator* regex that decides which TextAsset objects it applies
//! to, and an ordered list of target/replacement rules run over the text of
//! every object the locator matches.
//!
//! # Architecture
//!
//! - [`config`] loads, edits and saves patch collections.
//! - [`validate`] checks them, loosely at creation time and strictly before
//!   an apply.
//! - [`container`] abstracts the archive format behind [`ContainerAccess`].
//! - [`engine`] runs the rewrite and commits the result.
//! - [`backup`] keeps a sibling `.backup` copy of the original.
//!
//! # Safety
//!
//! - Patches are fully validated before any file is opened
//! - The patched archive is written to `<path>.temp` and renamed over the
//!   original, so the original is never left half-written
//! - Backups are verified by digest after every copy
//! - One run per container path at a time within a process
//!
//! # Example
//!
//! ```no_run
//! use assets_patcher::{load_from_path, BackupManager, PatchEngine, TracingObserver};
//! use std::path::Path;
//!
//! let container = Path::new("Game_Data/resources.assets");
//! let patches = load_from_path("patches/dialog.json")?;
//!
//! BackupManager::new().create_backup(container)?;
//! let report = PatchEngine::default().apply(container, &patches, &mut TracingObserver)?;
//! println!("applied {} patches", report.definitions_matched());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod atomic;
pub mod backup;
pub mod cache;
pub mod codec;
pub mod config;
pub mod container;
pub mod engine;
pub mod validate;

// Re-exports
pub use backup::{backup_path, BackupError, BackupManager};
pub use codec::{CodecError, TextCodec};
pub use config::{
    load, load_from_dir, load_from_path, load_from_str, save_to_dir, save_to_path,
    CollectionError, ConfigError, PatchCollection, PatchDefinition, PatchRule,
};
pub use container::{BlobArchive, ContainerAccess, ContainerError, ObjectId, ObjectInfo};
pub use engine::{
    ApplyObserver, ApplyReport, CancellationToken, ContainerInfo, EngineError, EngineOptions,
    EngineState, NoopObserver, PatchEngine, RecordingObserver, ScanReport, TracingObserver,
};
pub use validate::{lint_replacements, validate, validate_for_apply, ValidationError};
