//! The patch engine: load a container, rewrite matching TextAssets, and
//! commit the result back over the original file.
//!
//! A run moves through [`EngineState`] in order:
//!
//! ```text
//! Idle -> Loading -> Scanning -> Rewriting -> Serializing -> Committing -> Done
//! ```
//!
//! Any fatal error moves it to `Failed`. Until `Committing` the original file
//! is never touched; the patched archive is written to `<path>.temp` and
//! renamed over the original in one step.

pub mod observer;
pub mod registry;
pub mod report;
mod rewrite;

pub use observer::{
    ApplyObserver, Callbacks, EngineEvent, NoopObserver, RecordingObserver, TracingObserver,
};
pub use registry::is_running;
pub use report::{
    ApplyReport, ContainerInfo, DefinitionOutcome, ObjectChange, RunReport, ScanReport,
    SkippedObject,
};

use crate::atomic::remove_if_exists;
use crate::backup::BackupManager;
use crate::codec::TextCodec;
use crate::config::PatchCollection;
use crate::container::{BlobArchive, ContainerAccess, ContainerError, ObjectInfo};
use crate::validate::ValidationError;
use registry::RunGuard;
use rewrite::CompiledPatchSet;
use std::borrow::Cow;
use std::error::Error as StdError;
use std::ffi::OsString;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const TEMP_SUFFIX: &str = ".temp";

/// `<path>.temp`, the staging file a run serializes into.
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EngineState {
    #[default]
    Idle,
    Loading,
    Scanning,
    Rewriting,
    Serializing,
    Committing,
    Done,
    Failed,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EngineState::Idle => "idle",
            EngineState::Loading => "loading",
            EngineState::Scanning => "scanning",
            EngineState::Rewriting => "rewriting",
            EngineState::Serializing => "serializing",
            EngineState::Committing => "committing",
            EngineState::Done => "done",
            EngineState::Failed => "failed",
        };
        f.write_str(s)
    }
}

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid patches: {0}")]
    Validation(#[from] ValidationError),

    #[error("container file does not exist: {path}")]
    ContainerNotFound { path: PathBuf },

    #[error("failed to load container {path}: {source}")]
    ContainerLoadError {
        path: PathBuf,
        #[source]
        source: ContainerError,
    },

    #[error("failed to decode payload of '{object}': {source}")]
    PayloadDecodeError {
        object: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to encode payload of '{object}': {source}")]
    PayloadEncodeError {
        object: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to serialize container to {path}: {source}")]
    SerializeError {
        path: PathBuf,
        #[source]
        source: ContainerError,
    },

    #[error("failed to move {temp_path} over {path}: {source}")]
    CommitError {
        temp_path: PathBuf,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("a patch run is already in progress for {path}")]
    AlreadyRunning { path: PathBuf },

    #[error("patch run cancelled")]
    Cancelled,
}

/// Shared flag a caller can set to stop a run between objects.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineOptions {
    /// How payload bytes become text and back.
    pub codec: TextCodec,
    /// Fail the whole run on the first undecodable or unencodable object
    /// instead of skipping it.
    pub strict: bool,
    /// Emit extra `[VERBOSE]` log lines per matched object.
    pub verbose: bool,
}

/// Observer wrapper that also tracks the current state and mirrors
/// everything into `tracing`.
struct Reporter<'a> {
    observer: &'a mut dyn ApplyObserver,
    verbose: bool,
    state: EngineState,
}

impl<'a> Reporter<'a> {
    fn new(observer: &'a mut dyn ApplyObserver, verbose: bool) -> Self {
        Self {
            observer,
            verbose,
            state: EngineState::Idle,
        }
    }

    fn log(&mut self, message: &str) {
        debug!(state = %self.state, "{message}");
        self.observer.on_log(message);
    }

    fn verbose(&mut self, message: &str) {
        if self.verbose {
            self.observer.on_log(&format!("[VERBOSE] {message}"));
        }
    }

    fn progress(&mut self, percent: f64) {
        self.observer.on_progress(percent.clamp(0.0, 100.0));
    }

    fn state(&mut self, state: EngineState) {
        debug!(from = %self.state, to = %state, "engine state");
        self.state = state;
        self.observer.on_state(state);
    }
}

/// Result of rewriting one object.
enum Outcome {
    Unchanged,
    Changed { before: Vec<u8>, after: Vec<u8> },
}

/// Applies patch collections to containers of type `C`.
pub struct PatchEngine<C = BlobArchive> {
    options: EngineOptions,
    cancel: Option<CancellationToken>,
    _container: PhantomData<fn() -> C>,
}

impl<C> Clone for PatchEngine<C> {
    fn clone(&self) -> Self {
        Self {
            options: self.options,
            cancel: self.cancel.clone(),
            _container: PhantomData,
        }
    }
}

impl PatchEngine {
    pub fn new(options: EngineOptions) -> Self {
        Self::for_container(options)
    }
}

impl Default for PatchEngine {
    fn default() -> Self {
        Self::new(EngineOptions::default())
    }
}

impl<C: ContainerAccess> PatchEngine<C> {
    /// An engine for a container format other than [`BlobArchive`].
    pub fn for_container(options: EngineOptions) -> Self {
        Self {
            options,
            cancel: None,
            _container: PhantomData,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Apply `patches` to the container at `path`, replacing it in place.
    ///
    /// Does not create a backup; callers that want one should run
    /// [`BackupManager::create_backup`] first.
    pub fn apply(
        &self,
        path: &Path,
        patches: &PatchCollection,
        observer: &mut dyn ApplyObserver,
    ) -> Result<ApplyReport, EngineError> {
        let mut reporter = Reporter::new(observer, self.options.verbose);
        let result = self.run_apply(path, patches, &mut reporter);
        match &result {
            Ok(report) => info!(
                path = %path.display(),
                applied = report.definitions_matched(),
                objects = report.patched_objects.len(),
                "patch run complete"
            ),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "patch run failed");
                reporter.log(&format!("Error during patching: {e}"));
                reporter.state(EngineState::Failed);
            }
        }
        result
    }

    fn run_apply(
        &self,
        path: &Path,
        patches: &PatchCollection,
        reporter: &mut Reporter<'_>,
    ) -> Result<RunReport, EngineError> {
        let compiled = CompiledPatchSet::compile(patches)?;
        let _guard = RunGuard::acquire(path)?;

        let mut container = self.load(path, reporter)?;
        let mut report = RunReport::new(compiled.names());

        reporter.state(EngineState::Scanning);
        reporter.log("Searching for objects to patch...");
        let objects = container.objects();
        report.objects_scanned = objects.len();

        reporter.state(EngineState::Rewriting);
        let total = objects.len();
        for (processed, object) in objects.iter().enumerate() {
            self.check_cancelled()?;
            if object.is_text_asset() {
                report.text_assets += 1;
                if let Outcome::Changed { after, .. } =
                    self.rewrite_object(&container, object, &compiled, &mut report, reporter, true)?
                {
                    match container.write_payload(object.id, after) {
                        Ok(()) => report.patched_objects.push(object.name.clone()),
                        Err(e) => self.skip_or_fail(
                            object,
                            EngineError::PayloadEncodeError {
                                object: object.name.clone(),
                                source: Box::new(e),
                            },
                            &mut report,
                            reporter,
                        )?,
                    }
                }
            }
            reporter.progress(50.0 * (processed + 1) as f64 / total as f64);
        }
        if total == 0 {
            reporter.progress(50.0);
        }

        reporter.state(EngineState::Serializing);
        reporter.log("Saving patched data...");
        let temp = temp_path(path);
        if let Err(source) = write_container(&container, &temp) {
            if let Err(e) = remove_if_exists(&temp) {
                warn!(temp = %temp.display(), error = %e, "failed to remove temp file");
            }
            return Err(EngineError::SerializeError { path: temp, source });
        }
        reporter.progress(75.0);

        if let Err(e) = self.check_cancelled() {
            if let Err(err) = remove_if_exists(&temp) {
                warn!(temp = %temp.display(), error = %err, "failed to remove temp file");
            }
            return Err(e);
        }

        reporter.state(EngineState::Committing);
        fs::rename(&temp, path).map_err(|source| EngineError::CommitError {
            temp_path: temp.clone(),
            path: path.to_path_buf(),
            source,
        })?;
        reporter.progress(100.0);
        reporter.log(&format!(
            "Patching complete! Applied {} patches.",
            report.definitions_matched()
        ));
        reporter.state(EngineState::Done);
        Ok(report)
    }

    /// Dry run: report what [`apply`](Self::apply) would change without
    /// writing anything. Progress covers 0-100 over the object walk.
    pub fn scan(
        &self,
        path: &Path,
        patches: &PatchCollection,
        observer: &mut dyn ApplyObserver,
    ) -> Result<ScanReport, EngineError> {
        let mut reporter = Reporter::new(observer, self.options.verbose);
        let result = self.run_scan(path, patches, &mut reporter);
        if let Err(e) = &result {
            reporter.log(&format!("Error testing patches: {e}"));
            reporter.state(EngineState::Failed);
        }
        result
    }

    fn run_scan(
        &self,
        path: &Path,
        patches: &PatchCollection,
        reporter: &mut Reporter<'_>,
    ) -> Result<RunReport, EngineError> {
        let compiled = CompiledPatchSet::compile(patches)?;
        let container = self.load(path, reporter)?;
        let mut report = RunReport::new(compiled.names());

        reporter.state(EngineState::Scanning);
        let objects = container.objects();
        report.objects_scanned = objects.len();
        let total = objects.len();
        for (processed, object) in objects.iter().enumerate() {
            self.check_cancelled()?;
            if object.is_text_asset() {
                report.text_assets += 1;
                if let Outcome::Changed { before, after } =
                    self.rewrite_object(&container, object, &compiled, &mut report, reporter, false)?
                {
                    report.patched_objects.push(object.name.clone());
                    report.changes.push(ObjectChange {
                        name: object.name.clone(),
                        before,
                        after,
                    });
                }
            }
            reporter.progress(100.0 * (processed + 1) as f64 / total as f64);
        }
        if total == 0 {
            reporter.progress(100.0);
        }

        reporter.log(&format!(
            "Test complete. {}/{} patches would match.",
            report.definitions_matched(),
            report.total_patches()
        ));
        reporter.state(EngineState::Done);
        Ok(report)
    }

    /// Size and object counts for the container at `path`.
    pub fn info(&self, path: &Path) -> Result<ContainerInfo, EngineError> {
        let metadata = fs::metadata(path).map_err(|_| EngineError::ContainerNotFound {
            path: path.to_path_buf(),
        })?;
        let container = C::open(path).map_err(|source| EngineError::ContainerLoadError {
            path: path.to_path_buf(),
            source,
        })?;
        let objects = container.objects();

        Ok(ContainerInfo {
            path: path.to_path_buf(),
            file_size: metadata.len(),
            total_objects: objects.len(),
            text_assets: objects.iter().filter(|o| o.is_text_asset()).count(),
            backup_exists: BackupManager::new().has_backup(path),
        })
    }

    fn load(&self, path: &Path, reporter: &mut Reporter<'_>) -> Result<C, EngineError> {
        if !path.is_file() {
            return Err(EngineError::ContainerNotFound {
                path: path.to_path_buf(),
            });
        }

        reporter.state(EngineState::Loading);
        reporter.log("Loading assets file...");
        let container = C::open(path).map_err(|source| EngineError::ContainerLoadError {
            path: path.to_path_buf(),
            source,
        })?;
        reporter.log("Assets file loaded successfully");
        Ok(container)
    }

    /// Decode one TextAsset, run every definition over it, and re-encode
    /// the result if the text changed. Match lines are only logged when
    /// `announce` is set.
    fn rewrite_object(
        &self,
        container: &C,
        object: &ObjectInfo,
        compiled: &CompiledPatchSet,
        report: &mut RunReport,
        reporter: &mut Reporter<'_>,
        announce: bool,
    ) -> Result<Outcome, EngineError> {
        let codec = self.options.codec;
        let before = match container.read_payload(object.id) {
            Ok(payload) => payload.into_owned(),
            Err(e) => {
                let err = EngineError::PayloadDecodeError {
                    object: object.name.clone(),
                    source: Box::new(e),
                };
                self.skip_or_fail(object, err, report, reporter)?;
                return Ok(Outcome::Unchanged);
            }
        };
        let text = match codec.decode(&before) {
            Ok(text) => text,
            Err(e) => {
                let err = EngineError::PayloadDecodeError {
                    object: object.name.clone(),
                    source: Box::new(e),
                };
                self.skip_or_fail(object, err, report, reporter)?;
                return Ok(Outcome::Unchanged);
            }
        };

        let mut matches = Vec::new();
        let rewritten = compiled.rewrite(&text, |m| matches.push(m));

        for m in &matches {
            report.record_match(m.definition, &object.name);
            if !announce {
                continue;
            }
            let name = compiled.name(m.definition);
            reporter.log(&format!("Found asset file for patch: {name}"));
            reporter.verbose(&format!("Object to patch: {}", object.name));
            reporter.verbose(&format!(
                "Content length changed from {} to {}",
                m.before_len, m.after_len
            ));
            reporter.log(&format!("Applied patch: {name}"));
        }

        let new_text = match rewritten {
            Cow::Owned(s) if s != text => s,
            _ => return Ok(Outcome::Unchanged),
        };

        match codec.encode(&new_text) {
            Ok(after) => Ok(Outcome::Changed { before, after }),
            Err(e) => {
                let err = EngineError::PayloadEncodeError {
                    object: object.name.clone(),
                    source: Box::new(e),
                };
                self.skip_or_fail(object, err, report, reporter)?;
                Ok(Outcome::Unchanged)
            }
        }
    }

    /// Per-object failures abort the run in strict mode and are recorded
    /// and logged otherwise.
    fn skip_or_fail(
        &self,
        object: &ObjectInfo,
        err: EngineError,
        report: &mut RunReport,
        reporter: &mut Reporter<'_>,
    ) -> Result<(), EngineError> {
        if self.options.strict {
            return Err(err);
        }

        let reason = match err.source() {
            Some(source) => source.to_string(),
            None => err.to_string(),
        };
        warn!(object = %object.name, %reason, "skipping object");
        reporter.log(&format!("Skipping object '{}': {reason}", object.name));
        report.skipped.push(SkippedObject {
            name: object.name.clone(),
            reason,
        });
        Ok(())
    }

    fn check_cancelled(&self) -> Result<(), EngineError> {
        match &self.cancel {
            Some(token) if token.is_cancelled() => Err(EngineError::Cancelled),
            _ => Ok(()),
        }
    }
}

/// Serialize `container` into a fresh file at `temp` and flush it to disk.
fn write_container<C: ContainerAccess>(container: &C, temp: &Path) -> Result<(), ContainerError> {
    let file = File::create(temp)?;
    let mut writer = BufWriter::new(file);
    container.write_to(&mut writer)?;
    writer.flush()?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(())
}
