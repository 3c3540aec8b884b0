use std::fmt;
use std::path::PathBuf;

/// What happened to one patch definition during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionOutcome {
    pub name: String,
    /// Objects whose text matched the locator, in archive order.
    pub matched_objects: Vec<String>,
}

impl DefinitionOutcome {
    pub fn matched(&self) -> bool {
        !self.matched_objects.is_empty()
    }
}

/// A TextAsset left untouched because its payload could not be decoded,
/// re-encoded or written back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedObject {
    pub name: String,
    pub reason: String,
}

/// Payload of an object before and after patching (dry runs only).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectChange {
    pub name: String,
    pub before: Vec<u8>,
    pub after: Vec<u8>,
}

/// Result of an apply or a dry-run scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub objects_scanned: usize,
    pub text_assets: usize,
    /// Objects whose payload was (or, for a scan, would be) rewritten.
    pub patched_objects: Vec<String>,
    /// One entry per definition, in collection order.
    pub definitions: Vec<DefinitionOutcome>,
    pub skipped: Vec<SkippedObject>,
    /// Filled in by scans; empty after an apply.
    pub changes: Vec<ObjectChange>,
}

impl RunReport {
    pub(crate) fn new<'a>(names: impl Iterator<Item = &'a str>) -> Self {
        Self {
            definitions: names
                .map(|name| DefinitionOutcome {
                    name: name.to_string(),
                    matched_objects: Vec::new(),
                })
                .collect(),
            ..Self::default()
        }
    }

    pub(crate) fn record_match(&mut self, definition: usize, object: &str) {
        if let Some(outcome) = self.definitions.get_mut(definition) {
            outcome.matched_objects.push(object.to_string());
        }
    }

    pub fn total_patches(&self) -> usize {
        self.definitions.len()
    }

    /// Definitions that matched at least one object.
    pub fn definitions_matched(&self) -> usize {
        self.definitions.iter().filter(|d| d.matched()).count()
    }

    /// First outcome for a definition called `name`.
    pub fn outcome(&self, name: &str) -> Option<&DefinitionOutcome> {
        self.definitions.iter().find(|d| d.name == name)
    }
}

/// Returned by [`PatchEngine::apply`](super::PatchEngine::apply).
pub type ApplyReport = RunReport;

/// Returned by [`PatchEngine::scan`](super::PatchEngine::scan).
pub type ScanReport = RunReport;

/// Summary of a container file.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerInfo {
    pub path: PathBuf,
    pub file_size: u64,
    pub total_objects: usize,
    pub text_assets: usize,
    pub backup_exists: bool,
}

impl ContainerInfo {
    /// Size in MiB, rounded to two decimals.
    pub fn file_size_mb(&self) -> f64 {
        (self.file_size as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0
    }
}

impl fmt::Display for ContainerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "File: {}", self.path.display())?;
        writeln!(
            f,
            "Size: {} bytes ({:.2} MB)",
            self.file_size,
            self.file_size_mb()
        )?;
        writeln!(f, "Objects: {}", self.total_objects)?;
        writeln!(f, "Text assets: {}", self.text_assets)?;
        write!(
            f,
            "Backup: {}",
            if self.backup_exists { "present" } else { "none" }
        )
    }
}
