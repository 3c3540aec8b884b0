use crate::atomic::atomic_write;
use crate::config::schema::PatchCollection;
use crate::validate::{validate, ValidationError};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Json {
        path: Option<PathBuf>,
        source: serde_json::Error,
    },
    Validation {
        path: Option<PathBuf>,
        source: ValidationError,
    },
    NotADirectory {
        path: PathBuf,
    },
}

impl ConfigError {
    fn with_path(self, path: &Path) -> Self {
        let path = path.to_path_buf();
        match self {
            ConfigError::Json { path: None, source } => ConfigError::Json {
                path: Some(path),
                source,
            },
            ConfigError::Validation { path: None, source } => ConfigError::Validation {
                path: Some(path),
                source,
            },
            other => other,
        }
    }

    /// The validation failure behind this error, if there is one.
    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            ConfigError::Validation { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "failed to access patch file {}: {}", path.display(), source)
            }
            ConfigError::Json { path, source } => match path {
                Some(path) => write!(f, "invalid JSON in {}: {}", path.display(), source),
                None => write!(f, "invalid JSON in patch data: {}", source),
            },
            ConfigError::Validation { path, source } => match path {
                Some(path) => write!(f, "invalid patches ({}): {}", path.display(), source),
                None => write!(f, "invalid patches: {}", source),
            },
            ConfigError::NotADirectory { path } => {
                write!(f, "path is not a directory: {}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Json { source, .. } => Some(source),
            ConfigError::Validation { source, .. } => Some(source),
            ConfigError::NotADirectory { .. } => None,
        }
    }
}

pub fn load_from_str(input: &str) -> Result<PatchCollection, ConfigError> {
    let value: serde_json::Value =
        serde_json::from_str(input).map_err(|source| ConfigError::Json { path: None, source })?;
    let patches = PatchCollection::from_value(&value)
        .map_err(|source| ConfigError::Validation { path: None, source })?;
    validate(&patches).map_err(|source| ConfigError::Validation { path: None, source })?;
    Ok(patches)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<PatchCollection, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_from_str(&contents).map_err(|error| error.with_path(path))
}

/// Load every `*.json` file directly inside `dir`, in filename order, and
/// concatenate their definitions.
pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<PatchCollection, ConfigError> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        if !dir.exists() {
            return Err(ConfigError::Io {
                path: dir.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "patches directory does not exist",
                ),
            });
        }
        return Err(ConfigError::NotADirectory {
            path: dir.to_path_buf(),
        });
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| ConfigError::Io {
            path: dir.to_path_buf(),
            source: e.into(),
        })?;
        if entry.file_type().is_file()
            && entry.path().extension().and_then(|s| s.to_str()) == Some("json")
        {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    let mut patches = PatchCollection::new();
    for file in files {
        patches.extend(load_from_path(&file)?);
    }
    Ok(patches)
}

/// Load from a directory or a single file, whichever `path` is.
pub fn load(path: impl AsRef<Path>) -> Result<PatchCollection, ConfigError> {
    let path = path.as_ref();
    if path.is_dir() {
        load_from_dir(path)
    } else {
        load_from_path(path)
    }
}

/// Write the collection as a pretty-printed JSON array.
pub fn save_to_path(path: impl AsRef<Path>, patches: &PatchCollection) -> Result<(), ConfigError> {
    let path = path.as_ref();
    validate(patches).map_err(|source| ConfigError::Validation {
        path: Some(path.to_path_buf()),
        source,
    })?;
    let mut json = serde_json::to_string_pretty(patches).map_err(|source| ConfigError::Json {
        path: Some(path.to_path_buf()),
        source,
    })?;
    json.push('\n');
    atomic_write(path, json.as_bytes()).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Write one file per definition into `dir` as `NN_<name>.json`, creating
/// the directory if needed. Returns the paths written, in collection order.
pub fn save_to_dir(
    dir: impl AsRef<Path>,
    patches: &PatchCollection,
) -> Result<Vec<PathBuf>, ConfigError> {
    let dir = dir.as_ref();
    validate(patches).map_err(|source| ConfigError::Validation {
        path: Some(dir.to_path_buf()),
        source,
    })?;
    fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut written = Vec::with_capacity(patches.len());
    for (i, patch) in patches.iter().enumerate() {
        let path = dir.join(format!("{:02}_{}.json", i + 1, sanitize_filename(patch.name())));
        let mut json = serde_json::to_string_pretty(patch).map_err(|source| ConfigError::Json {
            path: Some(path.clone()),
            source,
        })?;
        json.push('\n');
        atomic_write(&path, json.as_bytes()).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        written.push(path);
    }
    Ok(written)
}

/// Turn a patch name into a filename stem: characters that are invalid on
/// common filesystems become `_`, whitespace runs collapse to one `_`, and
/// leading/trailing underscores are trimmed.
pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_space = false;
    for c in name.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push('_');
            }
            in_space = true;
            continue;
        }
        in_space = false;
        match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => out.push('_'),
            _ => out.push(c),
        }
    }
    out.trim_matches('_').to_string()
}
