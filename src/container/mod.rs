//! Container access: the narrow capability the patch engine needs from an
//! asset archive.
//!
//! An archive is a sequence of typed, named objects with byte payloads. The
//! engine enumerates objects, reads and rewrites the payloads of
//! `TextAsset` objects, and asks the archive to serialize itself. How the
//! archive lays those objects out on disk belongs to the implementation;
//! [`BlobArchive`] is the format shipped with this crate.

pub mod blob;

pub use blob::{BlobArchive, BlobEntry};

use std::borrow::Cow;
use std::fs;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

/// Type tag of objects whose payload holds text.
pub const TEXT_ASSET: &str = "TextAsset";

/// Position of an object inside its container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub usize);

/// Read-only description of one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub id: ObjectId,
    pub type_tag: String,
    pub name: String,
}

impl ObjectInfo {
    pub fn is_text_asset(&self) -> bool {
        self.type_tag == TEXT_ASSET
    }
}

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("malformed container at byte {offset}: {reason}")]
    Malformed { offset: u64, reason: String },

    #[error("unsupported container version {0}")]
    UnsupportedVersion(u32),

    #[error("object {0:?} does not exist")]
    UnknownObject(ObjectId),

    #[error("{field} is too long to serialize ({len} bytes, max {max})")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Operations the engine performs on an opened archive.
pub trait ContainerAccess: Sized {
    /// Parse an archive from its serialized bytes.
    fn from_bytes(bytes: &[u8]) -> Result<Self, ContainerError>;

    /// Read and parse the archive stored at `path`.
    fn open(path: &Path) -> Result<Self, ContainerError> {
        let bytes = fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    /// All objects, in archive order.
    fn objects(&self) -> Vec<ObjectInfo>;

    fn read_payload(&self, id: ObjectId) -> Result<Cow<'_, [u8]>, ContainerError>;

    fn write_payload(&mut self, id: ObjectId, payload: Vec<u8>) -> Result<(), ContainerError>;

    /// Serialize the whole archive, including rewritten payloads.
    fn write_to(&self, writer: &mut dyn Write) -> Result<(), ContainerError>;
}
