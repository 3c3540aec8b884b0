//! Shared archive and patch builders.

use assets_patcher::container::{BlobArchive, ContainerAccess, ContainerError, ObjectId, ObjectInfo};
use assets_patcher::{PatchCollection, PatchDefinition, PatchRule};
use std::borrow::Cow;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Write a BlobArchive holding `entries` (type tag, name, payload) to
/// `<dir>/resources.assets`.
pub fn write_archive(dir: &Path, entries: &[(&str, &str, &[u8])]) -> PathBuf {
    let mut archive = BlobArchive::new();
    for (tag, name, payload) in entries {
        archive.push(*tag, *name, payload.to_vec());
    }
    let path = dir.join("resources.assets");
    fs::write(&path, archive.to_bytes().unwrap()).unwrap();
    path
}

/// Payload of the object called `name` in the archive at `path`.
pub fn payload(path: &Path, name: &str) -> Vec<u8> {
    BlobArchive::open(path)
        .unwrap()
        .find(name)
        .unwrap_or_else(|| panic!("no object named {name}"))
        .payload
        .clone()
}

pub fn definition(name: &str, locator: &str, rules: &[(&str, &str)]) -> PatchDefinition {
    PatchDefinition::new(
        name,
        locator,
        rules
            .iter()
            .map(|(target, replacement)| PatchRule::new(*target, *replacement))
            .collect(),
    )
}

pub fn patches(defs: Vec<PatchDefinition>) -> PatchCollection {
    PatchCollection::from(defs)
}

/// A BlobArchive whose serialization writes a few bytes and then fails,
/// standing in for a full disk.
pub struct FailingArchive(BlobArchive);

impl ContainerAccess for FailingArchive {
    fn from_bytes(bytes: &[u8]) -> Result<Self, ContainerError> {
        BlobArchive::from_bytes(bytes).map(FailingArchive)
    }

    fn objects(&self) -> Vec<ObjectInfo> {
        self.0.objects()
    }

    fn read_payload(&self, id: ObjectId) -> Result<Cow<'_, [u8]>, ContainerError> {
        self.0.read_payload(id)
    }

    fn write_payload(&mut self, id: ObjectId, payload: Vec<u8>) -> Result<(), ContainerError> {
        self.0.write_payload(id, payload)
    }

    fn write_to(&self, writer: &mut dyn Write) -> Result<(), ContainerError> {
        writer.write_all(b"ASSETBLB")?;
        Err(ContainerError::Io(io::Error::new(
            io::ErrorKind::Other,
            "no space left on device",
        )))
    }
}

/// A BlobArchive that refuses to take rewritten payloads for objects whose
/// name starts with `locked`.
pub struct LockedArchive(BlobArchive);

impl ContainerAccess for LockedArchive {
    fn from_bytes(bytes: &[u8]) -> Result<Self, ContainerError> {
        BlobArchive::from_bytes(bytes).map(LockedArchive)
    }

    fn objects(&self) -> Vec<ObjectInfo> {
        self.0.objects()
    }

    fn read_payload(&self, id: ObjectId) -> Result<Cow<'_, [u8]>, ContainerError> {
        self.0.read_payload(id)
    }

    fn write_payload(&mut self, id: ObjectId, payload: Vec<u8>) -> Result<(), ContainerError> {
        let locked = self
            .0
            .entries()
            .get(id.0)
            .is_some_and(|entry| entry.name.starts_with("locked"));
        if locked {
            return Err(ContainerError::FieldTooLong {
                field: "payload",
                len: payload.len(),
                max: 0,
            });
        }
        self.0.write_payload(id, payload)
    }

    fn write_to(&self, writer: &mut dyn Write) -> Result<(), ContainerError> {
        self.0.write_to(writer)
    }
}
