//! `ASSETBLB` archive: a flat store of typed, named byte blobs.
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! magic    8 bytes   "ASSETBLB"
//! version  u32       1
//! count    u32
//! entry*   type_tag  u16 length + UTF-8
//!          name      u16 length + UTF-8
//!          payload   u32 length + bytes
//! ```
//!
//! Nothing may follow the last entry.

use super::{ContainerAccess, ContainerError, ObjectId, ObjectInfo, TEXT_ASSET};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::borrow::Cow;
use std::io::{self, Cursor, Read, Write};

pub const MAGIC: &[u8; 8] = b"ASSETBLB";
pub const VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobEntry {
    pub type_tag: String,
    pub name: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobArchive {
    entries: Vec<BlobEntry>,
}

impl BlobArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an object and return its id.
    pub fn push(
        &mut self,
        type_tag: impl Into<String>,
        name: impl Into<String>,
        payload: impl Into<Vec<u8>>,
    ) -> ObjectId {
        self.entries.push(BlobEntry {
            type_tag: type_tag.into(),
            name: name.into(),
            payload: payload.into(),
        });
        ObjectId(self.entries.len() - 1)
    }

    pub fn push_text_asset(&mut self, name: impl Into<String>, text: impl Into<Vec<u8>>) -> ObjectId {
        self.push(TEXT_ASSET, name, text)
    }

    pub fn entries(&self) -> &[BlobEntry] {
        &self.entries
    }

    /// First entry called `name`.
    pub fn find(&self, name: &str) -> Option<&BlobEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ContainerError> {
        let mut out = Vec::new();
        self.write_to(&mut out)?;
        Ok(out)
    }

    fn entry(&self, id: ObjectId) -> Result<&BlobEntry, ContainerError> {
        self.entries.get(id.0).ok_or(ContainerError::UnknownObject(id))
    }
}

impl ContainerAccess for BlobArchive {
    fn from_bytes(bytes: &[u8]) -> Result<Self, ContainerError> {
        let mut cursor = Cursor::new(bytes);

        let mut magic = [0u8; 8];
        read_exact(&mut cursor, &mut magic, "magic")?;
        if &magic != MAGIC {
            return Err(ContainerError::Malformed {
                offset: 0,
                reason: "bad magic, not an ASSETBLB archive".to_string(),
            });
        }

        let version = read_u32(&mut cursor, "version")?;
        if version != VERSION {
            return Err(ContainerError::UnsupportedVersion(version));
        }

        let count = read_u32(&mut cursor, "object count")?;
        // Every entry needs at least 8 bytes of length prefixes; reject
        // counts the input cannot possibly hold before allocating.
        let remaining = bytes.len() as u64 - cursor.position();
        if u64::from(count) * 8 > remaining {
            return Err(ContainerError::Malformed {
                offset: cursor.position(),
                reason: format!("object count {count} exceeds remaining {remaining} bytes"),
            });
        }

        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let tag_len = read_u16(&mut cursor, "type tag length")?;
            let type_tag = read_string(&mut cursor, usize::from(tag_len), "type tag")?;
            let name_len = read_u16(&mut cursor, "name length")?;
            let name = read_string(&mut cursor, usize::from(name_len), "name")?;
            let payload_len = read_u32(&mut cursor, "payload length")?;
            let remaining = bytes.len() as u64 - cursor.position();
            if u64::from(payload_len) > remaining {
                return Err(ContainerError::Malformed {
                    offset: cursor.position(),
                    reason: format!(
                        "payload length {payload_len} exceeds remaining {remaining} bytes"
                    ),
                });
            }
            let mut payload = vec![0u8; payload_len as usize];
            read_exact(&mut cursor, &mut payload, "payload")?;
            entries.push(BlobEntry {
                type_tag,
                name,
                payload,
            });
        }

        if cursor.position() != bytes.len() as u64 {
            return Err(ContainerError::Malformed {
                offset: cursor.position(),
                reason: "trailing bytes after last object".to_string(),
            });
        }

        Ok(Self { entries })
    }

    fn objects(&self) -> Vec<ObjectInfo> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, entry)| ObjectInfo {
                id: ObjectId(i),
                type_tag: entry.type_tag.clone(),
                name: entry.name.clone(),
            })
            .collect()
    }

    fn read_payload(&self, id: ObjectId) -> Result<Cow<'_, [u8]>, ContainerError> {
        Ok(Cow::Borrowed(&self.entry(id)?.payload))
    }

    fn write_payload(&mut self, id: ObjectId, payload: Vec<u8>) -> Result<(), ContainerError> {
        let entry = self
            .entries
            .get_mut(id.0)
            .ok_or(ContainerError::UnknownObject(id))?;
        entry.payload = payload;
        Ok(())
    }

    fn write_to(&self, writer: &mut dyn Write) -> Result<(), ContainerError> {
        let count = u32::try_from(self.entries.len()).map_err(|_| ContainerError::FieldTooLong {
            field: "object count",
            len: self.entries.len(),
            max: u32::MAX as usize,
        })?;

        writer.write_all(MAGIC)?;
        writer.write_u32::<LittleEndian>(VERSION)?;
        writer.write_u32::<LittleEndian>(count)?;

        for entry in &self.entries {
            write_u16_prefixed(writer, entry.type_tag.as_bytes(), "type tag")?;
            write_u16_prefixed(writer, entry.name.as_bytes(), "name")?;
            let len = u32::try_from(entry.payload.len()).map_err(|_| ContainerError::FieldTooLong {
                field: "payload",
                len: entry.payload.len(),
                max: u32::MAX as usize,
            })?;
            writer.write_u32::<LittleEndian>(len)?;
            writer.write_all(&entry.payload)?;
        }

        writer.flush()?;
        Ok(())
    }
}

fn write_u16_prefixed(
    writer: &mut dyn Write,
    bytes: &[u8],
    field: &'static str,
) -> Result<(), ContainerError> {
    let len = u16::try_from(bytes.len()).map_err(|_| ContainerError::FieldTooLong {
        field,
        len: bytes.len(),
        max: u16::MAX as usize,
    })?;
    writer.write_u16::<LittleEndian>(len)?;
    writer.write_all(bytes)?;
    Ok(())
}

fn truncated(cursor: &Cursor<&[u8]>, what: &str, err: io::Error) -> ContainerError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        ContainerError::Malformed {
            offset: cursor.position(),
            reason: format!("unexpected end of data reading {what}"),
        }
    } else {
        ContainerError::Io(err)
    }
}

fn read_exact(cursor: &mut Cursor<&[u8]>, buf: &mut [u8], what: &str) -> Result<(), ContainerError> {
    cursor.read_exact(buf).map_err(|e| truncated(cursor, what, e))
}

fn read_u16(cursor: &mut Cursor<&[u8]>, what: &str) -> Result<u16, ContainerError> {
    cursor
        .read_u16::<LittleEndian>()
        .map_err(|e| truncated(cursor, what, e))
}

fn read_u32(cursor: &mut Cursor<&[u8]>, what: &str) -> Result<u32, ContainerError> {
    cursor
        .read_u32::<LittleEndian>()
        .map_err(|e| truncated(cursor, what, e))
}

fn read_string(cursor: &mut Cursor<&[u8]>, len: usize, what: &str) -> Result<String, ContainerError> {
    let offset = cursor.position();
    let mut buf = vec![0u8; len];
    read_exact(cursor, &mut buf, what)?;
    String::from_utf8(buf).map_err(|_| ContainerError::Malformed {
        offset,
        reason: format!("{what} is not valid UTF-8"),
    })
}
