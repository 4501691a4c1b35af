use std::sync::OnceLock;

use super::*;

pub const ARCHIVE_MAGIC: u32 = 0x7A55_616E;
pub const ARCHIVE_VERSION: u16 = 0x000D;

// magic + version + flags + index offset
const ARCHIVE_HEADER_LEN: usize = 4 + 2 + 2 + 4;

/// A decoded library. Member objects stay undecoded until first requested.
#[derive(Debug, Default)]
pub struct LibraryArchive {
    pub flags: u16,
    pub index_offset: u32,
    pub index: IndexMap<String, IndexEntry>,
    bytes: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct IndexEntry {
    pub flags: u16,
    pub time: u32,
    pub start: u32,
    pub size: u32,
    object: OnceLock<ObjectFile>,
}

impl IndexEntry {
    /// The member object, if it has already been decoded.
    pub fn decoded(&self) -> Option<&ObjectFile> {
        self.object.get()
    }
}

pub fn decode_archive(bytes: &[u8]) -> Result<LibraryArchive, ContainerError> {
    let mut rd = Reader::new(bytes, 0);
    let magic = rd.read_u32()?;
    if magic != ARCHIVE_MAGIC {
        return Err(ContainerError::UnsupportedVersion {
            kind: ContainerKind::Archive,
            magic,
            version: None,
        });
    }
    let version = rd.read_u16()?;
    if version != ARCHIVE_VERSION {
        return Err(ContainerError::UnsupportedVersion {
            kind: ContainerKind::Archive,
            magic,
            version: Some(version),
        });
    }
    let flags = rd.read_u16()?;
    let index_offset = rd.read_u32()?;

    let start = index_offset as usize;
    if start > bytes.len() {
        return Err(ContainerError::UnexpectedEof {
            offset: bytes.len(),
            needed: start - bytes.len(),
        });
    }
    let mut rd = Reader::new(&bytes[start..], start);
    let count = rd.read_var()? as usize;
    let mut index = IndexMap::with_capacity(count.min(rd.remaining()));
    for _ in 0..count {
        let name = rd.read_string()?;
        let entry = IndexEntry {
            flags: rd.read_u16()?,
            time: rd.read_u32()?,
            start: rd.read_u32()?,
            size: rd.read_u32()?,
            object: OnceLock::new(),
        };
        index.insert(name, entry);
    }

    tracing::debug!(members = index.len(), "decoded archive index");
    Ok(LibraryArchive {
        flags,
        index_offset,
        index,
        bytes: bytes.to_vec(),
    })
}

impl LibraryArchive {
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn member_names(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(String::as_str)
    }

    /// Decodes the named member on first use; later calls return the cached
    /// object. `Ok(None)` when no member has that name.
    pub fn object(&self, name: &str) -> Result<Option<&ObjectFile>, ContainerError> {
        let Some(entry) = self.index.get(name) else {
            return Ok(None);
        };
        if let Some(object) = entry.object.get() {
            return Ok(Some(object));
        }

        let object = self.decode_member(name, entry)?;
        let _ = entry.object.set(object);
        Ok(entry.object.get())
    }

    /// Like [`object`](Self::object), but a missing member is an error.
    pub fn require(&self, name: &str) -> Result<&ObjectFile, ContainerError> {
        self.object(name)?.ok_or_else(|| ContainerError::MissingMember {
            name: name.to_string(),
        })
    }

    pub fn decode_all(&self) -> Result<Vec<&ObjectFile>, ContainerError> {
        self.index.keys().map(|name| self.require(name)).collect()
    }

    fn decode_member(&self, name: &str, entry: &IndexEntry) -> Result<ObjectFile, ContainerError> {
        let start = entry.start as usize;
        let end = start.saturating_add(entry.size as usize);
        if end > self.bytes.len() {
            return Err(ContainerError::UnexpectedEof {
                offset: self.bytes.len(),
                needed: end - self.bytes.len(),
            });
        }
        tracing::trace!(member = name, start, size = entry.size, "decoding archive member");
        let mut object = decode_object_at(&self.bytes[start..end], start)?;
        object.name = name.to_string();
        Ok(object)
    }
}

/// Builds a library from already encoded member objects, in the given order.
pub fn encode_archive(members: &[(&str, &[u8])]) -> Result<Vec<u8>, ContainerError> {
    let too_large = || ContainerError::TooLarge { what: "archive" };

    let mut out = Vec::new();
    write_u32(&mut out, ARCHIVE_MAGIC);
    write_u16(&mut out, ARCHIVE_VERSION);
    write_u16(&mut out, 0);
    write_u32(&mut out, 0);

    let mut placed = Vec::with_capacity(members.len());
    for (name, bytes) in members {
        let start = u32::try_from(out.len()).map_err(|_| too_large())?;
        let size = u32::try_from(bytes.len()).map_err(|_| too_large())?;
        out.extend_from_slice(bytes);
        placed.push((*name, start, size));
    }

    let index_offset = u32::try_from(out.len()).map_err(|_| too_large())?;
    let count = u32::try_from(placed.len()).map_err(|_| too_large())?;
    write_var(&mut out, count);
    for (name, start, size) in placed {
        write_bytes(&mut out, name.as_bytes())?;
        write_u16(&mut out, 0);
        write_u32(&mut out, 0);
        write_u32(&mut out, start);
        write_u32(&mut out, size);
    }

    out[ARCHIVE_HEADER_LEN - 4..ARCHIVE_HEADER_LEN].copy_from_slice(&index_offset.to_le_bytes());
    Ok(out)
}
