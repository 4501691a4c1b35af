use std::path::Path;

use super::*;

/// Either kind of cc65 container, picked by magic number.
#[derive(Debug)]
pub enum Container {
    Object(ObjectFile),
    Archive(LibraryArchive),
}

pub fn read_object(path: &Path) -> anyhow::Result<ObjectFile> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read '{}'", path.display()))?;
    let mut object =
        decode_object(&bytes).with_context(|| format!("failed to decode '{}'", path.display()))?;
    object.name = path.display().to_string();
    Ok(object)
}

pub fn read_archive(path: &Path) -> anyhow::Result<LibraryArchive> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read '{}'", path.display()))?;
    decode_archive(&bytes).with_context(|| format!("failed to decode '{}'", path.display()))
}

pub fn read_container(path: &Path) -> anyhow::Result<Container> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read '{}'", path.display()))?;
    let magic = bytes
        .get(..4)
        .map(|head| u32::from_le_bytes([head[0], head[1], head[2], head[3]]));

    let container = match magic {
        Some(ARCHIVE_MAGIC) => Container::Archive(
            decode_archive(&bytes)
                .with_context(|| format!("failed to decode '{}'", path.display()))?,
        ),
        _ => {
            let mut object = decode_object(&bytes)
                .with_context(|| format!("failed to decode '{}'", path.display()))?;
            object.name = path.display().to_string();
            Container::Object(object)
        }
    };
    Ok(container)
}
