//! Decoder for the cc65 toolchain's object (`.o`) and library (`.lib`)
//! containers.
//!
//! Objects are decoded eagerly into an immutable [`ObjectFile`]; library
//! members are decoded on first access through [`LibraryArchive::object`].

mod archive;
mod codec;
mod error;
mod expr;
mod io;
mod model;
mod validate;
mod varint;

use anyhow::Context;
use indexmap::IndexMap;

pub use self::archive::{
    ARCHIVE_MAGIC, ARCHIVE_VERSION, IndexEntry, LibraryArchive, decode_archive, encode_archive,
};
pub use self::codec::{OBJECT_MAGIC, OBJECT_VERSION, decode_object, decode_object_at, encode_object};
pub use self::error::{ContainerError, ContainerKind};
pub use self::expr::{BinaryOp, Expr, ExprResolver, UnaryOp};
pub use self::io::{Container, read_archive, read_container, read_object};
pub use self::model::{
    Export, ExportType, ExportValue, FileEntry, Fragment, FragmentKind, Import, LineInfo,
    ObjectFile, Segment,
};
pub use self::varint::{MAX_VARINT_BYTES, decode_varint, encode_varint};

use self::varint::{Reader, write_bytes, write_u8, write_u16, write_u32, write_var};

#[cfg(test)]
mod tests;
