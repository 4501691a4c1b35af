use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Object,
    Archive,
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object => f.write_str("object"),
            Self::Archive => f.write_str("archive"),
        }
    }
}

/// Failure while decoding a container. A partially decoded value is never
/// handed out alongside one of these.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContainerError {
    #[error("malformed varint at offset {offset:#X}")]
    MalformedVarint { offset: usize },
    #[error("unexpected end of data at offset {offset:#X} ({needed} more bytes needed)")]
    UnexpectedEof { offset: usize, needed: usize },
    #[error("unsupported {kind} container: {}", unsupported_detail(*.magic, *.version))]
    UnsupportedVersion {
        kind: ContainerKind,
        magic: u32,
        version: Option<u16>,
    },
    #[error("unknown fragment type byte {type_byte:#04X}")]
    UnknownFragmentKind { type_byte: u8 },
    #[error("unsupported expression op {op:#04X}")]
    UnsupportedExpressionOp { op: u8 },
    #[error("{table} index {index} is out of range ({len} entries)")]
    IndexOutOfRange {
        table: &'static str,
        index: u32,
        len: usize,
    },
    #[error("segment '{segment}' declares {declared} bytes but its fragments hold {actual}")]
    SegmentSizeMismatch {
        segment: String,
        declared: u32,
        actual: u64,
    },
    #[error("expression references unresolved {what} {index}")]
    UnresolvedExpressionRef { what: &'static str, index: u32 },
    #[error("expression operator '{op}' has a zero right operand")]
    ExpressionDivisionByZero { op: &'static str },
    #[error("archive has no member named '{name}'")]
    MissingMember { name: String },
    #[error("{what} does not fit the container's size limits")]
    TooLarge { what: &'static str },
}

fn unsupported_detail(magic: u32, version: Option<u16>) -> String {
    match version {
        Some(version) => format!("magic {magic:#010X}, version {version:#06X}"),
        None => format!("bad magic {magic:#010X}"),
    }
}
