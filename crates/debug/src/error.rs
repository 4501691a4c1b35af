use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceMapError {
    #[error("source map cycle through '{path}' line {line}")]
    CyclicSourceMap { path: String, line: u32 },
    #[error("address {address:#08X} is already mapped to '{path}' line {line}")]
    DuplicateAddressMapping { address: u32, path: String, line: u32 },
    #[error("unknown source id {id}")]
    UnknownSource { id: u32 },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AddressParseError {
    #[error("empty address")]
    Empty,
    #[error("invalid address '{text}'")]
    Invalid { text: String },
    #[error("address '{text}' is out of range")]
    OutOfRange { text: String },
}
