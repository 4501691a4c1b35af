use super::*;
use crate::validate::validate_segment;
use crate::varint::write_index_list;

pub const OBJECT_MAGIC: u32 = 0x616E_7A55;
pub const OBJECT_VERSION: u16 = 0x0011;

const FRAG_BYTE_MASK: u8 = 0x07;
const FRAG_TYPE_MASK: u8 = 0x38;
const FRAG_LITERAL: u8 = 0x00;
const FRAG_EXPR: u8 = 0x08;
const FRAG_SEXPR: u8 = 0x10;
const FRAG_FILL: u8 = 0x20;

// magic + version + flags + 11 {offset, size} pairs
const HEADER_LEN: usize = 4 + 2 + 2 + 11 * 8;

#[derive(Debug, Clone, Copy, Default)]
struct TableRef {
    offset: u32,
    size: u32,
}

#[derive(Debug, Clone, Copy, Default)]
struct ObjectHeader {
    flags: u16,
    options: TableRef,
    files: TableRef,
    segments: TableRef,
    imports: TableRef,
    exports: TableRef,
    debug_symbols: TableRef,
    line_infos: TableRef,
    strings: TableRef,
    assertions: TableRef,
    scopes: TableRef,
    spans: TableRef,
}

impl ObjectHeader {
    fn read(rd: &mut Reader<'_>) -> Result<Self, ContainerError> {
        let magic = rd.read_u32()?;
        if magic != OBJECT_MAGIC {
            return Err(ContainerError::UnsupportedVersion {
                kind: ContainerKind::Object,
                magic,
                version: None,
            });
        }
        let version = rd.read_u16()?;
        if version != OBJECT_VERSION {
            return Err(ContainerError::UnsupportedVersion {
                kind: ContainerKind::Object,
                magic,
                version: Some(version),
            });
        }

        let flags = rd.read_u16()?;
        let mut table = || -> Result<TableRef, ContainerError> {
            Ok(TableRef {
                offset: rd.read_u32()?,
                size: rd.read_u32()?,
            })
        };
        Ok(Self {
            flags,
            options: table()?,
            files: table()?,
            segments: table()?,
            imports: table()?,
            exports: table()?,
            debug_symbols: table()?,
            line_infos: table()?,
            strings: table()?,
            assertions: table()?,
            scopes: table()?,
            spans: table()?,
        })
    }

    fn write(&self, out: &mut Vec<u8>) {
        write_u32(out, OBJECT_MAGIC);
        write_u16(out, OBJECT_VERSION);
        write_u16(out, self.flags);
        for table in [
            self.options,
            self.files,
            self.segments,
            self.imports,
            self.exports,
            self.debug_symbols,
            self.line_infos,
            self.strings,
            self.assertions,
            self.scopes,
            self.spans,
        ] {
            write_u32(out, table.offset);
            write_u32(out, table.size);
        }
    }
}

/// Decodes a standalone object file.
pub fn decode_object(bytes: &[u8]) -> Result<ObjectFile, ContainerError> {
    decode_object_at(bytes, 0)
}

/// Decodes an object whose first byte sits at absolute offset `origin` of its
/// container (an archive member, for instance). Table offsets are relative to
/// `bytes[0]`.
pub fn decode_object_at(bytes: &[u8], origin: usize) -> Result<ObjectFile, ContainerError> {
    let mut rd = Reader::new(bytes, origin);
    let header = ObjectHeader::read(&mut rd)?;

    let strings = read_table(bytes, origin, header.strings, |rd| rd.read_string())?;
    let files = read_table(bytes, origin, header.files, |rd| {
        Ok(FileEntry {
            name: rd.read_var()?,
            mtime: rd.read_u32()?,
            size: rd.read_var()?,
        })
    })?;
    let line_infos = read_table(bytes, origin, header.line_infos, |rd| {
        Ok(LineInfo {
            line: rd.read_var()?,
            column: rd.read_var()?,
            file: rd.read_var()?,
            kind: rd.read_var()?,
            spans: rd.read_index_list()?,
        })
    })?;
    let imports = read_table(bytes, origin, header.imports, |rd| {
        Ok(Import {
            addr_size: rd.read_u8()?,
            name: rd.read_var()?,
            def_lines: rd.read_index_list()?,
            ref_lines: rd.read_index_list()?,
        })
    })?;
    let segments = read_table(bytes, origin, header.segments, read_segment)?;
    let exports = read_table(bytes, origin, header.exports, read_export)?;

    let object = ObjectFile {
        name: String::new(),
        offset: origin as u32,
        version: OBJECT_VERSION,
        flags: header.flags,
        strings,
        files,
        line_infos,
        imports,
        segments,
        exports,
    };
    for segment in &object.segments {
        validate_segment(&object, segment)?;
    }

    tracing::trace!(
        offset = origin,
        segments = object.segments.len(),
        exports = object.exports.len(),
        "decoded object"
    );
    Ok(object)
}

fn read_table<'a, T>(
    bytes: &'a [u8],
    origin: usize,
    table: TableRef,
    mut read_record: impl FnMut(&mut Reader<'a>) -> Result<T, ContainerError>,
) -> Result<Vec<T>, ContainerError> {
    if table.size == 0 {
        return Ok(Vec::new());
    }

    let start = table.offset as usize;
    let end = start.saturating_add(table.size as usize);
    if end > bytes.len() {
        return Err(ContainerError::UnexpectedEof {
            offset: origin + bytes.len(),
            needed: end - bytes.len(),
        });
    }

    let mut rd = Reader::new(&bytes[start..end], origin + start);
    let count = rd.read_var()? as usize;
    let mut records = Vec::with_capacity(count.min(rd.remaining()));
    for _ in 0..count {
        records.push(read_record(&mut rd)?);
    }
    Ok(records)
}

fn read_segment(rd: &mut Reader<'_>) -> Result<Segment, ContainerError> {
    let _data_size = rd.read_u32()?;
    let name = rd.read_var()?;
    let flags = rd.read_var()?;
    let size = rd.read_var()?;
    let alignment = rd.read_var()?;
    let kind = rd.read_u8()?;
    let fragment_count = rd.read_var()? as usize;

    let mut fragments = Vec::with_capacity(fragment_count.min(rd.remaining()));
    for _ in 0..fragment_count {
        fragments.push(read_fragment(rd)?);
    }

    Ok(Segment {
        name,
        flags,
        size,
        alignment,
        kind,
        fragments,
    })
}

fn read_fragment(rd: &mut Reader<'_>) -> Result<Fragment, ContainerError> {
    let type_byte = rd.read_u8()?;
    let width = type_byte & FRAG_BYTE_MASK;

    let kind = match type_byte & FRAG_TYPE_MASK {
        FRAG_LITERAL => FragmentKind::Literal(rd.read_bytes()?),
        tag @ (FRAG_EXPR | FRAG_SEXPR) => {
            if !(1..=4).contains(&width) {
                return Err(ContainerError::UnknownFragmentKind { type_byte });
            }
            FragmentKind::Expression {
                width,
                signed: tag == FRAG_SEXPR,
                expr: Expr::decode(rd)?,
            }
        }
        FRAG_FILL => FragmentKind::Fill(rd.read_var()?),
        _ => return Err(ContainerError::UnknownFragmentKind { type_byte }),
    };

    Ok(Fragment {
        kind,
        line_infos: rd.read_index_list()?,
    })
}

fn read_export(rd: &mut Reader<'_>) -> Result<Export, ContainerError> {
    let kind = ExportType(rd.read_var()?);
    let addr_size = rd.read_u8()?;
    let condes = rd.read_exact(kind.condes_count())?.to_vec();
    let name = rd.read_var()?;
    let value = if kind.has_expression() {
        ExportValue::Expression(Expr::decode(rd)?)
    } else {
        ExportValue::Literal(rd.read_u32()?)
    };
    let size = if kind.has_size() {
        Some(rd.read_var()?)
    } else {
        None
    };

    Ok(Export {
        kind,
        addr_size,
        condes,
        name,
        value,
        size,
        def_lines: rd.read_index_list()?,
        ref_lines: rd.read_index_list()?,
    })
}

/// Serialises `object` in the layout [`decode_object`] reads. Tables the
/// decoder skips are written empty.
pub fn encode_object(object: &ObjectFile) -> Result<Vec<u8>, ContainerError> {
    let mut header = ObjectHeader {
        flags: object.flags,
        ..ObjectHeader::default()
    };
    let mut body = Vec::new();
    let place = |body: &mut Vec<u8>, table: Vec<u8>| -> Result<TableRef, ContainerError> {
        let offset = HEADER_LEN + body.len();
        let table_ref = TableRef {
            offset: u32::try_from(offset).map_err(|_| ContainerError::TooLarge {
                what: "object",
            })?,
            size: u32::try_from(table.len()).map_err(|_| ContainerError::TooLarge {
                what: "object table",
            })?,
        };
        body.extend_from_slice(&table);
        Ok(table_ref)
    };

    header.options = place(&mut body, empty_table())?;
    header.files = place(
        &mut body,
        encode_table(&object.files, |out, file| {
            write_var(out, file.name);
            write_u32(out, file.mtime);
            write_var(out, file.size);
            Ok(())
        })?,
    )?;
    header.segments = place(&mut body, encode_table(&object.segments, encode_segment)?)?;
    header.imports = place(
        &mut body,
        encode_table(&object.imports, |out, import| {
            write_u8(out, import.addr_size);
            write_var(out, import.name);
            write_index_list(out, &import.def_lines)?;
            write_index_list(out, &import.ref_lines)
        })?,
    )?;
    header.exports = place(&mut body, encode_table(&object.exports, encode_export)?)?;
    header.debug_symbols = place(&mut body, empty_table())?;
    header.line_infos = place(
        &mut body,
        encode_table(&object.line_infos, |out, info| {
            write_var(out, info.line);
            write_var(out, info.column);
            write_var(out, info.file);
            write_var(out, info.kind);
            write_index_list(out, &info.spans)
        })?,
    )?;
    header.strings = place(
        &mut body,
        encode_table(&object.strings, |out, string| {
            write_bytes(out, string.as_bytes())
        })?,
    )?;
    header.assertions = place(&mut body, empty_table())?;
    header.scopes = place(&mut body, empty_table())?;
    header.spans = place(&mut body, empty_table())?;

    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    header.write(&mut out);
    out.extend_from_slice(&body);
    Ok(out)
}

fn empty_table() -> Vec<u8> {
    vec![0]
}

fn encode_table<T>(
    records: &[T],
    mut write_record: impl FnMut(&mut Vec<u8>, &T) -> Result<(), ContainerError>,
) -> Result<Vec<u8>, ContainerError> {
    let mut out = Vec::new();
    let count = u32::try_from(records.len()).map_err(|_| ContainerError::TooLarge {
        what: "object table",
    })?;
    write_var(&mut out, count);
    for record in records {
        write_record(&mut out, record)?;
    }
    Ok(out)
}

fn encode_segment(out: &mut Vec<u8>, segment: &Segment) -> Result<(), ContainerError> {
    let mut data = Vec::new();
    write_var(&mut data, segment.name);
    write_var(&mut data, segment.flags);
    write_var(&mut data, segment.size);
    write_var(&mut data, segment.alignment);
    write_u8(&mut data, segment.kind);
    let count = u32::try_from(segment.fragments.len()).map_err(|_| ContainerError::TooLarge {
        what: "fragment list",
    })?;
    write_var(&mut data, count);

    for fragment in &segment.fragments {
        match &fragment.kind {
            FragmentKind::Literal(bytes) => {
                write_u8(&mut data, FRAG_LITERAL);
                write_bytes(&mut data, bytes)?;
            }
            FragmentKind::Expression {
                width,
                signed,
                expr,
            } => {
                let tag = if *signed { FRAG_SEXPR } else { FRAG_EXPR };
                write_u8(&mut data, tag | (width & FRAG_BYTE_MASK));
                expr.encode(&mut data);
            }
            FragmentKind::Fill(count) => {
                write_u8(&mut data, FRAG_FILL);
                write_var(&mut data, *count);
            }
        }
        write_index_list(&mut data, &fragment.line_infos)?;
    }

    let data_size = u32::try_from(data.len()).map_err(|_| ContainerError::TooLarge {
        what: "segment",
    })?;
    write_u32(out, data_size);
    out.extend_from_slice(&data);
    Ok(())
}

fn encode_export(out: &mut Vec<u8>, export: &Export) -> Result<(), ContainerError> {
    write_var(out, export.kind.0);
    write_u8(out, export.addr_size);
    out.extend_from_slice(&export.condes);
    write_var(out, export.name);
    match &export.value {
        ExportValue::Literal(value) => write_u32(out, *value),
        ExportValue::Expression(expr) => expr.encode(out),
    }
    if let Some(size) = export.size {
        write_var(out, size);
    }
    write_index_list(out, &export.def_lines)?;
    write_index_list(out, &export.ref_lines)
}
