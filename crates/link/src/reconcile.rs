use super::*;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("output file '{file}' is not written by the linker config")]
    UnknownOutputFile { file: String },
    #[error("segment '{segment}' is not defined by any input object or library")]
    UnresolvedSegment { segment: String },
    #[error(
        "byte {expected:#04X} of segment '{segment}' (fragment {fragment}) does not match {} at file offset {offset:#X}",
        describe_actual(*.actual)
    )]
    LinkVerificationMismatch {
        offset: u32,
        segment: String,
        fragment: usize,
        expected: u8,
        actual: Option<u8>,
    },
    #[error("segment '{segment}' runs past the end of the address space")]
    AddressOverflow { segment: String },
    #[error(transparent)]
    Container(#[from] ContainerError),
    #[error(transparent)]
    SourceMap(#[from] SourceMapError),
}

fn describe_actual(actual: Option<u8>) -> String {
    match actual {
        Some(byte) => format!("{byte:#04X}"),
        None => "the end of the file".to_string(),
    }
}

/// One output byte traced back to a source line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributedByte {
    pub address: u32,
    pub offset: u32,
    pub source: SourceId,
    /// 0-based.
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceAttributedBinary {
    pub file_name: String,
    /// Address of the first byte after the header.
    pub base: u32,
    /// Graph node of the output file. Its lines are byte offsets from `base`.
    pub binary: SourceId,
    pub bytes: Vec<AttributedByte>,
    /// Cursor after each area, in area order.
    pub area_ends: IndexMap<String, u32>,
}

/// Walks every area written to `file_name`, checks each literal byte the
/// objects define against `file_bytes`, and links it to its source line in
/// `graph`.
///
/// Expression and fill fragments are skipped over unchecked: their values
/// depend on link-time fixups. `graph` is only touched once every area has
/// been checked, so a failed reconcile leaves it as it was.
pub fn reconcile(
    config: &LinkerConfig,
    file_name: &str,
    objects: &[ObjectFile],
    archives: &[LibraryArchive],
    file_bytes: &[u8],
    graph: &mut SourceGraph,
    options: &ReconcileOptions,
) -> Result<SourceAttributedBinary, ReconcileError> {
    let file = config
        .files
        .get(file_name)
        .ok_or_else(|| ReconcileError::UnknownOutputFile {
            file: file_name.to_string(),
        })?;

    let base = file.start;
    let mut walk = Walk {
        base,
        file_bytes,
        options,
        paths: IndexSet::new(),
        checked: Vec::new(),
    };
    let mut area_ends = IndexMap::new();

    for area in config.areas_of(file) {
        tracing::debug!(area = %area.name, start = area.start, "reconciling memory area");
        let mut cursor = area.start;

        for segment_name in &area.segments {
            let Some(segment) = config.segments.get(segment_name) else {
                continue;
            };
            if let Some(start) = segment.start {
                cursor = start;
            }

            let sections = find_sections(segment_name, objects, archives, options)?;
            if sections.is_empty() {
                if segment.optional {
                    tracing::warn!(segment = %segment_name, "skipping optional segment with no definition");
                    continue;
                }
                return Err(ReconcileError::UnresolvedSegment {
                    segment: segment_name.clone(),
                });
            }

            if let Some(align) = segment.align {
                cursor = align_up(cursor, align, segment_name)?;
            }
            let header = options.is_header_segment(segment_name);
            for (object, section) in sections {
                cursor = align_up(cursor, section.alignment, segment_name)?;
                tracing::debug!(
                    segment = %segment_name,
                    kind = segment.kind.as_str(),
                    object = %object.name,
                    start = cursor,
                    "placing section"
                );
                cursor = walk.section(segment_name, object, section, cursor, header)?;
            }
        }

        if area.size != 0 {
            cursor = area.start.checked_add(area.size).ok_or_else(|| {
                ReconcileError::AddressOverflow {
                    segment: area.name.clone(),
                }
            })?;
        }
        area_ends.insert(area.name.clone(), cursor);
    }

    let binary = graph.intern(file_name);
    graph.bind_addresses(binary, AddressBinding { base, loaded: true })?;
    let sources: Vec<SourceId> = walk.paths.iter().map(|path| graph.intern(path)).collect();

    let mut bytes = Vec::with_capacity(walk.checked.len());
    for checked in walk.checked {
        let origin = LineRef::new(sources[checked.path], checked.line);
        graph.link_lines(LineRef::new(binary, checked.address - base), origin)?;
        bytes.push(AttributedByte {
            address: checked.address,
            offset: checked.offset,
            source: origin.source,
            line: origin.line,
        });
    }
    tracing::debug!(file = file_name, bytes = bytes.len(), "linked output bytes to sources");

    Ok(SourceAttributedBinary {
        file_name: file_name.to_string(),
        base,
        binary,
        bytes,
        area_ends,
    })
}

/// Sections of `segment` from the supplied objects, in object order. When no
/// object defines it, the owning library module is tried instead.
fn find_sections<'o>(
    segment: &str,
    objects: &'o [ObjectFile],
    archives: &'o [LibraryArchive],
    options: &ReconcileOptions,
) -> Result<Vec<(&'o ObjectFile, &'o Segment)>, ContainerError> {
    let mut sections = Vec::new();
    for object in objects {
        if let Some((_, section)) = object.find_segment(segment)? {
            sections.push((object, section));
        }
    }
    if !sections.is_empty() {
        return Ok(sections);
    }

    let module = options.owner_module(segment);
    for archive in archives {
        if let Some(object) = archive.object(&module)?
            && let Some((_, section)) = object.find_segment(segment)?
        {
            tracing::debug!(segment, module = %module, "segment taken from library");
            sections.push((object, section));
            break;
        }
    }
    Ok(sections)
}

fn align_up(cursor: u32, align: u32, segment: &str) -> Result<u32, ReconcileError> {
    if align <= 1 {
        return Ok(cursor);
    }
    cursor
        .checked_next_multiple_of(align)
        .ok_or_else(|| ReconcileError::AddressOverflow {
            segment: segment.to_string(),
        })
}

/// A verified byte whose source line is known. `path` indexes `Walk::paths`.
struct CheckedByte {
    address: u32,
    offset: u32,
    path: usize,
    line: u32,
}

struct Walk<'a> {
    base: u32,
    file_bytes: &'a [u8],
    options: &'a ReconcileOptions,
    paths: IndexSet<String>,
    checked: Vec<CheckedByte>,
}

impl Walk<'_> {
    /// Checks one object's section starting at `cursor` and returns the
    /// cursor past its end.
    fn section(
        &mut self,
        segment: &str,
        object: &ObjectFile,
        section: &Segment,
        mut cursor: u32,
        header: bool,
    ) -> Result<u32, ReconcileError> {
        for (index, fragment) in section.fragments.iter().enumerate() {
            tracing::trace!(segment, fragment = index, address = cursor, len = fragment.len(), "fragment");
            if !header && let FragmentKind::Literal(data) = &fragment.kind {
                let origin = match fragment.line_infos.last() {
                    Some(line_info) => {
                        let (path, line) = object.source_location(*line_info)?;
                        let (path, _) = self.paths.insert_full(self.options.map_path(path));
                        Some((path, line.saturating_sub(1)))
                    }
                    None => None,
                };

                for (position, expected) in data.iter().enumerate() {
                    let address = cursor.checked_add(position as u32).ok_or_else(|| {
                        ReconcileError::AddressOverflow {
                            segment: segment.to_string(),
                        }
                    })?;
                    let offset = self.check_byte(address, *expected, segment, index)?;
                    if let Some((path, line)) = origin {
                        self.checked.push(CheckedByte {
                            address,
                            offset,
                            path,
                            line,
                        });
                    }
                }
            }

            cursor = cursor.checked_add(fragment.len()).ok_or_else(|| {
                ReconcileError::AddressOverflow {
                    segment: segment.to_string(),
                }
            })?;
        }
        Ok(cursor)
    }

    /// Compares one literal byte and returns its file offset.
    fn check_byte(
        &self,
        address: u32,
        expected: u8,
        segment: &str,
        fragment: usize,
    ) -> Result<u32, ReconcileError> {
        let offset = address
            .checked_sub(self.base)
            .and_then(|relative| relative.checked_add(self.options.header_len));
        let actual = offset.and_then(|offset| self.file_bytes.get(offset as usize).copied());
        match (offset, actual) {
            (Some(offset), Some(actual)) if actual == expected => Ok(offset),
            (offset, actual) => Err(ReconcileError::LinkVerificationMismatch {
                offset: offset.unwrap_or_default(),
                segment: segment.to_string(),
                fragment,
                expected,
                actual,
            }),
        }
    }
}
