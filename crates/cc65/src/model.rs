use super::*;

/// One decoded object module. Identity is `(name, offset)`: members of an
/// archive keep the archive's byte offset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectFile {
    pub name: String,
    pub offset: u32,
    pub version: u16,
    pub flags: u16,
    pub strings: Vec<String>,
    pub files: Vec<FileEntry>,
    pub line_infos: Vec<LineInfo>,
    pub imports: Vec<Import>,
    pub segments: Vec<Segment>,
    pub exports: Vec<Export>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileEntry {
    pub name: u32,
    pub mtime: u32,
    pub size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineInfo {
    /// 1-based, as written by the assembler.
    pub line: u32,
    pub column: u32,
    pub file: u32,
    pub kind: u32,
    pub spans: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub addr_size: u8,
    pub name: u32,
    pub def_lines: Vec<u32>,
    pub ref_lines: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub name: u32,
    pub flags: u32,
    pub size: u32,
    pub alignment: u32,
    pub kind: u8,
    pub fragments: Vec<Fragment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub kind: FragmentKind,
    pub line_infos: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentKind {
    Literal(Vec<u8>),
    Expression { width: u8, signed: bool, expr: Expr },
    Fill(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    pub kind: ExportType,
    pub addr_size: u8,
    pub condes: Vec<u8>,
    pub name: u32,
    pub value: ExportValue,
    pub size: Option<u32>,
    pub def_lines: Vec<u32>,
    pub ref_lines: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportValue {
    Literal(u32),
    Expression(Expr),
}

/// Symbol flag word shared by exports and debug symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportType(pub u32);

impl ExportType {
    const CONDES_MASK: u32 = 0x0007;
    const LABEL: u32 = 0x0008;
    const EXPRESSION: u32 = 0x0010;
    const SIZE: u32 = 0x0020;
    const IMPORT: u32 = 0x0100;
    const EXPORT: u32 = 0x0200;

    pub fn condes_count(self) -> usize {
        (self.0 & Self::CONDES_MASK) as usize
    }

    pub fn is_label(self) -> bool {
        self.0 & Self::LABEL != 0
    }

    pub fn has_expression(self) -> bool {
        self.0 & Self::EXPRESSION != 0
    }

    pub fn has_size(self) -> bool {
        self.0 & Self::SIZE != 0
    }

    pub fn is_import(self) -> bool {
        self.0 & Self::IMPORT != 0
    }

    pub fn is_export(self) -> bool {
        self.0 & Self::EXPORT != 0
    }
}

impl Fragment {
    pub fn len(&self) -> u32 {
        match &self.kind {
            FragmentKind::Literal(bytes) => bytes.len() as u32,
            FragmentKind::Expression { width, .. } => u32::from(*width),
            FragmentKind::Fill(count) => *count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ObjectFile {
    pub fn string(&self, index: u32) -> Result<&str, ContainerError> {
        self.strings
            .get(index as usize)
            .map(String::as_str)
            .ok_or(ContainerError::IndexOutOfRange {
                table: "string pool",
                index,
                len: self.strings.len(),
            })
    }

    pub fn file(&self, index: u32) -> Result<&FileEntry, ContainerError> {
        self.files
            .get(index as usize)
            .ok_or(ContainerError::IndexOutOfRange {
                table: "file",
                index,
                len: self.files.len(),
            })
    }

    pub fn line_info(&self, index: u32) -> Result<&LineInfo, ContainerError> {
        self.line_infos
            .get(index as usize)
            .ok_or(ContainerError::IndexOutOfRange {
                table: "line info",
                index,
                len: self.line_infos.len(),
            })
    }

    pub fn import(&self, index: u32) -> Result<&Import, ContainerError> {
        self.imports
            .get(index as usize)
            .ok_or(ContainerError::IndexOutOfRange {
                table: "import",
                index,
                len: self.imports.len(),
            })
    }

    pub fn segment_name(&self, segment: &Segment) -> Result<&str, ContainerError> {
        self.string(segment.name)
    }

    pub fn export_name(&self, export: &Export) -> Result<&str, ContainerError> {
        self.string(export.name)
    }

    pub fn find_segment(&self, name: &str) -> Result<Option<(usize, &Segment)>, ContainerError> {
        for (index, segment) in self.segments.iter().enumerate() {
            if self.segment_name(segment)? == name {
                return Ok(Some((index, segment)));
            }
        }
        Ok(None)
    }

    /// Source path and 1-based line named by a line-info entry.
    pub fn source_location(&self, line_info: u32) -> Result<(&str, u32), ContainerError> {
        let info = self.line_info(line_info)?;
        let file = self.file(info.file)?;
        Ok((self.string(file.name)?, info.line))
    }
}
