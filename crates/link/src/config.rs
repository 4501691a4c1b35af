use super::*;

mod tokens;

use self::tokens::{Attribute, Block, Parser, Statement};

/// Placeholder for the caller-supplied start address of the output file.
pub const START_SYMBOL: &str = "%S";
pub const HEADER_LAST_SYMBOL: &str = "__HEADER_LAST__";
pub const ONCE_RUN_SYMBOL: &str = "__ONCE_RUN__";
pub const ONCE_RUN_VALUE: i64 = 0;

const OUTPUT_PLACEHOLDER: &str = "%O";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigParseError {
    #[error("expected {expected}, found {found}")]
    Unexpected {
        expected: &'static str,
        found: String,
        span: Range<usize>,
    },
    #[error("unterminated {what}")]
    Unterminated {
        what: &'static str,
        span: Range<usize>,
    },
    #[error("invalid expression '{text}': {source}")]
    Expression {
        text: String,
        #[source]
        source: EvalError,
        span: Range<usize>,
    },
    #[error("unknown type '{kind}' for segment '{segment}'")]
    UnknownSegmentType {
        segment: String,
        kind: String,
        span: Range<usize>,
    },
    #[error("{what} '{name}' has no '{attribute}' attribute")]
    MissingAttribute {
        what: &'static str,
        name: String,
        attribute: &'static str,
        span: Range<usize>,
    },
    #[error("value {value} of '{attribute}' is out of range")]
    OutOfRange {
        attribute: String,
        value: i64,
        span: Range<usize>,
    },
}

impl ConfigParseError {
    /// Byte range of the offending text.
    pub fn span(&self) -> Range<usize> {
        match self {
            Self::Unexpected { span, .. }
            | Self::Unterminated { span, .. }
            | Self::Expression { span, .. }
            | Self::UnknownSegmentType { span, .. }
            | Self::MissingAttribute { span, .. }
            | Self::OutOfRange { span, .. } => span.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkerConfig {
    pub files: IndexMap<String, OutputFile>,
    pub memory: IndexMap<String, MemoryArea>,
    pub segments: IndexMap<String, SegmentConfig>,
    pub imports: Vec<String>,
    pub zero_page_segments: Vec<String>,
    /// Resolved `weak` symbol values.
    pub symbols: IndexMap<String, i64>,
}

impl LinkerConfig {
    pub fn is_empty(&self) -> bool {
        self.memory.is_empty() && self.segments.is_empty()
    }

    /// Memory areas written to `file`, in declaration order.
    pub fn areas_of<'a>(&'a self, file: &'a OutputFile) -> impl Iterator<Item = &'a MemoryArea> {
        file.areas.iter().filter_map(|name| self.memory.get(name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub name: String,
    /// Start of the first area written to this file.
    pub start: u32,
    /// The start came from `%S` rather than a literal.
    pub start_tracks_caller: bool,
    pub areas: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryArea {
    pub name: String,
    pub start: u32,
    pub size: u32,
    pub file: String,
    pub start_tracks_caller: bool,
    /// Placed segments in declaration order. Zero page segments are never
    /// listed here.
    pub segments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentConfig {
    pub name: String,
    pub load: String,
    pub kind: SegmentKind,
    pub start: Option<u32>,
    pub align: Option<u32>,
    pub optional: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentKind {
    ZeroPage,
    ReadOnly,
    ReadWrite,
    Bss,
    Overwrite,
}

impl SegmentKind {
    fn parse(text: &str) -> Option<Self> {
        match text.to_ascii_lowercase().as_str() {
            "zp" => Some(Self::ZeroPage),
            "ro" => Some(Self::ReadOnly),
            "rw" => Some(Self::ReadWrite),
            "bss" => Some(Self::Bss),
            "overwrite" => Some(Self::Overwrite),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ZeroPage => "zp",
            Self::ReadOnly => "ro",
            Self::ReadWrite => "rw",
            Self::Bss => "bss",
            Self::Overwrite => "overwrite",
        }
    }
}

/// Parses cc65 linker configuration text.
///
/// `default_output_name` replaces `%O` in file names and `start` is the
/// value of `%S` and `__HEADER_LAST__`. Only `SYMBOLS`, `MEMORY` and
/// `SEGMENTS` are interpreted, in that order regardless of where they appear,
/// so weak symbols are visible to every area and segment expression. Missing
/// blocks leave the matching tables empty.
pub fn parse_config(
    text: &str,
    default_output_name: &str,
    start: u32,
) -> Result<LinkerConfig, ConfigParseError> {
    let blocks = Parser::new(text)?.parse_blocks()?;

    let mut interpreter = Interpreter::new(default_output_name, start);
    for block in &blocks {
        if !["SYMBOLS", "MEMORY", "SEGMENTS"]
            .iter()
            .any(|known| block.name.eq_ignore_ascii_case(known))
        {
            tracing::debug!(block = %block.name, "ignoring linker config block");
        }
    }
    for statement in statements_of(&blocks, "SYMBOLS") {
        interpreter.symbol(statement)?;
    }
    for statement in statements_of(&blocks, "MEMORY") {
        interpreter.memory(statement)?;
    }
    for statement in statements_of(&blocks, "SEGMENTS") {
        interpreter.segment(statement)?;
    }
    Ok(interpreter.config)
}

pub fn load_config(
    path: &Path,
    default_output_name: &str,
    start: u32,
) -> anyhow::Result<LinkerConfig> {
    load_config_with_options(path, default_output_name, start, RenderOptions::default())
}

pub fn load_config_with_options(
    path: &Path,
    default_output_name: &str,
    start: u32,
    options: RenderOptions,
) -> anyhow::Result<LinkerConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read linker config '{}'", path.display()))?;
    parse_config(&text, default_output_name, start).map_err(|error| {
        anyhow::anyhow!(render_config_error(
            &path.display().to_string(),
            &text,
            &error,
            options
        ))
    })
}

fn statements_of<'a>(blocks: &'a [Block], name: &'a str) -> impl Iterator<Item = &'a Statement> {
    blocks
        .iter()
        .filter(move |block| block.name.eq_ignore_ascii_case(name))
        .flat_map(|block| &block.statements)
}

struct Interpreter<'a> {
    output_name: &'a str,
    context: EvalContext,
    config: LinkerConfig,
}

impl<'a> Interpreter<'a> {
    fn new(output_name: &'a str, start: u32) -> Self {
        let mut context = EvalContext::new();
        context.set(START_SYMBOL, i64::from(start));
        context.set(HEADER_LAST_SYMBOL, i64::from(start));
        context.set(ONCE_RUN_SYMBOL, ONCE_RUN_VALUE);
        Self {
            output_name,
            context,
            config: LinkerConfig::default(),
        }
    }

    fn symbol(&mut self, statement: &Statement) -> Result<(), ConfigParseError> {
        let kind = statement
            .get("type")
            .map(|attribute| attribute.text.to_ascii_lowercase());
        match kind.as_deref() {
            Some("import") => self.config.imports.push(statement.name.clone()),
            // exports are defined by the config itself, like weak symbols
            Some("weak" | "export") => {
                let value = self.required(statement, "value", "symbol")?;
                let value = self.evaluate(value)?;
                if self.context.contains(&statement.name) {
                    tracing::warn!(symbol = %statement.name, "symbol defined more than once, keeping the last value");
                }
                self.context.set(statement.name.clone(), value);
                self.config.symbols.insert(statement.name.clone(), value);
            }
            _ => tracing::debug!(symbol = %statement.name, "ignoring symbol without a known type"),
        }
        Ok(())
    }

    fn memory(&mut self, statement: &Statement) -> Result<(), ConfigParseError> {
        let file = statement
            .get("file")
            .map_or(OUTPUT_PLACEHOLDER, |attribute| attribute.text.as_str());
        if file.trim().is_empty() {
            tracing::debug!(area = %statement.name, "memory area has no output file");
            return Ok(());
        }
        let file = file.replace(OUTPUT_PLACEHOLDER, self.output_name);

        let start_attribute = self.required(statement, "start", "memory area")?;
        let start = self.address(start_attribute)?;
        let start_tracks_caller = start_attribute.text.contains(START_SYMBOL);
        let size = match statement.get("size") {
            Some(attribute) => self.address(attribute)?,
            None => 0,
        };

        let output = self
            .config
            .files
            .entry(file.clone())
            .or_insert_with(|| OutputFile {
                name: file.clone(),
                start,
                start_tracks_caller,
                areas: Vec::new(),
            });
        output.areas.push(statement.name.clone());

        self.config.memory.insert(
            statement.name.clone(),
            MemoryArea {
                name: statement.name.clone(),
                start,
                size,
                file,
                start_tracks_caller,
                segments: Vec::new(),
            },
        );
        Ok(())
    }

    fn segment(&mut self, statement: &Statement) -> Result<(), ConfigParseError> {
        let load = self.required(statement, "load", "segment")?.text.clone();
        let kind = match statement.get("type") {
            Some(attribute) => SegmentKind::parse(&attribute.text).ok_or_else(|| {
                ConfigParseError::UnknownSegmentType {
                    segment: statement.name.clone(),
                    kind: attribute.text.clone(),
                    span: attribute.span.clone(),
                }
            })?,
            None => SegmentKind::ReadOnly,
        };
        let start = statement
            .get("start")
            .map(|attribute| self.address(attribute))
            .transpose()?;
        let align = statement
            .get("align")
            .map(|attribute| self.address(attribute))
            .transpose()?;
        let optional = statement
            .get("optional")
            .is_some_and(|attribute| is_yes(&attribute.text));

        let name = statement.name.clone();
        if kind == SegmentKind::ZeroPage {
            self.config.zero_page_segments.push(name.clone());
        } else if let Some(area) = self.config.memory.get_mut(&load) {
            area.segments.push(name.clone());
        } else {
            tracing::debug!(segment = %name, area = %load, "segment loads into an area without output");
        }

        self.config.segments.insert(
            name.clone(),
            SegmentConfig {
                name,
                load,
                kind,
                start,
                align,
                optional,
            },
        );
        Ok(())
    }

    fn required<'s>(
        &self,
        statement: &'s Statement,
        attribute: &'static str,
        what: &'static str,
    ) -> Result<&'s Attribute, ConfigParseError> {
        statement
            .get(attribute)
            .ok_or_else(|| ConfigParseError::MissingAttribute {
                what,
                name: statement.name.clone(),
                attribute,
                span: statement.span.clone(),
            })
    }

    fn evaluate(&self, attribute: &Attribute) -> Result<i64, ConfigParseError> {
        if attribute.quoted {
            return Err(ConfigParseError::Unexpected {
                expected: "expression",
                found: format!("\"{}\"", attribute.text),
                span: attribute.span.clone(),
            });
        }
        x16dbg_eval::evaluate_with_context(&attribute.text, &self.context).map_err(|source| {
            let span = match source.span() {
                Some(inner) => attribute.span.start + inner.start..attribute.span.start + inner.end,
                None => attribute.span.clone(),
            };
            ConfigParseError::Expression {
                text: attribute.text.clone(),
                source,
                span,
            }
        })
    }

    fn address(&self, attribute: &Attribute) -> Result<u32, ConfigParseError> {
        let value = self.evaluate(attribute)?;
        u32::try_from(value).map_err(|_| ConfigParseError::OutOfRange {
            attribute: attribute.key.clone(),
            value,
            span: attribute.span.clone(),
        })
    }
}

fn is_yes(text: &str) -> bool {
    matches!(text.to_ascii_lowercase().as_str(), "yes" | "true" | "1")
}
