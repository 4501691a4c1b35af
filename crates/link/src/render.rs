use super::*;

#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    pub color: bool,
}

/// Renders a config error as a report pointing into `text`.
pub fn render_config_error(
    source_name: &str,
    text: &str,
    error: &ConfigParseError,
    options: RenderOptions,
) -> String {
    let span = error.span();
    let start = span.start.min(text.len());
    let end = span.end.clamp(start, text.len());
    let id = source_name.to_string();

    let mut cache = SingleSourceCache {
        id: id.clone(),
        source: Source::from(text.to_string()),
    };
    let mut output = Vec::new();

    let report = Report::build(ReportKind::Error, (id.clone(), start..end))
        .with_config(
            Config::default()
                .with_index_type(IndexType::Byte)
                .with_color(options.color),
        )
        .with_message("invalid linker config")
        .with_label(Label::new((id, start..end)).with_message(error.to_string()))
        .finish();

    if report.write(&mut cache, &mut output).is_ok() {
        String::from_utf8_lossy(&output).into_owned()
    } else {
        format!("{source_name}: {error}")
    }
}

struct SingleSourceCache {
    id: String,
    source: Source<String>,
}

impl Cache<String> for SingleSourceCache {
    type Storage = String;

    fn fetch(
        &mut self,
        id: &String,
    ) -> std::result::Result<&Source<Self::Storage>, impl fmt::Debug> {
        if id == &self.id {
            Ok::<_, String>(&self.source)
        } else {
            Err::<&Source<Self::Storage>, _>(format!("missing source for '{id}'"))
        }
    }

    fn display<'a>(&self, id: &'a String) -> Option<impl fmt::Display + 'a> {
        Some(id)
    }
}

/// One line per run of consecutive bytes from the same source line:
///
/// ```text
/// 00:0801-00:0802  +0002  src/main.s:12
/// ```
///
/// Line numbers are printed 1-based.
pub fn render_attribution(binary: &SourceAttributedBinary, graph: &SourceGraph) -> String {
    let mut out = String::new();
    let mut runs: Vec<(AttributedByte, AttributedByte)> = Vec::new();
    for byte in &binary.bytes {
        match runs.last_mut() {
            Some((_, last))
                if last.address + 1 == byte.address
                    && last.source == byte.source
                    && last.line == byte.line =>
            {
                *last = *byte;
            }
            _ => runs.push((*byte, *byte)),
        }
    }

    for (first, last) in runs {
        let path = graph.path(first.source).unwrap_or("?");
        let range = if first.address == last.address {
            format!("{:<15}", x16dbg_debug::format_debugger_address(first.address))
        } else {
            format!(
                "{}-{}",
                x16dbg_debug::format_debugger_address(first.address),
                x16dbg_debug::format_debugger_address(last.address)
            )
        };
        out.push_str(&format!(
            "{range}  +{:04X}  {path}:{}\n",
            first.offset,
            first.line + 1
        ));
    }
    out
}
