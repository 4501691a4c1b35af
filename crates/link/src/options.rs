use super::*;

/// Settings for [`reconcile`], read from the `[link]` table of `x16dbg.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ReconcileOptions {
    /// Bytes in front of the first area in the output file, 2 for a PRG
    /// load address. Set to 0 when the config writes the header itself.
    pub header_len: u32,
    /// Segments holding that header; they only advance the cursor.
    pub header_segments: Vec<String>,
    /// Library module defining a segment, without the `.o` suffix. Segments
    /// not listed here are looked up in `<lowercase segment name>.o`.
    pub segment_owners: BTreeMap<String, String>,
    pub path_map: Vec<PathRule>,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            header_len: 2,
            header_segments: vec!["EXEHDR".to_string()],
            segment_owners: BTreeMap::new(),
            path_map: Vec::new(),
        }
    }
}

impl ReconcileOptions {
    pub fn is_header_segment(&self, segment: &str) -> bool {
        self.header_segments.iter().any(|name| name == segment)
    }

    /// Archive member expected to define `segment`.
    pub fn owner_module(&self, segment: &str) -> String {
        match self.segment_owners.get(segment) {
            Some(module) => format!("{module}.o"),
            None => format!("{}.o", segment.to_ascii_lowercase()),
        }
    }

    /// Applies the first matching [`PathRule`].
    pub fn map_path(&self, path: &str) -> String {
        self.path_map
            .iter()
            .find_map(|rule| rule.apply(path))
            .unwrap_or_else(|| path.to_string())
    }
}

/// Rewrites source paths recorded at build time that start with `from`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathRule {
    pub from: String,
    pub to: String,
}

impl PathRule {
    pub fn apply(&self, path: &str) -> Option<String> {
        path.strip_prefix(self.from.as_str())
            .map(|rest| format!("{}{rest}", self.to))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct Settings {
    #[serde(default)]
    link: ReconcileOptions,
}

pub fn load_options(path: &Path) -> anyhow::Result<ReconcileOptions> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read settings '{}'", path.display()))?;
    let settings: Settings = toml::from_str(&text)
        .with_context(|| format!("failed to parse settings '{}'", path.display()))?;
    Ok(settings.link)
}
