use super::*;

/// How far [`SourceMapIndex::lookup_previous`] walks back by default; the
/// longest 65C02 instruction is three bytes.
pub const DEFAULT_BACK_STEP: u32 = 3;

/// One byte-producing line of compiled output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputLine {
    pub address: u32,
    pub source: SourceId,
    /// 0-based.
    pub line: u32,
    pub steppable: bool,
}

/// Address index over compiled output. Owns the [`SourceGraph`] the
/// recorded lines point into.
#[derive(Debug, Default)]
pub struct SourceMapIndex {
    graph: SourceGraph,
    by_address: FxHashMap<u32, OutputLine>,
    by_source: FxHashMap<SourceId, BTreeSet<(u32, u32)>>,
}

impl SourceMapIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn graph(&self) -> &SourceGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut SourceGraph {
        &mut self.graph
    }

    pub fn len(&self) -> usize {
        self.by_address.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }

    /// Forgets every recorded line. The source graph is kept.
    pub fn clear(&mut self) {
        self.by_address.clear();
        self.by_source.clear();
    }

    pub fn record_line(&mut self, line: OutputLine) -> Result<(), SourceMapError> {
        self.graph.get(line.source)?;
        if let Some(existing) = self.by_address.get(&line.address) {
            return Err(SourceMapError::DuplicateAddressMapping {
                address: line.address,
                path: self
                    .graph
                    .path(existing.source)
                    .unwrap_or_default()
                    .to_string(),
                line: existing.line,
            });
        }

        self.by_address.insert(line.address, line);
        self.by_source
            .entry(line.source)
            .or_default()
            .insert((line.line, line.address));
        Ok(())
    }

    pub fn lookup(&self, debugger_address: u32) -> Option<&OutputLine> {
        self.by_address.get(&debugger_address)
    }

    /// The entry at `debugger_address`, or the nearest one up to
    /// `max_back_step` addresses below it.
    pub fn lookup_previous(&self, debugger_address: u32, max_back_step: u32) -> Option<&OutputLine> {
        (0..=max_back_step)
            .map_while(|step| debugger_address.checked_sub(step))
            .find_map(|address| self.by_address.get(&address))
    }

    /// `(line, address)` pairs recorded for `path`, ordered by line.
    pub fn lines_for_file(&self, path: &str) -> Vec<(u32, u32)> {
        self.graph
            .find(path)
            .map(|id| self.lines_for_source(id))
            .unwrap_or_default()
    }

    pub fn lines_for_source(&self, source: SourceId) -> Vec<(u32, u32)> {
        self.by_source
            .get(&source)
            .map(|lines| lines.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Recorded addresses of one line, lowest first.
    pub fn addresses_for_line(&self, source: SourceId, line: u32) -> Vec<u32> {
        self.by_source
            .get(&source)
            .map(|lines| {
                lines
                    .range((line, 0)..=(line, u32::MAX))
                    .map(|(_, address)| *address)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Path-based form of [`SourceGraph::find_ultimate_source`]. A path the
    /// graph does not know has no parents and resolves to itself.
    pub fn find_ultimate_source(
        &self,
        path: &str,
        line: u32,
    ) -> Result<(String, u32), SourceMapError> {
        let Some(id) = self.graph.find(path) else {
            return Ok((path.to_string(), line));
        };
        let origin = self.graph.find_ultimate_source(LineRef::new(id, line))?;
        Ok((self.graph.get(origin.source)?.path.clone(), origin.line))
    }

    pub fn find_ultimate_addresses(
        &self,
        path: &str,
        line: u32,
    ) -> Result<Vec<(u32, bool)>, SourceMapError> {
        match self.graph.find(path) {
            Some(id) => self.graph.find_ultimate_addresses(LineRef::new(id, line)),
            None => Ok(Vec::new()),
        }
    }
}
