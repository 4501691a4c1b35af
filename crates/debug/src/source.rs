use std::fmt;

use super::*;

/// Position of a node in a [`SourceGraph`].
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceId(u32);

impl SourceId {
    pub fn new(inner: u32) -> Self {
        Self(inner)
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A 0-based line of one source node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LineRef {
    pub source: SourceId,
    pub line: u32,
}

impl LineRef {
    pub fn new(source: SourceId, line: u32) -> Self {
        Self { source, line }
    }
}

/// Where an address-bearing node lives. Its "lines" are byte offsets from
/// `base`, a debugger address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddressBinding {
    pub base: u32,
    pub loaded: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SourceFile {
    pub path: String,
    pub lines: Vec<String>,
    parent_of: BTreeMap<u32, LineRef>,
    children_of: BTreeMap<u32, Vec<LineRef>>,
    binding: Option<AddressBinding>,
}

impl SourceFile {
    /// The line of another node that produced `line` of this one.
    pub fn parent_of(&self, line: u32) -> Option<LineRef> {
        self.parent_of.get(&line).copied()
    }

    /// Lines of other nodes produced from `line` of this one.
    pub fn children_of(&self, line: u32) -> &[LineRef] {
        self.children_of.get(&line).map_or(&[], Vec::as_slice)
    }

    pub fn has_children(&self) -> bool {
        !self.children_of.is_empty()
    }

    pub fn binding(&self) -> Option<AddressBinding> {
        self.binding
    }

    pub fn line_text(&self, line: u32) -> Option<&str> {
        self.lines.get(line as usize).map(String::as_str)
    }
}

/// Arena of source nodes. Nodes refer to each other through [`LineRef`]s,
/// so the parent/child relation can form any DAG; cycles are reported by the
/// walks rather than prevented on insertion.
#[derive(Debug, Clone, Default)]
pub struct SourceGraph {
    nodes: Vec<SourceFile>,
    by_path: FxHashMap<String, SourceId>,
}

impl SourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the node for `path`, creating an empty one on first use.
    pub fn intern(&mut self, path: &str) -> SourceId {
        if let Some(id) = self.by_path.get(path) {
            return *id;
        }
        let id = SourceId(self.nodes.len() as u32);
        self.nodes.push(SourceFile {
            path: path.to_string(),
            ..SourceFile::default()
        });
        self.by_path.insert(path.to_string(), id);
        id
    }

    pub fn find(&self, path: &str) -> Option<SourceId> {
        self.by_path.get(path).copied()
    }

    pub fn get(&self, id: SourceId) -> Result<&SourceFile, SourceMapError> {
        self.nodes
            .get(id.0 as usize)
            .ok_or(SourceMapError::UnknownSource { id: id.0 })
    }

    fn get_mut(&mut self, id: SourceId) -> Result<&mut SourceFile, SourceMapError> {
        self.nodes
            .get_mut(id.0 as usize)
            .ok_or(SourceMapError::UnknownSource { id: id.0 })
    }

    pub fn path(&self, id: SourceId) -> Option<&str> {
        self.nodes.get(id.0 as usize).map(|node| node.path.as_str())
    }

    pub fn set_lines(&mut self, id: SourceId, lines: Vec<String>) -> Result<(), SourceMapError> {
        self.get_mut(id)?.lines = lines;
        Ok(())
    }

    pub fn bind_addresses(
        &mut self,
        id: SourceId,
        binding: AddressBinding,
    ) -> Result<(), SourceMapError> {
        self.get_mut(id)?.binding = Some(binding);
        Ok(())
    }

    pub fn set_loaded(&mut self, id: SourceId, loaded: bool) -> Result<(), SourceMapError> {
        if let Some(binding) = &mut self.get_mut(id)?.binding {
            binding.loaded = loaded;
        }
        Ok(())
    }

    /// Records that `child` was produced by `parent`. A child line has at most
    /// one parent; linking it again replaces the earlier parent.
    pub fn link_lines(&mut self, child: LineRef, parent: LineRef) -> Result<(), SourceMapError> {
        self.get(parent.source)?;
        let previous = self.get_mut(child.source)?.parent_of.insert(child.line, parent);
        if let Some(previous) = previous
            && let Ok(node) = self.get_mut(previous.source)
            && let Some(children) = node.children_of.get_mut(&previous.line)
        {
            children.retain(|existing| *existing != child);
            if children.is_empty() {
                node.children_of.remove(&previous.line);
            }
        }

        let children = self
            .get_mut(parent.source)?
            .children_of
            .entry(parent.line)
            .or_default();
        if !children.contains(&child) {
            children.push(child);
        }
        Ok(())
    }

    /// Follows parent links from `start` to the line nothing else produced.
    pub fn find_ultimate_source(&self, start: LineRef) -> Result<LineRef, SourceMapError> {
        let mut visited = FxHashSet::default();
        let mut current = start;
        loop {
            if !visited.insert(current) {
                return Err(self.cycle_at(current));
            }
            match self.get(current.source)?.parent_of(current.line) {
                Some(parent) => current = parent,
                None => return Ok(current),
            }
        }
    }

    /// Follows child links from `start` down to address-bearing nodes and
    /// returns each reached `(debugger address, loaded)` pair, sorted and
    /// without duplicates.
    pub fn find_ultimate_addresses(
        &self,
        start: LineRef,
    ) -> Result<Vec<(u32, bool)>, SourceMapError> {
        let mut out = BTreeSet::new();
        let mut on_path = FxHashSet::default();
        self.collect_addresses(start, &mut on_path, &mut out)?;
        Ok(out.into_iter().collect())
    }

    fn collect_addresses(
        &self,
        at: LineRef,
        on_path: &mut FxHashSet<LineRef>,
        out: &mut BTreeSet<(u32, bool)>,
    ) -> Result<(), SourceMapError> {
        if !on_path.insert(at) {
            return Err(self.cycle_at(at));
        }

        let node = self.get(at.source)?;
        let children = node.children_of(at.line);
        if children.is_empty() {
            if let Some(binding) = node.binding {
                out.insert((binding.base.wrapping_add(at.line), binding.loaded));
            }
        } else {
            for child in children {
                self.collect_addresses(*child, on_path, out)?;
            }
        }

        // A line reached again through a sibling branch is not a cycle.
        on_path.remove(&at);
        Ok(())
    }

    fn cycle_at(&self, at: LineRef) -> SourceMapError {
        SourceMapError::CyclicSourceMap {
            path: self.path(at.source).unwrap_or_default().to_string(),
            line: at.line,
        }
    }
}
