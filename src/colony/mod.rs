//! Colonies and the lineage store.
//!
//! - [`CellNode`]: a cell plus a non-owning link to the committed node it
//!   descends from
//! - [`Colony`]: the working set of cells for one frame, owned exclusively
//!   by one annealing job
//! - [`Snapshot`]: an immutable committed colony
//! - [`LineageFrames`]: the append-only history of snapshots
//!
//! A working colony is produced by [`LineageFrames::forward`] and committed
//! by [`LineageFrames::flatten`]. Working colonies are deep copies: editing
//! one never reaches a snapshot or another job's copy.

use crate::cell::Cell;
use crate::error::{Error, Result};
use std::sync::{Arc, Weak};

/// A cell and its lineage predecessor.
#[derive(Debug, Clone)]
pub struct CellNode {
    pub cell: Cell,
    parent: Weak<CellNode>,
}

impl CellNode {
    /// A node without a predecessor.
    pub fn new(cell: Cell) -> Self {
        Self {
            cell,
            parent: Weak::new(),
        }
    }

    /// A node descending from a committed node.
    pub fn with_parent(cell: Cell, parent: &Arc<CellNode>) -> Self {
        Self {
            cell,
            parent: Arc::downgrade(parent),
        }
    }

    /// A new node carrying `cell` with this node's predecessor.
    pub fn derive(&self, cell: Cell) -> Self {
        Self {
            cell,
            parent: self.parent.clone(),
        }
    }

    pub fn name(&self) -> &str {
        self.cell.name()
    }

    /// The committed predecessor, if it is still alive.
    pub fn parent(&self) -> Option<Arc<CellNode>> {
        self.parent.upgrade()
    }

    /// Walks predecessors from the nearest to the oldest.
    pub fn ancestors(&self) -> impl Iterator<Item = Arc<CellNode>> {
        std::iter::successors(self.parent(), |node| node.parent())
    }
}

/// The cells of one frame. Names are unique.
#[derive(Debug, Clone, Default)]
pub struct Colony {
    nodes: Vec<CellNode>,
}

impl Colony {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node, rejecting duplicate names.
    pub fn add(&mut self, node: CellNode) -> Result<()> {
        if self.position(node.name()).is_some() {
            return Err(Error::input(format!(
                "duplicate cell name \"{}\"",
                node.name()
            )));
        }
        self.nodes.push(node);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CellNode> {
        self.nodes.iter()
    }

    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.nodes.iter().map(|n| &n.cell)
    }

    pub fn node(&self, index: usize) -> &CellNode {
        &self.nodes[index]
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.name() == name)
    }

    pub fn get(&self, name: &str) -> Option<&CellNode> {
        self.position(name).map(|i| &self.nodes[i])
    }

    /// Replaces the cell at `index`, keeping its predecessor link.
    ///
    /// The name must stay the same.
    pub fn replace(&mut self, index: usize, cell: Cell) {
        debug_assert_eq!(self.nodes[index].name(), cell.name());
        self.nodes[index].cell = cell;
    }

    /// Replaces the cell at `index` by two daughters. Fails (leaving the
    /// colony untouched) when a daughter name is already taken.
    pub fn split_at(&mut self, index: usize, a: Cell, b: Cell) -> Result<()> {
        let parent = self.nodes[index].clone();
        let taken = |name: &str| {
            self.nodes
                .iter()
                .enumerate()
                .any(|(i, n)| i != index && n.name() == name)
        };
        if a.name() == b.name() || taken(a.name()) || taken(b.name()) {
            return Err(Error::input(format!(
                "cannot split \"{}\": daughter name already in use",
                parent.name()
            )));
        }
        self.nodes[index] = parent.derive(a);
        self.nodes.insert(index + 1, parent.derive(b));
        Ok(())
    }

    /// Replaces the cells at `i` and `j` by `merged`, which inherits the
    /// predecessor of the cell at `i`.
    pub fn combine_at(&mut self, i: usize, j: usize, merged: Cell) -> Result<()> {
        if i == j {
            return Err(Error::input("cannot combine a cell with itself"));
        }
        let clash = self
            .nodes
            .iter()
            .enumerate()
            .any(|(k, n)| k != i && k != j && n.name() == merged.name());
        if clash {
            return Err(Error::input(format!(
                "cannot combine into \"{}\": name already in use",
                merged.name()
            )));
        }
        let node = self.nodes[i].derive(merged);
        let (lo, hi) = if i < j { (i, j) } else { (j, i) };
        self.nodes.remove(hi);
        self.nodes[lo] = node;
        Ok(())
    }

    /// A colony of unlinked nodes.
    pub fn from_cells(cells: impl IntoIterator<Item = Cell>) -> Result<Colony> {
        let mut colony = Colony::new();
        for cell in cells {
            colony.add(CellNode::new(cell))?;
        }
        Ok(colony)
    }

    /// Plain cell values, dropping lineage links.
    pub fn to_cells(&self) -> Vec<Cell> {
        self.cells().cloned().collect()
    }

    /// Rebuilds a colony from plain cells, re-attaching each cell to the
    /// predecessor of the `seed` node it derives from (same name, daughter
    /// of it, or the first daughter it was merged from).
    pub fn relinked(cells: Vec<Cell>, seed: &Colony) -> Result<Colony> {
        let mut colony = Colony::new();
        for cell in cells {
            let origin = seed
                .get(cell.name())
                .or_else(|| {
                    seed.iter()
                        .filter(|n| cell.name().starts_with(n.name()))
                        .max_by_key(|n| n.name().len())
                })
                .or_else(|| seed.iter().find(|n| n.name().starts_with(cell.name())));
            let node = match origin {
                Some(n) => n.derive(cell),
                None => CellNode::new(cell),
            };
            colony.add(node)?;
        }
        Ok(colony)
    }
}

impl<'a> IntoIterator for &'a Colony {
    type Item = &'a CellNode;
    type IntoIter = std::slice::Iter<'a, CellNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// An immutable committed colony.
#[derive(Debug)]
pub struct Snapshot {
    nodes: Vec<Arc<CellNode>>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<CellNode>> {
        self.nodes.iter()
    }

    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.nodes.iter().map(|n| &n.cell)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<CellNode>> {
        self.nodes.iter().find(|n| n.name() == name)
    }
}

/// Append-only history of committed colonies, one per processed frame.
#[derive(Debug, Default)]
pub struct LineageFrames {
    frames: Vec<Arc<Snapshot>>,
}

impl LineageFrames {
    pub fn new() -> Self {
        Self::default()
    }

    /// A working colony deep-copied from the last snapshot.
    ///
    /// Every node links back to the snapshot node it was copied from.
    /// Empty when nothing has been committed yet.
    pub fn forward(&self) -> Colony {
        let nodes = match self.frames.last() {
            Some(last) => last
                .nodes
                .iter()
                .map(|n| CellNode::with_parent(n.cell.clone(), n))
                .collect(),
            None => Vec::new(),
        };
        Colony { nodes }
    }

    /// Commits a working colony as the next snapshot.
    pub fn flatten(&mut self, colony: Colony) -> Arc<Snapshot> {
        let snapshot = Arc::new(Snapshot {
            nodes: colony.nodes.into_iter().map(Arc::new).collect(),
        });
        self.frames.push(Arc::clone(&snapshot));
        snapshot
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn last(&self) -> Option<&Arc<Snapshot>> {
        self.frames.last()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<Snapshot>> {
        self.frames.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Snapshot>> {
        self.frames.iter()
    }
}
