// src/dag.rs

//! Typed build graph with dirty-node scheduling
//!
//! Each node computes an [`OutputTree`] from the outputs of its inputs and
//! reports which paths it read. A file change marks the nodes watching it
//! (and everything downstream) dirty; [`BuildGraph::build`] then recomputes
//! only what is dirty, in topological order, and reports which outputs
//! actually changed.
//!
//! # Example
//!
//! ```ignore
//! let mut graph = BuildGraph::new();
//! let a = graph.add_node(Box::new(transform_a), &[])?;
//! let b = graph.add_node(Box::new(transform_b), &[])?;
//! let merged = graph.add_node(Box::new(merge), &[a, b])?;
//!
//! let report = graph.build()?;          // computes a, b, merged
//! graph.invalidate_path(&changed_file);
//! let report = graph.build()?;          // recomputes only what watched it
//! ```

use crate::error::{Error, Result};
use crate::tree::OutputTree;
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Handle to a node in a [`BuildGraph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a node produced and which paths it depends on
#[derive(Debug, Clone)]
pub struct Computed {
    pub tree: Arc<OutputTree>,
    pub watches: Vec<PathBuf>,
}

/// A unit of build work
pub trait BuildNode: Send {
    /// Name used in logs and errors
    fn label(&self) -> String;

    /// Compute this node's output from its inputs, given in edge order
    fn compute(&mut self, inputs: &[Arc<OutputTree>]) -> Result<Computed>;
}

struct NodeState {
    node: Box<dyn BuildNode>,
    inputs: Vec<NodeId>,
    dependents: Vec<NodeId>,
    output: Option<Arc<OutputTree>>,
    fingerprint: Option<String>,
    watches: Vec<PathBuf>,
    dirty: bool,
}

/// Outcome of one [`BuildGraph::build`] pass
#[derive(Debug, Default, Clone)]
pub struct BuildReport {
    /// Nodes whose `compute` ran, in execution order
    pub recomputed: Vec<NodeId>,
    /// Nodes whose output differs from the previous pass
    pub changed: BTreeSet<NodeId>,
}

impl BuildReport {
    pub fn changed(&self, id: NodeId) -> bool {
        self.changed.contains(&id)
    }
}

#[derive(Default)]
pub struct BuildGraph {
    nodes: Vec<NodeState>,
}

impl BuildGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node fed by `inputs`
    ///
    /// New nodes start dirty.
    pub fn add_node(&mut self, node: Box<dyn BuildNode>, inputs: &[NodeId]) -> Result<NodeId> {
        let id = NodeId(self.nodes.len());
        for input in inputs {
            if input.0 >= self.nodes.len() {
                return Err(Error::Cycle(format!(
                    "{} lists unknown input {}",
                    node.label(),
                    input
                )));
            }
        }
        debug!("Added build node {} {}", id, node.label());
        self.nodes.push(NodeState {
            node,
            inputs: Vec::with_capacity(inputs.len()),
            dependents: Vec::new(),
            output: None,
            fingerprint: None,
            watches: Vec::new(),
            dirty: true,
        });
        for input in inputs {
            self.link(*input, id);
        }
        Ok(id)
    }

    /// Feed the output of `from` into `to`
    ///
    /// Rejects edges that would close a cycle.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) -> Result<()> {
        let (Some(_), Some(_)) = (self.nodes.get(from.0), self.nodes.get(to.0)) else {
            return Err(Error::Cycle(format!("unknown node in edge {} -> {}", from, to)));
        };
        if from == to || self.reaches(to, from) {
            return Err(Error::Cycle(format!(
                "{} -> {} would close a cycle",
                self.label(from),
                self.label(to)
            )));
        }
        self.link(from, to);
        self.mark_dirty(to);
        Ok(())
    }

    fn link(&mut self, from: NodeId, to: NodeId) {
        self.nodes[to.0].inputs.push(from);
        self.nodes[from.0].dependents.push(to);
    }

    /// Whether `to` is reachable from `from` along dependent edges
    fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([from]);
        while let Some(id) = queue.pop_front() {
            if id == to {
                return true;
            }
            if seen.insert(id) {
                queue.extend(self.nodes[id.0].dependents.iter().copied());
            }
        }
        false
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn label(&self, id: NodeId) -> String {
        self.nodes
            .get(id.0)
            .map_or_else(|| id.to_string(), |n| n.node.label())
    }

    /// Last computed output of a node
    pub fn output(&self, id: NodeId) -> Option<Arc<OutputTree>> {
        self.nodes.get(id.0).and_then(|n| n.output.clone())
    }

    /// Paths the node reported on its last computation
    pub fn watches(&self, id: NodeId) -> &[PathBuf] {
        self.nodes.get(id.0).map(|n| n.watches.as_slice()).unwrap_or_default()
    }

    pub fn is_dirty(&self, id: NodeId) -> bool {
        self.nodes.get(id.0).is_some_and(|n| n.dirty)
    }

    /// Mark a node and everything downstream of it dirty
    pub fn mark_dirty(&mut self, id: NodeId) {
        let mut queue = VecDeque::from([id]);
        while let Some(id) = queue.pop_front() {
            let state = &mut self.nodes[id.0];
            // Dependents of an already dirty node were marked with it
            if state.dirty {
                continue;
            }
            state.dirty = true;
            queue.extend(state.dependents.iter().copied());
        }
    }

    /// Mark every node watching an ancestor of `path` dirty
    ///
    /// Returns the number of nodes whose watch matched.
    pub fn invalidate_path(&mut self, path: &Path) -> usize {
        let matched: Vec<NodeId> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.watches.iter().any(|w| path.starts_with(w)))
            .map(|(i, _)| NodeId(i))
            .collect();
        for id in &matched {
            debug!("{:?} invalidates {}", path, self.label(*id));
            self.mark_dirty(*id);
        }
        matched.len()
    }

    /// Node ids in topological order (Kahn's algorithm)
    pub fn topological_order(&self) -> Vec<NodeId> {
        let mut in_degrees: Vec<usize> = self.nodes.iter().map(|n| n.inputs.len()).collect();
        let mut queue: VecDeque<NodeId> = in_degrees
            .iter()
            .enumerate()
            .filter(|&(_, deg)| *deg == 0)
            .map(|(i, _)| NodeId(i))
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(id) = queue.pop_front() {
            order.push(id);
            for dependent in &self.nodes[id.0].dependents {
                let deg = &mut in_degrees[dependent.0];
                *deg = deg.saturating_sub(1);
                if *deg == 0 {
                    queue.push_back(*dependent);
                }
            }
        }
        order
    }

    /// Recompute dirty nodes and nodes whose inputs changed
    ///
    /// A node that fails stays dirty and the error is returned; nodes
    /// already recomputed in this pass keep their new outputs.
    pub fn build(&mut self) -> Result<BuildReport> {
        let mut report = BuildReport::default();
        for id in self.topological_order() {
            let needs = {
                let state = &self.nodes[id.0];
                state.dirty
                    || state.output.is_none()
                    || state.inputs.iter().any(|i| report.changed.contains(i))
            };
            if !needs {
                continue;
            }

            let inputs: Vec<Arc<OutputTree>> = self.nodes[id.0]
                .inputs
                .iter()
                .map(|i| self.nodes[i.0].output.clone().unwrap_or_default())
                .collect();

            let state = &mut self.nodes[id.0];
            let computed = state.node.compute(&inputs)?;
            let fingerprint = computed.tree.fingerprint();
            if state.fingerprint.as_deref() != Some(fingerprint.as_str()) {
                report.changed.insert(id);
            }
            debug!(
                "Computed {} ({} files, changed: {})",
                state.node.label(),
                computed.tree.len(),
                report.changed.contains(&id)
            );
            state.output = Some(computed.tree);
            state.watches = computed.watches;
            state.fingerprint = Some(fingerprint);
            state.dirty = false;
            report.recomputed.push(id);
        }
        Ok(report)
    }
}

impl fmt::Debug for BuildGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.nodes.iter().map(|n| (n.node.label(), n.dirty)))
            .finish()
    }
}
