//! Strategy trees
//!
//! A strategy describes how a recording is progressively split into final
//! stems. Each node names a separation model and maps every slot that model
//! produces either to a final stem name or to a nested node that receives
//! the slot's file as its input.
//!
//! ```yaml
//! model: htdemucs
//! outputs:
//!   vocals: vocals
//!   drums: drums
//!   bass: bass
//!   other:
//!     model: guitar_split
//!     outputs:
//!       guitar: guitar
//!       rest: other
//! ```

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StemforgeError};

/// Where a model output slot goes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StrategyOutput {
    /// The slot's file is a final stem stored under this name.
    Leaf(String),
    /// The slot's file is separated further.
    Node(Box<StrategyNode>),
}

/// One separation step in a strategy tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyNode {
    /// Separation model identifier
    pub model: String,
    /// Declared output slots of `model`
    pub outputs: BTreeMap<String, StrategyOutput>,
}

impl StrategyNode {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            outputs: BTreeMap::new(),
        }
    }

    /// Builder: route `slot` to the final stem `name`.
    pub fn leaf(mut self, slot: impl Into<String>, name: impl Into<String>) -> Self {
        self.outputs
            .insert(slot.into(), StrategyOutput::Leaf(name.into()));
        self
    }

    /// Builder: feed `slot` into a nested node.
    pub fn child(mut self, slot: impl Into<String>, node: StrategyNode) -> Self {
        self.outputs
            .insert(slot.into(), StrategyOutput::Node(Box::new(node)));
        self
    }

    /// Slot names this node expects its model to produce.
    pub fn declared_slots(&self) -> BTreeSet<&str> {
        self.outputs.keys().map(String::as_str).collect()
    }

    /// Final stem names produced by this subtree, depth-first.
    pub fn leaf_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_leaves(&mut names);
        names
    }

    fn collect_leaves(&self, names: &mut Vec<String>) {
        for output in self.outputs.values() {
            match output {
                StrategyOutput::Leaf(name) => names.push(name.clone()),
                StrategyOutput::Node(child) => child.collect_leaves(names),
            }
        }
    }

    /// Number of separation steps (nodes) in this subtree.
    pub fn step_count(&self) -> usize {
        1 + self
            .outputs
            .values()
            .map(|out| match out {
                StrategyOutput::Leaf(_) => 0,
                StrategyOutput::Node(child) => child.step_count(),
            })
            .sum::<usize>()
    }
}

/// A named strategy tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub name: String,
    pub root: StrategyNode,
}

impl Strategy {
    pub fn new(name: impl Into<String>, root: StrategyNode) -> Self {
        Self {
            name: name.into(),
            root,
        }
    }

    /// Final stem names, sorted.
    pub fn final_stems(&self) -> BTreeSet<String> {
        self.root.leaf_names().into_iter().collect()
    }

    /// Structural checks that need no model or file access.
    ///
    /// Every node must declare at least one output, model and slot names
    /// must be non-empty, and final stem names must be unique across the
    /// tree.
    pub fn validate(&self) -> Result<()> {
        validate_node(&self.name, &self.root)?;

        let leaves = self.root.leaf_names();
        let mut seen = BTreeSet::new();
        for name in &leaves {
            if name.trim().is_empty() {
                return Err(StemforgeError::config(format!(
                    "strategy '{}' has an empty final stem name",
                    self.name
                )));
            }
            if !seen.insert(name.as_str()) {
                return Err(StemforgeError::config(format!(
                    "strategy '{}' produces final stem '{}' more than once",
                    self.name, name
                )));
            }
        }
        Ok(())
    }
}

fn validate_node(strategy: &str, node: &StrategyNode) -> Result<()> {
    if node.model.trim().is_empty() {
        return Err(StemforgeError::config(format!(
            "strategy '{}' has a node without a model",
            strategy
        )));
    }
    if node.outputs.is_empty() {
        return Err(StemforgeError::config(format!(
            "strategy '{}': model '{}' declares no outputs",
            strategy, node.model
        )));
    }
    for (slot, output) in &node.outputs {
        if slot.trim().is_empty() {
            return Err(StemforgeError::config(format!(
                "strategy '{}': model '{}' has an empty slot name",
                strategy, node.model
            )));
        }
        if let StrategyOutput::Node(child) = output {
            validate_node(strategy, child)?;
        }
    }
    Ok(())
}
