//! Greedy DAG extraction over a serialized e-graph.
//!
//! Churchroad programs are egglog programs; once egglog has run one, the
//! resulting e-graph is serialized as JSON (`nodes` keyed by node id, each with
//! an `op`, `children`, owning `eclass` and `cost`). This module reads that
//! format and picks one e-node per e-class.
//!
//! Costs are accumulated per e-class rather than per tree, so a class shared
//! by several parents is only paid for once. The extractor sweeps every node
//! until no class improves:
//!
//! - a node is skipped while any child class has no cost yet
//! - a node is skipped if a child's cost set already contains the node's own
//!   class, which would close a cycle
//! - a class takes the node whose cost set total is strictly lower

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Identifier of an e-class
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassId(String);

impl ClassId {
    /// Borrow the identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ClassId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ClassId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of an e-node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Borrow the identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn default_cost() -> f64 {
    1.0
}

/// One e-node of a serialized e-graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ENode {
    /// Operator name
    pub op: String,
    /// Child e-nodes; each stands for the class that owns it
    #[serde(default)]
    pub children: Vec<NodeId>,
    /// Owning e-class
    pub eclass: ClassId,
    /// Cost of this node alone
    #[serde(default = "default_cost")]
    pub cost: f64,
}

impl ENode {
    /// Create a node with the default cost of 1
    pub fn new(op: impl Into<String>, eclass: impl Into<ClassId>) -> Self {
        Self {
            op: op.into(),
            children: Vec::new(),
            eclass: eclass.into(),
            cost: default_cost(),
        }
    }

    /// Set the children
    pub fn with_children<I, N>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<NodeId>,
    {
        self.children = children.into_iter().map(Into::into).collect();
        self
    }

    /// Set the cost
    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }
}

/// Errors raised while reading or extracting an e-graph
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// The JSON document is not a serialized e-graph
    #[error("Invalid e-graph JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// A node names a child that is not in the graph
    #[error("Node {node} references unknown child {child}")]
    UnknownChild {
        /// Referencing node
        node: NodeId,
        /// Missing child
        child: NodeId,
    },

    /// A node cost is NaN, infinite or negative
    #[error("Node {node} has invalid cost {cost}")]
    InvalidCost {
        /// Offending node
        node: NodeId,
        /// Its cost
        cost: f64,
    },
}

/// A serialized e-graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SerializedEGraph {
    /// Nodes in insertion order
    pub nodes: IndexMap<NodeId, ENode>,
    /// Classes the program asked to keep
    #[serde(default)]
    pub root_eclasses: Vec<ClassId>,
}

impl SerializedEGraph {
    /// Create an empty e-graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the JSON serialization and validate it
    pub fn from_json_str(json: &str) -> Result<Self, ExtractError> {
        let egraph: Self = serde_json::from_str(json)?;
        egraph.validate()?;
        Ok(egraph)
    }

    /// Add or replace a node
    pub fn add_node(&mut self, id: impl Into<NodeId>, node: ENode) {
        self.nodes.insert(id.into(), node);
    }

    /// Class owning the given node
    pub fn class_of(&self, node: &NodeId) -> Option<&ClassId> {
        self.nodes.get(node).map(|n| &n.eclass)
    }

    /// Classes in order of first appearance
    pub fn classes(&self) -> Vec<&ClassId> {
        self.nodes
            .values()
            .map(|node| &node.eclass)
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect()
    }

    /// Check every child exists and every cost is a finite, non-negative number
    pub fn validate(&self) -> Result<(), ExtractError> {
        for (id, node) in &self.nodes {
            if !node.cost.is_finite() || node.cost < 0.0 {
                return Err(ExtractError::InvalidCost {
                    node: id.clone(),
                    cost: node.cost,
                });
            }
            if let Some(child) = node.children.iter().find(|c| !self.nodes.contains_key(*c)) {
                return Err(ExtractError::UnknownChild {
                    node: id.clone(),
                    child: child.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Chosen node per class with the DAG cost of each choice
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    /// Chosen node per extractable class, in class order
    pub choices: IndexMap<ClassId, NodeId>,
    /// Total DAG cost of each chosen class
    pub costs: IndexMap<ClassId, f64>,
    /// Sweeps over the node list until the fixed point
    pub iterations: usize,
}

impl Extraction {
    /// Node chosen for a class
    pub fn choice(&self, class: &ClassId) -> Option<&NodeId> {
        self.choices.get(class)
    }

    /// DAG cost of a class
    pub fn cost(&self, class: &ClassId) -> Option<f64> {
        self.costs.get(class).copied()
    }
}

struct CostSet {
    costs: HashMap<ClassId, f64>,
    total: f64,
    choice: NodeId,
}

/// Greedy extractor that counts shared classes once
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyDagExtractor;

impl GreedyDagExtractor {
    /// Pick one node per class
    ///
    /// Classes whose every node depends on a cycle or an unextractable class
    /// are left out of the result.
    pub fn extract(&self, egraph: &SerializedEGraph) -> Result<Extraction, ExtractError> {
        egraph.validate()?;

        let mut sets: HashMap<ClassId, CostSet> = HashMap::with_capacity(egraph.nodes.len());
        let mut iterations = 0;
        let mut keep_going = true;

        while keep_going {
            iterations += 1;
            keep_going = false;

            'nodes: for (node_id, node) in &egraph.nodes {
                let class = &node.eclass;
                let mut costs = HashMap::new();

                for child in &node.children {
                    let Some(child_class) = egraph.class_of(child) else {
                        continue 'nodes;
                    };
                    let Some(child_set) = sets.get(child_class) else {
                        continue 'nodes;
                    };
                    if child_set.costs.contains_key(class) {
                        continue 'nodes;
                    }
                    costs.extend(child_set.costs.iter().map(|(c, v)| (c.clone(), *v)));
                }

                costs.insert(class.clone(), node.cost);
                let total: f64 = costs.values().sum();

                let improves = sets.get(class).map_or(true, |old| total < old.total);
                if improves {
                    sets.insert(
                        class.clone(),
                        CostSet {
                            costs,
                            total,
                            choice: node_id.clone(),
                        },
                    );
                    keep_going = true;
                }
            }
        }

        debug!(
            iterations,
            classes = sets.len(),
            nodes = egraph.nodes.len(),
            "Extracted e-graph"
        );

        let mut extraction = Extraction {
            iterations,
            ..Extraction::default()
        };
        for class in egraph.classes() {
            if let Some(set) = sets.remove(class) {
                extraction.costs.insert(class.clone(), set.total);
                extraction.choices.insert(class.clone(), set.choice);
            }
        }
        Ok(extraction)
    }
}
