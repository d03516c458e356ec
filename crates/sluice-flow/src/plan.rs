//! The validated execution plan.
//!
//! A plan is the inspector's output: one [`Node`] per registered factory,
//! partitioned by stage, and one [`Edge`] per satisfied input slot. Plans
//! are:
//!
//! - **Deterministic**: Same stages and seeds always produce the same plan
//! - **Comparable**: Re-inspection without mutation yields an equal plan
//! - **Explainable**: Every binding names its producer, slot, and type

use std::fmt;

use sluice_core::TypeToken;

use crate::dag::Dag;
use crate::error::Result;
use crate::factory::FactoryDescriptor;

/// Identifier of a node within a plan (its global registration index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Returns the node's global index.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// One factory instance in the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// The node's identifier.
    pub id: NodeId,
    /// The 0-based index of the containing stage.
    pub stage_id: usize,
    /// The factory's reflected descriptor.
    pub descriptor: FactoryDescriptor,
}

/// The origin side of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeSource {
    /// A pipeline-level seeded delivery.
    External,
    /// The output of an upstream node.
    Node(NodeId),
}

impl fmt::Display for EdgeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::External => write!(f, "external"),
            Self::Node(id) => write!(f, "{id}"),
        }
    }
}

/// A satisfied input-slot binding.
///
/// An edge exists iff the producer's output exactly matches the consumer's
/// slot under the delivery matching rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    /// Where the payload comes from.
    pub from: EdgeSource,
    /// The consuming node.
    pub to: NodeId,
    /// The consuming slot's declaration index.
    pub slot: usize,
    /// The payload type flowing along the edge.
    pub token: TypeToken,
    /// The delivery id flowing along the edge.
    pub delivery_id: String,
}

/// A validated execution plan: nodes partitioned by stage plus the edges
/// that satisfy every non-optional slot.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExecutionPlan {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

impl ExecutionPlan {
    /// Assembles a plan from its parts.
    #[must_use]
    pub(crate) fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self { nodes, edges }
    }

    /// Returns the plan's nodes in registration order.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Returns the plan's edges.
    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Returns the number of nodes in the plan.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the plan has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the number of stages the plan spans.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.nodes
            .last()
            .map_or(0, |node| node.stage_id + 1)
    }

    /// Returns the stage a node belongs to.
    ///
    /// # Errors
    ///
    /// Returns an error if the node id is not part of this plan.
    pub fn stage_of(&self, id: NodeId) -> Result<usize> {
        self.nodes
            .get(id.0)
            .map(|node| node.stage_id)
            .ok_or_else(|| crate::error::Error::DagNodeNotFound {
                node: id.to_string(),
            })
    }

    /// Builds the dependency [`Dag`] induced by the plan's node edges.
    ///
    /// External edges carry no ordering constraint and are skipped.
    pub(crate) fn dependency_dag(&self) -> Result<Dag<NodeId>> {
        let mut dag = Dag::new();
        for node in &self.nodes {
            dag.add_node(node.id);
        }
        for edge in &self.edges {
            if let EdgeSource::Node(from) = edge.from {
                let from_idx = dag.get_index(&from).ok_or_else(|| {
                    crate::error::Error::DagNodeNotFound {
                        node: from.to_string(),
                    }
                })?;
                let to_idx = dag.get_index(&edge.to).ok_or_else(|| {
                    crate::error::Error::DagNodeNotFound {
                        node: edge.to.to_string(),
                    }
                })?;
                dag.add_edge(from_idx, to_idx)?;
            }
        }
        Ok(dag)
    }

    /// Validates the plan's structural invariants.
    ///
    /// Stage ordering makes cycles impossible by construction; this guards
    /// against a misbehaving optimizer handing back an inconsistent stage
    /// assignment.
    ///
    /// # Errors
    ///
    /// Returns an error if an inter-node edge does not point from a
    /// strictly earlier stage, or if the induced graph has a cycle.
    pub(crate) fn validate(&self) -> Result<()> {
        for edge in &self.edges {
            if let EdgeSource::Node(from) = edge.from {
                let from_stage = self.stage_of(from)?;
                let to_stage = self.stage_of(edge.to)?;
                if from_stage >= to_stage {
                    return Err(crate::error::Error::OptimizerViolation {
                        message: format!(
                            "edge {from} -> {} points from stage {from_stage} \
                             to stage {to_stage}",
                            edge.to
                        ),
                    });
                }
            }
        }
        self.dependency_dag()?.toposort()?;
        Ok(())
    }

    /// Asserts that every non-optional slot is covered by an edge.
    ///
    /// Inspection guarantees this; the run loop re-checks it before any
    /// factory executes.
    pub(crate) fn assert_covered(&self) -> Result<()> {
        for node in &self.nodes {
            for (slot_index, slot) in node.descriptor.inputs.iter().enumerate() {
                if slot.optional {
                    continue;
                }
                let covered = self
                    .edges
                    .iter()
                    .any(|edge| edge.to == node.id && edge.slot == slot_index);
                if !covered {
                    return Err(crate::error::Error::UnsatisfiedInput {
                        token: slot.token,
                        delivery_id: slot.delivery_id.clone(),
                        producer: slot.producer,
                        consumer: slot.consumer,
                    });
                }
            }
        }
        Ok(())
    }

    /// Renders the plan as text: one line per node, then one line per edge.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            out.push_str(&format!(
                "node {} stage={} factory={} output={}",
                node.id,
                node.stage_id,
                node.descriptor.class.short_name(),
                node.descriptor.output_token,
            ));
            if !node.descriptor.output_delivery_id.is_empty() {
                out.push_str(&format!(" id='{}'", node.descriptor.output_delivery_id));
            }
            out.push('\n');
        }
        for edge in &self.edges {
            out.push_str(&format!(
                "edge {} -> {} slot={} type={}",
                edge.from, edge.to, edge.slot, edge.token,
            ));
            if !edge.delivery_id.is_empty() {
                out.push_str(&format!(" id='{}'", edge.delivery_id));
            }
            if let Some(slot) = self
                .nodes
                .get(edge.to.0)
                .and_then(|node| node.descriptor.inputs.get(edge.slot))
            {
                if slot.auto_load {
                    out.push_str(" auto_load");
                }
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::FactoryClass;

    struct Left;
    struct Right;

    fn descriptor_of<F: 'static>(output: TypeToken) -> FactoryDescriptor {
        FactoryDescriptor {
            class: FactoryClass::of::<F>(),
            output_token: output,
            output_delivery_id: String::new(),
            output_consumers: Vec::new(),
            inputs: Vec::new(),
        }
    }

    fn two_stage_plan() -> ExecutionPlan {
        let nodes = vec![
            Node {
                id: NodeId(0),
                stage_id: 0,
                descriptor: descriptor_of::<Left>(TypeToken::of::<String>()),
            },
            Node {
                id: NodeId(1),
                stage_id: 1,
                descriptor: descriptor_of::<Right>(TypeToken::of::<u32>()),
            },
        ];
        let edges = vec![Edge {
            from: EdgeSource::Node(NodeId(0)),
            to: NodeId(1),
            slot: 0,
            token: TypeToken::of::<String>(),
            delivery_id: String::new(),
        }];
        ExecutionPlan::new(nodes, edges)
    }

    #[test]
    fn plan_accessors() {
        let plan = two_stage_plan();
        assert_eq!(plan.len(), 2);
        assert!(!plan.is_empty());
        assert_eq!(plan.stage_count(), 2);
        assert_eq!(plan.stage_of(NodeId(1)).unwrap(), 1);
        assert!(plan.stage_of(NodeId(9)).is_err());
    }

    #[test]
    fn valid_plan_passes_validation() {
        assert!(two_stage_plan().validate().is_ok());
    }

    #[test]
    fn same_stage_edge_fails_validation() {
        let mut plan = two_stage_plan();
        plan.nodes[1].stage_id = 0;
        let err = plan.validate().unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::OptimizerViolation { .. }
        ));
    }

    #[test]
    fn render_lists_nodes_then_edges() {
        let rendered = two_stage_plan().render();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("node n0 stage=0"));
        assert!(lines[1].starts_with("node n1 stage=1"));
        assert_eq!(lines[2], "edge n0 -> n1 slot=0 type=String");
    }

    #[test]
    fn plans_compare_equal_when_identical() {
        assert_eq!(two_stage_plan(), two_stage_plan());
    }
}
