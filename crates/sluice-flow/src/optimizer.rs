//! Stage-list rewriting.
//!
//! An optimizer may redraw stage boundaries as long as the induced edge set
//! is unchanged and every consumer stays in a strictly later stage than its
//! producers. The default implementation compacts the stage list by moving
//! each node to the earliest stage its dependencies allow, which merges
//! consecutive stages with disjoint dependency chains.

use tracing::debug;

use crate::error::{Error, Result};
use crate::plan::{EdgeSource, ExecutionPlan, NodeId};

/// A stage rewrite: the new stage id for every node in the plan, indexed by
/// the node's global index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageAssignment {
    new_stage: Vec<usize>,
}

impl StageAssignment {
    /// The identity mapping: every node keeps its current stage.
    #[must_use]
    pub fn identity(plan: &ExecutionPlan) -> Self {
        Self {
            new_stage: plan.nodes().iter().map(|node| node.stage_id).collect(),
        }
    }

    /// Builds an assignment from explicit per-node stage ids.
    #[must_use]
    pub fn new(new_stage: Vec<usize>) -> Self {
        Self { new_stage }
    }

    /// Returns the new stage of a node.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is not covered by this assignment.
    pub fn stage_of(&self, id: NodeId) -> Result<usize> {
        self.new_stage
            .get(id.index())
            .copied()
            .ok_or_else(|| Error::DagNodeNotFound {
                node: id.to_string(),
            })
    }

    /// Returns the number of stages the assignment spans.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.new_stage.iter().max().map_or(0, |max| max + 1)
    }

    /// Returns true if the assignment changes no node's stage.
    #[must_use]
    pub fn is_identity_for(&self, plan: &ExecutionPlan) -> bool {
        plan.nodes()
            .iter()
            .all(|node| self.new_stage.get(node.id.index()) == Some(&node.stage_id))
    }

    /// Checks the topological constraint: every inter-node edge must point
    /// from a strictly earlier stage.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OptimizerViolation`] if a consumer would run in the
    /// same or an earlier stage than one of its producers.
    pub fn validate(&self, plan: &ExecutionPlan) -> Result<()> {
        if self.new_stage.len() != plan.len() {
            return Err(Error::OptimizerViolation {
                message: format!(
                    "assignment covers {} nodes, plan has {}",
                    self.new_stage.len(),
                    plan.len()
                ),
            });
        }
        for edge in plan.edges() {
            if let EdgeSource::Node(from) = edge.from {
                let from_stage = self.stage_of(from)?;
                let to_stage = self.stage_of(edge.to)?;
                if from_stage >= to_stage {
                    return Err(Error::OptimizerViolation {
                        message: format!(
                            "consumer {} (stage {to_stage}) would not run after \
                             producer {from} (stage {from_stage})",
                            edge.to
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Rewrites stage boundaries while preserving the plan's edge set.
pub trait PipelineOptimizer: Send {
    /// Computes a new stage assignment for the plan.
    ///
    /// The returned assignment must keep every consumer in a strictly later
    /// stage than all of its producers; the pipeline validates this before
    /// applying the rewrite.
    ///
    /// # Errors
    ///
    /// Returns an error if the plan cannot be rewritten.
    fn optimize(&self, plan: &ExecutionPlan) -> Result<StageAssignment>;
}

/// The default optimizer: earliest-stage compaction.
///
/// Each node moves to stage `0` if it only consumes seeded deliveries, or
/// one past the latest stage among its producers otherwise. Consecutive
/// stages with disjoint dependency chains collapse into one.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageMergeOptimizer;

impl StageMergeOptimizer {
    /// Creates the optimizer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl PipelineOptimizer for StageMergeOptimizer {
    fn optimize(&self, plan: &ExecutionPlan) -> Result<StageAssignment> {
        let dag = plan.dependency_dag()?;
        let mut new_stage = vec![0_usize; plan.len()];

        for id in dag.toposort()? {
            let idx = dag.get_index(&id).ok_or_else(|| Error::DagNodeNotFound {
                node: id.to_string(),
            })?;
            let stage = dag
                .upstream(idx)?
                .into_iter()
                .map(|up| new_stage[up.index()] + 1)
                .max()
                .unwrap_or(0);
            new_stage[id.index()] = stage;
        }

        let assignment = StageAssignment::new(new_stage);
        debug!(
            stages_before = plan.stage_count(),
            stages_after = assignment.stage_count(),
            "stage compaction computed"
        );
        Ok(assignment)
    }
}
