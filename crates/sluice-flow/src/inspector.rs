//! Pre-run validation and plan construction.
//!
//! The inspector walks the stage list in order, maintaining the set of
//! deliveries that will be available before each stage: the externally
//! seeded envelopes plus the declared outputs of every earlier node. Each
//! non-optional slot must resolve to exactly one candidate under the
//! matching rule; a consumer-scoped candidate is strictly preferred over
//! any-consumer candidates, and any remaining tie fails inspection.
//!
//! Inspection is pure: the same stages and seeds always produce an equal
//! [`ExecutionPlan`], so re-inspection after a no-op is idempotent.

use tracing::debug;

use sluice_core::{Delivery, FactoryClass, Producer, TypeToken};

use crate::error::{Error, Result};
use crate::factory::SlotDescriptor;
use crate::plan::{Edge, EdgeSource, ExecutionPlan, Node, NodeId};
use crate::stage::Stage;

/// Builds and validates the execution plan for a stage list.
#[derive(Debug, Default)]
pub struct PipelineInspector;

/// A delivery the inspector predicts will exist before some stage.
struct Candidate {
    token: TypeToken,
    delivery_id: String,
    producer: Producer,
    consumers: Vec<FactoryClass>,
    source: EdgeSource,
}

impl Candidate {
    /// The slot matching rule over predicted metadata.
    fn matches(&self, slot: &SlotDescriptor) -> bool {
        self.token == slot.token
            && self.delivery_id == slot.delivery_id
            && (slot.producer.is_external() || self.producer == slot.producer)
            && (self.consumers.is_empty() || self.consumers.contains(&slot.consumer))
    }

    fn is_scoped_to(&self, consumer: FactoryClass) -> bool {
        !self.consumers.is_empty() && self.consumers.contains(&consumer)
    }
}

impl PipelineInspector {
    /// Creates a new inspector.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Builds the plan for `stages`, given the dispatcher's currently
    /// seeded deliveries.
    ///
    /// Only externally-produced envelopes participate: outputs left in the
    /// registry by an earlier run are re-predicted from the stage list
    /// itself.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsatisfiedInput`] if a non-optional slot has no
    /// candidate, or [`Error::AmbiguousDelivery`] if more than one
    /// candidate matches and consumer-set specificity does not strictly
    /// prefer exactly one.
    pub fn inspect(&self, stages: &[Stage], seeds: &[Delivery]) -> Result<ExecutionPlan> {
        let mut available: Vec<Candidate> = seeds
            .iter()
            .filter(|delivery| delivery.producer().is_external())
            .map(|delivery| Candidate {
                token: delivery.token(),
                delivery_id: delivery.delivery_id().to_string(),
                producer: delivery.producer(),
                consumers: delivery.consumers().to_vec(),
                source: EdgeSource::External,
            })
            .collect();

        let mut nodes = Vec::new();
        let mut edges = Vec::new();

        for (stage_id, stage) in stages.iter().enumerate() {
            let stage_start = nodes.len();

            for factory in stage.factories() {
                let id = NodeId(nodes.len());
                let descriptor = factory.descriptor().clone();

                for (slot_index, slot) in descriptor.inputs.iter().enumerate() {
                    match Self::resolve(&available, slot)? {
                        Some(source) => {
                            debug!(
                                node = %id,
                                slot = slot_index,
                                token = %slot.token,
                                from = %source,
                                "slot bound"
                            );
                            edges.push(Edge {
                                from: source,
                                to: id,
                                slot: slot_index,
                                token: slot.token,
                                delivery_id: slot.delivery_id.clone(),
                            });
                        }
                        None => {
                            debug!(
                                node = %id,
                                slot = slot_index,
                                token = %slot.token,
                                "optional slot left unbound"
                            );
                        }
                    }
                }

                nodes.push(Node {
                    id,
                    stage_id,
                    descriptor,
                });
            }

            // Outputs of this stage become available to later stages only.
            for node in &nodes[stage_start..] {
                available.push(Candidate {
                    token: node.descriptor.output_token,
                    delivery_id: node.descriptor.output_delivery_id.clone(),
                    producer: Producer::Factory(node.descriptor.class),
                    consumers: node.descriptor.output_consumers.clone(),
                    source: EdgeSource::Node(node.id),
                });
            }

            debug!(stage_id, available = available.len(), "stage inspected");
        }

        Ok(ExecutionPlan::new(nodes, edges))
    }

    /// Resolves a slot against the available set.
    ///
    /// Returns `Ok(None)` for an unmatched optional slot.
    fn resolve(available: &[Candidate], slot: &SlotDescriptor) -> Result<Option<EdgeSource>> {
        let matches: Vec<&Candidate> = available
            .iter()
            .filter(|candidate| candidate.matches(slot))
            .collect();

        match matches.as_slice() {
            [] if slot.optional => Ok(None),
            [] => Err(Error::UnsatisfiedInput {
                token: slot.token,
                delivery_id: slot.delivery_id.clone(),
                producer: slot.producer,
                consumer: slot.consumer,
            }),
            [only] => Ok(Some(only.source)),
            _ => {
                let scoped: Vec<&&Candidate> = matches
                    .iter()
                    .filter(|candidate| candidate.is_scoped_to(slot.consumer))
                    .collect();
                if let [preferred] = scoped.as_slice() {
                    return Ok(Some(preferred.source));
                }
                Err(Error::AmbiguousDelivery {
                    token: slot.token,
                    delivery_id: slot.delivery_id.clone(),
                    consumer: slot.consumer,
                    candidates: matches.len(),
                })
            }
        }
    }
}
