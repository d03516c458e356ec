//! The runtime delivery registry and router.
//!
//! The dispatcher holds every delivery the pipeline has seen: seeded inputs
//! and the outputs collected after each factory finishes. Before a factory
//! runs, [`DeliverableDispatcher::dispatch`] scans the registry for each of
//! the factory's slots and assigns the best-matching payload.
//!
//! The registry is writer-exclusive during collection; dispatch and lookup
//! take a shared lock.

use std::sync::{PoisonError, RwLock};

use tracing::{debug, warn};

use sluice_core::{Delivery, FactoryClass, Producer, TypeToken};

use crate::error::{Error, Result};
use crate::factory::{AnyFactory, SlotDescriptor};
use crate::metrics::FlowMetrics;

/// Converts a lock poison error to a registry error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::registry("delivery registry lock poisoned")
}

/// Registry of deliveries, scanned with the slot matching rule.
#[derive(Debug, Default)]
pub struct DeliverableDispatcher {
    registry: RwLock<Vec<Delivery>>,
    metrics: FlowMetrics,
}

impl DeliverableDispatcher {
    /// Creates a new empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: RwLock::new(Vec::new()),
            metrics: FlowMetrics::new(),
        }
    }

    /// Appends a delivery to the registry.
    ///
    /// Re-registering the same envelope around the same payload allocation
    /// is rejected; callers may replace by removing first. Distinct
    /// payloads under equal envelopes coexist and the newest wins in
    /// matching.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateDelivery`] on a duplicate.
    pub fn add_deliverable(&self, delivery: Delivery) -> Result<()> {
        let mut registry = self.registry.write().map_err(poison_err)?;
        if registry.iter().any(|held| held.is_duplicate_of(&delivery)) {
            return Err(Error::DuplicateDelivery {
                token: delivery.token(),
                delivery_id: delivery.delivery_id().to_string(),
                producer: delivery.producer(),
            });
        }
        debug!(delivery = ?delivery, "delivery registered");
        registry.push(delivery);
        self.metrics.set_registry_depth(registry.len());
        Ok(())
    }

    /// Removes a previously registered delivery.
    ///
    /// Returns true if the exact envelope (and payload allocation) was
    /// found and removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry lock is poisoned.
    pub fn remove_deliverable(&self, delivery: &Delivery) -> Result<bool> {
        let mut registry = self.registry.write().map_err(poison_err)?;
        let before = registry.len();
        registry.retain(|held| !held.is_duplicate_of(delivery));
        let removed = registry.len() < before;
        self.metrics.set_registry_depth(registry.len());
        Ok(removed)
    }

    /// Assigns the best-matching delivery into each of the factory's slots.
    ///
    /// Missing optional slots are skipped. A consumer-scoped match is
    /// preferred over any-consumer matches; among equal-specificity matches
    /// the most recently registered wins (and a warning is logged, since
    /// inspection rejects that situation up front).
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsatisfiedInput`] if a required slot has no match.
    pub(crate) fn dispatch(&self, factory: &mut dyn AnyFactory) -> Result<()> {
        let descriptor = factory.descriptor();
        let class = descriptor.class;
        let slots = descriptor.inputs.clone();

        let mut assignments = Vec::new();
        {
            let registry = self.registry.read().map_err(poison_err)?;
            for (index, slot) in slots.iter().enumerate() {
                match Self::best_match(&registry, slot)? {
                    Some(delivery) => assignments.push((index, delivery.payload())),
                    None => {
                        debug!(factory = %class, slot = index, "optional slot skipped");
                    }
                }
            }
        }

        for (index, payload) in assignments {
            factory.assign_slot(index, &payload)?;
        }
        self.metrics.record_dispatch(&class.short_name());
        Ok(())
    }

    /// Wraps the factory's output as a new delivery and registers it.
    ///
    /// The output keeps the factory's declared delivery id and consumer
    /// scope, with the factory's class as producer. Older deliveries of the
    /// same type are never overwritten.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateDelivery`] if the exact envelope is
    /// already registered.
    pub(crate) fn collect_deliverable(&self, factory: &dyn AnyFactory) -> Result<()> {
        let descriptor = factory.descriptor();
        let delivery = Delivery::from_payload(factory.collect_output(), descriptor.output_token)
            .with_delivery_id(descriptor.output_delivery_id.clone())
            .with_producer(Producer::Factory(descriptor.class))
            .with_consumers(descriptor.output_consumers.clone());
        self.add_deliverable(delivery)?;
        self.metrics.record_collect(&descriptor.class.short_name());
        Ok(())
    }

    /// Returns every delivery whose payload type matches `token`.
    ///
    /// The consumer scope constrains dispatch but not retrieval, so scoped
    /// deliveries are included. An empty result is valid.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry lock is poisoned.
    pub fn find_deliverables_by_type(&self, token: TypeToken) -> Result<Vec<Delivery>> {
        let registry = self.registry.read().map_err(poison_err)?;
        Ok(registry
            .iter()
            .filter(|delivery| delivery.token() == token)
            .cloned()
            .collect())
    }

    /// Returns every delivery produced by the given factory class.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry lock is poisoned.
    pub fn find_deliverables_by_producer(&self, producer: FactoryClass) -> Result<Vec<Delivery>> {
        let registry = self.registry.read().map_err(poison_err)?;
        Ok(registry
            .iter()
            .filter(|delivery| delivery.producer() == Producer::Factory(producer))
            .cloned()
            .collect())
    }

    /// Returns a snapshot of the full registry in registration order.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry lock is poisoned.
    pub fn deliveries(&self) -> Result<Vec<Delivery>> {
        let registry = self.registry.read().map_err(poison_err)?;
        Ok(registry.clone())
    }

    /// Returns the number of registered deliveries.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry lock is poisoned.
    pub fn len(&self) -> Result<usize> {
        let registry = self.registry.read().map_err(poison_err)?;
        Ok(registry.len())
    }

    /// Returns true if no deliveries are registered.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry lock is poisoned.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Picks the best match for a slot, or `None` for an unmatched
    /// optional slot.
    fn best_match<'a>(
        registry: &'a [Delivery],
        slot: &SlotDescriptor,
    ) -> Result<Option<&'a Delivery>> {
        let matches: Vec<&Delivery> = registry
            .iter()
            .filter(|delivery| {
                delivery.matches_slot(
                    slot.token,
                    &slot.delivery_id,
                    slot.producer,
                    slot.consumer,
                )
            })
            .collect();

        if matches.is_empty() {
            if slot.optional {
                return Ok(None);
            }
            return Err(Error::UnsatisfiedInput {
                token: slot.token,
                delivery_id: slot.delivery_id.clone(),
                producer: slot.producer,
                consumer: slot.consumer,
            });
        }

        let scoped: Vec<&&Delivery> = matches
            .iter()
            .filter(|delivery| delivery.is_scoped_to(slot.consumer))
            .collect();
        let pool: Vec<&Delivery> = if scoped.is_empty() {
            matches
        } else {
            scoped.into_iter().copied().collect()
        };

        if pool.len() > 1 {
            warn!(
                token = %slot.token,
                consumer = %slot.consumer,
                candidates = pool.len(),
                "ambiguous dispatch, picking most recently registered"
            );
        }
        // Registration order makes the last entry the newest.
        Ok(pool.last().copied())
    }
}
