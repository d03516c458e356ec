//! The typed delivery envelope.
//!
//! A [`Delivery`] wraps an opaque payload together with the routing metadata
//! the dispatcher matches on: the reified payload type, a short
//! disambiguating id, the producer, and an optional consumer scope.
//!
//! Payloads travel as `Arc<dyn Any + Send + Sync>` so a single produced
//! value can be shared with every matching consumer without copying.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::token::{FactoryClass, Producer, TypeToken};

/// A shared, type-erased payload.
pub type Payload = Arc<dyn Any + Send + Sync>;

/// A typed envelope carrying a payload plus routing metadata.
///
/// Envelopes are distinguishable by their `(type, delivery id, producer)`
/// triple. The consumer set constrains dispatch but never retrieval.
#[derive(Clone)]
pub struct Delivery {
    payload: Payload,
    token: TypeToken,
    delivery_id: String,
    producer: Producer,
    consumers: Vec<FactoryClass>,
}

impl Delivery {
    /// Wraps a value in an external envelope with the default id and an
    /// empty consumer set ("any consumer").
    #[must_use]
    pub fn new<T: Send + Sync + 'static>(payload: T) -> Self {
        Self {
            payload: Arc::new(payload),
            token: TypeToken::of::<T>(),
            delivery_id: String::new(),
            producer: Producer::External,
            consumers: Vec::new(),
        }
    }

    /// Builds an envelope around an already-shared payload.
    ///
    /// The token must describe the payload's concrete type; this is the
    /// entry point used when re-publishing a factory output.
    #[must_use]
    pub fn from_payload(payload: Payload, token: TypeToken) -> Self {
        Self {
            payload,
            token,
            delivery_id: String::new(),
            producer: Producer::External,
            consumers: Vec::new(),
        }
    }

    /// Restricts the envelope to the given consumers.
    ///
    /// An empty set means any consumer may receive it.
    #[must_use]
    pub fn with_consumers(mut self, consumers: Vec<FactoryClass>) -> Self {
        self.consumers = consumers;
        self
    }

    /// Scopes the envelope to a single consumer class.
    #[must_use]
    pub fn with_consumer<C: Any>(mut self) -> Self {
        self.consumers = vec![FactoryClass::of::<C>()];
        self
    }

    /// Sets the disambiguating delivery id (default: empty).
    #[must_use]
    pub fn with_delivery_id(mut self, delivery_id: impl Into<String>) -> Self {
        self.delivery_id = delivery_id.into();
        self
    }

    /// Records the producing factory class.
    #[must_use]
    pub fn with_producer(mut self, producer: Producer) -> Self {
        self.producer = producer;
        self
    }

    /// Returns the payload, downcast to the requested type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] if `T` is not the payload's type.
    pub fn get<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        Arc::clone(&self.payload)
            .downcast::<T>()
            .map_err(|_| Error::TypeMismatch {
                actual: self.token,
                requested: TypeToken::of::<T>(),
            })
    }

    /// Returns the shared type-erased payload.
    #[must_use]
    pub fn payload(&self) -> Payload {
        Arc::clone(&self.payload)
    }

    /// Returns the reified payload type.
    #[must_use]
    pub const fn token(&self) -> TypeToken {
        self.token
    }

    /// Returns the disambiguating id.
    #[must_use]
    pub fn delivery_id(&self) -> &str {
        &self.delivery_id
    }

    /// Returns the producer.
    #[must_use]
    pub const fn producer(&self) -> Producer {
        self.producer
    }

    /// Returns the consumer scope (empty means "any consumer").
    #[must_use]
    pub fn consumers(&self) -> &[FactoryClass] {
        &self.consumers
    }

    /// Evaluates the slot matching rule against this envelope.
    ///
    /// A slot `(token, delivery_id, producer_hint, consumer)` is satisfied
    /// iff the types and ids are equal, the hint is external or names this
    /// envelope's producer, and the consumer scope is empty or contains the
    /// consuming class.
    #[must_use]
    pub fn matches_slot(
        &self,
        token: TypeToken,
        delivery_id: &str,
        producer_hint: Producer,
        consumer: FactoryClass,
    ) -> bool {
        self.token == token
            && self.delivery_id == delivery_id
            && (producer_hint.is_external() || self.producer == producer_hint)
            && (self.consumers.is_empty() || self.consumers.contains(&consumer))
    }

    /// Returns true if the envelope is scoped to the given consumer.
    ///
    /// Used for tie-breaking: a consumer-scoped match is strictly preferred
    /// over an any-consumer match.
    #[must_use]
    pub fn is_scoped_to(&self, consumer: FactoryClass) -> bool {
        !self.consumers.is_empty() && self.consumers.contains(&consumer)
    }

    /// Returns true if both envelopes carry identical routing metadata.
    #[must_use]
    pub fn same_envelope(&self, other: &Self) -> bool {
        self.token == other.token
            && self.delivery_id == other.delivery_id
            && self.producer == other.producer
            && self.consumers.len() == other.consumers.len()
            && self.consumers.iter().all(|c| other.consumers.contains(c))
    }

    /// Returns true if `other` is the same envelope around the same payload
    /// allocation.
    ///
    /// Distinct payloads under equal envelopes are *not* duplicates; they
    /// coexist in the registry and inspection reports them as ambiguous.
    #[must_use]
    pub fn is_duplicate_of(&self, other: &Self) -> bool {
        self.same_envelope(other) && Arc::ptr_eq(&self.payload, &other.payload)
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("token", &self.token.short_name())
            .field("delivery_id", &self.delivery_id)
            .field("producer", &self.producer.to_string())
            .field(
                "consumers",
                &self
                    .consumers
                    .iter()
                    .map(FactoryClass::short_name)
                    .collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}
