//! Error types for the orchestration domain.
//!
//! Kinds 1-4 are raised synchronously from the configuration API
//! (registration and inspection); the remaining kinds surface from `run`
//! and the output lookups. Nothing is retried automatically.

use sluice_core::{FactoryClass, Producer, TypeToken};

use crate::factory::{FactoryError, LifecyclePhase};

/// The result type used throughout sluice-flow.
///
/// The defaulted error parameter lets factory implementations spell their
/// lifecycle signatures as `Result<(), FactoryError>`.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors that can occur in pipeline orchestration.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A factory's declared slots are malformed.
    #[error("descriptor error in {factory}: {message}")]
    Descriptor {
        /// The factory whose declaration is invalid.
        factory: FactoryClass,
        /// Description of the invalid declaration.
        message: String,
    },

    /// A non-optional input slot has no matching delivery.
    #[error(
        "unsatisfied input: slot {token} (id '{delivery_id}', producer {producer}) \
         of consumer {consumer} has no matching delivery"
    )]
    UnsatisfiedInput {
        /// The slot's declared payload type.
        token: TypeToken,
        /// The slot's declared delivery id.
        delivery_id: String,
        /// The slot's producer hint.
        producer: Producer,
        /// The consuming factory class.
        consumer: FactoryClass,
    },

    /// Multiple deliveries match a slot with equal specificity.
    #[error(
        "ambiguous delivery: {candidates} candidates match slot {token} \
         (id '{delivery_id}') of consumer {consumer}"
    )]
    AmbiguousDelivery {
        /// The slot's declared payload type.
        token: TypeToken,
        /// The slot's declared delivery id.
        delivery_id: String,
        /// The consuming factory class.
        consumer: FactoryClass,
        /// How many candidates matched.
        candidates: usize,
    },

    /// The same envelope was registered twice.
    #[error("duplicate delivery: {token} (id '{delivery_id}', producer {producer})")]
    DuplicateDelivery {
        /// The duplicated payload type.
        token: TypeToken,
        /// The duplicated delivery id.
        delivery_id: String,
        /// The duplicated producer.
        producer: Producer,
    },

    /// A factory's lifecycle raised during `run`.
    #[error("factory {factory} failed in {phase} (stage {stage_id}): {source}")]
    FactoryFailed {
        /// The stage the factory belongs to.
        stage_id: usize,
        /// The failing factory class.
        factory: FactoryClass,
        /// The lifecycle phase that raised.
        phase: LifecyclePhase,
        /// The user error.
        #[source]
        source: FactoryError,
    },

    /// No delivery was produced by the named factory.
    #[error("no output found for factory {factory}")]
    OutputNotFound {
        /// The factory whose output was looked up.
        factory: FactoryClass,
    },

    /// No delivery of the requested type exists in the registry.
    #[error("no delivery found for type {token}")]
    DeliveryNotFound {
        /// The requested payload type.
        token: TypeToken,
    },

    /// An invalid pipeline state transition was attempted.
    #[error("invalid state transition: {from} -> {to} ({reason})")]
    InvalidStateTransition {
        /// The current state.
        from: String,
        /// The attempted target state.
        to: String,
        /// The reason the transition is invalid.
        reason: String,
    },

    /// A cycle was detected in the dependency graph.
    #[error("cycle detected in dependency graph: {cycle:?}")]
    CycleDetected {
        /// The cycle path (node identifiers).
        cycle: Vec<String>,
    },

    /// A DAG node was not found (internal graph operation error).
    #[error("DAG node not found: {node}")]
    DagNodeNotFound {
        /// The node identifier (index or value).
        node: String,
    },

    /// An optimizer rewrite violated the plan's topological constraints.
    #[error("optimizer violation: {message}")]
    OptimizerViolation {
        /// Description of the violated constraint.
        message: String,
    },

    /// The run was cancelled cooperatively.
    #[error("run cancelled")]
    Cancelled,

    /// The delivery registry failed.
    #[error("registry error: {message}")]
    Registry {
        /// Description of the registry failure.
        message: String,
    },

    /// An error from sluice-core.
    #[error("core error: {0}")]
    Core(#[from] sluice_core::Error),
}

impl Error {
    /// Creates a new registry error.
    #[must_use]
    pub fn registry(message: impl Into<String>) -> Self {
        Self::Registry {
            message: message.into(),
        }
    }

    /// Creates a new descriptor error for the given factory.
    #[must_use]
    pub fn descriptor(factory: FactoryClass, message: impl Into<String>) -> Self {
        Self::Descriptor {
            factory,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SomeFactory;

    #[test]
    fn unsatisfied_input_names_the_slot() {
        let err = Error::UnsatisfiedInput {
            token: TypeToken::of::<String>(),
            delivery_id: "raw".into(),
            producer: Producer::External,
            consumer: FactoryClass::of::<SomeFactory>(),
        };
        let msg = err.to_string();
        assert!(msg.contains("String"));
        assert!(msg.contains("raw"));
        assert!(msg.contains("SomeFactory"));
    }

    #[test]
    fn ambiguous_delivery_reports_candidate_count() {
        let err = Error::AmbiguousDelivery {
            token: TypeToken::of::<String>(),
            delivery_id: String::new(),
            consumer: FactoryClass::of::<SomeFactory>(),
            candidates: 2,
        };
        assert!(err.to_string().contains("2 candidates"));
    }

    #[test]
    fn state_transition_error_display() {
        let err = Error::InvalidStateTransition {
            from: "running".into(),
            to: "building".into(),
            reason: "graph mutation during run".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("running"));
        assert!(msg.contains("graph mutation"));
    }

    #[test]
    fn factory_failure_preserves_source() {
        use std::error::Error as StdError;

        let source: FactoryError = "connection refused".into();
        let err = Error::FactoryFailed {
            stage_id: 1,
            factory: FactoryClass::of::<SomeFactory>(),
            phase: LifecyclePhase::Read,
            source,
        };
        assert!(err.to_string().contains("stage 1"));
        assert!(StdError::source(&err).is_some());
    }
}
