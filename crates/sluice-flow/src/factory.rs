//! The factory contract and its reflected descriptor.
//!
//! A factory is the user-supplied transformation unit. It declares:
//!
//! - its typed output, through the [`Factory::Output`] associated type;
//! - its typed inputs, as a list of [`SlotSpec`]s returned by
//!   [`Factory::slots`].
//!
//! Slots come in two equivalent declaration forms: [`SlotSpec::field`]
//! assigns the payload straight into a field, [`SlotSpec::setter`] routes it
//! through a single-argument setter. Both carry the same routing metadata
//! (delivery id, producer hint, `optional`, `auto_load`); they differ only
//! in the assignment strategy.
//!
//! Registration wraps the factory in an erased handle and derives a
//! [`FactoryDescriptor`] exactly once per instance; the descriptor is what
//! the inspector and the plan operate on.

use std::time::{Duration, Instant};

use sluice_core::{FactoryClass, Payload, Producer, TypeToken};

use crate::error::{Error, Result};

/// The error type user lifecycle methods fail with.
pub type FactoryError = Box<dyn std::error::Error + Send + Sync>;

/// A user-supplied transformation unit.
///
/// The lifecycle is `read -> process -> write -> get`; `read` and `write`
/// default to no-ops for purely computational factories. Only these three
/// lifecycle methods may block or perform I/O.
pub trait Factory: Send + 'static {
    /// The value this factory produces.
    type Output: Clone + Send + Sync + 'static;

    /// Declares the factory's input slots.
    ///
    /// Called once at registration; the returned specs are cached for the
    /// lifetime of the pipeline.
    fn slots(&self) -> Vec<SlotSpec<Self>>
    where
        Self: Sized,
    {
        Vec::new()
    }

    /// Acquires external data.
    ///
    /// # Errors
    ///
    /// Returns any error raised by the acquisition.
    fn read(&mut self) -> std::result::Result<(), FactoryError> {
        Ok(())
    }

    /// Transforms the factory's inputs into its output.
    ///
    /// # Errors
    ///
    /// Returns any error raised by the transformation.
    fn process(&mut self) -> std::result::Result<(), FactoryError>;

    /// Persists side effects.
    ///
    /// # Errors
    ///
    /// Returns any error raised by persistence.
    fn write(&mut self) -> std::result::Result<(), FactoryError> {
        Ok(())
    }

    /// Yields the produced value.
    ///
    /// Called after `write` returns; the result is re-published as a new
    /// delivery under this factory's class.
    fn get(&self) -> Self::Output;

    /// The delivery id attached to this factory's output (default: empty).
    fn output_delivery_id(&self) -> String {
        String::new()
    }

    /// The consumer scope attached to this factory's output.
    ///
    /// An empty list means any downstream factory may receive it.
    fn output_consumers(&self) -> Vec<FactoryClass> {
        Vec::new()
    }
}

/// The lifecycle phase a factory failure occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    /// The `read` phase.
    Read,
    /// The `process` phase.
    Process,
    /// The `write` phase.
    Write,
}

impl std::fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Process => write!(f, "process"),
            Self::Write => write!(f, "write"),
        }
    }
}

type Assigner<F> = Box<dyn Fn(&mut F, &Payload) -> Result<()> + Send + Sync>;

/// A declared input slot on a factory of type `F`.
///
/// Carries the reified slot type, routing metadata, and the assignment
/// closure that writes a matched payload into the factory instance.
pub struct SlotSpec<F: ?Sized> {
    token: TypeToken,
    delivery_id: String,
    producer: Producer,
    optional: bool,
    auto_load: bool,
    assign: Assigner<F>,
}

impl<F: 'static> SlotSpec<F> {
    /// Declares a field-form slot: the payload is cloned straight into the
    /// field returned by `accessor`.
    #[must_use]
    pub fn field<T, A>(accessor: A) -> Self
    where
        T: Clone + Send + Sync + 'static,
        A: Fn(&mut F) -> &mut T + Send + Sync + 'static,
    {
        Self {
            token: TypeToken::of::<T>(),
            delivery_id: String::new(),
            producer: Producer::External,
            optional: false,
            auto_load: false,
            assign: Box::new(move |factory, payload| {
                *accessor(factory) = downcast_payload::<T>(payload)?;
                Ok(())
            }),
        }
    }

    /// Declares a setter-form slot: the payload is cloned and passed to the
    /// single-argument `setter`.
    #[must_use]
    pub fn setter<T, S>(setter: S) -> Self
    where
        T: Clone + Send + Sync + 'static,
        S: Fn(&mut F, T) + Send + Sync + 'static,
    {
        Self {
            token: TypeToken::of::<T>(),
            delivery_id: String::new(),
            producer: Producer::External,
            optional: false,
            auto_load: false,
            assign: Box::new(move |factory, payload| {
                setter(factory, downcast_payload::<T>(payload)?);
                Ok(())
            }),
        }
    }

    /// Requires the matched delivery to carry this id.
    #[must_use]
    pub fn with_delivery_id(mut self, delivery_id: impl Into<String>) -> Self {
        self.delivery_id = delivery_id.into();
        self
    }

    /// Requires the matched delivery to be produced by factory class `P`.
    ///
    /// Without a hint the slot accepts any producer, external or not.
    #[must_use]
    pub fn from_producer<P: 'static>(mut self) -> Self {
        self.producer = Producer::Factory(FactoryClass::of::<P>());
        self
    }

    /// Marks the slot optional: an unmatched optional slot is skipped and
    /// the target field keeps its current value.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Marks the slot for automatic loading by a repository layer.
    ///
    /// Carried through descriptors and plan rendering; has no dispatch
    /// effect in the core.
    #[must_use]
    pub fn auto_load(mut self) -> Self {
        self.auto_load = true;
        self
    }

    /// Produces the metadata-only view of this slot for the given owner.
    fn describe(&self, consumer: FactoryClass) -> SlotDescriptor {
        SlotDescriptor {
            token: self.token,
            delivery_id: self.delivery_id.clone(),
            producer: self.producer,
            consumer,
            optional: self.optional,
            auto_load: self.auto_load,
        }
    }
}

/// Clones a payload out of its erased envelope.
fn downcast_payload<T: Clone + Send + Sync + 'static>(payload: &Payload) -> Result<T> {
    payload.downcast_ref::<T>().cloned().ok_or_else(|| {
        Error::Core(sluice_core::Error::internal(format!(
            "dispatched payload is not a {}",
            TypeToken::of::<T>()
        )))
    })
}

/// The metadata-only view of a declared input slot.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotDescriptor {
    /// The slot's declared payload type.
    pub token: TypeToken,
    /// The delivery id the slot requires (default: empty).
    pub delivery_id: String,
    /// The producer hint ([`Producer::External`] accepts any producer).
    pub producer: Producer,
    /// The owning factory's class.
    pub consumer: FactoryClass,
    /// Whether the slot may stay unmatched.
    pub optional: bool,
    /// Whether a repository layer should auto-load the slot.
    pub auto_load: bool,
}

/// The reflected view of a factory: declared inputs and declared output.
///
/// Built once per instance at registration and immutable afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct FactoryDescriptor {
    /// The factory's class identity.
    pub class: FactoryClass,
    /// The type of the value `get` yields.
    pub output_token: TypeToken,
    /// The delivery id attached to the output.
    pub output_delivery_id: String,
    /// The consumer scope attached to the output.
    pub output_consumers: Vec<FactoryClass>,
    /// The declared input slots, in declaration order.
    pub inputs: Vec<SlotDescriptor>,
}

impl FactoryDescriptor {
    /// Rejects declarations the inspector could never disambiguate.
    fn validate(&self) -> Result<()> {
        for (i, a) in self.inputs.iter().enumerate() {
            for b in &self.inputs[i + 1..] {
                if a.token == b.token
                    && a.delivery_id == b.delivery_id
                    && a.producer == b.producer
                {
                    return Err(Error::descriptor(
                        self.class,
                        format!(
                            "two slots declare the same input {} (id '{}', producer {})",
                            a.token, a.delivery_id, a.producer
                        ),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Per-phase wall time of a completed lifecycle.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LifecycleTimings {
    pub read: Duration,
    pub process: Duration,
    pub write: Duration,
}

/// A failed lifecycle, naming the phase that raised.
#[derive(Debug)]
pub(crate) struct LifecycleFailure {
    pub phase: LifecyclePhase,
    pub source: FactoryError,
}

/// Object-safe view of a registered factory.
pub(crate) trait AnyFactory: Send {
    /// The descriptor derived at registration.
    fn descriptor(&self) -> &FactoryDescriptor;

    /// Writes a payload into the slot at `index`.
    fn assign_slot(&mut self, index: usize, payload: &Payload) -> Result<()>;

    /// Drives `read -> process -> write`, timing each phase.
    fn execute(&mut self) -> std::result::Result<LifecycleTimings, LifecycleFailure>;

    /// Wraps `get()` as a shared payload.
    fn collect_output(&self) -> Payload;
}

/// The erased handle pairing a factory with its cached slots and descriptor.
pub(crate) struct FactoryHandle<F: Factory> {
    inner: F,
    slots: Vec<SlotSpec<F>>,
    descriptor: FactoryDescriptor,
}

impl<F: Factory> std::fmt::Debug for FactoryHandle<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactoryHandle")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

impl<F: Factory> FactoryHandle<F> {
    /// Wraps a factory, deriving and validating its descriptor.
    pub(crate) fn new(factory: F) -> Result<Self> {
        let class = FactoryClass::of::<F>();
        let slots = factory.slots();
        let descriptor = FactoryDescriptor {
            class,
            output_token: TypeToken::of::<F::Output>(),
            output_delivery_id: factory.output_delivery_id(),
            output_consumers: factory.output_consumers(),
            inputs: slots.iter().map(|slot| slot.describe(class)).collect(),
        };
        descriptor.validate()?;
        Ok(Self {
            inner: factory,
            slots,
            descriptor,
        })
    }
}

impl<F: Factory> AnyFactory for FactoryHandle<F> {
    fn descriptor(&self) -> &FactoryDescriptor {
        &self.descriptor
    }

    fn assign_slot(&mut self, index: usize, payload: &Payload) -> Result<()> {
        let slot = self.slots.get(index).ok_or_else(|| {
            Error::Core(sluice_core::Error::internal(format!(
                "slot index {index} out of range for {}",
                self.descriptor.class
            )))
        })?;
        (slot.assign)(&mut self.inner, payload)
    }

    fn execute(&mut self) -> std::result::Result<LifecycleTimings, LifecycleFailure> {
        let fail = |phase| move |source| LifecycleFailure { phase, source };

        let started = Instant::now();
        self.inner.read().map_err(fail(LifecyclePhase::Read))?;
        let read = started.elapsed();

        let started = Instant::now();
        self.inner.process().map_err(fail(LifecyclePhase::Process))?;
        let process = started.elapsed();

        let started = Instant::now();
        self.inner.write().map_err(fail(LifecyclePhase::Write))?;
        let write = started.elapsed();

        Ok(LifecycleTimings {
            read,
            process,
            write,
        })
    }

    fn collect_output(&self) -> Payload {
        std::sync::Arc::new(self.inner.get())
    }
}
