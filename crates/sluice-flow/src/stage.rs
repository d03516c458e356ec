//! Ordered groups of factories.
//!
//! A stage runs its factories in registration order. Stages form a linear
//! total order; dependency inference only ever binds a consumer to seeded
//! deliveries or to producers in strictly earlier stages, so factories
//! within one stage never depend on each other. That guarantee is what
//! makes the `parallel` flag safe.

use crate::error::Result;
use crate::factory::{AnyFactory, Factory, FactoryDescriptor, FactoryHandle};

/// An ordered group of factories runnable without internal dependencies.
pub struct Stage {
    factories: Vec<Box<dyn AnyFactory>>,
    parallel: bool,
    /// True only on the last registered stage; maintained by the pipeline.
    pub(crate) end: bool,
}

impl Stage {
    /// Creates a new empty stage.
    #[must_use]
    pub fn new() -> Self {
        Self {
            factories: Vec::new(),
            parallel: false,
            end: true,
        }
    }

    /// Registers a factory, deriving its descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::Descriptor`] if the factory's slot
    /// declarations are invalid.
    pub fn add_factory<F: Factory>(mut self, factory: F) -> Result<Self> {
        self.factories.push(Box::new(FactoryHandle::new(factory)?));
        Ok(self)
    }

    /// Allows the stage's factories to run concurrently on a worker pool.
    #[must_use]
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Returns the number of factories in the stage.
    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Returns true if the stage has no factories.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Returns true if the stage may run its factories concurrently.
    #[must_use]
    pub const fn is_parallel(&self) -> bool {
        self.parallel
    }

    /// Returns true if this is the last registered stage.
    #[must_use]
    pub const fn is_end(&self) -> bool {
        self.end
    }

    /// Returns the descriptors of the stage's factories in order.
    #[must_use]
    pub fn descriptors(&self) -> Vec<&FactoryDescriptor> {
        self.factories.iter().map(|f| f.descriptor()).collect()
    }

    pub(crate) fn factories(&self) -> &[Box<dyn AnyFactory>] {
        &self.factories
    }

    pub(crate) fn factories_mut(&mut self) -> &mut [Box<dyn AnyFactory>] {
        &mut self.factories
    }

    pub(crate) fn into_factories(self) -> Vec<Box<dyn AnyFactory>> {
        self.factories
    }

    pub(crate) fn from_parts(factories: Vec<Box<dyn AnyFactory>>, parallel: bool) -> Self {
        Self {
            factories,
            parallel,
            end: false,
        }
    }
}

impl Default for Stage {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::FactoryError;

    #[derive(Default)]
    struct Producer1;

    impl Factory for Producer1 {
        type Output = u32;

        fn process(&mut self) -> std::result::Result<(), FactoryError> {
            Ok(())
        }

        fn get(&self) -> u32 {
            1
        }
    }

    #[derive(Default)]
    struct Producer2;

    impl Factory for Producer2 {
        type Output = u32;

        fn process(&mut self) -> std::result::Result<(), FactoryError> {
            Ok(())
        }

        fn get(&self) -> u32 {
            2
        }
    }

    #[test]
    fn factories_keep_registration_order() {
        let stage = Stage::new()
            .add_factory(Producer1)
            .unwrap()
            .add_factory(Producer2)
            .unwrap();
        assert_eq!(stage.len(), 2);
        let descriptors = stage.descriptors();
        assert_eq!(
            descriptors[0].class,
            sluice_core::FactoryClass::of::<Producer1>()
        );
        assert_eq!(
            descriptors[1].class,
            sluice_core::FactoryClass::of::<Producer2>()
        );
    }

    #[test]
    fn new_stage_defaults() {
        let stage = Stage::new();
        assert!(stage.is_empty());
        assert!(stage.is_end());
        assert!(!stage.is_parallel());
        assert!(Stage::default().is_end());
    }

    #[test]
    fn parallel_flag_is_opt_in() {
        let stage = Stage::new().parallel(true);
        assert!(stage.is_parallel());
    }
}
