//! # sluice-flow
//!
//! Dependency-inferring pipeline orchestration.
//!
//! Users assemble a directed acyclic graph of transformation units
//! ("factories"), each declaring what it consumes and what it produces.
//! The orchestrator infers the wiring from those declarations:
//!
//! - **Introspection**: Each factory's declared inputs and output are
//!   reflected into a descriptor at registration
//! - **Inspection**: Before anything runs, every required input is proven
//!   to be satisfied by exactly one seeded delivery or upstream producer
//! - **Dispatch**: At run time, produced values are routed into every
//!   consumer whose declared need they satisfy
//! - **Reporting**: Each run yields a report with optional per-factory
//!   benchmark rows
//!
//! ## Example
//!
//! ```rust
//! use sluice_flow::prelude::*;
//!
//! #[derive(Default)]
//! struct Doubler {
//!     input: u32,
//!     result: u32,
//! }
//!
//! impl Factory for Doubler {
//!     type Output = u32;
//!
//!     fn slots(&self) -> Vec<SlotSpec<Self>> {
//!         vec![SlotSpec::field(|f: &mut Self| &mut f.input)]
//!     }
//!
//!     fn process(&mut self) -> Result<(), FactoryError> {
//!         self.result = self.input * 2;
//!         Ok(())
//!     }
//!
//!     fn get(&self) -> u32 {
//!         self.result
//!     }
//! }
//!
//! # fn main() -> sluice_flow::error::Result<()> {
//! let mut pipeline = Pipeline::new();
//! pipeline.set_input(21_u32)?;
//! pipeline.add_stage_of::<Doubler>()?;
//!
//! let report = pipeline.run()?;
//! assert!(report.state.is_terminal());
//! assert_eq!(*pipeline.get_output::<Doubler>()?, 42);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

// Internal modules - not exposed in public API.
pub(crate) mod dag;

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod factory;
pub mod inspector;
pub mod metrics;
pub mod optimizer;
pub mod pipeline;
pub mod plan;
pub mod report;
pub mod stage;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::PipelineConfig;
    pub use crate::dispatcher::DeliverableDispatcher;
    pub use crate::error::{Error, Result};
    pub use crate::factory::{Factory, FactoryDescriptor, FactoryError, SlotSpec};
    pub use crate::inspector::PipelineInspector;
    pub use crate::optimizer::{PipelineOptimizer, StageAssignment, StageMergeOptimizer};
    pub use crate::pipeline::{CancellationToken, Pipeline, PipelineState};
    pub use crate::plan::{Edge, EdgeSource, ExecutionPlan, Node, NodeId};
    pub use crate::report::{BenchmarkRow, RunReport, RunState};
    pub use crate::stage::Stage;
    pub use sluice_core::{Delivery, FactoryClass, Producer, TypeToken};
}
