//! # sluice-core
//!
//! Core abstractions for the Sluice pipeline orchestrator.
//!
//! This crate provides the foundational types used across all Sluice
//! components:
//!
//! - **Delivery Envelope**: The typed, routable value wrapper exchanged
//!   between factories
//! - **Type Tokens**: Reified runtime types capturing generic parameters
//! - **Identifiers**: Strongly-typed run IDs
//! - **Error Types**: Shared error definitions and result types
//! - **Observability**: Logging bootstrap and span constructors
//!
//! ## Crate Boundary
//!
//! `sluice-core` is the only crate allowed to define shared primitives.
//! Connector and repository integrations interact with the orchestrator
//! exclusively through the [`delivery::Delivery`] envelope.
//!
//! ## Example
//!
//! ```rust
//! use sluice_core::prelude::*;
//!
//! let delivery = Delivery::new(String::from("id_of_product1"));
//! assert_eq!(*delivery.get::<String>().unwrap(), "id_of_product1");
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod delivery;
pub mod error;
pub mod id;
pub mod observability;
pub mod token;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use sluice_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::delivery::{Delivery, Payload};
    pub use crate::error::{Error, Result};
    pub use crate::id::RunId;
    pub use crate::token::{FactoryClass, Producer, TypeToken};
}

// Re-export key types at crate root for ergonomics
pub use delivery::{Delivery, Payload};
pub use error::{Error, Result};
pub use id::RunId;
pub use observability::{init_logging, LogFormat};
pub use token::{FactoryClass, Producer, TypeToken};
