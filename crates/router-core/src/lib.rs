//! Dialect-agnostic core of the router gateway: the replicated state store,
//! the entity types, the `Router` façade trait, the crosspoint subscriber
//! contract, the session-transport scaffolding, and the driver registry.
//!
//! Concrete protocol dialects (e.g. `router-proto-harrislrc`) depend on this
//! crate and supply the wire-level codec, dispatcher, and TCP wiring.

pub mod config;
pub mod entity;
pub mod error;
pub mod registry;
pub mod router;
pub mod sink;
pub mod store;
pub mod transport;

pub use entity::{Crosspoint, Destination, Level, Source};
pub use error::RouterError;
pub use registry::{DialectFactory, DriverConfig, Registry};
pub use router::Router;
pub use sink::{CrosspointSink, NullSink};
pub use store::{IdRef, StateStore};
