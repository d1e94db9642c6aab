//! The Harris LRC router-control protocol dialect.
//!
//! Implements `router_core::Router` against the line-oriented
//! `~<TYPE><OP><ARG>[;<ARG>]*\` wire format used by Harris LRC-family
//! broadcast routers.

pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod driver;

pub use config::{parse_config, HarrisLrcConfig};
pub use driver::HarrisLrcRouter;

use std::sync::Arc;

use router_core::{DriverConfig, RouterError};

/// Builds a driver from a `[[drivers]]` entry whose `type` is `"harrislrc"`.
/// Registered with `router_core::Registry::build` under that dialect name.
pub fn build_driver(cfg: &DriverConfig) -> Result<Arc<dyn router_core::Router>, RouterError> {
    let dialect_config = parse_config(&cfg.config)?;
    Ok(Arc::new(HarrisLrcRouter::new(dialect_config)))
}
