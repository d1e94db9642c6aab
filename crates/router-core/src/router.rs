//! The generic driver façade every protocol dialect implements.
//!
//! Mutation methods transmit a command and return; they do not touch the
//! state store synchronously. The store only changes once the device's own
//! notification comes back around through the dispatcher, so the replica
//! always reflects device truth rather than an optimistic local guess.

use std::sync::Arc;

use async_trait::async_trait;

use crate::entity::{Crosspoint, Destination, Level, Source};
use crate::error::RouterError;
use crate::sink::CrosspointSink;

#[async_trait]
pub trait Router: Send + Sync {
    /// Open the device connection and start the reader/dispatcher loops.
    async fn start(&self) -> Result<(), RouterError>;

    /// Terminate the loops and close the device connection. Idempotent.
    async fn stop(&self);

    /// Install (or replace) the sink that receives crosspoint deltas.
    fn set_crosspoint_notify(&self, sink: Arc<dyn CrosspointSink>);

    async fn get_levels(&self) -> Vec<Level>;
    async fn get_sources(&self) -> Vec<Source>;
    async fn get_destinations(&self) -> Vec<Destination>;
    /// Sorted by destination, then destination level.
    async fn get_crosspoints(&self) -> Vec<Crosspoint>;

    /// Returns the default (empty-sentinel) entity when `id` is unknown.
    async fn get_source(&self, id: u32) -> Source;
    async fn get_destination(&self, id: u32) -> Destination;
    async fn get_level(&self, id: u32) -> Level;

    async fn set_crosspoint(
        &self,
        dest_id: u32,
        dest_level_id: u32,
        src_id: u32,
        src_level_id: u32,
    ) -> Result<(), RouterError>;

    /// `level` is accepted for symmetry with the rest of the façade; the
    /// reference dialect's lock state is destination-wide (§3 of the data
    /// model), so the outgoing command and the projected lock flag ignore it.
    async fn lock_destination(&self, dest_id: u32, level: u32) -> Result<(), RouterError>;
    async fn unlock_destination(&self, dest_id: u32, level: u32) -> Result<(), RouterError>;
}
