//! The crosspoint-change subscriber contract.
//!
//! Modeled as a sink with a single `deliver` operation (rather than a raw
//! channel) so a host can choose synchronous fan-out, per-subscriber queues,
//! or a broadcast channel without the core caring. The dispatcher awaits
//! `deliver` directly, so a sink that never returns stalls the dispatcher —
//! implementations are responsible for their own bound or deadline.

use async_trait::async_trait;

use crate::entity::Crosspoint;

#[async_trait]
pub trait CrosspointSink: Send + Sync {
    async fn deliver(&self, crosspoint: Crosspoint);
}

/// Discards every crosspoint delta. The default sink for a driver that has
/// not yet had [`CrosspointSink`] installed via `Router::set_crosspoint_notify`.
#[derive(Debug, Default)]
pub struct NullSink;

#[async_trait]
impl CrosspointSink for NullSink {
    async fn deliver(&self, _crosspoint: Crosspoint) {}
}
