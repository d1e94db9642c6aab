// router-gatewayd: loads the driver fleet from config, starts each
// configured router driver, and idles for the process lifetime while
// drivers push crosspoint deltas into the installed sink.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use router_core::{Crosspoint, CrosspointSink, DialectFactory, Registry};
use tracing::{error, info};

struct TracingSink;

#[async_trait]
impl CrosspointSink for TracingSink {
    async fn deliver(&self, crosspoint: Crosspoint) {
        info!(
            destination = crosspoint.destination,
            destination_level = crosspoint.destination_level,
            source = crosspoint.source,
            source_level = crosspoint.source_level,
            locked = crosspoint.locked,
            "crosspoint changed"
        );
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "router-gatewayd starting");

    let cfg = match router_core::config::load_config() {
        Ok(cfg) => {
            info!(drivers = cfg.drivers.len(), "config loaded");
            cfg
        }
        Err(e) => {
            eprintln!("FATAL: failed to load config: {e}");
            std::process::exit(1);
        }
    };

    let mut dialects: HashMap<String, DialectFactory> = HashMap::new();
    dialects.insert(
        "harrislrc".to_owned(),
        Arc::new(router_proto_harrislrc::build_driver),
    );

    let registry = match Registry::build(&cfg.drivers, &dialects, Arc::new(TracingSink)) {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("FATAL: failed to build driver registry: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = registry.start_all().await {
        error!(error = %e, "a driver failed to start");
        std::process::exit(1);
    }
    info!(drivers = ?registry.ids(), "all drivers started");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
    }

    info!("shutting down");
    registry.stop_all().await;
}
