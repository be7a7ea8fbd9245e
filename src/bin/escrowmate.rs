//! Headless escrow companion.
//!
//! Connects, keeps the session reconciled and prints server notices
//! until interrupted. The local display name comes from the
//! `ESCROWMATE_RSN` environment variable; without a host environment
//! there is no position to report.

use anyhow::{Context, Result};
use escrow_client::FileIdentityStore;
use escrow_core::SessionConfig;
use escrowmate::logging::init_tracing;
use escrowmate::{HostAdapter, Runtime};
use escrow_wire::Coordinate;
use std::sync::Arc;
use tracing::info;

struct EnvHost {
    name: Option<String>,
}

impl HostAdapter for EnvHost {
    fn local_name(&self) -> Option<String> {
        self.name.clone()
    }

    fn current_location(&self) -> Option<Coordinate> {
        None
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let config_path = std::env::var("ESCROWMATE_CONFIG")
        .unwrap_or_else(|_| "config/escrowmate.yaml".to_string());
    let config = SessionConfig::load(&config_path)
        .with_context(|| format!("failed to load config from {config_path}"))?;

    init_tracing();
    info!("Starting escrowmate against {}", config.server.base_url);

    let identity_path = std::env::var("ESCROWMATE_IDENTITY")
        .unwrap_or_else(|_| "config/identity.json".to_string());
    let store = Arc::new(FileIdentityStore::new(identity_path));
    let host = Arc::new(EnvHost {
        name: std::env::var("ESCROWMATE_RSN").ok(),
    });

    let mut runtime = Runtime::start(config, host, store);

    let mut notices = tokio::time::interval(std::time::Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupt received, shutting down");
                break;
            }
            _ = notices.tick() => {
                for notice in runtime.take_notices() {
                    info!("{}", notice);
                }
            }
        }
    }

    runtime.shutdown();
    Ok(())
}
