//! Mercato Server — application entry point.

use mercato_auth::{AuthConfig, AuthService};
use mercato_store::{LogMailer, MemoryUserStore};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("mercato=info".parse().unwrap()),
        )
        .json()
        .init();

    tracing::info!("Starting Mercato token authority...");

    let config = match AuthConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "configuration is invalid, refusing to start");
            std::process::exit(1);
        }
    };

    let _service = AuthService::new(MemoryUserStore::new(), LogMailer, config);

    // TODO: mount the transport layer (REST handlers) once the gateway
    // contract is settled; the authority itself is transport-agnostic.

    tracing::info!("Mercato token authority stopped.");
}
