//! Standalone chat relay server.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin server
//! cargo run --bin server -- --host 0.0.0.0 --port 8081
//! ```

use std::sync::Arc;
use std::time::Duration;

use chat_relay_rs::common::logger::setup_logger;
use chat_relay_rs::infrastructure::{InMemoryMessageStore, OpenAuthService};
use chat_relay_rs::relay::{RelayConfig, RelayServer, signal::shutdown_signal};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "server")]
#[command(about = "Session-scoped chat relay server", long_about = None)]
struct Args {
    /// Host address to bind the relay to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the relay to
    #[arg(short = 'p', long, default_value = "8081")]
    port: u16,

    /// Seconds between presence ("who's here") broadcasts
    #[arg(long, default_value = "5")]
    presence_interval: u64,
}

#[tokio::main]
async fn main() {
    setup_logger(env!("CARGO_BIN_NAME"), "info");

    let args = Args::parse();
    let config = RelayConfig {
        presence_interval: Duration::from_secs(args.presence_interval),
        ..RelayConfig::default()
    };

    let auth = Arc::new(OpenAuthService);
    let store = InMemoryMessageStore::new();

    let server = RelayServer::new(config, auth, store);
    let handle = match server.start(&format!("{}:{}", args.host, args.port)).await {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!("failed to start relay: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("press Ctrl+C to shut down gracefully");
    shutdown_signal().await;
    handle.stop().await;
}
