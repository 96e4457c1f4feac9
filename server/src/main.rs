use clap::Parser;
use log::{error, info};
use server::auth::InMemoryCredentialStore;
use server::config::ServerConfig;
use server::network::GameServer;
use std::sync::Arc;

/// Parses command-line arguments, builds the credential store, and runs the
/// server until the process is interrupted.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value = "8080")]
        port: u16,
        /// Snapshot broadcasts per second
        #[clap(short, long, default_value = "20")]
        tick_rate: u32,
        /// Maximum concurrent connections
        #[clap(short, long, default_value = "64")]
        max_clients: usize,
        /// Username granted operator privileges (repeatable)
        #[clap(short, long = "operator")]
        operator: Vec<String>,
    }

    env_logger::init();
    let args = Args::parse();

    let config = ServerConfig {
        tick_rate: args.tick_rate,
        max_clients: args.max_clients,
        ..ServerConfig::default()
    };
    if !args.operator.is_empty() {
        info!("operator accounts: {}", args.operator.join(", "));
    }
    let credentials = Arc::new(InMemoryCredentialStore::with_operators(args.operator));

    let address = format!("{}:{}", args.host, args.port);
    let mut server = GameServer::new(&address, config, credentials).await?;

    // Handle shutdown gracefully
    tokio::select! {
        _ = server.run() => {
            error!("server loop exited unexpectedly");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl+C, shutting down gracefully");
        }
    }

    Ok(())
}
