use clap::Parser;
use client::network::{Client, ClientConfig};
use log::info;
use shared::{ConnectionId, MessageRegistry, NamedMessage, TestMsg};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:7777")]
    server: String,

    /// Expected server name; enables TLS together with --ca-cert
    #[arg(long, requires = "ca_cert")]
    server_name: Option<String>,

    /// PEM file with the CA certificate the server certificate chains to
    #[arg(long, requires = "server_name")]
    ca_cert: Option<PathBuf>,

    /// Approval payload presented to the server
    #[arg(short = 'p', long, default_value = "")]
    payload: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let mut config = ClientConfig::new(args.server.clone(), args.payload.into_bytes());
    if let (Some(server_name), Some(ca_cert)) = (args.server_name, args.ca_cert) {
        let pem = tokio::fs::read_to_string(&ca_cert).await?;
        info!("Using TLS, expecting server name '{}'", server_name);
        config = config.with_tls(server_name, pem);
    }

    let registry = Arc::new(MessageRegistry::new());
    registry
        .register(TestMsg::NAME, |_: ConnectionId, msg: TestMsg| {
            info!("TestMsg from server: {}", msg);
        })
        .await;

    let client = Client::connect(config, Arc::clone(&registry)).await?;
    info!("Connected to {} as {}", args.server, client.connection_id());

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, disconnecting...");

    registry.unregister(TestMsg::NAME).await;
    client.disconnect().await;

    Ok(())
}
