use clap::Parser;
use log::{error, info};
use server::config::{Args, ServerConfig};
use server::network::Server;
use shared::{ConnectionId, NamedMessage, TestMsg};

/// Main-method of the application.
/// Parses command-line arguments, binds the server and runs it until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    let config = ServerConfig::from_args(&args);

    let mut server = Server::bind(config).await?;
    let handle = server.handle();

    handle
        .registry()
        .register(TestMsg::NAME, |connection_id: ConnectionId, msg: TestMsg| {
            info!("TestMsg from client {}: {}", connection_id, msg);
        })
        .await;

    let shutdown = handle.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down gracefully..."),
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
        shutdown.shutdown();
    });

    server.run().await?;
    Ok(())
}
