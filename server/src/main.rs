use clap::Parser;
use log::{error, info};
use server::config::ServerConfig;
use server::server::GameServer;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(author, version, about = "Wildgrove dedicated server", long_about = None)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Path to a JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let mut config = match args.config {
        Some(path) => match ServerConfig::load(&path) {
            Ok(config) => config,
            Err(e) => {
                error!("Fatal config error ({}): {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => ServerConfig::default(),
    };
    if let Some(port) = args.port {
        config.port = port;
    }

    info!(
        "Starting server: port={}, max_clients={}, seed={}",
        config.port, config.max_clients, config.world_seed
    );

    let game_server = match GameServer::bind(config).await {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to bind listener: {}", e);
            return ExitCode::FAILURE;
        }
    };

    tokio::select! {
        result = game_server.run() => {
            if let Err(e) = result {
                error!("Server stopped with error: {}", e);
                return ExitCode::FAILURE;
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    ExitCode::SUCCESS
}
