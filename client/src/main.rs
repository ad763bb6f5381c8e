use clap::Parser;
use client::deferred::DeferredQueue;
use client::dispatch::Dispatcher;
use client::network::GameClient;
use log::info;
use shared::DEFAULT_PORT;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::interval;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long)]
    server: Option<String>,

    /// Player name
    #[arg(short = 'n', long, default_value = "wanderer")]
    name: String,
}

/// Headless client loop: connect, then drain the deferred queue at a fixed
/// frame cadence the way a render loop would.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let server_addr = args
        .server
        .unwrap_or_else(|| format!("127.0.0.1:{}", DEFAULT_PORT));

    let (deferred_tx, mut deferred_queue) = DeferredQueue::channel();
    let dispatcher = Arc::new(Mutex::new(Dispatcher::new(deferred_tx)));

    info!("Starting client...");
    let client = GameClient::connect(
        &server_addr,
        &args.name,
        shared::WORLD_WIDTH / 2.0,
        shared::WORLD_HEIGHT / 2.0,
        Arc::clone(&dispatcher),
    )
    .await?;
    info!(
        "Joined world {} as {}",
        client.world_seed(),
        client.client_id()
    );

    let mut frame = interval(Duration::from_millis(16));
    loop {
        tokio::select! {
            _ = frame.tick() => {
                let applied = deferred_queue.drain(|op| {
                    log::debug!("Applying {:?}", op);
                    Ok::<(), std::convert::Infallible>(())
                });
                if applied > 0 {
                    log::debug!("Applied {} deferred ops this frame", applied);
                }
                if !client.is_connected() {
                    info!("Connection lost, exiting");
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                client.disconnect().await?;
                break;
            }
        }
    }

    Ok(())
}
