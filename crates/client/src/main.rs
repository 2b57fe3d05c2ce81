//! rentline-tail: connect to the realtime server, join the given rooms and
//! log what arrives until Ctrl-C.

use anyhow::{Context, Result};
use clap::Parser;
use rentline_client::{
    log_info, ConnectionState, RealtimeChat, RealtimeClient, RealtimeConfig, RealtimeProduct,
    RealtimeRental,
};
use rentline_shared::ReadReceipt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "rentline-tail", about = "Tail realtime marketplace events")]
struct Args {
    /// Bearer token used for the socket handshake
    #[arg(long, env = "RENTLINE_TOKEN")]
    token: String,

    /// Conversation to follow (repeatable)
    #[arg(long = "conversation")]
    conversations: Vec<String>,

    /// Rental id or UID to follow (repeatable)
    #[arg(long = "rental")]
    rentals: Vec<String>,

    /// Product to follow (repeatable)
    #[arg(long = "product")]
    products: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("rentline_client=debug")),
        )
        .init();

    let args = Args::parse();
    let config = RealtimeConfig::from_env();
    log_info!("using realtime server at {}", config.endpoint);
    let client = RealtimeClient::from_config(config);

    let mut states = client.state_changes();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = states.borrow_and_update().clone();
            match state {
                ConnectionState::Failed { reason } => {
                    log_info!("connection failed: {}", reason)
                }
                other => log_info!("connection state: {:?}", other),
            }
        }
    });

    // Hooks register before the handshake; their joins are flushed on connect.
    let chats: Vec<_> = args
        .conversations
        .iter()
        .map(|id| {
            let chat = RealtimeChat::mount_with_receipts(&client, id.as_str(), |r: &ReadReceipt| {
                log_info!("read receipt in {}: {:?}", r.conversation_id, r.message_id)
            });
            watch_log(chat.subscribe(), format!("conversation {id}"), |s| {
                format!("{} messages, typing {:?}", s.messages.len(), s.typing)
            });
            chat
        })
        .collect();
    let rentals: Vec<_> = args
        .rentals
        .iter()
        .map(|key| {
            let rental = RealtimeRental::mount(&client, key.as_str());
            watch_log(rental.subscribe(), format!("rental {key}"), |s| {
                format!("{:?}", s.snapshot.as_ref().and_then(|r| r.rental_status.clone()))
            });
            rental
        })
        .collect();
    let products: Vec<_> = args
        .products
        .iter()
        .map(|id| {
            let product = RealtimeProduct::mount(&client, id.as_str());
            watch_log(product.subscribe(), format!("product {id}"), |s| {
                format!(
                    "quantity {:?}, deleted {}",
                    s.snapshot.as_ref().and_then(|p| p.quantity),
                    s.deleted
                )
            });
            product
        })
        .collect();

    client
        .connect(&args.token)
        .await
        .context("could not connect to the realtime server")?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    drop((chats, rentals, products));
    client.disconnect();
    Ok(())
}

fn watch_log<T, F>(mut rx: tokio::sync::watch::Receiver<T>, label: String, describe: F)
where
    T: Send + Sync + 'static,
    F: Fn(&T) -> String + Send + 'static,
{
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let line = describe(&rx.borrow_and_update());
            log_info!("{}: {}", label, line);
        }
    });
}
