mod config;
mod identity;

use config::ParleyConfig;
use identity::{IdentityVerifier, TrustedTokenVerifier};
use log::LevelFilter;
use parley_api::frames::ClientFrame;
use parley_core::config::CoreConfig;
use parley_core::event::RoomEvent;
use parley_core::registry::LiveConnection;
use parley_core::ChatCore;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::signal;
use tokio::sync::oneshot;

#[derive(Debug, Error)]
enum DaemonError {
    #[error("config")]
    Config,
    #[error("core")]
    Core,
    #[error("bind")]
    Bind,
}

#[tokio::main]
async fn main() -> Result<(), DaemonError> {
    let args: Vec<String> = std::env::args().collect();
    let mut path = PathBuf::from("parley.toml");
    let mut i = 1;
    while i + 1 < args.len() {
        if args[i] == "--config" {
            path = PathBuf::from(&args[i + 1]);
        }
        i += 1;
    }
    let cfg = config::load_config(&path).map_err(|_| DaemonError::Config)?;
    init_logging(&cfg);

    let core_config = CoreConfig {
        storage_path: cfg.data_dir.to_string_lossy().into_owned(),
        namespace: cfg.namespace.clone(),
    };
    let core = ChatCore::init(core_config, cfg.policy()).map_err(|_| DaemonError::Core)?;
    let verifier: Arc<dyn IdentityVerifier> = Arc::new(TrustedTokenVerifier);

    spawn_event_logger(&core);

    let listener = TcpListener::bind(&cfg.listen)
        .await
        .map_err(|_| DaemonError::Bind)?;
    log::info!("listening on {}", cfg.listen);

    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
    let accept_core = Arc::clone(&core);
    let server = tokio::spawn(async move {
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let Ok((stream, addr)) = accepted else { break };
                    log::debug!("connection from {addr}");
                    let core = Arc::clone(&accept_core);
                    let verifier = Arc::clone(&verifier);
                    tokio::spawn(async move {
                        handle_connection(core, verifier, stream).await;
                    });
                }
                _ = &mut shutdown_rx => break,
            }
        }
    });

    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let _ = ctrl_c.as_mut().await;
    let _ = shutdown_tx.send(());
    let _ = server.await;
    Ok(())
}

fn init_logging(cfg: &ParleyConfig) {
    let level = match cfg.logging.level.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => LevelFilter::Info,
    };
    let _ = env_logger::Builder::from_default_env()
        .filter_level(level)
        .try_init();
}

/// Background consumer of the post-commit event bus.
fn spawn_event_logger(core: &Arc<ChatCore>) {
    let mut events = core.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                RoomEvent::MessageCreated(message) => {
                    log::debug!("message {} created in room {}", message.id, message.room_id)
                }
                RoomEvent::PresenceChanged {
                    room_id,
                    user_id,
                    online,
                } => log::debug!("presence {user_id}@{room_id} online={online}"),
                RoomEvent::RoomDisbanded(room_id) => log::debug!("room {room_id} disbanded"),
            }
        }
    });
}

/// One task per live connection: handshake line carries the out-of-band
/// verified identity token, then newline-delimited JSON frames until EOF.
/// The writer half drains the connection's outbound channel; the reader
/// half feeds the gateway. Disconnect cleanup runs exactly once per path
/// and is idempotent underneath.
async fn handle_connection(
    core: Arc<ChatCore>,
    verifier: Arc<dyn IdentityVerifier>,
    stream: TcpStream,
) {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    let handshake = match lines.next_line().await {
        Ok(Some(line)) => line,
        _ => return,
    };
    let user_id = match verifier.verify(handshake.trim()).await {
        Ok(user_id) => user_id,
        Err(err) => {
            log::debug!("handshake rejected: {err}");
            let _ = write_half
                .write_all(b"{\"type\":\"error\",\"code\":\"UNAUTHORIZED\",\"message\":\"identity rejected\"}\n")
                .await;
            return;
        }
    };

    let (conn, mut outbound) = LiveConnection::open(user_id);
    let writer = tokio::spawn(async move {
        while let Some(raw) = outbound.recv().await {
            if write_half.write_all(raw.as_bytes()).await.is_err() {
                break;
            }
            if write_half.write_all(b"\n").await.is_err() {
                break;
            }
        }
    });

    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        let frame = serde_json::from_str::<ClientFrame>(&line).unwrap_or(ClientFrame::Unknown);
        core.gateway().handle_frame(&conn, frame).await;
    }

    core.gateway().disconnect(&conn);
    writer.abort();
}
