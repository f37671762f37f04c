//! stpd entry point.
//!
//! Wires the dispatch loop to its collaborators: the application database,
//! the control socket, and the channels the link-event and raw-frame
//! collaborators feed. The runtime is current-thread by design: the engine
//! is single-threaded cooperative and spawns no workers.

use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use stpd::daemon::{Daemon, DaemonChannels};
use stpd::ipc::{IpcServer, STPD_SOCK_PATH};
use stpd::RedisAdapter;

/// Port table capacity: half physical ports, half port-channels.
const MAX_STP_PORTS: u16 = 512;

fn init_logging() {
    let filter = EnvFilter::try_from_env("STPD_LOG_LEVEL")
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    info!("stpd starting");

    let redis_host =
        std::env::var("STPD_REDIS_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let mut adapter = RedisAdapter::app_db(redis_host, 6379);
    adapter.connect().await?;
    info!("connected to APPL_DB");

    let sock_path =
        std::env::var("STPD_IPC_SOCK").unwrap_or_else(|_| STPD_SOCK_PATH.to_string());
    let ipc = IpcServer::bind(&sock_path)?;
    info!(%sock_path, "control channel ready");

    // the raw-frame and netlink collaborators attach here; the senders stay
    // alive for the lifetime of the process
    let (tx_frames, _tx_frames_rx) = mpsc::unbounded_channel();
    let (_rx_frames_tx, rx_frames) = mpsc::unbounded_channel();
    let (_link_events_tx, link_events) = mpsc::unbounded_channel();

    let daemon = Daemon::new(
        MAX_STP_PORTS,
        adapter,
        ipc,
        DaemonChannels {
            rx_frames,
            link_events,
        },
        tx_frames,
    );

    daemon.run().await?;
    info!("stpd exiting");
    Ok(())
}
