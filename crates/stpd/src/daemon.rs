//! The dispatch loop.
//!
//! Three sources are multiplexed on one task: the 100 ms protocol tick,
//! received BPDUs, and the control channel (configuration plus link
//! events). A biased select services the tick ahead of everything else,
//! and each low-priority source is drained in bounded batches so a BPDU
//! storm cannot starve protocol progress. Publications queued by the
//! engine are flushed after every step.

use std::time::Duration;

use stp_core::{BpduTransport, ConfigError};
use stp_types::{PortNumber, VlanId};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::app_db::{AppDbSync, RedisAdapter};
use crate::ipc::IpcServer;
use crate::manager::{LinkEvent, StpManager};
use crate::messages::{ControlMsg, IpcReply, StpIpcMessage};
use crate::Result;

/// Messages drained from a low-priority source per dispatch pass.
const LOW_PRIO_BATCH: usize = 5;

/// One received BPDU, as delivered by the transport collaborator.
#[derive(Debug, Clone)]
pub struct RxFrame {
    pub port: PortNumber,
    pub vlan_id: u16,
    pub bytes: Vec<u8>,
}

/// One frame handed to the transport collaborator for egress.
#[derive(Debug, Clone)]
pub struct TxFrame {
    pub port: PortNumber,
    pub vlan_id: u16,
    pub tagged: bool,
    pub bytes: Vec<u8>,
}

/// Engine-side transport seam: egress frames go onto a channel owned by
/// the raw-socket collaborator (shared transmit fan-out).
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<TxFrame>,
}

impl ChannelTransport {
    pub fn new(tx: mpsc::UnboundedSender<TxFrame>) -> Self {
        ChannelTransport { tx }
    }
}

impl BpduTransport for ChannelTransport {
    fn tx(&mut self, port: PortNumber, vlan: VlanId, frame: &[u8], tagged: bool) {
        let _ = self.tx.send(TxFrame {
            port,
            vlan_id: vlan.as_u16(),
            tagged,
            bytes: frame.to_vec(),
        });
    }
}

/// Receive-side channels, fed by the external collaborators.
pub struct DaemonChannels {
    pub rx_frames: mpsc::UnboundedReceiver<RxFrame>,
    pub link_events: mpsc::UnboundedReceiver<LinkEvent>,
}

/// The daemon.
pub struct Daemon {
    manager: StpManager<AppDbSync, ChannelTransport>,
    adapter: RedisAdapter,
    ipc: IpcServer,
    channels: DaemonChannels,
}

impl Daemon {
    pub fn new(
        max_ports: u16,
        adapter: RedisAdapter,
        ipc: IpcServer,
        channels: DaemonChannels,
        tx_frames: mpsc::UnboundedSender<TxFrame>,
    ) -> Self {
        Daemon {
            manager: StpManager::new(max_ports, AppDbSync::new(), ChannelTransport::new(tx_frames)),
            adapter,
            ipc,
            channels,
        }
    }

    /// Flushes publications queued since the last step.
    async fn flush(&mut self) {
        if let Some(engine) = self.manager.engine_mut() {
            if engine.sync.pending_len() != 0 {
                let ops = engine.sync.drain();
                self.adapter.apply(ops).await;
            }
        }
    }

    fn apply_message(&mut self, msg: StpIpcMessage) -> std::result::Result<(), ConfigError> {
        if let StpIpcMessage::Control(ControlMsg::SetLogLevel { level }) = &msg {
            info!(%level, "log level change requested via control channel");
        }
        self.manager.handle_message(msg)
    }

    /// Runs until interrupted.
    pub async fn run(mut self) -> Result<()> {
        let mut ticker = tokio::time::interval(Duration::from_millis(100));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!("dispatch loop running");

        loop {
            tokio::select! {
                biased;

                // the protocol tick outranks every other source
                _ = ticker.tick() => {
                    self.manager.tick();
                    self.flush().await;
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("interrupted, shutting down");
                    break;
                }

                maybe = self.channels.rx_frames.recv() => {
                    let Some(frame) = maybe else { break };
                    self.manager.handle_rx_frame(frame.port, frame.vlan_id, &frame.bytes);
                    for _ in 1..LOW_PRIO_BATCH {
                        match self.channels.rx_frames.try_recv() {
                            Ok(frame) => self
                                .manager
                                .handle_rx_frame(frame.port, frame.vlan_id, &frame.bytes),
                            Err(_) => break,
                        }
                    }
                    self.flush().await;
                }

                maybe = self.channels.link_events.recv() => {
                    let Some(event) = maybe else { break };
                    self.manager.handle_link_event(event);
                    for _ in 1..LOW_PRIO_BATCH {
                        match self.channels.link_events.try_recv() {
                            Ok(event) => self.manager.handle_link_event(event),
                            Err(_) => break,
                        }
                    }
                    self.flush().await;
                }

                received = self.ipc.recv() => {
                    match received {
                        Ok((Some(msg), addr)) => {
                            let reply = match self.apply_message(msg) {
                                Ok(()) => IpcReply::Ok,
                                Err(err) => {
                                    warn!(%err, "configuration rejected");
                                    IpcReply::Rejected {
                                        error: err.to_string(),
                                    }
                                }
                            };
                            if let Some(addr) = addr {
                                self.ipc.reply(&addr, &reply).await;
                            }
                        }
                        Ok((None, Some(addr))) => {
                            self.ipc
                                .reply(
                                    &addr,
                                    &IpcReply::Rejected {
                                        error: "malformed message".to_string(),
                                    },
                                )
                                .await;
                        }
                        Ok((None, None)) => {}
                        Err(err) => warn!(%err, "control channel receive failed"),
                    }
                    self.flush().await;
                }
            }
        }

        Ok(())
    }
}
