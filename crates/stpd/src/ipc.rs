//! Control channel.
//!
//! A datagram unix socket carries JSON-encoded [`StpIpcMessage`]s from the
//! configuration manager and the control CLI. Every request gets a single
//! enumerated reply; a message that fails to decode or validate is dropped
//! whole.

use std::path::{Path, PathBuf};

use tokio::net::unix::SocketAddr;
use tokio::net::UnixDatagram;
use tracing::{debug, warn};

use crate::messages::{IpcReply, StpIpcMessage};
use crate::Result;

/// Default socket path.
pub const STPD_SOCK_PATH: &str = "/var/run/stpd/ipc.sock";

const MAX_DGRAM: usize = 64 * 1024;

/// The server side of the control channel.
pub struct IpcServer {
    socket: UnixDatagram,
    path: PathBuf,
    buf: Vec<u8>,
}

impl IpcServer {
    /// Binds the socket, replacing a stale one from a previous run.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let socket = UnixDatagram::bind(&path)?;
        Ok(IpcServer {
            socket,
            path,
            buf: vec![0u8; MAX_DGRAM],
        })
    }

    /// Receives one message. Undecodable datagrams are reported as `None`
    /// together with the sender, so the caller can still answer.
    pub async fn recv(&mut self) -> Result<(Option<StpIpcMessage>, Option<SocketAddr>)> {
        let (len, addr) = self.socket.recv_from(&mut self.buf).await?;
        let addr = addr.as_pathname().is_some().then_some(addr);

        match serde_json::from_slice::<StpIpcMessage>(&self.buf[..len]) {
            Ok(msg) => {
                debug!(?msg, "control message");
                Ok((Some(msg), addr))
            }
            Err(err) => {
                warn!(%err, len, "undecodable control message dropped");
                Ok((None, addr))
            }
        }
    }

    /// Sends the enumerated status back to the requester.
    pub async fn reply(&self, addr: &SocketAddr, reply: &IpcReply) {
        let Some(path) = addr.as_pathname() else {
            return;
        };
        let Ok(bytes) = serde_json::to_vec(reply) else {
            return;
        };
        if let Err(err) = self.socket.send_to(&bytes, path).await {
            warn!(%err, "reply send failed");
        }
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::InitMsg;

    fn tmp_sock(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("stpd-test-{}-{}.sock", name, std::process::id()))
    }

    #[tokio::test]
    async fn test_recv_decodes_messages() {
        let server_path = tmp_sock("server");
        let client_path = tmp_sock("client");
        let _ = std::fs::remove_file(&client_path);

        let mut server = IpcServer::bind(&server_path).unwrap();
        let client = UnixDatagram::bind(&client_path).unwrap();

        let msg = StpIpcMessage::Init(InitMsg {
            max_stp_instances: 4,
        });
        client
            .send_to(&serde_json::to_vec(&msg).unwrap(), &server_path)
            .await
            .unwrap();

        let (received, addr) = server.recv().await.unwrap();
        assert_eq!(received, Some(msg));
        assert!(addr.is_some());

        server
            .reply(&addr.unwrap(), &IpcReply::Ok)
            .await;
        let mut buf = [0u8; 256];
        let n = client.recv(&mut buf).await.unwrap();
        let reply: IpcReply = serde_json::from_slice(&buf[..n]).unwrap();
        assert_eq!(reply, IpcReply::Ok);

        let _ = std::fs::remove_file(&client_path);
    }

    #[tokio::test]
    async fn test_garbage_is_reported_not_fatal() {
        let server_path = tmp_sock("garbage");
        let client_path = tmp_sock("garbage-client");
        let _ = std::fs::remove_file(&client_path);

        let mut server = IpcServer::bind(&server_path).unwrap();
        let client = UnixDatagram::bind(&client_path).unwrap();
        client.send_to(b"not json", &server_path).await.unwrap();

        let (received, _) = server.recv().await.unwrap();
        assert_eq!(received, None);

        let _ = std::fs::remove_file(&client_path);
    }
}
