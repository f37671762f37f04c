//! Raw-frame egress seam.
//!
//! The engine hands fully built frames to the transport together with the
//! egress port, the VLAN and the tag mode. Ingress travels the other way as
//! plain `(port, vlan, bytes)` calls into the engine.

use stp_types::{PortNumber, VlanId};

/// Frame egress.
pub trait BpduTransport {
    fn tx(&mut self, port: PortNumber, vlan: VlanId, frame: &[u8], tagged: bool);
}

/// One transmitted frame, as captured by [`MockTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRecord {
    pub port: PortNumber,
    pub vlan: u16,
    pub tagged: bool,
    pub frame: Vec<u8>,
}

/// Recording transport for tests.
#[derive(Debug, Default)]
pub struct MockTransport {
    pub sent: Vec<TxRecord>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames sent out of `port`, newest last.
    pub fn frames_on(&self, port: PortNumber) -> Vec<&TxRecord> {
        self.sent.iter().filter(|r| r.port == port).collect()
    }
}

impl BpduTransport for MockTransport {
    fn tx(&mut self, port: PortNumber, vlan: VlanId, frame: &[u8], tagged: bool) {
        self.sent.push(TxRecord {
            port,
            vlan: vlan.as_u16(),
            tagged,
            frame: frame.to_vec(),
        });
    }
}
