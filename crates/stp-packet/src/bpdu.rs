//! Host-order BPDU representations.

use crate::consts::*;
use crate::BpduError;
use stp_types::{BridgeId, PortId};

/// BPDU type octet values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BpduType {
    /// Configuration BPDU (0x00).
    Config,
    /// RSTP BPDU (0x02). Accepted, processed as a configuration BPDU.
    Rstp,
    /// Topology change notification (0x80).
    Tcn,
}

impl BpduType {
    pub const fn to_byte(self) -> u8 {
        match self {
            BpduType::Config => 0x00,
            BpduType::Rstp => 0x02,
            BpduType::Tcn => 0x80,
        }
    }

    pub fn from_byte(byte: u8) -> Result<Self, BpduError> {
        match byte {
            0x00 => Ok(BpduType::Config),
            0x02 => Ok(BpduType::Rstp),
            0x80 => Ok(BpduType::Tcn),
            other => Err(BpduError::UnknownType(other)),
        }
    }
}

/// The two flag bits of a classic configuration BPDU.
///
/// Topology change rides in the LSB, the acknowledgement in the MSB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BpduFlags {
    pub topology_change: bool,
    pub topology_change_ack: bool,
}

impl BpduFlags {
    pub fn from_byte(byte: u8) -> Self {
        BpduFlags {
            topology_change: byte & 0x01 != 0,
            topology_change_ack: byte & 0x80 != 0,
        }
    }

    pub fn to_byte(self) -> u8 {
        let mut byte = 0u8;
        if self.topology_change {
            byte |= 0x01;
        }
        if self.topology_change_ack {
            byte |= 0x80;
        }
        byte
    }
}

/// A configuration BPDU in host order.
///
/// The four time fields are integer seconds; the codec shifts the wire's
/// 1/256 s values down on parse and back up on build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConfigBpdu {
    pub version: u8,
    pub bpdu_type: u8,
    pub flags: BpduFlags,
    pub root_id: BridgeId,
    pub root_path_cost: u32,
    pub bridge_id: BridgeId,
    pub port_id: PortId,
    pub message_age: u16,
    pub max_age: u16,
    pub hello_time: u16,
    pub forward_delay: u16,
}

impl ConfigBpdu {
    /// True for RSTP-versioned BPDUs (processed with classic timers).
    pub const fn is_rstp(&self) -> bool {
        self.version == RSTP_VERSION
    }

    /// Serialises the 35-byte payload (network order).
    pub(crate) fn write_payload(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&STP_PROTOCOL_ID.to_be_bytes());
        out.push(self.version);
        out.push(self.bpdu_type);
        out.push(self.flags.to_byte());
        out.extend_from_slice(&self.root_id.priority_word().to_be_bytes());
        out.extend_from_slice(self.root_id.mac().as_bytes());
        out.extend_from_slice(&self.root_path_cost.to_be_bytes());
        out.extend_from_slice(&self.bridge_id.priority_word().to_be_bytes());
        out.extend_from_slice(self.bridge_id.mac().as_bytes());
        out.extend_from_slice(&self.port_id.as_word().to_be_bytes());
        out.extend_from_slice(&(self.message_age << 8).to_be_bytes());
        out.extend_from_slice(&(self.max_age << 8).to_be_bytes());
        out.extend_from_slice(&(self.hello_time << 8).to_be_bytes());
        out.extend_from_slice(&(self.forward_delay << 8).to_be_bytes());
    }

    /// Parses the 35-byte payload. `payload[0]` is the protocol id MSB.
    ///
    /// A hello time below the protocol minimum is repaired to the default;
    /// everything else out of shape is an error.
    pub(crate) fn parse_payload(payload: &[u8]) -> Result<Self, BpduError> {
        if payload.len() < CONFIG_BPDU_LEN {
            return Err(BpduError::Truncated {
                got: payload.len(),
                need: CONFIG_BPDU_LEN,
            });
        }

        let protocol_id = u16::from_be_bytes([payload[0], payload[1]]);
        if protocol_id != STP_PROTOCOL_ID {
            return Err(BpduError::BadProtocolId(protocol_id));
        }

        let version = payload[2];
        if version != STP_VERSION && version != RSTP_VERSION {
            return Err(BpduError::UnknownVersion(version));
        }

        let bpdu_type = payload[3];
        match BpduType::from_byte(bpdu_type)? {
            BpduType::Tcn => return Err(BpduError::UnknownType(bpdu_type)),
            BpduType::Config | BpduType::Rstp => {}
        }

        let mut hello_time = u16::from_be_bytes([payload[31], payload[32]]);
        if hello_time < MIN_HELLO_TIME_256THS {
            hello_time = DFLT_HELLO_TIME_256THS;
        }

        Ok(ConfigBpdu {
            version,
            bpdu_type,
            flags: BpduFlags::from_byte(payload[4]),
            root_id: BridgeId::from_parts(
                u16::from_be_bytes([payload[5], payload[6]]),
                [
                    payload[7], payload[8], payload[9], payload[10], payload[11], payload[12],
                ]
                .into(),
            ),
            root_path_cost: u32::from_be_bytes([payload[13], payload[14], payload[15], payload[16]]),
            bridge_id: BridgeId::from_parts(
                u16::from_be_bytes([payload[17], payload[18]]),
                [
                    payload[19], payload[20], payload[21], payload[22], payload[23], payload[24],
                ]
                .into(),
            ),
            port_id: PortId::from_word(u16::from_be_bytes([payload[25], payload[26]])),
            message_age: u16::from_be_bytes([payload[27], payload[28]]) >> 8,
            max_age: u16::from_be_bytes([payload[29], payload[30]]) >> 8,
            hello_time: hello_time >> 8,
            forward_delay: u16::from_be_bytes([payload[33], payload[34]]) >> 8,
        })
    }
}
