//! Common L2 types for the per-VLAN spanning tree daemon.
//!
//! This crate provides type-safe representations of the primitives the
//! protocol engine and the wire codec share:
//!
//! - [`MacAddress`]: 48-bit Ethernet MAC addresses
//! - [`VlanId`]: IEEE 802.1Q VLAN identifiers
//! - [`BridgeId`]: packed bridge priority + MAC identifiers, totally ordered
//! - [`PortId`]: packed port priority + port number identifiers
//! - [`PortState`]: the five 802.1D port states
//! - [`PortMask`]: fixed-capacity port bitmaps with set operations
//! - [`path_cost`]: speed to path-cost tables (802.1t and 802.1D-1998)

mod bridge_id;
mod mac;
mod mask;
pub mod path_cost;
mod port_id;
mod state;
mod vlan;

pub use bridge_id::BridgeId;
pub use mac::MacAddress;
pub use mask::PortMask;
pub use port_id::{PortId, PortNumber, INVALID_PORT};
pub use state::PortState;
pub use vlan::VlanId;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("invalid VLAN ID: {0} (must be 1-4094)")]
    InvalidVlanId(u16),

    #[error("invalid port number: {0} (must be < 4095)")]
    InvalidPortNumber(u16),

    #[error("invalid port state: {0}")]
    InvalidPortState(String),
}
