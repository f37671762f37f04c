//! BPDU wire codec.
//!
//! This is the only crate that touches network byte order. Frames are parsed
//! into host-order [`ConfigBpdu`]/[`StpFrame`] values on ingress and built
//! bit-exactly from them on egress; once a frame reaches the protocol engine
//! every field is host order and the four time fields are integer seconds.
//!
//! Two encapsulations exist:
//!
//! - classic IEEE 802.1D: LLC header (DSAP = SSAP = 0x42, UI), sent untagged
//!   to `01:80:C2:00:00:00`
//! - PVST+: SNAP header (OUI 00:00:0C, protocol 0x010B), a trailing
//!   originating-VLAN TLV, sent per VLAN to `01:00:0C:CC:CC:CD`

mod bpdu;
mod consts;
mod frame;

pub use bpdu::{BpduFlags, BpduType, ConfigBpdu};
pub use consts::*;
pub use frame::{
    build_config_frame, build_pvst_config_frame, build_pvst_tcn_frame, build_tcn_frame,
    parse_pvst_frame, parse_stp_frame, PvstFrame, StpFrame,
};

/// Frame-level validation failures. These are always recovered locally by
/// dropping the frame and bumping a counter; they never propagate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BpduError {
    #[error("frame truncated: {got} bytes, need {need}")]
    Truncated { got: usize, need: usize },

    #[error("bad LLC header")]
    BadLlc,

    #[error("bad SNAP header")]
    BadSnap,

    #[error("unknown BPDU type 0x{0:02x}")]
    UnknownType(u8),

    #[error("unsupported protocol version {0}")]
    UnknownVersion(u8),

    #[error("non-zero protocol id 0x{0:04x}")]
    BadProtocolId(u16),

    #[error("bad PVST vlan tag (length {tag_length}, vlan {vlan_id})")]
    BadVlanTag { tag_length: u16, vlan_id: u16 },
}
