//! Per-(instance, port) protocol state.

use crate::timer::Timer;
use stp_types::{BridgeId, PortId, PortState};

/// Modified-field bit positions for [`StpPort::modified_fields`].
///
/// The last five are port-level attributes synced through the same record
/// rather than members of the port state proper.
pub mod dirty {
    pub const PORT_ID: u32 = 1 << 0;
    pub const PORT_STATE: u32 = 1 << 1;
    pub const PATH_COST: u32 = 1 << 2;
    pub const DESIGNATED_ROOT: u32 = 1 << 3;
    pub const DESIGNATED_COST: u32 = 1 << 4;
    pub const DESIGNATED_BRIDGE: u32 = 1 << 5;
    pub const DESIGNATED_PORT: u32 = 1 << 6;
    pub const FORWARD_TRANSITIONS: u32 = 1 << 7;
    pub const BPDU_SENT: u32 = 1 << 8;
    pub const BPDU_RECEIVED: u32 = 1 << 9;
    pub const TC_SENT: u32 = 1 << 10;
    pub const TC_RECEIVED: u32 = 1 << 11;
    pub const PORT_PRIORITY: u32 = 1 << 12;
    pub const UPLINK_FAST: u32 = 1 << 13;
    pub const PORT_FAST: u32 = 1 << 14;
    pub const ROOT_PROTECT: u32 = 1 << 15;
    pub const BPDU_PROTECT: u32 = 1 << 16;
    pub const CLEAR_STATS: u32 = 1 << 17;
    pub const ALL: u32 = u32::MAX;
}

/// Kernel bridge-port shadow state. Tracks what was last pushed so
/// publication stays idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KernelState {
    #[default]
    Unknown,
    Forward,
    Blocking,
}

/// Per-vlan-attribute override flags. A per-VLAN priority or cost config
/// shields the port from later global settings.
pub mod per_vlan {
    pub const PORT_PRIORITY: u16 = 0x0001;
    pub const PATH_COST: u16 = 0x0002;
}

/// One port's state within one VLAN instance.
#[derive(Debug, Clone, Default)]
pub struct StpPort {
    pub port_id: PortId,
    pub state: PortState,

    pub topology_change_acknowledge: bool,
    pub config_pending: bool,
    pub change_detection_enabled: bool,
    pub self_loop: bool,
    /// Path cost follows the negotiated link speed while set.
    pub auto_config: bool,
    pub oper_edge: bool,
    pub kernel_state: KernelState,

    pub path_cost: u32,

    pub designated_root: BridgeId,
    pub designated_cost: u32,
    pub designated_bridge: BridgeId,
    pub designated_port: PortId,

    pub message_age_timer: Timer,
    pub forward_delay_timer: Timer,
    pub hold_timer: Timer,
    pub root_protect_timer: Timer,

    pub forward_transitions: u32,
    pub rx_config_bpdu: u32,
    pub tx_config_bpdu: u32,
    pub rx_tcn_bpdu: u32,
    pub tx_tcn_bpdu: u32,
    pub rx_delayed_bpdu: u32,
    pub rx_drop_bpdu: u32,

    /// Per-vlan override flags, see [`per_vlan`].
    pub flags: u16,

    pub modified_fields: u32,
}

impl StpPort {
    pub fn mark(&mut self, bits: u32) {
        self.modified_fields |= bits;
    }

    pub fn clear_statistics(&mut self) {
        self.rx_config_bpdu = 0;
        self.rx_tcn_bpdu = 0;
        self.tx_config_bpdu = 0;
        self.tx_tcn_bpdu = 0;
        self.mark(dirty::CLEAR_STATS);
    }
}
