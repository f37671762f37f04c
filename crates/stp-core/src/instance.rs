//! The per-VLAN instance table slot.

use crate::bridge::BridgeData;
use crate::port::StpPort;
use crate::timer::Timer;
use stp_types::{PortMask, VlanId};

/// Instance lifecycle.
///
/// `Free -> Config` when the VLAN is first configured, `Config -> Active`
/// once a control port comes up, back to `Config` when the enable mask
/// empties, and `* -> Free` on VLAN delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstanceState {
    #[default]
    Free,
    Config,
    Active,
}

/// Modified-field bits for the instance itself (the bridge data carries its
/// own mask).
pub mod dirty {
    pub const VLAN: u32 = 1 << 0;
    pub const ALL_PORTS: u32 = 1 << 31;
}

/// One VLAN's spanning tree instance.
#[derive(Debug, Clone)]
pub struct StpInstance {
    pub vlan_id: Option<VlanId>,
    pub state: InstanceState,
    /// Shadow of `bridge.topology_change`, tracks whether fast aging is
    /// currently pushed to the switch state.
    pub fast_aging: bool,

    pub bridge: BridgeData,

    pub enable_mask: PortMask,
    pub control_mask: PortMask,
    pub untag_mask: PortMask,

    pub hello_timer: Timer,
    pub tcn_timer: Timer,
    pub topology_change_timer: Timer,

    /// Engine uptime second of the previous BPDU, for rx-delay diagnostics.
    pub last_bpdu_rx_time: u32,
    pub rx_drop_bpdu: u32,

    pub modified_fields: u32,

    pub ports: Vec<StpPort>,
}

impl StpInstance {
    pub fn new(max_ports: u16) -> Self {
        StpInstance {
            vlan_id: None,
            state: InstanceState::Free,
            fast_aging: false,
            bridge: BridgeData::default(),
            enable_mask: PortMask::new(max_ports),
            control_mask: PortMask::new(max_ports),
            untag_mask: PortMask::new(max_ports),
            hello_timer: Timer::default(),
            tcn_timer: Timer::default(),
            topology_change_timer: Timer::default(),
            last_bpdu_rx_time: 0,
            rx_drop_bpdu: 0,
            modified_fields: 0,
            ports: vec![StpPort::default(); max_ports as usize],
        }
    }

    pub fn is_free(&self) -> bool {
        self.state == InstanceState::Free
    }

    /// Returns the slot to its free state. Masks must already be empty.
    pub fn release(&mut self) {
        self.vlan_id = None;
        self.fast_aging = false;
        self.state = InstanceState::Free;
        self.bridge = BridgeData::default();
        self.hello_timer.stop();
        self.tcn_timer.stop();
        self.topology_change_timer.stop();
        self.last_bpdu_rx_time = 0;
        self.modified_fields = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_instance_is_free() {
        let inst = StpInstance::new(8);
        assert!(inst.is_free());
        assert!(inst.enable_mask.is_clear());
        assert!(inst.control_mask.is_clear());
        assert_eq!(inst.ports.len(), 8);
    }

    #[test]
    fn test_release_resets_slot() {
        let mut inst = StpInstance::new(4);
        inst.state = InstanceState::Active;
        inst.vlan_id = VlanId::new(100).ok();
        inst.hello_timer.start(3);
        inst.release();
        assert!(inst.is_free());
        assert_eq!(inst.vlan_id, None);
        assert!(!inst.hello_timer.is_active());
    }
}
