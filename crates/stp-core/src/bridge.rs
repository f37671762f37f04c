//! Per-VLAN bridge data.

use stp_types::{BridgeId, PortNumber};

/// Modified-field bit positions for [`BridgeData::modified_fields`].
pub mod dirty {
    pub const ROOT_ID: u32 = 1 << 0;
    pub const ROOT_PATH_COST: u32 = 1 << 1;
    pub const ROOT_PORT: u32 = 1 << 2;
    pub const MAX_AGE: u32 = 1 << 3;
    pub const HELLO_TIME: u32 = 1 << 4;
    pub const FORWARD_DELAY: u32 = 1 << 5;
    pub const BRIDGE_MAX_AGE: u32 = 1 << 6;
    pub const BRIDGE_HELLO_TIME: u32 = 1 << 7;
    pub const BRIDGE_FORWARD_DELAY: u32 = 1 << 8;
    pub const BRIDGE_ID: u32 = 1 << 9;
    pub const TOPO_CHANGE_COUNT: u32 = 1 << 10;
    pub const TOPO_CHANGE_TIME: u32 = 1 << 11;
    pub const HOLD_TIME: u32 = 1 << 12;
    pub const ALL: u32 = u32::MAX;
}

/// Root and timer knowledge of one VLAN's bridge.
///
/// `max_age`, `hello_time` and `forward_delay` are the operational values
/// learned from the root; the `bridge_*` variants are this bridge's own
/// administrative configuration, applied whenever it is (or becomes) root.
#[derive(Debug, Clone, Default)]
pub struct BridgeData {
    pub root_id: BridgeId,
    pub root_path_cost: u32,
    pub root_port: Option<PortNumber>,

    pub max_age: u8,
    pub hello_time: u8,
    pub forward_delay: u8,
    pub hold_time: u8,

    pub bridge_max_age: u8,
    pub bridge_hello_time: u8,
    pub bridge_forward_delay: u8,

    pub bridge_id: BridgeId,

    pub topology_change_count: u32,
    /// Engine uptime second at which the last topology change began.
    pub topology_change_tick: u32,
    /// max_age + forward_delay; lifetime of the topology-change timer.
    pub topology_change_time: u8,
    pub topology_change_detected: bool,
    pub topology_change: bool,

    /// Bitmask of fields changed since the last publication.
    pub modified_fields: u32,
}

impl BridgeData {
    /// True when this bridge is the root of its VLAN.
    pub fn is_root(&self) -> bool {
        self.root_id == self.bridge_id
    }

    pub fn mark(&mut self, bits: u32) {
        self.modified_fields |= bits;
    }

    /// Copies the administrative timer values into the operational ones.
    /// Only meaningful on the root bridge.
    pub fn apply_own_times(&mut self) {
        self.max_age = self.bridge_max_age;
        self.hello_time = self.bridge_hello_time;
        self.forward_delay = self.bridge_forward_delay;
        self.mark(dirty::MAX_AGE | dirty::HELLO_TIME | dirty::FORWARD_DELAY);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_when_ids_match() {
        let mut b = BridgeData::default();
        assert!(b.is_root());
        b.root_id = BridgeId::from_parts(0x1000, [0, 0, 0, 0, 0, 1].into());
        assert!(!b.is_root());
    }

    #[test]
    fn test_apply_own_times() {
        let mut b = BridgeData {
            bridge_max_age: 20,
            bridge_hello_time: 2,
            bridge_forward_delay: 15,
            ..Default::default()
        };
        b.apply_own_times();
        assert_eq!((b.max_age, b.hello_time, b.forward_delay), (20, 2, 15));
        assert_ne!(b.modified_fields & dirty::MAX_AGE, 0);
    }
}
