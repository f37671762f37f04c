//! State publication seam.
//!
//! On every instance or port change the engine pushes a record carrying the
//! modified fields only; `None` means "unchanged". The daemon implements
//! this trait against the application database; tests use [`MemorySync`],
//! which records everything it is handed.

use crate::StpIndex;
use serde::Serialize;
use stp_types::{PortState, VlanId};

/// Per-VLAN bridge record. Bridge ids travel as 16-hex-char strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VlanTableUpdate {
    pub vlan_id: u16,
    pub stp_instance: StpIndex,
    pub bridge_id: Option<String>,
    pub root_bridge_id: Option<String>,
    pub desig_bridge_id: Option<String>,
    pub root_port: Option<String>,
    pub root_path_cost: Option<u32>,
    pub root_max_age: Option<u8>,
    pub root_hello_time: Option<u8>,
    pub root_forward_delay: Option<u8>,
    pub max_age: Option<u8>,
    pub hello_time: Option<u8>,
    pub forward_delay: Option<u8>,
    pub hold_time: Option<u8>,
    pub topology_change_count: Option<u32>,
    pub topology_change_time: Option<u32>,
}

/// Per-(VLAN, port) record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VlanPortTableUpdate {
    pub if_name: String,
    pub vlan_id: u16,
    pub port_id: Option<u16>,
    pub port_priority: Option<u8>,
    pub path_cost: Option<u32>,
    /// `DISABLED`/`BLOCKING`/`LISTENING`/`LEARNING`/`FORWARDING`, or
    /// `ROOT-INC` while root-protect holds the port, or `BPDU-DIS` when
    /// BPDU guard shut it down.
    pub port_state: Option<String>,
    pub designated_cost: Option<u32>,
    pub designated_root: Option<String>,
    pub designated_bridge: Option<String>,
    pub designated_port: Option<u16>,
    pub forward_transitions: Option<u32>,
    pub tx_config_bpdu: Option<u32>,
    pub rx_config_bpdu: Option<u32>,
    pub tx_tcn_bpdu: Option<u32>,
    pub rx_tcn_bpdu: Option<u32>,
    /// Remaining root-protect seconds; `Some(0)` clears the marker.
    pub root_protect_timer: Option<u32>,
    pub clear_stats: bool,
}

/// Publication backend.
pub trait StateSync {
    fn add_vlan_to_instance(&mut self, vlan: VlanId, instance: StpIndex);
    fn del_vlan_from_instance(&mut self, vlan: VlanId, instance: StpIndex);

    fn update_vlan_table(&mut self, record: VlanTableUpdate);
    fn del_vlan_table(&mut self, vlan: VlanId);

    fn update_vlan_port_table(&mut self, record: VlanPortTableUpdate);
    fn del_vlan_port_table(&mut self, if_name: &str, vlan: VlanId);

    /// Per-instance port state for the hardware tables.
    fn update_port_state(&mut self, if_name: &str, instance: StpIndex, state: PortState);
    fn del_port_state(&mut self, if_name: &str, instance: StpIndex);

    /// Kernel bridge-port membership (forward = vid present on the port).
    fn update_kernel_port_state(&mut self, if_name: &str, vlan: VlanId, tagged: bool, forward: bool);

    fn update_fast_aging(&mut self, vlan: VlanId, enabled: bool);
    fn update_port_admin_state(&mut self, if_name: &str, up: bool, physical: bool);
    fn update_bpdu_guard_shutdown(&mut self, if_name: &str, shutdown: bool);
    fn update_port_fast(&mut self, if_name: &str, enabled: bool);
    fn del_stp_port(&mut self, if_name: &str);
}

/// Everything a [`MemorySync`] saw, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    VlanToInstance(u16, StpIndex, bool),
    VlanTable(VlanTableUpdate),
    VlanTableDel(u16),
    VlanPortTable(VlanPortTableUpdate),
    VlanPortTableDel(String, u16),
    PortState(String, StpIndex, PortState),
    PortStateDel(String, StpIndex),
    KernelPortState(String, u16, bool, bool),
    FastAging(u16, bool),
    PortAdminState(String, bool, bool),
    BpduGuardShutdown(String, bool),
    PortFast(String, bool),
    StpPortDel(String),
}

/// In-memory recording backend for tests.
#[derive(Debug, Default)]
pub struct MemorySync {
    pub events: Vec<SyncEvent>,
}

impl MemorySync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last published state of `(if_name, vlan)` in the port table.
    pub fn last_port_state(&self, if_name: &str, vlan: u16) -> Option<String> {
        self.events.iter().rev().find_map(|e| match e {
            SyncEvent::VlanPortTable(rec)
                if rec.if_name == if_name && rec.vlan_id == vlan && rec.port_state.is_some() =>
            {
                rec.port_state.clone()
            }
            _ => None,
        })
    }

    /// Last fast-aging setting for `vlan`.
    pub fn fast_aging(&self, vlan: u16) -> Option<bool> {
        self.events.iter().rev().find_map(|e| match e {
            SyncEvent::FastAging(v, on) if *v == vlan => Some(*on),
            _ => None,
        })
    }
}

impl StateSync for MemorySync {
    fn add_vlan_to_instance(&mut self, vlan: VlanId, instance: StpIndex) {
        self.events
            .push(SyncEvent::VlanToInstance(vlan.as_u16(), instance, true));
    }

    fn del_vlan_from_instance(&mut self, vlan: VlanId, instance: StpIndex) {
        self.events
            .push(SyncEvent::VlanToInstance(vlan.as_u16(), instance, false));
    }

    fn update_vlan_table(&mut self, record: VlanTableUpdate) {
        self.events.push(SyncEvent::VlanTable(record));
    }

    fn del_vlan_table(&mut self, vlan: VlanId) {
        self.events.push(SyncEvent::VlanTableDel(vlan.as_u16()));
    }

    fn update_vlan_port_table(&mut self, record: VlanPortTableUpdate) {
        self.events.push(SyncEvent::VlanPortTable(record));
    }

    fn del_vlan_port_table(&mut self, if_name: &str, vlan: VlanId) {
        self.events
            .push(SyncEvent::VlanPortTableDel(if_name.to_string(), vlan.as_u16()));
    }

    fn update_port_state(&mut self, if_name: &str, instance: StpIndex, state: PortState) {
        self.events
            .push(SyncEvent::PortState(if_name.to_string(), instance, state));
    }

    fn del_port_state(&mut self, if_name: &str, instance: StpIndex) {
        self.events
            .push(SyncEvent::PortStateDel(if_name.to_string(), instance));
    }

    fn update_kernel_port_state(
        &mut self,
        if_name: &str,
        vlan: VlanId,
        tagged: bool,
        forward: bool,
    ) {
        self.events.push(SyncEvent::KernelPortState(
            if_name.to_string(),
            vlan.as_u16(),
            tagged,
            forward,
        ));
    }

    fn update_fast_aging(&mut self, vlan: VlanId, enabled: bool) {
        self.events.push(SyncEvent::FastAging(vlan.as_u16(), enabled));
    }

    fn update_port_admin_state(&mut self, if_name: &str, up: bool, physical: bool) {
        self.events
            .push(SyncEvent::PortAdminState(if_name.to_string(), up, physical));
    }

    fn update_bpdu_guard_shutdown(&mut self, if_name: &str, shutdown: bool) {
        self.events
            .push(SyncEvent::BpduGuardShutdown(if_name.to_string(), shutdown));
    }

    fn update_port_fast(&mut self, if_name: &str, enabled: bool) {
        self.events
            .push(SyncEvent::PortFast(if_name.to_string(), enabled));
    }

    fn del_stp_port(&mut self, if_name: &str) {
        self.events.push(SyncEvent::StpPortDel(if_name.to_string()));
    }
}
