//! Engine state and management operations.
//!
//! Everything the daemon owns lives in one [`StpEngine`] value: the
//! instance table, the interface table, the global masks and counters, and
//! the publication/transport seams.

use crate::bridge::dirty as bridge_dirty;
use crate::instance::{InstanceState, StpInstance};
use crate::intf::PortTable;
use crate::port::{dirty as port_dirty, per_vlan, KernelState, StpPort};
use crate::sync::{StateSync, VlanPortTableUpdate, VlanTableUpdate};
use crate::timer::ticks_to_seconds;
use crate::transport::BpduTransport;
use crate::{params, ConfigError, StpIndex};
use stp_packet::{BpduFlags, ConfigBpdu, PvstFrame, StpFrame};
use stp_types::{MacAddress, PortMask, PortNumber, PortState, VlanId};
use tracing::{debug, info, warn};

/// Configured L2 protocol mode. `None` keeps the engine loaded but silent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtoMode {
    #[default]
    None,
    Pvst,
}

/// Startup parameters.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub max_instances: u16,
    pub max_ports: u16,
    pub extend_mode: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_instances: 16,
            max_ports: 64,
            extend_mode: true,
        }
    }
}

/// The protocol engine.
pub struct StpEngine<S: StateSync, T: BpduTransport> {
    pub(crate) max_instances: u16,
    pub(crate) active_instances: u16,
    pub(crate) instances: Vec<StpInstance>,

    pub(crate) enabled: bool,
    pub(crate) proto_mode: ProtoMode,
    pub(crate) extend_mode: bool,
    pub(crate) base_mac: MacAddress,
    pub(crate) root_protect_timeout: u16,

    pub intf: PortTable,

    pub(crate) enable_mask: PortMask,
    pub(crate) enable_admin_mask: PortMask,
    pub(crate) fastspan_mask: PortMask,
    pub(crate) fastspan_admin_mask: PortMask,
    pub(crate) fastuplink_admin_mask: PortMask,
    pub(crate) protect_mask: PortMask,
    pub(crate) protect_do_disable_mask: PortMask,
    pub(crate) protect_disabled_mask: PortMask,
    pub(crate) root_protect_mask: PortMask,

    pub(crate) stp_drop_count: u32,
    pub(crate) tcn_drop_count: u32,
    pub(crate) pvst_drop_count: u32,

    pub(crate) tick_id: u8,
    pub(crate) bpdu_sync_tick_id: u8,
    pub(crate) uptime_ticks: u64,

    pub sync: S,
    pub transport: T,
}

impl<S: StateSync, T: BpduTransport> StpEngine<S, T> {
    pub fn new(config: EngineConfig, sync: S, transport: T) -> Self {
        let max_ports = config.max_ports;
        let mut fastspan_mask = PortMask::new(max_ports);
        let mut fastspan_admin_mask = PortMask::new(max_ports);
        // fast span starts enabled everywhere
        for port in 0..max_ports {
            fastspan_mask.set(port);
            fastspan_admin_mask.set(port);
        }

        StpEngine {
            max_instances: config.max_instances,
            active_instances: 0,
            instances: (0..config.max_instances)
                .map(|_| StpInstance::new(max_ports))
                .collect(),
            enabled: false,
            proto_mode: ProtoMode::default(),
            extend_mode: config.extend_mode,
            base_mac: MacAddress::ZERO,
            root_protect_timeout: params::DFLT_ROOT_PROTECT_TIMEOUT,
            intf: PortTable::new(max_ports, config.extend_mode),
            enable_mask: PortMask::new(max_ports),
            enable_admin_mask: PortMask::new(max_ports),
            fastspan_mask,
            fastspan_admin_mask,
            fastuplink_admin_mask: PortMask::new(max_ports),
            protect_mask: PortMask::new(max_ports),
            protect_do_disable_mask: PortMask::new(max_ports),
            protect_disabled_mask: PortMask::new(max_ports),
            root_protect_mask: PortMask::new(max_ports),
            stp_drop_count: 0,
            tcn_drop_count: 0,
            pvst_drop_count: 0,
            tick_id: 0,
            bpdu_sync_tick_id: 0,
            uptime_ticks: 0,
            sync,
            transport,
        }
    }

    // ------------------------------------------------------------------
    // accessors

    pub fn max_instances(&self) -> u16 {
        self.max_instances
    }

    pub fn active_instances(&self) -> u16 {
        self.active_instances
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn extend_mode(&self) -> bool {
        self.extend_mode
    }

    pub fn base_mac(&self) -> MacAddress {
        self.base_mac
    }

    pub fn root_protect_timeout(&self) -> u16 {
        self.root_protect_timeout
    }

    pub fn drop_counters(&self) -> (u32, u32, u32) {
        (self.stp_drop_count, self.tcn_drop_count, self.pvst_drop_count)
    }

    /// Operational PortFast on `port`.
    pub fn is_portfast_oper(&self, port: PortNumber) -> bool {
        self.fastspan_mask.contains(port)
    }

    /// True while BPDU guard holds `port` administratively down.
    pub fn is_bpdu_guard_disabled(&self, port: PortNumber) -> bool {
        self.protect_disabled_mask.contains(port)
    }

    /// Marks the kernel shadow as forwarding without touching the kernel.
    ///
    /// Used when a VLAN member is deleted: the port was forced to
    /// forwarding just before, so the vid must stay on the bridge port and
    /// the delete-time push has to be a no-op.
    pub fn mark_kernel_forwarding(&mut self, idx: StpIndex, port: PortNumber) {
        if idx < self.max_instances && !self.instances[idx as usize].is_free() {
            self.instances[idx as usize].ports[port as usize].kernel_state = KernelState::Forward;
        }
    }

    pub fn instance(&self, idx: StpIndex) -> Option<&StpInstance> {
        self.instances.get(idx as usize).filter(|i| !i.is_free())
    }

    /// Engine uptime in whole seconds (ten 100 ms ticks per second).
    pub fn uptime_seconds(&self) -> u32 {
        (self.uptime_ticks / 10) as u32
    }

    /// Scans the instance table for `vlan`.
    pub fn index_of_vlan(&self, vlan: VlanId) -> Option<StpIndex> {
        self.instances
            .iter()
            .position(|i| !i.is_free() && i.vlan_id == Some(vlan))
            .map(|i| i as StpIndex)
    }

    /// The VLAN for which `port` is an untagged member, if any.
    pub fn untag_vlan_of(&self, port: PortNumber) -> Option<VlanId> {
        self.instances
            .iter()
            .find(|i| !i.is_free() && i.untag_mask.contains(port))
            .and_then(|i| i.vlan_id)
    }

    pub(crate) fn port_name(&self, port: PortNumber) -> String {
        self.intf
            .name_of(port)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Port{port}"))
    }

    // ------------------------------------------------------------------
    // bridge-level configuration

    /// Applies a BridgeConfig set: protocol mode, root-guard timeout, base
    /// MAC. A delete releases every instance.
    pub fn set_bridge_config(
        &mut self,
        mode: ProtoMode,
        rootguard_timeout: u16,
        base_mac: MacAddress,
    ) -> Result<(), ConfigError> {
        self.config_root_protect_timeout(rootguard_timeout)?;
        self.enabled = true;
        self.proto_mode = mode;
        self.base_mac = base_mac;
        info!(?mode, rootguard_timeout, %base_mac, "bridge config applied");
        Ok(())
    }

    /// BridgeConfig delete: drop all instances and reset port parameters.
    pub fn clear_bridge_config(&mut self) {
        self.enabled = false;
        for idx in 0..self.instances.len() as StpIndex {
            if !self.instances[idx as usize].is_free() {
                self.release_index(idx);
            }
        }
        self.enable_mask.clear_all();
        self.intf.reset_port_params();
        info!("bridge config cleared");
    }

    pub fn config_root_protect_timeout(&mut self, timeout: u16) -> Result<(), ConfigError> {
        if !(params::MIN_ROOT_PROTECT_TIMEOUT..=params::MAX_ROOT_PROTECT_TIMEOUT).contains(&timeout)
        {
            return Err(ConfigError::OutOfRange {
                what: "root-protect timeout",
                value: timeout as i64,
                min: params::MIN_ROOT_PROTECT_TIMEOUT as i64,
                max: params::MAX_ROOT_PROTECT_TIMEOUT as i64,
            });
        }
        self.root_protect_timeout = timeout;
        Ok(())
    }

    pub fn set_extend_mode(&mut self, enable: bool) {
        if self.extend_mode != enable {
            self.extend_mode = enable;
            self.intf.set_extend_mode(enable);
        }
    }

    // ------------------------------------------------------------------
    // instance lifecycle

    /// Claims slot `idx` for `vlan` and seeds the bridge data.
    pub fn init_class(&mut self, idx: StpIndex, vlan: VlanId) -> Result<(), ConfigError> {
        if idx >= self.max_instances {
            return Err(ConfigError::BadInstance(idx));
        }
        if !self.instances[idx as usize].is_free() {
            return Err(ConfigError::InstanceInUse(idx));
        }

        self.instances[idx as usize].state = InstanceState::Config;
        self.active_instances += 1;
        self.initialize_stp_class(idx, vlan);
        Ok(())
    }

    pub(crate) fn initialize_stp_class(&mut self, idx: StpIndex, vlan: VlanId) {
        let extend = self.extend_mode;
        let base_mac = self.base_mac;
        let inst = &mut self.instances[idx as usize];

        inst.vlan_id = Some(vlan);

        let bridge = &mut inst.bridge;
        bridge.bridge_id = stp_types::BridgeId::new(params::DFLT_PRIORITY, vlan, base_mac, extend);
        bridge.bridge_max_age = params::DFLT_MAX_AGE;
        bridge.bridge_hello_time = params::DFLT_HELLO_TIME;
        bridge.bridge_forward_delay = params::DFLT_FORWARD_DELAY;
        bridge.hold_time = params::DFLT_HOLD_TIME;

        bridge.root_id = bridge.bridge_id;
        bridge.root_path_cost = 0;
        bridge.root_port = None;

        bridge.max_age = bridge.bridge_max_age;
        bridge.hello_time = bridge.bridge_hello_time;
        bridge.forward_delay = bridge.bridge_forward_delay;
        bridge.topology_change_time = bridge.max_age + bridge.forward_delay;

        bridge.mark(bridge_dirty::ALL);
        inst.modified_fields = u32::MAX;
    }

    /// Releases slot `idx`: deactivates, deletes every control port, and
    /// retires the published state.
    pub fn release_index(&mut self, idx: StpIndex) -> bool {
        if idx >= self.max_instances || self.instances[idx as usize].is_free() {
            return false;
        }

        self.instances[idx as usize].enable_mask.clear_all();
        self.deactivate_stp_class(idx);

        let ports: Vec<PortNumber> = self.instances[idx as usize].control_mask.iter().collect();
        for port in ports {
            self.delete_control_port(idx, port, true);
        }

        let vlan = self.instances[idx as usize].vlan_id;
        if let Some(vlan) = vlan {
            self.sync.del_vlan_from_instance(vlan, idx);
            self.sync.del_vlan_table(vlan);
        }

        self.instances[idx as usize].release();
        self.active_instances -= 1;
        true
    }

    pub(crate) fn activate_stp_class(&mut self, idx: StpIndex) {
        {
            let inst = &mut self.instances[idx as usize];
            inst.state = InstanceState::Active;
            inst.bridge.topology_change_detected = false;
            inst.bridge.topology_change = false;
            inst.tcn_timer.stop();
            inst.topology_change_timer.stop();
        }

        self.port_state_selection(idx);
        self.config_bpdu_generation(idx);
        self.instances[idx as usize].hello_timer.start(0);
    }

    pub(crate) fn deactivate_stp_class(&mut self, idx: StpIndex) {
        if self.instances[idx as usize].state == InstanceState::Config {
            return;
        }

        {
            let inst = &mut self.instances[idx as usize];
            inst.state = InstanceState::Config;
            inst.tcn_timer.stop();
            inst.topology_change_timer.stop();
            inst.hello_timer.stop();
        }

        if self.instances[idx as usize].bridge.topology_change {
            self.instances[idx as usize].bridge.topology_change = false;
            self.set_vlan_topo_change(idx);
        }

        let inst = &mut self.instances[idx as usize];
        inst.bridge.root_id = inst.bridge.bridge_id;
        inst.bridge.root_path_cost = 0;
        inst.bridge.root_port = None;
        self.set_bridge_params(idx);
    }

    /// Propagates admin timer values to the operational ones on the root.
    pub(crate) fn set_bridge_params(&mut self, idx: StpIndex) {
        let inst = &mut self.instances[idx as usize];
        if inst.bridge.is_root() {
            inst.bridge.apply_own_times();
            inst.bridge.topology_change_time = inst.bridge.max_age + inst.bridge.forward_delay;
        }
    }

    // ------------------------------------------------------------------
    // control / enable port management

    /// Adds `port` to the instance's control mask. `untagged` also places
    /// it in the untag mask (classic BPDUs flow there).
    pub fn add_control_port(&mut self, idx: StpIndex, port: PortNumber, untagged: bool) -> bool {
        if idx >= self.max_instances || self.instances[idx as usize].is_free() {
            return false;
        }

        if self.instances[idx as usize].control_mask.contains(port) {
            return true;
        }

        debug!(idx, port, untagged, "add control port");
        self.instances[idx as usize].control_mask.set(port);
        if untagged {
            self.instances[idx as usize].untag_mask.set(port);
        }

        self.initialize_control_port(idx, port);

        if self.intf.is_up(port) {
            self.add_enable_port(idx, port);
        } else {
            self.apply_port_state(idx, port);
        }

        self.instances[idx as usize].ports[port as usize].mark(port_dirty::ALL);
        true
    }

    /// Removes `port` from the instance. The port returns to forwarding so
    /// traffic is not black-holed once the protocol lets go of it.
    pub fn delete_control_port(&mut self, idx: StpIndex, port: PortNumber, del_port_state: bool) -> bool {
        if idx >= self.max_instances || self.instances[idx as usize].is_free() {
            return false;
        }
        if !self.instances[idx as usize].control_mask.contains(port) {
            return false;
        }

        self.instances[idx as usize].ports[port as usize].state = PortState::Forwarding;
        self.push_kernel_state(idx, port);
        if !del_port_state {
            let name = self.port_name(port);
            self.sync.update_port_state(&name, idx, PortState::Forwarding);
        }

        self.delete_enable_port(idx, port);

        let name = self.port_name(port);
        if del_port_state {
            self.sync.del_port_state(&name, idx);
        }
        if let Some(vlan) = self.instances[idx as usize].vlan_id {
            self.sync.del_vlan_port_table(&name, vlan);
        }

        let inst = &mut self.instances[idx as usize];
        inst.control_mask.clear(port);
        inst.untag_mask.clear(port);
        inst.ports[port as usize] = StpPort::default();
        true
    }

    /// Brings `port` into protocol operation; activates the instance if it
    /// was only configured.
    pub fn add_enable_port(&mut self, idx: StpIndex, port: PortNumber) -> bool {
        if idx >= self.max_instances {
            return false;
        }
        if self.instances[idx as usize].enable_mask.contains(port) {
            return true;
        }
        if !self.instances[idx as usize].control_mask.contains(port) {
            warn!(idx, port, "enable for port outside control mask");
            return false;
        }

        if self.instances[idx as usize].state == InstanceState::Config {
            self.activate_stp_class(idx);
        }

        self.enable_port(idx, port);
        true
    }

    /// Takes `port` out of operation; deactivates the instance when the
    /// enable mask empties.
    pub fn delete_enable_port(&mut self, idx: StpIndex, port: PortNumber) -> bool {
        if idx >= self.max_instances {
            return false;
        }
        if !self.instances[idx as usize].enable_mask.contains(port) {
            return true;
        }

        self.disable_port(idx, port);
        if self.instances[idx as usize].enable_mask.is_clear() {
            self.deactivate_stp_class(idx);
        }
        true
    }

    pub(crate) fn initialize_control_port(&mut self, idx: StpIndex, port: PortNumber) {
        let priority = self.intf.priority(port);
        let path_cost = self.intf.path_cost(port);
        let p = &mut self.instances[idx as usize].ports[port as usize];
        *p = StpPort::default();
        p.port_id = stp_types::PortId::new(port, priority);
        p.path_cost = path_cost;
        p.change_detection_enabled = true;
        p.auto_config = true;
    }

    /// 802.1D 8.8.1.
    pub(crate) fn initialize_port(&mut self, idx: StpIndex, port: PortNumber) {
        self.become_designated_port(idx, port);

        let p = &mut self.instances[idx as usize].ports[port as usize];
        p.state = PortState::Blocking;
        p.topology_change_acknowledge = false;
        p.config_pending = false;
        p.change_detection_enabled = true;
        p.self_loop = false;
        p.message_age_timer.stop();
        p.forward_delay_timer.stop();
        p.hold_timer.stop();
        p.mark(port_dirty::PORT_STATE);

        self.apply_port_state(idx, port);
    }

    /// 802.1D 8.8.2.
    pub(crate) fn enable_port(&mut self, idx: StpIndex, port: PortNumber) {
        if self.instances[idx as usize].enable_mask.contains(port) {
            return;
        }
        self.instances[idx as usize].enable_mask.set(port);
        self.initialize_port(idx, port);
        self.port_state_selection(idx);
    }

    /// 802.1D 8.8.3.
    pub(crate) fn disable_port(&mut self, idx: StpIndex, port: PortNumber) {
        if !self.instances[idx as usize].enable_mask.contains(port) {
            return;
        }

        let was_root = self.instances[idx as usize].bridge.is_root();
        let was_forwarding =
            self.instances[idx as usize].ports[port as usize].state == PortState::Forwarding;
        let change_detection = self.instances[idx as usize].ports[port as usize]
            .change_detection_enabled
            && !self.fastspan_mask.contains(port);
        self.become_designated_port(idx, port);

        // the state stays local: the caller initiated this from the port
        // side, pushing it back out would fight the link event
        {
            let p = &mut self.instances[idx as usize].ports[port as usize];
            p.state = PortState::Disabled;
            p.topology_change_acknowledge = false;
            p.config_pending = false;
            p.change_detection_enabled = true;
            p.self_loop = false;
            p.message_age_timer.stop();
            p.forward_delay_timer.stop();
            p.root_protect_timer.stop();
            p.mark(port_dirty::PORT_STATE);
        }

        self.instances[idx as usize].enable_mask.clear(port);
        self.configuration_update(idx);
        self.port_state_selection(idx);

        if self.instances[idx as usize].bridge.is_root() && !was_root {
            self.instances[idx as usize].bridge.apply_own_times();
            self.topology_change_detection(idx);
            self.instances[idx as usize].tcn_timer.stop();
            self.config_bpdu_generation(idx);
            self.instances[idx as usize].hello_timer.start(0);
        } else if was_forwarding && change_detection {
            // losing a forwarding port is a topology change
            self.topology_change_detection(idx);
        }
    }

    // ------------------------------------------------------------------
    // per-instance parameter configuration

    pub fn config_bridge_priority(&mut self, idx: StpIndex, priority: u16) -> bool {
        if idx >= self.max_instances || self.instances[idx as usize].is_free() {
            return false;
        }

        let extend = self.extend_mode;
        let inst = &self.instances[idx as usize];
        let Some(vlan) = inst.vlan_id else {
            return false;
        };
        let mut bridge_id = inst.bridge.bridge_id;
        if bridge_id.priority(extend) == priority {
            return true;
        }
        bridge_id.set_priority(priority, vlan, extend);

        if self.instances[idx as usize].state == InstanceState::Active {
            self.set_bridge_priority(idx, bridge_id);
            let inst = &mut self.instances[idx as usize];
            inst.bridge.mark(bridge_dirty::ALL);
            inst.modified_fields = u32::MAX;
        } else {
            let inst = &mut self.instances[idx as usize];
            inst.bridge.bridge_id = bridge_id;
            inst.bridge.root_id = bridge_id;
            inst.bridge.mark(bridge_dirty::BRIDGE_ID | bridge_dirty::ROOT_ID);
        }
        true
    }

    pub fn config_bridge_max_age(&mut self, idx: StpIndex, max_age: u8) -> bool {
        if idx >= self.max_instances || self.instances[idx as usize].is_free() {
            return false;
        }
        let inst = &mut self.instances[idx as usize];
        if max_age != 0 && inst.bridge.bridge_max_age != max_age {
            inst.bridge.bridge_max_age = max_age;
            inst.bridge.mark(bridge_dirty::BRIDGE_MAX_AGE);
            self.set_bridge_params(idx);
        }
        true
    }

    pub fn config_bridge_hello_time(&mut self, idx: StpIndex, hello_time: u8) -> bool {
        if idx >= self.max_instances || self.instances[idx as usize].is_free() {
            return false;
        }
        let inst = &mut self.instances[idx as usize];
        if hello_time != 0 && inst.bridge.bridge_hello_time != hello_time {
            inst.bridge.bridge_hello_time = hello_time;
            inst.bridge.mark(bridge_dirty::BRIDGE_HELLO_TIME);
            self.set_bridge_params(idx);
        }
        true
    }

    pub fn config_bridge_forward_delay(&mut self, idx: StpIndex, forward_delay: u8) -> bool {
        if idx >= self.max_instances || self.instances[idx as usize].is_free() {
            return false;
        }
        let inst = &mut self.instances[idx as usize];
        if forward_delay != 0 && inst.bridge.bridge_forward_delay != forward_delay {
            inst.bridge.bridge_forward_delay = forward_delay;
            inst.bridge.mark(bridge_dirty::BRIDGE_FORWARD_DELAY);
            self.set_bridge_params(idx);
        }
        true
    }

    /// 802.1D 8.8.4: bridge identifier change on a running instance.
    pub(crate) fn set_bridge_priority(&mut self, idx: StpIndex, bridge_id: stp_types::BridgeId) {
        let was_root = self.instances[idx as usize].bridge.is_root();

        let ports: Vec<PortNumber> = self.instances[idx as usize].enable_mask.iter().collect();
        for port in ports {
            if self.is_designated_port(idx, port) {
                let p = &mut self.instances[idx as usize].ports[port as usize];
                p.designated_bridge = bridge_id;
                p.mark(port_dirty::DESIGNATED_BRIDGE);
            }
        }

        self.instances[idx as usize].bridge.bridge_id = bridge_id;
        self.configuration_update(idx);
        self.port_state_selection(idx);

        if self.instances[idx as usize].bridge.is_root() && !was_root {
            self.instances[idx as usize].bridge.apply_own_times();
            self.topology_change_detection(idx);
            self.instances[idx as usize].tcn_timer.stop();
            self.config_bpdu_generation(idx);
            self.instances[idx as usize].hello_timer.start(0);
        }
    }

    /// Per-instance (or fanned-out global) port priority configuration.
    pub fn config_port_priority(
        &mut self,
        idx: StpIndex,
        port: PortNumber,
        priority: u8,
        is_global: bool,
    ) -> bool {
        if idx >= self.max_instances || self.instances[idx as usize].is_free() {
            return false;
        }
        if !self.instances[idx as usize].control_mask.contains(port) {
            return false;
        }

        {
            let global_priority = self.intf.priority(port);
            let p = &mut self.instances[idx as usize].ports[port as usize];
            if is_global {
                if p.flags & per_vlan::PORT_PRIORITY != 0 {
                    return true;
                }
            } else if priority == global_priority {
                p.flags &= !per_vlan::PORT_PRIORITY;
            } else {
                p.flags |= per_vlan::PORT_PRIORITY;
            }
        }

        if self.instances[idx as usize].state == InstanceState::Active {
            self.set_port_priority(idx, port, priority);
        } else {
            self.instances[idx as usize].ports[port as usize]
                .port_id
                .set_priority(priority);
        }
        self.instances[idx as usize].ports[port as usize].mark(port_dirty::PORT_PRIORITY);
        true
    }

    /// 802.1D 8.8.5.
    pub(crate) fn set_port_priority(&mut self, idx: StpIndex, port: PortNumber, priority: u8) {
        let designated = self.is_designated_port(idx, port);
        {
            let p = &mut self.instances[idx as usize].ports[port as usize];
            if designated {
                p.designated_port.set_priority(priority);
            }
            p.port_id.set_priority(priority);
            p.mark(port_dirty::PORT_PRIORITY);
        }

        let inst = &self.instances[idx as usize];
        let p = &inst.ports[port as usize];
        if inst.bridge.bridge_id == p.designated_bridge && p.port_id < p.designated_port {
            self.become_designated_port(idx, port);
            self.port_state_selection(idx);
            self.instances[idx as usize].ports[port as usize].mark(port_dirty::DESIGNATED_PORT);
        }
    }

    /// Per-instance (or fanned-out global) path-cost configuration.
    pub fn config_port_path_cost(
        &mut self,
        idx: StpIndex,
        port: PortNumber,
        auto_config: bool,
        path_cost: u32,
        is_global: bool,
    ) -> bool {
        if idx >= self.max_instances || self.instances[idx as usize].is_free() {
            return false;
        }
        if !self.instances[idx as usize].control_mask.contains(port) {
            return false;
        }

        let default_cost = self.intf.path_cost(port);
        {
            let p = &mut self.instances[idx as usize].ports[port as usize];
            if is_global {
                if p.flags & per_vlan::PATH_COST != 0 {
                    return true;
                }
            } else if path_cost == default_cost {
                p.flags &= !per_vlan::PATH_COST;
            } else {
                p.flags |= per_vlan::PATH_COST;
            }
        }

        let cost = if auto_config { default_cost } else { path_cost };
        if self.instances[idx as usize].state == InstanceState::Active {
            self.set_path_cost(idx, port, auto_config, cost);
        } else {
            let p = &mut self.instances[idx as usize].ports[port as usize];
            p.path_cost = cost;
            p.auto_config = auto_config;
        }
        self.instances[idx as usize].ports[port as usize].mark(port_dirty::PATH_COST);
        true
    }

    /// 802.1D 8.8.6.
    pub(crate) fn set_path_cost(
        &mut self,
        idx: StpIndex,
        port: PortNumber,
        auto_config: bool,
        path_cost: u32,
    ) {
        {
            let p = &mut self.instances[idx as usize].ports[port as usize];
            p.path_cost = path_cost;
            p.auto_config = auto_config;
        }
        self.configuration_update(idx);
        self.port_state_selection(idx);
    }

    /// 802.1D 8.8.7 / 8.8.8.
    pub fn set_change_detection(&mut self, idx: StpIndex, port: PortNumber, enable: bool) {
        if idx < self.max_instances && !self.instances[idx as usize].is_free() {
            self.instances[idx as usize].ports[port as usize].change_detection_enabled = enable;
        }
    }

    // ------------------------------------------------------------------
    // guard / fast features

    pub fn config_fastspan(&mut self, port: PortNumber, enable: bool) {
        if enable {
            if self.fastspan_admin_mask.contains(port) {
                return;
            }
            self.fastspan_admin_mask.set(port);
            self.fastspan_mask.set(port);
        } else {
            if !self.fastspan_admin_mask.contains(port) {
                return;
            }
            self.fastspan_admin_mask.clear(port);
            self.fastspan_mask.clear(port);
        }
        let name = self.port_name(port);
        self.sync.update_port_fast(&name, enable);
    }

    pub fn config_fastuplink(&mut self, port: PortNumber, enable: bool) {
        if enable {
            self.fastuplink_admin_mask.set(port);
        } else {
            self.fastuplink_admin_mask.clear(port);
        }
    }

    /// BPDU guard configuration. `do_disable` selects the shutdown flavor.
    pub fn config_protect(&mut self, port: PortNumber, enable: bool, do_disable: bool) {
        if enable {
            if do_disable {
                self.protect_do_disable_mask.set(port);
            } else {
                self.protect_do_disable_mask.clear(port);
            }
            self.protect_mask.set(port);
        } else {
            self.protect_do_disable_mask.clear(port);
            if self.protect_disabled_mask.contains(port) {
                self.protect_disabled_mask.clear(port);
                let name = self.port_name(port);
                self.sync.update_bpdu_guard_shutdown(&name, false);
            }
            self.protect_mask.clear(port);
        }
    }

    pub fn config_root_protect(&mut self, port: PortNumber, enable: bool) {
        if enable {
            self.root_protect_mask.set(port);
        } else {
            self.root_protect_mask.clear(port);
        }
    }

    pub fn set_global_enable(&mut self, port: PortNumber, enable: bool) {
        if enable {
            self.enable_admin_mask.set(port);
        } else {
            self.enable_admin_mask.clear(port);
        }
    }

    // ------------------------------------------------------------------
    // link events

    /// Kernel link event fan-out. Restores PortFast on down, releases a
    /// BPDU-guard shutdown on up, and flips the port in every instance that
    /// controls it.
    pub fn port_event(&mut self, port: PortNumber, up: bool) {
        info!(port, up, "interface event");
        self.intf.set_oper_state(port, up);

        if !up
            && !self.fastspan_mask.contains(port)
            && self.fastspan_admin_mask.contains(port)
        {
            self.fastspan_mask.set(port);
            let name = self.port_name(port);
            self.sync.update_port_fast(&name, true);
        }

        if up && self.protect_disabled_mask.contains(port) {
            self.protect_disabled_mask.clear(port);
            let name = self.port_name(port);
            self.sync.update_bpdu_guard_shutdown(&name, false);
        }

        if self.active_instances == 0 {
            return;
        }

        let default_cost = self.intf.default_path_cost(port, self.extend_mode);
        for idx in 0..self.instances.len() as StpIndex {
            let inst = &self.instances[idx as usize];
            if inst.is_free() || !inst.control_mask.contains(port) {
                continue;
            }

            if self.instances[idx as usize].ports[port as usize].auto_config {
                self.instances[idx as usize].ports[port as usize].path_cost = default_cost;
            }
            if up {
                self.add_enable_port(idx, port);
            } else {
                self.delete_enable_port(idx, port);
            }
            self.instances[idx as usize].ports[port as usize].mark(port_dirty::ALL);
        }
    }

    // ------------------------------------------------------------------
    // statistics

    /// Clears BPDU counters for the addressed scope. `None` widens the
    /// scope to every VLAN and/or every port.
    pub fn clear_statistics(&mut self, vlan: Option<VlanId>, port: Option<PortNumber>) {
        match vlan {
            None => {
                for idx in 0..self.instances.len() as StpIndex {
                    if !self.instances[idx as usize].is_free() {
                        self.clear_port_statistics(idx, port);
                    }
                }
            }
            Some(vlan) => {
                if let Some(idx) = self.index_of_vlan(vlan) {
                    self.clear_port_statistics(idx, port);
                }
            }
        }
    }

    fn clear_port_statistics(&mut self, idx: StpIndex, port: Option<PortNumber>) {
        let ports: Vec<PortNumber> = match port {
            Some(p) => vec![p],
            None => self.instances[idx as usize].control_mask.iter().collect(),
        };
        for port in ports {
            if self.instances[idx as usize].control_mask.contains(port) {
                self.instances[idx as usize].ports[port as usize].clear_statistics();
                self.sync_port_counters(idx, port);
            }
        }
    }

    // ------------------------------------------------------------------
    // state publication

    /// Pushes the kernel bridge-port membership when it changed.
    pub(crate) fn push_kernel_state(&mut self, idx: StpIndex, port: PortNumber) {
        let (vlan, tagged, state, shadow) = {
            let inst = &self.instances[idx as usize];
            let Some(vlan) = inst.vlan_id else { return };
            let p = &inst.ports[port as usize];
            (
                vlan,
                !inst.untag_mask.contains(port),
                p.state,
                p.kernel_state,
            )
        };

        let next = if state == PortState::Forwarding {
            KernelState::Forward
        } else {
            KernelState::Blocking
        };
        if next == shadow {
            return;
        }

        self.instances[idx as usize].ports[port as usize].kernel_state = next;
        let name = self.port_name(port);
        self.sync
            .update_kernel_port_state(&name, vlan, tagged, next == KernelState::Forward);
    }

    /// Kernel shadow plus the hardware port-state table.
    pub(crate) fn apply_port_state(&mut self, idx: StpIndex, port: PortNumber) {
        self.push_kernel_state(idx, port);
        let state = self.instances[idx as usize].ports[port as usize].state;
        let name = self.port_name(port);
        self.sync.update_port_state(&name, idx, state);
    }

    /// Fast-aging follows the topology-change flag; publish on edge only.
    pub(crate) fn set_vlan_topo_change(&mut self, idx: StpIndex) {
        let inst = &self.instances[idx as usize];
        let Some(vlan) = inst.vlan_id else { return };
        if inst.bridge.topology_change == inst.fast_aging {
            return;
        }
        let tc = inst.bridge.topology_change;
        self.sync.update_fast_aging(vlan, tc);
        self.instances[idx as usize].fast_aging = tc;
    }

    /// Publishes a port's modified fields and clears the mask.
    pub(crate) fn sync_port_class(&mut self, idx: StpIndex, port: PortNumber) {
        let name = self.port_name(port);
        let record = {
            let timeout = self.root_protect_timeout as u32;
            let bpdu_disabled = self.protect_disabled_mask.contains(port);
            let inst = &mut self.instances[idx as usize];
            let Some(vlan) = inst.vlan_id else { return };
            let p = &mut inst.ports[port as usize];
            if p.modified_fields == 0 {
                return;
            }
            let dirty = p.modified_fields;
            let is = |bit: u32| dirty & bit != 0;

            let mut record = VlanPortTableUpdate {
                if_name: name.clone(),
                vlan_id: vlan.as_u16(),
                ..Default::default()
            };

            if is(port_dirty::PORT_ID) {
                record.port_id = Some(p.port_id.number());
            }
            if is(port_dirty::PORT_PRIORITY) {
                record.port_priority = Some(p.port_id.priority());
            }
            if is(port_dirty::DESIGNATED_ROOT) {
                record.designated_root = Some(p.designated_root.to_hex_string());
            }
            if is(port_dirty::DESIGNATED_COST) {
                record.designated_cost = Some(p.designated_cost);
            }
            if is(port_dirty::DESIGNATED_BRIDGE) {
                record.designated_bridge = Some(p.designated_bridge.to_hex_string());
            }
            if is(port_dirty::DESIGNATED_PORT) {
                record.designated_port = Some(p.designated_port.as_word());
            }
            if is(port_dirty::PORT_STATE) {
                let state = if p.root_protect_timer.value().unwrap_or(0) != 0
                    && p.state == PortState::Blocking
                {
                    "ROOT-INC".to_string()
                } else if p.state == PortState::Disabled && bpdu_disabled {
                    "BPDU-DIS".to_string()
                } else {
                    p.state.as_str().to_string()
                };
                record.port_state = Some(state);

                if p.state == PortState::Disabled {
                    record.designated_cost = Some(0);
                    record.designated_root = Some("0000000000000000".to_string());
                    record.designated_bridge = Some("0000000000000000".to_string());
                }
            }
            if is(port_dirty::PATH_COST) {
                record.path_cost = Some(p.path_cost);
            }
            if is(port_dirty::FORWARD_TRANSITIONS) {
                record.forward_transitions = Some(p.forward_transitions);
            }
            if is(port_dirty::BPDU_SENT) {
                record.tx_config_bpdu = Some(p.tx_config_bpdu);
            }
            if is(port_dirty::BPDU_RECEIVED) {
                record.rx_config_bpdu = Some(p.rx_config_bpdu);
            }
            if is(port_dirty::TC_SENT) {
                record.tx_tcn_bpdu = Some(p.tx_tcn_bpdu);
            }
            if is(port_dirty::TC_RECEIVED) {
                record.rx_tcn_bpdu = Some(p.rx_tcn_bpdu);
            }
            if is(port_dirty::ROOT_PROTECT) {
                let remaining = match p.root_protect_timer.value() {
                    Some(v) if v != 0 => timeout.saturating_sub(ticks_to_seconds(v)),
                    _ => 0,
                };
                record.root_protect_timer = Some(remaining);
            }
            if is(port_dirty::CLEAR_STATS) {
                record.clear_stats = true;
            }

            p.modified_fields = 0;
            record
        };

        self.sync.update_vlan_port_table(record);
    }

    /// Publishes the instance's modified bridge fields and clears the mask.
    pub(crate) fn sync_stp_class(&mut self, idx: StpIndex) {
        let uptime = self.uptime_seconds();
        let root_port_name = {
            let inst = &self.instances[idx as usize];
            inst.bridge.root_port.map(|p| self.port_name(p))
        };

        let record = {
            let inst = &mut self.instances[idx as usize];
            let Some(vlan) = inst.vlan_id else { return };
            if inst.modified_fields == 0 && inst.bridge.modified_fields == 0 {
                return;
            }
            let dirty = inst.bridge.modified_fields;
            let is = |bit: u32| dirty & bit != 0;
            let bridge = &inst.bridge;

            let mut record = VlanTableUpdate {
                vlan_id: vlan.as_u16(),
                stp_instance: idx,
                ..Default::default()
            };

            let desig_bridge = || {
                if bridge.is_root() {
                    Some(bridge.root_id.to_hex_string())
                } else {
                    bridge
                        .root_port
                        .map(|p| inst.ports[p as usize].designated_bridge.to_hex_string())
                }
            };

            if is(bridge_dirty::ROOT_ID) {
                record.root_bridge_id = Some(bridge.root_id.to_hex_string());
                record.desig_bridge_id = desig_bridge();
            }
            if is(bridge_dirty::ROOT_PATH_COST) {
                record.root_path_cost = Some(bridge.root_path_cost);
            }
            if is(bridge_dirty::ROOT_PORT) {
                record.root_port = Some(if bridge.is_root() {
                    "Root".to_string()
                } else {
                    root_port_name.unwrap_or_default()
                });
                record.desig_bridge_id = desig_bridge();
            }
            if is(bridge_dirty::MAX_AGE) {
                record.root_max_age = Some(bridge.max_age);
            }
            if is(bridge_dirty::HELLO_TIME) {
                record.root_hello_time = Some(bridge.hello_time);
            }
            if is(bridge_dirty::FORWARD_DELAY) {
                record.root_forward_delay = Some(bridge.forward_delay);
            }
            if is(bridge_dirty::HOLD_TIME) {
                record.hold_time = Some(bridge.hold_time);
            }
            if is(bridge_dirty::BRIDGE_MAX_AGE) {
                record.max_age = Some(bridge.bridge_max_age);
            }
            if is(bridge_dirty::BRIDGE_HELLO_TIME) {
                record.hello_time = Some(bridge.bridge_hello_time);
            }
            if is(bridge_dirty::BRIDGE_FORWARD_DELAY) {
                record.forward_delay = Some(bridge.bridge_forward_delay);
            }
            if is(bridge_dirty::BRIDGE_ID) {
                record.bridge_id = Some(bridge.bridge_id.to_hex_string());
            }
            if is(bridge_dirty::TOPO_CHANGE_COUNT) {
                record.topology_change_count = Some(bridge.topology_change_count);
            }
            if is(bridge_dirty::TOPO_CHANGE_TIME) {
                record.topology_change_time = Some(if bridge.topology_change_tick != 0 {
                    uptime.saturating_sub(bridge.topology_change_tick)
                } else {
                    0
                });
            }

            inst.modified_fields = 0;
            inst.bridge.modified_fields = 0;
            record
        };

        self.sync.update_vlan_table(record);
    }

    /// Flushes the whole instance: bridge record plus every control port.
    pub(crate) fn sync_db(&mut self, idx: StpIndex) {
        self.sync_stp_class(idx);
        let ports: Vec<PortNumber> = self.instances[idx as usize].control_mask.iter().collect();
        for port in ports {
            self.sync_port_class(idx, port);
        }
    }

    pub(crate) fn sync_port_counters(&mut self, idx: StpIndex, port: PortNumber) {
        {
            let p = &mut self.instances[idx as usize].ports[port as usize];
            p.mark(
                port_dirty::BPDU_SENT
                    | port_dirty::BPDU_RECEIVED
                    | port_dirty::TC_SENT
                    | port_dirty::TC_RECEIVED,
            );
            if p.root_protect_timer.is_active() {
                p.mark(port_dirty::ROOT_PROTECT);
            }
        }
        self.sync_port_class(idx, port);
    }

    pub(crate) fn sync_bpdu_counters(&mut self, idx: StpIndex) {
        if self.instances[idx as usize].bridge.topology_change_tick != 0 {
            self.instances[idx as usize]
                .bridge
                .mark(bridge_dirty::TOPO_CHANGE_TIME);
            self.sync_stp_class(idx);
        }

        let ports: Vec<PortNumber> = self.instances[idx as usize].control_mask.iter().collect();
        for port in ports {
            self.sync_port_counters(idx, port);
        }
    }

    // ------------------------------------------------------------------
    // BPDU egress

    /// Sends a configuration BPDU out of `port` with PVST+ encapsulation;
    /// VLAN 1 additionally gets the untagged classic frame.
    pub(crate) fn send_config_bpdu(&mut self, idx: StpIndex, port: PortNumber, bpdu: &ConfigBpdu) {
        if !self.enabled || self.proto_mode != ProtoMode::Pvst {
            return;
        }
        let Some(vlan) = self.instances[idx as usize].vlan_id else {
            return;
        };
        let src = self.intf.mac(port);
        let untagged = self.instances[idx as usize].untag_mask.contains(port);

        let frame = stp_packet::build_pvst_config_frame(src, bpdu, vlan);
        self.instances[idx as usize].ports[port as usize].tx_config_bpdu += 1;
        self.transport.tx(port, vlan, &frame, !untagged);

        if vlan.is_default() {
            self.send_ieee_config_bpdu(idx, port, bpdu);
        }
    }

    /// Classic untagged IEEE BPDU on the port's untagged VLAN.
    fn send_ieee_config_bpdu(&mut self, idx: StpIndex, port: PortNumber, bpdu: &ConfigBpdu) {
        let Some(vlan) = self.untag_vlan_of(port) else {
            // strictly tagged port, nothing to send untagged
            return;
        };
        let src = self.intf.mac(port);
        let frame = stp_packet::build_config_frame(src, bpdu);
        self.instances[idx as usize].ports[port as usize].tx_config_bpdu += 1;
        self.transport.tx(port, vlan, &frame, false);
    }

    /// Sends a TCN out of `port`, with the same VLAN 1 fan-out.
    pub(crate) fn send_tcn_bpdu(&mut self, idx: StpIndex, port: PortNumber) {
        if !self.enabled || self.proto_mode != ProtoMode::Pvst {
            return;
        }
        let Some(vlan) = self.instances[idx as usize].vlan_id else {
            return;
        };
        let src = self.intf.mac(port);
        let untagged = self.instances[idx as usize].untag_mask.contains(port);

        let frame = stp_packet::build_pvst_tcn_frame(src);
        self.instances[idx as usize].ports[port as usize].tx_tcn_bpdu += 1;
        self.transport.tx(port, vlan, &frame, !untagged);

        if vlan.is_default() {
            if let Some(untag_vlan) = self.untag_vlan_of(port) {
                let frame = stp_packet::build_tcn_frame(src);
                self.instances[idx as usize].ports[port as usize].tx_tcn_bpdu += 1;
                self.transport.tx(port, untag_vlan, &frame, false);
            }
        }
    }

    // ------------------------------------------------------------------
    // BPDU ingress

    /// Entry point for every received BPDU. The destination MAC picks the
    /// classic or PVST+ pipeline.
    pub fn process_rx_bpdu(&mut self, port: PortNumber, vlan_id: u16, frame: &[u8]) {
        if VlanId::new(vlan_id).is_err() || frame.len() < 2 {
            return;
        }

        // 01:80:C2:... is the IEEE bridge group, 01:00:0C:... is PVST+
        if frame[1] == 0x80 {
            self.rx_stp_bpdu(port, vlan_id, frame);
        } else {
            self.rx_pvst_bpdu(port, vlan_id, frame);
        }
    }

    /// BPDU guard. Returns true when the frame must not be processed.
    fn protect_process(&mut self, port: PortNumber, vlan_id: u16) -> bool {
        if !self.protect_mask.contains(port) && !self.protect_do_disable_mask.contains(port) {
            return false;
        }

        if self.protect_do_disable_mask.contains(port) {
            if self.protect_disabled_mask.contains(port) {
                return true;
            }
            self.protect_disabled_mask.set(port);

            let name = self.port_name(port);
            warn!(
                "STP: BPDU({}) received, interface {} disabled due to BPDU guard trigger",
                vlan_id, name
            );
            self.sync.update_bpdu_guard_shutdown(&name, true);
            self.sync
                .update_port_admin_state(&name, false, self.intf.is_physical(port));
        }

        true
    }

    fn rx_stp_bpdu(&mut self, port: PortNumber, vlan_id: u16, frame: &[u8]) {
        if self.protect_process(port, vlan_id) {
            return;
        }

        let parsed = match stp_packet::parse_stp_frame(frame) {
            Ok(parsed) => parsed,
            Err(err) => {
                debug!(port, vlan_id, %err, "invalid STP BPDU");
                self.stp_drop_count += 1;
                return;
            }
        };

        let vlan = match VlanId::new(vlan_id) {
            Ok(v) => v,
            Err(_) => return,
        };
        let Some(idx) = self.index_of_vlan(vlan) else {
            match parsed {
                StpFrame::Tcn => self.tcn_drop_count += 1,
                StpFrame::Config(_) => self.stp_drop_count += 1,
            }
            debug!(port, vlan_id, "BPDU for unconfigured VLAN dropped");
            return;
        };

        match parsed {
            StpFrame::Config(bpdu) => {
                // 802.1D 9.3.4: stale information must not re-enter
                if bpdu.message_age >= bpdu.max_age {
                    info!(
                        "invalid BPDU (message age {} exceeds max age {})",
                        bpdu.message_age, bpdu.max_age
                    );
                    return;
                }
                self.process_config_bpdu(idx, port, &bpdu);
            }
            StpFrame::Tcn => self.process_tcn_bpdu(idx, port),
        }
    }

    fn rx_pvst_bpdu(&mut self, port: PortNumber, vlan_id: u16, frame: &[u8]) {
        if self.protect_process(port, vlan_id) {
            self.pvst_drop_count += 1;
            return;
        }

        let parsed = match stp_packet::parse_pvst_frame(frame) {
            Ok(parsed) => parsed,
            Err(err) => {
                debug!(port, vlan_id, %err, "invalid PVST BPDU");
                self.pvst_drop_count += 1;
                return;
            }
        };

        let Ok(vlan) = VlanId::new(vlan_id) else {
            self.pvst_drop_count += 1;
            return;
        };

        // VLAN 1 untagged members wait for the untagged IEEE BPDU instead
        if vlan.is_default() && self.is_port_untagged(vlan, port) {
            debug!(port, "PVST BPDU for untagged VLAN 1 dropped");
            self.pvst_drop_count += 1;
            return;
        }

        let Some(idx) = self.index_of_vlan(vlan) else {
            self.pvst_drop_count += 1;
            debug!(port, vlan_id, "PVST BPDU for unconfigured VLAN dropped");
            return;
        };

        if !self.instances[idx as usize].enable_mask.contains(port) {
            self.instances[idx as usize].rx_drop_bpdu += 1;
            return;
        }

        match parsed {
            PvstFrame::Config { bpdu, .. } => {
                if bpdu.message_age >= bpdu.max_age {
                    info!(
                        "invalid BPDU (message age {} exceeds max age {}) vlan {} port {}",
                        bpdu.message_age, bpdu.max_age, vlan_id, port
                    );
                    self.pvst_drop_count += 1;
                    return;
                }
                self.process_config_bpdu(idx, port, &bpdu);
            }
            PvstFrame::Tcn => self.process_tcn_bpdu(idx, port),
        }
    }

    fn is_port_untagged(&self, vlan: VlanId, port: PortNumber) -> bool {
        self.index_of_vlan(vlan)
            .map(|idx| self.instances[idx as usize].untag_mask.contains(port))
            .unwrap_or(false)
    }

    /// Shared config-BPDU processing once the instance is known.
    fn process_config_bpdu(&mut self, idx: StpIndex, port: PortNumber, bpdu: &ConfigBpdu) {
        if !self.instances[idx as usize].enable_mask.contains(port) {
            self.instances[idx as usize].rx_drop_bpdu += 1;
            return;
        }

        self.instances[idx as usize].ports[port as usize].rx_config_bpdu += 1;

        // any BPDU clears operational PortFast
        if self.fastspan_mask.contains(port) {
            self.fastspan_mask.clear(port);
            let name = self.port_name(port);
            self.sync.update_port_fast(&name, false);
        }

        if self.root_protect_mask.contains(port) && !self.root_protect_validate(idx, port, bpdu) {
            self.instances[idx as usize].rx_drop_bpdu += 1;
            return;
        }

        self.note_bpdu_arrival(idx, port);
        self.received_config_bpdu(idx, port, bpdu);
    }

    fn process_tcn_bpdu(&mut self, idx: StpIndex, port: PortNumber) {
        if !self.instances[idx as usize].enable_mask.contains(port) {
            self.instances[idx as usize].rx_drop_bpdu += 1;
            return;
        }

        self.instances[idx as usize].ports[port as usize].rx_tcn_bpdu += 1;

        // TCNs clear operational PortFast as well
        if self.fastspan_mask.contains(port) {
            self.fastspan_mask.clear(port);
            let name = self.port_name(port);
            self.sync.update_port_fast(&name, false);
        }

        self.note_bpdu_arrival(idx, port);
        self.received_tcn_bpdu(idx, port);
    }

    /// Rx-delay diagnostics: flag gaps beyond hello_time + 1 seconds.
    fn note_bpdu_arrival(&mut self, idx: StpIndex, port: PortNumber) {
        let now = self.uptime_seconds();
        let inst = &mut self.instances[idx as usize];
        let last = inst.last_bpdu_rx_time;
        inst.last_bpdu_rx_time = now;

        if last != 0 && now.saturating_sub(last) > inst.bridge.hello_time as u32 + 1 {
            inst.ports[port as usize].rx_delayed_bpdu += 1;
            info!(
                idx,
                port,
                now,
                last,
                "delayed BPDU arrival"
            );
        }
    }

    // ------------------------------------------------------------------
    // root guard

    /// Returns false when the BPDU trips Root Guard and must be dropped.
    pub(crate) fn root_protect_validate(
        &mut self,
        idx: StpIndex,
        port: PortNumber,
        bpdu: &ConfigBpdu,
    ) -> bool {
        if self.supersedes_port_info(idx, port, bpdu) {
            self.root_protect_violation(idx, port);
            let vlan = self.instances[idx as usize].vlan_id;
            info!(idx, port, ?vlan, "root guard violation");
            return false;
        }
        true
    }

    fn root_protect_violation(&mut self, idx: StpIndex, port: PortNumber) {
        self.make_blocking(idx, port);

        let timer_active = self.instances[idx as usize].ports[port as usize]
            .root_protect_timer
            .is_active();
        if !timer_active {
            let name = self.port_name(port);
            let vlan = self.instances[idx as usize]
                .vlan_id
                .map(|v| v.as_u16())
                .unwrap_or(0);
            warn!(
                "STP: Root Guard interface {}, VLAN {} inconsistent (Received superior BPDU)",
                name, vlan
            );
            self.instances[idx as usize].ports[port as usize].mark(port_dirty::ROOT_PROTECT);
        }

        self.instances[idx as usize].ports[port as usize]
            .root_protect_timer
            .start(0);
        // publish ROOT-INC immediately
        self.instances[idx as usize].ports[port as usize].mark(port_dirty::PORT_STATE);
    }

    /// Timer release: the port resumes its walk toward forwarding.
    pub(crate) fn root_protect_timer_expired(&mut self, idx: StpIndex, port: PortNumber) {
        if self.intf.is_up(port) {
            let name = self.port_name(port);
            let vlan = self.instances[idx as usize]
                .vlan_id
                .map(|v| v.as_u16())
                .unwrap_or(0);
            info!(
                "STP: Root Guard interface {}, VLAN {} consistent (Timeout)",
                name, vlan
            );
            self.instances[idx as usize].ports[port as usize].mark(port_dirty::ROOT_PROTECT);
        }
        self.make_forwarding(idx, port);
    }

    /// True when the UplinkFast shortcut applies to `input_port`: it is
    /// configured for UplinkFast and every other UplinkFast port of the
    /// instance is blocked or down.
    pub(crate) fn is_fastuplink_ok(&self, idx: StpIndex, input_port: PortNumber) -> bool {
        if !self.fastuplink_admin_mask.contains(input_port) {
            return false;
        }
        let inst = &self.instances[idx as usize];
        for port in inst.enable_mask.iter() {
            if port != input_port && self.fastuplink_admin_mask.contains(port) {
                let state = inst.ports[port as usize].state;
                if state != PortState::Blocking && state != PortState::Disabled {
                    return false;
                }
            }
        }
        true
    }

    // ------------------------------------------------------------------
    // misc helpers used by the protocol module

    pub(crate) fn flags_for(&self, idx: StpIndex, port: PortNumber) -> BpduFlags {
        let inst = &self.instances[idx as usize];
        BpduFlags {
            topology_change: inst.bridge.topology_change,
            topology_change_ack: inst.ports[port as usize].topology_change_acknowledge,
        }
    }
}
