//! The management adapter.
//!
//! Translates control-channel messages and kernel link events into engine
//! operations, and keeps the O(1) vlan-to-instance map. Configuration
//! validation happens here, before anything mutates the engine: a rejected
//! message leaves no trace.

use std::collections::HashMap;

use stp_core::{
    params, BpduTransport, ConfigError, EngineConfig, ProtoMode, StateSync, StpEngine, StpIndex,
};
use stp_types::{path_cost, MacAddress, PortNumber, PortState, VlanId};
use tracing::{info, warn};

use crate::commands::LAG_PREFIX;
use crate::messages::*;

/// A kernel link event, as delivered by the netlink collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Add {
        ifname: String,
        kif_index: u32,
        mac: MacAddress,
        speed_mbps: u32,
        oper_up: bool,
    },
    Del {
        ifname: String,
    },
    OperState {
        ifname: String,
        up: bool,
    },
}

/// The adapter. Owns the engine once `Init` has sized it.
pub struct StpManager<S: StateSync, T: BpduTransport> {
    engine: Option<StpEngine<S, T>>,
    seams: Option<(S, T)>,
    max_ports: u16,
    vlan_map: HashMap<u16, StpIndex>,
}

fn range(what: &'static str, value: i64, min: i64, max: i64) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            what,
            value,
            min,
            max,
        })
    }
}

impl<S: StateSync, T: BpduTransport> StpManager<S, T> {
    pub fn new(max_ports: u16, sync: S, transport: T) -> Self {
        StpManager {
            engine: None,
            seams: Some((sync, transport)),
            max_ports,
            vlan_map: HashMap::new(),
        }
    }

    pub fn engine(&self) -> Option<&StpEngine<S, T>> {
        self.engine.as_ref()
    }

    pub fn engine_mut(&mut self) -> Option<&mut StpEngine<S, T>> {
        self.engine.as_mut()
    }

    /// Drives the 100 ms scheduler.
    pub fn tick(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            engine.tick();
        }
    }

    /// Raw-frame ingress from the transport collaborator.
    pub fn handle_rx_frame(&mut self, port: PortNumber, vlan_id: u16, frame: &[u8]) {
        if let Some(engine) = self.engine.as_mut() {
            engine.process_rx_bpdu(port, vlan_id, frame);
        }
    }

    /// Kernel link event fan-in.
    pub fn handle_link_event(&mut self, event: LinkEvent) {
        let Some(engine) = self.engine.as_mut() else {
            warn!(?event, "link event before init, dropped");
            return;
        };

        match event {
            LinkEvent::Add {
                ifname,
                kif_index,
                mac,
                speed_mbps,
                oper_up,
            } => match engine.intf.register(&ifname, kif_index, mac, speed_mbps) {
                Ok(port) => engine.port_event(port, oper_up),
                Err(err) => warn!(%ifname, %err, "interface registration failed"),
            },
            LinkEvent::Del { ifname } => {
                if let Some(port) = engine.intf.port_of(&ifname) {
                    engine.port_event(port, false);
                    engine.intf.remove(&ifname);
                }
            }
            LinkEvent::OperState { ifname, up } => {
                if let Some(port) = engine.intf.port_of(&ifname) {
                    engine.port_event(port, up);
                }
            }
        }
    }

    /// Applies one control-channel message.
    pub fn handle_message(&mut self, msg: StpIpcMessage) -> Result<(), ConfigError> {
        match msg {
            StpIpcMessage::Init(m) => self.process_init(m),
            StpIpcMessage::BridgeConfig(m) => self.process_bridge_config(m),
            StpIpcMessage::VlanConfig(m) => self.process_vlan_config(m),
            StpIpcMessage::VlanPortConfig(m) => self.process_vlan_port_config(m),
            StpIpcMessage::PortConfig(m) => self.process_port_config(m),
            StpIpcMessage::VlanMemberConfig(m) => self.process_vlan_member_config(m),
            StpIpcMessage::Control(m) => self.process_control(m),
        }
    }

    fn engine_ready(&mut self) -> Result<&mut StpEngine<S, T>, ConfigError> {
        self.engine
            .as_mut()
            .ok_or(ConfigError::ResourceExhausted("engine (init pending)"))
    }

    // ------------------------------------------------------------------

    fn process_init(&mut self, msg: InitMsg) -> Result<(), ConfigError> {
        if self.engine.is_some() {
            warn!("duplicate init message ignored");
            return Ok(());
        }
        if msg.max_stp_instances == 0 {
            return Err(ConfigError::ResourceExhausted("instance slots"));
        }

        let Some((sync, transport)) = self.seams.take() else {
            return Err(ConfigError::ResourceExhausted("engine seams"));
        };
        self.engine = Some(StpEngine::new(
            EngineConfig {
                max_instances: msg.max_stp_instances,
                max_ports: self.max_ports,
                extend_mode: true,
            },
            sync,
            transport,
        ));
        info!(
            max_instances = msg.max_stp_instances,
            max_ports = self.max_ports,
            "engine initialized"
        );
        Ok(())
    }

    fn process_bridge_config(&mut self, msg: BridgeConfigMsg) -> Result<(), ConfigError> {
        let engine = self.engine_ready()?;
        match msg.opcode {
            Opcode::Set => {
                range(
                    "root-guard timeout",
                    msg.rootguard_timeout as i64,
                    params::MIN_ROOT_PROTECT_TIMEOUT as i64,
                    params::MAX_ROOT_PROTECT_TIMEOUT as i64,
                )?;
                let mode = match msg.stp_mode {
                    StpMode::Pvst => ProtoMode::Pvst,
                    // "none" keeps the daemon loaded but silent
                    StpMode::None => ProtoMode::None,
                };
                engine.set_bridge_config(mode, msg.rootguard_timeout as u16, msg.base_mac)
            }
            Opcode::Del => {
                engine.clear_bridge_config();
                self.vlan_map.clear();
                Ok(())
            }
        }
    }

    fn validate_vlan_times(
        &self,
        inst_id: StpIndex,
        new_instance: bool,
        msg: &VlanConfigMsg,
    ) -> Result<(), ConfigError> {
        if msg.forward_delay != 0 {
            range(
                "forward delay",
                msg.forward_delay as i64,
                params::MIN_FORWARD_DELAY as i64,
                params::MAX_FORWARD_DELAY as i64,
            )?;
        }
        if msg.hello_time != 0 {
            range(
                "hello time",
                msg.hello_time as i64,
                params::MIN_HELLO_TIME as i64,
                params::MAX_HELLO_TIME as i64,
            )?;
        }
        if msg.max_age != 0 {
            range(
                "max age",
                msg.max_age as i64,
                params::MIN_MAX_AGE as i64,
                params::MAX_MAX_AGE as i64,
            )?;
        }
        if msg.priority != -1 {
            range(
                "bridge priority",
                msg.priority as i64,
                params::MIN_PRIORITY as i64,
                params::MAX_PRIORITY as i64,
            )?;
        }

        // effective values after this message, for the 802.1D relation
        let (cur_fd, cur_hello, cur_age) = if new_instance {
            (
                params::DFLT_FORWARD_DELAY,
                params::DFLT_HELLO_TIME,
                params::DFLT_MAX_AGE,
            )
        } else {
            self.engine
                .as_ref()
                .and_then(|e| e.instance(inst_id))
                .map(|i| {
                    (
                        i.bridge.bridge_forward_delay,
                        i.bridge.bridge_hello_time,
                        i.bridge.bridge_max_age,
                    )
                })
                .unwrap_or((
                    params::DFLT_FORWARD_DELAY,
                    params::DFLT_HELLO_TIME,
                    params::DFLT_MAX_AGE,
                ))
        };
        let fd = if msg.forward_delay != 0 {
            msg.forward_delay as u8
        } else {
            cur_fd
        };
        let hello = if msg.hello_time != 0 {
            msg.hello_time as u8
        } else {
            cur_hello
        };
        let age = if msg.max_age != 0 {
            msg.max_age as u8
        } else {
            cur_age
        };
        if 2 * (fd as i32 - 1) < age as i32 || (age as i32) < 2 * (hello as i32 + 1) {
            return Err(ConfigError::TimerRelation);
        }
        Ok(())
    }

    fn process_vlan_config(&mut self, msg: VlanConfigMsg) -> Result<(), ConfigError> {
        let max_instances = self.engine_ready()?.max_instances();
        if msg.inst_id >= max_instances {
            return Err(ConfigError::BadInstance(msg.inst_id));
        }
        let vlan = VlanId::new(msg.vlan_id).map_err(|_| ConfigError::UnknownVlan(msg.vlan_id))?;

        match msg.opcode {
            Opcode::Set => {
                self.validate_vlan_times(msg.inst_id, msg.new_instance, &msg)?;
                let engine = self.engine_ready()?;

                if msg.new_instance {
                    engine.init_class(msg.inst_id, vlan)?;
                    engine.sync.add_vlan_to_instance(vlan, msg.inst_id);
                    self.vlan_map.insert(msg.vlan_id, msg.inst_id);

                    let engine = self.engine_ready()?;
                    for attr in &msg.ports {
                        let Some(port) = engine.intf.port_of(&attr.intf_name) else {
                            warn!(intf = %attr.intf_name, "unknown member interface skipped");
                            continue;
                        };
                        if attr.enabled {
                            engine.add_control_port(
                                msg.inst_id,
                                port,
                                attr.mode == MemberMode::Untagged,
                            );
                        } else {
                            // spanning tree stays out of the way: forward
                            engine.sync.update_port_state(
                                &attr.intf_name,
                                msg.inst_id,
                                PortState::Forwarding,
                            );
                        }
                    }
                }

                let engine = self.engine_ready()?;
                if msg.forward_delay != 0 {
                    engine.config_bridge_forward_delay(msg.inst_id, msg.forward_delay as u8);
                }
                if msg.hello_time != 0 {
                    engine.config_bridge_hello_time(msg.inst_id, msg.hello_time as u8);
                }
                if msg.max_age != 0 {
                    engine.config_bridge_max_age(msg.inst_id, msg.max_age as u8);
                }
                if msg.priority != -1 {
                    engine.config_bridge_priority(msg.inst_id, msg.priority as u16);
                }
                Ok(())
            }
            Opcode::Del => {
                let engine = self.engine_ready()?;
                engine.release_index(msg.inst_id);
                self.vlan_map.remove(&msg.vlan_id);
                Ok(())
            }
        }
    }

    fn validate_port_priority(&self, priority: i32) -> Result<(), ConfigError> {
        range(
            "port priority",
            priority as i64,
            0,
            params::MAX_PORT_PRIORITY as i64,
        )
    }

    fn validate_path_cost(&self, cost: i32) -> Result<(), ConfigError> {
        let extend = self.engine.as_ref().map(|e| e.extend_mode()).unwrap_or(true);
        let (min, max) = path_cost::bounds(extend);
        range("path cost", cost as i64, min as i64, max as i64)
    }

    fn process_vlan_port_config(&mut self, msg: VlanPortConfigMsg) -> Result<(), ConfigError> {
        if msg.priority != -1 {
            self.validate_port_priority(msg.priority)?;
        }
        if msg.path_cost != 0 {
            self.validate_path_cost(msg.path_cost)?;
        }

        let engine = self.engine_ready()?;
        if msg.inst_id >= engine.max_instances() {
            return Err(ConfigError::BadInstance(msg.inst_id));
        }
        let Some(port) = engine.intf.port_of(&msg.intf_name) else {
            return Err(ConfigError::UnknownInterface(msg.intf_name));
        };

        match msg.opcode {
            Opcode::Set => {
                if msg.priority != -1 {
                    engine.config_port_priority(msg.inst_id, port, msg.priority as u8, false);
                }
                if msg.path_cost != 0 {
                    engine.config_port_path_cost(
                        msg.inst_id,
                        port,
                        false,
                        msg.path_cost as u32,
                        false,
                    );
                }
            }
            Opcode::Del => {
                // fall back to the port-level defaults
                let priority = engine.intf.priority(port);
                engine.config_port_priority(msg.inst_id, port, priority, false);
                engine.config_port_path_cost(msg.inst_id, port, true, 0, false);
            }
        }
        Ok(())
    }

    fn process_port_config(&mut self, msg: PortConfigMsg) -> Result<(), ConfigError> {
        if msg.priority != -1 {
            self.validate_port_priority(msg.priority)?;
        }
        if msg.path_cost != 0 {
            self.validate_path_cost(msg.path_cost)?;
        }

        let engine = self.engine_ready()?;
        let port = match engine.intf.port_of(&msg.intf_name) {
            Some(port) => port,
            None if msg.intf_name.starts_with(LAG_PREFIX) => {
                // port-channel configured before the kernel interface exists
                engine.intf.preconfigure(&msg.intf_name)?
            }
            None => return Err(ConfigError::UnknownInterface(msg.intf_name)),
        };

        engine.set_global_enable(port, msg.enabled);

        match msg.opcode {
            Opcode::Set => {
                if msg.priority != -1 {
                    engine.intf.set_priority(port, msg.priority as u8);
                }
                if msg.path_cost != 0 {
                    engine.intf.set_path_cost(port, msg.path_cost as u32);
                }

                for attr in &msg.vlans {
                    if attr.inst_id >= engine.max_instances() {
                        warn!(inst = attr.inst_id, "invalid instance in port config");
                        continue;
                    }
                    if msg.enabled {
                        engine.add_control_port(
                            attr.inst_id,
                            port,
                            attr.mode == MemberMode::Untagged,
                        );
                        if msg.priority != -1 {
                            engine.config_port_priority(
                                attr.inst_id,
                                port,
                                msg.priority as u8,
                                true,
                            );
                        }
                        if msg.path_cost != 0 {
                            engine.config_port_path_cost(
                                attr.inst_id,
                                port,
                                false,
                                msg.path_cost as u32,
                                true,
                            );
                        }
                    } else {
                        engine.delete_control_port(attr.inst_id, port, false);
                    }
                }

                if msg.enabled {
                    engine.config_root_protect(port, msg.root_guard);
                    engine.config_protect(port, msg.bpdu_guard, msg.bpdu_guard_do_disable);
                    engine.config_fastspan(port, msg.portfast);
                    engine.config_fastuplink(port, msg.uplink_fast);
                }
            }
            Opcode::Del => {
                // port left L2: restore the defaults
                engine.intf.set_priority(port, stp_types::PortId::DEFAULT_PRIORITY);
                let cost = engine.intf.default_path_cost(port, engine.extend_mode());
                engine.intf.set_path_cost(port, cost);
            }
        }

        if msg.opcode == Opcode::Del || !msg.enabled {
            engine.config_root_protect(port, false);
            engine.config_protect(port, false, false);
            engine.config_fastspan(port, true);
            engine.config_fastuplink(port, false);
            engine.sync.del_stp_port(&msg.intf_name);
        }
        Ok(())
    }

    fn process_vlan_member_config(&mut self, msg: VlanMemberConfigMsg) -> Result<(), ConfigError> {
        if msg.priority != -1 {
            self.validate_port_priority(msg.priority)?;
        }
        if msg.path_cost != 0 {
            self.validate_path_cost(msg.path_cost)?;
        }

        let engine = self.engine_ready()?;
        if msg.inst_id >= engine.max_instances() {
            return Err(ConfigError::BadInstance(msg.inst_id));
        }
        let Some(port) = engine.intf.port_of(&msg.intf_name) else {
            return Err(ConfigError::UnknownInterface(msg.intf_name));
        };

        match msg.opcode {
            Opcode::Set => {
                if msg.enabled {
                    engine.add_control_port(msg.inst_id, port, msg.mode == MemberMode::Untagged);
                } else {
                    engine
                        .sync
                        .update_port_state(&msg.intf_name, msg.inst_id, PortState::Forwarding);
                }
                if msg.priority != -1 {
                    engine.config_port_priority(msg.inst_id, port, msg.priority as u8, true);
                }
                if msg.path_cost != 0 {
                    engine.config_port_path_cost(
                        msg.inst_id,
                        port,
                        false,
                        msg.path_cost as u32,
                        true,
                    );
                }
            }
            Opcode::Del => {
                let in_control = engine
                    .instance(msg.inst_id)
                    .map(|i| i.control_mask.contains(port))
                    .unwrap_or(false);
                if in_control {
                    // the vid must survive on the kernel port: deletion
                    // means "stop running STP here", not "stop forwarding"
                    engine.mark_kernel_forwarding(msg.inst_id, port);
                    engine.delete_control_port(msg.inst_id, port, true);
                } else {
                    engine.sync.del_port_state(&msg.intf_name, msg.inst_id);
                }
            }
        }
        Ok(())
    }

    fn process_control(&mut self, msg: ControlMsg) -> Result<(), ConfigError> {
        match msg {
            ControlMsg::ClearStatistics { vlan_id, intf_name } => {
                let engine = self.engine_ready()?;
                let vlan = match vlan_id {
                    Some(id) => {
                        Some(VlanId::new(id).map_err(|_| ConfigError::UnknownVlan(id))?)
                    }
                    None => None,
                };
                let port = match &intf_name {
                    Some(name) => Some(
                        engine
                            .intf
                            .port_of(name)
                            .ok_or_else(|| ConfigError::UnknownInterface(name.clone()))?,
                    ),
                    None => None,
                };
                engine.clear_statistics(vlan, port);
                Ok(())
            }
            ControlMsg::SetLogLevel { level } => {
                // the dispatch loop owns the subscriber; nothing to do here
                info!(%level, "log level change requested");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use stp_core::{InstanceState, MemorySync, MockTransport};

    type Manager = StpManager<MemorySync, MockTransport>;

    fn manager() -> Manager {
        let mut m = StpManager::new(64, MemorySync::new(), MockTransport::new());
        m.handle_message(StpIpcMessage::Init(InitMsg {
            max_stp_instances: 8,
        }))
        .unwrap();
        m.handle_message(StpIpcMessage::BridgeConfig(BridgeConfigMsg {
            opcode: Opcode::Set,
            stp_mode: StpMode::Pvst,
            rootguard_timeout: 30,
            base_mac: "aa:aa:aa:aa:aa:01".parse().unwrap(),
        }))
        .unwrap();
        m
    }

    fn link_up(m: &mut Manager, n: u16) {
        m.handle_link_event(LinkEvent::Add {
            ifname: format!("Ethernet{n}"),
            kif_index: 100 + n as u32,
            mac: MacAddress::new([0, 1, 2, 3, 4, n as u8]),
            speed_mbps: 10_000,
            oper_up: true,
        });
    }

    fn vlan_set(vlan_id: u16, inst_id: u16, ports: Vec<PortAttr>) -> StpIpcMessage {
        StpIpcMessage::VlanConfig(VlanConfigMsg {
            opcode: Opcode::Set,
            new_instance: true,
            vlan_id,
            inst_id,
            forward_delay: 15,
            hello_time: 2,
            max_age: 20,
            priority: 32768,
            ports,
        })
    }

    #[test]
    fn test_config_before_init_is_rejected() {
        let mut m: Manager = StpManager::new(64, MemorySync::new(), MockTransport::new());
        let err = m
            .handle_message(StpIpcMessage::VlanConfig(VlanConfigMsg {
                opcode: Opcode::Set,
                new_instance: true,
                vlan_id: 10,
                inst_id: 0,
                forward_delay: 0,
                hello_time: 0,
                max_age: 0,
                priority: -1,
                ports: vec![],
            }))
            .unwrap_err();
        assert!(matches!(err, ConfigError::ResourceExhausted(_)));
    }

    #[test]
    fn test_vlan_set_creates_active_instance() {
        let mut m = manager();
        link_up(&mut m, 0);

        m.handle_message(vlan_set(
            100,
            0,
            vec![PortAttr {
                intf_name: "Ethernet0".to_string(),
                mode: MemberMode::Untagged,
                enabled: true,
            }],
        ))
        .unwrap();

        let engine = m.engine().unwrap();
        let inst = engine.instance(0).unwrap();
        assert_eq!(inst.state, InstanceState::Active);
        assert_eq!(inst.vlan_id.map(|v| v.as_u16()), Some(100));
        assert!(inst.control_mask.contains(0));
        assert!(inst.enable_mask.contains(0));
        assert!(inst.untag_mask.contains(0));
    }

    #[test]
    fn test_set_then_del_returns_to_initial_state() {
        let mut m = manager();
        link_up(&mut m, 0);

        m.handle_message(vlan_set(
            100,
            0,
            vec![PortAttr {
                intf_name: "Ethernet0".to_string(),
                mode: MemberMode::Tagged,
                enabled: true,
            }],
        ))
        .unwrap();

        m.handle_message(StpIpcMessage::VlanConfig(VlanConfigMsg {
            opcode: Opcode::Del,
            new_instance: false,
            vlan_id: 100,
            inst_id: 0,
            forward_delay: 0,
            hello_time: 0,
            max_age: 0,
            priority: -1,
            ports: vec![],
        }))
        .unwrap();

        let engine = m.engine().unwrap();
        assert!(engine.instance(0).is_none());
        assert_eq!(engine.active_instances(), 0);
    }

    #[test]
    fn test_duplicate_vlan_set_is_rejected_not_applied_twice() {
        let mut m = manager();
        link_up(&mut m, 0);

        m.handle_message(vlan_set(100, 0, vec![])).unwrap();
        let err = m.handle_message(vlan_set(100, 0, vec![])).unwrap_err();
        assert_eq!(err, ConfigError::InstanceInUse(0));
        // first configuration stands
        assert!(m.engine().unwrap().instance(0).is_some());
    }

    #[test]
    fn test_out_of_range_values_rejected_without_mutation() {
        let mut m = manager();
        link_up(&mut m, 0);

        let mut msg = match vlan_set(100, 0, vec![]) {
            StpIpcMessage::VlanConfig(m) => m,
            _ => unreachable!(),
        };
        msg.forward_delay = 99;
        let err = m
            .handle_message(StpIpcMessage::VlanConfig(msg))
            .unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { what: "forward delay", .. }));
        assert!(m.engine().unwrap().instance(0).is_none());
    }

    #[test]
    fn test_timer_relation_enforced() {
        let mut m = manager();
        let mut msg = match vlan_set(100, 0, vec![]) {
            StpIpcMessage::VlanConfig(m) => m,
            _ => unreachable!(),
        };
        // max_age 40 cannot be covered by 2*(fd-1) with fd 15
        msg.max_age = 40;
        let err = m
            .handle_message(StpIpcMessage::VlanConfig(msg))
            .unwrap_err();
        assert_eq!(err, ConfigError::TimerRelation);
    }

    #[test]
    fn test_port_config_sets_guards_and_fast_masks() {
        let mut m = manager();
        link_up(&mut m, 0);
        m.handle_message(vlan_set(100, 0, vec![])).unwrap();

        m.handle_message(StpIpcMessage::PortConfig(PortConfigMsg {
            opcode: Opcode::Set,
            intf_name: "Ethernet0".to_string(),
            enabled: true,
            root_guard: true,
            bpdu_guard: true,
            bpdu_guard_do_disable: false,
            portfast: false,
            uplink_fast: true,
            path_cost: 0,
            priority: -1,
            vlans: vec![VlanAttr {
                inst_id: 0,
                vlan_id: 100,
                mode: MemberMode::Tagged,
            }],
        }))
        .unwrap();

        let engine = m.engine().unwrap();
        assert!(engine.instance(0).unwrap().control_mask.contains(0));
        assert!(!engine.is_portfast_oper(0));

        // disabling the port clears the guards and restores PortFast
        m.handle_message(StpIpcMessage::PortConfig(PortConfigMsg {
            opcode: Opcode::Set,
            intf_name: "Ethernet0".to_string(),
            enabled: false,
            root_guard: false,
            bpdu_guard: false,
            bpdu_guard_do_disable: false,
            portfast: false,
            uplink_fast: false,
            path_cost: 0,
            priority: -1,
            vlans: vec![VlanAttr {
                inst_id: 0,
                vlan_id: 100,
                mode: MemberMode::Tagged,
            }],
        }))
        .unwrap();

        let engine = m.engine().unwrap();
        assert!(!engine.instance(0).unwrap().control_mask.contains(0));
        assert!(engine.is_portfast_oper(0));
    }

    #[test]
    fn test_portchannel_preconfiguration() {
        let mut m = manager();
        m.handle_message(vlan_set(200, 1, vec![])).unwrap();

        // PortChannel config lands before the kernel interface appears
        m.handle_message(StpIpcMessage::PortConfig(PortConfigMsg {
            opcode: Opcode::Set,
            intf_name: "PortChannel001".to_string(),
            enabled: true,
            root_guard: false,
            bpdu_guard: false,
            bpdu_guard_do_disable: false,
            portfast: true,
            uplink_fast: false,
            path_cost: 0,
            priority: -1,
            vlans: vec![VlanAttr {
                inst_id: 1,
                vlan_id: 200,
                mode: MemberMode::Tagged,
            }],
        }))
        .unwrap();

        let engine = m.engine().unwrap();
        let port = engine.intf.port_of("PortChannel001").unwrap();
        assert!(engine.instance(1).unwrap().control_mask.contains(port));
        // not operationally up yet, so not enabled
        assert!(!engine.instance(1).unwrap().enable_mask.contains(port));
    }

    #[test]
    fn test_member_delete_keeps_kernel_forwarding() {
        let mut m = manager();
        link_up(&mut m, 4);
        m.handle_message(vlan_set(
            100,
            0,
            vec![PortAttr {
                intf_name: "Ethernet4".to_string(),
                mode: MemberMode::Tagged,
                enabled: true,
            }],
        ))
        .unwrap();

        m.handle_message(StpIpcMessage::VlanMemberConfig(VlanMemberConfigMsg {
            opcode: Opcode::Del,
            vlan_id: 100,
            inst_id: 0,
            intf_name: "Ethernet4".to_string(),
            enabled: false,
            mode: MemberMode::Tagged,
            path_cost: 0,
            priority: -1,
        }))
        .unwrap();

        // the vid stays on the kernel port: no blocking push may follow
        // the forced-forwarding one
        let engine = m.engine().unwrap();
        let forwards: Vec<bool> = engine
            .sync
            .events
            .iter()
            .filter_map(|ev| match ev {
                stp_core::SyncEvent::KernelPortState(name, 100, _, fwd) if name == "Ethernet4" => {
                    Some(*fwd)
                }
                _ => None,
            })
            .collect();
        assert_eq!(forwards.last(), Some(&true));
        assert!(engine.instance(0).unwrap().control_mask.is_clear());
    }

    #[test]
    fn test_clear_statistics_scope() {
        let mut m = manager();
        link_up(&mut m, 0);
        m.handle_message(vlan_set(
            100,
            0,
            vec![PortAttr {
                intf_name: "Ethernet0".to_string(),
                mode: MemberMode::Tagged,
                enabled: true,
            }],
        ))
        .unwrap();

        m.handle_message(StpIpcMessage::Control(ControlMsg::ClearStatistics {
            vlan_id: Some(100),
            intf_name: Some("Ethernet0".to_string()),
        }))
        .unwrap();

        let engine = m.engine().unwrap();
        assert!(engine.sync.events.iter().any(|ev| matches!(
            ev,
            stp_core::SyncEvent::VlanPortTable(rec) if rec.clear_stats
        )));

        let err = m
            .handle_message(StpIpcMessage::Control(ControlMsg::ClearStatistics {
                vlan_id: Some(999),
                intf_name: None,
            }))
            .unwrap_err();
        assert_eq!(err, ConfigError::UnknownVlan(999));
    }
}
