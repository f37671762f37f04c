//! The 802.1D §8 state machine.
//!
//! Every operation works on one instance, identified by index, and runs to
//! completion. Tie-breaks are the total orders on bridge and port ids:
//! lower always wins.

use crate::bridge::dirty as bridge_dirty;
use crate::port::dirty as port_dirty;
use crate::sync::StateSync;
use crate::timer::ticks_to_seconds;
use crate::transport::BpduTransport;
use crate::{params, StpEngine, StpIndex};
use stp_packet::{BpduType, ConfigBpdu};
use stp_types::{PortNumber, PortState};
use tracing::debug;

impl<S: StateSync, T: BpduTransport> StpEngine<S, T> {
    pub(crate) fn root_bridge(&self, idx: StpIndex) -> bool {
        self.instances[idx as usize].bridge.is_root()
    }

    /// A port is designated when its stored designated bridge and port are
    /// this bridge and this port.
    pub(crate) fn is_designated_port(&self, idx: StpIndex, port: PortNumber) -> bool {
        let inst = &self.instances[idx as usize];
        let p = &inst.ports[port as usize];
        p.designated_bridge == inst.bridge.bridge_id && p.designated_port == p.port_id
    }

    fn designated_for_some_port(&self, idx: StpIndex) -> bool {
        let inst = &self.instances[idx as usize];
        inst.enable_mask
            .iter()
            .any(|port| inst.ports[port as usize].designated_bridge == inst.bridge.bridge_id)
    }

    /// 802.1D 8.6.2.2: does the received information beat what the port
    /// currently holds?
    pub(crate) fn supersedes_port_info(
        &self,
        idx: StpIndex,
        port: PortNumber,
        bpdu: &ConfigBpdu,
    ) -> bool {
        let inst = &self.instances[idx as usize];
        let p = &inst.ports[port as usize];

        if bpdu.root_id < p.designated_root {
            return true;
        }
        if bpdu.root_id != p.designated_root {
            return false;
        }
        if bpdu.root_path_cost < p.designated_cost {
            return true;
        }
        if bpdu.root_path_cost != p.designated_cost {
            return false;
        }
        if bpdu.bridge_id < p.designated_bridge {
            return true;
        }
        if bpdu.bridge_id != p.designated_bridge {
            return false;
        }
        bpdu.bridge_id != inst.bridge.bridge_id || bpdu.port_id <= p.designated_port
    }

    // ------------------------------------------------------------------
    // transmission

    /// 802.1D 8.6.1.
    pub(crate) fn transmit_config_bpdu(&mut self, idx: StpIndex, port: PortNumber) {
        if self.instances[idx as usize].ports[port as usize]
            .hold_timer
            .is_active()
        {
            self.instances[idx as usize].ports[port as usize].config_pending = true;
            return;
        }

        let (bpdu, max_age) = {
            let inst = &self.instances[idx as usize];
            let p = &inst.ports[port as usize];
            let bridge = &inst.bridge;

            let message_age = if bridge.is_root() {
                0
            } else {
                let root_age = bridge
                    .root_port
                    .and_then(|rp| inst.ports[rp as usize].message_age_timer.value())
                    .map(ticks_to_seconds)
                    .unwrap_or(0);
                (root_age as u16) + params::MESSAGE_AGE_INCREMENT
            };

            let bpdu = ConfigBpdu {
                version: stp_packet::STP_VERSION,
                bpdu_type: BpduType::Config.to_byte(),
                flags: self.flags_for(idx, port),
                root_id: bridge.root_id,
                root_path_cost: bridge.root_path_cost,
                bridge_id: bridge.bridge_id,
                port_id: p.port_id,
                message_age,
                max_age: bridge.max_age as u16,
                hello_time: bridge.hello_time as u16,
                forward_delay: bridge.forward_delay as u16,
            };
            (bpdu, bridge.max_age as u16)
        };

        if bpdu.message_age < max_age {
            {
                let p = &mut self.instances[idx as usize].ports[port as usize];
                p.topology_change_acknowledge = false;
                p.config_pending = false;
                p.hold_timer.start(0);
            }
            self.send_config_bpdu(idx, port, &bpdu);
        }
    }

    /// 802.1D 8.6.4.
    pub(crate) fn config_bpdu_generation(&mut self, idx: StpIndex) {
        let ports: Vec<PortNumber> = self.instances[idx as usize].enable_mask.iter().collect();
        for port in ports {
            if self.is_designated_port(idx, port) {
                self.transmit_config_bpdu(idx, port);
            }
        }
    }

    /// 802.1D 8.6.5.
    fn reply(&mut self, idx: StpIndex, port: PortNumber) {
        self.transmit_config_bpdu(idx, port);
    }

    /// 802.1D 8.6.6: TCN out of the root port.
    pub(crate) fn transmit_tcn(&mut self, idx: StpIndex) {
        if let Some(root_port) = self.instances[idx as usize].bridge.root_port {
            self.send_tcn_bpdu(idx, root_port);
        }
    }

    // ------------------------------------------------------------------
    // configuration update

    /// 802.1D 8.6.2.
    fn record_config_information(&mut self, idx: StpIndex, port: PortNumber, bpdu: &ConfigBpdu) {
        let max_age = self.instances[idx as usize].bridge.max_age;
        let p = &mut self.instances[idx as usize].ports[port as usize];
        p.designated_root = bpdu.root_id;
        p.designated_cost = bpdu.root_path_cost;
        p.designated_bridge = bpdu.bridge_id;
        p.designated_port = bpdu.port_id;
        p.mark(
            port_dirty::DESIGNATED_ROOT
                | port_dirty::DESIGNATED_COST
                | port_dirty::DESIGNATED_BRIDGE
                | port_dirty::DESIGNATED_PORT,
        );
        p.message_age_timer
            .start_seconds(bpdu.message_age.min(max_age as u16) as u32);
    }

    /// 802.1D 8.6.3.
    fn record_config_timeout_values(&mut self, idx: StpIndex, bpdu: &ConfigBpdu) {
        let bridge = &mut self.instances[idx as usize].bridge;
        bridge.max_age = bpdu.max_age as u8;
        bridge.hello_time = bpdu.hello_time as u8;
        bridge.forward_delay = bpdu.forward_delay as u8;
        bridge.topology_change_time = bridge.max_age + bridge.forward_delay;
        bridge.topology_change = bpdu.flags.topology_change;
        bridge.mark(bridge_dirty::MAX_AGE | bridge_dirty::HELLO_TIME | bridge_dirty::FORWARD_DELAY);
    }

    /// 802.1D 8.6.7.
    pub(crate) fn configuration_update(&mut self, idx: StpIndex) {
        self.root_selection(idx);
        self.designated_port_selection(idx);
    }

    /// 802.1D 8.6.8: pick the root port and the bridge's root knowledge.
    fn root_selection(&mut self, idx: StpIndex) {
        let mut best: Option<PortNumber> = None;

        {
            let inst = &self.instances[idx as usize];
            for port in inst.enable_mask.iter() {
                if self.is_designated_port(idx, port) {
                    continue;
                }
                let p = &inst.ports[port as usize];
                if p.state == PortState::Disabled {
                    continue;
                }
                if p.designated_root >= inst.bridge.bridge_id {
                    continue;
                }

                let better = match best {
                    None => true,
                    Some(b) => {
                        let q = &inst.ports[b as usize];
                        let lhs = (
                            p.designated_root,
                            p.designated_cost + p.path_cost,
                            p.designated_bridge,
                            p.designated_port,
                            p.port_id,
                        );
                        let rhs = (
                            q.designated_root,
                            q.designated_cost + q.path_cost,
                            q.designated_bridge,
                            q.designated_port,
                            q.port_id,
                        );
                        lhs < rhs
                    }
                };
                if better {
                    best = Some(port);
                }
            }
        }

        let inst = &mut self.instances[idx as usize];
        let bridge = &mut inst.bridge;
        let (new_root_id, new_cost) = match best {
            None => (bridge.bridge_id, 0),
            Some(b) => {
                let p = &inst.ports[b as usize];
                (p.designated_root, p.designated_cost + p.path_cost)
            }
        };

        if bridge.root_port != best {
            bridge.root_port = best;
            bridge.mark(bridge_dirty::ROOT_PORT);
        }
        if bridge.root_id != new_root_id {
            bridge.root_id = new_root_id;
            bridge.mark(bridge_dirty::ROOT_ID);
        }
        if bridge.root_path_cost != new_cost {
            bridge.root_path_cost = new_cost;
            bridge.mark(bridge_dirty::ROOT_PATH_COST);
        }
    }

    /// 802.1D 8.6.9.
    fn designated_port_selection(&mut self, idx: StpIndex) {
        let ports: Vec<PortNumber> = self.instances[idx as usize].enable_mask.iter().collect();
        for port in ports {
            let becomes = {
                let inst = &self.instances[idx as usize];
                let p = &inst.ports[port as usize];
                let bridge = &inst.bridge;

                self.is_designated_port(idx, port)
                    || p.designated_root != bridge.root_id
                    || bridge.root_path_cost < p.designated_cost
                    || (bridge.root_path_cost == p.designated_cost
                        && (bridge.bridge_id < p.designated_bridge
                            || (bridge.bridge_id == p.designated_bridge
                                && p.port_id <= p.designated_port)))
            };
            if becomes {
                self.become_designated_port(idx, port);
            }
        }
    }

    /// 802.1D 8.6.10.
    pub(crate) fn become_designated_port(&mut self, idx: StpIndex, port: PortNumber) {
        let inst = &mut self.instances[idx as usize];
        let root_id = inst.bridge.root_id;
        let root_path_cost = inst.bridge.root_path_cost;
        let bridge_id = inst.bridge.bridge_id;

        let p = &mut inst.ports[port as usize];
        p.designated_root = root_id;
        p.designated_cost = root_path_cost;
        p.designated_bridge = bridge_id;
        p.designated_port = p.port_id;
        p.mark(
            port_dirty::DESIGNATED_ROOT
                | port_dirty::DESIGNATED_COST
                | port_dirty::DESIGNATED_BRIDGE
                | port_dirty::DESIGNATED_PORT,
        );
    }

    /// 802.1D 8.6.11.
    pub(crate) fn port_state_selection(&mut self, idx: StpIndex) {
        let root_port = self.instances[idx as usize].bridge.root_port;
        let ports: Vec<PortNumber> = self.instances[idx as usize].enable_mask.iter().collect();

        for port in ports {
            if Some(port) == root_port {
                {
                    let p = &mut self.instances[idx as usize].ports[port as usize];
                    p.config_pending = false;
                    p.topology_change_acknowledge = false;
                }
                self.make_forwarding(idx, port);
            } else if self.is_designated_port(idx, port) {
                self.instances[idx as usize].ports[port as usize]
                    .message_age_timer
                    .stop();
                self.make_forwarding(idx, port);
            } else {
                {
                    let p = &mut self.instances[idx as usize].ports[port as usize];
                    p.config_pending = false;
                    p.topology_change_acknowledge = false;
                }
                self.make_blocking(idx, port);
            }
        }
    }

    /// 802.1D 8.6.12. Operational PortFast ports jump straight to
    /// forwarding; everyone else begins the listening walk.
    pub(crate) fn make_forwarding(&mut self, idx: StpIndex, port: PortNumber) {
        if self.instances[idx as usize].ports[port as usize].state != PortState::Blocking {
            return;
        }

        if self.fastspan_mask.contains(port) {
            let p = &mut self.instances[idx as usize].ports[port as usize];
            p.state = PortState::Forwarding;
            p.forward_transitions += 1;
            p.mark(port_dirty::PORT_STATE | port_dirty::FORWARD_TRANSITIONS);
        } else {
            let p = &mut self.instances[idx as usize].ports[port as usize];
            p.state = PortState::Listening;
            p.forward_delay_timer.start(0);
            p.mark(port_dirty::PORT_STATE);
        }
        debug!(idx, port, "make forwarding");
        self.apply_port_state(idx, port);
    }

    /// 802.1D 8.6.13.
    pub(crate) fn make_blocking(&mut self, idx: StpIndex, port: PortNumber) {
        let state = self.instances[idx as usize].ports[port as usize].state;
        if state == PortState::Disabled || state == PortState::Blocking {
            return;
        }

        if (state == PortState::Forwarding || state == PortState::Learning)
            && self.instances[idx as usize].ports[port as usize].change_detection_enabled
        {
            self.topology_change_detection(idx);
        }

        {
            let p = &mut self.instances[idx as usize].ports[port as usize];
            p.state = PortState::Blocking;
            p.forward_delay_timer.stop();
            p.mark(port_dirty::PORT_STATE);
        }
        debug!(idx, port, "make blocking");
        self.apply_port_state(idx, port);
    }

    // ------------------------------------------------------------------
    // topology change

    /// 802.1D 8.6.14.
    pub(crate) fn topology_change_detection(&mut self, idx: StpIndex) {
        let is_root = self.root_bridge(idx);
        let detected = self.instances[idx as usize].bridge.topology_change_detected;

        if is_root {
            let inst = &mut self.instances[idx as usize];
            inst.bridge.topology_change = true;
            inst.topology_change_timer.start(0);
        } else if !detected {
            self.transmit_tcn(idx);
            self.instances[idx as usize].tcn_timer.start(0);
        }

        if !detected {
            let uptime = self.uptime_seconds();
            let bridge = &mut self.instances[idx as usize].bridge;
            bridge.topology_change_count += 1;
            bridge.topology_change_tick = uptime.max(1);
            bridge.mark(bridge_dirty::TOPO_CHANGE_COUNT | bridge_dirty::TOPO_CHANGE_TIME);
        }
        self.instances[idx as usize].bridge.topology_change_detected = true;
    }

    /// 802.1D 8.6.15.
    fn topology_change_acknowledged(&mut self, idx: StpIndex) {
        let inst = &mut self.instances[idx as usize];
        inst.bridge.topology_change_detected = false;
        inst.tcn_timer.stop();
    }

    /// 802.1D 8.6.16.
    fn acknowledge_topology_change(&mut self, idx: StpIndex, port: PortNumber) {
        self.instances[idx as usize].ports[port as usize].topology_change_acknowledge = true;
        self.transmit_config_bpdu(idx, port);
    }

    // ------------------------------------------------------------------
    // reception

    /// 802.1D 8.7.1. Guards have already run; `bpdu` is host order.
    pub(crate) fn received_config_bpdu(&mut self, idx: StpIndex, port: PortNumber, bpdu: &ConfigBpdu) {
        let was_root = self.root_bridge(idx);

        if self.instances[idx as usize].ports[port as usize].state == PortState::Disabled {
            return;
        }

        if self.supersedes_port_info(idx, port, bpdu) {
            self.record_config_information(idx, port, bpdu);
            self.configuration_update(idx);
            self.port_state_selection(idx);

            if !self.root_bridge(idx) && was_root {
                // lost the root role to this BPDU
                self.instances[idx as usize].hello_timer.stop();
                if self.instances[idx as usize].bridge.topology_change_detected {
                    self.instances[idx as usize].topology_change_timer.stop();
                    self.transmit_tcn(idx);
                    self.instances[idx as usize].tcn_timer.start(0);
                }
            }

            if Some(port) == self.instances[idx as usize].bridge.root_port {
                self.record_config_timeout_values(idx, bpdu);
                self.config_bpdu_generation(idx);

                if bpdu.flags.topology_change_ack {
                    self.topology_change_acknowledged(idx);
                }
            }
        } else if self.is_designated_port(idx, port) {
            self.reply(idx, port);
        }
    }

    /// 802.1D 8.7.2: only designated ports act on a TCN.
    pub(crate) fn received_tcn_bpdu(&mut self, idx: StpIndex, port: PortNumber) {
        if self.instances[idx as usize].ports[port as usize].state == PortState::Disabled {
            return;
        }
        if !self.is_designated_port(idx, port) {
            return;
        }
        self.topology_change_detection(idx);
        self.acknowledge_topology_change(idx, port);
    }

    // ------------------------------------------------------------------
    // timer expiries

    /// 802.1D 8.9.1.
    pub(crate) fn hello_timer_expiry(&mut self, idx: StpIndex) {
        self.config_bpdu_generation(idx);
        self.instances[idx as usize].hello_timer.start(0);
    }

    /// 802.1D 8.9.2: stored information aged out.
    pub(crate) fn message_age_timer_expiry(&mut self, idx: StpIndex, port: PortNumber) {
        let was_root = self.root_bridge(idx);

        self.become_designated_port(idx, port);
        self.configuration_update(idx);
        self.port_state_selection(idx);

        if self.root_bridge(idx) && !was_root {
            self.instances[idx as usize].bridge.apply_own_times();
            {
                let bridge = &mut self.instances[idx as usize].bridge;
                bridge.topology_change_time = bridge.max_age + bridge.forward_delay;
            }
            self.topology_change_detection(idx);
            self.instances[idx as usize].tcn_timer.stop();
            self.config_bpdu_generation(idx);
            self.instances[idx as usize].hello_timer.start(0);
        }
    }

    /// 802.1D 8.9.3: the listening/learning walk.
    pub(crate) fn forwarding_delay_timer_expiry(&mut self, idx: StpIndex, port: PortNumber) {
        let state = self.instances[idx as usize].ports[port as usize].state;
        match state {
            PortState::Listening => {
                {
                    let p = &mut self.instances[idx as usize].ports[port as usize];
                    p.state = PortState::Learning;
                    p.forward_delay_timer.start(0);
                    p.mark(port_dirty::PORT_STATE);
                }
                self.apply_port_state(idx, port);
            }
            PortState::Learning => {
                {
                    let p = &mut self.instances[idx as usize].ports[port as usize];
                    p.state = PortState::Forwarding;
                    p.forward_transitions += 1;
                    p.mark(port_dirty::PORT_STATE | port_dirty::FORWARD_TRANSITIONS);
                }
                self.apply_port_state(idx, port);

                let p = &self.instances[idx as usize].ports[port as usize];
                if self.designated_for_some_port(idx)
                    && p.change_detection_enabled
                    && !p.self_loop
                {
                    self.topology_change_detection(idx);
                }
            }
            _ => {}
        }
    }

    /// 802.1D 8.9.4.
    pub(crate) fn tcn_timer_expiry(&mut self, idx: StpIndex) {
        self.transmit_tcn(idx);
        self.instances[idx as usize].tcn_timer.start(0);
    }

    /// 802.1D 8.9.5: the root declares the change over.
    pub(crate) fn topology_change_timer_expiry(&mut self, idx: StpIndex) {
        let bridge = &mut self.instances[idx as usize].bridge;
        bridge.topology_change_detected = false;
        bridge.topology_change = false;
    }

    /// 802.1D 8.9.6.
    pub(crate) fn hold_timer_expiry(&mut self, idx: StpIndex, port: PortNumber) {
        if self.instances[idx as usize].ports[port as usize].config_pending {
            self.transmit_config_bpdu(idx, port);
        }
    }
}
