//! The 100 ms scheduler.
//!
//! Instances are divided into five groups; one group is serviced per tick,
//! so every instance runs its timers each 500 ms (the 802.1D half-second
//! tick). A slower 1 s cadence walks a tenth of the table per round to
//! publish BPDU counters and the topology-change clock.

use crate::instance::InstanceState;
use crate::params;
use crate::sync::StateSync;
use crate::transport::BpduTransport;
use crate::{StpEngine, StpIndex};
use stp_types::{PortNumber, PortState};
use tracing::info;

impl<S: StateSync, T: BpduTransport> StpEngine<S, T> {
    /// One 100 ms tick.
    pub fn tick(&mut self) {
        self.uptime_ticks += 1;

        if self.active_instances != 0 {
            let mut idx = self.tick_id as usize;
            while idx < self.instances.len() {
                if self.instances[idx].state == InstanceState::Active {
                    self.update_instance(idx as StpIndex);
                }
                if matches!(
                    self.instances[idx].state,
                    InstanceState::Active | InstanceState::Config
                ) {
                    self.sync_db(idx as StpIndex);
                }
                idx += 5;
            }

            if self.bpdu_sync_tick_id % 10 == 0 {
                let mut idx = (self.bpdu_sync_tick_id / 10) as usize;
                while idx < self.instances.len() {
                    if self.instances[idx].state == InstanceState::Active {
                        self.sync_bpdu_counters(idx as StpIndex);
                    }
                    idx += 10;
                }
            }
        }

        self.bpdu_sync_tick_id += 1;
        if self.bpdu_sync_tick_id >= 100 {
            self.bpdu_sync_tick_id = 0;
        }

        self.tick_id += 1;
        if self.tick_id >= 5 {
            self.tick_id = 0;
        }
    }

    /// Runs all timers of one instance once. Called every 500 ms per
    /// instance while it is active.
    pub(crate) fn update_instance(&mut self, idx: StpIndex) {
        let (hello_time, topology_change_time) = {
            let bridge = &self.instances[idx as usize].bridge;
            (bridge.hello_time as u32, bridge.topology_change_time as u32)
        };

        if self.instances[idx as usize]
            .hello_timer
            .expired_seconds(hello_time)
        {
            self.hello_timer_expiry(idx);
        }

        if self.instances[idx as usize]
            .topology_change_timer
            .expired_seconds(topology_change_time)
        {
            self.topology_change_timer_expiry(idx);
        }

        if self.instances[idx as usize]
            .tcn_timer
            .expired_seconds(hello_time)
        {
            self.tcn_timer_expiry(idx);
        }

        let ports: Vec<PortNumber> = self.instances[idx as usize].enable_mask.iter().collect();
        for port in ports {
            let forward_delay = if self.fastspan_mask.contains(port) {
                params::FASTSPAN_FORWARD_DELAY as u32
            } else if self.is_fastuplink_ok(idx, port) {
                // uplink fast brings the port over in about a second
                if self.instances[idx as usize].ports[port as usize].state == PortState::Listening {
                    params::FASTUPLINK_FORWARD_DELAY as u32
                } else {
                    0
                }
            } else {
                self.instances[idx as usize].bridge.forward_delay as u32
            };

            if self.instances[idx as usize].ports[port as usize]
                .forward_delay_timer
                .expired_seconds(forward_delay)
            {
                self.forwarding_delay_timer_expiry(idx, port);
            }

            let max_age = self.instances[idx as usize].bridge.max_age as u32;
            if self.instances[idx as usize].ports[port as usize]
                .message_age_timer
                .expired_seconds(max_age)
            {
                self.message_age_timer_expiry(idx, port);
                info!(idx, port, "message age expiry");

                let inst = &mut self.instances[idx as usize];
                inst.bridge.modified_fields = u32::MAX;
                inst.modified_fields = u32::MAX;
            }

            let hold_time = self.instances[idx as usize].bridge.hold_time as u32;
            if self.instances[idx as usize].ports[port as usize]
                .hold_timer
                .expired_seconds(hold_time)
            {
                self.hold_timer_expiry(idx, port);
            }

            let timeout = self.root_protect_timeout as u32;
            let released = {
                let p = &mut self.instances[idx as usize].ports[port as usize];
                let expired = p.root_protect_timer.expired_seconds(timeout);
                let orphaned =
                    p.root_protect_timer.is_active() && !self.root_protect_mask.contains(port);
                if orphaned {
                    p.root_protect_timer.stop();
                }
                expired || orphaned
            };
            if released {
                self.root_protect_timer_expired(idx, port);
                info!(idx, port, "root protect timer released");
            }
        }

        // fast aging tracks the topology-change flag
        self.set_vlan_topo_change(idx);
    }
}
