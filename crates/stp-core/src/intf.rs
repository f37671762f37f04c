//! Interface table.
//!
//! Maps interface names to dense port numbers and carries the link
//! attributes the engine consumes: operational state, speed, MAC, and the
//! port-level (global) priority and path-cost settings. Physical ports
//! occupy the lower half of the number space; port-channels are allocated
//! from a bitmap pool in the upper half so configuration can arrive before
//! the kernel interface exists.

use crate::ConfigError;
use std::collections::HashMap;
use stp_types::{path_cost, MacAddress, PortMask, PortNumber};

/// Upper bound on port-channel ids in interface names.
pub const MAX_PORT_CHANNELS: u16 = 4096;

#[derive(Debug, Clone)]
struct PortEntry {
    ifname: String,
    kif_index: u32,
    mac: MacAddress,
    speed_mbps: u32,
    oper_up: bool,
    priority: u8,
    path_cost: u32,
}

/// The port database.
#[derive(Debug)]
pub struct PortTable {
    max_ports: u16,
    po_offset: u16,
    extend_mode: bool,
    entries: Vec<Option<PortEntry>>,
    by_name: HashMap<String, PortNumber>,
    po_id_pool: PortMask,
}

impl PortTable {
    pub fn new(max_ports: u16, extend_mode: bool) -> Self {
        let po_offset = max_ports / 2;
        PortTable {
            max_ports,
            po_offset,
            extend_mode,
            entries: vec![None; max_ports as usize],
            by_name: HashMap::new(),
            po_id_pool: PortMask::new(po_offset),
        }
    }

    pub fn max_ports(&self) -> u16 {
        self.max_ports
    }

    pub fn set_extend_mode(&mut self, extend: bool) {
        self.extend_mode = extend;
    }

    fn default_entry(&self, ifname: &str, speed_mbps: u32) -> PortEntry {
        PortEntry {
            ifname: ifname.to_string(),
            kif_index: 0,
            mac: MacAddress::ZERO,
            speed_mbps,
            oper_up: false,
            priority: stp_types::PortId::DEFAULT_PRIORITY,
            path_cost: path_cost::for_speed(speed_mbps, self.extend_mode),
        }
    }

    fn slot_for_name(&mut self, ifname: &str) -> Result<PortNumber, ConfigError> {
        if let Some(&port) = self.by_name.get(ifname) {
            return Ok(port);
        }

        if let Some(n) = ifname.strip_prefix("Ethernet") {
            let n: u16 = n
                .parse()
                .map_err(|_| ConfigError::UnknownInterface(ifname.to_string()))?;
            if n >= self.po_offset {
                return Err(ConfigError::UnknownInterface(ifname.to_string()));
            }
            return Ok(n);
        }

        if ifname.starts_with("PortChannel") {
            let id = self
                .po_id_pool
                .set_first_unset()
                .ok_or(ConfigError::ResourceExhausted("port-channel id"))?;
            return Ok(self.po_offset + id);
        }

        Err(ConfigError::UnknownInterface(ifname.to_string()))
    }

    /// Registers an interface (or refreshes an existing one) and returns its
    /// port number. Port-channels claim an id from the pool on first sight.
    pub fn register(
        &mut self,
        ifname: &str,
        kif_index: u32,
        mac: MacAddress,
        speed_mbps: u32,
    ) -> Result<PortNumber, ConfigError> {
        let port = self.slot_for_name(ifname)?;
        if self.entries[port as usize].is_none() {
            let entry = self.default_entry(ifname, speed_mbps);
            self.entries[port as usize] = Some(entry);
        }
        if let Some(entry) = self.entries[port as usize].as_mut() {
            entry.kif_index = kif_index;
            entry.mac = mac;
            if speed_mbps != 0 {
                entry.speed_mbps = speed_mbps;
            }
        }
        self.by_name.insert(ifname.to_string(), port);
        Ok(port)
    }

    /// Pre-creates a port-channel slot from configuration alone.
    pub fn preconfigure(&mut self, ifname: &str) -> Result<PortNumber, ConfigError> {
        let port = self.slot_for_name(ifname)?;
        if self.entries[port as usize].is_none() {
            self.entries[port as usize] = Some(self.default_entry(ifname, 0));
            self.by_name.insert(ifname.to_string(), port);
        }
        Ok(port)
    }

    /// Drops an interface; port-channel ids return to the pool.
    pub fn remove(&mut self, ifname: &str) {
        if let Some(port) = self.by_name.remove(ifname) {
            self.entries[port as usize] = None;
            if port >= self.po_offset {
                self.po_id_pool.clear(port - self.po_offset);
            }
        }
    }

    pub fn port_of(&self, ifname: &str) -> Option<PortNumber> {
        self.by_name.get(ifname).copied()
    }

    pub fn name_of(&self, port: PortNumber) -> Option<&str> {
        self.entries
            .get(port as usize)?
            .as_ref()
            .map(|e| e.ifname.as_str())
    }

    pub fn is_physical(&self, port: PortNumber) -> bool {
        port < self.po_offset
    }

    pub fn is_up(&self, port: PortNumber) -> bool {
        self.entry(port).map(|e| e.oper_up).unwrap_or(false)
    }

    pub fn set_oper_state(&mut self, port: PortNumber, up: bool) {
        if let Some(e) = self.entry_mut(port) {
            e.oper_up = up;
        }
    }

    pub fn set_speed(&mut self, port: PortNumber, speed_mbps: u32) {
        if let Some(e) = self.entry_mut(port) {
            e.speed_mbps = speed_mbps;
        }
    }

    pub fn mac(&self, port: PortNumber) -> MacAddress {
        self.entry(port).map(|e| e.mac).unwrap_or(MacAddress::ZERO)
    }

    pub fn priority(&self, port: PortNumber) -> u8 {
        self.entry(port)
            .map(|e| e.priority)
            .unwrap_or(stp_types::PortId::DEFAULT_PRIORITY)
    }

    pub fn set_priority(&mut self, port: PortNumber, priority: u8) {
        if let Some(e) = self.entry_mut(port) {
            e.priority = priority;
        }
    }

    pub fn path_cost(&self, port: PortNumber) -> u32 {
        self.entry(port).map(|e| e.path_cost).unwrap_or(0)
    }

    pub fn set_path_cost(&mut self, port: PortNumber, cost: u32) {
        if let Some(e) = self.entry_mut(port) {
            e.path_cost = cost;
        }
    }

    /// Path cost derived from the current link speed.
    pub fn default_path_cost(&self, port: PortNumber, extend: bool) -> u32 {
        let speed = self
            .entry(port)
            .map(|e| e.speed_mbps)
            .filter(|s| *s != 0)
            .unwrap_or(path_cost::DEFAULT_SPEED_MBPS);
        path_cost::for_speed(speed, extend)
    }

    /// Resets priority and path cost of every port to the defaults.
    pub fn reset_port_params(&mut self) {
        let extend = self.extend_mode;
        for entry in self.entries.iter_mut().flatten() {
            entry.priority = stp_types::PortId::DEFAULT_PRIORITY;
            entry.path_cost = path_cost::for_speed(
                if entry.speed_mbps == 0 {
                    path_cost::DEFAULT_SPEED_MBPS
                } else {
                    entry.speed_mbps
                },
                extend,
            );
        }
    }

    fn entry(&self, port: PortNumber) -> Option<&PortEntry> {
        self.entries.get(port as usize)?.as_ref()
    }

    fn entry_mut(&mut self, port: PortNumber) -> Option<&mut PortEntry> {
        self.entries.get_mut(port as usize)?.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn mac() -> MacAddress {
        MacAddress::new([0, 1, 2, 3, 4, 5])
    }

    #[test]
    fn test_ethernet_ports_map_to_name_suffix() {
        let mut t = PortTable::new(64, true);
        let p = t.register("Ethernet7", 17, mac(), 10_000).unwrap();
        assert_eq!(p, 7);
        assert_eq!(t.name_of(7), Some("Ethernet7"));
        assert_eq!(t.port_of("Ethernet7"), Some(7));
        assert!(t.is_physical(7));
    }

    #[test]
    fn test_port_channels_allocate_from_pool() {
        let mut t = PortTable::new(64, true);
        let a = t.register("PortChannel001", 100, mac(), 40_000).unwrap();
        let b = t.register("PortChannel002", 101, mac(), 40_000).unwrap();
        assert_eq!(a, 32);
        assert_eq!(b, 33);
        assert!(!t.is_physical(a));

        t.remove("PortChannel001");
        let c = t.register("PortChannel003", 102, mac(), 40_000).unwrap();
        assert_eq!(c, 32); // pool id reclaimed
    }

    #[test]
    fn test_preconfigure_before_kernel() {
        let mut t = PortTable::new(64, true);
        let p = t.preconfigure("PortChannel010").unwrap();
        assert!(!t.is_up(p));
        // later netlink registration keeps the same slot
        let p2 = t.register("PortChannel010", 55, mac(), 100_000).unwrap();
        assert_eq!(p, p2);
    }

    #[test]
    fn test_default_path_cost_tracks_speed() {
        let mut t = PortTable::new(64, true);
        let p = t.register("Ethernet0", 1, mac(), 10_000).unwrap();
        assert_eq!(t.default_path_cost(p, true), 2_000);
        t.set_speed(p, 100_000);
        assert_eq!(t.default_path_cost(p, true), 200);
        assert_eq!(t.default_path_cost(p, false), 1);
    }

    #[test]
    fn test_unknown_names_rejected() {
        let mut t = PortTable::new(64, true);
        assert!(t.register("eth0", 1, mac(), 1000).is_err());
        assert!(t.register("Ethernet99", 1, mac(), 1000).is_err());
    }
}
