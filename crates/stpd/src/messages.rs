//! Control-channel message formats.
//!
//! One envelope enum carries every configuration and control payload. The
//! wire encoding is JSON over a datagram socket; a message that fails to
//! decode is rejected whole instead of being half-applied.

use serde::{Deserialize, Serialize};
use stp_types::MacAddress;

/// Set or delete, carried by every configuration payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Opcode {
    Del = 0,
    Set = 1,
}

/// Configured spanning tree flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StpMode {
    #[default]
    None = 0,
    Pvst = 1,
}

/// Tagging mode of a VLAN member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MemberMode {
    Untagged = 0,
    #[default]
    Tagged = 1,
}

/// The envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StpIpcMessage {
    Init(InitMsg),
    BridgeConfig(BridgeConfigMsg),
    VlanConfig(VlanConfigMsg),
    VlanPortConfig(VlanPortConfigMsg),
    PortConfig(PortConfigMsg),
    VlanMemberConfig(VlanMemberConfigMsg),
    Control(ControlMsg),
}

/// Engine sizing, sent once after the port table is ready.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitMsg {
    pub max_stp_instances: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfigMsg {
    pub opcode: Opcode,
    pub stp_mode: StpMode,
    /// Seconds, bounded [5, 600].
    pub rootguard_timeout: i32,
    pub base_mac: MacAddress,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortAttr {
    pub intf_name: String,
    pub mode: MemberMode,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VlanConfigMsg {
    pub opcode: Opcode,
    pub new_instance: bool,
    pub vlan_id: u16,
    pub inst_id: u16,
    /// Zero leaves the current value untouched.
    pub forward_delay: i32,
    pub hello_time: i32,
    pub max_age: i32,
    /// -1 leaves the current value untouched.
    pub priority: i32,
    #[serde(default)]
    pub ports: Vec<PortAttr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VlanPortConfigMsg {
    pub opcode: Opcode,
    pub vlan_id: u16,
    pub intf_name: String,
    pub inst_id: u16,
    /// Zero means "unset" (fall back to the port-level value).
    pub path_cost: i32,
    /// -1 means "unset".
    pub priority: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VlanAttr {
    pub inst_id: u16,
    pub vlan_id: u16,
    pub mode: MemberMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortConfigMsg {
    pub opcode: Opcode,
    pub intf_name: String,
    pub enabled: bool,
    pub root_guard: bool,
    pub bpdu_guard: bool,
    pub bpdu_guard_do_disable: bool,
    pub portfast: bool,
    pub uplink_fast: bool,
    pub path_cost: i32,
    pub priority: i32,
    #[serde(default)]
    pub vlans: Vec<VlanAttr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VlanMemberConfigMsg {
    pub opcode: Opcode,
    pub vlan_id: u16,
    pub inst_id: u16,
    pub intf_name: String,
    pub enabled: bool,
    pub mode: MemberMode,
    pub path_cost: i32,
    pub priority: i32,
}

/// Runtime control commands (debug channel).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum ControlMsg {
    /// Clears BPDU counters; absent fields widen the scope.
    ClearStatistics {
        vlan_id: Option<u16>,
        intf_name: Option<String>,
    },
    /// Adjusts the log filter at runtime.
    SetLogLevel { level: String },
}

/// Reply sent back to the control client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IpcReply {
    Ok,
    Rejected { error: String },
}
