//! Shell command builders for kernel bridge-port state.

use crate::shell::{self, shellquote};

/// VLAN interface prefix used in database keys.
pub const VLAN_PREFIX: &str = "Vlan";

/// LAG (PortChannel) prefix.
pub const LAG_PREFIX: &str = "PortChannel";

/// Adds `vid` to a bridge port: the kernel starts forwarding that VLAN.
pub fn build_kernel_forward_cmd(vlan_id: u16, port_alias: &str, tagged: bool) -> String {
    format!(
        "{} vlan add vid {} dev {} {}",
        shell::BRIDGE_CMD,
        vlan_id,
        shellquote(port_alias),
        if tagged { "tagged" } else { "untagged" },
    )
}

/// Removes `vid` from a bridge port: the kernel stops forwarding it.
pub fn build_kernel_block_cmd(vlan_id: u16, port_alias: &str, tagged: bool) -> String {
    format!(
        "{} vlan del vid {} dev {} {}",
        shell::BRIDGE_CMD,
        vlan_id,
        shellquote(port_alias),
        if tagged { "tagged" } else { "untagged" },
    )
}
