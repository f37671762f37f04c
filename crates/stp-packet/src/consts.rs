//! Wire constants shared by the codec and its tests.

/// LLC SAP for the bridge spanning tree protocol.
pub const LSAP_BRIDGE_SPANNING_TREE: u8 = 0x42;

/// LLC SAP introducing a SNAP header.
pub const LSAP_SNAP: u8 = 0xaa;

/// LLC control field: unnumbered information frame.
pub const LLC_UI: u8 = 0x03;

/// SNAP OUI of the PVST+ encapsulation (Cisco).
pub const SNAP_OUI: [u8; 3] = [0x00, 0x00, 0x0c];

/// SNAP protocol id of PVST+.
pub const SNAP_PVST_PROTOCOL_ID: u16 = 0x010b;

/// Spanning tree protocol identifier (always zero).
pub const STP_PROTOCOL_ID: u16 = 0x0000;

/// Protocol version of classic 802.1D.
pub const STP_VERSION: u8 = 0;

/// Protocol version of RSTP. Accepted on the wire, processed with classic
/// timers.
pub const RSTP_VERSION: u8 = 2;

/// Configuration BPDU payload length.
pub const CONFIG_BPDU_LEN: usize = 35;

/// TCN BPDU payload length.
pub const TCN_BPDU_LEN: usize = 4;

/// Ethernet header: destination, source, 802.3 length.
pub const MAC_HEADER_LEN: usize = 14;

/// LLC header length.
pub const LLC_HEADER_LEN: usize = 3;

/// SNAP header length (LLC + OUI + protocol id).
pub const SNAP_HEADER_LEN: usize = 8;

/// Classic config frame: MAC + LLC + 35-byte payload.
pub const STP_CONFIG_FRAME_LEN: usize = MAC_HEADER_LEN + LLC_HEADER_LEN + CONFIG_BPDU_LEN;

/// Classic TCN frame: MAC + LLC + 4-byte payload + 3 bytes padding.
pub const STP_TCN_FRAME_LEN: usize = MAC_HEADER_LEN + LLC_HEADER_LEN + TCN_BPDU_LEN + 3;

/// PVST+ config frame: MAC + SNAP + payload + 3 pad + VLAN TLV.
pub const PVST_CONFIG_FRAME_LEN: usize = MAC_HEADER_LEN + SNAP_HEADER_LEN + CONFIG_BPDU_LEN + 3 + 4;

/// PVST+ TCN frame: MAC + SNAP + 4-byte payload + 38 bytes padding.
pub const PVST_TCN_FRAME_LEN: usize = MAC_HEADER_LEN + SNAP_HEADER_LEN + TCN_BPDU_LEN + 38;

/// 802.3 length field carried by classic config templates (LLC + payload).
pub const STP_CONFIG_8023_LEN: u16 = (LLC_HEADER_LEN + CONFIG_BPDU_LEN) as u16;

/// 802.3 length field carried by classic TCN templates.
pub const STP_TCN_8023_LEN: u16 = (LLC_HEADER_LEN + TCN_BPDU_LEN) as u16;

/// 802.3 length field carried by both PVST+ templates.
pub const PVST_8023_LEN: u16 = 50;

/// Minimum hello time in 1/256 s units; smaller received values are repaired
/// to the default rather than dropped.
pub const MIN_HELLO_TIME_256THS: u16 = 1 << 8;

/// Default hello time in 1/256 s units.
pub const DFLT_HELLO_TIME_256THS: u16 = 2 << 8;
