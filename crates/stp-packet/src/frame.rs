//! Frame-level build and parse.
//!
//! Builders produce complete Ethernet frames ready for the raw transport;
//! parsers validate the encapsulation headers before lifting the payload.

use crate::bpdu::ConfigBpdu;
use crate::consts::*;
use crate::BpduError;
use stp_types::{MacAddress, VlanId};

/// A parsed classic 802.1D frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StpFrame {
    Config(ConfigBpdu),
    Tcn,
}

/// A parsed PVST+ frame. Config frames carry the originating VLAN from the
/// trailing TLV.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PvstFrame {
    Config { bpdu: ConfigBpdu, vlan: VlanId },
    Tcn,
}

fn push_mac_header(out: &mut Vec<u8>, dst: MacAddress, src: MacAddress, len_8023: u16) {
    out.extend_from_slice(dst.as_bytes());
    out.extend_from_slice(src.as_bytes());
    out.extend_from_slice(&len_8023.to_be_bytes());
}

fn push_llc(out: &mut Vec<u8>) {
    out.extend_from_slice(&[
        LSAP_BRIDGE_SPANNING_TREE,
        LSAP_BRIDGE_SPANNING_TREE,
        LLC_UI,
    ]);
}

fn push_snap(out: &mut Vec<u8>) {
    out.extend_from_slice(&[LSAP_SNAP, LSAP_SNAP, LLC_UI]);
    out.extend_from_slice(&SNAP_OUI);
    out.extend_from_slice(&SNAP_PVST_PROTOCOL_ID.to_be_bytes());
}

/// Builds a classic untagged configuration BPDU frame (52 bytes).
pub fn build_config_frame(src: MacAddress, bpdu: &ConfigBpdu) -> Vec<u8> {
    let mut out = Vec::with_capacity(STP_CONFIG_FRAME_LEN);
    push_mac_header(&mut out, MacAddress::BRIDGE_GROUP, src, STP_CONFIG_8023_LEN);
    push_llc(&mut out);
    bpdu.write_payload(&mut out);
    out
}

/// Builds a classic TCN frame (24 bytes, 3 bytes trailing padding).
pub fn build_tcn_frame(src: MacAddress) -> Vec<u8> {
    let mut out = Vec::with_capacity(STP_TCN_FRAME_LEN);
    push_mac_header(&mut out, MacAddress::BRIDGE_GROUP, src, STP_TCN_8023_LEN);
    push_llc(&mut out);
    out.extend_from_slice(&STP_PROTOCOL_ID.to_be_bytes());
    out.push(STP_VERSION);
    out.push(0x80);
    out.extend_from_slice(&[0u8; 3]);
    out
}

/// Builds a PVST+ configuration BPDU frame (64 bytes) carrying `vlan` in the
/// trailing TLV.
pub fn build_pvst_config_frame(src: MacAddress, bpdu: &ConfigBpdu, vlan: VlanId) -> Vec<u8> {
    let mut out = Vec::with_capacity(PVST_CONFIG_FRAME_LEN);
    push_mac_header(&mut out, MacAddress::PVST_BRIDGE_GROUP, src, PVST_8023_LEN);
    push_snap(&mut out);
    bpdu.write_payload(&mut out);
    out.extend_from_slice(&[0u8; 3]);
    out.extend_from_slice(&2u16.to_be_bytes());
    out.extend_from_slice(&vlan.as_u16().to_be_bytes());
    out
}

/// Builds a PVST+ TCN frame (64 bytes, 38 bytes trailing padding).
pub fn build_pvst_tcn_frame(src: MacAddress) -> Vec<u8> {
    let mut out = Vec::with_capacity(PVST_TCN_FRAME_LEN);
    push_mac_header(&mut out, MacAddress::PVST_BRIDGE_GROUP, src, PVST_8023_LEN);
    push_snap(&mut out);
    out.extend_from_slice(&STP_PROTOCOL_ID.to_be_bytes());
    out.push(STP_VERSION);
    out.push(0x80);
    out.extend_from_slice(&[0u8; 38]);
    out
}

/// Parses a classic 802.1D frame (DA `01:80:C2:00:00:00`).
pub fn parse_stp_frame(frame: &[u8]) -> Result<StpFrame, BpduError> {
    let payload_at = MAC_HEADER_LEN + LLC_HEADER_LEN;
    if frame.len() < payload_at + TCN_BPDU_LEN {
        return Err(BpduError::Truncated {
            got: frame.len(),
            need: payload_at + TCN_BPDU_LEN,
        });
    }

    let llc = &frame[MAC_HEADER_LEN..payload_at];
    if llc != [LSAP_BRIDGE_SPANNING_TREE, LSAP_BRIDGE_SPANNING_TREE, LLC_UI] {
        return Err(BpduError::BadLlc);
    }

    let payload = &frame[payload_at..];
    if payload[3] == 0x80 {
        let protocol_id = u16::from_be_bytes([payload[0], payload[1]]);
        if protocol_id != STP_PROTOCOL_ID {
            return Err(BpduError::BadProtocolId(protocol_id));
        }
        return Ok(StpFrame::Tcn);
    }

    Ok(StpFrame::Config(ConfigBpdu::parse_payload(payload)?))
}

/// Parses a PVST+ frame (DA `01:00:0C:CC:CC:CD`).
///
/// Config frames whose VLAN TLV has `tag_length != 2` or a VLAN outside
/// `[1, 4094]` are rejected.
pub fn parse_pvst_frame(frame: &[u8]) -> Result<PvstFrame, BpduError> {
    let payload_at = MAC_HEADER_LEN + SNAP_HEADER_LEN;
    if frame.len() < payload_at + TCN_BPDU_LEN {
        return Err(BpduError::Truncated {
            got: frame.len(),
            need: payload_at + TCN_BPDU_LEN,
        });
    }

    let snap = &frame[MAC_HEADER_LEN..payload_at];
    if snap[0] != LSAP_SNAP
        || snap[1] != LSAP_SNAP
        || snap[2] != LLC_UI
        || snap[3..6] != SNAP_OUI
        || u16::from_be_bytes([snap[6], snap[7]]) != SNAP_PVST_PROTOCOL_ID
    {
        return Err(BpduError::BadSnap);
    }

    let payload = &frame[payload_at..];
    let protocol_id = u16::from_be_bytes([payload[0], payload[1]]);
    if protocol_id != STP_PROTOCOL_ID {
        return Err(BpduError::BadProtocolId(protocol_id));
    }

    if payload[3] == 0x80 {
        return Ok(PvstFrame::Tcn);
    }

    let bpdu = ConfigBpdu::parse_payload(payload)?;

    let tlv_at = payload_at + CONFIG_BPDU_LEN + 3;
    if frame.len() < tlv_at + 4 {
        return Err(BpduError::Truncated {
            got: frame.len(),
            need: tlv_at + 4,
        });
    }
    let tag_length = u16::from_be_bytes([frame[tlv_at], frame[tlv_at + 1]]);
    let vlan_id = u16::from_be_bytes([frame[tlv_at + 2], frame[tlv_at + 3]]);
    if tag_length != 2 {
        return Err(BpduError::BadVlanTag {
            tag_length,
            vlan_id,
        });
    }
    let vlan = VlanId::new(vlan_id).map_err(|_| BpduError::BadVlanTag {
        tag_length,
        vlan_id,
    })?;

    Ok(PvstFrame::Config { bpdu, vlan })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bpdu::{BpduFlags, BpduType};
    use pretty_assertions::assert_eq;
    use stp_types::{BridgeId, PortId};

    fn src_mac() -> MacAddress {
        MacAddress::new([0x00, 0x11, 0x22, 0x33, 0x44, 0x55])
    }

    fn sample_bpdu() -> ConfigBpdu {
        let vlan = VlanId::new(10).unwrap();
        let mac = MacAddress::new([0x00, 0xaa, 0xaa, 0xaa, 0xaa, 0x01]);
        ConfigBpdu {
            version: STP_VERSION,
            bpdu_type: BpduType::Config.to_byte(),
            flags: BpduFlags::default(),
            root_id: BridgeId::new(32768, vlan, mac, true),
            root_path_cost: 0,
            bridge_id: BridgeId::new(32768, vlan, mac, true),
            port_id: PortId::new(1, 128),
            message_age: 0,
            max_age: 20,
            hello_time: 2,
            forward_delay: 15,
        }
    }

    #[test]
    fn test_config_frame_bytes() {
        let frame = build_config_frame(src_mac(), &sample_bpdu());
        #[rustfmt::skip]
        let expected: Vec<u8> = vec![
            // destination, source, 802.3 length
            0x01, 0x80, 0xc2, 0x00, 0x00, 0x00,
            0x00, 0x11, 0x22, 0x33, 0x44, 0x55,
            0x00, 0x26,
            // LLC
            0x42, 0x42, 0x03,
            // protocol id, version, type, flags
            0x00, 0x00, 0x00, 0x00, 0x00,
            // root id
            0x80, 0x0a, 0x00, 0xaa, 0xaa, 0xaa, 0xaa, 0x01,
            // root path cost
            0x00, 0x00, 0x00, 0x00,
            // bridge id
            0x80, 0x0a, 0x00, 0xaa, 0xaa, 0xaa, 0xaa, 0x01,
            // port id
            0x80, 0x01,
            // message age, max age, hello, forward delay (1/256 s)
            0x00, 0x00, 0x14, 0x00, 0x02, 0x00, 0x0f, 0x00,
        ];
        assert_eq!(frame, expected);
        assert_eq!(frame.len(), STP_CONFIG_FRAME_LEN);
    }

    #[test]
    fn test_tcn_frame_bytes() {
        let frame = build_tcn_frame(src_mac());
        #[rustfmt::skip]
        let expected: Vec<u8> = vec![
            0x01, 0x80, 0xc2, 0x00, 0x00, 0x00,
            0x00, 0x11, 0x22, 0x33, 0x44, 0x55,
            0x00, 0x07,
            0x42, 0x42, 0x03,
            0x00, 0x00, 0x00, 0x80,
            0x00, 0x00, 0x00,
        ];
        assert_eq!(frame, expected);
        assert_eq!(frame.len(), STP_TCN_FRAME_LEN);
    }

    #[test]
    fn test_pvst_config_frame_layout() {
        let vlan = VlanId::new(10).unwrap();
        let frame = build_pvst_config_frame(src_mac(), &sample_bpdu(), vlan);
        assert_eq!(frame.len(), PVST_CONFIG_FRAME_LEN);
        assert_eq!(&frame[0..6], &[0x01, 0x00, 0x0c, 0xcc, 0xcc, 0xcd]);
        assert_eq!(&frame[12..14], &[0x00, 0x32]);
        assert_eq!(
            &frame[14..22],
            &[0xaa, 0xaa, 0x03, 0x00, 0x00, 0x0c, 0x01, 0x0b]
        );
        // trailing TLV: length 2, vlan 10
        assert_eq!(&frame[60..64], &[0x00, 0x02, 0x00, 0x0a]);
    }

    #[test]
    fn test_pvst_tcn_frame_layout() {
        let frame = build_pvst_tcn_frame(src_mac());
        assert_eq!(frame.len(), PVST_TCN_FRAME_LEN);
        assert_eq!(frame[25], 0x80);
        assert!(frame[26..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_stp_round_trip() {
        let bpdu = sample_bpdu();
        let frame = build_config_frame(src_mac(), &bpdu);
        assert_eq!(parse_stp_frame(&frame).unwrap(), StpFrame::Config(bpdu));

        let tcn = build_tcn_frame(src_mac());
        assert_eq!(parse_stp_frame(&tcn).unwrap(), StpFrame::Tcn);
    }

    #[test]
    fn test_pvst_round_trip() {
        let bpdu = sample_bpdu();
        let vlan = VlanId::new(10).unwrap();
        let frame = build_pvst_config_frame(src_mac(), &bpdu, vlan);
        assert_eq!(
            parse_pvst_frame(&frame).unwrap(),
            PvstFrame::Config { bpdu, vlan }
        );

        let tcn = build_pvst_tcn_frame(src_mac());
        assert_eq!(parse_pvst_frame(&tcn).unwrap(), PvstFrame::Tcn);
    }

    #[test]
    fn test_bad_llc_rejected() {
        let mut frame = build_config_frame(src_mac(), &sample_bpdu());
        frame[14] = 0xaa;
        assert_eq!(parse_stp_frame(&frame), Err(BpduError::BadLlc));
    }

    #[test]
    fn test_bad_snap_rejected() {
        let vlan = VlanId::new(10).unwrap();
        let mut frame = build_pvst_config_frame(src_mac(), &sample_bpdu(), vlan);
        frame[19] = 0xff; // OUI
        assert_eq!(parse_pvst_frame(&frame), Err(BpduError::BadSnap));
    }

    #[test]
    fn test_pvst_bad_tag_length_rejected() {
        let vlan = VlanId::new(10).unwrap();
        let mut frame = build_pvst_config_frame(src_mac(), &sample_bpdu(), vlan);
        frame[61] = 4;
        assert!(matches!(
            parse_pvst_frame(&frame),
            Err(BpduError::BadVlanTag { tag_length: 4, .. })
        ));
    }

    #[test]
    fn test_pvst_vlan_out_of_range_rejected() {
        let vlan = VlanId::new(10).unwrap();
        let mut frame = build_pvst_config_frame(src_mac(), &sample_bpdu(), vlan);
        frame[62] = 0x0f;
        frame[63] = 0xff; // vlan 4095
        assert!(matches!(
            parse_pvst_frame(&frame),
            Err(BpduError::BadVlanTag { vlan_id: 4095, .. })
        ));
    }

    #[test]
    fn test_truncated_frames_rejected() {
        let frame = build_config_frame(src_mac(), &sample_bpdu());
        assert!(matches!(
            parse_stp_frame(&frame[..20]),
            Err(BpduError::Truncated { .. })
        ));
        let pvst = build_pvst_config_frame(src_mac(), &sample_bpdu(), VlanId::new(10).unwrap());
        assert!(matches!(
            parse_pvst_frame(&pvst[..40]),
            Err(BpduError::Truncated { .. })
        ));
    }
}
