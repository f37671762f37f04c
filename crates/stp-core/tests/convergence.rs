//! End-to-end protocol scenarios driven through the public engine surface:
//! root election, guards, PortFast, TCN propagation and PVST+ VLAN 1
//! interoperability. Frames are injected through the rx path and observed
//! on the recording transport; published state is observed on the recording
//! sync backend.

use stp_core::{
    EngineConfig, InstanceState, MemorySync, MockTransport, ProtoMode, StpEngine, Timer,
};
use stp_packet::{BpduFlags, BpduType, ConfigBpdu};
use stp_types::{BridgeId, MacAddress, PortId, PortState, VlanId};

type Engine = StpEngine<MemorySync, MockTransport>;

fn base_mac() -> MacAddress {
    MacAddress::new([0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0x01])
}

fn peer_mac(last: u8) -> MacAddress {
    MacAddress::new([0xaa, 0xaa, 0xaa, 0xaa, 0xaa, last])
}

fn vlan(id: u16) -> VlanId {
    VlanId::new(id).unwrap()
}

fn engine() -> Engine {
    let mut e = StpEngine::new(
        EngineConfig {
            max_instances: 10,
            max_ports: 64,
            extend_mode: true,
        },
        MemorySync::new(),
        MockTransport::new(),
    );
    e.set_bridge_config(ProtoMode::Pvst, 30, base_mac()).unwrap();
    e
}

/// Registers EthernetN, brings the link up at 1 Gb.
fn port_up(e: &mut Engine, n: u16) {
    let name = format!("Ethernet{n}");
    e.intf
        .register(&name, 1000 + n as u32, peer_mac(0x10 + n as u8), 1_000)
        .unwrap();
    e.port_event(n, true);
}

fn run(e: &mut Engine, ticks: u32) {
    for _ in 0..ticks {
        e.tick();
    }
}

fn state_of(e: &Engine, idx: u16, port: u16) -> PortState {
    e.instance(idx).unwrap().ports[port as usize].state
}

/// A peer's configuration BPDU. Times advertise a 4 s forward delay so the
/// scenarios converge quickly.
fn peer_bpdu(root_pri: u16, root_last: u8, sender_pri: u16, sender_last: u8, v: u16) -> ConfigBpdu {
    ConfigBpdu {
        version: stp_packet::STP_VERSION,
        bpdu_type: BpduType::Config.to_byte(),
        flags: BpduFlags::default(),
        root_id: BridgeId::new(root_pri, vlan(v), peer_mac(root_last), true),
        root_path_cost: 0,
        bridge_id: BridgeId::new(sender_pri, vlan(v), peer_mac(sender_last), true),
        port_id: PortId::new(1, 128),
        message_age: 1,
        max_age: 20,
        hello_time: 2,
        forward_delay: 4,
    }
}

fn inject(e: &mut Engine, port: u16, v: u16, bpdu: &ConfigBpdu) {
    let frame = stp_packet::build_pvst_config_frame(peer_mac(0x77), bpdu, vlan(v));
    e.process_rx_bpdu(port, v, &frame);
}

fn assert_designated_invariant(e: &Engine, idx: u16) {
    let inst = e.instance(idx).unwrap();
    for port in inst.enable_mask.iter() {
        let p = &inst.ports[port as usize];
        if p.designated_bridge == inst.bridge.bridge_id && p.designated_port == p.port_id {
            assert_eq!(p.designated_root, inst.bridge.root_id);
            assert_eq!(p.designated_cost, inst.bridge.root_path_cost);
        }
    }
    if inst.bridge.root_port.is_none() {
        assert_eq!(inst.bridge.root_id, inst.bridge.bridge_id);
        assert_eq!(inst.bridge.root_path_cost, 0);
    }
}

#[test]
fn s1_root_election_and_forwarding_walk() {
    let mut e = engine();
    port_up(&mut e, 3);
    port_up(&mut e, 4);
    e.config_fastspan(3, false);
    e.config_fastspan(4, false);

    e.init_class(0, vlan(10)).unwrap();
    assert!(e.add_control_port(0, 3, false));
    assert!(e.add_control_port(0, 4, false));

    // freshly activated: we are root, both ports designated and listening
    let inst = e.instance(0).unwrap();
    assert_eq!(inst.state, InstanceState::Active);
    assert!(inst.bridge.is_root());
    assert_eq!(state_of(&e, 0, 3), PortState::Listening);
    assert_eq!(state_of(&e, 0, 4), PortState::Listening);

    // a superior root claim arrives on port 3
    inject(&mut e, 3, 10, &peer_bpdu(8192, 0x02, 8192, 0x02, 10));
    // and a better designated bridge for port 4's segment
    inject(&mut e, 4, 10, &peer_bpdu(8192, 0x02, 16384, 0x03, 10));

    let inst = e.instance(0).unwrap();
    assert!(!inst.bridge.is_root());
    assert_eq!(inst.bridge.root_port, Some(3));
    assert_eq!(inst.bridge.root_path_cost, 20_000); // 1 Gb port cost
    assert_eq!(state_of(&e, 0, 3), PortState::Listening);
    assert_eq!(state_of(&e, 0, 4), PortState::Blocking);
    assert_designated_invariant(&e, 0);

    // the advertised forward delay is 4 s: listening -> learning -> forwarding
    run(&mut e, 45);
    assert_eq!(state_of(&e, 0, 3), PortState::Learning);
    run(&mut e, 45);
    assert_eq!(state_of(&e, 0, 3), PortState::Forwarding);
    assert_eq!(state_of(&e, 0, 4), PortState::Blocking);
    assert_designated_invariant(&e, 0);
}

#[test]
fn s2_root_guard_blocks_and_releases() {
    let mut e = engine();
    port_up(&mut e, 5);
    e.config_fastspan(5, false);
    e.config_root_protect(5, true);
    e.config_root_protect_timeout(5).unwrap();

    e.init_class(0, vlan(20)).unwrap();
    e.config_bridge_forward_delay(0, 4);
    assert!(e.add_control_port(0, 5, false));
    assert_eq!(state_of(&e, 0, 5), PortState::Listening);

    let drops_before = e.instance(0).unwrap().rx_drop_bpdu;
    inject(&mut e, 5, 20, &peer_bpdu(0, 0x02, 0, 0x02, 20));

    // the superior BPDU never reaches the protocol: still root, port held
    let inst = e.instance(0).unwrap();
    assert!(inst.bridge.is_root());
    assert_eq!(state_of(&e, 0, 5), PortState::Blocking);
    assert!(inst.ports[5].root_protect_timer.is_active());
    assert_eq!(inst.rx_drop_bpdu, drops_before + 1);

    run(&mut e, 10);
    assert_eq!(
        e.sync.last_port_state("Ethernet5", 20).as_deref(),
        Some("ROOT-INC")
    );

    // timeout (5 s) releases the port, then the normal walk resumes
    run(&mut e, 60);
    assert!(!e.instance(0).unwrap().ports[5].root_protect_timer.is_active());
    assert_ne!(state_of(&e, 0, 5), PortState::Blocking);

    run(&mut e, 100);
    assert_eq!(state_of(&e, 0, 5), PortState::Forwarding);
    assert_eq!(
        e.sync.last_port_state("Ethernet5", 20).as_deref(),
        Some("FORWARDING")
    );
}

#[test]
fn s3_bpdu_guard_do_disable_shuts_the_port() {
    let mut e = engine();
    port_up(&mut e, 7);
    e.config_protect(7, true, true);

    e.init_class(0, vlan(30)).unwrap();
    assert!(e.add_control_port(0, 7, false));

    let rx_before = e.instance(0).unwrap().ports[7].rx_config_bpdu;
    inject(&mut e, 7, 30, &peer_bpdu(8192, 0x02, 8192, 0x02, 30));

    assert!(e.is_bpdu_guard_disabled(7));
    assert_eq!(e.instance(0).unwrap().ports[7].rx_config_bpdu, rx_before);

    let events = &e.sync.events;
    assert!(events.iter().any(|ev| matches!(
        ev,
        stp_core::SyncEvent::BpduGuardShutdown(name, true) if name == "Ethernet7"
    )));
    assert!(events.iter().any(|ev| matches!(
        ev,
        stp_core::SyncEvent::PortAdminState(name, false, true) if name == "Ethernet7"
    )));

    // operator brings the port back: the shutdown marker clears
    e.port_event(7, true);
    assert!(!e.is_bpdu_guard_disabled(7));
    assert!(e.sync.events.iter().any(|ev| matches!(
        ev,
        stp_core::SyncEvent::BpduGuardShutdown(name, false) if name == "Ethernet7"
    )));
}

#[test]
fn s4_tcn_propagation_until_acknowledged() {
    let mut e = engine();
    port_up(&mut e, 2);
    port_up(&mut e, 3);
    e.config_fastspan(2, false);
    e.config_fastspan(3, false);

    e.init_class(0, vlan(10)).unwrap();
    assert!(e.add_control_port(0, 2, false));
    assert!(e.add_control_port(0, 3, false));

    // lose the root election through port 3
    inject(&mut e, 3, 10, &peer_bpdu(8192, 0x02, 8192, 0x02, 10));
    assert_eq!(e.instance(0).unwrap().bridge.root_port, Some(3));

    // walk both ports to forwarding (advertised forward delay 4 s),
    // refreshing the root information along the way
    run(&mut e, 50);
    inject(&mut e, 3, 10, &peer_bpdu(8192, 0x02, 8192, 0x02, 10));
    run(&mut e, 50);
    assert_eq!(state_of(&e, 0, 2), PortState::Forwarding);
    assert_eq!(state_of(&e, 0, 3), PortState::Forwarding);

    // PVST TCN and config frames are both 64 bytes; the type octet after
    // the SNAP header tells them apart
    let tcn_count = |e: &Engine| {
        e.transport
            .sent
            .iter()
            .filter(|r| {
                r.port == 3
                    && r.frame.len() == stp_packet::PVST_TCN_FRAME_LEN
                    && r.frame[25] == 0x80
            })
            .count()
    };
    let before = tcn_count(&e);

    // forwarding port goes away: topology change, TCN out of the root port
    e.port_event(2, false);
    let inst = e.instance(0).unwrap();
    assert!(inst.bridge.topology_change_detected);
    assert!(inst.tcn_timer.is_active());
    assert!(tcn_count(&e) > before);

    // TCN repeats every hello time until acknowledged
    let after_first = tcn_count(&e);
    inject(&mut e, 3, 10, &peer_bpdu(8192, 0x02, 8192, 0x02, 10));
    run(&mut e, 50);
    assert!(tcn_count(&e) > after_first);

    // the root flags the change; fast aging follows on the next tick
    let mut tc = peer_bpdu(8192, 0x02, 8192, 0x02, 10);
    tc.flags.topology_change = true;
    inject(&mut e, 3, 10, &tc);
    run(&mut e, 6);
    assert_eq!(e.sync.fast_aging(10), Some(true));

    // root acknowledges: propagation stops
    let mut ack = peer_bpdu(8192, 0x02, 8192, 0x02, 10);
    ack.flags.topology_change_ack = true;
    inject(&mut e, 3, 10, &ack);
    let inst = e.instance(0).unwrap();
    assert!(!inst.bridge.topology_change_detected);
    assert!(!inst.tcn_timer.is_active());
}

#[test]
fn s5_vlan1_sends_pvst_and_untagged_ieee() {
    let mut e = engine();
    port_up(&mut e, 11);

    e.init_class(0, vlan(1)).unwrap();
    assert!(e.add_control_port(0, 11, true));

    // first hello fires two seconds after activation
    run(&mut e, 20);

    let frames = e.transport.frames_on(11);
    assert_eq!(frames.len(), 2);

    let pvst: Vec<_> = frames
        .iter()
        .filter(|r| r.frame[..6] == [0x01, 0x00, 0x0c, 0xcc, 0xcc, 0xcd])
        .collect();
    let ieee: Vec<_> = frames
        .iter()
        .filter(|r| r.frame[..6] == [0x01, 0x80, 0xc2, 0x00, 0x00, 0x00])
        .collect();
    assert_eq!(pvst.len(), 1);
    assert_eq!(ieee.len(), 1);
    assert_eq!(pvst[0].vlan, 1);
    assert_eq!(ieee[0].vlan, 1);
    assert!(!ieee[0].tagged);
}

#[test]
fn s6_portfast_skips_the_walk_until_a_bpdu_arrives() {
    let mut e = engine();
    port_up(&mut e, 3);
    port_up(&mut e, 9);
    e.config_fastspan(3, false);
    // port 9 keeps the default PortFast

    e.init_class(0, vlan(10)).unwrap();
    assert!(e.add_control_port(0, 3, false));
    assert!(e.add_control_port(0, 9, false));

    // PortFast: straight to forwarding, no listening/learning latency
    assert_eq!(state_of(&e, 0, 9), PortState::Forwarding);
    assert_eq!(state_of(&e, 0, 3), PortState::Listening);
    assert!(e.is_portfast_oper(9));

    // superior root through port 3, and a better designated bridge heard
    // on port 9's segment: port 9 must block
    inject(&mut e, 3, 10, &peer_bpdu(4096, 0x02, 8192, 0x02, 10));
    inject(&mut e, 9, 10, &peer_bpdu(4096, 0x02, 16384, 0x03, 10));

    assert!(!e.is_portfast_oper(9));
    assert!(e.sync.events.iter().any(|ev| matches!(
        ev,
        stp_core::SyncEvent::PortFast(name, false) if name == "Ethernet9"
    )));
    assert_eq!(state_of(&e, 0, 9), PortState::Blocking);

    // once the stored information ages out the port re-enters the walk at
    // listening: the PortFast shortcut is gone
    run(&mut e, 250);
    let state = state_of(&e, 0, 9);
    assert_ne!(state, PortState::Forwarding);
    assert!(
        state == PortState::Listening || state == PortState::Learning,
        "expected the listening walk, got {state:?}"
    );
}

#[test]
fn link_down_disables_ports_and_release_frees_the_slot() {
    let mut e = engine();
    port_up(&mut e, 3);
    e.config_fastspan(3, false);

    e.init_class(0, vlan(40)).unwrap();
    assert!(e.add_control_port(0, 3, false));
    assert_eq!(e.instance(0).unwrap().state, InstanceState::Active);

    e.port_event(3, false);
    let inst = e.instance(0).unwrap();
    assert_eq!(inst.ports[3].state, PortState::Disabled);
    assert!(!inst.ports[3].message_age_timer.is_active());
    assert!(!inst.ports[3].forward_delay_timer.is_active());
    // last enabled port gone: back to configured-only
    assert_eq!(inst.state, InstanceState::Config);

    e.port_event(3, true);
    assert_eq!(e.instance(0).unwrap().state, InstanceState::Active);
    assert_eq!(state_of(&e, 0, 3), PortState::Listening);

    assert!(e.release_index(0));
    assert!(e.instance(0).is_none());
    assert_eq!(e.active_instances(), 0);
}

#[test]
fn duplicate_control_port_add_is_a_noop() {
    let mut e = engine();
    port_up(&mut e, 3);
    e.config_fastspan(3, false);

    e.init_class(0, vlan(50)).unwrap();
    assert!(e.add_control_port(0, 3, false));
    let tc_count = e.instance(0).unwrap().bridge.topology_change_count;
    let hello: Timer = e.instance(0).unwrap().hello_timer;

    assert!(e.add_control_port(0, 3, false));
    let inst = e.instance(0).unwrap();
    assert_eq!(inst.bridge.topology_change_count, tc_count);
    assert_eq!(inst.hello_timer, hello);
    assert_eq!(state_of(&e, 0, 3), PortState::Listening);
}

#[test]
fn stale_bpdu_is_ignored() {
    let mut e = engine();
    port_up(&mut e, 3);
    e.config_fastspan(3, false);

    e.init_class(0, vlan(60)).unwrap();
    assert!(e.add_control_port(0, 3, false));

    let mut stale = peer_bpdu(0, 0x02, 0, 0x02, 60);
    stale.message_age = 20;
    stale.max_age = 20;
    inject(&mut e, 3, 60, &stale);

    // stale information must not dethrone the local bridge
    assert!(e.instance(0).unwrap().bridge.is_root());
}

#[test]
fn unconfigured_vlan_bumps_drop_counters() {
    let mut e = engine();
    port_up(&mut e, 3);

    let bpdu = peer_bpdu(8192, 0x02, 8192, 0x02, 99);
    inject(&mut e, 3, 99, &bpdu);
    let (_, _, pvst) = e.drop_counters();
    assert_eq!(pvst, 1);

    let frame = stp_packet::build_config_frame(peer_mac(0x77), &bpdu);
    e.process_rx_bpdu(3, 99, &frame);
    let (stp, _, _) = e.drop_counters();
    assert_eq!(stp, 1);
}
