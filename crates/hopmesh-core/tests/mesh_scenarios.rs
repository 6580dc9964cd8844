//! End-to-end scenarios exercising discovery, forwarding, and delivery
//! across multiple engines wired together directly or through the
//! simulator.

use hopmesh_core::simulation::{MeshSimulator, SimConfig};
use hopmesh_core::{Frame, FrameType, LinkDriver, LinkError, MacAddr, MeshConfig, MeshEngine};
use std::sync::{Arc, Mutex};

/// Link driver capturing every send for inspection
#[derive(Debug, Default)]
struct CaptureLink {
    sent: Vec<(Option<MacAddr>, Vec<u8>)>,
}

impl LinkDriver for CaptureLink {
    fn broadcast(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        self.sent.push((None, bytes.to_vec()));
        Ok(())
    }

    fn unicast(&mut self, dest: MacAddr, bytes: &[u8]) -> Result<(), LinkError> {
        self.sent.push((Some(dest), bytes.to_vec()));
        Ok(())
    }
}

fn addr(last: u8) -> MacAddr {
    MacAddr::from_bytes([0x02, 0, 0, 0, 0, last])
}

fn engine(own: MacAddr) -> MeshEngine<CaptureLink> {
    MeshEngine::new(own, MeshConfig::default(), CaptureLink::default())
}

/// Pop the frames `from` has emitted since the last call
fn drain(from: &mut MeshEngine<CaptureLink>) -> Vec<(Option<MacAddr>, Frame)> {
    from.link_mut()
        .sent
        .drain(..)
        .map(|(dest, bytes)| (dest, Frame::decode(&bytes).unwrap()))
        .collect()
}

#[test]
fn two_node_discovery() {
    let a_mac = MacAddr::from_bytes([0xAA, 0, 0, 0, 0, 0x01]);
    let b_mac = MacAddr::from_bytes([0xBB, 0, 0, 0, 0, 0x02]);
    let mut a = engine(a_mac);
    let mut b = engine(b_mac);
    b.set_gateway_mode(true);

    // A announces itself
    a.send_discovery();
    let sent = drain(&mut a);
    assert_eq!(sent.len(), 1);
    let (dest, discovery) = &sent[0];
    assert_eq!(*dest, None);
    assert_eq!(discovery.hop_count, 0);
    assert_eq!(discovery.data, vec![0]);

    // B hears it: learns A, routes to it directly, replies unicast
    b.handle_frame(discovery.clone(), -52, 1_000);
    let b_peer = b.peer(a_mac).unwrap();
    assert_eq!(b_peer.hop_count, 0);
    assert!(!b_peer.is_gateway);
    let b_route = b.route(a_mac).unwrap();
    assert_eq!(b_route.next_hop, a_mac);
    assert_eq!(b_route.hop_count, 1);

    let sent = drain(&mut b);
    assert_eq!(sent.len(), 1);
    let (dest, reply) = &sent[0];
    assert_eq!(*dest, Some(a_mac));
    assert_eq!(reply.frame_type, FrameType::Discovery);
    assert_eq!(reply.hop_count, 1);
    assert_eq!(reply.data, vec![1]); // B advertises its gateway flag

    // A hears the reply: B is a gateway peer with a direct route
    a.handle_frame(reply.clone(), -52, 1_010);
    assert!(a.peer(b_mac).unwrap().is_gateway);
    let a_route = a.route(b_mac).unwrap();
    assert_eq!(a_route.next_hop, b_mac);
    assert_eq!(a_route.hop_count, 1);
    assert_eq!(a.nearest_gateway().unwrap().address, b_mac);
}

#[test]
fn hop_limit_drop_at_second_hop() {
    let mut c = engine(addr(0x0C));
    let mut d = engine(addr(0x0D));

    // C relays a data frame already at hop_count 4
    let mut data = Frame::new(FrameType::Data, addr(0x01), addr(0x0F), 9);
    data.hop_count = 4;
    data.data = b"payload".to_vec();
    c.handle_frame(data, -60, 100);

    let sent = drain(&mut c);
    assert_eq!(sent.len(), 1);
    let (_, relayed) = &sent[0];
    assert_eq!(relayed.hop_count, 5);

    // D receives it at the limit and stays silent
    d.handle_frame(relayed.clone(), -60, 110);
    assert!(drain(&mut d).is_empty());
    assert_eq!(d.stats().hop_limit_drops, 1);
}

#[test]
fn data_relayed_across_a_line() {
    // A -- B -- C chained by hand: every emission from one engine is fed
    // to the next.
    let (a_mac, b_mac, c_mac) = (addr(0x0A), addr(0x0B), addr(0x0C));
    let mut a = engine(a_mac);
    let mut b = engine(b_mac);
    let mut c = engine(c_mac);

    let delivered: Arc<Mutex<Vec<(MacAddr, Vec<u8>)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = delivered.clone();
    c.set_data_callback(move |src, payload| {
        sink.lock().unwrap().push((src, payload.to_vec()));
    });

    // A has no route to C and broadcasts; only B is in range
    a.send_data(c_mac, b"over the hill");
    let sent = drain(&mut a);
    assert_eq!(sent[0].0, None);

    // B has no route to C either and rebroadcasts with one more hop
    b.handle_frame(sent[0].1.clone(), -70, 100);
    let sent = drain(&mut b);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, None);
    assert_eq!(sent[0].1.hop_count, 1);
    assert_eq!(sent[0].1.src, a_mac);

    // C is the destination: delivered, nothing re-emitted
    c.handle_frame(sent[0].1.clone(), -70, 110);
    assert!(drain(&mut c).is_empty());
    let delivered = delivered.lock().unwrap();
    assert_eq!(delivered.as_slice(), &[(a_mac, b"over the hill".to_vec())]);
}

#[test]
fn route_request_reply_chain() {
    // B knows C as a direct neighbor; A asks B for a route to C.
    let (a_mac, b_mac, c_mac) = (addr(0x0A), addr(0x0B), addr(0x0C));
    let mut a = engine(a_mac);
    let mut b = engine(b_mac);

    let c_discovery = Frame::broadcast(FrameType::Discovery, c_mac, 0, &[0]);
    b.handle_frame(c_discovery, -55, 50);
    drain(&mut b);

    a.send_route_request(c_mac);
    let sent = drain(&mut a);
    assert_eq!(sent[0].1.frame_type, FrameType::RouteRequest);

    b.handle_frame(sent[0].1.clone(), -60, 100);
    let sent = drain(&mut b);
    assert_eq!(sent.len(), 1);
    let (dest, reply) = &sent[0];
    assert_eq!(*dest, Some(a_mac));
    assert_eq!(reply.frame_type, FrameType::RouteReply);
    assert_eq!(&reply.data[..6], c_mac.as_bytes());
    assert_eq!(reply.data[6], 2); // B's one hop to C, plus the hop to B

    a.handle_frame(reply.clone(), -60, 110);
    let route = a.route(c_mac).unwrap();
    assert_eq!(route.next_hop, b_mac);
    assert_eq!(route.hop_count, 2);

    // A's next data frame to C goes through B
    a.send_data(c_mac, b"routed");
    let sent = drain(&mut a);
    assert_eq!(sent[0].0, Some(b_mac));
}

#[test]
fn simulated_line_topology_delivers_multi_hop() {
    // Three nodes in a line, spaced so the ends cannot hear each other.
    let config = SimConfig::default()
        .with_node_count(3)
        .with_gateway_count(0)
        .with_area(1.0, 1.0); // placed explicitly below
    let mut sim = MeshSimulator::new(config);
    sim.place_node(0, 0.0, 0.0);
    sim.place_node(1, 250.0, 0.0);
    sim.place_node(2, 500.0, 0.0);

    sim.run(20);

    // The ends know only the middle node
    let topology = sim.topology();
    assert_eq!(topology[0], vec![1]);
    assert!(topology[2] == vec![1]);
    assert!(sim.is_connected());

    sim.send_data(0, 2, b"two hops out");
    sim.run(10);

    let received = sim.received(2);
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].0, sim.node_address(0).unwrap());
    assert_eq!(received[0].1, b"two hops out");

    // The middle node did the forwarding
    assert!(sim.engine(1).unwrap().stats().frames_forwarded >= 1);
}

#[test]
fn simulated_gateway_selection() {
    let config = SimConfig::default()
        .with_node_count(3)
        .with_gateway_count(1)
        .with_area(50.0, 50.0);
    let mut sim = MeshSimulator::new(config);
    sim.run(20);

    // Node 0 is the gateway; the others should agree on it
    let gateway_mac = sim.node_address(0).unwrap();
    for idx in 1..3 {
        let nearest = sim.engine(idx).unwrap().nearest_gateway();
        assert_eq!(nearest.map(|p| p.address), Some(gateway_mac));
    }
    // The gateway itself sees no gateway peers
    assert!(sim.engine(0).unwrap().nearest_gateway().is_none());
}

#[test]
fn heartbeat_keeps_peers_alive() {
    let config = SimConfig::default()
        .with_node_count(2)
        .with_gateway_count(0)
        .with_area(10.0, 10.0);
    let mut sim = MeshSimulator::new(config);

    // Run past several heartbeat intervals and one peer-timeout window;
    // the periodic heartbeats must keep both peer tables populated.
    let steps = (150_000 / 10) as u64;
    sim.run(steps);

    assert!(sim.now_ms() > 120_000);
    assert_eq!(sim.engine(0).unwrap().peer_count(), 1);
    assert_eq!(sim.engine(1).unwrap().peer_count(), 1);
}
