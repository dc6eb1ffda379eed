//! Route discovery across relay chains
//!
//! # Test Scenarios
//!
//! 1. **Line discovery**: X-Y-Z, X finds Z through Y
//! 2. **Hop accounting**: discovered hop count is relays + 1
//! 3. **Live routes**: a fresh route never triggers another discovery
//! 4. **Intermediate reply**: a relay with a relay route answers for the destination
//! 5. **Expiry**: swept routes force a new discovery

use crate::test_utils::{address, node_id, Delivery, TestMesh};
use meshage_core::{current_timestamp, RoutingSettings};
use meshage_mesh::{AppPayload, Packet, SendOutcome};

fn discover(mesh: &mut TestMesh, from: &str, to: &str) {
    let outcome = mesh.node_mut(from).send_data(&node_id(to), AppPayload::chat("ping"));
    assert!(
        matches!(outcome, SendOutcome::DiscoveryStarted { .. }),
        "expected discovery, got {:?}",
        outcome
    );
    mesh.pump();
}

#[test]
fn test_line_discovery_and_delivery() {
    crate::test_utils::init_test_logging();
    let mut mesh = TestMesh::with_nodes(&["x", "y", "z"]);
    mesh.line(&["x", "y", "z"]);

    let outcome = mesh.node_mut("x").send_data(&node_id("z"), AppPayload::chat("hi"));
    assert!(matches!(outcome, SendOutcome::DiscoveryStarted { .. }));
    mesh.pump();

    let requests: Vec<(String, String, u32)> = mesh
        .packets_of_kind("RREQ")
        .into_iter()
        .map(|(from, to, packet)| match packet {
            Packet::RouteRequest(request) => (from, to, request.hop_count),
            _ => unreachable!(),
        })
        .collect();
    assert_eq!(
        requests,
        vec![
            (address("x"), address("y"), 0),
            (address("y"), address("z"), 1),
        ]
    );

    let replies: Vec<(String, String, u32)> = mesh
        .packets_of_kind("RREP")
        .into_iter()
        .map(|(from, to, packet)| match packet {
            Packet::RouteReply(reply) => (from, to, reply.hop_count),
            _ => unreachable!(),
        })
        .collect();
    assert_eq!(
        replies,
        vec![
            (address("z"), address("y"), 1),
            (address("y"), address("x"), 2),
        ]
    );

    let route = mesh.node("x").engine().route(&node_id("z")).cloned().unwrap();
    assert_eq!(route.next_hop, address("y"));
    assert_eq!(route.hop_count, 2);
    assert!(!route.is_direct);

    // The first message was dropped; the resend goes through.
    let outcome = mesh.node_mut("x").send_data(&node_id("z"), AppPayload::chat("hi"));
    assert!(matches!(outcome, SendOutcome::Forwarded { ref next_hop, .. } if *next_hop == address("y")));
    mesh.pump();

    assert_eq!(
        mesh.app("z").deliveries(),
        vec![Delivery {
            source_id: node_id("x"),
            payload: AppPayload::chat("hi"),
            sender_display_name: "X".to_string(),
        }]
    );
    assert!(mesh.app("y").deliveries().is_empty());
}

#[test]
fn test_hop_count_is_relays_plus_one() {
    let mut mesh = TestMesh::with_nodes(&["a", "b", "c", "d", "e"]);
    mesh.line(&["a", "b", "c", "d", "e"]);

    discover(&mut mesh, "a", "e");

    let route = mesh.node("a").engine().route(&node_id("e")).cloned().unwrap();
    assert_eq!(route.hop_count, 4);
    assert_eq!(route.next_hop, address("b"));

    // Every relay appended its address exactly once.
    let arrived = mesh
        .packets_of_kind("RREQ")
        .into_iter()
        .find(|(_, to, _)| *to == address("e"))
        .map(|(_, _, packet)| packet)
        .unwrap();
    match arrived {
        Packet::RouteRequest(request) => {
            assert_eq!(request.hop_count, 3);
            assert_eq!(
                request.path,
                vec![address("a"), address("b"), address("c"), address("d")]
            );
        }
        other => panic!("Expected RREQ, got {}", other.kind()),
    }

    // Relays learned the route too, each at its own distance.
    assert_eq!(mesh.node("b").engine().route(&node_id("e")).unwrap().hop_count, 3);
    assert_eq!(mesh.node("c").engine().route(&node_id("e")).unwrap().hop_count, 2);
    assert_eq!(mesh.node("d").engine().route(&node_id("e")).unwrap().hop_count, 1);
}

#[test]
fn test_live_route_never_rediscovers() {
    let mut mesh = TestMesh::with_nodes(&["x", "y", "z"]);
    mesh.line(&["x", "y", "z"]);
    discover(&mut mesh, "x", "z");
    mesh.clear_log();

    for i in 0..5 {
        let outcome = mesh
            .node_mut("x")
            .send_data(&node_id("z"), AppPayload::chat(format!("msg {}", i)));
        assert!(matches!(outcome, SendOutcome::Forwarded { .. }));
    }
    mesh.pump();

    assert!(mesh.packets_of_kind("RREQ").is_empty());
    assert_eq!(mesh.app("z").deliveries().len(), 5);
}

#[test]
fn test_intermediate_node_answers_from_table() {
    let mut mesh = TestMesh::with_nodes(&["x", "y", "z", "w"]);
    mesh.line(&["x", "y", "z", "w"]);
    discover(&mut mesh, "x", "w");

    let relay_route = mesh.node("y").engine().route(&node_id("w")).cloned().unwrap();
    assert_eq!(relay_route.hop_count, 2);
    assert!(!relay_route.is_direct);

    mesh.add_node("v");
    mesh.connect("v", "y");
    mesh.clear_log();
    discover(&mut mesh, "v", "w");

    // Y replied itself; the request went no further.
    let requests = mesh.packets_of_kind("RREQ");
    assert!(!requests.is_empty());
    assert!(requests.iter().all(|(from, _, _)| *from == address("v")));

    let replies = mesh.packets_of_kind("RREP");
    assert_eq!(replies.len(), 1);
    match &replies[0] {
        (from, to, Packet::RouteReply(reply)) => {
            assert_eq!(*from, address("y"));
            assert_eq!(*to, address("v"));
            assert_eq!(reply.source_id, node_id("w"));
            assert_eq!(reply.hop_count, 3);
        }
        other => panic!("Expected RREP, got {:?}", other),
    }

    let route = mesh.node("v").engine().route(&node_id("w")).cloned().unwrap();
    assert_eq!(route.next_hop, address("y"));
    assert_eq!(route.hop_count, 3);

    mesh.node_mut("v").send_data(&node_id("w"), AppPayload::chat("via table"));
    mesh.pump();
    assert_eq!(mesh.app("w").deliveries().len(), 1);
}

#[test]
fn test_swept_route_forces_new_discovery() {
    let mut mesh = TestMesh::with_nodes(&["x", "y", "z"]);
    mesh.line(&["x", "y", "z"]);
    discover(&mut mesh, "x", "z");

    let later = current_timestamp() + RoutingSettings::default().route_timeout_ms + 1_000;
    let expired = mesh.node_mut("x").sweep_routes(later);
    assert_eq!(expired, vec![node_id("y"), node_id("z")]);
    assert!(mesh.node("x").routing_table().is_empty());

    let outcome = mesh.node_mut("x").send_data(&node_id("z"), AppPayload::chat("again"));
    assert!(matches!(outcome, SendOutcome::DiscoveryStarted { .. }));
    mesh.pump();
    assert!(mesh.node("x").engine().route(&node_id("z")).is_some());
}

#[test]
fn test_table_changes_reported_to_application() {
    let mut mesh = TestMesh::with_nodes(&["x", "y", "z"]);
    mesh.line(&["x", "y", "z"]);
    discover(&mut mesh, "x", "z");

    let updates = mesh.app("x").table_updates();
    let last = updates.last().unwrap();
    let destinations: Vec<&str> = last.iter().map(|r| r.destination.as_str()).collect();
    assert_eq!(destinations, vec!["node-y", "node-z"]);
}
