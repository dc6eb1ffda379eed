//! Flood deduplication for route requests and broadcasts

use crate::test_utils::{address, node_id, TestMesh};
use meshage_mesh::{AppPayload, LinkEvent, Packet, SendOutcome};

#[test]
fn test_duplicate_request_not_forwarded() {
    let mut mesh = TestMesh::with_nodes(&["x", "y", "w"]);
    mesh.connect("x", "y");
    mesh.connect("x", "w");
    mesh.connect("y", "w");

    mesh.node_mut("x").send_data("node-nobody", AppPayload::chat("anyone?"));
    mesh.pump();

    let requests = mesh.packets_of_kind("RREQ");
    let into_y: Vec<&String> = requests
        .iter()
        .filter(|(_, to, _)| *to == address("y"))
        .map(|(from, _, _)| from)
        .collect();
    assert_eq!(into_y.len(), 2, "Y hears the request from X and from W");

    let out_of_y: Vec<&String> = requests
        .iter()
        .filter(|(from, _, _)| *from == address("y"))
        .map(|(_, to, _)| to)
        .collect();
    assert_eq!(out_of_y, vec![&address("w")], "Y forwards only its first copy");

    let reverse = mesh.node("y").engine().reverse_route(&node_id("x")).unwrap();
    assert_eq!(reverse.next_hop, address("x"));
    assert_eq!(reverse.hop_count, 0);
}

#[test]
fn test_replayed_request_is_noop() {
    let mut mesh = TestMesh::with_nodes(&["x", "y", "z"]);
    mesh.line(&["x", "y", "z"]);
    mesh.node_mut("x").send_data("node-nobody", AppPayload::chat("anyone?"));
    mesh.pump();

    let replay = mesh
        .log()
        .iter()
        .find(|t| t.frame.to == address("y") && matches!(t.packet(), Some(Packet::RouteRequest(_))))
        .cloned()
        .unwrap();
    let reverse_before = mesh.node("y").engine().reverse_routes();

    mesh.node_mut("y").handle_link_event(LinkEvent::Received {
        from: replay.frame.from.clone(),
        bytes: replay.frame.bytes.clone(),
    });

    assert_eq!(mesh.hub.pending(), 0);
    assert_eq!(mesh.node("y").engine().reverse_routes(), reverse_before);

    // Once the cache is cleared the same id is processed again.
    assert_eq!(mesh.node_mut("y").clear_request_cache(), 1);
    mesh.node_mut("y").handle_link_event(LinkEvent::Received {
        from: replay.frame.from,
        bytes: replay.frame.bytes,
    });
    assert_eq!(mesh.hub.pending(), 1);
}

#[test]
fn test_broadcast_delivered_once_in_triangle() {
    let mut mesh = TestMesh::with_nodes(&["x", "y", "z"]);
    mesh.connect("x", "y");
    mesh.connect("x", "z");
    mesh.connect("y", "z");

    let outcome = mesh.node_mut("x").send_broadcast(AppPayload::broadcast("hello all"));
    assert!(matches!(outcome, SendOutcome::Flooded { peers: 2, .. }));
    mesh.pump();

    for name in ["y", "z"] {
        let deliveries = mesh.app(name).deliveries();
        assert_eq!(deliveries.len(), 1, "{} delivers exactly once", name);
        assert_eq!(deliveries[0].source_id, node_id("x"));
        assert_eq!(deliveries[0].payload, AppPayload::broadcast("hello all"));
    }
    assert!(mesh.app("x").deliveries().is_empty());
}

#[test]
fn test_broadcast_reaches_end_of_line() {
    let mut mesh = TestMesh::with_nodes(&["a", "b", "c", "d"]);
    mesh.line(&["a", "b", "c", "d"]);

    mesh.node_mut("a").send_data("BROADCAST", AppPayload::broadcast("far and wide"));
    mesh.pump();

    for name in ["b", "c", "d"] {
        assert_eq!(mesh.app(name).deliveries().len(), 1);
    }
    assert!(mesh.app("a").deliveries().is_empty());
}

#[test]
fn test_replayed_broadcast_is_noop() {
    let mut mesh = TestMesh::with_nodes(&["x", "y"]);
    mesh.connect("x", "y");
    mesh.node_mut("x").send_broadcast(AppPayload::broadcast("once"));
    mesh.pump();

    let replay = mesh
        .log()
        .iter()
        .find(|t| t.frame.to == address("y"))
        .cloned()
        .unwrap();
    mesh.node_mut("y").handle_link_event(LinkEvent::Received {
        from: replay.frame.from,
        bytes: replay.frame.bytes,
    });

    assert_eq!(mesh.hub.pending(), 0);
    assert_eq!(mesh.app("y").deliveries().len(), 1);
}
