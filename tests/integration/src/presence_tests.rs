//! Presence announcements across a small mesh

use crate::test_utils::{address, node_id, TestMesh};
use meshage_core::current_timestamp;
use meshage_mesh::EnvelopeKind;

fn announce_all(mesh: &mut TestMesh, names: &[&str]) {
    let now = current_timestamp();
    for name in names {
        mesh.node_mut(name).presence_tick(now);
    }
    mesh.pump();
}

#[test]
fn test_discover_answered_once_per_neighbor() {
    let mut mesh = TestMesh::with_nodes(&["x", "y", "z"]);
    mesh.connect_anonymous("x", "y");
    mesh.connect_anonymous("y", "z");
    for name in ["x", "y", "z"] {
        mesh.node_mut(name).start_presence(&name.to_uppercase());
    }

    announce_all(&mut mesh, &["x", "y", "z"]);

    let mut discovers: Vec<(String, String)> = Vec::new();
    let mut responses: Vec<(String, String)> = Vec::new();
    for t in mesh.log() {
        let pair = (t.frame.from.clone(), t.frame.to.clone());
        match t.envelope.kind {
            EnvelopeKind::Discover => discovers.push(pair),
            EnvelopeKind::Response => responses.push(pair),
            EnvelopeKind::Data => panic!("no routing traffic expected"),
        }
    }
    assert_eq!(discovers.len(), 4);
    assert_eq!(responses.len(), 4);
    // Every DISCOVER got exactly one RESPONSE on the link it came from.
    for (from, to) in &discovers {
        let answers = responses.iter().filter(|(f, t)| f == to && t == from).count();
        assert_eq!(answers, 1, "DISCOVER {} -> {}", from, to);
    }

    let peers_of = |mesh: &TestMesh, name: &str| -> Vec<String> {
        mesh.node(name)
            .presence_peers()
            .into_iter()
            .map(|p| p.node_id)
            .collect()
    };
    assert_eq!(peers_of(&mesh, "x"), vec![node_id("y")]);
    assert_eq!(peers_of(&mesh, "y"), vec![node_id("x"), node_id("z")]);
    assert_eq!(peers_of(&mesh, "z"), vec![node_id("y")]);
}

#[test]
fn test_presence_seeds_neighbor_routes() {
    let mut mesh = TestMesh::with_nodes(&["x", "y"]);
    mesh.connect_anonymous("x", "y");
    assert!(mesh.node("x").routing_table().is_empty());

    mesh.node_mut("y").start_presence("Y");
    announce_all(&mut mesh, &["y"]);

    let route = mesh.node("x").engine().route(&node_id("y")).cloned().unwrap();
    assert_eq!(route.next_hop, address("y"));
    assert!(route.is_direct);
    // The RESPONSE taught Y about X as well.
    assert!(mesh.node("y").engine().route(&node_id("x")).is_some());
}

#[test]
fn test_stopped_presence_is_silent() {
    let mut mesh = TestMesh::with_nodes(&["x", "y"]);
    mesh.connect_anonymous("x", "y");

    announce_all(&mut mesh, &["x", "y"]);
    assert!(mesh.log().is_empty());

    mesh.node_mut("x").start_presence("X");
    mesh.node_mut("x").stop_presence();
    announce_all(&mut mesh, &["x"]);
    assert!(mesh.log().is_empty());
}

#[test]
fn test_silent_peer_purged() {
    let mut mesh = TestMesh::with_nodes(&["x", "y"]);
    mesh.connect_anonymous("x", "y");
    mesh.node_mut("x").start_presence("X");
    announce_all(&mut mesh, &["x"]);
    assert_eq!(mesh.node("x").presence_peers().len(), 1);

    // Y never announces; its RESPONSE is the last X heard of it.
    mesh.hub.unlink(&address("x"), &address("y"));
    mesh.node_mut("x").presence_tick(current_timestamp() + 20_000);
    mesh.pump();
    assert!(mesh.node("x").presence_peers().is_empty());
}
