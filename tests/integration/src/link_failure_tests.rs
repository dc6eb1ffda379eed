//! Link breakage and route error propagation

use crate::test_utils::{address, node_id, TestMesh};
use meshage_mesh::{AppPayload, LinkEvent, Packet, RouteError, SendOutcome};

/// Route errors in the log originated by `name`, deduplicated by packet id.
fn errors_from(mesh: &TestMesh, name: &str) -> Vec<RouteError> {
    let mut seen = Vec::<RouteError>::new();
    for (_, _, packet) in mesh.packets_of_kind("RERR") {
        if let Packet::RouteError(route_error) = packet {
            if route_error.source_id == node_id(name)
                && !seen.iter().any(|e| e.packet_id == route_error.packet_id)
            {
                seen.push(route_error);
            }
        }
    }
    seen
}

/// X-Y-Z line plus a spare neighbor W of X, with a route X -> Z discovered.
fn line_with_spare() -> TestMesh {
    let mut mesh = TestMesh::with_nodes(&["x", "y", "z", "w"]);
    mesh.line(&["x", "y", "z"]);
    mesh.connect("x", "w");
    mesh.node_mut("x").send_data(&node_id("z"), AppPayload::chat("ping"));
    mesh.pump();
    assert!(mesh.node("x").engine().route(&node_id("z")).is_some());
    mesh.clear_log();
    mesh
}

#[test]
fn test_link_down_originates_one_error() {
    let mut mesh = line_with_spare();

    mesh.hub.unlink(&address("x"), &address("y"));
    mesh.node_mut("x").handle_link_event(LinkEvent::Down { address: address("y") });
    mesh.pump();

    let errors = errors_from(&mesh, "x");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].broken_link, (address("x"), address("y")));

    let x = mesh.node("x").engine();
    assert!(x.route(&node_id("z")).is_none());
    assert!(x.route(&node_id("y")).is_none());
    assert!(x.route(&node_id("w")).is_some());
    assert!(!x.is_connected(&address("y")));
}

#[test]
fn test_link_down_without_routes_still_reports() {
    let mut mesh = TestMesh::with_nodes(&["x", "y", "w"]);
    mesh.connect_anonymous("x", "y");
    mesh.connect("x", "w");
    assert!(mesh.node("x").engine().route(&node_id("y")).is_none());

    mesh.hub.unlink(&address("x"), &address("y"));
    mesh.node_mut("x").handle_link_event(LinkEvent::Down { address: address("y") });
    mesh.pump();

    assert_eq!(errors_from(&mesh, "x").len(), 1);
}

#[test]
fn test_send_failure_then_link_down_reports_once() {
    let mut mesh = line_with_spare();

    // The radio dropped the link before anyone noticed.
    mesh.hub.unlink(&address("x"), &address("y"));
    let outcome = mesh.node_mut("x").send_data(&node_id("z"), AppPayload::chat("lost"));
    assert_eq!(
        outcome,
        SendOutcome::LinkBroken {
            next_hop: address("y")
        }
    );

    mesh.node_mut("x").handle_link_event(LinkEvent::Down { address: address("y") });
    mesh.pump();

    let errors = errors_from(&mesh, "x");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].broken_link, (address("x"), address("y")));
    assert!(mesh.node("x").engine().route(&node_id("z")).is_none());
}

#[test]
fn test_error_propagates_upstream() {
    let mut mesh = TestMesh::with_nodes(&["v", "x", "y", "z"]);
    mesh.line(&["v", "x", "y", "z"]);
    mesh.node_mut("v").send_data(&node_id("z"), AppPayload::chat("ping"));
    mesh.pump();
    assert_eq!(mesh.node("x").engine().route(&node_id("z")).unwrap().next_hop, address("y"));
    mesh.clear_log();

    mesh.hub.unlink(&address("y"), &address("z"));
    mesh.node_mut("y").handle_link_event(LinkEvent::Down { address: address("z") });
    mesh.pump();

    assert_eq!(errors_from(&mesh, "y").len(), 1);
    assert!(mesh.node("y").engine().route(&node_id("z")).is_none());
    assert!(mesh.node("x").engine().route(&node_id("z")).is_none());

    // X removed routes and re-flooded the same error.
    let refloods = mesh
        .packets_of_kind("RERR")
        .into_iter()
        .filter(|(from, _, _)| *from == address("x"))
        .count();
    assert!(refloods > 0);
}

#[test]
fn test_forwarder_without_route_starts_discovery() {
    let mut mesh = TestMesh::with_nodes(&["v", "x", "y"]);
    mesh.line(&["v", "x", "y"]);
    mesh.add_node("z");
    mesh.connect("y", "z");
    mesh.node_mut("v").send_data(&node_id("z"), AppPayload::chat("ping"));
    mesh.pump();

    // X forgets its routes but V still points at X.
    mesh.node_mut("x").sweep_routes(u64::MAX);
    mesh.clear_log();

    mesh.node_mut("v").send_data(&node_id("z"), AppPayload::chat("dropped at x"));
    mesh.pump();

    let from_x = mesh
        .packets_of_kind("RREQ")
        .into_iter()
        .filter(|(_, _, packet)| packet.source_id() == node_id("x"))
        .count();
    assert!(from_x > 0);
    assert!(mesh.app("z").deliveries().is_empty());
    assert!(mesh.node("x").engine().route(&node_id("z")).is_some());
}
