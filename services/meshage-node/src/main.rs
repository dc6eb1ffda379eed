use anyhow::{anyhow, bail, Context};
use meshage_core::{logging, MeshConfig};
use meshage_identity::{generate_persistent_id, DeviceIdentifier, NodeIdentity};
use meshage_mesh::{
    AppPayload, ChannelApplication, MemoryHub, MeshEvent, MeshHandle, MeshNode, MeshRuntime,
    SendOutcome,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const NODE_PROTOCOL_VERSION: u32 = 1;
const NODE_RUNTIME_VERSION: u32 = 1;

/// How often the simulated link layer moves queued frames.
const PUMP_INTERVAL: Duration = Duration::from_millis(10);
/// Time given to route discovery before the first message is resent.
const DISCOVERY_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Serialize)]
struct NodeVersionHandshake {
    version: &'static str,
    runtime_version: u32,
    protocol_version: u32,
}

#[derive(Debug)]
struct Args {
    config_path: Option<PathBuf>,
    nodes: usize,
    json_logs: bool,
}

struct SimulatedNode {
    name: String,
    persistent_id: String,
    address: String,
    handle: MeshHandle,
    task: JoinHandle<MeshNode>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let raw_args: Vec<String> = std::env::args().collect();

    if raw_args.iter().any(|arg| arg == "--version-json") {
        let handshake = NodeVersionHandshake {
            version: env!("CARGO_PKG_VERSION"),
            runtime_version: NODE_RUNTIME_VERSION,
            protocol_version: NODE_PROTOCOL_VERSION,
        };
        println!("{}", serde_json::to_string(&handshake)?);
        return Ok(());
    }

    let args = parse_args(&raw_args)?;
    if args.json_logs {
        logging::init_json();
    } else {
        logging::init();
    }

    let config = match &args.config_path {
        Some(path) => MeshConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => MeshConfig::default_config(),
    };

    run_simulation(config, args.nodes).await
}

/// Run a line of `count` nodes over an in-memory hub; the first node uses `config`.
async fn run_simulation(config: MeshConfig, count: usize) -> anyhow::Result<()> {
    let hub = MemoryHub::new();
    let (local_app, mut local_events) = ChannelApplication::new();
    let (remote_app, mut remote_events) = ChannelApplication::new();

    let mut nodes = Vec::with_capacity(count);
    for index in 0..count {
        let mut node_config = config.clone();
        let persistent_id = if index == 0 {
            config
                .node
                .persistent_id
                .clone()
                .unwrap_or_else(generate_persistent_id)
        } else {
            node_config.node.display_name = format!("sim-{}", index);
            node_config.node.link_address = None;
            generate_persistent_id()
        };
        let app = if index == 0 {
            local_app.clone()
        } else {
            remote_app.clone()
        };
        nodes.push(spawn_node(&hub, node_config, persistent_id, Arc::new(app))?);
    }
    drop(local_app);
    drop(remote_app);

    let routes: BTreeMap<String, MeshHandle> = nodes
        .iter()
        .map(|node| (node.address.clone(), node.handle.clone()))
        .collect();
    let pump = tokio::spawn(pump_frames(hub.clone(), routes));

    for pair in nodes.windows(2) {
        connect(&hub, &pair[0], &pair[1])?;
    }
    for node in &nodes {
        node.handle.start_presence(node.name.clone())?;
    }

    let local = &nodes[0];
    let far = &nodes[count - 1];
    info!(from = %local.persistent_id, to = %far.persistent_id, "Sending across the mesh");

    let payload = AppPayload::chat(format!("hello from {}", local.name));
    let first = local.handle.send_data(far.persistent_id.clone(), payload.clone()).await?;
    if let SendOutcome::DiscoveryStarted { request_id } = &first {
        info!(%request_id, "Route discovery started, resending shortly");
        tokio::time::sleep(DISCOVERY_GRACE).await;
        let retry = local.handle.send_data(far.persistent_id.clone(), payload).await?;
        info!(outcome = ?retry, "Resent message");
    }
    local
        .handle
        .send_broadcast(AppPayload::broadcast(format!("{} is online", local.name)))
        .await?;

    info!("Simulation running, press Ctrl-C to stop");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Some(event) = local_events.recv() => log_event(&local.name, event),
            Some(event) = remote_events.recv() => log_event("remote", event),
        }
    }

    let table = local.handle.routing_table().await?;
    println!("{}", serde_json::to_string_pretty(&table)?);

    for node in &nodes {
        if node.handle.shutdown().is_err() {
            warn!(node = %node.name, "Runtime already stopped");
        }
    }
    for node in nodes {
        node.task.await?;
    }
    pump.abort();
    Ok(())
}

fn spawn_node(
    hub: &MemoryHub,
    config: MeshConfig,
    persistent_id: String,
    app: Arc<ChannelApplication>,
) -> anyhow::Result<SimulatedNode> {
    let identity = Arc::new(NodeIdentity::with_persistent_id(persistent_id.clone())?);
    let address = config.node.resolved_link_address(&persistent_id);
    let node = MeshNode::new(identity, &config, Arc::new(hub.endpoint(address.clone())), app)?;
    let (runtime, handle) = MeshRuntime::new(node, &config)?;

    Ok(SimulatedNode {
        name: config.node.display_name.clone(),
        persistent_id,
        address,
        handle,
        task: runtime.spawn(),
    })
}

fn connect(hub: &MemoryHub, a: &SimulatedNode, b: &SimulatedNode) -> anyhow::Result<()> {
    hub.link(&a.address, &b.address);
    let advertised = |node: &SimulatedNode| {
        Some(DeviceIdentifier::new(node.name.clone(), node.persistent_id.clone()).encode())
    };
    a.handle.link_up(b.address.clone(), advertised(b))?;
    b.handle.link_up(a.address.clone(), advertised(a))?;
    Ok(())
}

/// Deliver hub frames to the runtime owning the receiving address.
async fn pump_frames(hub: MemoryHub, routes: BTreeMap<String, MeshHandle>) {
    let mut ticker = tokio::time::interval(PUMP_INTERVAL);
    loop {
        ticker.tick().await;
        for frame in hub.take_frames() {
            match routes.get(&frame.to) {
                Some(handle) => {
                    if handle.received(frame.from, frame.bytes).is_err() {
                        return;
                    }
                }
                None => warn!(to = %frame.to, "Frame for unknown address"),
            }
        }
    }
}

fn log_event(node: &str, event: MeshEvent) {
    match event {
        MeshEvent::Delivered {
            source_id,
            payload,
            sender_display_name,
        } => info!(
            %node,
            from = %sender_display_name,
            %source_id,
            kind = payload.kind(),
            "Message delivered"
        ),
        MeshEvent::RoutingTable(routes) => info!(%node, routes = routes.len(), "Routing table changed"),
    }
}

fn parse_args(args: &[String]) -> anyhow::Result<Args> {
    let mut parsed = Args {
        config_path: None,
        nodes: 3,
        json_logs: false,
    };

    let mut args_iter = args.iter().skip(1);
    while let Some(arg) = args_iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = args_iter
                    .next()
                    .ok_or_else(|| anyhow!("--config was provided without a path"))?;
                parsed.config_path = Some(PathBuf::from(path));
            }
            "--nodes" => {
                let value = args_iter
                    .next()
                    .ok_or_else(|| anyhow!("--nodes was provided without a count"))?;
                parsed.nodes = value
                    .parse()
                    .with_context(|| format!("invalid node count {}", value))?;
            }
            "--json-logs" => parsed.json_logs = true,
            other => bail!("unknown argument {}", other),
        }
    }

    if parsed.nodes < 2 {
        bail!("--nodes must be at least 2");
    }
    Ok(parsed)
}
