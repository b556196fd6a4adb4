pub mod acyclic;
mod coords;
mod error;
pub mod ordering;
pub mod ports;
pub mod ranking;
mod types;

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use crate::config::LayoutConfig;
use crate::ir::Graph;

use acyclic::AcyclicGraph;
use coords::{Extent, Packing};
use ports::PortRequest;
use ranking::LayeredGraph;

pub use error::LayoutError;
pub use types::{EdgeKey, EdgePorts, Layout, NodeLayout, PortSide};

/// Output of the first two phases: the acyclic edge set, the unit-span
/// layered graph and the nodes left out of layering because they have no
/// edges at all.
#[derive(Debug, Clone)]
pub struct Layering {
    pub acyclic: AcyclicGraph,
    pub layered: LayeredGraph,
    pub isolated: Vec<String>,
}

fn check_edges(graph: &Graph) -> Result<(), LayoutError> {
    for edge in &graph.edges {
        for end in [&edge.from, &edge.to] {
            if !graph.nodes.contains_key(end) {
                return Err(LayoutError::UnknownNode {
                    from: edge.from.clone(),
                    to: edge.to.clone(),
                    missing: end.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Cycle removal, layer assignment and virtual-node insertion.
pub fn layer_graph(graph: &Graph, config: &LayoutConfig) -> Result<Layering, LayoutError> {
    check_edges(graph)?;
    let ids = graph.ordered_ids();
    let raw_edges: Vec<EdgeKey> = graph
        .edges
        .iter()
        .filter(|e| e.from != e.to)
        .map(|e| e.key())
        .collect();
    let acyclic = acyclic::remove_cycles(&ids, &raw_edges, config.greedy_iterations)?;

    let connected: HashSet<&str> = acyclic
        .edges
        .iter()
        .flat_map(|(a, b)| [a.as_str(), b.as_str()])
        .collect();
    let (main, isolated): (Vec<String>, Vec<String>) = ids
        .into_iter()
        .partition(|id| connected.contains(id.as_str()));

    let layers = ranking::assign_layers(&main, &acyclic.edges, &graph.node_order, config.sink_layers);
    let reserved: HashSet<String> = graph.nodes.keys().cloned().collect();
    let layered = ranking::insert_virtual_nodes(&layers, &acyclic.edges, &reserved);
    Ok(Layering {
        acyclic,
        layered,
        isolated,
    })
}

fn initial_order(
    graph: &Graph,
    layered: &LayeredGraph,
) -> (Vec<Vec<String>>, HashMap<String, usize>) {
    let order_of = |id: &str| graph.node_order.get(id).copied().unwrap_or(usize::MAX / 4);
    let mut tie_order: HashMap<String, usize> = HashMap::new();
    for id in layered.layer_of.keys() {
        let key = match layered.virtual_nodes.get(id) {
            Some(v) => order_of(&v.edge.0) * 2 + 1,
            None => order_of(id) * 2,
        };
        tie_order.insert(id.clone(), key);
    }
    let mut rank_nodes: Vec<Vec<String>> = vec![Vec::new(); layered.layer_count()];
    for (id, layer) in &layered.layer_of {
        rank_nodes[*layer].push(id.clone());
    }
    for bucket in &mut rank_nodes {
        bucket.sort_by(|a, b| {
            tie_order
                .get(a)
                .cmp(&tie_order.get(b))
                .then_with(|| a.cmp(b))
        });
    }
    (rank_nodes, tie_order)
}

/// Runs the full layered layout: cycle removal, layering, crossing
/// reduction, coordinate assignment and port allocation.
pub fn compute_layout(graph: &Graph, config: &LayoutConfig) -> Result<Layout, LayoutError> {
    let started = Instant::now();
    let (config, warnings) = config.validated();
    let mut layout = Layout {
        direction: config.direction,
        warnings,
        ..Layout::default()
    };
    if graph.nodes.is_empty() {
        return Ok(layout);
    }

    let Layering {
        acyclic,
        layered,
        isolated,
    } = layer_graph(graph, &config)?;

    let (mut rank_nodes, tie_order) = initial_order(graph, &layered);
    let stats = ordering::reduce_crossings(
        &mut rank_nodes,
        &layered.edges,
        &tie_order,
        config.crossing_rounds,
        config.crossing_threshold,
    );

    let mut extents: HashMap<String, Extent> = HashMap::new();
    for node in graph.nodes.values() {
        let width = node.width.filter(|w| *w > 0.0).unwrap_or(config.node_width);
        let height = node.height.filter(|h| *h > 0.0).unwrap_or(config.node_height);
        extents.insert(node.id.clone(), Extent::of(config.direction, width, height));
    }
    let packing = Packing {
        config: &config,
        layered: &layered,
        extents: &extents,
    };
    let centers = packing.assign(&rank_nodes, &isolated);

    let mut push_node = |id: &String, layer: usize, order: usize, isolated: bool| {
        let Some(node) = graph.nodes.get(id) else {
            return;
        };
        let Some(&(x, y)) = centers.get(id) else {
            return;
        };
        let width = node.width.filter(|w| *w > 0.0).unwrap_or(config.node_width);
        let height = node.height.filter(|h| *h > 0.0).unwrap_or(config.node_height);
        layout.nodes.insert(
            id.clone(),
            NodeLayout {
                id: id.clone(),
                name: node.name.clone(),
                x,
                y,
                width,
                height,
                layer,
                order,
                isolated,
            },
        );
    };
    let mut real_layers: Vec<Vec<String>> = Vec::with_capacity(rank_nodes.len());
    for (layer_idx, layer) in rank_nodes.iter().enumerate() {
        let real: Vec<String> = layer
            .iter()
            .filter(|id| !layered.is_virtual(id))
            .cloned()
            .collect();
        for (order, id) in real.iter().enumerate() {
            push_node(id, layer_idx, order, false);
        }
        real_layers.push(real);
    }
    for (order, id) in isolated.iter().enumerate() {
        push_node(id, 0, order, true);
    }
    layout.layers = real_layers;

    let mut requests = Vec::new();
    let mut seen: HashSet<EdgeKey> = HashSet::new();
    for edge in &graph.edges {
        let key = edge.key();
        if edge.from == edge.to || !seen.insert(key.clone()) {
            continue;
        }
        let feedback = acyclic.reversed.contains(&key);
        let dag_key = if feedback {
            (key.1.clone(), key.0.clone())
        } else {
            key.clone()
        };
        let Some(chain) = layered.chains.get(&dag_key) else {
            continue;
        };
        let (Some(first), Some(last)) = (chain.get(1), chain.get(chain.len().saturating_sub(2)))
        else {
            continue;
        };
        // In chain orientation the original source is the last element for
        // feedback edges.
        let (toward_target, toward_source) = if feedback {
            (last, first)
        } else {
            (first, last)
        };
        let (Some(&toward_target), Some(&toward_source)) =
            (centers.get(toward_target), centers.get(toward_source))
        else {
            continue;
        };
        requests.push(PortRequest {
            key,
            feedback,
            toward_source,
            toward_target,
        });
    }
    layout.ports = ports::assign_ports(&requests, &layout.nodes, config.direction, config.node_margin);
    layout.feedback_edges = acyclic.reversed;
    layout.virtual_node_count = layered.virtual_nodes.len();
    layout.crossings = stats.final_crossings;

    log::info!(
        "layout: {} nodes in {} layers, {} virtual, {} feedback edges, {} crossings ({:?})",
        layout.nodes.len(),
        layout.layers.len(),
        layout.virtual_node_count,
        layout.feedback_edges.len(),
        layout.crossings,
        started.elapsed()
    );
    Ok(layout)
}
