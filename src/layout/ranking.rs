use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use super::types::EdgeKey;

/// Synthetic node standing in for one intermediate layer of a long edge.
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualNode {
    pub id: String,
    pub layer: usize,
    /// Edge of the acyclic graph this node belongs to.
    pub edge: EdgeKey,
}

/// Layered graph in which every edge spans exactly one layer.
#[derive(Debug, Clone, Default)]
pub struct LayeredGraph {
    pub layer_of: HashMap<String, usize>,
    /// Unit-span edges, real and virtual endpoints mixed.
    pub edges: Vec<EdgeKey>,
    pub virtual_nodes: HashMap<String, VirtualNode>,
    /// For every acyclic edge, the node sequence source, virtuals.., target.
    pub chains: HashMap<EdgeKey, Vec<String>>,
}

impl LayeredGraph {
    pub fn is_virtual(&self, id: &str) -> bool {
        self.virtual_nodes.contains_key(id)
    }

    pub fn layer_count(&self) -> usize {
        self.layer_of.values().max().map_or(0, |max| max + 1)
    }
}

/// Topological order with declaration order as the tie-breaker.
pub(super) fn topo_order(
    node_ids: &[String],
    edges: &[EdgeKey],
    node_order: &HashMap<String, usize>,
) -> Vec<String> {
    let set: HashSet<&str> = node_ids.iter().map(String::as_str).collect();
    let mut adj: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut indeg: HashMap<&str, usize> = node_ids.iter().map(|id| (id.as_str(), 0)).collect();
    for (from, to) in edges {
        if set.contains(from.as_str()) && set.contains(to.as_str()) {
            adj.entry(from.as_str()).or_default().push(to.as_str());
            *indeg.entry(to.as_str()).or_insert(0) += 1;
        }
    }
    let order_key = |id: &str| node_order.get(id).copied().unwrap_or(usize::MAX);

    let mut ready: BinaryHeap<Reverse<(usize, &str)>> = BinaryHeap::new();
    for id in node_ids {
        if indeg.get(id.as_str()).copied().unwrap_or(0) == 0 {
            ready.push(Reverse((order_key(id), id.as_str())));
        }
    }

    let mut order = Vec::with_capacity(node_ids.len());
    while let Some(Reverse((_key, id))) = ready.pop() {
        order.push(id.to_string());
        if let Some(nexts) = adj.get(id) {
            for &next in nexts {
                if let Some(deg) = indeg.get_mut(next) {
                    *deg = deg.saturating_sub(1);
                    if *deg == 0 {
                        ready.push(Reverse((order_key(next), next)));
                    }
                }
            }
        }
    }
    order
}

/// Longest-path layering over an acyclic edge set, optionally followed by a
/// sinking pass that pulls nodes down next to their closest successor.
pub fn assign_layers(
    node_ids: &[String],
    edges: &[EdgeKey],
    node_order: &HashMap<String, usize>,
    sink: bool,
) -> HashMap<String, usize> {
    let order = topo_order(node_ids, edges, node_order);
    let mut preds: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut succs: HashMap<&str, Vec<&str>> = HashMap::new();
    for (from, to) in edges {
        preds.entry(to.as_str()).or_default().push(from.as_str());
        succs.entry(from.as_str()).or_default().push(to.as_str());
    }

    let mut layers: HashMap<String, usize> = HashMap::new();
    for node in &order {
        let layer = preds
            .get(node.as_str())
            .map(|list| {
                list.iter()
                    .filter_map(|p| layers.get(*p))
                    .map(|l| l + 1)
                    .max()
                    .unwrap_or(0)
            })
            .unwrap_or(0);
        layers.insert(node.clone(), layer);
    }

    if sink {
        for node in order.iter().rev() {
            let Some(list) = succs.get(node.as_str()) else {
                continue;
            };
            let Some(min_succ) = list.iter().filter_map(|s| layers.get(*s)).min().copied() else {
                continue;
            };
            let target = min_succ.saturating_sub(1);
            if let Some(layer) = layers.get_mut(node) {
                if target > *layer {
                    *layer = target;
                }
            }
        }
    }

    layers
}

/// Replaces every edge spanning more than one layer with a chain of virtual
/// nodes, one per intermediate layer.
pub fn insert_virtual_nodes(
    layers: &HashMap<String, usize>,
    edges: &[EdgeKey],
    reserved: &HashSet<String>,
) -> LayeredGraph {
    let mut graph = LayeredGraph {
        layer_of: layers.clone(),
        ..LayeredGraph::default()
    };
    let mut counter = 0usize;
    let mut next_id = |graph: &LayeredGraph| loop {
        let id = format!("__virtual_{counter}");
        counter += 1;
        if !reserved.contains(&id) && !graph.layer_of.contains_key(&id) {
            return id;
        }
    };

    for (from, to) in edges {
        let (Some(&src_layer), Some(&dst_layer)) = (layers.get(from), layers.get(to)) else {
            continue;
        };
        let mut chain = vec![from.clone()];
        if dst_layer > src_layer + 1 {
            let mut prev = from.clone();
            for layer in (src_layer + 1)..dst_layer {
                let id = next_id(&graph);
                graph.layer_of.insert(id.clone(), layer);
                graph.virtual_nodes.insert(
                    id.clone(),
                    VirtualNode {
                        id: id.clone(),
                        layer,
                        edge: (from.clone(), to.clone()),
                    },
                );
                graph.edges.push((prev, id.clone()));
                chain.push(id.clone());
                prev = id;
            }
            graph.edges.push((prev, to.clone()));
        } else {
            graph.edges.push((from.clone(), to.clone()));
        }
        chain.push(to.clone());
        graph.chains.insert((from.clone(), to.clone()), chain);
    }
    graph
}
