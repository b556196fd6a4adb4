use std::collections::HashMap;

use crate::config::LayoutConfig;
use crate::ir::Direction;
use crate::routing::geometry::Point;

use super::ranking::LayeredGraph;

/// Box extents split into the layer axis (along the layout direction) and
/// the cross axis (along which a layer is packed).
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) struct Extent {
    pub main: f32,
    pub cross: f32,
}

impl Extent {
    pub(super) fn of(direction: Direction, width: f32, height: f32) -> Self {
        match direction {
            Direction::TopBottom => Self {
                main: height,
                cross: width,
            },
            Direction::LeftRight => Self {
                main: width,
                cross: height,
            },
        }
    }
}

pub(super) struct Packing<'a> {
    pub config: &'a LayoutConfig,
    pub layered: &'a LayeredGraph,
    pub extents: &'a HashMap<String, Extent>,
}

impl Packing<'_> {
    fn extent(&self, id: &str) -> Extent {
        self.extents.get(id).copied().unwrap_or(Extent {
            main: 0.0,
            cross: 0.0,
        })
    }

    /// Minimum gap between two neighbours in a layer. Virtual nodes only
    /// carry an edge, so they use the edge clearances.
    fn gap(&self, a: &str, b: &str) -> f32 {
        let clearance = match (self.layered.is_virtual(a), self.layered.is_virtual(b)) {
            (false, false) => self.config.min_node_node,
            (true, true) => self.config.min_edge_edge,
            _ => self.config.min_node_edge,
        };
        self.config.min_gap.max(clearance)
    }

    /// Centre-to-centre distance two neighbours must keep.
    pub(super) fn required_distance(&self, a: &str, b: &str) -> f32 {
        self.extent(a).cross * 0.5 + self.gap(a, b) + self.extent(b).cross * 0.5
    }

    fn pack_layer(&self, ids: &[String]) -> Vec<f32> {
        let mut coords = Vec::with_capacity(ids.len());
        for (idx, id) in ids.iter().enumerate() {
            if idx == 0 {
                coords.push(0.0);
                continue;
            }
            let prev = coords[idx - 1];
            coords.push(prev + self.required_distance(&ids[idx - 1], id));
        }
        recenter(&mut coords, 0.0);
        coords
    }

    /// Pushes nodes apart in layer order until every neighbour pair keeps its
    /// required distance, then restores the layer's mean.
    fn repack_layer(&self, ids: &[String], coords: &mut [f32]) {
        if coords.is_empty() {
            return;
        }
        let mean = coords.iter().sum::<f32>() / coords.len() as f32;
        for idx in 1..coords.len() {
            let min = coords[idx - 1] + self.required_distance(&ids[idx - 1], &ids[idx]);
            if coords[idx] < min {
                coords[idx] = min;
            }
        }
        recenter(coords, mean);
    }

    fn layer_positions(&self, rank_nodes: &[Vec<String>]) -> Vec<f32> {
        let half_main = |layer: &Vec<String>| {
            layer
                .iter()
                .map(|id| self.extent(id).main * 0.5)
                .fold(0.0f32, f32::max)
        };
        let clearance = 2.0 * self.config.min_node_edge;
        let mut positions = Vec::with_capacity(rank_nodes.len());
        for (idx, layer) in rank_nodes.iter().enumerate() {
            if idx == 0 {
                positions.push(0.0);
                continue;
            }
            let extent = half_main(&rank_nodes[idx - 1]) + half_main(layer);
            let step = self
                .config
                .layer_spacing
                .max(extent + self.config.min_layer_layer + clearance);
            positions.push(positions[idx - 1] + step);
        }
        positions
    }

    fn nudge(&self, rank_nodes: &[Vec<String>], cross: &mut [Vec<f32>]) {
        let mut neighbors: HashMap<&str, Vec<&str>> = HashMap::new();
        for (from, to) in &self.layered.edges {
            neighbors.entry(from.as_str()).or_default().push(to.as_str());
            neighbors.entry(to.as_str()).or_default().push(from.as_str());
        }
        let keep = self.config.nudge_damping;
        for _ in 0..self.config.nudge_passes {
            let mut lookup: HashMap<&str, f32> = HashMap::new();
            for (layer, coords) in rank_nodes.iter().zip(cross.iter()) {
                for (id, c) in layer.iter().zip(coords) {
                    lookup.insert(id.as_str(), *c);
                }
            }
            for (layer_idx, layer) in rank_nodes.iter().enumerate() {
                for (idx, id) in layer.iter().enumerate() {
                    let Some(list) = neighbors.get(id.as_str()) else {
                        continue;
                    };
                    let values: Vec<f32> = list.iter().filter_map(|n| lookup.get(n)).copied().collect();
                    if values.is_empty() {
                        continue;
                    }
                    let target = values.iter().sum::<f32>() / values.len() as f32;
                    let current = cross[layer_idx][idx];
                    let moved = keep * current + (1.0 - keep) * target;
                    cross[layer_idx][idx] = moved;
                    lookup.insert(id.as_str(), moved);
                }
                self.repack_layer(layer, &mut cross[layer_idx]);
                for (id, c) in layer.iter().zip(&cross[layer_idx]) {
                    lookup.insert(id.as_str(), *c);
                }
            }
        }
    }

    /// Places the isolated group beside layer 0, past the cross-axis end of
    /// the main drawing.
    fn place_isolated(&self, isolated: &[String], main_cross_end: Option<f32>) -> Vec<f32> {
        let mut coords: Vec<f32> = Vec::with_capacity(isolated.len());
        for (idx, id) in isolated.iter().enumerate() {
            let half = self.extent(id).cross * 0.5;
            if idx == 0 {
                let start = main_cross_end.map_or(0.0, |end| end + self.config.node_spacing);
                coords.push(start + half);
                continue;
            }
            let prev_half = self.extent(&isolated[idx - 1]).cross * 0.5;
            let step = self
                .config
                .isolated_spacing
                .max(prev_half + half + self.config.min_node_node);
            coords.push(coords[idx - 1] + step);
        }
        if main_cross_end.is_none() {
            recenter(&mut coords, 0.0);
        }
        coords
    }

    /// Centre coordinates in layout space for every ranked node (virtual
    /// ones included) and every isolated node.
    pub(super) fn assign(
        &self,
        rank_nodes: &[Vec<String>],
        isolated: &[String],
    ) -> HashMap<String, Point> {
        let layer_pos = self.layer_positions(rank_nodes);
        let mut cross: Vec<Vec<f32>> = rank_nodes.iter().map(|l| self.pack_layer(l)).collect();
        if self.config.nudge_passes > 0 {
            self.nudge(rank_nodes, &mut cross);
        }

        let mut main_cross_end: Option<f32> = None;
        for (layer, coords) in rank_nodes.iter().zip(&cross) {
            for (id, c) in layer.iter().zip(coords) {
                let end = c + self.extent(id).cross * 0.5;
                main_cross_end = Some(main_cross_end.map_or(end, |cur| cur.max(end)));
            }
        }
        let isolated_cross = self.place_isolated(isolated, main_cross_end);

        let to_point = |main: f32, cross: f32| match self.config.direction {
            Direction::TopBottom => (cross, main),
            Direction::LeftRight => (main, cross),
        };
        let mut out = HashMap::new();
        for ((layer, coords), main) in rank_nodes.iter().zip(&cross).zip(&layer_pos) {
            for (id, c) in layer.iter().zip(coords) {
                out.insert(id.clone(), to_point(*main, *c));
            }
        }
        for (id, c) in isolated.iter().zip(isolated_cross) {
            out.insert(id.clone(), to_point(0.0, c));
        }
        out
    }
}

fn recenter(coords: &mut [f32], mean: f32) {
    if coords.is_empty() {
        return;
    }
    let current = coords.iter().sum::<f32>() / coords.len() as f32;
    let shift = mean - current;
    for c in coords.iter_mut() {
        *c += shift;
    }
}
