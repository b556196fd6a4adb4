use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use crate::ir::Direction;
use crate::routing::geometry::Point;

use super::types::{EdgeKey, EdgePorts, NodeLayout, PortSide};

/// One original edge waiting for ports. `toward_*` is the position of the
/// next node along the edge's layer chain, used to order ports on a side.
#[derive(Debug, Clone)]
pub(super) struct PortRequest {
    pub key: EdgeKey,
    pub feedback: bool,
    pub toward_source: Point,
    pub toward_target: Point,
}

/// Forward edges leave the source on the downstream side and enter the
/// target on the upstream side; feedback edges mirror both.
pub fn port_sides(direction: Direction, feedback: bool) -> (PortSide, PortSide) {
    let (exit, entry) = match direction {
        Direction::TopBottom => (PortSide::Bottom, PortSide::Top),
        Direction::LeftRight => (PortSide::Right, PortSide::Left),
    };
    if feedback { (entry, exit) } else { (exit, entry) }
}

/// Point `index` (1-based) of `count` evenly spread along `side`, inset by
/// `margin` from the corners.
pub fn port_point(node: &NodeLayout, side: PortSide, index: usize, count: usize, margin: f32) -> Point {
    let fraction = index as f32 / (count + 1) as f32;
    let half_w = node.width * 0.5;
    let half_h = node.height * 0.5;
    match side {
        PortSide::Top | PortSide::Bottom => {
            let span = (node.width - 2.0 * margin).max(0.0);
            let x = node.x - half_w + margin + span * fraction;
            let y = if side == PortSide::Top {
                node.y - half_h
            } else {
                node.y + half_h
            };
            (x, y)
        }
        PortSide::Left | PortSide::Right => {
            let span = (node.height - 2.0 * margin).max(0.0);
            let y = node.y - half_h + margin + span * fraction;
            let x = if side == PortSide::Left {
                node.x - half_w
            } else {
                node.x + half_w
            };
            (x, y)
        }
    }
}

#[derive(Debug)]
struct SideSlot {
    along: f32,
    key: EdgeKey,
    at_source: bool,
}

pub(super) fn assign_ports(
    requests: &[PortRequest],
    nodes: &BTreeMap<String, NodeLayout>,
    direction: Direction,
    margin: f32,
) -> BTreeMap<EdgeKey, EdgePorts> {
    let mut slots: HashMap<(String, PortSide), Vec<SideSlot>> = HashMap::new();
    let mut sides: HashMap<EdgeKey, (PortSide, PortSide)> = HashMap::new();

    for request in requests {
        let (source_side, target_side) = port_sides(direction, request.feedback);
        sides.insert(request.key.clone(), (source_side, target_side));
        let along = |side: PortSide, p: Point| if side.is_vertical() { p.0 } else { p.1 };
        slots
            .entry((request.key.0.clone(), source_side))
            .or_default()
            .push(SideSlot {
                along: along(source_side, request.toward_target),
                key: request.key.clone(),
                at_source: true,
            });
        slots
            .entry((request.key.1.clone(), target_side))
            .or_default()
            .push(SideSlot {
                along: along(target_side, request.toward_source),
                key: request.key.clone(),
                at_source: false,
            });
    }

    let mut points: HashMap<(EdgeKey, bool), Point> = HashMap::new();
    for ((node_id, side), mut list) in slots {
        let Some(node) = nodes.get(&node_id) else {
            continue;
        };
        list.sort_by(|a, b| {
            a.along
                .partial_cmp(&b.along)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.key.cmp(&b.key))
                .then_with(|| a.at_source.cmp(&b.at_source))
        });
        let count = list.len();
        for (idx, slot) in list.into_iter().enumerate() {
            let point = port_point(node, side, idx + 1, count, margin);
            points.insert((slot.key, slot.at_source), point);
        }
    }

    let mut ports = BTreeMap::new();
    for request in requests {
        let (Some(source), Some(target)) = (
            points.get(&(request.key.clone(), true)),
            points.get(&(request.key.clone(), false)),
        ) else {
            continue;
        };
        let (source_side, target_side) = sides[&request.key];
        ports.insert(
            request.key.clone(),
            EdgePorts {
                source: *source,
                target: *target,
                source_side,
                target_side,
                feedback: request.feedback,
            },
        );
    }
    ports
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, x: f32, y: f32) -> NodeLayout {
        NodeLayout {
            id: id.to_string(),
            name: None,
            x,
            y,
            width: 120.0,
            height: 60.0,
            layer: 0,
            order: 0,
            isolated: false,
        }
    }

    #[test]
    fn sides_follow_direction_and_feedback() {
        assert_eq!(
            port_sides(Direction::TopBottom, false),
            (PortSide::Bottom, PortSide::Top)
        );
        assert_eq!(
            port_sides(Direction::TopBottom, true),
            (PortSide::Top, PortSide::Bottom)
        );
        assert_eq!(
            port_sides(Direction::LeftRight, false),
            (PortSide::Right, PortSide::Left)
        );
        assert_eq!(
            port_sides(Direction::LeftRight, true),
            (PortSide::Left, PortSide::Right)
        );
    }

    #[test]
    fn single_port_sits_mid_side() {
        let n = node("a", 0.0, 0.0);
        assert_eq!(port_point(&n, PortSide::Bottom, 1, 1, 15.0), (0.0, 30.0));
        assert_eq!(port_point(&n, PortSide::Left, 1, 1, 15.0), (-60.0, 0.0));
    }

    #[test]
    fn ports_divide_side_evenly_and_stay_inside_margin() {
        let n = node("a", 0.0, 0.0);
        let margin = 15.0;
        let xs: Vec<f32> = (1..=3)
            .map(|i| port_point(&n, PortSide::Top, i, 3, margin).0)
            .collect();
        assert!((xs[0] + 22.5).abs() < 1e-4);
        assert!(xs[1].abs() < 1e-4);
        assert!((xs[2] - 22.5).abs() < 1e-4);
        for x in xs {
            assert!(x >= -60.0 + margin && x <= 60.0 - margin);
        }
    }

    #[test]
    fn ports_are_ordered_by_neighbour_position() {
        let mut nodes = BTreeMap::new();
        nodes.insert("s".to_string(), node("s", 0.0, 0.0));
        nodes.insert("l".to_string(), node("l", -200.0, 200.0));
        nodes.insert("r".to_string(), node("r", 200.0, 200.0));
        let requests = vec![
            PortRequest {
                key: ("s".to_string(), "r".to_string()),
                feedback: false,
                toward_source: (0.0, 0.0),
                toward_target: (200.0, 200.0),
            },
            PortRequest {
                key: ("s".to_string(), "l".to_string()),
                feedback: false,
                toward_source: (0.0, 0.0),
                toward_target: (-200.0, 200.0),
            },
        ];
        let ports = assign_ports(&requests, &nodes, Direction::TopBottom, 15.0);
        let to_left = ports[&("s".to_string(), "l".to_string())];
        let to_right = ports[&("s".to_string(), "r".to_string())];
        assert!(to_left.source.0 < to_right.source.0);
        assert_eq!(to_left.source.1, 30.0);
        assert_eq!(to_left.target.1, 170.0);
    }
}
