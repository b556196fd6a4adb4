use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::config::ConfigWarning;
use crate::ir::Direction;
use crate::routing::geometry::{Point, Rect};

#[derive(Debug, Clone, Serialize)]
pub struct NodeLayout {
    pub id: String,
    pub name: Option<String>,
    /// Centre of the box in layout space.
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub layer: usize,
    pub order: usize,
    pub isolated: bool,
}

impl NodeLayout {
    pub fn rect(&self) -> Rect {
        Rect::from_center((self.x, self.y), self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum PortSide {
    Top,
    Bottom,
    Left,
    Right,
}

impl PortSide {
    pub fn is_vertical(self) -> bool {
        matches!(self, PortSide::Top | PortSide::Bottom)
    }

    /// Unit vector pointing away from the node through this side.
    pub fn normal(self) -> Point {
        match self {
            PortSide::Top => (0.0, -1.0),
            PortSide::Bottom => (0.0, 1.0),
            PortSide::Left => (-1.0, 0.0),
            PortSide::Right => (1.0, 0.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EdgePorts {
    pub source: Point,
    pub target: Point,
    pub source_side: PortSide,
    pub target_side: PortSide,
    pub feedback: bool,
}

pub type EdgeKey = (String, String);

#[derive(Debug, Clone, Default)]
pub struct Layout {
    pub direction: Direction,
    pub nodes: BTreeMap<String, NodeLayout>,
    /// Real node ids per layer in final order; the isolated group is not part
    /// of any layer list.
    pub layers: Vec<Vec<String>>,
    pub ports: BTreeMap<EdgeKey, EdgePorts>,
    /// Original edges that were reversed to break cycles.
    pub feedback_edges: BTreeSet<EdgeKey>,
    pub virtual_node_count: usize,
    pub crossings: usize,
    pub warnings: Vec<ConfigWarning>,
}

impl Layout {
    pub fn positions(&self) -> BTreeMap<String, Point> {
        self.nodes
            .iter()
            .map(|(id, node)| (id.clone(), (node.x, node.y)))
            .collect()
    }

    pub fn node_rects(&self) -> Vec<(String, Rect)> {
        self.nodes
            .values()
            .map(|node| (node.id.clone(), node.rect()))
            .collect()
    }

    /// Bounding box of every node, or `None` for an empty layout.
    pub fn bounds(&self) -> Option<Rect> {
        let mut iter = self.nodes.values();
        let first = iter.next()?.rect();
        Some(iter.fold(first, |acc, node| acc.union(&node.rect())))
    }
}
