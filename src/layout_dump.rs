use crate::ir::{Direction, Graph};
use crate::layout::Layout;
use crate::routing::{RoutedEdge, RoutingStats};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

#[derive(Debug, Serialize)]
pub struct LayoutDump {
    pub direction: Direction,
    pub width: f32,
    pub height: f32,
    pub layers: Vec<Vec<String>>,
    pub virtual_nodes: usize,
    pub crossings: usize,
    pub nodes: Vec<NodeDump>,
    pub edges: Vec<EdgeDump>,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing: Option<RoutingStats>,
}

#[derive(Debug, Serialize)]
pub struct NodeDump {
    pub id: String,
    pub name: Option<String>,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub layer: usize,
    pub order: usize,
    pub isolated: bool,
}

#[derive(Debug, Serialize)]
pub struct EdgeDump {
    pub from: String,
    pub to: String,
    pub feedback: bool,
    pub source_port: Option<[f32; 2]>,
    pub target_port: Option<[f32; 2]>,
    pub points: Vec<[f32; 2]>,
    pub success: bool,
    pub bends: usize,
    pub length: f32,
    pub label: Option<String>,
}

impl LayoutDump {
    pub fn from_layout(layout: &Layout, graph: &Graph, routes: &[RoutedEdge]) -> Self {
        let nodes = graph
            .ordered_ids()
            .iter()
            .filter_map(|id| layout.nodes.get(id))
            .map(|node| NodeDump {
                id: node.id.clone(),
                name: node.name.clone(),
                x: node.x,
                y: node.y,
                width: node.width,
                height: node.height,
                layer: node.layer,
                order: node.order,
                isolated: node.isolated,
            })
            .collect();

        let edges = graph
            .edges
            .iter()
            .map(|edge| {
                let key = edge.key();
                let ports = layout.ports.get(&key);
                let route = routes.iter().find(|r| r.from == edge.from && r.to == edge.to);
                EdgeDump {
                    from: edge.from.clone(),
                    to: edge.to.clone(),
                    feedback: layout.feedback_edges.contains(&key),
                    source_port: ports.map(|p| [p.source.0, p.source.1]),
                    target_port: ports.map(|p| [p.target.0, p.target.1]),
                    points: route
                        .map(|r| r.result.points.iter().map(|(x, y)| [*x, *y]).collect())
                        .unwrap_or_default(),
                    success: route.is_some_and(|r| r.result.success),
                    bends: route.map_or(0, |r| r.result.bends),
                    length: route.map_or(0.0, |r| r.result.length),
                    label: route.and_then(|r| r.label.clone()),
                }
            })
            .collect();

        let (width, height) = layout
            .bounds()
            .map_or((0.0, 0.0), |b| (b.right(), b.bottom()));

        LayoutDump {
            direction: layout.direction,
            width,
            height,
            layers: layout.layers.clone(),
            virtual_nodes: layout.virtual_node_count,
            crossings: layout.crossings,
            nodes,
            edges,
            warnings: layout.warnings.iter().map(ToString::to_string).collect(),
            routing: None,
        }
    }

    pub fn with_stats(mut self, stats: RoutingStats) -> Self {
        self.routing = Some(stats);
        self
    }
}

pub fn write_layout_dump(path: &Path, dump: &LayoutDump) -> anyhow::Result<()> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, dump)?;
    Ok(())
}

pub fn print_layout_dump(dump: &LayoutDump) -> anyhow::Result<()> {
    let stdout = std::io::stdout();
    let mut lock = stdout.lock();
    serde_json::to_writer_pretty(&mut lock, dump)?;
    writeln!(lock)?;
    Ok(())
}
