use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Direction {
    #[default]
    #[serde(rename = "TB", alias = "TD")]
    TopBottom,
    #[serde(rename = "LR")]
    LeftRight,
}

impl Direction {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "TD" | "TB" => Some(Self::TopBottom),
            "LR" => Some(Self::LeftRight),
            _ => None,
        }
    }

    pub fn is_horizontal(self) -> bool {
        matches!(self, Self::LeftRight)
    }
}

/// A task in the dependency graph. Size is optional; the layout falls back to
/// the configured default box.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: String,
    pub name: Option<String>,
    pub width: Option<f32>,
    pub height: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Edge {
    pub from: String,
    pub to: String,
}

impl Edge {
    pub fn new(from: &str, to: &str) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn key(&self) -> (String, String) {
        (self.from.clone(), self.to.clone())
    }
}

#[derive(Debug, Clone)]
pub struct Graph {
    pub nodes: BTreeMap<String, Node>,
    /// Declaration order, used for stable tie-breaking.
    pub node_order: HashMap<String, usize>,
    pub edges: Vec<Edge>,
}

impl Graph {
    pub fn new() -> Self {
        Self {
            nodes: BTreeMap::new(),
            node_order: HashMap::new(),
            edges: Vec::new(),
        }
    }

    pub fn ensure_node(&mut self, id: &str, name: Option<String>) -> &mut Node {
        if !self.node_order.contains_key(id) {
            let order = self.node_order.len();
            self.node_order.insert(id.to_string(), order);
        }
        let entry = self.nodes.entry(id.to_string()).or_insert(Node {
            id: id.to_string(),
            name: None,
            width: None,
            height: None,
        });
        if let Some(name) = name {
            entry.name = Some(name);
        }
        entry
    }

    /// Adds a dependency, creating missing endpoints. Self-loops and
    /// duplicates of an existing directed edge are ignored.
    pub fn add_edge(&mut self, from: &str, to: &str) -> bool {
        if from == to {
            return false;
        }
        if self.edges.iter().any(|e| e.from == from && e.to == to) {
            return false;
        }
        self.ensure_node(from, None);
        self.ensure_node(to, None);
        self.edges.push(Edge::new(from, to));
        true
    }

    /// Node ids in declaration order.
    pub fn ordered_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.nodes.keys().cloned().collect();
        ids.sort_by_key(|id| self.node_order.get(id).copied().unwrap_or(usize::MAX));
        ids
    }

    pub fn incident_edges(&self, id: &str) -> Vec<&Edge> {
        self.edges
            .iter()
            .filter(|e| e.from == id || e.to == id)
            .collect()
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_edge_rejects_self_loops_and_duplicates() {
        let mut graph = Graph::new();
        assert!(graph.add_edge("A", "B"));
        assert!(!graph.add_edge("A", "B"));
        assert!(!graph.add_edge("C", "C"));
        assert!(graph.add_edge("B", "A"));
        assert_eq!(graph.edges.len(), 2);
        assert!(!graph.nodes.contains_key("C"));
    }

    #[test]
    fn ordered_ids_follow_declaration() {
        let mut graph = Graph::new();
        graph.ensure_node("zeta", None);
        graph.ensure_node("alpha", Some("First".to_string()));
        assert_eq!(graph.ordered_ids(), vec!["zeta", "alpha"]);
        assert_eq!(graph.nodes["alpha"].name.as_deref(), Some("First"));
    }

    #[test]
    fn direction_tokens() {
        assert_eq!(Direction::from_token("TD"), Some(Direction::TopBottom));
        assert_eq!(Direction::from_token("LR"), Some(Direction::LeftRight));
        assert_eq!(Direction::from_token("RL"), None);
    }
}
