//! Input formats for task graphs.
//!
//! The `.dsm` text format, one statement per line:
//!
//! ```text
//! %%{ routing: { style: 'curved' } }%%
//! direction LR
//! task A "Design" 160x80
//! task B "Build"
//! A -> B, C        # fan-out
//! B -> C -> D      # chain
//! ```
//!
//! A document whose first non-blank character is `{` is read as a JSON graph
//! instead: `{"direction": "TB", "nodes": [{"id": "A"}], "edges": [["A", "B"]]}`.

use crate::ir::{Direction, Graph};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

static INIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^%%(\{.*\})%%$").expect("valid init regex"));
static DIRECTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?i:direction)\s+(\S+)$").expect("valid direction regex"));
static TASK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(?i:task)\s+(?P<id>[\w.]+)(?:\s+"(?P<name>[^"]*)")?(?:\s+(?P<size>\S+))?$"#)
        .expect("valid task regex")
});
static ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\w.]+$").expect("valid id regex"));
static SIZE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+(?:\.\d+)?)[xX](\d+(?:\.\d+)?)$").expect("valid size regex"));

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },
    #[error("line {line}: unknown direction '{value}' (expected TB or LR)")]
    InvalidDirection { line: usize, value: String },
    #[error("line {line}: invalid size '{value}' (expected WIDTHxHEIGHT)")]
    InvalidSize { line: usize, value: String },
    #[error("line {line}: invalid init directive: {source}")]
    Directive {
        line: usize,
        #[source]
        source: json5::Error,
    },
    #[error("invalid JSON graph: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown direction '{0}' (expected TB or LR)")]
    JsonDirection(String),
}

#[derive(Debug, Default)]
pub struct ParsedGraph {
    pub graph: Graph,
    /// Direction named in the document, if any.
    pub direction: Option<Direction>,
    /// Merged `%%{ ... }%%` directives.
    pub init_config: Option<serde_json::Value>,
}

pub fn parse_graph(input: &str) -> Result<ParsedGraph, ParseError> {
    if input.trim_start().starts_with('{') {
        parse_json_graph(input)
    } else {
        parse_dsm(input)
    }
}

/// Drops a `#` comment that is not inside a quoted name.
fn strip_comment(line: &str) -> &str {
    let mut in_quotes = false;
    for (idx, ch) in line.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            '#' if !in_quotes => return &line[..idx],
            _ => {}
        }
    }
    line
}

fn parse_size(line: usize, value: &str) -> Result<(f32, f32), ParseError> {
    let invalid = || ParseError::InvalidSize {
        line,
        value: value.to_string(),
    };
    let caps = SIZE_RE.captures(value).ok_or_else(invalid)?;
    let width: f32 = caps[1].parse().map_err(|_| invalid())?;
    let height: f32 = caps[2].parse().map_err(|_| invalid())?;
    if width <= 0.0 || height <= 0.0 {
        return Err(invalid());
    }
    Ok((width, height))
}

fn merge_json(target: &mut serde_json::Value, patch: serde_json::Value) {
    match (target, patch) {
        (serde_json::Value::Object(base), serde_json::Value::Object(patch)) => {
            for (key, value) in patch {
                merge_json(base.entry(key).or_insert(serde_json::Value::Null), value);
            }
        }
        (slot, value) => *slot = value,
    }
}

pub fn parse_dsm(input: &str) -> Result<ParsedGraph, ParseError> {
    let mut out = ParsedGraph::default();
    for (idx, raw) in input.lines().enumerate() {
        let line_no = idx + 1;
        let trimmed = raw.trim();
        if let Some(caps) = INIT_RE.captures(trimmed) {
            let mut value: serde_json::Value = json5::from_str(&caps[1]).map_err(|source| ParseError::Directive {
                line: line_no,
                source,
            })?;
            // `%%{init: {...}}%%` wraps the same object one level deeper.
            if let Some(inner) = value.get_mut("init").map(serde_json::Value::take) {
                value = inner;
            }
            match out.init_config.as_mut() {
                Some(existing) => merge_json(existing, value),
                None => out.init_config = Some(value),
            }
            continue;
        }
        if trimmed.starts_with("%%") {
            continue;
        }
        let line = strip_comment(trimmed).trim();
        if line.is_empty() {
            continue;
        }

        if let Some(caps) = DIRECTION_RE.captures(line) {
            let value = caps[1].to_ascii_uppercase();
            let direction = Direction::from_token(&value).ok_or(ParseError::InvalidDirection {
                line: line_no,
                value: caps[1].to_string(),
            })?;
            out.direction = Some(direction);
            continue;
        }

        if let Some(caps) = TASK_RE.captures(line) {
            let id = &caps["id"];
            let name = caps.name("name").map(|m| m.as_str().to_string());
            let size = caps
                .name("size")
                .map(|m| parse_size(line_no, m.as_str()))
                .transpose()?;
            let node = out.graph.ensure_node(id, name);
            if let Some((width, height)) = size {
                node.width = Some(width);
                node.height = Some(height);
            }
            continue;
        }

        if line.contains("->") {
            parse_edge_statement(&mut out.graph, line_no, line)?;
            continue;
        }

        if ID_RE.is_match(line) {
            out.graph.ensure_node(line, None);
            continue;
        }

        return Err(ParseError::Syntax {
            line: line_no,
            message: format!("unrecognised statement '{line}'"),
        });
    }
    log::debug!(
        "parsed {} tasks and {} dependencies",
        out.graph.nodes.len(),
        out.graph.edges.len()
    );
    Ok(out)
}

/// `A -> B, C -> D` connects every id of one group to every id of the next.
fn parse_edge_statement(graph: &mut Graph, line_no: usize, line: &str) -> Result<(), ParseError> {
    let mut groups: Vec<Vec<&str>> = Vec::new();
    for part in line.split("->") {
        let ids: Vec<&str> = part.split(',').map(str::trim).collect();
        if let Some(bad) = ids.iter().find(|id| !ID_RE.is_match(id)) {
            let message = if bad.is_empty() {
                "missing task id in dependency".to_string()
            } else {
                format!("invalid task id '{bad}'")
            };
            return Err(ParseError::Syntax {
                line: line_no,
                message,
            });
        }
        groups.push(ids);
    }
    for pair in groups.windows(2) {
        for from in &pair[0] {
            for to in &pair[1] {
                if !graph.add_edge(from, to) {
                    log::debug!("line {line_no}: ignored dependency {from} -> {to}");
                }
            }
        }
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct JsonGraph {
    #[serde(default)]
    direction: Option<String>,
    #[serde(default)]
    nodes: Vec<JsonNode>,
    #[serde(default)]
    edges: Vec<JsonEdge>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonNode {
    Id(String),
    Full {
        id: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        width: Option<f32>,
        #[serde(default)]
        height: Option<f32>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonEdge {
    Pair(String, String),
    Named { from: String, to: String },
}

pub fn parse_json_graph(input: &str) -> Result<ParsedGraph, ParseError> {
    let doc: JsonGraph = serde_json::from_str(input)?;
    let mut out = ParsedGraph::default();
    if let Some(value) = doc.direction {
        let direction =
            Direction::from_token(&value.to_ascii_uppercase()).ok_or(ParseError::JsonDirection(value))?;
        out.direction = Some(direction);
    }
    for node in doc.nodes {
        match node {
            JsonNode::Id(id) => {
                out.graph.ensure_node(&id, None);
            }
            JsonNode::Full {
                id,
                name,
                width,
                height,
            } => {
                let entry = out.graph.ensure_node(&id, name);
                entry.width = width.filter(|w| *w > 0.0);
                entry.height = height.filter(|h| *h > 0.0);
            }
        }
    }
    for edge in doc.edges {
        let (from, to) = match edge {
            JsonEdge::Pair(from, to) => (from, to),
            JsonEdge::Named { from, to } => (from, to),
        };
        if !out.graph.add_edge(&from, &to) {
            log::debug!("ignored dependency {from} -> {to}");
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tasks_and_dependencies() {
        let input = r#"
            # planning graph
            direction LR
            task A "Design # phase" 160x80
            task B
            A -> B, C
            B -> C -> D   # chain
            E
        "#;
        let parsed = parse_graph(input).unwrap();
        assert_eq!(parsed.direction, Some(Direction::LeftRight));
        let a = &parsed.graph.nodes["A"];
        assert_eq!(a.name.as_deref(), Some("Design # phase"));
        assert_eq!((a.width, a.height), (Some(160.0), Some(80.0)));
        assert_eq!(parsed.graph.ordered_ids(), vec!["A", "B", "C", "D", "E"]);
        let keys: Vec<(String, String)> = parsed.graph.edges.iter().map(|e| e.key()).collect();
        assert_eq!(keys.len(), 4);
        assert!(keys.contains(&("C".to_string(), "D".to_string())));
    }

    #[test]
    fn self_loops_and_duplicates_are_dropped() {
        let parsed = parse_graph("A -> A\nA -> B\nA -> B\n").unwrap();
        assert_eq!(parsed.graph.edges.len(), 1);
    }

    #[test]
    fn init_directives_merge() {
        let input = "%%{ routing: { style: 'curved' } }%%\n%%{init: {routing: {grid_size: 8}}}%%\nA -> B\n";
        let parsed = parse_graph(input).unwrap();
        let init = parsed.init_config.unwrap();
        assert_eq!(init["routing"]["style"], "curved");
        assert_eq!(init["routing"]["grid_size"].as_f64(), Some(8.0));
    }

    #[test]
    fn errors_carry_line_numbers() {
        let err = parse_graph("A -> B\ndirection XY\n").unwrap_err();
        assert!(matches!(err, ParseError::InvalidDirection { line: 2, .. }));
        let err = parse_graph("task A \"x\" 10by20\n").unwrap_err();
        assert!(matches!(err, ParseError::InvalidSize { line: 1, .. }));
        let err = parse_graph("A -> \n").unwrap_err();
        assert!(err.to_string().starts_with("line 1:"));
        let err = parse_graph("what is this?\n").unwrap_err();
        assert!(matches!(err, ParseError::Syntax { line: 1, .. }));
    }

    #[test]
    fn parses_json_graph() {
        let input = r#"{
            "direction": "tb",
            "nodes": ["A", {"id": "B", "name": "Build", "width": 90}],
            "edges": [["A", "B"], {"from": "B", "to": "C"}]
        }"#;
        let parsed = parse_graph(input).unwrap();
        assert_eq!(parsed.direction, Some(Direction::TopBottom));
        assert_eq!(parsed.graph.nodes["B"].width, Some(90.0));
        assert_eq!(parsed.graph.nodes["B"].height, None);
        assert_eq!(parsed.graph.edges.len(), 2);
        assert!(parsed.graph.nodes.contains_key("C"));
    }

    #[test]
    fn bad_json_is_reported() {
        assert!(matches!(parse_graph("{\"nodes\": 3}"), Err(ParseError::Json(_))));
    }
}
