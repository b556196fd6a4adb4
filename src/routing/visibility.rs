use std::cmp::Ordering;
use std::collections::HashMap;

use super::geometry::{Point, Rect, segment_crosses_interior};

/// Orthogonal visibility graph over the interesting coordinates of a set of
/// obstacles: every obstacle's sides and centre lines plus the anchors a
/// route must start or end at. Vertices strictly inside an obstacle are
/// dropped and neighbours on the same row or column are linked when the
/// segment between them stays clear.
#[derive(Debug, Clone)]
pub struct VisibilityGraph {
    points: Vec<Point>,
    adjacency: Vec<Vec<(usize, f32)>>,
    lookup: HashMap<(u32, u32), usize>,
    unit: f32,
}

fn sorted_unique(mut values: Vec<f32>) -> Vec<f32> {
    values.retain(|v| v.is_finite());
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    values.dedup_by(|a, b| (*a - *b).abs() < 1e-3);
    values
}

fn point_key(p: Point) -> (u32, u32) {
    (p.0.to_bits(), p.1.to_bits())
}

impl VisibilityGraph {
    /// `unit` is the world length of one unit of step cost. Returns `None`
    /// when the candidate lattice would exceed `max_vertices`.
    pub fn build(obstacles: &[Rect], anchors: &[Point], unit: f32, max_vertices: usize) -> Option<Self> {
        let mut xs = Vec::with_capacity(obstacles.len() * 3 + anchors.len());
        let mut ys = Vec::with_capacity(obstacles.len() * 3 + anchors.len());
        for obs in obstacles {
            let (cx, cy) = obs.center();
            xs.extend([obs.x, cx, obs.right()]);
            ys.extend([obs.y, cy, obs.bottom()]);
        }
        for anchor in anchors {
            xs.push(anchor.0);
            ys.push(anchor.1);
        }
        let xs = sorted_unique(xs);
        let ys = sorted_unique(ys);
        if xs.len().saturating_mul(ys.len()) > max_vertices {
            return None;
        }
        // Anchors keep their exact coordinates even when deduplication
        // merged them with a nearby obstacle line.
        let snap = |values: &[f32], v: f32| {
            values
                .iter()
                .position(|x| (x - v).abs() < 1e-3)
                .unwrap_or(0)
        };

        let mut ids: Vec<Option<usize>> = vec![None; xs.len() * ys.len()];
        let mut points = Vec::new();
        for (j, &y) in ys.iter().enumerate() {
            for (i, &x) in xs.iter().enumerate() {
                if obstacles.iter().any(|obs| obs.contains_strict((x, y))) {
                    continue;
                }
                ids[j * xs.len() + i] = Some(points.len());
                points.push((x, y));
            }
        }
        for anchor in anchors {
            let i = snap(&xs, anchor.0);
            let j = snap(&ys, anchor.1);
            if let Some(id) = ids[j * xs.len() + i] {
                points[id] = *anchor;
            }
        }

        let mut adjacency: Vec<Vec<(usize, f32)>> = vec![Vec::new(); points.len()];
        let clear = |a: Point, b: Point| !obstacles.iter().any(|obs| segment_crosses_interior(a, b, obs));
        let mut link = |a: usize, b: usize, points: &[Point]| {
            let (pa, pb) = (points[a], points[b]);
            if clear(pa, pb) {
                let len = (pa.0 - pb.0).abs() + (pa.1 - pb.1).abs();
                adjacency[a].push((b, len));
                adjacency[b].push((a, len));
            }
        };
        for j in 0..ys.len() {
            let mut last: Option<usize> = None;
            for i in 0..xs.len() {
                if let Some(id) = ids[j * xs.len() + i] {
                    if let Some(prev) = last {
                        link(prev, id, &points);
                    }
                    last = Some(id);
                }
            }
        }
        for i in 0..xs.len() {
            let mut last: Option<usize> = None;
            for j in 0..ys.len() {
                if let Some(id) = ids[j * xs.len() + i] {
                    if let Some(prev) = last {
                        link(prev, id, &points);
                    }
                    last = Some(id);
                }
            }
        }

        let lookup = points
            .iter()
            .enumerate()
            .map(|(idx, p)| (point_key(*p), idx))
            .collect();
        Some(Self {
            points,
            adjacency,
            lookup,
            unit: unit.max(1e-3),
        })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn unit(&self) -> f32 {
        self.unit
    }

    /// Vertex placed exactly at `p`, if any.
    pub fn vertex_at(&self, p: Point) -> Option<usize> {
        self.lookup.get(&point_key(p)).copied()
    }

    pub fn neighbors(&self, vertex: usize) -> &[(usize, f32)] {
        self.adjacency.get(vertex).map_or(&[], Vec::as_slice)
    }
}

/// Moves a point that sits strictly inside an obstacle onto the closest side
/// of that obstacle so a path can leave from there. Points in free space are
/// returned unchanged.
pub fn gate(point: Point, obstacles: &[Rect]) -> Point {
    let Some(owner) = obstacles.iter().find(|obs| obs.contains_strict(point)) else {
        return point;
    };
    let candidates = [
        (point.0 - owner.x, (owner.x, point.1)),
        (owner.right() - point.0, (owner.right(), point.1)),
        (point.1 - owner.y, (point.0, owner.y)),
        (owner.bottom() - point.1, (point.0, owner.bottom())),
    ];
    candidates
        .iter()
        .min_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal))
        .map_or(point, |(_, p)| *p)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_projects_to_nearest_side() {
        let obstacles = [Rect::new(0.0, 0.0, 100.0, 40.0)];
        assert_eq!(gate((50.0, 35.0), &obstacles), (50.0, 40.0));
        assert_eq!(gate((5.0, 20.0), &obstacles), (0.0, 20.0));
        assert_eq!(gate((150.0, 20.0), &obstacles), (150.0, 20.0));
    }

    #[test]
    fn vertices_inside_obstacles_are_dropped() {
        let obstacles = [Rect::new(0.0, 0.0, 100.0, 40.0)];
        let graph = VisibilityGraph::build(&obstacles, &[(-50.0, 20.0), (150.0, 20.0)], 10.0, 10_000).unwrap();
        assert!(graph.vertex_at((50.0, 20.0)).is_none());
        assert!(graph.vertex_at((0.0, 0.0)).is_some());
        assert!(graph.vertex_at((-50.0, 20.0)).is_some());
    }

    #[test]
    fn blocked_rows_are_not_linked() {
        let obstacles = [Rect::new(0.0, 0.0, 100.0, 40.0)];
        let graph = VisibilityGraph::build(&obstacles, &[(-50.0, 20.0), (150.0, 20.0)], 10.0, 10_000).unwrap();
        let left = graph.vertex_at((-50.0, 20.0)).unwrap();
        let side = graph.vertex_at((0.0, 20.0)).unwrap();
        assert!(graph.neighbors(left).iter().any(|(n, _)| *n == side));
        // The left side of the box cannot see the right side through it.
        let right_side = graph.vertex_at((100.0, 20.0)).unwrap();
        assert!(!graph.neighbors(side).iter().any(|(n, _)| *n == right_side));
    }

    #[test]
    fn boundary_edges_are_walkable() {
        let obstacles = [Rect::new(0.0, 0.0, 100.0, 40.0)];
        let graph = VisibilityGraph::build(&obstacles, &[], 10.0, 10_000).unwrap();
        let corner = graph.vertex_at((0.0, 0.0)).unwrap();
        let mid_top = graph.vertex_at((50.0, 0.0)).unwrap();
        assert!(graph.neighbors(corner).iter().any(|(n, len)| *n == mid_top && *len == 50.0));
    }
}
