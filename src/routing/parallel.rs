use std::collections::BTreeMap;

use crate::layout::EdgeKey;

use super::geometry::Point;

/// Offsets below this are treated as no offset at all.
const MIN_OFFSET: f32 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParallelSpec {
    pub spacing: f32,
    pub bidirectional_factor: f32,
    pub max_spread: usize,
}

/// Placement of one edge inside its endpoint-pair group.
#[derive(Debug, Clone, PartialEq)]
pub struct ParallelSlot {
    /// Signed distance along the normal of the pair's canonical direction
    /// (lower id to higher id).
    pub offset: f32,
    /// True when the edge runs against the canonical direction.
    pub reversed: bool,
    pub group_size: usize,
}

impl ParallelSlot {
    /// Offset along the normal of the edge's own direction of travel.
    pub fn offset_for_path(&self) -> f32 {
        if self.reversed { -self.offset } else { self.offset }
    }
}

fn canonical(key: &EdgeKey) -> (EdgeKey, bool) {
    if key.0 <= key.1 {
        (key.clone(), false)
    } else {
        ((key.1.clone(), key.0.clone()), true)
    }
}

/// Groups edges by unordered endpoint pair and hands out deterministic
/// perpendicular offsets so they do not draw on top of each other. The
/// same directed key may be registered more than once for multigraphs;
/// each registration is one occurrence.
#[derive(Debug, Clone)]
pub struct ParallelEdgeManager {
    spec: ParallelSpec,
    groups: BTreeMap<EdgeKey, Vec<EdgeKey>>,
}

impl ParallelEdgeManager {
    pub fn new(spec: ParallelSpec) -> Self {
        Self {
            spec,
            groups: BTreeMap::new(),
        }
    }

    pub fn clear(&mut self) {
        self.groups.clear();
    }

    /// Adds one occurrence of `key` and returns its occurrence number.
    /// Registration order decides the slot order inside a group.
    pub fn register(&mut self, key: &EdgeKey) -> usize {
        let (pair, _) = canonical(key);
        let group = self.groups.entry(pair).or_default();
        let occurrence = group.iter().filter(|k| *k == key).count();
        group.push(key.clone());
        occurrence
    }

    /// Removes the most recent occurrence of `key`.
    pub fn unregister(&mut self, key: &EdgeKey) {
        let (pair, _) = canonical(key);
        if let Some(group) = self.groups.get_mut(&pair) {
            if let Some(pos) = group.iter().rposition(|k| k == key) {
                group.remove(pos);
            }
            if group.is_empty() {
                self.groups.remove(&pair);
            }
        }
    }

    pub fn group_size(&self, key: &EdgeKey) -> usize {
        self.groups.get(&canonical(key).0).map_or(0, Vec::len)
    }

    pub fn slot(&self, key: &EdgeKey, occurrence: usize) -> Option<ParallelSlot> {
        let (pair, reversed) = canonical(key);
        let group = self.groups.get(&pair)?;
        let idx = group
            .iter()
            .enumerate()
            .filter(|(_, k)| *k == key)
            .nth(occurrence)
            .map(|(idx, _)| idx)?;
        let n = group.len();
        let offset = if n <= 1 || n > self.spec.max_spread {
            0.0
        } else {
            let bidirectional = group.iter().any(|k| k.0 == pair.0) && group.iter().any(|k| k.0 == pair.1);
            // Opposing arrowheads need more room than a plain bundle.
            let spacing = if bidirectional {
                self.spec.spacing * self.spec.bidirectional_factor.max(1.0)
            } else {
                self.spec.spacing
            };
            (idx as f32 - (n as f32 - 1.0) * 0.5) * spacing
        };
        Some(ParallelSlot {
            offset,
            reversed,
            group_size: n,
        })
    }

    /// "×N" when a group is too large to spread out.
    pub fn label(&self, key: &EdgeKey) -> Option<String> {
        let n = self.group_size(key);
        (n > self.spec.max_spread).then(|| format!("×{n}"))
    }
}

/// Unit normal of the segment `a`-`b`, the travel direction turned a
/// quarter clockwise in screen space.
fn segment_normal(a: Point, b: Point) -> Option<Point> {
    let dx = b.0 - a.0;
    let dy = b.1 - a.1;
    let len = (dx * dx + dy * dy).sqrt();
    if len <= 1e-6 {
        return None;
    }
    Some((-dy / len, dx / len))
}

/// Shifts every point of `points` by `offset` along the local normal. End
/// points use their own segment, interior points the average of the two
/// segments they join.
pub fn apply_offset_to_path(points: &[Point], offset: f32) -> Vec<Point> {
    if offset.abs() < MIN_OFFSET || points.len() < 2 {
        return points.to_vec();
    }
    let last = points.len() - 1;
    let mut out = Vec::with_capacity(points.len());
    for (idx, &p) in points.iter().enumerate() {
        let normal = if idx == 0 {
            segment_normal(points[0], points[1])
        } else if idx == last {
            segment_normal(points[last - 1], points[last])
        } else {
            match (
                segment_normal(points[idx - 1], p),
                segment_normal(p, points[idx + 1]),
            ) {
                (Some(a), Some(b)) => {
                    let sum = (a.0 + b.0, a.1 + b.1);
                    let len = (sum.0 * sum.0 + sum.1 * sum.1).sqrt();
                    if len <= 1e-6 { Some(a) } else { Some((sum.0 / len, sum.1 / len)) }
                }
                (a, b) => a.or(b),
            }
        };
        match normal {
            Some(n) => out.push((p.0 + n.0 * offset, p.1 + n.1 * offset)),
            None => out.push(p),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(a: &str, b: &str) -> EdgeKey {
        (a.to_string(), b.to_string())
    }

    fn manager(max_spread: usize) -> ParallelEdgeManager {
        ParallelEdgeManager::new(ParallelSpec {
            spacing: 12.0,
            bidirectional_factor: 1.5,
            max_spread,
        })
    }

    #[test]
    fn single_edge_is_not_offset() {
        let mut m = manager(5);
        m.register(&key("A", "B"));
        assert_eq!(m.slot(&key("A", "B"), 0).unwrap().offset, 0.0);
        assert_eq!(m.label(&key("A", "B")), None);
    }

    #[test]
    fn bidirectional_pair_lands_on_opposite_sides() {
        let mut m = manager(5);
        m.register(&key("A", "B"));
        m.register(&key("B", "A"));
        let forward = m.slot(&key("A", "B"), 0).unwrap();
        let backward = m.slot(&key("B", "A"), 0).unwrap();
        assert_eq!(forward.offset, -9.0);
        assert_eq!(backward.offset, 9.0);
        assert!(backward.reversed);
        // Opposite travel flips the normal, so each path is shifted by its
        // own signed offset and the lines end up 1.5 spacings apart.
        let ab = apply_offset_to_path(&[(0.0, 0.0), (100.0, 0.0)], forward.offset_for_path());
        let ba = apply_offset_to_path(&[(100.0, 0.0), (0.0, 0.0)], backward.offset_for_path());
        assert_eq!(ab[0].1, -9.0);
        assert_eq!(ba[1].1, 9.0);
    }

    #[test]
    fn multi_edges_spread_symmetrically() {
        let mut m = ParallelEdgeManager::new(ParallelSpec {
            spacing: 10.0,
            bidirectional_factor: 1.5,
            max_spread: 5,
        });
        let ab = key("A", "B");
        assert_eq!(m.register(&ab), 0);
        assert_eq!(m.register(&ab), 1);
        assert_eq!(m.register(&ab), 2);
        let offsets: Vec<f32> = (0..3).map(|i| m.slot(&ab, i).unwrap().offset).collect();
        assert_eq!(offsets, vec![-10.0, 0.0, 10.0]);
        assert_eq!(m.slot(&ab, 3), None);
    }

    #[test]
    fn oversized_group_gets_label() {
        let mut m = manager(1);
        m.register(&key("A", "B"));
        m.register(&key("B", "A"));
        assert_eq!(m.slot(&key("A", "B"), 0).unwrap().offset, 0.0);
        assert_eq!(m.label(&key("B", "A")).as_deref(), Some("×2"));
    }

    #[test]
    fn unregister_shrinks_group() {
        let mut m = manager(5);
        m.register(&key("A", "B"));
        m.register(&key("B", "A"));
        m.unregister(&key("B", "A"));
        assert_eq!(m.group_size(&key("A", "B")), 1);
        m.unregister(&key("A", "B"));
        assert_eq!(m.slot(&key("A", "B"), 0), None);
    }

    #[test]
    fn offset_follows_bends() {
        let path = [(0.0, 0.0), (0.0, 100.0), (100.0, 100.0)];
        let shifted = apply_offset_to_path(&path, 10.0);
        // Down then right: the normal points to -x, then to +y.
        assert_eq!(shifted[0], (-10.0, 0.0));
        assert_eq!(shifted[2], (100.0, 110.0));
        let corner = shifted[1];
        let diag = 10.0 / 2f32.sqrt();
        assert!((corner.0 + diag).abs() < 1e-4);
        assert!((corner.1 - (100.0 + diag)).abs() < 1e-4);
        assert_eq!(apply_offset_to_path(&path, 0.0), path.to_vec());
    }
}
