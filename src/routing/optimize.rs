use std::fmt::Write as _;

use serde::Serialize;

use crate::ir::Direction;

use super::geometry::{Point, Rect, distance, segment_crosses_interior};

const SAME_POINT_EPS: f32 = 1e-4;
/// Relative sine below which three points count as collinear.
const COLLINEAR_EPS: f32 = 1e-3;
/// Offsets below this snap onto the previous axis instead of adding a jog.
const MANHATTAN_TOLERANCE: f32 = 0.1;

fn same_point(a: Point, b: Point) -> bool {
    (a.0 - b.0).abs() <= SAME_POINT_EPS && (a.1 - b.1).abs() <= SAME_POINT_EPS
}

/// `b` lies on the straight run from `a` to `c` without turning back.
fn continues_straight(a: Point, b: Point, c: Point) -> bool {
    let (dx1, dy1) = (b.0 - a.0, b.1 - a.1);
    let (dx2, dy2) = (c.0 - b.0, c.1 - b.1);
    let len1 = (dx1 * dx1 + dy1 * dy1).sqrt();
    let len2 = (dx2 * dx2 + dy2 * dy2).sqrt();
    if len1 <= SAME_POINT_EPS || len2 <= SAME_POINT_EPS {
        return true;
    }
    let cross = dx1 * dy2 - dy1 * dx2;
    let dot = dx1 * dx2 + dy1 * dy2;
    cross.abs() <= COLLINEAR_EPS * len1 * len2 && dot > 0.0
}

/// Drops duplicate and collinear intermediate points. The first and last
/// point are kept bit-for-bit, and running it again changes nothing.
pub fn simplify(points: &[Point]) -> Vec<Point> {
    if points.len() <= 2 {
        return points.to_vec();
    }
    let last_idx = points.len() - 1;
    let mut out: Vec<Point> = Vec::with_capacity(points.len());
    for (idx, &p) in points.iter().enumerate() {
        if let Some(&top) = out.last()
            && same_point(top, p)
        {
            if idx == last_idx && out.len() > 1 {
                out.pop();
            } else {
                continue;
            }
        }
        while out.len() >= 2 && continues_straight(out[out.len() - 2], out[out.len() - 1], p) {
            out.pop();
        }
        out.push(p);
    }
    out
}

/// Removes interior points whose projection on the source-to-target line
/// falls behind an earlier kept point.
pub fn enforce_monotonic(points: &[Point]) -> Vec<Point> {
    if points.len() <= 2 {
        return points.to_vec();
    }
    let first = points[0];
    let last = points[points.len() - 1];
    let (dx, dy) = (last.0 - first.0, last.1 - first.1);
    let len_sq = dx * dx + dy * dy;
    if len_sq <= SAME_POINT_EPS {
        return points.to_vec();
    }
    let progress = |p: Point| ((p.0 - first.0) * dx + (p.1 - first.1) * dy) / len_sq;
    let mut out = vec![first];
    let mut reached = 0.0f32;
    for &p in &points[1..points.len() - 1] {
        let t = progress(p);
        if t + 1e-4 < reached || t > 1.0 + 1e-4 {
            continue;
        }
        reached = reached.max(t);
        out.push(p);
    }
    out.push(last);
    out
}

/// Makes every segment horizontal or vertical. Slanted segments get an
/// elbow; top-bottom layouts turn vertical-first, left-right layouts
/// horizontal-first. Endpoints never move.
pub fn manhattanize(points: &[Point], direction: Direction) -> Vec<Point> {
    if points.len() < 2 {
        return points.to_vec();
    }
    let last_idx = points.len() - 1;
    let mut out: Vec<Point> = Vec::with_capacity(points.len() * 2);
    out.push(points[0]);
    for (idx, &target) in points.iter().enumerate().skip(1) {
        let Some(&a) = out.last() else {
            continue;
        };
        let mut b = target;
        let dx = (b.0 - a.0).abs();
        let dy = (b.1 - a.1).abs();
        if dx == 0.0 || dy == 0.0 {
            out.push(b);
            continue;
        }
        if idx != last_idx && dx <= MANHATTAN_TOLERANCE {
            b.0 = a.0;
            out.push(b);
            continue;
        }
        if idx != last_idx && dy <= MANHATTAN_TOLERANCE {
            b.1 = a.1;
            out.push(b);
            continue;
        }
        let elbow = match direction {
            Direction::TopBottom => (a.0, b.1),
            Direction::LeftRight => (b.0, a.1),
        };
        out.push(elbow);
        out.push(b);
    }
    dedupe(&out)
}

/// Removes consecutive duplicates, keeping the exact endpoints.
pub fn dedupe(points: &[Point]) -> Vec<Point> {
    let mut out: Vec<Point> = Vec::with_capacity(points.len());
    for (idx, &p) in points.iter().enumerate() {
        match out.last() {
            Some(&top) if same_point(top, p) => {
                if idx == points.len() - 1 && out.len() > 1 {
                    out.pop();
                    out.push(p);
                }
            }
            _ => out.push(p),
        }
    }
    out
}

pub fn is_manhattan(points: &[Point]) -> bool {
    points
        .windows(2)
        .all(|seg| seg[0].0 == seg[1].0 || seg[0].1 == seg[1].1)
}

/// Greedy line-of-sight pass: from each kept point jump to the furthest later
/// point reachable without entering an obstacle.
pub fn shortcut(points: &[Point], obstacles: &[Rect]) -> Vec<Point> {
    if points.len() <= 2 {
        return points.to_vec();
    }
    let clear = |a: Point, b: Point| !obstacles.iter().any(|obs| segment_crosses_interior(a, b, obs));
    let mut out = vec![points[0]];
    let mut i = 0usize;
    while i < points.len() - 1 {
        let mut next = i + 1;
        for j in (i + 2..points.len()).rev() {
            if clear(points[i], points[j]) {
                next = j;
                break;
            }
        }
        out.push(points[next]);
        i = next;
    }
    out
}

pub fn snap(value: f32, grid: f32) -> f32 {
    if grid <= 0.0 {
        return value;
    }
    (value / grid).round() * grid
}

/// Drawing instruction for a smoothed path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "cmd", rename_all = "camelCase")]
pub enum PathCommand {
    MoveTo { to: Point },
    LineTo { to: Point },
    QuadTo { ctrl: Point, to: Point },
}

/// Rounds every bend with a quadratic curve whose control point is the
/// corner. The radius shrinks to half of the shorter adjacent segment.
pub fn smooth_corners(points: &[Point], radius: f32) -> Vec<PathCommand> {
    let Some(&first) = points.first() else {
        return Vec::new();
    };
    let mut commands = vec![PathCommand::MoveTo { to: first }];
    if points.len() == 1 {
        return commands;
    }
    for idx in 1..points.len() - 1 {
        let (a, b, c) = (points[idx - 1], points[idx], points[idx + 1]);
        let len_in = distance(a, b);
        let len_out = distance(b, c);
        let r = radius.min(len_in * 0.5).min(len_out * 0.5);
        if r <= 1e-3 || continues_straight(a, b, c) {
            commands.push(PathCommand::LineTo { to: b });
            continue;
        }
        let entry = (b.0 - (b.0 - a.0) / len_in * r, b.1 - (b.1 - a.1) / len_in * r);
        let exit = (b.0 + (c.0 - b.0) / len_out * r, b.1 + (c.1 - b.1) / len_out * r);
        commands.push(PathCommand::LineTo { to: entry });
        commands.push(PathCommand::QuadTo { ctrl: b, to: exit });
    }
    commands.push(PathCommand::LineTo {
        to: points[points.len() - 1],
    });
    commands
}

pub fn commands_to_svg_path(commands: &[PathCommand]) -> String {
    let mut d = String::new();
    for cmd in commands {
        if !d.is_empty() {
            d.push(' ');
        }
        let _ = match cmd {
            PathCommand::MoveTo { to } => write!(d, "M {:.2} {:.2}", to.0, to.1),
            PathCommand::LineTo { to } => write!(d, "L {:.2} {:.2}", to.0, to.1),
            PathCommand::QuadTo { ctrl, to } => {
                write!(d, "Q {:.2} {:.2} {:.2} {:.2}", ctrl.0, ctrl.1, to.0, to.1)
            }
        };
    }
    d
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simplify_drops_collinear_and_duplicates() {
        let path = [
            (0.0, 0.0),
            (0.0, 10.0),
            (0.0, 10.0),
            (0.0, 20.0),
            (10.0, 20.0),
            (20.0, 20.0),
        ];
        assert_eq!(simplify(&path), vec![(0.0, 0.0), (0.0, 20.0), (20.0, 20.0)]);
    }

    #[test]
    fn simplify_is_idempotent() {
        let path = [
            (0.5, 0.25),
            (0.5, 3.0),
            (0.5, 7.0),
            (4.0, 7.0),
            (4.0, 7.0),
            (4.0, 1.0),
            (9.0, 1.0),
            (9.0, 1.0),
        ];
        let once = simplify(&path);
        assert_eq!(simplify(&once), once);
        assert_eq!(once.first(), path.first());
        assert_eq!(once.last(), path.last());
    }

    #[test]
    fn simplify_keeps_reversals() {
        let path = [(0.0, 0.0), (10.0, 0.0), (5.0, 0.0)];
        assert_eq!(simplify(&path).len(), 3);
    }

    #[test]
    fn manhattanize_inserts_elbows() {
        let tb = manhattanize(&[(0.0, 0.0), (10.0, 20.0)], Direction::TopBottom);
        assert_eq!(tb, vec![(0.0, 0.0), (0.0, 20.0), (10.0, 20.0)]);
        let lr = manhattanize(&[(0.0, 0.0), (10.0, 20.0)], Direction::LeftRight);
        assert_eq!(lr, vec![(0.0, 0.0), (10.0, 0.0), (10.0, 20.0)]);
        assert!(is_manhattan(&tb) && is_manhattan(&lr));
    }

    #[test]
    fn manhattanize_snaps_tiny_offsets() {
        let out = manhattanize(&[(0.0, 0.0), (0.05, 10.0), (0.05, 20.0)], Direction::TopBottom);
        assert!(is_manhattan(&out));
        assert_eq!(out.first(), Some(&(0.0, 0.0)));
        assert_eq!(out.last(), Some(&(0.05, 20.0)));
    }

    #[test]
    fn monotonic_drops_backtracking_points() {
        let path = [(0.0, 0.0), (0.0, 50.0), (0.0, 30.0), (0.0, 100.0)];
        assert_eq!(enforce_monotonic(&path), vec![(0.0, 0.0), (0.0, 50.0), (0.0, 100.0)]);
    }

    #[test]
    fn shortcut_skips_when_clear() {
        let path = [(0.0, 0.0), (0.0, 10.0), (10.0, 10.0), (10.0, 20.0)];
        assert_eq!(shortcut(&path, &[]), vec![(0.0, 0.0), (10.0, 20.0)]);
        let blocker = Rect::new(2.0, 2.0, 6.0, 16.0);
        let kept = shortcut(&path, &[blocker]);
        assert!(kept.len() > 2);
    }

    #[test]
    fn corners_get_quadratic_segments() {
        let commands = smooth_corners(&[(0.0, 0.0), (0.0, 100.0), (100.0, 100.0)], 8.0);
        assert_eq!(
            commands,
            vec![
                PathCommand::MoveTo { to: (0.0, 0.0) },
                PathCommand::LineTo { to: (0.0, 92.0) },
                PathCommand::QuadTo {
                    ctrl: (0.0, 100.0),
                    to: (8.0, 100.0)
                },
                PathCommand::LineTo { to: (100.0, 100.0) },
            ]
        );
        assert_eq!(
            commands_to_svg_path(&commands),
            "M 0.00 0.00 L 0.00 92.00 Q 0.00 100.00 8.00 100.00 L 100.00 100.00"
        );
    }

    #[test]
    fn radius_shrinks_on_short_segments() {
        let commands = smooth_corners(&[(0.0, 0.0), (0.0, 6.0), (100.0, 6.0)], 8.0);
        assert_eq!(commands[1], PathCommand::LineTo { to: (0.0, 3.0) });
    }

    #[test]
    fn snap_rounds_to_grid() {
        assert_eq!(snap(23.0, 16.0), 16.0);
        assert_eq!(snap(25.0, 16.0), 32.0);
        assert_eq!(snap(25.0, 0.0), 25.0);
    }
}
