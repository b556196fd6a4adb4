use serde::{Deserialize, Serialize};

pub type Point = (f32, f32);
pub type Segment = (Point, Point);

/// Tolerance used when deciding whether a segment is axis-aligned.
pub const AXIS_EPS: f32 = 0.1;
const EPS: f32 = 1e-4;

/// Axis-aligned rectangle with its origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_center(center: Point, width: f32, height: f32) -> Self {
        Self::new(center.0 - width * 0.5, center.1 - height * 0.5, width, height)
    }

    /// Smallest rectangle containing both points.
    pub fn spanning(a: Point, b: Point) -> Self {
        let min_x = a.0.min(b.0);
        let min_y = a.1.min(b.1);
        Self::new(min_x, min_y, a.0.max(b.0) - min_x, a.1.max(b.1) - min_y)
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        (self.x + self.width * 0.5, self.y + self.height * 0.5)
    }

    pub fn inflate(&self, pad: f32) -> Self {
        Self::new(
            self.x - pad,
            self.y - pad,
            self.width + 2.0 * pad,
            self.height + 2.0 * pad,
        )
    }

    pub fn union(&self, other: &Rect) -> Self {
        let min_x = self.x.min(other.x);
        let min_y = self.y.min(other.y);
        let max_x = self.right().max(other.right());
        let max_y = self.bottom().max(other.bottom());
        Self::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x <= other.right()
            && other.x <= self.right()
            && self.y <= other.bottom()
            && other.y <= self.bottom()
    }

    pub fn contains(&self, p: Point) -> bool {
        p.0 >= self.x && p.0 <= self.right() && p.1 >= self.y && p.1 <= self.bottom()
    }

    /// True only for points strictly inside; the boundary is free space.
    pub fn contains_strict(&self, p: Point) -> bool {
        p.0 > self.x + EPS && p.0 < self.right() - EPS && p.1 > self.y + EPS && p.1 < self.bottom() - EPS
    }

    pub fn corners(&self) -> [Point; 4] {
        [
            (self.x, self.y),
            (self.right(), self.y),
            (self.right(), self.bottom()),
            (self.x, self.bottom()),
        ]
    }

    /// Corners followed by edge midpoints.
    pub fn waypoints(&self) -> [Point; 8] {
        let (cx, cy) = self.center();
        let [a, b, c, d] = self.corners();
        [a, b, c, d, (cx, self.y), (self.right(), cy), (cx, self.bottom()), (self.x, cy)]
    }
}

pub fn distance(a: Point, b: Point) -> f32 {
    let dx = b.0 - a.0;
    let dy = b.1 - a.1;
    (dx * dx + dy * dy).sqrt()
}

pub fn is_axis_aligned(a: Point, b: Point) -> bool {
    (a.0 - b.0).abs() < AXIS_EPS || (a.1 - b.1).abs() < AXIS_EPS
}

pub fn path_length(points: &[Point]) -> f32 {
    points.windows(2).map(|seg| distance(seg[0], seg[1])).sum()
}

pub fn path_bend_count(points: &[Point]) -> usize {
    if points.len() < 3 {
        return 0;
    }
    let mut bends = 0usize;
    for idx in 1..points.len() - 1 {
        let p0 = points[idx - 1];
        let p1 = points[idx];
        let p2 = points[idx + 1];
        let dx1 = p1.0 - p0.0;
        let dy1 = p1.1 - p0.1;
        let dx2 = p2.0 - p1.0;
        let dy2 = p2.1 - p1.1;
        if (dx1.abs() <= EPS && dy1.abs() <= EPS) || (dx2.abs() <= EPS && dy2.abs() <= EPS) {
            continue;
        }
        let cross = dx1 * dy2 - dy1 * dx2;
        if cross.abs() > EPS {
            bends += 1;
        }
    }
    bends
}

pub fn segments_intersect(a: Point, b: Point, c: Point, d: Point) -> bool {
    fn orient(a: Point, b: Point, c: Point) -> f32 {
        (b.0 - a.0) * (c.1 - a.1) - (b.1 - a.1) * (c.0 - a.0)
    }
    fn on_segment(a: Point, b: Point, c: Point) -> bool {
        c.0 >= a.0.min(b.0) - 1e-6
            && c.0 <= a.0.max(b.0) + 1e-6
            && c.1 >= a.1.min(b.1) - 1e-6
            && c.1 <= a.1.max(b.1) + 1e-6
    }
    let o1 = orient(a, b, c);
    let o2 = orient(a, b, d);
    let o3 = orient(c, d, a);
    let o4 = orient(c, d, b);
    if (o1 > 0.0 && o2 < 0.0 || o1 < 0.0 && o2 > 0.0) && (o3 > 0.0 && o4 < 0.0 || o3 < 0.0 && o4 > 0.0) {
        return true;
    }
    (o1.abs() <= 1e-6 && on_segment(a, b, c))
        || (o2.abs() <= 1e-6 && on_segment(a, b, d))
        || (o3.abs() <= 1e-6 && on_segment(c, d, a))
        || (o4.abs() <= 1e-6 && on_segment(c, d, b))
}

/// Whether segment `a`-`b` passes through the interior of `rect`. Running
/// along the boundary or touching a corner does not count.
pub fn segment_crosses_interior(a: Point, b: Point, rect: &Rect) -> bool {
    // Liang-Barsky clip against the open rectangle.
    let dx = b.0 - a.0;
    let dy = b.1 - a.1;
    let mut t0 = 0.0f32;
    let mut t1 = 1.0f32;
    let checks = [
        (-dx, a.0 - rect.x),
        (dx, rect.right() - a.0),
        (-dy, a.1 - rect.y),
        (dy, rect.bottom() - a.1),
    ];
    for (p, q) in checks {
        if p.abs() < 1e-9 {
            if q <= EPS {
                return false;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            t0 = t0.max(r);
        } else {
            t1 = t1.min(r);
        }
        if t0 > t1 {
            return false;
        }
    }
    if t1 - t0 <= 1e-6 {
        return false;
    }
    let mid_t = (t0 + t1) * 0.5;
    rect.contains_strict((a.0 + dx * mid_t, a.1 + dy * mid_t))
}

pub fn path_crosses_interior(points: &[Point], rect: &Rect) -> bool {
    points
        .windows(2)
        .any(|seg| segment_crosses_interior(seg[0], seg[1], rect))
}

/// Number of segments of `other` that intersect `a`-`b`, ignoring shared
/// endpoints.
pub fn crossings_with_polyline(a: Point, b: Point, other: &[Point]) -> usize {
    let same = |p: Point, q: Point| (p.0 - q.0).abs() < 1e-6 && (p.1 - q.1).abs() < 1e-6;
    other
        .windows(2)
        .filter(|seg| {
            let (c, d) = (seg[0], seg[1]);
            if same(a, c) || same(a, d) || same(b, c) || same(b, d) {
                return false;
            }
            segments_intersect(a, b, c, d)
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bend_count_ignores_straight_runs() {
        let points = [(0.0, 0.0), (0.0, 10.0), (0.0, 20.0), (10.0, 20.0), (10.0, 30.0)];
        assert_eq!(path_bend_count(&points), 2);
        assert_eq!(path_bend_count(&points[..2]), 0);
    }

    #[test]
    fn length_sums_segments() {
        assert!((path_length(&[(0.0, 0.0), (3.0, 4.0), (3.0, 10.0)]) - 11.0).abs() < 1e-5);
    }

    #[test]
    fn interior_crossing_ignores_boundary() {
        let rect = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(segment_crosses_interior((-5.0, 5.0), (15.0, 5.0), &rect));
        assert!(!segment_crosses_interior((-5.0, 0.0), (15.0, 0.0), &rect));
        assert!(!segment_crosses_interior((-5.0, -5.0), (-1.0, 20.0), &rect));
        assert!(segment_crosses_interior((5.0, 5.0), (5.0, 20.0), &rect));
        assert!(!segment_crosses_interior((10.0, 0.0), (20.0, 0.0), &rect));
    }

    #[test]
    fn crossings_skip_shared_endpoints() {
        let other = [(0.0, 5.0), (10.0, 5.0)];
        assert_eq!(crossings_with_polyline((5.0, 0.0), (5.0, 10.0), &other), 1);
        assert_eq!(crossings_with_polyline((0.0, 5.0), (0.0, 10.0), &other), 0);
    }

    #[test]
    fn rect_helpers() {
        let rect = Rect::from_center((0.0, 0.0), 120.0, 60.0);
        assert_eq!(rect.x, -60.0);
        assert_eq!(rect.bottom(), 30.0);
        assert!(rect.contains_strict((0.0, 0.0)));
        assert!(!rect.contains_strict((60.0, 0.0)));
        let grown = rect.inflate(10.0);
        assert_eq!(grown.width, 140.0);
        assert_eq!(Rect::spanning((5.0, 1.0), (1.0, 5.0)), Rect::new(1.0, 1.0, 4.0, 4.0));
    }
}
