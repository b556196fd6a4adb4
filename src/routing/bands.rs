//! Band routing for top-bottom layouts: every edge becomes a
//! vertical-horizontal-vertical path whose horizontal run sits in a lane of
//! the band between its two layers.
//!
//! The pipeline runs in three phases. Edges whose ports already share an x
//! column and can see each other are locked as straight verticals. The rest
//! are packed into lanes first-fit by their horizontal span, with each
//! placement checked against a per-column map of vertical segments. Edges
//! that find no lane fall back to plain interval partitioning.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use super::geometry::{Point, Rect};
use super::optimize::{dedupe, simplify, snap};

/// Tolerance for "same column" checks.
pub const ALIGN_TOLERANCE: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandSpec {
    /// Length of the straight piece leaving and entering a port.
    pub port_stub: f32,
    /// Minimum distance between a stub end and the horizontal run.
    pub min_clear: f32,
    /// Grid the horizontal run snaps to.
    pub snap_grid: f32,
    pub lane_spacing: f32,
}

impl Default for BandSpec {
    fn default() -> Self {
        Self {
            port_stub: 16.0,
            min_clear: 12.0,
            snap_grid: 16.0,
            lane_spacing: 16.0,
        }
    }
}

// ── 1D helpers ──────────────────────────────────────────────────────

pub fn near(a: f32, b: f32, tol: f32) -> bool {
    (a - b).abs() <= tol
}

/// Overlap of `[a1, a2]` and `[b1, b2]`. Open intervals do not overlap when
/// they only touch.
pub fn seg_overlaps(a1: f32, a2: f32, b1: f32, b2: f32, closed: bool) -> bool {
    let (a1, a2) = if a1 > a2 { (a2, a1) } else { (a1, a2) };
    let (b1, b2) = if b1 > b2 { (b2, b1) } else { (b1, b2) };
    if closed {
        !(a2 < b1 || b2 < a1)
    } else {
        !(a2 <= b1 || b2 <= a1)
    }
}

/// Whether the vertical segment at `x` from `y1` to `y2` crosses `rect`.
/// With `strict` set, touching the rectangle's sides does not count.
pub fn rect_intersects_vertical_segment(rect: &Rect, x: f32, y1: f32, y2: f32, strict: bool) -> bool {
    let inside_x = if strict {
        rect.x < x && x < rect.right()
    } else {
        rect.x <= x && x <= rect.right()
    };
    inside_x && seg_overlaps(y1, y2, rect.y, rect.bottom(), !strict)
}

// ── Phase 1: straight verticals ─────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VerticalCandidate {
    pub edge_index: usize,
    pub x: f32,
    pub y_top: f32,
    pub y_bot: f32,
}

pub fn filter_vertical_candidates(edges: &[(Point, Point)], tol: f32) -> Vec<VerticalCandidate> {
    edges
        .iter()
        .enumerate()
        .filter(|(_, (ps, pt))| near(ps.0, pt.0, tol))
        .map(|(edge_index, (ps, pt))| VerticalCandidate {
            edge_index,
            x: 0.5 * (ps.0 + pt.0),
            y_top: ps.1.min(pt.1),
            y_bot: ps.1.max(pt.1),
        })
        .collect()
}

pub fn los_ok_vertical(candidate: &VerticalCandidate, obstacles: &[Rect]) -> bool {
    !obstacles.iter().any(|rect| {
        rect_intersects_vertical_segment(rect, candidate.x, candidate.y_top, candidate.y_bot, true)
    })
}

/// Interval scheduling per x column (0.1 px buckets): earliest end first,
/// touching allowed.
pub fn select_non_overlapping_verticals(candidates: &[VerticalCandidate]) -> Vec<VerticalCandidate> {
    let mut buckets: BTreeMap<i64, Vec<VerticalCandidate>> = BTreeMap::new();
    for c in candidates {
        let key = (c.x * 10.0).round() as i64;
        buckets.entry(key).or_default().push(*c);
    }
    let mut chosen = Vec::new();
    for mut column in buckets.into_values() {
        column.sort_by(|a, b| {
            a.y_bot
                .partial_cmp(&b.y_bot)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.y_top.partial_cmp(&b.y_top).unwrap_or(Ordering::Equal))
                .then_with(|| a.edge_index.cmp(&b.edge_index))
        });
        let mut last_end = f32::NEG_INFINITY;
        for c in column {
            if c.y_top >= last_end {
                last_end = c.y_bot;
                chosen.push(c);
            }
        }
    }
    chosen
}

/// Locks straight vertical edges. Returns the locked paths by edge index and
/// the indices left for lane assignment.
pub fn preprocess_straight_edges(
    edges: &[(Point, Point)],
    obstacles_by_edge: &[Vec<Rect>],
    tol: f32,
) -> (BTreeMap<usize, Vec<Point>>, Vec<usize>) {
    let visible: Vec<VerticalCandidate> = filter_vertical_candidates(edges, tol)
        .into_iter()
        .filter(|c| {
            obstacles_by_edge
                .get(c.edge_index)
                .is_none_or(|obs| los_ok_vertical(c, obs))
        })
        .collect();
    let locked: BTreeMap<usize, Vec<Point>> = select_non_overlapping_verticals(&visible)
        .into_iter()
        .map(|c| {
            let (ps, pt) = edges[c.edge_index];
            (c.edge_index, vec![ps, pt])
        })
        .collect();
    let remaining = (0..edges.len()).filter(|i| !locked.contains_key(i)).collect();
    (locked, remaining)
}

// ── Phase 2: lanes ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntervalItem {
    pub idx: usize,
    pub xl: f32,
    pub xr: f32,
}

impl IntervalItem {
    pub fn of_edge(idx: usize, (ps, pt): (Point, Point)) -> Self {
        Self {
            idx,
            xl: ps.0.min(pt.0),
            xr: ps.0.max(pt.0),
        }
    }
}

pub fn stable_order(items: &[IntervalItem]) -> Vec<IntervalItem> {
    let mut sorted = items.to_vec();
    sorted.sort_by(|a, b| {
        a.xl
            .partial_cmp(&b.xl)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.xr.partial_cmp(&b.xr).unwrap_or(Ordering::Equal))
            .then_with(|| a.idx.cmp(&b.idx))
    });
    sorted
}

/// First-fit interval partitioning. Lanes are numbered from 1.
pub fn interval_partition_first_fit(items: &[IntervalItem]) -> BTreeMap<usize, usize> {
    let mut lane_right: Vec<f32> = Vec::new();
    let mut assignment = BTreeMap::new();
    for item in stable_order(items) {
        match lane_right.iter().position(|right| *right <= item.xl) {
            Some(j) => {
                lane_right[j] = item.xr;
                assignment.insert(item.idx, j + 1);
            }
            None => {
                lane_right.push(item.xr);
                assignment.insert(item.idx, lane_right.len());
            }
        }
    }
    assignment
}

/// Fallback lanes over the whole drawing, without any vertical checks.
pub fn assign_main_rectangle(edges: &[(Point, Point)]) -> BTreeMap<usize, usize> {
    let items: Vec<IntervalItem> = edges
        .iter()
        .enumerate()
        .map(|(i, e)| IntervalItem::of_edge(i, *e))
        .collect();
    interval_partition_first_fit(&items)
}

/// Height of the horizontal run for `lane`: the midpoint pushed down one
/// spacing per lane, kept `min_clear` away from both stub ends.
pub fn compute_y_mid(s_out_y: f32, t_in_y: f32, lane: usize, lane_spacing: f32, min_clear: f32) -> f32 {
    let y_low = s_out_y + min_clear;
    let y_high = t_in_y - min_clear;
    let raw = 0.5 * (s_out_y + t_in_y) + (lane.max(1) - 1) as f32 * lane_spacing;
    if raw < y_low {
        y_low
    } else if raw > y_high {
        y_high
    } else {
        raw
    }
}

// ── Vertical collision map ──────────────────────────────────────────

/// Occupied vertical spans per x column, sorted by start.
pub type VerticalMap = HashMap<i64, Vec<(f32, f32)>>;

fn x_bucket(x: f32, grid: f32) -> i64 {
    (x / grid.max(1e-3)).round() as i64
}

fn ordered(y1: f32, y2: f32) -> (f32, f32) {
    if y1 > y2 { (y2, y1) } else { (y1, y2) }
}

/// Whether `[y1, y2]` at column `x` is free. Touching spans are fine.
pub fn vmap_can_add(vmap: &VerticalMap, x: f32, y1: f32, y2: f32, grid: f32) -> bool {
    let (y1, y2) = ordered(y1, y2);
    vmap.get(&x_bucket(x, grid))
        .is_none_or(|spans| spans.iter().all(|(a, b)| y2 <= *a || *b <= y1))
}

pub fn vmap_add(vmap: &mut VerticalMap, x: f32, y1: f32, y2: f32, grid: f32) {
    let (y1, y2) = ordered(y1, y2);
    let spans = vmap.entry(x_bucket(x, grid)).or_default();
    let pos = spans.iter().position(|(a, _)| *a >= y1).unwrap_or(spans.len());
    spans.insert(pos, (y1, y2));
}

pub fn validate_vmap(vmap: &VerticalMap) -> bool {
    vmap.values()
        .all(|spans| spans.windows(2).all(|pair| pair[0].1 <= pair[1].0))
}

/// No two edges in the same lane overlap horizontally.
pub fn validate_lane_non_overlap(assignment: &BTreeMap<usize, usize>, edges: &[(Point, Point)]) -> bool {
    let mut by_lane: BTreeMap<usize, Vec<(f32, f32)>> = BTreeMap::new();
    for (&idx, &lane) in assignment {
        let Some(&edge) = edges.get(idx) else {
            continue;
        };
        let item = IntervalItem::of_edge(idx, edge);
        if item.xr <= item.xl {
            continue;
        }
        by_lane.entry(lane).or_default().push((item.xl, item.xr));
    }
    by_lane.into_values().all(|mut spans| {
        spans.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
        });
        let mut last_right = f32::NEG_INFINITY;
        spans.into_iter().all(|(xl, xr)| {
            let ok = xl >= last_right;
            last_right = xr;
            ok
        })
    })
}

/// First-fit lanes where a placement also has to fit both vertical legs
/// into the collision map. Successful placements are registered in `vmap`.
/// Returns the lane per edge index and the indices that fit nowhere.
pub fn assign_band_with_vertical_checks(
    edges: &[(Point, Point)],
    stubs_y: &[(f32, f32)],
    spec: &BandSpec,
    vmap: &mut VerticalMap,
    vgrid: f32,
    low_lanes: Option<&[usize]>,
) -> (BTreeMap<usize, usize>, Vec<usize>) {
    let items: Vec<IntervalItem> = edges
        .iter()
        .enumerate()
        .map(|(i, e)| IntervalItem::of_edge(i, *e))
        .collect();
    let mut assignment = BTreeMap::new();
    let mut lane_right: Vec<f32> = Vec::new();
    let mut failed = Vec::new();

    for item in stable_order(&items) {
        let (ps, pt) = edges[item.idx];
        let Some(&(s_out_y, t_in_y)) = stubs_y.get(item.idx) else {
            failed.push(item.idx);
            continue;
        };
        let start_lane = low_lanes
            .and_then(|lows| lows.get(item.idx))
            .copied()
            .unwrap_or(1)
            .max(1);
        let mut placed = false;
        for j in (start_lane - 1)..=lane_right.len() {
            if j < lane_right.len() && lane_right[j] > item.xl {
                continue;
            }
            let lane = j + 1;
            let y_mid = compute_y_mid(s_out_y, t_in_y, lane, spec.lane_spacing, spec.min_clear);
            if !vmap_can_add(vmap, ps.0, ps.1, y_mid, vgrid) || !vmap_can_add(vmap, pt.0, y_mid, pt.1, vgrid) {
                continue;
            }
            if j == lane_right.len() {
                lane_right.push(item.xr);
            } else {
                lane_right[j] = item.xr;
            }
            assignment.insert(item.idx, lane);
            vmap_add(vmap, ps.0, ps.1, y_mid, vgrid);
            vmap_add(vmap, pt.0, y_mid, pt.1, vgrid);
            placed = true;
            break;
        }
        if !placed {
            failed.push(item.idx);
        }
    }
    (assignment, failed)
}

// ── Height profile ──────────────────────────────────────────────────

/// Step `(xl, xr, need)`.
pub type ProfileStep = (f32, f32, f32);

/// Sweeps `[xl, xr, need]` fragments into a step profile, merging adjacent
/// steps of equal height.
pub fn build_profile(fragments: &[ProfileStep]) -> Vec<ProfileStep> {
    let mut events: Vec<(f32, f32)> = Vec::with_capacity(fragments.len() * 2);
    for &(xl, xr, need) in fragments {
        if xr <= xl {
            continue;
        }
        events.push((xl, need));
        events.push((xr, -need));
    }
    events.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

    let mut profile: Vec<ProfileStep> = Vec::new();
    let mut current = 0.0f32;
    let mut prev_x: Option<f32> = None;
    for (x, delta) in events {
        if let Some(px) = prev_x
            && x > px
            && current > 0.0
        {
            match profile.last_mut() {
                Some(last) if (last.2 - current).abs() < 1e-6 && (last.1 - px).abs() < 1e-6 => {
                    last.1 = x;
                }
                _ => profile.push((px, x, current)),
            }
        }
        current += delta;
        prev_x = Some(x);
    }
    profile
}

pub fn range_max(profile: &[ProfileStep], xl: f32, xr: f32) -> f32 {
    let (xl, xr) = if xr < xl { (xr, xl) } else { (xl, xr) };
    profile
        .iter()
        .filter(|(a, b, _)| !(*b <= xl || *a >= xr))
        .map(|(_, _, v)| *v)
        .fold(0.0f32, f32::max)
}

pub fn to_lane(need: f32, lane_spacing: f32) -> usize {
    if lane_spacing <= 0.0 {
        return 1;
    }
    ((need / lane_spacing).ceil() as usize).max(1)
}

/// Lowest lane each edge may use given the profile over its span.
pub fn mark_low_lane(edges: &[(Point, Point)], profile: &[ProfileStep], lane_spacing: f32) -> Vec<usize> {
    edges
        .iter()
        .map(|(ps, pt)| to_lane(range_max(profile, ps.0.min(pt.0), ps.0.max(pt.0)), lane_spacing))
        .collect()
}

// ── Geometry ────────────────────────────────────────────────────────

/// Makes every segment horizontal or vertical by inserting a
/// vertical-first elbow, then drops duplicate and collinear points.
fn ensure_manhattan(points: &[Point]) -> Vec<Point> {
    let Some(&first) = points.first() else {
        return Vec::new();
    };
    let mut out = vec![first];
    for pair in points.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if (a.0 - b.0).abs() < 0.1 || (a.1 - b.1).abs() < 0.1 {
            out.push(b);
        } else {
            out.push((a.0, b.1));
            out.push(b);
        }
    }
    simplify(&dedupe(&out))
}

/// Port, stub, horizontal run at `y_mid`, stub, port.
pub fn route_tb_with_y(ps: Point, pt: Point, y_mid: f32, spec: &BandSpec) -> Vec<Point> {
    let s_out = (ps.0, ps.1 + spec.port_stub);
    let t_in = (pt.0, pt.1 - spec.port_stub);
    let y_low = s_out.1 + spec.min_clear;
    let y_high = t_in.1 - spec.min_clear;
    let y_mid = snap(y_mid.min(y_high).max(y_low), spec.snap_grid);
    ensure_manhattan(&[ps, s_out, (s_out.0, y_mid), (t_in.0, y_mid), t_in, pt])
}

/// Canonical top-bottom route from a bottom port to a top port. Ports that
/// share a column connect directly.
pub fn route_tb_canonical(ps: Point, pt: Point, spec: &BandSpec) -> Vec<Point> {
    if (ps.0 - pt.0).abs() < 0.1 {
        return vec![ps, pt];
    }
    let s_out_y = ps.1 + spec.port_stub;
    let t_in_y = pt.1 - spec.port_stub;
    route_tb_with_y(ps, pt, 0.5 * (s_out_y + t_in_y), spec)
}

/// One edge of the band pipeline: its ports plus every obstacle except its
/// own endpoints.
#[derive(Debug, Clone)]
pub struct BandEdge {
    pub source: Point,
    pub target: Point,
    pub obstacles: Vec<Rect>,
}

#[derive(Debug, Clone, Default)]
pub struct BandRouting {
    /// Path per input edge, in input order.
    pub paths: Vec<Vec<Point>>,
    pub lanes: BTreeMap<usize, usize>,
    pub locked: Vec<usize>,
    /// Edges that needed the main-rectangle fallback.
    pub fallback: Vec<usize>,
    pub vmap_valid: bool,
}

/// Runs the full three-phase band pipeline.
pub fn route_tb_bands(edges: &[BandEdge], spec: &BandSpec) -> BandRouting {
    let ends: Vec<(Point, Point)> = edges.iter().map(|e| (e.source, e.target)).collect();
    let obstacles: Vec<Vec<Rect>> = edges.iter().map(|e| e.obstacles.clone()).collect();
    let (locked, remaining) = preprocess_straight_edges(&ends, &obstacles, ALIGN_TOLERANCE);

    let mut vmap = VerticalMap::new();
    for path in locked.values() {
        if let (Some(a), Some(b)) = (path.first(), path.last()) {
            vmap_add(&mut vmap, a.0, a.1, b.1, 1.0);
        }
    }

    let remain: Vec<(Point, Point)> = remaining.iter().map(|&i| ends[i]).collect();
    let stubs_y: Vec<(f32, f32)> = remain
        .iter()
        .map(|(ps, pt)| (ps.1 + spec.port_stub, pt.1 - spec.port_stub))
        .collect();
    let low_lanes = mark_low_lane(&remain, &build_profile(&[]), spec.lane_spacing);
    let (assignment, failed) =
        assign_band_with_vertical_checks(&remain, &stubs_y, spec, &mut vmap, 1.0, Some(&low_lanes));

    let mut paths: Vec<Vec<Point>> = ends.iter().map(|(ps, pt)| vec![*ps, *pt]).collect();
    for (idx, path) in &locked {
        paths[*idx] = path.clone();
    }
    let mut lanes = BTreeMap::new();
    for (local, &lane) in &assignment {
        let global = remaining[*local];
        let (ps, pt) = remain[*local];
        let (s_out_y, t_in_y) = stubs_y[*local];
        let y_mid = compute_y_mid(s_out_y, t_in_y, lane, spec.lane_spacing, spec.min_clear);
        paths[global] = route_tb_with_y(ps, pt, y_mid, spec);
        lanes.insert(global, lane);
    }

    let mut fallback = Vec::new();
    if !failed.is_empty() {
        let failed_ends: Vec<(Point, Point)> = failed.iter().map(|&i| remain[i]).collect();
        for (k, lane) in assign_main_rectangle(&failed_ends) {
            let local = failed[k];
            let global = remaining[local];
            let (ps, pt) = remain[local];
            let (s_out_y, t_in_y) = stubs_y[local];
            let y_mid = compute_y_mid(s_out_y, t_in_y, lane, spec.lane_spacing, spec.min_clear);
            paths[global] = route_tb_with_y(ps, pt, y_mid, spec);
            vmap_add(&mut vmap, ps.0, ps.1, y_mid, 1.0);
            vmap_add(&mut vmap, pt.0, y_mid, pt.1, 1.0);
            lanes.insert(global, lane);
            fallback.push(global);
        }
        log::debug!("band routing: {} edges fell back to main-rectangle lanes", fallback.len());
    }

    BandRouting {
        paths,
        lanes,
        locked: locked.keys().copied().collect(),
        fallback,
        vmap_valid: validate_vmap(&vmap),
    }
}
