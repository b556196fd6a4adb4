//! Edge routing: the [`Router`] façade on top of a grid or visibility-graph
//! A*, plus the band router for top-bottom layouts.

pub mod astar;
pub mod bands;
pub mod geometry;
pub mod grid;
pub mod optimize;
pub mod parallel;
pub mod visibility;

use std::collections::HashMap;
use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize, Serializer};

use crate::config::RoutingConfig;
use crate::events::{GeometryEvent, GeometryObserver};
use crate::ir::{Direction, Graph};
use crate::layout::{EdgeKey, Layout, PortSide};

use astar::{Budget, PathKey, Pathfinder, SearchParams, SearchSpace, astar};
use bands::{BandEdge, BandSpec, route_tb_bands};
use geometry::{Point, Rect, path_bend_count, path_crosses_interior, path_length, segment_crosses_interior};
use grid::{Connectivity, GridPoint, GridSpec, RoutingGrid};
use optimize::{PathCommand, dedupe, enforce_monotonic, manhattanize, shortcut, simplify, smooth_corners};
use parallel::{ParallelEdgeManager, ParallelSpec, apply_offset_to_path};
use visibility::{VisibilityGraph, gate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingStyle {
    /// Direct segment between the endpoints.
    Straight,
    #[default]
    Orthogonal,
    /// Horizontal, vertical and 45 degree segments.
    Octilinear,
    /// Any-angle polyline around obstacles.
    Polyline,
    /// Orthogonal with rounded corners.
    Curved,
}

impl RoutingStyle {
    fn connectivity(self) -> Connectivity {
        match self {
            RoutingStyle::Octilinear | RoutingStyle::Polyline => Connectivity::Eight,
            _ => Connectivity::Four,
        }
    }

    fn is_manhattan(self) -> bool {
        matches!(self, RoutingStyle::Orthogonal | RoutingStyle::Curved)
    }
}

impl FromStr for RoutingStyle {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "straight" => Ok(Self::Straight),
            "orthogonal" => Ok(Self::Orthogonal),
            "octilinear" => Ok(Self::Octilinear),
            "polyline" => Ok(Self::Polyline),
            "curved" => Ok(Self::Curved),
            other => Err(format!("unknown routing style '{other}'")),
        }
    }
}

/// `Interactive` draws straight lines while nodes are being dragged;
/// `Layout` runs the full router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum RoutingMode {
    Interactive,
    #[default]
    Layout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureReason {
    NoPath,
    IterationLimit,
    Timeout,
    TooManyBends,
    GridTooLarge,
}

#[derive(Debug, Clone)]
pub struct RoutingRequest {
    pub source: Point,
    pub target: Point,
    /// Side of the source box the path leaves through, if it is on one.
    pub source_side: Option<PortSide>,
    pub target_side: Option<PortSide>,
    /// Overrides the configured style.
    pub style: Option<RoutingStyle>,
    /// Node boxes to avoid, not yet padded.
    pub obstacles: Vec<Rect>,
}

impl RoutingRequest {
    pub fn new(source: Point, target: Point) -> Self {
        Self {
            source,
            target,
            source_side: None,
            target_side: None,
            style: None,
            obstacles: Vec::new(),
        }
    }

    /// Connects the facing sides of two boxes at their midpoints. Both boxes
    /// become obstacles.
    pub fn between_boxes(source: Rect, target: Rect) -> Self {
        let (sc, tc) = (source.center(), target.center());
        let (dx, dy) = (tc.0 - sc.0, tc.1 - sc.1);
        let (source_side, target_side) = if dy.abs() >= dx.abs() {
            if dy >= 0.0 {
                (PortSide::Bottom, PortSide::Top)
            } else {
                (PortSide::Top, PortSide::Bottom)
            }
        } else if dx >= 0.0 {
            (PortSide::Right, PortSide::Left)
        } else {
            (PortSide::Left, PortSide::Right)
        };
        Self {
            source: side_midpoint(&source, source_side),
            target: side_midpoint(&target, target_side),
            source_side: Some(source_side),
            target_side: Some(target_side),
            style: None,
            obstacles: vec![source, target],
        }
    }

    pub fn with_sides(mut self, source: PortSide, target: PortSide) -> Self {
        self.source_side = Some(source);
        self.target_side = Some(target);
        self
    }

    pub fn with_style(mut self, style: RoutingStyle) -> Self {
        self.style = Some(style);
        self
    }

    pub fn with_obstacles(mut self, obstacles: Vec<Rect>) -> Self {
        self.obstacles = obstacles;
        self
    }
}

fn side_midpoint(rect: &Rect, side: PortSide) -> Point {
    let (cx, cy) = rect.center();
    match side {
        PortSide::Top => (cx, rect.y),
        PortSide::Bottom => (cx, rect.bottom()),
        PortSide::Left => (rect.x, cy),
        PortSide::Right => (rect.right(), cy),
    }
}

fn as_millis<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.as_secs_f64() * 1000.0)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingResult {
    pub points: Vec<Point>,
    /// Drawing commands when corners were rounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commands: Option<Vec<PathCommand>>,
    pub bends: usize,
    pub length: f32,
    /// False when `points` is a fallback.
    pub success: bool,
    #[serde(rename = "elapsedMs", serialize_with = "as_millis")]
    pub elapsed: Duration,
    pub from_cache: bool,
    pub iterations: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReason>,
}

impl RoutingResult {
    fn routed(points: Vec<Point>, commands: Option<Vec<PathCommand>>) -> Self {
        Self {
            bends: path_bend_count(&points),
            length: path_length(&points),
            points,
            commands,
            success: true,
            elapsed: Duration::ZERO,
            from_cache: false,
            iterations: 0,
            failure: None,
        }
    }

    fn fallback(points: Vec<Point>, reason: FailureReason) -> Self {
        Self {
            success: false,
            failure: Some(reason),
            ..Self::routed(points, None)
        }
    }

    /// Straight segment between the endpoints, marked as failed.
    pub fn straight_fallback(source: Point, target: Point, reason: FailureReason) -> Self {
        Self::fallback(vec![source, target], reason)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingStats {
    pub total_routes: usize,
    pub successful_routes: usize,
    pub failed_routes: usize,
    pub fallback_count: usize,
    pub timeout_count: usize,
    pub interactive_count: usize,
    pub layout_count: usize,
    pub total_bends: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    #[serde(rename = "totalTimeMs", serialize_with = "as_millis")]
    pub total_time: Duration,
    #[serde(rename = "lastRoutingTimeMs", serialize_with = "as_millis")]
    pub last_routing_time: Duration,
}

impl RoutingStats {
    pub fn average_time(&self) -> Duration {
        if self.total_routes == 0 {
            Duration::ZERO
        } else {
            self.total_time / self.total_routes as u32
        }
    }

    pub fn average_bends(&self) -> f32 {
        if self.successful_routes == 0 {
            0.0
        } else {
            self.total_bends as f32 / self.successful_routes as f32
        }
    }

    pub fn success_rate(&self) -> f32 {
        if self.total_routes == 0 {
            0.0
        } else {
            self.successful_routes as f32 / self.total_routes as f32
        }
    }

    pub fn cache_hit_rate(&self) -> f32 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f32 / total as f32
        }
    }
}

/// One original edge after routing a whole layout.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutedEdge {
    pub from: String,
    pub to: String,
    pub result: RoutingResult,
    pub feedback: bool,
    /// Multiplicity label for bundles too large to spread out.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub pinned: bool,
    /// Band lane, when the band router placed the edge.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lane: Option<usize>,
}

impl RoutedEdge {
    pub fn key(&self) -> EdgeKey {
        (self.from.clone(), self.to.clone())
    }
}

/// Routing façade. One instance lives for an editing session and is handed
/// to whatever needs edge geometry; it owns the path cache, statistics and
/// pinned edges.
#[derive(Debug)]
pub struct Router {
    config: RoutingConfig,
    direction: Direction,
    mode: RoutingMode,
    pathfinder: Pathfinder,
    parallel: ParallelEdgeManager,
    stats: RoutingStats,
    pins: HashMap<EdgeKey, Vec<Point>>,
    /// Polylines placed so far in the current pass, for crossing penalties.
    routed: Vec<Vec<Point>>,
}

impl Router {
    pub fn new(config: RoutingConfig) -> Self {
        let parallel = ParallelEdgeManager::new(ParallelSpec {
            spacing: config.parallel_spacing,
            bidirectional_factor: config.bidirectional_factor,
            max_spread: config.max_parallel_spread,
        });
        Self {
            pathfinder: Pathfinder::new(config.enable_caching),
            direction: Direction::default(),
            mode: RoutingMode::default(),
            parallel,
            stats: RoutingStats::default(),
            pins: HashMap::new(),
            routed: Vec::new(),
            config,
        }
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn mode(&self) -> RoutingMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: RoutingMode) {
        self.mode = mode;
    }

    pub fn stats(&self) -> RoutingStats {
        let mut stats = self.stats.clone();
        stats.cache_hits = self.pathfinder.hits();
        stats.cache_misses = self.pathfinder.misses();
        stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = RoutingStats::default();
        self.pathfinder.reset_counters();
    }

    pub fn clear_cache(&mut self) {
        self.pathfinder.clear();
    }

    pub fn cached_paths(&self) -> usize {
        self.pathfinder.len()
    }

    /// Adds a polyline that later searches should avoid crossing.
    pub fn register_routed(&mut self, points: Vec<Point>) {
        self.routed.push(points);
    }

    pub fn pin_edge(&mut self, key: EdgeKey, points: Vec<Point>) {
        self.pins.insert(key, points);
    }

    pub fn unpin_edge(&mut self, key: &EdgeKey) -> Option<Vec<Point>> {
        self.pins.remove(key)
    }

    pub fn pinned(&self, key: &EdgeKey) -> Option<&[Point]> {
        self.pins.get(key).map(Vec::as_slice)
    }

    pub fn reset_pins(&mut self) {
        self.pins.clear();
    }

    /// Cached paths and placed polylines may run through the node's old or
    /// new box, so both are dropped. Pins touching the node are released.
    pub fn on_node_moved(&mut self, id: &str) {
        self.pathfinder.clear();
        self.routed.clear();
        self.pins.retain(|(from, to), _| from != id && to != id);
        log::debug!("node {id} moved, routing cache cleared");
    }

    /// Routes a single request. Never fails: an unroutable request comes
    /// back as a straight fallback with `success == false`.
    pub fn route(&mut self, request: &RoutingRequest) -> RoutingResult {
        let budget = Duration::from_millis(self.config.time_budget_ms);
        self.route_within(request, budget)
    }

    fn route_within(&mut self, request: &RoutingRequest, budget: Duration) -> RoutingResult {
        let started = Instant::now();
        let style = request.style.unwrap_or(self.config.style);
        let mut result = if self.mode == RoutingMode::Interactive || style == RoutingStyle::Straight {
            RoutingResult::routed(vec![request.source, request.target], None)
        } else {
            route_request(
                &self.config,
                self.direction,
                &mut self.pathfinder,
                &self.routed,
                request,
                style,
                budget,
            )
        };
        result.elapsed = started.elapsed();
        self.record(&result);
        result
    }

    fn record(&mut self, result: &RoutingResult) {
        let stats = &mut self.stats;
        stats.total_routes += 1;
        match self.mode {
            RoutingMode::Interactive => stats.interactive_count += 1,
            RoutingMode::Layout => stats.layout_count += 1,
        }
        if result.success {
            stats.successful_routes += 1;
            stats.total_bends += result.bends;
        } else {
            stats.failed_routes += 1;
            stats.fallback_count += 1;
            if result.failure == Some(FailureReason::Timeout) {
                stats.timeout_count += 1;
            }
        }
        stats.total_time += result.elapsed;
        stats.last_routing_time = result.elapsed;
    }

    /// Routes every edge of `graph` from the ports `layout` assigned. Edges
    /// are returned in graph order. In interactive mode this is
    /// [`Router::route_interactive`].
    pub fn route_layout(&mut self, layout: &Layout, graph: &Graph) -> Vec<RoutedEdge> {
        if self.mode == RoutingMode::Interactive {
            return self.route_interactive(layout, graph);
        }
        let started = Instant::now();
        let budget = Duration::from_millis(self.config.time_budget_ms);
        self.direction = layout.direction;
        self.routed.clear();
        self.register_groups(graph);

        let rects = layout.node_rects();
        let mut slots: Vec<Option<RoutedEdge>> = vec![None; graph.edges.len()];

        for (idx, edge) in graph.edges.iter().enumerate() {
            let key = edge.key();
            if let Some(points) = self.pins.get(&key) {
                let result = RoutingResult::routed(points.clone(), None);
                self.routed.push(result.points.clone());
                slots[idx] = Some(self.routed_edge(&key, result, layout, true, None));
            }
        }

        if self.config.band_router && layout.direction == Direction::TopBottom {
            self.route_bands(layout, graph, &rects, &mut slots);
        }

        for (idx, edge) in graph.edges.iter().enumerate() {
            if slots[idx].is_some() {
                continue;
            }
            let key = edge.key();
            let Some(ports) = layout.ports.get(&key) else {
                log::warn!("edge {} -> {} has no ports, skipped", key.0, key.1);
                continue;
            };
            let elapsed = started.elapsed();
            let result = if elapsed >= budget {
                let points = simple_orthogonal(ports.source, ports.target, ports.source_side, ports.target_side);
                let result = RoutingResult::fallback(points, FailureReason::Timeout);
                self.record(&result);
                result
            } else {
                let request = RoutingRequest::new(ports.source, ports.target)
                    .with_sides(ports.source_side, ports.target_side)
                    .with_obstacles(rects.iter().map(|(_, r)| *r).collect());
                self.route_within(&request, budget - elapsed)
            };
            if !result.success {
                log::warn!(
                    "edge {} -> {} fell back ({:?})",
                    key.0,
                    key.1,
                    result.failure.unwrap_or(FailureReason::NoPath)
                );
            }
            self.routed.push(result.points.clone());
            slots[idx] = Some(self.routed_edge(&key, result, layout, false, None));
        }

        let edges: Vec<RoutedEdge> = slots.into_iter().flatten().collect();
        let failed = edges.iter().filter(|e| !e.result.success).count();
        log::info!(
            "routed {} edges in {:.1}ms ({} fallbacks)",
            edges.len(),
            started.elapsed().as_secs_f64() * 1000.0,
            failed
        );
        edges
    }

    fn register_groups(&mut self, graph: &Graph) {
        self.parallel.clear();
        for edge in &graph.edges {
            self.parallel.register(&edge.key());
        }
    }

    fn routed_edge(
        &self,
        key: &EdgeKey,
        result: RoutingResult,
        layout: &Layout,
        pinned: bool,
        lane: Option<usize>,
    ) -> RoutedEdge {
        RoutedEdge {
            from: key.0.clone(),
            to: key.1.clone(),
            result,
            feedback: layout.feedback_edges.contains(key),
            label: self.parallel.label(key),
            pinned,
            lane,
        }
    }

    /// Forward edges go through the band pipeline; feedback edges are left
    /// for the A* pass.
    fn route_bands(
        &mut self,
        layout: &Layout,
        graph: &Graph,
        rects: &[(String, Rect)],
        slots: &mut [Option<RoutedEdge>],
    ) {
        let mut members = Vec::new();
        let mut band_edges = Vec::new();
        for (idx, edge) in graph.edges.iter().enumerate() {
            if slots[idx].is_some() {
                continue;
            }
            let key = edge.key();
            let Some(ports) = layout.ports.get(&key) else {
                continue;
            };
            if ports.feedback || ports.source.1 >= ports.target.1 {
                continue;
            }
            let obstacles = rects
                .iter()
                .filter(|(id, _)| *id != key.0 && *id != key.1)
                .map(|(_, r)| *r)
                .collect();
            members.push((idx, key));
            band_edges.push(BandEdge {
                source: ports.source,
                target: ports.target,
                obstacles,
            });
        }
        if band_edges.is_empty() {
            return;
        }
        let spec = BandSpec {
            port_stub: self.config.port_stub,
            min_clear: self.config.min_clear,
            snap_grid: self.config.snap_grid,
            lane_spacing: self.config.lane_spacing,
        };
        let started = Instant::now();
        let banded = route_tb_bands(&band_edges, &spec);
        if !banded.vmap_valid {
            log::warn!("band routing produced overlapping verticals");
        }
        log::debug!(
            "band routing: {} edges, {} locked straight, {} lanes in {:.1}ms",
            band_edges.len(),
            banded.locked.len(),
            banded.lanes.values().max().copied().unwrap_or(0),
            started.elapsed().as_secs_f64() * 1000.0
        );
        let paths = banded.paths.into_iter().zip(&band_edges);
        for (local, ((idx, key), (points, band_edge))) in members.into_iter().zip(paths).enumerate() {
            // Lanes only know about vertical conflicts; a run through a node goes to A*.
            if band_edge.obstacles.iter().any(|rect| path_crosses_interior(&points, rect)) {
                log::debug!("band route {} -> {} clips a node, rerouting", key.0, key.1);
                continue;
            }
            let result = RoutingResult::routed(points, None);
            self.record(&result);
            self.routed.push(result.points.clone());
            let lane = banded.lanes.get(&local).copied();
            slots[idx] = Some(self.routed_edge(&key, result, layout, false, lane));
        }
    }

    /// Straight centre-to-centre lines clipped to the node boxes, with
    /// parallel edges spread apart. Used while nodes are being dragged.
    pub fn route_interactive(&mut self, layout: &Layout, graph: &Graph) -> Vec<RoutedEdge> {
        self.register_groups(graph);
        let previous = self.mode;
        self.mode = RoutingMode::Interactive;
        let mut edges = Vec::with_capacity(graph.edges.len());
        for edge in &graph.edges {
            let key = edge.key();
            let (Some(from), Some(to)) = (layout.nodes.get(&key.0), layout.nodes.get(&key.1)) else {
                continue;
            };
            let started = Instant::now();
            let (fc, tc) = ((from.x, from.y), (to.x, to.y));
            let line = vec![clip_to_box(&from.rect(), fc, tc), clip_to_box(&to.rect(), tc, fc)];
            let offset = self
                .parallel
                .slot(&key, 0)
                .map_or(0.0, |slot| slot.offset_for_path());
            let mut result = RoutingResult::routed(apply_offset_to_path(&line, offset), None);
            result.elapsed = started.elapsed();
            self.record(&result);
            edges.push(self.routed_edge(&key, result, layout, false, None));
        }
        self.mode = previous;
        edges
    }
}

impl GeometryObserver for Router {
    fn on_geometry_event(&mut self, event: &GeometryEvent) {
        match event {
            GeometryEvent::NodeMoved { id, .. } | GeometryEvent::NodeRemoved { id } => self.on_node_moved(id),
            GeometryEvent::LayoutReplaced => {
                self.pathfinder.clear();
                self.routed.clear();
                self.reset_pins();
            }
        }
    }
}

/// Where the ray from `center` toward `toward` leaves `rect`.
fn clip_to_box(rect: &Rect, center: Point, toward: Point) -> Point {
    let (dx, dy) = (toward.0 - center.0, toward.1 - center.1);
    if dx.abs() <= f32::EPSILON && dy.abs() <= f32::EPSILON {
        return center;
    }
    let tx = if dx.abs() > f32::EPSILON {
        rect.width * 0.5 / dx.abs()
    } else {
        f32::INFINITY
    };
    let ty = if dy.abs() > f32::EPSILON {
        rect.height * 0.5 / dy.abs()
    } else {
        f32::INFINITY
    };
    let t = tx.min(ty).min(1.0);
    (center.0 + dx * t, center.1 + dy * t)
}

/// Orthogonal route without any search: a Z through the middle when both
/// sides share an axis, an L otherwise.
fn simple_orthogonal(source: Point, target: Point, source_side: PortSide, target_side: PortSide) -> Vec<Point> {
    let points = match (source_side.is_vertical(), target_side.is_vertical()) {
        (true, true) => {
            let mid = 0.5 * (source.1 + target.1);
            vec![source, (source.0, mid), (target.0, mid), target]
        }
        (false, false) => {
            let mid = 0.5 * (source.0 + target.0);
            vec![source, (mid, source.1), (mid, target.1), target]
        }
        (true, false) => vec![source, (source.0, target.1), target],
        (false, true) => vec![source, (target.0, source.1), target],
    };
    simplify(&dedupe(&points))
}

fn stub_point(point: Point, side: Option<PortSide>, length: f32, obstacles: &[Rect]) -> Point {
    match side {
        Some(side) => {
            let (nx, ny) = side.normal();
            (point.0 + nx * length, point.1 + ny * length)
        }
        None => gate(point, obstacles),
    }
}

/// Direct segment when both endpoints share an axis, nothing is in the
/// way, and the segment leaves and enters through the requested sides.
fn direct_segment(request: &RoutingRequest) -> Option<Vec<Point>> {
    let (s, t) = (request.source, request.target);
    if s.0 != t.0 && s.1 != t.1 {
        return None;
    }
    let heading = (t.0 - s.0, t.1 - s.1);
    let leaves = request
        .source_side
        .is_none_or(|side| side.normal().0 * heading.0 + side.normal().1 * heading.1 > 0.0);
    let enters = request
        .target_side
        .is_none_or(|side| side.normal().0 * heading.0 + side.normal().1 * heading.1 < 0.0);
    let clear = !request
        .obstacles
        .iter()
        .any(|obs| segment_crosses_interior(s, t, obs));
    (leaves && enters && clear).then(|| vec![s, t])
}

/// Moves the leading run of `cells` onto the line through `anchor` so the
/// connector from the stub does not jog. The shift stays within one cell.
fn align_leading_run(cells: &mut [Point], anchor: Point) {
    if cells.len() < 2 {
        return;
    }
    if cells[0].0 == cells[1].0 {
        let x = cells[0].0;
        for p in cells.iter_mut().take_while(|p| p.0 == x) {
            p.0 = anchor.0;
        }
    } else if cells[0].1 == cells[1].1 {
        let y = cells[0].1;
        for p in cells.iter_mut().take_while(|p| p.1 == y) {
            p.1 = anchor.1;
        }
    }
}

fn align_trailing_run(cells: &mut [Point], anchor: Point) {
    cells.reverse();
    align_leading_run(cells, anchor);
    cells.reverse();
}

enum RawPath {
    Found { points: Vec<Point>, from_cache: bool, iterations: usize },
    Failed(FailureReason, usize),
}

#[allow(clippy::too_many_arguments)]
fn search_raw(
    config: &RoutingConfig,
    pathfinder: &mut Pathfinder,
    routed: &[Vec<Point>],
    style: RoutingStyle,
    start: Point,
    goal: Point,
    heading: Option<Point>,
    padded: &[Rect],
    budget: Duration,
) -> RawPath {
    let cell = config.grid_size;
    let use_visibility = config.use_visibility_graph && style.connectivity() == Connectivity::Four;
    let key = PathKey {
        start: GridPoint::containing(start, cell.max(1.0)),
        goal: GridPoint::containing(goal, cell.max(1.0)),
        style,
        visibility: use_visibility,
    };
    if let Some(points) = pathfinder.lookup(&key) {
        return RawPath::Found {
            points,
            from_cache: true,
            iterations: 0,
        };
    }
    let params = SearchParams {
        bend_penalty: config.bend_penalty,
        crossing_penalty: config.crossing_penalty,
        tiebreak_weight: config.tiebreak_weight,
        max_iterations: config.max_iterations,
        time_budget: budget,
        routed,
        start_heading: heading,
    };

    let finish = |pathfinder: &mut Pathfinder, space: &dyn SearchSpace, s: usize, g: usize| {
        let outcome = astar(space, s, g, &params);
        match outcome.path {
            Some(path) => {
                let points: Vec<Point> = path.iter().map(|&n| space.position(n)).collect();
                pathfinder.store(key, points.clone());
                RawPath::Found {
                    points,
                    from_cache: false,
                    iterations: outcome.iterations,
                }
            }
            None => {
                let reason = match outcome.exhausted {
                    Some(Budget::Time) => FailureReason::Timeout,
                    Some(Budget::Iterations) => FailureReason::IterationLimit,
                    None => FailureReason::NoPath,
                };
                RawPath::Failed(reason, outcome.iterations)
            }
        }
    };

    if use_visibility
        && let Some(graph) = VisibilityGraph::build(padded, &[start, goal], cell.max(1.0), config.max_cells)
        && let (Some(s), Some(g)) = (graph.vertex_at(start), graph.vertex_at(goal))
    {
        return finish(pathfinder, &graph, s, g);
    }

    let spec = GridSpec {
        cell,
        roi_padding: config.roi_padding,
        max_cells: config.max_cells,
        proximity_penalty: config.proximity_penalty,
        proximity_decay: config.proximity_decay,
        proximity_cutoff: config.proximity_cutoff,
    };
    let Some(mut grid) = RoutingGrid::build(start, goal, padded, &spec, style.connectivity()) else {
        return RawPath::Failed(FailureReason::GridTooLarge, 0);
    };
    let (Some(s_cell), Some(g_cell)) = (grid.cell_of(start), grid.cell_of(goal)) else {
        return RawPath::Failed(FailureReason::NoPath, 0);
    };
    grid.unblock(s_cell);
    grid.unblock(g_cell);
    let (Some(s), Some(g)) = (grid.index(s_cell), grid.index(g_cell)) else {
        return RawPath::Failed(FailureReason::NoPath, 0);
    };
    finish(pathfinder, &grid, s, g)
}

fn route_request(
    config: &RoutingConfig,
    direction: Direction,
    pathfinder: &mut Pathfinder,
    routed: &[Vec<Point>],
    request: &RoutingRequest,
    style: RoutingStyle,
    budget: Duration,
) -> RoutingResult {
    let (source, target) = (request.source, request.target);
    if let Some(points) = direct_segment(request) {
        return RoutingResult::routed(points, None);
    }

    let padded: Vec<Rect> = request
        .obstacles
        .iter()
        .map(|r| r.inflate(config.node_padding))
        .collect();
    let stub = config.port_stub.max(config.node_padding + 1.0);
    let s_out = stub_point(source, request.source_side, stub, &padded);
    let t_in = stub_point(target, request.target_side, stub, &padded);
    let heading = request.source_side.map(PortSide::normal);

    let (mut cells, from_cache, iterations) =
        match search_raw(config, pathfinder, routed, style, s_out, t_in, heading, &padded, budget) {
            RawPath::Found {
                points,
                from_cache,
                iterations,
            } => (points, from_cache, iterations),
            RawPath::Failed(reason, iterations) => {
                log::debug!("no route from {source:?} to {target:?}: {reason:?} after {iterations} iterations");
                let mut result = RoutingResult::straight_fallback(source, target, reason);
                result.iterations = iterations;
                return result;
            }
        };

    let mut points = Vec::with_capacity(cells.len() + 4);
    points.push(source);
    points.push(s_out);
    if cells.len() >= 2 {
        align_leading_run(&mut cells, s_out);
        align_trailing_run(&mut cells, t_in);
        points.extend_from_slice(&cells);
    }
    points.push(t_in);
    points.push(target);

    let mut points = simplify(&dedupe(&points));
    if config.enforce_monotonic {
        points = enforce_monotonic(&points);
    }
    if style == RoutingStyle::Polyline {
        points = shortcut(&points, &request.obstacles);
    }
    if style.is_manhattan() {
        let elbow = request
            .source_side
            .map_or(direction, |side| if side.is_vertical() { Direction::TopBottom } else { Direction::LeftRight });
        points = manhattanize(&points, elbow);
    }
    let points = simplify(&points);

    let bends = path_bend_count(&points);
    if bends > config.max_bends {
        log::debug!("route from {source:?} to {target:?} has {bends} bends, limit {}", config.max_bends);
        return RoutingResult::straight_fallback(source, target, FailureReason::TooManyBends);
    }
    if request
        .obstacles
        .iter()
        .filter(|obs| !obs.contains(source) && !obs.contains(target))
        .any(|obs| path_crosses_interior(&points, obs))
    {
        log::debug!("route from {source:?} to {target:?} clips an obstacle after clean-up");
    }

    let commands = (style == RoutingStyle::Curved || config.enable_smoothing)
        .then(|| smooth_corners(&points, config.corner_radius));
    let mut result = RoutingResult::routed(points, commands);
    result.from_cache = from_cache;
    result.iterations = iterations;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::optimize::is_manhattan;

    fn router() -> Router {
        Router::new(RoutingConfig::default())
    }

    fn stacked() -> (Rect, Rect) {
        (Rect::new(0.0, 0.0, 100.0, 50.0), Rect::new(0.0, 200.0, 100.0, 50.0))
    }

    #[test]
    fn style_parses_case_insensitively() {
        assert_eq!("Octilinear".parse::<RoutingStyle>(), Ok(RoutingStyle::Octilinear));
        assert!("zigzag".parse::<RoutingStyle>().is_err());
    }

    #[test]
    fn aligned_boxes_connect_directly() {
        let (a, b) = stacked();
        let mut router = router();
        let result = router.route(&RoutingRequest::between_boxes(a, b));
        assert!(result.success);
        assert_eq!(result.points, vec![(50.0, 50.0), (50.0, 200.0)]);
        assert_eq!(result.bends, 0);
    }

    #[test]
    fn obstacle_forces_detour() {
        let (a, b) = stacked();
        let blocker = Rect::new(20.0, 100.0, 60.0, 50.0);
        let request = RoutingRequest::between_boxes(a, b).with_obstacles(vec![a, b, blocker]);
        let mut router = router();
        let result = router.route(&request);
        assert!(result.success, "{result:?}");
        assert_eq!(result.points.first(), Some(&request.source));
        assert_eq!(result.points.last(), Some(&request.target));
        assert!(is_manhattan(&result.points));
        assert!(result.bends >= 2);
        assert!(!path_crosses_interior(&result.points, &blocker));
    }

    #[test]
    fn offset_boxes_route_orthogonally() {
        let a = Rect::new(0.0, 0.0, 100.0, 50.0);
        let b = Rect::new(300.0, 200.0, 100.0, 50.0);
        let request = RoutingRequest::between_boxes(a, b).with_obstacles(vec![a, b]);
        let result = router().route(&request);
        assert!(result.success);
        assert_eq!(result.points[0], request.source);
        assert_eq!(result.points[result.points.len() - 1], request.target);
        assert!(is_manhattan(&result.points));
    }

    #[test]
    fn enclosed_target_falls_back_to_straight_line() {
        let a = Rect::new(0.0, 0.0, 40.0, 40.0);
        let walls = vec![
            Rect::new(180.0, 180.0, 140.0, 20.0),
            Rect::new(180.0, 300.0, 140.0, 20.0),
            Rect::new(180.0, 180.0, 20.0, 140.0),
            Rect::new(300.0, 180.0, 20.0, 140.0),
        ];
        let request = RoutingRequest::new(a.center(), (250.0, 250.0)).with_obstacles(walls);
        let mut router = router();
        let result = router.route(&request);
        assert!(!result.success);
        assert_eq!(result.points, vec![(20.0, 20.0), (250.0, 250.0)]);
        assert_eq!(result.failure, Some(FailureReason::NoPath));
        assert_eq!(router.stats().fallback_count, 1);
    }

    #[test]
    fn repeated_request_hits_cache() {
        let a = Rect::new(0.0, 0.0, 100.0, 50.0);
        let b = Rect::new(300.0, 200.0, 100.0, 50.0);
        let request = RoutingRequest::between_boxes(a, b).with_obstacles(vec![a, b]);
        let mut router = router();
        let first = router.route(&request);
        let second = router.route(&request);
        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert_eq!(first.points, second.points);
        assert_eq!(router.stats().cache_hits, 1);
        router.on_node_moved("A");
        assert_eq!(router.cached_paths(), 0);
    }

    #[test]
    fn interactive_mode_draws_straight_lines() {
        let a = Rect::new(0.0, 0.0, 100.0, 50.0);
        let b = Rect::new(300.0, 200.0, 100.0, 50.0);
        let mut router = router();
        router.set_mode(RoutingMode::Interactive);
        let result = router.route(&RoutingRequest::between_boxes(a, b));
        assert_eq!(result.points.len(), 2);
        let stats = router.stats();
        assert_eq!(stats.interactive_count, 1);
        assert_eq!(stats.layout_count, 0);
    }

    #[test]
    fn curved_style_emits_commands() {
        let a = Rect::new(0.0, 0.0, 100.0, 50.0);
        let b = Rect::new(300.0, 200.0, 100.0, 50.0);
        let request = RoutingRequest::between_boxes(a, b)
            .with_obstacles(vec![a, b])
            .with_style(RoutingStyle::Curved);
        let result = router().route(&request);
        let commands = result.commands.unwrap();
        assert!(commands.iter().any(|c| matches!(c, PathCommand::QuadTo { .. })));
    }

    #[test]
    fn octilinear_route_keeps_endpoints() {
        let a = Rect::new(0.0, 0.0, 100.0, 50.0);
        let b = Rect::new(300.0, 200.0, 100.0, 50.0);
        let request = RoutingRequest::between_boxes(a, b)
            .with_obstacles(vec![a, b])
            .with_style(RoutingStyle::Octilinear);
        let result = router().route(&request);
        assert!(result.success);
        assert_eq!(result.points[0], request.source);
        assert_eq!(*result.points.last().unwrap(), request.target);
    }

    #[test]
    fn visibility_graph_route_is_orthogonal() {
        let (a, b) = stacked();
        let blocker = Rect::new(20.0, 100.0, 60.0, 50.0);
        let request = RoutingRequest::between_boxes(a, b).with_obstacles(vec![a, b, blocker]);
        let mut router = Router::new(RoutingConfig {
            use_visibility_graph: true,
            ..RoutingConfig::default()
        });
        let result = router.route(&request);
        assert!(result.success);
        assert!(is_manhattan(&result.points));
        assert!(!path_crosses_interior(&result.points, &blocker));
    }

    #[test]
    fn simple_orthogonal_shapes() {
        let z = simple_orthogonal((0.0, 0.0), (100.0, 100.0), PortSide::Bottom, PortSide::Top);
        assert_eq!(z, vec![(0.0, 0.0), (0.0, 50.0), (100.0, 50.0), (100.0, 100.0)]);
        let l = simple_orthogonal((0.0, 0.0), (100.0, 100.0), PortSide::Bottom, PortSide::Left);
        assert_eq!(l, vec![(0.0, 0.0), (0.0, 100.0), (100.0, 100.0)]);
    }

    #[test]
    fn clip_lands_on_box_boundary() {
        let rect = Rect::new(0.0, 0.0, 100.0, 50.0);
        assert_eq!(clip_to_box(&rect, (50.0, 25.0), (50.0, 200.0)), (50.0, 50.0));
        assert_eq!(clip_to_box(&rect, (50.0, 25.0), (300.0, 25.0)), (100.0, 25.0));
    }
}
