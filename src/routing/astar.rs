use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::time::{Duration, Instant};

use super::RoutingStyle;
use super::geometry::{Point, crossings_with_polyline};
use super::grid::{Connectivity, GridPoint, RoutingGrid};
use super::visibility::VisibilityGraph;

/// Fixed-point scale for search costs; keeps heap ordering exact.
const ASTAR_COST_SCALE: f32 = 1000.0;
/// Direction slot for "no step taken yet".
const NO_DIR: u8 = 4;
const DIR_SLOTS: usize = 9;
/// How often the wall clock is consulted.
const TIME_CHECK_INTERVAL: usize = 256;

/// A graph A* can walk. Step costs are expressed in units of `unit()` world
/// length so grid cells and visibility segments share the same penalties.
pub trait SearchSpace {
    fn node_count(&self) -> usize;
    fn position(&self, node: usize) -> Point;
    fn successors(&self, node: usize, out: &mut Vec<(usize, f32)>);
    /// Extra cost for entering `node`.
    fn penalty(&self, _node: usize) -> f32 {
        0.0
    }
    fn unit(&self) -> f32;
    fn diagonal_moves(&self) -> bool {
        false
    }
}

impl SearchSpace for RoutingGrid {
    fn node_count(&self) -> usize {
        self.len()
    }

    fn position(&self, node: usize) -> Point {
        self.center(self.point_at(node))
    }

    fn successors(&self, node: usize, out: &mut Vec<(usize, f32)>) {
        out.clear();
        self.for_each_neighbor(self.point_at(node), |next, cost| {
            if let Some(idx) = self.index(next) {
                out.push((idx, cost));
            }
        });
    }

    fn penalty(&self, node: usize) -> f32 {
        self.proximity(self.point_at(node))
    }

    fn unit(&self) -> f32 {
        self.cell()
    }

    fn diagonal_moves(&self) -> bool {
        self.connectivity() == Connectivity::Eight
    }
}

impl SearchSpace for VisibilityGraph {
    fn node_count(&self) -> usize {
        self.len()
    }

    fn position(&self, node: usize) -> Point {
        self.points()[node]
    }

    fn successors(&self, node: usize, out: &mut Vec<(usize, f32)>) {
        out.clear();
        let unit = self.unit();
        out.extend(self.neighbors(node).iter().map(|(n, len)| (*n, len / unit)));
    }

    fn unit(&self) -> f32 {
        VisibilityGraph::unit(self)
    }
}

#[derive(Debug, Clone)]
pub struct SearchParams<'a> {
    pub bend_penalty: f32,
    pub crossing_penalty: f32,
    pub tiebreak_weight: f32,
    pub max_iterations: usize,
    pub time_budget: Duration,
    /// Polylines already placed; every one a step crosses adds
    /// `crossing_penalty`.
    pub routed: &'a [Vec<Point>],
    /// Heading the path must start with to avoid a bend penalty.
    pub start_heading: Option<Point>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Budget {
    Iterations,
    Time,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub path: Option<Vec<usize>>,
    pub iterations: usize,
    pub exhausted: Option<Budget>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct SearchState {
    node: usize,
    dir: u8,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct SearchEntry {
    est: u32,
    cost: u32,
    state: SearchState,
}

impl Ord for SearchEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .est
            .cmp(&self.est)
            .then_with(|| other.cost.cmp(&self.cost))
            .then_with(|| other.state.node.cmp(&self.state.node))
            .then_with(|| self.state.dir.cmp(&other.state.dir))
    }
}

impl PartialOrd for SearchEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn signum(v: f32) -> i32 {
    if v > 1e-4 {
        1
    } else if v < -1e-4 {
        -1
    } else {
        0
    }
}

/// Compass slot of the move from `a` to `b`; `NO_DIR` for a zero move.
fn heading_slot(dx: f32, dy: f32) -> u8 {
    ((signum(dx) + 1) * 3 + (signum(dy) + 1)) as u8
}

fn scaled(value: f32) -> u32 {
    (value.max(0.0) * ASTAR_COST_SCALE).round() as u32
}

/// Manhattan (or octile when diagonals are allowed) distance plus a small
/// term favouring nodes near the straight start-goal line.
fn heuristic<S: SearchSpace + ?Sized>(space: &S, node: Point, start: Point, goal: Point, tiebreak: f32) -> f32 {
    let unit = space.unit();
    let dx = (node.0 - goal.0).abs() / unit;
    let dy = (node.1 - goal.1).abs() / unit;
    let base = if space.diagonal_moves() {
        dx.max(dy) + (std::f32::consts::SQRT_2 - 1.0) * dx.min(dy)
    } else {
        dx + dy
    };
    let cross = ((node.0 - goal.0) * (start.1 - goal.1) - (start.0 - goal.0) * (node.1 - goal.1)).abs()
        / (unit * unit);
    base + tiebreak * cross
}

pub fn astar<S: SearchSpace + ?Sized>(
    space: &S,
    start: usize,
    goal: usize,
    params: &SearchParams<'_>,
) -> SearchOutcome {
    let started = Instant::now();
    let nodes = space.node_count();
    if start >= nodes || goal >= nodes {
        return SearchOutcome {
            path: None,
            iterations: 0,
            exhausted: None,
        };
    }
    if start == goal {
        return SearchOutcome {
            path: Some(vec![start]),
            iterations: 0,
            exhausted: None,
        };
    }

    let start_pos = space.position(start);
    let goal_pos = space.position(goal);
    let bend_penalty = scaled(params.bend_penalty);
    let start_dir = params
        .start_heading
        .map_or(NO_DIR, |(dx, dy)| heading_slot(dx, dy));

    let states = nodes * DIR_SLOTS;
    let mut best_cost = vec![u32::MAX; states];
    let mut prev: Vec<u32> = vec![u32::MAX; states];
    let mut heap = BinaryHeap::new();
    let start_idx = start * DIR_SLOTS + start_dir as usize;
    best_cost[start_idx] = 0;
    heap.push(SearchEntry {
        est: scaled(heuristic(space, start_pos, start_pos, goal_pos, params.tiebreak_weight)),
        cost: 0,
        state: SearchState {
            node: start,
            dir: start_dir,
        },
    });

    let mut successors = Vec::with_capacity(8);
    let mut iterations = 0usize;
    let mut exhausted = None;
    let mut end_state: Option<SearchState> = None;

    while let Some(entry) = heap.pop() {
        iterations += 1;
        if iterations > params.max_iterations {
            exhausted = Some(Budget::Iterations);
            break;
        }
        if iterations % TIME_CHECK_INTERVAL == 0 && started.elapsed() > params.time_budget {
            exhausted = Some(Budget::Time);
            break;
        }
        let SearchEntry { cost, state, .. } = entry;
        let state_idx = state.node * DIR_SLOTS + state.dir as usize;
        if cost != best_cost[state_idx] {
            continue;
        }
        if state.node == goal {
            end_state = Some(state);
            break;
        }
        let here = space.position(state.node);
        space.successors(state.node, &mut successors);
        for &(next, step) in &successors {
            let there = space.position(next);
            let dir = heading_slot(there.0 - here.0, there.1 - here.1);
            let mut next_cost = cost.saturating_add(scaled(step));
            if state.dir != NO_DIR && state.dir != dir {
                next_cost = next_cost.saturating_add(bend_penalty);
            }
            next_cost = next_cost.saturating_add(scaled(space.penalty(next)));
            if params.crossing_penalty > 0.0 && !params.routed.is_empty() {
                let crossed = params
                    .routed
                    .iter()
                    .filter(|poly| crossings_with_polyline(here, there, poly) > 0)
                    .count();
                if crossed > 0 {
                    next_cost = next_cost.saturating_add(scaled(params.crossing_penalty * crossed as f32));
                }
            }
            let next_idx = next * DIR_SLOTS + dir as usize;
            if next_cost >= best_cost[next_idx] {
                continue;
            }
            best_cost[next_idx] = next_cost;
            prev[next_idx] = state_idx as u32;
            let est = next_cost.saturating_add(scaled(heuristic(
                space,
                there,
                start_pos,
                goal_pos,
                params.tiebreak_weight,
            )));
            heap.push(SearchEntry {
                est,
                cost: next_cost,
                state: SearchState { node: next, dir },
            });
        }
    }

    let Some(end_state) = end_state else {
        return SearchOutcome {
            path: None,
            iterations,
            exhausted,
        };
    };
    let mut path = Vec::new();
    let mut cur = end_state.node * DIR_SLOTS + end_state.dir as usize;
    loop {
        path.push(cur / DIR_SLOTS);
        let p = prev[cur];
        if p == u32::MAX {
            break;
        }
        cur = p as usize;
    }
    path.reverse();
    SearchOutcome {
        path: Some(path),
        iterations,
        exhausted: None,
    }
}

/// Cache key: the cells the search starts and ends in plus the style that
/// shaped it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PathKey {
    pub start: GridPoint,
    pub goal: GridPoint,
    pub style: RoutingStyle,
    pub visibility: bool,
}

/// Runs searches and remembers their results until told to forget.
#[derive(Debug, Default)]
pub struct Pathfinder {
    enabled: bool,
    cache: HashMap<PathKey, Vec<Point>>,
    hits: u64,
    misses: u64,
}

impl Pathfinder {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.cache.clear();
        }
    }

    /// Cached path for `key`; every lookup counts as a hit or a miss.
    pub fn lookup(&mut self, key: &PathKey) -> Option<Vec<Point>> {
        if !self.enabled {
            return None;
        }
        match self.cache.get(key) {
            Some(points) => {
                self.hits += 1;
                Some(points.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Remembers a searched path; a no-op while caching is disabled.
    pub fn store(&mut self, key: PathKey, points: Vec<Point>) {
        if self.enabled {
            self.cache.insert(key, points);
        }
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn hit_rate(&self) -> f32 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f32 / total as f32
        }
    }

    pub fn reset_counters(&mut self) {
        self.hits = 0;
        self.misses = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::geometry::{Rect, path_bend_count};
    use crate::routing::grid::GridSpec;

    fn spec() -> GridSpec {
        GridSpec {
            cell: 10.0,
            roi_padding: 40.0,
            max_cells: 100_000,
            proximity_penalty: 0.0,
            proximity_decay: 20.0,
            proximity_cutoff: 50.0,
        }
    }

    fn params(routed: &[Vec<Point>]) -> SearchParams<'_> {
        SearchParams {
            bend_penalty: 5.0,
            crossing_penalty: 10.0,
            tiebreak_weight: 0.001,
            max_iterations: 50_000,
            time_budget: Duration::from_secs(2),
            routed,
            start_heading: None,
        }
    }

    fn cells(grid: &RoutingGrid, a: Point, b: Point) -> (usize, usize) {
        let s = grid.index(grid.cell_of(a).unwrap()).unwrap();
        let g = grid.index(grid.cell_of(b).unwrap()).unwrap();
        (s, g)
    }

    #[test]
    fn straight_corridor_has_no_bends() {
        let grid = RoutingGrid::build((5.0, 5.0), (95.0, 5.0), &[], &spec(), Connectivity::Four).unwrap();
        let (s, g) = cells(&grid, (5.0, 5.0), (95.0, 5.0));
        let outcome = astar(&grid, s, g, &params(&[]));
        let path: Vec<Point> = outcome.path.unwrap().iter().map(|&n| grid.position(n)).collect();
        assert_eq!(path.len(), 10);
        assert_eq!(path_bend_count(&path), 0);
    }

    #[test]
    fn detours_around_wall() {
        let wall = Rect::new(40.0, -30.0, 20.0, 60.0);
        let grid = RoutingGrid::build((5.0, 5.0), (95.0, 5.0), &[wall], &spec(), Connectivity::Four).unwrap();
        let (s, g) = cells(&grid, (5.0, 5.0), (95.0, 5.0));
        let outcome = astar(&grid, s, g, &params(&[]));
        let path: Vec<Point> = outcome.path.unwrap().iter().map(|&n| grid.position(n)).collect();
        assert!(path.iter().all(|p| !wall.contains_strict(*p)));
        assert!(path_bend_count(&path) >= 2);
    }

    #[test]
    fn enclosed_goal_has_no_path() {
        let ring = [
            Rect::new(60.0, -40.0, 80.0, 20.0),
            Rect::new(60.0, 30.0, 80.0, 20.0),
            Rect::new(60.0, -40.0, 20.0, 90.0),
            Rect::new(120.0, -40.0, 20.0, 90.0),
        ];
        let grid = RoutingGrid::build((5.0, 5.0), (105.0, 5.0), &ring, &spec(), Connectivity::Four).unwrap();
        let (s, g) = cells(&grid, (5.0, 5.0), (105.0, 5.0));
        let outcome = astar(&grid, s, g, &params(&[]));
        assert!(outcome.path.is_none());
        assert!(outcome.exhausted.is_none());
    }

    #[test]
    fn iteration_budget_is_reported() {
        let grid = RoutingGrid::build((5.0, 5.0), (395.0, 5.0), &[], &spec(), Connectivity::Four).unwrap();
        let (s, g) = cells(&grid, (5.0, 5.0), (395.0, 5.0));
        let tight = SearchParams {
            max_iterations: 3,
            ..params(&[])
        };
        let outcome = astar(&grid, s, g, &tight);
        assert!(outcome.path.is_none());
        assert_eq!(outcome.exhausted, Some(Budget::Iterations));
    }

    #[test]
    fn crossing_penalty_steers_away_from_routed_edges() {
        // A routed vertical line blocks the direct row; going around its end
        // is cheaper than crossing it.
        let routed = vec![vec![(50.0, -15.0), (50.0, 25.0)]];
        let grid = RoutingGrid::build((5.0, 5.0), (95.0, 5.0), &[], &spec(), Connectivity::Four).unwrap();
        let (s, g) = cells(&grid, (5.0, 5.0), (95.0, 5.0));
        let p = SearchParams {
            bend_penalty: 0.5,
            crossing_penalty: 100.0,
            ..params(&routed)
        };
        let path: Vec<Point> = astar(&grid, s, g, &p)
            .path
            .unwrap()
            .iter()
            .map(|&n| grid.position(n))
            .collect();
        let crossed = path
            .windows(2)
            .filter(|seg| crossings_with_polyline(seg[0], seg[1], &routed[0]) > 0)
            .count();
        assert_eq!(crossed, 0);
    }

    #[test]
    fn diagonal_grid_takes_diagonal_steps() {
        let grid = RoutingGrid::build((5.0, 5.0), (55.0, 55.0), &[], &spec(), Connectivity::Eight).unwrap();
        let (s, g) = cells(&grid, (5.0, 5.0), (55.0, 55.0));
        let path = astar(&grid, s, g, &params(&[])).path.unwrap();
        assert_eq!(path.len(), 6);
    }

    #[test]
    fn cache_counts_hits_and_misses() {
        let grid = RoutingGrid::build((5.0, 5.0), (95.0, 45.0), &[], &spec(), Connectivity::Four).unwrap();
        let (s, g) = cells(&grid, (5.0, 5.0), (95.0, 45.0));
        let key = PathKey {
            start: grid.point_at(s),
            goal: grid.point_at(g),
            style: RoutingStyle::Orthogonal,
            visibility: false,
        };
        let mut finder = Pathfinder::new(true);
        assert_eq!(finder.lookup(&key), None);
        let path = astar(&grid, s, g, &params(&[])).path.unwrap();
        let points: Vec<Point> = path.iter().map(|&n| grid.position(n)).collect();
        finder.store(key, points.clone());
        assert_eq!(finder.lookup(&key), Some(points));
        assert_eq!((finder.hits(), finder.misses()), (1, 1));
        finder.clear();
        assert!(finder.is_empty());

        let mut disabled = Pathfinder::new(false);
        disabled.store(key, vec![(5.0, 5.0)]);
        assert!(disabled.is_empty());
        assert_eq!(disabled.lookup(&key), None);
        assert_eq!(disabled.misses(), 0);
    }

    #[test]
    fn visibility_graph_search_finds_path_around_box() {
        let obstacles = [Rect::new(40.0, -20.0, 20.0, 40.0)];
        let start = (0.0, 0.0);
        let goal = (100.0, 0.0);
        let graph = VisibilityGraph::build(&obstacles, &[start, goal], 10.0, 10_000).unwrap();
        let s = graph.vertex_at(start).unwrap();
        let g = graph.vertex_at(goal).unwrap();
        let path: Vec<Point> = astar(&graph, s, g, &params(&[]))
            .path
            .unwrap()
            .iter()
            .map(|&n| graph.position(n))
            .collect();
        assert_eq!(path.first(), Some(&start));
        assert_eq!(path.last(), Some(&goal));
        assert!(path.iter().all(|p| !obstacles[0].contains_strict(*p)));
    }
}
