use super::geometry::{Point, Rect};

/// Absolute grid cell. The lattice is anchored at the world origin so that
/// the same world point maps to the same cell regardless of the region a
/// grid was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridPoint {
    pub col: i32,
    pub row: i32,
}

impl GridPoint {
    pub fn new(col: i32, row: i32) -> Self {
        Self { col, row }
    }

    pub fn containing(p: Point, cell: f32) -> Self {
        Self {
            col: (p.0 / cell).floor() as i32,
            row: (p.1 / cell).floor() as i32,
        }
    }

    pub fn center(self, cell: f32) -> Point {
        (
            (self.col as f32 + 0.5) * cell,
            (self.row as f32 + 0.5) * cell,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Connectivity {
    /// Axis-aligned steps only.
    Four,
    /// Axis-aligned and diagonal steps.
    Eight,
}

const AXIS_STEPS: [(i32, i32); 4] = [(0, -1), (0, 1), (-1, 0), (1, 0)];
const DIAGONAL_STEPS: [(i32, i32); 4] = [(-1, -1), (1, -1), (-1, 1), (1, 1)];
const MIN_CELL: f32 = 2.0;

/// Tunables that shape the grid, copied out of the routing config.
#[derive(Debug, Clone, Copy)]
pub struct GridSpec {
    pub cell: f32,
    pub roi_padding: f32,
    pub max_cells: usize,
    pub proximity_penalty: f32,
    pub proximity_decay: f32,
    pub proximity_cutoff: f32,
}

/// Uniform grid over the region of interest of one routing request.
#[derive(Debug, Clone)]
pub struct RoutingGrid {
    cell: f32,
    origin: GridPoint,
    cols: i32,
    rows: i32,
    connectivity: Connectivity,
    blocked: Vec<bool>,
    proximity: Vec<f32>,
    obstacles: Vec<Rect>,
}

impl RoutingGrid {
    /// Builds a grid covering `start`, `goal` and `roi_padding` around them.
    /// Obstacles touching that region are kept and widen it so paths can
    /// walk around them; everything else is ignored. Returns `None` when the
    /// region would exceed `max_cells`.
    pub fn build(
        start: Point,
        goal: Point,
        obstacles: &[Rect],
        spec: &GridSpec,
        connectivity: Connectivity,
    ) -> Option<Self> {
        let cell = spec.cell.max(MIN_CELL);
        let mut roi = Rect::spanning(start, goal).inflate(spec.roi_padding.max(cell));
        let kept: Vec<Rect> = obstacles
            .iter()
            .filter(|obs| obs.intersects(&roi))
            .copied()
            .collect();
        for obs in &kept {
            roi = roi.union(obs);
        }
        roi = roi.inflate(cell * 2.0);

        let origin = GridPoint::containing((roi.x, roi.y), cell);
        let end = GridPoint::containing((roi.right(), roi.bottom()), cell);
        let cols = end.col - origin.col + 1;
        let rows = end.row - origin.row + 1;
        if cols <= 0 || rows <= 0 {
            return None;
        }
        let total = (cols as usize).saturating_mul(rows as usize);
        if total > spec.max_cells {
            log::debug!("routing grid of {cols}x{rows} cells exceeds limit {}", spec.max_cells);
            return None;
        }

        let mut grid = Self {
            cell,
            origin,
            cols,
            rows,
            connectivity,
            blocked: vec![false; total],
            proximity: vec![0.0; total],
            obstacles: kept,
        };
        grid.mark_blocked();
        grid.mark_proximity(spec);
        Some(grid)
    }

    fn mark_blocked(&mut self) {
        for obs_idx in 0..self.obstacles.len() {
            let obs = self.obstacles[obs_idx];
            let lo = GridPoint::containing((obs.x, obs.y), self.cell);
            let hi = GridPoint::containing((obs.right(), obs.bottom()), self.cell);
            for row in lo.row..=hi.row {
                for col in lo.col..=hi.col {
                    let gp = GridPoint::new(col, row);
                    let Some(idx) = self.index(gp) else {
                        continue;
                    };
                    if obs.contains_strict(gp.center(self.cell)) {
                        self.blocked[idx] = true;
                    }
                }
            }
        }
    }

    /// Penalty decays exponentially with the distance to the nearest
    /// obstacle centre and is zero past the cutoff.
    fn mark_proximity(&mut self, spec: &GridSpec) {
        if spec.proximity_penalty <= 0.0 || spec.proximity_cutoff <= 0.0 {
            return;
        }
        let decay = spec.proximity_decay.max(1e-3);
        let mut nearest = vec![f32::INFINITY; self.proximity.len()];
        for obs in &self.obstacles {
            let center = obs.center();
            let reach = (spec.proximity_cutoff, spec.proximity_cutoff);
            let lo = GridPoint::containing((center.0 - reach.0, center.1 - reach.1), self.cell);
            let hi = GridPoint::containing((center.0 + reach.0, center.1 + reach.1), self.cell);
            for row in lo.row..=hi.row {
                for col in lo.col..=hi.col {
                    let gp = GridPoint::new(col, row);
                    let Some(idx) = self.index(gp) else {
                        continue;
                    };
                    let (cx, cy) = gp.center(self.cell);
                    let d = ((cx - center.0).powi(2) + (cy - center.1).powi(2)).sqrt();
                    if d < nearest[idx] {
                        nearest[idx] = d;
                    }
                }
            }
        }
        for (slot, d) in self.proximity.iter_mut().zip(nearest) {
            if d < spec.proximity_cutoff {
                *slot = spec.proximity_penalty * (-d / decay).exp();
            }
        }
    }

    pub fn cell(&self) -> f32 {
        self.cell
    }

    pub fn cols(&self) -> i32 {
        self.cols
    }

    pub fn rows(&self) -> i32 {
        self.rows
    }

    pub fn connectivity(&self) -> Connectivity {
        self.connectivity
    }

    /// Obstacles that survived region-of-interest filtering.
    pub fn obstacles(&self) -> &[Rect] {
        &self.obstacles
    }

    pub fn len(&self) -> usize {
        self.blocked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocked.is_empty()
    }

    pub fn index(&self, gp: GridPoint) -> Option<usize> {
        let col = gp.col - self.origin.col;
        let row = gp.row - self.origin.row;
        if col < 0 || row < 0 || col >= self.cols || row >= self.rows {
            return None;
        }
        Some((row * self.cols + col) as usize)
    }

    pub fn point_at(&self, idx: usize) -> GridPoint {
        let idx = idx as i32;
        GridPoint::new(self.origin.col + idx % self.cols, self.origin.row + idx / self.cols)
    }

    pub fn cell_of(&self, p: Point) -> Option<GridPoint> {
        let gp = GridPoint::containing(p, self.cell);
        self.index(gp).map(|_| gp)
    }

    pub fn center(&self, gp: GridPoint) -> Point {
        gp.center(self.cell)
    }

    pub fn is_blocked(&self, gp: GridPoint) -> bool {
        self.index(gp).is_none_or(|idx| self.blocked[idx])
    }

    /// Gate: frees a cell that an endpoint needs even if an obstacle covers it.
    pub fn unblock(&mut self, gp: GridPoint) {
        if let Some(idx) = self.index(gp) {
            self.blocked[idx] = false;
        }
    }

    pub fn proximity(&self, gp: GridPoint) -> f32 {
        self.index(gp).map_or(0.0, |idx| self.proximity[idx])
    }

    /// Free neighbours with their step cost in cell units. Diagonal steps may
    /// not cut the corner of a blocked cell.
    pub fn neighbors(&self, gp: GridPoint, out: &mut Vec<(GridPoint, f32)>) {
        out.clear();
        self.for_each_neighbor(gp, |next, cost| out.push((next, cost)));
    }

    pub(super) fn for_each_neighbor(&self, gp: GridPoint, mut visit: impl FnMut(GridPoint, f32)) {
        for (dc, dr) in AXIS_STEPS {
            let next = GridPoint::new(gp.col + dc, gp.row + dr);
            if !self.is_blocked(next) {
                visit(next, 1.0);
            }
        }
        if self.connectivity == Connectivity::Eight {
            for (dc, dr) in DIAGONAL_STEPS {
                let next = GridPoint::new(gp.col + dc, gp.row + dr);
                let side_a = GridPoint::new(gp.col + dc, gp.row);
                let side_b = GridPoint::new(gp.col, gp.row + dr);
                if !self.is_blocked(next) && !self.is_blocked(side_a) && !self.is_blocked(side_b) {
                    visit(next, std::f32::consts::SQRT_2);
                }
            }
        }
    }
}
