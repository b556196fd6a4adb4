use crate::ir::Direction;
use crate::routing::RoutingStyle;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    pub direction: Direction,
    pub layer_spacing: f32,
    /// Gap between the main layered drawing and the isolated-node group.
    pub node_spacing: f32,
    pub isolated_spacing: f32,
    pub min_node_node: f32,
    pub min_node_edge: f32,
    pub min_edge_edge: f32,
    pub min_layer_layer: f32,
    pub node_width: f32,
    pub node_height: f32,
    /// Port inset from the node corners.
    pub node_margin: f32,
    pub min_gap: f32,
    pub sink_layers: bool,
    pub crossing_rounds: usize,
    /// Relative improvement below which crossing reduction stops early.
    pub crossing_threshold: f32,
    pub nudge_passes: usize,
    /// Fraction of the current coordinate kept on each nudge step.
    pub nudge_damping: f32,
    pub greedy_iterations: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            direction: Direction::TopBottom,
            layer_spacing: 200.0,
            node_spacing: 150.0,
            isolated_spacing: 100.0,
            min_node_node: 30.0,
            min_node_edge: 15.0,
            min_edge_edge: 15.0,
            min_layer_layer: 10.0,
            node_width: 120.0,
            node_height: 60.0,
            node_margin: 8.0,
            min_gap: 16.0,
            sink_layers: true,
            crossing_rounds: 10,
            crossing_threshold: 0.01,
            nudge_passes: 1,
            nudge_damping: 0.7,
            greedy_iterations: 100,
        }
    }
}

/// A configuration value that was replaced before layout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigWarning {
    pub field: String,
    pub original: f32,
    pub corrected: f32,
    pub reason: String,
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} = {} corrected to {} ({})",
            self.field, self.original, self.corrected, self.reason
        )
    }
}

impl LayoutConfig {
    /// Returns a copy with invalid values replaced, plus the list of
    /// corrections that were applied.
    pub fn validated(&self) -> (LayoutConfig, Vec<ConfigWarning>) {
        let defaults = LayoutConfig::default();
        let mut config = self.clone();
        let mut warnings = Vec::new();

        let mut positive = |field: &str, value: &mut f32, fallback: f32| {
            if !value.is_finite() || *value <= 0.0 {
                warnings.push(ConfigWarning {
                    field: field.to_string(),
                    original: *value,
                    corrected: fallback,
                    reason: "must be positive".to_string(),
                });
                *value = fallback;
            }
        };
        positive("node_width", &mut config.node_width, defaults.node_width);
        positive("node_height", &mut config.node_height, defaults.node_height);
        positive("layer_spacing", &mut config.layer_spacing, defaults.layer_spacing);

        for (field, value) in [
            ("node_spacing", &mut config.node_spacing),
            ("isolated_spacing", &mut config.isolated_spacing),
            ("min_node_node", &mut config.min_node_node),
            ("min_node_edge", &mut config.min_node_edge),
            ("min_edge_edge", &mut config.min_edge_edge),
            ("min_layer_layer", &mut config.min_layer_layer),
            ("node_margin", &mut config.node_margin),
            ("min_gap", &mut config.min_gap),
        ] {
            if !value.is_finite() || *value < 0.0 {
                warnings.push(ConfigWarning {
                    field: field.to_string(),
                    original: *value,
                    corrected: 0.0,
                    reason: "must not be negative".to_string(),
                });
                *value = 0.0;
            }
        }

        if config.node_margin < config.min_node_edge {
            warnings.push(ConfigWarning {
                field: "node_margin".to_string(),
                original: config.node_margin,
                corrected: config.min_node_edge,
                reason: "smaller than min_node_edge".to_string(),
            });
            config.node_margin = config.min_node_edge;
        }

        // Ports need room between the two insets.
        let shortest_side = config.node_width.min(config.node_height);
        if config.node_margin * 2.0 >= shortest_side {
            let corrected = shortest_side * 0.25;
            warnings.push(ConfigWarning {
                field: "node_margin".to_string(),
                original: config.node_margin,
                corrected,
                reason: "leaves no room for ports".to_string(),
            });
            config.node_margin = corrected;
        }

        config.nudge_damping = config.nudge_damping.clamp(0.0, 1.0);
        if !(0.0..1.0).contains(&config.crossing_threshold) {
            config.crossing_threshold = defaults.crossing_threshold;
        }

        for warning in &warnings {
            log::warn!("layout config: {warning}");
        }
        (config, warnings)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    pub style: RoutingStyle,
    pub grid_size: f32,
    pub node_padding: f32,
    pub bend_penalty: f32,
    pub crossing_penalty: f32,
    pub proximity_penalty: f32,
    pub proximity_decay: f32,
    pub proximity_cutoff: f32,
    /// Weight of the cross-product term added to the A* heuristic.
    pub tiebreak_weight: f32,
    pub max_bends: usize,
    pub max_iterations: usize,
    pub time_budget_ms: u64,
    pub roi_padding: f32,
    pub max_cells: usize,
    pub enable_caching: bool,
    pub enable_smoothing: bool,
    pub corner_radius: f32,
    pub enforce_monotonic: bool,
    pub use_visibility_graph: bool,
    pub parallel_spacing: f32,
    pub bidirectional_factor: f32,
    pub max_parallel_spread: usize,
    pub port_stub: f32,
    pub min_clear: f32,
    pub snap_grid: f32,
    pub lane_spacing: f32,
    pub band_router: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            style: RoutingStyle::Orthogonal,
            grid_size: 10.0,
            node_padding: 10.0,
            bend_penalty: 5.0,
            crossing_penalty: 10.0,
            proximity_penalty: 3.0,
            proximity_decay: 20.0,
            proximity_cutoff: 50.0,
            tiebreak_weight: 0.001,
            max_bends: 10,
            max_iterations: 50_000,
            time_budget_ms: 2_000,
            roi_padding: 200.0,
            max_cells: 1_000_000,
            enable_caching: true,
            enable_smoothing: false,
            corner_radius: 8.0,
            enforce_monotonic: false,
            use_visibility_graph: false,
            parallel_spacing: 12.0,
            bidirectional_factor: 1.5,
            max_parallel_spread: 5,
            port_stub: 16.0,
            min_clear: 12.0,
            snap_grid: 16.0,
            lane_spacing: 16.0,
            band_router: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    pub width: f32,
    pub height: f32,
    pub padding: f32,
    pub background: String,
    pub node_fill: String,
    pub node_stroke: String,
    pub edge_color: String,
    pub feedback_color: String,
    pub fallback_color: String,
    pub font_family: String,
    pub font_size: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 1200.0,
            height: 800.0,
            padding: 40.0,
            background: "#ffffff".to_string(),
            node_fill: "#eef3fb".to_string(),
            node_stroke: "#4a6fa5".to_string(),
            edge_color: "#333333".to_string(),
            feedback_color: "#c0392b".to_string(),
            fallback_color: "#999999".to_string(),
            font_family: "sans-serif".to_string(),
            font_size: 13.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub layout: LayoutConfig,
    pub routing: RoutingConfig,
    pub render: RenderConfig,
}

#[derive(Debug, Default, Deserialize)]
struct LayoutConfigFile {
    direction: Option<String>,
    layer_spacing: Option<f32>,
    node_spacing: Option<f32>,
    isolated_spacing: Option<f32>,
    min_node_node: Option<f32>,
    min_node_edge: Option<f32>,
    min_edge_edge: Option<f32>,
    min_layer_layer: Option<f32>,
    node_width: Option<f32>,
    node_height: Option<f32>,
    node_margin: Option<f32>,
    min_gap: Option<f32>,
    sink_layers: Option<bool>,
    crossing_rounds: Option<usize>,
    crossing_threshold: Option<f32>,
    nudge_passes: Option<usize>,
    nudge_damping: Option<f32>,
    greedy_iterations: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct RoutingConfigFile {
    style: Option<RoutingStyle>,
    grid_size: Option<f32>,
    node_padding: Option<f32>,
    bend_penalty: Option<f32>,
    crossing_penalty: Option<f32>,
    proximity_penalty: Option<f32>,
    proximity_decay: Option<f32>,
    proximity_cutoff: Option<f32>,
    tiebreak_weight: Option<f32>,
    max_bends: Option<usize>,
    max_iterations: Option<usize>,
    time_budget_ms: Option<u64>,
    roi_padding: Option<f32>,
    max_cells: Option<usize>,
    enable_caching: Option<bool>,
    enable_smoothing: Option<bool>,
    corner_radius: Option<f32>,
    enforce_monotonic: Option<bool>,
    use_visibility_graph: Option<bool>,
    parallel_spacing: Option<f32>,
    bidirectional_factor: Option<f32>,
    max_parallel_spread: Option<usize>,
    port_stub: Option<f32>,
    min_clear: Option<f32>,
    snap_grid: Option<f32>,
    lane_spacing: Option<f32>,
    band_router: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct RenderConfigFile {
    width: Option<f32>,
    height: Option<f32>,
    padding: Option<f32>,
    background: Option<String>,
    node_fill: Option<String>,
    node_stroke: Option<String>,
    edge_color: Option<String>,
    feedback_color: Option<String>,
    fallback_color: Option<String>,
    font_family: Option<String>,
    font_size: Option<f32>,
}

/// On-disk configuration. `visualization_params` is the key the planning
/// application persists layout settings under; other application sections
/// are ignored.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ConfigFile {
    layout: Option<LayoutConfigFile>,
    visualization_params: Option<LayoutConfigFile>,
    routing: Option<RoutingConfigFile>,
    render: Option<RenderConfigFile>,
}

impl LayoutConfigFile {
    fn apply(self, config: &mut LayoutConfig) -> anyhow::Result<()> {
        if let Some(v) = self.direction {
            config.direction = Direction::from_token(v.trim())
                .ok_or_else(|| anyhow::anyhow!("unknown layout direction '{v}'"))?;
        }
        if let Some(v) = self.layer_spacing {
            config.layer_spacing = v;
        }
        if let Some(v) = self.node_spacing {
            config.node_spacing = v;
        }
        if let Some(v) = self.isolated_spacing {
            config.isolated_spacing = v;
        }
        if let Some(v) = self.min_node_node {
            config.min_node_node = v;
        }
        if let Some(v) = self.min_node_edge {
            config.min_node_edge = v;
        }
        if let Some(v) = self.min_edge_edge {
            config.min_edge_edge = v;
        }
        if let Some(v) = self.min_layer_layer {
            config.min_layer_layer = v;
        }
        if let Some(v) = self.node_width {
            config.node_width = v;
        }
        if let Some(v) = self.node_height {
            config.node_height = v;
        }
        if let Some(v) = self.node_margin {
            config.node_margin = v;
        }
        if let Some(v) = self.min_gap {
            config.min_gap = v;
        }
        if let Some(v) = self.sink_layers {
            config.sink_layers = v;
        }
        if let Some(v) = self.crossing_rounds {
            config.crossing_rounds = v;
        }
        if let Some(v) = self.crossing_threshold {
            config.crossing_threshold = v;
        }
        if let Some(v) = self.nudge_passes {
            config.nudge_passes = v;
        }
        if let Some(v) = self.nudge_damping {
            config.nudge_damping = v;
        }
        if let Some(v) = self.greedy_iterations {
            config.greedy_iterations = v;
        }
        Ok(())
    }
}

impl RoutingConfigFile {
    fn apply(self, config: &mut RoutingConfig) {
        if let Some(v) = self.style {
            config.style = v;
        }
        if let Some(v) = self.grid_size {
            config.grid_size = v;
        }
        if let Some(v) = self.node_padding {
            config.node_padding = v;
        }
        if let Some(v) = self.bend_penalty {
            config.bend_penalty = v;
        }
        if let Some(v) = self.crossing_penalty {
            config.crossing_penalty = v;
        }
        if let Some(v) = self.proximity_penalty {
            config.proximity_penalty = v;
        }
        if let Some(v) = self.proximity_decay {
            config.proximity_decay = v;
        }
        if let Some(v) = self.proximity_cutoff {
            config.proximity_cutoff = v;
        }
        if let Some(v) = self.tiebreak_weight {
            config.tiebreak_weight = v;
        }
        if let Some(v) = self.max_bends {
            config.max_bends = v;
        }
        if let Some(v) = self.max_iterations {
            config.max_iterations = v;
        }
        if let Some(v) = self.time_budget_ms {
            config.time_budget_ms = v;
        }
        if let Some(v) = self.roi_padding {
            config.roi_padding = v;
        }
        if let Some(v) = self.max_cells {
            config.max_cells = v;
        }
        if let Some(v) = self.enable_caching {
            config.enable_caching = v;
        }
        if let Some(v) = self.enable_smoothing {
            config.enable_smoothing = v;
        }
        if let Some(v) = self.corner_radius {
            config.corner_radius = v;
        }
        if let Some(v) = self.enforce_monotonic {
            config.enforce_monotonic = v;
        }
        if let Some(v) = self.use_visibility_graph {
            config.use_visibility_graph = v;
        }
        if let Some(v) = self.parallel_spacing {
            config.parallel_spacing = v;
        }
        if let Some(v) = self.bidirectional_factor {
            config.bidirectional_factor = v;
        }
        if let Some(v) = self.max_parallel_spread {
            config.max_parallel_spread = v;
        }
        if let Some(v) = self.port_stub {
            config.port_stub = v;
        }
        if let Some(v) = self.min_clear {
            config.min_clear = v;
        }
        if let Some(v) = self.snap_grid {
            config.snap_grid = v;
        }
        if let Some(v) = self.lane_spacing {
            config.lane_spacing = v;
        }
        if let Some(v) = self.band_router {
            config.band_router = v;
        }
    }
}

impl RenderConfigFile {
    fn apply(self, config: &mut RenderConfig) {
        if let Some(v) = self.width {
            config.width = v;
        }
        if let Some(v) = self.height {
            config.height = v;
        }
        if let Some(v) = self.padding {
            config.padding = v;
        }
        if let Some(v) = self.background {
            config.background = v;
        }
        if let Some(v) = self.node_fill {
            config.node_fill = v;
        }
        if let Some(v) = self.node_stroke {
            config.node_stroke = v;
        }
        if let Some(v) = self.edge_color {
            config.edge_color = v;
        }
        if let Some(v) = self.feedback_color {
            config.feedback_color = v;
        }
        if let Some(v) = self.fallback_color {
            config.fallback_color = v;
        }
        if let Some(v) = self.font_family {
            config.font_family = v;
        }
        if let Some(v) = self.font_size {
            config.font_size = v;
        }
    }
}

impl ConfigFile {
    pub(crate) fn apply(self, config: &mut Config) -> anyhow::Result<()> {
        if let Some(section) = self.visualization_params {
            section.apply(&mut config.layout)?;
        }
        if let Some(section) = self.layout {
            section.apply(&mut config.layout)?;
        }
        if let Some(section) = self.routing {
            section.apply(&mut config.routing);
        }
        if let Some(section) = self.render {
            section.apply(&mut config.render);
        }
        Ok(())
    }
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let mut config = Config::default();
    let Some(path) = path else {
        return Ok(config);
    };

    let contents = std::fs::read_to_string(path)?;
    let parsed: ConfigFile = serde_json::from_str(&contents)?;
    parsed.apply(&mut config)?;
    Ok(config)
}

/// Overlays a JSON value (for example an inline directive) onto `config`.
pub fn merge_config_value(config: &mut Config, value: serde_json::Value) -> anyhow::Result<()> {
    let parsed: ConfigFile = serde_json::from_value(value)?;
    parsed.apply(config)
}
