#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod events;
pub mod ir;
pub mod layout;
pub mod layout_dump;
pub mod logging;
pub mod parser;
pub mod render;
pub mod routing;
pub mod session;

#[cfg(feature = "cli")]
pub use cli::run;
pub use config::{Config, LayoutConfig, RenderConfig, RoutingConfig, load_config};
pub use ir::{Direction, Graph};
pub use layout::{Layout, LayoutError, compute_layout};
pub use parser::{ParseError, parse_graph};
pub use render::render_svg;
pub use routing::{RoutedEdge, Router, RoutingRequest, RoutingResult, RoutingStyle};
pub use session::Session;
