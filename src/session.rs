use crate::config::Config;
use crate::events::{EventBus, GeometryEvent, GeometryObserver};
use crate::ir::Graph;
use crate::layout::{Layout, LayoutError, compute_layout};
use crate::routing::{RoutedEdge, Router};

/// One editing session: a graph, its current layout and routes, and the
/// router that produced them. Node moves go through the session so the
/// router and every subscriber on the bus see the same change.
#[derive(Debug)]
pub struct Session {
    graph: Graph,
    config: Config,
    layout: Layout,
    router: Router,
    bus: EventBus,
    routes: Vec<RoutedEdge>,
}

impl Session {
    pub fn new(graph: Graph, config: Config) -> Result<Self, LayoutError> {
        let layout = compute_layout(&graph, &config.layout)?;
        let mut router = Router::new(config.routing.clone()).with_direction(layout.direction);
        let routes = router.route_layout(&layout, &graph);
        Ok(Self {
            graph,
            config,
            layout,
            router,
            bus: EventBus::new(),
            routes,
        })
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn routes(&self) -> &[RoutedEdge] {
        &self.routes
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn router_mut(&mut self) -> &mut Router {
        &mut self.router
    }

    pub fn bus_mut(&mut self) -> &mut EventBus {
        &mut self.bus
    }

    /// Recomputes the layout from scratch. Pins are dropped because every
    /// port may have moved.
    pub fn relayout(&mut self) -> Result<&[RoutedEdge], LayoutError> {
        self.layout = compute_layout(&self.graph, &self.config.layout)?;
        self.notify(GeometryEvent::LayoutReplaced);
        Ok(self.reroute())
    }

    pub fn reroute(&mut self) -> &[RoutedEdge] {
        self.routes = self.router.route_layout(&self.layout, &self.graph);
        &self.routes
    }

    /// Moves a node's centre to `center`, dragging its ports along, then
    /// reroutes in the router's current mode. Returns false for an unknown
    /// id.
    pub fn move_node(&mut self, id: &str, center: (f32, f32)) -> bool {
        let Some(node) = self.layout.nodes.get_mut(id) else {
            return false;
        };
        let (dx, dy) = (center.0 - node.x, center.1 - node.y);
        node.x = center.0;
        node.y = center.1;
        let rect = node.rect();
        for (key, ports) in self.layout.ports.iter_mut() {
            if key.0 == id {
                ports.source = (ports.source.0 + dx, ports.source.1 + dy);
            }
            if key.1 == id {
                ports.target = (ports.target.0 + dx, ports.target.1 + dy);
            }
        }
        self.notify(GeometryEvent::NodeMoved {
            id: id.to_string(),
            rect,
        });
        self.reroute();
        true
    }

    fn notify(&mut self, event: GeometryEvent) {
        self.router.on_geometry_event(&event);
        self.bus.publish(&event);
    }
}
