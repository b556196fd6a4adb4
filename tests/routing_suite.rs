use std::path::Path;

use dsm_layout::config::{Config, RoutingConfig};
use dsm_layout::ir::{Direction, Graph};
use dsm_layout::routing::bands::{BandEdge, BandSpec, route_tb_bands};
use dsm_layout::routing::geometry::{Point, Rect};
use dsm_layout::routing::optimize::{is_manhattan, simplify};
use dsm_layout::routing::{Router, RoutingRequest, RoutingStyle};
use dsm_layout::{Session, parse_graph};

fn fixture_session(name: &str, tweak: impl FnOnce(&mut Config)) -> Session {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    let input = std::fs::read_to_string(&path).expect("fixture read failed");
    let parsed = parse_graph(&input).expect("parse failed");
    let mut config = Config::default();
    if let Some(direction) = parsed.direction {
        config.layout.direction = direction;
    }
    tweak(&mut config);
    Session::new(parsed.graph, config).expect("layout failed")
}

/// Samples every segment and reports the first point strictly inside `rect`.
fn sampled_intrusion(points: &[Point], rect: &Rect) -> Option<Point> {
    for pair in points.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        for step in 0..=20 {
            let t = step as f32 / 20.0;
            let p = (a.0 + (b.0 - a.0) * t, a.1 + (b.1 - a.1) * t);
            if rect.contains_strict(p) {
                return Some(p);
            }
        }
    }
    None
}

#[test]
fn stacked_boxes_connect_with_a_single_segment() {
    let top = Rect::new(100.0, 0.0, 120.0, 60.0);
    let bottom = Rect::new(100.0, 260.0, 120.0, 60.0);
    let mut router = Router::new(RoutingConfig::default());
    let result = router.route(&RoutingRequest::between_boxes(top, bottom));
    assert!(result.success);
    assert_eq!(result.points, vec![(160.0, 60.0), (160.0, 260.0)]);
    assert_eq!(result.bends, 0);
    assert_eq!(result.length, 200.0);
}

#[test]
fn blocked_column_detours_around_the_obstacle() {
    let top = Rect::new(100.0, 0.0, 120.0, 60.0);
    let bottom = Rect::new(100.0, 300.0, 120.0, 60.0);
    let blocker = Rect::new(80.0, 140.0, 160.0, 60.0);
    let request = RoutingRequest::between_boxes(top, bottom).with_obstacles(vec![top, bottom, blocker]);
    let mut router = Router::new(RoutingConfig::default());
    let result = router.route(&request);

    assert!(result.success, "{result:?}");
    assert!(result.bends >= 2);
    assert_eq!(result.points.first().copied(), Some(request.source));
    assert_eq!(result.points.last().copied(), Some(request.target));
    assert!(is_manhattan(&result.points));
    assert_eq!(sampled_intrusion(&result.points, &blocker), None);
}

#[test]
fn same_query_twice_is_served_from_cache() {
    let a = Rect::new(0.0, 0.0, 120.0, 60.0);
    let b = Rect::new(400.0, 300.0, 120.0, 60.0);
    let c = Rect::new(200.0, 120.0, 120.0, 60.0);
    let request = RoutingRequest::between_boxes(a, b).with_obstacles(vec![a, b, c]);
    let mut router = Router::new(RoutingConfig::default());

    let first = router.route(&request);
    let hits_before = router.stats().cache_hits;
    let second = router.route(&request);

    assert_eq!(first.points, second.points);
    assert!(second.from_cache);
    assert_eq!(router.stats().cache_hits, hits_before + 1);

    router.clear_cache();
    let third = router.route(&request);
    assert!(!third.from_cache);
    assert_eq!(third.points, first.points);
}

#[test]
fn disabled_cache_never_hits() {
    let a = Rect::new(0.0, 0.0, 120.0, 60.0);
    let b = Rect::new(400.0, 300.0, 120.0, 60.0);
    let request = RoutingRequest::between_boxes(a, b).with_obstacles(vec![a, b]);
    let config = RoutingConfig {
        enable_caching: false,
        ..RoutingConfig::default()
    };
    let mut router = Router::new(config);
    router.route(&request);
    let second = router.route(&request);
    assert!(!second.from_cache);
    assert_eq!(router.stats().cache_hits, 0);
}

#[test]
fn simplification_is_idempotent() {
    let path = vec![
        (0.0, 0.0),
        (0.0, 10.0),
        (0.0, 40.0),
        (0.0, 40.0),
        (30.0, 40.0),
        (80.0, 40.0),
        (80.0, 90.0),
    ];
    let once = simplify(&path);
    assert_eq!(once, vec![(0.0, 0.0), (0.0, 40.0), (80.0, 40.0), (80.0, 90.0)]);
    assert_eq!(simplify(&once), once);
}

#[test]
fn every_style_keeps_exact_endpoints() {
    let a = Rect::new(0.0, 0.0, 120.0, 60.0);
    let b = Rect::new(360.0, 240.0, 120.0, 60.0);
    let wall = Rect::new(180.0, 100.0, 60.0, 120.0);
    for style in [
        RoutingStyle::Straight,
        RoutingStyle::Orthogonal,
        RoutingStyle::Octilinear,
        RoutingStyle::Polyline,
        RoutingStyle::Curved,
    ] {
        let request = RoutingRequest::between_boxes(a, b)
            .with_obstacles(vec![a, b, wall])
            .with_style(style);
        let result = Router::new(RoutingConfig::default()).route(&request);
        assert!(result.success, "{style:?}: {result:?}");
        assert_eq!(result.points[0], request.source, "{style:?}");
        assert_eq!(*result.points.last().unwrap(), request.target, "{style:?}");
        if matches!(style, RoutingStyle::Orthogonal | RoutingStyle::Curved) {
            assert!(is_manhattan(&result.points), "{style:?}: {:?}", result.points);
        }
        if style != RoutingStyle::Straight {
            assert_eq!(sampled_intrusion(&result.points, &wall), None, "{style:?}");
        }
    }
}

#[test]
fn routed_layout_edges_start_and_end_on_ports() {
    for name in ["chain.dsm", "cycles.dsm", "fanout.dsm", "dense.dsm", "plan.json"] {
        let session = fixture_session(name, |_| {});
        let layout = session.layout();
        assert_eq!(session.routes().len(), session.graph().edges.len(), "{name}");
        for route in session.routes() {
            let ports = &layout.ports[&route.key()];
            let points = &route.result.points;
            assert_eq!(points[0], ports.source, "{name}: {}->{}", route.from, route.to);
            assert_eq!(*points.last().unwrap(), ports.target, "{name}: {}->{}", route.from, route.to);
            if route.result.success {
                assert!(is_manhattan(points), "{name}: {}->{} {points:?}", route.from, route.to);
            }
            assert_eq!(route.feedback, layout.feedback_edges.contains(&route.key()));
        }
        let stats = session.router().stats();
        assert_eq!(stats.total_routes, session.routes().len());
    }
}

#[test]
fn successful_layout_routes_avoid_other_nodes() {
    let session = fixture_session("dense.dsm", |_| {});
    let layout = session.layout();
    for route in session.routes().iter().filter(|r| r.result.success) {
        for node in layout.nodes.values() {
            if node.id == route.from || node.id == route.to {
                continue;
            }
            assert_eq!(
                sampled_intrusion(&route.result.points, &node.rect()),
                None,
                "{}->{} crosses {}",
                route.from,
                route.to,
                node.id
            );
        }
    }
}

#[test]
fn band_router_assigns_distinct_lanes() {
    let spec = BandSpec::default();
    let box_at = |x: f32, y: f32| Rect::new(x - 40.0, y - 20.0, 80.0, 40.0);
    let sources = [(0.0, 20.0), (100.0, 20.0), (200.0, 20.0)];
    let targets = [(150.0, 220.0), (250.0, 220.0), (200.0, 220.0)];
    let mut rects = Vec::new();
    for &(x, y) in sources.iter().chain(&targets) {
        rects.push(box_at(x, y - if y < 100.0 { 20.0 } else { -20.0 }));
    }
    let edges: Vec<BandEdge> = sources
        .iter()
        .zip(&targets)
        .enumerate()
        .map(|(idx, (&source, &target))| BandEdge {
            source,
            target,
            obstacles: rects
                .iter()
                .enumerate()
                .filter(|(r, _)| *r != idx && *r != idx + 3)
                .map(|(_, rect)| *rect)
                .collect(),
        })
        .collect();

    let routing = route_tb_bands(&edges, &spec);
    assert_eq!(routing.paths.len(), 3);
    assert_eq!(routing.locked, vec![2]);
    assert_eq!(routing.paths[2], vec![(200.0, 20.0), (200.0, 220.0)]);
    assert!(routing.vmap_valid);
    for (idx, path) in routing.paths.iter().enumerate() {
        assert_eq!(path[0], sources[idx]);
        assert_eq!(*path.last().unwrap(), targets[idx]);
        assert!(is_manhattan(path), "{path:?}");
    }
    let (l0, l1) = (routing.lanes[&0], routing.lanes[&1]);
    assert_ne!(l0, l1);
}

#[test]
fn band_router_runs_inside_the_session() {
    let session = fixture_session("chain.dsm", |config| {
        config.layout.direction = Direction::TopBottom;
        config.routing.band_router = true;
    });
    let layout = session.layout();
    for route in session.routes() {
        let ports = &layout.ports[&route.key()];
        assert_eq!(route.result.points[0], ports.source);
        assert_eq!(*route.result.points.last().unwrap(), ports.target);
        assert!(is_manhattan(&route.result.points));
    }
    assert!(
        session
            .routes()
            .iter()
            .all(|r| r.lane.is_some() || r.result.points.len() == 2)
    );
}

#[test]
fn band_routes_never_cut_through_a_skipped_node() {
    let mut graph = Graph::new();
    for (from, to) in [("A", "B"), ("B", "C"), ("A", "C")] {
        graph.add_edge(from, to);
    }
    let mut config = Config::default();
    config.layout.direction = Direction::TopBottom;
    config.routing.band_router = true;
    let session = Session::new(graph, config).expect("layout failed");
    let layout = session.layout();

    assert_eq!(session.routes().len(), 3);
    for route in session.routes() {
        let ports = &layout.ports[&route.key()];
        assert_eq!(route.result.points[0], ports.source);
        assert_eq!(*route.result.points.last().unwrap(), ports.target);
        if !route.result.success {
            continue;
        }
        for node in layout.nodes.values() {
            if node.id == route.from || node.id == route.to {
                continue;
            }
            assert_eq!(
                sampled_intrusion(&route.result.points, &node.rect()),
                None,
                "{}->{} crosses {}",
                route.from,
                route.to,
                node.id
            );
        }
    }
}
