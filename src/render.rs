use crate::config::RenderConfig;
use crate::layout::Layout;
use crate::routing::RoutedEdge;
use crate::routing::geometry::Rect;
use crate::routing::optimize::commands_to_svg_path;
use anyhow::Result;
use std::fmt::Write as _;
use std::path::Path;

/// Rough glyph advance as a fraction of the font size.
const CHAR_WIDTH_RATIO: f32 = 0.6;
const LABEL_PAD_X: f32 = 6.0;
const LABEL_PAD_Y: f32 = 4.0;

pub fn render_svg(layout: &Layout, routes: &[RoutedEdge], config: &RenderConfig) -> String {
    let bounds = routes
        .iter()
        .flat_map(|r| r.result.points.iter())
        .fold(layout.bounds(), |acc, p| {
            let dot = Rect::new(p.0, p.1, 0.0, 0.0);
            Some(acc.map_or(dot, |b| b.union(&dot)))
        });
    let (min_x, min_y, content_w, content_h) = bounds.map_or((0.0, 0.0, 0.0, 0.0), |b| (b.x, b.y, b.width, b.height));
    let pad = config.padding;
    let width = (content_w + pad * 2.0).max(200.0);
    let height = (content_h + pad * 2.0).max(200.0);

    let mut svg = String::new();
    let _ = write!(
        svg,
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{width:.0}\" height=\"{height:.0}\" viewBox=\"0 0 {width:.2} {height:.2}\">",
    );
    let _ = write!(svg, "<rect width=\"100%\" height=\"100%\" fill=\"{}\"/>", config.background);

    svg.push_str("<defs>");
    for (id, color) in [
        ("arrow", &config.edge_color),
        ("arrow-feedback", &config.feedback_color),
        ("arrow-fallback", &config.fallback_color),
    ] {
        let _ = write!(
            svg,
            "<marker id=\"{id}\" viewBox=\"0 0 10 10\" refX=\"10\" refY=\"5\" markerWidth=\"6\" markerHeight=\"6\" orient=\"auto-start-reverse\"><path d=\"M 0 0 L 10 5 L 0 10 z\" fill=\"{color}\"/></marker>",
        );
    }
    svg.push_str("</defs>");
    let _ = write!(svg, "<g transform=\"translate({:.2} {:.2})\">", pad - min_x, pad - min_y);

    let mut occupied: Vec<(f32, f32, f32, f32)> = Vec::new();
    for route in routes {
        let d = match &route.result.commands {
            Some(commands) => commands_to_svg_path(commands),
            None => points_to_path(&route.result.points),
        };
        let (color, marker, dash) = if !route.result.success {
            (&config.fallback_color, "arrow-fallback", " stroke-dasharray=\"4 4\"")
        } else if route.feedback {
            (&config.feedback_color, "arrow-feedback", " stroke-dasharray=\"8 4\"")
        } else {
            (&config.edge_color, "arrow", "")
        };
        let _ = write!(
            svg,
            "<path d=\"{d}\" fill=\"none\" stroke=\"{color}\" stroke-width=\"1.4\"{dash} marker-end=\"url(#{marker})\"/>",
        );

        if let Some(label) = &route.label {
            let (x, y) = place_label(edge_midpoint(&route.result.points), label, config.font_size, &mut occupied);
            let w = label.chars().count() as f32 * config.font_size * CHAR_WIDTH_RATIO;
            let _ = write!(
                svg,
                "<rect x=\"{:.2}\" y=\"{:.2}\" width=\"{:.2}\" height=\"{:.2}\" rx=\"4\" ry=\"4\" fill=\"{}\" stroke=\"{}\" stroke-width=\"0.8\"/>",
                x - w / 2.0 - LABEL_PAD_X,
                y - config.font_size / 2.0 - LABEL_PAD_Y,
                w + LABEL_PAD_X * 2.0,
                config.font_size + LABEL_PAD_Y * 2.0,
                config.background,
                color
            );
            let _ = write!(
                svg,
                "<text x=\"{x:.2}\" y=\"{:.2}\" text-anchor=\"middle\" font-family=\"{}\" font-size=\"{}\" fill=\"{}\">{}</text>",
                y + config.font_size * 0.35,
                config.font_family,
                config.font_size,
                color,
                escape_xml(label)
            );
        }
    }

    for node in layout.nodes.values() {
        let rect = node.rect();
        let _ = write!(
            svg,
            "<rect x=\"{:.2}\" y=\"{:.2}\" width=\"{:.2}\" height=\"{:.2}\" rx=\"6\" ry=\"6\" fill=\"{}\" stroke=\"{}\" stroke-width=\"1.4\"/>",
            rect.x, rect.y, rect.width, rect.height, config.node_fill, config.node_stroke
        );
        let text = node.name.as_deref().unwrap_or(&node.id);
        let _ = write!(
            svg,
            "<text x=\"{:.2}\" y=\"{:.2}\" text-anchor=\"middle\" font-family=\"{}\" font-size=\"{}\" fill=\"{}\">{}</text>",
            node.x,
            node.y + config.font_size * 0.35,
            config.font_family,
            config.font_size,
            config.edge_color,
            escape_xml(text)
        );
    }

    svg.push_str("</g></svg>");
    svg
}

fn points_to_path(points: &[(f32, f32)]) -> String {
    let mut d = String::new();
    for (idx, point) in points.iter().enumerate() {
        let cmd = if idx == 0 { "M" } else { " L" };
        let _ = write!(d, "{cmd} {:.2} {:.2}", point.0, point.1);
    }
    d
}

/// Middle of the middle segment, which for a V-H-V route is the centre of
/// the horizontal run.
fn edge_midpoint(points: &[(f32, f32)]) -> (f32, f32) {
    match points.len() {
        0 => (0.0, 0.0),
        1 => points[0],
        n => {
            let i = (n - 1) / 2;
            let (a, b) = (points[i], points[i + 1]);
            ((a.0 + b.0) / 2.0, (a.1 + b.1) / 2.0)
        }
    }
}

/// Pushes a label down until it no longer overlaps one placed earlier,
/// giving up after a few tries.
fn place_label(
    (mid_x, mid_y): (f32, f32),
    label: &str,
    font_size: f32,
    occupied: &mut Vec<(f32, f32, f32, f32)>,
) -> (f32, f32) {
    let w = label.chars().count() as f32 * font_size * CHAR_WIDTH_RATIO + LABEL_PAD_X * 2.0;
    let h = font_size + LABEL_PAD_Y * 2.0;
    let mut offset = 0.0;
    for _ in 0..6 {
        let y = mid_y + offset;
        let rect = (mid_x - w / 2.0, y - h / 2.0, w, h);
        if !collides(&rect, occupied) {
            occupied.push(rect);
            return (mid_x, y);
        }
        offset += h + 4.0;
    }
    (mid_x, mid_y)
}

fn collides(rect: &(f32, f32, f32, f32), occupied: &[(f32, f32, f32, f32)]) -> bool {
    occupied
        .iter()
        .any(|(x, y, w, h)| rect.0 < x + w && rect.0 + rect.2 > *x && rect.1 < y + h && rect.1 + rect.3 > *y)
}

pub fn write_output_svg(svg: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => std::fs::write(path, svg)?,
        None => print!("{svg}"),
    }
    Ok(())
}

#[cfg(feature = "png")]
pub fn write_output_png(svg: &str, output: &Path, config: &RenderConfig) -> Result<()> {
    let mut opt = usvg::Options::default();
    opt.font_family = config.font_family.clone();
    if let Some(size) = usvg::Size::from_wh(config.width, config.height) {
        opt.default_size = size;
    }

    let tree = usvg::Tree::from_str(svg, &opt)?;
    let size = tree.size().to_int_size();
    let mut pixmap = resvg::tiny_skia::Pixmap::new(size.width(), size.height())
        .ok_or_else(|| anyhow::anyhow!("Failed to allocate pixmap"))?;

    let mut pixmap_mut = pixmap.as_mut();
    resvg::render(&tree, resvg::tiny_skia::Transform::default(), &mut pixmap_mut);
    pixmap.save_png(output)?;
    Ok(())
}

pub fn escape_xml(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::ir::Graph;
    use crate::session::Session;

    #[test]
    fn render_svg_basic() {
        let mut graph = Graph::new();
        graph.ensure_node("A", Some("Alpha & Co".to_string()));
        graph.ensure_node("B", Some("Beta".to_string()));
        graph.add_edge("A", "B");
        graph.add_edge("B", "A");
        let session = Session::new(graph, Config::default()).unwrap();
        let svg = render_svg(session.layout(), session.routes(), &session.config().render);
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("Alpha &amp; Co"));
        assert!(svg.contains("url(#arrow-feedback)"));
        assert!(svg.ends_with("</svg>"));
    }

    #[test]
    fn labels_do_not_stack() {
        let mut occupied = Vec::new();
        let first = place_label((0.0, 0.0), "×3", 12.0, &mut occupied);
        let second = place_label((0.0, 0.0), "×3", 12.0, &mut occupied);
        assert_eq!(first, (0.0, 0.0));
        assert!(second.1 > first.1);
    }

    #[test]
    fn midpoint_of_three_segment_route() {
        let pts = [(0.0, 0.0), (0.0, 50.0), (100.0, 50.0), (100.0, 100.0)];
        assert_eq!(edge_midpoint(&pts), (50.0, 50.0));
    }
}
