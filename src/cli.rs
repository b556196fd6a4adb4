use crate::config::{Config, load_config, merge_config_value};
use crate::ir::Direction;
use crate::layout_dump::{LayoutDump, print_layout_dump, write_layout_dump};
use crate::logging;
use crate::parser::parse_graph;
use crate::render::{render_svg, write_output_svg};
use crate::routing::RoutingStyle;
use crate::session::Session;
use anyhow::Result;
use clap::{ArgAction, Parser, ValueEnum};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "dsml", version, about = "Layered layout and orthogonal edge routing for task graphs")]
pub struct Args {
    /// Input file (.dsm, .json, .md) or '-' for stdin
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Output file. Defaults to stdout for SVG and JSON if omitted.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(short = 'e', long = "outputFormat", value_enum, default_value = "svg")]
    pub output_format: OutputFormat,

    /// Config JSON file
    #[arg(short = 'c', long = "configFile")]
    pub config: Option<PathBuf>,

    /// Layout direction (TB or LR), overrides the document
    #[arg(short = 'd', long = "direction", value_parser = parse_direction)]
    pub direction: Option<Direction>,

    /// Edge routing style
    #[arg(short = 's', long = "style")]
    pub style: Option<RoutingStyle>,

    /// Route forward edges of a top-to-bottom layout through lane bands
    #[arg(long = "bands")]
    pub bands: bool,

    /// Width used when rasterising
    #[arg(short = 'w', long = "width", default_value_t = 1200.0)]
    pub width: f32,

    /// Height used when rasterising
    #[arg(short = 'H', long = "height", default_value_t = 800.0)]
    pub height: f32,

    /// More log output (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    /// No log output
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Svg,
    Png,
    Json,
}

impl OutputFormat {
    fn extension(self) -> &'static str {
        match self {
            OutputFormat::Svg => "svg",
            OutputFormat::Png => "png",
            OutputFormat::Json => "json",
        }
    }
}

fn parse_direction(value: &str) -> Result<Direction, String> {
    Direction::from_token(&value.to_ascii_uppercase())
        .ok_or_else(|| format!("unknown direction '{value}' (expected TB or LR)"))
}

pub fn run() -> Result<()> {
    let args = Args::parse();
    logging::init(logging::level_from_verbosity(args.verbose, args.quiet));

    let mut base_config = load_config(args.config.as_deref())?;
    base_config.render.width = args.width;
    base_config.render.height = args.height;

    let (input, is_markdown) = read_input(args.input.as_deref())?;
    let documents = if is_markdown {
        extract_dsm_blocks(&input)
    } else {
        vec![input]
    };

    if documents.is_empty() {
        return Err(anyhow::anyhow!("No task graphs found in input"));
    }

    if documents.len() == 1 {
        let session = build_session(&documents[0], &base_config, &args)?;
        return write_session(&session, args.output_format, args.output.as_deref());
    }

    let outputs = resolve_multi_outputs(args.output.as_deref(), args.output_format, documents.len())?;
    for (document, output) in documents.iter().zip(&outputs) {
        let session = build_session(document, &base_config, &args)?;
        write_session(&session, args.output_format, Some(output))?;
        log::info!("wrote {}", output.display());
    }
    Ok(())
}

/// Parses one document and lays it out. Later sources win: config file,
/// then `%%{...}%%` directives, then the document's `direction`, then flags.
fn build_session(document: &str, base_config: &Config, args: &Args) -> Result<Session> {
    let parsed = parse_graph(document)?;
    let mut config = base_config.clone();
    if let Some(init) = parsed.init_config {
        merge_config_value(&mut config, init)?;
    }
    if let Some(direction) = parsed.direction {
        config.layout.direction = direction;
    }
    apply_overrides(&mut config, args);
    Ok(Session::new(parsed.graph, config)?)
}

fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(direction) = args.direction {
        config.layout.direction = direction;
    }
    if let Some(style) = args.style {
        config.routing.style = style;
    }
    if args.bands {
        config.routing.band_router = true;
    }
}

fn write_session(session: &Session, format: OutputFormat, output: Option<&Path>) -> Result<()> {
    match format {
        OutputFormat::Svg => {
            let svg = render_svg(session.layout(), session.routes(), &session.config().render);
            write_output_svg(&svg, output)
        }
        OutputFormat::Png => write_png(session, output),
        OutputFormat::Json => {
            let dump = LayoutDump::from_layout(session.layout(), session.graph(), session.routes())
                .with_stats(session.router().stats());
            match output {
                Some(path) => write_layout_dump(path, &dump),
                None => print_layout_dump(&dump),
            }
        }
    }
}

#[cfg(feature = "png")]
fn write_png(session: &Session, output: Option<&Path>) -> Result<()> {
    let output = ensure_output(output, OutputFormat::Png)?;
    let svg = render_svg(session.layout(), session.routes(), &session.config().render);
    crate::render::write_output_png(&svg, output, &session.config().render)
}

#[cfg(not(feature = "png"))]
fn write_png(_session: &Session, _output: Option<&Path>) -> Result<()> {
    Err(anyhow::anyhow!("PNG output requires the 'png' feature"))
}

fn read_input(path: Option<&Path>) -> Result<(String, bool)> {
    if let Some(path) = path {
        if path == Path::new("-") {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            return Ok((buf, false));
        }
        let content = std::fs::read_to_string(path)?;
        let is_md = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| matches!(ext, "md" | "markdown"));
        return Ok((content, is_md));
    }

    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok((buf, false))
}

#[cfg_attr(not(feature = "png"), allow(dead_code))]
fn ensure_output(output: Option<&Path>, format: OutputFormat) -> Result<&Path> {
    output.ok_or_else(|| anyhow::anyhow!("Output path required for {} output", format.extension()))
}

/// Collects the bodies of ```` ```dsm ```` (or `~~~dsm`) fenced blocks.
fn extract_dsm_blocks(input: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut fence: Option<&str> = None;
    let mut current = Vec::new();

    for line in input.lines() {
        let trimmed = line.trim();
        match fence {
            None => fence = detect_dsm_fence(trimmed),
            Some(open) if is_fence_end(trimmed, open) => {
                blocks.push(current.join("\n"));
                current.clear();
                fence = None;
            }
            Some(_) => current.push(line),
        }
    }

    blocks
}

fn detect_dsm_fence(line: &str) -> Option<&'static str> {
    for fence in ["```", "~~~"] {
        if let Some(rest) = line.strip_prefix(fence) {
            let info = rest.trim_start_matches(&fence[..1]).trim();
            if info.split_whitespace().next() == Some("dsm") {
                return Some(fence);
            }
        }
    }
    None
}

fn is_fence_end(line: &str, fence: &str) -> bool {
    line.strip_prefix(fence).is_some_and(|rest| rest.trim().is_empty())
}

fn resolve_multi_outputs(output: Option<&Path>, format: OutputFormat, count: usize) -> Result<Vec<PathBuf>> {
    let ext = format.extension();
    let base = output.ok_or_else(|| anyhow::anyhow!("Output path required for markdown input"))?;
    if base.is_dir() {
        return Ok((1..=count).map(|idx| base.join(format!("graph-{idx}.{ext}"))).collect());
    }
    let stem = base.file_stem().and_then(|s| s.to_str()).unwrap_or("graph");
    let parent = base.parent().unwrap_or_else(|| Path::new("."));
    Ok((1..=count)
        .map(|idx| parent.join(format!("{stem}-{idx}.{ext}")))
        .collect())
}
