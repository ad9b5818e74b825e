//! rwscene CLI
//!
//! Command-line interface for inspecting, verifying and rewriting RenderWare
//! model files.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use rwscene_parsers::logging::{self, progress_span, BatchProgress, TracingConfig};
use rwscene_parsers::{
    outline, DffParser, FrameList, HumanReadable, ParseOptions, Parser as ParserTrait, RwStream,
    SplitEncoding,
};

/// rwscene - RenderWare scene graph inspection and round-trip tool
#[derive(Parser)]
#[command(name = "rwscene")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Output format for structured data
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Maximum chunk nesting depth
    #[arg(long, global = true, default_value = "32")]
    max_depth: u32,

    /// Reject files whose version stamp is not a 3.x library version
    #[arg(long, global = true)]
    strict: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {}", s)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TraversalOrder {
    DepthFirst,
    BreadthFirst,
}

impl std::str::FromStr for TraversalOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dfs" | "depth" => Ok(TraversalOrder::DepthFirst),
            "bfs" | "breadth" => Ok(TraversalOrder::BreadthFirst),
            _ => Err(format!("Unknown traversal order: {}", s)),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show a summary of a model's clump
    Info(FileArgs),

    /// Dump the chunk tree with tags, versions and sizes
    Tree(FileArgs),

    /// List the frame hierarchy
    Hierarchy(HierarchyArgs),

    /// Parse and re-serialize files, reporting any that do not reproduce
    Roundtrip(RoundtripArgs),

    /// Rebuild every material split with the given encoding
    Restrip(RestripArgs),
}

#[derive(Args)]
struct FileArgs {
    /// Path to the model file
    file: PathBuf,
}

#[derive(Args)]
struct HierarchyArgs {
    /// Path to the model file
    file: PathBuf,

    /// Traversal order: dfs or bfs
    #[arg(long, default_value = "dfs")]
    order: TraversalOrder,
}

#[derive(Args)]
struct RoundtripArgs {
    /// Model files to check
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Number of parallel worker threads (0 = all cores)
    #[arg(long, default_value = "0")]
    threads: usize,
}

#[derive(Args)]
struct RestripArgs {
    /// Input model file
    input: PathBuf,

    /// Output path
    #[arg(short, long)]
    output: PathBuf,

    /// Split encoding: list or strip
    #[arg(long, default_value = "strip")]
    encoding: String,

    /// Overwrite an existing output file
    #[arg(long)]
    overwrite: bool,
}

fn setup_logging(verbosity: u8) {
    logging::init_with_config(TracingConfig::for_verbosity(verbosity));
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let options = ParseOptions {
        max_nesting_depth: cli.max_depth,
        strict_versions: cli.strict,
        ..Default::default()
    };

    match cli.command {
        Commands::Info(args) => cmd_info(args, &options, cli.format),
        Commands::Tree(args) => cmd_tree(args, &options, cli.format),
        Commands::Hierarchy(args) => cmd_hierarchy(args, &options, cli.format),
        Commands::Roundtrip(args) => cmd_roundtrip(args, &options, cli.format),
        Commands::Restrip(args) => cmd_restrip(args, &options),
    }
}

fn read_stream(path: &Path, options: &ParseOptions) -> Result<RwStream> {
    let data = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let stream = DffParser::new()
        .parse_stream(&data, options, None)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(stream)
}

fn cmd_info(args: FileArgs, options: &ParseOptions, format: OutputFormat) -> Result<()> {
    info!("Opening model: {:?}", args.file);

    let clump = DffParser::new()
        .parse_file_with_options(&args.file, options, None)
        .context("Failed to parse model")?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&clump.to_json())?),
        OutputFormat::Text => {
            let size = fs::metadata(&args.file).map(|m| m.len()).unwrap_or(0);
            println!("{} ({})", args.file.display(), format_size(size));
            println!("{}", clump.to_readable_string());
        }
    }
    Ok(())
}

fn cmd_tree(args: FileArgs, options: &ParseOptions, format: OutputFormat) -> Result<()> {
    let data = fs::read(&args.file).context("Failed to read model")?;
    let nodes = outline(&data, options.context()).context("Failed to walk chunk tree")?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&nodes)?),
        OutputFormat::Text => {
            for node in &nodes {
                print!("{node}");
            }
            let total: usize = nodes.iter().map(|n| n.count()).sum();
            println!("\nTotal: {} chunks", total);
        }
    }
    Ok(())
}

fn hierarchy_rows(frames: &FrameList, order: &[usize]) -> Vec<serde_json::Value> {
    order
        .iter()
        .map(|&index| {
            serde_json::json!({
                "index": index,
                "parent": frames.parent(index),
                "name": frames.name(index),
                "node_id": frames.hanim(index).map(|h| h.node_id),
                "hierarchy_index": frames.hierarchy_index_for_storage_index(index),
            })
        })
        .collect()
}

fn cmd_hierarchy(args: HierarchyArgs, options: &ParseOptions, format: OutputFormat) -> Result<()> {
    let clump = DffParser::new()
        .parse_file_with_options(&args.file, options, None)
        .context("Failed to parse model")?;
    let frames = &clump.frame_list;

    let order = match args.order {
        TraversalOrder::DepthFirst => frames.depth_first_order(),
        TraversalOrder::BreadthFirst => frames.breadth_first_order(),
    };

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&hierarchy_rows(frames, &order))?);
        }
        OutputFormat::Text => {
            println!("{:<6} {:<6} {:<8} {:<6} {}", "Frame", "Parent", "NodeId", "HIdx", "Name");
            println!("{:-<6} {:-<6} {:-<8} {:-<6} {:-<30}", "", "", "", "", "");
            let dash = || "-".to_string();
            for &index in &order {
                println!(
                    "{:<6} {:<6} {:<8} {:<6} {}",
                    index,
                    frames.parent(index).map_or_else(dash, |p| p.to_string()),
                    frames.hanim(index).map_or_else(dash, |h| h.node_id.to_string()),
                    frames
                        .hierarchy_index_for_storage_index(index)
                        .map_or_else(dash, |h| h.to_string()),
                    frames.name(index).unwrap_or_default(),
                );
            }
            println!("\nTotal: {} frames", order.len());
        }
    }
    Ok(())
}

/// Outcome of re-serializing one file
#[derive(Debug, serde::Serialize)]
struct RoundtripReport {
    path: PathBuf,
    original: u64,
    rewritten: Option<u64>,
    identical: bool,
    error: Option<String>,
}

fn roundtrip_file(path: &Path, options: &ParseOptions) -> RoundtripReport {
    let original = fs::read(path);
    let result = original
        .as_ref()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .and_then(|data| {
            let stream = DffParser::new().parse_stream(data, options, None)?;
            Ok(stream.to_bytes()?)
        });
    let original_len = original.as_ref().map_or(0, |d| d.len() as u64);

    match result {
        Ok(bytes) => RoundtripReport {
            path: path.to_path_buf(),
            original: original_len,
            rewritten: Some(bytes.len() as u64),
            identical: original.as_ref().is_ok_and(|d| *d == bytes),
            error: None,
        },
        Err(e) => RoundtripReport {
            path: path.to_path_buf(),
            original: original_len,
            rewritten: None,
            identical: false,
            error: Some(format!("{e:#}")),
        },
    }
}

fn cmd_roundtrip(args: RoundtripArgs, options: &ParseOptions, format: OutputFormat) -> Result<()> {
    if args.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(args.threads)
            .build_global()
            .context("Failed to configure thread pool")?;
    }

    let total = args.files.len();
    let span = progress_span("roundtrip", total);
    let _guard = span.enter();
    let progress = BatchProgress::new(total);

    let reports: Vec<RoundtripReport> = args
        .files
        .par_iter()
        .map(|path| {
            let report = roundtrip_file(path, options);
            progress.advance();
            if let Some(error) = &report.error {
                warn!("{}: {}", path.display(), error);
            } else if !report.identical {
                warn!("{}: re-serialized bytes differ", path.display());
            } else {
                debug!("{}: ok", path.display());
            }
            report
        })
        .collect();

    let failed = reports.iter().filter(|r| !r.identical).count();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
        OutputFormat::Text => {
            for report in &reports {
                let status = match (&report.error, report.identical) {
                    (Some(_), _) => "ERROR",
                    (None, true) => "OK",
                    (None, false) => "DIFF",
                };
                let rewritten = report.rewritten.map_or_else(|| "-".to_string(), format_size);
                println!(
                    "{:<6} {:<12} {:<12} {}",
                    status,
                    format_size(report.original),
                    rewritten,
                    report.path.display()
                );
                if let Some(error) = &report.error {
                    println!("       {}", error);
                }
            }
            println!("\nTotal: {} files, {} failed", reports.len(), failed);
        }
    }

    if failed > 0 {
        bail!("{} of {} files did not round-trip", failed, reports.len());
    }
    Ok(())
}

fn cmd_restrip(args: RestripArgs, options: &ParseOptions) -> Result<()> {
    let encoding = match args.encoding.to_lowercase().as_str() {
        "list" => SplitEncoding::List,
        "strip" => SplitEncoding::Strip,
        other => bail!("Unknown encoding: {}", other),
    };
    if args.output.exists() && !args.overwrite {
        bail!("{} already exists (use --overwrite)", args.output.display());
    }

    let mut stream = read_stream(&args.input, options)?;
    let mut rebuilt = 0;
    for clump in stream.clumps_mut() {
        rebuilt += clump
            .rebuild_material_splits(encoding)
            .context("Failed to rebuild material splits")?;
    }
    if rebuilt == 0 {
        warn!("No geometry in {} could be rebuilt", args.input.display());
    }

    let bytes = stream.to_bytes().context("Failed to serialize model")?;
    fs::write(&args.output, &bytes)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    info!("Rebuilt {} geometries", rebuilt);
    println!(
        "Wrote {} ({}, {} geometries rebuilt)",
        args.output.display(),
        format_size(bytes.len() as u64),
        rebuilt
    );
    Ok(())
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
