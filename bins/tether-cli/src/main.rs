// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Tether CLI
//!
//! Drives a Tether graph kept as a JSON snapshot on disk: ingest JSON-lines
//! link streams through the coalescing pipeline, link single edges, read
//! nearest neighbors, traverse, count and delete. Results go to stdout as
//! JSON; logs go to stderr.

mod snapshot;

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use regex::Regex;
use serde::Serialize;
use tether_config::ConfigService;
use tether_config_fs::FsConfigStore;
use tether_core::{
    ClosestRequest, CoalesceOptions, CoalesceReport, Direction, DistanceRange, EdgeRequest, Graph,
    GraphSettings, HopJob, LinkInput, LinkRequest, MemoryEdgeStore, NodeRequest, TraverseRequest,
};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "tether", version, about = "Weighted link graph over a JSON store snapshot")]
struct Cli {
    /// Store snapshot (JSON array of rows); created on first write
    #[arg(long, global = true, default_value = "tether-store.json")]
    store: PathBuf,

    /// Config directory; the platform config dir when omitted
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Namespace to work in
    #[arg(short, long, global = true, default_value = "default")]
    namespace: String,

    /// Log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

/// Entity and direction selectors shared by several commands.
#[derive(Args, Debug)]
struct EdgeKind {
    /// Edge kind; the configured default entity when omitted
    #[arg(long)]
    entity: Option<String>,

    /// Row direction (IN or OUT); undirected when omitted
    #[arg(long)]
    direction: Option<Direction>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Coalesce a JSON-lines stream of links and write them
    Ingest {
        /// Input file; stdin when omitted or `-`
        input: Option<PathBuf>,
        /// Entity for lines that carry none
        #[arg(long)]
        entity: Option<String>,
        /// Flush fan-out
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Create or strengthen one edge
    Link {
        /// Origin node
        from: String,
        /// Target node
        to: String,
        #[command(flatten)]
        kind: EdgeKind,
        /// Association weight scaled by the decay step
        #[arg(long)]
        distance: Option<f64>,
        /// Set the distance outright
        #[arg(long, conflicts_with = "distance")]
        absolute: Option<f64>,
    },
    /// Nearest neighbors of a node
    Closest {
        /// Node whose neighbors are read
        from: String,
        #[command(flatten)]
        kind: EdgeKind,
        /// Smallest distance kept
        #[arg(long)]
        min: Option<f64>,
        /// Largest distance kept
        #[arg(long)]
        max: Option<f64>,
        /// Maximum neighbors
        #[arg(long)]
        limit: Option<usize>,
        /// Farthest first
        #[arg(long)]
        desc: bool,
    },
    /// Multi-hop path search
    Traverse {
        /// Start node
        from: String,
        /// Number of hops
        #[arg(long, default_value_t = 1)]
        hops: usize,
        #[command(flatten)]
        kind: EdgeKind,
        /// Neighbors kept per node and hop
        #[arg(long)]
        limit: Option<usize>,
        /// Shortest path kept, in edges
        #[arg(long, default_value_t = 1)]
        min_path: usize,
        /// Longest path kept, in edges; the hop count when omitted
        #[arg(long)]
        max_path: Option<usize>,
        /// Keep only lengths divisible by this
        #[arg(long)]
        mod_path: Option<usize>,
        /// Keep only paths ending at a node matching this pattern
        #[arg(long)]
        terminal: Option<String>,
        /// Per-hop fan-out
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Count rows from a node
    Count {
        /// Origin node
        from: String,
        /// Restrict to one entity
        #[arg(long)]
        entity: Option<String>,
        /// Restrict to one direction (needs --entity)
        #[arg(long)]
        direction: Option<Direction>,
    },
    /// Delete one edge, or every edge from a node when TO is omitted
    Delete {
        /// Origin node
        from: String,
        /// Target node
        to: Option<String>,
        #[command(flatten)]
        kind: EdgeKind,
    },
    /// Print the effective graph settings
    Config,
}

#[derive(Serialize)]
struct Removed {
    removed: usize,
}

#[derive(Serialize)]
struct Count {
    count: usize,
}

fn init_tracing(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;
    Ok(())
}

fn load_settings(config_dir: Option<&Path>) -> Result<GraphSettings> {
    let store = match config_dir {
        Some(dir) => FsConfigStore::at(dir)?,
        None => FsConfigStore::new()?,
    };
    let service = ConfigService::new(store);
    service
        .load_or_init(GraphSettings::CONFIG_KEY)
        .context("failed to load graph settings")
}

fn emit<T: Serialize>(value: &T) -> Result<()> {
    let mut out = io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}

/// Parses JSON lines, skipping blanks. Unparseable lines are logged and counted.
fn read_links(reader: impl BufRead) -> Result<(Vec<LinkInput>, usize)> {
    let mut links = Vec::new();
    let mut unparseable = 0;
    for (index, line) in reader.lines().enumerate() {
        let line = line.context("failed to read input")?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<LinkInput>(&line) {
            Ok(link) => links.push(link),
            Err(err) => {
                unparseable += 1;
                warn!(line = index + 1, %err, "skipping unparseable line");
            }
        }
    }
    Ok((links, unparseable))
}

async fn ingest(
    graph: &Graph<MemoryEdgeStore>,
    namespace: &str,
    input: Option<&Path>,
    entity: Option<String>,
    concurrency: Option<usize>,
) -> Result<CoalesceReport> {
    let (links, unparseable) = match input {
        None => read_links(io::stdin().lock())?,
        Some(path) if path == Path::new("-") => read_links(io::stdin().lock())?,
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            read_links(BufReader::new(file))?
        }
    };
    let options = CoalesceOptions {
        namespace: Some(namespace.to_owned()),
        entity,
        concurrency,
    };
    let mut report = graph
        .process_coalesced_writes(futures_util::stream::iter(links), &options)
        .await?;
    report.received += unparseable;
    report.dropped += unparseable;
    info!(?report, "ingest finished");
    Ok(report)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let settings = load_settings(cli.config_dir.as_deref())?;
    let store = Arc::new(snapshot::load(&cli.store)?);
    let graph = Graph::new(store, settings)?;
    let entity_or_default = |entity: Option<String>| {
        entity.unwrap_or_else(|| graph.settings().default_entity.clone())
    };
    let ns = cli.namespace.as_str();

    let mutated = match cli.command {
        Command::Ingest {
            input,
            entity,
            concurrency,
        } => {
            let report = ingest(&graph, ns, input.as_deref(), entity, concurrency).await?;
            emit(&report)?;
            true
        }
        Command::Link {
            from,
            to,
            kind,
            distance,
            absolute,
        } => {
            let mut request = LinkRequest::new(ns, from, to).entity(entity_or_default(kind.entity));
            request.direction = kind.direction;
            if let Some(distance) = distance {
                request = request.distance(distance);
            }
            if let Some(absolute) = absolute {
                request = request.absolute_distance(absolute);
            }
            emit(&graph.link(request).await?)?;
            true
        }
        Command::Closest {
            from,
            kind,
            min,
            max,
            limit,
            desc,
        } => {
            let mut request = ClosestRequest::new(ns, from)
                .entity(entity_or_default(kind.entity))
                .range(DistanceRange { min, max });
            request.direction = kind.direction;
            request.limit = limit;
            request.desc = desc;
            emit(&graph.closest(&request).await?)?;
            false
        }
        Command::Traverse {
            from,
            hops,
            kind,
            limit,
            min_path,
            max_path,
            mod_path,
            terminal,
            concurrency,
        } => {
            let mut job = HopJob::new(entity_or_default(kind.entity));
            job.direction = kind.direction;
            job.limit = limit;
            let mut request = TraverseRequest::new(ns, from);
            request.jobs = vec![job; hops];
            request.min_path = min_path;
            request.max_path = max_path;
            request.mod_path = mod_path;
            request.concurrency = concurrency;
            if let Some(pattern) = terminal {
                let pattern = Regex::new(&pattern)
                    .with_context(|| format!("invalid --terminal pattern `{pattern}`"))?;
                request = request.terminal(pattern);
            }
            emit(&graph.traverse(&request).await?)?;
            false
        }
        Command::Count {
            from,
            entity,
            direction,
        } => {
            let request = NodeRequest {
                namespace: ns.to_owned(),
                from_node: from,
                entity,
                direction,
            };
            emit(&Count {
                count: graph.count(&request).await?,
            })?;
            false
        }
        Command::Delete { from, to, kind } => {
            match to {
                Some(to) => {
                    let mut request =
                        EdgeRequest::new(ns, from, to).entity(entity_or_default(kind.entity));
                    request.direction = kind.direction;
                    emit(&graph.delete(&request).await?)?;
                }
                None => {
                    let request = NodeRequest {
                        namespace: ns.to_owned(),
                        from_node: from,
                        entity: kind.entity,
                        direction: kind.direction,
                    };
                    emit(&Removed {
                        removed: graph.delete_by_node(&request).await?,
                    })?;
                }
            }
            true
        }
        Command::Config => {
            emit(graph.settings())?;
            false
        }
    };

    if mutated {
        snapshot::save(&cli.store, graph.store())?;
    }
    Ok(())
}
