use annotated_hpa::abstraction::ClusterAbstraction;
use annotated_hpa::build::Quality;
use annotated_hpa::config::BuildOptions;
use annotated_hpa::map::{Capability, Point, TileMap};
use annotated_hpa::persist;
use annotated_hpa::planner::PlanOutcome;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "annotated-hpa",
    version,
    about = "Annotated hierarchical pathfinding over grid maps"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build the cluster abstraction for a map and persist it
    Build {
        /// ASCII map file (bare glyph grid or octile header)
        #[arg(long)]
        map: PathBuf,
        /// Output SQLite database
        #[arg(long = "out-db")]
        out_db: PathBuf,
        /// Cluster side length (>= 2)
        #[arg(long = "cluster-size")]
        cluster_size: Option<u32>,
        /// Abstraction quality (low|medium|high)
        #[arg(long, value_parser = parse_quality)]
        quality: Option<Quality>,
        /// Persist concrete path blobs (required for serving queries)
        #[arg(long = "store-paths")]
        store_paths: bool,
        /// Compute only, no writes
        #[arg(long = "dry-run")]
        dry_run: bool,
        /// Log level (trace|debug|info|warn|error)
        #[arg(long = "log-level")]
        log_level: Option<String>,
    },

    /// Plan a path for one agent profile
    Query {
        /// ASCII map file
        #[arg(long)]
        map: PathBuf,
        /// Saved abstraction to query; built in memory when omitted
        #[arg(long)]
        db: Option<PathBuf>,
        /// Start tile as x,y
        #[arg(long)]
        start: String,
        /// Goal tile as x,y
        #[arg(long)]
        goal: String,
        /// Agent capability, e.g. "ground" or "ground,trees"
        #[arg(long, default_value = "ground")]
        capability: String,
        /// Agent clearance in tiles
        #[arg(long, default_value_t = 1)]
        clearance: u16,
        #[arg(long = "cluster-size")]
        cluster_size: Option<u32>,
        #[arg(long, value_parser = parse_quality)]
        quality: Option<Quality>,
        /// Emit the result and statistics as JSON
        #[arg(long)]
        json: bool,
        #[arg(long = "log-level")]
        log_level: Option<String>,
    },

    /// Summarise a saved abstraction
    Info {
        #[arg(long)]
        db: PathBuf,
    },
}

fn parse_quality(s: &str) -> Result<Quality, String> {
    s.parse::<Quality>().map_err(|e| e.to_string())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Build {
            map,
            out_db,
            cluster_size,
            quality,
            store_paths,
            dry_run,
            log_level,
        } => {
            let opts = merge_options(cluster_size, quality, store_paths, log_level);
            opts.init_logging();
            let tile_map = TileMap::from_file(&map)?;
            let (aca, stats) = ClusterAbstraction::build(tile_map, &opts)?;
            println!(
                "clusters: {}  abstract nodes: {}  abstract edges: {}  cached paths: {}",
                aca.num_clusters(),
                aca.abstract_graph().num_nodes(),
                aca.abstract_graph().num_edges(),
                aca.cache_len()
            );
            println!(
                "transitions: {} emitted, {} trimmed as dominated",
                stats.entrances.entrances.transitions_emitted,
                stats.entrances.trim.edges_removed
            );
            if !dry_run {
                let mut conn = persist::open_rw(&out_db)?;
                persist::save_abstraction(&mut conn, &aca, opts.store_paths)?;
                println!("saved to {}", out_db.display());
            }
            Ok(())
        }

        Commands::Query {
            map,
            db,
            start,
            goal,
            capability,
            clearance,
            cluster_size,
            quality,
            json,
            log_level,
        } => {
            let opts = merge_options(cluster_size, quality, false, log_level);
            opts.init_logging();
            let tile_map = TileMap::from_file(&map)?;
            let mut aca = match db {
                Some(path) => {
                    let conn = persist::open_ro(&path)?;
                    persist::load_abstraction(&conn, tile_map)?
                }
                None => ClusterAbstraction::build(tile_map, &opts)?.0,
            };

            let start = parse_point(&start).context("parsing --start")?;
            let goal = parse_point(&goal).context("parsing --goal")?;
            let capability = Capability::parse_list(&capability)?;

            let outcome = aca.plan(Some(start), Some(goal), capability, clearance)?;
            if json {
                #[derive(serde::Serialize)]
                struct QueryReport<'a> {
                    outcome: &'a PlanOutcome,
                    stats: &'a annotated_hpa::QueryStats,
                }
                println!(
                    "{}",
                    serde_json::to_string_pretty(&QueryReport {
                        outcome: &outcome,
                        stats: aca.query_stats(),
                    })?
                );
            } else {
                match &outcome {
                    PlanOutcome::Unreachable => println!("unreachable"),
                    PlanOutcome::Path(p) => {
                        let tiles: Vec<String> = p.tiles.iter().map(|t| t.to_string()).collect();
                        println!("cost {:.3}: {}", p.cost, tiles.join(" "));
                    }
                }
                let stats = aca.query_stats().combined();
                println!(
                    "expanded {} touched {} peak {} in {:?}",
                    stats.nodes_expanded, stats.nodes_touched, stats.peak_memory, stats.search_time
                );
            }
            Ok(())
        }

        Commands::Info { db } => {
            let conn = persist::open_ro(&db)?;
            let count = |sql: &str| -> Result<i64> { Ok(conn.query_row(sql, [], |r| r.get(0))?) };
            let meta = |key: &str| -> Result<String> {
                Ok(conn.query_row("SELECT value FROM meta WHERE key=?1", [key], |r| r.get(0))?)
            };
            println!(
                "map {}x{}  cluster size {}  quality {}",
                meta("map_width")?,
                meta("map_height")?,
                meta("cluster_size")?,
                meta("quality")?
            );
            println!(
                "clusters {}  nodes {}  edges {}  cached paths {}",
                count("SELECT COUNT(*) FROM clusters")?,
                count("SELECT COUNT(*) FROM abstract_nodes")?,
                count("SELECT COUNT(*) FROM abstract_edges")?,
                count("SELECT COUNT(*) FROM cached_paths")?
            );
            Ok(())
        }
    }
}

fn merge_options(
    cluster_size: Option<u32>,
    quality: Option<Quality>,
    store_paths: bool,
    log_level: Option<String>,
) -> BuildOptions {
    let mut opts = BuildOptions::default();
    if let Some(s) = cluster_size {
        opts.cluster_size = s;
    }
    if let Some(q) = quality {
        opts.quality = q;
    }
    if store_paths {
        opts.store_paths = true;
    }
    if log_level.is_some() {
        opts.log_level = log_level;
    }
    // Environment overrides CLI, matching the documented precedence.
    opts.overlay_env();
    opts
}

fn parse_point(s: &str) -> Result<Point> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 2 {
        bail!("expected x,y but got {:?}", s);
    }
    let x = parts[0].trim().parse::<u32>()?;
    let y = parts[1].trim().parse::<u32>()?;
    Ok(Point::new(x, y))
}
