use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use skyway_cli::{load_obstacles, Settings};
use skyway_core::{plan_route, CancelToken, PlanRequest, PlanningMode, PsoConfig, RoutePoint};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about = "Plan an obstacle-avoiding drone route", long_about = None)]
struct Args {
    /// GeoJSON file with building footprints
    #[arg(long)]
    obstacles: Option<PathBuf>,

    /// Start position as LAT,LNG
    #[arg(long, allow_hyphen_values = true)]
    start: String,

    /// End position as LAT,LNG
    #[arg(long, allow_hyphen_values = true)]
    end: String,

    /// fast, optimized, direct or grid
    #[arg(long, default_value = "fast")]
    mode: PlanningMode,

    /// JSON file overriding swarm optimizer settings
    #[arg(long)]
    pso_config: Option<PathBuf>,

    /// Seed for the swarm optimizer
    #[arg(long)]
    seed: Option<u64>,

    /// Clearance around every building in meters
    #[arg(long)]
    safety_buffer_m: Option<f64>,

    /// Pretty-print the result
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("skyway_core=debug".parse()?),
        )
        .init();

    let args = Args::parse();
    let settings = Settings::from_env();

    let obstacles = match &args.obstacles {
        Some(path) => load_obstacles(path)?,
        None => Vec::new(),
    };

    let mut rules = settings.rules;
    if let Some(buffer) = args.safety_buffer_m {
        rules.safety_buffer_m = buffer;
    }

    let mut pso = match &args.pso_config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let config: PsoConfig = serde_json::from_str(&raw)
                .with_context(|| format!("parsing {}", path.display()))?;
            Some(config)
        }
        None => None,
    };
    if let Some(seed) = args.seed.or(settings.pso_seed) {
        pso.get_or_insert_with(PsoConfig::default).seed = Some(seed);
    }

    let start = parse_lat_lng(&args.start)?;
    let end = parse_lat_lng(&args.end)?;
    let mut request = PlanRequest::new(start, end, obstacles).with_mode(args.mode);
    request.pso = pso;
    request.rules = rules;
    request.grid = settings.grid;

    tracing::info!(
        "Planning {} route over {} obstacles",
        request.mode.as_str(),
        request.obstacles.len()
    );

    let result = plan_route(&request, &CancelToken::new()).await?;
    let json = if args.pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };
    println!("{}", json);
    Ok(())
}

fn parse_lat_lng(raw: &str) -> Result<RoutePoint> {
    let Some((lat, lng)) = raw.split_once(',') else {
        bail!("expected LAT,LNG but got '{}'", raw);
    };
    let lat: f64 = lat.trim().parse().with_context(|| format!("invalid latitude in '{}'", raw))?;
    let lng: f64 = lng.trim().parse().with_context(|| format!("invalid longitude in '{}'", raw))?;
    Ok(RoutePoint::new(lat, lng))
}
