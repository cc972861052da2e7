use anyhow::Result;
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use skyway_cli::Settings;
use skyway_core::{
    plan_route, CancelToken, GeometryKernel, Obstacle, PlanRequest, PlanarKernel, PlanningMode,
    Point, Polygon, PsoConfig, RouteResult,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Run seeded synthetic scenarios through every planner",
    long_about = None
)]
struct Args {
    /// Number of synthetic scenarios
    #[arg(long, default_value_t = 8)]
    scenarios: usize,

    /// Seed for scenario generation and the swarm optimizer
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

#[derive(Clone)]
struct StressScenario {
    name: String,
    start: Point,
    end: Point,
    obstacles: Vec<Obstacle>,
}

const MODES: [PlanningMode; 4] = [
    PlanningMode::Direct,
    PlanningMode::Fast,
    PlanningMode::Grid,
    PlanningMode::Optimized,
];

const ANCHORS: [(&str, f64, f64); 4] = [
    ("Irvine", 33.6846, -117.8255),
    ("Santa Ana", 33.7456, -117.8678),
    ("Anaheim", 33.8353, -117.9145),
    ("Long Beach", 33.7701, -118.1937),
];

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("skyway_core=warn".parse()?),
        )
        .init();

    let args = Args::parse();
    let settings = Settings::from_env();
    let mut rng = StdRng::seed_from_u64(args.seed);

    let mut failures = 0usize;
    for index in 0..args.scenarios {
        let scenario = synthetic_scenario(index, &mut rng);
        println!("\n=== {} ({} buildings) ===", scenario.name, scenario.obstacles.len());

        for mode in MODES {
            let obstacles = scenario.obstacles.clone();
            let (start, end) = (scenario.start.into(), scenario.end.into());
            let mut request = PlanRequest::new(start, end, obstacles)
                .with_mode(mode)
                .with_pso(PsoConfig {
                    seed: Some(args.seed.wrapping_add(index as u64)),
                    ..PsoConfig::default()
                });
            request.rules = settings.rules;
            request.grid = settings.grid;

            let result = match plan_route(&request, &CancelToken::new()).await {
                Ok(result) => result,
                Err(err) => {
                    println!("[{}] Result: FAIL ({})", mode.as_str(), err);
                    failures += 1;
                    continue;
                }
            };

            println!(
                "[{}] planner={} points={} distance={:.3}km duration={:.1}min safe={}",
                mode.as_str(),
                result.planner,
                result.waypoints.len(),
                result.distance_km,
                result.estimated_duration_min,
                result.is_safe
            );

            let violations = find_hazard_violations(&request, &result);
            if !result.is_safe {
                println!("Hazard check: SKIP (route reported unsafe)");
            } else if violations.is_empty() {
                println!("Hazard check: PASS");
            } else {
                failures += 1;
                println!("Hazard check: FAIL ({})", violations.len());
                for violation in violations {
                    println!(" - {}", violation);
                }
            }
        }
    }

    println!("\n{} scenarios, {} failures", args.scenarios, failures);
    if failures > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// A block of rectangular buildings between two points about 1-2 km apart
/// near one of the anchor cities.
fn synthetic_scenario(index: usize, rng: &mut StdRng) -> StressScenario {
    let (city, lat, lng) = ANCHORS[index % ANCHORS.len()];
    let kernel = PlanarKernel::new(Point::new(lat, lng));
    let half_span = rng.random_range(500.0..1000.0);
    let start = kernel.unproject((-half_span, rng.random_range(-150.0..150.0)));
    let end = kernel.unproject((half_span, rng.random_range(-150.0..150.0)));

    let count = rng.random_range(1..8);
    let obstacles = (0..count)
        .map(|n| {
            let cx = rng.random_range(-0.7 * half_span..0.7 * half_span);
            let cy = rng.random_range(-250.0..250.0);
            let hw = rng.random_range(10.0..60.0);
            let hh = rng.random_range(10.0..60.0);
            let footprint = Polygon::new(vec![
                kernel.unproject((cx - hw, cy - hh)),
                kernel.unproject((cx + hw, cy - hh)),
                kernel.unproject((cx + hw, cy + hh)),
                kernel.unproject((cx - hw, cy + hh)),
            ]);
            Obstacle::named(format!("{} block {}", city, n + 1), footprint)
        })
        .collect();

    StressScenario {
        name: format!("{} #{}", city, index + 1),
        start,
        end,
        obstacles,
    }
}

/// Footprints a route crosses or passes closer than the safety buffer.
fn find_hazard_violations(request: &PlanRequest, result: &RouteResult) -> Vec<String> {
    if result.waypoints.len() < 2 || request.obstacles.is_empty() {
        return Vec::new();
    }

    let kernel = PlanarKernel::centered_on(request.start.point(), request.end.point());
    let clearance_km = request.rules.safety_buffer_km();
    let mut violations = Vec::new();
    for (idx, obstacle) in request.obstacles.iter().enumerate() {
        let name = obstacle.name.clone().unwrap_or_else(|| format!("obstacle {}", idx));
        let closest = result
            .waypoints
            .windows(2)
            .map(|segment| {
                kernel.distance_segment_to_polygon(segment[0], segment[1], &obstacle.footprint)
            })
            .fold(f64::INFINITY, f64::min);
        // 1% slack for the polygonal buffer approximation.
        if closest < clearance_km * 0.99 {
            violations.push(format!(
                "{} within {:.0}m (needs {:.0}m)",
                name,
                closest * 1000.0,
                request.rules.safety_buffer_m
            ));
        }
    }
    violations
}
