//! Route assembly: validates a request, runs the selected planner with its
//! fallbacks, and packages the result.

use crate::cancel::CancelToken;
use crate::error::{PlanError, Result};
use crate::geometry::{PlanarKernel, Point};
use crate::grid::find_path;
use crate::heuristic::HeuristicRouter;
use crate::models::{PlanRequest, PlanningMode, Route, RouteResult, SwarmSummary};
use crate::obstacles::ObstacleField;
use crate::pso::{SwarmOptimizer, SwarmOutcome};

/// Per-request state shared by every planner.
struct PlanContext {
    kernel: PlanarKernel,
    field: ObstacleField,
    start: Point,
    end: Point,
}

/// What a planner produced before normalization and validation.
struct Planned {
    waypoints: Vec<Point>,
    planner: String,
    warnings: Vec<String>,
    swarm: Option<SwarmSummary>,
}

impl Planned {
    fn new(waypoints: Vec<Point>, planner: impl Into<String>) -> Self {
        Self {
            waypoints,
            planner: planner.into(),
            warnings: Vec::new(),
            swarm: None,
        }
    }
}

/// Plan a route, yielding to the scheduler while the swarm optimizer runs.
pub async fn plan_route(request: &PlanRequest, cancel: &CancelToken) -> Result<RouteResult> {
    let ctx = prepare(request)?;
    let planned = match request.mode {
        PlanningMode::Optimized => {
            let config = request.pso.unwrap_or_default();
            let mut optimizer =
                SwarmOptimizer::new(&ctx.kernel, &ctx.field, ctx.start, ctx.end, config)?;
            let outcome = optimizer.run_async(cancel).await?;
            with_grid_safety_net(&ctx, request, outcome, cancel)?
        }
        _ => plan_sync_modes(&ctx, request, cancel)?,
    };
    Ok(assemble(request, &ctx, planned))
}

/// Blocking variant of [`plan_route`].
pub fn plan_route_blocking(request: &PlanRequest, cancel: &CancelToken) -> Result<RouteResult> {
    let ctx = prepare(request)?;
    let planned = match request.mode {
        PlanningMode::Optimized => {
            let config = request.pso.unwrap_or_default();
            let mut optimizer =
                SwarmOptimizer::new(&ctx.kernel, &ctx.field, ctx.start, ctx.end, config)?;
            let outcome = optimizer.run(cancel)?;
            with_grid_safety_net(&ctx, request, outcome, cancel)?
        }
        _ => plan_sync_modes(&ctx, request, cancel)?,
    };
    Ok(assemble(request, &ctx, planned))
}

fn validate(request: &PlanRequest) -> Result<()> {
    for (which, point) in [("start", &request.start), ("end", &request.end)] {
        if !point.point().is_finite() {
            return Err(PlanError::NonFinitePoint {
                which,
                lat: point.lat,
                lng: point.lng,
            });
        }
    }
    request.rules.validate()?;
    request.grid.validate()?;
    if let Some(pso) = &request.pso {
        pso.validate()?;
    }
    Ok(())
}

fn prepare(request: &PlanRequest) -> Result<PlanContext> {
    validate(request)?;
    let start = request.start.point();
    let end = request.end.point();
    let kernel = PlanarKernel::centered_on(start, end);
    let safety_buffer_km = request.rules.safety_buffer_km();
    let field = ObstacleField::prepare(&kernel, &request.obstacles, safety_buffer_km);
    tracing::debug!(
        "planning {} route with {} obstacles ({} buffered)",
        request.mode.as_str(),
        request.obstacles.len(),
        field.len()
    );
    Ok(PlanContext {
        kernel,
        field,
        start,
        end,
    })
}

fn plan_sync_modes(
    ctx: &PlanContext,
    request: &PlanRequest,
    cancel: &CancelToken,
) -> Result<Planned> {
    if cancel.is_cancelled() {
        return Err(PlanError::Cancelled);
    }
    match request.mode {
        PlanningMode::Direct => Ok(Planned::new(vec![ctx.start, ctx.end], "direct")),
        PlanningMode::Fast => {
            let router = HeuristicRouter::new(&ctx.kernel, &ctx.field, request.heuristic);
            let outcome = router.route(ctx.start, ctx.end);
            Ok(Planned::new(
                outcome.waypoints,
                format!("heuristic/{}", outcome.strategy.as_str()),
            ))
        }
        PlanningMode::Grid => {
            let outcome =
                find_path(&ctx.kernel, &ctx.field, ctx.start, ctx.end, &request.grid, cancel)?;
            let mut planned = Planned::new(outcome.waypoints, "grid");
            planned.warnings.extend(outcome.errors);
            Ok(planned)
        }
        PlanningMode::Optimized => Err(PlanError::invalid_config(
            "optimized mode is handled by the swarm optimizer",
        )),
    }
}

/// Keep the swarm route when it is safe; otherwise try the grid pathfinder
/// and keep whichever route is safe.
fn with_grid_safety_net(
    ctx: &PlanContext,
    request: &PlanRequest,
    outcome: SwarmOutcome,
    cancel: &CancelToken,
) -> Result<Planned> {
    let summary = SwarmSummary {
        iterations_run: outcome.iterations_run,
        final_fitness: outcome.fitness,
        fitness_history: outcome.fitness_history,
        stop_reason: outcome.stop_reason,
        population: outcome.population,
    };

    let mut planned = Planned::new(outcome.route, "pso");
    planned.swarm = Some(summary);
    if ctx.field.route_is_safe(&ctx.kernel, &planned.waypoints) {
        return Ok(planned);
    }

    tracing::info!("swarm route is unsafe; trying grid pathfinder");
    let grid = find_path(&ctx.kernel, &ctx.field, ctx.start, ctx.end, &request.grid, cancel)?;
    if !grid.fallback && ctx.field.route_is_safe(&ctx.kernel, &grid.waypoints) {
        planned.waypoints = grid.waypoints;
        planned.planner = "pso+grid".to_string();
        planned
            .warnings
            .push("swarm route was unsafe; replaced by grid pathfinder route".to_string());
    } else {
        planned
            .warnings
            .push("swarm and grid pathfinder both failed to find a safe route".to_string());
    }
    Ok(planned)
}

fn assemble(request: &PlanRequest, ctx: &PlanContext, planned: Planned) -> RouteResult {
    let route = Route::from_polyline(ctx.start, ctx.end, &planned.waypoints);
    let is_safe = ctx.field.route_is_safe(&ctx.kernel, route.points());
    let distance_km = route.distance_km();

    let mut warnings = ctx.field.warnings().to_vec();
    warnings.extend(planned.warnings);
    if !is_safe {
        warnings.push("route crosses a building or its safety buffer".to_string());
    }

    tracing::info!(
        "{} route via {}: {} points, {:.3} km, safe={}",
        request.mode.as_str(),
        planned.planner,
        route.points().len(),
        distance_km,
        is_safe
    );

    RouteResult {
        start: request.start.clone(),
        end: request.end.clone(),
        waypoints: route.into_points(),
        distance_km,
        estimated_duration_min: distance_km * request.rules.minutes_per_km,
        is_safe,
        planner: planned.planner,
        warnings,
        swarm: planned.swarm,
    }
}
