//! Particle swarm over intermediate waypoints.
//!
//! Each iteration runs Evaluate -> UpdateGlobalBest -> (Terminate?) ->
//! AdaptParameters -> UpdateVelocityPosition. Particle state lives in a
//! structure-of-arrays arena indexed by particle id.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::error::{PlanError, Result};
use crate::geometry::{GeometryKernel, Point};
use crate::obstacles::ObstacleField;
use crate::spatial::{length_2d, Xy};

use super::fitness::FitnessEvaluator;
use super::refine::refine_route;
use super::PsoConfig;

/// Iterations before the early-exit quality bar is considered.
const MIN_ITERATIONS_BEFORE_EARLY_STOP: usize = 10;
/// Required direct/route length ratio for an early exit.
const EARLY_STOP_RATIO: f64 = 0.95;
/// Route length may not exceed this multiple of the direct line for an early exit.
const EARLY_STOP_MAX_STRETCH: f64 = 1.2;
const WIDEN_AFTER_STALL: usize = 50;
const GROW_AFTER_STALL: usize = 20;
/// A best that improved this recently earns a cap extension.
const RECENT_IMPROVEMENT_WINDOW: usize = 10;
/// Gains at or below this many fitness units count as a stall.
const IMPROVEMENT_EPSILON: f64 = 1e-3;
const CAP_EXTENSION: usize = 25;
/// Initial velocities stay within this fraction of the velocity cap.
const INITIAL_VELOCITY_FRACTION: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    /// The straight line was already clear; no iterations ran.
    DirectLineClear,
    /// The global best met the early-exit quality bar.
    Converged,
    /// Ran out of iterations, extensions included.
    IterationCap,
}

/// Result of one optimizer run.
#[derive(Debug, Clone)]
pub struct SwarmOutcome {
    /// Post-processed route, start and end included.
    pub route: Vec<Point>,
    pub fitness: f64,
    pub iterations_run: usize,
    pub fitness_history: Vec<f64>,
    pub stop_reason: StopReason,
    pub population: usize,
}

/// Parallel arrays of particle state; `dims` floats per particle.
#[derive(Debug, Clone)]
struct Swarm {
    dims: usize,
    positions: Vec<f64>,
    velocities: Vec<f64>,
    best_positions: Vec<f64>,
    best_fitness: Vec<f64>,
}

impl Swarm {
    fn new(dims: usize, capacity: usize) -> Self {
        Self {
            dims,
            positions: Vec::with_capacity(dims * capacity),
            velocities: Vec::with_capacity(dims * capacity),
            best_positions: Vec::with_capacity(dims * capacity),
            best_fitness: Vec::with_capacity(capacity),
        }
    }

    fn len(&self) -> usize {
        self.best_fitness.len()
    }

    fn push(&mut self, position: &[f64], velocity: &[f64]) {
        self.positions.extend_from_slice(position);
        self.velocities.extend_from_slice(velocity);
        self.best_positions.extend_from_slice(position);
        self.best_fitness.push(f64::INFINITY);
    }

    fn span(&self, id: usize) -> std::ops::Range<usize> {
        id * self.dims..(id + 1) * self.dims
    }

    fn position(&self, id: usize) -> &[f64] {
        &self.positions[self.span(id)]
    }

    fn best_position(&self, id: usize) -> &[f64] {
        &self.best_positions[self.span(id)]
    }
}

pub struct SwarmOptimizer<'a, K> {
    kernel: &'a K,
    field: &'a ObstacleField,
    evaluator: FitnessEvaluator<'a, K>,
    start: Point,
    end: Point,
    start_xy: Xy,
    end_xy: Xy,
    base: PsoConfig,
    config: PsoConfig,
    rng: StdRng,
    swarm: Swarm,
    global_best: Vec<f64>,
    global_best_fitness: f64,
    history: Vec<f64>,
    iteration: usize,
    last_improvement: usize,
    cap: usize,
}

impl<'a, K: GeometryKernel> SwarmOptimizer<'a, K> {
    pub fn new(
        kernel: &'a K,
        field: &'a ObstacleField,
        start: Point,
        end: Point,
        config: PsoConfig,
    ) -> Result<Self> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        let dims = config.waypoint_count * 2;

        let mut optimizer = Self {
            kernel,
            field,
            evaluator: FitnessEvaluator::new(kernel, field, &config),
            start,
            end,
            start_xy: kernel.project(start),
            end_xy: kernel.project(end),
            base: config,
            config,
            rng,
            swarm: Swarm::new(dims, config.effective_max_population()),
            global_best: Vec::new(),
            global_best_fitness: f64::INFINITY,
            history: Vec::with_capacity(config.max_iterations),
            iteration: 0,
            last_improvement: 0,
            cap: config.max_iterations,
        };
        optimizer.initialize();
        Ok(optimizer)
    }

    pub fn population(&self) -> usize {
        self.swarm.len()
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn global_best_fitness(&self) -> f64 {
        self.global_best_fitness
    }

    pub fn fitness_history(&self) -> &[f64] {
        &self.history
    }

    /// Parameters currently in effect, including any widening.
    pub fn config(&self) -> &PsoConfig {
        &self.config
    }

    /// Waypoints on the straight line plus uniform jitter.
    fn initialize(&mut self) {
        let n = self.base.waypoint_count;
        let jitter = self.base.init_jitter_m;
        let v0 = self.base.max_velocity_m * INITIAL_VELOCITY_FRACTION;
        let mut position = vec![0.0; self.swarm.dims];
        let mut velocity = vec![0.0; self.swarm.dims];

        for _ in 0..self.base.population_size {
            for k in 0..n {
                let t = (k + 1) as f64 / (n + 1) as f64;
                position[2 * k] = self.start_xy.0
                    + t * (self.end_xy.0 - self.start_xy.0)
                    + self.rng.random_range(-jitter..=jitter);
                position[2 * k + 1] = self.start_xy.1
                    + t * (self.end_xy.1 - self.start_xy.1)
                    + self.rng.random_range(-jitter..=jitter);
            }
            for v in velocity.iter_mut() {
                *v = self.rng.random_range(-v0..=v0);
            }
            self.swarm.push(&position, &velocity);
        }
    }

    /// New particles scattered around the current global best.
    fn grow(&mut self) {
        let room = self
            .base
            .effective_max_population()
            .saturating_sub(self.swarm.len());
        let count = (self.base.population_size / 5).max(1).min(room);
        if count == 0 || self.global_best.is_empty() {
            return;
        }

        let jitter = self.base.init_jitter_m / 2.0;
        let v0 = self.config.max_velocity_m * INITIAL_VELOCITY_FRACTION;
        let mut velocity = vec![0.0; self.swarm.dims];
        for _ in 0..count {
            let mut position = self.global_best.clone();
            for x in position.iter_mut() {
                *x += self.rng.random_range(-jitter..=jitter);
            }
            for v in velocity.iter_mut() {
                *v = self.rng.random_range(-v0..=v0);
            }
            self.swarm.push(&position, &velocity);
        }
        tracing::debug!(
            "swarm grew by {count} to {} particles at iteration {}",
            self.swarm.len(),
            self.iteration
        );
    }

    fn route_xy(&self, position: &[f64]) -> Vec<Xy> {
        let mut route = Vec::with_capacity(position.len() / 2 + 2);
        route.push(self.start_xy);
        route.extend(position.chunks_exact(2).map(|pair| (pair[0], pair[1])));
        route.push(self.end_xy);
        route
    }

    fn segment_clear(&self, a: Xy, b: Xy) -> bool {
        self.field
            .segment_is_clear(self.kernel, self.kernel.unproject(a), self.kernel.unproject(b))
    }

    fn best_is_acceptable(&self) -> bool {
        let route = self.route_xy(&self.global_best);
        let direct = length_2d(self.start_xy, self.end_xy);
        let length: f64 = route.windows(2).map(|pair| length_2d(pair[0], pair[1])).sum();
        if length <= 0.0
            || direct / length <= EARLY_STOP_RATIO
            || length > EARLY_STOP_MAX_STRETCH * direct
        {
            return false;
        }
        route.windows(2).all(|pair| self.segment_clear(pair[0], pair[1]))
    }

    /// Run one iteration. Returns the stop reason once the run is over.
    pub fn step(&mut self) -> Option<StopReason> {
        // Evaluate
        for id in 0..self.swarm.len() {
            let fitness = self.evaluator.evaluate(&self.route_xy(self.swarm.position(id)));
            if fitness < self.swarm.best_fitness[id] {
                self.swarm.best_fitness[id] = fitness;
                let span = self.swarm.span(id);
                self.swarm.best_positions[span.clone()]
                    .copy_from_slice(&self.swarm.positions[span]);
            }
        }

        // UpdateGlobalBest
        self.iteration += 1;
        let previous_best = self.global_best_fitness;
        for id in 0..self.swarm.len() {
            if self.swarm.best_fitness[id] < self.global_best_fitness {
                self.global_best_fitness = self.swarm.best_fitness[id];
                self.global_best = self.swarm.best_position(id).to_vec();
            }
        }
        if previous_best - self.global_best_fitness > IMPROVEMENT_EPSILON {
            self.last_improvement = self.iteration;
        }
        self.history.push(self.global_best_fitness);
        if self.iteration % 10 == 1 {
            tracing::debug!(
                "iteration {}: best fitness {:.2}",
                self.iteration - 1,
                self.global_best_fitness
            );
        }

        // Terminate
        if self.iteration >= MIN_ITERATIONS_BEFORE_EARLY_STOP && self.best_is_acceptable() {
            return Some(StopReason::Converged);
        }
        if self.iteration >= self.cap {
            let hard_cap = self.base.max_iterations * 2;
            let recent = self.iteration - self.last_improvement < RECENT_IMPROVEMENT_WINDOW;
            if recent && self.cap < hard_cap {
                self.cap = (self.cap + CAP_EXTENSION).min(hard_cap);
                tracing::debug!("still improving; iteration cap extended to {}", self.cap);
            } else {
                return Some(StopReason::IterationCap);
            }
        }

        // AdaptParameters
        let stalled = self.iteration - self.last_improvement;
        if stalled > 0 && stalled % WIDEN_AFTER_STALL == 0 {
            self.config = self.config.widened();
            tracing::debug!(
                "stalled {stalled} iterations; widening to w={:.2} vmax={:.0} m",
                self.config.w,
                self.config.max_velocity_m
            );
        }
        if stalled > 0 && stalled % GROW_AFTER_STALL == 0 {
            self.grow();
        }

        // UpdateVelocityPosition
        let PsoConfig {
            w,
            c1,
            c2,
            max_velocity_m,
            ..
        } = self.config;
        for id in 0..self.swarm.len() {
            for d in self.swarm.span(id) {
                let x = self.swarm.positions[d];
                let r1: f64 = self.rng.random();
                let r2: f64 = self.rng.random();
                let gbest = self
                    .global_best
                    .get(d - id * self.swarm.dims)
                    .copied()
                    .unwrap_or(x);
                let v = w * self.swarm.velocities[d]
                    + c1 * r1 * (self.swarm.best_positions[d] - x)
                    + c2 * r2 * (gbest - x);
                let v = v.clamp(-max_velocity_m, max_velocity_m);
                self.swarm.velocities[d] = v;
                self.swarm.positions[d] = x + v;
            }
        }

        None
    }

    /// Run to completion, checking `cancel` every iteration.
    pub fn run(&mut self, cancel: &CancelToken) -> Result<SwarmOutcome> {
        self.run_with_progress(cancel, |_, _| {})
    }

    /// Like [`run`](Self::run), reporting `(iteration, best_fitness)` after
    /// every iteration.
    pub fn run_with_progress<F>(
        &mut self,
        cancel: &CancelToken,
        mut progress: F,
    ) -> Result<SwarmOutcome>
    where
        F: FnMut(usize, f64),
    {
        if let Some(outcome) = self.direct_if_clear() {
            return Ok(outcome);
        }
        loop {
            if cancel.is_cancelled() {
                return Err(PlanError::Cancelled);
            }
            let reason = self.step();
            progress(self.iteration, self.global_best_fitness);
            if let Some(reason) = reason {
                return Ok(self.finish(reason));
            }
        }
    }

    /// Run to completion, yielding to the tokio scheduler every
    /// `yield_every` iterations.
    pub async fn run_async(&mut self, cancel: &CancelToken) -> Result<SwarmOutcome> {
        if let Some(outcome) = self.direct_if_clear() {
            return Ok(outcome);
        }
        let yield_every = self.base.yield_every.max(1);
        loop {
            if cancel.is_cancelled() {
                return Err(PlanError::Cancelled);
            }
            if let Some(reason) = self.step() {
                return Ok(self.finish(reason));
            }
            if self.iteration % yield_every == 0 {
                tokio::task::yield_now().await;
            }
        }
    }

    fn direct_if_clear(&self) -> Option<SwarmOutcome> {
        if !self.field.segment_is_clear(self.kernel, self.start, self.end) {
            return None;
        }
        Some(SwarmOutcome {
            route: vec![self.start, self.end],
            fitness: self.evaluator.evaluate(&[self.start_xy, self.end_xy]),
            iterations_run: 0,
            fitness_history: Vec::new(),
            stop_reason: StopReason::DirectLineClear,
            population: self.swarm.len(),
        })
    }

    fn finish(&self, stop_reason: StopReason) -> SwarmOutcome {
        let raw = self.route_xy(&self.global_best);
        let refined = refine_route(&raw, |a, b| self.segment_clear(a, b));

        let mut route: Vec<Point> = refined.iter().map(|xy| self.kernel.unproject(*xy)).collect();
        if let Some(first) = route.first_mut() {
            *first = self.start;
        }
        if let Some(last) = route.last_mut() {
            *last = self.end;
        }

        tracing::debug!(
            "swarm stopped ({stop_reason:?}) after {} iterations, fitness {:.2}, {} -> {} points",
            self.iteration,
            self.global_best_fitness,
            raw.len(),
            route.len()
        );

        SwarmOutcome {
            route,
            fitness: self.global_best_fitness,
            iterations_run: self.iteration,
            fitness_history: self.history.clone(),
            stop_reason,
            population: self.swarm.len(),
        }
    }
}
