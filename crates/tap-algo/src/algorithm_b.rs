//! Algorithm B controller.
//!
//! ```text
//!   Initializing ──▶ Iterating ──┬──▶ Converged
//!                                ├──▶ IterationLimitReached
//!                                └──▶ TimeLimitReached
//! ```
//!
//! Initialization builds one bush per origin from free-flow shortest paths and loads
//! all demand onto them. Each outer iteration then visits every origin: rebuild the
//! shortest tree under current costs, update the bush, and shift flow inside it. The
//! stopping rules are checked only at the top of an outer iteration, so a finished
//! iteration is never cut short.
//!
//! The controller keeps its bushes between [`AlgorithmB::run`] calls. Running again on
//! the same network continues from the current equilibrium instead of starting over.

use rayon::prelude::*;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tap_core::{Diagnostics, Network, TapResult};
use tracing::{debug, info, trace, warn};
use web_time::Instant;

use crate::bush::{Bush, BushUpdate};
use crate::config::{AlgorithmBConfig, SweepMode};
use crate::flow_shift::{equilibrate_bush, ShiftStats};
use crate::flows::{FlowSnapshot, OriginFlows, SharedFlows};
use crate::gap::{measure_gap, GapFunction};
use crate::shortest_path::{build_tree, ShortestPathTree};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverState {
    Initializing,
    Iterating,
    Converged,
    IterationLimitReached,
    TimeLimitReached,
}

/// Why a run stopped. Running out of iterations or time is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    Converged,
    IterationLimitReached,
    TimeLimitReached,
}

impl Termination {
    pub fn is_converged(&self) -> bool {
        matches!(self, Termination::Converged)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Termination::Converged => "converged",
            Termination::IterationLimitReached => "iteration limit reached",
            Termination::TimeLimitReached => "time limit reached",
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Termination> for SolverState {
    fn from(t: Termination) -> Self {
        match t {
            Termination::Converged => SolverState::Converged,
            Termination::IterationLimitReached => SolverState::IterationLimitReached,
            Termination::TimeLimitReached => SolverState::TimeLimitReached,
        }
    }
}

/// Gap after one outer iteration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IterationRecord {
    pub iteration: usize,
    pub gap: f64,
    pub elapsed_secs: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssignmentOutcome {
    pub termination: Termination,
    /// Outer iterations completed in this run
    pub iterations: usize,
    /// Gap at termination
    pub gap: f64,
    pub gap_function: GapFunction,
    #[serde(skip)]
    pub elapsed: Duration,
    pub history: Vec<IterationRecord>,
    pub total_system_travel_time: f64,
    pub beckmann_objective: f64,
}

impl AssignmentOutcome {
    pub fn converged(&self) -> bool {
        self.termination.is_converged()
    }
}

/// Result of one origin's work during a Jacobi sweep.
struct OriginSweep {
    /// Flow removed while pruning, applied at full weight
    pruned: Vec<f64>,
    /// Flow moved by the Newton shifts, scaled at the barrier
    shifted: Vec<f64>,
    /// Bush flows between pruning and shifting
    before: Vec<f64>,
    update: BushUpdate,
    stats: ShiftStats,
    diag: Diagnostics,
}

pub struct AlgorithmB {
    config: AlgorithmBConfig,
    bushes: Vec<Bush>,
    state: SolverState,
    /// Outer iterations over all runs
    total_iterations: usize,
}

impl AlgorithmB {
    pub fn new(config: AlgorithmBConfig) -> Self {
        Self {
            config,
            bushes: Vec::new(),
            state: SolverState::Initializing,
            total_iterations: 0,
        }
    }

    pub fn config(&self) -> &AlgorithmBConfig {
        &self.config
    }

    /// Change settings between runs. Bushes are kept.
    pub fn config_mut(&mut self) -> &mut AlgorithmBConfig {
        &mut self.config
    }

    pub fn state(&self) -> SolverState {
        self.state
    }

    pub fn bushes(&self) -> &[Bush] {
        &self.bushes
    }

    pub fn total_iterations(&self) -> usize {
        self.total_iterations
    }

    /// Iterate until a stopping rule fires. Link flows and costs in `network` hold the
    /// result afterwards.
    pub fn run(
        &mut self,
        network: &mut Network,
        diag: &mut Diagnostics,
    ) -> TapResult<AssignmentOutcome> {
        self.config.validate()?;
        let start = Instant::now();

        if self.state == SolverState::Initializing {
            self.initialize(network, diag)?;
        }
        self.state = SolverState::Iterating;

        let gap_function = self.config.gap_function;
        let mut gap = gap_function.evaluate(&measure_gap(network, &self.bushes));
        let mut history = Vec::new();
        let mut iterations = 0;
        info!(
            origins = self.bushes.len(),
            sweep = %self.config.sweep,
            gap_function = %gap_function,
            gap,
            "starting Algorithm B"
        );

        let termination = loop {
            if gap < self.config.convergence_gap {
                break Termination::Converged;
            }
            if iterations >= self.config.max_iterations {
                break Termination::IterationLimitReached;
            }
            if start.elapsed() >= self.config.max_time() {
                break Termination::TimeLimitReached;
            }

            match self.config.sweep {
                SweepMode::Sequential => self.sweep_sequential(network, diag)?,
                SweepMode::Jacobi => self.sweep_jacobi(network, diag)?,
            }
            iterations += 1;
            self.total_iterations += 1;

            gap = gap_function.evaluate(&measure_gap(network, &self.bushes));
            let elapsed_secs = start.elapsed().as_secs_f64();
            history.push(IterationRecord {
                iteration: iterations,
                gap,
                elapsed_secs,
            });
            debug!(iteration = iterations, gap, elapsed_secs, "outer iteration complete");
        };

        self.state = termination.into();
        let outcome = AssignmentOutcome {
            termination,
            iterations,
            gap,
            gap_function,
            elapsed: start.elapsed(),
            history,
            total_system_travel_time: network.total_system_travel_time(),
            beckmann_objective: network.beckmann_objective(),
        };
        info!(
            termination = %outcome.termination,
            iterations,
            gap,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "Algorithm B finished"
        );
        Ok(outcome)
    }

    /// Free-flow trees for every origin, then all-or-nothing loading onto them.
    fn initialize(&mut self, network: &mut Network, diag: &mut Diagnostics) -> TapResult<()> {
        network.reset_flows();
        let demands = network.origin_demands();
        let trees: Vec<ShortestPathTree> = {
            let network: &Network = network;
            demands
                .par_iter()
                .map(|demand| build_tree(network, demand.origin, None))
                .collect()
        };

        let mut bushes: Vec<Bush> = demands
            .into_iter()
            .map(|demand| Bush::new(network, demand))
            .collect();
        let mut flows = SharedFlows::new(network, diag);
        for (bush, tree) in bushes.iter_mut().zip(&trees) {
            bush.initialize(&mut flows, tree)?;
        }
        debug!(origins = bushes.len(), "bushes initialized from free-flow trees");
        self.bushes = bushes;
        Ok(())
    }

    /// Gauss-Seidel: origins in turn, each on the flows the previous one left.
    fn sweep_sequential(&mut self, network: &mut Network, diag: &mut Diagnostics) -> TapResult<()> {
        let mut flows = SharedFlows::new(network, diag);
        for bush in &mut self.bushes {
            let tree = build_tree(&flows, bush.origin(), Some(&*bush));
            let update = bush.update(&mut flows, &tree)?;
            let stats = equilibrate_bush(bush, &mut flows, &self.config);
            trace_origin(bush, &update, &stats);
        }
        Ok(())
    }

    /// Jacobi: every origin against the same snapshot, merged at a barrier.
    ///
    /// Every origin takes a full step against the same costs, so the summed shift
    /// overshoots once several origins share links. The merged direction is scaled by
    /// the `lambda` in `[0, 1]` that minimizes the Beckmann objective along it, and every
    /// bush is scaled by the same `lambda` so the per-origin flows keep adding up to the
    /// link flows. If no step decreases the objective the merge is dropped and the
    /// iteration falls back to a sequential sweep.
    fn sweep_jacobi(&mut self, network: &mut Network, diag: &mut Diagnostics) -> TapResult<()> {
        let snapshot = FlowSnapshot::capture(network);
        let config = &self.config;
        let sweeps: Vec<OriginSweep> = {
            let network: &Network = network;
            self.bushes
                .par_iter_mut()
                .map(|bush| -> TapResult<OriginSweep> {
                    let mut flows = OriginFlows::new(network, &snapshot);
                    let tree = build_tree(&flows, bush.origin(), Some(&*bush));
                    let update = bush.update(&mut flows, &tree)?;
                    let pruned = flows.take_pending();
                    let before = bush.flows().to_vec();
                    let stats = equilibrate_bush(bush, &mut flows, config);
                    let shifted = flows.take_pending();
                    trace_origin(bush, &update, &stats);
                    Ok(OriginSweep {
                        pruned,
                        shifted,
                        before,
                        update,
                        stats,
                        diag: flows.into_diagnostics(),
                    })
                })
                .collect::<TapResult<_>>()?
        };

        let mut base = snapshot.flows;
        let mut direction = vec![0.0; base.len()];
        let mut totals = ShiftStats::default();
        let mut rollbacks = 0;
        for sweep in &sweeps {
            for (x, d) in base.iter_mut().zip(&sweep.pruned) {
                *x += d;
            }
            for (x, d) in direction.iter_mut().zip(&sweep.shifted) {
                *x += d;
            }
            totals.merge(&sweep.stats);
            rollbacks += usize::from(sweep.update.rolled_back);
        }

        let base_objective = network.beckmann_at(&base);
        let allowance = 1e-12 * base_objective.abs().max(1.0);
        let moved = direction.iter().any(|d| *d != 0.0);
        let mut lambda = if moved {
            merge_step(network, &base, &direction, self.config.jacobi_line_search_steps)
        } else {
            1.0
        };
        let trial: Vec<f64> = base
            .iter()
            .zip(&direction)
            .map(|(x, d)| x + lambda * d)
            .collect();
        let accepted = lambda > 0.0 && network.beckmann_at(&trial) <= base_objective + allowance;
        if !accepted {
            lambda = 0.0;
        }

        network.set_flows(if accepted { &trial } else { &base }, diag);
        for (bush, sweep) in self.bushes.iter_mut().zip(sweeps) {
            if lambda < 1.0 {
                bush.blend(&sweep.before, lambda);
            }
            diag.merge(sweep.diag);
        }
        debug!(
            shifts = totals.shifts,
            flat_shifts = totals.flat_shifts,
            rollbacks,
            lambda,
            "Jacobi sweep merged"
        );

        if moved && !accepted {
            warn!("merged Jacobi direction does not decrease the objective; sweeping origins in turn");
            self.sweep_sequential(network, diag)?;
        }
        Ok(())
    }
}

/// Step length in `[0, 1]` along `direction` from `base` that minimizes the Beckmann
/// objective.
///
/// The objective is convex along the segment, so its slope `sum(cost(x + lambda d) * d)`
/// is non-decreasing in `lambda`; bisection on the sign of the slope brackets the
/// minimizer. The lower end of the bracket is returned, which always has a negative
/// slope, so the objective at the returned step is below the objective at `base`.
/// Zero when the direction is not a descent direction.
fn merge_step(network: &Network, base: &[f64], direction: &[f64], steps: usize) -> f64 {
    let slope = |lambda: f64| -> f64 {
        network
            .graph
            .edge_indices()
            .zip(base.iter().zip(direction))
            .filter(|(_, (_, d))| **d != 0.0)
            .map(|(link, (x, d))| network.cost(link, (x + lambda * d).max(0.0)) * d)
            .sum()
    };
    if !(slope(0.0) < 0.0) {
        return 0.0;
    }
    if slope(1.0) <= 0.0 {
        return 1.0;
    }
    let (mut lo, mut hi) = (0.0, 1.0);
    for _ in 0..steps {
        let mid = 0.5 * (lo + hi);
        if slope(mid) < 0.0 {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    lo
}

fn trace_origin(bush: &Bush, update: &BushUpdate, stats: &ShiftStats) {
    trace!(
        origin = bush.origin().index() + 1,
        added = update.added,
        removed = update.removed,
        rejected = update.rejected,
        passes = stats.passes,
        shifts = stats.shifts,
        max_excess = stats.max_excess,
        "origin processed"
    );
}

/// Run Algorithm B once with a fresh controller.
pub fn solve(
    network: &mut Network,
    config: AlgorithmBConfig,
    diag: &mut Diagnostics,
) -> TapResult<AssignmentOutcome> {
    AlgorithmB::new(config).run(network, diag)
}
