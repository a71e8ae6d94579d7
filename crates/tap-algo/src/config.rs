//! Solver configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tap_core::{TapError, TapResult};

use crate::gap::GapFunction;

/// Order in which origins are processed within one outer iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepMode {
    /// Gauss-Seidel: each origin sees the flows left by the origins before it
    #[default]
    Sequential,
    /// Every origin works from the same start-of-sweep snapshot, in parallel
    Jacobi,
}

impl SweepMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SweepMode::Sequential => "sequential",
            SweepMode::Jacobi => "jacobi",
        }
    }
}

impl fmt::Display for SweepMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SweepMode {
    type Err = TapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" | "gauss-seidel" | "gauss_seidel" => Ok(SweepMode::Sequential),
            "jacobi" | "parallel" => Ok(SweepMode::Jacobi),
            other => Err(TapError::Config(format!(
                "unknown sweep mode '{other}' (expected sequential or jacobi)"
            ))),
        }
    }
}

/// Configuration for [`crate::AlgorithmB`].
///
/// Every field has a default, so a partial TOML table deserializes cleanly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlgorithmBConfig {
    /// Stop once the gap falls below this value
    pub convergence_gap: f64,
    pub max_iterations: usize,
    /// Wall-clock budget, checked at the start of each outer iteration
    pub max_time_secs: f64,
    pub gap_function: GapFunction,
    pub sweep: SweepMode,
    /// Label/shift passes per bush per outer iteration
    pub inner_iterations: usize,
    /// Share of the movable flow shifted when the derivative sum is zero
    pub flat_shift_fraction: f64,
    /// Bisection steps of the Jacobi merge line search
    pub jacobi_line_search_steps: usize,
    /// A bush whose largest label excess is below this is left alone
    pub bush_gap_tolerance: f64,
}

impl Default for AlgorithmBConfig {
    fn default() -> Self {
        Self {
            convergence_gap: 1e-6,
            max_iterations: 999,
            max_time_secs: 3000.0,
            gap_function: GapFunction::default(),
            sweep: SweepMode::default(),
            inner_iterations: 20,
            flat_shift_fraction: 0.5,
            jacobi_line_search_steps: 30,
            bush_gap_tolerance: 1e-12,
        }
    }
}

impl AlgorithmBConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_convergence_gap(mut self, gap: f64) -> Self {
        self.convergence_gap = gap;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_max_time_secs(mut self, secs: f64) -> Self {
        self.max_time_secs = secs;
        self
    }

    pub fn with_gap_function(mut self, gap_function: GapFunction) -> Self {
        self.gap_function = gap_function;
        self
    }

    pub fn with_sweep(mut self, sweep: SweepMode) -> Self {
        self.sweep = sweep;
        self
    }

    pub fn with_inner_iterations(mut self, inner_iterations: usize) -> Self {
        self.inner_iterations = inner_iterations;
        self
    }

    pub fn max_time(&self) -> Duration {
        Duration::try_from_secs_f64(self.max_time_secs).unwrap_or(Duration::MAX)
    }

    /// Reject settings the solver cannot run with.
    pub fn validate(&self) -> TapResult<()> {
        if !(self.convergence_gap >= 0.0) {
            return Err(TapError::Config(format!(
                "convergence_gap must be non-negative, got {}",
                self.convergence_gap
            )));
        }
        if !(self.max_time_secs >= 0.0) {
            return Err(TapError::Config(format!(
                "max_time_secs must be non-negative, got {}",
                self.max_time_secs
            )));
        }
        if self.jacobi_line_search_steps == 0 {
            return Err(TapError::Config(
                "jacobi_line_search_steps must be at least 1".into(),
            ));
        }
        if self.inner_iterations == 0 {
            return Err(TapError::Config("inner_iterations must be at least 1".into()));
        }
        if !(self.flat_shift_fraction > 0.0 && self.flat_shift_fraction <= 1.0) {
            return Err(TapError::Config(format!(
                "flat_shift_fraction must be in (0, 1], got {}",
                self.flat_shift_fraction
            )));
        }
        if !(self.bush_gap_tolerance >= 0.0) {
            return Err(TapError::Config(format!(
                "bush_gap_tolerance must be non-negative, got {}",
                self.bush_gap_tolerance
            )));
        }
        Ok(())
    }
}
