//! Link cost functions.
//!
//! Every cost function is separable (depends only on the flow of its own link) and,
//! for well-formed parameters, non-decreasing in flow. Evaluation is pure: callers pass
//! the flow to evaluate at rather than reading a stored value, so the flow-shift step
//! can ask "what would this link cost at flow x" without touching network state.

use serde::{Deserialize, Serialize};

/// Flow floor used when a BPR derivative with `beta < 1` would be infinite at zero.
const DERIVATIVE_FLOW_FLOOR: f64 = 1e-10;

/// Bureau of Public Roads volume-delay parameters.
///
/// `cost(x) = fixed_cost + free_flow_time * (1 + alpha * (x / capacity)^beta)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bpr {
    pub free_flow_time: f64,
    pub capacity: f64,
    pub alpha: f64,
    pub beta: f64,
    /// Flow-independent part of the generalized cost (`toll * toll_factor + length * distance_factor`)
    #[serde(default)]
    pub fixed_cost: f64,
}

impl Bpr {
    pub fn new(free_flow_time: f64, capacity: f64, alpha: f64, beta: f64) -> Self {
        Self {
            free_flow_time,
            capacity,
            alpha,
            beta,
            fixed_cost: 0.0,
        }
    }

    pub fn with_fixed_cost(mut self, fixed_cost: f64) -> Self {
        self.fixed_cost = fixed_cost;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CostFunction {
    Bpr(Bpr),
    /// `cost(x) = free_flow + slope * x`
    Linear { free_flow: f64, slope: f64 },
    /// Flow-independent cost, used for artificial connectors
    Constant { cost: f64 },
}

impl CostFunction {
    pub fn bpr(free_flow_time: f64, capacity: f64, alpha: f64, beta: f64) -> Self {
        CostFunction::Bpr(Bpr::new(free_flow_time, capacity, alpha, beta))
    }

    pub fn linear(free_flow: f64, slope: f64) -> Self {
        CostFunction::Linear { free_flow, slope }
    }

    pub fn constant(cost: f64) -> Self {
        CostFunction::Constant { cost }
    }

    /// Link cost at `flow`. Negative flows are evaluated at zero.
    pub fn cost(&self, flow: f64) -> f64 {
        let x = flow.max(0.0);
        match *self {
            CostFunction::Bpr(p) => {
                let ratio = x / p.capacity;
                p.fixed_cost + p.free_flow_time * (1.0 + p.alpha * ratio.powf(p.beta))
            }
            CostFunction::Linear { free_flow, slope } => free_flow + slope * x,
            CostFunction::Constant { cost } => cost,
        }
    }

    /// First derivative of the cost with respect to flow.
    pub fn derivative(&self, flow: f64) -> f64 {
        let x = flow.max(0.0);
        match *self {
            CostFunction::Bpr(p) => {
                if p.beta == 0.0 || p.alpha == 0.0 {
                    return 0.0;
                }
                let x = if p.beta < 1.0 {
                    x.max(DERIVATIVE_FLOW_FLOOR)
                } else {
                    x
                };
                if p.beta == 1.0 {
                    p.free_flow_time * p.alpha / p.capacity
                } else {
                    p.free_flow_time * p.alpha * p.beta * x.powf(p.beta - 1.0)
                        / p.capacity.powf(p.beta)
                }
            }
            CostFunction::Linear { slope, .. } => slope,
            CostFunction::Constant { .. } => 0.0,
        }
    }

    /// Integral of the cost from zero to `flow` (the link's Beckmann term).
    pub fn integral(&self, flow: f64) -> f64 {
        let x = flow.max(0.0);
        match *self {
            CostFunction::Bpr(p) => {
                let congestion = if p.alpha == 0.0 {
                    0.0
                } else {
                    p.free_flow_time * p.alpha * p.capacity / (p.beta + 1.0)
                        * (x / p.capacity).powf(p.beta + 1.0)
                };
                (p.fixed_cost + p.free_flow_time) * x + congestion
            }
            CostFunction::Linear { free_flow, slope } => free_flow * x + 0.5 * slope * x * x,
            CostFunction::Constant { cost } => cost * x,
        }
    }

    /// Cost at zero flow.
    pub fn free_flow_cost(&self) -> f64 {
        self.cost(0.0)
    }

    /// Whether the parameters guarantee a non-decreasing cost.
    pub fn is_monotone(&self) -> bool {
        match *self {
            CostFunction::Bpr(p) => p.alpha >= 0.0 && p.beta >= 0.0 && p.free_flow_time >= 0.0,
            CostFunction::Linear { slope, .. } => slope >= 0.0,
            CostFunction::Constant { .. } => true,
        }
    }
}
