//! Newton flow shifts inside one bush.
//!
//! For every node, walking the topological order backwards, the costliest used path
//! and the cheapest bush path into it are traced back to where they diverge. Flow then
//! moves from the costly segment to the cheap one:
//!
//! ```text
//!   dx = (cost(longest) − cost(shortest)) / Σ cost'(link)   over both segments
//!   dx = clamp(dx, 0, min flow on the longest segment)
//! ```
//!
//! When the derivative sum vanishes (flat costs) a fixed fraction of the movable flow
//! is shifted instead.

use petgraph::graph::{EdgeIndex, NodeIndex};
use tap_core::Network;

use crate::bush::Bush;
use crate::config::AlgorithmBConfig;
use crate::flows::LinkFlows;
use crate::shortest_path::{bush_labels, BushLabels};

/// Derivative sums at or below this fall back to a flat shift.
const MIN_CURVATURE: f64 = 1e-14;

/// What [`equilibrate_bush`] did to one bush.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ShiftStats {
    /// Label/shift passes run
    pub passes: usize,
    pub shifts: usize,
    /// Shifts sized by the flat fraction instead of a Newton step
    pub flat_shifts: usize,
    /// Candidate nodes left alone (stale labels, nothing movable)
    pub skipped: usize,
    /// Largest label excess when the last labels were computed
    pub max_excess: f64,
}

impl ShiftStats {
    pub fn merge(&mut self, other: &ShiftStats) {
        self.passes += other.passes;
        self.shifts += other.shifts;
        self.flat_shifts += other.flat_shifts;
        self.skipped += other.skipped;
        self.max_excess = self.max_excess.max(other.max_excess);
    }
}

/// Repeat labels-then-shift on `bush` until it is balanced or the pass budget runs out.
pub fn equilibrate_bush<F: LinkFlows + ?Sized>(
    bush: &mut Bush,
    flows: &mut F,
    config: &AlgorithmBConfig,
) -> ShiftStats {
    let mut stats = ShiftStats::default();
    for _ in 0..config.inner_iterations {
        let labels = bush_labels(flows, bush);
        stats.max_excess = labels.max_excess(bush);
        if stats.max_excess <= config.bush_gap_tolerance {
            break;
        }
        stats.passes += 1;
        shift_pass(bush, flows, &labels, config, &mut stats);
    }
    stats
}

/// The two diverging path pieces that end at one node.
struct Segments {
    shortest: Vec<EdgeIndex>,
    longest: Vec<EdgeIndex>,
}

fn shift_pass<F: LinkFlows + ?Sized>(
    bush: &mut Bush,
    flows: &mut F,
    labels: &BushLabels,
    config: &AlgorithmBConfig,
    stats: &mut ShiftStats,
) {
    let order = bush.order().to_vec();
    for &node in order.iter().rev() {
        if node == bush.origin() || labels.excess(node) <= config.bush_gap_tolerance {
            continue;
        }
        let (Some(sp), Some(lp)) = (
            labels.shortest_pred[node.index()],
            labels.longest_pred[node.index()],
        ) else {
            continue;
        };
        if sp == lp {
            continue;
        }
        let Some(segments) = divergent_segments(flows.network(), bush, labels, sp, lp) else {
            stats.skipped += 1;
            continue;
        };

        let shortest_cost: f64 = segments.shortest.iter().map(|&l| flows.cost(l)).sum();
        let longest_cost: f64 = segments.longest.iter().map(|&l| flows.cost(l)).sum();
        let difference = longest_cost - shortest_cost;
        let movable = segments
            .longest
            .iter()
            .map(|&l| bush.flow(l))
            .fold(f64::INFINITY, f64::min);
        if !(difference > 0.0) || !(movable > 0.0) {
            stats.skipped += 1;
            continue;
        }

        let curvature: f64 = segments
            .shortest
            .iter()
            .chain(&segments.longest)
            .map(|&l| flows.derivative(l))
            .sum();
        let step = if curvature.is_finite() && curvature > MIN_CURVATURE {
            difference / curvature
        } else {
            stats.flat_shifts += 1;
            config.flat_shift_fraction * movable
        };
        let step = step.min(movable);

        for &link in &segments.longest {
            bush.shift(flows, link, -step);
        }
        for &link in &segments.shortest {
            bush.shift(flows, link, step);
        }
        stats.shifts += 1;
    }
}

/// Trace both predecessor chains back from the last links `sp` and `lp` until they meet.
///
/// Whichever chain currently sits later in the topological order steps back, so the
/// walk stops at the first common node. `None` when a chain runs out first.
fn divergent_segments(
    network: &Network,
    bush: &Bush,
    labels: &BushLabels,
    sp: EdgeIndex,
    lp: EdgeIndex,
) -> Option<Segments> {
    let mut segments = Segments {
        shortest: vec![sp],
        longest: vec![lp],
    };
    let mut a: NodeIndex = network.endpoints(sp).0;
    let mut b: NodeIndex = network.endpoints(lp).0;
    while a != b {
        if bush.position(a)? > bush.position(b)? {
            let link = labels.shortest_pred[a.index()]?;
            segments.shortest.push(link);
            a = network.endpoints(link).0;
        } else {
            let link = labels.longest_pred[b.index()]?;
            segments.longest.push(link);
            b = network.endpoints(link).0;
        }
    }
    Some(segments)
}
