//! Convergence measures.
//!
//! Every gap is built from the same few system totals, collected once per outer
//! iteration by [`measure_gap`]:
//!
//! | function          | value                                   |
//! |-------------------|-----------------------------------------|
//! | `relative_gap_1`  | (TSTT − SPTT) / SPTT                    |
//! | `relative_gap_2`  | (TSTT − SPTT) / TSTT                    |
//! | `aec`             | (TSTT − SPTT) / total demand            |
//! | `mec`             | max over OD pairs of (longest used − shortest) |
//!
//! TSTT is Σ flow × cost over links; SPTT routes all demand on current shortest paths.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tap_core::{Network, TapError};

use crate::bush::Bush;
use crate::shortest_path::{build_tree, bush_labels};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GapFunction {
    #[default]
    #[serde(rename = "relative_gap_1")]
    RelativeGap1,
    #[serde(rename = "relative_gap_2")]
    RelativeGap2,
    #[serde(rename = "aec")]
    AverageExcessCost,
    #[serde(rename = "mec")]
    MaximumExcessCost,
}

/// System totals a gap function is evaluated from.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GapMeasures {
    pub total_system_travel_time: f64,
    pub shortest_path_travel_time: f64,
    pub total_demand: f64,
    /// Largest longest-used minus shortest path cost over all OD pairs
    pub max_excess_cost: f64,
}

impl GapFunction {
    pub fn as_str(&self) -> &'static str {
        match self {
            GapFunction::RelativeGap1 => "relative_gap_1",
            GapFunction::RelativeGap2 => "relative_gap_2",
            GapFunction::AverageExcessCost => "aec",
            GapFunction::MaximumExcessCost => "mec",
        }
    }

    /// Evaluate against `measures`. Always non-negative; zero when nothing is out of balance.
    pub fn evaluate(&self, measures: &GapMeasures) -> f64 {
        let excess =
            (measures.total_system_travel_time - measures.shortest_path_travel_time).max(0.0);
        match self {
            GapFunction::RelativeGap1 => ratio(excess, measures.shortest_path_travel_time),
            GapFunction::RelativeGap2 => ratio(excess, measures.total_system_travel_time),
            GapFunction::AverageExcessCost => ratio(excess, measures.total_demand),
            GapFunction::MaximumExcessCost => measures.max_excess_cost.max(0.0),
        }
    }
}

fn ratio(excess: f64, denominator: f64) -> f64 {
    if excess <= 0.0 {
        0.0
    } else if denominator > 0.0 {
        excess / denominator
    } else {
        f64::INFINITY
    }
}

impl fmt::Display for GapFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GapFunction {
    type Err = TapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "relative_gap_1" | "relative-gap-1" | "rg1" => Ok(GapFunction::RelativeGap1),
            "relative_gap_2" | "relative-gap-2" | "rg2" => Ok(GapFunction::RelativeGap2),
            "aec" | "average_excess_cost" => Ok(GapFunction::AverageExcessCost),
            "mec" | "maximum_excess_cost" => Ok(GapFunction::MaximumExcessCost),
            other => Err(TapError::Config(format!(
                "unknown gap function '{other}' (expected relative_gap_1, relative_gap_2, aec or mec)"
            ))),
        }
    }
}

#[derive(Default)]
struct OriginTotals {
    shortest_path_travel_time: f64,
    total_demand: f64,
    max_excess_cost: f64,
}

impl OriginTotals {
    fn merge(self, other: Self) -> Self {
        Self {
            shortest_path_travel_time: self.shortest_path_travel_time
                + other.shortest_path_travel_time,
            total_demand: self.total_demand + other.total_demand,
            max_excess_cost: self.max_excess_cost.max(other.max_excess_cost),
        }
    }
}

/// Collect [`GapMeasures`] at the network's current flows. Origins are processed in parallel.
pub fn measure_gap(network: &Network, bushes: &[Bush]) -> GapMeasures {
    let totals = bushes
        .par_iter()
        .map(|bush| {
            let tree = build_tree(network, bush.origin(), Some(bush));
            let labels = bush_labels(network, bush);
            let mut totals = OriginTotals::default();
            for &(destination, demand) in &bush.demand().destinations {
                let shortest = tree.distance_to(destination);
                totals.shortest_path_travel_time += demand * shortest;
                totals.total_demand += demand;
                let excess = labels.longest[destination.index()] - shortest;
                if excess.is_finite() {
                    totals.max_excess_cost = totals.max_excess_cost.max(excess);
                }
            }
            totals
        })
        .reduce(OriginTotals::default, OriginTotals::merge);

    GapMeasures {
        total_system_travel_time: network.total_system_travel_time(),
        shortest_path_travel_time: totals.shortest_path_travel_time,
        total_demand: totals.total_demand,
        max_excess_cost: totals.max_excess_cost,
    }
}
