//! Origin-destination demand.

use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::NodeId;

/// One origin-destination demand record. Demand is exogenous and never changes while solving.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OdPair {
    pub origin: NodeId,
    pub destination: NodeId,
    pub demand: f64,
}

impl OdPair {
    pub fn new(origin: NodeId, destination: NodeId, demand: f64) -> Self {
        Self {
            origin,
            destination,
            demand,
        }
    }

    /// Trips that start and end in the same zone never load the network.
    pub fn is_intrazonal(&self) -> bool {
        self.origin == self.destination
    }
}

/// All demand leaving one origin, with destinations merged and zero entries dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct OriginDemand {
    pub origin: NodeIndex,
    /// `(destination, demand)` sorted by destination index
    pub destinations: Vec<(NodeIndex, f64)>,
    pub total: f64,
}

/// Group OD pairs by origin. Origins come out in ascending node order.
pub(crate) fn group_by_origin(pairs: &[OdPair]) -> Vec<OriginDemand> {
    let mut grouped: BTreeMap<NodeIndex, BTreeMap<NodeIndex, f64>> = BTreeMap::new();
    for pair in pairs {
        if pair.is_intrazonal() || pair.demand <= 0.0 {
            continue;
        }
        *grouped
            .entry(pair.origin.index())
            .or_default()
            .entry(pair.destination.index())
            .or_insert(0.0) += pair.demand;
    }

    grouped
        .into_iter()
        .map(|(origin, destinations)| {
            let destinations: Vec<(NodeIndex, f64)> = destinations.into_iter().collect();
            let total = destinations.iter().map(|(_, d)| d).sum();
            OriginDemand {
                origin,
                destinations,
                total,
            }
        })
        .collect()
}
