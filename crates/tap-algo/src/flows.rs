//! Views of link flow and cost state used by the per-origin solver steps.
//!
//! Shortest paths, bush maintenance, and flow shifts are written once against
//! [`LinkCosts`] / [`LinkFlows`] and run unchanged under both sweep orderings:
//!
//! - [`SharedFlows`] writes straight into the [`Network`] (sequential sweep): every
//!   origin sees the costs left behind by the origins before it.
//! - [`OriginFlows`] layers one origin's private changes over a [`FlowSnapshot`] taken
//!   at the start of the sweep (Jacobi sweep). Nothing shared is mutated until the
//!   controller merges all origins at the sweep barrier.

use petgraph::graph::EdgeIndex;
use tap_core::{Category, Diagnostics, Network, Subject, FLOW_TOLERANCE};

/// Read access to the network and the link costs an origin should route on.
pub trait LinkCosts {
    fn network(&self) -> &Network;
    fn cost(&self, link: EdgeIndex) -> f64;
}

/// Read/write access to link flows, as seen by one origin.
pub trait LinkFlows: LinkCosts {
    fn flow(&self, link: EdgeIndex) -> f64;
    fn derivative(&self, link: EdgeIndex) -> f64;
    /// Move `delta` units of flow onto `link` and refresh its cost.
    fn shift(&mut self, link: EdgeIndex, delta: f64);
}

impl LinkCosts for Network {
    fn network(&self) -> &Network {
        self
    }

    fn cost(&self, link: EdgeIndex) -> f64 {
        self.graph[link].cost
    }
}

/// Direct, immediately visible updates to the shared network flows.
pub struct SharedFlows<'a> {
    network: &'a mut Network,
    diag: &'a mut Diagnostics,
}

impl<'a> SharedFlows<'a> {
    pub fn new(network: &'a mut Network, diag: &'a mut Diagnostics) -> Self {
        Self { network, diag }
    }
}

impl LinkCosts for SharedFlows<'_> {
    fn network(&self) -> &Network {
        self.network
    }

    fn cost(&self, link: EdgeIndex) -> f64 {
        self.network.graph[link].cost
    }
}

impl LinkFlows for SharedFlows<'_> {
    fn flow(&self, link: EdgeIndex) -> f64 {
        self.network.graph[link].flow
    }

    fn derivative(&self, link: EdgeIndex) -> f64 {
        self.network.graph[link].derivative
    }

    fn shift(&mut self, link: EdgeIndex, delta: f64) {
        self.network.add_flow(link, delta, self.diag);
    }
}

/// Link flows, costs, and derivatives frozen at the start of a sweep.
#[derive(Debug, Clone)]
pub struct FlowSnapshot {
    pub flows: Vec<f64>,
    pub costs: Vec<f64>,
    pub derivatives: Vec<f64>,
}

impl FlowSnapshot {
    pub fn capture(network: &Network) -> Self {
        let links = network.graph.edge_weights();
        let mut snapshot = Self {
            flows: Vec::with_capacity(network.link_count()),
            costs: Vec::with_capacity(network.link_count()),
            derivatives: Vec::with_capacity(network.link_count()),
        };
        for link in links {
            snapshot.flows.push(link.flow);
            snapshot.costs.push(link.cost);
            snapshot.derivatives.push(link.derivative);
        }
        snapshot
    }
}

/// One origin's private view: the snapshot plus this origin's own pending changes.
pub struct OriginFlows<'a> {
    network: &'a Network,
    current: Vec<f64>,
    costs: Vec<f64>,
    derivatives: Vec<f64>,
    pending: Vec<f64>,
    diag: Diagnostics,
}

impl<'a> OriginFlows<'a> {
    pub fn new(network: &'a Network, snapshot: &FlowSnapshot) -> Self {
        Self {
            network,
            current: snapshot.flows.clone(),
            costs: snapshot.costs.clone(),
            derivatives: snapshot.derivatives.clone(),
            pending: vec![0.0; snapshot.flows.len()],
            diag: Diagnostics::new(),
        }
    }

    /// Changes made since the previous call, as a per-link delta.
    pub fn take_pending(&mut self) -> Vec<f64> {
        std::mem::replace(&mut self.pending, vec![0.0; self.current.len()])
    }

    pub fn into_diagnostics(self) -> Diagnostics {
        self.diag
    }
}

impl LinkCosts for OriginFlows<'_> {
    fn network(&self) -> &Network {
        self.network
    }

    fn cost(&self, link: EdgeIndex) -> f64 {
        self.costs[link.index()]
    }
}

impl LinkFlows for OriginFlows<'_> {
    fn flow(&self, link: EdgeIndex) -> f64 {
        self.current[link.index()]
    }

    fn derivative(&self, link: EdgeIndex) -> f64 {
        self.derivatives[link.index()]
    }

    fn shift(&mut self, link: EdgeIndex, delta: f64) {
        let i = link.index();
        let old = self.current[i];
        let mut flow = old + delta;
        if flow < 0.0 {
            if flow < -FLOW_TOLERANCE * (1.0 + old.abs()) {
                self.diag.warn_on(
                    Category::Numeric,
                    Subject::Link(self.network.link(link).id),
                    format!("flow update to {flow:.6e} clamped to zero"),
                );
            } else {
                self.diag.record_clamped_flow();
            }
            flow = 0.0;
        }
        self.current[i] = flow;
        self.pending[i] += flow - old;
        self.costs[i] = self.network.cost(link, flow);
        self.derivatives[i] = self.network.cost_derivative(link, flow);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tap_core::{CostFunction, NodeId};

    fn one_link() -> Network {
        let mut network = Network::with_nodes(2, 2);
        network
            .add_link(NodeId::new(1), NodeId::new(2), CostFunction::linear(5.0, 1.0))
            .unwrap();
        network
    }

    #[test]
    fn shared_flows_write_through() {
        let mut network = one_link();
        let mut diag = Diagnostics::new();
        let link = EdgeIndex::new(0);
        {
            let mut flows = SharedFlows::new(&mut network, &mut diag);
            flows.shift(link, 3.0);
            assert_eq!(flows.cost(link), 8.0);
        }
        assert_eq!(network.link(link).flow, 3.0);
    }

    #[test]
    fn origin_flows_leave_network_untouched() {
        let mut network = one_link();
        let mut diag = Diagnostics::new();
        network.add_flow(EdgeIndex::new(0), 2.0, &mut diag);
        let snapshot = FlowSnapshot::capture(&network);

        let link = EdgeIndex::new(0);
        let mut view = OriginFlows::new(&network, &snapshot);
        view.shift(link, 4.0);
        assert_eq!(view.flow(link), 6.0);
        assert_eq!(view.cost(link), 11.0);
        assert_eq!(view.take_pending(), vec![4.0]);
        view.shift(link, -10.0);
        assert_eq!(view.flow(link), 0.0);
        assert_eq!(view.take_pending(), vec![-6.0]);
        assert_eq!(view.into_diagnostics().in_category(Category::Numeric).count(), 1);

        assert_eq!(network.link(link).flow, 2.0);
    }
}
