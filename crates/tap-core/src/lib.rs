//! # tap-core: Traffic Assignment Network Model
//!
//! Provides the static road network, link cost functions, and origin-destination demand
//! used by the equilibrium solvers in `tap-algo`.
//!
//! ## Design Philosophy
//!
//! Networks are modeled as **directed multigraphs** where:
//! - **Nodes**: intersections and zone centroids
//! - **Edges**: links, each carrying a cost function and its current flow, cost, and derivative
//!
//! Nodes and links live in dense, index-addressed arenas (`petgraph`'s `DiGraph`). Everything
//! downstream (shortest-path trees, bushes, flow snapshots) stores plain indices, never
//! references into the graph. Topology is fixed once connectivity repair has run; only flows and
//! the costs derived from them change while solving.
//!
//! ## Quick Start
//!
//! ```rust
//! use tap_core::*;
//!
//! let mut network = Network::with_nodes(2, 2);
//! network
//!     .add_link(NodeId::new(1), NodeId::new(2), CostFunction::bpr(10.0, 100.0, 0.15, 4.0))
//!     .unwrap();
//! network.add_demand(NodeId::new(1), NodeId::new(2), 50.0).unwrap();
//!
//! let link = network.link_index(LinkId::new(1)).unwrap();
//! assert!(network.cost(link, 100.0) > network.cost(link, 0.0));
//! ```
//!
//! ## ID System
//!
//! External ids are 1-based, as in TNTP files: node `NodeId(k)` lives at `NodeIndex(k - 1)`,
//! link `LinkId(k)` at `EdgeIndex(k - 1)`. Referencing an id outside the valid range is a
//! fatal [`TapError::InvalidNode`] / [`TapError::InvalidLink`].
//!
//! ## Modules
//!
//! - [`cost`] - Link cost functions (BPR, linear, constant)
//! - [`demand`] - OD pairs grouped by origin
//! - [`diagnostics`] - Recoverable issue collection passed through every component
//! - [`graph_utils`] - Strong connectivity check and repair, graph statistics

use petgraph::prelude::*;
use serde::{Deserialize, Serialize};

pub mod cost;
pub mod demand;
pub mod diagnostics;
pub mod error;
pub mod graph_utils;

pub use cost::{Bpr, CostFunction};
pub use demand::{OdPair, OriginDemand};
pub use diagnostics::{Category, DiagnosticIssue, Diagnostics, Severity, Subject};
pub use error::{TapError, TapResult};
pub use graph_utils::*;
pub use petgraph::graph::{EdgeIndex, NodeIndex};

/// Undershoot below zero that is treated as round-off when updating a flow.
pub const FLOW_TOLERANCE: f64 = 1e-9;

// Newtype wrappers for IDs for type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkId(usize);

impl NodeId {
    #[inline]
    pub fn new(value: usize) -> Self {
        NodeId(value)
    }
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
    /// Dense graph index for this id. Only meaningful for ids `>= 1`.
    #[inline]
    pub fn index(&self) -> NodeIndex {
        NodeIndex::new(self.0.saturating_sub(1))
    }
}

impl LinkId {
    #[inline]
    pub fn new(value: usize) -> Self {
        LinkId(value)
    }
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
    #[inline]
    pub fn index(&self) -> EdgeIndex {
        EdgeIndex::new(self.0.saturating_sub(1))
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for LinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    /// Zones can originate and terminate trips
    pub zone: bool,
}

#[derive(Debug, Clone)]
pub struct Link {
    pub id: LinkId,
    pub from: NodeId,
    pub to: NodeId,
    pub cost_function: CostFunction,
    pub flow: f64,
    /// Cost at the current flow
    pub cost: f64,
    /// Cost derivative at the current flow
    pub derivative: f64,
    /// Connector added by connectivity repair rather than read from input
    pub artificial: bool,
}

impl Link {
    pub fn new(id: LinkId, from: NodeId, to: NodeId, cost_function: CostFunction) -> Self {
        Self {
            id,
            from,
            to,
            cost_function,
            flow: 0.0,
            cost: cost_function.cost(0.0),
            derivative: cost_function.derivative(0.0),
            artificial: false,
        }
    }

    /// Store a new flow and recompute cost and derivative from it.
    fn set_flow(&mut self, flow: f64) {
        self.flow = flow;
        self.cost = self.cost_function.cost(flow);
        self.derivative = self.cost_function.derivative(flow);
    }
}

/// The road network together with its OD demand.
#[derive(Debug, Default, Clone)]
pub struct Network {
    pub graph: DiGraph<Node, Link>,
    /// Nodes with ids below this value may start or end a path but never be passed through
    pub first_thru_node: usize,
    pub od_pairs: Vec<OdPair>,
}

impl Network {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            first_thru_node: 1,
            od_pairs: Vec::new(),
        }
    }

    /// Create `node_count` nodes with ids `1..=node_count`; the first `zones` are zones.
    pub fn with_nodes(node_count: usize, zones: usize) -> Self {
        let mut network = Self::new();
        network.graph.reserve_nodes(node_count);
        for k in 1..=node_count {
            network.graph.add_node(Node {
                id: NodeId(k),
                zone: k <= zones,
            });
        }
        network
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn link_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn node_index(&self, id: NodeId) -> TapResult<NodeIndex> {
        if id.0 == 0 || id.0 > self.node_count() {
            return Err(TapError::InvalidNode {
                id: id.0,
                node_count: self.node_count(),
            });
        }
        Ok(id.index())
    }

    pub fn link_index(&self, id: LinkId) -> TapResult<EdgeIndex> {
        if id.0 == 0 || id.0 > self.link_count() {
            return Err(TapError::InvalidLink {
                id: id.0,
                link_count: self.link_count(),
            });
        }
        Ok(id.index())
    }

    pub fn node(&self, node: NodeIndex) -> &Node {
        &self.graph[node]
    }

    pub fn link(&self, link: EdgeIndex) -> &Link {
        &self.graph[link]
    }

    /// `(tail, head)` of a link.
    #[inline]
    pub fn endpoints(&self, link: EdgeIndex) -> (NodeIndex, NodeIndex) {
        let l = &self.graph[link];
        (l.from.index(), l.to.index())
    }

    /// Whether paths may pass through `node` (as opposed to only starting or ending there).
    #[inline]
    pub fn allows_through(&self, node: NodeIndex) -> bool {
        node.index() + 1 >= self.first_thru_node
    }

    pub fn add_link(
        &mut self,
        from: NodeId,
        to: NodeId,
        cost_function: CostFunction,
    ) -> TapResult<EdgeIndex> {
        let tail = self.node_index(from)?;
        let head = self.node_index(to)?;
        let id = LinkId(self.link_count() + 1);
        Ok(self
            .graph
            .add_edge(tail, head, Link::new(id, from, to, cost_function)))
    }

    pub fn add_artificial_link(&mut self, tail: NodeIndex, head: NodeIndex, cost: f64) -> EdgeIndex {
        let id = LinkId(self.link_count() + 1);
        let mut link = Link::new(
            id,
            self.graph[tail].id,
            self.graph[head].id,
            CostFunction::constant(cost),
        );
        link.artificial = true;
        self.graph.add_edge(tail, head, link)
    }

    /// Record demand between two nodes. Negative demand is rejected.
    pub fn add_demand(&mut self, origin: NodeId, destination: NodeId, demand: f64) -> TapResult<()> {
        self.node_index(origin)?;
        self.node_index(destination)?;
        if !(demand >= 0.0) {
            return Err(TapError::Validation(format!(
                "demand from {origin} to {destination} must be non-negative, got {demand}"
            )));
        }
        self.od_pairs.push(OdPair::new(origin, destination, demand));
        Ok(())
    }

    /// Demand grouped by origin, skipping intrazonal and zero entries.
    pub fn origin_demands(&self) -> Vec<OriginDemand> {
        demand::group_by_origin(&self.od_pairs)
    }

    /// Total demand that actually loads the network.
    pub fn total_demand(&self) -> f64 {
        self.od_pairs
            .iter()
            .filter(|p| !p.is_intrazonal())
            .map(|p| p.demand)
            .sum()
    }

    // =========================================================================
    // Cost evaluation
    // =========================================================================

    /// Cost of `link` at an arbitrary `flow` (not the stored one).
    #[inline]
    pub fn cost(&self, link: EdgeIndex, flow: f64) -> f64 {
        self.graph[link].cost_function.cost(flow)
    }

    /// Cost derivative of `link` at an arbitrary `flow`.
    #[inline]
    pub fn cost_derivative(&self, link: EdgeIndex, flow: f64) -> f64 {
        self.graph[link].cost_function.derivative(flow)
    }

    // =========================================================================
    // Flow mutation
    // =========================================================================

    /// Add `delta` to the stored flow of `link` and recompute its cost.
    ///
    /// A result below zero is clamped to zero. Undershoot within [`FLOW_TOLERANCE`] is
    /// counted as round-off; anything larger is recorded as a `numeric` warning.
    /// Returns the new flow.
    pub fn add_flow(&mut self, link: EdgeIndex, delta: f64, diag: &mut Diagnostics) -> f64 {
        let l = &mut self.graph[link];
        let mut flow = l.flow + delta;
        if flow < 0.0 {
            if flow < -FLOW_TOLERANCE * (1.0 + l.flow.abs()) {
                diag.warn_on(
                    Category::Numeric,
                    Subject::Link(l.id),
                    format!("flow update to {flow:.6e} clamped to zero"),
                );
            } else {
                diag.record_clamped_flow();
            }
            flow = 0.0;
        }
        l.set_flow(flow);
        flow
    }

    /// Overwrite all link flows (indexed by edge index). Negative entries are clamped.
    pub fn set_flows(&mut self, flows: &[f64], diag: &mut Diagnostics) {
        for (link, &flow) in self.graph.edge_weights_mut().zip(flows) {
            if flow < 0.0 {
                diag.record_clamped_flow();
            }
            link.set_flow(flow.max(0.0));
        }
    }

    pub fn reset_flows(&mut self) {
        for link in self.graph.edge_weights_mut() {
            link.set_flow(0.0);
        }
    }

    pub fn link_flows(&self) -> Vec<f64> {
        self.graph.edge_weights().map(|l| l.flow).collect()
    }

    pub fn link_costs(&self) -> Vec<f64> {
        self.graph.edge_weights().map(|l| l.cost).collect()
    }

    // =========================================================================
    // System measures
    // =========================================================================

    /// Σ flow × cost over all links.
    pub fn total_system_travel_time(&self) -> f64 {
        self.graph.edge_weights().map(|l| l.flow * l.cost).sum()
    }

    /// Beckmann objective at the stored flows.
    pub fn beckmann_objective(&self) -> f64 {
        self.graph
            .edge_weights()
            .map(|l| l.cost_function.integral(l.flow))
            .sum()
    }

    /// Beckmann objective at an arbitrary flow vector (indexed by edge index).
    pub fn beckmann_at(&self, flows: &[f64]) -> f64 {
        self.graph
            .edge_weights()
            .zip(flows)
            .map(|(l, &x)| l.cost_function.integral(x))
            .sum()
    }

    /// Σ free-flow cost over real links; scales the cost of artificial connectors.
    pub fn total_free_flow_cost(&self) -> f64 {
        self.graph
            .edge_weights()
            .filter(|l| !l.artificial)
            .map(|l| l.cost_function.free_flow_cost().abs())
            .sum()
    }

    pub fn stats(&self) -> NetworkStats {
        let mut stats = NetworkStats {
            num_nodes: self.node_count(),
            num_links: self.link_count(),
            ..NetworkStats::default()
        };
        stats.num_zones = self.graph.node_weights().filter(|n| n.zone).count();
        stats.num_artificial_links = self.graph.edge_weights().filter(|l| l.artificial).count();
        stats.num_od_pairs = self
            .od_pairs
            .iter()
            .filter(|p| !p.is_intrazonal() && p.demand > 0.0)
            .count();
        stats.total_demand = self.total_demand();
        stats
    }

    /// Validate network data for issues that would make the equilibrium ill-defined.
    pub fn validate_into(&self, diag: &mut Diagnostics) {
        if self.node_count() == 0 {
            diag.error(Category::Structure, "network has no nodes");
            return;
        }
        if self.link_count() == 0 && self.node_count() > 1 {
            diag.error(Category::Structure, "network has multiple nodes but no links");
        }
        if self.total_demand() <= 0.0 {
            diag.warn(Category::Demand, "network has no inter-zonal demand");
        }

        for link in self.graph.edge_weights() {
            let subject = Subject::Link(link.id);
            if link.from == link.to {
                diag.warn_on(Category::Structure, subject, "self loop");
            }
            match link.cost_function {
                CostFunction::Bpr(p) => {
                    if !(p.capacity > 0.0) {
                        diag.error_on(
                            Category::Validation,
                            subject,
                            format!("capacity must be positive, got {}", p.capacity),
                        );
                    }
                    if p.free_flow_time < 0.0 {
                        diag.error_on(
                            Category::Validation,
                            subject,
                            format!("free-flow time is negative ({})", p.free_flow_time),
                        );
                    }
                }
                CostFunction::Linear { free_flow, .. } if free_flow < 0.0 => {
                    diag.error_on(
                        Category::Validation,
                        subject,
                        format!("free-flow cost is negative ({free_flow})"),
                    );
                }
                _ => {}
            }
            if !link.cost_function.is_monotone() {
                diag.error_on(
                    Category::Validation,
                    subject,
                    "cost function decreases with flow",
                );
            }
        }
    }
}

/// Statistics about a network's size and demand
#[derive(Debug, Clone, Default)]
pub struct NetworkStats {
    pub num_nodes: usize,
    pub num_zones: usize,
    pub num_links: usize,
    pub num_artificial_links: usize,
    pub num_od_pairs: usize,
    pub total_demand: f64,
}

impl std::fmt::Display for NetworkStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} nodes ({} zones), {} links ({} artificial), {} OD pairs ({:.1} trips)",
            self.num_nodes,
            self.num_zones,
            self.num_links,
            self.num_artificial_links,
            self.num_od_pairs,
            self.total_demand
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_node_network() -> Network {
        let mut network = Network::with_nodes(2, 2);
        network
            .add_link(NodeId(1), NodeId(2), CostFunction::linear(10.0, 2.0))
            .unwrap();
        network
    }

    #[test]
    fn test_network_creation() {
        let network = two_node_network();
        assert_eq!(network.node_count(), 2);
        assert_eq!(network.link_count(), 1);

        let link = network.link_index(LinkId(1)).unwrap();
        assert_eq!(network.endpoints(link), (NodeIndex::new(0), NodeIndex::new(1)));
        assert_eq!(network.link(link).cost, 10.0);
    }

    #[test]
    fn test_out_of_range_ids() {
        let mut network = two_node_network();
        assert!(matches!(
            network.node_index(NodeId(3)),
            Err(TapError::InvalidNode { id: 3, node_count: 2 })
        ));
        assert!(matches!(
            network.link_index(LinkId(0)),
            Err(TapError::InvalidLink { .. })
        ));
        assert!(network
            .add_link(NodeId(1), NodeId(9), CostFunction::constant(1.0))
            .is_err());
        assert!(network.add_demand(NodeId(1), NodeId(9), 1.0).is_err());
    }

    #[test]
    fn test_negative_demand_rejected() {
        let mut network = two_node_network();
        assert!(matches!(
            network.add_demand(NodeId(1), NodeId(2), -1.0),
            Err(TapError::Validation(_))
        ));
    }

    #[test]
    fn test_cost_is_pure_in_flow() {
        let mut network = two_node_network();
        let link = EdgeIndex::new(0);
        let mut diag = Diagnostics::new();
        network.add_flow(link, 3.0, &mut diag);
        // What-if evaluation ignores the stored flow
        assert_eq!(network.cost(link, 0.0), 10.0);
        assert_eq!(network.cost(link, 5.0), 20.0);
        assert_eq!(network.cost_derivative(link, 5.0), 2.0);
        assert_eq!(network.link(link).cost, 16.0);
    }

    #[test]
    fn test_add_flow_clamps_and_warns() {
        let mut network = two_node_network();
        let link = EdgeIndex::new(0);
        let mut diag = Diagnostics::new();

        network.add_flow(link, 1.0, &mut diag);
        network.add_flow(link, -1.0 - 1e-13, &mut diag);
        assert_eq!(network.link(link).flow, 0.0);
        assert_eq!(diag.clamped_flows, 1);
        assert_eq!(diag.warning_count(), 0);

        network.add_flow(link, -2.0, &mut diag);
        assert_eq!(network.link(link).flow, 0.0);
        assert_eq!(network.link(link).cost, 10.0);
        assert_eq!(diag.in_category(Category::Numeric).count(), 1);
    }

    #[test]
    fn test_system_measures() {
        let mut network = two_node_network();
        let mut diag = Diagnostics::new();
        network.set_flows(&[4.0], &mut diag);
        assert_eq!(network.total_system_travel_time(), 4.0 * 18.0);
        assert_eq!(network.beckmann_objective(), 10.0 * 4.0 + 16.0);
        assert_eq!(network.beckmann_at(&[0.0]), 0.0);
    }

    #[test]
    fn test_zone_thru_restriction() {
        let mut network = Network::with_nodes(4, 2);
        network.first_thru_node = 3;
        assert!(!network.allows_through(NodeIndex::new(0)));
        assert!(!network.allows_through(NodeIndex::new(1)));
        assert!(network.allows_through(NodeIndex::new(2)));
        assert_eq!(network.stats().num_zones, 2);
    }

    #[test]
    fn test_network_validation() {
        let mut network = Network::with_nodes(2, 2);
        network
            .add_link(NodeId(1), NodeId(2), CostFunction::bpr(1.0, 0.0, 0.15, 4.0))
            .unwrap();
        network
            .add_link(NodeId(2), NodeId(1), CostFunction::linear(1.0, -1.0))
            .unwrap();
        let mut diag = Diagnostics::new();
        network.validate_into(&mut diag);
        assert_eq!(diag.error_count(), 2);
        assert!(diag.warnings().any(|i| i.message.contains("no inter-zonal demand")));
    }

    #[test]
    fn test_network_validation_empty() {
        let network = Network::new();
        let mut diag = Diagnostics::new();
        network.validate_into(&mut diag);
        assert!(diag.has_errors());
        assert!(diag.errors().any(|i| i.message.contains("no nodes")));
    }
}
