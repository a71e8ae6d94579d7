//! Per-origin bushes.
//!
//! A bush is an acyclic subgraph rooted at one origin that carries all of that origin's
//! demand. Each bush stores its own link flows; the network's link flow is the sum over
//! all bushes.
//!
//! ```text
//!   update(tree)
//!   ├─ prune   links with no flow that the current tree does not use
//!   ├─ add     shortest-tree links missing from the bush
//!   └─ order   Kahn topological sort
//!              └─ cycle? roll back the additions, then re-add them one at a time,
//!                 skipping any that would close a cycle
//! ```

use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::VecDeque;
use tap_core::{Network, OriginDemand, TapError};
use thiserror::Error;
use tracing::warn;

use crate::flows::LinkFlows;
use crate::shortest_path::ShortestPathTree;

/// Bush flow at or below this is treated as unused.
pub const USED_FLOW: f64 = 1e-12;

#[derive(Debug, Error)]
pub enum BushError {
    #[error("bush for origin {origin} has no topological order")]
    Cycle { origin: usize },

    #[error("destination {destination} is unreachable from origin {origin}")]
    Unreachable { origin: usize, destination: usize },
}

impl From<BushError> for TapError {
    fn from(err: BushError) -> Self {
        match err {
            BushError::Cycle { .. } => TapError::Solver(err.to_string()),
            BushError::Unreachable { .. } => TapError::Connectivity(err.to_string()),
        }
    }
}

/// What one [`Bush::update`] changed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BushUpdate {
    pub added: usize,
    pub removed: usize,
    /// Tree links left out because they would have closed a cycle
    pub rejected: usize,
    pub rolled_back: bool,
}

#[derive(Debug, Clone)]
pub struct Bush {
    origin: NodeIndex,
    demand: OriginDemand,
    links: Vec<bool>,
    flow: Vec<f64>,
    order: Vec<NodeIndex>,
    position: Vec<Option<usize>>,
}

impl Bush {
    /// An empty bush (origin only) for `demand`.
    pub fn new(network: &Network, demand: OriginDemand) -> Self {
        let mut position = vec![None; network.node_count()];
        position[demand.origin.index()] = Some(0);
        Self {
            origin: demand.origin,
            links: vec![false; network.link_count()],
            flow: vec![0.0; network.link_count()],
            order: vec![demand.origin],
            position,
            demand,
        }
    }

    pub fn origin(&self) -> NodeIndex {
        self.origin
    }

    pub fn demand(&self) -> &OriginDemand {
        &self.demand
    }

    #[inline]
    pub fn contains(&self, link: EdgeIndex) -> bool {
        self.links[link.index()]
    }

    #[inline]
    pub fn flow(&self, link: EdgeIndex) -> f64 {
        self.flow[link.index()]
    }

    pub fn flows(&self) -> &[f64] {
        &self.flow
    }

    /// Bush nodes in topological order, origin first.
    pub fn order(&self) -> &[NodeIndex] {
        &self.order
    }

    /// Position of `node` in the topological order, `None` outside the bush.
    #[inline]
    pub fn position(&self, node: NodeIndex) -> Option<usize> {
        self.position[node.index()]
    }

    pub fn link_count(&self) -> usize {
        self.links.iter().filter(|&&b| b).count()
    }

    pub fn links(&self) -> impl Iterator<Item = EdgeIndex> + '_ {
        self.links
            .iter()
            .enumerate()
            .filter(|(_, member)| **member)
            .map(|(i, _)| EdgeIndex::new(i))
    }

    /// Build the bush from the free-flow tree and load every destination's demand
    /// onto its tree path.
    pub fn initialize<F: LinkFlows + ?Sized>(
        &mut self,
        flows: &mut F,
        tree: &ShortestPathTree,
    ) -> Result<(), BushError> {
        self.links.iter_mut().for_each(|b| *b = false);
        self.flow.iter_mut().for_each(|x| *x = 0.0);
        for link in tree.predecessor.iter().flatten() {
            self.links[link.index()] = true;
        }

        let destinations = self.demand.destinations.clone();
        for (destination, demand) in destinations {
            if !tree.is_reachable(destination) {
                return Err(BushError::Unreachable {
                    origin: self.origin.index() + 1,
                    destination: destination.index() + 1,
                });
            }
            for link in tree.path_to(flows.network(), destination) {
                self.shift(flows, link, demand);
            }
        }

        self.rebuild_order(flows.network())
    }

    /// Prune unused links, add the tree's links, and restore a topological order.
    pub fn update<F: LinkFlows + ?Sized>(
        &mut self,
        flows: &mut F,
        tree: &ShortestPathTree,
    ) -> Result<BushUpdate, BushError> {
        let mut result = BushUpdate::default();
        let tree_links = tree.link_mask(self.links.len());

        let mut in_degree = self.in_degrees(flows.network());
        let members: Vec<EdgeIndex> = self.links().collect();
        for link in members {
            if tree_links[link.index()] || self.flow(link) > USED_FLOW {
                continue;
            }
            let head = flows.network().endpoints(link).1;
            // Never strand a node that is still in the bush
            if in_degree[head.index()] <= 1 {
                continue;
            }
            let residual = self.flow(link);
            if residual != 0.0 {
                self.shift(flows, link, -residual);
            }
            self.links[link.index()] = false;
            in_degree[head.index()] -= 1;
            result.removed += 1;
        }

        let mut candidates: Vec<EdgeIndex> = tree
            .predecessor
            .iter()
            .flatten()
            .copied()
            .filter(|&link| !self.contains(link))
            .collect();
        if candidates.is_empty() {
            // Pruning alone never creates a cycle
            self.rebuild_order(flows.network())?;
            return Ok(result);
        }
        candidates.sort_by(|&a, &b| {
            let da = tree.distance_to(flows.network().endpoints(a).0);
            let db = tree.distance_to(flows.network().endpoints(b).0);
            da.total_cmp(&db).then(a.cmp(&b))
        });

        for &link in &candidates {
            self.links[link.index()] = true;
        }
        if self.rebuild_order(flows.network()).is_ok() {
            result.added = candidates.len();
            return Ok(result);
        }

        warn!(
            origin = self.origin.index() + 1,
            candidates = candidates.len(),
            "bush update produced a cycle, re-adding tree links one at a time"
        );
        result.rolled_back = true;
        for &link in &candidates {
            self.links[link.index()] = false;
        }
        self.rebuild_order(flows.network())?;

        let network = flows.network();
        let mut in_bush: Vec<bool> = self.position.iter().map(Option::is_some).collect();
        for &link in &candidates {
            let (tail, head) = network.endpoints(link);
            if !in_bush[tail.index()] || self.creates_cycle(network, link) {
                result.rejected += 1;
                continue;
            }
            self.links[link.index()] = true;
            in_bush[head.index()] = true;
            result.added += 1;
        }
        self.rebuild_order(flows.network())?;
        Ok(result)
    }

    /// Move `delta` of this origin's flow onto `link`, mirrored into `flows`.
    ///
    /// Bush flow never goes negative; the applied change is returned.
    pub fn shift<F: LinkFlows + ?Sized>(&mut self, flows: &mut F, link: EdgeIndex, delta: f64) -> f64 {
        let old = self.flow[link.index()];
        let new = (old + delta).max(0.0);
        self.flow[link.index()] = new;
        let applied = new - old;
        flows.shift(link, applied);
        applied
    }

    /// Scale this bush's last change back toward `before`: `before + lambda * (now - before)`.
    pub fn blend(&mut self, before: &[f64], lambda: f64) {
        for (flow, &old) in self.flow.iter_mut().zip(before) {
            *flow = (old + lambda * (*flow - old)).max(0.0);
        }
    }

    /// Largest violation of flow conservation over all nodes.
    pub fn conservation_error(&self, network: &Network) -> f64 {
        let mut balance = vec![0.0; network.node_count()];
        for link in self.links() {
            let (tail, head) = network.endpoints(link);
            balance[tail.index()] -= self.flow(link);
            balance[head.index()] += self.flow(link);
        }
        // Flow on links that left the bush would also break conservation
        let stray: f64 = self
            .flow
            .iter()
            .zip(&self.links)
            .filter(|(_, member)| !**member)
            .map(|(x, _)| x.abs())
            .sum();

        balance[self.origin.index()] += self.demand.total;
        for &(destination, demand) in &self.demand.destinations {
            balance[destination.index()] -= demand;
        }
        balance.iter().map(|b| b.abs()).fold(stray, f64::max)
    }

    fn in_degrees(&self, network: &Network) -> Vec<usize> {
        let mut in_degree = vec![0; network.node_count()];
        for link in self.links() {
            in_degree[network.endpoints(link).1.index()] += 1;
        }
        in_degree
    }

    /// Kahn's algorithm over the member links.
    fn rebuild_order(&mut self, network: &Network) -> Result<(), BushError> {
        let mut in_degree = self.in_degrees(network);
        let mut member_node = vec![false; network.node_count()];
        member_node[self.origin.index()] = true;
        for link in self.links() {
            member_node[network.endpoints(link).1.index()] = true;
        }
        let expected = member_node.iter().filter(|&&b| b).count();

        let mut order = Vec::with_capacity(expected);
        let mut queue = VecDeque::new();
        if in_degree[self.origin.index()] == 0 {
            queue.push_back(self.origin);
        }
        while let Some(node) = queue.pop_front() {
            order.push(node);
            for edge in network.graph.edges_directed(node, Direction::Outgoing) {
                if !self.contains(edge.id()) {
                    continue;
                }
                let head = edge.target().index();
                in_degree[head] -= 1;
                if in_degree[head] == 0 {
                    queue.push_back(edge.target());
                }
            }
        }

        if order.len() != expected {
            return Err(BushError::Cycle {
                origin: self.origin.index() + 1,
            });
        }
        self.position.iter_mut().for_each(|p| *p = None);
        for (k, &node) in order.iter().enumerate() {
            self.position[node.index()] = Some(k);
        }
        self.order = order;
        Ok(())
    }

    /// Whether adding `link` would let its head reach its tail inside the bush.
    fn creates_cycle(&self, network: &Network, link: EdgeIndex) -> bool {
        let (tail, head) = network.endpoints(link);
        if tail == head || head == self.origin {
            return true;
        }
        let mut seen = vec![false; network.node_count()];
        let mut stack = vec![head];
        seen[head.index()] = true;
        while let Some(node) = stack.pop() {
            if node == tail {
                return true;
            }
            for edge in network.graph.edges_directed(node, Direction::Outgoing) {
                if self.contains(edge.id()) && !seen[edge.target().index()] {
                    seen[edge.target().index()] = true;
                    stack.push(edge.target());
                }
            }
        }
        false
    }
}
