//! Label-setting shortest paths and the shortest/longest labels of a bush.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::bush::{Bush, USED_FLOW};
use crate::flows::LinkCosts;

/// Relative tolerance under which two path costs are treated as equal.
const TIE_TOLERANCE: f64 = 1e-12;

/// Shortest-path tree from one origin under the current link costs.
#[derive(Debug, Clone)]
pub struct ShortestPathTree {
    pub origin: NodeIndex,
    /// Cost of the shortest path to each node; `INFINITY` when unreachable
    pub distance: Vec<f64>,
    /// Last link on the shortest path to each node
    pub predecessor: Vec<Option<EdgeIndex>>,
}

impl ShortestPathTree {
    pub fn is_reachable(&self, node: NodeIndex) -> bool {
        self.distance[node.index()].is_finite()
    }

    pub fn distance_to(&self, node: NodeIndex) -> f64 {
        self.distance[node.index()]
    }

    /// Membership mask of the tree's predecessor links, indexed by edge index.
    pub fn link_mask(&self, link_count: usize) -> Vec<bool> {
        let mut mask = vec![false; link_count];
        for link in self.predecessor.iter().flatten() {
            mask[link.index()] = true;
        }
        mask
    }

    /// Links of the tree path to `node`, from `node` back toward the origin.
    pub fn path_to<C: LinkCosts + ?Sized>(&self, costs: &C, node: NodeIndex) -> Vec<EdgeIndex> {
        let network = costs.network();
        let mut path = Vec::new();
        let mut current = node;
        while let Some(link) = self.predecessor[current.index()] {
            path.push(link);
            current = network.endpoints(link).0;
            if path.len() > network.link_count() {
                break;
            }
        }
        path
    }
}

#[derive(Copy, Clone, PartialEq)]
struct QueueEntry {
    distance: f64,
    node: NodeIndex,
}

impl Eq for QueueEntry {}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so that BinaryHeap pops the smallest distance first
        other
            .distance
            .total_cmp(&self.distance)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Dijkstra from `origin` over the whole network.
///
/// Zone nodes other than the origin are never expanded when the network restricts
/// through traffic. With a `bush` given, equal-cost ties prefer links already in the
/// bush and, among those, tails earlier in the bush's topological order, so that the
/// tree disturbs the bush as little as possible.
pub fn build_tree<C: LinkCosts + ?Sized>(
    costs: &C,
    origin: NodeIndex,
    bush: Option<&Bush>,
) -> ShortestPathTree {
    let network = costs.network();
    let n = network.node_count();
    let mut distance = vec![f64::INFINITY; n];
    let mut predecessor: Vec<Option<EdgeIndex>> = vec![None; n];
    let mut settled = vec![false; n];
    let mut heap = BinaryHeap::new();

    distance[origin.index()] = 0.0;
    heap.push(QueueEntry {
        distance: 0.0,
        node: origin,
    });

    while let Some(QueueEntry { distance: d, node }) = heap.pop() {
        if settled[node.index()] {
            continue;
        }
        settled[node.index()] = true;
        if node != origin && !network.allows_through(node) {
            continue;
        }

        for edge in network.graph.edges_directed(node, Direction::Outgoing) {
            let head = edge.target();
            if settled[head.index()] {
                continue;
            }
            let candidate = d + costs.cost(edge.id());
            let current = distance[head.index()];
            let tolerance = TIE_TOLERANCE * current.abs().max(1.0);
            if !current.is_finite() || candidate < current - tolerance {
                distance[head.index()] = candidate;
                predecessor[head.index()] = Some(edge.id());
                heap.push(QueueEntry {
                    distance: candidate,
                    node: head,
                });
            } else if candidate <= current + tolerance {
                if let Some(bush) = bush {
                    if prefers(costs, bush, edge.id(), predecessor[head.index()]) {
                        predecessor[head.index()] = Some(edge.id());
                    }
                }
            }
        }
    }

    ShortestPathTree {
        origin,
        distance,
        predecessor,
    }
}

fn prefers<C: LinkCosts + ?Sized>(
    costs: &C,
    bush: &Bush,
    candidate: EdgeIndex,
    incumbent: Option<EdgeIndex>,
) -> bool {
    let Some(incumbent) = incumbent else {
        return true;
    };
    match (bush.contains(candidate), bush.contains(incumbent)) {
        (true, false) => true,
        (true, true) => {
            let network = costs.network();
            let new_tail = bush.position(network.endpoints(candidate).0);
            let old_tail = bush.position(network.endpoints(incumbent).0);
            matches!((new_tail, old_tail), (Some(a), Some(b)) if a < b)
        }
        _ => false,
    }
}

/// Minimum-cost and maximum-cost-over-used-links labels of one bush.
#[derive(Debug, Clone)]
pub struct BushLabels {
    /// Cheapest cost from the origin using any bush link
    pub shortest: Vec<f64>,
    pub shortest_pred: Vec<Option<EdgeIndex>>,
    /// Costliest cost from the origin using only links that carry flow
    pub longest: Vec<f64>,
    pub longest_pred: Vec<Option<EdgeIndex>>,
}

impl BushLabels {
    /// Longest-used minus shortest label at `node`.
    pub fn excess(&self, node: NodeIndex) -> f64 {
        let (u, s) = (self.longest[node.index()], self.shortest[node.index()]);
        if u.is_finite() && s.is_finite() {
            u - s
        } else {
            0.0
        }
    }

    /// Largest excess over all nodes of `bush`.
    pub fn max_excess(&self, bush: &Bush) -> f64 {
        bush.order()
            .iter()
            .map(|&node| self.excess(node))
            .fold(0.0, f64::max)
    }
}

/// Compute [`BushLabels`] by one pass over the bush's topological order.
///
/// A node that no used link enters takes its longest label (and predecessor) from the
/// shortest one.
pub fn bush_labels<C: LinkCosts + ?Sized>(costs: &C, bush: &Bush) -> BushLabels {
    let network = costs.network();
    let n = network.node_count();
    let mut labels = BushLabels {
        shortest: vec![f64::INFINITY; n],
        shortest_pred: vec![None; n],
        longest: vec![f64::NEG_INFINITY; n],
        longest_pred: vec![None; n],
    };

    for &node in bush.order() {
        let i = node.index();
        if node == bush.origin() {
            labels.shortest[i] = 0.0;
            labels.longest[i] = 0.0;
            continue;
        }
        for edge in network.graph.edges_directed(node, Direction::Incoming) {
            if !bush.contains(edge.id()) {
                continue;
            }
            let tail = edge.source().index();
            let cost = costs.cost(edge.id());

            let s = labels.shortest[tail] + cost;
            if s < labels.shortest[i] {
                labels.shortest[i] = s;
                labels.shortest_pred[i] = Some(edge.id());
            }
            if bush.flow(edge.id()) > USED_FLOW {
                let u = labels.longest[tail] + cost;
                if u > labels.longest[i] {
                    labels.longest[i] = u;
                    labels.longest_pred[i] = Some(edge.id());
                }
            }
        }
        if labels.longest_pred[i].is_none() {
            labels.longest[i] = labels.shortest[i];
            labels.longest_pred[i] = labels.shortest_pred[i];
        }
    }

    labels
}
