use crate::{Category, Diagnostics, Network, Subject, TapError, TapResult};
use petgraph::algo::kosaraju_scc;
use petgraph::graph::{EdgeIndex, NodeIndex};
use std::collections::VecDeque;

/// Lower bound on the cost of an artificial connector.
pub const MIN_ARTIFICIAL_COST: f64 = 99_999.0;

/// Summary statistics for a directed road network.
#[derive(Debug)]
pub struct GraphStats {
    pub node_count: usize,
    pub link_count: usize,
    pub strongly_connected_components: usize,
    pub min_out_degree: usize,
    pub avg_out_degree: f64,
    pub max_out_degree: usize,
    pub density: f64,
}

/// What connectivity repair found and changed.
#[derive(Debug, Default)]
pub struct ConnectivityReport {
    /// Strongly connected components before repair
    pub components: usize,
    /// Connectors added, in insertion order
    pub artificial_links: Vec<EdgeIndex>,
}

impl ConnectivityReport {
    pub fn was_connected(&self) -> bool {
        self.artificial_links.is_empty()
    }
}

pub fn graph_stats(network: &Network) -> GraphStats {
    let node_count = network.node_count();
    let link_count = network.link_count();
    let degrees: Vec<usize> = network
        .graph
        .node_indices()
        .map(|n| network.graph.neighbors(n).count())
        .collect();
    let min_out_degree = degrees.iter().copied().min().unwrap_or(0);
    let max_out_degree = degrees.iter().copied().max().unwrap_or(0);
    let avg_out_degree = if node_count == 0 {
        0.0
    } else {
        link_count as f64 / node_count as f64
    };
    let density = if node_count < 2 {
        0.0
    } else {
        link_count as f64 / (node_count as f64 * (node_count as f64 - 1.0))
    };
    GraphStats {
        node_count,
        link_count,
        strongly_connected_components: kosaraju_scc(&network.graph).len(),
        min_out_degree,
        avg_out_degree,
        max_out_degree,
        density,
    }
}

/// Cost given to artificial connectors: high enough that no real route is ever worse.
pub fn artificial_link_cost(network: &Network) -> f64 {
    (1000.0 * network.total_free_flow_cost()).max(MIN_ARTIFICIAL_COST)
}

pub fn is_strongly_connected(network: &Network) -> bool {
    kosaraju_scc(&network.graph).len() <= 1
}

/// Nodes reachable from `origin` by paths that never pass through a zone other than `origin`.
pub fn reachable_from(network: &Network, origin: NodeIndex) -> Vec<bool> {
    let mut seen = vec![false; network.node_count()];
    let mut queue = VecDeque::new();
    seen[origin.index()] = true;
    queue.push_back(origin);
    while let Some(node) = queue.pop_front() {
        if node != origin && !network.allows_through(node) {
            continue;
        }
        for next in network.graph.neighbors(node) {
            if !seen[next.index()] {
                seen[next.index()] = true;
                queue.push_back(next);
            }
        }
    }
    seen
}

/// Make every destination reachable from every origin, adding artificial links where needed.
///
/// Strongly connected components are joined in a ring through one representative each
/// (a thru-node where the component has one). Afterwards each origin is searched forward
/// under the zone thru restriction, and any OD pair with positive demand that is still
/// unreachable gets a direct origin-to-destination connector.
pub fn make_strongly_connected(
    network: &mut Network,
    diag: &mut Diagnostics,
) -> TapResult<ConnectivityReport> {
    if network.node_count() == 0 {
        return Err(TapError::Connectivity(
            "network has no nodes to connect".into(),
        ));
    }
    for pair in &network.od_pairs {
        network.node_index(pair.origin)?;
        network.node_index(pair.destination)?;
    }

    let cost = artificial_link_cost(network);
    let components = kosaraju_scc(&network.graph);
    let mut report = ConnectivityReport {
        components: components.len(),
        artificial_links: Vec::new(),
    };

    if components.len() > 1 {
        let representatives: Vec<NodeIndex> = components
            .iter()
            .filter_map(|members| {
                members
                    .iter()
                    .copied()
                    .filter(|&n| network.allows_through(n))
                    .min()
                    .or_else(|| members.iter().copied().min())
            })
            .collect();
        for (k, &tail) in representatives.iter().enumerate() {
            let head = representatives[(k + 1) % representatives.len()];
            add_connector(network, tail, head, cost, diag, &mut report);
        }
    }

    for demand in network.origin_demands() {
        let reached = reachable_from(network, demand.origin);
        for &(destination, _) in &demand.destinations {
            if !reached[destination.index()] {
                add_connector(network, demand.origin, destination, cost, diag, &mut report);
            }
        }
    }

    Ok(report)
}

fn add_connector(
    network: &mut Network,
    tail: NodeIndex,
    head: NodeIndex,
    cost: f64,
    diag: &mut Diagnostics,
    report: &mut ConnectivityReport,
) {
    let link = network.add_artificial_link(tail, head, cost);
    diag.warn_on(
        Category::Connectivity,
        Subject::Link(network.link(link).id),
        format!(
            "added artificial link {} -> {} with cost {cost}",
            network.node(tail).id,
            network.node(head).id
        ),
    );
    report.artificial_links.push(link);
}
