//! End-to-end equilibrium properties of Algorithm B

use tap_algo::{solve, AlgorithmB, AlgorithmBConfig, GapFunction, SweepMode, Termination};
use tap_core::{CostFunction, Diagnostics, EdgeIndex, Network, NodeId};

fn link(network: &mut Network, from: usize, to: usize, cost: CostFunction) {
    network
        .add_link(NodeId::new(from), NodeId::new(to), cost)
        .unwrap();
}

/// Braess network; equilibrium has every path at cost 92.
fn braess() -> Network {
    let mut network = Network::with_nodes(4, 4);
    link(&mut network, 1, 2, CostFunction::linear(0.0, 10.0));
    link(&mut network, 1, 3, CostFunction::linear(50.0, 1.0));
    link(&mut network, 2, 4, CostFunction::linear(50.0, 1.0));
    link(&mut network, 3, 4, CostFunction::linear(0.0, 10.0));
    link(&mut network, 2, 3, CostFunction::linear(10.0, 1.0));
    network.add_demand(NodeId::new(1), NodeId::new(4), 6.0).unwrap();
    network
}

/// `n` x `n` grid with two-way BPR links; demand from the top row to the bottom row.
fn grid(n: usize) -> Network {
    let mut network = Network::with_nodes(n * n, n * n);
    let id = |r: usize, c: usize| r * n + c + 1;
    for r in 0..n {
        for c in 0..n {
            let fft = 1.0 + ((r * 7 + c * 3) % 5) as f64;
            if c + 1 < n {
                link(&mut network, id(r, c), id(r, c + 1), CostFunction::bpr(fft, 40.0, 0.15, 4.0));
                link(&mut network, id(r, c + 1), id(r, c), CostFunction::bpr(fft, 40.0, 0.15, 4.0));
            }
            if r + 1 < n {
                link(&mut network, id(r, c), id(r + 1, c), CostFunction::bpr(fft, 40.0, 0.15, 4.0));
                link(&mut network, id(r + 1, c), id(r, c), CostFunction::bpr(fft, 40.0, 0.15, 4.0));
            }
        }
    }
    for a in 0..n {
        for b in 0..n {
            let demand = 20.0 + 5.0 * ((a + 2 * b) % 3) as f64;
            network
                .add_demand(NodeId::new(id(0, a)), NodeId::new(id(n - 1, b)), demand)
                .unwrap();
        }
    }
    network
}

fn assert_consistent(solver: &AlgorithmB, network: &Network) {
    let mut summed = vec![0.0; network.link_count()];
    for bush in solver.bushes() {
        assert!(
            bush.conservation_error(network) < 1e-6,
            "origin {} violates conservation",
            bush.origin().index() + 1
        );
        for (total, x) in summed.iter_mut().zip(bush.flows()) {
            assert!(*x >= 0.0);
            *total += x;
        }
    }
    for (k, total) in summed.iter().enumerate() {
        let flow = network.link(EdgeIndex::new(k)).flow;
        assert!(flow >= 0.0);
        assert!((flow - total).abs() < 1e-6, "link {} flow {flow} != {total}", k + 1);
    }
}

#[test]
fn braess_reaches_known_equilibrium() {
    for sweep in [SweepMode::Sequential, SweepMode::Jacobi] {
        let mut network = braess();
        let mut diag = Diagnostics::new();
        let config = AlgorithmBConfig::default()
            .with_convergence_gap(1e-10)
            .with_sweep(sweep);
        let mut solver = AlgorithmB::new(config);
        let outcome = solver.run(&mut network, &mut diag).unwrap();

        assert!(outcome.converged(), "{sweep} did not converge: {outcome:?}");
        let expected = [4.0, 2.0, 2.0, 4.0, 2.0];
        for (k, want) in expected.iter().enumerate() {
            let got = network.link(EdgeIndex::new(k)).flow;
            assert!((got - want).abs() < 1e-4, "{sweep}: link {} has {got}", k + 1);
        }
        // Each of the three paths costs 92
        let cost = |k: usize| network.link(EdgeIndex::new(k)).cost;
        assert!((cost(0) + cost(2) - 92.0).abs() < 1e-3);
        assert!((cost(1) + cost(3) - 92.0).abs() < 1e-3);
        assert!((cost(0) + cost(4) + cost(3) - 92.0).abs() < 1e-3);
        assert_consistent(&solver, &network);
    }
}

#[test]
fn flows_stay_conserved_while_iterating() {
    let mut network = grid(4);
    let mut diag = Diagnostics::new();
    let config = AlgorithmBConfig::default()
        .with_convergence_gap(0.0)
        .with_max_iterations(1);
    let mut solver = AlgorithmB::new(config);
    for _ in 0..5 {
        let outcome = solver.run(&mut network, &mut diag).unwrap();
        assert_eq!(outcome.termination, Termination::IterationLimitReached);
        assert_consistent(&solver, &network);
    }
    assert_eq!(solver.total_iterations(), 5);
}

#[test]
fn gap_trends_down() {
    let mut network = grid(5);
    let mut diag = Diagnostics::new();
    let config = AlgorithmBConfig::default().with_convergence_gap(1e-8);
    let outcome = solve(&mut network, config, &mut diag).unwrap();

    assert!(outcome.converged());
    let history = &outcome.history;
    assert!(history.len() >= 2);
    assert!(history.last().unwrap().gap < history[0].gap);
    assert!(outcome.gap < 1e-8);
}

#[test]
fn zero_demand_leaves_network_empty() {
    let mut network = braess();
    network.od_pairs.clear();
    network.add_demand(NodeId::new(1), NodeId::new(4), 0.0).unwrap();
    let mut diag = Diagnostics::new();
    let outcome = solve(&mut network, AlgorithmBConfig::default(), &mut diag).unwrap();

    assert!(outcome.converged());
    assert_eq!(outcome.iterations, 0);
    assert_eq!(outcome.gap, 0.0);
    assert!(network.link_flows().iter().all(|&x| x == 0.0));
}

#[test]
fn single_path_carries_all_demand() {
    let mut network = Network::with_nodes(3, 3);
    link(&mut network, 1, 2, CostFunction::bpr(3.0, 10.0, 0.15, 4.0));
    link(&mut network, 2, 3, CostFunction::bpr(4.0, 10.0, 0.15, 4.0));
    network.add_demand(NodeId::new(1), NodeId::new(3), 25.0).unwrap();
    let mut diag = Diagnostics::new();
    let outcome = solve(&mut network, AlgorithmBConfig::default(), &mut diag).unwrap();

    assert!(outcome.converged());
    assert_eq!(network.link_flows(), vec![25.0, 25.0]);
}

#[test]
fn identical_parallel_links_split_evenly() {
    let mut network = Network::with_nodes(2, 2);
    link(&mut network, 1, 2, CostFunction::bpr(5.0, 50.0, 0.15, 4.0));
    link(&mut network, 1, 2, CostFunction::bpr(5.0, 50.0, 0.15, 4.0));
    network.add_demand(NodeId::new(1), NodeId::new(2), 100.0).unwrap();
    let mut diag = Diagnostics::new();
    let config = AlgorithmBConfig::default().with_convergence_gap(1e-12);
    let outcome = solve(&mut network, config, &mut diag).unwrap();

    assert!(outcome.converged());
    let flows = network.link_flows();
    assert!((flows[0] - 50.0).abs() < 1e-4);
    assert!((flows[1] - 50.0).abs() < 1e-4);
}

#[test]
fn rerunning_a_converged_solution_changes_nothing() {
    let mut network = grid(4);
    let mut diag = Diagnostics::new();
    let mut solver = AlgorithmB::new(AlgorithmBConfig::default());
    let first = solver.run(&mut network, &mut diag).unwrap();
    assert!(first.converged());
    let flows = network.link_flows();

    let second = solver.run(&mut network, &mut diag).unwrap();
    assert!(second.converged());
    assert_eq!(second.iterations, 0);
    assert_eq!(network.link_flows(), flows);
}

#[test]
fn iterating_from_equilibrium_stays_there() {
    let mut network = grid(4);
    let mut diag = Diagnostics::new();
    let mut solver = AlgorithmB::new(AlgorithmBConfig::default().with_convergence_gap(1e-8));
    let first = solver.run(&mut network, &mut diag).unwrap();
    assert!(first.converged(), "gap {}", first.gap);
    let flows = network.link_flows();

    *solver.config_mut() = AlgorithmBConfig::default()
        .with_convergence_gap(0.0)
        .with_max_iterations(3);
    let forced = solver.run(&mut network, &mut diag).unwrap();
    assert_eq!(forced.termination, Termination::IterationLimitReached);
    assert_eq!(forced.iterations, 3);
    assert_eq!(solver.total_iterations(), first.iterations + 3);
    assert!(forced.gap < 1e-6, "gap grew to {}", forced.gap);

    // Link flows are in the tens; equilibrium link flows are unique
    let max_change = flows
        .iter()
        .zip(network.link_flows())
        .map(|(a, b)| (a - b).abs())
        .fold(0.0, f64::max);
    assert!(max_change < 0.05, "flows moved by {max_change}");
    assert_consistent(&solver, &network);
}

#[test]
fn jacobi_iterations_never_raise_the_objective() {
    let mut network = grid(4);
    let mut diag = Diagnostics::new();
    let config = AlgorithmBConfig::default()
        .with_sweep(SweepMode::Jacobi)
        .with_convergence_gap(0.0)
        .with_max_iterations(1);
    let mut solver = AlgorithmB::new(config);
    let mut previous = f64::INFINITY;
    for _ in 0..15 {
        let outcome = solver.run(&mut network, &mut diag).unwrap();
        let objective = outcome.beckmann_objective;
        assert!(
            objective <= previous + 1e-9 * previous.abs().max(1.0),
            "objective rose from {previous} to {objective}"
        );
        previous = objective;
    }
    assert_consistent(&solver, &network);
}

#[test]
fn zero_iterations_gives_all_or_nothing_loading() {
    let mut network = braess();
    let mut diag = Diagnostics::new();
    let config = AlgorithmBConfig::default().with_max_iterations(0);
    let outcome = solve(&mut network, config, &mut diag).unwrap();

    assert_eq!(outcome.termination, Termination::IterationLimitReached);
    // Free-flow shortest path is 1 -> 2 -> 3 -> 4
    assert_eq!(network.link_flows(), vec![6.0, 0.0, 0.0, 6.0, 6.0]);
}

#[test]
fn sweep_orderings_agree_on_the_equilibrium() {
    let mut diag = Diagnostics::new();
    let mut results = Vec::new();
    for sweep in [SweepMode::Sequential, SweepMode::Jacobi] {
        let mut network = grid(4);
        let config = AlgorithmBConfig::default()
            .with_sweep(sweep)
            .with_convergence_gap(1e-6);
        let mut solver = AlgorithmB::new(config);
        let outcome = solver.run(&mut network, &mut diag).unwrap();
        assert!(outcome.converged(), "{sweep} did not converge: gap {}", outcome.gap);
        assert_consistent(&solver, &network);
        results.push(outcome.beckmann_objective);
    }
    let relative = (results[0] - results[1]).abs() / results[0];
    assert!(relative < 1e-5, "objectives differ: {results:?}");
}

#[test]
fn every_gap_function_converges() {
    for gap_function in [
        GapFunction::RelativeGap1,
        GapFunction::RelativeGap2,
        GapFunction::AverageExcessCost,
        GapFunction::MaximumExcessCost,
    ] {
        let mut network = braess();
        let mut diag = Diagnostics::new();
        let config = AlgorithmBConfig::default()
            .with_gap_function(gap_function)
            .with_convergence_gap(1e-6);
        let outcome = solve(&mut network, config, &mut diag).unwrap();
        assert!(outcome.converged(), "{gap_function} did not converge");
        assert_eq!(outcome.gap_function, gap_function);
    }
}
