//! # tap-algo: User-Equilibrium Traffic Assignment
//!
//! Solves the static user-equilibrium traffic assignment problem with Algorithm B: each
//! origin keeps an acyclic *bush* carrying all of its demand, and flow is moved inside
//! each bush from its costliest used paths to its cheapest ones until no traveller can
//! improve by switching routes.
//!
//! ## Quick Start
//!
//! ```rust
//! use tap_algo::{AlgorithmB, AlgorithmBConfig};
//! use tap_core::{CostFunction, Diagnostics, Network, NodeId};
//!
//! let mut network = Network::with_nodes(2, 2);
//! network.add_link(NodeId::new(1), NodeId::new(2), CostFunction::linear(10.0, 1.0)).unwrap();
//! network.add_link(NodeId::new(1), NodeId::new(2), CostFunction::linear(12.0, 1.0)).unwrap();
//! network.add_demand(NodeId::new(1), NodeId::new(2), 10.0).unwrap();
//!
//! let mut diag = Diagnostics::new();
//! let mut solver = AlgorithmB::new(AlgorithmBConfig::default());
//! let outcome = solver.run(&mut network, &mut diag).unwrap();
//! assert!(outcome.converged());
//! ```
//!
//! ## Modules
//!
//! - [`algorithm_b`] - Controller, state machine, and both sweep orderings
//! - [`bush`] - Per-origin acyclic subgraphs and their maintenance
//! - [`flow_shift`] - Newton flow shifts between diverging bush segments
//! - [`shortest_path`] - Dijkstra trees and bush shortest/longest labels
//! - [`gap`] - Convergence measures
//! - [`flows`] - Shared and origin-local views of link flow state
//! - [`config`] - Solver settings

pub mod algorithm_b;
pub mod bush;
pub mod config;
pub mod flow_shift;
pub mod flows;
pub mod gap;
pub mod shortest_path;

pub use algorithm_b::{
    solve, AlgorithmB, AssignmentOutcome, IterationRecord, SolverState, Termination,
};
pub use bush::{Bush, BushError, BushUpdate};
pub use config::{AlgorithmBConfig, SweepMode};
pub use flow_shift::{equilibrate_bush, ShiftStats};
pub use flows::{FlowSnapshot, LinkCosts, LinkFlows, OriginFlows, SharedFlows};
pub use gap::{measure_gap, GapFunction, GapMeasures};
pub use shortest_path::{build_tree, bush_labels, BushLabels, ShortestPathTree};
