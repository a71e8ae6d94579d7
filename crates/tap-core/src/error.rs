//! Unified error types for the traffic assignment workspace
//!
//! [`TapError`] covers every fatal condition: malformed input, ids outside the
//! valid range, an unrepairable network, and bad solver configuration. Failing to
//! converge within the iteration or time budget is *not* an error; it is reported
//! through the solver outcome instead.
//!
//! ```
//! use tap_core::{CostFunction, Network, NodeId, TapError};
//!
//! let mut network = Network::with_nodes(3, 3);
//! let err = network
//!     .add_link(NodeId::new(1), NodeId::new(9), CostFunction::constant(1.0))
//!     .unwrap_err();
//! assert!(matches!(err, TapError::InvalidNode { id: 9, node_count: 3 }));
//! ```

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TapError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Negative demand, demand on a non-zone, bad cost parameters
    #[error("Invalid input: {0}")]
    Validation(String),

    /// A node id referenced outside `1..=node_count`
    #[error("Node {id} is outside the valid range 1..={node_count}")]
    InvalidNode { id: usize, node_count: usize },

    /// A link id referenced outside `1..=link_count`
    #[error("Link {id} is outside the valid range 1..={link_count}")]
    InvalidLink { id: usize, link_count: usize },

    /// An empty network, or a destination no artificial link can reach
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    #[error("Invalid solver configuration: {0}")]
    Config(String),

    /// A bush lost its topological order or another internal invariant broke
    #[error("Solver error: {0}")]
    Solver(String),

    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using TapError.
pub type TapResult<T> = Result<T, TapError>;

impl From<anyhow::Error> for TapError {
    fn from(err: anyhow::Error) -> Self {
        TapError::Other(err.to_string())
    }
}

impl From<String> for TapError {
    fn from(s: String) -> Self {
        TapError::Other(s)
    }
}

impl From<&str> for TapError {
    fn from(s: &str) -> Self {
        TapError::Other(s.to_string())
    }
}
