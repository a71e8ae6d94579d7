//! # tap-io: Traffic Assignment Data I/O
//!
//! Reads TNTP network and trip files into a [`tap_core::Network`] and writes solved link
//! flows back out.
//!
//! Parsers return `anyhow::Result` with the file and line in the error context. Anything
//! recoverable (a link count that disagrees with the header, a trip total that doesn't add
//! up) is recorded in the caller's [`tap_core::Diagnostics`] instead of failing.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use tap_core::Diagnostics;
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut diag = Diagnostics::new();
//!     let network = tap_io::load_problem(
//!         Path::new("SiouxFalls_net.tntp"),
//!         Path::new("SiouxFalls_trips.tntp"),
//!         &mut diag,
//!     )?;
//!     println!("{}", network.stats());
//!     Ok(())
//! }
//! ```

use anyhow::Result;
use std::path::Path;
use tap_core::{Diagnostics, Network};

pub mod flows;
pub mod tntp;

pub use flows::{flow_records, write_flows, write_flows_file, FlowRecord};
pub use tntp::{
    parse_network_file, parse_network_str, parse_trips_file, parse_trips_str, NetworkMetadata,
};

/// Read a network file and its trip table.
pub fn load_problem(network_path: &Path, demand_path: &Path, diag: &mut Diagnostics) -> Result<Network> {
    let mut network = parse_network_file(network_path, diag)?;
    parse_trips_file(demand_path, &mut network, diag)?;
    Ok(network)
}
