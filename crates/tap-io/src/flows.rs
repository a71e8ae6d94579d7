//! Link flow output.

use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tap_core::Network;

/// One output row per real link.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowRecord {
    pub from: usize,
    pub to: usize,
    pub flow: f64,
    pub cost: f64,
}

/// Rows for every non-artificial link, in link id order.
pub fn flow_records(network: &Network) -> Vec<FlowRecord> {
    network
        .graph
        .edge_weights()
        .filter(|link| !link.artificial)
        .map(|link| FlowRecord {
            from: link.from.value(),
            to: link.to.value(),
            flow: link.flow,
            cost: link.cost,
        })
        .collect()
}

/// Write `from`, `to`, `flow`, `cost` rows as tab-separated text with a header.
pub fn write_flows<W: Write>(network: &Network, writer: W) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_writer(writer);
    // Written by hand so an empty network still gets a header
    wtr.write_record(["from", "to", "flow", "cost"])
        .context("writing flow header")?;
    for record in flow_records(network) {
        wtr.serialize(&record).context("writing flow record")?;
    }
    wtr.flush().context("flushing flow output")?;
    Ok(())
}

pub fn write_flows_file(network: &Network, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("creating flow output at {}", path.display()))?;
    write_flows(network, file)
}
