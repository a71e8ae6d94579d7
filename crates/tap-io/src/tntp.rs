//! TNTP network and trip table parser
//!
//! Reads the plain-text formats of the Transportation Network Test Problems collection:
//! a `_net.tntp` link file and a `_trips.tntp` OD table. Both start with a block of
//! `<TAG> value` metadata closed by `<END OF METADATA>`; `~` starts a comment anywhere.

use anyhow::{anyhow, bail, Context, Result};
use std::fs;
use std::path::Path;
use tap_core::{Bpr, Category, CostFunction, Diagnostics, Network, NodeId};

const END_OF_METADATA: &str = "<END OF METADATA>";

/// Relative disagreement with `<TOTAL OD FLOW>` tolerated without a warning.
const TOTAL_FLOW_TOLERANCE: f64 = 1e-3;

/// Header of a TNTP network file
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkMetadata {
    pub zones: usize,
    pub nodes: usize,
    pub first_thru_node: usize,
    pub links: usize,
    pub toll_factor: f64,
    pub distance_factor: f64,
}

/// One `<TAG> value` pair per entry, in file order, plus the line where the body starts.
struct Metadata<'a> {
    tags: Vec<(String, &'a str)>,
    body_start: usize,
}

impl<'a> Metadata<'a> {
    fn get(&self, tag: &str) -> Option<&'a str> {
        self.tags
            .iter()
            .find(|(name, _)| name == tag)
            .map(|(_, value)| *value)
    }

    fn required<T: std::str::FromStr>(&self, tag: &str) -> Result<T>
    where
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        let raw = self
            .get(tag)
            .ok_or_else(|| anyhow!("missing required metadata <{tag}>"))?;
        raw.parse::<T>()
            .with_context(|| format!("invalid value for <{tag}>: '{raw}'"))
    }

    fn optional_f64(&self, tag: &str, default: f64) -> Result<f64> {
        match self.get(tag) {
            Some(raw) => raw
                .parse::<f64>()
                .with_context(|| format!("invalid value for <{tag}>: '{raw}'")),
            None => Ok(default),
        }
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find('~') {
        Some(pos) => &line[..pos],
        None => line,
    }
}

fn parse_metadata<'a>(lines: &[&'a str]) -> Result<Metadata<'a>> {
    let mut tags = Vec::new();
    for (idx, &line) in lines.iter().enumerate() {
        let text = strip_comment(line).trim();
        if text.is_empty() {
            continue;
        }
        if text.eq_ignore_ascii_case(END_OF_METADATA) {
            return Ok(Metadata {
                tags,
                body_start: idx + 1,
            });
        }
        let Some(rest) = text.strip_prefix('<') else {
            bail!("line {}: expected a <TAG> before {END_OF_METADATA}", idx + 1);
        };
        let (name, value) = rest
            .split_once('>')
            .ok_or_else(|| anyhow!("line {}: unterminated metadata tag", idx + 1))?;
        tags.push((name.trim().to_ascii_uppercase(), value.trim()));
    }
    bail!("missing {END_OF_METADATA}")
}

/// Parse a TNTP network file
pub fn parse_network_file(path: &Path, diag: &mut Diagnostics) -> Result<Network> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading network file: {}", path.display()))?;
    parse_network_str(&content, diag)
        .with_context(|| format!("parsing network file: {}", path.display()))
}

/// Parse TNTP network content from a string
pub fn parse_network_str(content: &str, diag: &mut Diagnostics) -> Result<Network> {
    let lines: Vec<&str> = content.lines().collect();
    let metadata = parse_metadata(&lines)?;
    let header = NetworkMetadata {
        zones: metadata.required("NUMBER OF ZONES")?,
        nodes: metadata.required("NUMBER OF NODES")?,
        first_thru_node: metadata.required("FIRST THRU NODE")?,
        links: metadata.required("NUMBER OF LINKS")?,
        toll_factor: metadata.optional_f64("TOLL FACTOR", 0.0)?,
        distance_factor: metadata.optional_f64("DISTANCE FACTOR", 0.0)?,
    };
    if header.zones > header.nodes {
        bail!(
            "<NUMBER OF ZONES> ({}) exceeds <NUMBER OF NODES> ({})",
            header.zones,
            header.nodes
        );
    }

    let mut network = Network::with_nodes(header.nodes, header.zones);
    network.first_thru_node = header.first_thru_node;
    network.graph.reserve_edges(header.links);

    for (idx, line) in lines.iter().enumerate().skip(metadata.body_start) {
        let line_no = idx + 1;
        let text = strip_comment(line).trim();
        let text = text.strip_suffix(';').unwrap_or(text).trim();
        if text.is_empty() {
            continue;
        }
        parse_link_line(&mut network, &header, text)
            .with_context(|| format!("line {line_no}"))?;
    }

    if network.link_count() != header.links {
        diag.warn(
            Category::Parse,
            format!(
                "<NUMBER OF LINKS> says {} but the file lists {}",
                header.links,
                network.link_count()
            ),
        );
    }
    Ok(network)
}

fn parse_link_line(network: &mut Network, header: &NetworkMetadata, text: &str) -> Result<()> {
    let fields: Vec<&str> = text.split_whitespace().filter(|f| *f != ";").collect();
    if fields.len() < 10 {
        bail!("expected 10 link fields, found {}", fields.len());
    }
    let int = |k: usize, name: &str| -> Result<usize> {
        fields[k]
            .parse::<usize>()
            .with_context(|| format!("invalid {name} '{}'", fields[k]))
    };
    let real = |k: usize, name: &str| -> Result<f64> {
        fields[k]
            .parse::<f64>()
            .with_context(|| format!("invalid {name} '{}'", fields[k]))
    };

    let from = int(0, "init_node")?;
    let to = int(1, "term_node")?;
    let capacity = real(2, "capacity")?;
    let length = real(3, "length")?;
    let free_flow_time = real(4, "free_flow_time")?;
    let alpha = real(5, "b")?;
    let beta = real(6, "power")?;
    // speed (7) and link_type (9) carry no cost information
    let toll = real(8, "toll")?;

    let fixed_cost = toll * header.toll_factor + length * header.distance_factor;
    let cost = CostFunction::Bpr(
        Bpr::new(free_flow_time, capacity, alpha, beta).with_fixed_cost(fixed_cost),
    );
    network.add_link(NodeId::new(from), NodeId::new(to), cost)?;
    Ok(())
}

/// Parse a TNTP trips file into `network`'s OD pairs
pub fn parse_trips_file(path: &Path, network: &mut Network, diag: &mut Diagnostics) -> Result<()> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading demand file: {}", path.display()))?;
    parse_trips_str(&content, network, diag)
        .with_context(|| format!("parsing demand file: {}", path.display()))
}

/// Parse TNTP trips content from a string into `network`'s OD pairs
pub fn parse_trips_str(content: &str, network: &mut Network, diag: &mut Diagnostics) -> Result<()> {
    let lines: Vec<&str> = content.lines().collect();
    let metadata = parse_metadata(&lines)?;
    let zones: usize = metadata.required("NUMBER OF ZONES")?;
    let declared_total = match metadata.get("TOTAL OD FLOW") {
        Some(raw) => Some(
            raw.parse::<f64>()
                .with_context(|| format!("invalid value for <TOTAL OD FLOW>: '{raw}'"))?,
        ),
        None => None,
    };
    let network_zones = network.graph.node_weights().filter(|n| n.zone).count();
    if zones > network.node_count() {
        bail!(
            "<NUMBER OF ZONES> ({zones}) exceeds the network's {} nodes",
            network.node_count()
        );
    }
    if zones != network_zones {
        diag.warn(
            Category::Parse,
            format!("trips file declares {zones} zones, network has {network_zones}"),
        );
    }

    let mut origin: Option<usize> = None;
    let mut total = 0.0;
    for (idx, line) in lines.iter().enumerate().skip(metadata.body_start) {
        let line_no = idx + 1;
        let text = strip_comment(line).trim();
        if text.is_empty() {
            continue;
        }
        if let Some(rest) = text.strip_prefix("Origin") {
            let id = rest.trim();
            let id: usize = id
                .parse()
                .with_context(|| format!("line {line_no}: invalid origin '{id}'"))?;
            if id == 0 || id > zones {
                bail!("line {line_no}: origin {id} is outside zones 1..={zones}");
            }
            origin = Some(id);
            continue;
        }

        let Some(from) = origin else {
            bail!("line {line_no}: demand entries before any 'Origin' line");
        };
        for entry in text.split(';') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let (dest, volume) = entry
                .split_once(':')
                .ok_or_else(|| anyhow!("line {line_no}: expected 'dest : volume', got '{entry}'"))?;
            let dest: usize = dest
                .trim()
                .parse()
                .with_context(|| format!("line {line_no}: invalid destination '{}'", dest.trim()))?;
            let volume: f64 = volume
                .trim()
                .parse()
                .with_context(|| format!("line {line_no}: invalid volume '{}'", volume.trim()))?;
            if dest == 0 || dest > zones {
                bail!("line {line_no}: destination {dest} is outside zones 1..={zones}");
            }
            if !(volume >= 0.0) {
                bail!("line {line_no}: negative demand {volume} from {from} to {dest}");
            }
            network
                .add_demand(NodeId::new(from), NodeId::new(dest), volume)
                .with_context(|| format!("line {line_no}"))?;
            total += volume;
        }
    }

    if let Some(declared) = declared_total {
        if (total - declared).abs() > TOTAL_FLOW_TOLERANCE * declared.abs().max(1.0) {
            diag.warn(
                Category::Parse,
                format!("<TOTAL OD FLOW> is {declared} but the entries sum to {total}"),
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tap_core::{EdgeIndex, NodeIndex};

    const PARTIAL_NET: &str = "\
<NUMBER OF ZONES> 4
<NUMBER OF NODES> 4
<FIRST THRU NODE> 1
<NUMBER OF LINKS> 5
<END OF METADATA>

~ init term cap length fftt b power speed toll type ;
\t1\t2\t1\t0\t1e-9\t1e10\t1\t0\t0\t1\t;
\t1\t3\t1\t0\t50\t0.02\t1\t0\t0\t1\t;
";

    #[test]
    fn parses_metadata_and_links() {
        let mut diag = Diagnostics::new();
        let network = parse_network_str(PARTIAL_NET, &mut diag).unwrap();
        assert_eq!(network.node_count(), 4);
        assert_eq!(network.link_count(), 2);
        assert_eq!(network.first_thru_node, 1);
        // Declared 5 links but only 2 present
        assert_eq!(diag.in_category(Category::Parse).count(), 1);

        let link = network.link(EdgeIndex::new(1));
        assert_eq!(network.endpoints(EdgeIndex::new(1)), (NodeIndex::new(0), NodeIndex::new(2)));
        // 50 * (1 + 0.02 * x / 1)
        assert!((link.cost_function.cost(6.0) - 56.0).abs() < 1e-9);
    }

    #[test]
    fn generalized_cost_includes_toll_and_distance() {
        let content = "\
<NUMBER OF ZONES> 1
<NUMBER OF NODES> 2
<FIRST THRU NODE> 1
<NUMBER OF LINKS> 1
<TOLL FACTOR> 0.5
<DISTANCE FACTOR> 2
<END OF METADATA>
1 2 100 3 10 0.15 4 60 4 1 ;
";
        let mut diag = Diagnostics::new();
        let network = parse_network_str(content, &mut diag).unwrap();
        assert!(!diag.has_issues());
        let f = network.link(EdgeIndex::new(0)).cost_function;
        assert_eq!(f.cost(0.0), 10.0 + 0.5 * 4.0 + 2.0 * 3.0);
    }

    #[test]
    fn missing_metadata_is_fatal() {
        let content = "<NUMBER OF ZONES> 1\n<NUMBER OF LINKS> 0\n<END OF METADATA>\n";
        let err = parse_network_str(content, &mut Diagnostics::new()).unwrap_err();
        assert!(err.to_string().contains("NUMBER OF NODES"));

        let err = parse_network_str("<NUMBER OF NODES> 2\n", &mut Diagnostics::new()).unwrap_err();
        assert!(err.to_string().contains("END OF METADATA"));
    }

    #[test]
    fn malformed_link_reports_line() {
        let content = "\
<NUMBER OF ZONES> 1
<NUMBER OF NODES> 2
<FIRST THRU NODE> 1
<NUMBER OF LINKS> 1
<END OF METADATA>
1 2 100 3 ten 0.15 4 60 0 1 ;
";
        let err = parse_network_str(content, &mut Diagnostics::new()).unwrap_err();
        let chain = format!("{err:#}");
        assert!(chain.contains("line 6"));
        assert!(chain.contains("free_flow_time"));
    }

    #[test]
    fn link_to_unknown_node_is_fatal() {
        let content = "\
<NUMBER OF ZONES> 1
<NUMBER OF NODES> 2
<FIRST THRU NODE> 1
<NUMBER OF LINKS> 1
<END OF METADATA>
1 3 100 3 1 0.15 4 60 0 1 ;
";
        let err = parse_network_str(content, &mut Diagnostics::new()).unwrap_err();
        assert!(format!("{err:#}").contains("Node 3 is outside"));
    }

    fn two_zone_network() -> Network {
        Network::with_nodes(3, 2)
    }

    #[test]
    fn parses_trip_blocks() {
        let content = "\
<NUMBER OF ZONES> 2
<TOTAL OD FLOW> 15.0
<END OF METADATA>

Origin 1
    1 :      0.0;     2 :     10.0;
Origin 2
    1 :      5.0;
";
        let mut network = two_zone_network();
        let mut diag = Diagnostics::new();
        parse_trips_str(content, &mut network, &mut diag).unwrap();
        assert!(!diag.has_issues());
        assert_eq!(network.od_pairs.len(), 3);
        assert_eq!(network.total_demand(), 15.0);
    }

    #[test]
    fn negative_demand_is_fatal() {
        let content = "<NUMBER OF ZONES> 2\n<END OF METADATA>\nOrigin 1\n 2 : -1.0;\n";
        let err = parse_trips_str(content, &mut two_zone_network(), &mut Diagnostics::new())
            .unwrap_err();
        assert!(err.to_string().contains("negative demand"));
    }

    #[test]
    fn destination_outside_zones_is_fatal() {
        let content = "<NUMBER OF ZONES> 2\n<END OF METADATA>\nOrigin 1\n 3 : 1.0;\n";
        assert!(parse_trips_str(content, &mut two_zone_network(), &mut Diagnostics::new()).is_err());
    }

    #[test]
    fn total_mismatch_is_a_warning() {
        let content = "<NUMBER OF ZONES> 2\n<TOTAL OD FLOW> 20\n<END OF METADATA>\nOrigin 1\n 2 : 10;\n";
        let mut network = two_zone_network();
        let mut diag = Diagnostics::new();
        parse_trips_str(content, &mut network, &mut diag).unwrap();
        assert_eq!(diag.warning_count(), 1);
        assert_eq!(network.total_demand(), 10.0);
    }
}
