use anyhow::{bail, Context, Result};
use clap::Parser;
use std::io::{self, IsTerminal, Write};
use tabwriter::TabWriter;
use tap_algo::AlgorithmB;
use tap_cli::{util::configure_threads, Cli, OutputFormat, RunConfig};
use tap_core::graph_utils::{graph_stats, make_strongly_connected};
use tap_core::{Diagnostics, Network};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_str().to_ascii_lowercase()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .try_init();

    if let Err(err) = run(&cli) {
        error!("{err:#}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let mut run_config = match &cli.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };
    cli.apply_overrides(&mut run_config.solver);
    run_config.solver.validate()?;

    let threads = cli
        .threads
        .as_deref()
        .or(run_config.threads.as_deref())
        .unwrap_or("auto");
    let threads = configure_threads(threads)?;
    debug!(threads, "thread pool configured");

    let mut diag = Diagnostics::new();
    let mut network = tap_io::load_problem(&cli.network, &cli.demand, &mut diag)?;
    info!("Loaded {}", network.stats());

    network.validate_into(&mut diag);
    if diag.has_errors() {
        for issue in diag.errors() {
            error!("{issue}");
        }
        bail!("network failed validation: {}", diag.summary());
    }

    let report = make_strongly_connected(&mut network, &mut diag)?;
    if !report.was_connected() {
        warn!(
            components = report.components,
            artificial_links = report.artificial_links.len(),
            "network was not strongly connected; added artificial links"
        );
    }
    let stats = graph_stats(&network);
    info!(
        nodes = stats.node_count,
        links = stats.link_count,
        components = stats.strongly_connected_components,
        min_out_degree = stats.min_out_degree,
        max_out_degree = stats.max_out_degree,
        avg_out_degree = stats.avg_out_degree,
        density = stats.density,
        "graph ready for assignment"
    );

    let mut solver = AlgorithmB::new(run_config.solver);
    let outcome = solver.run(&mut network, &mut diag)?;
    info!(
        termination = %outcome.termination,
        iterations = outcome.iterations,
        gap = outcome.gap,
        gap_function = %outcome.gap_function,
        tstt = outcome.total_system_travel_time,
        beckmann = outcome.beckmann_objective,
        elapsed_ms = outcome.elapsed.as_millis() as u64,
        "assignment finished"
    );
    if !outcome.converged() {
        warn!("stopped before reaching the convergence gap ({})", outcome.termination);
    }

    match &cli.out {
        Some(path) => {
            match cli.format {
                OutputFormat::Tsv => tap_io::write_flows_file(&network, path)?,
                OutputFormat::Table => {
                    let file = std::fs::File::create(path).with_context(|| {
                        format!("creating flow table at {}", path.display())
                    })?;
                    write_output(&network, cli.format, file)?;
                }
            }
            info!("Wrote link flows to {}", path.display());
        }
        None => write_output(&network, cli.format, io::stdout().lock())?,
    }

    for issue in diag.warnings() {
        debug!("{issue}");
    }
    if diag.has_issues() {
        info!("{}", diag.summary());
    }
    Ok(())
}

fn write_output<W: Write>(network: &Network, format: OutputFormat, writer: W) -> Result<()> {
    match format {
        OutputFormat::Tsv => tap_io::write_flows(network, writer),
        OutputFormat::Table => {
            let mut tw = TabWriter::new(writer);
            writeln!(tw, "FROM\tTO\tFLOW\tCOST")?;
            for record in tap_io::flow_records(network) {
                writeln!(
                    tw,
                    "{}\t{}\t{:.6}\t{:.6}",
                    record.from, record.to, record.flow, record.cost
                )?;
            }
            tw.flush()?;
            Ok(())
        }
    }
}
