use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tap_algo::{AlgorithmBConfig, GapFunction, SweepMode};

/// Solve the static user-equilibrium traffic assignment problem with Algorithm B.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// TNTP network file
    #[arg(value_name = "NETWORK")]
    pub network: PathBuf,

    /// TNTP trip table
    #[arg(value_name = "DEMAND")]
    pub demand: PathBuf,

    /// Set the logging level
    #[arg(long, default_value = "info")]
    pub log_level: tracing::Level,

    /// TOML run configuration; flags below override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Stop once the gap falls below this value
    #[arg(long, visible_alias = "gap")]
    pub convergence_gap: Option<f64>,

    /// Outer iteration limit
    #[arg(long)]
    pub max_iterations: Option<usize>,

    /// Wall-clock limit in seconds
    #[arg(long)]
    pub max_time: Option<f64>,

    /// relative_gap_1, relative_gap_2, aec or mec
    #[arg(long)]
    pub gap_function: Option<GapFunction>,

    /// Origin sweep ordering: sequential or jacobi
    #[arg(long)]
    pub sweep: Option<SweepMode>,

    /// Flow-shift passes per bush per iteration
    #[arg(long)]
    pub inner_iterations: Option<usize>,

    /// Threading hint (`auto` or integer)
    #[arg(long)]
    pub threads: Option<String>,

    /// Write link flows here instead of stdout
    #[arg(long, short)]
    pub out: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Tsv)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Tab-separated `from to flow cost` with a header row
    Tsv,
    /// Aligned columns for reading in a terminal
    Table,
}

impl Cli {
    /// Overlay any solver flags given on the command line.
    pub fn apply_overrides(&self, config: &mut AlgorithmBConfig) {
        if let Some(gap) = self.convergence_gap {
            config.convergence_gap = gap;
        }
        if let Some(max_iterations) = self.max_iterations {
            config.max_iterations = max_iterations;
        }
        if let Some(secs) = self.max_time {
            config.max_time_secs = secs;
        }
        if let Some(gap_function) = self.gap_function {
            config.gap_function = gap_function;
        }
        if let Some(sweep) = self.sweep {
            config.sweep = sweep;
        }
        if let Some(inner) = self.inner_iterations {
            config.inner_iterations = inner;
        }
    }
}
