//! TOML run configuration.
//!
//! ```toml
//! threads = "4"
//!
//! [solver]
//! convergence_gap = 1e-8
//! max_iterations = 200
//! gap_function = "aec"
//! sweep = "jacobi"
//! ```
//!
//! Every key is optional; missing ones keep the solver defaults.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tap_algo::AlgorithmBConfig;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Threading hint (`auto` or integer)
    pub threads: Option<String>,
    pub solver: AlgorithmBConfig,
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}
