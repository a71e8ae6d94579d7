pub mod cli;
pub mod config;
pub mod util;

pub use cli::{Cli, OutputFormat};
pub use config::RunConfig;
