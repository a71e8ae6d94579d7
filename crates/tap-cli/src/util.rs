use anyhow::{bail, Context, Result};
use rayon::ThreadPoolBuilder;

/// Size the global rayon pool from `auto` or a thread count. Returns the count used.
pub fn configure_threads(spec: &str) -> Result<usize> {
    let count = if spec.eq_ignore_ascii_case("auto") {
        num_cpus::get()
    } else {
        spec.parse::<usize>()
            .with_context(|| format!("invalid thread count '{spec}'"))?
    };
    if count == 0 {
        bail!("thread count must be at least 1");
    }
    // Fails only if a pool already exists, which keeps the first setting
    let _ = ThreadPoolBuilder::new().num_threads(count).build_global();
    Ok(count)
}
