use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Initialize structured logging for a hosting process.
///
/// Respects `RUST_LOG`, defaulting the workspace crates to info. Call once
/// at startup; library code only emits through `tracing` macros.
pub fn init_tracing() -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("leadflow=info".parse()?);
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}
