use anyhow::Result;
use tracing::Level;
use tracing_subscriber::fmt;

/// Installs the log subscriber when `verbose` is set. Logs go to stderr so
/// stdout only carries the JSON report.
pub fn init(verbose: bool) -> Result<()> {
    if !verbose {
        return Ok(());
    }
    let _ = fmt()
        .with_writer(std::io::stderr)
        .with_max_level(Level::DEBUG)
        .with_target(false)
        .with_thread_names(true)
        .try_init();
    Ok(())
}
