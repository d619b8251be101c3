use tracing_subscriber::EnvFilter;

/// Installs the stderr subscriber. Without `verbose` the level is pinned to
/// `info`; with it `RUST_LOG` may override the default `debug`.
pub fn init(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::new("info")
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
