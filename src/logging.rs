/// Initialize log output for the binary.
///
/// Defaults to `info` level unless overridden by `VIDPLAY_LOG`.
#[cfg(feature = "logging")]
pub fn init() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::builder()
        .with_env_var("VIDPLAY_LOG")
        .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// No-op fallback so library consumers can call `vidplay::logging::init()`
/// without pulling in `tracing-subscriber`.
#[cfg(not(feature = "logging"))]
pub fn init() {}
