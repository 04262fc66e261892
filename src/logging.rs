use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Install the global tracing subscriber. INFO by default; `WARDEN_LOG`
/// accepts `error|warn|info|debug|trace` to override.
pub fn init() {
    let level = match std::env::var("WARDEN_LOG").as_deref() {
        Ok("error") => Level::ERROR,
        Ok("warn") => Level::WARN,
        Ok("debug") => Level::DEBUG,
        Ok("trace") => Level::TRACE,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}
