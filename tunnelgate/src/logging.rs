use time::{format_description, UtcOffset};
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Installs the `tracing` subscriber: an `EnvFilter` (`RUST_LOG`, default
/// `tunnelgate=info`) and a single `fmt` layer. Must run before anything
/// else logs (C11) — `main` calls it first, ahead of config loading.
pub fn install_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "tunnelgate=info");
    }

    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    let fmt_layer = tracing_subscriber::fmt::layer().with_timer(OffsetTime::new(
        offset,
        format_description::parse("[day].[month].[year] [hour]:[minute]:[second]")
            .expect("built-in time format is valid"),
    ));

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt_layer)
        .init();
}
