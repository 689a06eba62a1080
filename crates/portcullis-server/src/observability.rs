//! Tracing setup for the gateway.
//!
//! The filter sits behind a reload handle so the level and per-crate
//! directives from the configuration file can be applied after the
//! subscriber is installed. `RUST_LOG`, when set, always wins.

use std::sync::OnceLock;

use tracing_subscriber::{
    EnvFilter, Registry,
    filter::Directive,
    fmt,
    prelude::*,
    reload,
};

use crate::config::{LogFormat, LoggingConfig};

static FILTER_HANDLE: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

/// Installs the global subscriber. Later calls are no-ops.
pub fn init_tracing(cfg: &LoggingConfig) {
    let filter = build_filter(std::env::var("RUST_LOG").ok().as_deref(), cfg);
    let (filter_layer, handle) = reload::Layer::new(filter);
    let _ = FILTER_HANDLE.set(handle);

    let full = matches!(cfg.format, LogFormat::Full).then(|| fmt::layer().with_ansi(cfg.ansi));
    let compact = matches!(cfg.format, LogFormat::Compact)
        .then(|| fmt::layer().compact().with_ansi(cfg.ansi));

    let _ = tracing_subscriber::registry()
        .with(filter_layer)
        .with(full)
        .with(compact)
        .try_init();
}

/// Swaps in the filter described by `cfg`. The output format is fixed at
/// [`init_tracing`].
pub fn apply_logging(cfg: &LoggingConfig) {
    let rust_log = std::env::var("RUST_LOG").ok();
    if rust_log.is_some() {
        tracing::debug!("RUST_LOG is set, ignoring configured log filter");
        return;
    }
    let Some(handle) = FILTER_HANDLE.get() else {
        return;
    };
    let filter = build_filter(None, cfg);
    if let Err(e) = handle.reload(filter) {
        tracing::warn!(error = %e, "failed to apply log filter");
    }
}

/// `rust_log` when present and parseable, otherwise the configured level
/// plus its directives. Unparseable directives are skipped.
fn build_filter(rust_log: Option<&str>, cfg: &LoggingConfig) -> EnvFilter {
    if let Some(spec) = rust_log
        && let Ok(filter) = EnvFilter::try_new(spec)
    {
        return filter;
    }

    let mut filter = EnvFilter::new(&cfg.level);
    for raw in &cfg.directives {
        match raw.parse::<Directive>() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(e) => eprintln!("ignoring log directive '{raw}': {e}"),
        }
    }
    filter
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logging(level: &str, directives: &[&str]) -> LoggingConfig {
        LoggingConfig {
            level: level.to_string(),
            directives: directives.iter().map(|d| d.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_configured_level_and_directives() {
        let filter = build_filter(None, &logging("warn", &["portcullis_store=debug"]));
        let rendered = filter.to_string();
        assert!(rendered.contains("warn"));
        assert!(rendered.contains("portcullis_store=debug"));
    }

    #[test]
    fn test_bad_directive_is_skipped() {
        let filter = build_filter(None, &logging("info", &["portcullis_auth=loud", "tower_http=trace"]));
        let rendered = filter.to_string();
        assert!(!rendered.contains("loud"));
        assert!(rendered.contains("tower_http=trace"));
    }

    #[test]
    fn test_rust_log_wins() {
        let filter = build_filter(Some("error"), &logging("debug", &["portcullis_server=trace"]));
        assert_eq!(filter.to_string(), "error");
    }
}
