use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use markpane_core::LoggingConfig;

static FILE_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

/// Rotation policy for the optional log file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRotation {
    Hourly,
    Daily,
    Never,
}

impl LogRotation {
    /// Unknown values fall back to daily rotation.
    pub fn from_slug(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "hourly" => LogRotation::Hourly,
            "never" | "none" => LogRotation::Never,
            _ => LogRotation::Daily,
        }
    }
}

/// Install the global subscriber using the effective configuration.
pub fn init() {
    init_with(&markpane_core::load_effective_config().logging);
}

/// Install the global subscriber. `RUST_LOG` wins over `logging.filter`;
/// `MARKPANE_LOG_DIR` and `MARKPANE_LOG_ROTATION` win over their config keys.
/// Calling it again after a subscriber is set is a no-op.
pub fn init_with(logging: &LoggingConfig) {
    let directive = filter_directive(std::env::var("RUST_LOG").ok(), logging);
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));

    let log_dir = std::env::var("MARKPANE_LOG_DIR")
        .ok()
        .filter(|d| !d.trim().is_empty())
        .or_else(|| logging.log_dir.clone());
    let rotation = std::env::var("MARKPANE_LOG_ROTATION")
        .ok()
        .or_else(|| logging.rotation.clone())
        .map(|r| LogRotation::from_slug(&r))
        .unwrap_or(LogRotation::Daily);

    let file_layer = log_dir.and_then(|dir| {
        if let Err(err) = std::fs::create_dir_all(&dir) {
            eprintln!("markpane: cannot create log directory {dir}: {err}");
            return None;
        }
        let writer = match rotation {
            LogRotation::Hourly => tracing_appender::rolling::hourly(&dir, "markpane.log"),
            LogRotation::Daily => tracing_appender::rolling::daily(&dir, "markpane.log"),
            LogRotation::Never => tracing_appender::rolling::never(&dir, "markpane.log"),
        };
        let (nb, guard) = tracing_appender::non_blocking(writer);
        let _ = FILE_GUARD.set(guard);
        Some(fmt::layer().with_ansi(false).with_writer(nb))
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init();
}

fn filter_directive(env: Option<String>, logging: &LoggingConfig) -> String {
    env.filter(|v| !v.trim().is_empty())
        .or_else(|| logging.filter.clone())
        .unwrap_or_else(|| "info".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_slugs() {
        assert_eq!(LogRotation::from_slug("HOURLY"), LogRotation::Hourly);
        assert_eq!(LogRotation::from_slug("never"), LogRotation::Never);
        assert_eq!(LogRotation::from_slug("weekly"), LogRotation::Daily);
    }

    #[test]
    fn env_filter_beats_config() {
        let logging = LoggingConfig {
            filter: Some("markpane_core=debug".into()),
            ..LoggingConfig::default()
        };
        assert_eq!(filter_directive(Some("warn".into()), &logging), "warn");
        assert_eq!(filter_directive(Some(" ".into()), &logging), "markpane_core=debug");
        assert_eq!(filter_directive(None, &LoggingConfig::default()), "info");
    }

    #[test]
    fn init_twice_is_harmless() {
        init_with(&LoggingConfig::default());
        init_with(&LoggingConfig::default());
        tracing::info!("still logging");
    }
}
