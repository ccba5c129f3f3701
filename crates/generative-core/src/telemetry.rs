//! Tracing subscriber setup for embedding applications

use once_cell::sync::OnceCell;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable consulted before the default filter
pub const LOG_ENV: &str = "GENERATIVE_LOG";

static INSTALLED: OnceCell<()> = OnceCell::new();

/// Output format of the installed subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Install a global fmt subscriber filtered by `GENERATIVE_LOG`, or by
/// `default_filter` when it is unset
///
/// Calling it again is a no-op.
///
/// # Errors
/// Returns error if `default_filter` does not parse or another global
/// subscriber was installed elsewhere
pub fn init_tracing(default_filter: &str) -> anyhow::Result<()> {
    init_tracing_with(default_filter, LogFormat::Pretty)
}

/// [`init_tracing`] with an explicit output format
///
/// # Errors
/// As [`init_tracing`]
pub fn init_tracing_with(default_filter: &str, format: LogFormat) -> anyhow::Result<()> {
    INSTALLED
        .get_or_try_init(|| {
            let filter = match EnvFilter::try_from_env(LOG_ENV) {
                Ok(filter) => filter,
                Err(_) => EnvFilter::try_new(default_filter)?,
            };
            let registry = tracing_subscriber::registry().with(filter);
            match format {
                LogFormat::Pretty => registry.with(fmt::layer().with_target(true)).try_init()?,
                LogFormat::Json => registry
                    .with(fmt::layer().json().with_target(true))
                    .try_init()?,
            }
            Ok::<(), anyhow::Error>(())
        })
        .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_is_a_no_op() {
        init_tracing("info").unwrap();
        init_tracing("debug").unwrap();
        init_tracing_with("warn", LogFormat::Json).unwrap();
        tracing::info!("telemetry ready");
    }
}
