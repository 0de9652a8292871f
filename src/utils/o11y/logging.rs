//! Logging utilities.
//!
//! The subscriber writes human-readable lines to stderr, filtered through
//! `RUST_LOG` (defaults to `info`). Errors are logged together with their
//! whole `source()` chain so a failed stage reports both what failed and why.
use std::fmt;

use tracing::Subscriber;
use tracing_subscriber::{fmt::format::FmtSpan, layer::SubscriberExt, EnvFilter, Layer};

/// The error type returned when building a subscriber.
#[derive(Debug, thiserror::Error)]
pub enum BuildSubscriberError {
    #[error("failed to parse filtering directive")]
    Parse(#[from] tracing_subscriber::filter::ParseError),
}

/// Build a tracing subscriber.
pub fn build_subscriber() -> Result<impl Subscriber, BuildSubscriberError> {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE);
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    Ok(tracing_subscriber::registry().with(fmt_layer.with_filter(env_filter)))
}

/// Displays an error followed by each of its sources, separated by `: `.
pub struct ErrorChain<'a>(pub &'a (dyn std::error::Error + 'static));

impl fmt::Display for ErrorChain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;
        let mut source = self.0.source();
        while let Some(cause) = source {
            write!(f, ": {}", cause)?;
            source = cause.source();
        }
        Ok(())
    }
}

/// Returns a closure that logs an error (and its sources) at the ERROR level.
///
/// Meant for `Result::inspect_err`:
///
/// ```ignore
/// load_config(path).inspect_err(as_error!("failed to load config"))?;
/// ```
#[macro_export]
macro_rules! as_error {
    () => {
        |error| {
            tracing::error!(
                error = %$crate::utils::o11y::logging::ErrorChain(error)
            )
        }
    };
    ($msg:literal) => {
        |error| {
            tracing::error!(
                error = %$crate::utils::o11y::logging::ErrorChain(error),
                $msg
            )
        }
    };
}

/// Logs an error value (and its sources). Defaults to the ERROR level, pass
/// `WARN` as the first argument for recoverable conditions.
#[macro_export]
macro_rules! log_error {
    (WARN, $error:expr, $($arg:tt)+) => {
        tracing::warn!(
            error = %$crate::utils::o11y::logging::ErrorChain(&$error),
            $($arg)+
        )
    };
    ($error:expr, $($arg:tt)+) => {
        tracing::error!(
            error = %$crate::utils::o11y::logging::ErrorChain(&$error),
            $($arg)+
        )
    };
}

pub use crate::{as_error, log_error};
