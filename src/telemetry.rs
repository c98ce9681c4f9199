//! Logging setup and HTTP request tracing.
//!
//! The filter comes from `RUST_LOG`, then `LOG_LEVEL`, then a default of `info` in
//! production and `debug` elsewhere. Output is newline-delimited JSON when
//! `LOG_FORMAT=json` or `APP_ENV=production`, human-readable lines otherwise.
//!
//! Request headers are never recorded, so bearer tokens and API keys in front of the
//! gateway stay out of the logs.

use tower_http::LatencyUnit;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, HttpMakeClassifier, TraceLayer};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "LOG_FORMAT";
pub const ENV_APP_ENV: &str = "APP_ENV";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Human,
    Json,
}

/// Resolved logging options, independent of the process environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub format: LogFormat,
    /// Directive used when `RUST_LOG` is unset.
    pub level: String,
}

impl LogSettings {
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let production = lookup(ENV_APP_ENV).is_some_and(|env| env.eq_ignore_ascii_case("production"));
        let format = match lookup(ENV_LOG_FORMAT) {
            Some(format) if format.eq_ignore_ascii_case("json") => LogFormat::Json,
            Some(format) if format.eq_ignore_ascii_case("pretty") => LogFormat::Human,
            _ if production => LogFormat::Json,
            _ => LogFormat::Human,
        };
        let level = lookup(ENV_LOG_LEVEL)
            .filter(|level| !level.trim().is_empty())
            .unwrap_or_else(|| if production { "info" } else { "debug" }.to_string());
        Self { format, level }
    }
}

#[derive(Debug, Clone)]
pub struct Telemetry {
    name: &'static str,
    version: &'static str,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl Telemetry {
    pub fn new() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    pub fn with_version(mut self, version: &'static str) -> Self {
        self.version = version;
        self
    }

    /// Install the global subscriber. A second registration in the same process is a no-op.
    pub fn register(self) -> Self {
        let settings = LogSettings::from_lookup(|name| std::env::var(name).ok());
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&settings.level))
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let registry = tracing_subscriber::registry().with(filter);
        let installed = match settings.format {
            LogFormat::Human => registry.with(fmt::layer().with_target(true)).try_init(),
            LogFormat::Json => registry
                .with(fmt::layer().json().with_target(true).with_current_span(true))
                .try_init(),
        };
        if installed.is_ok() {
            tracing::info!(
                service = self.name,
                version = self.version,
                format = ?settings.format,
                "logging initialised"
            );
        }
        self
    }

    /// Span per HTTP request with method, URI and status; no headers.
    pub fn http_tracing(&self) -> TraceLayer<HttpMakeClassifier> {
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_response(
                DefaultOnResponse::new()
                    .level(Level::INFO)
                    .latency_unit(LatencyUnit::Millis),
            )
    }
}
