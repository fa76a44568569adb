//! Tracing subscriber setup.
//!
//! Call [`init_tracing`] once at startup and keep the returned guard alive.
//!
//! # Environment variables
//!
//! | Variable | Effect |
//! |---|---|
//! | `RUST_LOG` | Log filter (default `"info"`). |
//! | `ARBRIDGE_LOG_FORMAT=json` | Newline-delimited JSON logs instead of the compact format. |
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | When set, spans are also exported over OTLP/HTTP. |
//!
//! ```rust,no_run
//! let _guard = arbridge_runtime::telemetry::init_tracing(
//!     arbridge_runtime::telemetry::TelemetryConfig::from_env("arbridge"),
//! );
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub const LOG_FORMAT_ENV: &str = "ARBRIDGE_LOG_FORMAT";
pub const OTLP_ENDPOINT_ENV: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

/// Where logs and spans go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub json: bool,
    pub otlp_endpoint: Option<String>,
    /// Filter used when `RUST_LOG` is unset.
    pub default_filter: String,
}

impl TelemetryConfig {
    pub fn from_env(service_name: &str) -> Self {
        Self::from_vars(service_name, |key| std::env::var(key).ok())
    }

    fn from_vars(service_name: &str, var: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            service_name: service_name.to_string(),
            json: var(LOG_FORMAT_ENV).is_some_and(|v| v.eq_ignore_ascii_case("json")),
            otlp_endpoint: var(OTLP_ENDPOINT_ENV).filter(|v| !v.trim().is_empty()),
            default_filter: "info".to_string(),
        }
    }
}

/// Install the global subscriber.
///
/// A second call in the same process leaves the first subscriber in place
/// and only reports the conflict on stderr, so tests may call it freely.
pub fn init_tracing(config: TelemetryConfig) -> TracerProviderGuard {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));
    let provider = build_provider(&config);

    let otel_layer = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer("arbridge")));
    let (json_layer, compact_layer) = if config.json {
        (Some(fmt::layer().json()), None)
    } else {
        (None, Some(fmt::layer().compact()))
    };

    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(otel_layer)
        .with(json_layer)
        .with(compact_layer)
        .try_init();
    if let Err(e) = installed {
        eprintln!("[arbridge] tracing subscriber already installed: {e}");
    }

    TracerProviderGuard(provider)
}

/// Flushes and shuts down the span exporter on drop.
pub struct TracerProviderGuard(Option<SdkTracerProvider>);

impl TracerProviderGuard {
    pub fn is_exporting(&self) -> bool {
        self.0.is_some()
    }
}

impl Drop for TracerProviderGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("[arbridge] OpenTelemetry provider shutdown error: {e}");
            }
        }
    }
}

fn build_provider(config: &TelemetryConfig) -> Option<SdkTracerProvider> {
    let endpoint = config.otlp_endpoint.clone()?;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| eprintln!("[arbridge] OTLP exporter init failed: {e}"))
        .ok()?;

    let resource = Resource::builder()
        .with_service_name(config.service_name.clone())
        .build();

    // Simple exporter: init runs before the Tokio runtime exists.
    Some(
        SdkTracerProvider::builder()
            .with_resource(resource)
            .with_simple_exporter(exporter)
            .build(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_to_compact_without_exporter() {
        let cfg = TelemetryConfig::from_vars("svc", vars(&[]));
        assert!(!cfg.json);
        assert_eq!(cfg.otlp_endpoint, None);
        assert_eq!(cfg.default_filter, "info");
        assert!(build_provider(&cfg).is_none());
    }

    #[test]
    fn reads_format_and_endpoint() {
        let cfg = TelemetryConfig::from_vars(
            "svc",
            vars(&[(LOG_FORMAT_ENV, "JSON"), (OTLP_ENDPOINT_ENV, "http://localhost:4318")]),
        );
        assert!(cfg.json);
        assert_eq!(cfg.otlp_endpoint.as_deref(), Some("http://localhost:4318"));
    }

    #[test]
    fn blank_endpoint_is_ignored() {
        let cfg = TelemetryConfig::from_vars("svc", vars(&[(OTLP_ENDPOINT_ENV, "  ")]));
        assert_eq!(cfg.otlp_endpoint, None);
    }

    #[test]
    fn guard_without_provider_drops_cleanly() {
        let guard = TracerProviderGuard(None);
        assert!(!guard.is_exporting());
        drop(guard);
    }

    #[test]
    fn repeated_init_does_not_panic() {
        let cfg = TelemetryConfig::from_vars("svc", vars(&[]));
        let _a = init_tracing(cfg.clone());
        let _b = init_tracing(cfg);
    }
}
