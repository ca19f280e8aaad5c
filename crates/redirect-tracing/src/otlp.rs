//! Subscriber setup: log lines to stderr, plus OTLP span export when an
//! endpoint is configured.

use anyhow::Result;
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_sdk::Resource;
use tracing::Subscriber;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::{LogFormat, OtlpProtocol, TracingConfig};

/// Keeps the tracer provider alive; flushes and shuts it down on drop.
pub struct TracingGuard {
    provider: Option<SdkTracerProvider>,
}

impl TracingGuard {
    /// Whether spans are being exported over OTLP.
    pub fn exporting(&self) -> bool {
        self.provider.is_some()
    }
}

impl Drop for TracingGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("tracer provider shutdown failed: {e}");
            }
        }
    }
}

/// Level filter for `log_level`; an unparsable directive means `info`.
pub fn env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber.
///
/// An exporter that cannot be built is logged and skipped; logging to stderr
/// always works. Hold the returned guard for the life of the process.
pub fn init_tracing(config: &TracingConfig) -> TracingGuard {
    let (provider, export_error) = match config.otlp_endpoint.as_deref() {
        None => (None, None),
        Some(endpoint) => match build_provider(config, endpoint) {
            Ok(provider) => (Some(provider), None),
            Err(e) => (None, Some((endpoint, e))),
        },
    };

    let otel_layer = provider.as_ref().map(|p| {
        tracing_opentelemetry::layer().with_tracer(p.tracer(config.service_name.clone()))
    });

    tracing_subscriber::registry()
        .with(otel_layer)
        .with(log_layer(config.format))
        .with(env_filter(&config.log_level))
        .init();

    match (&provider, export_error) {
        (Some(_), _) => tracing::info!(
            endpoint = config.otlp_endpoint.as_deref().unwrap_or_default(),
            service = %config.service_name,
            protocol = ?config.protocol,
            "OTLP span export enabled"
        ),
        (None, Some((endpoint, e))) => tracing::warn!(
            error = %e,
            endpoint = %endpoint,
            "OTLP exporter failed to initialize, logging only"
        ),
        (None, None) => {}
    }

    TracingGuard { provider }
}

fn log_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => layer.boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}

fn build_provider(config: &TracingConfig, endpoint: &str) -> Result<SdkTracerProvider> {
    let builder = opentelemetry_otlp::SpanExporter::builder();
    let exporter = match config.protocol {
        OtlpProtocol::Grpc => builder.with_tonic().with_endpoint(endpoint).build()?,
        OtlpProtocol::Http => builder.with_http().with_endpoint(endpoint).build()?,
    };

    let resource = Resource::builder_empty()
        .with_service_name(config.service_name.clone())
        .build();

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource)
        .build())
}
