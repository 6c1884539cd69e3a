//! Tracing setup for the quizdesk server.
//!
//! Logs always go to stderr. When `OTEL_EXPORTER_OTLP_ENDPOINT` is set, spans
//! are also shipped to an OTLP/gRPC collector, tagged with the build commit
//! and an instance id so several fronts behind one balancer stay apart.

use anyhow::{Result, anyhow};
use base64ct::{Base64, Encoding};
use once_cell::sync::OnceCell;
use opentelemetry::propagation::TextMapCompositePropagator;
use opentelemetry::{KeyValue, global, trace::TracerProvider as _};
use opentelemetry_otlp::{Compression, SpanExporter, WithExportConfig, WithTonicConfig};
use opentelemetry_sdk::{
    Resource,
    propagation::{BaggagePropagator, TraceContextPropagator},
    trace::{SdkTracerProvider, Tracer},
};
use std::{env::var, time::Duration};
use tonic::{
    metadata::{Ascii, Binary, MetadataKey, MetadataMap, MetadataValue},
    transport::ClientTlsConfig,
};
use tracing::{Level, debug};
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt};
use ulid::Ulid;

const SERVICE_NAME: &str = env!("CARGO_PKG_NAME");
const LOCAL_COLLECTOR: &str = "http://localhost:4317";
const EXPORT_TIMEOUT: Duration = Duration::from_secs(3);

/// Lets operators pin the instance id instead of getting a fresh ULID on
/// every start.
const INSTANCE_ID_ENV: &str = "QUIZDESK_INSTANCE_ID";

/// Dependencies that only speak up when something is wrong.
const QUIET_TARGETS: [&str; 5] = [
    "hyper=error",
    "h2=warn",
    "reqwest=warn",
    "tokio=error",
    "opentelemetry_sdk=warn",
];

static TRACER_PROVIDER: OnceCell<SdkTracerProvider> = OnceCell::new();

/// OTLP collector the spans are sent to.
#[derive(Debug, PartialEq, Eq)]
struct Collector {
    endpoint: String,
    headers: Vec<(String, String)>,
}

impl Collector {
    fn from_env() -> Option<Self> {
        Self::from_lookup(|name| var(name).ok())
    }

    /// `None` when no endpoint is configured, so export stays off.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let endpoint = lookup("OTEL_EXPORTER_OTLP_ENDPOINT")?;
        if let Some(protocol) = lookup("OTEL_EXPORTER_OTLP_PROTOCOL").filter(|p| p != "grpc") {
            debug!("OTEL_EXPORTER_OTLP_PROTOCOL='{protocol}' ignored, spans go over grpc");
        }

        let endpoint = endpoint.trim().trim_end_matches('/');
        let endpoint = if endpoint.is_empty() {
            LOCAL_COLLECTOR.to_string()
        } else if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!("https://{endpoint}")
        };

        let headers = lookup("OTEL_EXPORTER_OTLP_HEADERS")
            .map(|raw| {
                raw.split(',')
                    .filter_map(|pair| {
                        let (key, value) = pair.split_once('=')?;
                        let key = key.trim().to_ascii_lowercase();
                        (!key.is_empty()).then(|| (key, value.trim().to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        Some(Self { endpoint, headers })
    }

    /// Host checked against the collector certificate; plain http skips TLS.
    fn tls_host(&self) -> Option<&str> {
        self.endpoint
            .strip_prefix("https://")
            .and_then(|rest| rest.split(['/', ':']).next())
            .filter(|host| !host.is_empty())
    }

    /// gRPC metadata for the export calls. `-bin` keys carry base64 values.
    fn metadata(&self) -> Result<MetadataMap> {
        let mut metadata = MetadataMap::with_capacity(self.headers.len());
        for (key, value) in &self.headers {
            if key.ends_with("-bin") {
                let bytes = Base64::decode_vec(value)
                    .map_err(|err| anyhow!("header {key} is not base64: {err}"))?;
                let name = MetadataKey::<Binary>::from_bytes(key.as_bytes())
                    .map_err(|err| anyhow!("bad header name {key}: {err}"))?;
                metadata.insert_bin(name, MetadataValue::from_bytes(&bytes));
            } else {
                let name = MetadataKey::<Ascii>::from_bytes(key.as_bytes())
                    .map_err(|err| anyhow!("bad header name {key}: {err}"))?;
                let value: MetadataValue<Ascii> = value
                    .parse()
                    .map_err(|err| anyhow!("bad value for header {key}: {err}"))?;
                metadata.insert(name, value);
            }
        }
        Ok(metadata)
    }

    fn exporter(&self) -> Result<SpanExporter> {
        let mut builder = SpanExporter::builder()
            .with_tonic()
            .with_endpoint(&self.endpoint)
            .with_compression(Compression::Gzip)
            .with_timeout(EXPORT_TIMEOUT);
        if let Some(host) = self.tls_host() {
            builder = builder.with_tls_config(
                ClientTlsConfig::new()
                    .domain_name(host.to_string())
                    .with_native_roots(),
            );
        }
        if !self.headers.is_empty() {
            builder = builder.with_metadata(self.metadata()?);
        }
        Ok(builder.build()?)
    }
}

fn instance_id(lookup: impl Fn(&str) -> Option<String>) -> String {
    lookup(INSTANCE_ID_ENV)
        .or_else(|| lookup("OTEL_SERVICE_INSTANCE_ID"))
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Ulid::new().to_string())
}

fn resource(instance_id: String) -> Resource {
    Resource::builder_empty()
        .with_attributes(vec![
            KeyValue::new("service.name", SERVICE_NAME),
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
            KeyValue::new("service.instance.id", instance_id),
            KeyValue::new("vcs.revision", crate::GIT_COMMIT_HASH),
        ])
        .build()
}

fn init_tracer(collector: &Collector) -> Result<Tracer> {
    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(collector.exporter()?)
        .with_resource(resource(instance_id(|name| var(name).ok())))
        .build();

    let _ = TRACER_PROVIDER.set(provider.clone());
    global::set_tracer_provider(provider.clone());
    global::set_text_map_propagator(TextMapCompositePropagator::new(vec![
        Box::new(TraceContextPropagator::new()),
        Box::new(BaggagePropagator::new()),
    ]));

    debug!(endpoint = %collector.endpoint, "Exporting spans");
    Ok(provider.tracer(SERVICE_NAME))
}

fn log_filter(level: Level) -> Result<EnvFilter> {
    let mut filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    for directive in QUIET_TARGETS {
        filter = filter.add_directive(directive.parse()?);
    }
    Ok(filter)
}

/// Installs the global subscriber. `None` logs errors only.
///
/// # Errors
///
/// Returns an error if the exporter cannot be built or a subscriber is
/// already installed.
pub fn init(verbosity_level: Option<Level>) -> Result<()> {
    let filter = log_filter(verbosity_level.unwrap_or(Level::ERROR))?;
    let fmt_layer = fmt::layer()
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_target(false)
        .pretty();

    match Collector::from_env() {
        Some(collector) => {
            let otel_layer = tracing_opentelemetry::layer().with_tracer(init_tracer(&collector)?);
            let subscriber = Registry::default()
                .with(fmt_layer)
                .with(otel_layer)
                .with(filter);
            tracing::subscriber::set_global_default(subscriber)?;
        }
        None => {
            let subscriber = Registry::default().with(fmt_layer).with(filter);
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }
    Ok(())
}

/// Flushes pending spans. Does nothing when export was never enabled.
pub fn shutdown_tracer() {
    if let Some(provider) = TRACER_PROVIDER.get() {
        debug!("Flushing spans");
        if let Err(err) = provider.shutdown() {
            debug!("Span flush failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    fn collector(vars: &[(&str, &str)]) -> Result<Collector> {
        Collector::from_lookup(lookup(vars)).ok_or_else(|| anyhow!("collector expected"))
    }

    #[test]
    fn export_is_off_without_endpoint() {
        assert_eq!(Collector::from_lookup(lookup(&[])), None);
        assert_eq!(
            Collector::from_lookup(lookup(&[("OTEL_EXPORTER_OTLP_HEADERS", "a=b")])),
            None
        );
    }

    #[test]
    fn endpoint_forms() -> Result<()> {
        let local = collector(&[("OTEL_EXPORTER_OTLP_ENDPOINT", " ")])?;
        assert_eq!(local.endpoint, LOCAL_COLLECTOR);
        assert_eq!(local.tls_host(), None);

        let bare = collector(&[("OTEL_EXPORTER_OTLP_ENDPOINT", "otel.quiz.example:4317/")])?;
        assert_eq!(bare.endpoint, "https://otel.quiz.example:4317");
        assert_eq!(bare.tls_host(), Some("otel.quiz.example"));

        let pathed = collector(&[(
            "OTEL_EXPORTER_OTLP_ENDPOINT",
            "https://otel.quiz.example/v1/traces",
        )])?;
        assert_eq!(pathed.tls_host(), Some("otel.quiz.example"));
        Ok(())
    }

    #[test]
    fn headers_skip_malformed_pairs() -> Result<()> {
        let collector = collector(&[
            ("OTEL_EXPORTER_OTLP_ENDPOINT", "http://localhost:4317"),
            ("OTEL_EXPORTER_OTLP_HEADERS", "X-Team = quiz ,malformed, =orphan,sig=a=b"),
        ])?;
        assert_eq!(
            collector.headers,
            vec![
                ("x-team".to_string(), "quiz".to_string()),
                ("sig".to_string(), "a=b".to_string()),
            ]
        );
        Ok(())
    }

    #[test]
    fn metadata_takes_ascii_and_binary_headers() -> Result<()> {
        let collector = collector(&[
            ("OTEL_EXPORTER_OTLP_ENDPOINT", "http://localhost:4317"),
            // "quizdesk" in base64
            ("OTEL_EXPORTER_OTLP_HEADERS", "authorization=Bearer t,trace-bin=cXVpemRlc2s="),
        ])?;
        let metadata = collector.metadata()?;
        assert_eq!(metadata.len(), 2);
        assert!(metadata.get("authorization").is_some());
        assert!(metadata.get_bin("trace-bin").is_some());
        Ok(())
    }

    #[test]
    fn metadata_rejects_bad_base64() -> Result<()> {
        let collector = collector(&[
            ("OTEL_EXPORTER_OTLP_ENDPOINT", "http://localhost:4317"),
            ("OTEL_EXPORTER_OTLP_HEADERS", "trace-bin=not base64!"),
        ])?;
        assert!(
            collector
                .metadata()
                .err()
                .is_some_and(|err| err.to_string().contains("is not base64"))
        );
        Ok(())
    }

    #[test]
    fn instance_id_prefers_quizdesk_variable() {
        let both = lookup(&[
            (INSTANCE_ID_ENV, "front-a"),
            ("OTEL_SERVICE_INSTANCE_ID", "otel-id"),
        ]);
        assert_eq!(instance_id(both), "front-a");
        assert_eq!(instance_id(lookup(&[("OTEL_SERVICE_INSTANCE_ID", "otel-id")])), "otel-id");

        let generated = instance_id(lookup(&[(INSTANCE_ID_ENV, "  ")]));
        assert!(Ulid::from_string(&generated).is_ok());
    }

    #[test]
    fn quiet_targets_are_valid_directives() -> Result<()> {
        log_filter(Level::INFO)?;
        Ok(())
    }

    #[test]
    fn shutdown_without_provider_is_noop() {
        shutdown_tracer();
    }
}
