use base64::Engine;
use opentelemetry_otlp::{MetricExporter, Protocol, SpanExporter, WithExportConfig, WithHttpConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;
use std::collections::HashMap;
use std::time::Duration;
use tracing::info;

use crate::config::{BasicAuth, MetricsConfig, TracesConfig};
use crate::error::TelemetryError;

const EXPORT_TIMEOUT: Duration = Duration::from_secs(5);

// Build the complete endpoint URL with proper path handling
fn signal_url(endpoint: &str, signal_path: &str) -> String {
    if endpoint.ends_with(signal_path) || endpoint.ends_with(&format!("{}/", signal_path)) {
        endpoint.to_string()
    } else if endpoint.ends_with('/') {
        format!("{}{}", endpoint, signal_path)
    } else {
        format!("{}/{}", endpoint, signal_path)
    }
}

fn auth_headers(auth: &BasicAuth) -> Option<HashMap<String, String>> {
    if !auth.enabled {
        return None;
    }
    let auth_string = format!("{}:{}", auth.username, auth.password);
    let encoded = base64::engine::general_purpose::STANDARD.encode(auth_string);
    let mut headers = HashMap::new();
    headers.insert("Authorization".to_string(), format!("Basic {}", encoded));
    Some(headers)
}

pub fn init_traces(
    traces_config: &TracesConfig,
    resource: Resource,
) -> Result<SdkTracerProvider, TelemetryError> {
    let endpoint_url = signal_url(&traces_config.endpoint, "v1/traces");
    info!("Initializing traces with endpoint: {}", endpoint_url);

    let mut builder = SpanExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpBinary)
        .with_endpoint(&endpoint_url)
        .with_timeout(EXPORT_TIMEOUT);

    if let Some(headers) = auth_headers(&traces_config.auth) {
        builder = builder.with_headers(headers);
    }

    let exporter = builder.build().map_err(|e| {
        TelemetryError::InitializationError(format!("Failed to build span exporter: {}", e))
    })?;

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource)
        .build();

    Ok(provider)
}

pub fn init_metrics(
    metrics_config: &MetricsConfig,
    resource: Resource,
) -> Result<SdkMeterProvider, TelemetryError> {
    let endpoint_url = signal_url(&metrics_config.endpoint, "v1/metrics");
    info!("Initializing metrics with endpoint: {}", endpoint_url);

    let mut builder = MetricExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpBinary)
        .with_endpoint(&endpoint_url)
        .with_timeout(EXPORT_TIMEOUT);

    if let Some(headers) = auth_headers(&metrics_config.auth) {
        builder = builder.with_headers(headers);
    }

    let exporter = builder.build().map_err(|e| {
        TelemetryError::InitializationError(format!("Failed to build metric exporter: {}", e))
    })?;

    let provider = SdkMeterProvider::builder()
        .with_periodic_exporter(exporter)
        .with_resource(resource)
        .build();

    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_url_appends_missing_path() {
        assert_eq!(
            signal_url("http://localhost:4318", "v1/metrics"),
            "http://localhost:4318/v1/metrics"
        );
        assert_eq!(
            signal_url("http://localhost:4318/", "v1/traces"),
            "http://localhost:4318/v1/traces"
        );
    }

    #[test]
    fn signal_url_keeps_existing_path() {
        assert_eq!(
            signal_url("http://collector/v1/metrics", "v1/metrics"),
            "http://collector/v1/metrics"
        );
    }

    #[test]
    fn auth_headers_disabled_by_default() {
        assert!(auth_headers(&BasicAuth::default()).is_none());
    }

    #[test]
    fn auth_headers_encode_credentials() {
        let auth = BasicAuth {
            enabled: true,
            username: "user".to_string(),
            password: "pass".to_string(),
        };
        let headers = auth_headers(&auth).unwrap();
        // "user:pass" in base64
        assert_eq!(
            headers.get("Authorization").unwrap(),
            "Basic dXNlcjpwYXNz"
        );
    }
}
