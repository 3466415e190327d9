use opentelemetry::global;
use tracing::{info, warn};

use crate::attributes::{build_resource, set_global_attributes};
use crate::config::TelemetryConfig;
use crate::error::TelemetryError;
use crate::exporters::{init_metrics, init_traces};
use crate::instance::TelemetryInstance;
use crate::logs::setup_log_subscriber;
use opentelemetry::KeyValue;

/// Creates a telemetry instance with the given configuration and attributes.
///
/// Builds the OTLP providers for whichever signals are enabled, registers
/// them with the process-wide facade, installs the log subscriber, and
/// returns a [`TelemetryInstance`] that owns their lifecycle. The instance
/// must be shut down before process exit or buffered telemetry is lost.
pub fn create_telemetry(
    telemetry_config: &TelemetryConfig,
    attributes: Vec<(String, String)>,
) -> Result<TelemetryInstance, TelemetryError> {
    let attributes = attributes
        .into_iter()
        .chain(telemetry_config.global_labels.labels.clone())
        .map(|(k, v)| KeyValue::new(k, v))
        .collect::<Vec<_>>();

    set_global_attributes(attributes.clone());

    let resource = build_resource(telemetry_config.service_name.clone(), attributes);

    let tracer_provider = if telemetry_config.traces.enabled {
        let provider = init_traces(&telemetry_config.traces, resource.clone())?;
        global::set_tracer_provider(provider.clone());
        Some(provider)
    } else {
        info!("Traces are disabled, skipping tracer initialization");
        None
    };

    let meter_provider = if telemetry_config.metrics.enabled {
        let provider = init_metrics(&telemetry_config.metrics, resource)?;
        global::set_meter_provider(provider.clone());
        Some(provider)
    } else {
        info!("Metrics are disabled, skipping metrics initialization");
        None
    };

    // Initialize tracing subscriber so component logs reach stdout/stderr
    setup_log_subscriber();

    if meter_provider.is_none() {
        warn!("No meter provider available, metrics will not be recorded");
    }

    Ok(TelemetryInstance::from_providers(
        tracer_provider,
        meter_provider,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::TelemetryControl;

    #[test]
    fn test_telemetry_instance_creation() {
        // Use default config which should be valid
        let config = TelemetryConfig::default();
        let attributes = vec![("test_key".to_string(), "test_value".to_string())];

        let result = create_telemetry(&config, attributes);
        assert!(result.is_ok());
    }

    #[test]
    fn test_telemetry_instance_with_empty_attributes() {
        let config = TelemetryConfig::default();
        let attributes = vec![];

        let result = create_telemetry(&config, attributes);
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_telemetry_instance_shutdown() {
        let config = TelemetryConfig::default();
        let attributes = vec![];

        let instance = create_telemetry(&config, attributes).unwrap();
        // Should not panic on shutdown
        instance.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_create_telemetry_with_multiple_attributes() {
        let config = TelemetryConfig::default();
        let attributes = vec![
            ("service".to_string(), "verdict".to_string()),
            ("version".to_string(), "1.0".to_string()),
            ("environment".to_string(), "test".to_string()),
        ];

        let result = create_telemetry(&config, attributes);
        assert!(result.is_ok());

        let instance = result.unwrap();
        instance.shutdown().await.unwrap();
    }
}
