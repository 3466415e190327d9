use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// Basic auth configuration for OTLP endpoints
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct BasicAuth {
    pub enabled: bool,
    pub username: String,
    pub password: String,
}

// Configuration for the trace exporter
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TracesConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub auth: BasicAuth,
}

// Configuration for the metric exporter
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub auth: BasicAuth,
}

// Labels added to all exported telemetry
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct TelemetryLabels {
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub traces: TracesConfig,
    pub metrics: MetricsConfig,
    pub global_labels: TelemetryLabels,
}

const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4318";

impl Default for TracesConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: DEFAULT_OTLP_ENDPOINT.to_string(),
            auth: BasicAuth::default(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: DEFAULT_OTLP_ENDPOINT.to_string(),
            auth: BasicAuth::default(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "verdict".to_string(),
            traces: TracesConfig::default(),
            metrics: MetricsConfig::default(),
            global_labels: TelemetryLabels::default(),
        }
    }
}
