use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("telemetry initialization error: {0}")]
    InitializationError(String),
    #[error("flushing metrics pipeline: {0}")]
    FlushError(String),
    #[error("shutting down telemetry: {0}")]
    ShutdownError(String),
    #[error("telemetry shutdown timed out after {0} seconds")]
    ShutdownTimeout(u64),
}
