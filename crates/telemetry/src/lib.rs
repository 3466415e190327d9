//! # Verdict Telemetry
//!
//! Provider plumbing for the verdict reporter: configuration, OTLP exporter
//! construction, and the adapter seam the lifecycle sequencer drives.
//!
//! ## Overview
//!
//! - **Provider construction**: OTLP/HTTP trace and metric providers built
//!   from a serde config, with optional basic auth.
//! - **Provider adapter**: [`TelemetryControl`] exposes "get a tracer",
//!   "get a meter", "flush", and "shutdown" to the reporter without leaking
//!   which concrete backend is configured.
//! - **Deterministic teardown**: shutdown is idempotent, bounded by a
//!   timeout, and resolves facade-registered providers through the
//!   [`Shuttable`] capability before shutting them down.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use verdict_telemetry::{TelemetryConfig, TelemetryControl, create_telemetry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), verdict_telemetry::TelemetryError> {
//!     let config = TelemetryConfig::default();
//!     let attributes = vec![("environment".to_string(), "ci".to_string())];
//!
//!     let telemetry = create_telemetry(&config, attributes)?;
//!
//!     // hand `telemetry` to the reporter; it flushes and shuts down
//!     // at run end
//!     telemetry.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod attributes;
pub mod config;
mod error;
mod exporters;
mod factory;
mod instance;
pub mod logs;

pub use config::TelemetryConfig;
pub use error::TelemetryError;
pub use factory::create_telemetry;
pub use instance::{Shuttable, TelemetryControl, TelemetryInstance};
