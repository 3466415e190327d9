use async_trait::async_trait;
use opentelemetry::global::BoxedTracer;
use opentelemetry::metrics::{Meter, MeterProvider as _};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::error::OTelSdkResult;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;
use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::TelemetryError;

/// Instrumentation scope under which the reporter's tracer and meter are
/// created.
pub const SCOPE_NAME: &str = "verdict-reporter";

/// How long shutdown may block on the exporters before it is abandoned.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Capability implemented by every concrete provider that can be shut down
/// directly. The adapter downcasts to this at the single seam where the
/// tracer-side shutdown is triggered, so a facade handle registered before
/// the concrete backend was attached still resolves to something shuttable.
pub trait Shuttable: Send + Sync {
    fn shutdown_now(&self) -> OTelSdkResult;
}

impl Shuttable for SdkTracerProvider {
    fn shutdown_now(&self) -> OTelSdkResult {
        self.shutdown()
    }
}

impl Shuttable for SdkMeterProvider {
    fn shutdown_now(&self) -> OTelSdkResult {
        self.shutdown()
    }
}

fn resolve_delegate(handle: &(dyn Any + Send + Sync)) -> Option<&dyn Shuttable> {
    if let Some(provider) = handle.downcast_ref::<SdkTracerProvider>() {
        Some(provider)
    } else if let Some(provider) = handle.downcast_ref::<SdkMeterProvider>() {
        Some(provider)
    } else {
        None
    }
}

/// The seam between the lifecycle sequencer and whatever concrete telemetry
/// backend is configured. The sequencer only ever talks to this trait, so
/// tests can substitute a recording fake.
#[async_trait]
pub trait TelemetryControl: Send + Sync {
    /// Returns a tracer for opening run/suite/test spans.
    fn tracer(&self) -> BoxedTracer;

    /// Returns a meter for creating the reporter's instruments.
    fn meter(&self) -> Meter;

    /// Synchronously flushes the metrics pipeline. Must run after the run
    /// summary gauge is registered and before any provider is shut down,
    /// or the one-shot exporters drop the final values.
    fn force_flush(&self) -> Result<(), TelemetryError>;

    /// Shuts down the tracer side, resolving a facade-registered handle to
    /// its concrete delegate first.
    fn shutdown_traces(&self) -> Result<(), TelemetryError>;

    /// Shuts down the whole telemetry instance, bounded by a timeout.
    /// Idempotent: a second call is a logged no-op.
    async fn shutdown(&self) -> Result<(), TelemetryError>;
}

/// An active telemetry instance holding the providers it was constructed
/// with. Providers are injected explicitly; nothing here reaches through
/// process globals, which is what lets tests run against in-memory
/// exporters.
pub struct TelemetryInstance {
    tracer_provider: Option<SdkTracerProvider>,
    meter_provider: Option<SdkMeterProvider>,
    /// The handle under which the tracer provider was registered with the
    /// process-wide facade. Usually the provider itself, but a host may
    /// have installed a wrapper; resolution happens at shutdown.
    registered_tracer: Option<Arc<dyn Any + Send + Sync>>,
    traces_shut: AtomicBool,
    shutdown_done: AtomicBool,
}

impl TelemetryInstance {
    pub fn from_providers(
        tracer_provider: Option<SdkTracerProvider>,
        meter_provider: Option<SdkMeterProvider>,
    ) -> Self {
        let registered_tracer = tracer_provider
            .clone()
            .map(|p| Arc::new(p) as Arc<dyn Any + Send + Sync>);
        Self::from_parts(tracer_provider, meter_provider, registered_tracer)
    }

    pub fn from_parts(
        tracer_provider: Option<SdkTracerProvider>,
        meter_provider: Option<SdkMeterProvider>,
        registered_tracer: Option<Arc<dyn Any + Send + Sync>>,
    ) -> Self {
        Self {
            tracer_provider,
            meter_provider,
            registered_tracer,
            traces_shut: AtomicBool::new(false),
            shutdown_done: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl TelemetryControl for TelemetryInstance {
    fn tracer(&self) -> BoxedTracer {
        match &self.tracer_provider {
            Some(provider) => BoxedTracer::new(Box::new(provider.tracer(SCOPE_NAME))),
            None => opentelemetry::global::tracer(SCOPE_NAME),
        }
    }

    fn meter(&self) -> Meter {
        match &self.meter_provider {
            Some(provider) => provider.meter(SCOPE_NAME),
            None => opentelemetry::global::meter(SCOPE_NAME),
        }
    }

    fn force_flush(&self) -> Result<(), TelemetryError> {
        match &self.meter_provider {
            Some(provider) => provider
                .force_flush()
                .map_err(|e| TelemetryError::FlushError(e.to_string())),
            None => {
                debug!("No meter provider configured, nothing to flush");
                Ok(())
            }
        }
    }

    fn shutdown_traces(&self) -> Result<(), TelemetryError> {
        if self.traces_shut.load(Ordering::SeqCst) {
            debug!("Tracer provider already shut down");
            return Ok(());
        }

        let Some(handle) = &self.registered_tracer else {
            debug!("No tracer provider registered, nothing to shut down");
            return Ok(());
        };

        match resolve_delegate(handle.as_ref()) {
            Some(delegate) => {
                delegate
                    .shutdown_now()
                    .map_err(|e| TelemetryError::ShutdownError(e.to_string()))?;
                self.traces_shut.store(true, Ordering::SeqCst);
                Ok(())
            }
            None => {
                warn!("Registered tracer handle has no shuttable delegate, skipping");
                Ok(())
            }
        }
    }

    async fn shutdown(&self) -> Result<(), TelemetryError> {
        if self.shutdown_done.swap(true, Ordering::SeqCst) {
            debug!("Telemetry already shut down, skipping");
            return Ok(());
        }

        let tracer_provider = if self.traces_shut.load(Ordering::SeqCst) {
            None
        } else {
            self.tracer_provider.clone()
        };
        let meter_provider = self.meter_provider.clone();

        // Provider shutdown blocks on the exporters, so run it off the
        // event loop and bound the wait.
        let join = tokio::task::spawn_blocking(move || {
            let mut failures = Vec::new();
            if let Some(provider) = tracer_provider {
                if let Err(e) = provider.shutdown() {
                    failures.push(format!("tracer provider: {}", e));
                }
            }
            if let Some(provider) = meter_provider {
                if let Err(e) = provider.shutdown() {
                    failures.push(format!("meter provider: {}", e));
                }
            }
            failures
        });

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, join).await {
            Ok(Ok(failures)) if failures.is_empty() => Ok(()),
            Ok(Ok(failures)) => Err(TelemetryError::ShutdownError(failures.join("; "))),
            Ok(Err(e)) => Err(TelemetryError::ShutdownError(e.to_string())),
            Err(_) => Err(TelemetryError::ShutdownTimeout(SHUTDOWN_TIMEOUT.as_secs())),
        }
    }
}
