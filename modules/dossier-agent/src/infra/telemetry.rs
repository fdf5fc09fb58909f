//! Pluggable instrumentation for the iteration controller.

use std::time::Duration;

use tracing::{debug, info};

use crate::pipeline::PassPhase;

/// Receives stage lifecycle notifications. The controller always calls the
/// sink; pick [`NoopTelemetry`] to discard them.
pub trait TelemetrySink: Send + Sync {
    fn stage_started(&self, phase: PassPhase, iteration: u32);

    fn stage_finished(&self, phase: PassPhase, iteration: u32, elapsed: Duration);

    fn event(&self, name: &str, payload: &serde_json::Value);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {
    fn stage_started(&self, _phase: PassPhase, _iteration: u32) {}

    fn stage_finished(&self, _phase: PassPhase, _iteration: u32, _elapsed: Duration) {}

    fn event(&self, _name: &str, _payload: &serde_json::Value) {}
}

/// Emits stage timings as `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn stage_started(&self, phase: PassPhase, iteration: u32) {
        debug!(phase = phase.as_str(), iteration, "Stage started");
    }

    fn stage_finished(&self, phase: PassPhase, iteration: u32, elapsed: Duration) {
        info!(
            phase = phase.as_str(),
            iteration,
            elapsed_ms = elapsed.as_millis() as u64,
            "Stage finished"
        );
    }

    fn event(&self, name: &str, payload: &serde_json::Value) {
        info!(event = name, payload = %payload, "Telemetry event");
    }
}
