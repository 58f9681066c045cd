//! Structured simulation events.
//!
//! The core never writes operator-facing text to stdout. Everything
//! observable flows through an [`EventSink`]; the default sink logs
//! through `tracing`, and tests use a collecting sink.

use std::sync::Mutex;

use serde::Serialize;
use tracing::{info, warn};

use crate::types::{Direction, RunwayId};

#[derive(Debug, Clone, Serialize)]
pub enum SimEvent {
    SimulationInitialized { airlines: usize, runways: usize },
    SimulationStarted,
    SimulationPaused,
    SimulationResumed,
    SimulationStopped,
    SimulationCompleted { at_s: f64 },
    FlightScheduled {
        flight: String,
        airline: String,
        direction: Direction,
        emergency: bool,
    },
    RunwayAssigned { flight: String, runway: RunwayId },
    RunwayReleased { flight: String, runway: RunwayId },
    FlightDenied { flight: String },
    FlightCompleted { flight: String },
    FlightCanceled { flight: String, reason: String },
    AvnIssued { avn_id: u32, flight: String, airline: String, total: f64 },
    AvnPaid { avn_id: u32 },
    CargoFlightCreated { flight: String, airline: String },
    CargoCounterCorrected { counter: i64, actual: i64 },
    BridgeWriteFailed { pending: usize },
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: &SimEvent);
}

/// Default sink: routes events to `tracing` at info or warn level.
#[derive(Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &SimEvent) {
        match event {
            SimEvent::FlightDenied { flight } => {
                warn!(target: "atcsim", "no runway available for flight {}", flight);
            }
            SimEvent::FlightCanceled { flight, reason } => {
                warn!(target: "atcsim", "flight {} canceled: {}", flight, reason);
            }
            SimEvent::CargoCounterCorrected { counter, actual } => {
                warn!(
                    target: "atcsim",
                    "cargo flight counter mismatch: counter {} actual {}, correcting",
                    counter, actual
                );
            }
            SimEvent::BridgeWriteFailed { pending } => {
                warn!(
                    target: "atcsim",
                    "billing stream write failed, {} records pending",
                    pending
                );
            }
            SimEvent::AvnIssued { avn_id, flight, airline, total } => {
                info!(
                    target: "atcsim",
                    "AVN #{} issued to {} flight {}, total due {:.2}",
                    avn_id, airline, flight, total
                );
            }
            other => {
                info!(target: "atcsim", event = ?other, "simulation event");
            }
        }
    }
}

/// Collects events in memory. Intended for tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<SimEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<SimEvent> {
        match self.events.lock() {
            Ok(mut guard) => core::mem::take(&mut *guard),
            Err(_) => Vec::new(),
        }
    }

    pub fn snapshot(&self) -> Vec<SimEvent> {
        match self.events.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => Vec::new(),
        }
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &SimEvent) {
        if let Ok(mut guard) = self.events.lock() {
            guard.push(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_collects_in_order() {
        let sink = MemorySink::new();
        sink.emit(&SimEvent::SimulationStarted);
        sink.emit(&SimEvent::AvnPaid { avn_id: 1000 });

        let events = sink.take();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], SimEvent::SimulationStarted));
        assert!(matches!(events[1], SimEvent::AvnPaid { avn_id: 1000 }));
        assert!(sink.take().is_empty());
    }
}
