//! # ATC Simulator
//!
//! An automated air-traffic-control simulation core for a three-runway
//! airport: a finite aircraft population drawn from a fixed airline
//! roster, per-direction flight-phase state machines, a priority
//! runway arbiter, phase-aware speed monitoring with Airspace
//! Violation Notices, and a fixed-record IPC bridge to an external
//! billing collaborator.
//!
//! ## Quick start
//!
//! ```rust
//! use atcsim::{ControllerConfig, SimulationController};
//!
//! let controller = SimulationController::new(ControllerConfig::default());
//! controller.initialize().expect("fresh controller initializes");
//!
//! // Drive the simulation deterministically, 100 ms at a time.
//! for _ in 0..10 {
//!     controller.step(0.1);
//!     controller.generator_cycle();
//! }
//! let report = controller.status_report();
//! assert!(report.active_cargo_flights >= 1);
//! ```
//!
//! Started with [`SimulationController::start`], the same cycles run on
//! four background workers until the configured duration elapses or
//! [`SimulationController::stop`] joins them.
//!
//! ## Architecture
//!
//! - [`types`] - core enums, the speed-bound table, the airline roster
//! - [`aircraft`] / [`flight`] / [`airline`] - the traffic model
//! - [`runway`] / [`arbiter`] - shared runways and their scheduler
//! - [`monitor`] - speed violations and AVN billing records
//! - [`controller`] - clock, worker tasks, statistics, reports
//! - [`bridge`] - fixed 136-byte records to the billing collaborator
//! - [`protocol`] - the operator-facing JSON command surface
//! - [`events`] - structured event sink (tracing-backed by default)

#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod aircraft;
pub mod airline;
pub mod arbiter;
pub mod bridge;
pub mod controller;
pub mod events;
pub mod flight;
pub mod monitor;
pub mod protocol;
pub mod rng;
pub mod runway;
pub mod types;

pub use controller::{ControllerConfig, SimulationController, StatusReport};
pub use events::{EventSink, MemorySink, SimEvent, TracingSink};
pub use types::{AircraftKind, Direction, Phase, RunwayId};
