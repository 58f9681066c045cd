//! Central simulation controller: clock, worker tasks, flight
//! generation, the cargo-presence invariant, and reporting.
//!
//! Four long-lived workers drive a running simulation: the fixed-step
//! simulation loop, the flight generator, the monitoring loop, and the
//! denied-flight retry loop. All of them gate on a shared pause
//! condition and observe the stop flag every cycle. The same cycle
//! methods are public so tests can drive the controller
//! deterministically without threads.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::airline::Airline;
use crate::arbiter::{AssignOutcome, RunwayArbiter};
use crate::bridge::AvnRecord;
use crate::events::{EventSink, SimEvent, TracingSink};
use crate::flight::{Flight, FlightStatus};
use crate::monitor::{SpeedMonitor, ViolationRecord};
use crate::rng::SimRng;
use crate::runway::Runway;
use crate::types::{
    AircraftKind, Direction, RunwayId, AIRLINES, RUNWAY_COUNT, SIMULATION_DURATION_S,
};

const SIM_TICK_MS: u64 = 10;
/// Upper bound on a single simulation step.
const MAX_STEP_S: f64 = 0.1;
const GENERATOR_PERIOD_MS: u64 = 100;
const MONITOR_PERIOD_MS: u64 = 200;
const DENIED_PERIOD_MS: u64 = 500;

// Worker rng streams derived from the master seed.
const CONTROLLER_RNG_STREAM: u64 = 1;
const AIRLINE_RNG_STREAM_BASE: u64 = 16;

#[derive(Debug, Clone, Copy)]
pub struct ControllerConfig {
    pub duration_s: f64,
    pub master_seed: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            duration_s: SIMULATION_DURATION_S,
            master_seed: SimRng::DEFAULT_SEED,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerError {
    NotInitialized,
    AlreadyRunning,
    NotRunning,
}

impl core::fmt::Display for ControllerError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ControllerError::NotInitialized => write!(f, "simulation is not initialized"),
            ControllerError::AlreadyRunning => write!(f, "simulation is already running"),
            ControllerError::NotRunning => write!(f, "simulation is not running"),
        }
    }
}

impl std::error::Error for ControllerError {}

#[derive(Debug, Default, Clone, Serialize)]
pub struct SimStats {
    pub total_flights: u32,
    pub completed_flights: u32,
    pub canceled_flights: u32,
    pub diverted_flights: u32,
    pub emergency_flights: u32,
    pub ground_faults: u32,
    pub kind_counts: [u32; 3],
}

#[derive(Debug, Clone, Serialize)]
pub struct FlightSummary {
    pub id: String,
    pub airline: String,
    pub kind: AircraftKind,
    pub direction: Direction,
    pub status: FlightStatus,
    pub phase: String,
    pub speed_kmh: f64,
    pub runway: Option<RunwayId>,
    pub emergency: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunwaySummary {
    pub id: RunwayId,
    pub status: String,
    pub occupant: Option<String>,
    pub usage_count: u32,
    pub usage_time_s: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub time_s: f64,
    pub remaining_s: f64,
    pub running: bool,
    pub paused: bool,
    pub completed: bool,
    pub active_flights: Vec<FlightSummary>,
    pub runways: Vec<RunwaySummary>,
    pub queued_flights: usize,
    pub denied_flights: usize,
    pub total_violations: usize,
    pub unpaid_avns: usize,
    pub active_cargo_flights: i64,
    pub stats: SimStats,
}

struct PauseGate {
    paused: Mutex<bool>,
    cv: Condvar,
}

impl PauseGate {
    fn new() -> Self {
        Self {
            paused: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    fn pause(&self) {
        if let Ok(mut paused) = self.paused.lock() {
            *paused = true;
        }
    }

    fn resume(&self) {
        if let Ok(mut paused) = self.paused.lock() {
            *paused = false;
        }
        self.cv.notify_all();
    }

    fn is_paused(&self) -> bool {
        self.paused.lock().map(|p| *p).unwrap_or(false)
    }

    fn notify_all(&self) {
        self.cv.notify_all();
    }

    /// Blocks while paused and running. Returns true if it waited.
    fn wait_while_paused(&self, running: &AtomicBool) -> bool {
        let Ok(mut paused) = self.paused.lock() else {
            return false;
        };
        let mut waited = false;
        while *paused && running.load(Ordering::SeqCst) {
            waited = true;
            match self.cv.wait(paused) {
                Ok(guard) => paused = guard,
                Err(_) => return waited,
            }
        }
        waited
    }
}

struct Shared {
    config: ControllerConfig,
    sim_time_us: AtomicU64,
    running: AtomicBool,
    completed: AtomicBool,
    initialized: AtomicBool,
    pause: PauseGate,
    airlines: Mutex<Vec<Arc<Mutex<Airline>>>>,
    runways: [Arc<Mutex<Runway>>; RUNWAY_COUNT],
    flights: Mutex<Vec<Arc<Mutex<Flight>>>>,
    monitor: Mutex<SpeedMonitor>,
    arbiter: Mutex<RunwayArbiter>,
    active_cargo: AtomicI64,
    stats: Mutex<SimStats>,
    rng: Mutex<SimRng>,
    sink: Arc<dyn EventSink>,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub struct SimulationController {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl SimulationController {
    pub fn new(config: ControllerConfig) -> Self {
        Self::with_sink(config, Arc::new(TracingSink))
    }

    pub fn with_sink(config: ControllerConfig, sink: Arc<dyn EventSink>) -> Self {
        let shared = Shared {
            config,
            sim_time_us: AtomicU64::new(0),
            running: AtomicBool::new(false),
            completed: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
            pause: PauseGate::new(),
            airlines: Mutex::new(Vec::new()),
            runways: [
                Arc::new(Mutex::new(Runway::new(RunwayId::A))),
                Arc::new(Mutex::new(Runway::new(RunwayId::B))),
                Arc::new(Mutex::new(Runway::new(RunwayId::C))),
            ],
            flights: Mutex::new(Vec::new()),
            monitor: Mutex::new(SpeedMonitor::new()),
            arbiter: Mutex::new(RunwayArbiter::new()),
            active_cargo: AtomicI64::new(0),
            stats: Mutex::new(SimStats::default()),
            rng: Mutex::new(SimRng::stream(config.master_seed, CONTROLLER_RNG_STREAM)),
            sink,
        };
        Self {
            shared: Arc::new(shared),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Builds the airline roster and runways, clearing all prior
    /// state. Also seeds the first cargo flight so the cargo-presence
    /// invariant holds from the start.
    pub fn initialize(&self) -> Result<(), ControllerError> {
        if self.shared.running.load(Ordering::SeqCst) {
            return Err(ControllerError::AlreadyRunning);
        }
        self.shared.rebuild_world();
        self.shared.ensure_cargo_present();
        self.shared.sink.emit(&SimEvent::SimulationInitialized {
            airlines: AIRLINES.len(),
            runways: RUNWAY_COUNT,
        });
        Ok(())
    }

    /// Spawns the four worker tasks.
    pub fn start(&self) -> Result<(), ControllerError> {
        if !self.shared.initialized.load(Ordering::SeqCst) {
            return Err(ControllerError::NotInitialized);
        }
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return Err(ControllerError::AlreadyRunning);
        }
        self.shared.pause.resume();

        let mut workers = match self.workers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        workers.push(spawn_worker("atcsim-sim", &self.shared, simulation_worker));
        workers.push(spawn_worker("atcsim-gen", &self.shared, generator_worker));
        workers.push(spawn_worker("atcsim-mon", &self.shared, monitoring_worker));
        workers.push(spawn_worker("atcsim-denied", &self.shared, denied_worker));

        self.shared.sink.emit(&SimEvent::SimulationStarted);
        Ok(())
    }

    pub fn pause(&self) -> Result<(), ControllerError> {
        if !self.shared.running.load(Ordering::SeqCst) {
            return Err(ControllerError::NotRunning);
        }
        self.shared.pause.pause();
        self.shared.sink.emit(&SimEvent::SimulationPaused);
        Ok(())
    }

    pub fn resume(&self) -> Result<(), ControllerError> {
        if !self.shared.running.load(Ordering::SeqCst) {
            return Err(ControllerError::NotRunning);
        }
        self.shared.pause.resume();
        self.shared.sink.emit(&SimEvent::SimulationResumed);
        Ok(())
    }

    /// Signals termination and joins all workers.
    pub fn stop(&self) -> Result<(), ControllerError> {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return Err(ControllerError::NotRunning);
        }
        self.shared.pause.resume();
        self.shared.pause.notify_all();

        let handles: Vec<JoinHandle<()>> = {
            let mut workers = match self.workers.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            workers.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.join();
        }
        self.shared.sink.emit(&SimEvent::SimulationStopped);
        Ok(())
    }

    /// Returns the simulation to its initial state. Invalid while
    /// running.
    pub fn reset(&self) -> Result<(), ControllerError> {
        if self.shared.running.load(Ordering::SeqCst) {
            return Err(ControllerError::AlreadyRunning);
        }
        self.initialize()
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.shared.pause.is_paused()
    }

    pub fn is_completed(&self) -> bool {
        self.shared.completed.load(Ordering::SeqCst)
    }

    pub fn current_time_s(&self) -> f64 {
        self.shared.current_time_s()
    }

    pub fn remaining_time_s(&self) -> f64 {
        (self.shared.config.duration_s - self.shared.current_time_s()).max(0.0)
    }

    /// One fixed step of the simulation loop. Worker-driven when the
    /// simulation is started; callable directly for deterministic
    /// tests.
    pub fn step(&self, dt_s: f64) {
        self.shared.step(dt_s);
    }

    /// One flight-generator cycle: cadence-driven scheduling plus the
    /// cargo-presence invariant.
    pub fn generator_cycle(&self) {
        self.shared.generator_cycle();
    }

    /// One monitoring cycle: emergency promotion, cargo-counter
    /// reconciliation, and the overdue sweep.
    pub fn monitor_cycle(&self) {
        self.shared.monitor_cycle();
    }

    /// One denied-flight retry cycle.
    pub fn denied_cycle(&self) {
        self.shared.denied_cycle();
    }

    /// Adds an externally built flight and queues it for a runway.
    pub fn submit_flight(&self, flight: Flight) -> Arc<Mutex<Flight>> {
        self.shared.submit_flight(flight)
    }

    pub fn runway_handle(&self, id: RunwayId) -> Arc<Mutex<Runway>> {
        Arc::clone(&self.shared.runways[id.index()])
    }

    pub fn flights(&self) -> Vec<Arc<Mutex<Flight>>> {
        match self.shared.flights.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => Vec::new(),
        }
    }

    pub fn active_cargo_flights(&self) -> i64 {
        self.shared.active_cargo.load(Ordering::SeqCst)
    }

    pub fn status_report(&self) -> StatusReport {
        self.shared.status_report()
    }

    pub fn unpaid_avns(&self) -> Vec<ViolationRecord> {
        match self.shared.monitor.lock() {
            Ok(monitor) => monitor.unpaid().into_iter().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn violations_for_airline(&self, airline: &str) -> Vec<ViolationRecord> {
        match self.shared.monitor.lock() {
            Ok(monitor) => monitor
                .violations_for_airline(airline)
                .into_iter()
                .cloned()
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Drains freshly issued AVNs as wire records for the bridge.
    pub fn take_avn_dispatch(&self) -> Vec<AvnRecord> {
        match self.shared.monitor.lock() {
            Ok(mut monitor) => monitor
                .take_pending_dispatch()
                .iter()
                .map(AvnRecord::avn_created)
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Builds a payment request record for an existing AVN.
    pub fn payment_request(&self, avn_id: u32, amount: f64) -> Option<AvnRecord> {
        let monitor = self.shared.monitor.lock().ok()?;
        let record = monitor.record(avn_id)?;
        Some(AvnRecord::payment_request(
            avn_id,
            amount,
            record.airline.as_str(),
            record.flight_id.as_str(),
        ))
    }

    /// Applies a payment confirmation from the billing collaborator.
    pub fn confirm_payment(&self, avn_id: u32) -> bool {
        let confirmed = match self.shared.monitor.lock() {
            Ok(mut monitor) => monitor.confirm_payment(avn_id),
            Err(_) => false,
        };
        if confirmed {
            self.shared.sink.emit(&SimEvent::AvnPaid { avn_id });
        }
        confirmed
    }
}

impl Drop for SimulationController {
    fn drop(&mut self) {
        if self.shared.running.load(Ordering::SeqCst) {
            let _ = self.stop();
        }
    }
}

impl Shared {
    fn current_time_s(&self) -> f64 {
        self.sim_time_us.load(Ordering::SeqCst) as f64 / 1_000_000.0
    }

    fn rebuild_world(&self) {
        self.sim_time_us.store(0, Ordering::SeqCst);
        self.completed.store(false, Ordering::SeqCst);
        self.active_cargo.store(0, Ordering::SeqCst);

        if let Ok(mut rng) = self.rng.lock() {
            *rng = SimRng::stream(self.config.master_seed, CONTROLLER_RNG_STREAM);
        }
        if let Ok(mut airlines) = self.airlines.lock() {
            airlines.clear();
            for (index, spec) in AIRLINES.iter().enumerate() {
                let stream = AIRLINE_RNG_STREAM_BASE + index as u64;
                let rng = SimRng::stream(self.config.master_seed, stream);
                airlines.push(Arc::new(Mutex::new(Airline::from_spec(spec, rng))));
            }
        }
        for (index, id) in RunwayId::ALL.iter().enumerate() {
            if let Ok(mut runway) = self.runways[index].lock() {
                *runway = Runway::new(*id);
            }
        }
        if let Ok(mut flights) = self.flights.lock() {
            flights.clear();
        }
        if let Ok(mut monitor) = self.monitor.lock() {
            *monitor = SpeedMonitor::new();
        }
        if let Ok(mut arbiter) = self.arbiter.lock() {
            arbiter.clear();
        }
        if let Ok(mut stats) = self.stats.lock() {
            *stats = SimStats::default();
        }
        self.initialized.store(true, Ordering::SeqCst);
    }

    fn flights_snapshot(&self) -> Vec<Arc<Mutex<Flight>>> {
        match self.flights.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => Vec::new(),
        }
    }

    fn airlines_snapshot(&self) -> Vec<Arc<Mutex<Airline>>> {
        match self.airlines.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => Vec::new(),
        }
    }

    fn step(&self, dt_s: f64) {
        if !self.initialized.load(Ordering::SeqCst) {
            return;
        }
        let dt_s = dt_s.min(MAX_STEP_S);
        let dt_us = (dt_s * 1_000_000.0) as u64;
        let now_s =
            (self.sim_time_us.fetch_add(dt_us, Ordering::SeqCst) + dt_us) as f64 / 1_000_000.0;
        let issued_at = unix_now();

        struct TerminalNote {
            id: String,
            airline: String,
            kind: AircraftKind,
            status: FlightStatus,
            reason: Option<String>,
        }
        struct AvnNote {
            avn_id: u32,
            flight: String,
            airline: String,
            total: f64,
        }

        let mut terminals: Vec<TerminalNote> = Vec::new();
        let mut avns: Vec<AvnNote> = Vec::new();

        for flight in self.flights_snapshot() {
            let mut released = None;
            {
                let Ok(mut guard) = flight.lock() else {
                    continue;
                };
                if guard.status().is_terminal() {
                    continue;
                }
                let outcome = guard.update(dt_s, now_s);

                if let Some(status) = outcome.entered_terminal {
                    terminals.push(TerminalNote {
                        id: guard.id().to_string(),
                        airline: guard.aircraft().airline().to_string(),
                        kind: guard.aircraft().kind(),
                        status,
                        reason: guard.status_reason().map(str::to_string),
                    });
                } else if matches!(
                    guard.status(),
                    FlightStatus::Active | FlightStatus::Emergency
                ) {
                    if let Ok(mut monitor) = self.monitor.lock() {
                        if let Some(avn_id) =
                            monitor.monitor(guard.aircraft_mut(), now_s, issued_at)
                        {
                            if let Some(record) = monitor.record(avn_id) {
                                avns.push(AvnNote {
                                    avn_id,
                                    flight: guard.id().to_string(),
                                    airline: guard.aircraft().airline().to_string(),
                                    total: record.total,
                                });
                            }
                        }
                    }
                }

                if let Some(lease) = outcome.lease {
                    released = Some((guard.id().to_string(), lease));
                }
            }
            // The flight guard is dropped; settle the lease now.
            if let Some((flight_id, lease)) = released {
                let runway = lease.runway_id();
                if lease.settle().is_some() {
                    self.sink.emit(&SimEvent::RunwayReleased {
                        flight: flight_id,
                        runway,
                    });
                }
            }
        }

        for note in terminals {
            self.on_flight_terminated(&note.id, &note.airline, note.kind);
            match note.status {
                FlightStatus::Completed => {
                    if let Ok(mut stats) = self.stats.lock() {
                        stats.completed_flights += 1;
                    }
                    self.sink.emit(&SimEvent::FlightCompleted { flight: note.id });
                }
                FlightStatus::Canceled => {
                    let reason = note.reason.unwrap_or_default();
                    if let Ok(mut stats) = self.stats.lock() {
                        stats.canceled_flights += 1;
                        if reason == "ground fault" {
                            stats.ground_faults += 1;
                        }
                    }
                    self.sink.emit(&SimEvent::FlightCanceled {
                        flight: note.id,
                        reason,
                    });
                }
                FlightStatus::Diverted => {
                    if let Ok(mut stats) = self.stats.lock() {
                        stats.diverted_flights += 1;
                    }
                }
                _ => {}
            }
        }

        for note in avns {
            self.record_airline_violation(&note.airline);
            self.sink.emit(&SimEvent::AvnIssued {
                avn_id: note.avn_id,
                flight: note.flight,
                airline: note.airline,
                total: note.total,
            });
        }

        for runway in &self.runways {
            if let Ok(mut guard) = runway.lock() {
                guard.update(dt_s);
            }
        }

        if let Ok(mut arbiter) = self.arbiter.lock() {
            arbiter.assignment_pass(&self.runways, now_s);
        }

        if now_s >= self.config.duration_s && !self.completed.swap(true, Ordering::SeqCst) {
            self.sink.emit(&SimEvent::SimulationCompleted { at_s: now_s });
        }
    }

    fn on_flight_terminated(&self, flight_id: &str, airline: &str, kind: AircraftKind) {
        if kind == AircraftKind::Cargo {
            self.active_cargo.fetch_sub(1, Ordering::SeqCst);
        }
        for candidate in self.airlines_snapshot() {
            if let Ok(mut guard) = candidate.lock() {
                if guard.name().as_str() == airline {
                    guard.on_flight_terminated(flight_id);
                    break;
                }
            }
        }
        if let Ok(mut monitor) = self.monitor.lock() {
            monitor.drop_track(flight_id);
        }
    }

    fn record_airline_violation(&self, airline: &str) {
        for candidate in self.airlines_snapshot() {
            if let Ok(mut guard) = candidate.lock() {
                if guard.name().as_str() == airline {
                    guard.record_violation();
                    break;
                }
            }
        }
    }

    fn generator_cycle(&self) {
        if !self.initialized.load(Ordering::SeqCst) {
            return;
        }
        let now_s = self.current_time_s();

        for airline in self.airlines_snapshot() {
            for direction in Direction::ALL {
                let scheduled = {
                    let Ok(mut guard) = airline.lock() else {
                        continue;
                    };
                    guard.schedule_if_needed(now_s, direction)
                };
                let Some(scheduled) = scheduled else {
                    continue;
                };

                let kind = scheduled.aircraft.kind();
                let flight_id = scheduled.aircraft.id().to_string();
                let airline_name = scheduled.aircraft.airline().to_string();
                let flight = Flight::new(scheduled.aircraft, now_s, scheduled.emergency);

                if kind == AircraftKind::Cargo {
                    self.active_cargo.fetch_add(1, Ordering::SeqCst);
                }
                if let Ok(mut stats) = self.stats.lock() {
                    stats.total_flights += 1;
                    stats.kind_counts[kind.index()] += 1;
                    if scheduled.emergency {
                        stats.emergency_flights += 1;
                    }
                }
                self.sink.emit(&SimEvent::FlightScheduled {
                    flight: flight_id,
                    airline: airline_name,
                    direction,
                    emergency: scheduled.emergency,
                });

                let handle = Arc::new(Mutex::new(flight));
                if let Ok(mut flights) = self.flights.lock() {
                    flights.push(Arc::clone(&handle));
                }
                if let Ok(mut arbiter) = self.arbiter.lock() {
                    arbiter.enqueue(handle);
                }
            }
        }

        self.ensure_cargo_present();
    }

    fn count_active_cargo(&self) -> i64 {
        let mut count = 0;
        for flight in self.flights_snapshot() {
            if let Ok(guard) = flight.lock() {
                if guard.aircraft().kind() == AircraftKind::Cargo
                    && !guard.status().is_terminal()
                {
                    count += 1;
                }
            }
        }
        count
    }

    /// Guarantees at least one non-terminal cargo flight exists.
    /// Searches the roster for a cargo carrier first, then falls back
    /// to a commercial carrier with an explicit cargo request, places
    /// the flight on RWY-C when possible, and activates it.
    fn ensure_cargo_present(&self) {
        if self.count_active_cargo() > 0 {
            return;
        }
        let now_s = self.current_time_s();
        let direction = {
            let Ok(mut rng) = self.rng.lock() else {
                return;
            };
            Direction::ALL[rng.range_u32(0, 3) as usize]
        };

        let mut aircraft = None;
        let airlines = self.airlines_snapshot();
        for candidate in &airlines {
            let Ok(mut guard) = candidate.lock() else {
                continue;
            };
            if guard.primary_kind() == AircraftKind::Cargo {
                if let Some(built) = guard.create_aircraft(direction, false) {
                    aircraft = Some(built);
                    break;
                }
            }
        }
        if aircraft.is_none() {
            for candidate in &airlines {
                let Ok(mut guard) = candidate.lock() else {
                    continue;
                };
                if guard.primary_kind() == AircraftKind::Commercial {
                    if let Some(built) =
                        guard.create_aircraft_of_kind(direction, AircraftKind::Cargo)
                    {
                        aircraft = Some(built);
                        break;
                    }
                }
            }
        }
        let Some(aircraft) = aircraft else {
            return;
        };

        let flight_id = aircraft.id().to_string();
        let airline_name = aircraft.airline().to_string();
        let flight = Arc::new(Mutex::new(Flight::new(aircraft, now_s, false)));

        self.active_cargo.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut stats) = self.stats.lock() {
            stats.total_flights += 1;
            stats.kind_counts[AircraftKind::Cargo.index()] += 1;
        }
        if let Ok(mut flights) = self.flights.lock() {
            flights.push(Arc::clone(&flight));
        }
        self.sink.emit(&SimEvent::CargoFlightCreated {
            flight: flight_id.clone(),
            airline: airline_name,
        });

        if let Ok(mut arbiter) = self.arbiter.lock() {
            match arbiter.try_assign(&flight, &self.runways, now_s) {
                AssignOutcome::Assigned(runway) => {
                    self.sink.emit(&SimEvent::RunwayAssigned {
                        flight: flight_id,
                        runway,
                    });
                }
                AssignOutcome::Denied => {
                    arbiter.enqueue_denied(flight);
                    self.sink.emit(&SimEvent::FlightDenied { flight: flight_id });
                }
                AssignOutcome::Skipped => {}
            }
        }
    }

    fn monitor_cycle(&self) {
        if !self.initialized.load(Ordering::SeqCst) {
            return;
        }

        if let Ok(mut arbiter) = self.arbiter.lock() {
            arbiter.promote_emergencies();
        }

        // Reconcile the cargo counter against the flight list.
        let actual = self.count_active_cargo();
        let counter = self.active_cargo.load(Ordering::SeqCst);
        if counter != actual {
            self.sink.emit(&SimEvent::CargoCounterCorrected {
                counter,
                actual,
            });
            self.active_cargo.store(actual, Ordering::SeqCst);
        }
        if actual == 0 {
            self.ensure_cargo_present();
        }

        if let Ok(mut monitor) = self.monitor.lock() {
            monitor.sweep_overdue(unix_now());
        }
    }

    fn denied_cycle(&self) {
        if !self.initialized.load(Ordering::SeqCst) {
            return;
        }
        let now_s = self.current_time_s();
        if let Ok(mut arbiter) = self.arbiter.lock() {
            arbiter.retry_denied(&self.runways, now_s);
        }
    }

    fn submit_flight(&self, flight: Flight) -> Arc<Mutex<Flight>> {
        let kind = flight.aircraft().kind();
        let emergency = flight.is_emergency();
        if kind == AircraftKind::Cargo {
            self.active_cargo.fetch_add(1, Ordering::SeqCst);
        }
        if let Ok(mut stats) = self.stats.lock() {
            stats.total_flights += 1;
            stats.kind_counts[kind.index()] += 1;
            if emergency {
                stats.emergency_flights += 1;
            }
        }
        let handle = Arc::new(Mutex::new(flight));
        if let Ok(mut flights) = self.flights.lock() {
            flights.push(Arc::clone(&handle));
        }
        if let Ok(mut arbiter) = self.arbiter.lock() {
            arbiter.enqueue(Arc::clone(&handle));
        }
        handle
    }

    fn status_report(&self) -> StatusReport {
        let mut active_flights = Vec::new();
        for flight in self.flights_snapshot() {
            let Ok(guard) = flight.lock() else {
                continue;
            };
            if guard.status().is_terminal() {
                continue;
            }
            active_flights.push(FlightSummary {
                id: guard.id().to_string(),
                airline: guard.aircraft().airline().to_string(),
                kind: guard.aircraft().kind(),
                direction: guard.aircraft().direction(),
                status: guard.status(),
                phase: guard.aircraft().phase().as_str().to_string(),
                speed_kmh: guard.aircraft().speed_kmh(),
                runway: guard.assigned_runway(),
                emergency: guard.is_emergency(),
            });
        }

        let mut runways = Vec::new();
        for runway in &self.runways {
            if let Ok(guard) = runway.lock() {
                runways.push(RunwaySummary {
                    id: guard.id(),
                    status: guard.status().as_str().to_string(),
                    occupant: guard.occupant().map(|id| id.to_string()),
                    usage_count: guard.usage_count(),
                    usage_time_s: guard.total_usage_s(),
                });
            }
        }

        let (queued_flights, denied_flights) = match self.arbiter.lock() {
            Ok(arbiter) => (arbiter.queued_len(), arbiter.denied_len()),
            Err(_) => (0, 0),
        };
        let (total_violations, unpaid_avns) = match self.monitor.lock() {
            Ok(monitor) => (monitor.total_violations(), monitor.unpaid().len()),
            Err(_) => (0, 0),
        };
        let stats = match self.stats.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => SimStats::default(),
        };

        let time_s = self.current_time_s();
        StatusReport {
            time_s,
            remaining_s: (self.config.duration_s - time_s).max(0.0),
            running: self.running.load(Ordering::SeqCst),
            paused: self.pause.is_paused(),
            completed: self.completed.load(Ordering::SeqCst),
            active_flights,
            runways,
            queued_flights,
            denied_flights,
            total_violations,
            unpaid_avns,
            active_cargo_flights: self.active_cargo.load(Ordering::SeqCst),
            stats,
        }
    }

    fn should_exit(&self) -> bool {
        !self.running.load(Ordering::SeqCst) || self.completed.load(Ordering::SeqCst)
    }
}

fn spawn_worker(
    name: &str,
    shared: &Arc<Shared>,
    body: fn(Arc<Shared>),
) -> JoinHandle<()> {
    let shared = Arc::clone(shared);
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || body(shared))
        .unwrap_or_else(|_| thread::spawn(|| {}))
}

fn simulation_worker(shared: Arc<Shared>) {
    let mut last_frame = Instant::now();
    while !shared.should_exit() {
        if shared.pause.wait_while_paused(&shared.running) {
            last_frame = Instant::now();
        }
        if shared.should_exit() {
            break;
        }
        let dt_s = last_frame.elapsed().as_secs_f64().min(MAX_STEP_S);
        last_frame = Instant::now();
        shared.step(dt_s);
        thread::sleep(Duration::from_millis(SIM_TICK_MS));
    }
}

fn generator_worker(shared: Arc<Shared>) {
    periodic_worker(shared, GENERATOR_PERIOD_MS, Shared::generator_cycle);
}

fn monitoring_worker(shared: Arc<Shared>) {
    periodic_worker(shared, MONITOR_PERIOD_MS, Shared::monitor_cycle);
}

fn denied_worker(shared: Arc<Shared>) {
    periodic_worker(shared, DENIED_PERIOD_MS, Shared::denied_cycle);
}

fn periodic_worker(shared: Arc<Shared>, period_ms: u64, cycle: fn(&Shared)) {
    while !shared.should_exit() {
        shared.pause.wait_while_paused(&shared.running);
        if shared.should_exit() {
            break;
        }
        cycle(&shared);
        thread::sleep(Duration::from_millis(period_ms));
    }
}
