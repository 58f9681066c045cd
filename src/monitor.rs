//! Phase-aware speed monitoring and Airspace Violation Notices.
//!
//! The monitor keeps a short speed history per aircraft, fires a
//! violation when the speed leaves the phase's bounds or fluctuates
//! too rapidly, and suppresses duplicates until the aircraft changes
//! phase. New AVNs accumulate in a dispatch buffer for the IPC bridge.

use std::collections::HashMap;

use heapless::Vec as BoundedVec;
use serde::Serialize;

use crate::aircraft::{Aircraft, AircraftId, AirlineName};
use crate::types::{
    AircraftKind, PaymentStatus, Phase, AVN_DUE_OFFSET_S, CARGO_FINE, COMMERCIAL_FINE,
    SERVICE_FEE_RATE,
};

pub const SPEED_HISTORY_LEN: usize = 10;
pub const FIRST_AVN_ID: u32 = 1000;

const RAPID_CHANGE_THRESHOLD_KMH: f64 = 50.0;
const MIN_HISTORY_FOR_TREND: usize = 3;

// Analytics fine schedule, separate from the billed AVN amounts.
const BASE_FINE: f64 = 1000.0;
const SEVERE_FINE: f64 = 5000.0;
const SEVERE_DEVIATION_KMH: f64 = 100.0;

/// A billed Airspace Violation Notice.
#[derive(Debug, Clone, Serialize)]
pub struct ViolationRecord {
    pub avn_id: u32,
    pub airline: AirlineName,
    pub flight_id: AircraftId,
    pub kind: AircraftKind,
    pub phase: Phase,
    pub recorded_speed: f64,
    pub min_speed: f64,
    pub max_speed: f64,
    /// Unix seconds at issue.
    pub issued_at: u64,
    pub due_at: u64,
    pub fine: f64,
    pub service_fee: f64,
    pub total: f64,
    pub status: PaymentStatus,
    pub description: String,
}

impl ViolationRecord {
    #[allow(clippy::too_many_arguments)]
    fn new(
        avn_id: u32,
        airline: AirlineName,
        flight_id: AircraftId,
        kind: AircraftKind,
        phase: Phase,
        recorded_speed: f64,
        min_speed: f64,
        max_speed: f64,
        issued_at: u64,
        description: String,
    ) -> Self {
        // Emergency aircraft are billed at the cargo rate.
        let fine = if kind == AircraftKind::Commercial {
            COMMERCIAL_FINE
        } else {
            CARGO_FINE
        };
        let service_fee = fine * SERVICE_FEE_RATE;
        Self {
            avn_id,
            airline,
            flight_id,
            kind,
            phase,
            recorded_speed,
            min_speed,
            max_speed,
            issued_at,
            due_at: issued_at + AVN_DUE_OFFSET_S,
            fine,
            service_fee,
            total: fine + service_fee,
            status: PaymentStatus::Unpaid,
            description,
        }
    }

    /// Deviation beyond the permitted range, in km/h.
    pub fn deviation(&self) -> f64 {
        if self.recorded_speed > self.max_speed {
            self.recorded_speed - self.max_speed
        } else if self.recorded_speed < self.min_speed {
            self.min_speed - self.recorded_speed
        } else {
            0.0
        }
    }
}

#[derive(Debug, Default)]
struct AircraftTrack {
    history: BoundedVec<f64, SPEED_HISTORY_LEN>,
    cited_phases: BoundedVec<Phase, 10>,
}

impl AircraftTrack {
    fn record(&mut self, speed: f64) {
        if self.history.push(speed).is_err() {
            self.history.remove(0);
            let _ = self.history.push(speed);
        }
    }

    /// Mean absolute step-to-step speed change over the history.
    fn mean_abs_delta(&self) -> Option<f64> {
        if self.history.len() < MIN_HISTORY_FOR_TREND {
            return None;
        }
        let total: f64 = self
            .history
            .windows(2)
            .map(|pair| (pair[1] - pair[0]).abs())
            .sum();
        Some(total / (self.history.len() - 1) as f64)
    }

    fn cited_in(&self, phase: Phase) -> bool {
        self.cited_phases.contains(&phase)
    }

    fn cite(&mut self, phase: Phase) {
        if !self.cited_in(phase) {
            let _ = self.cited_phases.push(phase);
        }
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct MonitorStats {
    pub total_violations: u32,
    pub rapid_change_violations: u32,
    pub bound_violations: u32,
}

#[derive(Debug, Default)]
pub struct SpeedMonitor {
    tracks: HashMap<AircraftId, AircraftTrack>,
    violations: Vec<ViolationRecord>,
    by_airline: HashMap<AirlineName, u32>,
    by_phase: HashMap<Phase, u32>,
    pending_dispatch: Vec<ViolationRecord>,
    stats: MonitorStats,
    next_avn_id: u32,
}

impl SpeedMonitor {
    pub fn new() -> Self {
        Self {
            next_avn_id: FIRST_AVN_ID,
            ..Self::default()
        }
    }

    pub fn is_speed_valid(&self, aircraft: &Aircraft) -> bool {
        aircraft.speed_in_bounds()
    }

    /// Observes one aircraft sample. Returns the new AVN id when a
    /// violation fired.
    pub fn monitor(
        &mut self,
        aircraft: &mut Aircraft,
        now_s: f64,
        issued_at_unix: u64,
    ) -> Option<u32> {
        let phase = aircraft.phase();
        let speed = aircraft.speed_kmh();
        let bounds = phase.speed_bounds();

        let track = self.tracks.entry(*aircraft.id()).or_default();
        track.record(speed);

        let out_of_bounds = !bounds.contains(speed);
        let rapid_change = track
            .mean_abs_delta()
            .map(|delta| delta > RAPID_CHANGE_THRESHOLD_KMH)
            .unwrap_or(false);

        if !out_of_bounds && !rapid_change {
            return None;
        }
        // One AVN per phase per aircraft; re-arms on phase change.
        if track.cited_in(phase) {
            return None;
        }
        track.cite(phase);

        let description = if out_of_bounds {
            if speed > bounds.max {
                format!(
                    "Speed too high: {:.1} km/h (maximum: {:.1} km/h) during {} phase at {:.1}s",
                    speed, bounds.max, phase, now_s
                )
            } else {
                format!(
                    "Speed too low: {:.1} km/h (minimum: {:.1} km/h) during {} phase at {:.1}s",
                    speed, bounds.min, phase, now_s
                )
            }
        } else {
            format!(
                "Rapid and unsafe speed changes detected during {} phase at {:.1}s",
                phase, now_s
            )
        };

        let avn_id = self.next_avn_id;
        self.next_avn_id += 1;
        let record = ViolationRecord::new(
            avn_id,
            *aircraft.airline(),
            *aircraft.id(),
            aircraft.kind(),
            phase,
            speed,
            bounds.min,
            bounds.max,
            issued_at_unix,
            description.clone(),
        );

        aircraft.issue_notice(&description);
        *self.by_airline.entry(*aircraft.airline()).or_insert(0) += 1;
        *self.by_phase.entry(phase).or_insert(0) += 1;
        self.stats.total_violations += 1;
        if out_of_bounds {
            self.stats.bound_violations += 1;
        } else {
            self.stats.rapid_change_violations += 1;
        }

        self.pending_dispatch.push(record.clone());
        self.violations.push(record);
        Some(avn_id)
    }

    pub fn violations(&self) -> &[ViolationRecord] {
        &self.violations
    }

    pub fn total_violations(&self) -> usize {
        self.violations.len()
    }

    pub fn stats(&self) -> &MonitorStats {
        &self.stats
    }

    pub fn violations_for_aircraft(&self, flight_id: &str) -> Vec<&ViolationRecord> {
        self.violations
            .iter()
            .filter(|v| v.flight_id.as_str() == flight_id)
            .collect()
    }

    pub fn violations_for_airline(&self, airline: &str) -> Vec<&ViolationRecord> {
        self.violations
            .iter()
            .filter(|v| v.airline.as_str() == airline)
            .collect()
    }

    pub fn violation_counts_by_airline(&self) -> &HashMap<AirlineName, u32> {
        &self.by_airline
    }

    pub fn violation_counts_by_phase(&self) -> &HashMap<Phase, u32> {
        &self.by_phase
    }

    pub fn unpaid(&self) -> Vec<&ViolationRecord> {
        self.violations
            .iter()
            .filter(|v| v.status != PaymentStatus::Paid)
            .collect()
    }

    pub fn record(&self, avn_id: u32) -> Option<&ViolationRecord> {
        self.violations.iter().find(|v| v.avn_id == avn_id)
    }

    /// Marks an AVN as paid. Returns false for unknown ids.
    pub fn confirm_payment(&mut self, avn_id: u32) -> bool {
        match self.violations.iter_mut().find(|v| v.avn_id == avn_id) {
            Some(record) => {
                record.status = PaymentStatus::Paid;
                true
            }
            None => false,
        }
    }

    /// Flags unpaid AVNs whose due date has passed.
    pub fn sweep_overdue(&mut self, now_unix: u64) -> usize {
        let mut flipped = 0;
        for record in &mut self.violations {
            if record.status == PaymentStatus::Unpaid && now_unix > record.due_at {
                record.status = PaymentStatus::Overdue;
                flipped += 1;
            }
        }
        flipped
    }

    /// Drains AVNs awaiting transmission to the billing collaborator.
    pub fn take_pending_dispatch(&mut self) -> Vec<ViolationRecord> {
        core::mem::take(&mut self.pending_dispatch)
    }

    /// Re-queues an AVN whose transmission failed permanently on the
    /// stream but should be retried on the next flush.
    pub fn requeue_dispatch(&mut self, record: ViolationRecord) {
        self.pending_dispatch.push(record);
    }

    /// Analytics fine total for one airline: flat base fine per
    /// violation, escalated when the deviation exceeds the severe
    /// threshold. Distinct from the billed AVN amounts.
    pub fn calculate_fines(&self, airline: &str) -> f64 {
        self.violations
            .iter()
            .filter(|v| v.airline.as_str() == airline)
            .map(|v| {
                if v.deviation() > SEVERE_DEVIATION_KMH {
                    SEVERE_FINE
                } else {
                    BASE_FINE
                }
            })
            .sum()
    }

    /// Drops the speed history for an aircraft whose flight ended.
    pub fn drop_track(&mut self, flight_id: &str) {
        self.tracks.retain(|id, _| id.as_str() != flight_id);
    }

    pub fn clear_violation_records(&mut self) {
        self.violations.clear();
        self.by_airline.clear();
        self.by_phase.clear();
        self.pending_dispatch.clear();
        self.stats = MonitorStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::SimRng;
    use crate::types::Direction;

    fn holding_aircraft() -> Aircraft {
        Aircraft::new(
            AircraftId::from("P1234").unwrap(),
            AircraftKind::Commercial,
            Direction::North,
            AirlineName::from("PIA").unwrap(),
            SimRng::new(3),
        )
    }

    #[test]
    fn overspeed_in_holding_fires_once() {
        let mut monitor = SpeedMonitor::new();
        let mut aircraft = holding_aircraft();
        aircraft.set_speed(650.0);

        let avn = monitor.monitor(&mut aircraft, 10.0, 1_000);
        assert_eq!(avn, Some(FIRST_AVN_ID));
        assert!(aircraft.has_active_notice());

        // Staying in the same phase never re-fires.
        for _ in 0..5 {
            assert_eq!(monitor.monitor(&mut aircraft, 11.0, 1_001), None);
        }
        assert_eq!(monitor.total_violations(), 1);
    }

    #[test]
    fn phase_change_rearms_detection() {
        let mut monitor = SpeedMonitor::new();
        let mut aircraft = holding_aircraft();
        aircraft.set_speed(650.0);
        assert!(monitor.monitor(&mut aircraft, 10.0, 1_000).is_some());

        aircraft.advance_phase().unwrap();
        aircraft.set_speed(400.0); // out of Approach bounds
        let second = monitor.monitor(&mut aircraft, 20.0, 1_010);
        assert_eq!(second, Some(FIRST_AVN_ID + 1));
        assert_eq!(monitor.total_violations(), 2);
    }

    #[test]
    fn in_bounds_speed_is_clean() {
        let mut monitor = SpeedMonitor::new();
        let mut aircraft = holding_aircraft();
        aircraft.set_speed(500.0);
        assert_eq!(monitor.monitor(&mut aircraft, 1.0, 100), None);
        assert_eq!(monitor.total_violations(), 0);
    }

    #[test]
    fn rapid_fluctuation_fires_within_bounds() {
        let mut monitor = SpeedMonitor::new();
        let mut aircraft = holding_aircraft();
        // Alternating in-bounds speeds 180 km/h apart.
        for (i, speed) in [420.0, 590.0, 410.0, 595.0].iter().enumerate() {
            aircraft.set_speed(*speed);
            let fired = monitor.monitor(&mut aircraft, i as f64, 100 + i as u64);
            if i < MIN_HISTORY_FOR_TREND - 1 {
                assert_eq!(fired, None);
            } else {
                assert!(fired.is_some());
                break;
            }
        }
        assert_eq!(monitor.stats().rapid_change_violations, 1);
    }

    #[test]
    fn avn_arithmetic_commercial() {
        let mut monitor = SpeedMonitor::new();
        let mut aircraft = holding_aircraft();
        aircraft.set_speed(650.0);
        let avn_id = monitor.monitor(&mut aircraft, 0.0, 5_000).unwrap();
        let record = monitor.record(avn_id).unwrap();
        assert_eq!(record.fine, 500_000.0);
        assert_eq!(record.service_fee, 75_000.0);
        assert_eq!(record.total, 575_000.0);
        assert!((record.total - record.fine * 1.15).abs() < 1e-6);
        assert_eq!(record.due_at, 5_000 + 3 * 24 * 60 * 60);
        assert_eq!(record.status, PaymentStatus::Unpaid);
    }

    #[test]
    fn cargo_and_emergency_bill_at_cargo_rate() {
        let mut monitor = SpeedMonitor::new();
        for kind in [AircraftKind::Cargo, AircraftKind::Emergency] {
            let mut aircraft = Aircraft::new(
                AircraftId::from("FE2001").unwrap(),
                kind,
                Direction::North,
                AirlineName::from("FedEx").unwrap(),
                SimRng::new(4),
            );
            aircraft.set_speed(700.0);
            let avn_id = monitor.monitor(&mut aircraft, 0.0, 0).unwrap();
            let record = monitor.record(avn_id).unwrap();
            assert_eq!(record.fine, 700_000.0);
            assert_eq!(record.total, 805_000.0);
            monitor.drop_track("FE2001");
        }
    }

    #[test]
    fn payment_confirmation_removes_from_unpaid() {
        let mut monitor = SpeedMonitor::new();
        let mut aircraft = holding_aircraft();
        aircraft.set_speed(650.0);
        let avn_id = monitor.monitor(&mut aircraft, 0.0, 0).unwrap();

        assert_eq!(monitor.unpaid().len(), 1);
        assert!(monitor.confirm_payment(avn_id));
        assert!(monitor.unpaid().is_empty());
        assert!(!monitor.confirm_payment(9999));
    }

    #[test]
    fn overdue_sweep_flags_lapsed_notices() {
        let mut monitor = SpeedMonitor::new();
        let mut aircraft = holding_aircraft();
        aircraft.set_speed(650.0);
        monitor.monitor(&mut aircraft, 0.0, 1_000).unwrap();

        assert_eq!(monitor.sweep_overdue(1_000), 0);
        let past_due = 1_000 + AVN_DUE_OFFSET_S + 1;
        assert_eq!(monitor.sweep_overdue(past_due), 1);
        assert_eq!(
            monitor.violations()[0].status,
            PaymentStatus::Overdue
        );
        // Overdue notices still show as unpaid balances.
        assert_eq!(monitor.unpaid().len(), 1);
    }

    #[test]
    fn fine_analytics_escalate_on_large_deviation() {
        let mut monitor = SpeedMonitor::new();

        let mut mild = holding_aircraft();
        mild.set_speed(650.0); // 50 over
        monitor.monitor(&mut mild, 0.0, 0).unwrap();

        let mut severe = Aircraft::new(
            AircraftId::from("P5678").unwrap(),
            AircraftKind::Commercial,
            Direction::North,
            AirlineName::from("PIA").unwrap(),
            SimRng::new(8),
        );
        severe.set_speed(750.0); // 150 over
        monitor.monitor(&mut severe, 0.0, 0).unwrap();

        assert_eq!(monitor.calculate_fines("PIA"), 1000.0 + 5000.0);
        assert_eq!(monitor.calculate_fines("AirBlue"), 0.0);
    }

    #[test]
    fn dispatch_buffer_drains_and_requeues() {
        let mut monitor = SpeedMonitor::new();
        let mut aircraft = holding_aircraft();
        aircraft.set_speed(650.0);
        monitor.monitor(&mut aircraft, 0.0, 0).unwrap();

        let pending = monitor.take_pending_dispatch();
        assert_eq!(pending.len(), 1);
        assert!(monitor.take_pending_dispatch().is_empty());

        monitor.requeue_dispatch(pending.into_iter().next().unwrap());
        assert_eq!(monitor.take_pending_dispatch().len(), 1);
    }

    #[test]
    fn per_airline_and_phase_counters() {
        let mut monitor = SpeedMonitor::new();
        let mut aircraft = holding_aircraft();
        aircraft.set_speed(650.0);
        monitor.monitor(&mut aircraft, 0.0, 0).unwrap();

        let airline = AirlineName::from("PIA").unwrap();
        assert_eq!(monitor.violation_counts_by_airline()[&airline], 1);
        assert_eq!(monitor.violation_counts_by_phase()[&Phase::Holding], 1);
        assert_eq!(monitor.violations_for_airline("PIA").len(), 1);
        assert_eq!(monitor.violations_for_aircraft("P1234").len(), 1);
    }
}
