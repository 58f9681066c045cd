//! Individual aircraft state: identity, flight phase, speed, and
//! ground-fault condition.

use arrayvec::ArrayString;
use heapless::Vec;

use crate::rng::SimRng;
use crate::types::{AircraftKind, Direction, Phase, RunwayId};

pub const MAX_ID_LEN: usize = 16;
pub const MAX_AIRLINE_NAME_LEN: usize = 32;
pub const MAX_NOTICES: usize = 16;

pub type AircraftId = ArrayString<MAX_ID_LEN>;
pub type AirlineName = ArrayString<MAX_AIRLINE_NAME_LEN>;

// Ground-fault model: a spot check fires with a fixed probability,
// the continuous model accumulates risk per simulated second.
const GROUND_FAULT_SPOT_PROBABILITY: f64 = 0.05;
const GROUND_FAULT_RATE_PER_S: f64 = 0.001;
const SPEED_JITTER_SD_KMH: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseError {
    /// The current phase has no successor.
    TerminalPhase(Phase),
}

impl core::fmt::Display for PhaseError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            PhaseError::TerminalPhase(phase) => {
                write!(f, "phase {} has no successor", phase)
            }
        }
    }
}

impl std::error::Error for PhaseError {}

#[derive(Debug)]
pub struct Aircraft {
    id: AircraftId,
    kind: AircraftKind,
    direction: Direction,
    airline: AirlineName,
    phase: Phase,
    speed_kmh: f64,
    assigned_runway: Option<RunwayId>,
    ground_fault: bool,
    notices: Vec<String, MAX_NOTICES>,
    rng: SimRng,
}

impl Aircraft {
    pub fn new(
        id: AircraftId,
        kind: AircraftKind,
        direction: Direction,
        airline: AirlineName,
        mut rng: SimRng,
    ) -> Self {
        let phase = Phase::initial_for(direction);
        let bounds = phase.speed_bounds();
        let speed_kmh = rng.range_f64(bounds.min, bounds.max);
        Self {
            id,
            kind,
            direction,
            airline,
            phase,
            speed_kmh,
            assigned_runway: None,
            ground_fault: false,
            notices: Vec::new(),
            rng,
        }
    }

    pub fn id(&self) -> &AircraftId {
        &self.id
    }

    pub fn kind(&self) -> AircraftKind {
        self.kind
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn airline(&self) -> &AirlineName {
        &self.airline
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn speed_kmh(&self) -> f64 {
        self.speed_kmh
    }

    pub fn assigned_runway(&self) -> Option<RunwayId> {
        self.assigned_runway
    }

    pub fn has_ground_fault(&self) -> bool {
        self.ground_fault
    }

    pub fn notices(&self) -> &[String] {
        &self.notices
    }

    pub fn is_arrival(&self) -> bool {
        self.direction.is_arrival()
    }

    pub(crate) fn set_assigned_runway(&mut self, runway: Option<RunwayId>) {
        self.assigned_runway = runway;
    }

    /// Moves to the statically defined next phase and re-samples the
    /// speed uniformly from the new phase's permitted range.
    pub fn advance_phase(&mut self) -> Result<Phase, PhaseError> {
        let next = self
            .phase
            .successor()
            .ok_or(PhaseError::TerminalPhase(self.phase))?;
        self.phase = next;
        let bounds = next.speed_bounds();
        self.speed_kmh = self.rng.range_f64(bounds.min, bounds.max);
        Ok(next)
    }

    /// Sets the speed directly, without validation. Violations are
    /// detected by the speed monitor, not prevented here.
    pub fn set_speed(&mut self, speed_kmh: f64) {
        self.speed_kmh = speed_kmh;
    }

    pub fn speed_in_bounds(&self) -> bool {
        self.phase.speed_bounds().contains(self.speed_kmh)
    }

    /// Appends a human-readable violation notice. The oldest notice is
    /// dropped once the bounded list is full.
    pub fn issue_notice(&mut self, reason: &str) {
        if self.notices.push(reason.to_string()).is_err() {
            self.notices.remove(0);
            let _ = self.notices.push(reason.to_string());
        }
    }

    pub fn has_active_notice(&self) -> bool {
        !self.notices.is_empty()
    }

    /// Spot check for a ground fault. Only effective during ground
    /// phases; fires with a fixed small probability.
    pub fn simulate_ground_fault(&mut self) -> bool {
        if !self.phase.is_ground() || self.ground_fault {
            return false;
        }
        if self.rng.chance(GROUND_FAULT_SPOT_PROBABILITY) {
            self.ground_fault = true;
            return true;
        }
        false
    }

    /// Per-tick update: small Gaussian speed jitter, plus a rare
    /// time-scaled chance of developing a ground fault while on the
    /// ground.
    pub fn update(&mut self, dt_s: f64) {
        let jitter = self.rng.gaussian(0.0, SPEED_JITTER_SD_KMH);
        self.speed_kmh = (self.speed_kmh + jitter).max(0.0);

        if self.phase.is_ground()
            && !self.ground_fault
            && self.rng.chance(GROUND_FAULT_RATE_PER_S * dt_s)
        {
            self.ground_fault = true;
        }

        debug_assert!(self.speed_kmh >= 0.0, "speed went negative");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_aircraft(direction: Direction) -> Aircraft {
        Aircraft::new(
            AircraftId::from("BD1234").unwrap(),
            AircraftKind::Cargo,
            direction,
            AirlineName::from("Blue Dart").unwrap(),
            SimRng::new(7),
        )
    }

    #[test]
    fn arrivals_start_holding_departures_at_gate() {
        assert_eq!(test_aircraft(Direction::North).phase(), Phase::Holding);
        assert_eq!(test_aircraft(Direction::South).phase(), Phase::Holding);
        assert_eq!(
            test_aircraft(Direction::East).phase(),
            Phase::AtGateDeparture
        );
        assert_eq!(
            test_aircraft(Direction::West).phase(),
            Phase::AtGateDeparture
        );
    }

    #[test]
    fn initial_speed_is_within_phase_bounds() {
        let aircraft = test_aircraft(Direction::North);
        assert!(aircraft.speed_in_bounds());
    }

    #[test]
    fn advance_walks_the_arrival_chain() {
        let mut aircraft = test_aircraft(Direction::North);
        for expected in [
            Phase::Approach,
            Phase::Landing,
            Phase::TaxiIn,
            Phase::AtGateArrival,
        ] {
            let phase = aircraft.advance_phase().unwrap();
            assert_eq!(phase, expected);
            assert!(aircraft.speed_in_bounds());
        }
        assert!(matches!(
            aircraft.advance_phase(),
            Err(PhaseError::TerminalPhase(Phase::AtGateArrival))
        ));
    }

    #[test]
    fn set_speed_skips_validation() {
        let mut aircraft = test_aircraft(Direction::North);
        aircraft.set_speed(650.0);
        assert_eq!(aircraft.speed_kmh(), 650.0);
        assert!(!aircraft.speed_in_bounds());
    }

    #[test]
    fn ground_fault_never_fires_in_the_air() {
        let mut aircraft = test_aircraft(Direction::North);
        assert_eq!(aircraft.phase(), Phase::Holding);
        for _ in 0..1000 {
            assert!(!aircraft.simulate_ground_fault());
        }
        assert!(!aircraft.has_ground_fault());
    }

    #[test]
    fn ground_fault_eventually_fires_on_ground() {
        let mut aircraft = test_aircraft(Direction::East);
        assert!(aircraft.phase().is_ground());
        let mut fired = false;
        for _ in 0..1000 {
            if aircraft.simulate_ground_fault() {
                fired = true;
                break;
            }
        }
        assert!(fired);
        assert!(aircraft.has_ground_fault());
    }

    #[test]
    fn notice_list_is_bounded() {
        let mut aircraft = test_aircraft(Direction::North);
        for i in 0..(MAX_NOTICES + 4) {
            aircraft.issue_notice(&format!("notice {}", i));
        }
        assert_eq!(aircraft.notices().len(), MAX_NOTICES);
        assert!(aircraft.notices()[0].contains("notice 4"));
    }

    #[test]
    fn update_keeps_speed_non_negative() {
        let mut aircraft = test_aircraft(Direction::East);
        aircraft.set_speed(0.0);
        for _ in 0..200 {
            aircraft.update(0.1);
            assert!(aircraft.speed_kmh() >= 0.0);
        }
    }
}
