//! Airlines: fleet caps, per-direction scheduling cadence, and the
//! aircraft factory.

use serde::Serialize;

use crate::aircraft::{Aircraft, AircraftId, AirlineName};
use crate::rng::SimRng;
use crate::types::{AircraftKind, AirlineSpec, Direction};

/// Probability that a commercial airline dispatches a cargo aircraft
/// instead of its usual equipment.
const CARGO_OVERRIDE_PROBABILITY: f64 = 0.05;

const FLIGHT_NUMBER_MIN: u32 = 100;
const FLIGHT_NUMBER_MAX: u32 = 9999;
const ID_RETRY_LIMIT: usize = 8;

/// A freshly scheduled aircraft together with its emergency flag.
#[derive(Debug)]
pub struct ScheduledAircraft {
    pub aircraft: Aircraft,
    pub emergency: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AirlineSummary {
    pub name: String,
    pub primary_kind: AircraftKind,
    pub capacity: usize,
    pub active_aircraft: usize,
    pub violation_count: u32,
}

#[derive(Debug)]
pub struct Airline {
    name: AirlineName,
    primary_kind: AircraftKind,
    capacity: usize,
    roster_flights: usize,
    active: Vec<AircraftId>,
    last_schedule_s: [f64; 4],
    violation_count: u32,
    rng: SimRng,
}

impl Airline {
    pub fn from_spec(spec: &AirlineSpec, rng: SimRng) -> Self {
        let mut name = AirlineName::new();
        // Roster names always fit the fixed-width field.
        let _ = name.try_push_str(spec.name);
        Self {
            name,
            primary_kind: spec.kind,
            capacity: spec.aircraft,
            roster_flights: spec.flights,
            active: Vec::new(),
            last_schedule_s: [0.0; 4],
            violation_count: 0,
            rng,
        }
    }

    pub fn name(&self) -> &AirlineName {
        &self.name
    }

    pub fn primary_kind(&self) -> AircraftKind {
        self.primary_kind
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn roster_flights(&self) -> usize {
        self.roster_flights
    }

    pub fn active_aircraft(&self) -> usize {
        self.active.len()
    }

    pub fn violation_count(&self) -> u32 {
        self.violation_count
    }

    pub fn can_schedule(&self) -> bool {
        self.active.len() < self.capacity
    }

    pub fn summary(&self) -> AirlineSummary {
        AirlineSummary {
            name: self.name.to_string(),
            primary_kind: self.primary_kind,
            capacity: self.capacity,
            active_aircraft: self.active.len(),
            violation_count: self.violation_count,
        }
    }

    /// Fires when the per-direction cadence has elapsed and the fleet
    /// has headroom. Samples the emergency flag from the direction's
    /// probability and builds the aircraft.
    pub fn schedule_if_needed(
        &mut self,
        now_s: f64,
        direction: Direction,
    ) -> Option<ScheduledAircraft> {
        let slot = direction_slot(direction);
        if now_s - self.last_schedule_s[slot] < direction.generation_interval_s() {
            return None;
        }
        if !self.can_schedule() {
            return None;
        }

        let emergency = self.rng.chance(direction.emergency_probability());
        let aircraft = self.create_aircraft(direction, emergency)?;
        self.last_schedule_s[slot] = now_s;
        Some(ScheduledAircraft {
            aircraft,
            emergency,
        })
    }

    /// Builds an aircraft of the kind this airline would dispatch.
    pub fn create_aircraft(
        &mut self,
        direction: Direction,
        force_emergency: bool,
    ) -> Option<Aircraft> {
        let kind = self.derive_kind(force_emergency);
        self.build_aircraft(direction, kind)
    }

    /// Builds an aircraft of an explicitly requested kind, used when
    /// the controller needs cargo equipment from a commercial carrier.
    pub fn create_aircraft_of_kind(
        &mut self,
        direction: Direction,
        kind: AircraftKind,
    ) -> Option<Aircraft> {
        self.build_aircraft(direction, kind)
    }

    fn build_aircraft(&mut self, direction: Direction, kind: AircraftKind) -> Option<Aircraft> {
        if !self.can_schedule() {
            return None;
        }
        let id = self.generate_flight_id();
        let aircraft_rng = SimRng::stream(self.rng.next_u32() as u64, self.active.len() as u64);
        let aircraft = Aircraft::new(id, kind, direction, self.name, aircraft_rng);
        self.active.push(id);
        Some(aircraft)
    }

    fn derive_kind(&mut self, force_emergency: bool) -> AircraftKind {
        if force_emergency {
            return AircraftKind::Emergency;
        }
        match self.primary_kind {
            AircraftKind::Cargo | AircraftKind::Emergency => self.primary_kind,
            AircraftKind::Commercial => {
                if self.rng.chance(CARGO_OVERRIDE_PROBABILITY) {
                    AircraftKind::Cargo
                } else {
                    AircraftKind::Commercial
                }
            }
        }
    }

    /// Flight id: uppercase initials of the airline name followed by a
    /// number in [100, 9999].
    fn generate_flight_id(&mut self) -> AircraftId {
        let mut prefix = AircraftId::new();
        for word in self.name.split_whitespace() {
            if let Some(first) = word.chars().next() {
                let _ = prefix.try_push(first.to_ascii_uppercase());
            }
        }
        if prefix.is_empty() {
            let _ = prefix.try_push_str("XX");
        }

        for _ in 0..ID_RETRY_LIMIT {
            let number = self.rng.range_u32(FLIGHT_NUMBER_MIN, FLIGHT_NUMBER_MAX);
            let mut id = prefix;
            let _ = core::fmt::Write::write_fmt(&mut id, format_args!("{}", number));
            if !self.active.iter().any(|existing| existing == &id) {
                return id;
            }
        }
        // Collision streak exhausted the retries; suffix the count.
        let mut id = prefix;
        let _ = core::fmt::Write::write_fmt(
            &mut id,
            format_args!("{}", FLIGHT_NUMBER_MAX + self.active.len() as u32),
        );
        id
    }

    /// Drops a terminated flight's aircraft from the active fleet.
    pub fn on_flight_terminated(&mut self, flight_id: &str) {
        if let Some(pos) = self
            .active
            .iter()
            .position(|id| id.as_str() == flight_id)
        {
            self.active.remove(pos);
        }
    }

    pub fn record_violation(&mut self) {
        self.violation_count += 1;
    }

    pub fn active_ids(&self) -> &[AircraftId] {
        &self.active
    }
}

fn direction_slot(direction: Direction) -> usize {
    match direction {
        Direction::North => 0,
        Direction::South => 1,
        Direction::East => 2,
        Direction::West => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AIRLINES;

    fn airline(index: usize) -> Airline {
        Airline::from_spec(&AIRLINES[index], SimRng::new(99))
    }

    #[test]
    fn roster_fields_carry_over() {
        let pia = airline(0);
        assert_eq!(pia.name().as_str(), "PIA");
        assert_eq!(pia.primary_kind(), AircraftKind::Commercial);
        assert_eq!(pia.capacity(), 6);
        assert_eq!(pia.roster_flights(), 4);
        assert_eq!(pia.active_aircraft(), 0);
    }

    #[test]
    fn flight_ids_use_initials_and_number_range() {
        let mut airforce = airline(3);
        let aircraft = airforce
            .create_aircraft(Direction::North, false)
            .unwrap();
        let id = aircraft.id().as_str();
        assert!(id.starts_with("PA"), "unexpected id {}", id);
        let number: u32 = id[2..].parse().unwrap();
        assert!((100..=9999).contains(&number));
    }

    #[test]
    fn single_word_names_use_one_initial() {
        let mut pia = airline(0);
        let aircraft = pia.create_aircraft(Direction::South, false).unwrap();
        let id = aircraft.id().as_str();
        assert!(id.starts_with('P'));
        assert!(id[1..].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn capacity_caps_the_fleet() {
        let mut bluedart = airline(4);
        assert_eq!(bluedart.capacity(), 2);
        assert!(bluedart.create_aircraft(Direction::North, false).is_some());
        assert!(bluedart.create_aircraft(Direction::South, false).is_some());
        assert!(bluedart.create_aircraft(Direction::East, false).is_none());
        assert!(!bluedart.can_schedule());
    }

    #[test]
    fn terminated_flights_free_capacity() {
        let mut bluedart = airline(4);
        let first = bluedart.create_aircraft(Direction::North, false).unwrap();
        bluedart.create_aircraft(Direction::South, false).unwrap();
        assert!(!bluedart.can_schedule());
        bluedart.on_flight_terminated(first.id().as_str());
        assert!(bluedart.can_schedule());
    }

    #[test]
    fn cadence_gates_scheduling() {
        let mut pia = airline(0);
        // The first slot opens once the full interval has elapsed.
        assert!(pia.schedule_if_needed(10.0, Direction::South).is_none());
        assert!(pia.schedule_if_needed(120.0, Direction::South).is_some());
        // Immediately after firing, the window is closed again.
        assert!(pia.schedule_if_needed(121.0, Direction::South).is_none());
        assert!(pia.schedule_if_needed(240.0, Direction::South).is_some());
    }

    #[test]
    fn directions_have_independent_cadence() {
        let mut pia = airline(0);
        assert!(pia.schedule_if_needed(120.0, Direction::South).is_some());
        // South firing does not consume the East window.
        assert!(pia.schedule_if_needed(150.0, Direction::East).is_some());
    }

    #[test]
    fn forced_emergency_overrides_kind() {
        let mut fedex = airline(2);
        let aircraft = fedex.create_aircraft(Direction::North, true).unwrap();
        assert_eq!(aircraft.kind(), AircraftKind::Emergency);
    }

    #[test]
    fn cargo_airline_dispatches_cargo() {
        let mut fedex = airline(2);
        let aircraft = fedex.create_aircraft(Direction::West, false).unwrap();
        assert_eq!(aircraft.kind(), AircraftKind::Cargo);
    }

    #[test]
    fn explicit_cargo_request_from_commercial_carrier() {
        let mut pia = airline(0);
        let aircraft = pia
            .create_aircraft_of_kind(Direction::East, AircraftKind::Cargo)
            .unwrap();
        assert_eq!(aircraft.kind(), AircraftKind::Cargo);
    }

    #[test]
    fn commercial_kind_distribution_is_mostly_commercial() {
        let mut pia = Airline::from_spec(&AIRLINES[0], SimRng::new(5));
        let mut cargo = 0;
        let mut commercial = 0;
        for _ in 0..400 {
            let aircraft = pia.create_aircraft(Direction::North, false).unwrap();
            match aircraft.kind() {
                AircraftKind::Cargo => cargo += 1,
                AircraftKind::Commercial => commercial += 1,
                AircraftKind::Emergency => panic!("unforced emergency"),
            }
            pia.on_flight_terminated(&aircraft.id().to_string());
        }
        assert!(commercial > cargo * 5, "{} vs {}", commercial, cargo);
    }
}
