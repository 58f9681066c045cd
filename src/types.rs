use serde::{Deserialize, Serialize};

pub const RUNWAY_COUNT: usize = 3;

/// Default wall-clock length of a simulation run, in seconds.
pub const SIMULATION_DURATION_S: f64 = 300.0;

// Billing schedule applied to Airspace Violation Notices.
pub const COMMERCIAL_FINE: f64 = 500_000.0;
pub const CARGO_FINE: f64 = 700_000.0;
pub const SERVICE_FEE_RATE: f64 = 0.15;
pub const AVN_DUE_OFFSET_S: u64 = 3 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AircraftKind {
    Commercial,
    Cargo,
    Emergency,
}

impl AircraftKind {
    pub const ALL: [AircraftKind; 3] = [
        AircraftKind::Commercial,
        AircraftKind::Cargo,
        AircraftKind::Emergency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AircraftKind::Commercial => "Commercial",
            AircraftKind::Cargo => "Cargo",
            AircraftKind::Emergency => "Emergency",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            AircraftKind::Commercial => 0,
            AircraftKind::Cargo => 1,
            AircraftKind::Emergency => 2,
        }
    }
}

impl core::fmt::Display for AircraftKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// North and South are arrivals, East and West are departures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    North,
    South,
    East,
    West,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
    ];

    pub fn is_arrival(&self) -> bool {
        matches!(self, Direction::North | Direction::South)
    }

    /// Minimum spacing between generated flights for this direction.
    pub fn generation_interval_s(&self) -> f64 {
        match self {
            Direction::North => 180.0,
            Direction::South => 120.0,
            Direction::East => 150.0,
            Direction::West => 240.0,
        }
    }

    /// Probability that a newly generated flight declares an emergency.
    pub fn emergency_probability(&self) -> f64 {
        match self {
            Direction::North => 0.10,
            Direction::South => 0.05,
            Direction::East => 0.15,
            Direction::West => 0.20,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::North => "North",
            Direction::South => "South",
            Direction::East => "East",
            Direction::West => "West",
        }
    }
}

impl core::fmt::Display for Direction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// RWY-A is North-South aligned, RWY-B East-West, RWY-C is reserved
/// for cargo and emergency traffic in any direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunwayId {
    A,
    B,
    C,
}

impl RunwayId {
    pub const ALL: [RunwayId; RUNWAY_COUNT] = [RunwayId::A, RunwayId::B, RunwayId::C];

    pub fn index(&self) -> usize {
        match self {
            RunwayId::A => 0,
            RunwayId::B => 1,
            RunwayId::C => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunwayId::A => "RWY-A",
            RunwayId::B => "RWY-B",
            RunwayId::C => "RWY-C",
        }
    }
}

impl core::fmt::Display for RunwayId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Permitted speed range for a flight phase, in km/h.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedBounds {
    pub min: f64,
    pub max: f64,
}

impl SpeedBounds {
    pub fn contains(&self, speed: f64) -> bool {
        speed >= self.min && speed <= self.max
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    // Arrival chain
    Holding,
    Approach,
    Landing,
    TaxiIn,
    AtGateArrival,
    // Departure chain
    AtGateDeparture,
    TaxiOut,
    TakeoffRoll,
    Climb,
    Cruise,
}

impl Phase {
    pub fn initial_for(direction: Direction) -> Phase {
        if direction.is_arrival() {
            Phase::Holding
        } else {
            Phase::AtGateDeparture
        }
    }

    /// The statically defined next phase, or `None` for terminal phases.
    pub fn successor(&self) -> Option<Phase> {
        match self {
            Phase::Holding => Some(Phase::Approach),
            Phase::Approach => Some(Phase::Landing),
            Phase::Landing => Some(Phase::TaxiIn),
            Phase::TaxiIn => Some(Phase::AtGateArrival),
            Phase::AtGateArrival => None,
            Phase::AtGateDeparture => Some(Phase::TaxiOut),
            Phase::TaxiOut => Some(Phase::TakeoffRoll),
            Phase::TakeoffRoll => Some(Phase::Climb),
            Phase::Climb => Some(Phase::Cruise),
            Phase::Cruise => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.successor().is_none()
    }

    /// Ground phases are the only ones where ground faults can occur.
    pub fn is_ground(&self) -> bool {
        matches!(
            self,
            Phase::TaxiIn | Phase::AtGateArrival | Phase::AtGateDeparture | Phase::TaxiOut
        )
    }

    pub fn speed_bounds(&self) -> SpeedBounds {
        let (min, max) = match self {
            Phase::Holding => (400.0, 600.0),
            Phase::Approach => (240.0, 290.0),
            Phase::Landing => (30.0, 240.0),
            Phase::TaxiIn | Phase::TaxiOut => (15.0, 30.0),
            Phase::AtGateArrival | Phase::AtGateDeparture => (0.0, 5.0),
            Phase::TakeoffRoll => (0.0, 290.0),
            Phase::Climb => (250.0, 463.0),
            Phase::Cruise => (800.0, 900.0),
        };
        SpeedBounds { min, max }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Holding => "Holding",
            Phase::Approach => "Approach",
            Phase::Landing => "Landing",
            Phase::TaxiIn => "TaxiIn",
            Phase::AtGateArrival => "AtGateArrival",
            Phase::AtGateDeparture => "AtGateDeparture",
            Phase::TaxiOut => "TaxiOut",
            Phase::TakeoffRoll => "TakeoffRoll",
            Phase::Climb => "Climb",
            Phase::Cruise => "Cruise",
        }
    }
}

impl core::fmt::Display for Phase {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Unpaid,
    Paid,
    Overdue,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "Unpaid",
            PaymentStatus::Paid => "Paid",
            PaymentStatus::Overdue => "Overdue",
        }
    }
}

/// One row of the fixed airline roster.
#[derive(Debug, Clone, Copy)]
pub struct AirlineSpec {
    pub name: &'static str,
    pub kind: AircraftKind,
    /// Fleet capacity: maximum concurrent aircraft.
    pub aircraft: usize,
    /// Aircraft in operation at roster definition time.
    pub flights: usize,
}

/// The roster is fixed and must not be altered.
pub const AIRLINES: [AirlineSpec; 6] = [
    AirlineSpec { name: "PIA", kind: AircraftKind::Commercial, aircraft: 6, flights: 4 },
    AirlineSpec { name: "AirBlue", kind: AircraftKind::Commercial, aircraft: 4, flights: 4 },
    AirlineSpec { name: "FedEx", kind: AircraftKind::Cargo, aircraft: 3, flights: 2 },
    AirlineSpec { name: "Pakistan Airforce", kind: AircraftKind::Emergency, aircraft: 2, flights: 1 },
    AirlineSpec { name: "Blue Dart", kind: AircraftKind::Cargo, aircraft: 2, flights: 2 },
    AirlineSpec { name: "AghaKhan Air", kind: AircraftKind::Emergency, aircraft: 2, flights: 1 },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arrival_chain_is_ordered() {
        let mut phase = Phase::Holding;
        let expected = [
            Phase::Approach,
            Phase::Landing,
            Phase::TaxiIn,
            Phase::AtGateArrival,
        ];
        for next in expected {
            phase = phase.successor().unwrap();
            assert_eq!(phase, next);
        }
        assert!(phase.is_terminal());
    }

    #[test]
    fn departure_chain_is_ordered() {
        let mut phase = Phase::AtGateDeparture;
        let expected = [
            Phase::TaxiOut,
            Phase::TakeoffRoll,
            Phase::Climb,
            Phase::Cruise,
        ];
        for next in expected {
            phase = phase.successor().unwrap();
            assert_eq!(phase, next);
        }
        assert!(phase.is_terminal());
    }

    #[test]
    fn speed_bounds_match_operational_table() {
        assert_eq!(Phase::Holding.speed_bounds(), SpeedBounds { min: 400.0, max: 600.0 });
        assert_eq!(Phase::Approach.speed_bounds(), SpeedBounds { min: 240.0, max: 290.0 });
        assert_eq!(Phase::Landing.speed_bounds(), SpeedBounds { min: 30.0, max: 240.0 });
        assert_eq!(Phase::TaxiIn.speed_bounds(), SpeedBounds { min: 15.0, max: 30.0 });
        assert_eq!(Phase::AtGateArrival.speed_bounds(), SpeedBounds { min: 0.0, max: 5.0 });
        assert_eq!(Phase::TakeoffRoll.speed_bounds(), SpeedBounds { min: 0.0, max: 290.0 });
        assert_eq!(Phase::Climb.speed_bounds(), SpeedBounds { min: 250.0, max: 463.0 });
        assert_eq!(Phase::Cruise.speed_bounds(), SpeedBounds { min: 800.0, max: 900.0 });
    }

    #[test]
    fn roster_is_preserved() {
        assert_eq!(AIRLINES.len(), 6);
        assert_eq!(AIRLINES[0].name, "PIA");
        assert_eq!(AIRLINES[0].aircraft, 6);
        assert_eq!(AIRLINES[0].flights, 4);
        assert_eq!(AIRLINES[2].name, "FedEx");
        assert_eq!(AIRLINES[2].kind, AircraftKind::Cargo);
        assert_eq!(AIRLINES[3].name, "Pakistan Airforce");
        assert_eq!(AIRLINES[3].kind, AircraftKind::Emergency);
        assert_eq!(AIRLINES[4].name, "Blue Dart");
        assert_eq!(AIRLINES[5].name, "AghaKhan Air");
    }

    #[test]
    fn directions_split_into_arrivals_and_departures() {
        assert!(Direction::North.is_arrival());
        assert!(Direction::South.is_arrival());
        assert!(!Direction::East.is_arrival());
        assert!(!Direction::West.is_arrival());
    }

    #[test]
    fn generation_intervals_per_direction() {
        assert_eq!(Direction::North.generation_interval_s(), 180.0);
        assert_eq!(Direction::South.generation_interval_s(), 120.0);
        assert_eq!(Direction::East.generation_interval_s(), 150.0);
        assert_eq!(Direction::West.generation_interval_s(), 240.0);
    }
}
