//! Shared runway resources with eligibility rules and usage counters.
//!
//! A runway never owns its occupant; it records the occupant's id and
//! the arbiter or the owning flight resolves the rest.

use std::time::Instant;

use serde::Serialize;

use crate::aircraft::AircraftId;
use crate::types::{AircraftKind, Direction, RunwayId};

impl RunwayId {
    /// Direction eligibility: RWY-A serves arrivals, RWY-B departures,
    /// RWY-C any direction.
    pub fn serves_direction(&self, direction: Direction) -> bool {
        match self {
            RunwayId::A => direction.is_arrival(),
            RunwayId::B => !direction.is_arrival(),
            RunwayId::C => true,
        }
    }

    /// Kind eligibility: RWY-C is exclusive to cargo and emergency
    /// aircraft, the others accept any kind.
    pub fn admits_kind(&self, kind: AircraftKind) -> bool {
        match self {
            RunwayId::A | RunwayId::B => true,
            RunwayId::C => matches!(kind, AircraftKind::Cargo | AircraftKind::Emergency),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunwayStatus {
    Available,
    InUse,
    Maintenance,
    WeatherClosed,
}

impl RunwayStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunwayStatus::Available => "Available",
            RunwayStatus::InUse => "InUse",
            RunwayStatus::Maintenance => "Maintenance",
            RunwayStatus::WeatherClosed => "WeatherClosed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunwayError {
    NotAvailable(RunwayStatus),
    IneligibleDirection(Direction),
    IneligibleKind(AircraftKind),
    NotInUse,
    NotOccupant,
}

impl core::fmt::Display for RunwayError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            RunwayError::NotAvailable(status) => {
                write!(f, "runway is {}", status.as_str())
            }
            RunwayError::IneligibleDirection(d) => {
                write!(f, "runway does not serve {} traffic", d)
            }
            RunwayError::IneligibleKind(k) => {
                write!(f, "runway does not admit {} aircraft", k)
            }
            RunwayError::NotInUse => write!(f, "runway is not in use"),
            RunwayError::NotOccupant => write!(f, "releasing aircraft is not the occupant"),
        }
    }
}

impl std::error::Error for RunwayError {}

#[derive(Debug)]
pub struct Runway {
    id: RunwayId,
    status: RunwayStatus,
    occupant: Option<AircraftId>,
    usage_count: u32,
    total_usage_s: f64,
    last_assignment: Option<Instant>,
}

impl Runway {
    pub fn new(id: RunwayId) -> Self {
        Self {
            id,
            status: RunwayStatus::Available,
            occupant: None,
            usage_count: 0,
            total_usage_s: 0.0,
            last_assignment: None,
        }
    }

    pub fn id(&self) -> RunwayId {
        self.id
    }

    pub fn status(&self) -> RunwayStatus {
        self.status
    }

    pub fn is_available(&self) -> bool {
        self.status == RunwayStatus::Available
    }

    pub fn occupant(&self) -> Option<&AircraftId> {
        self.occupant.as_ref()
    }

    pub fn usage_count(&self) -> u32 {
        self.usage_count
    }

    /// Cumulative occupancy time, including the open session if the
    /// runway is currently in use.
    pub fn total_usage_s(&self) -> f64 {
        let mut total = self.total_usage_s;
        if self.status == RunwayStatus::InUse {
            if let Some(since) = self.last_assignment {
                total += since.elapsed().as_secs_f64();
            }
        }
        total
    }

    /// Grants the runway to an aircraft. Fails without state change if
    /// the runway is not available or either eligibility check fails.
    pub fn assign(
        &mut self,
        aircraft_id: &AircraftId,
        direction: Direction,
        kind: AircraftKind,
    ) -> Result<(), RunwayError> {
        if self.status != RunwayStatus::Available {
            return Err(RunwayError::NotAvailable(self.status));
        }
        if !self.id.serves_direction(direction) {
            return Err(RunwayError::IneligibleDirection(direction));
        }
        if !self.id.admits_kind(kind) {
            return Err(RunwayError::IneligibleKind(kind));
        }

        self.occupant = Some(*aircraft_id);
        self.status = RunwayStatus::InUse;
        self.last_assignment = Some(Instant::now());
        self.usage_count += 1;
        Ok(())
    }

    /// Releases the runway. Only the current occupant may release;
    /// the session's duration is accrued into the usage total.
    pub fn release(&mut self, aircraft_id: &str) -> Result<f64, RunwayError> {
        if self.status != RunwayStatus::InUse {
            return Err(RunwayError::NotInUse);
        }
        match &self.occupant {
            Some(current) if current.as_str() == aircraft_id => {}
            _ => return Err(RunwayError::NotOccupant),
        }

        let session_s = self
            .last_assignment
            .map(|since| since.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        self.total_usage_s += session_s;
        self.occupant = None;
        self.status = RunwayStatus::Available;
        Ok(session_s)
    }

    /// Changes the runway status. Closing an in-use runway for
    /// maintenance or weather force-evicts the occupant after accruing
    /// the open session's usage time.
    pub fn set_status(&mut self, status: RunwayStatus) {
        if self.status == RunwayStatus::InUse
            && matches!(
                status,
                RunwayStatus::Maintenance | RunwayStatus::WeatherClosed
            )
        {
            if let Some(since) = self.last_assignment {
                self.total_usage_s += since.elapsed().as_secs_f64();
            }
        }

        self.status = status;
        if status != RunwayStatus::InUse {
            self.occupant = None;
        }
    }

    pub fn update(&mut self, _dt_s: f64) {
        debug_assert!(
            (self.status == RunwayStatus::InUse) == self.occupant.is_some(),
            "occupancy invariant broken on {}",
            self.id
        );
    }
}
