//! Flight lifecycle: the status machine, the timed flight plan, and
//! runway attachment.
//!
//! A flight owns its aircraft outright. The runway is referenced only
//! weakly; any operation that detaches a runway hands back a
//! [`RunwayLease`] which the caller settles after dropping the flight
//! lock, keeping the lock order runway-before-flight intact.

use std::sync::{Mutex, Weak};

use heapless::Vec;
use serde::Serialize;

use crate::aircraft::{Aircraft, AircraftId};
use crate::runway::Runway;
use crate::types::{Direction, RunwayId};

pub const MAX_PLAN_STEPS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FlightStatus {
    Scheduled,
    Active,
    Emergency,
    Completed,
    Canceled,
    Diverted,
}

impl FlightStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FlightStatus::Completed | FlightStatus::Canceled | FlightStatus::Diverted
        )
    }

    /// The status transition graph. Terminal states admit nothing.
    pub fn can_transition_to(&self, next: FlightStatus) -> bool {
        match self {
            FlightStatus::Scheduled => matches!(
                next,
                FlightStatus::Active | FlightStatus::Emergency | FlightStatus::Canceled
            ),
            FlightStatus::Active => matches!(
                next,
                FlightStatus::Emergency
                    | FlightStatus::Completed
                    | FlightStatus::Canceled
                    | FlightStatus::Diverted
            ),
            FlightStatus::Emergency => matches!(
                next,
                FlightStatus::Completed | FlightStatus::Canceled | FlightStatus::Diverted
            ),
            FlightStatus::Completed | FlightStatus::Canceled | FlightStatus::Diverted => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FlightStatus::Scheduled => "Scheduled",
            FlightStatus::Active => "Active",
            FlightStatus::Emergency => "Emergency",
            FlightStatus::Completed => "Completed",
            FlightStatus::Canceled => "Canceled",
            FlightStatus::Diverted => "Diverted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlanKind {
    Arrival,
    Departure,
    Emergency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanOp {
    AdvancePhase,
    /// Release the runway, then advance. Placed at the landing/climb
    /// boundary.
    ReleaseRunwayAndAdvance,
    Complete,
}

#[derive(Debug, Clone, Copy)]
pub struct PlanStep {
    /// Offset from activation, in seconds.
    pub offset_s: f64,
    pub op: PlanOp,
}

#[derive(Debug, Clone)]
pub struct FlightPlan {
    kind: PlanKind,
    steps: Vec<PlanStep, MAX_PLAN_STEPS>,
}

const ARRIVAL_STEPS: [(f64, PlanOp); 5] = [
    (30.0, PlanOp::AdvancePhase),
    (60.0, PlanOp::AdvancePhase),
    (90.0, PlanOp::ReleaseRunwayAndAdvance),
    (120.0, PlanOp::AdvancePhase),
    (150.0, PlanOp::Complete),
];

const DEPARTURE_STEPS: [(f64, PlanOp); 5] = [
    (30.0, PlanOp::AdvancePhase),
    (60.0, PlanOp::AdvancePhase),
    (75.0, PlanOp::AdvancePhase),
    (90.0, PlanOp::ReleaseRunwayAndAdvance),
    (120.0, PlanOp::Complete),
];

impl FlightPlan {
    /// Builds the plan for a direction. Emergency plans run at exactly
    /// half the regular offsets.
    pub fn build(direction: Direction, emergency: bool) -> Self {
        let base = if direction.is_arrival() {
            &ARRIVAL_STEPS
        } else {
            &DEPARTURE_STEPS
        };
        let scale = if emergency { 0.5 } else { 1.0 };
        let kind = if emergency {
            PlanKind::Emergency
        } else if direction.is_arrival() {
            PlanKind::Arrival
        } else {
            PlanKind::Departure
        };

        let mut steps = Vec::new();
        for (offset_s, op) in base {
            let step = PlanStep {
                offset_s: offset_s * scale,
                op: *op,
            };
            let _pushed = steps.push(step);
            debug_assert!(_pushed.is_ok(), "plan capacity exceeded");
        }
        Self { kind, steps }
    }

    pub fn kind(&self) -> PlanKind {
        self.kind
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    pub fn final_offset_s(&self) -> f64 {
        self.steps.last().map(|s| s.offset_s).unwrap_or(0.0)
    }
}

/// Deferred runway release. Settling locks the runway, so it must only
/// happen after the flight guard has been dropped.
#[derive(Debug)]
pub struct RunwayLease {
    runway_id: RunwayId,
    runway: Weak<Mutex<Runway>>,
    aircraft_id: AircraftId,
}

impl RunwayLease {
    pub fn runway_id(&self) -> RunwayId {
        self.runway_id
    }

    /// Releases the leased runway. Returns the session duration, or
    /// `None` if the runway is gone or the release was refused.
    pub fn settle(self) -> Option<f64> {
        let runway = self.runway.upgrade()?;
        let mut guard = match runway.lock() {
            Ok(guard) => guard,
            Err(_) => return None,
        };
        guard.release(self.aircraft_id.as_str()).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlightError {
    InvalidTransition {
        from: FlightStatus,
        to: FlightStatus,
    },
    RunwayAlreadyAssigned(RunwayId),
}

impl core::fmt::Display for FlightError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            FlightError::InvalidTransition { from, to } => {
                write!(f, "invalid transition {} -> {}", from.as_str(), to.as_str())
            }
            FlightError::RunwayAlreadyAssigned(id) => {
                write!(f, "flight already holds {}", id)
            }
        }
    }
}

impl std::error::Error for FlightError {}

/// Result of a single `update` tick, to be acted on by the caller
/// once the flight guard is released.
#[derive(Debug, Default)]
pub struct UpdateOutcome {
    pub lease: Option<RunwayLease>,
    /// Set when this tick moved the flight into a terminal status.
    pub entered_terminal: Option<FlightStatus>,
}

#[derive(Debug)]
pub struct Flight {
    id: AircraftId,
    aircraft: Aircraft,
    scheduled_s: f64,
    activation_s: Option<f64>,
    estimated_completion_s: f64,
    emergency: bool,
    status: FlightStatus,
    runway: Option<(RunwayId, Weak<Mutex<Runway>>)>,
    plan: FlightPlan,
    plan_step: usize,
    status_reason: Option<String>,
}

impl Flight {
    pub fn new(aircraft: Aircraft, scheduled_s: f64, emergency: bool) -> Self {
        let plan = FlightPlan::build(aircraft.direction(), emergency);
        let estimated_completion_s = scheduled_s + plan.final_offset_s();
        Self {
            id: *aircraft.id(),
            aircraft,
            scheduled_s,
            activation_s: None,
            estimated_completion_s,
            emergency,
            status: FlightStatus::Scheduled,
            runway: None,
            plan,
            plan_step: 0,
            status_reason: None,
        }
    }

    pub fn id(&self) -> &AircraftId {
        &self.id
    }

    pub fn aircraft(&self) -> &Aircraft {
        &self.aircraft
    }

    pub fn aircraft_mut(&mut self) -> &mut Aircraft {
        &mut self.aircraft
    }

    pub fn status(&self) -> FlightStatus {
        self.status
    }

    pub fn is_emergency(&self) -> bool {
        self.emergency
    }

    pub fn scheduled_s(&self) -> f64 {
        self.scheduled_s
    }

    pub fn activation_s(&self) -> Option<f64> {
        self.activation_s
    }

    pub fn estimated_completion_s(&self) -> f64 {
        self.estimated_completion_s
    }

    pub fn plan(&self) -> &FlightPlan {
        &self.plan
    }

    pub fn plan_step(&self) -> usize {
        self.plan_step
    }

    pub fn status_reason(&self) -> Option<&str> {
        self.status_reason.as_deref()
    }

    pub fn assigned_runway(&self) -> Option<RunwayId> {
        self.runway.as_ref().map(|(id, _)| *id)
    }

    /// Scheduled-vs-activation delay for reporting.
    pub fn delay_s(&self, now_s: f64) -> f64 {
        match self.activation_s {
            Some(activated) => (activated - self.scheduled_s).max(0.0),
            None if self.status == FlightStatus::Scheduled => {
                (now_s - self.scheduled_s).max(0.0)
            }
            None => 0.0,
        }
    }

    /// Records a runway grant that the arbiter already performed on
    /// the runway itself. Fails if a runway is still attached; the
    /// caller must then roll the grant back.
    pub fn attach_runway(
        &mut self,
        runway_id: RunwayId,
        handle: Weak<Mutex<Runway>>,
    ) -> Result<(), FlightError> {
        if let Some((held, _)) = &self.runway {
            return Err(FlightError::RunwayAlreadyAssigned(*held));
        }
        self.runway = Some((runway_id, handle));
        self.aircraft.set_assigned_runway(Some(runway_id));
        Ok(())
    }

    /// Detaches the runway and returns the lease for deferred release.
    pub fn release_runway(&mut self) -> Option<RunwayLease> {
        let (runway_id, handle) = self.runway.take()?;
        self.aircraft.set_assigned_runway(None);
        Some(RunwayLease {
            runway_id,
            runway: handle,
            aircraft_id: self.id,
        })
    }

    /// Moves a scheduled flight into operation. Emergency flights go
    /// straight to the emergency status.
    pub fn activate(&mut self, now_s: f64) -> Result<(), FlightError> {
        let target = if self.emergency {
            FlightStatus::Emergency
        } else {
            FlightStatus::Active
        };
        if self.status != FlightStatus::Scheduled || !self.status.can_transition_to(target) {
            return Err(FlightError::InvalidTransition {
                from: self.status,
                to: target,
            });
        }
        self.status = target;
        self.activation_s = Some(now_s);
        self.estimated_completion_s = now_s + self.plan.final_offset_s();
        Ok(())
    }

    pub fn complete(&mut self) -> Result<Option<RunwayLease>, FlightError> {
        self.enter_terminal(FlightStatus::Completed, None)
    }

    pub fn cancel(&mut self, reason: &str) -> Result<Option<RunwayLease>, FlightError> {
        self.enter_terminal(FlightStatus::Canceled, Some(reason))
    }

    pub fn divert(&mut self, reason: &str) -> Result<Option<RunwayLease>, FlightError> {
        self.enter_terminal(FlightStatus::Diverted, Some(reason))
    }

    fn enter_terminal(
        &mut self,
        target: FlightStatus,
        reason: Option<&str>,
    ) -> Result<Option<RunwayLease>, FlightError> {
        if !self.status.can_transition_to(target) {
            return Err(FlightError::InvalidTransition {
                from: self.status,
                to: target,
            });
        }
        self.status = target;
        self.status_reason = reason.map(str::to_string);
        Ok(self.release_runway())
    }

    /// Declares or clears an emergency. Declaring regenerates the plan
    /// with expedited offsets; clearing restores the regular plan and
    /// returns the flight to Active.
    pub fn set_emergency(&mut self, emergency: bool) -> Result<(), FlightError> {
        match (self.status, emergency) {
            (FlightStatus::Scheduled | FlightStatus::Active, true) => {
                self.emergency = true;
                self.status = FlightStatus::Emergency;
                self.rebuild_plan();
                Ok(())
            }
            (FlightStatus::Emergency, false) => {
                self.emergency = false;
                self.status = FlightStatus::Active;
                self.rebuild_plan();
                Ok(())
            }
            (FlightStatus::Scheduled | FlightStatus::Active, false) => {
                self.emergency = false;
                Ok(())
            }
            (FlightStatus::Emergency, true) => Ok(()),
            (from, _) => {
                let to = if emergency {
                    FlightStatus::Emergency
                } else {
                    FlightStatus::Active
                };
                Err(FlightError::InvalidTransition { from, to })
            }
        }
    }

    fn rebuild_plan(&mut self) {
        self.plan = FlightPlan::build(self.aircraft.direction(), self.emergency);
        self.plan_step = 0;
        let anchor = self.activation_s.unwrap_or(self.scheduled_s);
        self.estimated_completion_s = anchor + self.plan.final_offset_s();
    }

    /// Advances the flight by one tick: aircraft jitter, ground-fault
    /// check, and at most one due plan step. A no-op unless the flight
    /// is Active or Emergency.
    pub fn update(&mut self, dt_s: f64, now_s: f64) -> UpdateOutcome {
        let mut outcome = UpdateOutcome::default();
        if !matches!(self.status, FlightStatus::Active | FlightStatus::Emergency) {
            return outcome;
        }

        self.aircraft.update(dt_s);

        if self.aircraft.has_ground_fault() {
            if let Ok(lease) = self.cancel("ground fault") {
                outcome.lease = lease;
                outcome.entered_terminal = Some(FlightStatus::Canceled);
            }
            return outcome;
        }

        if self.next_step_due(now_s) {
            self.execute_plan_step(&mut outcome);
        }
        outcome
    }

    fn next_step_due(&self, now_s: f64) -> bool {
        let Some(activated) = self.activation_s else {
            return false;
        };
        match self.plan.steps().get(self.plan_step) {
            Some(step) => now_s - activated >= step.offset_s,
            None => false,
        }
    }

    /// Executes the pending plan step and advances the step index.
    /// Completing past the final step closes out the flight.
    pub fn execute_next_plan_step(&mut self, now_s: f64) -> bool {
        if !matches!(self.status, FlightStatus::Active | FlightStatus::Emergency) {
            return false;
        }
        if !self.next_step_due(now_s) {
            return false;
        }
        let mut outcome = UpdateOutcome::default();
        self.execute_plan_step(&mut outcome);
        // Callers of the direct step API settle any lease themselves.
        if let Some(lease) = outcome.lease.take() {
            lease.settle();
        }
        true
    }

    fn execute_plan_step(&mut self, outcome: &mut UpdateOutcome) {
        let Some(step) = self.plan.steps().get(self.plan_step).copied() else {
            return;
        };

        match step.op {
            PlanOp::AdvancePhase => {
                let _ = self.aircraft.advance_phase();
            }
            PlanOp::ReleaseRunwayAndAdvance => {
                outcome.lease = self.release_runway();
                let _ = self.aircraft.advance_phase();
            }
            PlanOp::Complete => {
                if let Ok(lease) = self.complete() {
                    if outcome.lease.is_none() {
                        outcome.lease = lease;
                    }
                    outcome.entered_terminal = Some(FlightStatus::Completed);
                }
            }
        }

        self.plan_step += 1;

        // Running off the end of the plan closes out the flight.
        if self.plan_step >= self.plan.steps().len() && !self.status.is_terminal() {
            if let Ok(lease) = self.complete() {
                if outcome.lease.is_none() {
                    outcome.lease = lease;
                }
                outcome.entered_terminal = Some(FlightStatus::Completed);
            }
        }
    }
}
