//! Runway arbitration: priority queues per runway, eligibility
//! filtering, and the denied-flight retry queue.
//!
//! Lock discipline: the arbiter snapshots a flight's metadata, drops
//! the flight guard, locks one runway at a time to perform the grant,
//! and only then re-locks the flight to record the attachment. It
//! never holds two runway locks at once.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::aircraft::AircraftId;
use crate::flight::{Flight, FlightStatus};
use crate::runway::Runway;
use crate::types::{AircraftKind, Direction, RunwayId, RUNWAY_COUNT};

/// Bound on denied-flight retries per cycle, so retries never starve
/// the main loop.
pub const MAX_DENIED_RETRIES_PER_CYCLE: usize = 5;

pub const PRIORITY_EMERGENCY: u8 = 3;
pub const PRIORITY_CARGO: u8 = 2;
pub const PRIORITY_COMMERCIAL: u8 = 1;

pub fn priority_class(kind: AircraftKind, emergency_flight: bool) -> u8 {
    if emergency_flight || kind == AircraftKind::Emergency {
        PRIORITY_EMERGENCY
    } else if kind == AircraftKind::Cargo {
        PRIORITY_CARGO
    } else {
        PRIORITY_COMMERCIAL
    }
}

#[derive(Debug, Clone, Copy)]
struct FlightSnapshot {
    id: AircraftId,
    direction: Direction,
    kind: AircraftKind,
    emergency: bool,
    status: FlightStatus,
    scheduled_s: f64,
    has_runway: bool,
}

fn snapshot(flight: &Arc<Mutex<Flight>>) -> Option<FlightSnapshot> {
    let guard = flight.lock().ok()?;
    Some(FlightSnapshot {
        id: *guard.id(),
        direction: guard.aircraft().direction(),
        kind: guard.aircraft().kind(),
        emergency: guard.is_emergency(),
        status: guard.status(),
        scheduled_s: guard.scheduled_s(),
        has_runway: guard.assigned_runway().is_some(),
    })
}

struct QueueEntry {
    flight: Arc<Mutex<Flight>>,
    priority: u8,
    scheduled_ms: u64,
    seq: u64,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    /// Higher priority class wins; ties break on earlier scheduled
    /// time, then arrival order.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.scheduled_ms.cmp(&self.scheduled_ms))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOutcome {
    Assigned(RunwayId),
    /// The flight no longer needs a runway.
    Skipped,
    Denied,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct ArbiterStats {
    pub queued_total: u32,
    pub assignments: u32,
    pub denials: u32,
    pub rescheduled: u32,
    pub runway_usage: [u32; RUNWAY_COUNT],
}

pub struct RunwayArbiter {
    queues: [BinaryHeap<QueueEntry>; RUNWAY_COUNT],
    denied: VecDeque<Arc<Mutex<Flight>>>,
    seq: u64,
    stats: ArbiterStats,
}

impl Default for RunwayArbiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RunwayArbiter {
    pub fn new() -> Self {
        Self {
            queues: [BinaryHeap::new(), BinaryHeap::new(), BinaryHeap::new()],
            denied: VecDeque::new(),
            seq: 0,
            stats: ArbiterStats::default(),
        }
    }

    pub fn stats(&self) -> &ArbiterStats {
        &self.stats
    }

    pub fn queued_len(&self) -> usize {
        self.queues.iter().map(BinaryHeap::len).sum()
    }

    pub fn denied_len(&self) -> usize {
        self.denied.len()
    }

    /// Queues a flight on its preferred runway: RWY-C for cargo and
    /// emergency aircraft it admits, otherwise the direction-aligned
    /// runway.
    pub fn enqueue(&mut self, flight: Arc<Mutex<Flight>>) {
        let Some(snap) = snapshot(&flight) else {
            return;
        };
        let queue_id = preferred_queue(&snap);
        let entry = QueueEntry {
            flight,
            priority: priority_class(snap.kind, snap.emergency),
            scheduled_ms: (snap.scheduled_s * 1000.0) as u64,
            seq: self.seq,
        };
        self.seq += 1;
        self.stats.queued_total += 1;
        self.queues[queue_id.index()].push(entry);
    }

    pub fn enqueue_denied(&mut self, flight: Arc<Mutex<Flight>>) {
        self.stats.denials += 1;
        self.denied.push_back(flight);
    }

    /// One scheduler tick: for each queue, in RWY-C-first order so
    /// cargo and emergency traffic is served ahead of the general
    /// queues, pop the top flight and attempt placement. Failures go
    /// to the denied queue.
    pub fn assignment_pass(
        &mut self,
        runways: &[Arc<Mutex<Runway>>; RUNWAY_COUNT],
        now_s: f64,
    ) -> usize {
        let mut assigned = 0;
        for queue_id in [RunwayId::C, RunwayId::A, RunwayId::B] {
            loop {
                let Some(entry) = self.queues[queue_id.index()].pop() else {
                    break;
                };
                match self.try_assign(&entry.flight, runways, now_s) {
                    AssignOutcome::Assigned(_) => {
                        assigned += 1;
                        break;
                    }
                    AssignOutcome::Skipped => {
                        // Stale entry; keep draining this queue.
                        continue;
                    }
                    AssignOutcome::Denied => {
                        self.enqueue_denied(entry.flight);
                        break;
                    }
                }
            }
        }
        assigned
    }

    /// Attempts to place one flight, trying candidate runways one at a
    /// time. RWY-C exclusivity is enforced by the kind filter.
    pub fn try_assign(
        &mut self,
        flight: &Arc<Mutex<Flight>>,
        runways: &[Arc<Mutex<Runway>>; RUNWAY_COUNT],
        now_s: f64,
    ) -> AssignOutcome {
        let Some(snap) = snapshot(flight) else {
            return AssignOutcome::Skipped;
        };
        if snap.status.is_terminal() || snap.has_runway {
            return AssignOutcome::Skipped;
        }

        for candidate in candidate_runways(&snap) {
            let runway = &runways[candidate.index()];
            let granted = {
                let mut guard = match runway.lock() {
                    Ok(guard) => guard,
                    Err(_) => continue,
                };
                guard.assign(&snap.id, snap.direction, snap.kind).is_ok()
            };
            if !granted {
                continue;
            }

            let attached = {
                let mut guard = match flight.lock() {
                    Ok(guard) => guard,
                    Err(_) => {
                        roll_back_grant(runway, &snap.id);
                        return AssignOutcome::Skipped;
                    }
                };
                match guard.attach_runway(candidate, Arc::downgrade(runway)) {
                    Ok(()) => {
                        if guard.status() == FlightStatus::Scheduled
                            && now_s >= guard.scheduled_s()
                        {
                            let _ = guard.activate(now_s);
                        }
                        true
                    }
                    Err(_) => false,
                }
            };
            if !attached {
                roll_back_grant(runway, &snap.id);
                return AssignOutcome::Skipped;
            }

            self.stats.assignments += 1;
            self.stats.runway_usage[candidate.index()] += 1;
            return AssignOutcome::Assigned(candidate);
        }

        AssignOutcome::Denied
    }

    /// Retries queued denied flights, at most five per cycle.
    pub fn retry_denied(
        &mut self,
        runways: &[Arc<Mutex<Runway>>; RUNWAY_COUNT],
        now_s: f64,
    ) -> usize {
        let mut rescheduled = 0;
        let mut attempts = 0;
        while attempts < MAX_DENIED_RETRIES_PER_CYCLE {
            let Some(flight) = self.denied.pop_front() else {
                break;
            };
            attempts += 1;
            match self.try_assign(&flight, runways, now_s) {
                AssignOutcome::Assigned(_) => {
                    rescheduled += 1;
                    self.stats.rescheduled += 1;
                }
                AssignOutcome::Skipped => {}
                AssignOutcome::Denied => {
                    self.denied.push_back(flight);
                }
            }
        }
        rescheduled
    }

    /// Moves emergency flights to the front of the denied queue,
    /// preserving relative order otherwise.
    pub fn promote_emergencies(&mut self) {
        let mut emergencies = VecDeque::new();
        let mut rest = VecDeque::new();
        while let Some(flight) = self.denied.pop_front() {
            let is_emergency = snapshot(&flight)
                .map(|s| s.emergency || s.kind == AircraftKind::Emergency)
                .unwrap_or(false);
            if is_emergency {
                emergencies.push_back(flight);
            } else {
                rest.push_back(flight);
            }
        }
        emergencies.append(&mut rest);
        self.denied = emergencies;
    }

    pub fn clear(&mut self) {
        for queue in &mut self.queues {
            queue.clear();
        }
        self.denied.clear();
        self.seq = 0;
        self.stats = ArbiterStats::default();
    }
}

fn preferred_queue(snap: &FlightSnapshot) -> RunwayId {
    if RunwayId::C.admits_kind(snap.kind) {
        RunwayId::C
    } else if snap.direction.is_arrival() {
        RunwayId::A
    } else {
        RunwayId::B
    }
}

/// Candidate runways in attempt order. Cargo and emergency aircraft
/// try RWY-C first and fall back to the direction-aligned runway;
/// everything else is confined to its direction-aligned runway.
fn candidate_runways(snap: &FlightSnapshot) -> heapless::Vec<RunwayId, RUNWAY_COUNT> {
    let mut candidates = heapless::Vec::new();
    let preferred = if snap.direction.is_arrival() {
        RunwayId::A
    } else {
        RunwayId::B
    };
    if RunwayId::C.admits_kind(snap.kind) {
        let _ = candidates.push(RunwayId::C);
    }
    let _ = candidates.push(preferred);
    candidates
}

fn roll_back_grant(runway: &Arc<Mutex<Runway>>, aircraft_id: &AircraftId) {
    if let Ok(mut guard) = runway.lock() {
        let _ = guard.release(aircraft_id.as_str());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aircraft::{Aircraft, AirlineName};
    use crate::rng::SimRng;
    use crate::runway::RunwayStatus;

    fn runways() -> [Arc<Mutex<Runway>>; RUNWAY_COUNT] {
        [
            Arc::new(Mutex::new(Runway::new(RunwayId::A))),
            Arc::new(Mutex::new(Runway::new(RunwayId::B))),
            Arc::new(Mutex::new(Runway::new(RunwayId::C))),
        ]
    }

    fn flight(
        id: &str,
        kind: AircraftKind,
        direction: Direction,
        scheduled_s: f64,
        emergency: bool,
    ) -> Arc<Mutex<Flight>> {
        let aircraft = Aircraft::new(
            AircraftId::from(id).unwrap(),
            kind,
            direction,
            AirlineName::from("PIA").unwrap(),
            SimRng::new(17),
        );
        Arc::new(Mutex::new(Flight::new(aircraft, scheduled_s, emergency)))
    }

    #[test]
    fn cargo_prefers_rwy_c() {
        let mut arbiter = RunwayArbiter::new();
        let runways = runways();
        let cargo = flight("BD100", AircraftKind::Cargo, Direction::North, 0.0, false);

        let outcome = arbiter.try_assign(&cargo, &runways, 0.0);
        assert_eq!(outcome, AssignOutcome::Assigned(RunwayId::C));
        assert_eq!(
            runways[RunwayId::C.index()].lock().unwrap().status(),
            RunwayStatus::InUse
        );
        // The flight is activated once assigned at/after schedule.
        assert_eq!(cargo.lock().unwrap().status(), FlightStatus::Active);
    }

    #[test]
    fn cargo_falls_back_when_rwy_c_busy() {
        let mut arbiter = RunwayArbiter::new();
        let runways = runways();
        let first = flight("BD100", AircraftKind::Cargo, Direction::North, 0.0, false);
        let second = flight("FE200", AircraftKind::Cargo, Direction::South, 0.0, false);

        assert_eq!(
            arbiter.try_assign(&first, &runways, 0.0),
            AssignOutcome::Assigned(RunwayId::C)
        );
        assert_eq!(
            arbiter.try_assign(&second, &runways, 0.0),
            AssignOutcome::Assigned(RunwayId::A)
        );
    }

    #[test]
    fn commercial_never_lands_on_rwy_c() {
        let mut arbiter = RunwayArbiter::new();
        let runways = runways();
        // Occupy RWY-A so the only physically free arrival runway is C.
        let blocker = flight("P0001", AircraftKind::Commercial, Direction::North, 0.0, false);
        assert_eq!(
            arbiter.try_assign(&blocker, &runways, 0.0),
            AssignOutcome::Assigned(RunwayId::A)
        );

        let commercial = flight("P0002", AircraftKind::Commercial, Direction::North, 0.0, false);
        assert_eq!(
            arbiter.try_assign(&commercial, &runways, 0.0),
            AssignOutcome::Denied
        );
        assert!(runways[RunwayId::C.index()].lock().unwrap().is_available());
    }

    #[test]
    fn emergency_preempts_earlier_commercial_traffic() {
        let mut arbiter = RunwayArbiter::new();
        let runways = runways();

        // Three commercial arrivals queued first, then an emergency
        // declared on a commercial airframe, scheduled latest of all.
        for (i, id) in ["P0001", "P0002", "P0003"].iter().enumerate() {
            arbiter.enqueue(flight(
                id,
                AircraftKind::Commercial,
                Direction::North,
                i as f64,
                false,
            ));
        }
        let emergency = flight("P0911", AircraftKind::Commercial, Direction::North, 99.0, true);
        arbiter.enqueue(Arc::clone(&emergency));

        arbiter.assignment_pass(&runways, 100.0);
        assert_eq!(emergency.lock().unwrap().assigned_runway(), Some(RunwayId::A));
    }

    #[test]
    fn equal_priority_breaks_ties_on_scheduled_time() {
        let mut arbiter = RunwayArbiter::new();
        let runways = runways();

        let late = flight("P0002", AircraftKind::Commercial, Direction::North, 50.0, false);
        let early = flight("P0001", AircraftKind::Commercial, Direction::North, 10.0, false);
        arbiter.enqueue(Arc::clone(&late));
        arbiter.enqueue(Arc::clone(&early));

        arbiter.assignment_pass(&runways, 60.0);
        assert_eq!(early.lock().unwrap().assigned_runway(), Some(RunwayId::A));
        assert!(late.lock().unwrap().assigned_runway().is_none());
    }

    #[test]
    fn denied_flights_queue_and_retry() {
        let mut arbiter = RunwayArbiter::new();
        let runways = runways();

        let holder = flight("P0001", AircraftKind::Commercial, Direction::North, 0.0, false);
        arbiter.enqueue(Arc::clone(&holder));
        let waiter = flight("P0002", AircraftKind::Commercial, Direction::South, 0.0, false);
        arbiter.enqueue(Arc::clone(&waiter));

        // First pass seats the holder; the second finds RWY-A busy.
        arbiter.assignment_pass(&runways, 0.0);
        assert_eq!(holder.lock().unwrap().assigned_runway(), Some(RunwayId::A));
        arbiter.assignment_pass(&runways, 0.0);
        assert_eq!(arbiter.denied_len(), 1);
        assert_eq!(arbiter.stats().denials, 1);

        // Still blocked: the retry re-queues the flight.
        assert_eq!(arbiter.retry_denied(&runways, 1.0), 0);
        assert_eq!(arbiter.denied_len(), 1);

        // Free the runway; the retry then succeeds.
        {
            let mut flight_guard = holder.lock().unwrap();
            let lease = flight_guard.release_runway().unwrap();
            drop(flight_guard);
            lease.settle().unwrap();
        }
        assert_eq!(arbiter.retry_denied(&runways, 2.0), 1);
        assert_eq!(waiter.lock().unwrap().assigned_runway(), Some(RunwayId::A));
        assert_eq!(arbiter.stats().rescheduled, 1);
    }

    #[test]
    fn retry_is_bounded_per_cycle() {
        let mut arbiter = RunwayArbiter::new();
        let runways = runways();

        let holder = flight("P0001", AircraftKind::Commercial, Direction::North, 0.0, false);
        assert_eq!(
            arbiter.try_assign(&holder, &runways, 0.0),
            AssignOutcome::Assigned(RunwayId::A)
        );
        for i in 0..8 {
            arbiter.enqueue_denied(flight(
                &format!("P1{:03}", i),
                AircraftKind::Commercial,
                Direction::North,
                0.0,
                false,
            ));
        }

        arbiter.retry_denied(&runways, 1.0);
        // Five attempts ran; all failed and were re-queued.
        assert_eq!(arbiter.denied_len(), 8);
    }

    #[test]
    fn emergencies_jump_the_denied_queue() {
        let mut arbiter = RunwayArbiter::new();
        let runways = runways();

        let holder = flight("P0001", AircraftKind::Commercial, Direction::North, 0.0, false);
        assert_eq!(
            arbiter.try_assign(&holder, &runways, 0.0),
            AssignOutcome::Assigned(RunwayId::A)
        );
        for i in 0..3 {
            arbiter.enqueue_denied(flight(
                &format!("P1{:03}", i),
                AircraftKind::Commercial,
                Direction::North,
                0.0,
                false,
            ));
        }
        let emergency = flight("PA911", AircraftKind::Emergency, Direction::North, 9.0, false);
        arbiter.enqueue_denied(Arc::clone(&emergency));

        arbiter.promote_emergencies();

        // Free RWY-A; the promoted emergency takes the first retry.
        {
            let mut guard = holder.lock().unwrap();
            let lease = guard.release_runway().unwrap();
            drop(guard);
            lease.settle().unwrap();
        }
        arbiter.retry_denied(&runways, 10.0);
        assert!(emergency.lock().unwrap().assigned_runway().is_some());
    }

    #[test]
    fn skipped_entries_do_not_clog_queues() {
        let mut arbiter = RunwayArbiter::new();
        let runways = runways();

        let done = flight("P0001", AircraftKind::Commercial, Direction::North, 0.0, false);
        done.lock().unwrap().cancel("test").unwrap();
        arbiter.enqueue(Arc::clone(&done));
        let live = flight("P0002", AircraftKind::Commercial, Direction::North, 1.0, false);
        arbiter.enqueue(Arc::clone(&live));

        arbiter.assignment_pass(&runways, 2.0);
        assert_eq!(live.lock().unwrap().assigned_runway(), Some(RunwayId::A));
        assert_eq!(arbiter.queued_len(), 0);
    }
}
