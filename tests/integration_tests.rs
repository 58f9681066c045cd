use std::sync::Arc;
use std::time::Duration;

use atcsim::controller::ControllerError;
use atcsim::events::MemorySink;
use atcsim::types::{AircraftKind, RunwayId};
use atcsim::{ControllerConfig, EventSink, SimulationController};

fn deterministic_controller(duration_s: f64) -> SimulationController {
    SimulationController::new(ControllerConfig {
        duration_s,
        master_seed: 0xA1C5_1234,
    })
}

#[test]
fn controller_initialization() {
    let controller = deterministic_controller(300.0);
    controller.initialize().unwrap();

    assert!(!controller.is_running());
    assert!(!controller.is_completed());
    assert_eq!(controller.current_time_s(), 0.0);
    assert_eq!(controller.remaining_time_s(), 300.0);

    let report = controller.status_report();
    assert_eq!(report.runways.len(), 3);
    // The roster seeds exactly one cargo flight at startup.
    assert!(report.active_cargo_flights >= 1);
}

#[test]
fn lifecycle_guards() {
    let controller = deterministic_controller(300.0);
    assert_eq!(controller.start(), Err(ControllerError::NotInitialized));

    controller.initialize().unwrap();
    assert_eq!(controller.pause(), Err(ControllerError::NotRunning));
    assert_eq!(controller.stop(), Err(ControllerError::NotRunning));

    controller.start().unwrap();
    assert_eq!(controller.start(), Err(ControllerError::AlreadyRunning));
    assert_eq!(controller.reset(), Err(ControllerError::AlreadyRunning));
    controller.stop().unwrap();
}

#[test]
fn threaded_run_completes_and_joins() {
    let sink = Arc::new(MemorySink::new());
    let controller = SimulationController::with_sink(
        ControllerConfig {
            duration_s: 1.5,
            master_seed: 7,
        },
        Arc::clone(&sink) as Arc<dyn EventSink>,
    );
    controller.initialize().unwrap();
    controller.start().unwrap();

    // Workers drive the clock to the configured duration.
    for _ in 0..100 {
        if controller.is_completed() {
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    assert!(controller.is_completed());
    assert!(controller.current_time_s() >= 1.5);

    controller.stop().unwrap();
    assert!(!controller.is_running());
}

#[test]
fn deterministic_drive_holds_invariants() {
    let controller = deterministic_controller(120.0);
    controller.initialize().unwrap();

    // 120 simulated seconds: the simulation step runs at 100 ms, the
    // generator at its own cadence, monitoring and retries slower.
    for tick in 0..1200u32 {
        controller.step(0.1);
        controller.generator_cycle();
        if tick % 2 == 0 {
            controller.monitor_cycle();
        }
        if tick % 5 == 0 {
            controller.denied_cycle();
        }

        let report = controller.status_report();

        // Runway occupancy biconditional.
        for runway in &report.runways {
            assert_eq!(
                runway.status == "InUse",
                runway.occupant.is_some(),
                "occupancy invariant broken on {:?} at tick {}",
                runway.id,
                tick
            );
        }

        // RWY-C exclusivity, checked through flight assignments.
        for flight in &report.active_flights {
            if flight.runway == Some(RunwayId::C) {
                assert!(
                    matches!(flight.kind, AircraftKind::Cargo | AircraftKind::Emergency),
                    "{} ({:?}) occupies RWY-C at tick {}",
                    flight.id,
                    flight.kind,
                    tick
                );
            }
        }

        // Cargo presence after the first generator cycle.
        assert!(
            report.active_cargo_flights >= 1,
            "cargo presence broken at tick {}",
            tick
        );
    }

    assert!(controller.is_completed());
    let report = controller.status_report();
    assert!(report.stats.total_flights >= 1);
}

#[test]
fn generated_traffic_appears_over_time() {
    let controller = deterministic_controller(300.0);
    controller.initialize().unwrap();

    // Run past the shortest generation interval (South, 120 s).
    for _ in 0..1300 {
        controller.step(0.1);
        controller.generator_cycle();
    }

    let report = controller.status_report();
    // Every airline had a South window and at least one other open.
    assert!(
        report.stats.total_flights > 5,
        "only {} flights generated",
        report.stats.total_flights
    );
}

#[test]
fn reset_clears_accumulated_state() {
    let controller = deterministic_controller(60.0);
    controller.initialize().unwrap();
    for _ in 0..700 {
        controller.step(0.1);
        controller.generator_cycle();
    }
    assert!(controller.is_completed());

    controller.reset().unwrap();
    assert!(!controller.is_completed());
    assert_eq!(controller.current_time_s(), 0.0);
    let report = controller.status_report();
    assert_eq!(report.total_violations, 0);
    assert!(report.active_cargo_flights >= 1);
}

#[test]
fn pause_and_resume_round_trip() {
    let controller = deterministic_controller(300.0);
    controller.initialize().unwrap();
    controller.start().unwrap();

    std::thread::sleep(Duration::from_millis(60));
    controller.pause().unwrap();
    assert!(controller.is_paused());
    std::thread::sleep(Duration::from_millis(30));
    let frozen = controller.current_time_s();
    std::thread::sleep(Duration::from_millis(60));
    assert_eq!(controller.current_time_s(), frozen);

    controller.resume().unwrap();
    assert!(!controller.is_paused());
    std::thread::sleep(Duration::from_millis(80));
    assert!(controller.current_time_s() > frozen);

    controller.stop().unwrap();
}
