use std::io::Write as _;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Mutex};
use tokio::time;
use tracing::{error, info, warn};

use atcsim::bridge::{self, AvnRecord, BridgeTx, RecordType};
use atcsim::controller::ControllerError;
use atcsim::protocol::{
    ControlCommand, ControlRequest, ControlResponse, ProtocolHandler, ResponseStatus,
};
use atcsim::{ControllerConfig, SimulationController};

const TCP_PORT: u16 = 8080;
const STATUS_BROADCAST_BUFFER_SIZE: usize = 64;
const STATUS_PERIOD_MS: u64 = 1000;
const BRIDGE_PUMP_PERIOD_MS: u64 = 250;

/// Byte streams to the external billing collaborator.
struct BillingLink {
    child: StdMutex<Child>,
    stdin: StdMutex<ChildStdin>,
    tx: StdMutex<BridgeTx>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("🛫 ATC Simulation Tower");
    println!("=======================");

    let config = config_from_env();
    let controller = Arc::new(SimulationController::new(config));
    controller.initialize()?;
    controller.start()?;
    info!(
        "simulation started: duration {:.0}s, seed {:#x}",
        config.duration_s, config.master_seed
    );

    let billing = connect_billing(&controller);
    if billing.is_none() {
        info!("no billing collaborator configured (ATCSIM_BILLING_CMD); payments settle locally");
    }

    // Status stream shared by all connected operator clients.
    let (status_tx, _) = broadcast::channel::<String>(STATUS_BROADCAST_BUFFER_SIZE);

    let tcp_controller = Arc::clone(&controller);
    let tcp_billing = billing.clone();
    let tcp_status_tx = status_tx.clone();
    let tcp_server = tokio::spawn(async move {
        if let Err(e) = run_tcp_server(tcp_controller, tcp_billing, tcp_status_tx).await {
            error!("TCP server error: {}", e);
        }
    });

    let pump_controller = Arc::clone(&controller);
    let pump_billing = billing.clone();
    let bridge_pump = tokio::spawn(async move {
        let mut interval = time::interval(Duration::from_millis(BRIDGE_PUMP_PERIOD_MS));
        loop {
            interval.tick().await;
            pump_avns(&pump_controller, pump_billing.as_deref());
        }
    });

    let mut status_interval = time::interval(Duration::from_millis(STATUS_PERIOD_MS));
    loop {
        status_interval.tick().await;

        let report = controller.status_report();
        match serde_json::to_string(&report) {
            Ok(json) => {
                let _ = status_tx.send(json);
            }
            Err(e) => warn!("status serialization failed: {}", e),
        }

        if controller.is_completed() {
            info!("simulation duration elapsed");
            break;
        }
        if !controller.is_running() {
            break;
        }
    }

    match controller.stop() {
        Ok(()) | Err(ControllerError::NotRunning) => {}
        Err(e) => warn!("stop failed: {}", e),
    }
    bridge_pump.abort();
    tcp_server.abort();
    shutdown_billing(billing);

    println!("🛬 ATC Simulation Tower stopped");
    Ok(())
}

fn config_from_env() -> ControllerConfig {
    let mut config = ControllerConfig::default();
    if let Ok(value) = std::env::var("ATCSIM_DURATION_S") {
        if let Ok(duration) = value.parse::<f64>() {
            if duration > 0.0 {
                config.duration_s = duration;
            }
        }
    }
    if let Ok(value) = std::env::var("ATCSIM_SEED") {
        if let Ok(seed) = value.parse::<u64>() {
            config.master_seed = seed;
        }
    }
    config
}

/// Spawns the billing collaborator and wires both byte streams: AVN
/// records flow out over its stdin, confirmations flow back over its
/// stdout on a dedicated reader thread.
fn connect_billing(controller: &Arc<SimulationController>) -> Option<Arc<BillingLink>> {
    let command = std::env::var("ATCSIM_BILLING_CMD").ok()?;
    let mut child = match Command::new("sh")
        .arg("-c")
        .arg(&command)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            error!("failed to spawn billing collaborator '{}': {}", command, e);
            return None;
        }
    };

    let stdin = child.stdin.take()?;
    let stdout = child.stdout.take()?;
    info!("billing collaborator attached: {}", command);

    let reader_controller = Arc::clone(controller);
    std::thread::Builder::new()
        .name("atcsim-billing-rx".to_string())
        .spawn(move || {
            let mut stream = stdout;
            loop {
                match bridge::read_record(&mut stream) {
                    Ok(Some(record)) => apply_inbound(&reader_controller, &record),
                    Ok(None) => {
                        info!("billing stream closed");
                        break;
                    }
                    Err(e) => {
                        warn!("billing stream error: {}", e);
                        break;
                    }
                }
            }
        })
        .ok()?;

    Some(Arc::new(BillingLink {
        child: StdMutex::new(child),
        stdin: StdMutex::new(stdin),
        tx: StdMutex::new(BridgeTx::new()),
    }))
}

fn apply_inbound(controller: &SimulationController, record: &AvnRecord) {
    match record.record_type {
        RecordType::PaymentConfirmation => {
            if controller.confirm_payment(record.avn_id) {
                info!(
                    "payment confirmed for AVN #{} ({:.2})",
                    record.avn_id, record.amount
                );
            } else {
                warn!("payment confirmation for unknown AVN #{}", record.avn_id);
            }
        }
        RecordType::AvnCreated => {
            // Acknowledgement echo from the collaborator.
        }
        other => {
            warn!("unexpected inbound record type {:?}", other);
        }
    }
}

/// Drains freshly issued AVNs into the billing stream with bounded
/// retry. Without a collaborator the records stay queued in the core.
fn pump_avns(controller: &SimulationController, billing: Option<&BillingLink>) {
    let Some(link) = billing else {
        return;
    };
    let records = controller.take_avn_dispatch();

    let Ok(mut tx) = link.tx.lock() else {
        return;
    };
    for record in records {
        tx.queue(record);
    }
    if tx.pending_len() == 0 {
        return;
    }
    let Ok(mut stdin) = link.stdin.lock() else {
        return;
    };
    if let Err(e) = tx.flush(&mut *stdin) {
        warn!("AVN dispatch failed ({}), {} pending", e, tx.pending_len());
    }
}

fn shutdown_billing(billing: Option<Arc<BillingLink>>) {
    let Some(link) = billing else {
        return;
    };
    // Closing stdin lets the collaborator drain and exit on EOF; the
    // kill is the backstop termination signal.
    if let Ok(mut stdin) = link.stdin.lock() {
        let _ = stdin.flush();
    }
    if let Ok(mut child) = link.child.lock() {
        let _ = child.kill();
        let _ = child.wait();
    };
}

async fn run_tcp_server(
    controller: Arc<SimulationController>,
    billing: Option<Arc<BillingLink>>,
    status_tx: broadcast::Sender<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(format!("127.0.0.1:{}", TCP_PORT)).await?;
    info!("🌐 control server listening on port {}", TCP_PORT);

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("🔗 operator connected: {}", addr);
                let client_controller = Arc::clone(&controller);
                let client_billing = billing.clone();
                let client_status_rx = status_tx.subscribe();
                tokio::spawn(async move {
                    if let Err(e) = handle_client(
                        stream,
                        client_controller,
                        client_billing,
                        client_status_rx,
                    )
                    .await
                    {
                        warn!("operator {} error: {}", addr, e);
                    }
                    info!("🔌 operator {} disconnected", addr);
                });
            }
            Err(e) => {
                error!("failed to accept connection: {}", e);
            }
        }
    }
}

async fn handle_client(
    stream: TcpStream,
    controller: Arc<SimulationController>,
    billing: Option<Arc<BillingLink>>,
    mut status_rx: broadcast::Receiver<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (reader, writer) = stream.into_split();
    let mut buf_reader = BufReader::new(reader);
    let writer = Arc::new(Mutex::new(writer));

    // Stream periodic status frames alongside command responses.
    let status_writer = Arc::clone(&writer);
    let status_task = tokio::spawn(async move {
        while let Ok(frame) = status_rx.recv().await {
            let mut guard = status_writer.lock().await;
            if guard.write_all(frame.as_bytes()).await.is_err() {
                break;
            }
            if guard.write_all(b"\n").await.is_err() {
                break;
            }
        }
    });

    let mut handler = ProtocolHandler::new();
    let mut line = String::new();
    loop {
        line.clear();
        match buf_reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let response = match handler.parse_command(trimmed) {
                    Ok(command) => match handler.validate_command(&command) {
                        Ok(()) => {
                            execute_command(&handler, &controller, billing.as_deref(), &command)
                        }
                        Err(e) => handler.create_response(
                            command.id,
                            ResponseStatus::InvalidCommand,
                            Some(&e.to_string()),
                            None,
                        ),
                    },
                    Err(e) => handler.create_response(
                        0,
                        ResponseStatus::InvalidCommand,
                        Some(&e.to_string()),
                        None,
                    ),
                };

                let json = match handler.serialize_response(&response) {
                    Ok(json) => json.to_string(),
                    Err(e) => {
                        error!("response serialization failed: {}", e);
                        continue;
                    }
                };
                let mut guard = writer.lock().await;
                guard.write_all(json.as_bytes()).await?;
                guard.write_all(b"\n").await?;
            }
            Err(e) => {
                warn!("read error: {}", e);
                break;
            }
        }
    }

    status_task.abort();
    Ok(())
}

fn execute_command(
    handler: &ProtocolHandler,
    controller: &SimulationController,
    billing: Option<&BillingLink>,
    command: &ControlCommand,
) -> ControlResponse {
    match &command.request {
        ControlRequest::Start => lifecycle_response(handler, command.id, controller.start()),
        ControlRequest::Pause => lifecycle_response(handler, command.id, controller.pause()),
        ControlRequest::Resume => lifecycle_response(handler, command.id, controller.resume()),
        ControlRequest::Stop => lifecycle_response(handler, command.id, controller.stop()),
        ControlRequest::Status => {
            let report = controller.status_report();
            match serde_json::to_value(&report) {
                Ok(payload) => handler.create_response(
                    command.id,
                    ResponseStatus::Success,
                    None,
                    Some(payload),
                ),
                Err(e) => handler.create_response(
                    command.id,
                    ResponseStatus::Error,
                    Some(&e.to_string()),
                    None,
                ),
            }
        }
        ControlRequest::ListAvns => {
            let unpaid = controller.unpaid_avns();
            let message = format!("{} unpaid AVNs", unpaid.len());
            match serde_json::to_value(&unpaid) {
                Ok(payload) => handler.create_response(
                    command.id,
                    ResponseStatus::Success,
                    Some(&message),
                    Some(payload),
                ),
                Err(e) => handler.create_response(
                    command.id,
                    ResponseStatus::Error,
                    Some(&e.to_string()),
                    None,
                ),
            }
        }
        ControlRequest::PayAvn { avn_id, amount } => {
            let Some(request) = controller.payment_request(*avn_id, *amount) else {
                return handler.create_response(
                    command.id,
                    ResponseStatus::Rejected,
                    Some(&format!("unknown AVN #{}", avn_id)),
                    None,
                );
            };
            match billing {
                Some(link) => {
                    let queued = match (link.tx.lock(), link.stdin.lock()) {
                        (Ok(mut tx), Ok(mut stdin)) => {
                            tx.queue(request);
                            tx.flush(&mut *stdin).is_ok()
                        }
                        _ => false,
                    };
                    if queued {
                        handler.create_response(
                            command.id,
                            ResponseStatus::Success,
                            Some(&format!("payment request for AVN #{} submitted", avn_id)),
                            None,
                        )
                    } else {
                        handler.create_response(
                            command.id,
                            ResponseStatus::Error,
                            Some("billing stream unavailable, request queued"),
                            None,
                        )
                    }
                }
                None => {
                    // Standalone mode: settle the payment locally.
                    if controller.confirm_payment(*avn_id) {
                        handler.create_response(
                            command.id,
                            ResponseStatus::Success,
                            Some(&format!("AVN #{} marked paid", avn_id)),
                            None,
                        )
                    } else {
                        handler.create_response(
                            command.id,
                            ResponseStatus::Rejected,
                            Some(&format!("unknown AVN #{}", avn_id)),
                            None,
                        )
                    }
                }
            }
        }
        ControlRequest::QueryAirline { name } => {
            let violations = controller.violations_for_airline(name);
            let message = format!("{} AVNs for {}", violations.len(), name);
            match serde_json::to_value(&violations) {
                Ok(payload) => handler.create_response(
                    command.id,
                    ResponseStatus::Success,
                    Some(&message),
                    Some(payload),
                ),
                Err(e) => handler.create_response(
                    command.id,
                    ResponseStatus::Error,
                    Some(&e.to_string()),
                    None,
                ),
            }
        }
    }
}

fn lifecycle_response(
    handler: &ProtocolHandler,
    command_id: u32,
    result: Result<(), ControllerError>,
) -> ControlResponse {
    match result {
        Ok(()) => handler.create_response(command_id, ResponseStatus::Success, None, None),
        Err(e) => handler.create_response(
            command_id,
            ResponseStatus::Rejected,
            Some(&e.to_string()),
            None,
        ),
    }
}
