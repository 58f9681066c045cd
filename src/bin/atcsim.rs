use clap::{App, Arg, ArgMatches, SubCommand};
use colored::*;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use atcsim::protocol::{ControlCommand, ControlRequest, ControlResponse, ResponseStatus};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: &str = "8080";
const RESPONSE_TIMEOUT_S: u64 = 5;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("atcsim")
        .version("0.1.0")
        .author("Airport Systems Engineering Team")
        .about("🛫 Control console for the ATC simulation tower")
        .arg(
            Arg::with_name("host")
                .short("H")
                .long("host")
                .value_name("HOST")
                .help("Tower host address")
                .takes_value(true)
                .default_value(DEFAULT_HOST)
                .global(true),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("Tower port")
                .takes_value(true)
                .default_value(DEFAULT_PORT)
                .global(true),
        )
        .arg(
            Arg::with_name("format")
                .short("f")
                .long("format")
                .value_name("FORMAT")
                .help("Output format")
                .takes_value(true)
                .possible_values(&["json", "table", "compact"])
                .default_value("table")
                .global(true),
        )
        .subcommand(SubCommand::with_name("start").about("▶️  Start the simulation"))
        .subcommand(SubCommand::with_name("pause").about("⏸  Pause the simulation"))
        .subcommand(SubCommand::with_name("resume").about("⏯  Resume a paused simulation"))
        .subcommand(SubCommand::with_name("stop").about("⏹  Stop the simulation and join workers"))
        .subcommand(
            SubCommand::with_name("status")
                .about("📊 Show active flights, runway occupancy, queues, and violations"),
        )
        .subcommand(SubCommand::with_name("list-avns").about("📄 List unpaid Airspace Violation Notices"))
        .subcommand(
            SubCommand::with_name("pay-avn")
                .about("💳 Submit a payment request for an AVN")
                .arg(
                    Arg::with_name("id")
                        .help("AVN id")
                        .required(true)
                        .validator(|v| {
                            v.parse::<u32>()
                                .map(|_| ())
                                .map_err(|_| "AVN id must be a number".to_string())
                        }),
                )
                .arg(
                    Arg::with_name("amount")
                        .help("Payment amount")
                        .required(true)
                        .validator(|v| {
                            v.parse::<f64>()
                                .map(|_| ())
                                .map_err(|_| "amount must be a number".to_string())
                        }),
                ),
        )
        .subcommand(
            SubCommand::with_name("query-airline")
                .about("🏢 List AVNs issued to one airline")
                .arg(Arg::with_name("name").help("Airline name").required(true)),
        )
        .subcommand(
            SubCommand::with_name("watch")
                .about("📈 Stream live status frames from the tower"),
        )
        .get_matches();

    let host = matches.value_of("host").unwrap_or(DEFAULT_HOST);
    let port: u16 = matches.value_of("port").unwrap_or(DEFAULT_PORT).parse()?;
    let format = matches.value_of("format").unwrap_or("table");

    match matches.subcommand() {
        ("start", _) => send_and_print(host, port, format, ControlRequest::Start, "Start").await,
        ("pause", _) => send_and_print(host, port, format, ControlRequest::Pause, "Pause").await,
        ("resume", _) => send_and_print(host, port, format, ControlRequest::Resume, "Resume").await,
        ("stop", _) => send_and_print(host, port, format, ControlRequest::Stop, "Stop").await,
        ("status", _) => handle_status(host, port, format).await,
        ("list-avns", _) => handle_list_avns(host, port, format).await,
        ("pay-avn", Some(sub)) => handle_pay_avn(sub, host, port, format).await,
        ("query-airline", Some(sub)) => handle_query_airline(sub, host, port, format).await,
        ("watch", _) => handle_watch(host, port, format).await,
        _ => {
            println!("{}", "No command specified. Use --help for usage.".yellow());
            println!("{}", "Quick start:".bright_green());
            println!("  {} Launch the tower", "atcsim-tower".bright_cyan());
            println!("  {} Show the airport state", "atcsim status".bright_cyan());
            println!("  {} Stream live updates", "atcsim watch".bright_cyan());
            Ok(())
        }
    }
}

async fn handle_status(
    host: &str,
    port: u16,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let response = send_command(host, port, ControlRequest::Status).await?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&response.payload)?),
        "compact" => {
            if let Some(payload) = &response.payload {
                println!(
                    "t={}s flights={} queued={} denied={} violations={}",
                    payload["time_s"].as_f64().unwrap_or(0.0).round(),
                    payload["active_flights"].as_array().map(|a| a.len()).unwrap_or(0),
                    payload["queued_flights"].as_u64().unwrap_or(0),
                    payload["denied_flights"].as_u64().unwrap_or(0),
                    payload["total_violations"].as_u64().unwrap_or(0),
                );
            }
        }
        _ => print_status_table(&response),
    }
    Ok(())
}

fn print_status_table(response: &ControlResponse) {
    let Some(payload) = &response.payload else {
        println!("{}", "No status payload received".red());
        return;
    };

    println!("{}", "📊 Airport Status".bright_blue().bold());
    println!("{}", "═════════════════".bright_blue());
    let time_s = payload["time_s"].as_f64().unwrap_or(0.0);
    let remaining = payload["remaining_s"].as_f64().unwrap_or(0.0);
    let paused = payload["paused"].as_bool().unwrap_or(false);
    let completed = payload["completed"].as_bool().unwrap_or(false);
    let state = if completed {
        "COMPLETED".bright_green()
    } else if paused {
        "PAUSED".yellow()
    } else {
        "RUNNING".bright_green()
    };
    println!(
        "Clock: {:.0}s elapsed, {:.0}s remaining [{}]",
        time_s, remaining, state
    );

    println!("\n{}", "Runways".bright_white().bold());
    if let Some(runways) = payload["runways"].as_array() {
        for runway in runways {
            let id = runway["id"].as_str().unwrap_or("?");
            let status = runway["status"].as_str().unwrap_or("?");
            let occupant = runway["occupant"].as_str().unwrap_or("-");
            let count = runway["usage_count"].as_u64().unwrap_or(0);
            let status_col = match status {
                "Available" => status.green(),
                "InUse" => status.yellow(),
                _ => status.red(),
            };
            println!(
                "  {:<3} {:<14} occupant {:<10} used {} times",
                id, status_col, occupant, count
            );
        }
    }

    println!("\n{}", "Active flights".bright_white().bold());
    match payload["active_flights"].as_array() {
        Some(flights) if !flights.is_empty() => {
            for flight in flights {
                let emergency = flight["emergency"].as_bool().unwrap_or(false);
                let marker = if emergency { "🚨" } else { "  " };
                println!(
                    "  {} {:<8} {:<18} {:<10} {:<6} {:<16} {:>6.0} km/h {}",
                    marker,
                    flight["id"].as_str().unwrap_or("?"),
                    flight["airline"].as_str().unwrap_or("?"),
                    flight["kind"].as_str().unwrap_or("?"),
                    flight["direction"].as_str().unwrap_or("?"),
                    flight["phase"].as_str().unwrap_or("?"),
                    flight["speed_kmh"].as_f64().unwrap_or(0.0),
                    flight["runway"].as_str().unwrap_or(""),
                );
            }
        }
        _ => println!("  (none)"),
    }

    println!(
        "\nQueued: {}  Denied: {}  Violations: {}  Unpaid AVNs: {}  Cargo active: {}",
        payload["queued_flights"].as_u64().unwrap_or(0),
        payload["denied_flights"].as_u64().unwrap_or(0),
        payload["total_violations"].as_u64().unwrap_or(0),
        payload["unpaid_avns"].as_u64().unwrap_or(0),
        payload["active_cargo_flights"].as_i64().unwrap_or(0),
    );
}

async fn handle_list_avns(
    host: &str,
    port: u16,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let response = send_command(host, port, ControlRequest::ListAvns).await?;
    print_avn_list(&response, format);
    Ok(())
}

async fn handle_pay_avn(
    matches: &ArgMatches<'_>,
    host: &str,
    port: u16,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let avn_id: u32 = matches.value_of("id").unwrap_or("0").parse()?;
    let amount: f64 = matches.value_of("amount").unwrap_or("0").parse()?;
    let response =
        send_command(host, port, ControlRequest::PayAvn { avn_id, amount }).await?;
    print_action_result(&format!("Payment for AVN #{}", avn_id), &response, format);
    Ok(())
}

async fn handle_query_airline(
    matches: &ArgMatches<'_>,
    host: &str,
    port: u16,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let name = matches.value_of("name").unwrap_or("").to_string();
    let response = send_command(host, port, ControlRequest::QueryAirline { name }).await?;
    print_avn_list(&response, format);
    Ok(())
}

fn print_avn_list(response: &ControlResponse, format: &str) {
    match format {
        "json" => {
            if let Ok(json) = serde_json::to_string_pretty(&response.payload) {
                println!("{}", json);
            }
        }
        _ => {
            if let Some(message) = &response.message {
                println!("{}", message.bright_blue().bold());
            }
            let Some(avns) = response.payload.as_ref().and_then(|p| p.as_array()) else {
                return;
            };
            for avn in avns {
                let status = avn["status"].as_str().unwrap_or("?");
                let status_col = match status {
                    "Paid" => status.green(),
                    "Overdue" => status.red(),
                    _ => status.yellow(),
                };
                println!(
                    "  AVN #{} | {} flight {} | {} | speed {:.0} (bounds {:.0}-{:.0}) | total {:.2} | {}",
                    avn["avn_id"].as_u64().unwrap_or(0),
                    avn["airline"].as_str().unwrap_or("?"),
                    avn["flight_id"].as_str().unwrap_or("?"),
                    avn["phase"].as_str().unwrap_or("?"),
                    avn["recorded_speed"].as_f64().unwrap_or(0.0),
                    avn["min_speed"].as_f64().unwrap_or(0.0),
                    avn["max_speed"].as_f64().unwrap_or(0.0),
                    avn["total"].as_f64().unwrap_or(0.0),
                    status_col,
                );
            }
        }
    }
}

async fn send_and_print(
    host: &str,
    port: u16,
    format: &str,
    request: ControlRequest,
    action: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let response = send_command(host, port, request).await?;
    print_action_result(action, &response, format);
    Ok(())
}

fn print_action_result(action: &str, response: &ControlResponse, format: &str) {
    match format {
        "json" => {
            if let Ok(json) = serde_json::to_string(response) {
                println!("{}", json);
            }
        }
        "compact" => match response.status {
            ResponseStatus::Success => println!("{}", "OK".bright_green()),
            _ => println!("{}", "FAILED".bright_red()),
        },
        _ => match response.status {
            ResponseStatus::Success => {
                let detail = response.message.as_deref().unwrap_or("done");
                println!("{} {}: {}", "✅".green(), action.bright_white(), detail);
            }
            ResponseStatus::Rejected => {
                let detail = response.message.as_deref().unwrap_or("rejected");
                println!("{} {} rejected: {}", "❌".red(), action.bright_white(), detail.bright_red());
            }
            _ => {
                let detail = response.message.as_deref().unwrap_or("error");
                println!("{} {} failed: {}", "⚠️".yellow(), action.bright_white(), detail.bright_red());
            }
        },
    }
}

async fn handle_watch(
    host: &str,
    port: u16,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    println!(
        "{}",
        "📡 Watching tower status (Ctrl+C to stop)...".bright_blue().bold()
    );
    let stream = connect(host, port).await?;
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            break;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match format {
            "json" => println!("{}", trimmed),
            _ => {
                if let Ok(frame) = serde_json::from_str::<serde_json::Value>(trimmed) {
                    if frame.get("time_s").is_none() {
                        continue;
                    }
                    println!(
                        "[{:>4.0}s] flights {:>2} | queued {:>2} | denied {:>2} | violations {:>3} | cargo {}",
                        frame["time_s"].as_f64().unwrap_or(0.0),
                        frame["active_flights"].as_array().map(|a| a.len()).unwrap_or(0),
                        frame["queued_flights"].as_u64().unwrap_or(0),
                        frame["denied_flights"].as_u64().unwrap_or(0),
                        frame["total_violations"].as_u64().unwrap_or(0),
                        frame["active_cargo_flights"].as_i64().unwrap_or(0),
                    );
                }
            }
        }
    }
    Ok(())
}

async fn connect(host: &str, port: u16) -> Result<TcpStream, Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", host, port);
    match TcpStream::connect(&addr).await {
        Ok(stream) => Ok(stream),
        Err(e) => {
            eprintln!(
                "{} Failed to connect to the tower at {}",
                "❌".red(),
                addr.bright_white()
            );
            if e.kind() == std::io::ErrorKind::ConnectionRefused {
                eprintln!("{} The tower is not running. Start it with:", "💡".yellow());
                eprintln!("   {}", "atcsim-tower".bright_cyan());
            }
            Err(e.into())
        }
    }
}

async fn send_command(
    host: &str,
    port: u16,
    request: ControlRequest,
) -> Result<ControlResponse, Box<dyn std::error::Error>> {
    let command = ControlCommand {
        id: current_timestamp().max(1) as u32,
        timestamp: current_timestamp(),
        request,
    };
    let command_id = command.id;
    let json = serde_json::to_string(&command)?;

    let stream = connect(host, port).await?;
    let (reader, mut writer) = stream.into_split();

    let result = tokio::time::timeout(
        std::time::Duration::from_secs(RESPONSE_TIMEOUT_S),
        async move {
            writer.write_all(json.as_bytes()).await?;
            writer.write_all(b"\n").await?;

            // The tower interleaves status frames with responses on the
            // same stream; skip frames until our response id shows up.
            let mut buf_reader = BufReader::new(reader);
            let mut line = String::new();
            loop {
                line.clear();
                if buf_reader.read_line(&mut line).await? == 0 {
                    return Err::<ControlResponse, Box<dyn std::error::Error>>(
                        "tower closed the connection".into(),
                    );
                }
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                if let Ok(response) = serde_json::from_str::<ControlResponse>(trimmed) {
                    if response.id == command_id || response.id == 0 {
                        return Ok(response);
                    }
                }
            }
        },
    )
    .await;

    match result {
        Ok(inner) => inner,
        Err(_) => {
            eprintln!("{} No response within {}s", "⏰".yellow(), RESPONSE_TIMEOUT_S);
            Err("command timeout".into())
        }
    }
}

fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(1)
}
