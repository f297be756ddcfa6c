// rfidlib test application -- CLI tool for exercising AT and ASCII readers
// against real hardware over serial or TCP.
//
// Usage:
//   rfidlib-test-app list
//   rfidlib-test-app --model "Pulsar LR" --port /dev/ttyUSB0 info
//   rfidlib-test-app --model "Pulsar LR" --host 192.168.2.239 inventory --duration 10
//   rfidlib-test-app --model QuasarMX --port /dev/ttyUSB0 antenna set 3
//   rfidlib-test-app --model "Pulsar LR" --port /dev/ttyUSB0 antenna mux 1,2,4
//   rfidlib-test-app --model "Pulsar LR" --port /dev/ttyUSB0 output set 2 high
//   rfidlib-test-app --model "Pulsar LR" --host 192.168.2.239 raw "AT+PWR?"

use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use rfidlib::{EventKind, Multiplex, ReaderBuilder, ReaderEvent, RfidReader};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// rfidlib test application -- exercises RFID readers from the command line.
#[derive(Parser)]
#[command(name = "rfidlib-test-app", version, about)]
struct Cli {
    /// Reader model name (see `list`). Required for all commands except `list`.
    #[arg(long)]
    model: Option<String>,

    /// Serial port path (e.g. /dev/ttyUSB0, COM3).
    #[arg(long, conflicts_with = "host")]
    port: Option<String>,

    /// Reader network address, `host` or `host:port`.
    #[arg(long)]
    host: Option<String>,

    /// Override the default baud rate for this model.
    #[arg(long)]
    baud: Option<u32>,

    /// Command timeout in milliseconds.
    #[arg(long, default_value_t = 2000)]
    timeout_ms: u64,

    /// Heartbeat interval in seconds for network links.
    #[arg(long, default_value_t = 10)]
    heartbeat: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List all supported reader models.
    List,

    /// Print reader identification.
    Info,

    /// Run continuous inventory and print tag sightings.
    Inventory {
        /// Duration in seconds.
        #[arg(long, default_value_t = 10)]
        duration: u64,
    },

    /// Run one inventory round.
    Scan,

    /// Antenna selection.
    Antenna {
        #[command(subcommand)]
        action: AntennaAction,
    },

    /// Output pins.
    Output {
        #[command(subcommand)]
        action: OutputAction,
    },

    /// Read all input pins.
    Inputs,

    /// Subscribe to reader events and print them in real time.
    Monitor {
        /// Duration in seconds (0 = run until Ctrl-C).
        #[arg(long, default_value_t = 0)]
        duration: u64,
    },

    /// Send a raw command line and print the reply.
    Raw { line: String },

    /// Reset the reader and re-initialize.
    Reset,
}

#[derive(Subcommand)]
enum AntennaAction {
    /// Query the selected antenna port.
    Get,
    /// Select one antenna port.
    Set { port: u8 },
    /// Cycle through ports: a count (`3`) or a list (`1,2,4`).
    Mux { ports: String },
}

#[derive(Subcommand)]
enum OutputAction {
    /// Read every output pin.
    Get,
    /// Drive one output pin.
    Set { pin: u8, level: Level },
}

#[derive(Clone, Copy, ValueEnum)]
enum Level {
    High,
    Low,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_multiplex(s: &str) -> Result<Multiplex> {
    let ports = s
        .split(',')
        .map(|p| p.trim().parse::<u8>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("invalid port list '{s}'"))?;
    match ports.as_slice() {
        [] => bail!("empty port list"),
        [count] => Ok(Multiplex::Count(*count)),
        _ => Ok(Multiplex::Sequence(ports)),
    }
}

fn format_levels(levels: &[bool]) -> String {
    levels
        .iter()
        .enumerate()
        .map(|(i, high)| format!("{}={}", i + 1, if *high { "HIGH" } else { "LOW" }))
        .collect::<Vec<_>>()
        .join(" ")
}

fn cmd_list() -> Result<()> {
    let models = rfidlib::supported_readers();
    let name_width = models.iter().map(|m| m.name.len()).max().unwrap_or(12).max(12);

    println!(
        "{:<name_width$}  {:<8}  {:<4}  {:>8}  {:>6}",
        "Model", "Dialect", "Band", "Antennas", "In/Out"
    );
    println!(
        "{:<name_width$}  {:<8}  {:<4}  {:>8}  {:>6}",
        "-".repeat(name_width),
        "-------",
        "----",
        "--------",
        "------"
    );
    for m in &models {
        println!(
            "{:<name_width$}  {:<8}  {:<4}  {:>8}  {:>6}",
            m.name,
            format!("{:?}", m.protocol),
            format!("{:?}", m.family),
            m.antenna_count,
            format!("{}/{}", m.input_pins, m.output_pins),
        );
    }
    println!();
    println!("{} models total.", models.len());
    Ok(())
}

async fn create_reader(cli: &Cli) -> Result<RfidReader> {
    let name = cli.model.as_deref().context("--model is required")?;
    let model = rfidlib::find_model(name)
        .with_context(|| format!("unknown model '{name}' (try `list`)"))?;

    let mut builder = ReaderBuilder::new(model)
        .command_timeout(Duration::from_millis(cli.timeout_ms))
        .heartbeat_interval(Duration::from_secs(cli.heartbeat));
    builder = match (&cli.port, &cli.host) {
        (Some(port), None) => builder.serial_port(port),
        (None, Some(host)) => builder.tcp_address(host),
        _ => bail!("give exactly one of --port or --host"),
    };
    if let Some(baud) = cli.baud {
        builder = builder.baud_rate(baud);
    }

    let reader = builder.build().await?;
    reader.connect().await.context("failed to connect")?;
    debug!(model = reader.model().name, "connected");
    Ok(reader)
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn cmd_info(reader: &RfidReader) -> Result<()> {
    let model = reader.model();
    println!("Model:      {} ({})", model.name, model.manufacturer);
    println!("Dialect:    {:?}", model.protocol);
    if let Some(id) = reader.identity().await {
        println!("Firmware:   {} {} ({})", id.firmware_name, id.firmware_version, id.firmware);
        println!("Hardware:   {} {}", id.hardware_name, id.hardware_version);
        println!("Serial:     {}", id.serial_number);
    }
    println!("Antennas:   {}", model.antenna_count);
    println!("Inputs:     {}", model.input_pins);
    println!("Outputs:    {}", model.output_pins);
    if let Some(range) = &model.power_range {
        println!("Power:      {}..={}", range.start(), range.end());
    }
    Ok(())
}

async fn cmd_inventory(reader: &RfidReader, duration_secs: u64) -> Result<()> {
    let mut inventory = reader.subscribe_to(&[EventKind::Inventory]);
    reader.start_inventory().await?;
    println!("Scanning for {duration_secs} s...");

    let deadline = Instant::now() + Duration::from_secs(duration_secs);
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match tokio::time::timeout(remaining, inventory.recv()).await {
            Ok(Some(ReaderEvent::InventoryUpdated { tags, .. })) => {
                for tag in tags {
                    let status = if tag.has_error() { tag.message() } else { "" };
                    println!(
                        "{:<32} ant={:<4} rssi={:<6} seen={:<5} {status}",
                        tag.id,
                        tag.antenna.map_or("-".into(), |a| a.to_string()),
                        tag.rssi().map_or("-".into(), |r| r.to_string()),
                        tag.seen_count,
                    );
                }
            }
            Ok(Some(_)) => {}
            Ok(None) | Err(_) => break,
        }
    }

    reader.stop_inventory().await?;
    println!("{} distinct tags.", reader.tags().await.len());
    Ok(())
}

async fn cmd_scan(reader: &RfidReader) -> Result<()> {
    let tags = reader.inventory().await?;
    if tags.is_empty() {
        println!("No tags found.");
    }
    for tag in tags {
        println!("{} {:?}", tag.id, tag.kind);
    }
    Ok(())
}

async fn cmd_monitor(reader: &RfidReader, duration_secs: u64) -> Result<()> {
    let mut events = reader.subscribe();
    println!("Monitoring reader events (Ctrl-C to stop)...");

    let deadline = (duration_secs > 0).then(|| Instant::now() + Duration::from_secs(duration_secs));
    loop {
        let timeout = match deadline {
            Some(dl) => {
                let remaining = dl.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    println!("Monitor duration elapsed.");
                    break;
                }
                remaining
            }
            None => Duration::from_secs(3600),
        };

        match tokio::time::timeout(timeout, events.recv()).await {
            Ok(Ok(event)) => println!("[event] {event:?}"),
            Ok(Err(tokio::sync::broadcast::error::RecvError::Lagged(n))) => {
                println!("[warning] missed {n} events (consumer too slow)");
            }
            Ok(Err(tokio::sync::broadcast::error::RecvError::Closed)) => {
                println!("Event channel closed.");
                break;
            }
            Err(_) => break,
        }
    }
    Ok(())
}

async fn run(reader: &RfidReader, command: &Command) -> Result<()> {
    match command {
        Command::Info => cmd_info(reader).await,
        Command::Inventory { duration } => cmd_inventory(reader, *duration).await,
        Command::Scan => cmd_scan(reader).await,
        Command::Antenna { action } => match action {
            AntennaAction::Get => {
                println!("Antenna: {}", reader.get_antenna().await?);
                Ok(())
            }
            AntennaAction::Set { port } => {
                reader.set_antenna(*port).await?;
                println!("Antenna {port} selected.");
                Ok(())
            }
            AntennaAction::Mux { ports } => {
                reader.set_antenna_multiplex(parse_multiplex(ports)?).await?;
                println!("Multiplex: {:?}", reader.get_antenna_multiplex().await?);
                Ok(())
            }
        },
        Command::Output { action } => match action {
            OutputAction::Get => {
                println!("{}", format_levels(&reader.get_outputs().await?));
                Ok(())
            }
            OutputAction::Set { pin, level } => {
                reader.set_output(*pin, matches!(level, Level::High)).await?;
                Ok(())
            }
        },
        Command::Inputs => {
            println!("{}", format_levels(&reader.get_inputs().await?));
            Ok(())
        }
        Command::Monitor { duration } => cmd_monitor(reader, *duration).await,
        Command::Raw { line } => {
            let reply = reader.execute(line).await?;
            for l in &reply.lines {
                println!("{l}");
            }
            println!("OK");
            Ok(())
        }
        Command::Reset => {
            reader.reset().await?;
            println!("Reader reset.");
            Ok(())
        }
        Command::List => unreachable!("list handled before connecting"),
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();

    // `list` does not need a reader.
    if matches!(cli.command, Command::List) {
        return cmd_list();
    }

    let reader = create_reader(&cli).await?;
    let result = run(&reader, &cli.command).await;
    reader.disconnect().await.ok();
    result
}
