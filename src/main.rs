//! Binary entrypoint for the smsgate CLI.
//!
//! Commands:
//! - `start [--port <path>]` - run the gate controller with the stdin console
//! - `init` - write a starter `config.toml`
//! - `status` - print a JSON summary of the configuration and newest log lines
//! - `log [-n <count>]` - print the newest activity log entries
//! - `smoke-test --port <path> [-b <baud>]` - open the modem and run the AT handshake
//!
//! See the library crate docs for module-level details: `smsgate::`.
use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::path::Path;
use std::sync::Arc;

use smsgate::config::Config;
use smsgate::gate::{AutoCloseSchedule, ControllerSettings, GateController};
use smsgate::gateway::CommandGateway;
use smsgate::modem::{ModemSession, SerialPortOpener};
use smsgate::scheduler::spawn_ticks;
use smsgate::storage::ActivityLog;
use smsgate::surface::console::run_console;

#[derive(Parser)]
#[command(name = "smsgate")]
#[command(about = "Gate controller driving a GSM modem over SMS")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gate controller
    Start {
        /// Modem serial port (e.g., /dev/ttyUSB2)
        #[arg(short, long)]
        port: Option<String>,
    },
    /// Write a default configuration file
    Init,
    /// Show configuration summary and recent activity
    Status,
    /// Print the newest activity log entries
    Log {
        /// Number of entries
        #[arg(short = 'n', long)]
        lines: Option<usize>,
    },
    /// Open the modem and run the AT handshake, then exit
    SmokeTest {
        /// Modem serial port
        #[arg(short, long)]
        port: String,
        /// Baud rate
        #[arg(short = 'b', long, default_value_t = 115200)]
        baud: u32,
    },
}

/// Config file, or defaults when it does not exist, with env overrides applied.
async fn load_config(path: &str) -> Result<Config> {
    let mut config = if Path::new(path).exists() {
        Config::load(path).await?
    } else {
        warn!("Config file {} not found, using defaults", path);
        Config::default()
    };
    config.apply_env_overrides();
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let pre_config = match cli.command {
        Commands::Init => None,
        _ => load_config(&cli.config).await.ok(),
    };
    init_logging(&pre_config, cli.verbose);

    match cli.command {
        Commands::Start { port } => {
            let mut config = match pre_config {
                Some(c) => c,
                None => load_config(&cli.config).await?,
            };
            if let Some(port) = port {
                config.modem.port = port;
            }
            config.validate()?;
            run_controller(config).await?;
            // A blocked stdin read would otherwise hold runtime shutdown open.
            std::process::exit(0);
        }
        Commands::Init => {
            if Path::new(&cli.config).exists() {
                warn!("{} already exists, leaving it untouched", cli.config);
                return Ok(());
            }
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);
        }
        Commands::Status => {
            let config = match pre_config {
                Some(c) => c,
                None => load_config(&cli.config).await?,
            };
            let log = open_activity_log(&config);
            let payload = serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "modem": {
                    "port": config.modem.port,
                    "baud_rate": config.modem.baud_rate,
                    "strict_send_confirmation": config.modem.strict_send_confirmation,
                },
                "gate": {
                    "phone_number": config.gate.phone_number,
                    "momentary_seconds": config.gate.momentary_seconds,
                    "auto_close": format!("{}:{:02}", config.gate.auto_close_hour, config.gate.auto_close_minute),
                    "utc_offset_hours": config.gate.utc_offset_hours,
                },
                "activity_log": {
                    "path": config.activity_log.path,
                    "capacity": config.activity_log.capacity,
                    "recent": log
                        .tail(config.activity_log.tail_lines)
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>(),
                },
            });
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        Commands::Log { lines } => {
            let config = match pre_config {
                Some(c) => c,
                None => load_config(&cli.config).await?,
            };
            let log = open_activity_log(&config);
            for entry in log.tail(lines.unwrap_or(config.activity_log.block_lines)) {
                println!("{}", entry);
            }
        }
        Commands::SmokeTest { port, baud } => {
            let timing = pre_config
                .as_ref()
                .map(|c| c.modem.timing())
                .unwrap_or_default();
            info!("Starting smoke test on {} @ {} baud", port, baud);
            let opener = SerialPortOpener::new(&port, baud);
            let result = ModemSession::connect(&opener, timing).await;
            let payload = match &result {
                Ok(session) => serde_json::json!({
                    "status": "ok",
                    "device": session.label(),
                }),
                Err(e) => serde_json::json!({
                    "status": "failed",
                    "device": format!("{} @ {} baud", port, baud),
                    "error": e.to_string(),
                }),
            };
            println!("{}", payload);
            std::process::exit(if result.is_ok() { 0 } else { 1 });
        }
    }

    Ok(())
}

fn open_activity_log(config: &Config) -> ActivityLog {
    ActivityLog::open(
        &config.activity_log.path,
        config.activity_log.capacity,
        config.gate.utc_offset(),
    )
}

async fn run_controller(config: Config) -> Result<()> {
    let log = Arc::new(open_activity_log(&config));
    log.append("Starting Gate Control");

    let opener = SerialPortOpener::new(&config.modem.port, config.modem.baud_rate);
    let gateway = Arc::new(CommandGateway::new(
        Box::new(opener),
        config.modem.timing(),
        config.modem.strict_send_confirmation,
    ));
    let schedule = AutoCloseSchedule::new(config.gate.auto_close_hour, config.gate.auto_close_minute)?;
    let controller = GateController::start(
        gateway,
        log,
        ControllerSettings::from_config(&config),
        schedule,
    );

    // Not fatal: the reconnect tick keeps trying.
    controller.initialize_modem().await;
    info!(
        "Gate phone {}, auto-close {}, modem {}",
        config.gate.phone_number,
        schedule.label(),
        if controller.gateway().is_ready() { "ready" } else { "not ready" }
    );

    let ticks = spawn_ticks(&controller, config.scheduler.schedule());

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    tokio::select! {
        res = run_console(&controller, stdin, stdout, config.activity_log.tail_lines) => {
            if let Err(e) = res {
                warn!("Console stopped: {}", e);
            }
            info!("Console closed, shutting down");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received, shutting down");
        }
    }

    ticks.shutdown().await;
    if let Some(stats) = controller.shutdown().await {
        info!(
            "Dispatched {} command(s), {} failed",
            stats.dispatched_total, stats.failed_total
        );
    }
    Ok(())
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity wins over the configured level
    let configured = config
        .as_ref()
        .and_then(|c| c.logging.level.parse::<log::LevelFilter>().ok())
        .unwrap_or(log::LevelFilter::Info);
    let base_level = match verbosity {
        0 => configured,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config
        .as_ref()
        .and_then(|c| c.logging.file.as_ref())
        .and_then(|file| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(file)
                .ok()
        });

    if let Some(f) = log_file {
        let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
        // Foreground: echo to the console as well as the file
        let is_tty = atty::is(atty::Stream::Stdout);
        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());
            if let Ok(mut guard) = write_mutex.lock() {
                let _ = writeln!(guard, "{}", line);
            }
            if is_tty {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            writeln!(
                fmt,
                "{} [{}] {}",
                chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
                record.level(),
                record.args()
            )
        });
    }
    let _ = builder.try_init();
}
