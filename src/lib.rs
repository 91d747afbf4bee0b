//! # smsgate - SMS Gate Controller
//!
//! smsgate drives a GSM-controlled gate opener. It talks AT commands to a GSM
//! modem over a serial link, sends the gate's fixed SMS command payloads
//! (open, close, status), reads the gate's SMS replies, and runs a momentary
//! open/auto-close cycle plus a daily scheduled close.
//!
//! ## Features
//!
//! - **Single-writer modem access**: every AT exchange runs under one gateway lock, behind one dispatch queue.
//! - **Resilient device handling**: I/O failures mark the modem not-ready; a reconnect tick keeps retrying forever.
//! - **Momentary open**: open now, close automatically after a countdown.
//! - **Daily auto-close**: fires at most once per local calendar day.
//! - **Activity log**: bounded, timestamped, file-backed event history.
//! - **Control surfaces**: commands in, [`surface::SurfaceEvent`]s out, plus a stdin console.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use smsgate::config::Config;
//! use smsgate::gate::{AutoCloseSchedule, ControllerSettings, GateController};
//! use smsgate::gateway::CommandGateway;
//! use smsgate::modem::SerialPortOpener;
//! use smsgate::storage::ActivityLog;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let opener = SerialPortOpener::new(&config.modem.port, config.modem.baud_rate);
//!     let gateway = Arc::new(CommandGateway::new(
//!         Box::new(opener),
//!         config.modem.timing(),
//!         config.modem.strict_send_confirmation,
//!     ));
//!     let log = Arc::new(ActivityLog::open(
//!         &config.activity_log.path,
//!         config.activity_log.capacity,
//!         config.gate.utc_offset(),
//!     ));
//!     let schedule = AutoCloseSchedule::new(config.gate.auto_close_hour, config.gate.auto_close_minute)?;
//!     let controller = GateController::start(gateway, log, ControllerSettings::from_config(&config), schedule);
//!     controller.initialize_modem().await;
//!     controller.trigger_status().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`modem`] - serial session, AT handshake and raw reads/writes
//! - [`gateway`] - exclusive modem owner, SMS send/poll, dispatch queue
//! - [`gate`] - gate state machine and the [`gate::GateController`] aggregate
//! - [`storage`] - bounded activity log
//! - [`scheduler`] - periodic tick tasks
//! - [`surface`] - control surface commands/events and the console adapter
//! - [`config`] - TOML configuration
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐   ControlCommand   ┌──────────────────┐
//! │ Control surfaces │ ─────────────────▶ │  GateController  │ ◀── Scheduler ticks
//! └──────────────────┘ ◀───────────────── └──────────────────┘
//!                         SurfaceEvent             │
//!                                         ┌──────────────────┐
//!                                         │  Dispatch queue  │ one worker
//!                                         └──────────────────┘
//!                                                  │
//!                                         ┌──────────────────┐
//!                                         │  CommandGateway  │ exclusive lock
//!                                         └──────────────────┘
//!                                                  │
//!                                         ┌──────────────────┐
//!                                         │   ModemSession   │ serial / AT
//!                                         └──────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod gate;
pub mod gateway;
pub mod logutil;
pub mod modem;
pub mod scheduler;
pub mod storage;
pub mod surface;
