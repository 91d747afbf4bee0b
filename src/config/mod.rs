//! # Configuration Management Module
//!
//! Configuration for the gate controller, loaded from a TOML file with
//! sensible defaults for every option.
//!
//! ## Configuration Structure
//!
//! - [`ModemConfig`] - Serial device and AT timing settings
//! - [`GateConfig`] - Target phone number, command payloads, momentary and auto-close settings
//! - [`ActivityLogConfig`] - Durable activity log location and retention
//! - [`SchedulerConfig`] - Periodic tick intervals
//! - [`LoggingConfig`] - Diagnostic logging
//!
//! ## Usage
//!
//! ```rust,no_run
//! use smsgate::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut config = Config::load("config.toml").await?;
//!     config.apply_env_overrides();
//!     config.validate()?;
//!     println!("Modem: {} @ {}", config.modem.port, config.modem.baud_rate);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! Every section is optional; a missing section takes its defaults.
//!
//! ```toml
//! [modem]
//! port = "/dev/ttyUSB2"
//! baud_rate = 115200
//!
//! [gate]
//! phone_number = "5550100"
//! auto_close_hour = 22
//! auto_close_minute = 0
//! utc_offset_hours = -5
//! ```
//!
//! ## Environment Integration
//!
//! Precedence order: CLI args > Environment > Config file > Defaults.
//! Recognised variables: `MODEM_PORT`, `MODEM_BAUD`, `GATE_PHONE_NUMBER`, `TIMEZONE_OFFSET`.

use anyhow::{anyhow, Result};
use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::fs;

use crate::gate::command::GatePayloads;
use crate::modem::ModemTiming;
use crate::scheduler::TickSchedule;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub modem: ModemConfig,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub activity_log: ActivityLogConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModemConfig {
    pub port: String,
    pub baud_rate: u32,
    /// Delay after opening the port before the first AT command (ms).
    #[serde(default = "default_init_settle_ms")]
    pub init_settle_ms: u64,
    /// Delay between writing a command and draining its response (ms).
    #[serde(default = "default_command_settle_ms")]
    pub command_settle_ms: u64,
    /// Delay between handshake and SMS send steps (ms).
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,
    /// Wait after the Ctrl-Z terminator before reading the send response (ms).
    #[serde(default = "default_send_settle_ms")]
    pub send_settle_ms: u64,
    /// Report a send as failed unless the modem answered `OK` or `+CMGS`.
    /// Off by default: weak modems often answer with echo noise only.
    #[serde(default)]
    pub strict_send_confirmation: bool,
}

fn default_init_settle_ms() -> u64 {
    2000
}

fn default_command_settle_ms() -> u64 {
    100
}

fn default_step_delay_ms() -> u64 {
    500
}

fn default_send_settle_ms() -> u64 {
    3000
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB2".to_string(),
            baud_rate: 115200,
            init_settle_ms: default_init_settle_ms(),
            command_settle_ms: default_command_settle_ms(),
            step_delay_ms: default_step_delay_ms(),
            send_settle_ms: default_send_settle_ms(),
            strict_send_confirmation: false,
        }
    }
}

impl ModemConfig {
    pub fn timing(&self) -> ModemTiming {
        ModemTiming {
            init_settle: Duration::from_millis(self.init_settle_ms),
            command_settle: Duration::from_millis(self.command_settle_ms),
            step_delay: Duration::from_millis(self.step_delay_ms),
            send_settle: Duration::from_millis(self.send_settle_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Number of the gate's GSM controller that receives command SMS.
    pub phone_number: String,
    #[serde(default = "default_status_payload")]
    pub status_payload: String,
    #[serde(default = "default_open_payload")]
    pub open_payload: String,
    #[serde(default = "default_close_payload")]
    pub close_payload: String,
    /// Seconds a momentary open stays open before the automatic close.
    #[serde(default = "default_momentary_seconds")]
    pub momentary_seconds: u32,
    pub auto_close_hour: u32,
    pub auto_close_minute: u32,
    /// Fixed offset from UTC in hours used for the auto-close clock and log timestamps.
    pub utc_offset_hours: i32,
}

fn default_status_payload() -> String {
    "*22#".to_string()
}

fn default_open_payload() -> String {
    "1234#2#".to_string()
}

fn default_close_payload() -> String {
    "1234#3#".to_string()
}

fn default_momentary_seconds() -> u32 {
    60
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            phone_number: "9084321957".to_string(),
            status_payload: default_status_payload(),
            open_payload: default_open_payload(),
            close_payload: default_close_payload(),
            momentary_seconds: default_momentary_seconds(),
            auto_close_hour: 22,
            auto_close_minute: 0,
            utc_offset_hours: -5,
        }
    }
}

impl GateConfig {
    pub fn payloads(&self) -> GatePayloads {
        GatePayloads {
            status: self.status_payload.clone(),
            open: self.open_payload.clone(),
            close: self.close_payload.clone(),
        }
    }

    /// The configured offset, or UTC when out of range (rejected earlier by `validate`).
    pub fn utc_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_hours * 3600).unwrap_or_else(|| Utc.fix())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityLogConfig {
    pub path: String,
    /// Maximum number of entries kept on disk.
    pub capacity: usize,
    /// Entries shown by `tail` style displays.
    #[serde(default = "default_tail_lines")]
    pub tail_lines: usize,
    /// Entries included in the bulk block pushed to the remote dashboard.
    #[serde(default = "default_block_lines")]
    pub block_lines: usize,
}

fn default_tail_lines() -> usize {
    8
}

fn default_block_lines() -> usize {
    20
}

impl Default for ActivityLogConfig {
    fn default() -> Self {
        Self {
            path: "gate_log.txt".to_string(),
            capacity: 100,
            tail_lines: default_tail_lines(),
            block_lines: default_block_lines(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub momentary_tick_ms: u64,
    pub poll_ms: u64,
    pub display_refresh_ms: u64,
    pub auto_close_check_ms: u64,
    pub reconnect_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            momentary_tick_ms: 1000,
            poll_ms: 2000,
            display_refresh_ms: 10_000,
            auto_close_check_ms: 30_000,
            reconnect_ms: 60_000,
        }
    }
}

impl SchedulerConfig {
    pub fn schedule(&self) -> TickSchedule {
        TickSchedule {
            momentary: Duration::from_millis(self.momentary_tick_ms),
            poll: Duration::from_millis(self.poll_ms),
            display_refresh: Duration::from_millis(self.display_refresh_ms),
            auto_close_check: Duration::from_millis(self.auto_close_check_ms),
            reconnect: Duration::from_millis(self.reconnect_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: Some("smsgate.log".to_string()),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup. Unparsable numeric values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("MODEM_PORT") {
            self.modem.port = port;
        }
        if let Some(baud) = lookup("MODEM_BAUD") {
            match baud.trim().parse() {
                Ok(b) => self.modem.baud_rate = b,
                Err(_) => log::warn!("Ignoring invalid MODEM_BAUD '{}'", baud),
            }
        }
        if let Some(number) = lookup("GATE_PHONE_NUMBER") {
            self.gate.phone_number = number;
        }
        if let Some(offset) = lookup("TIMEZONE_OFFSET") {
            match offset.trim().parse() {
                Ok(o) => self.gate.utc_offset_hours = o,
                Err(_) => log::warn!("Ignoring invalid TIMEZONE_OFFSET '{}'", offset),
            }
        }
    }

    /// Reject values the controller cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.gate.phone_number.trim().is_empty() {
            return Err(anyhow!("gate.phone_number must not be empty"));
        }
        if self.gate.auto_close_hour > 23 || self.gate.auto_close_minute > 59 {
            return Err(anyhow!(
                "invalid auto-close time {}:{:02}",
                self.gate.auto_close_hour,
                self.gate.auto_close_minute
            ));
        }
        if !(-12..=14).contains(&self.gate.utc_offset_hours) {
            return Err(anyhow!(
                "gate.utc_offset_hours {} out of range (-12..=14)",
                self.gate.utc_offset_hours
            ));
        }
        if self.gate.momentary_seconds == 0 {
            return Err(anyhow!("gate.momentary_seconds must be at least 1"));
        }
        if self.activity_log.capacity == 0 {
            return Err(anyhow!("activity_log.capacity must be at least 1"));
        }
        let s = &self.scheduler;
        if [
            s.momentary_tick_ms,
            s.poll_ms,
            s.display_refresh_ms,
            s.auto_close_check_ms,
            s.reconnect_ms,
        ]
        .contains(&0)
        {
            return Err(anyhow!("scheduler tick periods must be non-zero"));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            modem: ModemConfig::default(),
            gate: GateConfig::default(),
            activity_log: ActivityLogConfig::default(),
            scheduler: SchedulerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.gate.open_payload, "1234#2#");
        assert_eq!(config.gate.close_payload, "1234#3#");
        assert_eq!(config.gate.status_payload, "*22#");
        assert_eq!(config.activity_log.capacity, 100);
    }

    #[test]
    fn test_minimal_toml_fills_defaults() {
        let toml_src = r#"
            [modem]
            port = "/dev/ttyS0"
            baud_rate = 9600

            [gate]
            phone_number = "5550100"
            auto_close_hour = 21
            auto_close_minute = 30
            utc_offset_hours = 1

            [logging]
            level = "debug"
        "#;
        let config: Config = toml::from_str(toml_src).unwrap();
        assert_eq!(config.modem.send_settle_ms, 3000);
        assert!(!config.modem.strict_send_confirmation);
        assert_eq!(config.gate.momentary_seconds, 60);
        assert_eq!(config.gate.open_payload, "1234#2#");
        assert_eq!(config.activity_log.path, "gate_log.txt");
        assert_eq!(config.scheduler.auto_close_check_ms, 30_000);
        assert!(config.logging.file.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_omitted_sections_use_defaults() {
        let toml_src = r#"
            [gate]
            phone_number = "5550100"
            auto_close_hour = 21
            auto_close_minute = 30
            utc_offset_hours = 1
        "#;
        let config: Config = toml::from_str(toml_src).unwrap();
        assert_eq!(config.gate.phone_number, "5550100");
        assert_eq!(config.modem.port, "/dev/ttyUSB2");
        assert_eq!(config.modem.baud_rate, 115200);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.file.as_deref(), Some("smsgate.log"));
        assert!(config.validate().is_ok());

        let empty: Config = toml::from_str("").unwrap();
        assert!(empty.validate().is_ok());
        assert_eq!(empty.gate.auto_close_hour, 22);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("MODEM_PORT", "/dev/ttyAMA0"),
            ("MODEM_BAUD", "57600"),
            ("GATE_PHONE_NUMBER", "5550199"),
            ("TIMEZONE_OFFSET", "2"),
        ]
        .into_iter()
        .collect();
        let mut config = Config::default();
        config.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.modem.port, "/dev/ttyAMA0");
        assert_eq!(config.modem.baud_rate, 57600);
        assert_eq!(config.gate.phone_number, "5550199");
        assert_eq!(config.gate.utc_offset_hours, 2);
    }

    #[test]
    fn test_invalid_env_numbers_are_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|k| match k {
            "MODEM_BAUD" => Some("fast".to_string()),
            "TIMEZONE_OFFSET" => Some("EST".to_string()),
            _ => None,
        });
        assert_eq!(config.modem.baud_rate, 115200);
        assert_eq!(config.gate.utc_offset_hours, -5);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.gate.auto_close_hour = 24;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.gate.phone_number = "  ".into();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.activity_log.capacity = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scheduler.poll_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.gate.utc_offset_hours = 20;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_utc_offset() {
        let config = Config::default();
        assert_eq!(config.gate.utc_offset().local_minus_utc(), -5 * 3600);
    }

    #[test]
    fn test_default_round_trips_through_toml() {
        let serialized = toml::to_string_pretty(&Config::default()).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.modem.port, "/dev/ttyUSB2");
        assert_eq!(parsed.gate.auto_close_hour, 22);
    }
}
