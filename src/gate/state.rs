//! Gate state and its transitions.
//!
//! ```text
//! Idle | AwaitingReply ──trigger{Open,Close,Status}──▶ AwaitingReply(kind)
//! Idle | AwaitingReply ──trigger momentary──▶ Arming ──open ok──▶ MomentaryOpen(n)
//!                                               └─────open failed──▶ Idle
//! MomentaryOpen(n) ──tick──▶ MomentaryOpen(n-1) … ──tick at 1──▶ Idle (+ Close dispatch)
//! ```
//!
//! Every method here is synchronous and runs under the controller's state
//! lock. The methods that decide whether to dispatch (`try_arm_momentary`,
//! `tick_momentary`, `take_auto_close`) update the state in the same call,
//! so two callers can never both win.

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::Serialize;

use super::command::CommandKind;
use crate::error::GateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum GatePhase {
    Idle,
    AwaitingReply { kind: CommandKind },
    /// Open for a momentary cycle dispatched, result pending.
    Arming,
    MomentaryOpen { remaining: u32 },
}

/// Daily local time-of-day at which the gate is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AutoCloseSchedule {
    hour: u32,
    minute: u32,
}

impl AutoCloseSchedule {
    pub fn new(hour: u32, minute: u32) -> Result<Self, GateError> {
        if hour > 23 || minute > 59 {
            return Err(GateError::InvalidSchedule { hour, minute });
        }
        Ok(Self { hour, minute })
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    pub fn minute(&self) -> u32 {
        self.minute
    }

    pub fn label(&self) -> String {
        format!("{}:{:02}", self.hour, self.minute)
    }

    pub fn matches(&self, local: &NaiveDateTime) -> bool {
        local.hour() == self.hour && local.minute() == self.minute
    }
}

/// What a countdown tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MomentaryTick {
    /// No momentary cycle running.
    Inactive,
    Counting(u32),
    /// Countdown hit zero; the caller must dispatch Close.
    Expired,
}

#[derive(Debug, Clone)]
pub struct GateState {
    pub status_text: String,
    pub phase: GatePhase,
    pub auto_close: AutoCloseSchedule,
    pub last_auto_close_date: Option<NaiveDate>,
    pub last_reply: Option<String>,
}

fn in_progress_text(kind: CommandKind) -> &'static str {
    match kind {
        CommandKind::Open => "Sending open...",
        CommandKind::Close => "Sending close...",
        CommandKind::Status => "Sending status request...",
    }
}

fn sent_text(kind: CommandKind) -> &'static str {
    match kind {
        CommandKind::Open => "Opening gate...",
        CommandKind::Close => "Closing gate...",
        CommandKind::Status => "Checking status...",
    }
}

fn failed_text(kind: CommandKind) -> &'static str {
    match kind {
        CommandKind::Open => "Failed to send open",
        CommandKind::Close => "Failed to send close",
        CommandKind::Status => "Failed to check status",
    }
}

fn countdown_text(remaining: u32) -> String {
    format!("Momentary - closing in {}s", remaining)
}

impl GateState {
    pub fn new(auto_close: AutoCloseSchedule) -> Self {
        Self {
            status_text: "Ready".to_string(),
            phase: GatePhase::Idle,
            auto_close,
            last_auto_close_date: None,
            last_reply: None,
        }
    }

    pub fn momentary_active(&self) -> bool {
        matches!(self.phase, GatePhase::MomentaryOpen { .. })
    }

    /// Seconds left on the momentary countdown; zero when none is running.
    pub fn countdown(&self) -> u32 {
        match self.phase {
            GatePhase::MomentaryOpen { remaining } => remaining,
            _ => 0,
        }
    }

    /// A plain trigger is about to dispatch. A running momentary cycle keeps its phase.
    pub fn begin_command(&mut self, kind: CommandKind) {
        self.status_text = in_progress_text(kind).to_string();
        if matches!(self.phase, GatePhase::Idle | GatePhase::AwaitingReply { .. }) {
            self.phase = GatePhase::AwaitingReply { kind };
        }
    }

    pub fn finish_command(&mut self, kind: CommandKind, success: bool) {
        if success {
            self.status_text = sent_text(kind).to_string();
        } else {
            self.status_text = failed_text(kind).to_string();
            if self.phase == (GatePhase::AwaitingReply { kind }) {
                self.phase = GatePhase::Idle;
            }
        }
    }

    /// Claim the momentary cycle. Returns false (and changes nothing) when one
    /// is already arming or counting down.
    pub fn try_arm_momentary(&mut self) -> bool {
        if matches!(self.phase, GatePhase::Arming | GatePhase::MomentaryOpen { .. }) {
            return false;
        }
        self.phase = GatePhase::Arming;
        self.status_text = "Sending momentary open...".to_string();
        true
    }

    pub fn finish_arming(&mut self, success: bool, seconds: u32) {
        if success {
            self.phase = GatePhase::MomentaryOpen { remaining: seconds };
            self.status_text = countdown_text(seconds);
        } else {
            self.phase = GatePhase::Idle;
            self.status_text = failed_text(CommandKind::Open).to_string();
        }
    }

    /// Decrement the countdown. Reaching zero clears the cycle in the same call.
    pub fn tick_momentary(&mut self) -> MomentaryTick {
        let GatePhase::MomentaryOpen { remaining } = self.phase else {
            return MomentaryTick::Inactive;
        };
        let left = remaining.saturating_sub(1);
        if left == 0 {
            self.phase = GatePhase::Idle;
            self.status_text = "Momentary - closing now".to_string();
            MomentaryTick::Expired
        } else {
            self.phase = GatePhase::MomentaryOpen { remaining: left };
            self.status_text = countdown_text(left);
            MomentaryTick::Counting(left)
        }
    }

    pub fn finish_momentary_close(&mut self, success: bool) {
        self.status_text = if success {
            "Gate closed (momentary)".to_string()
        } else {
            "Failed to auto-close!".to_string()
        };
    }

    /// True at most once per local calendar date, during the configured minute.
    /// Records the date before returning true.
    pub fn take_auto_close(&mut self, local: &NaiveDateTime) -> bool {
        let today = local.date();
        if !self.auto_close.matches(local) || self.last_auto_close_date == Some(today) {
            return false;
        }
        self.last_auto_close_date = Some(today);
        true
    }

    pub fn finish_auto_close(&mut self, success: bool) {
        self.status_text = if success {
            format!("Scheduled close ({})", self.auto_close.label())
        } else {
            "Scheduled close failed!".to_string()
        };
    }

    /// Inbound replies are informational; the phase is left alone.
    pub fn record_reply(&mut self, message: &str) {
        self.last_reply = Some(message.to_string());
        self.status_text = format!("Gate: {}", message);
    }

    /// Text for displays: the countdown while momentary, otherwise the status text.
    pub fn display_status(&self) -> String {
        match self.phase {
            GatePhase::MomentaryOpen { remaining } => format!("MOMENTARY - closing in {}s", remaining),
            _ => self.status_text.clone(),
        }
    }

    pub fn snapshot(&self, modem_ready: bool) -> GateSnapshot {
        GateSnapshot {
            status_text: self.status_text.clone(),
            display_status: self.display_status(),
            phase: self.phase,
            momentary_active: self.momentary_active(),
            momentary_countdown_seconds: self.countdown(),
            auto_close_hour: self.auto_close.hour(),
            auto_close_minute: self.auto_close.minute(),
            last_auto_close_date: self.last_auto_close_date,
            last_reply: self.last_reply.clone(),
            modem_ready,
        }
    }
}

/// Read-only copy of the gate state for control surfaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateSnapshot {
    pub status_text: String,
    pub display_status: String,
    pub phase: GatePhase,
    pub momentary_active: bool,
    pub momentary_countdown_seconds: u32,
    pub auto_close_hour: u32,
    pub auto_close_minute: u32,
    pub last_auto_close_date: Option<NaiveDate>,
    pub last_reply: Option<String>,
    pub modem_ready: bool,
}
