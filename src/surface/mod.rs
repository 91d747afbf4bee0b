//! # Control Surface
//!
//! The boundary through which user-facing surfaces (touch display, remote app,
//! local console) drive the controller. Surfaces never touch the modem or the
//! state lock: they submit [`ControlCommand`]s and render [`SurfaceEvent`]s
//! received from [`GateController::subscribe`](crate::gate::GateController::subscribe).
//!
//! Commands are fire-and-forget. A surface sees the outcome through a later
//! `StatusChanged` event, never as a return value.

pub mod console;

use serde::{Deserialize, Serialize};

use crate::gate::GateSnapshot;

/// A user intent arriving from any surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ControlCommand {
    Open,
    Close,
    Status,
    Momentary,
    SetAutoClose { hour: u32, minute: u32 },
}

/// Controller to surface notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SurfaceEvent {
    StatusChanged { snapshot: GateSnapshot },
    /// Seconds left on the momentary countdown; `None` once it is cleared.
    Countdown { remaining: Option<u32> },
    /// Periodic full refresh: modem readiness plus the newest log lines.
    Refresh { modem_ready: bool, log_block: String },
}
