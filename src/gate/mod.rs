//! # Gate State Machine
//!
//! Command kinds and payloads ([`command`]), the pure state and its
//! transitions ([`state`]) and the [`GateController`] aggregate that drives
//! them from triggers, dispatch results and scheduler ticks ([`controller`]).

pub mod command;
pub mod controller;
pub mod state;

pub use command::{CommandKind, CommandRequest, GatePayloads};
pub use controller::{ControllerSettings, GateController};
pub use state::{AutoCloseSchedule, GatePhase, GateSnapshot, GateState, MomentaryTick};
