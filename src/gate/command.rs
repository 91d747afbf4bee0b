//! Gate command kinds and their SMS payloads.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Open,
    Close,
    Status,
}

impl CommandKind {
    pub fn label(&self) -> &'static str {
        match self {
            CommandKind::Open => "open",
            CommandKind::Close => "close",
            CommandKind::Status => "status",
        }
    }
}

/// Fixed SMS bodies understood by the gate's GSM controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatePayloads {
    pub status: String,
    pub open: String,
    pub close: String,
}

impl Default for GatePayloads {
    fn default() -> Self {
        Self {
            status: "*22#".to_string(),
            open: "1234#2#".to_string(),
            close: "1234#3#".to_string(),
        }
    }
}

impl GatePayloads {
    pub fn for_kind(&self, kind: CommandKind) -> &str {
        match kind {
            CommandKind::Open => &self.open,
            CommandKind::Close => &self.close,
            CommandKind::Status => &self.status,
        }
    }
}

/// One SMS command addressed to the gate. Built per dispatch, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub kind: CommandKind,
    pub payload: String,
    pub number: String,
}

impl CommandRequest {
    pub fn new(kind: CommandKind, payloads: &GatePayloads, number: &str) -> Self {
        Self {
            kind,
            payload: payloads.for_kind(kind).to_string(),
            number: number.to_string(),
        }
    }
}
