//! # Command Gateway
//!
//! Single point of exclusive access to the [`ModemSession`]. Every device
//! interaction (SMS send, inbound poll, reconnect) runs under one async mutex,
//! so AT command bytes from concurrent callers never interleave on the wire.
//!
//! The gateway owns the reconnect policy and never lets a device error escape:
//! I/O failures degrade the session to not-ready and are reported as a failed
//! [`DispatchResult`], `None` or `false`.
//!
//! Command producers do not call [`CommandGateway::send_sms`] directly; they go
//! through the single dispatch queue in [`dispatch`].

pub mod dispatch;

use crate::error::GateError;
use crate::logutil::truncate_for_log;
use crate::modem::at::{self, InboundFrame};
use crate::modem::{ModemSession, ModemTiming, PortOpener};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tokio::time::sleep;

/// How a dispatch ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// The modem answered `OK` or `+CMGS`.
    Confirmed,
    /// The send completed without a recognised confirmation.
    Unconfirmed,
    /// No device I/O was attempted because the session is not ready.
    NotReady,
    /// Device I/O failed during the send.
    Failed(String),
}

/// Result of one SMS dispatch.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchResult {
    pub success: bool,
    pub outcome: DispatchOutcome,
    /// Raw modem response text, possibly partial or garbled.
    pub response: String,
    pub timestamp: DateTime<Utc>,
}

impl DispatchResult {
    pub fn not_ready() -> Self {
        Self {
            success: false,
            outcome: DispatchOutcome::NotReady,
            response: String::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            outcome: DispatchOutcome::Failed(reason.into()),
            response: String::new(),
            timestamp: Utc::now(),
        }
    }

    /// Activity log line describing this result for `payload`.
    pub fn log_line(&self, payload: &str) -> String {
        match &self.outcome {
            DispatchOutcome::Confirmed => format!("SMS sent: {}", payload),
            DispatchOutcome::Unconfirmed => format!(
                "SMS may have failed: {}",
                truncate_for_log(self.response.trim(), 120)
            ),
            DispatchOutcome::NotReady => "SMS failed: Modem not ready".to_string(),
            DispatchOutcome::Failed(reason) => format!("SMS error: {}", reason),
        }
    }
}

struct GatewayInner {
    session: Option<ModemSession>,
    /// Inbound messages found in drained bytes, not yet handed out.
    inbound: VecDeque<String>,
}

/// Exclusive owner of the modem session.
pub struct CommandGateway {
    opener: Box<dyn PortOpener>,
    timing: ModemTiming,
    strict_confirmation: bool,
    ready: AtomicBool,
    inner: Mutex<GatewayInner>,
}

impl CommandGateway {
    /// Create a gateway with no session; call [`reconnect`](Self::reconnect) to bring it up.
    pub fn new(opener: Box<dyn PortOpener>, timing: ModemTiming, strict_confirmation: bool) -> Self {
        Self {
            opener,
            timing,
            strict_confirmation,
            ready: AtomicBool::new(false),
            inner: Mutex::new(GatewayInner {
                session: None,
                inbound: VecDeque::new(),
            }),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn device_label(&self) -> String {
        self.opener.describe()
    }

    /// Drop the current session (if any) and open a new one under the lock.
    /// Idempotent; readiness reflects the outcome.
    pub async fn try_reconnect(&self) -> Result<(), GateError> {
        let mut inner = self.inner.lock().await;
        inner.session = None;
        self.ready.store(false, Ordering::SeqCst);
        match ModemSession::connect(self.opener.as_ref(), self.timing.clone()).await {
            Ok(mut session) => {
                info!("Modem ready on {}", session.label());
                queue_inbound(&mut inner.inbound, &session.take_handshake_output());
                inner.session = Some(session);
                self.ready.store(true, Ordering::SeqCst);
                Ok(())
            }
            Err(e) => {
                warn!("Modem unavailable: {}", e);
                Err(GateError::DeviceUnavailable(e.to_string()))
            }
        }
    }

    pub async fn reconnect(&self) -> bool {
        self.try_reconnect().await.is_ok()
    }

    /// Send `payload` as a text-mode SMS to `number`.
    ///
    /// Returns a not-ready result without touching the device when the session
    /// is down. A response without `OK`/`+CMGS` still counts as success unless
    /// strict confirmation is enabled.
    pub async fn send_sms(&self, number: &str, payload: &str) -> DispatchResult {
        if !self.is_ready() {
            debug!("send_sms skipped: modem not ready");
            return DispatchResult::not_ready();
        }
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let Some(session) = inner.session.as_mut() else {
            return DispatchResult::not_ready();
        };

        let timing = self.timing.clone();
        let exchange = async {
            let mut drained = session.write_raw(at::TEXT_MODE).await?;
            sleep(timing.step_delay).await;
            session.write_line(&at::send_sms_command(number))?;
            sleep(timing.step_delay).await;
            session.write_sms_body(payload)?;
            sleep(timing.send_settle).await;
            let response = session.read_available()?;
            drained.push_str(&response);
            Ok::<_, crate::error::ModemError>((drained, response))
        };

        match exchange.await {
            Ok((drained, response)) => {
                queue_inbound(&mut inner.inbound, &drained);
                let confirmed = at::is_send_confirmed(&response);
                if !confirmed {
                    debug!(
                        "No send confirmation from modem: {}",
                        truncate_for_log(&response, 200)
                    );
                }
                DispatchResult {
                    success: confirmed || !self.strict_confirmation,
                    outcome: if confirmed {
                        DispatchOutcome::Confirmed
                    } else {
                        DispatchOutcome::Unconfirmed
                    },
                    response,
                    timestamp: Utc::now(),
                }
            }
            Err(e) => {
                warn!("SMS send failed, marking modem not ready: {}", e);
                inner.session = None;
                self.ready.store(false, Ordering::SeqCst);
                DispatchResult::failed(GateError::SendFailed(e.to_string()).to_string())
            }
        }
    }

    /// Next inbound SMS body, if any. Drains the device buffer when nothing is
    /// queued. Malformed frames are dropped.
    pub async fn poll_incoming(&self) -> Option<String> {
        if !self.is_ready() {
            return None;
        }
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        if let Some(message) = inner.inbound.pop_front() {
            return Some(message);
        }
        let session = inner.session.as_mut()?;
        match session.read_available() {
            Ok(text) if !text.is_empty() => {
                queue_inbound(&mut inner.inbound, &text);
                inner.inbound.pop_front()
            }
            Ok(_) => None,
            Err(e) => {
                warn!("Modem read failed, marking not ready: {}", e);
                inner.session = None;
                self.ready.store(false, Ordering::SeqCst);
                None
            }
        }
    }
}

fn queue_inbound(queue: &mut VecDeque<String>, text: &str) {
    for frame in at::parse_inbound(text) {
        match frame {
            InboundFrame::Message(body) => queue.push_back(body),
            InboundFrame::Malformed(header) => {
                debug!("{}", GateError::MalformedReply(truncate_for_log(&header, 120)))
            }
        }
    }
}
