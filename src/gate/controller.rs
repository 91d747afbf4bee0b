//! The `GateController` aggregate.
//!
//! Holds the gateway, the dispatch queue handle, the gate state, the activity
//! log and the surface event channel. It is cheap to clone and every task
//! (scheduler ticks, console, remote adapters) works on its own clone.
//!
//! The state lock is a plain `std::sync::Mutex` and is never held across an
//! `.await`: a trigger takes the lock to decide and mark, releases it for the
//! dispatch, then takes it again to record the result.

use chrono::{DateTime, FixedOffset, Utc};
use log::{debug, warn};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;

use super::command::{CommandKind, CommandRequest, GatePayloads};
use super::state::{AutoCloseSchedule, GateSnapshot, GateState, MomentaryTick};
use crate::config::Config;
use crate::error::GateError;
use crate::gateway::dispatch::{start_dispatcher, DispatchHandle, DispatchStats};
use crate::gateway::{CommandGateway, DispatchResult};
use crate::storage::{ActivityLog, LogEntry};
use crate::surface::{ControlCommand, SurfaceEvent};

const EVENT_CAPACITY: usize = 64;

/// Fixed parameters the controller is built with.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub phone_number: String,
    pub payloads: GatePayloads,
    pub utc_offset: FixedOffset,
    pub momentary_seconds: u32,
    /// Lines included in each periodic `Refresh` event.
    pub block_lines: usize,
}

impl ControllerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            phone_number: config.gate.phone_number.clone(),
            payloads: config.gate.payloads(),
            utc_offset: config.gate.utc_offset(),
            momentary_seconds: config.gate.momentary_seconds,
            block_lines: config.activity_log.block_lines,
        }
    }
}

struct ControllerInner {
    gateway: Arc<CommandGateway>,
    dispatcher: DispatchHandle,
    state: Mutex<GateState>,
    log: Arc<ActivityLog>,
    events: broadcast::Sender<SurfaceEvent>,
    settings: ControllerSettings,
}

#[derive(Clone)]
pub struct GateController {
    inner: Arc<ControllerInner>,
}

impl std::fmt::Debug for GateController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GateController")
            .field("device", &self.inner.gateway.device_label())
            .field("settings", &self.inner.settings)
            .finish()
    }
}

impl GateController {
    /// Build the controller and spawn its dispatch worker. Does not touch the
    /// modem; call [`initialize_modem`](Self::initialize_modem) for that.
    pub fn start(
        gateway: Arc<CommandGateway>,
        log: Arc<ActivityLog>,
        settings: ControllerSettings,
        auto_close: AutoCloseSchedule,
    ) -> Self {
        let dispatcher = start_dispatcher(gateway.clone());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(ControllerInner {
                gateway,
                dispatcher,
                state: Mutex::new(GateState::new(auto_close)),
                log,
                events,
                settings,
            }),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, GateState> {
        self.inner.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut GateState) -> R) -> R {
        let mut guard = self.lock_state();
        f(&mut guard)
    }

    fn emit(&self, event: SurfaceEvent) {
        // No subscribers is fine; surfaces come and go.
        let _ = self.inner.events.send(event);
    }

    fn emit_status(&self) {
        let snapshot = self.state();
        self.emit(SurfaceEvent::StatusChanged { snapshot });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SurfaceEvent> {
        self.inner.events.subscribe()
    }

    pub fn gateway(&self) -> &Arc<CommandGateway> {
        &self.inner.gateway
    }

    pub fn activity_log(&self) -> &Arc<ActivityLog> {
        &self.inner.log
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.inner.settings
    }

    /// Run one command through the dispatch queue and log the result.
    async fn dispatch(&self, kind: CommandKind) -> DispatchResult {
        let settings = &self.inner.settings;
        let request = CommandRequest::new(kind, &settings.payloads, &settings.phone_number);
        let payload = request.payload.clone();
        let result = match self.inner.dispatcher.dispatch(request).await {
            Ok(result) => result,
            Err(e) => {
                warn!("{} dispatch not run: {}", kind.label(), e);
                DispatchResult::failed(e.to_string())
            }
        };
        self.inner.log.append(&result.log_line(&payload));
        result
    }

    async fn trigger(&self, kind: CommandKind, event: &str) -> DispatchResult {
        self.inner.log.append(event);
        self.with_state(|s| s.begin_command(kind));
        self.emit_status();
        let result = self.dispatch(kind).await;
        self.with_state(|s| s.finish_command(kind, result.success));
        self.emit_status();
        result
    }

    pub async fn trigger_open(&self) -> DispatchResult {
        self.trigger(CommandKind::Open, "OPEN command triggered").await
    }

    pub async fn trigger_close(&self) -> DispatchResult {
        self.trigger(CommandKind::Close, "CLOSE command triggered").await
    }

    pub async fn trigger_status(&self) -> DispatchResult {
        self.trigger(CommandKind::Status, "STATUS check triggered").await
    }

    /// Open, then close after the configured countdown. Returns `None` without
    /// dispatching when a momentary cycle is already arming or running.
    pub async fn trigger_momentary(&self) -> Option<DispatchResult> {
        if !self.with_state(|s| s.try_arm_momentary()) {
            debug!("momentary already active, ignoring trigger");
            return None;
        }
        self.inner.log.append("MOMENTARY open triggered");
        self.emit_status();

        let seconds = self.inner.settings.momentary_seconds;
        let result = self.dispatch(CommandKind::Open).await;
        self.with_state(|s| s.finish_arming(result.success, seconds));
        self.emit_status();
        if result.success {
            self.emit(SurfaceEvent::Countdown {
                remaining: Some(seconds),
            });
        }
        Some(result)
    }

    /// One second of momentary countdown. Dispatches Close when it expires.
    pub async fn momentary_tick(&self) -> MomentaryTick {
        let tick = self.with_state(|s| s.tick_momentary());
        match tick {
            MomentaryTick::Inactive => {}
            MomentaryTick::Counting(remaining) => {
                self.emit(SurfaceEvent::Countdown {
                    remaining: Some(remaining),
                });
                self.emit_status();
            }
            MomentaryTick::Expired => {
                self.emit(SurfaceEvent::Countdown { remaining: None });
                self.emit_status();
                self.inner.log.append("MOMENTARY auto-close triggered");
                let result = self.dispatch(CommandKind::Close).await;
                self.with_state(|s| s.finish_momentary_close(result.success));
                self.emit_status();
            }
        }
        tick
    }

    pub async fn check_auto_close(&self) -> Option<DispatchResult> {
        self.check_auto_close_at(Utc::now()).await
    }

    /// Fire the daily close if `now` falls in the configured local minute and
    /// it has not fired yet today.
    pub async fn check_auto_close_at(&self, now: DateTime<Utc>) -> Option<DispatchResult> {
        let local = now.with_timezone(&self.inner.settings.utc_offset).naive_local();
        let label = {
            let mut state = self.lock_state();
            if !state.take_auto_close(&local) {
                return None;
            }
            state.auto_close.label()
        };
        self.inner
            .log
            .append(&format!("SCHEDULED auto-close ({})", label));
        let result = self.dispatch(CommandKind::Close).await;
        self.with_state(|s| s.finish_auto_close(result.success));
        self.emit_status();
        Some(result)
    }

    /// Hand every pending inbound SMS to the state machine. Returns how many
    /// were processed.
    pub async fn poll_replies(&self) -> usize {
        let mut handled = 0;
        while let Some(message) = self.inner.gateway.poll_incoming().await {
            self.inner.log.append(&format!("SMS received: {}", message));
            self.with_state(|s| s.record_reply(&message));
            self.emit_status();
            handled += 1;
        }
        handled
    }

    pub fn set_auto_close(&self, hour: u32, minute: u32) -> Result<(), GateError> {
        let schedule = AutoCloseSchedule::new(hour, minute)?;
        self.with_state(|s| s.auto_close = schedule);
        self.inner
            .log
            .append(&format!("Auto-close set to {}", schedule.label()));
        self.emit_status();
        Ok(())
    }

    pub fn state(&self) -> GateSnapshot {
        let ready = self.inner.gateway.is_ready();
        self.lock_state().snapshot(ready)
    }

    pub fn log_tail(&self, k: usize) -> Vec<LogEntry> {
        self.inner.log.tail(k)
    }

    /// Open the modem session (startup, or after it was lost).
    pub async fn initialize_modem(&self) -> bool {
        match self.inner.gateway.try_reconnect().await {
            Ok(()) => {
                self.inner.log.append("Modem initialized successfully");
                true
            }
            Err(e) => {
                self.inner
                    .log
                    .append(&format!("Modem initialization failed: {}", e));
                false
            }
        }
    }

    /// Reconnect tick: only acts while the modem is not ready.
    pub async fn reconnect_if_needed(&self) -> bool {
        if self.inner.gateway.is_ready() {
            return false;
        }
        self.inner.log.append("Attempting modem reconnection...");
        let ok = self.initialize_modem().await;
        self.emit_status();
        ok
    }

    /// Display tick: push readiness and the newest log lines to surfaces.
    pub fn refresh_display(&self) {
        let log_block = self.inner.log.recent_block(self.inner.settings.block_lines);
        self.emit(SurfaceEvent::Refresh {
            modem_ready: self.inner.gateway.is_ready(),
            log_block,
        });
    }

    /// Run a surface command to completion.
    pub async fn execute(&self, command: ControlCommand) -> Result<(), GateError> {
        match command {
            ControlCommand::Open => {
                self.trigger_open().await;
            }
            ControlCommand::Close => {
                self.trigger_close().await;
            }
            ControlCommand::Status => {
                self.trigger_status().await;
            }
            ControlCommand::Momentary => {
                self.trigger_momentary().await;
            }
            ControlCommand::SetAutoClose { hour, minute } => self.set_auto_close(hour, minute)?,
        }
        Ok(())
    }

    /// Fire-and-forget entry point for surfaces: the command runs on its own
    /// task so a slow send never blocks input handling.
    pub fn submit(&self, command: ControlCommand) -> tokio::task::JoinHandle<()> {
        let controller = self.clone();
        tokio::spawn(async move {
            if let Err(e) = controller.execute(command).await {
                warn!("Control command {:?} rejected: {}", command, e);
            }
        })
    }

    pub async fn dispatch_stats(&self) -> Option<DispatchStats> {
        self.inner.dispatcher.snapshot().await
    }

    /// Stop the dispatch worker. Queued jobs ahead of the stop still run;
    /// the returned counters include them.
    pub async fn shutdown(&self) -> Option<DispatchStats> {
        self.inner.dispatcher.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModemError;
    use crate::modem::{ModemPort, ModemTiming, PortOpener};
    use chrono::TimeZone;
    use tempfile::TempDir;

    struct NoDevice;

    impl PortOpener for NoDevice {
        fn open_port(&self) -> Result<Box<dyn ModemPort>, ModemError> {
            Err(ModemError::OpenFailed {
                port: "/dev/null-modem".into(),
                reason: "absent".into(),
            })
        }
        fn describe(&self) -> String {
            "absent".into()
        }
    }

    fn controller(dir: &TempDir) -> GateController {
        let offset = FixedOffset::east_opt(-5 * 3600).unwrap();
        let gateway = Arc::new(CommandGateway::new(
            Box::new(NoDevice),
            ModemTiming::immediate(),
            false,
        ));
        let log = Arc::new(ActivityLog::open(dir.path().join("gate_log.txt"), 100, offset));
        let settings = ControllerSettings {
            phone_number: "5550100".into(),
            payloads: GatePayloads::default(),
            utc_offset: offset,
            momentary_seconds: 60,
            block_lines: 20,
        };
        GateController::start(gateway, log, settings, AutoCloseSchedule::new(22, 0).unwrap())
    }

    #[tokio::test]
    async fn not_ready_trigger_reports_failure() {
        let dir = TempDir::new().unwrap();
        let c = controller(&dir);
        assert!(!c.initialize_modem().await);
        let r = c.trigger_open().await;
        assert!(!r.success);
        assert_eq!(c.state().status_text, "Failed to send open");
        let texts: Vec<_> = c.log_tail(3).into_iter().map(|e| e.text).collect();
        assert_eq!(texts[0], "SMS failed: Modem not ready");
        assert_eq!(texts[1], "OPEN command triggered");
    }

    #[tokio::test]
    async fn failed_momentary_can_be_retried() {
        let dir = TempDir::new().unwrap();
        let c = controller(&dir);
        assert!(c.trigger_momentary().await.is_some());
        assert!(!c.state().momentary_active);
        assert!(c.trigger_momentary().await.is_some());
    }

    #[tokio::test]
    async fn set_auto_close_validates_and_logs() {
        let dir = TempDir::new().unwrap();
        let c = controller(&dir);
        assert!(matches!(
            c.set_auto_close(25, 0),
            Err(GateError::InvalidSchedule { hour: 25, minute: 0 })
        ));
        c.set_auto_close(6, 30).unwrap();
        let snap = c.state();
        assert_eq!((snap.auto_close_hour, snap.auto_close_minute), (6, 30));
        assert_eq!(c.log_tail(1)[0].text, "Auto-close set to 6:30");
    }

    #[tokio::test]
    async fn auto_close_uses_local_offset() {
        let dir = TempDir::new().unwrap();
        let c = controller(&dir);
        // 03:00 UTC is 22:00 at UTC-5
        let fired = c
            .check_auto_close_at(Utc.with_ymd_and_hms(2024, 5, 2, 3, 0, 0).unwrap())
            .await;
        assert!(fired.is_some());
        assert_eq!(c.state().status_text, "Scheduled close failed!");
        assert!(c
            .check_auto_close_at(Utc.with_ymd_and_hms(2024, 5, 2, 3, 0, 30).unwrap())
            .await
            .is_none());
    }

    #[tokio::test]
    async fn refresh_emits_log_block() {
        let dir = TempDir::new().unwrap();
        let c = controller(&dir);
        let mut rx = c.subscribe();
        c.refresh_display();
        match rx.recv().await.unwrap() {
            SurfaceEvent::Refresh {
                modem_ready,
                log_block,
            } => {
                assert!(!modem_ready);
                assert_eq!(log_block, "No log entries yet.");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
