//! # Scheduler
//!
//! Five independent periodic tasks drive the controller:
//!
//! | tick            | default | action                                   |
//! |-----------------|---------|------------------------------------------|
//! | momentary       | 1 s     | [`GateController::momentary_tick`]       |
//! | poll            | 2 s     | [`GateController::poll_replies`]         |
//! | display refresh | 10 s    | [`GateController::refresh_display`]      |
//! | auto-close      | 30 s    | [`GateController::check_auto_close`]     |
//! | reconnect       | 60 s    | [`GateController::reconnect_if_needed`]  |
//!
//! Each tick runs on its own task, so a multi-second modem exchange awaited by
//! one of them (a countdown-expiry close, a poll waiting for the gateway lock)
//! only delays that tick. Missed ticks are delayed, never burst.

use std::future::Future;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};

use crate::gate::GateController;

/// Tick periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickSchedule {
    pub momentary: Duration,
    pub poll: Duration,
    pub display_refresh: Duration,
    pub auto_close_check: Duration,
    pub reconnect: Duration,
}

impl Default for TickSchedule {
    fn default() -> Self {
        Self {
            momentary: Duration::from_secs(1),
            poll: Duration::from_secs(2),
            display_refresh: Duration::from_secs(10),
            auto_close_check: Duration::from_secs(30),
            reconnect: Duration::from_secs(60),
        }
    }
}

/// Running tick tasks. Dropping the handle leaves them running; call
/// [`shutdown`](Self::shutdown) to stop them.
#[derive(Debug)]
pub struct SchedulerHandle {
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl SchedulerHandle {
    pub fn task_names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|(name, _)| *name).collect()
    }

    pub async fn shutdown(self) {
        for (name, task) in self.tasks {
            task.abort();
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    log::warn!("{} tick task ended abnormally: {}", name, e);
                }
            }
        }
        log::debug!("scheduler stopped");
    }
}

fn spawn_tick<F, Fut>(name: &'static str, period: Duration, mut action: F) -> (&'static str, JoinHandle<()>)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let task = tokio::spawn(async move {
        // First tick one period from now, not immediately.
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            action().await;
        }
    });
    (name, task)
}

/// Start all five tick tasks against `controller`.
pub fn spawn_ticks(controller: &GateController, schedule: TickSchedule) -> SchedulerHandle {
    log::debug!("starting scheduler: {:?}", schedule);
    let mut tasks = Vec::with_capacity(5);

    let c = controller.clone();
    tasks.push(spawn_tick("momentary", schedule.momentary, move || {
        let c = c.clone();
        async move {
            c.momentary_tick().await;
        }
    }));

    let c = controller.clone();
    tasks.push(spawn_tick("poll", schedule.poll, move || {
        let c = c.clone();
        async move {
            let n = c.poll_replies().await;
            if n > 0 {
                log::trace!("processed {} inbound message(s)", n);
            }
        }
    }));

    let c = controller.clone();
    tasks.push(spawn_tick("display", schedule.display_refresh, move || {
        let c = c.clone();
        async move { c.refresh_display() }
    }));

    let c = controller.clone();
    tasks.push(spawn_tick("auto-close", schedule.auto_close_check, move || {
        let c = c.clone();
        async move {
            c.check_auto_close().await;
        }
    }));

    let c = controller.clone();
    tasks.push(spawn_tick("reconnect", schedule.reconnect, move || {
        let c = c.clone();
        async move {
            c.reconnect_if_needed().await;
        }
    }));

    SchedulerHandle { tasks }
}
