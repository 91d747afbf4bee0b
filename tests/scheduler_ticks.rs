mod common;

use common::{controller, MockModem};
use smsgate::modem::ModemTiming;
use smsgate::scheduler::{spawn_ticks, TickSchedule};
use smsgate::surface::SurfaceEvent;
use std::time::Duration;
use tempfile::TempDir;

/// Default periods, except the wall-clock auto-close check is pushed out of the
/// test window so the real time of day cannot fire it.
fn schedule() -> TickSchedule {
    TickSchedule {
        auto_close_check: Duration::from_secs(24 * 3600),
        ..TickSchedule::default()
    }
}

#[tokio::test(start_paused = true)]
async fn momentary_cycle_runs_on_its_own() {
    let dir = TempDir::new().unwrap();
    let modem = MockModem::new();
    let c = controller(&modem, &dir, ModemTiming::immediate()).await;

    assert!(c.trigger_momentary().await.unwrap().success);
    let ticks = spawn_ticks(&c, schedule());

    tokio::time::sleep(Duration::from_secs(30)).await;
    let snap = c.state();
    assert!(snap.momentary_active);
    assert!(snap.momentary_countdown_seconds <= 31 && snap.momentary_countdown_seconds >= 29);

    tokio::time::sleep(Duration::from_secs(35)).await;
    assert!(!c.state().momentary_active);
    assert_eq!(modem.sms_bodies(), vec!["1234#2#", "1234#3#"]);

    ticks.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn poll_tick_picks_up_replies() {
    let dir = TempDir::new().unwrap();
    let modem = MockModem::new();
    let c = controller(&modem, &dir, ModemTiming::immediate()).await;
    let ticks = spawn_ticks(&c, schedule());

    modem.inject("+CMT: \"+15551234567\",\"\",\"24/05/01\"\r\nGATE CLOSED\r\n");
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(c.state().status_text, "Gate: GATE CLOSED");

    ticks.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn display_tick_pushes_refresh() {
    let dir = TempDir::new().unwrap();
    let modem = MockModem::new();
    let c = controller(&modem, &dir, ModemTiming::immediate()).await;
    let mut rx = c.subscribe();
    let ticks = spawn_ticks(&c, schedule());

    tokio::time::sleep(Duration::from_secs(11)).await;
    let mut refreshed = false;
    while let Ok(event) = rx.try_recv() {
        if let SurfaceEvent::Refresh {
            modem_ready,
            log_block,
        } = event
        {
            assert!(modem_ready);
            assert!(log_block.contains("Modem initialized successfully"));
            refreshed = true;
        }
    }
    assert!(refreshed);

    ticks.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn reconnect_tick_retries_until_device_returns() {
    let dir = TempDir::new().unwrap();
    let modem = MockModem::new();
    modem.set_fail_open(true);
    let c = controller(&modem, &dir, ModemTiming::immediate()).await;
    let ticks = spawn_ticks(&c, schedule());
    assert_eq!(
        ticks.task_names(),
        vec!["momentary", "poll", "display", "auto-close", "reconnect"]
    );

    tokio::time::sleep(Duration::from_secs(125)).await;
    // startup + two reconnect ticks
    assert_eq!(modem.opens(), 3);
    assert!(!c.state().modem_ready);

    modem.set_fail_open(false);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(c.state().modem_ready);

    ticks.shutdown().await;
}
