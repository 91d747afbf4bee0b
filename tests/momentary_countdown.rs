mod common;

use common::{controller, log_texts, MockModem};
use smsgate::gate::{GatePhase, MomentaryTick};
use smsgate::modem::ModemTiming;
use smsgate::surface::SurfaceEvent;
use tempfile::TempDir;

#[tokio::test]
async fn countdown_closes_exactly_once_after_sixty_ticks() {
    let dir = TempDir::new().unwrap();
    let modem = MockModem::new();
    let c = controller(&modem, &dir, ModemTiming::immediate()).await;

    let opened = c.trigger_momentary().await.expect("first trigger dispatches");
    assert!(opened.success);
    let snap = c.state();
    assert!(snap.momentary_active);
    assert_eq!(snap.momentary_countdown_seconds, 60);
    assert_eq!(snap.status_text, "Momentary - closing in 60s");

    for expected in (1..60).rev() {
        assert_eq!(c.momentary_tick().await, MomentaryTick::Counting(expected));
    }
    assert_eq!(modem.sms_bodies(), vec!["1234#2#"]);

    assert_eq!(c.momentary_tick().await, MomentaryTick::Expired);
    assert_eq!(modem.sms_bodies(), vec!["1234#2#", "1234#3#"]);

    let snap = c.state();
    assert!(!snap.momentary_active);
    assert_eq!(snap.momentary_countdown_seconds, 0);
    assert_eq!(snap.phase, GatePhase::Idle);
    assert_eq!(snap.status_text, "Gate closed (momentary)");

    // Nothing left to count down.
    assert_eq!(c.momentary_tick().await, MomentaryTick::Inactive);
    assert_eq!(modem.sms_bodies().len(), 2);

    let log = log_texts(&c, 4);
    assert_eq!(log[0], "SMS sent: 1234#3#");
    assert_eq!(log[1], "MOMENTARY auto-close triggered");
}

#[tokio::test]
async fn second_trigger_while_active_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    let modem = MockModem::new();
    let c = controller(&modem, &dir, ModemTiming::immediate()).await;

    assert!(c.trigger_momentary().await.is_some());
    for _ in 0..10 {
        c.momentary_tick().await;
    }
    assert!(c.trigger_momentary().await.is_none());
    assert_eq!(c.state().momentary_countdown_seconds, 50);
    assert_eq!(modem.sms_bodies(), vec!["1234#2#"]);
}

#[tokio::test]
async fn manual_trigger_does_not_cancel_countdown() {
    let dir = TempDir::new().unwrap();
    let modem = MockModem::new();
    let c = controller(&modem, &dir, ModemTiming::immediate()).await;

    c.trigger_momentary().await;
    c.momentary_tick().await;
    assert!(c.trigger_status().await.success);
    assert_eq!(c.state().momentary_countdown_seconds, 59);
    assert_eq!(c.momentary_tick().await, MomentaryTick::Counting(58));
}

#[tokio::test]
async fn failed_open_aborts_momentary() {
    let dir = TempDir::new().unwrap();
    let modem = MockModem::new();
    modem.set_fail_open(true);
    let c = controller(&modem, &dir, ModemTiming::immediate()).await;

    let r = c.trigger_momentary().await.unwrap();
    assert!(!r.success);
    let snap = c.state();
    assert!(!snap.momentary_active);
    assert_eq!(snap.status_text, "Failed to send open");
    assert_eq!(c.momentary_tick().await, MomentaryTick::Inactive);
}

#[tokio::test]
async fn countdown_events_reach_subscribers() {
    let dir = TempDir::new().unwrap();
    let modem = MockModem::new();
    let c = controller(&modem, &dir, ModemTiming::immediate()).await;
    let mut rx = c.subscribe();

    c.trigger_momentary().await;
    c.momentary_tick().await;

    let mut countdowns = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let SurfaceEvent::Countdown { remaining } = event {
            countdowns.push(remaining);
        }
    }
    assert_eq!(countdowns, vec![Some(60), Some(59)]);
}

#[tokio::test]
async fn countdown_tick_publishes_status_text() {
    let dir = TempDir::new().unwrap();
    let modem = MockModem::new();
    let c = controller(&modem, &dir, ModemTiming::immediate()).await;

    c.trigger_momentary().await;
    let mut rx = c.subscribe();
    c.momentary_tick().await;

    let mut texts = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let SurfaceEvent::StatusChanged { snapshot } = event {
            texts.push(snapshot.status_text);
        }
    }
    assert_eq!(texts, vec!["Momentary - closing in 59s"]);
}
