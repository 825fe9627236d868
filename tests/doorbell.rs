mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use json::JsonValue;

use common::Rig;
use doorbell_controller::clock::{Clock, ManualClock};
use doorbell_controller::gesture::PressSession;
use doorbell_controller::relay::Source;
use doorbell_controller::supervisor::{RunOutcome, Scheduler, TickOutcome};
use doorbell_controller::Millis;

const BASE: Millis = 10_000;

fn int(value: i64) -> JsonValue {
    JsonValue::from(value)
}

#[test]
fn five_releases_inside_timeout_activate_once() {
    let mut rig = Rig::new();

    for (i, offset) in [0, 800, 1600, 2400, 3200].iter().enumerate() {
        rig.tap(BASE + offset);
        assert_eq!(rig.relay_is_on(), i == 4, "after release {}", i + 1);
    }

    let relay = rig.controller.relay().state();
    assert_eq!(relay.started, Some(BASE + 3200));
    assert_eq!(relay.source, Some(Source::Local));
    assert_eq!(rig.controller.gestures().session(), PressSession::default());

    assert_eq!(rig.store.logs("open"), 1);
    assert_eq!(rig.store.logs("push"), 1);
    assert_eq!(rig.store.writes_to("state/on"), vec![int(1)]);
    assert_eq!(rig.board.0.borrow().relay_writes, vec![true]);
}

#[test]
fn expired_session_starts_a_new_count() {
    let mut rig = Rig::new();
    rig.tap(BASE);

    rig.run_until(BASE + 3999);
    assert!(rig.controller.gestures().session().is_active());
    rig.run_until(BASE + 4000);
    assert!(!rig.controller.gestures().session().is_active());
    // timeout blink, 120ms on then 120ms off
    assert_eq!(rig.board.0.borrow().light, 1.0);
    rig.run_until(BASE + 4130);
    assert_eq!(rig.board.0.borrow().light, 0.0);

    rig.tap(BASE + 5000);
    assert_eq!(
        rig.controller.gestures().session(),
        PressSession {
            started: Some(BASE + 5000),
            count: 1
        }
    );
    assert_eq!(rig.store.logs("push"), 2);
}

#[test]
fn requests_for_current_state_have_no_side_effects() {
    let mut rig = Rig::new();
    rig.remote_put("/on", int(1), BASE);
    assert!(rig.relay_is_on());
    // queued during this tick's sync step, sent by the next one
    assert!(rig.store.writes_to("state/on").is_empty());
    rig.run_until(BASE + 1);
    assert_eq!(rig.store.writes_to("state/on"), vec![int(1)]);

    rig.remote_put("/on", int(1), BASE + 100);
    for k in 0..5 {
        rig.tap(BASE + 300 + k * 200);
    }

    assert_eq!(rig.store.writes_to("state/on"), vec![int(1)]);
    assert_eq!(rig.board.0.borrow().relay_writes, vec![true]);
    let relay = rig.controller.relay().state();
    assert_eq!(relay.started, Some(BASE));
    assert_eq!(relay.source, Some(Source::Remote));
}

#[test]
fn relay_turns_off_exactly_at_deadline() {
    let mut rig = Rig::new();
    rig.remote_put("/on_timeout", int(2500), BASE - 10);
    rig.remote_put("/on", int(1), BASE);

    rig.run_until(BASE + 2499);
    assert!(rig.relay_is_on());
    rig.run_until(BASE + 2500);
    assert!(!rig.relay_is_on());

    assert_eq!(rig.store.writes_to("state/on"), vec![int(1), int(0)]);
    assert_eq!(rig.board.0.borrow().relay_writes, vec![true, false]);
}

#[test]
fn remote_off_is_not_written_back() {
    let mut rig = Rig::new();
    rig.remote_put("/on", int(1), BASE);
    rig.remote_put("/on", int(0), BASE + 100);

    assert!(!rig.relay_is_on());
    assert_eq!(rig.store.writes_to("state/on"), vec![int(1)]);
    // nothing left to expire
    rig.run_until(BASE + 10_000);
    assert_eq!(rig.store.writes_to("state/on"), vec![int(1)]);
}

#[test]
fn holding_the_button_resets_once() {
    let mut rig = Rig::new();
    rig.set_button(true, BASE);

    // far tier blinks 300ms on, 300ms off from BASE + 2001
    rig.run_until(BASE + 2100);
    assert_eq!(rig.board.0.borrow().light, 1.0);
    rig.run_until(BASE + 2400);
    assert_eq!(rig.board.0.borrow().light, 0.0);

    assert_eq!(rig.run_until(BASE + 8000), TickOutcome::Restart);
    assert_eq!(rig.now, BASE + 8000);
    assert_eq!(rig.resets(), 1);
    assert_eq!(rig.store.logs("reset"), 1);
}

#[test]
fn releasing_early_cancels_reset() {
    let mut rig = Rig::new();
    rig.set_button(true, BASE);
    rig.set_button(false, BASE + 7999);

    assert_eq!(rig.run_until(BASE + 20_000), TickOutcome::Continue);
    assert_eq!(rig.resets(), 0);
    assert_eq!(rig.store.logs("reset"), 0);
}

#[test]
fn invalid_remote_values_fall_back_to_defaults() {
    let mut rig = Rig::new();

    rig.remote_put("/on_timeout", int(1500), BASE);
    assert_eq!(rig.controller.relay().state().duration_ms, 1500);
    rig.remote_put("/on_timeout", int(0), BASE + 10);
    assert_eq!(rig.controller.relay().state().duration_ms, 4000);

    rig.remote_put("/press_count", int(3), BASE + 20);
    assert_eq!(rig.controller.config().press_count_threshold, 3);
    rig.remote_put("/press_count", int(1), BASE + 30);
    assert_eq!(rig.controller.config().press_count_threshold, 5);

    rig.remote_put(
        "/",
        json::object! { "on_timeout": 0, "press_count": 1, "press_timeout": 2000, "enabled": 1 },
        BASE + 40,
    );
    let config = rig.controller.config();
    assert_eq!(config.on_timeout_ms, 4000);
    assert_eq!(config.press_count_threshold, 5);
    assert_eq!(config.press_timeout_ms, 2000);
    assert!(config.system_enabled);
}

#[test]
fn refresh_command_runs_once_and_is_acknowledged() {
    let mut rig = Rig::new();
    rig.remote_put("/cmd", int(2), BASE);
    rig.run_until(BASE + 10);

    assert_eq!(rig.store.writes_to("netstats/rssi"), vec![int(-52)]);
    assert_eq!(rig.store.writes_to("state/cmd"), vec![int(0)]);
    assert_eq!(rig.controller.config().pending_command_id, None);

    // the acknowledgment comes back through the stream
    rig.remote_put("/cmd", int(0), BASE + 20);
    assert_eq!(rig.store.writes_to("netstats/rssi").len(), 1);
    assert_eq!(rig.store.writes_to("state/cmd").len(), 1);
}

#[test]
fn acknowledgment_is_retried_until_it_lands() {
    let mut rig = Rig::new();
    rig.remote_put("/cmd", int(2), BASE);
    rig.store.0.borrow_mut().offline = true;

    rig.run_until(BASE + 500);
    assert!(rig.store.writes_to("state/cmd").is_empty());
    assert_eq!(rig.controller.config().pending_command_id, Some(2));

    // a replayed document still carrying the command does not run it again
    rig.remote_put("/", json::object! { "cmd": 2 }, BASE + 600);

    rig.store.0.borrow_mut().offline = false;
    rig.run_until(BASE + 700);
    assert_eq!(rig.store.writes_to("netstats/rssi").len(), 1);
    assert_eq!(rig.store.writes_to("state/cmd"), vec![int(0)]);
    assert_eq!(rig.controller.config().pending_command_id, None);
}

#[test]
fn acknowledgment_survives_a_full_outbox() {
    let mut rig = Rig::new();
    // presses while disabled only produce press logs
    rig.remote_put("/enabled", int(0), BASE);
    rig.store.0.borrow_mut().offline = true;
    rig.remote_put("/cmd", int(2), BASE + 10);

    for k in 0..70 {
        rig.tap(BASE + 200 + k * 200);
    }
    let mut at = BASE + 20_000;
    for _ in 0..80 {
        rig.remote_put("/on", int(1), at);
        rig.remote_put("/on", int(0), at + 1);
        at += 10;
    }
    assert_eq!(rig.controller.config().pending_command_id, Some(2));

    rig.store.0.borrow_mut().offline = false;
    rig.run_until(at + 100);
    assert_eq!(rig.store.writes_to("state/cmd"), vec![int(0)]);
    assert_eq!(rig.store.writes_to("state/on"), vec![int(1)]);
    assert_eq!(rig.controller.config().pending_command_id, None);

    // the command is not run again once acknowledged
    rig.remote_put("/", json::object! { "cmd": 0 }, at + 200);
    assert_eq!(rig.store.writes_to("state/cmd").len(), 1);
}

#[test]
fn power_down_releases_the_relay() {
    let mut rig = Rig::new();
    rig.remote_put("/on", int(1), BASE);
    rig.controller.power_down();

    assert_eq!(rig.board.0.borrow().relay_writes, vec![true, false]);
    assert_eq!(rig.board.0.borrow().light, 0.0);
}

#[test]
fn disabled_system_ignores_presses() {
    let mut rig = Rig::new();
    rig.remote_put("/enabled", int(0), BASE);
    for k in 0..5 {
        rig.tap(BASE + 200 + k * 200);
    }
    assert!(!rig.relay_is_on());

    rig.remote_put("/enabled", JsonValue::from(true), BASE + 2000);
    for k in 0..5 {
        rig.tap(BASE + 2200 + k * 200);
    }
    assert!(rig.relay_is_on());
}

#[test]
fn later_request_in_the_same_tick_wins() {
    let mut rig = Rig::new();
    for k in 0..4 {
        rig.tap(BASE + k * 200);
    }
    rig.set_button(true, BASE + 900);

    // fifth release and a remote "off" are both seen by the tick at BASE + 1000
    rig.run_until(BASE + 999);
    rig.store.put("/on", int(0));
    rig.board.0.borrow_mut().pressed = false;
    rig.run_until(BASE + 1000);

    assert!(!rig.relay_is_on());
    assert_eq!(rig.board.0.borrow().relay_writes, vec![true, false]);
    assert_eq!(rig.store.writes_to("state/on"), vec![int(1)]);
    assert_eq!(rig.store.logs("open"), 1);
}

#[test]
fn offline_activation_is_reported_after_reconnect() {
    let mut rig = Rig::new();
    rig.network.0.borrow_mut().connected = false;
    rig.run_until(BASE);
    assert!(!rig.store.0.borrow().streaming);

    for k in 0..5 {
        rig.tap(BASE + 200 + k * 200);
    }
    assert!(rig.relay_is_on());
    assert!(rig.store.writes_to("state/on").is_empty());

    rig.network.0.borrow_mut().connected = true;
    rig.run_until(BASE + 2000);
    assert_eq!(rig.store.writes_to("state/on"), vec![int(1)]);
    assert_eq!(rig.store.logs("open"), 1);
    assert_eq!(rig.store.logs("login"), 2);
    assert!(rig.store.0.borrow().streaming);
}

#[test]
fn scheduler_runs_until_terminated() {
    let mut rig = Rig::new();
    let clock = ManualClock::new(rig.now);
    let scheduler = Scheduler::new(clock.clone(), Duration::from_millis(5));
    let term = AtomicBool::new(false);
    rig.store.put("/on", int(1));

    let mut published = Vec::new();
    let outcome = scheduler.run(&mut rig.controller, &term, |status| {
        published.push(*status);
        if !status.relay.is_on {
            term.store(true, Ordering::SeqCst);
        }
    });

    assert_eq!(outcome, RunOutcome::Terminated);
    assert_eq!(published.len(), 2);
    assert!(published[0].relay.is_on);
    assert_eq!(clock.now_ms(), 5005);
}

#[test]
fn scheduler_stops_for_factory_reset() {
    let mut rig = Rig::new();
    let clock = ManualClock::new(2000);
    let scheduler = Scheduler::new(clock.clone(), Duration::from_millis(10));
    let term = AtomicBool::new(false);
    rig.board.0.borrow_mut().pressed = true;

    let outcome = scheduler.run(&mut rig.controller, &term, |_| {});

    assert_eq!(outcome, RunOutcome::Restart);
    assert_eq!(clock.now_ms(), 10_000);
    assert_eq!(rig.resets(), 1);
}
