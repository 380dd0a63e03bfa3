//! Integration tests: collaborator failures degrade the cycle, never stall it.

use crate::mock_ports::{Rig, press_button, start_app};
use powermeter::app::events::AppEvent;
use powermeter::app::ports::PortError;
use powermeter::config::SystemConfig;
use powermeter::display::DisplayFieldMask;
use powermeter::drivers::button::{ButtonEvent, EdgeQueue};
use powermeter::events::Event;
use powermeter::fsm::{PhaseResult, StateId};
use powermeter::sensors::pulse::PulseAccumulator;

fn feed_pulses(pulses: &PulseAccumulator, count: u32) {
    for i in 0..count {
        pulses.on_pulse_interrupt(i * 1000);
    }
}

// ── QA: Wi-Fi and local-only mode ─────────────────────────────

#[test]
fn wifi_failure_falls_back_to_local_only() {
    let pulses = PulseAccumulator::new();
    let edges = EdgeQueue::new();
    let mut rig = Rig::new();
    rig.network.fail_with = Some(PortError::Timeout);
    let config = SystemConfig::default();
    let attempts = u32::from(config.wifi_retry_limit) + 1;
    let mut app = start_app(config, &pulses, &edges, &mut rig);

    rig.run_until(&mut app, StateId::ButtonCheck);

    assert_eq!(rig.network.connects, attempts);
    assert!(app.is_local_only());
    assert!(rig.sink.contains(&AppEvent::LocalOnlyEntered {
        cooldown_secs: 300
    }));
    assert_eq!(app.context().status, "Offline");
    assert_eq!(app.metrics().local_only_entries, 1);
}

#[test]
fn local_only_cycle_skips_network_phases() {
    let pulses = PulseAccumulator::new();
    let edges = EdgeQueue::new();
    let mut rig = Rig::new();
    rig.network.fail_with = Some(PortError::Unavailable);
    let mut app = start_app(SystemConfig::default(), &pulses, &edges, &mut rig);

    rig.run_cycle(&mut app);
    let connects = rig.network.connects;

    for _ in 0..5 {
        let steps = rig.run_cycle(&mut app);
        let last = steps.last().expect("cycle ran");
        assert_eq!(last.result, PhaseResult::Degraded);
        assert_eq!(last.to, StateId::LocalLog);
        assert!(steps.iter().all(|s| !matches!(
            s.from,
            StateId::WifiConnect | StateId::FirmwareUpdateCheck | StateId::TimeSync | StateId::Publish
        )));
    }

    assert_eq!(rig.network.connects, connects);
    assert_eq!(rig.updater.checks, 0);
    assert_eq!(rig.time_source.calls, 0);
    assert!(app.is_local_only());
}

#[test]
fn cooldown_elapsed_reconnects() {
    let pulses = PulseAccumulator::new();
    let edges = EdgeQueue::new();
    let mut rig = Rig::new();
    rig.network.fail_with = Some(PortError::Timeout);
    let mut config = SystemConfig::default();
    config.local_only_cooldown_secs = 1;
    let mut app = start_app(config, &pulses, &edges, &mut rig);

    rig.run_cycle(&mut app);
    assert!(app.is_local_only());
    let failed_connects = rig.network.connects;
    rig.network.fail_with = None;

    for _ in 0..20 {
        if !app.is_local_only() {
            break;
        }
        rig.run_cycle(&mut app);
    }
    assert!(!app.is_local_only(), "cooldown never elapsed");
    assert!(rig.sink.contains(&AppEvent::LocalOnlyLeft));
    assert_eq!(app.state(), StateId::WifiConnect);

    rig.run_cycle(&mut app);
    assert_eq!(rig.network.connects, failed_connects + 1);
    assert_eq!(app.context().status, "Online");
}

#[test]
fn radio_back_on_its_own_restores_online_status() {
    let pulses = PulseAccumulator::new();
    let edges = EdgeQueue::new();
    let mut rig = Rig::new();
    rig.network.fail_with = Some(PortError::Timeout);
    let mut config = SystemConfig::default();
    config.local_only_cooldown_secs = 1;
    let mut app = start_app(config, &pulses, &edges, &mut rig);

    rig.run_cycle(&mut app);
    assert_eq!(app.context().status, "Offline");
    let failed_connects = rig.network.connects;

    // The driver reassociates without being asked.
    rig.network.fail_with = None;
    rig.network.connected = true;
    for _ in 0..20 {
        if !app.is_local_only() {
            break;
        }
        rig.run_cycle(&mut app);
    }
    rig.run_cycle(&mut app);

    assert_eq!(rig.network.connects, failed_connects);
    assert_eq!(app.context().status, "Online");
    assert_eq!(app.admin_status().status, "Online");
    assert_eq!(app.context().link, Some(crate::mock_ports::home_link()));
}

#[test]
fn long_press_leaves_local_only_early() {
    let pulses = PulseAccumulator::new();
    let edges = EdgeQueue::new();
    let mut rig = Rig::new();
    rig.network.fail_with = Some(PortError::Timeout);
    let mut app = start_app(SystemConfig::default(), &pulses, &edges, &mut rig);

    rig.run_cycle(&mut app);
    let failed_connects = rig.network.connects;
    rig.network.fail_with = None;

    press_button(&edges, rig.now_ms as u32, 2_500);
    rig.run_cycle(&mut app);
    assert!(rig.sink.contains(&AppEvent::Button(ButtonEvent::LongPress)));
    assert!(!app.is_local_only());
    assert_eq!(app.state(), StateId::WifiConnect);

    rig.run_cycle(&mut app);
    assert_eq!(rig.network.connects, failed_connects + 1);
    assert_eq!(rig.network.disconnects, 1);
}

#[test]
fn samples_are_logged_while_local_only() {
    let pulses = PulseAccumulator::new();
    let edges = EdgeQueue::new();
    let mut rig = Rig::new();
    rig.network.fail_with = Some(PortError::Timeout);
    let mut app = start_app(SystemConfig::default(), &pulses, &edges, &mut rig);

    feed_pulses(&pulses, 4);
    app.handle_event(Event::LogIntervalElapsed);
    rig.run_cycle(&mut app);
    rig.run_cycle(&mut app);

    assert!(rig.push.attempts.is_empty());
    assert_eq!(rig.records.written.len(), 1);
    let sample = rig.records.written[0];
    assert_eq!(sample.watt_hours, 4);
    assert!(!sample.is_dated(), "clock was never synced");
    assert_eq!(app.today_power_usage(), 4);
}

// ── QA: Publish ───────────────────────────────────────────────

#[test]
fn rejected_push_is_not_retried_and_logging_continues() {
    let pulses = PulseAccumulator::new();
    let edges = EdgeQueue::new();
    let mut rig = Rig::new();
    rig.push.fail_with = Some(PortError::Rejected);
    let mut app = start_app(SystemConfig::default(), &pulses, &edges, &mut rig);

    feed_pulses(&pulses, 2);
    app.handle_event(Event::LogIntervalElapsed);
    rig.run_cycle(&mut app);
    rig.run_cycle(&mut app);

    assert_eq!(rig.push.attempts.len(), 1);
    assert!(rig.push.accepted.is_empty());
    assert_eq!(rig.records.written, rig.push.attempts);
    assert!(rig.sink.contains(&AppEvent::PublishFailed(PortError::Rejected)));
    assert_eq!(app.metrics().publish_failures, 1);
    assert_eq!(app.context().status, "Push fail");
    assert_eq!(app.state(), StateId::WifiConnect);
}

#[test]
fn transient_push_failure_spends_retry_budget() {
    let pulses = PulseAccumulator::new();
    let edges = EdgeQueue::new();
    let mut rig = Rig::new();
    rig.push.fail_with = Some(PortError::Timeout);
    let config = SystemConfig::default();
    let attempts = usize::from(config.publish_retry_limit) + 1;
    let mut app = start_app(config, &pulses, &edges, &mut rig);

    feed_pulses(&pulses, 3);
    app.handle_event(Event::LogIntervalElapsed);
    rig.run_cycle(&mut app);
    rig.run_cycle(&mut app);

    assert_eq!(rig.push.attempts.len(), attempts);
    assert!(rig.push.attempts.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(rig.records.written.len(), 1);
    assert!(rig.sink.contains(&AppEvent::PublishFailed(PortError::Timeout)));
}

#[test]
fn push_recovery_restores_status() {
    let pulses = PulseAccumulator::new();
    let edges = EdgeQueue::new();
    let mut rig = Rig::new();
    rig.push.fail_with = Some(PortError::Rejected);
    let mut app = start_app(SystemConfig::default(), &pulses, &edges, &mut rig);

    feed_pulses(&pulses, 2);
    app.handle_event(Event::LogIntervalElapsed);
    rig.run_cycle(&mut app);
    rig.run_cycle(&mut app);
    assert_eq!(app.context().status, "Push fail");

    rig.push.fail_with = None;
    app.handle_event(Event::LogIntervalElapsed);
    rig.run_cycle(&mut app);
    rig.run_cycle(&mut app);

    assert_eq!(rig.push.accepted.len(), 1);
    assert_eq!(app.context().status, "Online");
}

// ── QA: Local log ─────────────────────────────────────────────

#[test]
fn log_failure_drops_sample_and_cycle_continues() {
    let pulses = PulseAccumulator::new();
    let edges = EdgeQueue::new();
    let mut rig = Rig::new();
    rig.records.fail_with = Some(PortError::Io);
    let mut app = start_app(SystemConfig::default(), &pulses, &edges, &mut rig);

    feed_pulses(&pulses, 2);
    app.handle_event(Event::LogIntervalElapsed);
    rig.run_cycle(&mut app);
    rig.run_cycle(&mut app);

    assert_eq!(rig.records.appends, 1);
    assert_eq!(rig.push.accepted.len(), 1, "publish ran before the log");
    assert!(rig.sink.contains(&AppEvent::LogFailed(PortError::Io)));
    assert!(app.context().pending_sample.is_none());
    assert_eq!(app.metrics().log_failures, 1);
    assert_eq!(app.context().status, "SD error");
    assert_eq!(app.state(), StateId::WifiConnect);

    // The dropped sample is not retried on the next cycle.
    rig.run_cycle(&mut app);
    assert_eq!(rig.records.appends, 1);
}

// ── QA: Time sync ─────────────────────────────────────────────

#[test]
fn time_sync_failure_retries_then_continues() {
    let pulses = PulseAccumulator::new();
    let edges = EdgeQueue::new();
    let mut rig = Rig::new();
    rig.time_source.result = Err(PortError::Unavailable);
    let config = SystemConfig::default();
    let attempts = u32::from(config.time_sync_retry_limit) + 1;
    let mut app = start_app(config, &pulses, &edges, &mut rig);

    let steps = rig.run_cycle(&mut app);

    assert_eq!(rig.time_source.calls, attempts);
    let retries = steps
        .iter()
        .filter(|s| s.from == StateId::TimeSync && s.result == PhaseResult::Retry)
        .count();
    assert_eq!(retries as u32, attempts - 1);
    assert!(rig.sink.contains(&AppEvent::TimeSyncFailed(PortError::Unavailable)));
    assert_eq!(app.metrics().time_sync_failures, 1);
    assert_eq!(app.context().status, "No time");
    assert_eq!(app.clock_epoch(), None);

    // An unset clock is due again on the next cycle.
    rig.run_cycle(&mut app);
    assert_eq!(rig.time_source.calls, attempts * 2);
}

#[test]
fn unsynced_clock_still_publishes_and_logs_undated_sample() {
    let pulses = PulseAccumulator::new();
    let edges = EdgeQueue::new();
    let mut rig = Rig::new();
    rig.time_source.result = Err(PortError::Timeout);
    let mut app = start_app(SystemConfig::default(), &pulses, &edges, &mut rig);

    feed_pulses(&pulses, 3);
    app.handle_event(Event::LogIntervalElapsed);
    rig.run_cycle(&mut app);
    rig.run_cycle(&mut app);

    assert_eq!(app.clock_epoch(), None);
    assert_eq!(rig.push.attempts.len(), 1);
    assert_eq!(rig.records.written.len(), 1);
    assert_eq!(rig.push.attempts[0], rig.records.written[0]);
    assert_eq!(rig.records.written[0].timestamp, 0);
    assert_eq!(rig.records.written[0].watt_hours, 3);
}

#[test]
fn implausible_epoch_is_rejected() {
    let pulses = PulseAccumulator::new();
    let edges = EdgeQueue::new();
    let mut rig = Rig::new();
    rig.time_source.result = Ok(1_000);
    let mut app = start_app(SystemConfig::default(), &pulses, &edges, &mut rig);

    rig.run_cycle(&mut app);

    assert_eq!(app.clock_epoch(), None);
    assert!(rig.sink.contains(&AppEvent::TimeSyncFailed(PortError::InvalidResponse)));
}

// ── QA: Firmware check and display ────────────────────────────

#[test]
fn update_check_failure_does_not_block_cycle() {
    let pulses = PulseAccumulator::new();
    let edges = EdgeQueue::new();
    let mut rig = Rig::new();
    rig.updater.result = Err(PortError::Unavailable);
    let mut app = start_app(SystemConfig::default(), &pulses, &edges, &mut rig);

    let steps = rig.run_cycle(&mut app);

    assert_eq!(rig.updater.checks, 1);
    assert_eq!(rig.time_source.calls, 1);
    assert!(steps.iter().any(|s| s.from == StateId::FirmwareUpdateCheck
        && s.result == PhaseResult::Fatal
        && s.to == StateId::TimeSync));
    assert!(!app.restart_requested());
}

#[test]
fn display_failure_keeps_fields_dirty() {
    let pulses = PulseAccumulator::new();
    let edges = EdgeQueue::new();
    let mut rig = Rig::new();
    rig.display.fail_with = Some(PortError::Io);
    let mut app = start_app(SystemConfig::default(), &pulses, &edges, &mut rig);

    rig.run_cycle(&mut app);

    assert!(rig.sink.contains(&AppEvent::DisplayFailed(PortError::Io)));
    assert_eq!(app.metrics().display_failures, 1);
    assert_eq!(app.dirty_fields(), DisplayFieldMask::ALL);
    assert_eq!(app.state(), StateId::WifiConnect);

    rig.display.fail_with = None;
    rig.run_cycle(&mut app);
    let (mask, _) = rig.display.last_frame().expect("recovered frame");
    assert_eq!(*mask, DisplayFieldMask::ALL);
    assert!(app.dirty_fields().is_empty());
}
