//! Integration tests: AppService → FSM → every port, on the happy path.

use std::time::Duration;

use crate::mock_ports::{Rig, SYNC_EPOCH, TICK_MS, home_link, press_button, start_app};
use powermeter::adapters::ota::OtaCheckAdapter;
use powermeter::app::events::AppEvent;
use powermeter::app::ports::{Ports, UpdateStatus};
use powermeter::config::SystemConfig;
use powermeter::diagnostics::free_heap_bytes_at;
use powermeter::display::{DisplayFieldMask, DisplayMetric};
use powermeter::drivers::button::{ButtonEvent, EdgeQueue};
use powermeter::drivers::hw_timer::SimTimers;
use powermeter::events::{Event, EventQueue};
use powermeter::fsm::{PhaseResult, StateId};
use powermeter::sensors::pulse::PulseAccumulator;

/// 2023-11-15T00:00:00Z.
const MIDNIGHT: u32 = 1_700_006_400;

fn sealed_samples(rig: &Rig) -> Vec<powermeter::energy::EnergySample> {
    rig.sink
        .events
        .iter()
        .filter_map(|e| match e {
            AppEvent::SampleSealed(s) => Some(*s),
            _ => None,
        })
        .collect()
}

// ── Cycle order ───────────────────────────────────────────────

#[test]
fn first_cycle_visits_every_phase_in_order() {
    let pulses = PulseAccumulator::new();
    let edges = EdgeQueue::new();
    let mut rig = Rig::new();
    let mut app = start_app(SystemConfig::default(), &pulses, &edges, &mut rig);

    let steps = rig.run_cycle(&mut app);
    let visited: Vec<StateId> = steps.iter().map(|s| s.from).collect();
    assert_eq!(
        visited,
        vec![
            StateId::WifiConnect,
            StateId::FirmwareUpdateCheck,
            StateId::TimeSync,
            StateId::Publish,
            StateId::LocalLog,
            StateId::ButtonCheck,
            StateId::DisplayRefresh,
        ]
    );
    assert!(steps.iter().all(|s| s.result == PhaseResult::Success));
    assert_eq!(app.state(), StateId::WifiConnect);

    assert_eq!(rig.network.connects, 1);
    assert_eq!(rig.updater.checks, 1);
    assert_eq!(rig.time_source.calls, 1);
    assert!(rig.push.attempts.is_empty(), "nothing sealed yet");
    assert_eq!(rig.records.appends, 0);

    assert_eq!(rig.sink.events[0], AppEvent::Started(StateId::WifiConnect));
    assert!(rig.sink.contains(&AppEvent::Connected {
        ip: home_link().ip
    }));
    assert!(rig.sink.contains(&AppEvent::ClockSynced(SYNC_EPOCH)));
}

#[test]
fn first_refresh_paints_the_whole_screen() {
    let pulses = PulseAccumulator::new();
    let edges = EdgeQueue::new();
    let mut rig = Rig::new();
    let mut app = start_app(SystemConfig::default(), &pulses, &edges, &mut rig);

    rig.run_cycle(&mut app);

    assert_eq!(rig.display.frames.len(), 1);
    let (mask, values) = &rig.display.frames[0];
    assert_eq!(*mask, DisplayFieldMask::ALL);
    assert_eq!(values.ssid.as_str(), "HomeNet");
    assert_eq!(values.ip, Some([192, 168, 1, 77]));
    assert_eq!(values.status, "Online");
    let local = values.local_time.expect("clock synced this cycle");
    assert_eq!((local.year, local.month, local.day), (2023, 11, 14));
    assert!(app.dirty_fields().is_empty());
}

#[test]
fn connected_cycle_skips_reassociation() {
    let pulses = PulseAccumulator::new();
    let edges = EdgeQueue::new();
    let mut rig = Rig::new();
    let mut app = start_app(SystemConfig::default(), &pulses, &edges, &mut rig);

    rig.run_cycle(&mut app);
    rig.run_cycle(&mut app);

    assert_eq!(rig.network.connects, 1);
    // Resync period is hours away.
    assert_eq!(rig.time_source.calls, 1);
    assert_eq!(rig.updater.checks, 2);
}

// ── Energy samples ────────────────────────────────────────────

#[test]
fn sealed_sample_is_published_and_logged_unchanged() {
    let pulses = PulseAccumulator::new();
    let edges = EdgeQueue::new();
    let mut rig = Rig::new();
    let mut app = start_app(SystemConfig::default(), &pulses, &edges, &mut rig);

    for i in 0..5 {
        pulses.on_pulse_interrupt(i * 1000);
    }
    app.handle_event(Event::LogIntervalElapsed);

    rig.run_cycle(&mut app);
    let sealed = sealed_samples(&rig);
    assert_eq!(sealed.len(), 1);
    let sample = sealed[0];
    assert_eq!(sample.watt_hours, 5);
    assert!(sample.is_dated());
    assert!(sample.timestamp >= SYNC_EPOCH);
    assert!(rig.push.attempts.is_empty(), "sealed after Publish ran");

    rig.run_cycle(&mut app);
    assert_eq!(rig.push.accepted, vec![sample]);
    assert_eq!(rig.records.written, vec![sample]);
    assert_eq!(app.today_power_usage(), 5);
    assert!(app.context().pending_sample.is_none());
}

#[test]
fn no_sample_without_log_interval() {
    let pulses = PulseAccumulator::new();
    let edges = EdgeQueue::new();
    let mut rig = Rig::new();
    let mut app = start_app(SystemConfig::default(), &pulses, &edges, &mut rig);

    pulses.on_pulse_interrupt(0);
    pulses.on_pulse_interrupt(1000);
    for _ in 0..3 {
        rig.run_cycle(&mut app);
    }

    assert!(sealed_samples(&rig).is_empty());
    assert!(rig.push.attempts.is_empty());
    assert!(rig.records.written.is_empty());
    assert_eq!(app.today_power_usage(), 0);
    assert_eq!(pulses.total_pulses(), 2);
}

#[test]
fn simulated_main_loop_conserves_energy() {
    let pulses = PulseAccumulator::new();
    let edges = EdgeQueue::new();
    let mut rig = Rig::new();
    let mut config = SystemConfig::default();
    config.log_interval_secs = 1;
    let mut timers = SimTimers::new(config.log_interval_secs);
    let mut app = start_app(config, &pulses, &edges, &mut rig);
    let queue = EventQueue::new();

    for i in 0..10 {
        pulses.on_pulse_interrupt(i * 250);
    }

    for _ in 0..60 {
        timers.poll(rig.now_ms, |e| {
            queue.push(e);
        });
        queue.drain(|e| app.handle_event(e));
        rig.tick(&mut app);
    }
    // Flush the sample that may still be in flight.
    rig.run_cycle(&mut app);
    rig.run_cycle(&mut app);

    let written: u32 = rig
        .records
        .written
        .iter()
        .map(|s| u32::from(s.watt_hours))
        .sum();
    assert!(rig.records.written.len() >= 2);
    assert_eq!(written, 10);
    assert_eq!(rig.push.accepted, rig.records.written);
    assert_eq!(app.today_power_usage(), 10);
}

// ── Button ────────────────────────────────────────────────────

#[test]
fn short_press_toggles_metric_and_repaints_power_rows() {
    let pulses = PulseAccumulator::new();
    let edges = EdgeQueue::new();
    let mut rig = Rig::new();
    let mut app = start_app(SystemConfig::default(), &pulses, &edges, &mut rig);

    rig.run_cycle(&mut app);
    assert_eq!(app.context().metric, DisplayMetric::Live);

    let now = rig.now_ms as u32;
    press_button(&edges, now - 300, 200);
    rig.run_cycle(&mut app);

    assert_eq!(app.context().metric, DisplayMetric::Today);
    assert!(rig.sink.contains(&AppEvent::Button(ButtonEvent::ShortPress)));
    let (mask, values) = rig.display.last_frame().expect("second frame");
    assert!(mask.contains(DisplayFieldMask::NOW | DisplayFieldMask::TODAY));
    assert_eq!(values.metric, DisplayMetric::Today);
    assert_eq!(rig.network.disconnects, 0);
}

#[test]
fn short_press_dirties_exactly_the_power_rows_until_redrawn() {
    let pulses = PulseAccumulator::new();
    let edges = EdgeQueue::new();
    let mut rig = Rig::new();
    let mut app = start_app(SystemConfig::default(), &pulses, &edges, &mut rig);

    rig.run_cycle(&mut app);
    assert!(app.dirty_fields().is_empty());

    let now = rig.now_ms as u32;
    press_button(&edges, now - 300, 200);
    rig.run_until(&mut app, StateId::DisplayRefresh);
    assert_eq!(
        app.dirty_fields(),
        DisplayFieldMask::NOW | DisplayFieldMask::TODAY
    );

    let step = rig.tick(&mut app);
    assert_eq!(step.from, StateId::DisplayRefresh);
    assert!(app.dirty_fields().is_empty());
    let (mask, _) = rig.display.last_frame().expect("repaint");
    assert_eq!(*mask, DisplayFieldMask::NOW | DisplayFieldMask::TODAY);
}

#[test]
fn long_press_forces_reconnect() {
    let pulses = PulseAccumulator::new();
    let edges = EdgeQueue::new();
    let mut rig = Rig::new();
    let mut app = start_app(SystemConfig::default(), &pulses, &edges, &mut rig);

    rig.run_cycle(&mut app);
    let now = rig.now_ms as u32;
    press_button(&edges, now, 2_500);
    rig.run_cycle(&mut app);

    assert!(rig.sink.contains(&AppEvent::Button(ButtonEvent::LongPress)));
    assert_eq!(rig.network.disconnects, 1);
    assert_eq!(app.context().metric, DisplayMetric::Live);
    let (mask, _) = rig.display.last_frame().expect("second frame");
    assert!(mask.contains(DisplayFieldMask::SSID | DisplayFieldMask::IP));

    rig.run_cycle(&mut app);
    assert_eq!(rig.network.connects, 2);
    assert_eq!(app.context().link, Some(home_link()));
}

// ── Clock ─────────────────────────────────────────────────────

#[test]
fn clock_tick_marks_time_row_once_synced() {
    let pulses = PulseAccumulator::new();
    let edges = EdgeQueue::new();
    let mut rig = Rig::new();
    let mut app = start_app(SystemConfig::default(), &pulses, &edges, &mut rig);

    rig.run_cycle(&mut app);
    assert!(!app.dirty_fields().contains(DisplayFieldMask::TIME));

    app.handle_event(Event::ClockTick);
    assert!(app.dirty_fields().contains(DisplayFieldMask::TIME));
}

#[test]
fn clock_tick_is_ignored_before_first_sync() {
    let pulses = PulseAccumulator::new();
    let edges = EdgeQueue::new();
    let mut rig = Rig::new();
    rig.time_source.result = Err(powermeter::error::PortError::Unavailable);
    let mut app = start_app(SystemConfig::default(), &pulses, &edges, &mut rig);

    rig.run_cycle(&mut app);
    app.handle_event(Event::ClockTick);

    assert!(!app.dirty_fields().contains(DisplayFieldMask::TIME));
    assert_eq!(app.clock_epoch(), None);
}

#[test]
fn today_total_resets_at_local_midnight() {
    let pulses = PulseAccumulator::new();
    let edges = EdgeQueue::new();
    let mut rig = Rig::new();
    rig.time_source.result = Ok(MIDNIGHT - 30);
    let mut app = start_app(SystemConfig::default(), &pulses, &edges, &mut rig);

    for i in 0..3 {
        pulses.on_pulse_interrupt(i * 1000);
    }
    app.handle_event(Event::LogIntervalElapsed);
    rig.run_cycle(&mut app);
    assert_eq!(app.today_power_usage(), 3);

    rig.now_ms += 40_000;
    rig.tick(&mut app);
    app.handle_event(Event::ClockTick);

    assert_eq!(app.today_power_usage(), 0);
    assert!(
        app.dirty_fields()
            .contains(DisplayFieldMask::DATE | DisplayFieldMask::TODAY)
    );
}

// ── Firmware update and admin surface ─────────────────────────

#[test]
fn installed_update_requests_restart() {
    let pulses = PulseAccumulator::new();
    let edges = EdgeQueue::new();
    let mut rig = Rig::new();
    rig.updater.result = Ok(UpdateStatus::Installed);
    let mut app = start_app(SystemConfig::default(), &pulses, &edges, &mut rig);

    rig.run_cycle(&mut app);

    assert!(app.restart_requested());
    assert!(rig.sink.contains(&AppEvent::UpdateInstalled));
}

#[test]
fn newer_image_from_manifest_is_installed_and_requests_restart() {
    let pulses = PulseAccumulator::new();
    let edges = EdgeQueue::new();
    let mut rig = Rig::new();
    let mut app = start_app(SystemConfig::default(), &pulses, &edges, &mut rig);

    let mut manifest_url = heapless::String::new();
    manifest_url.push_str("http://fw.local/manifest.json").unwrap();
    let mut ota = OtaCheckAdapter::new(Some(manifest_url), 5_000, Duration::ZERO);
    ota.sim_manifest =
        Some(br#"{"version":"99.0.0","url":"http://fw.local/powermeter.bin"}"#.to_vec());
    ota.sim_image = vec![0xE9; 1024];

    // WifiConnect, then FirmwareUpdateCheck against the real adapter.
    for _ in 0..2 {
        rig.now_ms += TICK_MS;
        let mut ports = Ports {
            network: &mut rig.network,
            updater: &mut ota,
            time_source: &mut rig.time_source,
            push: &mut rig.push,
            records: &mut rig.records,
            display: &mut rig.display,
            sink: &mut rig.sink,
        };
        app.tick(rig.now_ms, &mut ports);
    }

    assert_eq!(app.state(), StateId::TimeSync);
    assert_eq!(ota.sim_installed, Some(1024));
    assert!(ota.image_confirmed());
    assert!(app.restart_requested());
    assert!(rig.sink.contains(&AppEvent::UpdateInstalled));
}

#[test]
fn firmware_check_can_be_switched_off() {
    let pulses = PulseAccumulator::new();
    let edges = EdgeQueue::new();
    let mut rig = Rig::new();
    let mut config = SystemConfig::default();
    config.firmware_check_enabled = false;
    let mut app = start_app(config, &pulses, &edges, &mut rig);

    rig.run_cycle(&mut app);

    assert_eq!(rig.updater.checks, 0);
    assert!(!app.restart_requested());
}

#[test]
fn admin_status_serialises_current_state() {
    let pulses = PulseAccumulator::new();
    let edges = EdgeQueue::new();
    let mut rig = Rig::new();
    let mut app = start_app(SystemConfig::default(), &pulses, &edges, &mut rig);

    rig.run_cycle(&mut app);
    app.observe_heap(free_heap_bytes_at(0));

    let status = app.admin_status();
    assert_eq!(status.state, StateId::WifiConnect);
    assert_eq!(status.heap_free, 307_200);
    assert!(!status.local_only);

    let json = status.to_json().expect("status serialises");
    assert!(json.contains("\"state\":\"WifiConnect\""));
    assert!(json.contains("\"ssid\":\"HomeNet\""));
    assert!(json.contains("\"heap_free\":307200"));
}
