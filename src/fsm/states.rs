//! Concrete phase functions and table builder.
//!
//! Each state is a plain `fn` pointer pair — no closures, no heap.  A
//! phase performs one bounded unit of work against the [`Ports`] bundle
//! and reports a [`PhaseResult`]; the engine in [`super`] picks the next
//! state from the transition table.
//!
//! Network-facing phases share one failure rule: a transient error with
//! budget left is a `Retry`, anything else is `Fatal`.  Every I/O call is
//! preceded by [`RetryBudget::attempt`](crate::retry::RetryBudget::attempt),
//! so a phase never performs more than `limit + 1` calls per visit.

use log::{debug, info, warn};

use super::context::{FsmContext, status};
use super::{PhaseResult, StateDescriptor, StateId};
use crate::app::events::AppEvent;
use crate::app::ports::{Ports, UpdateStatus};
use crate::clock::EPOCH_2020;
use crate::diagnostics::RuntimeMetrics;
use crate::display::DisplayFieldMask;
use crate::drivers::button::ButtonEvent;
use crate::error::PortError;

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static state table.  Called once at startup.
pub fn build_state_table() -> [StateDescriptor; StateId::COUNT] {
    [
        // Index 0 — WifiConnect
        StateDescriptor {
            id: StateId::WifiConnect,
            on_enter: None,
            run: wifi_connect_run,
        },
        // Index 1 — FirmwareUpdateCheck
        StateDescriptor {
            id: StateId::FirmwareUpdateCheck,
            on_enter: None,
            run: firmware_update_run,
        },
        // Index 2 — TimeSync
        StateDescriptor {
            id: StateId::TimeSync,
            on_enter: None,
            run: time_sync_run,
        },
        // Index 3 — Publish
        StateDescriptor {
            id: StateId::Publish,
            on_enter: None,
            run: publish_run,
        },
        // Index 4 — LocalLog
        StateDescriptor {
            id: StateId::LocalLog,
            on_enter: None,
            run: local_log_run,
        },
        // Index 5 — ButtonCheck
        StateDescriptor {
            id: StateId::ButtonCheck,
            on_enter: None,
            run: button_check_run,
        },
        // Index 6 — DisplayRefresh
        StateDescriptor {
            id: StateId::DisplayRefresh,
            on_enter: Some(display_refresh_enter),
            run: display_refresh_run,
        },
    ]
}

/// Shared failure rule for network-facing phases.
fn classify(ctx: &FsmContext, err: PortError) -> PhaseResult {
    if err.is_transient() && !ctx.retry.is_exhausted() {
        PhaseResult::Retry
    } else {
        PhaseResult::Fatal
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  WIFI CONNECT
// ═══════════════════════════════════════════════════════════════════════════

fn wifi_connect_run(ctx: &mut FsmContext, ports: &mut Ports<'_>) -> PhaseResult {
    if ports.network.is_connected() {
        if let Some(link) = ports.network.link() {
            ctx.set_link(Some(link));
        }
        // The radio may have reassociated on its own while we were offline.
        ctx.clear_status(status::OFFLINE);
        return PhaseResult::Success;
    }

    if !ctx.retry.attempt() {
        return give_up_network(ctx, ports);
    }
    ctx.set_status(status::CONNECTING);

    match ports.network.connect() {
        Ok(link) => {
            info!(
                "WiFi: connected to '{}' as {}.{}.{}.{}",
                link.ssid, link.ip[0], link.ip[1], link.ip[2], link.ip[3]
            );
            let ip = link.ip;
            ctx.set_link(Some(link));
            ctx.set_status(status::ONLINE);
            ports.sink.emit(&AppEvent::Connected { ip });
            PhaseResult::Success
        }
        Err(e) => match classify(ctx, e) {
            PhaseResult::Retry => {
                warn!(
                    "WiFi: attempt {}/{} failed ({}), retrying",
                    ctx.retry.attempts(),
                    ctx.retry.limit() + 1,
                    e
                );
                PhaseResult::Retry
            }
            _ => {
                warn!("WiFi: giving up after {} attempts ({})", ctx.retry.attempts(), e);
                give_up_network(ctx, ports)
            }
        },
    }
}

fn give_up_network(ctx: &mut FsmContext, ports: &mut Ports<'_>) -> PhaseResult {
    ctx.set_link(None);
    ctx.enter_local_only();
    ports.sink.emit(&AppEvent::LocalOnlyEntered {
        cooldown_secs: ctx.config.local_only_cooldown_secs,
    });
    PhaseResult::Fatal
}

// ═══════════════════════════════════════════════════════════════════════════
//  FIRMWARE UPDATE CHECK
// ═══════════════════════════════════════════════════════════════════════════

fn firmware_update_run(ctx: &mut FsmContext, ports: &mut Ports<'_>) -> PhaseResult {
    if !ctx.config.firmware_check_enabled {
        return PhaseResult::Success;
    }

    match ports.updater.check() {
        Ok(UpdateStatus::NoUpdate) => PhaseResult::Success,
        Ok(UpdateStatus::Installed) => {
            info!("OTA: new image installed, restart pending");
            ctx.restart_requested = true;
            ctx.set_status(status::UPDATED);
            ports.sink.emit(&AppEvent::UpdateInstalled);
            PhaseResult::Success
        }
        Err(e) => {
            warn!("OTA: update check failed ({})", e);
            PhaseResult::Fatal
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  TIME SYNC
// ═══════════════════════════════════════════════════════════════════════════

fn time_sync_run(ctx: &mut FsmContext, ports: &mut Ports<'_>) -> PhaseResult {
    if !ctx
        .clock
        .sync_due(ctx.now_ms, ctx.config.time_resync_period_ms())
    {
        return PhaseResult::Success;
    }

    if !ctx.retry.attempt() {
        return time_sync_failed(ctx, ports, PortError::Timeout);
    }

    let err = match ports.time_source.fetch_epoch() {
        Ok(epoch) if epoch >= EPOCH_2020 => {
            info!("SNTP: clock set to {}", epoch);
            ctx.sync_clock(epoch);
            ctx.clear_status(status::SYNC_FAILED);
            ports.sink.emit(&AppEvent::ClockSynced(epoch));
            return PhaseResult::Success;
        }
        Ok(epoch) => {
            debug!("SNTP: implausible epoch {}", epoch);
            PortError::InvalidResponse
        }
        Err(e) => e,
    };

    match classify(ctx, err) {
        PhaseResult::Retry => {
            debug!("SNTP: attempt {} failed ({}), retrying", ctx.retry.attempts(), err);
            PhaseResult::Retry
        }
        _ => time_sync_failed(ctx, ports, err),
    }
}

fn time_sync_failed(ctx: &mut FsmContext, ports: &mut Ports<'_>, err: PortError) -> PhaseResult {
    warn!("SNTP: sync failed ({}), keeping previous clock", err);
    RuntimeMetrics::bump(&mut ctx.metrics.time_sync_failures);
    if !ctx.clock.is_set() {
        ctx.set_status(status::SYNC_FAILED);
    }
    ports.sink.emit(&AppEvent::TimeSyncFailed(err));
    PhaseResult::Fatal
}

// ═══════════════════════════════════════════════════════════════════════════
//  PUBLISH
// ═══════════════════════════════════════════════════════════════════════════

fn publish_run(ctx: &mut FsmContext, ports: &mut Ports<'_>) -> PhaseResult {
    let Some(sample) = ctx.pending_sample else {
        return PhaseResult::Success;
    };

    if !ctx.retry.attempt() {
        return publish_failed(ctx, ports, PortError::Timeout);
    }

    match ports.push.submit(&sample) {
        Ok(()) => {
            debug!("Push: {} Wh @ {} accepted", sample.watt_hours, sample.timestamp);
            ctx.clear_status(status::PUSH_FAILED);
            PhaseResult::Success
        }
        Err(e) => match classify(ctx, e) {
            PhaseResult::Retry => {
                debug!("Push: attempt {} failed ({}), retrying", ctx.retry.attempts(), e);
                PhaseResult::Retry
            }
            _ => publish_failed(ctx, ports, e),
        },
    }
}

fn publish_failed(ctx: &mut FsmContext, ports: &mut Ports<'_>, err: PortError) -> PhaseResult {
    warn!("Push: sample dropped from upload ({})", err);
    RuntimeMetrics::bump(&mut ctx.metrics.publish_failures);
    ctx.set_status(status::PUSH_FAILED);
    ports.sink.emit(&AppEvent::PublishFailed(err));
    PhaseResult::Fatal
}

// ═══════════════════════════════════════════════════════════════════════════
//  LOCAL LOG
// ═══════════════════════════════════════════════════════════════════════════

/// Append the pending sample to the record store.  The sample is consumed
/// whether or not the write succeeds.
fn local_log_run(ctx: &mut FsmContext, ports: &mut Ports<'_>) -> PhaseResult {
    let Some(sample) = ctx.pending_sample.take() else {
        return PhaseResult::Success;
    };

    match ports.records.append_record(&sample) {
        Ok(()) => {
            ctx.clear_status(status::LOG_FAILED);
            PhaseResult::Success
        }
        Err(e) => {
            warn!("Log: append failed ({})", e);
            RuntimeMetrics::bump(&mut ctx.metrics.log_failures);
            ctx.set_status(status::LOG_FAILED);
            ports.sink.emit(&AppEvent::LogFailed(e));
            PhaseResult::Fatal
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  BUTTON CHECK
// ═══════════════════════════════════════════════════════════════════════════

fn button_check_run(ctx: &mut FsmContext, ports: &mut Ports<'_>) -> PhaseResult {
    let event = ctx.take_button();
    match event {
        ButtonEvent::None => return PhaseResult::Success,
        ButtonEvent::ShortPress => {
            ctx.metric = ctx.metric.toggled();
            ctx.mark_dirty(DisplayFieldMask::NOW | DisplayFieldMask::TODAY);
        }
        ButtonEvent::LongPress => {
            info!("Button: long press, forcing reconnect");
            ports.network.disconnect();
            ctx.set_link(None);
            ctx.leave_local_only();
            ctx.set_status(status::CONNECTING);
            ctx.mark_dirty(DisplayFieldMask::SSID | DisplayFieldMask::STATUS | DisplayFieldMask::IP);
        }
    }
    ports.sink.emit(&AppEvent::Button(event));
    PhaseResult::Success
}

// ═══════════════════════════════════════════════════════════════════════════
//  DISPLAY REFRESH
// ═══════════════════════════════════════════════════════════════════════════

fn display_refresh_enter(ctx: &mut FsmContext) {
    RuntimeMetrics::bump(&mut ctx.metrics.cycles);
}

/// Redraw dirty fields, then decide whether the next cycle goes online.
/// Display errors are counted and logged, never escalated.
fn display_refresh_run(ctx: &mut FsmContext, ports: &mut Ports<'_>) -> PhaseResult {
    let dirty = ctx.dirty;
    if !dirty.is_empty() {
        let values = ctx.display_values();
        match ports.display.redraw(dirty, &values) {
            Ok(drawn) => ctx.dirty.remove(drawn.intersection(dirty)),
            Err(e) => {
                warn!("Display: redraw failed ({})", e);
                RuntimeMetrics::bump(&mut ctx.metrics.display_failures);
                ports.sink.emit(&AppEvent::DisplayFailed(e));
            }
        }
    }

    if ctx.is_local_only() {
        if !ctx.local_only_cooldown_elapsed() {
            return PhaseResult::Degraded;
        }
        info!("WiFi: local-only cooldown elapsed, reconnecting");
        ctx.leave_local_only();
        ports.sink.emit(&AppEvent::LocalOnlyLeft);
    }
    PhaseResult::Success
}

// ═══════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════
