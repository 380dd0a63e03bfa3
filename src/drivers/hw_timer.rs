//! Hardware timers using ESP-IDF's esp_timer API.
//!
//! Two periodic timers push into the lock-free [`EVENTS`](crate::events::EVENTS)
//! queue:
//!
//! - 1 Hz [`Event::ClockTick`] for the time-of-day field
//! - every `log_interval_secs`, [`Event::LogIntervalElapsed`]
//!
//! Callbacks run in the esp_timer task (not ISR), and only push an event.
//! On simulation targets [`SimTimers`] derives the same events from the
//! loop's own uptime stamps.

use crate::events::{Event, push_event};

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use log::info;

/// Clock tick period.
pub const CLOCK_TICK_US: u64 = 1_000_000;

#[cfg(target_os = "espidf")]
static mut CLOCK_TIMER: esp_timer_handle_t = core::ptr::null_mut();
#[cfg(target_os = "espidf")]
static mut LOG_TIMER: esp_timer_handle_t = core::ptr::null_mut();

#[cfg(target_os = "espidf")]
unsafe extern "C" fn clock_tick_cb(_arg: *mut core::ffi::c_void) {
    push_event(Event::ClockTick);
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn log_interval_cb(_arg: *mut core::ffi::c_void) {
    push_event(Event::LogIntervalElapsed);
}

/// Create and start one periodic timer.
///
/// # Safety
/// `handle` must point at one of this module's timer statics, written only
/// from the main task before any callback fires.
#[cfg(target_os = "espidf")]
unsafe fn start_periodic(
    handle: *mut esp_timer_handle_t,
    callback: unsafe extern "C" fn(*mut core::ffi::c_void),
    name: &'static [u8],
    period_us: u64,
) -> bool {
    let args = esp_timer_create_args_t {
        callback: Some(callback),
        arg: core::ptr::null_mut(),
        dispatch_method: esp_timer_dispatch_t_ESP_TIMER_TASK,
        name: name.as_ptr() as *const _,
        skip_unhandled_events: true,
    };
    let ret = unsafe { esp_timer_create(&args, handle) };
    if ret != ESP_OK as i32 {
        log::error!("hw_timer: create failed (rc={})", ret);
        return false;
    }
    let ret = unsafe { esp_timer_start_periodic(*handle, period_us) };
    if ret != ESP_OK as i32 {
        log::error!("hw_timer: start failed (rc={})", ret);
        return false;
    }
    true
}

/// Start the clock and logging timers.
#[cfg(target_os = "espidf")]
pub fn start_timers(log_interval_secs: u32) {
    let log_period_us = u64::from(log_interval_secs.max(1)) * 1_000_000;
    // SAFETY: the handles are written here once at boot from the main task,
    // before either callback can fire.  Callbacks only call push_event().
    unsafe {
        if !start_periodic(&raw mut CLOCK_TIMER, clock_tick_cb, b"clock\0", CLOCK_TICK_US) {
            return;
        }
        if !start_periodic(&raw mut LOG_TIMER, log_interval_cb, b"log\0", log_period_us) {
            return;
        }
    }
    info!("hw_timer: clock@1Hz + log every {}s started", log_interval_secs);
}

#[cfg(not(target_os = "espidf"))]
pub fn start_timers(log_interval_secs: u32) {
    log::info!(
        "hw_timer(sim): timers not started (log every {}s driven by the loop)",
        log_interval_secs
    );
}

/// Stop both timers.
#[cfg(target_os = "espidf")]
pub fn stop_timers() {
    // SAFETY: handles are valid if start_timers() succeeded; the null check
    // covers a failed start.  Main task only.
    unsafe {
        let clock = CLOCK_TIMER;
        if !clock.is_null() {
            esp_timer_stop(clock);
        }
        let log = LOG_TIMER;
        if !log.is_null() {
            esp_timer_stop(log);
        }
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn stop_timers() {}

// ── Simulation ────────────────────────────────────────────────

/// Loop-driven stand-in for the esp_timer callbacks.
#[derive(Debug, Clone)]
pub struct SimTimers {
    log_period_ms: u64,
    next_clock_ms: u64,
    next_log_ms: u64,
}

impl SimTimers {
    pub fn new(log_interval_secs: u32) -> Self {
        let log_period_ms = u64::from(log_interval_secs.max(1)) * 1000;
        Self {
            log_period_ms,
            next_clock_ms: CLOCK_TICK_US / 1000,
            next_log_ms: log_period_ms,
        }
    }

    /// Emit every event whose deadline passed by `now_ms`.  Returns how
    /// many were pushed.
    pub fn poll(&mut self, now_ms: u64, mut emit: impl FnMut(Event)) -> u32 {
        let mut fired = 0;
        while now_ms >= self.next_clock_ms {
            emit(Event::ClockTick);
            self.next_clock_ms += CLOCK_TICK_US / 1000;
            fired += 1;
        }
        if now_ms >= self.next_log_ms {
            // Overdue log intervals collapse into one, like skip_unhandled_events.
            emit(Event::LogIntervalElapsed);
            let periods = (now_ms - self.next_log_ms) / self.log_period_ms + 1;
            self.next_log_ms += periods * self.log_period_ms;
            fired += 1;
        }
        fired
    }

    /// Feed the global queue, as the hardware callbacks would.
    pub fn poll_into_queue(&mut self, now_ms: u64) -> u32 {
        self.poll(now_ms, |e| {
            push_event(e);
        })
    }
}
