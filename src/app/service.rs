//! Application service — the hexagonal core.
//!
//! [`AppService`] owns the FSM and its shared context, and borrows the two
//! ISR-fed accumulators (pulses and button edges).  It exposes a clean,
//! hardware-agnostic API.  All I/O flows through the [`Ports`] bundle
//! injected at call sites, making the entire service testable with mock
//! adapters.
//!
//! ```text
//!  PulseAccumulator ──▶ ┌────────────────────────┐ ──▶ Ports (network,
//!  EdgeQueue ─────────▶ │       AppService        │      push, log, display)
//!  EventQueue ────────▶ │  Fsm · FsmContext       │ ──▶ EventSink
//!                       └────────────────────────┘
//! ```
//!
//! One [`tick`](AppService::tick) runs exactly one phase.  Before the phase
//! the service snapshots the ISR-side state (debounced button press, live
//! power).  After the display phase, which closes a cycle, it seals the
//! energy sample if the log interval elapsed, so Publish and LocalLog of
//! the next cycle see the identical sample.

use log::{debug, info};
use serde::Serialize;

use crate::config::SystemConfig;
use crate::diagnostics::RuntimeMetrics;
use crate::display::{DisplayFieldMask, DisplayMetric};
use crate::drivers::button::{ButtonDebouncer, ButtonEvent, EdgeQueue};
use crate::events::Event;
use crate::fsm::context::FsmContext;
use crate::fsm::states::build_state_table;
use crate::fsm::{Fsm, StateId, Step};
use crate::sensors::pulse::PulseAccumulator;

use super::events::AppEvent;
use super::ports::{EventSink, Ports};

// ───────────────────────────────────────────────────────────────
// Admin surface
// ───────────────────────────────────────────────────────────────

/// Read-only status snapshot for the admin surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdminStatus {
    pub state: StateId,
    pub status: &'static str,
    pub live_watts: u16,
    pub today_wh: u16,
    pub local_only: bool,
    /// Unix seconds, `None` before the first time sync.
    pub clock: Option<u32>,
    pub ssid: heapless::String<32>,
    pub ip: Option<[u8; 4]>,
    pub metric: DisplayMetric,
    pub total_pulses: u32,
    pub heap_free: u32,
    pub uptime_ms: u64,
    pub metrics: RuntimeMetrics,
}

impl AdminStatus {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ───────────────────────────────────────────────────────────────
// AppService
// ───────────────────────────────────────────────────────────────

/// The application service orchestrates all domain logic.
pub struct AppService<'a> {
    fsm: Fsm,
    ctx: FsmContext,
    pulses: &'a PulseAccumulator,
    button: ButtonDebouncer<'a>,
}

impl<'a> AppService<'a> {
    /// Construct the service from configuration and push the metering
    /// parameters down to the pulse accumulator.
    ///
    /// Does **not** start the FSM — call [`start`](Self::start) next.
    pub fn new(config: SystemConfig, pulses: &'a PulseAccumulator, edges: &'a EdgeQueue) -> Self {
        pulses.configure(config.pulses_per_wh, config.pulse_debounce_ms);
        let button = ButtonDebouncer::new(edges, config.button_debounce_ms, config.long_press_ms);
        let ctx = FsmContext::new(config);
        let fsm = Fsm::new(build_state_table(), StateId::WifiConnect);

        Self {
            fsm,
            ctx,
            pulses,
            button,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Start the FSM in its initial state (WifiConnect).
    pub fn start(&mut self, sink: &mut dyn EventSink) {
        self.fsm.start(&mut self.ctx);
        sink.emit(&AppEvent::Started(self.fsm.current_state()));
        info!("AppService started in {:?}", self.fsm.current_state());
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one step: snapshot inputs → phase → seal sample at cycle end.
    pub fn tick(&mut self, now_ms: u64, ports: &mut Ports<'_>) -> Step {
        self.ctx.now_ms = now_ms;
        // Millisecond timestamps on the ISR side wrap at u32; the
        // accumulators only compare differences.
        let now32 = now_ms as u32;

        // 1. Debounced button press, latched until ButtonCheck consumes it
        let press = self.button.poll(now32);
        if press != ButtonEvent::None {
            debug!("Button: {:?}", press);
            self.ctx.latch_button(press);
        }

        // 2. Live power from pulse spacing
        let watts = self
            .pulses
            .instantaneous_rate_estimate(now32, self.ctx.config.live_stale_ms());
        self.ctx.set_live_watts(watts);

        // 3. One phase
        let step = self.fsm.tick(&mut self.ctx, ports);
        if step.changed_state() {
            ports.sink.emit(&AppEvent::StateChanged {
                from: step.from,
                to: step.to,
            });
        }

        // 4. Cycle boundary
        if step.from == StateId::DisplayRefresh {
            self.seal_sample_if_due(ports.sink);
        }

        step
    }

    /// Forward a timer event from the main loop.
    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::ClockTick => self.ctx.clock_tick(),
            Event::LogIntervalElapsed => self.ctx.log_due = true,
        }
    }

    /// Record a free-heap reading for the heap row.
    pub fn observe_heap(&mut self, free_bytes: u32) {
        self.ctx.set_heap_free(free_bytes);
    }

    /// Seal the accumulated energy into a sample, unless the previous one
    /// is still in flight.  Pulses keep accumulating meanwhile.
    fn seal_sample_if_due(&mut self, sink: &mut dyn EventSink) {
        if !self.ctx.log_due || self.ctx.pending_sample.is_some() {
            return;
        }
        let wh = self.pulses.drain_watt_hours_since_last();
        let sample = self.ctx.seal_sample(wh);
        debug!(
            "Sample sealed: {} Wh @ {} (today {} Wh)",
            sample.watt_hours,
            sample.timestamp,
            self.ctx.today.watt_hours()
        );
        sink.emit(&AppEvent::SampleSealed(sample));
    }

    // ── Queries ──────────────────────────────────────────────

    pub fn state(&self) -> StateId {
        self.fsm.current_state()
    }

    /// Latest instantaneous power, watts.
    pub fn live_power_usage(&self) -> u16 {
        self.ctx.live_watts
    }

    /// Energy since local midnight, watt-hours.
    pub fn today_power_usage(&self) -> u16 {
        self.ctx.today.watt_hours()
    }

    pub fn is_local_only(&self) -> bool {
        self.ctx.is_local_only()
    }

    /// Wall clock as of the last tick, `None` before the first sync.
    pub fn clock_epoch(&self) -> Option<u32> {
        self.ctx.wall_epoch()
    }

    pub fn dirty_fields(&self) -> DisplayFieldMask {
        self.ctx.dirty
    }

    pub fn restart_requested(&self) -> bool {
        self.ctx.restart_requested
    }

    pub fn metrics(&self) -> RuntimeMetrics {
        self.ctx.metrics
    }

    /// Read-only access to the context (for diagnostics / tests).
    pub fn context(&self) -> &FsmContext {
        &self.ctx
    }

    pub fn admin_status(&self) -> AdminStatus {
        let (ssid, ip) = match &self.ctx.link {
            Some(link) => (link.ssid.clone(), Some(link.ip)),
            None => (heapless::String::new(), None),
        };
        AdminStatus {
            state: self.state(),
            status: self.ctx.status,
            live_watts: self.live_power_usage(),
            today_wh: self.today_power_usage(),
            local_only: self.is_local_only(),
            clock: self.clock_epoch(),
            ssid,
            ip,
            metric: self.ctx.metric,
            total_pulses: self.pulses.total_pulses(),
            heap_free: self.ctx.heap_free,
            uptime_ms: self.ctx.now_ms,
            metrics: self.ctx.metrics,
        }
    }
}
