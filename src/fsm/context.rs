//! Shared mutable context threaded through every FSM phase.
//!
//! `FsmContext` is the single struct that phases read from and write to.
//! It holds the retry budget of the running state, connectivity and wall
//! clock status, the latched button press, the pending energy sample, and
//! the display dirty mask.  Think of it as the "blackboard" in a
//! blackboard architecture.
//!
//! Every setter that changes something visible marks the matching display
//! field dirty; the display phase redraws only what is marked.

use crate::app::ports::LinkInfo;
use crate::clock::WallClock;
use crate::config::SystemConfig;
use crate::diagnostics::RuntimeMetrics;
use crate::display::{CivilDateTime, DisplayFieldMask, DisplayMetric, DisplayValues};
use crate::drivers::button::ButtonEvent;
use crate::energy::{DailyTotal, EnergySample, local_day};
use crate::fsm::StateId;
use crate::retry::RetryBudget;

/// Status line texts.  Short enough for the status row.
pub mod status {
    pub const BOOTING: &str = "Booting";
    pub const CONNECTING: &str = "Connecting";
    pub const ONLINE: &str = "Online";
    pub const OFFLINE: &str = "Offline";
    pub const SYNC_FAILED: &str = "No time";
    pub const PUSH_FAILED: &str = "Push fail";
    pub const LOG_FAILED: &str = "SD error";
    pub const UPDATED: &str = "Updated";
}

// ---------------------------------------------------------------------------
// Connectivity
// ---------------------------------------------------------------------------

/// Whether network phases run this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectivityMode {
    #[default]
    Online,
    /// Connection budget ran out at `since_ms`; network phases are skipped
    /// until the cooldown elapses or the user forces a reconnect.
    LocalOnly { since_ms: u64 },
}

// ---------------------------------------------------------------------------
// FsmContext
// ---------------------------------------------------------------------------

/// The shared context passed to every phase function.
pub struct FsmContext {
    // -- Timing --
    /// Uptime of the current step, milliseconds.
    pub now_ms: u64,

    // -- Configuration --
    pub config: SystemConfig,

    /// Attempts left for the running state.  Re-armed on every entry.
    pub retry: RetryBudget,

    // -- Connectivity --
    pub link: Option<LinkInfo>,
    pub mode: ConnectivityMode,
    pub status: &'static str,

    // -- Time --
    pub clock: WallClock,
    /// Local day currently shown on the date row.
    shown_day: Option<i64>,

    // -- Input --
    /// Latest debounced press not yet consumed by the button phase.
    button: ButtonEvent,
    pub metric: DisplayMetric,

    // -- Energy --
    pub live_watts: u16,
    pub today: DailyTotal,
    /// Sealed sample waiting for Publish and LocalLog.
    pub pending_sample: Option<EnergySample>,
    /// The log interval elapsed; seal a sample at the next cycle boundary.
    pub log_due: bool,

    // -- Display --
    pub dirty: DisplayFieldMask,
    pub heap_free: u32,

    // -- Misc --
    /// Set when a firmware image was installed; the main loop restarts.
    pub restart_requested: bool,
    pub metrics: RuntimeMetrics,
}

impl FsmContext {
    /// Create a new context with the given configuration.  Every display
    /// field starts dirty so the first refresh paints the whole screen.
    pub fn new(config: SystemConfig) -> Self {
        let retry = RetryBudget::new(config.retry_limit_for(StateId::WifiConnect));
        Self {
            now_ms: 0,
            config,
            retry,
            link: None,
            mode: ConnectivityMode::Online,
            status: status::BOOTING,
            clock: WallClock::unset(),
            shown_day: None,
            button: ButtonEvent::None,
            metric: DisplayMetric::default(),
            live_watts: 0,
            today: DailyTotal::default(),
            pending_sample: None,
            log_due: false,
            dirty: DisplayFieldMask::ALL,
            heap_free: 0,
            restart_requested: false,
            metrics: RuntimeMetrics::default(),
        }
    }

    /// Fresh budget for `state`, sized from the configuration.
    pub fn arm_retry(&mut self, state: StateId) {
        self.retry = RetryBudget::new(self.config.retry_limit_for(state));
    }

    pub fn mark_dirty(&mut self, fields: DisplayFieldMask) {
        self.dirty.insert(fields);
    }

    pub fn set_status(&mut self, text: &'static str) {
        if self.status != text {
            self.status = text;
            self.dirty.insert(DisplayFieldMask::STATUS);
        }
    }

    /// Status text for the current connectivity alone.
    pub fn connectivity_status(&self) -> &'static str {
        if self.is_local_only() || self.link.is_none() {
            status::OFFLINE
        } else {
            status::ONLINE
        }
    }

    /// Replace a failure status with the connectivity status, but only
    /// if `failed` is what is currently shown.
    pub fn clear_status(&mut self, failed: &'static str) {
        if self.status == failed {
            self.set_status(self.connectivity_status());
        }
    }

    pub fn set_link(&mut self, link: Option<LinkInfo>) {
        if self.link != link {
            self.link = link;
            self.dirty.insert(DisplayFieldMask::SSID | DisplayFieldMask::IP);
        }
    }

    pub fn set_live_watts(&mut self, watts: u16) {
        if self.live_watts != watts {
            self.live_watts = watts;
            self.dirty.insert(DisplayFieldMask::NOW);
        }
    }

    pub fn set_heap_free(&mut self, bytes: u32) {
        if self.heap_free != bytes {
            self.heap_free = bytes;
            self.dirty.insert(DisplayFieldMask::HEAP);
        }
    }

    // -- Button latch --

    /// Latch a press.  A newer press overwrites an unconsumed one.
    pub fn latch_button(&mut self, event: ButtonEvent) {
        if event != ButtonEvent::None {
            self.button = event;
        }
    }

    /// Consume the latched press, leaving the latch empty.
    pub fn take_button(&mut self) -> ButtonEvent {
        core::mem::take(&mut self.button)
    }

    pub fn pending_button(&self) -> ButtonEvent {
        self.button
    }

    // -- Local-only mode --

    pub fn is_local_only(&self) -> bool {
        matches!(self.mode, ConnectivityMode::LocalOnly { .. })
    }

    pub fn enter_local_only(&mut self) {
        self.mode = ConnectivityMode::LocalOnly {
            since_ms: self.now_ms,
        };
        RuntimeMetrics::bump(&mut self.metrics.local_only_entries);
        self.set_status(status::OFFLINE);
    }

    pub fn leave_local_only(&mut self) {
        self.mode = ConnectivityMode::Online;
    }

    /// `true` once the configured cooldown has run since local-only mode
    /// began.  Always `true` when online.
    pub fn local_only_cooldown_elapsed(&self) -> bool {
        match self.mode {
            ConnectivityMode::Online => true,
            ConnectivityMode::LocalOnly { since_ms } => {
                self.now_ms.saturating_sub(since_ms) >= self.config.local_only_cooldown_ms()
            }
        }
    }

    // -- Wall clock --

    /// Seconds since the Unix epoch, `None` before the first sync.
    pub fn wall_epoch(&self) -> Option<u32> {
        self.clock.now(self.now_ms)
    }

    /// Set the clock from a fresh sync and repaint date and time.
    pub fn sync_clock(&mut self, epoch: u32) {
        self.clock.set(epoch, self.now_ms);
        self.dirty
            .insert(DisplayFieldMask::DATE | DisplayFieldMask::TIME);
        self.refresh_day();
    }

    /// One wall-clock second passed.  Marks the time row and, when the
    /// local date changed, the date row plus a reset of today's total.
    pub fn clock_tick(&mut self) {
        if self.clock.is_set() {
            self.dirty.insert(DisplayFieldMask::TIME);
            self.refresh_day();
        }
    }

    fn refresh_day(&mut self) {
        let Some(epoch) = self.wall_epoch() else {
            return;
        };
        let day = local_day(epoch, self.config.utc_offset_secs);
        if self.shown_day != Some(day) {
            self.shown_day = Some(day);
            self.dirty.insert(DisplayFieldMask::DATE);
            if self.today.roll_to(day) {
                self.dirty.insert(DisplayFieldMask::TODAY);
            }
        }
    }

    /// Local wall-clock time, `None` before the first sync.
    pub fn local_time(&self) -> Option<CivilDateTime> {
        self.wall_epoch().map(|epoch| {
            CivilDateTime::from_epoch(i64::from(epoch) + i64::from(self.config.utc_offset_secs))
        })
    }

    // -- Energy --

    /// Stamp `watt_hours` with the wall clock (0 when unset), fold it into
    /// today's total, and queue it for Publish and LocalLog.
    pub fn seal_sample(&mut self, watt_hours: u16) -> EnergySample {
        let sample = EnergySample::new(self.clock.now_or_zero(self.now_ms), watt_hours);
        self.today.add(&sample, self.config.utc_offset_secs);
        self.pending_sample = Some(sample);
        self.log_due = false;
        RuntimeMetrics::bump(&mut self.metrics.samples_sealed);
        self.dirty.insert(DisplayFieldMask::TODAY);
        sample
    }

    /// Snapshot of everything the display may draw.
    pub fn display_values(&self) -> DisplayValues {
        let (ssid, ip) = match &self.link {
            Some(link) => (link.ssid.clone(), Some(link.ip)),
            None => (heapless::String::new(), None),
        };
        DisplayValues {
            ssid,
            status: self.status,
            ip,
            local_time: self.local_time(),
            now_watts: self.live_watts,
            today_wh: self.today.watt_hours(),
            heap_free: self.heap_free,
            metric: self.metric,
        }
    }
}
