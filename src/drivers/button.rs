//! ISR-fed button debouncer with short and long press classification.
//!
//! ## Hardware
//!
//! Active-low momentary switch with pull-up.  The GPIO fires on both
//! edges; the ISR samples the line level and queues a [`RawEdge`] with its
//! timestamp.  [`ButtonDebouncer::poll`], called once per main-loop
//! iteration, drains the queue and runs the press state machine.
//!
//! ## State machine
//!
//! ```text
//!            press                 hold ≥ long_press_ms
//!   Idle ──────────────▶ Pressed ──────────────────────▶ Held
//!    ▲                     │                              │
//!    │  release → ShortPress                              │
//!    └─────────────────────┘◀─────────────────────────────┘
//!                              release → LongPress
//! ```
//!
//! An edge arriving less than `debounce_ms` after the previous recognised
//! transition is discarded.  The line level it leaves behind is kept and,
//! once the window has passed, the state is silently resynchronised to it
//! so contact bounce can never wedge the machine in `Pressed`.  A press
//! entered that way is disarmed: its release produces no event.

use core::cell::RefCell;
use core::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use heapless::Deque;
use log::debug;

/// Edges buffered between two polls.
pub const EDGE_QUEUE_CAP: usize = 16;

/// Classified button gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ButtonEvent {
    #[default]
    None,
    ShortPress,
    LongPress,
}

/// One level change seen by the GPIO ISR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEdge {
    /// Line level after the edge (`true` = button down).
    pub pressed: bool,
    /// Milliseconds since boot, truncated to u32.
    pub at_ms: u32,
}

// ── ISR side ──────────────────────────────────────────────────

/// Bounded edge buffer shared between the button ISR and the main loop.
pub struct EdgeQueue {
    edges: Mutex<CriticalSectionRawMutex, RefCell<Deque<RawEdge, EDGE_QUEUE_CAP>>>,
    dropped: AtomicU32,
}

impl Default for EdgeQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EdgeQueue {
    pub const fn new() -> Self {
        Self {
            edges: Mutex::new(RefCell::new(Deque::new())),
            dropped: AtomicU32::new(0),
        }
    }

    /// Record an edge.  ISR-safe.  Returns `false` (and counts the drop)
    /// when the buffer is full.
    pub fn on_edge_interrupt(&self, pressed: bool, now_ms: u32) -> bool {
        let edge = RawEdge {
            pressed,
            at_ms: now_ms,
        };
        let queued = self
            .edges
            .lock(|q| q.borrow_mut().push_back(edge).is_ok());
        if !queued {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        queued
    }

    /// Move every buffered edge out in one short critical section.
    pub fn take_all(&self) -> Deque<RawEdge, EDGE_QUEUE_CAP> {
        self.edges
            .lock(|q| core::mem::replace(&mut *q.borrow_mut(), Deque::new()))
    }

    /// Edges lost because the main loop fell behind.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }
}

// ── Main-loop side ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PressState {
    Idle,
    Pressed { since_ms: u32, armed: bool },
    Held { since_ms: u32, armed: bool },
}

pub struct ButtonDebouncer<'a> {
    edges: &'a EdgeQueue,
    debounce_ms: u32,
    long_press_ms: u32,
    state: PressState,
    last_transition_ms: Option<u32>,
    /// Last edge discarded inside the debounce window.
    unsettled: Option<RawEdge>,
    ready: Deque<ButtonEvent, 4>,
}

impl<'a> ButtonDebouncer<'a> {
    pub fn new(edges: &'a EdgeQueue, debounce_ms: u32, long_press_ms: u32) -> Self {
        Self {
            edges,
            debounce_ms,
            long_press_ms,
            state: PressState::Idle,
            last_transition_ms: None,
            unsettled: None,
            ready: Deque::new(),
        }
    }

    /// Process queued edges and the hold timer.  Returns at most one event.
    pub fn poll(&mut self, now_ms: u32) -> ButtonEvent {
        let mut batch = self.edges.take_all();
        while let Some(edge) = batch.pop_front() {
            self.on_edge(edge);
        }
        self.resync(now_ms);

        if let PressState::Pressed { since_ms, armed } = self.state {
            if now_ms.wrapping_sub(since_ms) >= self.long_press_ms {
                debug!("button: held");
                self.state = PressState::Held { since_ms, armed };
            }
        }

        self.ready.pop_front().unwrap_or_default()
    }

    /// `true` while the debounced state says the button is down.
    pub fn is_down(&self) -> bool {
        !matches!(self.state, PressState::Idle)
    }

    fn in_window(&self, at_ms: u32) -> bool {
        self.last_transition_ms
            .is_some_and(|t| at_ms.wrapping_sub(t) < self.debounce_ms)
    }

    fn on_edge(&mut self, edge: RawEdge) {
        if self.in_window(edge.at_ms) {
            self.unsettled = Some(edge);
            return;
        }
        self.unsettled = None;
        self.apply(edge, true);
    }

    fn resync(&mut self, now_ms: u32) {
        let Some(edge) = self.unsettled else {
            return;
        };
        if self.in_window(now_ms) {
            return;
        }
        self.unsettled = None;
        self.apply(edge, false);
    }

    fn apply(&mut self, edge: RawEdge, recognised: bool) {
        match (self.state, edge.pressed) {
            (PressState::Idle, true) => {
                self.state = PressState::Pressed {
                    since_ms: edge.at_ms,
                    armed: recognised,
                };
                self.last_transition_ms = Some(edge.at_ms);
            }
            (
                prev @ (PressState::Pressed { since_ms, armed }
                | PressState::Held { since_ms, armed }),
                false,
            ) => {
                self.state = PressState::Idle;
                self.last_transition_ms = Some(edge.at_ms);
                if !(armed && recognised) {
                    return;
                }
                let held_ms = edge.at_ms.wrapping_sub(since_ms);
                let event = if matches!(prev, PressState::Held { .. })
                    || held_ms >= self.long_press_ms
                {
                    ButtonEvent::LongPress
                } else {
                    ButtonEvent::ShortPress
                };
                debug!("button: {:?} after {} ms", event, held_ms);
                let _ = self.ready.push_back(event);
            }
            // Same level as the current state: a repeated edge, nothing to do.
            _ => {}
        }
    }
}
