//! Timer-driven event queue.
//!
//! Events are produced by esp_timer callbacks (or by the simulation loop)
//! and consumed by the main loop, which forwards them to the application
//! service before running the next state machine step.
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ 1 Hz timer  │────▶│  EventQueue  │────▶│  Main Loop   │
//! │ Log timer   │────▶│  (lock-free) │     │  (consumer)  │
//! └─────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! Pulse and button edges do not travel through this queue; they have
//! their own ISR-side accumulators.

use core::sync::atomic::{AtomicU8, Ordering};

/// Maximum number of pending events (one slot is kept free).
const EVENT_QUEUE_CAP: usize = 16;

/// Periodic events delivered to the main loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Event {
    /// Wall-clock second elapsed; refreshes the time-of-day field.
    ClockTick = 1,
    /// Logging interval elapsed; arms the next energy sample.
    LogIntervalElapsed = 2,
}

impl Event {
    fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Self::ClockTick),
            2 => Some(Self::LogIntervalElapsed),
            _ => None,
        }
    }
}

// ── Lock-free SPSC ring buffer ────────────────────────────────
//
// Timer callbacks write (produce), the main loop reads (consume).
// Slots are atomics, so no `unsafe` is needed to share the buffer.

/// Single-producer / single-consumer event ring.
pub struct EventQueue {
    head: AtomicU8,
    tail: AtomicU8,
    slots: [AtomicU8; EVENT_QUEUE_CAP],
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EventQueue {
    pub const fn new() -> Self {
        Self {
            head: AtomicU8::new(0),
            tail: AtomicU8::new(0),
            slots: [const { AtomicU8::new(0) }; EVENT_QUEUE_CAP],
        }
    }

    /// Push an event.  Safe to call from timer / ISR context.
    /// Returns `false` if the queue is full (event dropped).
    pub fn push(&self, event: Event) -> bool {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        let next_head = (head + 1) % EVENT_QUEUE_CAP as u8;

        if next_head == tail {
            return false;
        }

        self.slots[head as usize].store(event as u8, Ordering::Relaxed);
        self.head.store(next_head, Ordering::Release);
        true
    }

    /// Pop the next event (main loop only).
    pub fn pop(&self) -> Option<Event> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);

        if tail == head {
            return None;
        }

        let raw = self.slots[tail as usize].load(Ordering::Relaxed);
        self.tail
            .store((tail + 1) % EVENT_QUEUE_CAP as u8, Ordering::Release);

        Event::from_u8(raw)
    }

    /// Drain all pending events into a callback, in FIFO order.
    pub fn drain(&self, mut handler: impl FnMut(Event)) {
        while let Some(event) = self.pop() {
            handler(event);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tail.load(Ordering::Relaxed) == self.head.load(Ordering::Acquire)
    }

    /// Number of pending events.
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Relaxed) as usize;
        let tail = self.tail.load(Ordering::Relaxed) as usize;
        (head + EVENT_QUEUE_CAP - tail) % EVENT_QUEUE_CAP
    }
}

/// Process-wide queue fed by the hardware timers.
pub static EVENTS: EventQueue = EventQueue::new();

/// Push onto [`EVENTS`] from timer context.  `false` means dropped.
pub fn push_event(event: Event) -> bool {
    EVENTS.push(event)
}
