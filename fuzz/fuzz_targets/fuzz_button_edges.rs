//! Fuzz target: `ButtonDebouncer::poll`
//!
//! Interprets the input as a stream of (gap, level) edge records pushed
//! through the ISR-side queue, polling between them.  The debouncer must
//! never panic and never report more presses than press edges it saw.
//!
//! cargo fuzz run fuzz_button_edges

#![no_main]

use libfuzzer_sys::fuzz_target;
use powermeter::drivers::button::{ButtonDebouncer, ButtonEvent, EdgeQueue};

fuzz_target!(|data: &[u8]| {
    let queue = EdgeQueue::new();
    let mut debouncer = ButtonDebouncer::new(&queue, 50, 1000);

    let mut now: u32 = 0;
    let mut presses = 0usize;
    let mut events = 0usize;

    for chunk in data.chunks(3) {
        let [lo, hi, flags] = *chunk else { break };
        now = now.wrapping_add(u32::from(u16::from_le_bytes([lo, hi])));
        let pressed = flags & 1 == 1;
        if queue.on_edge_interrupt(pressed, now) && pressed {
            presses += 1;
        }
        // Bit 1 skips the poll so the queue can fill up.
        if flags & 2 == 0 && debouncer.poll(now) != ButtonEvent::None {
            events += 1;
        }
    }
    if debouncer.poll(now.wrapping_add(5_000)) != ButtonEvent::None {
        events += 1;
    }

    assert!(events <= presses, "{} events from {} presses", events, presses);
});
