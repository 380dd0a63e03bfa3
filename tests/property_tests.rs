//! Property and fuzz-style tests for robustness of core data structures.
//!
//! Runs on host (x86_64) only — proptest is not available for ESP32 targets.
//! On ESP32, these tests are compiled out.

#![cfg(not(target_os = "espidf"))]

use powermeter::display::DisplayFieldMask;
use powermeter::drivers::button::{ButtonDebouncer, ButtonEvent, EdgeQueue};
use powermeter::energy::{DailyTotal, EnergySample};
use powermeter::events::{Event, EventQueue};
use powermeter::retry::RetryBudget;
use powermeter::sensors::pulse::PulseAccumulator;
use proptest::prelude::*;

const DEBOUNCE_MS: u32 = 100;
const LONG_PRESS_MS: u32 = 2000;

// ── Pulse accounting ──────────────────────────────────────────

proptest! {
    /// Draining at arbitrary points never creates or loses energy: every
    /// whole watt-hour comes out exactly once and less than one Wh of
    /// pulses stays pending.
    #[test]
    fn pulse_drains_conserve_energy(
        ppw in 1u16..=10,
        pulses in proptest::collection::vec((1u32..5_000, any::<bool>()), 0..200),
    ) {
        let acc = PulseAccumulator::new();
        acc.configure(ppw, 0);

        let mut now = 0u32;
        let mut drained = 0u32;
        for (gap, drain_after) in &pulses {
            now += gap;
            acc.on_pulse_interrupt(now);
            if *drain_after {
                drained += u32::from(acc.drain_watt_hours_since_last());
            }
        }
        drained += u32::from(acc.drain_watt_hours_since_last());

        let total = acc.total_pulses();
        prop_assert_eq!(total as usize, pulses.len());
        prop_assert!(drained * u32::from(ppw) <= total);
        prop_assert!(total - drained * u32::from(ppw) < u32::from(ppw));
    }

    /// Pulses closer than the ringing filter are never counted.
    #[test]
    fn ringing_is_filtered(
        debounce in 1u32..500,
        gaps in proptest::collection::vec(0u32..1_000, 1..100),
    ) {
        let acc = PulseAccumulator::new();
        acc.configure(1, debounce);

        let mut now = 10_000u32;
        let mut last_accepted: Option<u32> = None;
        let mut expected = 0u32;
        for gap in gaps {
            now += gap;
            acc.on_pulse_interrupt(now);
            if last_accepted.is_none_or(|t| now - t >= debounce) {
                last_accepted = Some(now);
                expected += 1;
            }
        }
        prop_assert_eq!(acc.total_pulses(), expected);
    }

    /// The live estimate is zero once the meter has gone quiet.
    #[test]
    fn live_power_drops_to_zero_when_stale(
        spacing in 1u32..10_000,
        stale in 1u32..600_000,
    ) {
        let acc = PulseAccumulator::new();
        acc.configure(1, 0);
        acc.on_pulse_interrupt(1_000);
        acc.on_pulse_interrupt(1_000 + spacing);
        let after = 1_000 + spacing + stale + 1;
        prop_assert_eq!(acc.instantaneous_rate_estimate(after, stale), 0);
    }
}

// ── Button debouncing ─────────────────────────────────────────

proptest! {
    /// Clean presses (settled well past the debounce window) produce
    /// exactly one event each, classified by hold time.
    #[test]
    fn clean_presses_classified_by_hold(
        presses in proptest::collection::vec((DEBOUNCE_MS..1_000, DEBOUNCE_MS..5_000), 1..20),
    ) {
        let q = EdgeQueue::new();
        let mut b = ButtonDebouncer::new(&q, DEBOUNCE_MS, LONG_PRESS_MS);

        let mut now = 1_000u32;
        for (gap, hold) in presses {
            now += gap;
            prop_assert!(q.on_edge_interrupt(true, now));
            prop_assert!(q.on_edge_interrupt(false, now + hold));
            now += hold;

            let expected = if hold >= LONG_PRESS_MS {
                ButtonEvent::LongPress
            } else {
                ButtonEvent::ShortPress
            };
            prop_assert_eq!(b.poll(now + 1), expected);
            prop_assert_eq!(b.poll(now + 2), ButtonEvent::None);
            prop_assert!(!b.is_down());
        }
    }

    /// Arbitrary bouncy input never yields more events than presses and
    /// never panics.
    #[test]
    fn bounce_never_invents_presses(
        edges in proptest::collection::vec((0u32..300, any::<bool>()), 0..64),
    ) {
        let q = EdgeQueue::new();
        let mut b = ButtonDebouncer::new(&q, DEBOUNCE_MS, LONG_PRESS_MS);

        let mut now = 0u32;
        let mut presses = 0usize;
        let mut events = 0usize;
        for (gap, pressed) in edges {
            now += gap;
            if q.on_edge_interrupt(pressed, now) && pressed {
                presses += 1;
            }
            if b.poll(now) != ButtonEvent::None {
                events += 1;
            }
        }
        // Let any unsettled edge resolve.
        for t in 1..=10 {
            if b.poll(now + t * DEBOUNCE_MS) != ButtonEvent::None {
                events += 1;
            }
        }
        prop_assert!(events <= presses);
    }
}

// ── Retry budget ──────────────────────────────────────────────

proptest! {
    #[test]
    fn budget_grants_limit_plus_one_attempts(limit in 0u32..32) {
        let mut budget = RetryBudget::new(limit);
        let mut granted = 0;
        for _ in 0..(limit + 10) {
            if budget.attempt() {
                granted += 1;
            }
        }
        prop_assert_eq!(granted, limit + 1);
        prop_assert!(budget.is_exhausted());

        budget.reset();
        prop_assert!(!budget.is_exhausted());
        prop_assert!(budget.attempt());
    }
}

// ── Daily total ───────────────────────────────────────────────

proptest! {
    /// Samples within one local day add up (saturating at the 16-bit
    /// reporting range); the first sample of the next day resets.
    #[test]
    fn daily_total_sums_within_a_day(
        day in 18_262i64..30_000,
        samples in proptest::collection::vec((0u32..86_400, any::<u16>()), 1..50),
    ) {
        let midnight = (day * 86_400) as u32;
        let mut total = DailyTotal::default();
        let mut expected = 0u32;
        for (offset, wh) in &samples {
            let rolled = total.add(&EnergySample::new(midnight + offset, *wh), 0);
            prop_assert!(!rolled);
            expected += u32::from(*wh);
        }
        prop_assert_eq!(u32::from(total.watt_hours()), expected.min(u32::from(u16::MAX)));

        prop_assert!(total.add(&EnergySample::new(midnight + 86_400, 7), 0));
        prop_assert_eq!(total.watt_hours(), 7);
    }
}

// ── Small containers ──────────────────────────────────────────

proptest! {
    #[test]
    fn mask_iterates_each_set_field_once(bits in any::<u8>()) {
        let mask = DisplayFieldMask::from_bits(bits);
        prop_assert_eq!(mask.fields().count() as u32, bits.count_ones());
        for field in mask.fields() {
            prop_assert!(mask.has(field));
        }
    }

    #[test]
    fn event_queue_is_fifo_and_bounded(
        events in proptest::collection::vec(any::<bool>(), 0..40),
    ) {
        let q = EventQueue::new();
        let mut accepted = Vec::new();
        for tick in events {
            let e = if tick { Event::ClockTick } else { Event::LogIntervalElapsed };
            if q.push(e) {
                accepted.push(e);
            }
        }
        prop_assert!(accepted.len() <= 15);

        let mut drained = Vec::new();
        q.drain(|e| drained.push(e));
        prop_assert_eq!(drained, accepted);
        prop_assert!(q.is_empty());
    }
}
