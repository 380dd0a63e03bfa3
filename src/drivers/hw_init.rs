//! One-shot GPIO and interrupt setup.
//!
//! Configures the pulse sensor and button inputs with raw ESP-IDF sys
//! calls and registers their ISRs.  Called once from `main()` before the
//! event loop starts.
//!
//! The ISRs feed two process-wide accumulators, [`PULSES`] and
//! [`BUTTON_EDGES`]; the main loop borrows them for the application
//! service.  Both are lock-light and const-constructed.

use crate::drivers::button::EdgeQueue;
use crate::error::Result;
use crate::sensors::pulse::PulseAccumulator;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use log::{info, warn};

#[cfg(target_os = "espidf")]
use crate::error::Error;

#[cfg(target_os = "espidf")]
use crate::pins;

// ── ISR-shared state ──────────────────────────────────────────

/// Meter pulses counted by the sensor ISR.
pub static PULSES: PulseAccumulator = PulseAccumulator::new();

/// Raw button edges queued by the button ISR.
pub static BUTTON_EDGES: EdgeQueue = EdgeQueue::new();

// ── GPIO inputs ───────────────────────────────────────────────

/// Map an ESP-IDF return code onto the boot error, logging the raw code.
#[cfg(target_os = "espidf")]
fn esp_check(ret: esp_err_t, what: &'static str) -> Result<()> {
    if ret == ESP_OK as i32 {
        Ok(())
    } else {
        warn!("hw_init: {} failed (rc={})", what, ret);
        Err(Error::Init(what))
    }
}

#[cfg(target_os = "espidf")]
unsafe fn configure_input(pin: i32, intr: gpio_int_type_t) -> Result<()> {
    let cfg = gpio_config_t {
        pin_bit_mask: 1u64 << pin,
        mode: gpio_mode_t_GPIO_MODE_INPUT,
        pull_up_en: gpio_pullup_t_GPIO_PULLUP_ENABLE,
        pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
        intr_type: intr,
    };
    esp_check(unsafe { gpio_config(&cfg) }, "gpio config")
}

#[cfg(target_os = "espidf")]
fn isr_now_ms() -> u32 {
    // SAFETY: esp_timer_get_time is an RTC counter read; safe in ISR context.
    (unsafe { esp_timer_get_time() } / 1_000) as u32
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn pulse_gpio_isr(_arg: *mut core::ffi::c_void) {
    PULSES.on_pulse_interrupt(isr_now_ms());
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn button_gpio_isr(_arg: *mut core::ffi::c_void) {
    // Active-low: a low level after the edge means the button is down.
    // SAFETY: gpio_get_level is a register read; safe in ISR context.
    let pressed = unsafe { gpio_get_level(pins::BUTTON_GPIO) } == 0;
    BUTTON_EDGES.on_edge_interrupt(pressed, isr_now_ms());
}

/// Configure the inputs, install the per-pin ISR service and register the
/// pulse (rising edge) and button (any edge) handlers.
#[cfg(target_os = "espidf")]
pub fn init_inputs() -> Result<()> {
    // SAFETY: called once from main() before the event loop.  The handlers
    // are static functions that only touch the lock-light accumulators.
    unsafe {
        configure_input(pins::PULSE_SENSOR_GPIO, gpio_int_type_t_GPIO_INTR_POSEDGE)?;
        configure_input(pins::BUTTON_GPIO, gpio_int_type_t_GPIO_INTR_ANYEDGE)?;

        // Already installed by another driver is fine.
        let ret = gpio_install_isr_service(0);
        if ret != ESP_ERR_INVALID_STATE as i32 {
            esp_check(ret, "isr service install")?;
        }

        esp_check(
            gpio_isr_handler_add(
                pins::PULSE_SENSOR_GPIO,
                Some(pulse_gpio_isr),
                core::ptr::null_mut(),
            ),
            "pulse isr add",
        )?;
        esp_check(
            gpio_isr_handler_add(
                pins::BUTTON_GPIO,
                Some(button_gpio_isr),
                core::ptr::null_mut(),
            ),
            "button isr add",
        )?;
        gpio_intr_enable(pins::PULSE_SENSOR_GPIO);
        gpio_intr_enable(pins::BUTTON_GPIO);
    }
    info!("hw_init: ISR service installed (pulse, button)");
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_inputs() -> Result<()> {
    log::info!("hw_init(sim): GPIO/ISR setup skipped");
    Ok(())
}
