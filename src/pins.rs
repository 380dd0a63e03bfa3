//! GPIO / peripheral pin assignments for the power meter board (ESP32
//! DevKitC carrier).
//!
//! Single source of truth: every driver references this module rather than
//! hard-coding pin numbers.

// ---------------------------------------------------------------------------
// Meter pulse sensor
// ---------------------------------------------------------------------------

/// Photodiode comparator output, one rising edge per meter LED flash.
pub const PULSE_SENSOR_GPIO: i32 = 27;

// ---------------------------------------------------------------------------
// User button (active-low with pull-up)
// ---------------------------------------------------------------------------

/// The DevKitC BOOT button.  Short press toggles the metric, long press
/// forces a reconnect.
pub const BUTTON_GPIO: i32 = 0;

// ---------------------------------------------------------------------------
// Status LED
// ---------------------------------------------------------------------------

/// On-board blue LED, blinked on every meter pulse.
pub const STATUS_LED_GPIO: i32 = 2;

// ---------------------------------------------------------------------------
// I²C bus (SSD1306 OLED)
// ---------------------------------------------------------------------------

pub const I2C_SDA_GPIO: i32 = 21;
pub const I2C_SCL_GPIO: i32 = 22;
/// Bus clock for the display.
pub const I2C_FREQ_HZ: u32 = 400_000;

// ---------------------------------------------------------------------------
// SD card (SPI)
// ---------------------------------------------------------------------------

pub const SD_CS_GPIO: i32 = 5;
pub const SD_SCK_GPIO: i32 = 18;
pub const SD_MOSI_GPIO: i32 = 23;
pub const SD_MISO_GPIO: i32 = 19;
