//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter      | Implements          | Connects to                   |
//! |--------------|---------------------|-------------------------------|
//! | `wifi`       | NetworkPort         | ESP-IDF WiFi STA              |
//! | `ota`        | FirmwareUpdatePort  | manifest server + esp-ota     |
//! | `sntp`       | TimeSourcePort      | ESP-IDF SNTP client           |
//! | `push`       | PushPort            | HTTP(S) web hook              |
//! | `mqtt`       | PushPort            | MQTT broker                   |
//! | `record_log` | RecordStorePort     | SD card (FAT via VFS)         |
//! | `sd_card`    | (mount)             | SD card over SPI              |
//! | `display`    | DisplayPort         | any `RowWriter`               |
//! | `oled`       | RowWriter           | SSD1306 over I²C              |
//! | `log_sink`   | EventSink           | Serial log output             |
//! | `nvs`        | ConfigPort          | NVS / in-memory store         |
//! |              | StoragePort         |                               |
//! | `time`       | (clock source)      | ESP32 boot timer              |

pub mod display;
pub mod log_sink;
pub mod mqtt;
pub mod nvs;
pub mod oled;
pub mod ota;
pub mod push;
pub mod record_log;
pub mod sd_card;
pub mod sntp;
pub mod time;
pub mod wifi;
