//! Power Meter Firmware — Main Entry Point
//!
//! Hexagonal architecture driven by one cooperative loop.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  WifiAdapter      OtaCheckAdapter  SntpTimeSource  HttpPush /  │
//! │  (Network)        (FirmwareUpdate) (TimeSource)    MqttPush    │
//! │  CsvRecordStore   RowDisplay<Oled> LogEventSink    NvsAdapter  │
//! │  (RecordStore)    (Display)        (EventSink)     (Config)    │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              AppService (pure logic)                   │    │
//! │  │  FSM · FsmContext · RetryBudget                        │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  ISRs: PULSES · BUTTON_EDGES      esp_timer: EVENTS            │
//! └────────────────────────────────────────────────────────────────┘
//! ```

#![deny(unused_must_use)]

use anyhow::Result;
use log::{error, info, warn};

use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::gpio::{AnyIOPin, AnyOutputPin, PinDriver};
use esp_idf_hal::i2c::{I2cConfig, I2cDriver};
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::units::Hertz;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::EspWifi;

use powermeter::adapters::display::{LogRows, RowDisplay};
use powermeter::adapters::log_sink::LogEventSink;
use powermeter::adapters::mqtt::{DEFAULT_TOPIC, MqttBroker, MqttPushAdapter};
use powermeter::adapters::nvs::{NvsAdapter, cred};
use powermeter::adapters::oled::OledRows;
use powermeter::adapters::ota::{self, OtaCheckAdapter};
use powermeter::adapters::push::{HttpPushAdapter, PushTarget};
use powermeter::adapters::record_log::CsvRecordStore;
use powermeter::adapters::sd_card::{SD_MOUNT_POINT, SdCard};
use powermeter::adapters::sntp::SntpTimeSource;
use powermeter::adapters::time::Esp32TimeAdapter;
use powermeter::adapters::wifi::{WifiAdapter, WifiCredentials};
use powermeter::app::ports::{ConfigPort, DisplayPort, Ports, PushPort};
use powermeter::app::service::AppService;
use powermeter::config::SystemConfig;
use powermeter::diagnostics;
use powermeter::drivers::hw_init::{self, BUTTON_EDGES, PULSES};
use powermeter::drivers::hw_timer;
use powermeter::drivers::status_led::PulseBlinker;
use powermeter::drivers::watchdog::{self, Watchdog};
use powermeter::events::EVENTS;
use powermeter::pins;

/// How often the free heap is sampled for the display.
const HEAP_SAMPLE_PERIOD_MS: u64 = 10_000;
/// How often the admin status snapshot is logged.
const STATUS_LOG_PERIOD_MS: u64 = 60_000;

fn load_wifi_credentials(nvs: &NvsAdapter) -> Option<WifiCredentials> {
    let ssid = nvs.credential_string::<32>(cred::WIFI_SSID)?;
    let password = nvs
        .credential_string::<64>(cred::WIFI_PASS)
        .unwrap_or_default();
    match WifiCredentials::new(&ssid, &password) {
        Ok(c) => Some(c),
        Err(e) => {
            warn!("Stored WiFi credentials rejected: {}", e);
            None
        }
    }
}

fn load_push_target(nvs: &NvsAdapter) -> Option<PushTarget> {
    let endpoint = nvs.credential_string::<160>(cred::PUSH_ENDPOINT)?;
    let token = nvs
        .credential_string::<64>(cred::PUSH_TOKEN)
        .unwrap_or_default();
    Some(PushTarget { endpoint, token })
}

fn load_mqtt_broker(nvs: &NvsAdapter) -> Option<MqttBroker> {
    let url = nvs.credential_string::<128>(cred::MQTT_URL)?;
    let topic = nvs
        .credential_string::<64>(cred::MQTT_TOPIC)
        .unwrap_or_else(|| {
            let mut t = heapless::String::new();
            let _ = t.push_str(DEFAULT_TOPIC);
            t
        });
    Some(MqttBroker {
        url,
        topic,
        username: nvs.credential_string::<32>(cred::MQTT_USER),
        password: nvs.credential_string::<64>(cred::MQTT_PASS),
    })
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;
    diagnostics::install_panic_handler();

    info!("╔══════════════════════════════════════╗");
    info!("║  PowerMeter v{}                      ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;

    // ── 2. Load config from NVS (or defaults) ─────────────────
    let nvs = NvsAdapter::new(nvs_partition.clone());
    let config = match nvs.load() {
        Ok(cfg) => {
            info!("Config loaded from NVS");
            cfg
        }
        Err(e) => {
            warn!("NVS config load failed ({}), using defaults", e);
            SystemConfig::default()
        }
    };

    // ── 3. Interrupts, timers, watchdog ───────────────────────
    if let Err(e) = hw_init::init_inputs() {
        error!("GPIO init failed: {}; continuing without pulse/button input", e);
    }
    hw_timer::start_timers(config.log_interval_secs);
    let watchdog = match Watchdog::new(watchdog::timeout_for(&config)) {
        Ok(wd) => Some(wd),
        Err(e) => {
            error!("Watchdog unavailable ({}); running unguarded", e);
            None
        }
    };
    let uptime = Esp32TimeAdapter::new();

    // ── 4. Construct adapters ─────────────────────────────────
    let esp_wifi = EspWifi::new(peripherals.modem, sysloop, Some(nvs_partition))?;
    let mut wifi = WifiAdapter::new(esp_wifi, config.wifi_connect_timeout_ms);
    match load_wifi_credentials(&nvs) {
        Some(c) => wifi.set_credentials(c),
        None => warn!("No WiFi credentials provisioned; running local-only"),
    }

    let mut push: Box<dyn PushPort> = if let Some(broker) = load_mqtt_broker(&nvs) {
        info!("Publishing samples to MQTT topic '{}'", broker.topic);
        Box::new(MqttPushAdapter::new(Some(broker)))
    } else {
        let push_target = load_push_target(&nvs);
        if push_target.is_none() {
            warn!("No push endpoint provisioned; samples are logged locally only");
        }
        Box::new(HttpPushAdapter::new(push_target, config.wifi_connect_timeout_ms))
    };
    let mut time_source = SntpTimeSource::new(config.time_sync_timeout_ms);
    let firmware_url = nvs.credential_string::<160>(cred::FIRMWARE_URL);
    if firmware_url.is_none() {
        info!("No firmware manifest provisioned; update checks only confirm the image");
    }
    let mut updater = OtaCheckAdapter::new(
        firmware_url,
        config.wifi_connect_timeout_ms,
        config.firmware_poll_period(),
    );

    // The mount guard lives for the whole program.
    let sd_card = match SdCard::mount_spi(peripherals.spi3) {
        Ok(card) => Some(card),
        Err(e) => {
            error!("SD card unavailable ({}); samples will count as log failures", e);
            None
        }
    };
    let mut records = match &sd_card {
        Some(card) => CsvRecordStore::on_card(card, config.utc_offset_secs),
        None => CsvRecordStore::new(SD_MOUNT_POINT, config.utc_offset_secs),
    };

    // SAFETY: the pin numbers come from the board map and are not claimed
    // by any other driver.
    let (sda, scl) = unsafe {
        (
            AnyIOPin::new(pins::I2C_SDA_GPIO),
            AnyIOPin::new(pins::I2C_SCL_GPIO),
        )
    };
    let i2c_config = I2cConfig::new().baudrate(Hertz(pins::I2C_FREQ_HZ));
    let mut display: Box<dyn DisplayPort> =
        match I2cDriver::new(peripherals.i2c0, sda, scl, &i2c_config) {
            Ok(i2c) => match OledRows::new(i2c) {
                Ok(oled) => Box::new(RowDisplay::new(oled)),
                Err(e) => {
                    warn!("OLED unavailable ({}), mirroring screen to the log", e);
                    Box::new(RowDisplay::new(LogRows))
                }
            },
            Err(e) => {
                warn!("I2C init failed ({}), mirroring screen to the log", e);
                Box::new(RowDisplay::new(LogRows))
            }
        };

    // SAFETY: as above, the LED pin is owned by this driver only.
    let led = PinDriver::output(unsafe { AnyOutputPin::new(pins::STATUS_LED_GPIO) })?;
    let mut blinker = PulseBlinker::new(led, config.blink_ms);

    let mut log_sink = LogEventSink::new();

    // ── 5. Construct app service ──────────────────────────────
    let mut app = AppService::new(config.clone(), &PULSES, &BUTTON_EDGES);
    app.start(&mut log_sink);

    info!("System ready. Entering main loop.");

    // ── 6. Main loop ──────────────────────────────────────────
    let mut next_heap_sample_ms: u64 = 0;
    let mut next_status_log_ms: u64 = STATUS_LOG_PERIOD_MS;

    loop {
        if let Some(wd) = &watchdog {
            wd.feed();
        }
        let now_ms = uptime.uptime_ms();

        EVENTS.drain(|event| app.handle_event(event));
        blinker.poll(PULSES.total_pulses(), now_ms);

        if now_ms >= next_heap_sample_ms {
            app.observe_heap(diagnostics::free_heap_bytes());
            next_heap_sample_ms = now_ms + HEAP_SAMPLE_PERIOD_MS;
        }

        let mut ports = Ports {
            network: &mut wifi,
            updater: &mut updater,
            time_source: &mut time_source,
            push: push.as_mut(),
            records: &mut records,
            display: display.as_mut(),
            sink: &mut log_sink,
        };
        app.tick(now_ms, &mut ports);

        if app.restart_requested() {
            info!("Restart requested; stopping timers");
            hw_timer::stop_timers();
            ota::restart();
        }

        if now_ms >= next_status_log_ms {
            match app.admin_status().to_json() {
                Ok(json) => info!("STATUS | {}", json),
                Err(e) => warn!("STATUS | serialisation failed: {}", e),
            }
            if BUTTON_EDGES.dropped() > 0 {
                warn!("Button: {} edges dropped", BUTTON_EDGES.dropped());
            }
            next_status_log_ms = now_ms + STATUS_LOG_PERIOD_MS;
        }

        FreeRtos::delay_ms(config.loop_interval_ms);
    }
}
