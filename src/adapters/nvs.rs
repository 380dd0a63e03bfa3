//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements both [`ConfigPort`] and [`StoragePort`] for the meter.
//!
//! - `SystemConfig` is persisted as one postcard blob under
//!   `meter/syscfg`, range-checked by [`validate_config`] before save.
//! - Wi-Fi credentials and the push endpoint/token live in the `auth`
//!   namespace (see [`cred`] for the key names).  On ESP32 that namespace
//!   sits on the encrypted NVS partition when flash encryption is enabled;
//!   the simulation backend is plaintext.

use crate::app::ports::{ConfigError, ConfigPort, StorageError, StoragePort};
use crate::config::SystemConfig;
use log::info;

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};

const CONFIG_NAMESPACE: &str = "meter";
const CONFIG_KEY: &str = "syscfg";
const MAX_BLOB_SIZE: usize = 512;
const CRED_NAMESPACE: &str = "auth";

/// Key names inside the `auth` namespace.
pub mod cred {
    pub const WIFI_SSID: &str = "wifi_ssid";
    pub const WIFI_PASS: &str = "wifi_pass";
    pub const PUSH_ENDPOINT: &str = "push_url";
    pub const PUSH_TOKEN: &str = "push_token";
    /// Broker URL; when set, samples go to MQTT instead of the web hook.
    pub const MQTT_URL: &str = "mqtt_url";
    pub const MQTT_TOPIC: &str = "mqtt_topic";
    pub const MQTT_USER: &str = "mqtt_user";
    pub const MQTT_PASS: &str = "mqtt_pass";
    /// Firmware manifest polled by the update check.
    pub const FIRMWARE_URL: &str = "fw_url";
}

pub struct NvsAdapter {
    #[cfg(target_os = "espidf")]
    partition: EspDefaultNvsPartition,
    #[cfg(not(target_os = "espidf"))]
    store: std::cell::RefCell<HashMap<String, Vec<u8>>>,
}

impl NvsAdapter {
    /// Wrap the default NVS partition.  `EspDefaultNvsPartition::take`
    /// already erases and re-initialises a partition with no free pages
    /// or from an older IDF version.
    #[cfg(target_os = "espidf")]
    pub fn new(partition: EspDefaultNvsPartition) -> Self {
        info!("NvsAdapter: ESP-IDF NVS ready");
        Self { partition }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Self {
        info!("NvsAdapter: simulation backend");
        Self {
            store: std::cell::RefCell::new(HashMap::new()),
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn composite_key(namespace: &str, key: &str) -> String {
        format!("{}::{}", namespace, key)
    }

    /// Open `namespace` and run `f` against the handle.
    #[cfg(target_os = "espidf")]
    fn with_namespace<T>(
        &self,
        namespace: &str,
        write: bool,
        f: impl FnOnce(&mut EspNvs<NvsDefault>) -> Result<T, esp_idf_svc::sys::EspError>,
    ) -> Result<T, StorageError> {
        let mut nvs = EspNvs::new(self.partition.clone(), namespace, write).map_err(|e| {
            log::warn!("NvsAdapter: open '{}' failed: {}", namespace, e);
            StorageError::IoError
        })?;
        f(&mut nvs).map_err(|e| {
            log::warn!("NvsAdapter: '{}' access failed: {}", namespace, e);
            StorageError::IoError
        })
    }

    // ── Credential helpers ("auth" namespace) ─────────────────

    pub fn store_credential(&mut self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.write(CRED_NAMESPACE, key, data)
    }

    pub fn read_credential(&self, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        self.read(CRED_NAMESPACE, key, buf)
    }

    pub fn delete_credential(&mut self, key: &str) -> Result<(), StorageError> {
        self.delete(CRED_NAMESPACE, key)
    }

    pub fn credential_exists(&self, key: &str) -> bool {
        self.exists(CRED_NAMESPACE, key)
    }

    /// Read a UTF-8 credential into a fixed-capacity string.  Missing,
    /// oversized or non-UTF-8 values read as `None`.
    pub fn credential_string<const N: usize>(&self, key: &str) -> Option<heapless::String<N>> {
        let mut buf = [0u8; 128];
        let len = self.read_credential(key, &mut buf).ok()?;
        let text = core::str::from_utf8(&buf[..len]).ok()?;
        let mut out = heapless::String::new();
        out.push_str(text).ok()?;
        Some(out)
    }
}

#[cfg(not(target_os = "espidf"))]
impl Default for NvsAdapter {
    fn default() -> Self {
        Self::new()
    }
}

/// Range-check every tunable before it is persisted.
pub fn validate_config(cfg: &SystemConfig) -> Result<(), ConfigError> {
    if cfg.wifi_retry_limit > 20 || cfg.time_sync_retry_limit > 20 || cfg.publish_retry_limit > 20
    {
        return Err(ConfigError::ValidationFailed("retry limits must be 0–20"));
    }
    if !(60..=604_800).contains(&cfg.time_resync_period_secs) {
        return Err(ConfigError::ValidationFailed(
            "time_resync_period_secs must be 60–604800",
        ));
    }
    if !(10..=86_400).contains(&cfg.local_only_cooldown_secs) {
        return Err(ConfigError::ValidationFailed(
            "local_only_cooldown_secs must be 10–86400",
        ));
    }
    if !(60..=604_800).contains(&cfg.firmware_poll_period_secs) {
        return Err(ConfigError::ValidationFailed(
            "firmware_poll_period_secs must be 60–604800",
        ));
    }
    if !(10..=1_000).contains(&cfg.button_debounce_ms) {
        return Err(ConfigError::ValidationFailed(
            "button_debounce_ms must be 10–1000",
        ));
    }
    if cfg.long_press_ms <= cfg.button_debounce_ms || cfg.long_press_ms > 10_000 {
        return Err(ConfigError::ValidationFailed(
            "long_press_ms must exceed button_debounce_ms and be ≤ 10000",
        ));
    }
    if !(1..=10_000).contains(&cfg.pulses_per_wh) {
        return Err(ConfigError::ValidationFailed("pulses_per_wh must be 1–10000"));
    }
    if cfg.pulse_debounce_ms > 1_000 {
        return Err(ConfigError::ValidationFailed(
            "pulse_debounce_ms must be 0–1000",
        ));
    }
    if !(1..=3_600).contains(&cfg.live_stale_secs) {
        return Err(ConfigError::ValidationFailed("live_stale_secs must be 1–3600"));
    }
    if !(10..=86_400).contains(&cfg.log_interval_secs) {
        return Err(ConfigError::ValidationFailed(
            "log_interval_secs must be 10–86400",
        ));
    }
    if !(-43_200..=50_400).contains(&cfg.utc_offset_secs) {
        return Err(ConfigError::ValidationFailed(
            "utc_offset_secs must be -43200–50400",
        ));
    }
    if !(500..=60_000).contains(&cfg.wifi_connect_timeout_ms)
        || !(500..=60_000).contains(&cfg.time_sync_timeout_ms)
    {
        return Err(ConfigError::ValidationFailed(
            "network timeouts must be 500–60000 ms",
        ));
    }
    if !(1..=1_000).contains(&cfg.loop_interval_ms) || !(1..=1_000).contains(&cfg.blink_ms) {
        return Err(ConfigError::ValidationFailed(
            "loop_interval_ms and blink_ms must be 1–1000",
        ));
    }
    Ok(())
}

impl ConfigPort for NvsAdapter {
    fn load(&self) -> Result<SystemConfig, ConfigError> {
        let mut buf = [0u8; MAX_BLOB_SIZE];
        match self.read(CONFIG_NAMESPACE, CONFIG_KEY, &mut buf) {
            Ok(len) => {
                let cfg: SystemConfig =
                    postcard::from_bytes(&buf[..len]).map_err(|_| ConfigError::Corrupted)?;
                info!("NvsAdapter: loaded config ({} bytes)", len);
                Ok(cfg)
            }
            Err(StorageError::NotFound) => {
                info!("NvsAdapter: no stored config, using defaults");
                Ok(SystemConfig::default())
            }
            Err(StorageError::IoError) => Err(ConfigError::IoError),
        }
    }

    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError> {
        validate_config(config)?;
        let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::IoError)?;

        #[cfg(not(target_os = "espidf"))]
        {
            self.store
                .borrow_mut()
                .insert(Self::composite_key(CONFIG_NAMESPACE, CONFIG_KEY), bytes.clone());
        }

        #[cfg(target_os = "espidf")]
        {
            self.with_namespace(CONFIG_NAMESPACE, true, |nvs| nvs.set_blob(CONFIG_KEY, &bytes))
                .map_err(|_| ConfigError::IoError)?;
        }

        info!("NvsAdapter: config saved ({} bytes)", bytes.len());
        Ok(())
    }
}

impl StoragePort for NvsAdapter {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            match self.store.borrow().get(&Self::composite_key(namespace, key)) {
                Some(data) => {
                    let len = data.len().min(buf.len());
                    buf[..len].copy_from_slice(&data[..len]);
                    Ok(len)
                }
                None => Err(StorageError::NotFound),
            }
        }

        #[cfg(target_os = "espidf")]
        {
            let len = self.with_namespace(namespace, false, |nvs| {
                Ok(nvs.get_blob(key, buf)?.map(<[u8]>::len))
            })?;
            len.ok_or(StorageError::NotFound)
        }
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            self.store
                .borrow_mut()
                .insert(Self::composite_key(namespace, key), data.to_vec());
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            self.with_namespace(namespace, true, |nvs| nvs.set_blob(key, data))
        }
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            self.store
                .borrow_mut()
                .remove(&Self::composite_key(namespace, key));
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            self.with_namespace(namespace, true, |nvs| nvs.remove(key).map(|_| ()))
        }
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        #[cfg(not(target_os = "espidf"))]
        {
            self.store
                .borrow()
                .contains_key(&Self::composite_key(namespace, key))
        }

        #[cfg(target_os = "espidf")]
        {
            self.with_namespace(namespace, false, |nvs| nvs.contains(key))
                .unwrap_or(false)
        }
    }
}
