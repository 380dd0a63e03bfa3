//! WiFi station-mode adapter.
//!
//! Implements [`NetworkPort`], the hexagonal boundary for the radio.
//! The state machine owns the retry policy; this adapter makes exactly one
//! bounded association attempt per [`connect`](NetworkPort::connect) call.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: real ESP-IDF WiFi driver via `esp_idf_svc::wifi`.
//! - **all other targets**: simulation stubs for host-side tests.

use core::fmt;
use log::{info, warn};

use crate::app::ports::{LinkInfo, NetworkPort, PortError};

#[cfg(target_os = "espidf")]
use esp_idf_svc::wifi::{AuthMethod, ClientConfiguration, Configuration, EspWifi};

// ───────────────────────────────────────────────────────────────
// Credentials
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialError {
    InvalidSsid,
    InvalidPassword,
}

impl fmt::Display for CredentialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => {
                write!(f, "password invalid (must be 8-63 bytes for WPA2, or empty for open)")
            }
        }
    }
}

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

/// Validated station credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiCredentials {
    ssid: heapless::String<32>,
    password: heapless::String<64>,
}

impl WifiCredentials {
    pub fn new(ssid: &str, password: &str) -> Result<Self, CredentialError> {
        if ssid.is_empty() || !is_printable_ascii(ssid) {
            return Err(CredentialError::InvalidSsid);
        }
        if !password.is_empty() && !(8..=63).contains(&password.len()) {
            return Err(CredentialError::InvalidPassword);
        }

        let mut s = heapless::String::new();
        s.push_str(ssid).map_err(|_| CredentialError::InvalidSsid)?;
        let mut p = heapless::String::new();
        p.push_str(password)
            .map_err(|_| CredentialError::InvalidPassword)?;
        Ok(Self {
            ssid: s,
            password: p,
        })
    }

    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    pub fn is_open(&self) -> bool {
        self.password.is_empty()
    }
}

// ───────────────────────────────────────────────────────────────
// WiFi adapter
// ───────────────────────────────────────────────────────────────

pub struct WifiAdapter {
    #[cfg(target_os = "espidf")]
    wifi: EspWifi<'static>,
    #[cfg(target_os = "espidf")]
    started: bool,
    /// Simulation: counts connect attempts for deterministic failures.
    #[cfg(not(target_os = "espidf"))]
    sim_connect_counter: u32,
    #[cfg(not(target_os = "espidf"))]
    sim_connected: bool,
    credentials: Option<WifiCredentials>,
    connect_timeout_ms: u32,
}

impl WifiAdapter {
    #[cfg(target_os = "espidf")]
    pub fn new(wifi: EspWifi<'static>, connect_timeout_ms: u32) -> Self {
        Self {
            wifi,
            started: false,
            credentials: None,
            connect_timeout_ms,
        }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new(connect_timeout_ms: u32) -> Self {
        Self {
            sim_connect_counter: 0,
            sim_connected: false,
            credentials: None,
            connect_timeout_ms,
        }
    }

    pub fn set_credentials(&mut self, credentials: WifiCredentials) {
        info!("WiFi: credentials updated (SSID='{}')", credentials.ssid());
        self.credentials = Some(credentials);
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_connect(&mut self, creds: &WifiCredentials) -> Result<[u8; 4], PortError> {
        use std::time::{Duration, Instant};

        if !self.started {
            let auth_method = if creds.is_open() {
                AuthMethod::None
            } else {
                AuthMethod::WPAWPA2Personal
            };
            self.wifi
                .set_configuration(&Configuration::Client(ClientConfiguration {
                    ssid: creds
                        .ssid
                        .as_str()
                        .try_into()
                        .map_err(|_| PortError::Rejected)?,
                    password: creds
                        .password
                        .as_str()
                        .try_into()
                        .map_err(|_| PortError::Rejected)?,
                    auth_method,
                    ..Default::default()
                }))
                .map_err(|e| {
                    warn!("WiFi: configuration rejected: {}", e);
                    PortError::Rejected
                })?;
            self.wifi.start().map_err(|_| PortError::Unavailable)?;
            self.started = true;
        }

        self.wifi.connect().map_err(|_| PortError::Unavailable)?;

        let deadline = Instant::now() + Duration::from_millis(u64::from(self.connect_timeout_ms));
        while Instant::now() < deadline {
            if self.wifi.is_up().unwrap_or(false) {
                let info = self
                    .wifi
                    .sta_netif()
                    .get_ip_info()
                    .map_err(|_| PortError::InvalidResponse)?;
                return Ok(info.ip.octets());
            }
            std::thread::sleep(Duration::from_millis(50));
        }

        let _ = self.wifi.disconnect();
        Err(PortError::Timeout)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_connect(&mut self, creds: &WifiCredentials) -> Result<[u8; 4], PortError> {
        self.sim_connect_counter = self.sim_connect_counter.wrapping_add(1);
        // Every 10th attempt times out to exercise the retry path.
        if self.sim_connect_counter % 10 == 3 {
            warn!(
                "WiFi(sim): simulated timeout after {} ms (attempt {})",
                self.connect_timeout_ms, self.sim_connect_counter
            );
            return Err(PortError::Timeout);
        }
        self.sim_connected = true;
        info!("WiFi(sim): associated with '{}'", creds.ssid());
        Ok([192, 168, 4, 2])
    }

    #[cfg(target_os = "espidf")]
    fn platform_disconnect(&mut self) {
        let _ = self.wifi.disconnect();
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_disconnect(&mut self) {
        self.sim_connected = false;
    }

    #[cfg(target_os = "espidf")]
    fn platform_ip(&self) -> Option<[u8; 4]> {
        if !self.wifi.is_up().unwrap_or(false) {
            return None;
        }
        self.wifi
            .sta_netif()
            .get_ip_info()
            .ok()
            .map(|info| info.ip.octets())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_ip(&self) -> Option<[u8; 4]> {
        self.sim_connected.then_some([192, 168, 4, 2])
    }
}

// ───────────────────────────────────────────────────────────────
// NetworkPort
// ───────────────────────────────────────────────────────────────

impl NetworkPort for WifiAdapter {
    fn connect(&mut self) -> Result<LinkInfo, PortError> {
        let Some(creds) = self.credentials.clone() else {
            return Err(PortError::NotConfigured);
        };

        info!("WiFi: connecting to '{}'", creds.ssid());
        let ip = self.platform_connect(&creds)?;
        Ok(LinkInfo {
            ssid: creds.ssid,
            ip,
        })
    }

    fn disconnect(&mut self) {
        self.platform_disconnect();
        info!("WiFi: disconnected");
    }

    fn is_connected(&self) -> bool {
        self.platform_ip().is_some()
    }

    fn link(&self) -> Option<LinkInfo> {
        let creds = self.credentials.as_ref()?;
        let ip = self.platform_ip()?;
        Some(LinkInfo {
            ssid: creds.ssid.clone(),
            ip,
        })
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
