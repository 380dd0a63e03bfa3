//! Over-the-air firmware update, backed by the `esp-ota` crate.
//!
//! Implements [`FirmwareUpdatePort`].  Flow per check:
//!
//! ```text
//! confirm running image (first check only)
//!   → GET manifest  {"version":"0.3.1","url":"http://…/powermeter.bin"}
//!   → newer than CARGO_PKG_VERSION?
//!   → GET image → OtaUpdate::begin / write × N / finalize → boot slot
//!   → Installed  (main loop restarts)
//! ```
//!
//! The manifest is polled at most once per `poll_period`; checks in
//! between report [`UpdateStatus::NoUpdate`] without touching the network.
//! Without a provisioned manifest URL the adapter only confirms the image.

use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde::Deserialize;

use crate::app::ports::{FirmwareUpdatePort, PortError, UpdateStatus};

/// Largest manifest body accepted.
pub const MAX_MANIFEST_LEN: usize = 512;
/// Largest image accepted; one OTA slot on the 4 MB flash layout.
pub const MAX_IMAGE_LEN: usize = 4 * 1024 * 1024;

/// Version of the running image.
pub const RUNNING_VERSION: &str = env!("CARGO_PKG_VERSION");

/// What the update server advertises.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FirmwareManifest {
    pub version: heapless::String<16>,
    pub url: heapless::String<160>,
}

pub fn parse_manifest(body: &[u8]) -> Result<FirmwareManifest, PortError> {
    let manifest: FirmwareManifest = serde_json::from_slice(body).map_err(|e| {
        warn!("OTA: malformed manifest: {}", e);
        PortError::InvalidResponse
    })?;
    if manifest.url.is_empty() || parse_version(&manifest.version).is_none() {
        return Err(PortError::InvalidResponse);
    }
    Ok(manifest)
}

/// `major.minor.patch`; anything after a `-` or `+` is ignored.
pub fn parse_version(text: &str) -> Option<(u16, u16, u16)> {
    let core = text.split(['-', '+']).next()?;
    let mut parts = core.split('.').map(|p| p.parse::<u16>().ok());
    let v = (parts.next()??, parts.next()??, parts.next()??);
    parts.next().is_none().then_some(v)
}

pub fn is_newer(candidate: &str, running: &str) -> bool {
    match (parse_version(candidate), parse_version(running)) {
        (Some(c), Some(r)) => c > r,
        _ => false,
    }
}

pub struct OtaCheckAdapter {
    manifest_url: Option<heapless::String<160>>,
    timeout_ms: u32,
    poll_period: Duration,
    last_poll: Option<Instant>,
    image_confirmed: bool,
    checks: u32,
    /// Simulation: manifest body the fake server answers with.
    #[cfg(not(target_os = "espidf"))]
    pub sim_manifest: Option<Vec<u8>>,
    /// Simulation: image bytes served at any URL.
    #[cfg(not(target_os = "espidf"))]
    pub sim_image: Vec<u8>,
    /// Simulation: size of the image written to the inactive slot.
    #[cfg(not(target_os = "espidf"))]
    pub sim_installed: Option<usize>,
}

impl OtaCheckAdapter {
    pub fn new(
        manifest_url: Option<heapless::String<160>>,
        timeout_ms: u32,
        poll_period: Duration,
    ) -> Self {
        Self {
            manifest_url,
            timeout_ms,
            poll_period,
            last_poll: None,
            image_confirmed: false,
            checks: 0,
            #[cfg(not(target_os = "espidf"))]
            sim_manifest: None,
            #[cfg(not(target_os = "espidf"))]
            sim_image: Vec::new(),
            #[cfg(not(target_os = "espidf"))]
            sim_installed: None,
        }
    }

    pub fn image_confirmed(&self) -> bool {
        self.image_confirmed
    }

    pub fn checks(&self) -> u32 {
        self.checks
    }

    fn poll_due(&self, now: Instant) -> bool {
        self.last_poll
            .is_none_or(|last| now.duration_since(last) >= self.poll_period)
    }

    #[cfg(target_os = "espidf")]
    fn confirm_running_image() -> Result<(), PortError> {
        esp_ota::mark_app_valid().map_err(|e| {
            warn!("OTA: mark_app_valid failed: {:?}", e);
            PortError::Io
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn confirm_running_image() -> Result<(), PortError> {
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_fetch_manifest(&mut self, url: &str) -> Result<Vec<u8>, PortError> {
        use embedded_svc::http::client::Client as HttpClient;
        use embedded_svc::http::{Method, Status};
        use embedded_svc::io::Read;
        use esp_idf_svc::http::client::EspHttpConnection;

        use super::push::{classify_status, client_config};

        let connection = EspHttpConnection::new(&client_config(self.timeout_ms))
            .map_err(|_| PortError::Unavailable)?;
        let mut client = HttpClient::wrap(connection);
        let mut response = client
            .request(Method::Get, url, &[])
            .map_err(|_| PortError::Unavailable)?
            .submit()
            .map_err(|_| PortError::Timeout)?;
        classify_status(response.status())?;

        let mut body = Vec::new();
        let mut buf = [0u8; 128];
        loop {
            let n = response.read(&mut buf).map_err(|_| PortError::Timeout)?;
            if n == 0 {
                break;
            }
            if body.len() + n > MAX_MANIFEST_LEN {
                return Err(PortError::InvalidResponse);
            }
            body.extend_from_slice(&buf[..n]);
        }
        Ok(body)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_fetch_manifest(&mut self, url: &str) -> Result<Vec<u8>, PortError> {
        debug!("OTA(sim): GET {} (timeout {} ms)", url, self.timeout_ms);
        let body = self.sim_manifest.clone().ok_or(PortError::Unavailable)?;
        if body.len() > MAX_MANIFEST_LEN {
            return Err(PortError::InvalidResponse);
        }
        Ok(body)
    }

    /// Stream the image into the inactive slot and make it the boot slot.
    /// An unfinished `OtaUpdate` aborts when dropped, so every early return
    /// leaves the running slot untouched.
    #[cfg(target_os = "espidf")]
    fn platform_install(&mut self, url: &str) -> Result<usize, PortError> {
        use embedded_svc::http::client::Client as HttpClient;
        use embedded_svc::http::{Method, Status};
        use embedded_svc::io::Read;
        use esp_idf_svc::http::client::EspHttpConnection;

        use super::push::{classify_status, client_config};

        const CHUNK_LEN: usize = 4096;

        let connection = EspHttpConnection::new(&client_config(self.timeout_ms))
            .map_err(|_| PortError::Unavailable)?;
        let mut client = HttpClient::wrap(connection);
        let mut response = client
            .request(Method::Get, url, &[])
            .map_err(|_| PortError::Unavailable)?
            .submit()
            .map_err(|_| PortError::Timeout)?;
        classify_status(response.status())?;

        let mut update = esp_ota::OtaUpdate::begin().map_err(|e| {
            warn!("OTA: begin failed: {:?}", e);
            PortError::Io
        })?;
        let mut chunk = vec![0u8; CHUNK_LEN];
        let mut written = 0usize;
        loop {
            let n = response.read(&mut chunk).map_err(|_| PortError::Timeout)?;
            if n == 0 {
                break;
            }
            written += n;
            if written > MAX_IMAGE_LEN {
                return Err(PortError::Rejected);
            }
            update.write(&chunk[..n]).map_err(|e| {
                warn!("OTA: write failed at {} bytes: {:?}", written, e);
                PortError::Io
            })?;
        }
        if written == 0 {
            return Err(PortError::InvalidResponse);
        }

        let mut completed = update.finalize().map_err(|e| {
            warn!("OTA: image verification failed: {:?}", e);
            PortError::InvalidResponse
        })?;
        completed.set_as_boot_partition().map_err(|e| {
            warn!("OTA: set_as_boot_partition failed: {:?}", e);
            PortError::Io
        })?;
        Ok(written)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_install(&mut self, url: &str) -> Result<usize, PortError> {
        debug!("OTA(sim): GET {}", url);
        match self.sim_image.len() {
            0 => Err(PortError::InvalidResponse),
            n if n > MAX_IMAGE_LEN => Err(PortError::Rejected),
            n => {
                self.sim_installed = Some(n);
                Ok(n)
            }
        }
    }
}

impl FirmwareUpdatePort for OtaCheckAdapter {
    fn check(&mut self) -> Result<UpdateStatus, PortError> {
        self.checks = self.checks.saturating_add(1);
        if !self.image_confirmed {
            Self::confirm_running_image()?;
            self.image_confirmed = true;
            info!("OTA: running image {} confirmed", RUNNING_VERSION);
        }

        let Some(manifest_url) = self.manifest_url.clone() else {
            return Ok(UpdateStatus::NoUpdate);
        };
        let now = Instant::now();
        if !self.poll_due(now) {
            return Ok(UpdateStatus::NoUpdate);
        }
        self.last_poll = Some(now);

        let body = self.platform_fetch_manifest(&manifest_url)?;
        let manifest = parse_manifest(&body)?;
        if !is_newer(&manifest.version, RUNNING_VERSION) {
            debug!("OTA: server offers {}, running {}", manifest.version, RUNNING_VERSION);
            return Ok(UpdateStatus::NoUpdate);
        }

        info!("OTA: downloading {} from {}", manifest.version, manifest.url);
        let bytes = self.platform_install(&manifest.url)?;
        info!("OTA: {} bytes written, {} set as boot image", bytes, manifest.version);
        Ok(UpdateStatus::Installed)
    }
}

/// Soft-reset the chip.
#[cfg(target_os = "espidf")]
pub fn restart() -> ! {
    info!("OTA: restarting");
    esp_ota::restart();
}

#[cfg(not(target_os = "espidf"))]
pub fn restart() -> ! {
    warn!("OTA(sim): restart requested");
    panic!("restart (simulation, no hardware reset)");
}
