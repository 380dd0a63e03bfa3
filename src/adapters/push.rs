//! HTTP push adapter.
//!
//! Implements [`PushPort`] by issuing one `GET` per sample against a
//! spreadsheet-style web hook:
//!
//! ```text
//! <endpoint>?time=<epoch>&power=<wh>&token=<token>
//! ```
//!
//! Status handling: 2xx is success; 408, 429 and 5xx are transient
//! (`Unavailable`); other 4xx mean the endpoint or token is wrong
//! (`Rejected`).  Anything else is an `InvalidResponse`.

use core::fmt::Write as _;
use log::debug;

use crate::app::ports::{PortError, PushPort};
use crate::energy::EnergySample;

/// Longest request URL the adapter will build.
pub const MAX_URL_LEN: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushTarget {
    pub endpoint: heapless::String<160>,
    pub token: heapless::String<64>,
}

/// Build the request URL for one sample.
pub fn build_url(
    target: &PushTarget,
    sample: &EnergySample,
) -> Result<heapless::String<MAX_URL_LEN>, PortError> {
    if target.endpoint.is_empty() {
        return Err(PortError::NotConfigured);
    }
    let sep = if target.endpoint.contains('?') { '&' } else { '?' };
    let mut url = heapless::String::new();
    write!(
        url,
        "{}{}time={}&power={}&token={}",
        target.endpoint, sep, sample.timestamp, sample.watt_hours, target.token
    )
    .map_err(|_| PortError::Rejected)?;
    Ok(url)
}

/// Map an HTTP status code onto the port error model.
pub fn classify_status(status: u16) -> Result<(), PortError> {
    match status {
        200..=299 => Ok(()),
        408 | 429 | 500..=599 => Err(PortError::Unavailable),
        400..=499 => Err(PortError::Rejected),
        _ => Err(PortError::InvalidResponse),
    }
}

/// Client settings shared by every outbound HTTP request.
#[cfg(target_os = "espidf")]
pub(crate) fn client_config(timeout_ms: u32) -> esp_idf_svc::http::client::Configuration {
    esp_idf_svc::http::client::Configuration {
        timeout: Some(std::time::Duration::from_millis(u64::from(timeout_ms))),
        crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
        ..Default::default()
    }
}

pub struct HttpPushAdapter {
    target: Option<PushTarget>,
    timeout_ms: u32,
    /// Simulation: URLs that would have been requested.
    #[cfg(not(target_os = "espidf"))]
    pub sim_requests: Vec<heapless::String<MAX_URL_LEN>>,
    /// Simulation: status code the fake server answers with.
    #[cfg(not(target_os = "espidf"))]
    pub sim_status: u16,
}

impl HttpPushAdapter {
    pub fn new(target: Option<PushTarget>, timeout_ms: u32) -> Self {
        Self {
            target,
            timeout_ms,
            #[cfg(not(target_os = "espidf"))]
            sim_requests: Vec::new(),
            #[cfg(not(target_os = "espidf"))]
            sim_status: 200,
        }
    }

    #[cfg(target_os = "espidf")]
    fn platform_get(&mut self, url: &str) -> Result<u16, PortError> {
        use embedded_svc::http::client::Client as HttpClient;
        use embedded_svc::http::{Method, Status};
        use esp_idf_svc::http::client::EspHttpConnection;

        let connection = EspHttpConnection::new(&client_config(self.timeout_ms))
            .map_err(|_| PortError::Unavailable)?;
        let mut client = HttpClient::wrap(connection);
        let request = client
            .request(Method::Get, url, &[])
            .map_err(|_| PortError::Unavailable)?;
        let response = request.submit().map_err(|_| PortError::Timeout)?;
        Ok(response.status())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_get(&mut self, url: &str) -> Result<u16, PortError> {
        let mut recorded = heapless::String::new();
        recorded.push_str(url).map_err(|_| PortError::Rejected)?;
        self.sim_requests.push(recorded);
        debug!("Push(sim): GET {} (timeout {} ms)", url, self.timeout_ms);
        Ok(self.sim_status)
    }
}

impl PushPort for HttpPushAdapter {
    fn submit(&mut self, sample: &EnergySample) -> Result<(), PortError> {
        let Some(target) = self.target.as_ref() else {
            return Err(PortError::NotConfigured);
        };
        let url = build_url(target, sample)?;
        let status = self.platform_get(&url)?;
        debug!("Push: HTTP {}", status);
        classify_status(status)
    }
}
