//! Unified error types for the power meter firmware.
//!
//! Collaborator calls (radio, time source, push endpoint, SD card, display
//! bus) all fail with a [`PortError`].  It is `Copy` so phases can classify
//! it as retryable or fatal and stash it in the device context without
//! allocation.  Boot-time failures funnel into the top-level [`Error`].

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible boot / adapter-construction step funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A collaborator call failed.
    Port(PortError),
    /// Peripheral initialisation failed.
    Init(&'static str),
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Port(e) => write!(f, "port: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Collaborator errors
// ---------------------------------------------------------------------------

/// Failure reported by an external collaborator.
///
/// | Variant           | Transient | Typical source                       |
/// |-------------------|-----------|--------------------------------------|
/// | `Timeout`         | yes       | association / SNTP / HTTP deadline   |
/// | `Unavailable`     | yes       | AP not in range, server unreachable  |
/// | `InvalidResponse` | yes       | pre-2020 epoch, malformed reply      |
/// | `Rejected`        | no        | HTTP 4xx, bad credentials            |
/// | `NotConfigured`   | no        | no SSID / endpoint provisioned       |
/// | `Io`              | no        | SD card, display bus, flash          |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortError {
    Timeout,
    Unavailable,
    InvalidResponse,
    Rejected,
    NotConfigured,
    Io,
}

impl PortError {
    /// Whether a later attempt within the same phase could succeed.
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::Timeout | Self::Unavailable | Self::InvalidResponse)
    }
}

impl fmt::Display for PortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timed out"),
            Self::Unavailable => write!(f, "unavailable"),
            Self::InvalidResponse => write!(f, "invalid response"),
            Self::Rejected => write!(f, "rejected"),
            Self::NotConfigured => write!(f, "not configured"),
            Self::Io => write!(f, "I/O error"),
        }
    }
}

impl From<PortError> for Error {
    fn from(e: PortError) -> Self {
        Self::Port(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(PortError::Timeout.is_transient());
        assert!(PortError::Unavailable.is_transient());
        assert!(PortError::InvalidResponse.is_transient());
        assert!(!PortError::Rejected.is_transient());
        assert!(!PortError::NotConfigured.is_transient());
        assert!(!PortError::Io.is_transient());
    }

    #[test]
    fn port_error_wraps_into_firmware_error() {
        let e: Error = PortError::Io.into();
        assert_eq!(e, Error::Port(PortError::Io));
        assert_eq!(e.to_string(), "port: I/O error");
    }
}
