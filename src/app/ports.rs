//! Port traits — the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ AppService (domain)
//! ```
//!
//! Every collaborator the state machine drives (radio, firmware updater,
//! time source, push endpoint, record store, display) is reached through
//! one of these traits.  Phases receive them bundled in [`Ports`], so the
//! domain core never touches hardware directly and tests substitute
//! recording mocks.
//!
//! All collaborator calls are blocking and must enforce their own
//! deadline, returning [`PortError::Timeout`] instead of hanging.

use crate::config::SystemConfig;
use crate::display::{DisplayFieldMask, DisplayValues};
use crate::energy::EnergySample;

pub use crate::error::PortError;

// ───────────────────────────────────────────────────────────────
// Network port (radio association)
// ───────────────────────────────────────────────────────────────

/// Result of a successful association.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LinkInfo {
    pub ssid: heapless::String<32>,
    pub ip: [u8; 4],
}

pub trait NetworkPort {
    /// Associate with the configured access point and obtain an address.
    fn connect(&mut self) -> Result<LinkInfo, PortError>;

    /// Drop the association.  Never fails from the caller's view.
    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    /// Current link details when associated.
    fn link(&self) -> Option<LinkInfo>;
}

// ───────────────────────────────────────────────────────────────
// Firmware update port
// ───────────────────────────────────────────────────────────────

/// Outcome of one firmware update check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
    NoUpdate,
    /// A new image was written; the device should restart into it.
    Installed,
}

pub trait FirmwareUpdatePort {
    fn check(&mut self) -> Result<UpdateStatus, PortError>;
}

// ───────────────────────────────────────────────────────────────
// Time source port
// ───────────────────────────────────────────────────────────────

pub trait TimeSourcePort {
    /// Exchange one request with the time source.  Returns Unix seconds.
    fn fetch_epoch(&mut self) -> Result<u32, PortError>;
}

// ───────────────────────────────────────────────────────────────
// Push port (remote data sink)
// ───────────────────────────────────────────────────────────────

/// Capability interface for whichever remote service receives samples.
pub trait PushPort {
    fn submit(&mut self, sample: &EnergySample) -> Result<(), PortError>;
}

// ───────────────────────────────────────────────────────────────
// Record store port (local log)
// ───────────────────────────────────────────────────────────────

pub trait RecordStorePort {
    fn append_record(&mut self, sample: &EnergySample) -> Result<(), PortError>;
}

// ───────────────────────────────────────────────────────────────
// Display port
// ───────────────────────────────────────────────────────────────

pub trait DisplayPort {
    /// Redraw the fields in `dirty` from `values`.
    ///
    /// Returns the subset actually redrawn; only those bits are cleared by
    /// the caller.  Redrawing a field twice with the same value is harmless.
    fn redraw(
        &mut self,
        dirty: DisplayFieldMask,
        values: &DisplayValues,
    ) -> Result<DisplayFieldMask, PortError>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Collaborator bundle handed to every phase
// ───────────────────────────────────────────────────────────────

/// Mutable borrows of every collaborator for one state machine step.
pub struct Ports<'a> {
    pub network: &'a mut dyn NetworkPort,
    pub updater: &'a mut dyn FirmwareUpdatePort,
    pub time_source: &'a mut dyn TimeSourcePort,
    pub push: &'a mut dyn PushPort,
    pub records: &'a mut dyn RecordStorePort,
    pub display: &'a mut dyn DisplayPort,
    pub sink: &'a mut dyn EventSink,
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists system configuration.
///
/// Implementations MUST validate config values before persisting.
/// Invalid ranges are rejected with [`ConfigError::ValidationFailed`],
/// not silently clamped.
pub trait ConfigPort {
    /// Load configuration from persistent storage.
    /// Returns [`SystemConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<SystemConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Namespaced key-value storage (credentials, push token).
pub trait StoragePort {
    /// Read a value.  Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key.  Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    fn exists(&self, namespace: &str, key: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug)]
pub enum ConfigError {
    /// Stored config failed integrity / deserialization check.
    Corrupted,
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Generic I/O error from the storage backend.
    IoError,
}

/// Errors from [`StoragePort`] operations.
#[derive(Debug)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Generic I/O error.
    IoError,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}
