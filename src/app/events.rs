//! Outbound application events.
//!
//! The [`AppService`](super::service::AppService) and the phase functions
//! emit these through the [`EventSink`](super::ports::EventSink) port.
//! Adapters on the other side decide what to do with them: log to serial,
//! forward to a status page, blink an LED.

use crate::drivers::button::ButtonEvent;
use crate::energy::EnergySample;
use crate::error::PortError;
use crate::fsm::StateId;

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    /// The application service has started (carries initial state).
    Started(StateId),

    /// The FSM transitioned between states.
    StateChanged { from: StateId, to: StateId },

    /// Associated with the access point.
    Connected { ip: [u8; 4] },

    /// Connection budget exhausted; network phases are skipped until the
    /// cooldown ends.
    LocalOnlyEntered { cooldown_secs: u32 },

    /// Cooldown elapsed or the user forced a reconnect.
    LocalOnlyLeft,

    /// Wall clock set from the time source (Unix seconds).
    ClockSynced(u32),

    TimeSyncFailed(PortError),

    /// A new image was installed; a restart is pending.
    UpdateInstalled,

    /// An energy sample was sealed for publishing and logging.
    SampleSealed(EnergySample),

    PublishFailed(PortError),
    LogFailed(PortError),
    DisplayFailed(PortError),

    /// A debounced press was handled.
    Button(ButtonEvent),
}
