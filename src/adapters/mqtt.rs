//! MQTT publish adapter.
//!
//! Implements [`PushPort`] by publishing every sample to one topic as a
//! small JSON document:
//!
//! ```text
//! <topic>  {"time":1700000000,"power":42}
//! ```
//!
//! The client is created on the first submission, after Wi-Fi is up, and
//! connects in the background.  Until the broker has acknowledged the
//! session every submission fails with `Unavailable`, which the Publish
//! phase treats as retryable.

use log::debug;
use serde::Serialize;

use crate::app::ports::{PortError, PushPort};
use crate::energy::EnergySample;

#[cfg(target_os = "espidf")]
use std::sync::Arc;
#[cfg(target_os = "espidf")]
use std::sync::atomic::{AtomicBool, Ordering};

/// Topic used when none is provisioned.
pub const DEFAULT_TOPIC: &str = "iotpowermeter/power";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttBroker {
    /// `mqtt://host:port` or `mqtts://host:port`.
    pub url: heapless::String<128>,
    pub topic: heapless::String<64>,
    pub username: Option<heapless::String<32>>,
    pub password: Option<heapless::String<64>>,
}

#[derive(Serialize)]
struct Reading {
    time: u32,
    power: u16,
}

/// JSON body for one sample.
pub fn encode_reading(sample: &EnergySample) -> Result<Vec<u8>, PortError> {
    serde_json::to_vec(&Reading {
        time: sample.timestamp,
        power: sample.watt_hours,
    })
    .map_err(|_| PortError::Rejected)
}

pub struct MqttPushAdapter {
    broker: Option<MqttBroker>,
    #[cfg(target_os = "espidf")]
    client: Option<esp_idf_svc::mqtt::client::EspMqttClient<'static>>,
    #[cfg(target_os = "espidf")]
    session_up: Arc<AtomicBool>,
    /// Simulation: whether the fake broker has a session open.
    #[cfg(not(target_os = "espidf"))]
    pub sim_session_up: bool,
    /// Simulation: `(topic, payload)` of every accepted publish.
    #[cfg(not(target_os = "espidf"))]
    pub sim_published: Vec<(String, Vec<u8>)>,
}

impl MqttPushAdapter {
    pub fn new(broker: Option<MqttBroker>) -> Self {
        Self {
            broker,
            #[cfg(target_os = "espidf")]
            client: None,
            #[cfg(target_os = "espidf")]
            session_up: Arc::new(AtomicBool::new(false)),
            #[cfg(not(target_os = "espidf"))]
            sim_session_up: true,
            #[cfg(not(target_os = "espidf"))]
            sim_published: Vec::new(),
        }
    }

    #[cfg(target_os = "espidf")]
    fn platform_publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), PortError> {
        use embedded_svc::mqtt::client::{EventPayload, QoS};
        use esp_idf_svc::mqtt::client::{EspMqttClient, MqttClientConfiguration};
        use log::{info, warn};

        let Some(broker) = self.broker.as_ref() else {
            return Err(PortError::NotConfigured);
        };

        if self.client.is_none() {
            let conf = MqttClientConfiguration {
                client_id: Some("powermeter"),
                username: broker.username.as_deref(),
                password: broker.password.as_deref(),
                ..Default::default()
            };
            let session_up = Arc::clone(&self.session_up);
            let client = EspMqttClient::new_cb(broker.url.as_str(), &conf, move |event| {
                match event.payload() {
                    EventPayload::Connected(_) => session_up.store(true, Ordering::Relaxed),
                    EventPayload::Disconnected => session_up.store(false, Ordering::Relaxed),
                    EventPayload::Error(e) => warn!("MQTT: {:?}", e),
                    _ => {}
                }
            })
            .map_err(|e| {
                warn!("MQTT: client for {} failed: {}", broker.url, e);
                PortError::Unavailable
            })?;
            info!("MQTT: connecting to {}", broker.url);
            self.client = Some(client);
        }

        if !self.session_up.load(Ordering::Relaxed) {
            return Err(PortError::Unavailable);
        }
        let Some(client) = self.client.as_mut() else {
            return Err(PortError::Unavailable);
        };
        client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .map(|_| ())
            .map_err(|e| {
                warn!("MQTT: publish failed: {}", e);
                PortError::Unavailable
            })
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), PortError> {
        if !self.sim_session_up {
            return Err(PortError::Unavailable);
        }
        self.sim_published.push((topic.to_string(), payload.to_vec()));
        Ok(())
    }
}

impl PushPort for MqttPushAdapter {
    fn submit(&mut self, sample: &EnergySample) -> Result<(), PortError> {
        let Some(broker) = self.broker.as_ref() else {
            return Err(PortError::NotConfigured);
        };
        let topic = broker.topic.clone();
        let payload = encode_reading(sample)?;
        self.platform_publish(&topic, &payload)?;
        debug!("MQTT: {} <- {} Wh", topic, sample.watt_hours);
        Ok(())
    }
}
