//! MQTT bus adapter.
//!
//! Implements [`BusPort`].  The ESP-IDF client reconnects on its own
//! every few seconds; a dedicated thread drains the connection events,
//! tracks the session and forwards command-topic messages to the main
//! loop through [`INBOX`].
//!
//! ```text
//! ┌──────────────┐  BusMessage  ┌──────────────┐
//! │ mqtt thread  │────────────▶│  Main loop   │
//! │ (conn.next)  │              │  (sync)      │
//! └──────────────┘              └──────────────┘
//! ```
//!
//! The last will `<root>/status/LWT = Offline` is retained so subscribers
//! see the bridge drop off; the service publishes `Online` on each new
//! session.

use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::warn;

use crate::app::ports::BusPort;
use crate::error::SinkError;

#[cfg(target_os = "espidf")]
use crate::config::BusConfig;
#[cfg(target_os = "espidf")]
use embedded_svc::mqtt::client::{EventPayload, QoS};
#[cfg(target_os = "espidf")]
use esp_idf_svc::mqtt::client::{EspMqttClient, LwtConfiguration, MqttClientConfiguration};
#[cfg(target_os = "espidf")]
use log::info;

/// Longest topic kept for an inbound message.
pub const TOPIC_LEN: usize = 64;
/// Longest inbound payload kept; commands are short.
pub const PAYLOAD_LEN: usize = 64;

/// One message received on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: heapless::String<TOPIC_LEN>,
    pub payload: heapless::Vec<u8, PAYLOAD_LEN>,
}

/// Inbound messages: mqtt thread → main loop.
pub static INBOX: Channel<CriticalSectionRawMutex, BusMessage, 4> = Channel::new();

static CONNECTED: AtomicBool = AtomicBool::new(false);
static NEW_SESSION: AtomicBool = AtomicBool::new(false);

/// Main loop side: next received message, if any.
pub fn poll_inbox() -> Option<BusMessage> {
    INBOX.try_receive().ok()
}

/// Connection thread side: queue a received message.  Oversized topics
/// or payloads cannot be commands and are dropped.
pub fn deliver(topic: &str, payload: &[u8]) {
    let mut msg = BusMessage {
        topic: heapless::String::new(),
        payload: heapless::Vec::new(),
    };
    if msg.topic.push_str(topic).is_err() || msg.payload.extend_from_slice(payload).is_err() {
        warn!("Bus: oversized message on {} dropped", topic);
        return;
    }
    if INBOX.try_send(msg).is_err() {
        warn!("Bus: inbox full, message on {} dropped", topic);
    }
}

/// Connection thread side: session state changes.
pub fn set_connected(up: bool) {
    let was = CONNECTED.swap(up, Ordering::AcqRel);
    if up && !was {
        NEW_SESSION.store(true, Ordering::Release);
    }
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF client
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub struct MqttBus {
    client: EspMqttClient<'static>,
    command_topic: heapless::String<TOPIC_LEN>,
}

#[cfg(target_os = "espidf")]
impl MqttBus {
    /// Create the client and spawn the connection thread.
    pub fn start(config: &BusConfig, client_id: &str) -> anyhow::Result<Self> {
        use core::fmt::Write;

        let url = format!("mqtt://{}:{}", config.broker_host, config.broker_port);
        let lwt_topic = format!("{}/status/LWT", config.topic_root);
        let conf = MqttClientConfiguration {
            client_id: Some(client_id),
            reconnect_timeout: Some(core::time::Duration::from_millis(u64::from(config.retry_interval_ms))),
            lwt: Some(LwtConfiguration {
                topic: &lwt_topic,
                payload: b"Offline",
                qos: QoS::AtLeastOnce,
                retain: true,
            }),
            ..Default::default()
        };
        let (client, mut conn) = EspMqttClient::new(&url, &conf)?;

        std::thread::Builder::new()
            .name("mqtt-poll".into())
            .stack_size(6 * 1024)
            .spawn(move || {
                while let Ok(event) = conn.next() {
                    match event.payload() {
                        EventPayload::Connected(_) => set_connected(true),
                        EventPayload::Disconnected => set_connected(false),
                        EventPayload::Received {
                            topic: Some(topic), data, ..
                        } => deliver(topic, data),
                        EventPayload::Error(e) => warn!("Bus: {:?}", e),
                        _ => {}
                    }
                }
                set_connected(false);
                warn!("Bus: connection closed");
            })?;

        let mut command_topic = heapless::String::new();
        let _ = write!(command_topic, "{}/cmd", config.topic_root);
        info!("Bus: client for {} started", url);
        Ok(Self { client, command_topic })
    }
}

#[cfg(target_os = "espidf")]
impl BusPort for MqttBus {
    fn is_connected(&self) -> bool {
        CONNECTED.load(Ordering::Acquire)
    }

    fn session_started(&mut self) -> bool {
        if !NEW_SESSION.swap(false, Ordering::AcqRel) {
            return false;
        }
        if let Err(e) = self.client.subscribe(&self.command_topic, QoS::AtMostOnce) {
            warn!("Bus: subscribe {} failed: {}", self.command_topic, e);
        }
        true
    }

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), SinkError> {
        self.client
            .enqueue(topic, QoS::AtLeastOnce, retain, payload)
            .map(|_| ())
            .map_err(|_| SinkError::Io)
    }
}

// ───────────────────────────────────────────────────────────────
// Simulation
// ───────────────────────────────────────────────────────────────

/// Host simulation: records every publish.
#[cfg(not(target_os = "espidf"))]
#[derive(Default)]
pub struct MqttBus {
    pub published: Vec<(String, Vec<u8>, bool)>,
}

#[cfg(not(target_os = "espidf"))]
impl MqttBus {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(not(target_os = "espidf"))]
impl BusPort for MqttBus {
    fn is_connected(&self) -> bool {
        CONNECTED.load(Ordering::Acquire)
    }

    fn session_started(&mut self) -> bool {
        NEW_SESSION.swap(false, Ordering::AcqRel)
    }

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), SinkError> {
        if !self.is_connected() {
            return Err(SinkError::Offline);
        }
        self.published.push((topic.to_owned(), payload.to_vec(), retain));
        Ok(())
    }
}
