//! MQTT transport implementation using `rumqttc`.
//!
//! This module adapts the synchronous rumqttc client to the domain-level
//! `Transport` capability without leaking MQTT concepts upward.
//!
//! ## Drive model
//!
//! There is no background task. The MQTT `Connection` is polled only from
//! `do_work`, for at most [`MAX_EVENTS_PER_CYCLE`] events and never longer
//! than [`POLL_TIMEOUT`] per event, so a drive cycle always returns.
//!
//! ## Connection behavior
//!
//! One transport corresponds to one broker connection and one device
//! identity. The connection is opened lazily when the device registers;
//! rumqttc reconnects on its own the next time the connection is polled.
//!
//! ## Message delivery semantics
//!
//! - Telemetry is published QoS 1 to `devices/{id}/messages/events/`, with
//!   application properties appended to the topic as a percent-encoded
//!   property bag.
//! - Each published entry is matched to the packet id rumqttc assigns when
//!   the publish reaches the wire, and the PUBACK carrying that id completes
//!   it as a single-entry batch.
//! - A connection error keeps unacknowledged entries in flight. The session
//!   is persistent, so rumqttc retransmits them after reconnecting and their
//!   PUBACKs still arrive under the original packet ids.
//! - Publishes on `devices/{id}/messages/devicebound/#` are routed to inbound
//!   dispatch with their property bag restored. QoS 1 deliveries are
//!   acknowledged by rumqttc regardless of the application's disposition.
//!
//! The device key is sent as the MQTT password, so callers authenticating
//! with shared access signatures pass the signature token as the key.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ::rumqttc::{
    //
    Client,
    ConnectReturnCode,
    Connection,
    ConnectionError,
    Event,
    MqttOptions,
    Outgoing,
    Packet,
    QoS,
};
use bytes::Bytes;

use super::MQTT_PROTOCOL;
use crate::transport::lock_ignore_poison;
use crate::{
    // ---
    log_debug,
    log_error,
    log_info,
    log_warn,
    BatchResult,
    ClientStatus,
    DeviceConfig,
    DeviceHandle,
    Error,
    Message,
    OptionValue,
    OutboundQueue,
    ProviderPtr,
    QueueEntry,
    Result,
    Transport,
    TransportBase,
    TransportConfig,
    TransportConsumer,
    TransportProvider,
};

const MQTT_PORT: u16 = 8883;
const API_VERSION: &str = "2018-06-30";
const DEFAULT_KEEP_ALIVE_SECS: u16 = 240;
const REQUEST_CAPACITY: usize = 64;

/// Longest a single poll of an established connection may block.
const POLL_TIMEOUT: Duration = Duration::from_millis(10);

/// Longest a poll may block while (re)connecting. A poll that times out
/// abandons the handshake, so this must cover a full TLS connect.
const CONNECT_POLL_TIMEOUT: Duration = Duration::from_secs(3);

/// Upper bound on connection events handled per drive cycle.
const MAX_EVENTS_PER_CYCLE: usize = 32;

fn events_topic(device_id: &str) -> String {
    format!("devices/{device_id}/messages/events/")
}

fn devicebound_filter(device_id: &str) -> String {
    format!("devices/{device_id}/messages/devicebound/#")
}

fn devicebound_prefix(device_id: &str) -> String {
    format!("devices/{device_id}/messages/devicebound/")
}

/// Telemetry topic for `message`, property bag included.
fn publish_topic(device_id: &str, message: &Message) -> String {
    // ---
    let mut pairs = Vec::new();
    if let Some(id) = message.message_id() {
        pairs.push(format!("$.mid={}", urlencoding::encode(id)));
    }
    if let Some(id) = message.correlation_id() {
        pairs.push(format!("$.cid={}", urlencoding::encode(id)));
    }
    for (key, value) in message.properties() {
        pairs.push(format!("{}={}", urlencoding::encode(key), urlencoding::encode(value)));
    }

    let mut topic = events_topic(device_id);
    topic.push_str(&pairs.join("&"));
    topic
}

fn decode_component(raw: &str) -> String {
    urlencoding::decode(raw).map_or_else(|_| raw.to_string(), |value| value.into_owned())
}

/// Rebuild a cloud-to-device message from its payload and the property bag
/// that follows the devicebound prefix.
///
/// Unknown system properties (`$.` keys other than message and correlation
/// id) are skipped.
fn inbound_message(property_bag: &str, payload: Bytes) -> Message {
    // ---
    let mut message = Message::from_bytes(payload);

    for pair in property_bag.split('&').filter(|pair| !pair.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = decode_component(key);
        let value = decode_component(value);

        if key == "$.mid" {
            message.set_message_id(value);
        } else if key == "$.cid" {
            message.set_correlation_id(value);
        } else if key.starts_with("$.") {
            log_debug!("skipping system property {key}");
        } else {
            message.set_property(key, value);
        }
    }
    message
}

/// What one poll pass produced, handed to the consumer after the lock is
/// released.
#[derive(Default)]
struct Harvest {
    completed: Vec<(QueueEntry, BatchResult)>,
    inbound: Vec<Message>,
}

/// A published entry waiting for its PUBACK.
struct InFlight {
    entry: QueueEntry,
    /// Packet id rumqttc assigned once the publish went out; `None` while the
    /// request still sits in the client channel.
    pkid: Option<u16>,
}

/// Acknowledgement bookkeeping for one session, fed with connection events.
struct Tracker {
    transport_id: String,
    devicebound: String,
    in_flight: VecDeque<InFlight>,
    connected: bool,
}

impl Tracker {
    fn new(transport_id: &str, device_id: &str) -> Self {
        // ---
        Self {
            transport_id: transport_id.to_string(),
            devicebound: devicebound_prefix(device_id),
            in_flight: VecDeque::new(),
            connected: false,
        }
    }

    /// Record an entry whose publish request was accepted by the client.
    fn submitted(&mut self, entry: QueueEntry) {
        self.in_flight.push_back(InFlight { entry, pkid: None });
    }

    fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }

    fn poll_timeout(&self) -> Duration {
        if self.connected {
            POLL_TIMEOUT
        } else {
            CONNECT_POLL_TIMEOUT
        }
    }

    /// Apply one polled connection event.
    ///
    /// Requests leave the client channel in submission order, so a fresh
    /// packet id belongs to the oldest entry that has none yet. An id already
    /// held by an entry is a retransmission.
    fn handle(&mut self, polled: std::result::Result<Event, ConnectionError>, harvest: &mut Harvest) {
        // ---
        let event = match polled {
            Ok(event) => event,
            Err(_err) => {
                self.connected = false;
                log_warn!(
                    "{}: mqtt connection error: {_err}; {} publish(es) kept for retransmission",
                    self.transport_id,
                    self.in_flight.len()
                );
                return;
            }
        };

        match event {
            Event::Incoming(Packet::ConnAck(ack)) => {
                if ack.code == ConnectReturnCode::Success {
                    self.connected = true;
                    log_info!("{}: connected to broker", self.transport_id);
                } else {
                    log_error!("{}: broker refused connection: {:?}", self.transport_id, ack.code);
                }
            }
            Event::Outgoing(Outgoing::Publish(pkid)) => {
                if self.in_flight.iter().any(|f| f.pkid == Some(pkid)) {
                    log_debug!("{}: retransmitted publish {pkid}", self.transport_id);
                } else if let Some(next) = self.in_flight.iter_mut().find(|f| f.pkid.is_none()) {
                    next.pkid = Some(pkid);
                } else {
                    log_warn!("{}: outgoing publish {pkid} matches no entry", self.transport_id);
                }
            }
            Event::Incoming(Packet::PubAck(ack)) => {
                let position = self.in_flight.iter().position(|f| f.pkid == Some(ack.pkid));
                match position.and_then(|index| self.in_flight.remove(index)) {
                    Some(acked) => harvest.completed.push((acked.entry, BatchResult::Success)),
                    None => log_warn!("{}: PUBACK {} matches no entry", self.transport_id, ack.pkid),
                }
            }
            Event::Incoming(Packet::Publish(publish)) if publish.topic.starts_with(&self.devicebound) => {
                let property_bag = &publish.topic[self.devicebound.len()..];
                harvest.inbound.push(inbound_message(property_bag, publish.payload));
            }
            _event => {
                log_debug!("{}: received mqtt event (ignored): {_event:?}", self.transport_id);
            }
        }
    }
}

/// One registered device and its broker connection.
struct Session {
    device: DeviceHandle,
    client: Client,
    connection: Connection,
    tracker: Tracker,
    subscribed: bool,
}

/// MQTT-based implementation of the `Transport` capability.
pub struct RumqttcTransport {
    // ---
    base: TransportBase,
    host: String,
    keep_alive_secs: u16,
    session: Mutex<Option<Session>>,
}

impl RumqttcTransport {
    fn new(config: &TransportConfig) -> Self {
        // ---
        Self {
            base: TransportBase::new(config.transport_id.clone(), MQTT_PROTOCOL),
            host: config.host(),
            keep_alive_secs: config.keep_alive_secs.unwrap_or(DEFAULT_KEEP_ALIVE_SECS),
            session: Mutex::new(None),
        }
    }

    fn mqtt_options(&self, device: &DeviceConfig) -> MqttOptions {
        // ---
        let mut options = MqttOptions::new(device.device_id.clone(), self.host.clone(), MQTT_PORT);
        options.set_keep_alive(Duration::from_secs(u64::from(self.keep_alive_secs)));
        options.set_clean_session(false);
        options.set_credentials(
            format!("{}/{}/?api-version={API_VERSION}", self.host, device.device_id),
            device.device_key.clone(),
        );
        options.set_transport(::rumqttc::Transport::tls_with_default_config());
        options
    }

    fn with_session<T>(
        &self,
        device: &DeviceHandle,
        f: impl FnOnce(&mut Session) -> Result<T>,
    ) -> Result<T> {
        // ---
        let mut guard = lock_ignore_poison(&self.session);
        match guard.as_mut() {
            Some(session) if session.device == *device => f(session),
            _ => Err(Error::InvalidArgument(format!(
                "{}: device {} is not registered",
                self.transport_id(),
                device.device_id()
            ))),
        }
    }

    /// Publish queued entries until the request channel is full.
    fn publish_pending(&self, session: &mut Session, queue: &mut OutboundQueue) {
        // ---
        let device_id = session.device.device_id().to_string();

        loop {
            let next = queue
                .iter()
                .next()
                .map(|entry| (publish_topic(&device_id, entry.message()), entry.message().as_bytes().to_vec()));
            let Some((topic, payload)) = next else {
                break;
            };

            if let Err(_err) = session.client.try_publish(topic, QoS::AtLeastOnce, false, payload) {
                log_debug!("{}: publish deferred: {_err}", self.transport_id());
                break;
            }
            if let Some(entry) = queue.pop_front() {
                session.tracker.submitted(entry);
            }
        }
    }

    fn poll_connection(&self, session: &mut Session) -> Harvest {
        // ---
        let mut harvest = Harvest::default();

        for _ in 0..MAX_EVENTS_PER_CYCLE {
            let polled = match session.connection.recv_timeout(session.tracker.poll_timeout()) {
                Ok(polled) => polled,
                Err(_) => break,
            };
            let lost = polled.is_err();
            session.tracker.handle(polled, &mut harvest);
            if lost {
                break;
            }
        }

        harvest
    }
}

impl Transport for RumqttcTransport {
    // ---
    fn base(&self) -> &TransportBase {
        &self.base
    }

    fn register(&self, device: &DeviceConfig) -> Result<DeviceHandle> {
        // ---
        let mut guard = lock_ignore_poison(&self.session);
        if let Some(existing) = guard.as_ref() {
            return Err(Error::Transport(format!(
                "{}: connection already serves device {}",
                self.transport_id(),
                existing.device.device_id()
            )));
        }

        let (client, connection) = Client::new(self.mqtt_options(device), REQUEST_CAPACITY);
        let handle = DeviceHandle::new(&device.device_id);

        *guard = Some(Session {
            device: handle.clone(),
            client,
            connection,
            tracker: Tracker::new(self.transport_id(), &device.device_id),
            subscribed: false,
        });

        log_debug!("{}: registered device {} on {}", self.transport_id(), device.device_id, self.host);
        Ok(handle)
    }

    /// Disconnect and forget the device; in-flight entries report `Destroyed`.
    fn unregister(&self, device: &DeviceHandle) {
        // ---
        let removed = {
            let mut guard = lock_ignore_poison(&self.session);
            match guard.as_ref() {
                Some(session) if session.device == *device => guard.take(),
                _ => None,
            }
        };

        match removed {
            Some(session) => {
                if let Err(_err) = session.client.try_disconnect() {
                    log_debug!("{}: mqtt disconnect failed: {_err}", self.transport_id());
                }
            }
            None => log_warn!("{}: unregister of unknown device {}", self.transport_id(), device.device_id()),
        }
    }

    fn subscribe(&self, device: &DeviceHandle) -> Result<()> {
        // ---
        self.with_session(device, |session| {
            if session.subscribed {
                return Ok(());
            }
            session
                .client
                .try_subscribe(devicebound_filter(device.device_id()), QoS::AtLeastOnce)
                .map_err(|err| Error::Transport(format!("subscribe failed: {err}")))?;
            session.subscribed = true;
            log_info!("{}: subscribed to cloud-to-device messages", self.transport_id());
            Ok(())
        })
    }

    fn unsubscribe(&self, device: &DeviceHandle) {
        // ---
        let result = self.with_session(device, |session| {
            if !session.subscribed {
                return Ok(());
            }
            session.subscribed = false;
            session
                .client
                .try_unsubscribe(devicebound_filter(device.device_id()))
                .map_err(|err| Error::Transport(format!("unsubscribe failed: {err}")))
        });

        if let Err(_err) = result {
            log_warn!("{}: {_err}", self.transport_id());
        }
    }

    fn do_work(&self, device: &DeviceHandle, consumer: &mut dyn TransportConsumer) {
        // ---
        let harvest = self.with_session(device, |session| {
            self.publish_pending(session, consumer.waiting_to_send());
            let harvest = self.poll_connection(session);
            if !session.subscribed && !harvest.inbound.is_empty() {
                log_debug!("{}: dropping inbound received while unsubscribed", self.transport_id());
                return Ok(Harvest {
                    completed: harvest.completed,
                    inbound: Vec::new(),
                });
            }
            Ok(harvest)
        });

        let harvest = match harvest {
            Ok(harvest) => harvest,
            Err(_err) => {
                log_warn!("{_err}");
                return;
            }
        };

        for (entry, result) in harvest.completed {
            consumer.send_complete(vec![entry], result);
        }

        for message in harvest.inbound {
            let _disposition = consumer.deliver_inbound(&message);
            log_debug!("{}: inbound message disposition {_disposition:?}", self.transport_id());
        }
    }

    fn get_send_status(
        &self,
        device: &DeviceHandle,
        waiting: &OutboundQueue,
    ) -> Result<ClientStatus> {
        // ---
        let in_flight = self.with_session(device, |session| Ok(!session.tracker.is_empty()))?;

        if waiting.is_empty() && !in_flight {
            Ok(ClientStatus::Idle)
        } else {
            Ok(ClientStatus::Busy)
        }
    }

    fn set_option(&self, name: &str, _value: &OptionValue) -> Result<()> {
        Err(Error::UnsupportedOption(name.to_string()))
    }

    fn destroy(&self) {
        // ---
        let removed = lock_ignore_poison(&self.session).take();
        if let Some(session) = removed {
            log_debug!("{}: disconnecting mqtt client", self.transport_id());
            if let Err(_err) = session.client.try_disconnect() {
                log_debug!("{}: mqtt disconnect failed: {_err}", self.transport_id());
            }
        }
    }
}

struct RumqttcProvider;

impl TransportProvider for RumqttcProvider {
    fn name(&self) -> &'static str {
        MQTT_PROTOCOL
    }

    fn create(&self, config: &TransportConfig) -> Result<Box<dyn Transport>> {
        // ---
        log_debug!("{}: create rumqttc transport for {}", config.transport_id, config.host());
        Ok(Box::new(RumqttcTransport::new(config)))
    }
}

/// Provider for MQTT transports backed by rumqttc.
pub fn mqtt_provider() -> ProviderPtr {
    Arc::new(RumqttcProvider)
}
