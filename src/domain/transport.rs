// src/domain/transport.rs

//! Transport domain abstractions.
//!
//! This module defines the capability every wire protocol implements so the
//! client can drive it without knowing which protocol is bound. It
//! intentionally avoids any reference to concrete protocols, brokers, or
//! client libraries.
//!
//! The transport is responsible only for moving messages: it detaches
//! entries from the client's outbound queue when it starts sending them and
//! reports their outcome through [`TransportConsumer::send_complete`].
//! Message lifetime, expiry and callback delivery are handled by the client.
//!
//! Concrete implementations of this interface live under `src/transport/`.

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::{Batch, Message, MessageDisposition, OutboundQueue, Result};

/// Shared base state for all transport implementations.
///
/// Each concrete transport embeds this as a field named `base`:
///
/// ```ignore
/// struct MqttTransport {
///     base: TransportBase,
///     // ... mqtt specific fields
/// }
///
/// impl Transport for MqttTransport {
///     fn base(&self) -> &TransportBase { &self.base }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct TransportBase {
    /// Identifier of this transport instance, used for logging.
    pub transport_id: String,
    /// Protocol name of the provider that built this transport.
    pub protocol: &'static str,
}

impl TransportBase {
    pub fn new(transport_id: impl Into<String>, protocol: &'static str) -> Self {
        // ---
        Self {
            transport_id: transport_id.into(),
            protocol,
        }
    }
}

/// Creation descriptor handed to [`TransportProvider::create`].
///
/// Built by the client from its own configuration; transports read only the
/// fields they understand.
#[derive(Clone, Debug)]
pub struct TransportConfig {
    /// Identifier for the new transport instance (defaults to the device id).
    pub transport_id: String,
    /// Hub name, the part of the host name before the first `.`.
    pub hub_name: String,
    /// Hub suffix, the rest of the host name.
    pub hub_suffix: String,
    /// Optional protocol gateway to connect through instead of the hub.
    pub protocol_gateway_host: Option<String>,
    /// Broker keep-alive interval in seconds.
    pub keep_alive_secs: Option<u16>,
}

impl TransportConfig {
    /// Fully qualified host the transport should connect to.
    pub fn host(&self) -> String {
        // ---
        match &self.protocol_gateway_host {
            Some(gateway) => gateway.clone(),
            None => format!("{}.{}", self.hub_name, self.hub_suffix),
        }
    }
}

/// Device identity bound to a transport by [`Transport::register`].
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub device_id: String,
    pub device_key: String,
}

impl DeviceConfig {
    pub fn new(device_id: impl Into<String>, device_key: impl Into<String>) -> Self {
        // ---
        Self {
            device_id: device_id.into(),
            device_key: device_key.into(),
        }
    }
}

impl fmt::Debug for DeviceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // ---
        f.debug_struct("DeviceConfig")
            .field("device_id", &self.device_id)
            .field("device_key", &"<redacted>")
            .finish()
    }
}

/// Opaque per-registration handle returned by [`Transport::register`].
///
/// Distinguishes the traffic of several clients registered against one
/// shared transport.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DeviceHandle {
    id: Uuid,
    device_id: Arc<str>,
}

impl DeviceHandle {
    /// Mint a fresh handle for `device_id`.
    pub fn new(device_id: &str) -> Self {
        // ---
        Self {
            id: Uuid::new_v4(),
            device_id: Arc::from(device_id),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }
}

/// Outcome a transport reports for a whole batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchResult {
    Success,
    Failed,
}

/// Whether a device still has outbound work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatus {
    Idle,
    Busy,
}

/// Value passed to `set_option`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    U64(u64),
    Bool(bool),
    Text(String),
}

impl OptionValue {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            OptionValue::U64(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OptionValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::Text(value) => Some(value),
            _ => None,
        }
    }
}

impl From<u64> for OptionValue {
    fn from(value: u64) -> Self {
        OptionValue::U64(value)
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        OptionValue::Bool(value)
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::Text(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        OptionValue::Text(value)
    }
}

/// The client side of a drive cycle, as seen by a transport.
///
/// Passed to [`Transport::do_work`]. A transport takes entries from
/// [`waiting_to_send`](TransportConsumer::waiting_to_send) when it starts
/// sending them, reports their outcome through
/// [`send_complete`](TransportConsumer::send_complete) (in the same cycle or
/// a later one), and routes inbound messages through
/// [`deliver_inbound`](TransportConsumer::deliver_inbound).
pub trait TransportConsumer {
    /// The client's outbound queue, oldest entry first.
    fn waiting_to_send(&mut self) -> &mut OutboundQueue;

    /// Resolve every entry of `completed` with the status mapped from `result`.
    fn send_complete(&mut self, completed: Batch, result: BatchResult);

    /// Dispatch one inbound message to the application.
    fn deliver_inbound(&mut self, message: &Message) -> MessageDisposition;
}

/// Transport capability.
///
/// The fixed set of operations every protocol variant implements. The client
/// binds one implementation at construction and never inspects which one it
/// holds.
///
/// Implementations must ensure that:
/// - entries detached from the queue are eventually passed to
///   `send_complete`, or dropped (which reports them as destroyed);
/// - `do_work` returns without waiting indefinitely;
/// - callbacks into the consumer are not made while internal locks are held.
///
/// The in-memory transport serves as the reference implementation of these
/// semantics.
pub trait Transport: Send + Sync {
    // ---
    /// Returns a reference to the shared base state.
    fn base(&self) -> &TransportBase;

    /// Returns the transport_id of the transport.
    fn transport_id(&self) -> &str {
        &self.base().transport_id
    }

    /// Returns the protocol name of the transport.
    fn protocol(&self) -> &'static str {
        self.base().protocol
    }

    /// Bind one device identity to this transport.
    fn register(&self, device: &DeviceConfig) -> Result<DeviceHandle>;

    /// Release a device binding.
    fn unregister(&self, device: &DeviceHandle);

    /// Enable inbound delivery for a device.
    fn subscribe(&self, device: &DeviceHandle) -> Result<()>;

    /// Disable inbound delivery for a device.
    fn unsubscribe(&self, device: &DeviceHandle);

    /// Drive I/O for one device.
    fn do_work(&self, device: &DeviceHandle, consumer: &mut dyn TransportConsumer);

    /// Report whether the device has queued or in-flight messages.
    fn get_send_status(
        &self,
        device: &DeviceHandle,
        waiting: &OutboundQueue,
    ) -> Result<ClientStatus>;

    /// Protocol-specific configuration.
    fn set_option(&self, name: &str, value: &OptionValue) -> Result<()>;

    /// Release the transport instance. Only called by the owning client.
    fn destroy(&self);
}

/// Shared transport pointer.
///
/// Used when one transport instance serves several clients; a client bound
/// through this pointer never destroys the transport.
pub type TransportPtr = Arc<dyn Transport>;

/// Factory for one protocol variant.
pub trait TransportProvider: Send + Sync {
    /// Protocol name, e.g. `"memory"` or `"rumqttc"`.
    fn name(&self) -> &'static str;

    /// Build a transport instance from the client's creation descriptor.
    fn create(&self, config: &TransportConfig) -> Result<Box<dyn Transport>>;
}

/// Shared provider pointer, cheap to clone into configurations.
pub type ProviderPtr = Arc<dyn TransportProvider>;

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_host_prefers_gateway() {
        // ---
        let mut config = TransportConfig {
            transport_id: "dev".into(),
            hub_name: "myhub".into(),
            hub_suffix: "azure-devices.net".into(),
            protocol_gateway_host: None,
            keep_alive_secs: None,
        };
        assert_eq!(config.host(), "myhub.azure-devices.net");

        config.protocol_gateway_host = Some("gateway.local".into());
        assert_eq!(config.host(), "gateway.local");
    }

    #[test]
    fn test_device_handles_are_unique() {
        // ---
        let a = DeviceHandle::new("dev");
        let b = DeviceHandle::new("dev");
        assert_ne!(a, b);
        assert_eq!(a.device_id(), b.device_id());
    }

    #[test]
    fn test_device_config_redacts_key() {
        // ---
        let config = DeviceConfig::new("dev", "secret");
        assert!(!format!("{config:?}").contains("secret"));
    }
}
