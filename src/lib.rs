//! Device-side message lifecycle core for cloud telemetry.
//!
//! A [`DeviceClient`] accepts outbound messages into a FIFO queue, hands them
//! to a pluggable [`Transport`], and reports exactly one terminal status per
//! message through the caller's confirmation callback. Messages that sit in
//! the queue past their timeout are evicted and reported as timed out; the
//! rest are confirmed, failed, or destroyed with the client.
//!
//! The client is driven cooperatively: nothing happens unless the
//! application calls [`DeviceClient::do_work`].
//!
//! Transports are created through a [`TransportProvider`]. The in-memory
//! provider is always available; the MQTT provider requires the
//! `transport_rumqttc` feature.

// Import all sub modules once...
mod client;
mod clock;
mod domain;
mod error;
mod macros;
mod transport;

mod client_builder;
mod client_config;

pub(crate) use macros::{log_debug, log_error, log_info, log_warn};

// Re-export main types
pub use client::{version_string, DeviceClient, MessageCallback, OPTION_MESSAGE_TIMEOUT};

pub use client_builder::ClientBuilder;
pub use client_config::{ClientConfig, ClientSettings, SharedDeviceConfig};

pub use clock::{monotonic_clock_factory, Clock, ClockFactory, ManualClock, MonotonicClock};
pub use error::{ClientResult, Error, Result};

pub use transport::{
    // ---
    memory_provider,
    memory_provider_with_hub,
    mqtt_provider,
    provider_for,
    MemoryHub,
    MEMORY_PROTOCOL,
    MQTT_PROTOCOL,
    OPTION_BATCHING,
};

// --- public re-exports
pub use domain::{
    //
    Batch,
    BatchResult,
    ClientStatus,
    ConfirmationCallback,
    ConfirmationResult,
    DeviceConfig,
    DeviceHandle,
    Message,
    MessageContent,
    MessageDisposition,
    OptionValue,
    OutboundQueue,
    ProviderPtr,
    QueueEntry,
    Transport,
    TransportBase,
    TransportConfig,
    TransportConsumer,
    TransportProvider,
    TransportPtr,
    UserContext,
};
