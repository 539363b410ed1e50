//! Public, transport-agnostic client configuration.
//!
//! These types intentionally contain no protocol-specific concepts (e.g.
//! MQTT client options). Transport providers interpret the
//! [`TransportConfig`] derived from a [`ClientConfig`] into concrete
//! connection settings.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::clock::{monotonic_clock_factory, ClockFactory};
use crate::{
    // ---
    DeviceConfig,
    Error,
    ProviderPtr,
    Result,
    TransportConfig,
    TransportPtr,
};

const HOSTNAME_TOKEN: &str = "HostName";
const DEVICEID_TOKEN: &str = "DeviceId";
const DEVICEKEY_TOKEN: &str = "SharedAccessKey";
const PROTOCOL_GATEWAY_HOST_TOKEN: &str = "GatewayHostName";

/// Configuration for a client that creates and owns its transport.
#[derive(Clone)]
pub struct ClientConfig {
    // ---
    /// Factory for the transport this client will own.
    ///
    /// Required by [`DeviceClient::create`](crate::DeviceClient::create).
    pub provider: Option<ProviderPtr>,

    /// Hub name, the host name up to its first `.`.
    pub hub_name: String,

    /// Hub suffix, the host name after its first `.`.
    pub hub_suffix: String,

    /// Device identity registered with the transport.
    pub device_id: String,

    /// Device credential handed to the transport at registration.
    pub device_key: String,

    /// Optional protocol gateway to connect through.
    pub protocol_gateway_host: Option<String>,

    /// Broker keep-alive interval in seconds; transport default when `None`.
    pub keep_alive_secs: Option<u16>,

    /// Clock acquired by the client at creation.
    ///
    /// Default: a monotonic clock.
    pub clock: ClockFactory,
}

impl ClientConfig {
    /// Create a configuration from explicit identity values.
    ///
    /// No provider is set; add one with [`ClientConfig::with_provider`].
    pub fn new(
        hub_name: impl Into<String>,
        hub_suffix: impl Into<String>,
        device_id: impl Into<String>,
        device_key: impl Into<String>,
    ) -> Self {
        // ---
        Self {
            provider: None,
            hub_name: hub_name.into(),
            hub_suffix: hub_suffix.into(),
            device_id: device_id.into(),
            device_key: device_key.into(),
            protocol_gateway_host: None,
            keep_alive_secs: None,
            clock: monotonic_clock_factory(),
        }
    }

    /// Parse a connection string of the form
    /// `HostName=<name>.<suffix>;DeviceId=<id>;SharedAccessKey=<key>[;GatewayHostName=<host>]`.
    ///
    /// Keys may appear in any order; unknown keys are ignored. Values may
    /// contain `=` (base64 keys usually do).
    ///
    /// # Example
    ///
    /// ```
    /// use telemetry_client::{ClientConfig, memory_provider};
    ///
    /// let config = ClientConfig::from_connection_string(
    ///     "HostName=myhub.azure-devices.net;DeviceId=dev-1;SharedAccessKey=a2V5==",
    ///     memory_provider(),
    /// )
    /// .unwrap();
    ///
    /// assert_eq!(config.hub_name, "myhub");
    /// assert_eq!(config.hub_suffix, "azure-devices.net");
    /// assert_eq!(config.device_key, "a2V5==");
    /// ```
    ///
    /// # Errors
    ///
    /// [`Error::ConnectionString`] if a segment is not `key=value`, if the
    /// host name has no `.`, or if a required key is missing.
    pub fn from_connection_string(connection_string: &str, provider: ProviderPtr) -> Result<Self> {
        // ---
        let mut hub = None;
        let mut device_id = None;
        let mut device_key = None;
        let mut gateway = None;

        for segment in connection_string.split(';').filter(|s| !s.is_empty()) {
            let (key, value) = segment.split_once('=').ok_or_else(|| {
                Error::ConnectionString(format!("segment without '=': {segment}"))
            })?;

            match key {
                HOSTNAME_TOKEN => {
                    let (name, suffix) = value.split_once('.').ok_or_else(|| {
                        Error::ConnectionString(format!("{HOSTNAME_TOKEN} has no suffix: {value}"))
                    })?;
                    hub = Some((name.to_string(), suffix.to_string()));
                }
                DEVICEID_TOKEN => device_id = Some(value.to_string()),
                DEVICEKEY_TOKEN => device_key = Some(value.to_string()),
                PROTOCOL_GATEWAY_HOST_TOKEN => gateway = Some(value.to_string()),
                _ => {}
            }
        }

        let (hub_name, hub_suffix) = hub.ok_or_else(|| missing(HOSTNAME_TOKEN))?;
        let device_id = device_id.ok_or_else(|| missing(DEVICEID_TOKEN))?;
        let device_key = device_key.ok_or_else(|| missing(DEVICEKEY_TOKEN))?;

        let mut config = Self::new(hub_name, hub_suffix, device_id, device_key);
        config.provider = Some(provider);
        config.protocol_gateway_host = gateway;
        Ok(config)
    }

    /// Set the transport provider.
    pub fn with_provider(mut self, provider: ProviderPtr) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Connect through a protocol gateway instead of the hub host.
    pub fn with_gateway_host(mut self, host: impl Into<String>) -> Self {
        self.protocol_gateway_host = Some(host.into());
        self
    }

    /// Set an explicit keep-alive interval.
    pub fn with_keep_alive_secs(mut self, secs: u16) -> Self {
        self.keep_alive_secs = Some(secs);
        self
    }

    /// Replace the clock factory.
    pub fn with_clock(mut self, clock: ClockFactory) -> Self {
        self.clock = clock;
        self
    }

    pub(crate) fn transport_config(&self) -> TransportConfig {
        // ---
        TransportConfig {
            transport_id: self.device_id.clone(),
            hub_name: self.hub_name.clone(),
            hub_suffix: self.hub_suffix.clone(),
            protocol_gateway_host: self.protocol_gateway_host.clone(),
            keep_alive_secs: self.keep_alive_secs,
        }
    }

    pub(crate) fn device_config(&self) -> DeviceConfig {
        DeviceConfig::new(self.device_id.clone(), self.device_key.clone())
    }
}

fn missing(token: &str) -> Error {
    Error::ConnectionString(format!("{token} is not found"))
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // ---
        f.debug_struct("ClientConfig")
            .field("provider", &self.provider.as_ref().map(|p| p.name()))
            .field("hub_name", &self.hub_name)
            .field("hub_suffix", &self.hub_suffix)
            .field("device_id", &self.device_id)
            .field("device_key", &"<redacted>")
            .field("protocol_gateway_host", &self.protocol_gateway_host)
            .field("keep_alive_secs", &self.keep_alive_secs)
            .finish()
    }
}

/// Configuration for a client registered against a caller-owned transport.
#[derive(Clone)]
pub struct SharedDeviceConfig {
    /// Transport shared with other clients; never destroyed by this client.
    pub transport: TransportPtr,

    /// Identity registered against `transport`.
    pub device: DeviceConfig,

    /// Clock acquired by the client at creation.
    pub clock: ClockFactory,
}

impl SharedDeviceConfig {
    pub fn new(
        transport: TransportPtr,
        device_id: impl Into<String>,
        device_key: impl Into<String>,
    ) -> Self {
        // ---
        Self {
            transport,
            device: DeviceConfig::new(device_id, device_key),
            clock: monotonic_clock_factory(),
        }
    }

    /// Replace the clock factory.
    pub fn with_clock(mut self, clock: ClockFactory) -> Self {
        self.clock = clock;
        self
    }
}

impl fmt::Debug for SharedDeviceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // ---
        f.debug_struct("SharedDeviceConfig")
            .field("transport", &self.transport.transport_id())
            .field("device", &self.device)
            .finish()
    }
}

/// Client settings loadable from a JSON document.
///
/// Consumed by [`ClientBuilder::settings`](crate::ClientBuilder::settings).
///
/// ```
/// use telemetry_client::ClientSettings;
///
/// let settings = ClientSettings::from_json(r#"{
///     "connection_string": "HostName=h.example.net;DeviceId=d;SharedAccessKey=k",
///     "transport_type": "memory",
///     "message_timeout_ms": 60000
/// }"#).unwrap();
///
/// assert_eq!(settings.message_timeout_ms, Some(60_000));
/// ```
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientSettings {
    pub connection_string: Option<String>,
    pub transport_type: Option<String>,
    pub message_timeout_ms: Option<u64>,
    pub keep_alive_secs: Option<u16>,
}

impl ClientSettings {
    /// Parse settings from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl fmt::Debug for ClientSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // ---
        f.debug_struct("ClientSettings")
            .field(
                "connection_string",
                &self.connection_string.as_ref().map(|_| "<redacted>"),
            )
            .field("transport_type", &self.transport_type)
            .field("message_timeout_ms", &self.message_timeout_ms)
            .field("keep_alive_secs", &self.keep_alive_secs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::memory_provider;

    #[test]
    fn test_parse_full_connection_string() {
        // ---
        let config = ClientConfig::from_connection_string(
            "HostName=hub.example.net;DeviceId=dev;SharedAccessKey=abc==;GatewayHostName=gw.local",
            memory_provider(),
        )
        .unwrap();

        assert_eq!(config.hub_name, "hub");
        assert_eq!(config.hub_suffix, "example.net");
        assert_eq!(config.device_id, "dev");
        assert_eq!(config.device_key, "abc==");
        assert_eq!(config.protocol_gateway_host.as_deref(), Some("gw.local"));
        assert_eq!(config.transport_config().host(), "gw.local");
    }

    #[test]
    fn test_order_and_unknown_keys() {
        // ---
        let config = ClientConfig::from_connection_string(
            "SharedAccessKey=k;Extra=1;DeviceId=d;HostName=h.a.b;",
            memory_provider(),
        )
        .unwrap();

        assert_eq!(config.hub_name, "h");
        assert_eq!(config.hub_suffix, "a.b");
        assert!(config.protocol_gateway_host.is_none());
    }

    #[test]
    fn test_missing_keys() {
        // ---
        for (input, token) in [
            ("DeviceId=d;SharedAccessKey=k", HOSTNAME_TOKEN),
            ("HostName=h.s;SharedAccessKey=k", DEVICEID_TOKEN),
            ("HostName=h.s;DeviceId=d", DEVICEKEY_TOKEN),
        ] {
            let err = ClientConfig::from_connection_string(input, memory_provider()).unwrap_err();
            match err {
                Error::ConnectionString(msg) => assert!(msg.contains(token), "{msg}"),
                other => panic!("unexpected error {other:?}"),
            }
        }
    }

    #[test]
    fn test_malformed_segments() {
        // ---
        assert!(matches!(
            ClientConfig::from_connection_string("HostName", memory_provider()),
            Err(Error::ConnectionString(_))
        ));
        assert!(matches!(
            ClientConfig::from_connection_string(
                "HostName=nodots;DeviceId=d;SharedAccessKey=k",
                memory_provider()
            ),
            Err(Error::ConnectionString(_))
        ));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        // ---
        let config = ClientConfig::new("h", "s", "d", "super-secret");
        assert!(!format!("{config:?}").contains("super-secret"));

        let settings = ClientSettings {
            connection_string: Some("SharedAccessKey=super-secret".into()),
            ..ClientSettings::default()
        };
        assert!(!format!("{settings:?}").contains("super-secret"));
    }

    #[test]
    fn test_settings_reject_unknown_fields() {
        // ---
        let err = ClientSettings::from_json(r#"{ "transport": "memory" }"#).unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
