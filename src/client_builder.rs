//! Fluent builder for device clients.
//!
//! Provides a builder API for constructing a [`DeviceClient`] with clear
//! separation between identity, transport selection and client options.
//! Conflicting combinations are detected at `build()`.

use crate::clock::ClockFactory;
use crate::{
    // ---
    provider_for,
    ClientConfig,
    ClientSettings,
    DeviceClient,
    Error,
    ProviderPtr,
    Result,
    SharedDeviceConfig,
    TransportPtr,
    OPTION_MESSAGE_TIMEOUT,
};

/// Builder for creating device clients.
///
/// Identity comes either from a connection string or from explicit
/// [`hub`](ClientBuilder::hub) and [`device`](ClientBuilder::device) calls,
/// never both. The transport is either created by the client (from a
/// provider or a transport type name) or shared with other clients.
///
/// # Examples
///
/// ## Owned transport from a connection string
/// ```
/// use telemetry_client::ClientBuilder;
///
/// # fn main() -> telemetry_client::Result<()> {
/// let client = ClientBuilder::new()
///     .connection_string("HostName=myhub.azure-devices.net;DeviceId=dev-1;SharedAccessKey=a2V5")
///     .transport_type("memory")
///     .message_timeout_ms(30_000)
///     .build()?;
///
/// assert_eq!(client.message_timeout_ms(), 30_000);
/// # Ok(())
/// # }
/// ```
///
/// ## Shared transport
/// ```
/// use telemetry_client::{ClientBuilder, MemoryHub};
///
/// # fn main() -> telemetry_client::Result<()> {
/// let hub = MemoryHub::new();
/// let transport = hub.create_transport("gateway");
///
/// let first = ClientBuilder::new()
///     .shared_transport(transport.clone())
///     .device("dev-1", "key-1")
///     .build()?;
/// let second = ClientBuilder::new()
///     .shared_transport(transport)
///     .device("dev-2", "key-2")
///     .build()?;
///
/// assert!(first.is_shared_transport() && second.is_shared_transport());
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct ClientBuilder {
    connection_string: Option<String>,
    hub: Option<(String, String)>,
    device: Option<(String, String)>,
    gateway_host: Option<String>,
    transport_type: Option<String>,
    provider: Option<ProviderPtr>,
    shared_transport: Option<TransportPtr>,
    message_timeout_ms: Option<u64>,
    keep_alive_secs: Option<u16>,
    clock: Option<ClockFactory>,
}

impl ClientBuilder {
    /// Create a new client builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take hub and device identity from a connection string.
    ///
    /// Cannot be used together with [`hub`](Self::hub) or
    /// [`device`](Self::device).
    pub fn connection_string(mut self, connection_string: impl Into<String>) -> Self {
        self.connection_string = Some(connection_string.into());
        self
    }

    /// Set the hub name and suffix explicitly.
    pub fn hub(mut self, name: impl Into<String>, suffix: impl Into<String>) -> Self {
        self.hub = Some((name.into(), suffix.into()));
        self
    }

    /// Set the device identity explicitly.
    pub fn device(mut self, device_id: impl Into<String>, device_key: impl Into<String>) -> Self {
        self.device = Some((device_id.into(), device_key.into()));
        self
    }

    /// Connect through a protocol gateway.
    pub fn gateway_host(mut self, host: impl Into<String>) -> Self {
        self.gateway_host = Some(host.into());
        self
    }

    /// Select the transport by protocol name.
    ///
    /// Valid values: `"memory"`, `"rumqttc"`
    pub fn transport_type(mut self, name: impl Into<String>) -> Self {
        self.transport_type = Some(name.into());
        self
    }

    /// Use a specific transport provider.
    pub fn provider(mut self, provider: ProviderPtr) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Register against a caller-owned transport instead of creating one.
    pub fn shared_transport(mut self, transport: TransportPtr) -> Self {
        self.shared_transport = Some(transport);
        self
    }

    /// Default timeout for messages sent by the new client, `0` to disable.
    pub fn message_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.message_timeout_ms = Some(timeout_ms);
        self
    }

    /// Set the hub connection keep-alive interval in seconds.
    ///
    /// If not specified, uses transport default.
    pub fn keep_alive_secs(mut self, secs: u16) -> Self {
        self.keep_alive_secs = Some(secs);
        self
    }

    /// Replace the default monotonic clock.
    pub fn clock(mut self, clock: ClockFactory) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Fill unset fields from loaded settings.
    ///
    /// Values set explicitly on the builder take precedence.
    pub fn settings(mut self, settings: ClientSettings) -> Self {
        // ---
        self.connection_string = self.connection_string.or(settings.connection_string);
        self.transport_type = self.transport_type.or(settings.transport_type);
        self.message_timeout_ms = self.message_timeout_ms.or(settings.message_timeout_ms);
        self.keep_alive_secs = self.keep_alive_secs.or(settings.keep_alive_secs);
        self
    }

    /// Build the client (consumes self).
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Identity or transport selection is missing ([`Error::MissingConfig`])
    /// - Incompatible options were combined ([`Error::ConfigConflict`])
    /// - The connection string is malformed
    /// - Client creation or the initial timeout option fails
    pub fn build(self) -> Result<DeviceClient> {
        // ---
        let mut client = match self.shared_transport.clone() {
            Some(transport) => self.build_shared(transport)?,
            None => self.build_owned()?,
        };

        if let Some(timeout_ms) = self.message_timeout_ms {
            client.set_option(OPTION_MESSAGE_TIMEOUT, timeout_ms)?;
        }

        Ok(client)
    }

    fn build_shared(&self, transport: TransportPtr) -> Result<DeviceClient> {
        // ---
        if self.provider.is_some() || self.transport_type.is_some() {
            return Err(Error::ConfigConflict(
                "Cannot combine a shared transport with a provider or transport_type".into(),
            ));
        }
        if self.connection_string.is_some()
            || self.hub.is_some()
            || self.gateway_host.is_some()
            || self.keep_alive_secs.is_some()
        {
            return Err(Error::ConfigConflict(
                "Connection settings belong to the shared transport; only device() applies".into(),
            ));
        }

        let (device_id, device_key) = self
            .device
            .clone()
            .ok_or_else(|| Error::MissingConfig("device".into()))?;

        let mut config = SharedDeviceConfig::new(transport, device_id, device_key);
        if let Some(clock) = &self.clock {
            config = config.with_clock(clock.clone());
        }

        DeviceClient::create_with_transport(&config)
    }

    fn build_owned(&self) -> Result<DeviceClient> {
        // ---
        let provider = match (&self.provider, self.transport_type.as_deref()) {
            (Some(_), Some(_)) => {
                return Err(Error::ConfigConflict(
                    "Cannot set both a provider and a transport_type".into(),
                ));
            }
            (Some(provider), None) => provider.clone(),
            (None, Some(name)) => provider_for(name)?,
            (None, None) => return Err(Error::MissingConfig("transport_type or provider".into())),
        };

        let mut config = match &self.connection_string {
            Some(_) if self.hub.is_some() || self.device.is_some() => {
                return Err(Error::ConfigConflict(
                    "Cannot use both a connection string and explicit hub/device identity".into(),
                ));
            }
            Some(connection_string) => {
                ClientConfig::from_connection_string(connection_string, provider)?
            }
            None => {
                let (hub_name, hub_suffix) = self
                    .hub
                    .clone()
                    .ok_or_else(|| Error::MissingConfig("hub".into()))?;
                let (device_id, device_key) = self
                    .device
                    .clone()
                    .ok_or_else(|| Error::MissingConfig("device".into()))?;
                ClientConfig::new(hub_name, hub_suffix, device_id, device_key).with_provider(provider)
            }
        };

        // An explicit gateway overrides GatewayHostName from the connection string.
        if let Some(host) = &self.gateway_host {
            config = config.with_gateway_host(host.clone());
        }
        if let Some(secs) = self.keep_alive_secs {
            config = config.with_keep_alive_secs(secs);
        }
        if let Some(clock) = &self.clock {
            config = config.with_clock(clock.clone());
        }

        DeviceClient::create(&config)
    }
}
