//! Device client: the message lifecycle engine.
//!
//! A [`DeviceClient`] owns the outbound queue, a clock handle and a binding
//! to one transport. Nothing happens in the background: the application
//! calls [`DeviceClient::do_work`] periodically, and each call first evicts
//! expired entries and then lets the transport perform I/O. Because timeout
//! scanning always runs before the transport sees the queue, a message can
//! never both time out and be sent in the same cycle.
//!
//! Every accepted message receives exactly one terminal status through its
//! callback: confirmed or error from the transport, timeout from the
//! scanner, or destroyed when the client is dropped with the message still
//! pending.

mod completion;
mod inbound;
mod options;
mod send;
mod timeouts;

pub use inbound::MessageCallback;
pub use options::OPTION_MESSAGE_TIMEOUT;

use crate::clock::Clock;
use crate::{
    // ---
    log_debug,
    log_error,
    log_info,
    Batch,
    BatchResult,
    ClientConfig,
    ClientStatus,
    ConfirmationResult,
    Message,
    MessageDisposition,
    OutboundQueue,
    Result,
    SharedDeviceConfig,
    Transport,
    TransportConsumer,
    TransportPtr,
    UserContext,
};

/// How the client holds its transport.
///
/// An owned transport was created by this client and is destroyed with it.
/// A shared transport belongs to the caller; the client only registers and
/// unregisters its device against it.
enum TransportBinding {
    Owned(Box<dyn Transport>),
    Shared(TransportPtr),
}

impl TransportBinding {
    fn get(&self) -> &dyn Transport {
        // ---
        match self {
            TransportBinding::Owned(transport) => transport.as_ref(),
            TransportBinding::Shared(transport) => transport.as_ref(),
        }
    }

    fn is_shared(&self) -> bool {
        matches!(self, TransportBinding::Shared(_))
    }
}

/// Per-client state the transport reaches through [`TransportConsumer`].
struct ClientState {
    waiting_to_send: OutboundQueue,
    message_callback: Option<MessageCallback>,
    message_context: Option<UserContext>,
    last_receive_ms: Option<u64>,
    message_timeout_ms: u64,
    clock: Box<dyn Clock>,
}

impl ClientState {
    fn new(clock: Box<dyn Clock>) -> Self {
        // ---
        Self {
            waiting_to_send: OutboundQueue::new(),
            message_callback: None,
            message_context: None,
            last_receive_ms: None,
            message_timeout_ms: 0,
            clock,
        }
    }

    /// Resolve every queued entry with `Destroyed`, oldest first.
    fn drain(&mut self) {
        // ---
        let remaining = self.waiting_to_send.take_all();
        if !remaining.is_empty() {
            log_debug!("draining {} unsent message(s)", remaining.len());
        }
        for entry in remaining {
            entry.complete(ConfirmationResult::Destroyed);
        }
    }
}

impl TransportConsumer for ClientState {
    fn waiting_to_send(&mut self) -> &mut OutboundQueue {
        &mut self.waiting_to_send
    }

    fn send_complete(&mut self, completed: Batch, result: BatchResult) {
        self.dispatch_completed(completed, result);
    }

    fn deliver_inbound(&mut self, message: &Message) -> MessageDisposition {
        self.dispatch_inbound(message)
    }
}

/// Device client bound to one transport capability.
///
/// # Example
///
/// ```
/// use telemetry_client::{ClientConfig, DeviceClient, Message, memory_provider};
///
/// # fn main() -> telemetry_client::Result<()> {
/// let config = ClientConfig::from_connection_string(
///     "HostName=myhub.azure-devices.net;DeviceId=dev-1;SharedAccessKey=c2VjcmV0",
///     memory_provider(),
/// )?;
///
/// let mut client = DeviceClient::create(&config)?;
/// client.set_option("messageTimeout", 30_000u64)?;
/// client.send_event_async(&Message::from_text("hello"), None, None)?;
///
/// // Drive the client from the application's own loop.
/// client.do_work();
/// # Ok(())
/// # }
/// ```
pub struct DeviceClient {
    transport: TransportBinding,
    device: crate::DeviceHandle,
    state: ClientState,
}

impl DeviceClient {
    // ---

    /// Create a client that owns a transport built from `config.provider`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`](crate::Error::InvalidArgument) if no provider is configured
    /// - the clock factory's error if no clock can be acquired
    /// - the transport's error if creation or device registration fails
    ///
    /// Resources acquired before the failing step are released.
    pub fn create(config: &ClientConfig) -> Result<Self> {
        // ---
        let provider = config.provider.as_ref().ok_or_else(|| {
            log_error!("invalid configuration: no transport provider");
            crate::Error::InvalidArgument("no transport provider configured".into())
        })?;

        let clock = (config.clock)().map_err(|err| {
            log_error!("unable to acquire a clock: {err}");
            err
        })?;

        let transport = provider.create(&config.transport_config()).map_err(|err| {
            log_error!("underlying {} transport failed: {err}", provider.name());
            err
        })?;

        let device = match transport.register(&config.device_config()) {
            Ok(device) => device,
            Err(err) => {
                log_error!("registering device in transport failed: {err}");
                transport.destroy();
                return Err(err);
            }
        };

        log_debug!(
            "{}: created client over owned {} transport",
            device.device_id(),
            transport.protocol()
        );

        Ok(Self {
            transport: TransportBinding::Owned(transport),
            device,
            state: ClientState::new(clock),
        })
    }

    /// Create a client registered against a caller-owned transport.
    ///
    /// Only `register` is invoked; the transport is never destroyed by this
    /// client.
    pub fn create_with_transport(config: &SharedDeviceConfig) -> Result<Self> {
        // ---
        let clock = (config.clock)().map_err(|err| {
            log_error!("unable to acquire a clock: {err}");
            err
        })?;

        let device = config.transport.register(&config.device).map_err(|err| {
            log_error!("registering device in shared transport failed: {err}");
            err
        })?;

        log_debug!(
            "{}: created client over shared {} transport",
            device.device_id(),
            config.transport.protocol()
        );

        Ok(Self {
            transport: TransportBinding::Shared(config.transport.clone()),
            device,
            state: ClientState::new(clock),
        })
    }

    /// Parse `connection_string` and create a client over `provider`.
    ///
    /// See [`ClientConfig::from_connection_string`] for the accepted format.
    pub fn create_from_connection_string(
        connection_string: &str,
        provider: crate::ProviderPtr,
    ) -> Result<Self> {
        // ---
        log_info!("device telemetry client, version {}", crate::version_string());

        let config = ClientConfig::from_connection_string(connection_string, provider)?;
        Self::create(&config)
    }

    /// Tear the client down.
    ///
    /// Equivalent to dropping it: the device is unregistered, an owned
    /// transport is destroyed, and every message still queued receives
    /// [`ConfirmationResult::Destroyed`] in send order.
    pub fn destroy(self) {
        drop(self);
    }

    /// Run one drive cycle: evict expired messages, then let the transport
    /// perform I/O.
    pub fn do_work(&mut self) {
        // ---
        self.state.scan_timeouts();
        self.transport.get().do_work(&self.device, &mut self.state);
    }

    /// Ask the transport whether this device still has outbound work.
    pub fn get_send_status(&self) -> Result<ClientStatus> {
        // ---
        self.transport
            .get()
            .get_send_status(&self.device, &self.state.waiting_to_send)
    }

    /// Number of messages accepted but not yet taken by the transport.
    pub fn pending_count(&self) -> usize {
        self.state.waiting_to_send.len()
    }

    /// Default timeout applied to newly sent messages, `0` when disabled.
    pub fn message_timeout_ms(&self) -> u64 {
        self.state.message_timeout_ms
    }

    /// Whether this client shares a caller-owned transport.
    pub fn is_shared_transport(&self) -> bool {
        self.transport.is_shared()
    }

    pub fn device_id(&self) -> &str {
        self.device.device_id()
    }
}

impl Drop for DeviceClient {
    fn drop(&mut self) {
        // ---
        let transport = self.transport.get();
        transport.unregister(&self.device);

        if let TransportBinding::Owned(owned) = &self.transport {
            owned.destroy();
        }

        self.state.drain();

        log_debug!("{}: client destroyed", self.device.device_id());
    }
}

/// Version of this crate.
pub fn version_string() -> &'static str {
    env!("CARGO_PKG_VERSION")
}


#[cfg(test)]
mod tests {
    // ---
    use super::test_support::*;
    use super::*;
    use crate::{ClientConfig, ConfirmationCallback, Error, ManualClock};
    use std::sync::{Arc, Mutex};

    fn config(script: &Arc<Mutex<Script>>, clock: &ManualClock) -> ClientConfig {
        // ---
        let provider = Arc::new(ScriptedProvider {
            script: script.clone(),
            fail_create: false,
        });

        ClientConfig::new("hub", "example.net", "dev-1", "key")
            .with_provider(provider)
            .with_clock(clock.factory())
    }

    fn recorder(
        log: &Arc<Mutex<Vec<(String, ConfirmationResult)>>>,
        tag: &str,
    ) -> ConfirmationCallback {
        // ---
        let log = log.clone();
        let tag = tag.to_string();
        Box::new(move |result, _| log.lock().unwrap().push((tag, result)))
    }

    #[test]
    fn test_create_registers_and_owns_transport() {
        // ---
        let script = Arc::new(Mutex::new(Script::default()));
        let clock = ManualClock::new(0);

        let client = DeviceClient::create(&config(&script, &clock)).unwrap();
        assert!(!client.is_shared_transport());
        assert_eq!(client.message_timeout_ms(), 0);
        assert_eq!(client.device_id(), "dev-1");

        client.destroy();
        assert_eq!(
            script.lock().unwrap().calls,
            vec!["register", "unregister", "destroy"]
        );
    }

    #[test]
    fn test_create_without_provider_is_invalid() {
        // ---
        let config = ClientConfig::new("hub", "example.net", "dev-1", "key");
        let err = DeviceClient::create(&config).err().unwrap();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_register_failure_destroys_transport() {
        // ---
        let script = Arc::new(Mutex::new(Script {
            fail_register: true,
            ..Script::default()
        }));
        let clock = ManualClock::new(0);

        let result = DeviceClient::create(&config(&script, &clock));
        assert!(matches!(result, Err(Error::Transport(_))));
        assert_eq!(script.lock().unwrap().calls, vec!["register", "destroy"]);
    }

    #[test]
    fn test_clock_failure_aborts_before_transport() {
        // ---
        let script = Arc::new(Mutex::new(Script::default()));
        let config = config(&script, &ManualClock::new(0)).with_clock(Arc::new(
            || -> crate::Result<Box<dyn Clock>> { Err(Error::Clock("no tick counter".into())) },
        ));

        let result = DeviceClient::create(&config);
        assert!(matches!(result, Err(Error::Clock(_))));
        assert!(script.lock().unwrap().calls.is_empty());
    }

    #[test]
    fn test_transport_create_failure() {
        // ---
        let script = Arc::new(Mutex::new(Script::default()));
        let config = ClientConfig::new("hub", "example.net", "dev-1", "key").with_provider(
            Arc::new(ScriptedProvider {
                script: script.clone(),
                fail_create: true,
            }),
        );

        assert!(matches!(
            DeviceClient::create(&config),
            Err(Error::Transport(_))
        ));
        assert!(script.lock().unwrap().calls.is_empty());
    }

    #[test]
    fn test_shared_transport_is_not_destroyed() {
        // ---
        let script = Arc::new(Mutex::new(Script::default()));
        let transport: TransportPtr = Arc::new(ScriptedTransport::new(script.clone()));
        let shared = SharedDeviceConfig::new(transport, "dev-2", "key");

        let client = DeviceClient::create_with_transport(&shared).unwrap();
        assert!(client.is_shared_transport());
        drop(client);

        assert_eq!(script.lock().unwrap().calls, vec!["register", "unregister"]);
    }

    #[test]
    fn test_destroy_drains_in_fifo_order() {
        // ---
        let script = Arc::new(Mutex::new(Script::default()));
        let clock = ManualClock::new(0);
        let mut client = DeviceClient::create(&config(&script, &clock)).unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));

        client
            .send_event_async(&Message::from_text("1"), Some(recorder(&log, "1")), None)
            .unwrap();
        client
            .send_event_async(&Message::from_text("2"), None, None)
            .unwrap();
        client
            .send_event_async(&Message::from_text("3"), Some(recorder(&log, "3")), None)
            .unwrap();
        assert_eq!(client.pending_count(), 3);

        client.destroy();

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                ("1".to_string(), ConfirmationResult::Destroyed),
                ("3".to_string(), ConfirmationResult::Destroyed),
            ]
        );
    }

    #[test]
    fn test_send_status_follows_queue() {
        // ---
        let script = Arc::new(Mutex::new(Script::default()));
        let clock = ManualClock::new(0);
        let mut client = DeviceClient::create(&config(&script, &clock)).unwrap();

        assert_eq!(client.get_send_status().unwrap(), ClientStatus::Idle);
        client
            .send_event_async(&Message::from_text("x"), None, None)
            .unwrap();
        assert_eq!(client.get_send_status().unwrap(), ClientStatus::Busy);
    }

    #[test]
    fn test_version_string_matches_package() {
        assert_eq!(version_string(), env!("CARGO_PKG_VERSION"));
    }
}
