//! In-memory transport implementation.
//!
//! This module provides a pure in-process implementation of the domain-level
//! `Transport` capability. It is intended primarily for testing, local
//! execution, and as a reference for transport semantics.
//!
//! ## Reference Semantics
//!
//! The in-memory transport defines the **reference behavior** for the
//! transport layer. Other transports are expected to approximate it as
//! closely as their underlying systems allow and to document any
//! unavoidable deviations.
//!
//! - Entries are detached from the client queue only while the hub is online.
//! - Every detached entry is reported through `send_complete` exactly once,
//!   either in the same drive cycle or, while acknowledgements are held, in
//!   a later one.
//! - Cloud-to-device messages are delivered only to subscribed devices, in
//!   the order they were injected.
//! - No consumer callback is made while a transport or hub lock is held.
//!
//! ## Non-Goals
//!
//! This transport does not attempt to emulate the failure modes, persistence,
//! or delivery guarantees of any specific cloud endpoint. It exists to provide
//! a clear, deterministic baseline against which client behavior can be
//! validated.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, OnceLock};

use super::{lock_ignore_poison, OPTION_BATCHING};
use crate::{
    // ---
    log_debug,
    log_error,
    log_warn,
    Batch,
    BatchResult,
    ClientStatus,
    DeviceConfig,
    DeviceHandle,
    Error,
    Message,
    MessageDisposition,
    OptionValue,
    OutboundQueue,
    ProviderPtr,
    Result,
    Transport,
    TransportBase,
    TransportConfig,
    TransportConsumer,
    TransportProvider,
    TransportPtr,
};

/// Protocol name of the in-memory transport.
pub const MEMORY_PROTOCOL: &str = "memory";

/// Simulated cloud endpoint shared by in-memory transports.
///
/// Records every device-to-cloud message it accepts, queues cloud-to-device
/// messages until the addressed device drains them, and exposes switches
/// for the failure modes a client has to cope with.
///
/// # Usage in Tests
///
/// Construct a hub per test to isolate parallel test cases:
///
/// ```
/// use telemetry_client::{memory_provider_with_hub, ClientConfig, DeviceClient, MemoryHub, Message};
///
/// # fn main() -> telemetry_client::Result<()> {
/// let hub = MemoryHub::new();
/// let config = ClientConfig::new("hub", "example.net", "dev-1", "key")
///     .with_provider(memory_provider_with_hub(hub.clone()));
///
/// let mut client = DeviceClient::create(&config)?;
/// client.send_event_async(&Message::from_text("21.5"), None, None)?;
/// client.do_work();
///
/// assert_eq!(hub.received_count("dev-1"), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct MemoryHub {
    // ---
    state: Mutex<HubState>,
}

#[derive(Default)]
struct HubState {
    offline: bool,
    reject_sends: bool,
    hold_acks: bool,
    received: HashMap<String, Vec<Message>>,
    cloud_to_device: HashMap<String, VecDeque<Message>>,
    dispositions: HashMap<String, Vec<MessageDisposition>>,
}

#[derive(Debug, Clone, Copy)]
struct Conditions {
    offline: bool,
    reject_sends: bool,
    hold_acks: bool,
}

impl MemoryHub {
    /// Create a new, empty, online hub.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// While offline, drive cycles move nothing in either direction.
    pub fn set_online(&self, online: bool) {
        lock_ignore_poison(&self.state).offline = !online;
    }

    pub fn is_online(&self) -> bool {
        !lock_ignore_poison(&self.state).offline
    }

    /// Reject every subsequent send; rejected batches complete as `Failed`.
    pub fn set_reject_sends(&self, reject: bool) {
        lock_ignore_poison(&self.state).reject_sends = reject;
    }

    /// Withhold acknowledgements. Accepted batches stay in flight until a
    /// drive cycle runs with acknowledgements released.
    pub fn set_hold_acks(&self, hold: bool) {
        lock_ignore_poison(&self.state).hold_acks = hold;
    }

    /// Queue a cloud-to-device message for `device_id`.
    pub fn send_to_device(&self, device_id: &str, message: Message) {
        // ---
        lock_ignore_poison(&self.state)
            .cloud_to_device
            .entry(device_id.to_string())
            .or_default()
            .push_back(message);
    }

    /// Number of device-to-cloud messages accepted from `device_id`.
    pub fn received_count(&self, device_id: &str) -> usize {
        // ---
        lock_ignore_poison(&self.state)
            .received
            .get(device_id)
            .map_or(0, Vec::len)
    }

    /// Remove and return the messages accepted from `device_id`, oldest first.
    pub fn take_received(&self, device_id: &str) -> Vec<Message> {
        // ---
        lock_ignore_poison(&self.state)
            .received
            .remove(device_id)
            .unwrap_or_default()
    }

    /// Verdicts `device_id` returned for delivered cloud-to-device messages.
    pub fn dispositions(&self, device_id: &str) -> Vec<MessageDisposition> {
        // ---
        lock_ignore_poison(&self.state)
            .dispositions
            .get(device_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Create a transport on this hub for sharing between several clients.
    pub fn create_transport(self: &Arc<Self>, transport_id: impl Into<String>) -> TransportPtr {
        Arc::new(MemoryTransport::new(transport_id, self.clone()))
    }

    fn conditions(&self) -> Conditions {
        // ---
        let state = lock_ignore_poison(&self.state);
        Conditions {
            offline: state.offline,
            reject_sends: state.reject_sends,
            hold_acks: state.hold_acks,
        }
    }

    /// Record copies of every message in `batch`; all or nothing.
    fn accept(&self, device_id: &str, batch: &Batch) -> Result<()> {
        // ---
        let copies = batch
            .iter()
            .map(|entry| entry.message().try_clone())
            .collect::<Result<Vec<_>>>()?;

        lock_ignore_poison(&self.state)
            .received
            .entry(device_id.to_string())
            .or_default()
            .extend(copies);
        Ok(())
    }

    fn pull_inbound(&self, device_id: &str) -> VecDeque<Message> {
        // ---
        lock_ignore_poison(&self.state)
            .cloud_to_device
            .remove(device_id)
            .unwrap_or_default()
    }

    fn record_disposition(&self, device_id: &str, disposition: MessageDisposition) {
        // ---
        lock_ignore_poison(&self.state)
            .dispositions
            .entry(device_id.to_string())
            .or_default()
            .push(disposition);
    }
}

/// Process-global hub used by [`memory_provider`].
static GLOBAL_HUB: OnceLock<Arc<MemoryHub>> = OnceLock::new();

fn global_hub() -> Arc<MemoryHub> {
    GLOBAL_HUB.get_or_init(MemoryHub::new).clone()
}

#[derive(Default)]
struct Link {
    subscribed: bool,
    in_flight: Vec<Batch>,
}

#[derive(Default)]
struct LinkTable {
    batching: bool,
    links: HashMap<DeviceHandle, Link>,
}

/// In-memory transport.
///
/// Carries the traffic of any number of registered devices to a
/// [`MemoryHub`]. Sends one message per batch unless the `"batching"`
/// option is enabled.
struct MemoryTransport {
    // ---
    base: TransportBase,
    hub: Arc<MemoryHub>,
    table: Mutex<LinkTable>,
}

impl MemoryTransport {
    fn new(transport_id: impl Into<String>, hub: Arc<MemoryHub>) -> Self {
        // ---
        Self {
            base: TransportBase::new(transport_id, MEMORY_PROTOCOL),
            hub,
            table: Mutex::new(LinkTable::default()),
        }
    }

    fn with_link<T>(&self, device: &DeviceHandle, f: impl FnOnce(&mut Link) -> T) -> Result<T> {
        // ---
        let mut table = lock_ignore_poison(&self.table);
        match table.links.get_mut(device) {
            Some(link) => Ok(f(link)),
            None => Err(Error::InvalidArgument(format!(
                "{}: device {} is not registered",
                self.transport_id(),
                device.device_id()
            ))),
        }
    }
}

/// Detach what one drive cycle sends: everything as one batch when
/// batching, otherwise one batch per entry.
fn detach_batches(queue: &mut OutboundQueue, batching: bool) -> Vec<Batch> {
    // ---
    if queue.is_empty() {
        return Vec::new();
    }
    if batching {
        return vec![queue.take_all()];
    }
    std::iter::from_fn(|| queue.pop_front())
        .map(|entry| vec![entry])
        .collect()
}

impl Transport for MemoryTransport {
    // ---
    fn base(&self) -> &TransportBase {
        &self.base
    }

    fn register(&self, device: &DeviceConfig) -> Result<DeviceHandle> {
        // ---
        if device.device_id.is_empty() {
            return Err(Error::InvalidArgument("empty device id".into()));
        }

        let handle = DeviceHandle::new(&device.device_id);
        lock_ignore_poison(&self.table)
            .links
            .insert(handle.clone(), Link::default());

        log_debug!("{}: registered device {}", self.transport_id(), device.device_id);
        Ok(handle)
    }

    /// Forget a device. Batches still awaiting acknowledgement are dropped
    /// and report `Destroyed`.
    fn unregister(&self, device: &DeviceHandle) {
        // ---
        let removed = lock_ignore_poison(&self.table).links.remove(device);

        match removed {
            Some(_link) => {
                log_debug!("{}: unregistered device {}", self.transport_id(), device.device_id());
            }
            None => {
                log_warn!("{}: unregister of unknown device {}", self.transport_id(), device.device_id());
            }
        }
    }

    fn subscribe(&self, device: &DeviceHandle) -> Result<()> {
        self.with_link(device, |link| link.subscribed = true)
    }

    fn unsubscribe(&self, device: &DeviceHandle) {
        // ---
        if let Err(_err) = self.with_link(device, |link| link.subscribed = false) {
            log_warn!("{_err}");
        }
    }

    fn do_work(&self, device: &DeviceHandle, consumer: &mut dyn TransportConsumer) {
        // ---
        let conditions = self.hub.conditions();
        if conditions.offline {
            log_debug!("{}: hub offline, nothing moves", self.transport_id());
            return;
        }

        let (batching, subscribed, released) = {
            let mut table = lock_ignore_poison(&self.table);
            let batching = table.batching;
            let Some(link) = table.links.get_mut(device) else {
                log_warn!("{}: do_work for unknown device {}", self.transport_id(), device.device_id());
                return;
            };
            let released = if conditions.hold_acks {
                Vec::new()
            } else {
                std::mem::take(&mut link.in_flight)
            };
            (batching, link.subscribed, released)
        };

        let mut completions: Vec<(Batch, BatchResult)> = released
            .into_iter()
            .map(|batch| (batch, BatchResult::Success))
            .collect();
        let mut held = Vec::new();

        for batch in detach_batches(consumer.waiting_to_send(), batching) {
            if conditions.reject_sends {
                completions.push((batch, BatchResult::Failed));
                continue;
            }
            match self.hub.accept(device.device_id(), &batch) {
                Ok(()) if conditions.hold_acks => held.push(batch),
                Ok(()) => completions.push((batch, BatchResult::Success)),
                Err(_err) => {
                    log_error!("{}: hub could not accept batch: {_err}", self.transport_id());
                    completions.push((batch, BatchResult::Failed));
                }
            }
        }

        if !held.is_empty() {
            let orphaned = {
                let mut table = lock_ignore_poison(&self.table);
                match table.links.get_mut(device) {
                    Some(link) => {
                        link.in_flight.extend(held);
                        None
                    }
                    None => Some(held),
                }
            };
            drop(orphaned);
        }

        for (batch, result) in completions {
            consumer.send_complete(batch, result);
        }

        if !subscribed {
            return;
        }

        for message in self.hub.pull_inbound(device.device_id()) {
            let disposition = consumer.deliver_inbound(&message);
            self.hub.record_disposition(device.device_id(), disposition);
        }
    }

    /// `Busy` while the client queue or this device's in-flight batches hold
    /// entries.
    fn get_send_status(
        &self,
        device: &DeviceHandle,
        waiting: &OutboundQueue,
    ) -> Result<ClientStatus> {
        // ---
        let in_flight = self.with_link(device, |link| !link.in_flight.is_empty())?;

        if waiting.is_empty() && !in_flight {
            Ok(ClientStatus::Idle)
        } else {
            Ok(ClientStatus::Busy)
        }
    }

    fn set_option(&self, name: &str, value: &OptionValue) -> Result<()> {
        // ---
        match name {
            OPTION_BATCHING => {
                let enabled = value.as_bool().ok_or_else(|| {
                    Error::InvalidArgument(format!("{OPTION_BATCHING} expects a bool, got {value:?}"))
                })?;
                lock_ignore_poison(&self.table).batching = enabled;
                Ok(())
            }
            other => Err(Error::UnsupportedOption(other.to_string())),
        }
    }

    fn destroy(&self) {
        // ---
        let links = std::mem::take(&mut lock_ignore_poison(&self.table).links);
        log_debug!(
            "{}: destroying transport with {} device(s) registered",
            self.transport_id(),
            links.len()
        );
        drop(links);
    }
}

struct MemoryProvider {
    hub: Arc<MemoryHub>,
}

impl TransportProvider for MemoryProvider {
    fn name(&self) -> &'static str {
        MEMORY_PROTOCOL
    }

    fn create(&self, config: &TransportConfig) -> Result<Box<dyn Transport>> {
        // ---
        log_debug!("{}: create memory transport", config.transport_id);
        Ok(Box::new(MemoryTransport::new(
            config.transport_id.clone(),
            self.hub.clone(),
        )))
    }
}

/// Provider for in-memory transports on the process-global hub.
///
/// For isolated parallel testing, use [`memory_provider_with_hub`].
pub fn memory_provider() -> ProviderPtr {
    memory_provider_with_hub(global_hub())
}

/// Provider for in-memory transports on the given hub.
pub fn memory_provider_with_hub(hub: Arc<MemoryHub>) -> ProviderPtr {
    Arc::new(MemoryProvider { hub })
}
