//! Domain layer public interface.
//!
//! This module defines domain-level abstractions that are independent of
//! transport implementations, protocols, or infrastructure concerns.
//!
//! All domain consumers must import symbols via this module, not by
//! referencing individual files directly.

mod message;
mod queue;
mod transport;

// --- Message domain re-exports ---

pub use message::{
    //
    Message,
    MessageContent,
    MessageDisposition,
};

// --- Queue domain re-exports ---

pub use queue::{
    //
    Batch,
    ConfirmationCallback,
    ConfirmationResult,
    OutboundQueue,
    QueueEntry,
    UserContext,
};

// --- Transport domain re-exports ---

pub use transport::{
    //
    BatchResult,
    ClientStatus,
    DeviceConfig,
    DeviceHandle,
    OptionValue,
    ProviderPtr,
    Transport,
    TransportBase,
    TransportConfig,
    TransportConsumer,
    TransportPtr,
    TransportProvider,
};
