// src/domain/message.rs

//! Application messages.
//!
//! A [`Message`] is the unit the application hands to the client for
//! delivery and the unit a transport hands back on the inbound path. The
//! client never interprets the body or the properties.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Body of a message.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageContent {
    /// Opaque bytes.
    Binary(Bytes),
    /// UTF-8 text.
    Text(String),
}

/// An application message with application-defined properties.
///
/// `Message` deliberately does not implement `Clone`: the client takes a
/// deep copy through [`Message::try_clone`] when a message is accepted, so
/// the application keeps ownership of its original and copy failures are
/// reported instead of aborting.
///
/// # Example
///
/// ```
/// # use telemetry_client::Message;
/// let mut msg = Message::from_text("{\"temperature\":21.5}");
/// msg.set_property("alert", "false");
/// msg.set_message_id("m-001");
///
/// assert_eq!(msg.property("alert"), Some("false"));
/// assert_eq!(msg.as_bytes(), b"{\"temperature\":21.5}");
/// ```
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    content: MessageContent,
    properties: BTreeMap<String, String>,
    message_id: Option<String>,
    correlation_id: Option<String>,
}

impl Message {
    // ---

    /// Create a binary message.
    pub fn from_bytes(body: impl Into<Bytes>) -> Self {
        Self::with_content(MessageContent::Binary(body.into()))
    }

    /// Create a text message.
    pub fn from_text(body: impl Into<String>) -> Self {
        Self::with_content(MessageContent::Text(body.into()))
    }

    fn with_content(content: MessageContent) -> Self {
        // ---
        Self {
            content,
            properties: BTreeMap::new(),
            message_id: None,
            correlation_id: None,
        }
    }

    pub fn content(&self) -> &MessageContent {
        &self.content
    }

    /// Body bytes regardless of content kind.
    pub fn as_bytes(&self) -> &[u8] {
        // ---
        match &self.content {
            MessageContent::Binary(bytes) => bytes,
            MessageContent::Text(text) => text.as_bytes(),
        }
    }

    /// Body as text, if this is a text message.
    pub fn as_text(&self) -> Option<&str> {
        // ---
        match &self.content {
            MessageContent::Text(text) => Some(text),
            MessageContent::Binary(_) => None,
        }
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Set an application property, replacing any previous value.
    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    pub fn set_message_id(&mut self, id: impl Into<String>) {
        self.message_id = Some(id.into());
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn set_correlation_id(&mut self, id: impl Into<String>) {
        self.correlation_id = Some(id.into());
    }

    /// Deep copy of this message.
    ///
    /// The body is copied into a freshly reserved buffer rather than sharing
    /// the reference-counted original, so the copy stays valid however the
    /// application treats its own handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MessageCopy`] if the body buffer cannot be allocated.
    pub fn try_clone(&self) -> Result<Self> {
        // ---
        let content = match &self.content {
            MessageContent::Binary(bytes) => {
                let mut body = Vec::new();
                body.try_reserve_exact(bytes.len())
                    .map_err(|e| Error::MessageCopy(e.to_string()))?;
                body.extend_from_slice(bytes);
                MessageContent::Binary(Bytes::from(body))
            }
            MessageContent::Text(text) => {
                let mut body = String::new();
                body.try_reserve_exact(text.len())
                    .map_err(|e| Error::MessageCopy(e.to_string()))?;
                body.push_str(text);
                MessageContent::Text(body)
            }
        };

        Ok(Self {
            content,
            properties: self.properties.clone(),
            message_id: self.message_id.clone(),
            correlation_id: self.correlation_id.clone(),
        })
    }
}

/// The application's verdict on an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageDisposition {
    Accepted,
    Rejected,
    /// Not consumed. Also the answer when no receive callback is registered.
    Abandoned,
}
