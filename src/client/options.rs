// src/client/options.rs

//! Option routing.
//!
//! A small table lists the options the client handles itself. Every other
//! name is passed unchanged to the bound transport and its result is
//! returned as-is.

use super::{ClientState, DeviceClient};
use crate::{log_debug, log_error, Error, OptionValue, Result};

/// Default timeout in milliseconds for subsequently sent messages (`u64`, `0` disables).
pub const OPTION_MESSAGE_TIMEOUT: &str = "messageTimeout";

type LocalOptionHandler = fn(&mut ClientState, &OptionValue) -> Result<()>;

const LOCAL_OPTIONS: &[(&str, LocalOptionHandler)] =
    &[(OPTION_MESSAGE_TIMEOUT, set_message_timeout)];

fn local_handler(name: &str) -> Option<LocalOptionHandler> {
    // ---
    LOCAL_OPTIONS
        .iter()
        .find(|(option, _)| *option == name)
        .map(|(_, handler)| *handler)
}

fn set_message_timeout(state: &mut ClientState, value: &OptionValue) -> Result<()> {
    // ---
    let timeout_ms = value.as_u64().ok_or_else(|| {
        Error::InvalidArgument(format!(
            "{OPTION_MESSAGE_TIMEOUT} expects a millisecond count, got {value:?}"
        ))
    })?;

    state.message_timeout_ms = timeout_ms;
    log_debug!("default message timeout set to {timeout_ms} ms");
    Ok(())
}

impl DeviceClient {
    /// Set a client or transport option.
    ///
    /// `"messageTimeout"` is handled by the client and only affects messages
    /// sent afterwards. Other names are forwarded to the transport.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] for an empty name or a value of the wrong
    ///   type for a client option
    /// - whatever the transport returns for forwarded options
    pub fn set_option(&mut self, name: &str, value: impl Into<OptionValue>) -> Result<()> {
        // ---
        if name.is_empty() {
            log_error!("invalid argument: empty option name");
            return Err(Error::InvalidArgument("empty option name".into()));
        }

        let value = value.into();

        if let Some(handler) = local_handler(name) {
            return handler(&mut self.state, &value);
        }

        self.transport
            .get()
            .set_option(name, &value)
            .map_err(|err| {
                log_error!("underlying transport failed to set option {name}: {err}");
                err
            })
    }
}
