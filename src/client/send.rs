// src/client/send.rs

//! Accepting outbound messages.

use super::{ClientState, DeviceClient};
use crate::{
    // ---
    log_error,
    ConfirmationCallback,
    Error,
    Message,
    QueueEntry,
    Result,
    UserContext,
};

impl DeviceClient {
    /// Queue a copy of `message` for delivery.
    ///
    /// The client deep-copies the message, so the caller keeps ownership of
    /// `message`. When `callback` is given it is invoked exactly once with
    /// the message's terminal status and `context`.
    ///
    /// If a default message timeout is set (option `"messageTimeout"`), the
    /// copy expires that many milliseconds after this call; the expiry is
    /// fixed now and later option changes do not affect it.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `context` is given without `callback`
    /// - [`Error::Clock`] if a timeout is set and the clock cannot be read
    /// - [`Error::MessageCopy`] if the message cannot be copied
    ///
    /// On error nothing is queued and the callback is never invoked.
    pub fn send_event_async(
        &mut self,
        message: &Message,
        callback: Option<ConfirmationCallback>,
        context: Option<UserContext>,
    ) -> Result<()> {
        // ---
        self.state.enqueue(message, callback, context)
    }
}

impl ClientState {
    pub(super) fn enqueue(
        &mut self,
        message: &Message,
        callback: Option<ConfirmationCallback>,
        context: Option<UserContext>,
    ) -> Result<()> {
        // ---
        if callback.is_none() && context.is_some() {
            log_error!("send rejected: context supplied without a callback");
            return Err(Error::InvalidArgument(
                "context supplied without a confirmation callback".into(),
            ));
        }

        let expiry_ms = self.expiry_for_new_entry().map_err(|err| {
            log_error!("unable to timestamp outbound message: {err}");
            err
        })?;

        let copy = message.try_clone().map_err(|err| {
            log_error!("unable to copy outbound message: {err}");
            err
        })?;

        self.waiting_to_send
            .push_back(QueueEntry::new(copy, callback, context, expiry_ms));
        Ok(())
    }

    /// Absolute expiry for an entry created now, `0` when timeouts are off.
    fn expiry_for_new_entry(&self) -> Result<u64> {
        // ---
        if self.message_timeout_ms == 0 {
            return Ok(0);
        }

        let now = self.clock.now_ms()?;
        Ok(now.saturating_add(self.message_timeout_ms))
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Arc;

    fn state(clock: &ManualClock) -> ClientState {
        // ---
        let handle = (clock.factory())().unwrap();
        ClientState::new(handle)
    }

    #[test]
    fn test_context_without_callback_is_rejected() {
        // ---
        let clock = ManualClock::new(0);
        let mut state = state(&clock);
        let context: UserContext = Arc::new("ctx");

        let err = state
            .enqueue(&Message::from_text("x"), None, Some(context))
            .unwrap_err();

        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(state.waiting_to_send.is_empty());
    }

    #[test]
    fn test_no_timeout_means_no_expiry() {
        // ---
        let clock = ManualClock::new(1_000);
        let mut state = state(&clock);

        state.enqueue(&Message::from_text("x"), None, None).unwrap();

        let entry = state.waiting_to_send.iter().next().unwrap();
        assert_eq!(entry.expiry_ms(), 0);
    }

    #[test]
    fn test_expiry_is_now_plus_timeout() {
        // ---
        let clock = ManualClock::new(1_000);
        let mut state = state(&clock);
        state.message_timeout_ms = 500;

        state.enqueue(&Message::from_text("x"), None, None).unwrap();

        let entry = state.waiting_to_send.iter().next().unwrap();
        assert_eq!(entry.expiry_ms(), 1_500);
    }

    #[test]
    fn test_clock_failure_with_timeout_rejects_send() {
        // ---
        let clock = ManualClock::new(0);
        let mut state = state(&clock);
        state.message_timeout_ms = 500;
        clock.set_unavailable(true);

        let err = state
            .enqueue(&Message::from_text("x"), None, None)
            .unwrap_err();

        assert!(matches!(err, Error::Clock(_)));
        assert!(state.waiting_to_send.is_empty());
    }

    #[test]
    fn test_clock_failure_without_timeout_is_harmless() {
        // ---
        let clock = ManualClock::new(0);
        let mut state = state(&clock);
        clock.set_unavailable(true);

        state.enqueue(&Message::from_text("x"), None, None).unwrap();
        assert_eq!(state.waiting_to_send.len(), 1);
    }

    #[test]
    fn test_caller_keeps_original() {
        // ---
        let clock = ManualClock::new(0);
        let mut state = state(&clock);
        let mut original = Message::from_text("payload");

        state.enqueue(&original, None, None).unwrap();
        original.set_property("changed", "after-send");

        let queued = state.waiting_to_send.iter().next().unwrap();
        assert_eq!(queued.message().property("changed"), None);
        assert_eq!(queued.message().as_text(), Some("payload"));
    }
}
