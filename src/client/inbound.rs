// src/client/inbound.rs

//! Inbound dispatch.
//!
//! A single application callback receives cloud-to-device messages. The path
//! is independent of the outbound queue.

use super::{ClientState, DeviceClient};
use crate::{
    // ---
    log_error,
    log_warn,
    Error,
    Message,
    MessageDisposition,
    Result,
    UserContext,
};

/// Receive callback: returns the application's verdict on the message.
pub type MessageCallback =
    Box<dyn FnMut(&Message, Option<&UserContext>) -> MessageDisposition + Send>;

impl ClientState {
    pub(super) fn dispatch_inbound(&mut self, message: &Message) -> MessageDisposition {
        // ---
        match self.clock.now_ms() {
            Ok(now) => self.last_receive_ms = Some(now),
            Err(_err) => log_warn!("unable to timestamp inbound message: {_err}"),
        }

        match self.message_callback.as_mut() {
            Some(callback) => callback(message, self.message_context.as_ref()),
            None => {
                log_error!("inbound message abandoned: no message callback registered");
                MessageDisposition::Abandoned
            }
        }
    }
}

impl DeviceClient {
    /// Register (`Some`) or clear (`None`) the receive callback.
    ///
    /// Registering subscribes the device to inbound delivery and replaces any
    /// previous callback. Clearing unsubscribes and always succeeds.
    ///
    /// # Errors
    ///
    /// Returns the transport's error if the subscription fails; the previous
    /// callback is cleared in that case.
    pub fn set_message_callback(
        &mut self,
        callback: Option<MessageCallback>,
        context: Option<UserContext>,
    ) -> Result<()> {
        // ---
        let transport = self.transport.get();

        let Some(callback) = callback else {
            transport.unsubscribe(&self.device);
            self.state.message_callback = None;
            self.state.message_context = None;
            return Ok(());
        };

        match transport.subscribe(&self.device) {
            Ok(()) => {
                self.state.message_callback = Some(callback);
                self.state.message_context = context;
                Ok(())
            }
            Err(err) => {
                log_error!("{}: subscribe failed: {err}", self.device.device_id());
                self.state.message_callback = None;
                self.state.message_context = None;
                Err(err)
            }
        }
    }

    /// Hand one inbound message to the registered callback.
    ///
    /// Records the arrival time whether or not a callback is registered.
    /// Without a callback the message is [`MessageDisposition::Abandoned`].
    pub fn deliver_inbound(&mut self, message: &Message) -> MessageDisposition {
        self.state.dispatch_inbound(message)
    }

    /// Clock reading at the most recent inbound message.
    ///
    /// # Errors
    ///
    /// [`Error::IndefiniteTime`] if no inbound message has arrived yet.
    pub fn get_last_message_receive_time(&self) -> Result<u64> {
        // ---
        self.state.last_receive_ms.ok_or(Error::IndefiniteTime)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::client::test_support::*;
    use crate::{ClientConfig, ManualClock};
    use std::sync::{Arc, Mutex};

    fn client(script: &Arc<Mutex<Script>>, clock: &ManualClock) -> DeviceClient {
        // ---
        let provider = Arc::new(ScriptedProvider {
            script: script.clone(),
            fail_create: false,
        });
        let config = ClientConfig::new("hub", "example.net", "dev-1", "key")
            .with_provider(provider)
            .with_clock(clock.factory());
        DeviceClient::create(&config).unwrap()
    }

    #[test]
    fn test_no_callback_abandons_but_records_time() {
        // ---
        let script = Arc::new(Mutex::new(Script::default()));
        let clock = ManualClock::new(42);
        let mut client = client(&script, &clock);

        assert!(matches!(
            client.get_last_message_receive_time(),
            Err(Error::IndefiniteTime)
        ));

        let disposition = client.deliver_inbound(&Message::from_text("c2d"));

        assert_eq!(disposition, MessageDisposition::Abandoned);
        assert_eq!(client.get_last_message_receive_time().unwrap(), 42);
    }

    #[test]
    fn test_callback_verdict_is_returned_with_context() {
        // ---
        let script = Arc::new(Mutex::new(Script::default()));
        let clock = ManualClock::new(0);
        let mut client = client(&script, &clock);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let context: UserContext = Arc::new(String::from("app-state"));

        client
            .set_message_callback(
                Some(Box::new(move |msg, ctx| {
                    let ctx = ctx.and_then(|c| c.downcast_ref::<String>()).cloned();
                    seen_clone
                        .lock()
                        .unwrap()
                        .push((msg.as_text().unwrap_or_default().to_string(), ctx));
                    MessageDisposition::Rejected
                })),
                Some(context),
            )
            .unwrap();

        clock.set(7);
        assert_eq!(
            client.deliver_inbound(&Message::from_text("hi")),
            MessageDisposition::Rejected
        );
        clock.set(9);
        client.deliver_inbound(&Message::from_text("again"));

        assert_eq!(client.get_last_message_receive_time().unwrap(), 9);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ("hi".to_string(), Some("app-state".to_string())),
                ("again".to_string(), Some("app-state".to_string())),
            ]
        );
        assert_eq!(script.lock().unwrap().calls, vec!["register", "subscribe"]);
    }

    #[test]
    fn test_subscribe_failure_clears_previous_callback() {
        // ---
        let script = Arc::new(Mutex::new(Script::default()));
        let clock = ManualClock::new(0);
        let mut client = client(&script, &clock);

        client
            .set_message_callback(Some(Box::new(|_, _| MessageDisposition::Accepted)), None)
            .unwrap();

        script.lock().unwrap().fail_subscribe = true;
        let result =
            client.set_message_callback(Some(Box::new(|_, _| MessageDisposition::Accepted)), None);
        assert!(matches!(result, Err(Error::Transport(_))));

        assert_eq!(
            client.deliver_inbound(&Message::from_text("x")),
            MessageDisposition::Abandoned
        );
    }

    #[test]
    fn test_clearing_callback_unsubscribes() {
        // ---
        let script = Arc::new(Mutex::new(Script::default()));
        let clock = ManualClock::new(0);
        let mut client = client(&script, &clock);

        client
            .set_message_callback(Some(Box::new(|_, _| MessageDisposition::Accepted)), None)
            .unwrap();
        client.set_message_callback(None, None).unwrap();

        assert_eq!(
            client.deliver_inbound(&Message::from_text("x")),
            MessageDisposition::Abandoned
        );
        assert_eq!(
            script.lock().unwrap().calls,
            vec!["register", "subscribe", "unsubscribe"]
        );
    }

    #[test]
    fn test_transport_delivers_inbound_during_do_work() {
        // ---
        let script = Arc::new(Mutex::new(Script::default()));
        let clock = ManualClock::new(0);
        let mut client = client(&script, &clock);

        client
            .set_message_callback(Some(Box::new(|_, _| MessageDisposition::Accepted)), None)
            .unwrap();
        script
            .lock()
            .unwrap()
            .inbound
            .push(Message::from_text("from-cloud"));

        clock.set(5);
        client.do_work();

        assert_eq!(
            script.lock().unwrap().dispositions,
            vec![MessageDisposition::Accepted]
        );
        assert_eq!(client.get_last_message_receive_time().unwrap(), 5);
    }
}
