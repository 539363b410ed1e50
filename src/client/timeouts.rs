// src/client/timeouts.rs

//! Timeout scanner.
//!
//! Runs at the start of every drive cycle, before the transport sees the
//! queue. Timeouts are best effort: if the clock cannot be read the scan is
//! skipped for this cycle and retried on the next one.

use super::ClientState;
use crate::{log_debug, log_warn, ConfirmationResult};

impl ClientState {
    /// Evict every expired entry and report it as [`ConfirmationResult::Timeout`].
    ///
    /// One clock reading is used for the whole pass. Entries are resolved in
    /// queue order; surviving entries keep their order.
    pub(super) fn scan_timeouts(&mut self) {
        // ---
        let now = match self.clock.now_ms() {
            Ok(now) => now,
            Err(_err) => {
                log_warn!("unable to read the clock, timeouts will not be processed: {_err}");
                return;
            }
        };

        let expired = self.waiting_to_send.remove_where(|entry| entry.is_expired(now));

        for entry in expired {
            log_debug!(
                "message {:?} timed out at {now} (expiry {})",
                entry.message().message_id(),
                entry.expiry_ms()
            );
            entry.complete(ConfirmationResult::Timeout);
        }
    }
}
