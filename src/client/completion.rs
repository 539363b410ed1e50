// src/client/completion.rs

//! Completion dispatcher.
//!
//! Converts a batch outcome reported by the transport into one callback per
//! entry. The batch has already been detached from the outbound queue by the
//! transport, so nothing here touches the queue.

use super::{ClientState, DeviceClient};
use crate::{log_debug, Batch, BatchResult, ConfirmationResult};

impl From<BatchResult> for ConfirmationResult {
    fn from(result: BatchResult) -> Self {
        // ---
        match result {
            BatchResult::Success => ConfirmationResult::Confirmed,
            BatchResult::Failed => ConfirmationResult::Error,
        }
    }
}

impl ClientState {
    /// Resolve every entry of `completed`, in batch order, with the status
    /// mapped from `result`.
    pub(super) fn dispatch_completed(&mut self, completed: Batch, result: BatchResult) {
        // ---
        if completed.is_empty() {
            log_debug!("send_complete called with an empty batch");
            return;
        }

        let status = ConfirmationResult::from(result);
        log_debug!("completing batch of {} as {status:?}", completed.len());

        for entry in completed {
            entry.complete(status);
        }
    }
}

impl DeviceClient {
    /// Report the outcome of a batch the transport detached earlier.
    ///
    /// Every entry receives the same status: [`ConfirmationResult::Confirmed`]
    /// for [`BatchResult::Success`], [`ConfirmationResult::Error`] for
    /// [`BatchResult::Failed`]. Transports needing per-message outcomes
    /// report single-entry batches.
    pub fn send_complete(&mut self, completed: Batch, result: BatchResult) {
        self.state.dispatch_completed(completed, result);
    }
}
