//! Reconnection policy and the singleton guard for the retry loop
//!
//! The link retries at a fixed interval. The pub/sub client used elsewhere
//! backs off exponentially; the two policies are intentionally different.

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Fixed delay between reconnect attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedBackoff {
    interval: Duration,
}

impl FixedBackoff {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Delay before the given attempt (1-based); the same for every attempt
    pub fn delay(&self, _attempt: u32) -> Duration {
        self.interval
    }
}

impl Default for FixedBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(
            device_link_shared::defaults::RECONNECT_INTERVAL_MS,
        ))
    }
}

/// At most one reconnect loop per manager
#[derive(Debug, Default)]
pub(crate) struct ReconnectSlot {
    active: Option<(u64, CancellationToken)>,
    next_id: u64,
}

impl ReconnectSlot {
    /// Claim the slot for a new loop; `None` if one is already running
    pub(crate) fn try_claim(&mut self, parent: &CancellationToken) -> Option<(u64, CancellationToken)> {
        if self.active.is_some() {
            return None;
        }
        self.next_id += 1;
        let token = parent.child_token();
        self.active = Some((self.next_id, token.clone()));
        Some((self.next_id, token))
    }

    /// Called by the loop itself on exit; ignores stale ids
    pub(crate) fn release(&mut self, id: u64) {
        if matches!(self.active, Some((current, _)) if current == id) {
            self.active = None;
        }
    }

    /// Stop the running loop, if any, and free the slot
    pub(crate) fn cancel(&mut self) {
        if let Some((_, token)) = self.active.take() {
            token.cancel();
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.is_some()
    }
}
