//! Cooperative cancellation for planning requests.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Shared flag checked by long-running planners between iterations.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Handle for one request issued by a [`RequestGate`].
#[derive(Debug, Clone)]
pub struct RequestTicket {
    pub generation: u64,
    pub token: CancelToken,
}

/// Keeps only the most recent request alive.
///
/// Each `begin` cancels the token of the previous ticket, so a caller that
/// fires requests faster than they complete can discard stale results with
/// [`RequestGate::is_current`].
#[derive(Debug, Default)]
pub struct RequestGate {
    generation: AtomicU64,
    active: Mutex<Option<CancelToken>>,
}

impl RequestGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> RequestTicket {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let token = CancelToken::new();
        let previous = match self.active.lock() {
            Ok(mut active) => active.replace(token.clone()),
            Err(poisoned) => poisoned.into_inner().replace(token.clone()),
        };
        if let Some(previous) = previous {
            previous.cancel();
        }
        RequestTicket { generation, token }
    }

    pub fn is_current(&self, ticket: &RequestTicket) -> bool {
        self.generation.load(Ordering::Acquire) == ticket.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_request_cancels_older_one() {
        let gate = RequestGate::new();
        let first = gate.begin();
        assert!(gate.is_current(&first));
        assert!(!first.token.is_cancelled());

        let second = gate.begin();
        assert!(first.token.is_cancelled());
        assert!(!gate.is_current(&first));
        assert!(gate.is_current(&second));
        assert!(!second.token.is_cancelled());
    }

    #[test]
    fn clones_share_the_flag() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
