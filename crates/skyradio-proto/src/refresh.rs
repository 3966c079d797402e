//! Latest-wins sequencing for background refreshes.
//!
//! Each refresh takes a token before it starts.  When its result comes back
//! the owner asks whether the token is still the newest one issued; older
//! results are dropped so a slow request can never overwrite a newer one.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RefreshToken(u64);

#[derive(Debug, Default)]
pub struct RefreshSequencer {
    name: &'static str,
    latest: AtomicU64,
}

impl RefreshSequencer {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            latest: AtomicU64::new(0),
        }
    }

    /// Issue a new token, superseding every token issued before it.
    pub fn begin(&self) -> RefreshToken {
        RefreshToken(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, token: RefreshToken) -> bool {
        let current = token.0 == self.latest.load(Ordering::SeqCst);
        if !current {
            debug!("{}: discarding stale refresh #{}", self.name, token.0);
        }
        current
    }
}
