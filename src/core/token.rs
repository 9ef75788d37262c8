//! Request tokens for discarding superseded async results.
//!
//! Each view owns one `TokenGuard`. Issuing a token for a new fetch makes every
//! earlier token stale; a completion may only touch the display while its token
//! is still the current one. Same idea as an epoch counter, but the current value
//! is cleared on apply so a duplicate completion cannot apply twice.

use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use log::trace;

/// Opaque, monotonically increasing per-guard request id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestToken(u64);

impl RequestToken {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Default)]
pub struct TokenGuard {
    next: AtomicU64,
    current: Mutex<Option<RequestToken>>,
}

impl TokenGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh token; does not change the current one. Safe to call concurrently.
    pub fn mint(&self) -> RequestToken {
        RequestToken(self.next.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Mint a token and make it current, superseding any in-flight request.
    pub fn issue(&self) -> RequestToken {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        let token = self.mint();
        trace!("Token issued: {}", token);
        *current = Some(token);
        token
    }

    /// Replace `previous` with a fresh token, but only while `previous` is
    /// still current. A newer request in the meantime wins.
    pub fn reissue(&self, previous: RequestToken) -> Option<RequestToken> {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if *current != Some(previous) {
            return None;
        }
        let token = self.mint();
        trace!("Token reissued: {} -> {}", previous, token);
        *current = Some(token);
        Some(token)
    }

    pub fn current(&self) -> Option<RequestToken> {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_current(&self, candidate: RequestToken) -> bool {
        self.current() == Some(candidate)
    }

    /// Run `action` only if `candidate` is current, then clear the current token.
    ///
    /// The check, the action and the clear happen under one lock, so `action`
    /// must not call back into this guard.
    pub fn apply_if_current<R>(&self, candidate: RequestToken, action: impl FnOnce() -> R) -> Option<R> {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if *current != Some(candidate) {
            trace!("Discarding stale result {} (current {:?})", candidate, *current);
            return None;
        }
        let result = action();
        *current = None;
        Some(result)
    }

    /// Make every outstanding token stale.
    pub fn invalidate(&self) {
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_mint_is_monotonic() {
        let guard = TokenGuard::new();
        let a = guard.mint();
        let b = guard.mint();
        assert!(b > a);
        assert_eq!(guard.current(), None);
    }

    #[test]
    fn test_stale_token_is_discarded() {
        let guard = TokenGuard::new();
        let a = guard.issue();
        let b = guard.issue();

        assert_eq!(guard.apply_if_current(a, || "A"), None);
        assert_eq!(guard.apply_if_current(b, || "B"), Some("B"));
        // Cleared after apply: a duplicate completion is a no-op.
        assert_eq!(guard.apply_if_current(b, || "B again"), None);
    }

    #[test]
    fn test_reissue_only_from_current() {
        let guard = TokenGuard::new();
        let a = guard.issue();
        let a2 = guard.reissue(a).unwrap();
        assert!(guard.is_current(a2));
        assert!(!guard.is_current(a));

        let b = guard.issue();
        assert_eq!(guard.reissue(a2), None);
        assert!(guard.is_current(b));
    }

    #[test]
    fn test_invalidate() {
        let guard = TokenGuard::new();
        let t = guard.issue();
        guard.invalidate();
        assert!(!guard.is_current(t));
        assert_eq!(guard.apply_if_current(t, || ()), None);
    }

    #[test]
    fn test_concurrent_minting_is_unique() {
        let guard = Arc::new(TokenGuard::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let g = Arc::clone(&guard);
                thread::spawn(move || (0..500).map(|_| g.mint()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for h in handles {
            for token in h.join().unwrap() {
                assert!(seen.insert(token));
            }
        }
        assert_eq!(seen.len(), 2000);
    }
}
