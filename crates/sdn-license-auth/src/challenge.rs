//! Pending challenge table.
//!
//! A challenge is issued once and consumed by the first proof that names its
//! request id, whatever the outcome. Expired entries are swept lazily on
//! insert and take. The lock is held only for map operations.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use sdn_license_core::{Clock, Ed25519PublicKey};

use crate::error::{AuthError, Result};

/// Default bound on outstanding challenges.
pub const DEFAULT_MAX_PENDING: usize = 10_000;

/// An issued, not yet consumed challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChallenge {
    pub req_id: String,
    pub xpub: String,
    pub peer_id: String,
    pub public_key: Ed25519PublicKey,
    pub challenge: [u8; 32],
    pub created_at: i64,
    pub expires_at: i64,
}

impl PendingChallenge {
    pub fn is_expired(&self, now: i64) -> bool {
        now > self.expires_at
    }
}

/// Single-use challenge storage with a capacity bound.
pub struct ChallengeTable {
    entries: Mutex<HashMap<String, PendingChallenge>>,
    clock: Arc<dyn Clock>,
    capacity: usize,
}

impl ChallengeTable {
    pub fn new(clock: Arc<dyn Clock>, capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PendingChallenge>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn sweep_locked(entries: &mut HashMap<String, PendingChallenge>, now: i64) -> usize {
        let before = entries.len();
        entries.retain(|_, c| !c.is_expired(now));
        before - entries.len()
    }

    /// Store a challenge, replacing any pending one with the same request id.
    pub fn insert(&self, challenge: PendingChallenge) -> Result<()> {
        let now = self.clock.now();
        let mut entries = self.lock();
        Self::sweep_locked(&mut entries, now);
        if entries.len() >= self.capacity && !entries.contains_key(&challenge.req_id) {
            return Err(AuthError::CapacityExceeded);
        }
        entries.insert(challenge.req_id.clone(), challenge);
        Ok(())
    }

    /// Remove and return the challenge for `req_id`.
    ///
    /// The entry is gone after this call even if it had expired.
    pub fn take(&self, req_id: &str) -> Result<PendingChallenge> {
        let now = self.clock.now();
        let mut entries = self.lock();
        let pending = entries.remove(req_id).ok_or(AuthError::ChallengeNotFound)?;
        Self::sweep_locked(&mut entries, now);
        if pending.is_expired(now) {
            return Err(AuthError::ChallengeExpired);
        }
        Ok(pending)
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        Self::sweep_locked(&mut self.lock(), now)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdn_license_core::ManualClock;

    fn pending(req_id: &str, now: i64, ttl: i64) -> PendingChallenge {
        PendingChallenge {
            req_id: req_id.into(),
            xpub: "xpub".into(),
            peer_id: "peer".into(),
            public_key: Ed25519PublicKey::from_bytes([0u8; 32]),
            challenge: [1u8; 32],
            created_at: now,
            expires_at: now + ttl,
        }
    }

    #[test]
    fn test_take_is_single_use() {
        let clock = Arc::new(ManualClock::new(100));
        let table = ChallengeTable::new(clock, 10);
        table.insert(pending("r1", 100, 60)).unwrap();

        assert_eq!(table.take("r1").unwrap().req_id, "r1");
        assert!(matches!(table.take("r1"), Err(AuthError::ChallengeNotFound)));
    }

    #[test]
    fn test_expired_take_still_consumes() {
        let clock = Arc::new(ManualClock::new(100));
        let table = ChallengeTable::new(clock.clone(), 10);
        table.insert(pending("r1", 100, 60)).unwrap();

        clock.advance(61);
        assert!(matches!(table.take("r1"), Err(AuthError::ChallengeExpired)));
        assert!(matches!(table.take("r1"), Err(AuthError::ChallengeNotFound)));
    }

    #[test]
    fn test_capacity_enforced_after_sweep() {
        let clock = Arc::new(ManualClock::new(100));
        let table = ChallengeTable::new(clock.clone(), 2);
        table.insert(pending("a", 100, 10)).unwrap();
        table.insert(pending("b", 100, 10)).unwrap();
        assert!(matches!(
            table.insert(pending("c", 100, 10)),
            Err(AuthError::CapacityExceeded)
        ));

        // Re-issuing an existing id does not need a free slot.
        table.insert(pending("a", 100, 10)).unwrap();

        clock.advance(11);
        table.insert(pending("c", 111, 10)).unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_sweep() {
        let clock = Arc::new(ManualClock::new(0));
        let table = ChallengeTable::new(clock.clone(), 10);
        table.insert(pending("short", 0, 5)).unwrap();
        table.insert(pending("long", 0, 50)).unwrap();

        clock.set(10);
        assert_eq!(table.sweep(), 1);
        assert_eq!(table.len(), 1);
        assert!(!table.is_empty());
    }
}
