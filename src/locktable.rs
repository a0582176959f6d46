//! Sentence-granular reader-writer lock table (spec §4.3).
//!
//! Grounded in the reference's `TransactionTracker` (a `Mutex<HashMap<K, V>>>`
//! guarding per-key state) generalized from a retransmission cache to a real
//! reader-writer lock, and in the original storage server's
//! `acquire_read_lock`/`acquire_write_lock`/`release_lock`/
//! `release_all_locks_for_client`, replacing its linked list of locks with a
//! hash map keyed by `(path, sentence index)` as the design notes direct.
//!
//! Acquisition never blocks: contention returns `LOCKED` immediately, and a
//! failed acquire never mutates state. A reverse index from holder to held
//! keys makes `release_all` proportional to the holder's lock count rather
//! than the size of the whole table.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::holder::HolderId;

/// Key identifying one lockable sentence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockKey {
    pub path: String,
    pub index: usize,
}

impl LockKey {
    pub fn new(path: impl Into<String>, index: usize) -> Self {
        Self { path: path.into(), index }
    }
}

#[derive(Debug)]
enum LockState {
    /// Holder -> reference count, so a holder may reacquire the same shared
    /// lock and must release it the same number of times.
    Shared(HashMap<HolderId, u32>),
    Exclusive(HolderId),
}

/// Outcome of an acquire attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Ok,
    Locked,
}

/// Outcome of a release attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Ok,
    NotHeld,
}

#[derive(Debug, Default)]
pub struct SentenceLockTable {
    locks: Mutex<HashMap<LockKey, LockState>>,
    held_by: Mutex<HashMap<HolderId, HashSet<LockKey>>>,
}

impl SentenceLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn track(&self, holder: HolderId, key: &LockKey) {
        self.held_by.lock().unwrap().entry(holder).or_default().insert(key.clone());
    }

    fn untrack(&self, holder: HolderId, key: &LockKey) {
        if let Some(keys) = self.held_by.lock().unwrap().get_mut(&holder) {
            keys.remove(key);
        }
    }

    /// Tries to acquire a shared (read) lock. Succeeds if the key is absent
    /// or already shared; fails if an exclusive holder is present.
    pub fn acquire_shared(&self, key: &LockKey, holder: HolderId) -> AcquireOutcome {
        let mut locks = self.locks.lock().unwrap();
        match locks.get_mut(key) {
            None => {
                let mut holders = HashMap::new();
                holders.insert(holder, 1);
                locks.insert(key.clone(), LockState::Shared(holders));
            }
            Some(LockState::Shared(holders)) => {
                *holders.entry(holder).or_insert(0) += 1;
            }
            Some(LockState::Exclusive(_)) => return AcquireOutcome::Locked,
        }
        drop(locks);
        self.track(holder, key);
        AcquireOutcome::Ok
    }

    /// Tries to acquire an exclusive (write) lock. Succeeds only when the key
    /// is entirely absent.
    pub fn acquire_exclusive(&self, key: &LockKey, holder: HolderId) -> AcquireOutcome {
        let mut locks = self.locks.lock().unwrap();
        if locks.contains_key(key) {
            return AcquireOutcome::Locked;
        }
        locks.insert(key.clone(), LockState::Exclusive(holder));
        drop(locks);
        self.track(holder, key);
        AcquireOutcome::Ok
    }

    /// Releases one reference to `key` held by `holder`.
    pub fn release(&self, key: &LockKey, holder: HolderId) -> ReleaseOutcome {
        let mut locks = self.locks.lock().unwrap();
        let outcome = match locks.get_mut(key) {
            None => ReleaseOutcome::NotHeld,
            Some(LockState::Exclusive(h)) => {
                if *h == holder {
                    locks.remove(key);
                    ReleaseOutcome::Ok
                } else {
                    ReleaseOutcome::NotHeld
                }
            }
            Some(LockState::Shared(holders)) => match holders.get_mut(&holder) {
                None => ReleaseOutcome::NotHeld,
                Some(count) => {
                    *count -= 1;
                    let now_empty = *count == 0;
                    if now_empty {
                        holders.remove(&holder);
                    }
                    if holders.is_empty() {
                        locks.remove(key);
                    }
                    ReleaseOutcome::Ok
                }
            },
        };
        drop(locks);
        if outcome == ReleaseOutcome::Ok {
            // Only drop from the reverse index once the holder's last
            // reference on this key is gone.
            let still_held = self
                .locks
                .lock()
                .unwrap()
                .get(key)
                .map(|state| match state {
                    LockState::Shared(holders) => holders.contains_key(&holder),
                    LockState::Exclusive(h) => *h == holder,
                })
                .unwrap_or(false);
            if !still_held {
                self.untrack(holder, key);
            }
        }
        outcome
    }

    /// Releases every lock held by `holder`. Must be called on disconnect.
    /// Returns the number of keys released.
    pub fn release_all(&self, holder: HolderId) -> usize {
        let keys: Vec<LockKey> = self
            .held_by
            .lock()
            .unwrap()
            .remove(&holder)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default();

        let mut locks = self.locks.lock().unwrap();
        let mut released = 0usize;
        for key in &keys {
            match locks.get_mut(key) {
                Some(LockState::Exclusive(h)) if *h == holder => {
                    locks.remove(key);
                    released += 1;
                }
                Some(LockState::Shared(holders)) => {
                    if holders.remove(&holder).is_some() {
                        released += 1;
                    }
                    if holders.is_empty() {
                        locks.remove(key);
                    }
                }
                _ => {}
            }
        }
        released
    }

    /// True if any lock (shared or exclusive) is currently held on `key`.
    pub fn is_locked(&self, key: &LockKey) -> bool {
        self.locks.lock().unwrap().contains_key(key)
    }

    /// True if an exclusive lock is currently held on `key`.
    pub fn is_exclusively_locked(&self, key: &LockKey) -> bool {
        matches!(self.locks.lock().unwrap().get(key), Some(LockState::Exclusive(_)))
    }

    /// True if any sentence of `path` has an active lock, regardless of
    /// index. Used to reject `delete` while a file is in use (spec §4.2).
    pub fn is_path_locked(&self, path: &str) -> bool {
        self.locks.lock().unwrap().keys().any(|k| k.path == path)
    }

    /// Number of distinct keys with at least one lock held by `holder`.
    #[cfg(test)]
    pub fn held_key_count(&self, holder: HolderId) -> usize {
        self.held_by.lock().unwrap().get(&holder).map(|s| s.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::holder::HolderIdGenerator;

    fn ids(n: usize) -> Vec<HolderId> {
        let gen = HolderIdGenerator::new();
        (0..n).map(|_| gen.next_id()).collect()
    }

    #[test]
    fn shared_locks_stack_across_distinct_holders() {
        let table = SentenceLockTable::new();
        let [a, b] = ids(2)[..] else { unreachable!() };
        let key = LockKey::new("doc.txt", 0);
        assert_eq!(table.acquire_shared(&key, a), AcquireOutcome::Ok);
        assert_eq!(table.acquire_shared(&key, b), AcquireOutcome::Ok);
        assert!(table.is_locked(&key));
        assert!(!table.is_exclusively_locked(&key));
    }

    #[test]
    fn exclusive_excludes_shared_and_exclusive() {
        let table = SentenceLockTable::new();
        let [a, b] = ids(2)[..] else { unreachable!() };
        let key = LockKey::new("doc.txt", 3);
        assert_eq!(table.acquire_exclusive(&key, a), AcquireOutcome::Ok);
        assert_eq!(table.acquire_exclusive(&key, b), AcquireOutcome::Locked);
        assert_eq!(table.acquire_shared(&key, b), AcquireOutcome::Locked);
    }

    #[test]
    fn shared_blocks_new_exclusive() {
        let table = SentenceLockTable::new();
        let [a, b] = ids(2)[..] else { unreachable!() };
        let key = LockKey::new("doc.txt", 0);
        assert_eq!(table.acquire_shared(&key, a), AcquireOutcome::Ok);
        assert_eq!(table.acquire_exclusive(&key, b), AcquireOutcome::Locked);
    }

    #[test]
    fn reacquire_by_same_holder_is_idempotent_and_ref_counted() {
        let table = SentenceLockTable::new();
        let [a] = ids(1)[..] else { unreachable!() };
        let key = LockKey::new("doc.txt", 0);
        assert_eq!(table.acquire_shared(&key, a), AcquireOutcome::Ok);
        assert_eq!(table.acquire_shared(&key, a), AcquireOutcome::Ok);
        // Two references: one release should leave it still held.
        assert_eq!(table.release(&key, a), ReleaseOutcome::Ok);
        assert!(table.is_locked(&key));
        assert_eq!(table.release(&key, a), ReleaseOutcome::Ok);
        assert!(!table.is_locked(&key));
    }

    #[test]
    fn release_on_unheld_key_is_not_held() {
        let table = SentenceLockTable::new();
        let [a] = ids(1)[..] else { unreachable!() };
        let key = LockKey::new("doc.txt", 0);
        assert_eq!(table.release(&key, a), ReleaseOutcome::NotHeld);
    }

    #[test]
    fn failed_acquire_does_not_mutate_state() {
        let table = SentenceLockTable::new();
        let [a, b] = ids(2)[..] else { unreachable!() };
        let key = LockKey::new("doc.txt", 1);
        table.acquire_exclusive(&key, a);
        table.acquire_exclusive(&key, b); // fails
        // b must hold nothing.
        assert_eq!(table.held_key_count(b), 0);
        assert_eq!(table.release(&key, b), ReleaseOutcome::NotHeld);
    }

    #[test]
    fn release_all_clears_every_lock_for_holder() {
        let table = SentenceLockTable::new();
        let [a, b] = ids(2)[..] else { unreachable!() };
        let k0 = LockKey::new("doc.txt", 0);
        let k1 = LockKey::new("doc.txt", 1);
        table.acquire_shared(&k0, a);
        table.acquire_exclusive(&k1, a);
        table.acquire_shared(&k0, b);

        let released = table.release_all(a);
        assert_eq!(released, 2);
        assert_eq!(table.held_key_count(a), 0);
        // b's shared hold on k0 survives a's release.
        assert!(table.is_locked(&k0));
        assert!(!table.is_exclusively_locked(&k0));
        assert!(!table.is_locked(&k1));
    }

    #[test]
    fn is_path_locked_ignores_sentence_index() {
        let table = SentenceLockTable::new();
        let [a] = ids(1)[..] else { unreachable!() };
        assert!(!table.is_path_locked("doc.txt"));
        table.acquire_shared(&LockKey::new("doc.txt", 4), a);
        assert!(table.is_path_locked("doc.txt"));
        assert!(!table.is_path_locked("other.txt"));
    }
}
