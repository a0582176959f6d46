//! The name node's three partitioned registries: storage nodes, client
//! sessions, and files (each carrying its ACL). Grounded in the reference's
//! `FSMap` (a `HashMap`-keyed registry guarded by a single mutex per
//! concern) generalized from one file-id map to the three cluster-wide maps
//! spec §3 calls for, replacing the original C source's fixed-size arrays
//! and linked ACL lists with hash maps as the design notes direct.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime};

use crate::error::StatusCode;

/// Opaque identity of a client control session, stable for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

#[derive(Debug, Default)]
pub struct SessionIdGenerator {
    next: AtomicU64,
}

impl SessionIdGenerator {
    pub fn new() -> Self {
        Self { next: AtomicU64::new(1) }
    }

    pub fn next_id(&self) -> SessionId {
        SessionId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// Registered storage node (spec §3 "NN's SN registry").
#[derive(Debug, Clone)]
pub struct SnInfo {
    pub id: u32,
    pub address: String,
    pub client_port: u16,
    pub ss_port: u16,
    pub last_heartbeat: Instant,
}

impl SnInfo {
    pub fn is_alive(&self, t_dead: Duration) -> bool {
        self.last_heartbeat.elapsed() <= t_dead
    }
}

/// SN registry. `register`/`heartbeat`/liveness checks all live here so that
/// the fixed lock order (SN -> client -> files, spec §5) has one mutex to
/// acquire for "SN".
#[derive(Debug, Default)]
pub struct SnRegistry {
    by_id: HashMap<u32, SnInfo>,
    max_sn: usize,
    /// Advances on every selection attempt, wrapped modulo the live-SN
    /// count; replaces the reference design's skewed `file_count % ss_count`
    /// selection (spec §9).
    round_robin_cursor: AtomicU64,
}

impl SnRegistry {
    pub fn new(max_sn: usize) -> Self {
        Self { by_id: HashMap::new(), max_sn, round_robin_cursor: AtomicU64::new(0) }
    }

    /// Registers (or re-registers, idempotently) an SN. Fails `CAPACITY` if
    /// the registry is full and `id` is not already known (spec §6
    /// `max_sn`, enforced the same way `ClientRegistry`/`FileRegistry` cap
    /// their own registries).
    pub fn register(
        &mut self,
        id: u32,
        address: String,
        client_port: u16,
        ss_port: u16,
    ) -> Result<(), StatusCode> {
        if !self.by_id.contains_key(&id) && self.by_id.len() >= self.max_sn {
            return Err(StatusCode::Capacity);
        }
        self.by_id.insert(
            id,
            SnInfo { id, address, client_port, ss_port, last_heartbeat: Instant::now() },
        );
        Ok(())
    }

    pub fn heartbeat(&mut self, id: u32) -> bool {
        match self.by_id.get_mut(&id) {
            Some(sn) => {
                sn.last_heartbeat = Instant::now();
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: u32) -> Option<&SnInfo> {
        self.by_id.get(&id)
    }

    pub fn is_alive(&self, id: u32, t_dead: Duration) -> bool {
        self.by_id.get(&id).map(|sn| sn.is_alive(t_dead)).unwrap_or(false)
    }

    /// All currently-live SN ids, sorted for deterministic tie-breaking.
    pub fn live_ids(&self, t_dead: Duration) -> Vec<u32> {
        let mut ids: Vec<u32> =
            self.by_id.values().filter(|sn| sn.is_alive(t_dead)).map(|sn| sn.id).collect();
        ids.sort_unstable();
        ids
    }

    /// Picks the next SN to host a new file: true round-robin over the
    /// currently live set, advancing a single shared cursor so repeated
    /// deletes cannot skew selection back toward id 0 (spec §9). Falls
    /// through to the next live id, in id order, if the cursor's nominal
    /// target is no longer live.
    pub fn select_for_create(&self, t_dead: Duration) -> Option<u32> {
        let live = self.live_ids(t_dead);
        if live.is_empty() {
            return None;
        }
        let cursor = self.round_robin_cursor.fetch_add(1, Ordering::Relaxed) as usize;
        Some(live[cursor % live.len()])
    }

    pub fn snapshot_dead_transitions(&self, t_dead: Duration) -> Vec<u32> {
        self.by_id.values().filter(|sn| !sn.is_alive(t_dead)).map(|sn| sn.id).collect()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// An open client control session (spec §3 "NN's client registry").
#[derive(Debug, Clone)]
pub struct ClientSession {
    pub username: String,
    pub peer_addr: String,
    pub started_at: SystemTime,
}

#[derive(Debug, Default)]
pub struct ClientRegistry {
    sessions: HashMap<SessionId, ClientSession>,
    max_clients: usize,
}

impl ClientRegistry {
    pub fn new(max_clients: usize) -> Self {
        Self { sessions: HashMap::new(), max_clients }
    }

    pub fn register(
        &mut self,
        id: SessionId,
        username: String,
        peer_addr: String,
    ) -> Result<(), StatusCode> {
        if self.sessions.len() >= self.max_clients {
            return Err(StatusCode::Capacity);
        }
        self.sessions.insert(id, ClientSession { username, peer_addr, started_at: SystemTime::now() });
        Ok(())
    }

    pub fn remove(&mut self, id: SessionId) -> Option<ClientSession> {
        self.sessions.remove(&id)
    }

    pub fn username_of(&self, id: SessionId) -> Option<&str> {
        self.sessions.get(&id).map(|s| s.username.as_str())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }
}

/// A per-user access grant on one file (spec §3 ACL entry).
#[derive(Debug, Clone, Copy, Default)]
pub struct AclEntry {
    pub can_read: bool,
    pub can_write: bool,
}

/// The name node's view of a file (spec §3 "NN file metadata"). Mirrors
/// size/sentence-count fields from the owning SN as they are reported back
/// asynchronously after a mutation.
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub path: String,
    pub owner: String,
    pub sn_id: u32,
    pub created_at: SystemTime,
    pub modified_at: SystemTime,
    pub accessed_at: SystemTime,
    pub size: u64,
    pub sentence_count: usize,
    pub acl: HashMap<String, AclEntry>,
}

impl FileMetadata {
    pub fn new(path: String, owner: String, sn_id: u32) -> Self {
        let now = SystemTime::now();
        Self {
            path,
            owner,
            sn_id,
            created_at: now,
            modified_at: now,
            accessed_at: now,
            size: 0,
            sentence_count: 0,
            acl: HashMap::new(),
        }
    }

    pub fn can_read(&self, user: &str) -> bool {
        user == self.owner || self.acl.get(user).map(|e| e.can_read).unwrap_or(false)
    }

    pub fn can_write(&self, user: &str) -> bool {
        user == self.owner || self.acl.get(user).map(|e| e.can_write).unwrap_or(false)
    }
}

/// The file registry, keyed by logical path for O(1) expected lookup (spec
/// §3, §4.1 "Lookup must be O(1) expected on path").
#[derive(Debug, Default)]
pub struct FileRegistry {
    by_path: HashMap<String, FileMetadata>,
    max_files: usize,
}

impl FileRegistry {
    pub fn new(max_files: usize) -> Self {
        Self { by_path: HashMap::new(), max_files }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.by_path.contains_key(path)
    }

    pub fn get(&self, path: &str) -> Option<&FileMetadata> {
        self.by_path.get(path)
    }

    pub fn get_mut(&mut self, path: &str) -> Option<&mut FileMetadata> {
        self.by_path.get_mut(path)
    }

    /// Inserts metadata for a brand-new file. Returns `CAPACITY` if the
    /// registry is full, `FILE_EXISTS` if the path is already taken by a
    /// different SN than `sn_id` (used by `register_sn`'s ingestion, spec
    /// §4.1 "if a path already exists and points to a different SN, report
    /// CONFLICT" — mapped onto the wire's `FILE_EXISTS` code since `CONFLICT`
    /// is not among the enumerated cluster-wide codes; see DESIGN.md).
    pub fn insert_from_sn_registration(
        &mut self,
        path: String,
        sn_id: u32,
    ) -> Result<(), StatusCode> {
        if let Some(existing) = self.by_path.get(&path) {
            if existing.sn_id != sn_id {
                return Err(StatusCode::FileExists);
            }
            return Ok(()); // idempotent re-registration by the same SN
        }
        if self.by_path.len() >= self.max_files {
            return Err(StatusCode::Capacity);
        }
        self.by_path.insert(path.clone(), FileMetadata::new(path, String::new(), sn_id));
        Ok(())
    }

    pub fn create(&mut self, path: String, owner: String, sn_id: u32) -> Result<(), StatusCode> {
        if self.by_path.contains_key(&path) {
            return Err(StatusCode::FileExists);
        }
        if self.by_path.len() >= self.max_files {
            return Err(StatusCode::Capacity);
        }
        self.by_path.insert(path.clone(), FileMetadata::new(path, owner, sn_id));
        Ok(())
    }

    pub fn remove(&mut self, path: &str) -> Option<FileMetadata> {
        self.by_path.remove(path)
    }

    pub fn reinsert(&mut self, meta: FileMetadata) {
        self.by_path.insert(meta.path.clone(), meta);
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_robin_advances_over_live_set() {
        let mut reg = SnRegistry::new(10);
        reg.register(1, "127.0.0.1".into(), 9001, 9101).unwrap();
        reg.register(2, "127.0.0.1".into(), 9002, 9102).unwrap();
        reg.register(3, "127.0.0.1".into(), 9003, 9103).unwrap();
        let t_dead = Duration::from_secs(90);
        let picks: Vec<u32> =
            (0..6).map(|_| reg.select_for_create(t_dead).unwrap()).collect();
        assert_eq!(picks, vec![1, 2, 3, 1, 2, 3]);
    }

    #[test]
    fn select_skips_dead_sn() {
        let mut reg = SnRegistry::new(10);
        reg.register(1, "127.0.0.1".into(), 9001, 9101).unwrap();
        reg.register(2, "127.0.0.1".into(), 9002, 9102).unwrap();
        // Force SN 1 to look dead by backdating its heartbeat.
        reg.by_id.get_mut(&1).unwrap().last_heartbeat =
            Instant::now() - Duration::from_secs(1000);
        let t_dead = Duration::from_secs(90);
        for _ in 0..4 {
            assert_eq!(reg.select_for_create(t_dead), Some(2));
        }
    }

    #[test]
    fn sn_registry_enforces_capacity() {
        let mut reg = SnRegistry::new(1);
        reg.register(1, "127.0.0.1".into(), 9001, 9101).unwrap();
        assert_eq!(reg.register(2, "127.0.0.1".into(), 9002, 9102), Err(StatusCode::Capacity));
        // Re-registering an already-known id never counts against capacity.
        assert!(reg.register(1, "127.0.0.1".into(), 9001, 9101).is_ok());
    }

    #[test]
    fn acl_monotonicity() {
        let mut meta = FileMetadata::new("f.txt".into(), "alice".into(), 1);
        meta.acl.insert("bob".into(), AclEntry { can_read: true, can_write: false });
        let before = meta.acl.clone();
        meta.acl.remove("bob");
        meta.acl.insert("bob".into(), AclEntry { can_read: true, can_write: false });
        assert_eq!(meta.acl.len(), before.len());
        meta.acl.remove("bob");
        assert!(meta.acl.is_empty());
    }

    #[test]
    fn owner_implicitly_has_read_and_write() {
        let meta = FileMetadata::new("f.txt".into(), "alice".into(), 1);
        assert!(meta.can_read("alice"));
        assert!(meta.can_write("alice"));
        assert!(!meta.can_read("bob"));
    }

    #[test]
    fn client_registry_enforces_capacity() {
        let mut reg = ClientRegistry::new(1);
        let gen = SessionIdGenerator::new();
        let a = gen.next_id();
        let b = gen.next_id();
        reg.register(a, "alice".into(), "127.0.0.1:1".into()).unwrap();
        assert_eq!(
            reg.register(b, "bob".into(), "127.0.0.1:2".into()),
            Err(StatusCode::Capacity)
        );
    }
}
