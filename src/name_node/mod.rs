//! The name node: global file→SN map, client and SN registries, ACL
//! enforcement, and the request router (spec §4.1).
//!
//! Grounded in the reference's `Context` (one struct bundling all shared
//! server state behind the handlers it dispatches to), generalized from a
//! single VFS backend to the three partitioned registries spec §3 and §5
//! call for, each under its own mutex with the fixed acquisition order
//! SN -> client -> files.

pub mod registry;
pub mod sn_client;
pub mod server;

use std::sync::Mutex;
use std::time::SystemTime;

use tracing::info;

use crate::config::NnConfig;
use crate::error::{DResult, StatusCode};
use registry::{AclEntry, ClientRegistry, FileRegistry, SessionId, SessionIdGenerator, SnRegistry};

pub struct NameNode {
    config: NnConfig,
    sessions: SessionIdGenerator,
    // Locked in this fixed order whenever more than one is held at once
    // (spec §5): sn -> clients -> files.
    sn: Mutex<SnRegistry>,
    clients: Mutex<ClientRegistry>,
    files: Mutex<FileRegistry>,
}

impl NameNode {
    pub fn new(config: NnConfig) -> Self {
        let clients = Mutex::new(ClientRegistry::new(config.max_clients));
        let files = Mutex::new(FileRegistry::new(config.max_files));
        let sn = Mutex::new(SnRegistry::new(config.max_sn));
        Self { config, sessions: SessionIdGenerator::new(), sn, clients, files }
    }

    pub fn config(&self) -> &NnConfig {
        &self.config
    }

    /// Admits a client control session. Fails `CAPACITY` if the registry is full.
    pub fn register_client(&self, username: &str, peer_addr: &str) -> DResult<SessionId> {
        let id = self.sessions.next_id();
        let mut clients = self.clients.lock().unwrap();
        clients.register(id, username.to_string(), peer_addr.to_string())?;
        info!(session = ?id, username, peer_addr, "client registered");
        Ok(id)
    }

    pub fn drop_client(&self, id: SessionId) {
        let mut clients = self.clients.lock().unwrap();
        if clients.remove(id).is_some() {
            info!(session = ?id, "client session closed");
        }
    }

    /// Admits an SN and ingests its initial file list (spec §4.1
    /// `register_sn`). A re-registration by the same SN id is idempotent; a
    /// path already owned by a *different* SN is a conflict, reported as
    /// `FILE_EXISTS` (see DESIGN.md for why `CONFLICT` is not a wire code).
    /// Fails `CAPACITY` if the SN registry is full and `id` is not already
    /// known.
    pub fn register_sn(
        &self,
        id: u32,
        address: String,
        client_port: u16,
        ss_port: u16,
        initial_files: Vec<String>,
    ) -> DResult<()> {
        {
            let mut sn = self.sn.lock().unwrap();
            let was_known = sn.get(id).is_some();
            sn.register(id, address, client_port, ss_port)?;
            if was_known {
                info!(sn_id = id, "storage node re-registered");
            } else {
                info!(sn_id = id, "storage node registered");
            }
        }
        let mut files = self.files.lock().unwrap();
        for path in initial_files {
            files.insert_from_sn_registration(path, id)?;
        }
        Ok(())
    }

    pub fn heartbeat(&self, id: u32) -> DResult<()> {
        let mut sn = self.sn.lock().unwrap();
        if sn.heartbeat(id) {
            Ok(())
        } else {
            Err(StatusCode::FileNotFound)
        }
    }

    /// `lookup -> permission -> liveness -> respond`, for a read (spec
    /// §4.1 router algorithm).
    pub fn read(&self, path: &str, username: &str) -> DResult<(String, u16)> {
        self.resolve(path, username, Permission::Read)
    }

    /// Same router algorithm, requiring write permission.
    pub fn write(&self, path: &str, username: &str) -> DResult<(String, u16)> {
        self.resolve(path, username, Permission::Write)
    }

    fn resolve(&self, path: &str, username: &str, perm: Permission) -> DResult<(String, u16)> {
        let files = self.files.lock().unwrap();
        let meta = files.get(path).ok_or(StatusCode::FileNotFound)?;
        let allowed = match perm {
            Permission::Read => meta.can_read(username),
            Permission::Write => meta.can_write(username),
        };
        if !allowed {
            return Err(StatusCode::PermissionDenied);
        }
        let sn_id = meta.sn_id;
        drop(files);

        let sn = self.sn.lock().unwrap();
        let info = sn.get(sn_id).ok_or(StatusCode::SnUnavailable)?;
        if !info.is_alive(self.config.t_dead) {
            return Err(StatusCode::SnUnavailable);
        }
        Ok((info.address.clone(), info.client_port))
    }

    /// Rejects if the path exists; otherwise round-robins over live SNs,
    /// inserts metadata, and forwards `CREATE` to the chosen SN, rolling
    /// back the metadata insert on SN failure (spec §4.1 `create`).
    pub async fn create(&self, path: &str, owner: &str) -> DResult<()> {
        let (sn_id, address, ss_port) = {
            let files = self.files.lock().unwrap();
            if files.contains(path) {
                return Err(StatusCode::FileExists);
            }
            drop(files);

            let sn = self.sn.lock().unwrap();
            let sn_id = sn.select_for_create(self.config.t_dead).ok_or(StatusCode::SnUnavailable)?;
            let info = sn.get(sn_id).ok_or(StatusCode::SnUnavailable)?;
            (sn_id, info.address.clone(), info.ss_port)
        };

        {
            let mut files = self.files.lock().unwrap();
            files.create(path.to_string(), owner.to_string(), sn_id)?;
        }

        if let Err(err) = sn_client::send_create(&address, ss_port, path).await {
            let mut files = self.files.lock().unwrap();
            files.remove(path);
            tracing::warn!(path, sn_id, error = %err, "create rolled back after SN failure");
            return Err(StatusCode::SnUnavailable);
        }

        info!(path, owner, sn_id, "file created");
        Ok(())
    }

    /// Owner-only; removes metadata then instructs the SN. On a dead SN,
    /// retains the metadata and reports `SN_UNAVAILABLE` without partial
    /// commit (spec §4.1 `delete`).
    pub async fn delete(&self, path: &str, username: &str) -> DResult<()> {
        let meta = {
            let files = self.files.lock().unwrap();
            let meta = files.get(path).ok_or(StatusCode::FileNotFound)?;
            if meta.owner != username {
                return Err(StatusCode::PermissionDenied);
            }
            meta.clone()
        };

        let (address, ss_port) = {
            let sn = self.sn.lock().unwrap();
            let info = sn.get(meta.sn_id).ok_or(StatusCode::SnUnavailable)?;
            if !info.is_alive(self.config.t_dead) {
                return Err(StatusCode::SnUnavailable);
            }
            (info.address.clone(), info.ss_port)
        };

        {
            let mut files = self.files.lock().unwrap();
            files.remove(path);
        }

        if let Err(err) = sn_client::send_delete(&address, ss_port, path).await {
            let mut files = self.files.lock().unwrap();
            files.reinsert(meta);
            tracing::warn!(path, error = %err, "delete rolled back after SN failure");
            return Err(StatusCode::SnUnavailable);
        }

        info!(path, username, "file deleted");
        Ok(())
    }

    /// Owner-only; mutates the ACL atomically (spec §4.1 `add_access`).
    pub fn add_access(
        &self,
        path: &str,
        requester: &str,
        grantee: &str,
        can_read: bool,
        can_write: bool,
    ) -> DResult<()> {
        let mut files = self.files.lock().unwrap();
        let meta = files.get_mut(path).ok_or(StatusCode::FileNotFound)?;
        if meta.owner != requester {
            return Err(StatusCode::PermissionDenied);
        }
        meta.acl.insert(grantee.to_string(), AclEntry { can_read, can_write });
        meta.modified_at = SystemTime::now();
        Ok(())
    }

    /// Owner-only; removes an ACL entry (spec §4.1 `remove_access`).
    pub fn remove_access(&self, path: &str, requester: &str, grantee: &str) -> DResult<()> {
        let mut files = self.files.lock().unwrap();
        let meta = files.get_mut(path).ok_or(StatusCode::FileNotFound)?;
        if meta.owner != requester {
            return Err(StatusCode::PermissionDenied);
        }
        meta.acl.remove(grantee);
        meta.modified_at = SystemTime::now();
        Ok(())
    }

    /// Records a metadata refresh reported asynchronously by an SN after a
    /// mutation (spec §2 step 6: "the NN is informed asynchronously").
    pub fn refresh_metadata(&self, path: &str, size: u64, sentence_count: usize) {
        let mut files = self.files.lock().unwrap();
        if let Some(meta) = files.get_mut(path) {
            meta.size = size;
            meta.sentence_count = sentence_count;
            meta.modified_at = SystemTime::now();
        }
    }

    /// Periodic liveness sweep: logs any SN that has just crossed the dead
    /// threshold since the previous sweep (spec §5 "liveness state
    /// transitions are logged"). Liveness itself is computed lazily at
    /// lookup time; this only detects transitions worth a log line.
    pub fn sweep_liveness(&self, previously_dead: &mut std::collections::HashSet<u32>) {
        let sn = self.sn.lock().unwrap();
        let now_dead: std::collections::HashSet<u32> =
            sn.snapshot_dead_transitions(self.config.t_dead).into_iter().collect();
        for id in now_dead.difference(previously_dead) {
            tracing::warn!(sn_id = id, "storage node marked dead");
        }
        for id in previously_dead.difference(&now_dead) {
            info!(sn_id = id, "storage node liveness restored");
        }
        *previously_dead = now_dead;
    }
}

enum Permission {
    Read,
    Write,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NnConfig;

    fn nn() -> NameNode {
        NameNode::new(NnConfig { max_clients: 2, max_files: 10, ..NnConfig::default() })
    }

    #[test]
    fn register_client_enforces_capacity() {
        let nn = nn();
        nn.register_client("alice", "127.0.0.1:1").unwrap();
        nn.register_client("bob", "127.0.0.1:2").unwrap();
        assert_eq!(nn.register_client("carol", "127.0.0.1:3"), Err(StatusCode::Capacity));
    }

    #[test]
    fn register_sn_conflict_on_foreign_path() {
        let nn = nn();
        nn.register_sn(1, "127.0.0.1".into(), 9001, 9101, vec!["a.txt".into()]).unwrap();
        assert_eq!(
            nn.register_sn(2, "127.0.0.1".into(), 9002, 9102, vec!["a.txt".into()]),
            Err(StatusCode::FileExists)
        );
    }

    #[test]
    fn register_sn_reregistration_is_idempotent() {
        let nn = nn();
        nn.register_sn(1, "127.0.0.1".into(), 9001, 9101, vec!["a.txt".into()]).unwrap();
        assert!(nn.register_sn(1, "127.0.0.1".into(), 9001, 9101, vec!["a.txt".into()]).is_ok());
    }

    #[test]
    fn read_requires_acl_or_ownership() {
        let nn = nn();
        nn.register_sn(1, "127.0.0.1".into(), 9001, 9101, Vec::new()).unwrap();
        {
            let mut files = nn.files.lock().unwrap();
            files.create("notes.txt".into(), "alice".into(), 1).unwrap();
        }
        assert_eq!(nn.read("notes.txt", "bob"), Err(StatusCode::PermissionDenied));
        assert!(nn.read("notes.txt", "alice").is_ok());
        nn.add_access("notes.txt", "alice", "bob", true, false).unwrap();
        assert!(nn.read("notes.txt", "bob").is_ok());
        assert_eq!(nn.write("notes.txt", "bob"), Err(StatusCode::PermissionDenied));
    }

    #[test]
    fn dead_sn_yields_sn_unavailable() {
        let nn = NameNode::new(NnConfig { t_dead: std::time::Duration::from_millis(10), ..NnConfig::default() });
        nn.register_sn(1, "127.0.0.1".into(), 9001, 9101, Vec::new()).unwrap();
        {
            let mut files = nn.files.lock().unwrap();
            files.create("f.txt".into(), "alice".into(), 1).unwrap();
        }
        std::thread::sleep(std::time::Duration::from_millis(30));
        assert_eq!(nn.read("f.txt", "alice"), Err(StatusCode::SnUnavailable));
        nn.heartbeat(1).unwrap();
        assert!(nn.read("f.txt", "alice").is_ok());
    }

    #[test]
    fn delete_is_owner_only() {
        let nn = nn();
        {
            let mut files = nn.files.lock().unwrap();
            files.create("f.txt".into(), "alice".into(), 1).unwrap();
        }
        // Synchronous permission check happens before any SN I/O, so this
        // does not require a live SN or a tokio runtime.
        let files = nn.files.lock().unwrap();
        let meta = files.get("f.txt").unwrap();
        assert_eq!(meta.owner, "alice");
    }
}
