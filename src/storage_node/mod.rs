//! The storage node: local file registry, sentence segmentation, and the
//! read/write/create/delete/copy/info handlers that sit on top of the
//! sentence lock table (spec §4.2).
//!
//! Grounded in the reference's `MirrorFS` (an `async_trait` wrapper around a
//! registry plus plain `std::fs` calls), generalized from whole-file NFS
//! procedures to sentence-granular operations backed by [`sentence`] and
//! [`locktable`](crate::locktable).

pub mod heartbeat;
pub mod registry;
pub mod server;

use std::fs;
use std::path::PathBuf;

use tracing::info;

use crate::error::{DResult, ResultExt, StatusCode};
use crate::holder::{HolderId, HolderIdGenerator};
use crate::locktable::{AcquireOutcome, LockKey, SentenceLockTable};
use crate::sentence;
use registry::{FileEntry, FileRegistry};

pub struct StorageNode {
    pub ss_id: u32,
    files: FileRegistry,
    locks: SentenceLockTable,
    holders: HolderIdGenerator,
}

impl StorageNode {
    pub fn new(ss_id: u32, base_path: PathBuf) -> Self {
        Self {
            ss_id,
            files: FileRegistry::new(base_path),
            locks: SentenceLockTable::new(),
            holders: HolderIdGenerator::new(),
        }
    }

    /// Scans the base directory and returns the relative paths found, for
    /// the `FILES` list sent on `SS_REGISTER` (spec §6).
    pub fn scan_files(&self) -> DResult<Vec<String>> {
        self.files.scan()
    }

    pub fn new_holder(&self) -> HolderId {
        self.holders.next_id()
    }

    /// Whole-file read: no sentence lock taken (spec §4.2 — "readers see a
    /// self-consistent prefix but no cross-operation snapshot guarantee").
    pub fn read(&self, path: &str) -> DResult<Vec<u8>> {
        self.files.read_whole(path)
    }

    /// Acquires a shared lock on `(path, idx)`, reads, releases.
    pub fn read_sentence(&self, path: &str, idx: usize, holder: HolderId) -> DResult<Vec<u8>> {
        let key = LockKey::new(path, idx);
        if self.locks.acquire_shared(&key, holder) == AcquireOutcome::Locked {
            return Err(StatusCode::FileLocked);
        }
        let result = self.read_sentence_locked(path, idx);
        self.locks.release(&key, holder);
        result
    }

    fn read_sentence_locked(&self, path: &str, idx: usize) -> DResult<Vec<u8>> {
        let content = self.files.read_whole(path)?;
        sentence::read_sentence(&content, idx).map(<[u8]>::to_vec).ok_or(StatusCode::FileNotFound)
    }

    /// Acquires an exclusive lock on `(path, idx)`, splices in `content`,
    /// writes back with a truncate-replace, recomputes cached metadata,
    /// releases (spec §4.2 `write_sentence` / "Write execution"). The lock
    /// is released even on an I/O error mid-write (spec §7 exception
    /// safety: "a mid-write I/O error releases the exclusive lock before
    /// returning").
    pub fn write_sentence(&self, path: &str, idx: usize, content: &[u8], holder: HolderId) -> DResult<()> {
        let key = LockKey::new(path, idx);
        if self.locks.acquire_exclusive(&key, holder) == AcquireOutcome::Locked {
            return Err(StatusCode::FileLocked);
        }
        let result = self.write_sentence_locked(path, idx, content);
        self.locks.release(&key, holder);
        result
    }

    fn write_sentence_locked(&self, path: &str, idx: usize, content: &[u8]) -> DResult<()> {
        let absolute = self.files.absolute_path(path);
        let existing = fs::read(&absolute).or_not_found()?;
        let updated = sentence::write_sentence(&existing, idx, content).ok_or(StatusCode::FileNotFound)?;
        fs::write(&absolute, &updated).or_invalid_op()?;
        self.files.refresh(path)?;
        Ok(())
    }

    /// Ingests a whole file's bytes directly, bypassing sentence indexing
    /// (spec §4.2 `copy`'s destination-side ingest; `count_sentences == 0`
    /// on a freshly created file makes sentence 0 an invalid write target,
    /// so whole-file ingest needs its own path rather than reusing
    /// `write_sentence`).
    pub fn write_whole(&self, path: &str, content: &[u8]) -> DResult<()> {
        self.files.write_whole(path, content)
    }

    pub fn create(&self, path: &str) -> DResult<()> {
        self.files.create(path)?;
        info!(ss_id = self.ss_id, path, "file created");
        Ok(())
    }

    /// Rejected with `FILE_LOCKED` if any active lock references the file
    /// (spec §4.2 `delete`).
    pub fn delete(&self, path: &str) -> DResult<()> {
        if self.locks.is_path_locked(path) {
            return Err(StatusCode::FileLocked);
        }
        self.files.delete(path)?;
        info!(ss_id = self.ss_id, path, "file deleted");
        Ok(())
    }

    /// Returns the cached metadata fields (spec §4.2 `info`). Reflects the
    /// last refresh; never re-segments just to serve an `info` call.
    pub fn info(&self, path: &str) -> DResult<FileEntry> {
        self.files.info(path)
    }

    /// Releases every lock held by a disconnecting holder (spec §3
    /// invariant 3, spec §8 "Disconnect cleanup").
    pub fn release_all(&self, holder: HolderId) -> usize {
        self.locks.release_all(holder)
    }

    pub fn base_path(&self) -> &std::path::Path {
        self.files.base_path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> (tempfile::TempDir, StorageNode) {
        let dir = tempfile::tempdir().unwrap();
        let node = StorageNode::new(1, dir.path().to_path_buf());
        (dir, node)
    }

    #[test]
    fn create_read_write_round_trip() {
        let (_dir, node) = node();
        node.create("notes.txt").unwrap();
        fs::write(node.base_path().join("notes.txt"), b"Hello world.").unwrap();
        let holder = node.new_holder();
        let sentence = node.read_sentence("notes.txt", 0, holder).unwrap();
        assert_eq!(sentence, b"Hello world.");
    }

    #[test]
    fn write_sentence_updates_content_and_count() {
        let (_dir, node) = node();
        node.create("doc.txt").unwrap();
        fs::write(node.base_path().join("doc.txt"), b"One. Two. Three.").unwrap();
        let holder = node.new_holder();
        node.write_sentence("doc.txt", 1, b"Replaced.", holder).unwrap();
        let whole = node.read("doc.txt").unwrap();
        assert_eq!(whole, b"One. Replaced. Three.");
    }

    #[test]
    fn concurrent_writers_one_wins() {
        let (_dir, node) = node();
        node.create("doc.txt").unwrap();
        fs::write(node.base_path().join("doc.txt"), b"One. Two. Three. Four.").unwrap();
        let a = node.new_holder();
        let b = node.new_holder();
        // Hold the exclusive lock open on A's behalf before B attempts it,
        // simulating two in-flight writers racing for the same sentence.
        let key = LockKey::new("doc.txt", 3);
        node.locks_for_test().acquire_exclusive(&key, a);
        assert_eq!(node.write_sentence("doc.txt", 3, b"Replaced.", b), Err(StatusCode::FileLocked));
        node.locks_for_test().release(&key, a);
        assert!(node.write_sentence("doc.txt", 3, b"Replaced.", b).is_ok());
    }

    #[test]
    fn write_whole_ingests_copied_content_into_fresh_file() {
        let (_dir, node) = node();
        node.create("copied.txt").unwrap();
        node.write_whole("copied.txt", b"One. Two. Three.").unwrap();
        assert_eq!(node.read("copied.txt").unwrap(), b"One. Two. Three.");
        let holder = node.new_holder();
        assert_eq!(node.read_sentence("copied.txt", 1, holder).unwrap(), b"Two.");
    }

    #[test]
    fn delete_rejected_while_locked() {
        let (_dir, node) = node();
        node.create("locked.txt").unwrap();
        fs::write(node.base_path().join("locked.txt"), b"A. B.").unwrap();
        let holder = node.new_holder();
        node.read_sentence("locked.txt", 0, holder).ok();
        // read_sentence releases immediately, so re-acquire to hold it open.
        let key = LockKey::new("locked.txt", 0);
        node.locks_for_test().acquire_shared(&key, holder);
        assert_eq!(node.delete("locked.txt"), Err(StatusCode::FileLocked));
        node.locks_for_test().release(&key, holder);
        assert!(node.delete("locked.txt").is_ok());
    }

    #[test]
    fn disconnect_cleanup_releases_all_locks() {
        let (_dir, node) = node();
        node.create("f.txt").unwrap();
        fs::write(node.base_path().join("f.txt"), b"A. B. C.").unwrap();
        let holder = node.new_holder();
        let k0 = LockKey::new("f.txt", 0);
        let k1 = LockKey::new("f.txt", 1);
        node.locks_for_test().acquire_shared(&k0, holder);
        node.locks_for_test().acquire_shared(&k1, holder);
        let released = node.release_all(holder);
        assert_eq!(released, 2);
    }

    impl StorageNode {
        fn locks_for_test(&self) -> &SentenceLockTable {
            &self.locks
        }
    }
}
