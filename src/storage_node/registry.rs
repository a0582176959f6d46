//! The storage node's local file registry: one entry per file under the
//! node's base directory (spec §3 "Storage Node file entry").
//!
//! Grounded in the reference's `FSMap`/`FSEntry` pair — a `HashMap` keyed by
//! logical identity, entries refreshed from the filesystem rather than
//! trusted blindly — generalized from an inode-number key to the relative
//! path that is this system's cluster-wide file identity.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use crate::error::{DResult, OptionExt, ResultExt, StatusCode};
use crate::sentence;

/// One file under the node's base directory.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub path: String,
    pub absolute_path: PathBuf,
    pub size: u64,
    pub created_at: SystemTime,
    pub modified_at: SystemTime,
    pub sentence_count: usize,
    pub is_dir: bool,
}

impl FileEntry {
    fn from_disk(base: &Path, relative: &str) -> DResult<Self> {
        let absolute_path = base.join(relative);
        let meta = fs::metadata(&absolute_path).or_not_found()?;
        let sentence_count = if meta.is_dir() {
            0
        } else {
            sentence::count_sentences(&fs::read(&absolute_path).or_invalid_op()?)
        };
        Ok(Self {
            path: relative.to_string(),
            absolute_path,
            size: meta.len(),
            created_at: meta.created().unwrap_or_else(|_| SystemTime::now()),
            modified_at: meta.modified().unwrap_or_else(|_| SystemTime::now()),
            sentence_count,
            is_dir: meta.is_dir(),
        })
    }
}

/// In-memory registry of this node's files, reconstructed at startup from a
/// directory scan (spec §6 "registries are reconstructed at startup from
/// disk scan").
#[derive(Debug, Default)]
pub struct FileRegistry {
    base: PathBuf,
    by_path: Mutex<HashMap<String, FileEntry>>,
}

impl FileRegistry {
    pub fn new(base: PathBuf) -> Self {
        Self { base, by_path: Mutex::new(HashMap::new()) }
    }

    pub fn base_path(&self) -> &Path {
        &self.base
    }

    /// Recursively scans `base` and populates the registry, returning the
    /// relative paths found (used as the `initial-file-list` sent to
    /// `register_sn`, spec §4.1).
    pub fn scan(&self) -> DResult<Vec<String>> {
        let mut found = Vec::new();
        scan_dir(&self.base, &self.base, &mut found).or_invalid_op()?;
        let mut table = self.by_path.lock().unwrap();
        table.clear();
        for relative in &found {
            if let Ok(entry) = FileEntry::from_disk(&self.base, relative) {
                table.insert(relative.clone(), entry);
            }
        }
        Ok(found)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.by_path.lock().unwrap().contains_key(path)
    }

    pub fn get(&self, path: &str) -> Option<FileEntry> {
        self.by_path.lock().unwrap().get(path).cloned()
    }

    pub fn absolute_path(&self, path: &str) -> PathBuf {
        self.base.join(path)
    }

    /// Creates an empty file on disk and registers it. Fails `FILE_EXISTS`
    /// if the on-disk entry is already there (spec §4.2 `create`).
    pub fn create(&self, path: &str) -> DResult<()> {
        let absolute = self.absolute_path(path);
        if absolute.exists() {
            return Err(StatusCode::FileExists);
        }
        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent).or_invalid_op()?;
        }
        fs::write(&absolute, b"").or_invalid_op()?;
        let entry = FileEntry::from_disk(&self.base, path)?;
        self.by_path.lock().unwrap().insert(path.to_string(), entry);
        Ok(())
    }

    /// Removes a file from disk and the registry.
    pub fn delete(&self, path: &str) -> DResult<()> {
        let absolute = self.absolute_path(path);
        fs::remove_file(&absolute).or_not_found()?;
        self.by_path.lock().unwrap().remove(path);
        Ok(())
    }

    /// Reads the whole file's current bytes (spec §4.2 `read`, no lock held).
    pub fn read_whole(&self, path: &str) -> DResult<Vec<u8>> {
        let absolute = self.absolute_path(path);
        fs::read(&absolute).or_not_found()
    }

    /// Truncate-writes the whole file's bytes and refreshes the cached entry
    /// (spec §4.2 `copy`: the destination "creates the file and ingests the
    /// stream" as one whole-file payload, not a sentence write).
    pub fn write_whole(&self, path: &str, content: &[u8]) -> DResult<()> {
        let absolute = self.absolute_path(path);
        fs::write(&absolute, content).or_invalid_op()?;
        let entry = FileEntry::from_disk(&self.base, path)?;
        self.by_path.lock().unwrap().insert(path.to_string(), entry);
        Ok(())
    }

    /// Refreshes cached `size`/`sentence_count`/`modified_at` after a
    /// mutation (spec §4.2 "Segmentation cache invalidation").
    pub fn refresh(&self, path: &str) -> DResult<FileEntry> {
        let entry = FileEntry::from_disk(&self.base, path)?;
        let mut table = self.by_path.lock().unwrap();
        table.insert(path.to_string(), entry.clone());
        Ok(entry)
    }

    pub fn info(&self, path: &str) -> DResult<FileEntry> {
        self.by_path.lock().unwrap().get(path).cloned().ok_or_status(StatusCode::FileNotFound)
    }
}

fn scan_dir(base: &Path, dir: &Path, out: &mut Vec<String>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            scan_dir(base, &path, out)?;
        } else if let Ok(relative) = path.strip_prefix(base) {
            out.push(relative.to_string_lossy().replace('\\', "/"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_scan_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FileRegistry::new(dir.path().to_path_buf());
        registry.create("notes.txt").unwrap();
        let found = registry.scan().unwrap();
        assert_eq!(found, vec!["notes.txt".to_string()]);
        assert!(registry.contains("notes.txt"));
    }

    #[test]
    fn create_rejects_existing_path() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FileRegistry::new(dir.path().to_path_buf());
        registry.create("a.txt").unwrap();
        assert_eq!(registry.create("a.txt"), Err(StatusCode::FileExists));
    }

    #[test]
    fn write_whole_overwrites_and_refreshes_cache() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FileRegistry::new(dir.path().to_path_buf());
        registry.create("a.txt").unwrap();
        registry.write_whole("a.txt", b"One. Two.").unwrap();
        assert_eq!(registry.read_whole("a.txt").unwrap(), b"One. Two.");
        assert_eq!(registry.info("a.txt").unwrap().sentence_count, 2);
    }

    #[test]
    fn delete_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FileRegistry::new(dir.path().to_path_buf());
        assert_eq!(registry.delete("missing.txt"), Err(StatusCode::FileNotFound));
    }
}
