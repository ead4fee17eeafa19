//! Numeric handle table for transports that hand out file descriptors.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::error::{FsError, FsResult};
use crate::handle::{OpenDir, OpenFile};

/// Maps kernel-visible handle numbers to open sessions.
///
/// File and directory sessions share one id space; ids are never reused
/// within the lifetime of a table.
pub struct HandleTable {
    next_id: AtomicU64,
    files: Mutex<HashMap<u64, OpenFile>>,
    dirs: Mutex<HashMap<u64, OpenDir>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            files: Mutex::new(HashMap::new()),
            dirs: Mutex::new(HashMap::new()),
        }
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn insert_file(&self, file: OpenFile) -> u64 {
        let fh = self.allocate_id();
        lock(&self.files).insert(fh, file);
        fh
    }

    pub fn file(&self, fh: u64) -> FsResult<OpenFile> {
        lock(&self.files).get(&fh).cloned().ok_or(FsError::BadHandle)
    }

    pub fn remove_file(&self, fh: u64) -> FsResult<OpenFile> {
        lock(&self.files).remove(&fh).ok_or(FsError::BadHandle)
    }

    pub fn insert_dir(&self, dir: OpenDir) -> u64 {
        let fh = self.allocate_id();
        lock(&self.dirs).insert(fh, dir);
        fh
    }

    pub fn dir(&self, fh: u64) -> FsResult<OpenDir> {
        lock(&self.dirs).get(&fh).cloned().ok_or(FsError::BadHandle)
    }

    pub fn remove_dir(&self, fh: u64) -> FsResult<OpenDir> {
        lock(&self.dirs).remove(&fh).ok_or(FsError::BadHandle)
    }

    /// Number of sessions currently open.
    pub fn len(&self) -> usize {
        lock(&self.files).len() + lock(&self.dirs).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}
