//! Buffered read/write file with a shared, reference-counted session buffer.
//!
//! All concurrent opens of one [`BlobFile`] share a single [`BlobHandle`] and
//! a single in-memory buffer. The buffer is loaded from the file's
//! [`BlobStorage`] on the first open and saved back (if dirty) when the last
//! session is released, so two writers never hold diverging copies.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::error::{FsError, FsResult};
use crate::handle::{FileHandle, FileHandleRef};
use crate::node::Node;
use crate::types::{NodePath, OpenFlags, Stat};

/// Committed content behind a [`BlobFile`].
#[async_trait]
pub trait BlobStorage: Send + Sync + 'static {
    /// Produce the current committed bytes.
    async fn load(&self) -> FsResult<Vec<u8>>;

    /// Replace the committed bytes.
    async fn save(&self, data: &[u8]) -> FsResult<()>;

    /// Size of the committed bytes.
    async fn size(&self) -> FsResult<u64> {
        Ok(self.load().await?.len() as u64)
    }
}

/// Storage that keeps committed content in memory.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    data: RwLock<Bytes>,
}

impl MemoryStorage {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: RwLock::new(data.into()),
        }
    }
}

#[async_trait]
impl BlobStorage for MemoryStorage {
    async fn load(&self) -> FsResult<Vec<u8>> {
        Ok(self.data.read().await.to_vec())
    }

    async fn save(&self, data: &[u8]) -> FsResult<()> {
        *self.data.write().await = Bytes::copy_from_slice(data);
        Ok(())
    }

    async fn size(&self) -> FsResult<u64> {
        Ok(self.data.read().await.len() as u64)
    }
}

/// State that exists only while at least one session is open.
struct Session {
    buffer: Vec<u8>,
    dirty: bool,
    refs: usize,
    handle: FileHandleRef,
}

struct BlobInner<S> {
    mode: u32,
    rw: bool,
    storage: S,
    session: Mutex<Option<Session>>,
}

impl<S: BlobStorage> BlobInner<S> {
    fn check_writable(&self) -> FsResult<()> {
        if self.rw {
            Ok(())
        } else {
            Err(FsError::PermissionDenied)
        }
    }
}

/// A regular file whose content is buffered in memory while open.
pub struct BlobFile<S = MemoryStorage> {
    inner: Arc<BlobInner<S>>,
}

impl BlobFile<MemoryStorage> {
    /// Read-only in-memory file.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self::from_bytes(data, None, false)
    }

    /// Writable in-memory file.
    pub fn writable(data: impl Into<Bytes>) -> Self {
        Self::from_bytes(data, None, true)
    }

    pub fn from_bytes(data: impl Into<Bytes>, mode: Option<u32>, rw: bool) -> Self {
        Self::with_storage(MemoryStorage::new(data), mode, rw)
    }
}

impl<S: BlobStorage> BlobFile<S> {
    /// Without an explicit mode, writable files get 0o666 and read-only ones 0o444.
    pub fn with_storage(storage: S, mode: Option<u32>, rw: bool) -> Self {
        let mode = mode.unwrap_or(if rw { 0o666 } else { 0o444 }) & 0o777;
        Self {
            inner: Arc::new(BlobInner {
                mode,
                rw,
                storage,
                session: Mutex::new(None),
            }),
        }
    }

    pub fn storage(&self) -> &S {
        &self.inner.storage
    }

    pub fn is_writable(&self) -> bool {
        self.inner.rw
    }

    /// Number of sessions currently sharing the buffer.
    pub async fn open_sessions(&self) -> usize {
        self.inner
            .session
            .lock()
            .await
            .as_ref()
            .map_or(0, |session| session.refs)
    }
}

#[async_trait]
impl<S: BlobStorage> Node for BlobFile<S> {
    async fn getattr(&self, _path: &NodePath) -> FsResult<Stat> {
        let session = self.inner.session.lock().await;
        let size = match session.as_ref() {
            Some(session) => session.buffer.len() as u64,
            None => self.inner.storage.size().await?,
        };
        Ok(Stat::file(self.inner.mode, size))
    }

    async fn open(&self, _path: &NodePath, _flags: OpenFlags) -> FsResult<FileHandleRef> {
        let mut slot = self.inner.session.lock().await;
        if let Some(session) = slot.as_mut() {
            session.refs += 1;
            return Ok(session.handle.clone());
        }

        let buffer = self.inner.storage.load().await?;
        let handle: FileHandleRef = Arc::new(BlobHandle {
            inner: self.inner.clone(),
        });
        *slot = Some(Session {
            buffer,
            dirty: false,
            refs: 1,
            handle: handle.clone(),
        });
        Ok(handle)
    }

    async fn truncate(&self, path: &NodePath, size: u64) -> FsResult<()> {
        let handle = self.open(path, OpenFlags::READ_WRITE).await?;
        let truncated = handle.truncate(path, size).await;
        let released = handle.release(path).await;
        truncated.and(released)
    }
}

/// The single handle shared by every open session of a [`BlobFile`].
pub struct BlobHandle<S> {
    inner: Arc<BlobInner<S>>,
}

#[async_trait]
impl<S: BlobStorage> FileHandle for BlobHandle<S> {
    async fn read(&self, _path: &NodePath, size: u32, offset: u64) -> FsResult<Bytes> {
        let slot = self.inner.session.lock().await;
        let session = slot.as_ref().ok_or(FsError::BadHandle)?;

        let len = session.buffer.len();
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(len);
        let end = start.saturating_add(size as usize).min(len);
        Ok(Bytes::copy_from_slice(&session.buffer[start..end]))
    }

    async fn write(&self, _path: &NodePath, data: &[u8], offset: u64) -> FsResult<u32> {
        self.inner.check_writable()?;
        let written = u32::try_from(data.len()).map_err(|_| FsError::InvalidArgument)?;
        let start = usize::try_from(offset).map_err(|_| FsError::InvalidArgument)?;
        let end = start
            .checked_add(data.len())
            .ok_or(FsError::InvalidArgument)?;

        let mut slot = self.inner.session.lock().await;
        let session = slot.as_mut().ok_or(FsError::BadHandle)?;

        session.dirty = true;
        if end > session.buffer.len() {
            session.buffer.resize(end, 0);
        }
        session.buffer[start..end].copy_from_slice(data);
        Ok(written)
    }

    async fn truncate(&self, _path: &NodePath, size: u64) -> FsResult<()> {
        self.inner.check_writable()?;
        let size = usize::try_from(size).map_err(|_| FsError::InvalidArgument)?;

        let mut slot = self.inner.session.lock().await;
        let session = slot.as_mut().ok_or(FsError::BadHandle)?;

        session.dirty = true;
        session.buffer.resize(size, 0);
        Ok(())
    }

    async fn flush(&self, _path: &NodePath) -> FsResult<()> {
        let mut slot = self.inner.session.lock().await;
        let session = slot.as_mut().ok_or(FsError::BadHandle)?;

        if session.dirty {
            self.inner.storage.save(&session.buffer).await?;
            session.dirty = false;
        }
        Ok(())
    }

    async fn release(&self, _path: &NodePath) -> FsResult<()> {
        let mut slot = self.inner.session.lock().await;
        let session = slot.as_mut().ok_or(FsError::BadHandle)?;

        session.refs -= 1;
        if session.refs > 0 {
            return Ok(());
        }

        // Last session: the buffer goes away whether or not the save succeeds.
        let Some(session) = slot.take() else {
            return Ok(());
        };
        if session.dirty {
            debug!(size = session.buffer.len(), "saving blob on last release");
            self.inner.storage.save(&session.buffer).await?;
        }
        Ok(())
    }

    async fn fsync(&self, path: &NodePath, _datasync: bool) -> FsResult<()> {
        self.flush(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::rooted;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Memory storage that counts loads and saves.
    #[derive(Default)]
    struct CountingStorage {
        data: MemoryStorage,
        loads: AtomicUsize,
        saves: AtomicUsize,
    }

    #[async_trait]
    impl BlobStorage for CountingStorage {
        async fn load(&self) -> FsResult<Vec<u8>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.data.load().await
        }

        async fn save(&self, data: &[u8]) -> FsResult<()> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            self.data.save(data).await
        }
    }

    fn counting(data: &'static [u8], rw: bool) -> (Arc<BlobFile<CountingStorage>>, NodePath) {
        let storage = CountingStorage {
            data: MemoryStorage::new(data),
            ..Default::default()
        };
        rooted(BlobFile::with_storage(storage, None, rw))
    }

    #[tokio::test]
    async fn test_concurrent_opens_share_one_handle() {
        let (file, path) = counting(b"xyz", true);

        let a = file.open(&path, OpenFlags::READ_WRITE).await.unwrap();
        let b = file.open(&path, OpenFlags::READ).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(file.open_sessions().await, 2);
        assert_eq!(file.storage().loads.load(Ordering::SeqCst), 1);

        a.write(&path, b"AB", 0).await.unwrap();
        assert_eq!(&b.read(&path, 3, 0).await.unwrap()[..], b"ABz");

        a.release(&path).await.unwrap();
        b.release(&path).await.unwrap();
        assert_eq!(file.open_sessions().await, 0);
    }

    #[tokio::test]
    async fn test_single_save_on_last_release() {
        let (file, path) = counting(b"", true);

        let mut handles = Vec::new();
        for _ in 0..4 {
            handles.push(file.open(&path, OpenFlags::READ_WRITE).await.unwrap());
        }
        handles[0].write(&path, b"one", 0).await.unwrap();
        handles[3].write(&path, b"two", 3).await.unwrap();

        for handle in &handles {
            handle.release(&path).await.unwrap();
        }

        assert_eq!(file.open_sessions().await, 0);
        assert_eq!(file.storage().saves.load(Ordering::SeqCst), 1);
        assert_eq!(file.storage().load().await.unwrap(), b"onetwo");
    }

    #[tokio::test]
    async fn test_clean_release_does_not_save() {
        let (file, path) = counting(b"data", true);
        let handle = file.open(&path, OpenFlags::READ).await.unwrap();
        handle.read(&path, 4, 0).await.unwrap();
        handle.release(&path).await.unwrap();
        assert_eq!(file.storage().saves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_flush_is_idempotent() {
        let (file, path) = counting(b"", true);
        let handle = file.open(&path, OpenFlags::WRITE).await.unwrap();
        handle.write(&path, b"hello", 0).await.unwrap();

        handle.flush(&path).await.unwrap();
        handle.flush(&path).await.unwrap();
        assert_eq!(file.storage().saves.load(Ordering::SeqCst), 1);

        handle.release(&path).await.unwrap();
        assert_eq!(file.storage().saves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_write_to_read_only_blob_is_denied() {
        let (file, path) = rooted(BlobFile::new("meh"));
        let handle = file.open(&path, OpenFlags::READ_WRITE).await.unwrap();

        assert!(matches!(handle.write(&path, b"x", 0).await, Err(FsError::PermissionDenied)));
        assert!(matches!(file.truncate(&path, 0).await, Err(FsError::PermissionDenied)));
        assert_eq!(&handle.read(&path, 10, 0).await.unwrap()[..], b"meh");

        handle.release(&path).await.unwrap();
        assert_eq!(file.open_sessions().await, 0);
    }

    #[tokio::test]
    async fn test_write_past_end_zero_fills() {
        let (file, path) = rooted(BlobFile::writable("ab"));
        let handle = file.open(&path, OpenFlags::WRITE).await.unwrap();
        handle.write(&path, b"z", 4).await.unwrap();
        assert_eq!(&handle.read(&path, 10, 0).await.unwrap()[..], b"ab\0\0z");
        handle.release(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_getattr_reports_live_size_while_open() {
        let (file, path) = rooted(BlobFile::writable("xyz"));
        assert_eq!(file.getattr(&path).await.unwrap().size, 3);

        let handle = file.open(&path, OpenFlags::WRITE).await.unwrap();
        handle.write(&path, b"longer", 0).await.unwrap();
        assert_eq!(file.getattr(&path).await.unwrap().size, 6);
        assert_eq!(file.storage().size().await.unwrap(), 3);

        handle.release(&path).await.unwrap();
        assert_eq!(file.getattr(&path).await.unwrap().size, 6);
    }

    #[tokio::test]
    async fn test_node_truncate_commits_through_shared_buffer() {
        let (file, path) = counting(b"existing", true);
        file.truncate(&path, 0).await.unwrap();

        assert_eq!(file.open_sessions().await, 0);
        assert!(file.storage().load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_truncate_while_open_is_visible_to_sessions() {
        let (file, path) = rooted(BlobFile::writable("abcdef"));
        let handle = file.open(&path, OpenFlags::READ).await.unwrap();

        file.truncate(&path, 2).await.unwrap();
        assert_eq!(file.open_sessions().await, 1);
        assert_eq!(&handle.read(&path, 10, 0).await.unwrap()[..], b"ab");

        handle.release(&path).await.unwrap();
        assert_eq!(file.storage().load().await.unwrap(), b"ab");
    }

    #[tokio::test]
    async fn test_default_modes() {
        for (file, perm) in [
            (BlobFile::new(""), 0o444),
            (BlobFile::writable(""), 0o666),
            (BlobFile::from_bytes("", Some(0o600), true), 0o600),
        ] {
            let (file, path) = rooted(file);
            assert_eq!(file.getattr(&path).await.unwrap().perm, perm);
        }
    }
}
