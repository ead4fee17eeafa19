//! The handle side of the capability contract.
//!
//! A [`FileHandle`] or [`DirHandle`] lives from `open`/`opendir` until the
//! matching `release`/`releasedir`. The transport serializes calls against a
//! single session, so handles only need interior mutability, not ordering.
//! Every call carries the [`NodePath`] the session was opened through.

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{FsError, FsResult};
use crate::node::NodeRef;
use crate::types::{DirEntry, LockRequest, NodePath, Stat};

pub type FileHandleRef = Arc<dyn FileHandle>;
pub type DirHandleRef = Arc<dyn DirHandle>;

/// Lazily produced, finite directory listing.
pub type DirEntries = Box<dyn Iterator<Item = DirEntry> + Send>;

/// Per-open-session file operations.
///
/// Attribute operations forward to the node at the end of the session's path
/// unless overridden. Data operations are unsupported by default.
#[async_trait]
pub trait FileHandle: Send + Sync {
    /// Reads and writes must bypass the kernel page cache.
    fn direct_io(&self) -> bool {
        false
    }

    /// The underlying stream cannot seek; offsets only ever grow.
    fn nonseekable(&self) -> bool {
        false
    }

    async fn getattr(&self, path: &NodePath) -> FsResult<Stat> {
        path.target().getattr(path).await
    }

    async fn chmod(&self, path: &NodePath, mode: u32) -> FsResult<()> {
        path.target().chmod(path, mode).await
    }

    async fn chown(&self, path: &NodePath, uid: Option<u32>, gid: Option<u32>) -> FsResult<()> {
        path.target().chown(path, uid, gid).await
    }

    async fn truncate(&self, path: &NodePath, size: u64) -> FsResult<()> {
        path.target().truncate(path, size).await
    }

    async fn utimens(&self, path: &NodePath, atime: SystemTime, mtime: SystemTime) -> FsResult<()> {
        path.target().utimens(path, atime, mtime).await
    }

    async fn read(&self, _path: &NodePath, _size: u32, _offset: u64) -> FsResult<Bytes> {
        Err(FsError::Unsupported)
    }

    async fn write(&self, _path: &NodePath, _data: &[u8], _offset: u64) -> FsResult<u32> {
        Err(FsError::Unsupported)
    }

    /// Called on every `close(2)` of a descriptor; may run several times per open.
    async fn flush(&self, _path: &NodePath) -> FsResult<()> {
        Err(FsError::Unsupported)
    }

    /// Called exactly once per successful `open`.
    async fn release(&self, _path: &NodePath) -> FsResult<()> {
        Ok(())
    }

    async fn fsync(&self, _path: &NodePath, _datasync: bool) -> FsResult<()> {
        Err(FsError::Unsupported)
    }

    async fn lock(&self, _path: &NodePath, _request: LockRequest) -> FsResult<()> {
        Err(FsError::Unsupported)
    }
}

/// Per-open-session directory enumeration.
#[async_trait]
pub trait DirHandle: Send + Sync {
    async fn readdir(&self, path: &NodePath) -> FsResult<DirEntries>;

    async fn fsyncdir(&self, _path: &NodePath, _datasync: bool) -> FsResult<()> {
        Ok(())
    }

    async fn releasedir(&self, _path: &NodePath) -> FsResult<()> {
        Ok(())
    }
}

/// An open file session: a handle together with the path it was opened through.
#[derive(Clone)]
pub struct OpenFile {
    path: NodePath,
    handle: FileHandleRef,
}

impl OpenFile {
    pub fn new(path: NodePath, handle: FileHandleRef) -> Self {
        Self { path, handle }
    }

    pub fn path(&self) -> &NodePath {
        &self.path
    }

    pub fn node(&self) -> &NodeRef {
        self.path.target()
    }

    pub fn handle(&self) -> &FileHandleRef {
        &self.handle
    }

    pub fn direct_io(&self) -> bool {
        self.handle.direct_io()
    }

    pub fn nonseekable(&self) -> bool {
        self.handle.nonseekable()
    }

    pub async fn getattr(&self) -> FsResult<Stat> {
        self.handle.getattr(&self.path).await
    }

    pub async fn chmod(&self, mode: u32) -> FsResult<()> {
        self.handle.chmod(&self.path, mode).await
    }

    pub async fn chown(&self, uid: Option<u32>, gid: Option<u32>) -> FsResult<()> {
        self.handle.chown(&self.path, uid, gid).await
    }

    pub async fn truncate(&self, size: u64) -> FsResult<()> {
        self.handle.truncate(&self.path, size).await
    }

    pub async fn utimens(&self, atime: SystemTime, mtime: SystemTime) -> FsResult<()> {
        self.handle.utimens(&self.path, atime, mtime).await
    }

    pub async fn read(&self, size: u32, offset: u64) -> FsResult<Bytes> {
        self.handle.read(&self.path, size, offset).await
    }

    pub async fn write(&self, data: &[u8], offset: u64) -> FsResult<u32> {
        self.handle.write(&self.path, data, offset).await
    }

    pub async fn flush(&self) -> FsResult<()> {
        self.handle.flush(&self.path).await
    }

    pub async fn release(&self) -> FsResult<()> {
        self.handle.release(&self.path).await
    }

    pub async fn fsync(&self, datasync: bool) -> FsResult<()> {
        self.handle.fsync(&self.path, datasync).await
    }

    pub async fn lock(&self, request: LockRequest) -> FsResult<()> {
        self.handle.lock(&self.path, request).await
    }
}

/// An open directory session.
#[derive(Clone)]
pub struct OpenDir {
    path: NodePath,
    handle: DirHandleRef,
}

impl OpenDir {
    pub fn new(path: NodePath, handle: DirHandleRef) -> Self {
        Self { path, handle }
    }

    pub fn path(&self) -> &NodePath {
        &self.path
    }

    pub fn node(&self) -> &NodeRef {
        self.path.target()
    }

    pub async fn readdir(&self) -> FsResult<DirEntries> {
        self.handle.readdir(&self.path).await
    }

    pub async fn fsyncdir(&self, datasync: bool) -> FsResult<()> {
        self.handle.fsyncdir(&self.path, datasync).await
    }

    pub async fn releasedir(&self) -> FsResult<()> {
        self.handle.releasedir(&self.path).await
    }
}
