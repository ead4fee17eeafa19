//! Mutable in-memory directory.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use indexmap::IndexMap;
use tokio::sync::{Mutex, RwLock};

use crate::error::{FsError, FsResult};
use crate::handle::{DirEntries, DirHandle, DirHandleRef, FileHandleRef};
use crate::node::{AsAny, Node, NodeRef};
use crate::nodes::base::Symlink;
use crate::nodes::blob::BlobFile;
use crate::types::{DirEntry, NodePath, OpenFlags, Stat};

/// A directory backed by an insertion-ordered name → node map.
///
/// Mutations are only accepted when the directory was built writable; a
/// read-only directory rejects them with [`FsError::PermissionDenied`]
/// before touching the map.
pub struct DictDir {
    mode: u32,
    rw: bool,
    entries: RwLock<IndexMap<String, NodeRef>>,
}

impl DictDir {
    /// Empty read-only directory.
    pub fn new() -> Self {
        Self::empty(None, false)
    }

    /// Empty writable directory.
    pub fn writable() -> Self {
        Self::empty(None, true)
    }

    pub fn empty(mode: Option<u32>, rw: bool) -> Self {
        Self::from_entries(Vec::<(String, NodeRef)>::new(), mode, rw)
    }

    /// Without an explicit mode, writable directories get 0o777 and read-only ones 0o555.
    pub fn from_entries<I, K>(entries: I, mode: Option<u32>, rw: bool) -> Self
    where
        I: IntoIterator<Item = (K, NodeRef)>,
        K: Into<String>,
    {
        let mode = mode.unwrap_or(if rw { 0o777 } else { 0o555 }) & 0o777;
        Self {
            mode,
            rw,
            entries: RwLock::new(
                entries
                    .into_iter()
                    .map(|(name, node)| (name.into(), node))
                    .collect(),
            ),
        }
    }

    pub fn builder() -> DictDirBuilder {
        DictDirBuilder::default()
    }

    pub fn is_writable(&self) -> bool {
        self.rw
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Child names in enumeration order.
    pub async fn names(&self) -> Vec<String> {
        self.entries.read().await.keys().cloned().collect()
    }

    fn check_writable(&self) -> FsResult<()> {
        if self.rw {
            Ok(())
        } else {
            Err(FsError::PermissionDenied)
        }
    }

    async fn insert_new(&self, name: &str, node: NodeRef) -> FsResult<NodeRef> {
        self.check_writable()?;
        let mut entries = self.entries.write().await;
        if entries.contains_key(name) {
            return Err(FsError::AlreadyExists);
        }
        entries.insert(name.to_string(), node.clone());
        Ok(node)
    }

    async fn remove(&self, name: &str) -> FsResult<()> {
        self.check_writable()?;
        self.entries
            .write()
            .await
            .shift_remove(name)
            .map(|_| ())
            .ok_or(FsError::NotFound)
    }
}

impl Default for DictDir {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for DictDir {
    async fn getattr(&self, _path: &NodePath) -> FsResult<Stat> {
        Ok(Stat::dir(self.mode))
    }

    async fn lookup(&self, name: &str) -> FsResult<Option<NodeRef>> {
        Ok(self.entries.read().await.get(name).cloned())
    }

    async fn opendir(&self, _path: &NodePath) -> FsResult<DirHandleRef> {
        let names = self.names().await;
        let handle: DirHandleRef = Arc::new(DictDirHandle {
            names: Mutex::new(Some(names)),
        });
        Ok(handle)
    }

    async fn mknod(&self, _path: &NodePath, name: &str, mode: u32, dev: u64) -> FsResult<NodeRef> {
        self.check_writable()?;
        if dev != 0 {
            return Err(FsError::Unsupported);
        }
        let file: NodeRef = Arc::new(BlobFile::from_bytes(Bytes::new(), Some(mode), true));
        self.insert_new(name, file).await
    }

    async fn mkdir(&self, _path: &NodePath, name: &str, mode: u32) -> FsResult<NodeRef> {
        let dir: NodeRef = Arc::new(DictDir::empty(Some(mode), true));
        self.insert_new(name, dir).await
    }

    async fn unlink(&self, _path: &NodePath, name: &str) -> FsResult<()> {
        self.remove(name).await
    }

    async fn rmdir(&self, _path: &NodePath, name: &str) -> FsResult<()> {
        self.remove(name).await
    }

    async fn symlink(&self, _path: &NodePath, name: &str, target: &str) -> FsResult<NodeRef> {
        let link: NodeRef = Arc::new(Symlink::new(target));
        self.insert_new(name, link).await
    }

    async fn rename(
        &self,
        _path: &NodePath,
        old_name: &str,
        new_parent: &NodePath,
        new_name: &str,
    ) -> FsResult<()> {
        let target = AsAny::as_any(&**new_parent.target())
            .downcast_ref::<DictDir>()
            .ok_or(FsError::Unsupported)?;
        if !self.rw || !target.rw {
            return Err(FsError::PermissionDenied);
        }

        if std::ptr::eq(self, target) {
            let mut entries = self.entries.write().await;
            let node = entries.shift_remove(old_name).ok_or(FsError::NotFound)?;
            entries.insert(new_name.to_string(), node);
            return Ok(());
        }

        // Remove from the source first, then insert into the destination.
        // The two maps are locked one after the other, never together.
        let node = {
            let mut entries = self.entries.write().await;
            let moving = entries.get(old_name).ok_or(FsError::NotFound)?;
            // A directory cannot become its own descendant.
            if new_parent.passes_through(moving) {
                return Err(FsError::InvalidArgument);
            }
            entries.shift_remove(old_name).ok_or(FsError::NotFound)?
        };
        target.entries.write().await.insert(new_name.to_string(), node);
        Ok(())
    }

    async fn link(&self, path: &NodePath, name: &str, target: &NodePath) -> FsResult<NodeRef> {
        let node = target.target().clone();
        if path.passes_through(&node) {
            return Err(FsError::InvalidArgument);
        }
        self.insert_new(name, node).await
    }

    async fn create(
        &self,
        path: &NodePath,
        name: &str,
        mode: u32,
        flags: OpenFlags,
    ) -> FsResult<(NodeRef, FileHandleRef)> {
        let node = self.mknod(path, name, mode, 0).await?;
        let handle = node.open(&path.join(name, node.clone()), flags).await?;
        Ok((node, handle))
    }
}

/// Enumeration session over a snapshot of a [`DictDir`]'s names.
pub struct DictDirHandle {
    names: Mutex<Option<Vec<String>>>,
}

#[async_trait]
impl DirHandle for DictDirHandle {
    /// Yields the snapshot once; later calls on the same session yield nothing.
    async fn readdir(&self, _path: &NodePath) -> FsResult<DirEntries> {
        let names = self.names.lock().await.take().unwrap_or_default();
        let entries: DirEntries = Box::new(names.into_iter().map(DirEntry::new));
        Ok(entries)
    }
}

/// Declarative construction of a [`DictDir`].
#[derive(Default)]
pub struct DictDirBuilder {
    entries: Vec<(String, NodeRef)>,
    mode: Option<u32>,
    rw: bool,
}

impl DictDirBuilder {
    pub fn entry(mut self, name: impl Into<String>, node: impl Node + 'static) -> Self {
        self.entries.push((name.into(), Arc::new(node)));
        self
    }

    /// Add an already shared node, e.g. to link it from several places.
    pub fn shared(mut self, name: impl Into<String>, node: NodeRef) -> Self {
        self.entries.push((name.into(), node));
        self
    }

    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn writable(mut self, rw: bool) -> Self {
        self.rw = rw;
        self
    }

    pub fn build(self) -> DictDir {
        DictDir::from_entries(self.entries, self.mode, self.rw)
    }
}
