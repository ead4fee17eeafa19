//! The node side of the capability contract.
//!
//! Every filesystem entry implements [`Node`], overriding only the operations
//! it supports. Anything left at its default fails with
//! [`FsError::Unsupported`], which the transport reports as `ENOSYS`.
//!
//! Each operation receives the [`NodePath`] it was resolved through, ending
//! at `self`. Directory operations that name a child (`mknod`, `unlink`, ...)
//! get the directory's own path plus the child name.

use std::any::Any;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;

use crate::error::{FsError, FsResult};
use crate::handle::{DirHandleRef, FileHandleRef};
use crate::types::{NodePath, OpenFlags, Stat, StatFs};

/// Shared reference to a tree entry. Hard links are two `NodeRef`s to one node.
pub type NodeRef = Arc<dyn Node>;

/// Downcasting support for node implementations that need to recognise
/// their own kind (e.g. a directory checking a rename target).
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[async_trait]
pub trait Node: AsAny + Send + Sync {
    async fn getattr(&self, _path: &NodePath) -> FsResult<Stat> {
        Err(FsError::Unsupported)
    }

    /// Look up a child by name. `Ok(None)` means "directory, but no such entry";
    /// the default means "not a directory at all".
    async fn lookup(&self, _name: &str) -> FsResult<Option<NodeRef>> {
        Err(FsError::NotADirectory)
    }

    async fn readlink(&self, _path: &NodePath) -> FsResult<String> {
        Err(FsError::Unsupported)
    }

    async fn mknod(
        &self,
        _path: &NodePath,
        _name: &str,
        _mode: u32,
        _dev: u64,
    ) -> FsResult<NodeRef> {
        Err(FsError::Unsupported)
    }

    async fn mkdir(&self, _path: &NodePath, _name: &str, _mode: u32) -> FsResult<NodeRef> {
        Err(FsError::Unsupported)
    }

    async fn unlink(&self, _path: &NodePath, _name: &str) -> FsResult<()> {
        Err(FsError::Unsupported)
    }

    async fn rmdir(&self, _path: &NodePath, _name: &str) -> FsResult<()> {
        Err(FsError::Unsupported)
    }

    async fn symlink(&self, _path: &NodePath, _name: &str, _target: &str) -> FsResult<NodeRef> {
        Err(FsError::Unsupported)
    }

    /// Move the child `old_name` of this directory into the directory at
    /// `new_parent` as `new_name`.
    async fn rename(
        &self,
        _path: &NodePath,
        _old_name: &str,
        _new_parent: &NodePath,
        _new_name: &str,
    ) -> FsResult<()> {
        Err(FsError::Unsupported)
    }

    /// Insert the node at `target` under `name`, sharing it with its other parents.
    async fn link(&self, _path: &NodePath, _name: &str, _target: &NodePath) -> FsResult<NodeRef> {
        Err(FsError::Unsupported)
    }

    async fn chmod(&self, _path: &NodePath, _mode: u32) -> FsResult<()> {
        Err(FsError::Unsupported)
    }

    async fn chown(&self, _path: &NodePath, _uid: Option<u32>, _gid: Option<u32>) -> FsResult<()> {
        Err(FsError::Unsupported)
    }

    async fn truncate(&self, _path: &NodePath, _size: u64) -> FsResult<()> {
        Err(FsError::Unsupported)
    }

    async fn open(&self, _path: &NodePath, _flags: OpenFlags) -> FsResult<FileHandleRef> {
        Err(FsError::Unsupported)
    }

    /// Create and open a regular file `name` in this directory.
    async fn create(
        &self,
        _path: &NodePath,
        _name: &str,
        _mode: u32,
        _flags: OpenFlags,
    ) -> FsResult<(NodeRef, FileHandleRef)> {
        Err(FsError::Unsupported)
    }

    async fn setxattr(
        &self,
        _path: &NodePath,
        _name: &str,
        _value: &[u8],
        _flags: i32,
    ) -> FsResult<()> {
        Err(FsError::Unsupported)
    }

    async fn getxattr(&self, _path: &NodePath, _name: &str) -> FsResult<Vec<u8>> {
        Err(FsError::Unsupported)
    }

    async fn listxattr(&self, _path: &NodePath) -> FsResult<Vec<String>> {
        Err(FsError::Unsupported)
    }

    async fn removexattr(&self, _path: &NodePath, _name: &str) -> FsResult<()> {
        Err(FsError::Unsupported)
    }

    async fn opendir(&self, _path: &NodePath) -> FsResult<DirHandleRef> {
        Err(FsError::Unsupported)
    }

    async fn access(&self, _path: &NodePath, _mask: i32) -> FsResult<()> {
        Err(FsError::Unsupported)
    }

    async fn utimens(
        &self,
        _path: &NodePath,
        _atime: SystemTime,
        _mtime: SystemTime,
    ) -> FsResult<()> {
        Err(FsError::Unsupported)
    }

    async fn bmap(&self, _path: &NodePath, _blocksize: u32, _idx: u64) -> FsResult<u64> {
        Err(FsError::Unsupported)
    }
}

/// Whole-tree operations available only on the root of a mounted tree.
#[async_trait]
pub trait RootNode: Node {
    /// Called before the filesystem is mounted.
    async fn init(&self) -> FsResult<()> {
        Ok(())
    }

    /// Called after the filesystem is unmounted.
    async fn destroy(&self) {}

    async fn statfs(&self) -> FsResult<StatFs> {
        Err(FsError::Unsupported)
    }
}
