//! Attribute-only node kinds and the static symlink.

use async_trait::async_trait;

use crate::error::FsResult;
use crate::node::{Node, NodeRef};
use crate::types::{FileKind, NodePath, Stat};

pub const DEFAULT_MODE: u32 = 0o444;

/// A regular file that supports nothing but `getattr`.
#[derive(Clone, Copy, Debug)]
pub struct BaseFile {
    mode: u32,
}

impl BaseFile {
    pub fn new(mode: u32) -> Self {
        Self { mode: mode & 0o777 }
    }
}

impl Default for BaseFile {
    fn default() -> Self {
        Self::new(DEFAULT_MODE)
    }
}

#[async_trait]
impl Node for BaseFile {
    async fn getattr(&self, _path: &NodePath) -> FsResult<Stat> {
        Ok(Stat::new(FileKind::File, self.mode, 0))
    }
}

/// A directory that supports nothing but `getattr`; lookups find nothing.
#[derive(Clone, Copy, Debug)]
pub struct BaseDir {
    mode: u32,
}

impl BaseDir {
    pub fn new(mode: u32) -> Self {
        Self { mode: mode & 0o777 }
    }
}

impl Default for BaseDir {
    fn default() -> Self {
        Self::new(0o555)
    }
}

#[async_trait]
impl Node for BaseDir {
    async fn getattr(&self, _path: &NodePath) -> FsResult<Stat> {
        Ok(Stat::dir(self.mode))
    }

    async fn lookup(&self, _name: &str) -> FsResult<Option<NodeRef>> {
        Ok(None)
    }
}

/// A symlink with a fixed target string.
#[derive(Clone, Debug)]
pub struct Symlink {
    target: String,
    mode: u32,
}

impl Symlink {
    pub fn new(target: impl Into<String>) -> Self {
        Self::with_mode(target, DEFAULT_MODE)
    }

    pub fn with_mode(target: impl Into<String>, mode: u32) -> Self {
        Self {
            target: target.into(),
            mode: mode & 0o777,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

#[async_trait]
impl Node for Symlink {
    async fn getattr(&self, _path: &NodePath) -> FsResult<Stat> {
        Ok(Stat::symlink(self.mode, self.target.len() as u64))
    }

    async fn readlink(&self, _path: &NodePath) -> FsResult<String> {
        Ok(self.target.clone())
    }
}
