//! Core type definitions for FuseTree

use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use crate::node::NodeRef;

/// Kind of a filesystem entry
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    File,
    Directory,
    Symlink,
}

impl FileKind {
    /// The `S_IF*` type bits for this kind.
    pub fn type_bits(self) -> u32 {
        match self {
            FileKind::File => libc::S_IFREG as u32,
            FileKind::Directory => libc::S_IFDIR as u32,
            FileKind::Symlink => libc::S_IFLNK as u32,
        }
    }
}

/// File attributes returned by `getattr`.
///
/// Only the kind, permission bits and size are mandatory; everything else
/// falls back to whatever the transport uses when left unset.
#[derive(Clone, Debug, PartialEq)]
pub struct Stat {
    pub kind: FileKind,
    pub perm: u32,
    pub size: u64,
    pub nlink: Option<u32>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub atime: Option<SystemTime>,
    pub mtime: Option<SystemTime>,
    pub ctime: Option<SystemTime>,
}

impl Stat {
    pub fn new(kind: FileKind, perm: u32, size: u64) -> Self {
        Self {
            kind,
            perm: perm & 0o7777,
            size,
            nlink: None,
            uid: None,
            gid: None,
            atime: None,
            mtime: None,
            ctime: None,
        }
    }

    pub fn file(perm: u32, size: u64) -> Self {
        Self::new(FileKind::File, perm, size)
    }

    pub fn dir(perm: u32) -> Self {
        Self::new(FileKind::Directory, perm, 0)
    }

    pub fn symlink(perm: u32, size: u64) -> Self {
        Self::new(FileKind::Symlink, perm, size)
    }

    /// Combined type and permission bits, as in `st_mode`.
    pub fn mode(&self) -> u32 {
        self.kind.type_bits() | self.perm
    }
}

/// Volume statistics returned by `statfs`
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatFs {
    pub blocks: u64,
    pub bfree: u64,
    pub bavail: u64,
    pub files: u64,
    pub ffree: u64,
    pub bsize: u32,
    pub namelen: u32,
    pub frsize: u32,
}

/// Directory entry produced by `readdir`
#[derive(Clone, Debug, PartialEq)]
pub struct DirEntry {
    pub name: String,
    /// Attributes known at enumeration time, if the directory cares to supply them.
    pub attr: Option<Stat>,
}

impl DirEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attr: None,
        }
    }

    pub fn with_attr(name: impl Into<String>, attr: Stat) -> Self {
        Self {
            name: name.into(),
            attr: Some(attr),
        }
    }
}

/// Raw `open(2)` flags as passed by the kernel
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpenFlags(pub i32);

impl OpenFlags {
    pub const READ: OpenFlags = OpenFlags(libc::O_RDONLY);
    pub const WRITE: OpenFlags = OpenFlags(libc::O_WRONLY);
    pub const READ_WRITE: OpenFlags = OpenFlags(libc::O_RDWR);

    pub fn bits(self) -> i32 {
        self.0
    }

    pub fn is_writable(self) -> bool {
        self.0 & libc::O_ACCMODE != libc::O_RDONLY
    }

    pub fn is_readable(self) -> bool {
        self.0 & libc::O_ACCMODE != libc::O_WRONLY
    }
}

/// A POSIX record lock request (`struct flock` plus the fcntl command)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LockRequest {
    pub cmd: i32,
    pub typ: i32,
    pub start: u64,
    pub end: u64,
    pub pid: u32,
}

/// The route the dispatcher walked to reach a node: the root, then every
/// `(name, node)` step below it.
///
/// Nodes keep no parent pointers, so this is how an operation learns where
/// its node sits and which directories lead to it.
#[derive(Clone)]
pub struct NodePath {
    root: NodeRef,
    steps: Vec<(String, NodeRef)>,
}

impl NodePath {
    /// The path naming `root` itself.
    pub fn root(root: NodeRef) -> Self {
        Self {
            root,
            steps: Vec::new(),
        }
    }

    /// Descend one level into `node`, reached under `name`.
    pub fn push(&mut self, name: impl Into<String>, node: NodeRef) {
        self.steps.push((name.into(), node));
    }

    /// A copy of this path extended by one step.
    pub fn join(&self, name: impl Into<String>, node: NodeRef) -> Self {
        let mut path = self.clone();
        path.push(name, node);
        path
    }

    /// The node this path leads to.
    pub fn target(&self) -> &NodeRef {
        self.steps.last().map_or(&self.root, |(_, node)| node)
    }

    /// Name of the final step; empty for the root.
    pub fn name(&self) -> &str {
        self.steps.last().map_or("", |(name, _)| name.as_str())
    }

    /// Path of the containing directory, or `None` for the root.
    pub fn parent(&self) -> Option<NodePath> {
        let (_, rest) = self.steps.split_last()?;
        Some(Self {
            root: self.root.clone(),
            steps: rest.to_vec(),
        })
    }

    pub fn parent_node(&self) -> Option<&NodeRef> {
        match self.steps.len() {
            0 => None,
            1 => Some(&self.root),
            n => Some(&self.steps[n - 2].1),
        }
    }

    /// Number of steps below the root.
    pub fn depth(&self) -> usize {
        self.steps.len()
    }

    pub fn is_root(&self) -> bool {
        self.steps.is_empty()
    }

    /// Every node on the route, root first, target last.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeRef> {
        std::iter::once(&self.root).chain(self.steps.iter().map(|(_, node)| node))
    }

    /// Whether `node` (by identity) lies anywhere on this route.
    pub fn passes_through(&self, node: &NodeRef) -> bool {
        self.nodes()
            .any(|step| std::ptr::addr_eq(Arc::as_ptr(step), Arc::as_ptr(node)))
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.steps.is_empty() {
            return f.write_str("/");
        }
        for (name, _) in &self.steps {
            write!(f, "/{name}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NodePath").field(&self.to_string()).finish()
    }
}

/// A path rooted at `node`, for exercising a node outside a mounted tree.
#[cfg(test)]
pub(crate) fn rooted<N: crate::node::Node + 'static>(node: N) -> (Arc<N>, NodePath) {
    let node = Arc::new(node);
    let path = NodePath::root(node.clone());
    (node, path)
}
