//! Path resolution and operation routing.
//!
//! The [`Dispatcher`] turns absolute-path calls into tree walks starting at the
//! root node, and forwards session-scoped calls to the [`OpenFile`] or
//! [`OpenDir`] the transport hands back. The walk is kept as a [`NodePath`]
//! and handed to the node, so every operation knows the route it came through.
//! Every call is traced at `debug` when operation logging is enabled; errors
//! are passed through unchanged.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use tracing::debug;

use crate::config::FsConfig;
use crate::error::{FsError, FsResult};
use crate::handle::{DirEntries, OpenDir, OpenFile};
use crate::node::{NodeRef, RootNode};
use crate::types::{LockRequest, NodePath, OpenFlags, Stat, StatFs};

/// Routes filesystem operations onto a tree of nodes.
pub struct Dispatcher {
    root: NodeRef,
    volume: Option<Arc<dyn RootNode>>,
    log_operations: bool,
}

/// Non-empty components of `path`. Repeated and trailing slashes are ignored.
fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|c| !c.is_empty())
}

/// Split `path` into its parent path and final component.
fn split_parent(path: &str) -> Option<(&str, &str)> {
    let trimmed = path.trim_end_matches('/');
    let (parent, name) = match trimmed.rfind('/') {
        Some(i) => (&trimmed[..i], &trimmed[i + 1..]),
        None => ("", trimmed),
    };
    (!name.is_empty()).then_some((parent, name))
}

impl Dispatcher {
    /// Dispatcher over a plain root. `init`/`destroy` do nothing and `statfs`
    /// is unsupported.
    pub fn new(root: NodeRef) -> Self {
        Self {
            root,
            volume: None,
            log_operations: true,
        }
    }

    /// Dispatcher over a root that also handles the whole-tree operations.
    pub fn with_root_node<R: RootNode + 'static>(root: Arc<R>) -> Self {
        let node: NodeRef = root.clone();
        let volume: Arc<dyn RootNode> = root;
        Self {
            root: node,
            volume: Some(volume),
            log_operations: true,
        }
    }

    pub fn with_config(mut self, config: &FsConfig) -> Self {
        self.log_operations = config.log_operations;
        self
    }

    pub fn root(&self) -> &NodeRef {
        &self.root
    }

    async fn run<T, P, F>(&self, op: &'static str, path: &P, fut: F) -> FsResult<T>
    where
        P: fmt::Display + ?Sized,
        F: Future<Output = FsResult<T>>,
    {
        if !self.log_operations {
            return fut.await;
        }

        debug!(op, path = %path, "->");
        let result = fut.await;
        match &result {
            Ok(_) => debug!(op, path = %path, "<- ok"),
            Err(e) => debug!(op, path = %path, errno = e.errno(), error = %e, "<- failed"),
        }
        result
    }

    /// Walk from the root to the node at `path`, keeping every step. The empty
    /// path and `/` name the root.
    pub async fn resolve_path(&self, path: &str) -> FsResult<NodePath> {
        let mut route = NodePath::root(self.root.clone());
        for name in components(path) {
            let node = route.target().lookup(name).await?.ok_or(FsError::NotFound)?;
            route.push(name, node);
        }
        Ok(route)
    }

    /// The node at `path`.
    pub async fn resolve(&self, path: &str) -> FsResult<NodeRef> {
        Ok(self.resolve_path(path).await?.target().clone())
    }

    /// Resolve the directory containing `path` and return it with the final
    /// component. The root has no parent, so entry-creating calls on it are
    /// unsupported.
    pub async fn resolve_parent<'p>(&self, path: &'p str) -> FsResult<(NodePath, &'p str)> {
        let (parent, name) = split_parent(path).ok_or(FsError::Unsupported)?;
        let parent = self.resolve_path(parent).await?;
        Ok((parent, name))
    }

    // Whole-tree operations.

    pub async fn init(&self) -> FsResult<()> {
        match &self.volume {
            Some(volume) => self.run("init", "/", volume.init()).await,
            None => Ok(()),
        }
    }

    pub async fn destroy(&self) {
        if let Some(volume) = &self.volume {
            if self.log_operations {
                debug!(op = "destroy", "->");
            }
            volume.destroy().await;
        }
    }

    pub async fn statfs(&self) -> FsResult<StatFs> {
        self.run("statfs", "/", async {
            match &self.volume {
                Some(volume) => volume.statfs().await,
                None => Err(FsError::Unsupported),
            }
        })
        .await
    }

    // Path operations.

    pub async fn getattr(&self, path: &str) -> FsResult<Stat> {
        self.run("getattr", path, async {
            let route = self.resolve_path(path).await?;
            route.target().getattr(&route).await
        })
        .await
    }

    pub async fn readlink(&self, path: &str) -> FsResult<String> {
        self.run("readlink", path, async {
            let route = self.resolve_path(path).await?;
            route.target().readlink(&route).await
        })
        .await
    }

    pub async fn mknod(&self, path: &str, mode: u32, dev: u64) -> FsResult<NodeRef> {
        self.run("mknod", path, async {
            let (parent, name) = self.resolve_parent(path).await?;
            parent.target().mknod(&parent, name, mode, dev).await
        })
        .await
    }

    pub async fn mkdir(&self, path: &str, mode: u32) -> FsResult<NodeRef> {
        self.run("mkdir", path, async {
            let (parent, name) = self.resolve_parent(path).await?;
            parent.target().mkdir(&parent, name, mode).await
        })
        .await
    }

    pub async fn unlink(&self, path: &str) -> FsResult<()> {
        self.run("unlink", path, async {
            let (parent, name) = self.resolve_parent(path).await?;
            parent.target().unlink(&parent, name).await
        })
        .await
    }

    pub async fn rmdir(&self, path: &str) -> FsResult<()> {
        self.run("rmdir", path, async {
            let (parent, name) = self.resolve_parent(path).await?;
            parent.target().rmdir(&parent, name).await
        })
        .await
    }

    /// Create a symlink at `path` whose content is the literal `target`.
    pub async fn symlink(&self, path: &str, target: &str) -> FsResult<NodeRef> {
        self.run("symlink", path, async {
            let (parent, name) = self.resolve_parent(path).await?;
            parent.target().symlink(&parent, name, target).await
        })
        .await
    }

    pub async fn rename(&self, path: &str, new_path: &str) -> FsResult<()> {
        self.run("rename", path, async {
            let (old_parent, old_name) = self.resolve_parent(path).await?;
            let (new_parent, new_name) = self.resolve_parent(new_path).await?;
            old_parent
                .target()
                .rename(&old_parent, old_name, &new_parent, new_name)
                .await
        })
        .await
    }

    /// Make the node at `target` reachable at `path` as well.
    pub async fn link(&self, target: &str, path: &str) -> FsResult<NodeRef> {
        self.run("link", path, async {
            let target = self.resolve_path(target).await?;
            let (parent, name) = self.resolve_parent(path).await?;
            parent.target().link(&parent, name, &target).await
        })
        .await
    }

    pub async fn chmod(&self, path: &str, mode: u32) -> FsResult<()> {
        self.run("chmod", path, async {
            let route = self.resolve_path(path).await?;
            route.target().chmod(&route, mode).await
        })
        .await
    }

    pub async fn chown(&self, path: &str, uid: Option<u32>, gid: Option<u32>) -> FsResult<()> {
        self.run("chown", path, async {
            let route = self.resolve_path(path).await?;
            route.target().chown(&route, uid, gid).await
        })
        .await
    }

    pub async fn truncate(&self, path: &str, size: u64) -> FsResult<()> {
        self.run("truncate", path, async {
            let route = self.resolve_path(path).await?;
            route.target().truncate(&route, size).await
        })
        .await
    }

    pub async fn utimens(&self, path: &str, atime: SystemTime, mtime: SystemTime) -> FsResult<()> {
        self.run("utimens", path, async {
            let route = self.resolve_path(path).await?;
            route.target().utimens(&route, atime, mtime).await
        })
        .await
    }

    pub async fn access(&self, path: &str, mask: i32) -> FsResult<()> {
        self.run("access", path, async {
            let route = self.resolve_path(path).await?;
            route.target().access(&route, mask).await
        })
        .await
    }

    pub async fn bmap(&self, path: &str, blocksize: u32, idx: u64) -> FsResult<u64> {
        self.run("bmap", path, async {
            let route = self.resolve_path(path).await?;
            route.target().bmap(&route, blocksize, idx).await
        })
        .await
    }

    pub async fn setxattr(&self, path: &str, name: &str, value: &[u8], flags: i32) -> FsResult<()> {
        self.run("setxattr", path, async {
            let route = self.resolve_path(path).await?;
            route.target().setxattr(&route, name, value, flags).await
        })
        .await
    }

    pub async fn getxattr(&self, path: &str, name: &str) -> FsResult<Vec<u8>> {
        self.run("getxattr", path, async {
            let route = self.resolve_path(path).await?;
            route.target().getxattr(&route, name).await
        })
        .await
    }

    pub async fn listxattr(&self, path: &str) -> FsResult<Vec<String>> {
        self.run("listxattr", path, async {
            let route = self.resolve_path(path).await?;
            route.target().listxattr(&route).await
        })
        .await
    }

    pub async fn removexattr(&self, path: &str, name: &str) -> FsResult<()> {
        self.run("removexattr", path, async {
            let route = self.resolve_path(path).await?;
            route.target().removexattr(&route, name).await
        })
        .await
    }

    /// Open the file at `path`, binding the returned session to its route.
    pub async fn open(&self, path: &str, flags: OpenFlags) -> FsResult<OpenFile> {
        self.run("open", path, async {
            let route = self.resolve_path(path).await?;
            let handle = route.target().open(&route, flags).await?;
            Ok::<_, FsError>(OpenFile::new(route, handle))
        })
        .await
    }

    pub async fn create(&self, path: &str, mode: u32, flags: OpenFlags) -> FsResult<OpenFile> {
        self.run("create", path, async {
            let (parent, name) = self.resolve_parent(path).await?;
            let (node, handle) = parent.target().create(&parent, name, mode, flags).await?;
            Ok::<_, FsError>(OpenFile::new(parent.join(name, node), handle))
        })
        .await
    }

    pub async fn opendir(&self, path: &str) -> FsResult<OpenDir> {
        self.run("opendir", path, async {
            let route = self.resolve_path(path).await?;
            let handle = route.target().opendir(&route).await?;
            Ok::<_, FsError>(OpenDir::new(route, handle))
        })
        .await
    }

    // Session operations. The path was resolved once at open time.

    pub async fn fgetattr(&self, file: &OpenFile) -> FsResult<Stat> {
        self.run("fgetattr", file.path(), file.getattr()).await
    }

    pub async fn fchmod(&self, file: &OpenFile, mode: u32) -> FsResult<()> {
        self.run("fchmod", file.path(), file.chmod(mode)).await
    }

    pub async fn fchown(&self, file: &OpenFile, uid: Option<u32>, gid: Option<u32>) -> FsResult<()> {
        self.run("fchown", file.path(), file.chown(uid, gid)).await
    }

    pub async fn ftruncate(&self, file: &OpenFile, size: u64) -> FsResult<()> {
        self.run("ftruncate", file.path(), file.truncate(size)).await
    }

    pub async fn futimens(
        &self,
        file: &OpenFile,
        atime: SystemTime,
        mtime: SystemTime,
    ) -> FsResult<()> {
        self.run("futimens", file.path(), file.utimens(atime, mtime)).await
    }

    pub async fn read(&self, file: &OpenFile, size: u32, offset: u64) -> FsResult<Bytes> {
        self.run("read", file.path(), file.read(size, offset)).await
    }

    pub async fn write(&self, file: &OpenFile, data: &[u8], offset: u64) -> FsResult<u32> {
        self.run("write", file.path(), file.write(data, offset)).await
    }

    pub async fn flush(&self, file: &OpenFile) -> FsResult<()> {
        self.run("flush", file.path(), file.flush()).await
    }

    pub async fn release(&self, file: &OpenFile) -> FsResult<()> {
        self.run("release", file.path(), file.release()).await
    }

    pub async fn fsync(&self, file: &OpenFile, datasync: bool) -> FsResult<()> {
        self.run("fsync", file.path(), file.fsync(datasync)).await
    }

    pub async fn lock(&self, file: &OpenFile, request: LockRequest) -> FsResult<()> {
        self.run("lock", file.path(), file.lock(request)).await
    }

    pub async fn readdir(&self, dir: &OpenDir) -> FsResult<DirEntries> {
        self.run("readdir", dir.path(), dir.readdir()).await
    }

    pub async fn fsyncdir(&self, dir: &OpenDir, datasync: bool) -> FsResult<()> {
        self.run("fsyncdir", dir.path(), dir.fsyncdir(datasync)).await
    }

    pub async fn releasedir(&self, dir: &OpenDir) -> FsResult<()> {
        self.run("releasedir", dir.path(), dir.releasedir()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::{FileHandle, FileHandleRef};
    use crate::node::Node;
    use crate::nodes::{BlobFile, DictDir, Symlink};
    use crate::types::FileKind;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    fn tree() -> Dispatcher {
        let docs = DictDir::builder()
            .entry("readme", BlobFile::new("hello"))
            .writable(true)
            .build();
        let root = DictDir::builder()
            .entry("docs", docs)
            .entry("motd", BlobFile::new("welcome\n"))
            .entry("latest", Symlink::new("docs/readme"))
            .writable(true)
            .build();
        Dispatcher::new(Arc::new(root))
    }

    #[test]
    fn test_split_parent() {
        assert_eq!(split_parent("/a/b"), Some(("/a", "b")));
        assert_eq!(split_parent("/a"), Some(("", "a")));
        assert_eq!(split_parent("a/b/"), Some(("a", "b")));
        assert_eq!(split_parent("/"), None);
        assert_eq!(split_parent(""), None);
    }

    #[tokio::test]
    async fn test_resolve_root_without_lookup() {
        let fs = tree();
        let root = fs.resolve("").await.unwrap();
        assert!(Arc::ptr_eq(&root, fs.root()));
        assert!(Arc::ptr_eq(&fs.resolve("/").await.unwrap(), fs.root()));
        assert_eq!(fs.getattr("/").await.unwrap().kind, FileKind::Directory);
    }

    #[tokio::test]
    async fn test_resolve_nested_paths() {
        let fs = tree();
        assert_eq!(fs.getattr("/docs/readme").await.unwrap().size, 5);
        assert_eq!(fs.getattr("//docs//readme").await.unwrap().size, 5);
    }

    #[tokio::test]
    async fn test_resolution_errors() {
        let fs = tree();
        assert!(matches!(fs.getattr("/nope").await, Err(FsError::NotFound)));
        assert!(matches!(fs.getattr("/docs/nope/x").await, Err(FsError::NotFound)));
        assert!(matches!(fs.getattr("/motd/x").await, Err(FsError::NotADirectory)));
    }

    #[tokio::test]
    async fn test_missing_capability_is_unsupported() {
        let fs = tree();
        assert!(matches!(fs.readlink("/motd").await, Err(FsError::Unsupported)));
        assert!(matches!(fs.chmod("/motd", 0o600).await, Err(FsError::Unsupported)));
        assert!(matches!(fs.getxattr("/motd", "user.x").await, Err(FsError::Unsupported)));
        assert!(matches!(fs.opendir("/motd").await, Err(FsError::Unsupported)));
        assert!(matches!(fs.mkdir("/", 0o755).await, Err(FsError::Unsupported)));
        assert_eq!(fs.readlink("/latest").await.unwrap(), "docs/readme");
    }

    #[tokio::test]
    async fn test_mutations_by_path() {
        let fs = tree();
        fs.mkdir("/tmp", 0o755).await.unwrap();
        fs.mknod("/tmp/a", 0o644, 0).await.unwrap();
        fs.rename("/tmp/a", "/docs/b").await.unwrap();
        assert!(matches!(fs.getattr("/tmp/a").await, Err(FsError::NotFound)));
        fs.getattr("/docs/b").await.unwrap();

        fs.link("/docs/b", "/tmp/c").await.unwrap();
        let b = fs.resolve("/docs/b").await.unwrap();
        let c = fs.resolve("/tmp/c").await.unwrap();
        assert!(Arc::ptr_eq(&b, &c));

        fs.symlink("/tmp/d", "../docs/b").await.unwrap();
        assert_eq!(fs.readlink("/tmp/d").await.unwrap(), "../docs/b");

        fs.unlink("/tmp/c").await.unwrap();
        fs.rmdir("/tmp").await.unwrap();
        assert!(matches!(fs.getattr("/tmp").await, Err(FsError::NotFound)));
    }

    #[tokio::test]
    async fn test_operations_receive_their_route() {
        let fs = tree();
        let route = fs.resolve_path("//docs//readme").await.unwrap();
        assert_eq!(route.to_string(), "/docs/readme");
        assert_eq!(route.depth(), 2);
        let docs = fs.resolve("/docs").await.unwrap();
        assert!(Arc::ptr_eq(route.parent_node().unwrap(), &docs));

        let file = fs.open("/docs/readme", OpenFlags::READ).await.unwrap();
        assert_eq!(file.path().to_string(), "/docs/readme");
        fs.release(&file).await.unwrap();

        let dir = fs.opendir("/").await.unwrap();
        assert!(dir.path().is_root());
        fs.releasedir(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_rename_into_own_subtree_is_rejected() {
        let fs = tree();
        fs.mkdir("/docs/sub", 0o755).await.unwrap();

        assert!(matches!(fs.rename("/docs", "/docs/x").await, Err(FsError::InvalidArgument)));
        assert!(matches!(fs.rename("/docs", "/docs/sub/x").await, Err(FsError::InvalidArgument)));
        fs.getattr("/docs/sub").await.unwrap();
        let root = fs.opendir("/").await.unwrap();
        let names: Vec<String> = fs.readdir(&root).await.unwrap().map(|e| e.name).collect();
        assert_eq!(names, ["docs", "motd", "latest"]);
    }

    #[tokio::test]
    async fn test_create_binds_session_to_new_node() {
        let fs = tree();
        let file = fs.create("/docs/new", 0o644, OpenFlags::READ_WRITE).await.unwrap();
        assert_eq!(fs.write(&file, b"data", 0).await.unwrap(), 4);
        assert_eq!(fs.fgetattr(&file).await.unwrap().size, 4);
        fs.release(&file).await.unwrap();

        let file = fs.open("/docs/new", OpenFlags::READ).await.unwrap();
        assert_eq!(&fs.read(&file, 10, 0).await.unwrap()[..], b"data");
        fs.release(&file).await.unwrap();
    }

    #[tokio::test]
    async fn test_plain_root_has_no_volume_operations() {
        let fs = tree();
        fs.init().await.unwrap();
        assert!(matches!(fs.statfs().await, Err(FsError::Unsupported)));
        fs.destroy().await;
    }

    #[derive(Default)]
    struct Volume {
        initialized: AtomicBool,
        destroyed: AtomicBool,
    }

    #[async_trait]
    impl Node for Volume {
        async fn getattr(&self, _path: &NodePath) -> FsResult<Stat> {
            Ok(Stat::dir(0o555))
        }

        async fn lookup(&self, _name: &str) -> FsResult<Option<NodeRef>> {
            Ok(None)
        }
    }

    #[async_trait]
    impl RootNode for Volume {
        async fn init(&self) -> FsResult<()> {
            self.initialized.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn destroy(&self) {
            self.destroyed.store(true, Ordering::SeqCst);
        }

        async fn statfs(&self) -> FsResult<StatFs> {
            Ok(StatFs {
                bsize: 4096,
                namelen: 255,
                ..Default::default()
            })
        }
    }

    #[tokio::test]
    async fn test_root_node_lifecycle() {
        let volume = Arc::new(Volume::default());
        let fs = Dispatcher::with_root_node(volume.clone()).with_config(&FsConfig {
            log_operations: false,
            ..Default::default()
        });

        fs.init().await.unwrap();
        assert!(volume.initialized.load(Ordering::SeqCst));
        assert_eq!(fs.statfs().await.unwrap().bsize, 4096);
        assert!(matches!(fs.getattr("/x").await, Err(FsError::NotFound)));

        fs.destroy().await;
        assert!(volume.destroyed.load(Ordering::SeqCst));
    }

    /// A file whose attributes can be changed, opened without any data support.
    #[derive(Default)]
    struct Stamped {
        perm: AtomicU32,
        owner: Mutex<(Option<u32>, Option<u32>)>,
        mtime: Mutex<Option<SystemTime>>,
    }

    struct Passive;

    #[async_trait]
    impl FileHandle for Passive {}

    #[async_trait]
    impl Node for Stamped {
        async fn getattr(&self, _path: &NodePath) -> FsResult<Stat> {
            let mut stat = Stat::file(self.perm.load(Ordering::SeqCst), 0);
            (stat.uid, stat.gid) = *self.owner.lock().unwrap();
            stat.mtime = *self.mtime.lock().unwrap();
            Ok(stat)
        }

        async fn chmod(&self, _path: &NodePath, mode: u32) -> FsResult<()> {
            self.perm.store(mode, Ordering::SeqCst);
            Ok(())
        }

        async fn chown(&self, _path: &NodePath, uid: Option<u32>, gid: Option<u32>) -> FsResult<()> {
            *self.owner.lock().unwrap() = (uid, gid);
            Ok(())
        }

        async fn utimens(
            &self,
            _path: &NodePath,
            _atime: SystemTime,
            mtime: SystemTime,
        ) -> FsResult<()> {
            *self.mtime.lock().unwrap() = Some(mtime);
            Ok(())
        }

        async fn open(&self, _path: &NodePath, _flags: OpenFlags) -> FsResult<FileHandleRef> {
            let handle: FileHandleRef = Arc::new(Passive);
            Ok(handle)
        }
    }

    #[tokio::test]
    async fn test_session_attribute_changes_reach_the_node() {
        let root = DictDir::builder().entry("stamped", Stamped::default()).build();
        let fs = Dispatcher::new(Arc::new(root));
        let file = fs.open("/stamped", OpenFlags::READ).await.unwrap();

        fs.fchmod(&file, 0o640).await.unwrap();
        fs.fchown(&file, Some(1000), None).await.unwrap();
        let when = SystemTime::UNIX_EPOCH + Duration::from_secs(86_400);
        fs.futimens(&file, when, when).await.unwrap();

        let stat = fs.fgetattr(&file).await.unwrap();
        assert_eq!(stat.perm, 0o640);
        assert_eq!((stat.uid, stat.gid), (Some(1000), None));
        assert_eq!(stat.mtime, Some(when));
        assert!(matches!(fs.read(&file, 1, 0).await, Err(FsError::Unsupported)));
        fs.release(&file).await.unwrap();

        let blob = fs.create("/blob", 0o644, OpenFlags::WRITE).await;
        assert!(matches!(blob, Err(FsError::PermissionDenied)));
    }
}
