//! FuseTree FUSE adapter implementation
//!
//! Maps inode-based FUSE operations onto the path-based dispatcher. Inode
//! numbers are assigned on first sight of a path and kept for the lifetime of
//! the mount; open sessions live in a [`HandleTable`].

#[cfg(not(feature = "fuse"))]
compile_error!("This module requires the 'fuse' feature to be enabled");

use fusetree_core::{
    Dispatcher, FileKind, FsConfig, FsError, FsResult, HandleTable, LockRequest, OpenDir, OpenFile,
    OpenFlags, Stat,
};
use fuser::consts::{FOPEN_DIRECT_IO, FOPEN_NONSEEKABLE};
use fuser::{
    FileAttr, FileType, ReplyAttr, ReplyBmap, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, ReplyXattr, Request, TimeOrNow, FUSE_ROOT_ID,
};
use libc::{c_int, EINVAL, ENOENT, ERANGE};
use nix::unistd::{getgid, getuid};
use std::collections::HashMap;
use std::ffi::OsStr;
use std::future::Future;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

/// One cached `readdir` row.
struct Listing {
    ino: u64,
    kind: FileType,
    name: String,
}

/// FuseTree FUSE filesystem adapter
pub struct FuseTree {
    dispatcher: Dispatcher,
    handles: HandleTable,
    runtime: Handle,
    /// inode -> absolute path
    paths: HashMap<u64, String>,
    /// absolute path -> inode
    inodes: HashMap<String, u64>,
    next_ino: u64,
    /// Directory listings, captured on the first `readdir` of each handle
    listings: HashMap<u64, Vec<Listing>>,
    attr_ttl: Duration,
    entry_ttl: Duration,
    uid: u32,
    gid: u32,
    mounted_at: SystemTime,
}

fn file_type(kind: FileKind) -> FileType {
    match kind {
        FileKind::File => FileType::RegularFile,
        FileKind::Directory => FileType::Directory,
        FileKind::Symlink => FileType::Symlink,
    }
}

fn time_or_now(time: Option<TimeOrNow>) -> SystemTime {
    match time {
        Some(TimeOrNow::SpecificTime(t)) => t,
        Some(TimeOrNow::Now) | None => SystemTime::now(),
    }
}

fn join(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

impl FuseTree {
    /// Create a new FUSE adapter serving `dispatcher` on the given runtime
    pub fn new(dispatcher: Dispatcher, config: &FsConfig, runtime: Handle) -> Self {
        let mut paths = HashMap::new();
        let mut inodes = HashMap::new();
        paths.insert(FUSE_ROOT_ID, "/".to_string());
        inodes.insert("/".to_string(), FUSE_ROOT_ID);

        Self {
            dispatcher,
            handles: HandleTable::new(),
            runtime,
            paths,
            inodes,
            next_ino: FUSE_ROOT_ID + 1,
            listings: HashMap::new(),
            attr_ttl: Duration::from_millis(config.cache.attr_ttl_ms.into()),
            entry_ttl: Duration::from_millis(config.cache.entry_ttl_ms.into()),
            uid: getuid().as_raw(),
            gid: getgid().as_raw(),
            mounted_at: SystemTime::now(),
        }
    }

    fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.runtime.block_on(fut)
    }

    fn path(&self, ino: u64) -> Result<String, c_int> {
        self.paths.get(&ino).cloned().ok_or(ENOENT)
    }

    fn child_path(&self, parent: u64, name: &OsStr) -> Result<String, c_int> {
        let parent = self.path(parent)?;
        let name = name.to_str().ok_or(EINVAL)?;
        Ok(join(&parent, name))
    }

    /// Inode for `path`, allocating one on first use.
    fn ino_for(&mut self, path: &str) -> u64 {
        if let Some(&ino) = self.inodes.get(path) {
            return ino;
        }
        let ino = self.next_ino;
        self.next_ino += 1;
        self.inodes.insert(path.to_string(), ino);
        self.paths.insert(ino, path.to_string());
        ino
    }

    fn forget_path(&mut self, path: &str) {
        if let Some(ino) = self.inodes.remove(path) {
            self.paths.remove(&ino);
        }
    }

    /// Re-point every inode at or below `from` to the same place under `to`.
    fn move_paths(&mut self, from: &str, to: &str) {
        self.forget_path(to);
        let prefix = format!("{from}/");
        let moved: Vec<(u64, String)> = self
            .paths
            .iter()
            .filter(|(_, path)| path.as_str() == from || path.starts_with(&prefix))
            .map(|(&ino, path)| (ino, format!("{to}{}", &path[from.len()..])))
            .collect();

        for (ino, path) in moved {
            if let Some(old) = self.paths.insert(ino, path.clone()) {
                self.inodes.remove(&old);
            }
            self.inodes.insert(path, ino);
        }
    }

    fn attr_to_fuse(&self, stat: &Stat, ino: u64) -> FileAttr {
        let kind = file_type(stat.kind);
        let nlink = stat
            .nlink
            .unwrap_or(if kind == FileType::Directory { 2 } else { 1 });
        let mtime = stat.mtime.unwrap_or(self.mounted_at);

        FileAttr {
            ino,
            size: stat.size,
            blocks: stat.size.div_ceil(512),
            atime: stat.atime.unwrap_or(mtime),
            mtime,
            ctime: stat.ctime.unwrap_or(mtime),
            crtime: self.mounted_at,
            kind,
            perm: stat.perm as u16,
            nlink,
            uid: stat.uid.unwrap_or(self.uid),
            gid: stat.gid.unwrap_or(self.gid),
            rdev: 0,
            blksize: 512,
            flags: 0,
        }
    }

    /// Attributes of `path`, registering its inode.
    fn entry(&mut self, path: &str) -> FsResult<FileAttr> {
        let stat = self.block_on(self.dispatcher.getattr(path))?;
        let ino = self.ino_for(path);
        Ok(self.attr_to_fuse(&stat, ino))
    }

    fn reply_entry(&mut self, path: &str, reply: ReplyEntry) {
        match self.entry(path) {
            Ok(attr) => reply.entry(&self.entry_ttl, &attr, 0),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn open_flags(file: &OpenFile) -> u32 {
        let mut flags = 0;
        if file.direct_io() {
            flags |= FOPEN_DIRECT_IO;
        }
        if file.nonseekable() {
            flags |= FOPEN_NONSEEKABLE;
        }
        flags
    }

    fn listing(&mut self, ino: u64, dir: &OpenDir) -> FsResult<Vec<Listing>> {
        let path = self.path(ino).map_err(|_| FsError::NotFound)?;
        let parent_ino = match path.rfind('/') {
            Some(0) | None => FUSE_ROOT_ID,
            Some(i) => self.ino_for(&path[..i]),
        };

        let mut rows = vec![
            Listing {
                ino,
                kind: FileType::Directory,
                name: ".".to_string(),
            },
            Listing {
                ino: parent_ino,
                kind: FileType::Directory,
                name: "..".to_string(),
            },
        ];

        let entries = self.block_on(self.dispatcher.readdir(dir))?;
        for entry in entries {
            let child = join(&path, &entry.name);
            let stat = match entry.attr {
                Some(stat) => stat,
                None => match self.block_on(self.dispatcher.getattr(&child)) {
                    Ok(stat) => stat,
                    Err(e) => {
                        debug!(path = %child, error = %e, "skipping unreadable entry");
                        continue;
                    }
                },
            };
            rows.push(Listing {
                ino: self.ino_for(&child),
                kind: file_type(stat.kind),
                name: entry.name,
            });
        }
        Ok(rows)
    }

    fn setattr_inner(
        &mut self,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        fh: Option<u64>,
    ) -> FsResult<FileAttr> {
        let path = self.path(ino).map_err(|_| FsError::NotFound)?;
        let file = fh.map(|fh| self.handles.file(fh)).transpose()?;

        let stat = self.block_on(async {
            let fs = &self.dispatcher;
            if let Some(mode) = mode {
                match &file {
                    Some(file) => fs.fchmod(file, mode).await?,
                    None => fs.chmod(&path, mode).await?,
                }
            }
            if uid.is_some() || gid.is_some() {
                match &file {
                    Some(file) => fs.fchown(file, uid, gid).await?,
                    None => fs.chown(&path, uid, gid).await?,
                }
            }
            if let Some(size) = size {
                match &file {
                    Some(file) => fs.ftruncate(file, size).await?,
                    None => fs.truncate(&path, size).await?,
                }
            }
            if atime.is_some() || mtime.is_some() {
                let (atime, mtime) = (time_or_now(atime), time_or_now(mtime));
                match &file {
                    Some(file) => fs.futimens(file, atime, mtime).await?,
                    None => fs.utimens(&path, atime, mtime).await?,
                }
            }
            match &file {
                Some(file) => fs.fgetattr(file).await,
                None => fs.getattr(&path).await,
            }
        })?;

        Ok(self.attr_to_fuse(&stat, ino))
    }
}

impl fuser::Filesystem for FuseTree {
    fn init(&mut self, _req: &Request, _config: &mut fuser::KernelConfig) -> Result<(), c_int> {
        self.block_on(self.dispatcher.init()).map_err(|e| e.errno())?;
        info!("FuseTree FUSE adapter initialized");
        Ok(())
    }

    fn destroy(&mut self) {
        self.block_on(self.dispatcher.destroy());
        if !self.handles.is_empty() {
            warn!(open = self.handles.len(), "unmounted with open handles");
        }
        info!("FuseTree FUSE adapter destroyed");
    }

    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        match self.child_path(parent, name) {
            Ok(path) => self.reply_entry(&path, reply),
            Err(errno) => reply.error(errno),
        }
    }

    fn getattr(&mut self, _req: &Request, ino: u64, fh: Option<u64>, reply: ReplyAttr) {
        let result = match fh.map(|fh| self.handles.file(fh)) {
            Some(Ok(file)) => self.block_on(self.dispatcher.fgetattr(&file)),
            // Directory handles and stale ids fall back to the path.
            Some(Err(_)) | None => match self.path(ino) {
                Ok(path) => self.block_on(self.dispatcher.getattr(&path)),
                Err(errno) => return reply.error(errno),
            },
        };

        match result {
            Ok(stat) => reply.attr(&self.attr_ttl, &self.attr_to_fuse(&stat, ino)),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        match self.setattr_inner(ino, mode, uid, gid, size, atime, mtime, fh) {
            Ok(attr) => reply.attr(&self.attr_ttl, &attr),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn readlink(&mut self, _req: &Request, ino: u64, reply: ReplyData) {
        let path = match self.path(ino) {
            Ok(p) => p,
            Err(errno) => return reply.error(errno),
        };
        match self.block_on(self.dispatcher.readlink(&path)) {
            Ok(target) => reply.data(target.as_bytes()),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn mknod(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        rdev: u32,
        reply: ReplyEntry,
    ) {
        let path = match self.child_path(parent, name) {
            Ok(p) => p,
            Err(errno) => return reply.error(errno),
        };
        match self.block_on(self.dispatcher.mknod(&path, mode, rdev.into())) {
            Ok(_) => self.reply_entry(&path, reply),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let path = match self.child_path(parent, name) {
            Ok(p) => p,
            Err(errno) => return reply.error(errno),
        };
        match self.block_on(self.dispatcher.mkdir(&path, mode)) {
            Ok(_) => self.reply_entry(&path, reply),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn unlink(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let path = match self.child_path(parent, name) {
            Ok(p) => p,
            Err(errno) => return reply.error(errno),
        };
        match self.block_on(self.dispatcher.unlink(&path)) {
            Ok(()) => {
                self.forget_path(&path);
                reply.ok();
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn rmdir(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let path = match self.child_path(parent, name) {
            Ok(p) => p,
            Err(errno) => return reply.error(errno),
        };
        match self.block_on(self.dispatcher.rmdir(&path)) {
            Ok(()) => {
                self.forget_path(&path);
                reply.ok();
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn symlink(
        &mut self,
        _req: &Request,
        parent: u64,
        link_name: &OsStr,
        target: &Path,
        reply: ReplyEntry,
    ) {
        let path = match self.child_path(parent, link_name) {
            Ok(p) => p,
            Err(errno) => return reply.error(errno),
        };
        let target = target.to_string_lossy();
        match self.block_on(self.dispatcher.symlink(&path, &target)) {
            Ok(_) => self.reply_entry(&path, reply),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn rename(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let paths = self
            .child_path(parent, name)
            .and_then(|from| Ok((from, self.child_path(newparent, newname)?)));
        let (from, to) = match paths {
            Ok(p) => p,
            Err(errno) => return reply.error(errno),
        };
        match self.block_on(self.dispatcher.rename(&from, &to)) {
            Ok(()) => {
                self.move_paths(&from, &to);
                reply.ok();
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn link(
        &mut self,
        _req: &Request,
        ino: u64,
        newparent: u64,
        newname: &OsStr,
        reply: ReplyEntry,
    ) {
        let paths = self
            .path(ino)
            .and_then(|target| Ok((target, self.child_path(newparent, newname)?)));
        let (target, path) = match paths {
            Ok(p) => p,
            Err(errno) => return reply.error(errno),
        };
        match self.block_on(self.dispatcher.link(&target, &path)) {
            Ok(_) => self.reply_entry(&path, reply),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn open(&mut self, _req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
        let path = match self.path(ino) {
            Ok(p) => p,
            Err(errno) => return reply.error(errno),
        };
        match self.block_on(self.dispatcher.open(&path, OpenFlags(flags))) {
            Ok(file) => {
                let open_flags = Self::open_flags(&file);
                let fh = self.handles.insert_file(file);
                reply.opened(fh, open_flags);
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn create(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        let path = match self.child_path(parent, name) {
            Ok(p) => p,
            Err(errno) => return reply.error(errno),
        };

        let result = self.block_on(async {
            let file = self.dispatcher.create(&path, mode, OpenFlags(flags)).await?;
            let stat = self.dispatcher.fgetattr(&file).await;
            Ok::<_, FsError>((file, stat))
        });

        match result {
            Ok((file, Ok(stat))) => {
                let ino = self.ino_for(&path);
                let attr = self.attr_to_fuse(&stat, ino);
                let open_flags = Self::open_flags(&file);
                let fh = self.handles.insert_file(file);
                reply.created(&self.entry_ttl, &attr, 0, fh, open_flags);
            }
            Ok((file, Err(e))) => {
                // The kernel never sees this session, so close it here.
                if let Err(release_err) = self.block_on(self.dispatcher.release(&file)) {
                    debug!(path = %path, error = %release_err, "release after failed create");
                }
                reply.error(e.errno());
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn read(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let result = self
            .handles
            .file(fh)
            .and_then(|file| self.block_on(self.dispatcher.read(&file, size, offset as u64)));
        match result {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn write(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let result = self
            .handles
            .file(fh)
            .and_then(|file| self.block_on(self.dispatcher.write(&file, data, offset as u64)));
        match result {
            Ok(written) => reply.written(written),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn flush(&mut self, _req: &Request, _ino: u64, fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        let result = self
            .handles
            .file(fh)
            .and_then(|file| self.block_on(self.dispatcher.flush(&file)));
        match result {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn release(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        let result = self
            .handles
            .remove_file(fh)
            .and_then(|file| self.block_on(self.dispatcher.release(&file)));
        match result {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn fsync(&mut self, _req: &Request, _ino: u64, fh: u64, datasync: bool, reply: ReplyEmpty) {
        let result = self
            .handles
            .file(fh)
            .and_then(|file| self.block_on(self.dispatcher.fsync(&file, datasync)));
        match result {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn setlk(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        _lock_owner: u64,
        start: u64,
        end: u64,
        typ: i32,
        pid: u32,
        sleep: bool,
        reply: ReplyEmpty,
    ) {
        let request = LockRequest {
            cmd: if sleep { libc::F_SETLKW } else { libc::F_SETLK },
            typ,
            start,
            end,
            pid,
        };
        let result = self
            .handles
            .file(fh)
            .and_then(|file| self.block_on(self.dispatcher.lock(&file, request)));
        match result {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn opendir(&mut self, _req: &Request, ino: u64, _flags: i32, reply: ReplyOpen) {
        let path = match self.path(ino) {
            Ok(p) => p,
            Err(errno) => return reply.error(errno),
        };
        match self.block_on(self.dispatcher.opendir(&path)) {
            Ok(dir) => {
                let fh = self.handles.insert_dir(dir);
                reply.opened(fh, 0);
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        if !self.listings.contains_key(&fh) {
            let rows = self
                .handles
                .dir(fh)
                .and_then(|dir| self.listing(ino, &dir));
            match rows {
                Ok(rows) => {
                    self.listings.insert(fh, rows);
                }
                Err(e) => return reply.error(e.errno()),
            }
        }

        if let Some(rows) = self.listings.get(&fh) {
            for (i, row) in rows.iter().enumerate().skip(offset as usize) {
                if reply.add(row.ino, (i + 1) as i64, row.kind, &row.name) {
                    break;
                }
            }
        }
        reply.ok();
    }

    fn fsyncdir(&mut self, _req: &Request, _ino: u64, fh: u64, datasync: bool, reply: ReplyEmpty) {
        let result = self
            .handles
            .dir(fh)
            .and_then(|dir| self.block_on(self.dispatcher.fsyncdir(&dir, datasync)));
        match result {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn releasedir(&mut self, _req: &Request, _ino: u64, fh: u64, _flags: i32, reply: ReplyEmpty) {
        self.listings.remove(&fh);
        let result = self
            .handles
            .remove_dir(fh)
            .and_then(|dir| self.block_on(self.dispatcher.releasedir(&dir)));
        match result {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn statfs(&mut self, _req: &Request, _ino: u64, reply: ReplyStatfs) {
        match self.block_on(self.dispatcher.statfs()) {
            Ok(st) => reply.statfs(
                st.blocks, st.bfree, st.bavail, st.files, st.ffree, st.bsize, st.namelen, st.frsize,
            ),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn setxattr(
        &mut self,
        _req: &Request,
        ino: u64,
        name: &OsStr,
        value: &[u8],
        flags: i32,
        _position: u32,
        reply: ReplyEmpty,
    ) {
        let (path, name) = match self.path(ino).and_then(|p| Ok((p, name.to_str().ok_or(EINVAL)?))) {
            Ok(v) => v,
            Err(errno) => return reply.error(errno),
        };
        match self.block_on(self.dispatcher.setxattr(&path, name, value, flags)) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn getxattr(&mut self, _req: &Request, ino: u64, name: &OsStr, size: u32, reply: ReplyXattr) {
        let (path, name) = match self.path(ino).and_then(|p| Ok((p, name.to_str().ok_or(EINVAL)?))) {
            Ok(v) => v,
            Err(errno) => return reply.error(errno),
        };
        match self.block_on(self.dispatcher.getxattr(&path, name)) {
            Ok(value) if size == 0 => reply.size(value.len() as u32),
            Ok(value) if value.len() > size as usize => reply.error(ERANGE),
            Ok(value) => reply.data(&value),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn listxattr(&mut self, _req: &Request, ino: u64, size: u32, reply: ReplyXattr) {
        let path = match self.path(ino) {
            Ok(p) => p,
            Err(errno) => return reply.error(errno),
        };
        match self.block_on(self.dispatcher.listxattr(&path)) {
            Ok(names) => {
                let mut buffer = Vec::new();
                for name in names {
                    buffer.extend_from_slice(name.as_bytes());
                    buffer.push(0);
                }
                if size == 0 {
                    reply.size(buffer.len() as u32);
                } else if buffer.len() > size as usize {
                    reply.error(ERANGE);
                } else {
                    reply.data(&buffer);
                }
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn removexattr(&mut self, _req: &Request, ino: u64, name: &OsStr, reply: ReplyEmpty) {
        let (path, name) = match self.path(ino).and_then(|p| Ok((p, name.to_str().ok_or(EINVAL)?))) {
            Ok(v) => v,
            Err(errno) => return reply.error(errno),
        };
        match self.block_on(self.dispatcher.removexattr(&path, name)) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn access(&mut self, _req: &Request, ino: u64, mask: i32, reply: ReplyEmpty) {
        let path = match self.path(ino) {
            Ok(p) => p,
            Err(errno) => return reply.error(errno),
        };
        match self.block_on(self.dispatcher.access(&path, mask)) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn bmap(&mut self, _req: &Request, ino: u64, blocksize: u32, idx: u64, reply: ReplyBmap) {
        let path = match self.path(ino) {
            Ok(p) => p,
            Err(errno) => return reply.error(errno),
        };
        match self.block_on(self.dispatcher.bmap(&path, blocksize, idx)) {
            Ok(block) => reply.bmap(block),
            Err(e) => reply.error(e.errno()),
        }
    }
}
