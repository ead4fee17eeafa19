//! Lazily streamed, non-seekable files.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{FsError, FsResult};
use crate::handle::{FileHandle, FileHandleRef};
use crate::node::Node;
use crate::nodes::base::DEFAULT_MODE;
use crate::types::{NodePath, OpenFlags, Stat};

/// A forward-only sequence of byte chunks.
pub type Chunks = Box<dyn Iterator<Item = Bytes> + Send>;

type Producer = Arc<dyn Fn() -> Chunks + Send + Sync>;

/// Read position inside a chunk sequence.
///
/// Keeps the unread tail of the current chunk between reads. Once the
/// sequence runs dry the cursor stays exhausted; it never rewinds.
pub struct ChunkCursor {
    chunks: Chunks,
    current: Bytes,
    exhausted: bool,
}

impl ChunkCursor {
    pub fn new(chunks: Chunks) -> Self {
        Self {
            chunks,
            current: Bytes::new(),
            exhausted: false,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Collect up to `size` bytes. Stops early at end of stream, or as soon as
    /// `min_read_len` bytes are available when that threshold is set.
    pub fn read(&mut self, size: usize, min_read_len: Option<usize>) -> Bytes {
        let mut out = BytesMut::with_capacity(size.min(64 * 1024));

        while out.len() < size && !self.exhausted {
            if self.current.is_empty() {
                match self.chunks.next() {
                    Some(chunk) => self.current = chunk,
                    None => self.exhausted = true,
                }
            } else {
                let n = (size - out.len()).min(self.current.len());
                out.extend_from_slice(&self.current.split_to(n));
            }

            if matches!(min_read_len, Some(min) if min > 0 && out.len() >= min) {
                break;
            }
        }

        out.freeze()
    }
}

/// A read-only file whose content is produced on demand.
///
/// Every open re-invokes the producer, so each session streams the content
/// from the beginning.
pub struct GeneratorFile {
    producer: Producer,
    mode: u32,
    min_read_len: Option<usize>,
}

impl GeneratorFile {
    pub fn new<F, I>(factory: F) -> Self
    where
        F: Fn() -> I + Send + Sync + 'static,
        I: IntoIterator,
        I::IntoIter: Send + 'static,
        I::Item: Into<Bytes> + 'static,
    {
        let producer: Producer = Arc::new(move || -> Chunks {
            Box::new(factory().into_iter().map(Into::<Bytes>::into))
        });
        Self {
            producer,
            mode: DEFAULT_MODE,
            min_read_len: None,
        }
    }

    /// A generator over a fixed list of chunks.
    pub fn from_chunks<T>(chunks: Vec<T>) -> Self
    where
        T: Into<Bytes> + Clone + Send + Sync + 'static,
    {
        Self::new(move || chunks.clone())
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode & 0o777;
        self
    }

    /// Return from a read as soon as this many bytes have been gathered.
    pub fn with_min_read_len(mut self, min_read_len: usize) -> Self {
        self.min_read_len = Some(min_read_len);
        self
    }
}

impl fmt::Debug for GeneratorFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratorFile")
            .field("mode", &self.mode)
            .field("min_read_len", &self.min_read_len)
            .finish()
    }
}

#[async_trait]
impl Node for GeneratorFile {
    async fn getattr(&self, _path: &NodePath) -> FsResult<Stat> {
        Ok(Stat::file(self.mode, 0))
    }

    async fn open(&self, _path: &NodePath, _flags: OpenFlags) -> FsResult<FileHandleRef> {
        let chunks = (self.producer)();
        let handle: FileHandleRef = Arc::new(GeneratorHandle {
            state: Mutex::new(Some(StreamState {
                cursor: ChunkCursor::new(chunks),
                position: 0,
            })),
            min_read_len: self.min_read_len,
        });
        Ok(handle)
    }
}

struct StreamState {
    cursor: ChunkCursor,
    position: u64,
}

/// One streaming session over a [`GeneratorFile`].
pub struct GeneratorHandle {
    state: Mutex<Option<StreamState>>,
    min_read_len: Option<usize>,
}

#[async_trait]
impl FileHandle for GeneratorHandle {
    fn direct_io(&self) -> bool {
        true
    }

    fn nonseekable(&self) -> bool {
        true
    }

    async fn read(&self, path: &NodePath, size: u32, offset: u64) -> FsResult<Bytes> {
        let mut state = self.state.lock().await;
        let state = state.as_mut().ok_or(FsError::BadHandle)?;

        if offset != state.position {
            debug!(%path, offset, position = state.position, "non-sequential read on stream");
        }

        let data = state.cursor.read(size as usize, self.min_read_len);
        state.position += data.len() as u64;
        Ok(data)
    }

    async fn release(&self, _path: &NodePath) -> FsResult<()> {
        self.state.lock().await.take();
        Ok(())
    }
}
