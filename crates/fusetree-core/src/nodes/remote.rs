//! Files streamed from a network resource.
//!
//! Unlike [`BlobFile`](super::BlobFile), every open gets its own connection;
//! nothing is shared or cached between sessions.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{FsError, FsResult};
use crate::handle::{FileHandle, FileHandleRef};
use crate::node::Node;
use crate::nodes::base::DEFAULT_MODE;
use crate::types::{NodePath, OpenFlags, Stat};

/// An open, readable byte stream.
#[async_trait]
pub trait ByteStream: Send {
    /// Read at most `size` bytes. An empty result means end of stream.
    async fn read(&mut self, size: usize) -> FsResult<Bytes>;

    async fn close(&mut self) -> FsResult<()> {
        Ok(())
    }
}

/// Opens byte streams for URLs.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> FsResult<Box<dyn ByteStream>>;
}

/// [`Fetcher`] over HTTP(S) using `reqwest`.
#[derive(Clone, Debug, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> FsResult<Box<dyn ByteStream>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(FsError::io)?;
        debug!(url, status = %response.status(), "remote stream opened");

        let stream: Box<dyn ByteStream> = Box::new(HttpStream {
            response: Some(response),
            pending: Bytes::new(),
        });
        Ok(stream)
    }
}

struct HttpStream {
    response: Option<reqwest::Response>,
    pending: Bytes,
}

#[async_trait]
impl ByteStream for HttpStream {
    async fn read(&mut self, size: usize) -> FsResult<Bytes> {
        if self.pending.is_empty() {
            let Some(response) = self.response.as_mut() else {
                return Ok(Bytes::new());
            };
            let next = response.chunk().await.map_err(FsError::io)?;
            match next {
                Some(chunk) => self.pending = chunk,
                None => {
                    self.response = None;
                    return Ok(Bytes::new());
                }
            }
        }

        let n = size.min(self.pending.len());
        Ok(self.pending.split_to(n))
    }

    async fn close(&mut self) -> FsResult<()> {
        self.response = None;
        self.pending.clear();
        Ok(())
    }
}

/// A read-only file whose content is fetched from a URL on every open.
pub struct RemoteFile {
    url: String,
    mode: u32,
    fetcher: Arc<dyn Fetcher>,
}

impl RemoteFile {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_fetcher(url, Arc::new(HttpFetcher::default()))
    }

    pub fn with_fetcher(url: impl Into<String>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            url: url.into(),
            mode: DEFAULT_MODE,
            fetcher,
        }
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode & 0o777;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Node for RemoteFile {
    async fn getattr(&self, _path: &NodePath) -> FsResult<Stat> {
        Ok(Stat::file(self.mode, 0))
    }

    async fn open(&self, path: &NodePath, _flags: OpenFlags) -> FsResult<FileHandleRef> {
        let stream = self.fetcher.fetch(&self.url).await?;
        debug!(%path, url = %self.url, "remote file opened");
        let handle: FileHandleRef = Arc::new(RemoteHandle {
            stream: Mutex::new(Some(stream)),
        });
        Ok(handle)
    }
}

/// One connection to a [`RemoteFile`]'s resource.
pub struct RemoteHandle {
    stream: Mutex<Option<Box<dyn ByteStream>>>,
}

#[async_trait]
impl FileHandle for RemoteHandle {
    fn direct_io(&self) -> bool {
        true
    }

    async fn read(&self, _path: &NodePath, size: u32, _offset: u64) -> FsResult<Bytes> {
        let mut stream = self.stream.lock().await;
        let stream = stream.as_mut().ok_or(FsError::BadHandle)?;
        stream.read(size as usize).await
    }

    async fn release(&self, _path: &NodePath) -> FsResult<()> {
        match self.stream.lock().await.take() {
            Some(mut stream) => stream.close().await,
            None => Ok(()),
        }
    }
}
