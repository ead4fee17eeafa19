//! Concrete node kinds.

mod base;
mod blob;
mod dict_dir;
mod generator;
mod remote;

pub use base::{BaseDir, BaseFile, Symlink};
pub use blob::{BlobFile, BlobHandle, BlobStorage, MemoryStorage};
pub use dict_dir::{DictDir, DictDirBuilder, DictDirHandle};
pub use generator::{ChunkCursor, Chunks, GeneratorFile, GeneratorHandle};
pub use remote::{ByteStream, Fetcher, HttpFetcher, RemoteFile, RemoteHandle};
