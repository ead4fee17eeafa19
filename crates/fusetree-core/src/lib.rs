//! FuseTree Core — declarative, path-addressed virtual filesystems
//!
//! This crate provides the node/handle capability contract, the path
//! dispatcher, and the stock node kinds (buffered blobs, generated streams,
//! remote files, mutable directories). Kernel transports such as the FUSE host
//! drive a [`Dispatcher`] and keep open sessions in a [`HandleTable`].

pub mod config;
pub mod dispatch;
pub mod error;
pub mod handle;
pub mod node;
pub mod nodes;
pub mod table;
pub mod types;

// Re-export key types for convenience
pub use config::{CachePolicy, FsConfig};
pub use dispatch::Dispatcher;
pub use error::{FsError, FsResult};
pub use handle::{DirEntries, DirHandle, DirHandleRef, FileHandle, FileHandleRef, OpenDir, OpenFile};
pub use node::{Node, NodeRef, RootNode};
pub use table::HandleTable;
pub use types::*;
