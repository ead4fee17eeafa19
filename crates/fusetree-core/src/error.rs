//! Error types for FuseTree Core

use std::io;

/// Core filesystem error type
#[derive(thiserror::Error, Debug)]
pub enum FsError {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    #[error("permission denied")]
    PermissionDenied,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("not a directory")]
    NotADirectory,
    #[error("unsupported")]
    Unsupported,
    #[error("bad handle")]
    BadHandle,
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl FsError {
    /// POSIX error code reported to the kernel for this error.
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotFound => libc::ENOENT,
            FsError::AlreadyExists => libc::EEXIST,
            FsError::PermissionDenied => libc::EPERM,
            FsError::InvalidArgument => libc::EINVAL,
            FsError::NotADirectory => libc::ENOTDIR,
            FsError::Unsupported => libc::ENOSYS,
            FsError::BadHandle => libc::EBADF,
            FsError::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
        }
    }

    /// Wrap a foreign error (network, storage) as an I/O failure.
    pub fn io<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        FsError::Io(io::Error::new(io::ErrorKind::Other, err))
    }
}

pub type FsResult<T> = Result<T, FsError>;
