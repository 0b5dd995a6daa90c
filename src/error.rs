use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, JesdError>;

/// Outcome of a failed read against a link-layer device.
///
/// Parsing never throws away what it already extracted: a degraded status
/// block or a short lane list is returned as data, not as an error. The
/// variants here are what is left over when nothing useful could be read.
#[derive(Debug, Error)]
pub enum JesdError {
    /// Device, attribute or lane file does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Read/write/open failure other than not-found. The OS error is kept.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    /// The record ended before the dialect schema expected it to.
    #[error("incomplete record: {0}")]
    FormatIncomplete(String),
    /// The backend has no working implementation in this build.
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),
    /// A device identifier that none of the backends can resolve.
    #[error("invalid device identifier: {0}")]
    InvalidDevice(String),
    /// Enumeration finished without a single usable device.
    #[error("no JESD204 devices found")]
    NoDevices,
}

impl JesdError {
    /// Wraps an `io::Error` for `path`, folding `ErrorKind::NotFound` into
    /// [`JesdError::NotFound`].
    pub fn io(path: impl Into<String>, source: io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path),
            _ => Self::Io { path, source },
        }
    }

    /// Builds an error from a negative errno style return code.
    pub fn from_errno(path: impl Into<String>, code: i32) -> Self {
        Self::io(path, io::Error::from_raw_os_error(code.abs()))
    }

    /// The OS error number behind this error, if there is one.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Io { source, .. } => source.raw_os_error(),
            Self::NotFound(_) => Some(libc::ENOENT),
            Self::Unsupported(_) => Some(libc::ENOSYS),
            _ => None,
        }
    }

    /// Negative errno style code, the way the C tooling reports failures.
    pub fn errno(&self) -> i32 {
        match self {
            Self::FormatIncomplete(_) => -libc::EIO,
            Self::InvalidDevice(_) => -libc::EINVAL,
            Self::NoDevices => -libc::ENODEV,
            _ => -self.raw_os_error().unwrap_or(libc::EIO),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// True when the failure looks like missing privileges (not running as root).
    pub fn is_permission_denied(&self) -> bool {
        matches!(
            self.raw_os_error(),
            Some(libc::EACCES) | Some(libc::EPERM) | Some(libc::ECHILD)
        )
    }
}
