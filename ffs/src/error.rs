//! The single error enum surfaced by every public entry point (spec §7).

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FfsError {
    #[error("flash I/O operation failed")]
    Io,
    #[error("on-disk record failed magic/ECC validation")]
    Corrupt,
    #[error("path does not name an existing object")]
    NotFound,
    #[error("an object with that name already exists")]
    Exists,
    #[error("path component is not a directory")]
    NotADirectory,
    #[error("operation is not valid on a directory")]
    IsADirectory,
    #[error("malformed input (oversize filename, bad area descriptor, ...)")]
    Invalid,
    #[error("a fixed-capacity pool or table is exhausted")]
    OutOfResources,
    #[error("no area has enough free space, even after garbage collection")]
    NotEnoughSpace,
    #[error("an internal invariant was violated")]
    Unexpected,
}

/// Any [`crate::medium::FlashMedium`] error maps to [`FfsError::Io`] via
/// [`crate::medium::map_err`]; the Core never needs to know what went wrong
/// at the hardware level, only that the operation failed.
