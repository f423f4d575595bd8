//! Error types that can be emitted from this library

use miette::Diagnostic;
use thiserror::Error;

/// Error type for library
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    /// Transparent warpper for [`sab_core::error::Error`]
    #[error(transparent)]
    #[diagnostic(transparent)]
    Core(#[from] sab_core::error::Error),

    /// Transparent warpper for [`std::io::Error`]
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    /// Transparent warpper for [`binrw::Error`]
    #[error(transparent)]
    BinRWError(#[from] binrw::Error),

    /// Transparent warpper for [`glob::PatternError`]
    #[error(transparent)]
    PatternError(#[from] glob::PatternError),

    /// a tile pack declares no metadata
    #[error("expected metadata, found size {0}")]
    MissingMetadata(i32),

    /// a tile pack is neither a height pack nor a plain tile pack
    #[error("unknown pack type with metadata size {0:#x}")]
    UnknownPackType(i32),

    /// a map or table required for extraction could not be located
    #[error("unable to find {0}")]
    ResourceNotFound(String),

    /// {0}
    #[error("{0}")]
    CustomError(String),
}

/// Generic result type with crate's Error as its error variant
pub type Result<T> = core::result::Result<T, Error>;
