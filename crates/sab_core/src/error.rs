//! Error types that can be emitted from this library

use miette::Diagnostic;
use thiserror::Error;

use crate::fourcc::FourCC;

/// Error type for library
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    /// Transparent warpper for [`std::io::Error`]
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    /// Transparent warpper for [`binrw::Error`]
    #[error(transparent)]
    BinRWError(#[from] binrw::Error),

    /// the stream does not start with the expected magic
    #[error("invalid header {}", FourCC(*.0))]
    #[diagnostic(help("neither the magic nor its byte-swapped form matched"))]
    InvalidHeader(u32),

    /// a reserved or enumerated field held a value the layout does not allow
    #[error("unexpected value {value:#x} in {field}")]
    UnexpectedValue {
        /// Name of the offending field
        field: &'static str,
        /// Raw value read from the stream
        value: u64,
    },

    /// a boolean byte was neither 0 nor 1
    #[error("invalid boolean byte {0:#x}")]
    InvalidBool(u8),

    /// the inflate library rejected the payload
    #[error("decompression failed: {0}")]
    Decompression(String),

    /// a segment chunk declared the reserved offset 0
    #[error("segment chunk {0} has no offset")]
    InvalidSegmentOffset(usize),

    /// a name read from the stream does not hash to the id stored next to it
    #[error("name {name:?} does not hash to {id:#010X}")]
    HashMismatch {
        /// Id stored in the stream
        id: u32,
        /// Name stored in the stream
        name: String,
    },

    /// a hash is already bound to a different name
    #[error("hash {id:#010X} is bound to {existing:?}, refusing {name:?}")]
    HashCollision {
        /// Colliding hash
        id: u32,
        /// Name already bound to the hash
        existing: String,
        /// Name that was refused
        name: String,
    },

    /// a tag-delimited container held a block tag no decoder handles
    #[error("undefined block type {}", FourCC(*.0))]
    UnknownBlock(u32),

    /// {0}
    #[error("{0}")]
    CustomError(String),
}

/// Generic result type with crate's Error as its error variant
pub type Result<T> = core::result::Result<T, Error>;
