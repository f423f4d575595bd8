//! Error types that can be emitted from this library

use miette::Diagnostic;
use sab_core::FourCC;
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

    /// Transparent warpper for [`serde_json::Error`]
    #[error(transparent)]
    JsonError(#[from] serde_json::Error),

    /// a texture uses a pixel format without a DDS counterpart
    #[error("unknown texture format {}", FourCC(*.0))]
    UnknownTextureFormat(u32),

    /// a texture holds nothing past its magic
    #[error("texture is empty")]
    #[diagnostic(help("streamed textures keep their data in the pack that references them"))]
    EmptyTexture,

    /// an index stored in a record points past the table it refers to
    #[error("{field} index {index} is out of range, table holds {len} entries")]
    IndexOutOfRange {
        /// Name of the indexing field
        field: &'static str,
        /// Index read from the stream
        index: usize,
        /// Size of the indexed table
        len: usize,
    },

    /// a mesh declares vertex streams but its `.dat` buffer was not provided
    #[error("mesh has {0} vertex streams but no vertex buffer")]
    #[diagnostic(help("the buffer is stored next to the mesh with a .dat extension"))]
    MissingVertexBuffer(u16),

    /// {0}
    #[error("{0}")]
    CustomError(String),
}

/// Generic result type with crate's Error as its error variant
pub type Result<T> = core::result::Result<T, Error>;
