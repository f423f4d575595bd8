//! Shared decoding core for the archives and resources of *The Saboteur*.
//!
//! Every container the game ships starts with a four character magic stored little endian.
//! Console builds store the same data big endian, which shows up as the magic read
//! backwards: `00PM` becomes `MP00`, `ALBS` becomes `SBLA`. A [`StreamCursor`] reads the magic
//! once and byte-swaps every later read of that stream when needed.
//!
//! ## Identifiers
//!
//! Names are stored as 32 bit hashes, see [`hash::hash_string`]:
//!
//! ```text
//! hash = 0x811C9DC5
//! for byte in name:
//!     hash = (hash ^ (byte | 0x20)) * 0x1000193
//! hash = 0x1000193 * (hash ^ 0x2A)
//! ```
//!
//! The empty string hashes to `0`. A [`HashRegistry`] maps hashes back to names from a
//! dictionary file and learns new names found in the data.
//!
//! ## Payloads
//!
//! Embedded files are raw, zlib compressed or split into raw deflate segments, see
//! [`compression`].
//!
//! ## Common records
//!
//! | Structure | Fields                                                     |
//! |-----------|------------------------------------------------------------|
//! | string    | `u32` length, bytes, cut at the first NUL                  |
//! | string16  | `u16` length, bytes, cut at the first NUL                  |
//! | container | `u32` count, elements (the count may come from elsewhere)  |
//!

pub mod compression;
pub mod cursor;
pub mod error;
pub mod fourcc;
pub mod hash;
pub mod sink;

pub use compression::extract;
pub use cursor::StreamCursor;
pub use fourcc::{fourcc, FourCC};
pub use hash::{hash_string, HashRegistry, StringHash};
pub use sink::{MemorySink, OutputSink};
