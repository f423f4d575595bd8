//! Resource decoders for *The Saboteur*.
//!
//! | Magic  | Resource                                   | Module          | Output                            |
//! |--------|--------------------------------------------|-----------------|-----------------------------------|
//! | `L0PA` | animation pack                             | [`animpack`]    | `animations.json`, `*.hkx`        |
//! | `OASW` | material bank                              | [`materials`]   | `<letter>/<material>.json`        |
//! | `RDHS` | shader bundle                              | [`shaders`]     | `*.psh`, `*.vsh`, `*.json`        |
//! | `DTEX` | texture                                    | [`texture`]     | `<name>.dds`                      |
//! | `MESH` | mesh description, with its `.dat` buffers  | [`mesh`]        | `<name>.json`                     |
//!
//! Every magic also has a byte-swapped form used by console builds, see
//! [`sab_core::StreamCursor::read_magic`]. Identifiers are resolved through a
//! [`sab_core::HashRegistry`] as soon as they are read, names stored next to their hash are
//! bound on the way.

use std::io::{Read, Seek};

use sab_core::{HashRegistry, OutputSink, StreamCursor, StringHash};
use serde::Serialize;
use tracing::warn;

use crate::error::Result;

pub mod animpack;
pub mod dds;
pub mod error;
pub mod materials;
pub mod mesh;
pub mod shaders;
pub mod texture;

pub use animpack::extract_anim_pack;
pub use materials::extract_materials;
pub use mesh::{decode_mesh, extract_mesh};
pub use shaders::extract_shaders;
pub use texture::extract_texture;

/// Reads a hash and resolves it
pub(crate) fn read_hash<R: Read + Seek>(
    cursor: &mut StreamCursor<R>,
    registry: &HashRegistry,
) -> Result<StringHash> {
    Ok(registry.lookup(cursor.read_u32()?))
}

/// Reads a `u32` count followed by that many hashes
pub(crate) fn read_hashes<R: Read + Seek>(
    cursor: &mut StreamCursor<R>,
    registry: &HashRegistry,
) -> Result<Vec<StringHash>> {
    cursor.read_container_with(|c| read_hash(c, registry))
}

/// Binds a name stored next to its hash, falling back to a plain lookup when they disagree.
pub(crate) fn bind_or_lookup(registry: &HashRegistry, id: u32, name: &str) -> StringHash {
    registry.bind(id, name).unwrap_or_else(|e| {
        warn!("{}", e);
        registry.lookup(id)
    })
}

/// Serializes `value` as pretty JSON into a new output file
pub fn write_json<T: Serialize + ?Sized>(
    sink: &mut impl OutputSink,
    name: &str,
    value: &T,
) -> Result<()> {
    let data = serde_json::to_vec_pretty(value)?;
    sink.write_file(name, &data)?;
    Ok(())
}
