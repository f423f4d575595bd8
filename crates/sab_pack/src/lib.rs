//! Archive readers for *The Saboteur*.
//!
//! The game streams most of its assets from a few large archives:
//!
//! | File                    | Contents                                              | Module          |
//! |-------------------------|-------------------------------------------------------|-----------------|
//! | `*.megapack`            | file table keyed by hash, then the files              | [`megapack`]    |
//! | `loosefiles_*.pack`     | sequence of named files, among them the maps          | [`loosefiles`]  |
//! | `global.map`            | streamed props and patterns                           | [`map`]         |
//! | `France.map`            | world tiles and dynamic packs                         | [`map`]         |
//! | `cinematics.cinpack`    | cinematics, sized from their sorted offsets           | [`cinpack`]     |
//! | `*.pack` (tiles)        | height grid or plain tile meshes, layouts, textures   | [`tilepack`]    |
//! | `*.luap`                | compiled Lua scripts                                  | [`luapack`]     |
//!
//! ## Dynamic packs
//!
//! Maps list their packs by key and by the number of resources of each kind they hold.
//! The [`resolver`] finds the bytes of a pack, first in the megapacks, then as a loose
//! `.pack` file next to them, then in the cinematics table, and extracts the resources:
//! embedded meshes ([`meshpack`]), physics, flash movies, layouts, framebuffer data,
//! particle views and textures.
//!
//! [`global::extract_global`] and [`france::extract_france`] drive the whole process for a
//! game folder.

use sab_core::HashRegistry;
use tracing::warn;

pub mod cinpack;
pub mod error;
pub mod france;
pub mod global;
pub mod intervals;
pub mod loosefiles;
pub mod luapack;
pub mod map;
pub mod megapack;
pub mod meshpack;
pub mod resolver;
pub mod tilepack;
pub mod workdir;

pub use france::extract_france;
pub use global::extract_global;
pub use megapack::ArchiveIndex;
pub use resolver::{ResolverOptions, ResourceResolver};

/// Binds a name found in the data, logging a mismatch instead of failing.
pub(crate) fn bind_or_warn(registry: &HashRegistry, id: u32, name: &str) {
    if let Err(e) = registry.bind(id, name) {
        warn!("{}", e);
    }
}
