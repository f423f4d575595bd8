//! Map descriptors listing the dynamic packs of a level.
//!
//! Both maps start with the magic `6PAM`. The global map lists streamed props and
//! patterns, the France map lists the world tiles and two sets of dynamic packs.
//!
//! ## Global map
//!
//! | Field           | Description                                       |
//! |-----------------|---------------------------------------------------|
//! | Dynamic count   | `u32`                                             |
//! | Preload         | container of descriptors, skipped                 |
//! | Patterns        | container of descriptors                          |
//! | Dynamics        | `Dynamic count` descriptors                       |
//!
//! ## France map
//!
//! | Field           | Description                                                  |
//! |-----------------|--------------------------------------------------------------|
//! | Name            | NUL terminated string                                        |
//! | Tile count      | `u32`, `0` for downloadable content, followed by the count   |
//! | Paths           | only outside downloadable content                            |
//! | Tiles           | `Tile count` tiles                                           |
//! | Dynamics        | two containers of descriptors                                |

use std::{
    collections::BTreeSet,
    io::{Read, Seek},
};

use binrw::BinRead;
use sab_core::{
    cursor::{ensure_below, ensure_zero, ensure_zeroes},
    error::Error as CoreError,
    fourcc, hash_string, HashRegistry, StreamCursor,
};
use tracing::{debug, instrument};

use crate::{bind_or_warn, error::Result};

/// Magic of a map, `MAP6` when byte-swapped
pub const MAP_MAGIC: u32 = fourcc(b"6PAM");

/// Layout of the sub-record tables of a dynamic pack
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PackLayout {
    /// Meshes, physics, flashes, textures
    Global,
    /// Meshes, physics, layouts, framebuffer data, particle views, textures
    France,
}

/// Kind of sub-record stored in a dynamic pack
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Category {
    /// Embedded mesh pack
    Mesh,
    /// Compressed physics data
    Physics,
    /// Flash movie
    Flash,
    /// Layout data
    Layout,
    /// Framebuffer data
    Framebuffer,
    /// Particle view data
    ParticleView,
    /// Texture without its magic
    Texture,
}

impl Category {
    /// Extension of the extracted file
    pub fn extension(&self) -> &'static str {
        match self {
            Category::Mesh => "msh",
            Category::Physics => "phy",
            Category::Flash => "swf",
            Category::Layout => "lay",
            Category::Framebuffer => "fb",
            Category::ParticleView => "pv",
            Category::Texture => "dtex",
        }
    }
}

impl PackLayout {
    /// Table order of the sub-records
    pub fn categories(&self) -> &'static [Category] {
        match self {
            PackLayout::Global => &[
                Category::Mesh,
                Category::Physics,
                Category::Flash,
                Category::Texture,
            ],
            PackLayout::France => &[
                Category::Mesh,
                Category::Physics,
                Category::Layout,
                Category::Framebuffer,
                Category::ParticleView,
                Category::Texture,
            ],
        }
    }
}

/// Number of sub-records of every category
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct PackCounts {
    /// Embedded mesh packs
    pub meshes: u32,
    /// Physics blocks
    pub physics: u32,
    /// Flash movies
    pub flashes: u32,
    /// Layouts
    pub layouts: u32,
    /// Framebuffer blocks
    pub framebuffers: u32,
    /// Particle view blocks
    pub particle_views: u32,
    /// Textures
    pub textures: u32,
}

impl PackCounts {
    /// Count of one category
    pub fn get(&self, category: Category) -> u32 {
        match category {
            Category::Mesh => self.meshes,
            Category::Physics => self.physics,
            Category::Flash => self.flashes,
            Category::Layout => self.layouts,
            Category::Framebuffer => self.framebuffers,
            Category::ParticleView => self.particle_views,
            Category::Texture => self.textures,
        }
    }
}

/// A logical pack of resources listed by a map
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicPackDescriptor {
    /// Key of the pack in the archives
    pub key: u32,
    /// Name of the pack
    pub name: String,
    /// Sub-record layout
    pub layout: PackLayout,
    /// Sub-record counts
    pub counts: PackCounts,
}

impl DynamicPackDescriptor {
    /// Name of the standalone `.pack` file holding this pack
    pub fn loose_file_name(&self) -> String {
        match self.layout {
            PackLayout::Global => format!("{}.pack", self.name),
            PackLayout::France => format!("{}.pack", self.key),
        }
    }

    /// Folder the pack's files are extracted to
    pub fn output_prefix(&self) -> String {
        format!("{}/", self.name)
    }
}

/// File reference of a global descriptor
#[derive(BinRead, Debug, Copy, Clone, PartialEq, Eq)]
pub struct FileId {
    /// Checksum
    pub crc: u32,
    /// Key of the file
    pub index: u32,
}

fn read_global_descriptor<R: Read + Seek>(
    cursor: &mut StreamCursor<R>,
) -> Result<DynamicPackDescriptor> {
    let key = cursor.read_u32()?;
    let name = cursor.read_string16()?;
    cursor.skip(28)?;
    let _textures: Vec<FileId> = cursor.read_container()?;
    let _meshes: Vec<FileId> = cursor.read_container()?;
    let _data_offset = cursor.read_u32()?;

    let meshes = cursor.read_u32()?;
    let textures = cursor.read_u32()?;
    let physics = cursor.read_u32()?;
    ensure_zeroes("global descriptor unk0", &cursor.read_u32s(4)?)?;
    let flashes = cursor.read_u32()?;
    ensure_zeroes("global descriptor unk5", &cursor.read_u32s(4)?)?;

    if flashes > 0 {
        ensure_zero("flash pack meshes", meshes)?;
        ensure_zero("flash pack physics", physics)?;
    }

    Ok(DynamicPackDescriptor {
        key,
        name,
        layout: PackLayout::Global,
        counts: PackCounts {
            meshes,
            physics,
            flashes,
            textures,
            ..Default::default()
        },
    })
}

/// Reads a global map, returning the dynamics followed by the patterns.
#[instrument(skip(cursor))]
pub fn read_global_map<R: Read + Seek>(
    cursor: &mut StreamCursor<R>,
) -> Result<Vec<DynamicPackDescriptor>> {
    cursor.read_magic(MAP_MAGIC)?;

    let num_dynamics = cursor.read_u32()? as usize;
    let preload = cursor.read_container_with(read_global_descriptor)?;
    let patterns = cursor.read_container_with(read_global_descriptor)?;
    let mut dynamics = (0..num_dynamics)
        .map(|_| read_global_descriptor(cursor))
        .collect::<Result<Vec<_>>>()?;

    debug!(
        "{} preload, {} patterns, {} dynamics",
        preload.len(),
        patterns.len(),
        dynamics.len()
    );
    dynamics.extend(patterns);
    Ok(dynamics)
}

/// Contents of a France map
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FranceMap {
    /// Name of the map
    pub name: String,
    /// Whether the map belongs to downloadable content
    pub is_dlc: bool,
    /// Hashes of the tiles of the two finest levels of detail
    pub tiles: BTreeSet<u32>,
    /// Dynamic packs of both lists
    pub packs: Vec<DynamicPackDescriptor>,
}

fn read_france_path<R: Read + Seek>(
    cursor: &mut StreamCursor<R>,
    registry: &HashRegistry,
) -> Result<()> {
    let long_path = cursor.read_string()?;
    let name0 = cursor.read_string()?;
    cursor.skip(12 * 4)?;
    let name1 = cursor.read_string()?;

    for name in [&long_path, &name0, &name1] {
        bind_or_warn(registry, hash_string(name), name);
    }
    Ok(())
}

struct Tile {
    hash: u32,
    lod: u16,
}

fn read_tile<R: Read + Seek>(cursor: &mut StreamCursor<R>) -> Result<Tile> {
    let hash = cursor.read_u32()?;
    cursor.read_reserved_u16("tile name length")?;
    cursor.skip(6 * 4)?;
    cursor.read_reserved_u16("tile null")?;
    let lod = cursor.read_u16()?;
    ensure_below("tile lod", lod, 3)?;

    if lod == 2 {
        cursor.skip(13 * 4)?;
        let _hashes = cursor.read_container_with(|c| c.read_u32())?;
        cursor.read_reserved_u32("tile null1")?;
    }

    Ok(Tile { hash, lod })
}

fn read_france_descriptor<R: Read + Seek>(
    cursor: &mut StreamCursor<R>,
) -> Result<DynamicPackDescriptor> {
    let key = cursor.read_u32()?;
    let name = cursor.read_string16()?;
    if name.is_empty() {
        return Err(CoreError::UnexpectedValue {
            field: "dynamic pack name length",
            value: 0,
        }
        .into());
    }

    cursor.skip(6 * 4 + 2 * 2)?;
    ensure_zeroes("france descriptor null0", &cursor.read_u32s(2)?)?;
    let _data_start = cursor.read_u32()?;
    let meshes = cursor.read_u32()?;
    let textures = cursor.read_u32()?;
    let physics = cursor.read_u32()?;
    let layouts = cursor.read_u32()?;
    let framebuffers = cursor.read_u32()?;
    ensure_zeroes("france descriptor null1", &cursor.read_u32s(3)?)?;
    let particle_views = cursor.read_u32()?;
    cursor.read_reserved_u32("france descriptor null2")?;
    let _files = cursor.read_container_with(|c| c.read_u32())?;
    cursor.read_reserved_u32("france descriptor null")?;

    Ok(DynamicPackDescriptor {
        key,
        name,
        layout: PackLayout::France,
        counts: PackCounts {
            meshes,
            physics,
            layouts,
            framebuffers,
            particle_views,
            textures,
            ..Default::default()
        },
    })
}

/// Reads a France map, binding the names of its paths.
#[instrument(skip_all)]
pub fn read_france_map<R: Read + Seek>(
    cursor: &mut StreamCursor<R>,
    registry: &HashRegistry,
) -> Result<FranceMap> {
    cursor.read_magic(MAP_MAGIC)?;

    let name = cursor.read_cstring()?;
    let mut num_tiles = cursor.read_u32()?;
    let is_dlc = num_tiles == 0;

    if is_dlc {
        num_tiles = cursor.read_u32()?;
    } else {
        let _unk0 = cursor.read_u32()?;
        let num_paths = cursor.read_u32()?;
        let _unk1 = cursor.read_u32()?;

        for _ in 0..num_paths {
            read_france_path(cursor, registry)?;
        }

        cursor.skip(18 * 4 + 6 * 2)?;
    }

    let mut tiles = BTreeSet::new();
    for _ in 0..num_tiles {
        let tile = read_tile(cursor)?;
        if tile.lod < 2 {
            tiles.insert(tile.hash);
        }
    }

    let mut packs = cursor.read_container_with(read_france_descriptor)?;
    packs.extend(cursor.read_container_with(read_france_descriptor)?);
    debug!("{}: {} tiles, {} packs", name, tiles.len(), packs.len());

    Ok(FranceMap {
        name,
        is_dlc,
        tiles,
        packs,
    })
}

#[cfg(test)]
pub(crate) mod test {
    use std::io::Cursor;

    use pretty_assertions::assert_eq;
    use sab_core::hash_string;

    use super::*;

    pub(crate) fn global_descriptor(key: u32, name: &str, counts: [u32; 4]) -> Vec<u8> {
        let [meshes, physics, flashes, textures] = counts;
        let mut out = Vec::new();
        out.extend_from_slice(&key.to_le_bytes());
        out.extend_from_slice(&(name.len() as u16 + 1).to_le_bytes());
        out.extend_from_slice(name.as_bytes());
        out.push(0);
        out.extend_from_slice(&[0xEE; 28]);
        // one texture id, no mesh ids
        out.extend_from_slice(&1u32.to_le_bytes());
        out.extend_from_slice(&[1, 0, 0, 0, 2, 0, 0, 0]);
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        for v in [meshes, textures, physics, 0, 0, 0, 0, flashes, 0, 0, 0, 0] {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    pub(crate) fn global_map(dynamics: &[Vec<u8>], patterns: &[Vec<u8>]) -> Vec<u8> {
        let mut out = b"6PAM".to_vec();
        out.extend_from_slice(&(dynamics.len() as u32).to_le_bytes());
        out.extend_from_slice(&1u32.to_le_bytes());
        out.extend_from_slice(&global_descriptor(9, "preload", [0, 0, 0, 0]));
        out.extend_from_slice(&(patterns.len() as u32).to_le_bytes());
        patterns.iter().for_each(|p| out.extend_from_slice(p));
        dynamics.iter().for_each(|d| out.extend_from_slice(d));
        out
    }

    #[test]
    fn global_dynamics_then_patterns() -> Result<()> {
        let data = global_map(
            &[global_descriptor(1, "crates", [2, 1, 0, 3])],
            &[global_descriptor(2, "posters", [0, 0, 1, 0])],
        );
        let mut cursor = StreamCursor::new(Cursor::new(data));
        let packs = read_global_map(&mut cursor)?;

        assert_eq!(
            packs.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
            vec!["crates", "posters"]
        );
        assert_eq!(
            packs[0].counts,
            PackCounts {
                meshes: 2,
                physics: 1,
                textures: 3,
                ..Default::default()
            }
        );
        assert_eq!(packs[1].counts.flashes, 1);
        assert_eq!(packs[0].loose_file_name(), "crates.pack");
        assert!(cursor.is_eof()?);
        Ok(())
    }

    #[test]
    fn flash_packs_hold_nothing_else() {
        let data = global_map(&[global_descriptor(1, "bad", [1, 0, 1, 0])], &[]);
        let mut cursor = StreamCursor::new(Cursor::new(data));
        assert!(matches!(
            read_global_map(&mut cursor),
            Err(crate::error::Error::Core(CoreError::UnexpectedValue {
                field: "flash pack meshes",
                value: 1
            }))
        ));
    }

    fn string(value: &str) -> Vec<u8> {
        let mut out = (value.len() as u32 + 1).to_le_bytes().to_vec();
        out.extend_from_slice(value.as_bytes());
        out.push(0);
        out
    }

    pub(crate) fn france_descriptor(key: u32, name: &str, counts: [u32; 6]) -> Vec<u8> {
        let [meshes, physics, layouts, framebuffers, particle_views, textures] = counts;
        let mut out = key.to_le_bytes().to_vec();
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(&[0; 6 * 4 + 2 * 2]);
        out.extend_from_slice(&[0; 8]);
        for v in [0, meshes, textures, physics, layouts, framebuffers, 0, 0, 0, particle_views, 0] {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out.extend_from_slice(&1u32.to_le_bytes());
        out.extend_from_slice(&key.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out
    }

    fn tile(hash: u32, lod: u16) -> Vec<u8> {
        let mut out = hash.to_le_bytes().to_vec();
        out.extend_from_slice(&[0; 2]);
        out.extend_from_slice(&[0; 24]);
        out.extend_from_slice(&[0; 2]);
        out.extend_from_slice(&lod.to_le_bytes());
        if lod == 2 {
            out.extend_from_slice(&[0; 13 * 4]);
            out.extend_from_slice(&0u32.to_le_bytes());
            out.extend_from_slice(&0u32.to_le_bytes());
        }
        out
    }

    pub(crate) fn france_map(packs: &[Vec<u8>]) -> Vec<u8> {
        let mut out = b"6PAMfrance\0".to_vec();
        out.extend_from_slice(&3u32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&1u32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&string("levels/france/paths/road_01"));
        out.extend_from_slice(&string("road_01"));
        out.extend_from_slice(&[0; 12 * 4]);
        out.extend_from_slice(&string("road_01_end"));
        out.extend_from_slice(&[0; 18 * 4 + 6 * 2]);
        out.extend_from_slice(&tile(0x100, 0));
        out.extend_from_slice(&tile(0x200, 1));
        out.extend_from_slice(&tile(0x300, 2));
        out.extend_from_slice(&(packs.len() as u32).to_le_bytes());
        packs.iter().for_each(|p| out.extend_from_slice(p));
        out.extend_from_slice(&0u32.to_le_bytes());
        out
    }

    #[test]
    fn france_tiles_and_packs() -> Result<()> {
        let registry = HashRegistry::new();
        let data = france_map(&[france_descriptor(77, "paris_block", [1, 0, 2, 0, 0, 1])]);
        let mut cursor = StreamCursor::new(Cursor::new(data));
        let map = read_france_map(&mut cursor, &registry)?;

        assert_eq!(map.name, "france");
        assert!(!map.is_dlc);
        assert_eq!(map.tiles, BTreeSet::from([0x100, 0x200]));
        assert_eq!(map.packs.len(), 1);
        assert_eq!(map.packs[0].counts.layouts, 2);
        assert_eq!(map.packs[0].loose_file_name(), "77.pack");
        assert_eq!(
            registry.lookup(hash_string("road_01_end")).to_string(),
            "road_01_end"
        );
        assert!(cursor.is_eof()?);
        Ok(())
    }

    #[test]
    fn france_rejects_bad_lod() {
        let mut data = france_map(&[]);
        // lod of the first tile, behind its hash, name length, bounds and null
        let tiles_size = 34 + 34 + (34 + 60);
        let lod_offset = data.len() - 8 - tiles_size + 32;
        data[lod_offset] = 3;
        let mut cursor = StreamCursor::new(Cursor::new(data));
        assert!(read_france_map(&mut cursor, &HashRegistry::new()).is_err());
    }
}
