//! World tile packs.
//!
//! A tile pack is an `ALBS` block followed by an `i32` metadata size and one of two
//! layouts:
//!
//! * a height pack, starting with a `1IEH` height grid, listing meshes, physics,
//!   layouts, framebuffer data, particle views and terrain masks
//! * a plain tile pack (metadata size `0x3C`) listing meshes, layouts and textures
//!
//! Unlike dynamic packs, sub-records are stored back to back in table order.
//!
//! ## Height block
//!
//! | Field        | Description                                              |
//! |--------------|----------------------------------------------------------|
//! | Header       | magic, block columns, block rows, `f32` width and height |
//! | Heights      | one byte per block                                       |
//! | Counts       | 13 `u32`, see [`HeightCounts`]                           |
//! | Hashes       | container of `u32`                                       |
//! | Blocks       | container of a hash and a container of `u32`             |

use std::io::{Read, Seek};

use binrw::BinRead;
use sab_core::{
    cursor::{ensure_tag, ensure_zeroes},
    error::Error as CoreError,
    extract, fourcc, FourCC, HashRegistry, OutputSink, StreamCursor, StringHash,
};
use tracing::{debug, instrument};

use crate::{
    bind_or_warn,
    error::{Error, Result},
    megapack::PACK_MAGIC,
    meshpack::extract_mesh_pack,
    resolver::PackFile,
};

/// Magic of a height block
pub const HEIGHT_MAGIC: u32 = fourcc(b"1IEH");

const PLAIN_META_SIZE: i32 = 0x3C;

/// Header of a height block
#[derive(BinRead, Debug, Clone, PartialEq)]
pub struct HeightHeader {
    /// Always [`HEIGHT_MAGIC`]
    pub id: u32,
    /// Number of block columns
    pub width_blocks: u32,
    /// Number of block rows
    pub height_blocks: u32,
    /// World width
    pub width: f32,
    /// World height
    pub height: f32,
}

/// Sub-record counts of a height pack
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeightCounts {
    pub meshes: u32,
    pub masks: u32,
    pub physics: u32,
    pub framebuffers: u32,
    pub particle_views: u32,
    pub layouts: u32,
}

/// Block of a height grid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeightBlock {
    pub hash: u32,
    pub hashes: Vec<u32>,
}

/// Height grid of a height pack
#[derive(Debug, Clone, PartialEq)]
pub struct HeightMap {
    pub header: HeightHeader,
    pub data: Vec<u8>,
    pub counts: HeightCounts,
    pub hashes: Vec<u32>,
    pub blocks: Vec<HeightBlock>,
}

/// Sub-record counts of a plain tile pack
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TileCounts {
    pub meshes: u32,
    pub layouts: u32,
    pub textures: u32,
}

/// Layout of an extracted tile pack
#[derive(Debug, Clone, PartialEq)]
pub enum TilePack {
    Height(HeightMap),
    Plain(TileCounts),
}

/// Terrain mask record, stored right before its payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    pub file_name: String,
    pub uncompressed_size: u32,
    pub size: u32,
}

impl Mask {
    fn read<R: Read + Seek>(cursor: &mut StreamCursor<R>) -> Result<Self> {
        let file_name = cursor.read_string()?;
        let _unk0 = cursor.read_u32s(2)?;
        let _unk1 = cursor.read_u16s(3)?;
        let uncompressed_size = cursor.read_u32()?;
        let _unk2 = cursor.read_u32()?;
        let size = cursor.read_u32()?;

        Ok(Self {
            file_name,
            uncompressed_size,
            size,
        })
    }
}

fn read_height_block<R: Read + Seek>(cursor: &mut StreamCursor<R>) -> Result<HeightBlock> {
    Ok(HeightBlock {
        hash: cursor.read_u32()?,
        hashes: cursor.read_container_with(|c| c.read_u32())?,
    })
}

fn read_height_map<R: Read + Seek>(cursor: &mut StreamCursor<R>) -> Result<HeightMap> {
    let header: HeightHeader = cursor.read_record()?;
    ensure_tag(header.id, HEIGHT_MAGIC)?;
    let data = cursor.read_bytes(header.width_blocks as usize * header.height_blocks as usize)?;

    // the third one is set on some tiles
    let null0 = cursor.read_u32s(3)?;
    ensure_zeroes("height null0", &null0[..2])?;

    let meshes = cursor.read_u32()?;
    let masks = cursor.read_u32()?;
    let physics = cursor.read_u32()?;
    let framebuffers = cursor.read_u32()?;
    let particle_views = cursor.read_u32()?;
    ensure_zeroes("height unk2", &cursor.read_u32s(3)?)?;
    let layouts = cursor.read_u32()?;
    cursor.read_reserved_u32("height null1")?;

    Ok(HeightMap {
        header,
        data,
        counts: HeightCounts {
            meshes,
            masks,
            physics,
            framebuffers,
            particle_views,
            layouts,
        },
        hashes: cursor.read_container_with(|c| c.read_u32())?,
        blocks: cursor.read_container_with(read_height_block)?,
    })
}

fn read_tile_counts<R: Read + Seek>(cursor: &mut StreamCursor<R>) -> Result<TileCounts> {
    ensure_zeroes("tile null0", &cursor.read_u32s(3)?)?;
    let meshes = cursor.read_u32()?;
    let textures = cursor.read_u32()?;
    ensure_zeroes("tile null1", &cursor.read_u32s(6)?)?;
    let layouts = cursor.read_u32()?;
    ensure_zeroes("tile null2", &cursor.read_u32s(3)?)?;

    Ok(TileCounts {
        meshes,
        layouts,
        textures,
    })
}

fn layout_name(registry: &HashRegistry, file: &PackFile) -> StringHash {
    registry.lookup(if file.hash1 != 0 { file.hash1 } else { file.hash0 })
}

fn extract_file<R: Read + Seek>(
    cursor: &mut StreamCursor<R>,
    file: &PackFile,
    name: String,
    sink: &mut impl OutputSink,
) -> Result<()> {
    let data = extract(cursor, file.size, file.uncompressed_size)?;
    sink.write_file(&name, &data)?;
    Ok(())
}

fn extract_meshes<R: Read + Seek>(
    cursor: &mut StreamCursor<R>,
    meshes: &[PackFile],
    registry: &HashRegistry,
    sink: &mut impl OutputSink,
) -> Result<()> {
    for file in meshes {
        let name = extract_mesh_pack(cursor, "", sink)?;
        bind_or_warn(registry, file.hash0, &name);
    }
    Ok(())
}

fn extract_height_pack<R: Read + Seek>(
    cursor: &mut StreamCursor<R>,
    counts: &HeightCounts,
    registry: &HashRegistry,
    sink: &mut impl OutputSink,
) -> Result<()> {
    let meshes: Vec<PackFile> = cursor.read_records(counts.meshes as usize)?;
    let physics: Vec<PackFile> = cursor.read_records(counts.physics as usize)?;
    let layouts: Vec<PackFile> = cursor.read_records(counts.layouts as usize)?;
    let framebuffers: Vec<PackFile> = cursor.read_records(counts.framebuffers as usize)?;
    let particle_views: Vec<PackFile> = cursor.read_records(counts.particle_views as usize)?;
    let masks: Vec<PackFile> = cursor.read_records(counts.masks as usize)?;

    extract_meshes(cursor, &meshes, registry, sink)?;

    for file in &physics {
        extract_file(cursor, file, format!("{}.phy", registry.lookup(file.hash0)), sink)?;
    }

    for file in &layouts {
        extract_file(cursor, file, format!("{}.lay", layout_name(registry, file)), sink)?;
    }

    for file in &framebuffers {
        extract_file(cursor, file, format!("{}.fb", registry.lookup(file.hash0)), sink)?;
    }

    for file in &particle_views {
        extract_file(cursor, file, format!("{}.pv", registry.lookup(file.hash0)), sink)?;
    }

    for file in &masks {
        let mask = Mask::read(cursor)?;
        let data = extract(cursor, mask.size, mask.uncompressed_size)?;
        sink.write_file(&format!("{}.mask", mask.file_name), &data)?;
        bind_or_warn(registry, file.hash0, &mask.file_name);
    }

    Ok(())
}

fn extract_plain_pack<R: Read + Seek>(
    cursor: &mut StreamCursor<R>,
    counts: &TileCounts,
    registry: &HashRegistry,
    sink: &mut impl OutputSink,
) -> Result<()> {
    let meshes: Vec<PackFile> = cursor.read_records(counts.meshes as usize)?;
    let layouts: Vec<PackFile> = cursor.read_records(counts.layouts as usize)?;
    let textures: Vec<PackFile> = cursor.read_records(counts.textures as usize)?;

    extract_meshes(cursor, &meshes, registry, sink)?;

    for file in &layouts {
        extract_file(cursor, file, format!("{}.lay", layout_name(registry, file)), sink)?;
    }

    let texture_magic: &[u8] = if cursor.is_swapped() { b"XETD" } else { b"DTEX" };
    for file in textures.iter().filter(|f| f.size > 0) {
        let data = cursor.read_bytes(file.size as usize)?;
        sink.new_file(&format!("{}.dtex", registry.lookup(file.hash0)))?;
        sink.send_data(texture_magic)?;
        sink.send_data(&data)?;
    }

    Ok(())
}

/// Extracts every sub-record of a tile pack.
#[instrument(skip_all)]
pub fn extract_tile_pack<R: Read + Seek>(
    cursor: &mut StreamCursor<R>,
    registry: &HashRegistry,
    sink: &mut impl OutputSink,
) -> Result<TilePack> {
    cursor.read_magic(PACK_MAGIC)?;
    let meta_size = cursor.read_i32()?;
    if meta_size < 1 {
        return Err(Error::MissingMetadata(meta_size));
    }

    let start = cursor.tell()?;
    match read_height_map(cursor) {
        Ok(height) => {
            debug!(
                "height pack, {}x{} blocks",
                height.header.width_blocks, height.header.height_blocks
            );
            extract_height_pack(cursor, &height.counts, registry, sink)?;
            Ok(TilePack::Height(height))
        }
        Err(Error::Core(CoreError::InvalidHeader(id))) => {
            if meta_size != PLAIN_META_SIZE {
                return Err(Error::UnknownPackType(meta_size));
            }
            debug!("no height block ({}), plain tile pack", FourCC(id));

            cursor.seek(start)?;
            let counts = read_tile_counts(cursor)?;
            extract_plain_pack(cursor, &counts, registry, sink)?;
            Ok(TilePack::Plain(counts))
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use pretty_assertions::assert_eq;
    use sab_core::{hash_string, MemorySink};

    use super::*;
    use crate::meshpack::test::mesh_pack;

    fn words(out: &mut Vec<u8>, values: &[u32]) {
        values
            .iter()
            .for_each(|v| out.extend_from_slice(&v.to_le_bytes()));
    }

    fn record(out: &mut Vec<u8>, hash0: u32, size: u32, hash1: u32) {
        words(out, &[hash0, 0, size, size, 0, hash1]);
    }

    #[test]
    fn plain_tile_pack() -> Result<()> {
        let mut data = b"ALBS".to_vec();
        words(&mut data, &[0x3C]);
        words(&mut data, &[0, 0, 0, 1, 2, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0]);
        let mesh = mesh_pack("rock", b"m", b"d");
        record(&mut data, hash_string("rock"), mesh.len() as u32, 0);
        record(&mut data, 0x11, 3, 0x22);
        record(&mut data, 0x33, 0, 0);
        record(&mut data, 0x34, 2, 0);
        data.extend_from_slice(&mesh);
        data.extend_from_slice(b"lay");
        data.extend_from_slice(b"tx");

        let registry = HashRegistry::new();
        let mut sink = MemorySink::new();
        let mut cursor = StreamCursor::new(Cursor::new(data));
        let pack = extract_tile_pack(&mut cursor, &registry, &mut sink)?;

        assert_eq!(
            pack,
            TilePack::Plain(TileCounts {
                meshes: 1,
                layouts: 1,
                textures: 2
            })
        );
        assert_eq!(
            sink.files().keys().cloned().collect::<Vec<_>>(),
            vec!["rock.msh", "rock.dat", "22.lay", "34.dtex"]
        );
        assert_eq!(sink.get("34.dtex"), Some(&b"DTEXtx"[..]));
        assert_eq!(registry.lookup(hash_string("rock")).name(), Some("rock"));
        Ok(())
    }

    #[test]
    fn height_pack() -> Result<()> {
        let mut data = b"ALBS".to_vec();
        words(&mut data, &[0x100]);
        data.extend_from_slice(b"1IEH");
        words(&mut data, &[2, 1]);
        data.extend_from_slice(&1.0f32.to_le_bytes());
        data.extend_from_slice(&2.0f32.to_le_bytes());
        data.extend_from_slice(&[5, 6]);
        words(&mut data, &[0, 0, 7, 0, 1, 1, 0, 0, 0, 0, 0, 0, 0]);
        words(&mut data, &[1, 0x99]);
        words(&mut data, &[1, 0x98, 1, 0x97]);
        record(&mut data, 0x44, 4, 0);
        record(&mut data, hash_string("tile_a"), 0, 0);
        data.extend_from_slice(b"phys");
        words(&mut data, &[7]);
        data.extend_from_slice(b"tile_a\0");
        words(&mut data, &[0, 0]);
        data.extend_from_slice(&[0; 6]);
        words(&mut data, &[4, 0, 4]);
        data.extend_from_slice(b"mask");

        let registry = HashRegistry::new();
        let mut sink = MemorySink::new();
        let mut cursor = StreamCursor::new(Cursor::new(data));
        let TilePack::Height(height) = extract_tile_pack(&mut cursor, &registry, &mut sink)?
        else {
            panic!("expected a height pack");
        };

        assert_eq!(height.data, vec![5, 6]);
        assert_eq!(height.header.height, 2.0);
        assert_eq!(height.hashes, vec![0x99]);
        assert_eq!(
            height.blocks,
            vec![HeightBlock {
                hash: 0x98,
                hashes: vec![0x97]
            }]
        );
        assert_eq!(sink.get("44.phy"), Some(&b"phys"[..]));
        assert_eq!(sink.get("tile_a.mask"), Some(&b"mask"[..]));
        assert_eq!(registry.lookup(hash_string("tile_a")).name(), Some("tile_a"));
        assert!(cursor.is_eof()?);
        Ok(())
    }

    #[test]
    fn rejects_unknown_layouts() {
        let mut data = b"ALBS".to_vec();
        words(&mut data, &[0]);
        let mut cursor = StreamCursor::new(Cursor::new(data));
        assert!(matches!(
            extract_tile_pack(&mut cursor, &HashRegistry::new(), &mut MemorySink::new()),
            Err(Error::MissingMetadata(0))
        ));

        let mut data = b"ALBS".to_vec();
        words(&mut data, &[0x40]);
        words(&mut data, &[0; 16]);
        let mut cursor = StreamCursor::new(Cursor::new(data));
        assert!(matches!(
            extract_tile_pack(&mut cursor, &HashRegistry::new(), &mut MemorySink::new()),
            Err(Error::UnknownPackType(0x40))
        ));
    }
}
