//! Compiled Lua script packs (`.luap`).
//!
//! A `u32` entry count, then one 21 byte entry per script: two ids, the offset, the
//! compressed and uncompressed sizes and a flag byte. Scripts are stored uncompressed as
//! Lua 5.1 bytecode whose header carries the original source path.
//!
//! There is no magic; a count above `0x1000` means the pack is byte-swapped.

use std::io::{Read, Seek};

use sab_core::{
    cursor::{ensure_below, ensure_tag},
    error::Error as CoreError,
    OutputSink, StreamCursor,
};
use tracing::{debug, instrument};

use crate::error::Result;

const MAX_SCRIPTS: u32 = 0x1000;

/// Magic of compiled Lua chunks
pub const LUA_MAGIC: [u8; 4] = *b"\x1BLua";

/// Entry of a Lua pack
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LuaEntry {
    /// First id
    pub id0: u32,
    /// Second id
    pub id1: u32,
    /// Offset of the script
    pub offset: u32,
    /// Stored size
    pub compressed_size: u32,
    /// Original size
    pub uncompressed_size: u32,
}

impl LuaEntry {
    fn read<R: Read + Seek>(cursor: &mut StreamCursor<R>) -> Result<Self> {
        let entry = Self {
            id0: cursor.read_u32()?,
            id1: cursor.read_u32()?,
            offset: cursor.read_u32()?,
            compressed_size: cursor.read_u32()?,
            uncompressed_size: cursor.read_u32()?,
        };
        ensure_below("lua entry flag", cursor.read_u8()?, 2)?;
        Ok(entry)
    }
}

/// Output path of a script, rooted at its `scripts/` folder when there is one
pub fn script_path(source: &str) -> String {
    let source = source.replace('\\', "/");
    match source.find("cripts/") {
        Some(found) => source[found.saturating_sub(1)..].to_owned(),
        None => source,
    }
}

/// Reads the table of a Lua pack, detecting its byte order from the entry count.
#[instrument(skip(cursor))]
pub fn read_lua_table<R: Read + Seek>(cursor: &mut StreamCursor<R>) -> Result<Vec<LuaEntry>> {
    let count = cursor.peek_u32()?;
    if count > MAX_SCRIPTS {
        let swapped = count.swap_bytes();
        if swapped > MAX_SCRIPTS {
            return Err(CoreError::InvalidHeader(swapped).into());
        }
        cursor.set_swapped(true);
    }

    cursor.read_container_with(LuaEntry::read)
}

fn read_source_name<R: Read + Seek>(cursor: &mut StreamCursor<R>) -> Result<String> {
    let magic = cursor.read_bytes(4)?;
    ensure_tag(
        u32::from_le_bytes([magic[0], magic[1], magic[2], magic[3]]),
        u32::from_le_bytes(LUA_MAGIC),
    )?;
    // version, format, endianness and type sizes
    cursor.skip(8)?;
    Ok(cursor.read_string()?)
}

/// Extracts every script of a Lua pack under its source path.
#[instrument(skip_all)]
pub fn extract_lua_pack<R: Read + Seek>(
    cursor: &mut StreamCursor<R>,
    sink: &mut impl OutputSink,
) -> Result<usize> {
    let entries = read_lua_table(cursor)?;

    for entry in &entries {
        if entry.compressed_size != entry.uncompressed_size {
            return Err(CoreError::UnexpectedValue {
                field: "lua uncompressed size",
                value: entry.uncompressed_size as u64,
            }
            .into());
        }

        cursor.seek(entry.offset as u64)?;
        cursor.push()?;
        let source = read_source_name(cursor);
        cursor.pop()?;
        let path = script_path(&source?);
        debug!("{} ({} bytes)", path, entry.compressed_size);

        let data = cursor.read_bytes(entry.compressed_size as usize)?;
        sink.write_file(&path, &data)?;
    }

    Ok(entries.len())
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use pretty_assertions::assert_eq;
    use sab_core::MemorySink;

    use super::*;

    fn chunk(source: &str, big_endian: bool) -> Vec<u8> {
        let mut out = b"\x1BLua\x51\x00\x01\x04\x04\x04\x08\x00".to_vec();
        let length = source.len() as u32 + 1;
        if big_endian {
            out.extend_from_slice(&length.to_be_bytes());
        } else {
            out.extend_from_slice(&length.to_le_bytes());
        }
        out.extend_from_slice(source.as_bytes());
        out.push(0);
        out.extend_from_slice(b"bytecode");
        out
    }

    fn pack(sources: &[&str], big_endian: bool) -> Vec<u8> {
        let u32_bytes = |v: u32| {
            if big_endian {
                v.to_be_bytes()
            } else {
                v.to_le_bytes()
            }
        };

        let chunks = sources.iter().map(|s| chunk(s, big_endian)).collect::<Vec<_>>();
        let mut offset = 4 + 21 * sources.len();
        let mut out = u32_bytes(sources.len() as u32).to_vec();
        for c in &chunks {
            out.extend_from_slice(&u32_bytes(1));
            out.extend_from_slice(&u32_bytes(2));
            out.extend_from_slice(&u32_bytes(offset as u32));
            out.extend_from_slice(&u32_bytes(c.len() as u32));
            out.extend_from_slice(&u32_bytes(c.len() as u32));
            out.push(1);
            offset += c.len();
        }
        for c in chunks {
            out.extend_from_slice(&c);
        }
        out
    }

    #[test]
    fn paths() {
        assert_eq!(script_path("@D:\\Saboteur\\Scripts\\ai\\guard.lua"), "Scripts/ai/guard.lua");
        assert_eq!(script_path("@scripts/main.lua"), "scripts/main.lua");
        assert_eq!(script_path("standalone.lua"), "standalone.lua");
    }

    #[test]
    fn extracts_scripts() -> Result<()> {
        for big_endian in [false, true] {
            let data = pack(&["@c:/game/scripts/a.lua", "b.lua"], big_endian);
            let mut cursor = StreamCursor::new(Cursor::new(data));
            let mut sink = MemorySink::new();

            assert_eq!(extract_lua_pack(&mut cursor, &mut sink)?, 2);
            assert_eq!(cursor.is_swapped(), big_endian);
            assert_eq!(
                sink.files().keys().cloned().collect::<Vec<_>>(),
                vec!["scripts/a.lua".to_owned(), "b.lua".to_owned()]
            );
            assert_eq!(sink.get("b.lua"), Some(&chunk("b.lua", big_endian)[..]));
        }
        Ok(())
    }

    #[test]
    fn rejects_huge_count() {
        let mut cursor = StreamCursor::new(Cursor::new(vec![0x01, 0x20, 0x00, 0x20]));
        assert!(extract_lua_pack(&mut cursor, &mut MemorySink::new()).is_err());
    }
}
