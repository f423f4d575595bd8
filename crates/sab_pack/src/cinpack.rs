//! Cinematics table.
//!
//! The table only lists where every cinematic starts:
//!
//! | Offset (bytes) | Field  | Description                         |
//! |----------------|--------|-------------------------------------|
//! | 0x0000         | Magic  | 4 bytes: `0x0000000C`               |
//! | 0x0004         | Count  | 4 bytes: number of entries          |
//! | 0x0008         | Entry  | 9 bytes each: id, offset, flag byte |
//!
//! Sizes are inferred from the sorted offsets, see [`crate::intervals`].

use std::io::{Read, Seek};

use binrw::BinRead;
use indexmap::IndexMap;
use sab_core::StreamCursor;
use tracing::instrument;

use crate::{error::Result, intervals::interval_sizes};

/// Magic of a cinematics table, `0x0C000000` when byte-swapped
pub const CINPACK_MAGIC: u32 = 0xC;

#[derive(BinRead, Debug, Copy, Clone)]
struct CinematicEntry {
    id: u32,
    offset: u32,
    _flag: u8,
}

/// Byte range of a cinematic
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CinematicRange {
    /// Offset from the start of the table
    pub offset: u64,
    /// Distance to the next cinematic, or to the end of the table
    pub size: u64,
    /// Whether a lookup has hit this entry
    pub used: bool,
}

/// Id to range map of a cinematics table
#[derive(Debug, Clone, Default)]
pub struct CinematicTable {
    entries: IndexMap<u32, CinematicRange>,
}

impl CinematicTable {
    /// Reads a table whose data ends at `end`, relative to the cursor's origin.
    #[instrument(skip(cursor))]
    pub fn read<R: Read + Seek>(cursor: &mut StreamCursor<R>, end: u64) -> Result<Self> {
        cursor.read_magic(CINPACK_MAGIC)?;
        let entries: Vec<CinematicEntry> = cursor.read_container()?;

        let sizes = interval_sizes(entries.iter().map(|e| e.offset as u64), end);

        let mut table = Self::default();
        for entry in entries {
            let offset = entry.offset as u64;
            table.entries.entry(entry.id).or_insert(CinematicRange {
                offset,
                size: sizes.get(&offset).copied().unwrap_or_default(),
                used: false,
            });
        }
        table.entries.sort_keys();

        Ok(table)
    }

    /// Number of cinematics
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Range of `id`, without marking it used
    pub fn get(&self, id: u32) -> Option<&CinematicRange> {
        self.entries.get(&id)
    }

    /// Range of `id`, marking it used
    pub fn lookup(&mut self, id: u32) -> Option<CinematicRange> {
        let range = self.entries.get_mut(&id)?;
        range.used = true;
        Some(*range)
    }

    /// Entries no lookup has hit
    pub fn unused(&self) -> impl Iterator<Item = (u32, &CinematicRange)> {
        self.entries
            .iter()
            .filter(|(_, range)| !range.used)
            .map(|(id, range)| (*id, range))
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn sizes_from_offsets() -> Result<()> {
        #[rustfmt::skip]
        let data = vec![
            0x00, 0x00, 0x00, 0x0C,
            0x00, 0x00, 0x00, 0x03,
            0x00, 0x00, 0x00, 0x0A,  0x00, 0x00, 0x00, 0x64,  0x00,
            0x00, 0x00, 0x00, 0x0B,  0x00, 0x00, 0x00, 0x32,  0x01,
            0x00, 0x00, 0x00, 0x0C,  0x00, 0x00, 0x00, 0xC8,  0x00,
        ];
        let mut cursor = StreamCursor::new(Cursor::new(data));
        let mut table = CinematicTable::read(&mut cursor, 300)?;

        assert!(cursor.is_swapped());
        assert_eq!(table.len(), 3);
        assert_eq!(table.get(0xA).map(|r| (r.offset, r.size)), Some((100, 100)));
        assert_eq!(table.get(0xB).map(|r| (r.offset, r.size)), Some((50, 50)));
        assert_eq!(table.get(0xC).map(|r| (r.offset, r.size)), Some((200, 100)));

        table.lookup(0xB);
        assert_eq!(table.unused().map(|(id, _)| id).collect::<Vec<_>>(), vec![0xA, 0xC]);
        Ok(())
    }
}
