//! Megapack file tables and the index built from them.

use std::io::{Read, Seek};

use binrw::BinRead;
use indexmap::IndexMap;
use sab_core::{fourcc, HashRegistry, OutputSink, StreamCursor};
use tracing::{debug, instrument};

use crate::error::Result;

/// Magic of a megapack, `MP00` when byte-swapped
pub const MEGAPACK_MAGIC: u32 = fourcc(b"00PM");

/// Magic of a dynamic pack block, `SBLA` when byte-swapped
pub const PACK_MAGIC: u32 = fourcc(b"ALBS");

/// Entry of a megapack file table
#[derive(BinRead, Debug, Copy, Clone, PartialEq, Eq)]
pub struct MegaPackEntry {
    /// Secondary checksum, unused
    pub crc: u32,
    /// Key of the file, usually a hash
    pub index: u32,
    /// Size of the file in bytes
    pub size: u32,
    /// Absolute offset of the file
    pub offset: u64,
}

/// Reads the magic and file table of a megapack.
#[instrument(skip(cursor))]
pub fn read_megapack_table<R: Read + Seek>(
    cursor: &mut StreamCursor<R>,
) -> Result<Vec<MegaPackEntry>> {
    cursor.read_magic(MEGAPACK_MAGIC)?;
    let entries: Vec<MegaPackEntry> = cursor.read_container()?;
    debug!("{} entries", entries.len());
    Ok(entries)
}

/// Location of a file inside an archive
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FileRange {
    /// Offset of the file
    pub offset: u64,
    /// Size of the file
    pub size: u64,
    /// Whether a lookup has hit this entry
    pub used: bool,
}

/// Key to location map of an archive
///
/// Every [`ArchiveIndex::lookup`] marks the entry as used, so entries nothing referenced
/// can be reported once resolution is done.
#[derive(Debug, Clone, Default)]
pub struct ArchiveIndex {
    entries: IndexMap<u32, FileRange>,
}

impl ArchiveIndex {
    /// Reads a megapack table into an index
    pub fn read<R: Read + Seek>(cursor: &mut StreamCursor<R>) -> Result<Self> {
        Ok(Self::from_entries(&read_megapack_table(cursor)?))
    }

    /// Builds an index from table entries, keeping the first entry of a repeated key
    pub fn from_entries(entries: &[MegaPackEntry]) -> Self {
        let mut index = Self::default();
        for entry in entries {
            index.insert(entry.index, entry.offset, entry.size as u64);
        }
        index.entries.sort_keys();
        index
    }

    /// Adds an entry unless the key is already present
    pub fn insert(&mut self, key: u32, offset: u64, size: u64) {
        self.entries.entry(key).or_insert(FileRange {
            offset,
            size,
            used: false,
        });
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `key` is present
    pub fn contains(&self, key: u32) -> bool {
        self.entries.contains_key(&key)
    }

    /// Location of `key`, without marking it used
    pub fn get(&self, key: u32) -> Option<&FileRange> {
        self.entries.get(&key)
    }

    /// Location of `key`, marking it used
    pub fn lookup(&mut self, key: u32) -> Option<FileRange> {
        let range = self.entries.get_mut(&key)?;
        range.used = true;
        Some(*range)
    }

    /// Entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (u32, &FileRange)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    /// Entries no lookup has hit
    pub fn unused(&self) -> impl Iterator<Item = (u32, &FileRange)> {
        self.iter().filter(|(_, range)| !range.used)
    }
}

/// Extracts every file of a megapack.
///
/// Files holding a dynamic pack block are named `<key>.pack`, anything else `<key>.dat`.
/// Returns the number of files written.
#[instrument(skip_all)]
pub fn extract_megapack<R: Read + Seek>(
    cursor: &mut StreamCursor<R>,
    registry: &HashRegistry,
    sink: &mut impl OutputSink,
) -> Result<usize> {
    let entries = read_megapack_table(cursor)?;

    for entry in &entries {
        cursor.seek(entry.offset)?;
        let data = cursor.read_bytes(entry.size as usize)?;

        let extension = match data.first_chunk::<4>().map(|tag| u32::from_le_bytes(*tag)) {
            Some(tag) if tag == PACK_MAGIC || tag == PACK_MAGIC.swap_bytes() => "pack",
            _ => "dat",
        };

        sink.new_file(&format!("{}.{extension}", registry.lookup(entry.index)))?;
        sink.send_data(&data)?;
    }

    Ok(entries.len())
}
