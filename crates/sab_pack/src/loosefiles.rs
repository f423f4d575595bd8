//! Loose file packages (`loosefiles_*.pack`).
//!
//! A plain sequence of files, each one stored as:
//!
//! | Offset (bytes) | Field | Description                              |
//! |----------------|-------|------------------------------------------|
//! | 0x0000         | Hash  | 4 bytes: hash of the name                |
//! | 0x0004         | Size  | 4 bytes: size of the data                |
//! | 0x0008         | Name  | 120 bytes: NUL padded path               |
//! | 0x0080         | Data  | `Size` bytes, padded to 16 bytes         |
//!
//! All fields are little endian.

use std::io::{Read, Seek};

use binrw::BinRead;
use sab_core::{cursor::trim_nul, OutputSink, StreamCursor};
use tracing::{debug, instrument};

use crate::error::Result;

/// Header preceding every file of a loose file package
#[derive(BinRead, Debug, Clone, PartialEq, Eq)]
#[br(little)]
pub struct LooseFileHeader {
    /// Hash of the name
    pub hash: u32,
    /// Size of the data
    pub size: u32,
    /// Path of the file
    #[br(map = |raw: [u8; 120]| trim_nul(&raw))]
    pub name: String,
}

/// A file of a loose file package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LooseFile {
    /// Header of the file
    pub header: LooseFileHeader,
    /// Offset of the data
    pub offset: u64,
}

/// Walks every header of a loose file package from its start.
#[instrument(skip(cursor))]
pub fn read_loose_files<R: Read + Seek>(cursor: &mut StreamCursor<R>) -> Result<Vec<LooseFile>> {
    cursor.seek(0)?;
    let size = cursor.size()?;
    let mut files = Vec::new();

    while cursor.tell()? < size {
        let header: LooseFileHeader = cursor.read_record()?;
        let offset = cursor.tell()?;
        debug!("{} at {:#x}", header.name, offset);

        cursor.skip(header.size as i64)?;
        cursor.apply_padding(16)?;
        files.push(LooseFile { header, offset });
    }

    Ok(files)
}

/// Finds the first file whose name ends with `suffix`.
pub fn find_loose_file<R: Read + Seek>(
    cursor: &mut StreamCursor<R>,
    suffix: &str,
) -> Result<Option<LooseFile>> {
    Ok(read_loose_files(cursor)?
        .into_iter()
        .find(|f| f.header.name.ends_with(suffix)))
}

/// Reads the data of a file found by [`read_loose_files`]
pub fn read_loose_file<R: Read + Seek>(
    cursor: &mut StreamCursor<R>,
    file: &LooseFile,
) -> Result<Vec<u8>> {
    cursor.seek(file.offset)?;
    Ok(cursor.read_bytes(file.header.size as usize)?)
}

/// Extracts every file of a loose file package under its stored path.
#[instrument(skip_all)]
pub fn extract_loose_files<R: Read + Seek>(
    cursor: &mut StreamCursor<R>,
    sink: &mut impl OutputSink,
) -> Result<usize> {
    let files = read_loose_files(cursor)?;

    for file in &files {
        let data = read_loose_file(cursor, file)?;
        sink.write_file(&file.header.name, &data)?;
    }

    Ok(files.len())
}
