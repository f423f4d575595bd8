//! Whole-block and segmented zlib payloads.
//!
//! A payload is stored in one of three ways:
//!
//! | Layout    | Detection                                   | Decoding                                  |
//! |-----------|---------------------------------------------|-------------------------------------------|
//! | Segmented | payload starts with `sges`                  | chunk table, one raw deflate per chunk    |
//! | Raw       | compressed size equals uncompressed size    | copied through                            |
//! | Zlib      | anything else                               | one zlib stream                           |
//!
//! ## Segment table
//!
//! | Offset (bytes) | Field             | Description                                 |
//! |----------------|-------------------|---------------------------------------------|
//! | 0x0000         | Magic             | 4 bytes: `sges`                             |
//! | 0x0004         | Version           | 2 bytes                                     |
//! | 0x0006         | Chunk count       | 2 bytes                                     |
//! | 0x0008         | Uncompressed size | 4 bytes: total size of the payload          |
//! | 0x000C         | Compressed size   | 4 bytes: total size of the segmented block  |
//!
//! Followed by one 8 byte entry per chunk: compressed size (`u16`), uncompressed size
//! (`u16`, `0` meaning `0x10000`) and the offset of the chunk data plus one, relative to
//! the segment table magic.

use std::io::{Read, Seek};

use binrw::BinRead;
use flate2::{Decompress, FlushDecompress, Status};
use tracing::{debug, instrument};

use crate::{
    cursor::StreamCursor,
    error::{Error, Result},
    fourcc::fourcc,
};

/// Tag starting a segmented payload
pub const SEGMENT_MAGIC: u32 = fourcc(b"sges");

/// Output size of a chunk declaring an uncompressed size of `0`
pub const FULL_CHUNK_SIZE: usize = 0x10000;

const INFLATE_STEP: usize = 0x10000;

/// Header of a segmented payload
#[derive(BinRead, Debug, Copy, Clone, PartialEq)]
pub struct SegmentHeader {
    /// Always [`SEGMENT_MAGIC`]
    pub id: u32,
    /// Format version
    pub version: u16,
    /// Number of chunks following the header
    pub num_chunks: u16,
    /// Size of the reassembled payload
    pub uncompressed_size: u32,
    /// Size of the whole segmented block
    pub compressed_size: u32,
}

/// Single chunk of a segmented payload
#[derive(BinRead, Debug, Copy, Clone, PartialEq)]
pub struct SegmentChunk {
    /// Size of the raw deflate data
    pub compressed_size: u16,
    /// Size of the chunk once inflated, `0` for a full chunk
    pub uncompressed_size: u16,
    /// Offset of the deflate data plus one
    pub offset: u32,
}

impl SegmentChunk {
    /// Number of bytes the chunk inflates to
    pub fn output_size(&self) -> usize {
        match self.uncompressed_size {
            0 => FULL_CHUNK_SIZE,
            size => size as usize,
        }
    }
}

/// Chunk table of a segmented payload
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentTable {
    /// Table header
    pub header: SegmentHeader,
    /// Chunks in payload order
    pub chunks: Vec<SegmentChunk>,
}

impl SegmentTable {
    /// Reads the table at the cursor's position
    pub fn read<R: Read + Seek>(cursor: &mut StreamCursor<R>) -> Result<Self> {
        let header: SegmentHeader = cursor.read_record()?;
        if header.id != SEGMENT_MAGIC {
            return Err(Error::InvalidHeader(header.id));
        }
        let chunks = cursor.read_records(header.num_chunks as usize)?;
        Ok(Self { header, chunks })
    }

    /// Sum of every chunk's output size
    pub fn total_uncompressed(&self) -> usize {
        self.chunks.iter().map(SegmentChunk::output_size).sum()
    }
}

/// Inflates `input` into at most `size` bytes.
///
/// `zlib_header` selects zlib framing, otherwise the input is raw deflate. A stream that
/// ends early yields a shorter buffer, while input that runs out before either the end of
/// the stream or `size` bytes is a [`Error::Decompression`].
pub fn inflate(input: &[u8], size: usize, zlib_header: bool) -> Result<Vec<u8>> {
    let mut decompress = Decompress::new(zlib_header);
    let mut output = Vec::with_capacity(size.min(INFLATE_STEP));

    while output.len() < size {
        if output.len() == output.capacity() {
            output.reserve_exact((size - output.len()).min(INFLATE_STEP));
        }

        let consumed = decompress.total_in() as usize;
        let written = output.len();
        let status = decompress
            .decompress_vec(&input[consumed..], &mut output, FlushDecompress::None)
            .map_err(|e| Error::Decompression(e.to_string()))?;

        if status == Status::StreamEnd {
            break;
        }
        if decompress.total_in() as usize == consumed && output.len() == written {
            return Err(Error::Decompression(format!(
                "stream truncated after {} of {} bytes",
                written, size
            )));
        }
    }

    output.truncate(size);
    Ok(output)
}

/// Reads a payload of `compressed` bytes at the cursor and returns its `uncompressed` form.
///
/// The cursor always ends up right after the `compressed` bytes of the payload, whichever
/// layout it uses.
#[instrument(skip(cursor))]
pub fn extract<R: Read + Seek>(
    cursor: &mut StreamCursor<R>,
    compressed: u32,
    uncompressed: u32,
) -> Result<Vec<u8>> {
    if compressed >= 4 && cursor.peek_u32()? == SEGMENT_MAGIC {
        return extract_segmented(cursor, compressed);
    }

    if compressed == uncompressed {
        return cursor.read_bytes(compressed as usize);
    }

    let data = cursor.read_bytes(compressed as usize)?;
    inflate(&data, uncompressed as usize, true)
}

fn extract_segmented<R: Read + Seek>(
    cursor: &mut StreamCursor<R>,
    compressed: u32,
) -> Result<Vec<u8>> {
    let start = cursor.tell()?;

    cursor.push()?;
    cursor.set_relative_origin()?;
    let output = read_segments(cursor);
    cursor.pop()?;

    cursor.seek(start + compressed as u64)?;
    output
}

fn read_segments<R: Read + Seek>(cursor: &mut StreamCursor<R>) -> Result<Vec<u8>> {
    let table = SegmentTable::read(cursor)?;
    debug!(
        "segmented payload, {} chunks, {} bytes",
        table.chunks.len(),
        table.header.uncompressed_size
    );

    let mut output = Vec::with_capacity(table.total_uncompressed());
    for (index, chunk) in table.chunks.iter().enumerate() {
        let offset = chunk
            .offset
            .checked_sub(1)
            .ok_or(Error::InvalidSegmentOffset(index))?;
        cursor.seek(offset as u64)?;

        let data = cursor.read_bytes(chunk.compressed_size as usize)?;
        output.extend_from_slice(&inflate(&data, chunk.output_size(), false)?);
    }

    Ok(output)
}

#[cfg(test)]
mod test {
    use std::io::{Cursor, Write};

    use flate2::{
        write::{DeflateEncoder, ZlibEncoder},
        Compression,
    };
    use pretty_assertions::assert_eq;

    use super::*;

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn segmented(chunks: &[&[u8]]) -> Vec<u8> {
        let header_size = 16 + 8 * chunks.len();
        let mut table = Vec::new();
        let mut body = Vec::new();
        for chunk in chunks {
            let packed = deflate(chunk);
            let offset = header_size + body.len() + 1;
            table.extend_from_slice(&(packed.len() as u16).to_le_bytes());
            table.extend_from_slice(&(chunk.len() as u16).to_le_bytes());
            table.extend_from_slice(&(offset as u32).to_le_bytes());
            body.extend_from_slice(&packed);
        }

        let total: usize = chunks.iter().map(|c| c.len()).sum();
        let mut out = Vec::new();
        out.extend_from_slice(b"sges");
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&(chunks.len() as u16).to_le_bytes());
        out.extend_from_slice(&(total as u32).to_le_bytes());
        out.extend_from_slice(&((header_size + body.len()) as u32).to_le_bytes());
        out.extend_from_slice(&table);
        out.extend_from_slice(&body);
        out
    }

    #[test]
    fn raw_payload_is_copied() -> Result<()> {
        let data = b"stored raw".to_vec();
        let mut cursor = StreamCursor::new(Cursor::new(data.clone()));
        let out = extract(&mut cursor, data.len() as u32, data.len() as u32)?;
        assert_eq!(out, data);
        Ok(())
    }

    #[test]
    fn segment_tag_wins_over_equal_sizes() -> Result<()> {
        let plain = b"abcdefghijklmnopqrstuvwxyz".repeat(4);
        let payload = segmented(&[&plain]);

        let mut stream = payload.clone();
        stream.push(0x44);
        let mut cursor = StreamCursor::new(Cursor::new(stream));

        let size = payload.len() as u32;
        let out = extract(&mut cursor, size, size)?;
        assert_eq!(out, plain);
        assert_eq!(cursor.read_u8()?, 0x44);
        Ok(())
    }

    #[test]
    fn zlib_payload() -> Result<()> {
        let plain = b"the saboteur ".repeat(20);
        let packed = zlib(&plain);

        let mut stream = packed.clone();
        stream.extend_from_slice(&[0xAA, 0xBB]);
        let mut cursor = StreamCursor::new(Cursor::new(stream));

        let out = extract(&mut cursor, packed.len() as u32, plain.len() as u32)?;
        assert_eq!(out, plain);
        assert_eq!(cursor.read_u8()?, 0xAA);
        Ok(())
    }

    #[test]
    fn short_output_is_truncated() -> Result<()> {
        let plain = b"short".to_vec();
        let packed = zlib(&plain);
        let out = inflate(&packed, 64, true)?;
        assert_eq!(out, plain);
        Ok(())
    }

    #[test]
    fn truncated_payload() {
        let plain = (0..4000u32)
            .map(|i| (i.wrapping_mul(2_654_435_761) >> 13) as u8)
            .collect::<Vec<_>>();
        let packed = zlib(&plain);
        let cut = packed[..packed.len() / 2].to_vec();

        let mut cursor = StreamCursor::new(Cursor::new(cut.clone()));
        assert!(matches!(
            extract(&mut cursor, cut.len() as u32, plain.len() as u32),
            Err(Error::Decompression(_))
        ));

        let packed = deflate(&plain);
        assert!(matches!(
            inflate(&packed[..packed.len() / 2], plain.len(), false),
            Err(Error::Decompression(_))
        ));
    }

    #[test]
    fn large_declared_size() -> Result<()> {
        let plain = b"the saboteur ".repeat(20);
        let out = inflate(&zlib(&plain), u32::MAX as usize, true)?;
        assert_eq!(out, plain);
        Ok(())
    }

    #[test]
    fn corrupt_payload() {
        let mut cursor = StreamCursor::new(Cursor::new(vec![0xFF; 8]));
        assert!(matches!(
            extract(&mut cursor, 8, 16),
            Err(Error::Decompression(_))
        ));
    }

    #[test]
    fn segmented_payload() -> Result<()> {
        let first = vec![b'a'; 300];
        let second = b"second chunk".to_vec();
        let payload = segmented(&[&first, &second]);

        let mut stream = vec![0x11, 0x22];
        stream.extend_from_slice(&payload);
        stream.push(0x33);

        let mut cursor = StreamCursor::new(Cursor::new(stream));
        cursor.seek(2)?;
        let out = extract(&mut cursor, payload.len() as u32, 312)?;

        assert_eq!(out.len(), first.len() + second.len());
        assert_eq!(&out[..300], &first[..]);
        assert_eq!(&out[300..], &second[..]);
        assert_eq!(cursor.read_u8()?, 0x33);
        Ok(())
    }

    #[test]
    fn segment_sizes() -> Result<()> {
        let full = vec![7u8; FULL_CHUNK_SIZE];
        let tail = vec![9u8; 10];
        let mut payload = segmented(&[&full, &tail]);
        // a full chunk is declared as 0
        payload[18..20].copy_from_slice(&0u16.to_le_bytes());

        let mut cursor = StreamCursor::new(Cursor::new(payload.clone()));
        let table = SegmentTable::read(&mut cursor)?;
        assert_eq!(table.total_uncompressed(), FULL_CHUNK_SIZE + 10);

        let mut cursor = StreamCursor::new(Cursor::new(payload.clone()));
        let out = extract(&mut cursor, payload.len() as u32, 0)?;
        assert_eq!(out.len(), table.total_uncompressed());
        Ok(())
    }

    #[test]
    fn zero_segment_offset() {
        let mut payload = segmented(&[b"abc"]);
        payload[20..24].copy_from_slice(&0u32.to_le_bytes());

        let mut cursor = StreamCursor::new(Cursor::new(payload.clone()));
        assert!(matches!(
            extract(&mut cursor, payload.len() as u32, 3),
            Err(Error::InvalidSegmentOffset(0))
        ));
    }
}
