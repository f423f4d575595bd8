//! Textures (`DTEX`).
//!
//! | Field              | Type     | Description                                   |
//! |--------------------|----------|-----------------------------------------------|
//! | Magic              | `u32`    | `DTEX`                                        |
//! | Name               | string   | `u32` length, bytes                           |
//! | Format             | `u32`    | `DXT1`, `DXT5` or `21` (BGRA8)                |
//! | Unknown            | `u32`    |                                               |
//! | Width, height      | `u16`    |                                               |
//! | Mip count          | `u16`    |                                               |
//! | Uncompressed size  | `u32`    | upper bound of a stream once inflated         |
//! | Stream count       | `u32`    |                                               |
//! | Streams            |          | `u32` length, zlib data                       |
//!
//! Every inflated stream starts with 24 bytes of per-stream header that are not part of
//! the image. Textures embedded in packs without data are stored as a bare magic.

use std::io::{Read, Seek};

use binrw::BinRead;
use sab_core::{compression::inflate, fourcc, OutputSink, StreamCursor};
use tracing::{debug, instrument};

use crate::{
    dds::{DdsHeader, DxgiFormat},
    error::{Error, Result},
};

/// Magic of a texture
pub const TEXTURE_MAGIC: u32 = fourcc(b"DTEX");

/// Format tag of uncompressed BGRA8 textures
pub const FORMAT_B8G8R8A8: u32 = 21;

const STREAM_HEADER_SIZE: usize = 24;

#[derive(BinRead, Debug, Clone, PartialEq, Eq)]
pub struct TextureHeader {
    pub format: u32,
    pub unk: u32,
    pub width: u16,
    pub height: u16,
    pub num_mips: u16,
    pub uncompressed_size: u32,
    pub num_streams: u32,
}

impl TextureHeader {
    pub fn dxgi_format(&self) -> Result<DxgiFormat> {
        match self.format {
            f if f == fourcc(b"DXT1") => Ok(DxgiFormat::Bc1Unorm),
            f if f == fourcc(b"DXT5") => Ok(DxgiFormat::Bc3Unorm),
            FORMAT_B8G8R8A8 => Ok(DxgiFormat::B8G8R8A8Unorm),
            f => Err(Error::UnknownTextureFormat(f)),
        }
    }
}

/// Converts a texture to `<name>.dds`, returning the texture name.
#[instrument(skip_all)]
pub fn extract_texture<R: Read + Seek>(
    cursor: &mut StreamCursor<R>,
    sink: &mut impl OutputSink,
) -> Result<String> {
    cursor.read_magic(TEXTURE_MAGIC)?;
    if cursor.is_eof()? {
        return Err(Error::EmptyTexture);
    }

    let name = cursor.read_string()?;
    let header: TextureHeader = cursor.read_record()?;
    let format = header.dxgi_format()?;
    debug!(
        "{name}: {}x{}, {:?}, {} mips",
        header.width, header.height, format, header.num_mips
    );

    let dds = DdsHeader::texture_2d(
        header.width.into(),
        header.height.into(),
        header.num_mips.into(),
        format,
    );
    sink.new_file(&format!("{name}.dds"))?;
    sink.send_data(&dds.to_bytes()?)?;

    for _ in 0..header.num_streams {
        let length = cursor.read_u32()? as usize;
        let data = cursor.read_bytes(length)?;
        let image = inflate(&data, header.uncompressed_size as usize, true)?;
        sink.send_data(image.get(STREAM_HEADER_SIZE..).unwrap_or_default())?;
    }

    Ok(name)
}
