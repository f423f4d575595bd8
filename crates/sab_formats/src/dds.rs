//! DDS container headers, always written with the DX10 extension.
//!
//! | Offset | Field          | Description                                  |
//! |--------|----------------|----------------------------------------------|
//! | 0x00   | Magic          | `DDS `                                       |
//! | 0x04   | Header         | 124 bytes, pixel format set to `DX10`        |
//! | 0x80   | DX10 header    | 20 bytes, DXGI format and resource dimension |
//! | 0x94   | Data           | mip levels, largest first                    |

use std::io::Cursor;

use binrw::BinWrite;

use crate::error::Result;

pub const DDSD_CAPS: u32 = 0x1;
pub const DDSD_HEIGHT: u32 = 0x2;
pub const DDSD_WIDTH: u32 = 0x4;
pub const DDSD_PIXELFORMAT: u32 = 0x1000;
pub const DDSD_MIPMAPCOUNT: u32 = 0x20000;

pub const DDPF_FOURCC: u32 = 0x4;

pub const DDSCAPS_COMPLEX: u32 = 0x8;
pub const DDSCAPS_TEXTURE: u32 = 0x1000;
pub const DDSCAPS_MIPMAP: u32 = 0x40_0000;

pub const D3D10_RESOURCE_DIMENSION_TEXTURE2D: u32 = 3;

/// DXGI formats the game's textures map to
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u32)]
pub enum DxgiFormat {
    Bc1Unorm = 71,
    Bc3Unorm = 77,
    B8G8R8A8Unorm = 87,
}

#[derive(BinWrite, Debug, Clone, PartialEq, Eq)]
pub struct DdsPixelFormat {
    pub size: u32,
    pub flags: u32,
    pub four_cc: [u8; 4],
    pub rgb_bit_count: u32,
    pub bit_masks: [u32; 4],
}

#[derive(BinWrite, Debug, Clone, PartialEq, Eq)]
pub struct DdsHeaderDxt10 {
    pub dxgi_format: u32,
    pub resource_dimension: u32,
    pub misc_flag: u32,
    pub array_size: u32,
    pub misc_flags2: u32,
}

/// Magic, legacy header and DX10 extension of a DDS file
#[derive(BinWrite, Debug, Clone, PartialEq, Eq)]
#[bw(little, magic = b"DDS ")]
pub struct DdsHeader {
    pub size: u32,
    pub flags: u32,
    pub height: u32,
    pub width: u32,
    pub pitch_or_linear_size: u32,
    pub depth: u32,
    pub mipmap_count: u32,
    pub reserved1: [u32; 11],
    pub pixel_format: DdsPixelFormat,
    pub caps: u32,
    pub caps2: u32,
    pub caps3: u32,
    pub caps4: u32,
    pub reserved2: u32,
    pub dxt10: DdsHeaderDxt10,
}

impl DdsHeader {
    /// Size of the legacy header, without magic and extension
    pub const SIZE: u32 = 124;
    /// Bytes written by [`DdsHeader::to_bytes`]
    pub const ENCODED_SIZE: usize = 4 + Self::SIZE as usize + 20;

    /// Header of a 2D texture with `mipmap_count` levels
    pub fn texture_2d(width: u32, height: u32, mipmap_count: u32, format: DxgiFormat) -> Self {
        let mipmap_count = mipmap_count.max(1);
        let caps = if mipmap_count > 1 {
            DDSCAPS_TEXTURE | DDSCAPS_COMPLEX | DDSCAPS_MIPMAP
        } else {
            DDSCAPS_TEXTURE
        };

        Self {
            size: Self::SIZE,
            flags: DDSD_CAPS | DDSD_HEIGHT | DDSD_WIDTH | DDSD_PIXELFORMAT | DDSD_MIPMAPCOUNT,
            height,
            width,
            pitch_or_linear_size: 0,
            depth: 0,
            mipmap_count,
            reserved1: [0; 11],
            pixel_format: DdsPixelFormat {
                size: 32,
                flags: DDPF_FOURCC,
                four_cc: *b"DX10",
                rgb_bit_count: 0,
                bit_masks: [0; 4],
            },
            caps,
            caps2: 0,
            caps3: 0,
            caps4: 0,
            reserved2: 0,
            dxt10: DdsHeaderDxt10 {
                dxgi_format: format as u32,
                resource_dimension: D3D10_RESOURCE_DIMENSION_TEXTURE2D,
                misc_flag: 0,
                array_size: 1,
                misc_flags2: 0,
            },
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = Cursor::new(Vec::with_capacity(Self::ENCODED_SIZE));
        self.write(&mut writer)?;
        Ok(writer.into_inner())
    }
}
