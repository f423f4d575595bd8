//! Mesh packs embedded in dynamic and tile packs (`AHSM`).
//!
//! | Offset (bytes) | Field               | Description                        |
//! |----------------|---------------------|------------------------------------|
//! | 0x0000         | Magic               | 4 bytes: `AHSM`                    |
//! | 0x0004         | Mesh size           | 4 bytes: uncompressed mesh size    |
//! | 0x0008         | Buffer size         | 4 bytes: uncompressed buffer size  |
//! | 0x000C         | Mesh stored size    | 4 bytes                            |
//! | 0x0010         | Buffer stored size  | 4 bytes                            |
//! | 0x0014         | Name                | 256 bytes: NUL padded              |
//!
//! The mesh description lacks its `MESH` magic, it is restored on extraction. The buffer
//! holds the vertex and index data the mesh refers to.

use std::io::{Read, Seek};

use binrw::BinRead;
use sab_core::{
    cursor::{ensure_tag, trim_nul},
    extract, fourcc, OutputSink, StreamCursor,
};
use tracing::{debug, instrument};

use crate::error::Result;

/// Magic of an embedded mesh pack
pub const MESH_PACK_MAGIC: u32 = fourcc(b"AHSM");

/// Header of an embedded mesh pack
#[derive(BinRead, Debug, Clone, PartialEq, Eq)]
pub struct MeshPackHeader {
    /// Always [`MESH_PACK_MAGIC`]
    pub id: u32,
    /// Size of the mesh description
    pub mesh_size: u32,
    /// Size of the vertex and index buffer
    pub buffer_size: u32,
    /// Stored size of the mesh description, `0` when absent
    pub mesh_stored_size: u32,
    /// Stored size of the buffer, `0` when absent
    pub buffer_stored_size: u32,
    /// Name of the mesh
    #[br(map = |raw: [u8; 0x100]| trim_nul(&raw))]
    pub name: String,
}

/// Extracts `<prefix><name>.msh` and `<prefix><name>.dat`, returning the mesh name.
#[instrument(skip(cursor, sink))]
pub fn extract_mesh_pack<R: Read + Seek>(
    cursor: &mut StreamCursor<R>,
    prefix: &str,
    sink: &mut impl OutputSink,
) -> Result<String> {
    let header: MeshPackHeader = cursor.read_record()?;
    ensure_tag(header.id, MESH_PACK_MAGIC)?;
    debug!("mesh {}", header.name);

    let file_name = format!("{prefix}{}", header.name);

    if header.mesh_stored_size > 0 {
        let magic: &[u8] = if cursor.is_swapped() { b"HSEM" } else { b"MESH" };
        let data = extract(cursor, header.mesh_stored_size, header.mesh_size)?;
        sink.new_file(&format!("{file_name}.msh"))?;
        sink.send_data(magic)?;
        sink.send_data(&data)?;
    }

    if header.buffer_stored_size > 0 {
        let data = extract(cursor, header.buffer_stored_size, header.buffer_size)?;
        sink.write_file(&format!("{file_name}.dat"), &data)?;
    }

    Ok(header.name)
}
