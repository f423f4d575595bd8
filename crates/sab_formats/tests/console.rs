use std::io::{Cursor, Write};

use flate2::{write::ZlibEncoder, Compression};
use pretty_assertions::assert_eq;
use sab_core::{hash_string, HashRegistry, MemorySink, StreamCursor};
use sab_formats::{
    error::Result,
    extract_shaders, extract_texture,
    shaders::ShaderStage,
};

fn words_be(out: &mut Vec<u8>, values: &[u32]) {
    values
        .iter()
        .for_each(|v| out.extend_from_slice(&v.to_be_bytes()));
}

#[test]
fn big_endian_shader_bundle() -> Result<()> {
    let registry = HashRegistry::from_dictionary("skin_vs\n");

    let mut data = b"SHDR".to_vec();
    words_be(&mut data, &[0, 1]);
    data.extend_from_slice(b"VSHD");
    words_be(&mut data, &[0, 1, 1, hash_string("skin_vs"), 4]);
    data.extend_from_slice(b"\xFE\xFF\x00\x03");
    words_be(&mut data, &[1, 6]);
    data.extend_from_slice(b"gBone\0");
    words_be(&mut data, &[1]);

    let mut sink = MemorySink::new();
    let shaders = extract_shaders(&mut StreamCursor::new(Cursor::new(data)), &registry, &mut sink)?;

    assert_eq!(shaders.len(), 1);
    assert_eq!(shaders[0].stage, ShaderStage::Vertex);
    assert_eq!(shaders[0].name.name(), Some("skin_vs"));
    assert_eq!(sink.get("skin_vs.vsh"), Some(&b"\xFE\xFF\x00\x03"[..]));
    assert_eq!(
        std::str::from_utf8(sink.get("skin_vs.json").unwrap_or_default()).unwrap_or_default(),
        "{\n  \"gBone\": 1\n}"
    );
    Ok(())
}

#[test]
fn big_endian_texture() -> Result<()> {
    let mut stream = vec![0u8; 24];
    stream.extend_from_slice(&[0x7F; 16]);
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&stream)?;
    let compressed = encoder.finish()?;

    let mut data = b"XETD".to_vec();
    words_be(&mut data, &[4]);
    data.extend_from_slice(b"wall");
    words_be(&mut data, &[21, 0]);
    for v in [2u16, 2, 1] {
        data.extend_from_slice(&v.to_be_bytes());
    }
    words_be(&mut data, &[0x100, 1, compressed.len() as u32]);
    data.extend_from_slice(&compressed);

    let mut sink = MemorySink::new();
    let name = extract_texture(&mut StreamCursor::new(Cursor::new(data)), &mut sink)?;
    assert_eq!(name, "wall");

    let dds = sink.get("wall.dds").unwrap_or_default();
    assert_eq!(&dds[..4], b"DDS ");
    // height and width stay little endian in the output
    assert_eq!(&dds[12..20], &[2, 0, 0, 0, 2, 0, 0, 0]);
    assert_eq!(dds[128], 87);
    assert_eq!(&dds[148..], &[0x7F; 16]);
    Ok(())
}
