//! Shader bundles (`RDHS`).
//!
//! | Field          | Description                                  |
//! |----------------|----------------------------------------------|
//! | Magic          | `RDHS`                                       |
//! | Pixel shaders  | `u32` count, then the shaders                |
//! | Vertex shaders | `u32` count, then the shaders                |
//!
//! Each shader is a `DHSP` or `DHSV` tag, three constants (`0`, `1`, `1`), the hashed name,
//! the compiled bytecode and a table of named variables.

use std::{
    collections::BTreeMap,
    io::{Read, Seek},
};

use sab_core::{
    cursor::{ensure_below, ensure_zero},
    error::Error as CoreError,
    fourcc, HashRegistry, OutputSink, StreamCursor, StringHash,
};
use tracing::{debug, instrument};

use crate::{error::Result, read_hash, write_json};

/// Magic of a shader bundle
pub const SHADER_BUNDLE_MAGIC: u32 = fourcc(b"RDHS");
/// Tag of a pixel shader
pub const PIXEL_SHADER_TAG: u32 = fourcc(b"DHSP");
/// Tag of a vertex shader
pub const VERTEX_SHADER_TAG: u32 = fourcc(b"DHSV");

/// Stage a shader runs in, selects the extension of the bytecode file
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ShaderStage {
    Pixel,
    Vertex,
}

impl ShaderStage {
    pub fn extension(self) -> &'static str {
        match self {
            ShaderStage::Pixel => "psh",
            ShaderStage::Vertex => "vsh",
        }
    }
}

/// A shader of the bundle, without its bytecode
#[derive(Debug, Clone, PartialEq)]
pub struct Shader {
    pub name: StringHash,
    pub stage: ShaderStage,
    /// Variable names and their type, `0` or `1`
    pub vars: BTreeMap<String, u32>,
}

fn expect_constant<R: Read + Seek>(
    cursor: &mut StreamCursor<R>,
    field: &'static str,
    expected: u32,
) -> Result<()> {
    match cursor.read_u32()? {
        value if value == expected => Ok(()),
        value => Err(CoreError::UnexpectedValue {
            field,
            value: value.into(),
        }
        .into()),
    }
}

fn extract_shader<R: Read + Seek>(
    cursor: &mut StreamCursor<R>,
    stage: ShaderStage,
    registry: &HashRegistry,
    sink: &mut impl OutputSink,
) -> Result<Shader> {
    let tag = cursor.read_u32()?;
    if tag != PIXEL_SHADER_TAG && tag != VERTEX_SHADER_TAG {
        return Err(CoreError::InvalidHeader(tag).into());
    }

    ensure_zero("shader null", cursor.read_u32()?)?;
    expect_constant(cursor, "shader constant", 1)?;
    expect_constant(cursor, "shader constant", 1)?;

    let name = read_hash(cursor, registry)?;
    let length = cursor.read_u32()? as usize;
    let code = cursor.read_bytes(length)?;
    sink.write_file(&format!("{name}.{}", stage.extension()), &code)?;

    let vars = cursor.read_container_with(|c| {
        let name = c.read_string()?;
        let kind = c.read_u32()?;
        ensure_below("shader variable type", kind, 2)?;
        Ok::<_, CoreError>((name, kind))
    })?;
    debug!("{name}: {} bytes, {} variables", code.len(), vars.len());

    let vars: BTreeMap<_, _> = vars.into_iter().collect();
    if !vars.is_empty() {
        write_json(sink, &format!("{name}.json"), &vars)?;
    }

    Ok(Shader { name, stage, vars })
}

/// Extracts every shader of a bundle.
///
/// Writes `<name>.psh` or `<name>.vsh` per shader, plus `<name>.json` with its variables
/// when it has any.
#[instrument(skip_all)]
pub fn extract_shaders<R: Read + Seek>(
    cursor: &mut StreamCursor<R>,
    registry: &HashRegistry,
    sink: &mut impl OutputSink,
) -> Result<Vec<Shader>> {
    cursor.read_magic(SHADER_BUNDLE_MAGIC)?;

    let mut shaders = Vec::new();
    for stage in [ShaderStage::Pixel, ShaderStage::Vertex] {
        let count = cursor.read_u32()?;
        for _ in 0..count {
            shaders.push(extract_shader(cursor, stage, registry, sink)?);
        }
    }
    Ok(shaders)
}
