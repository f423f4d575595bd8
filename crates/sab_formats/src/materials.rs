//! Material banks (`OASW`).
//!
//! A fixed header of table sizes follows the magic, then tagged blocks until the end of the
//! file. Blocks hold no count of their own, they are sized by the header.
//!
//! | Tag    | Block   | Contents                                                     |
//! |--------|---------|--------------------------------------------------------------|
//! | `TSSW` | WSST    | two lists of state tables, each table a `u32` counted list   |
//! | `PCSW` | WSCP    | constant property tables                                     |
//! | `PPSW` | WSPP    | pixel property tables, `u32` counted vectors and a null `u64`|
//! | `PVSW` | WSVP    | vertex property tables, same layout as WSPP                  |
//! | `XTSW` | WSTX    | texture identifiers                                          |
//! | `APSW` | WSPA    | render passes, indexing the tables above                     |
//! | `AMSW` | WSMA    | materials, indexing textures and render passes               |
//!
//! Every material is resolved against its render pass and written on its own.

use std::{
    collections::BTreeMap,
    io::{Read, Seek},
};

use binrw::BinRead;
use sab_core::{
    cursor::ensure_zero, error::Error as CoreError, fourcc, HashRegistry, OutputSink,
    StreamCursor, StringHash,
};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::{
    error::{Error, Result},
    read_hash, write_json,
};

/// Magic of a material bank
pub const MATERIAL_BANK_MAGIC: u32 = fourcc(b"OASW");

const WSST_TAG: u32 = fourcc(b"TSSW");
const WSCP_TAG: u32 = fourcc(b"PCSW");
const WSPP_TAG: u32 = fourcc(b"PPSW");
const WSVP_TAG: u32 = fourcc(b"PVSW");
const WSTX_TAG: u32 = fourcc(b"XTSW");
const WSPA_TAG: u32 = fourcc(b"APSW");
const WSMA_TAG: u32 = fourcc(b"AMSW");

/// Table sizes of a material bank
#[derive(BinRead, Debug, Default, Clone, PartialEq, Eq)]
pub struct MaterialBankHeader {
    pub num_materials: u32,
    pub num_wsma: u32,
    pub num_wsst0: u32,
    pub num_st0_subitems: u32,
    pub num_wsst1: u32,
    pub num_st1_subitems: u32,
    pub num_wsvp: u32,
    pub num_vp_subitems: u32,
    pub unk1: [u32; 2],
    pub num_wspp: u32,
    pub num_pp_subitems: u32,
    pub unk2: [u32; 2],
    pub num_wscp: u32,
    pub num_cp_subitems: u32,
    pub num_wstx: u32,
    pub unk: u32,
    pub num_wspa: u32,
}

#[derive(BinRead, Serialize, Debug, Copy, Clone, PartialEq, Eq)]
pub struct StateItem {
    pub unk0: u32,
    pub unk1: u32,
}

#[derive(BinRead, Serialize, Debug, Copy, Clone, PartialEq)]
pub struct ConstantProperty {
    pub id: u32,
    pub data: [f32; 4],
}

/// Render pass, the shading setup shared by materials
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPass {
    pub id: StringHash,
    pub flags: u32,
    /// Index into the first state list, negative when unused
    pub st0_index: i32,
    /// Index into the second state list, negative when unused
    pub st1_index: i32,
    pub constant_property_index: u32,
    pub pixel_property_index: u32,
    pub vertex_property_index: u32,
    pub pixel_shader: StringHash,
    pub vertex_shader: StringHash,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaterialEntry {
    pub uid: StringHash,
    pub index: u32,
    pub num_textures: u32,
    pub texture_begin: u32,
    pub render_pass_index: u32,
}

/// Tables of a material bank, as read
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MaterialBank {
    pub header: MaterialBankHeader,
    pub states: [Vec<Vec<StateItem>>; 2],
    pub constant_properties: Vec<Vec<ConstantProperty>>,
    pub pixel_properties: Vec<Vec<[f32; 4]>>,
    pub vertex_properties: Vec<Vec<[f32; 4]>>,
    pub textures: Vec<StringHash>,
    pub render_passes: Vec<RenderPass>,
    /// Materials by identifier, an entry lists every identifier it is known by
    pub materials: BTreeMap<u32, MaterialEntry>,
}

/// A material resolved against its render pass
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Material {
    pub uid: StringHash,
    pub textures: Vec<StringHash>,
    pub index: u32,
    pub render_pass: StringHash,
    pub flags: u32,
    pub st0: Vec<StateItem>,
    pub st1: Vec<StateItem>,
    pub constant_properties: Vec<ConstantProperty>,
    pub pixel_properties: Vec<[f32; 4]>,
    pub vertex_properties: Vec<[f32; 4]>,
    pub pixel_shader: StringHash,
    pub vertex_shader: StringHash,
    pub version: u32,
}

fn at<'a, T>(table: &'a [T], field: &'static str, index: usize) -> Result<&'a T> {
    table.get(index).ok_or(Error::IndexOutOfRange {
        field,
        index,
        len: table.len(),
    })
}

fn read_property_tables<R: Read + Seek>(
    cursor: &mut StreamCursor<R>,
    count: u32,
) -> Result<Vec<Vec<[f32; 4]>>> {
    (0..count)
        .map(|_| -> Result<Vec<[f32; 4]>> {
            let items = cursor.read_container()?;
            ensure_zero("property table null", cursor.read_u64()?)?;
            Ok(items)
        })
        .collect()
}

impl MaterialBank {
    /// Reads the header and every block of a bank
    pub fn read<R: Read + Seek>(
        cursor: &mut StreamCursor<R>,
        registry: &HashRegistry,
    ) -> Result<Self> {
        cursor.read_magic(MATERIAL_BANK_MAGIC)?;
        let header: MaterialBankHeader = cursor.read_record()?;
        let size = cursor.size()?;
        let mut bank = MaterialBank {
            header,
            ..Default::default()
        };

        while cursor.tell()? < size {
            let tag = cursor.read_u32()?;
            match tag {
                WSST_TAG => bank.read_states(cursor)?,
                WSCP_TAG => {
                    bank.constant_properties = (0..bank.header.num_wscp)
                        .map(|_| cursor.read_container())
                        .collect::<sab_core::error::Result<_>>()?;
                }
                WSPP_TAG => {
                    bank.pixel_properties = read_property_tables(cursor, bank.header.num_wspp)?
                }
                WSVP_TAG => {
                    bank.vertex_properties = read_property_tables(cursor, bank.header.num_wsvp)?
                }
                WSTX_TAG => {
                    bank.textures = (0..bank.header.num_wstx)
                        .map(|_| read_hash(cursor, registry))
                        .collect::<Result<_>>()?;
                }
                WSPA_TAG => bank.read_render_passes(cursor, registry)?,
                WSMA_TAG => bank.read_materials(cursor, registry)?,
                _ => return Err(CoreError::UnknownBlock(tag).into()),
            }
        }

        debug!(
            "{} materials, {} render passes, {} textures",
            bank.materials.len(),
            bank.render_passes.len(),
            bank.textures.len()
        );
        Ok(bank)
    }

    fn read_states<R: Read + Seek>(&mut self, cursor: &mut StreamCursor<R>) -> Result<()> {
        let counts = [self.header.num_wsst0, self.header.num_wsst1];
        for (states, count) in self.states.iter_mut().zip(counts) {
            *states = (0..count)
                .map(|_| cursor.read_container())
                .collect::<sab_core::error::Result<_>>()?;
        }
        Ok(())
    }

    fn read_render_passes<R: Read + Seek>(
        &mut self,
        cursor: &mut StreamCursor<R>,
        registry: &HashRegistry,
    ) -> Result<()> {
        self.render_passes = (0..self.header.num_wspa)
            .map(|_| -> Result<RenderPass> {
                Ok(RenderPass {
                    id: read_hash(cursor, registry)?,
                    flags: cursor.read_u32()?,
                    st0_index: cursor.read_i32()?,
                    st1_index: cursor.read_i32()?,
                    constant_property_index: cursor.read_u32()?,
                    pixel_property_index: cursor.read_u32()?,
                    vertex_property_index: cursor.read_u32()?,
                    pixel_shader: read_hash(cursor, registry)?,
                    vertex_shader: read_hash(cursor, registry)?,
                })
            })
            .collect::<Result<_>>()?;
        Ok(())
    }

    fn read_materials<R: Read + Seek>(
        &mut self,
        cursor: &mut StreamCursor<R>,
        registry: &HashRegistry,
    ) -> Result<()> {
        for _ in 0..self.header.num_wsma {
            let uid = read_hash(cursor, registry)?;
            let identifiers = cursor.read_container::<u32>()?;
            let entry = MaterialEntry {
                uid,
                index: cursor.read_u32()?,
                num_textures: cursor.read_u32()?,
                texture_begin: cursor.read_u32()?,
                render_pass_index: cursor.read_u32()?,
            };

            for id in identifiers {
                self.materials.entry(id).or_insert_with(|| entry.clone());
            }
        }
        Ok(())
    }

    /// Resolves a material entry against the tables of the bank
    pub fn resolve(&self, entry: &MaterialEntry) -> Result<Material> {
        let begin = entry.texture_begin as usize;
        let end = begin + entry.num_textures as usize;
        let textures = self
            .textures
            .get(begin..end)
            .ok_or(Error::IndexOutOfRange {
                field: "texture",
                index: end,
                len: self.textures.len(),
            })?
            .to_vec();

        let pass = at(
            &self.render_passes,
            "render pass",
            entry.render_pass_index as usize,
        )?;

        let state = |list: usize, index: i32, field: &'static str| -> Result<Vec<StateItem>> {
            match usize::try_from(index) {
                Ok(index) => Ok(at(&self.states[list], field, index)?.clone()),
                Err(_) => Ok(Vec::new()),
            }
        };

        Ok(Material {
            uid: entry.uid.clone(),
            textures,
            index: entry.index,
            render_pass: pass.id.clone(),
            flags: pass.flags,
            st0: state(0, pass.st0_index, "st0")?,
            st1: state(1, pass.st1_index, "st1")?,
            constant_properties: at(
                &self.constant_properties,
                "constant property",
                pass.constant_property_index as usize,
            )?
            .clone(),
            pixel_properties: at(
                &self.pixel_properties,
                "pixel property",
                pass.pixel_property_index as usize,
            )?
            .clone(),
            vertex_properties: at(
                &self.vertex_properties,
                "vertex property",
                pass.vertex_property_index as usize,
            )?
            .clone(),
            pixel_shader: pass.pixel_shader.clone(),
            vertex_shader: pass.vertex_shader.clone(),
            version: 1,
        })
    }
}

/// Extracts every material of a bank as `<first character>/<identifier>.json`.
///
/// Materials are written in identifier order, returns how many were written.
#[instrument(skip_all)]
pub fn extract_materials<R: Read + Seek>(
    cursor: &mut StreamCursor<R>,
    registry: &HashRegistry,
    sink: &mut impl OutputSink,
) -> Result<usize> {
    let bank = MaterialBank::read(cursor, registry)?;

    for (id, entry) in &bank.materials {
        let material = bank.resolve(entry)?;
        let name = registry.lookup(*id).to_string();
        let folder = name.chars().next().unwrap_or('_');
        write_json(sink, &format!("{folder}/{name}.json"), &material)?;
    }

    Ok(bank.materials.len())
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use pretty_assertions::assert_eq;
    use sab_core::MemorySink;

    use super::*;

    fn words(out: &mut Vec<u8>, values: &[u32]) {
        values
            .iter()
            .for_each(|v| out.extend_from_slice(&v.to_le_bytes()));
    }

    fn floats(out: &mut Vec<u8>, values: &[f32]) {
        values
            .iter()
            .for_each(|v| out.extend_from_slice(&v.to_le_bytes()));
    }

    fn bank() -> Vec<u8> {
        let mut out = b"OASW".to_vec();
        #[rustfmt::skip]
        let header = [
            1, 2,       // materials, WSMA
            1, 1, 0, 0, // WSST
            1, 0,       // WSVP
            0, 0,
            1, 0,       // WSPP
            0, 0,
            1, 0,       // WSCP
            3, 0, 1,    // WSTX, unk, WSPA
        ];
        words(&mut out, &header);

        out.extend_from_slice(b"XTSW");
        words(&mut out, &[0xA0, 0xA1, 0xA2]);

        out.extend_from_slice(b"TSSW");
        words(&mut out, &[1, 5, 6]);

        out.extend_from_slice(b"PCSW");
        words(&mut out, &[1, 9]);
        floats(&mut out, &[1.0, 2.0, 3.0, 4.0]);

        out.extend_from_slice(b"PPSW");
        words(&mut out, &[1]);
        floats(&mut out, &[0.5; 4]);
        words(&mut out, &[0, 0]);

        out.extend_from_slice(b"PVSW");
        words(&mut out, &[0, 0, 0]);

        out.extend_from_slice(b"APSW");
        words(&mut out, &[0xBEEF, 3, 0, u32::MAX, 0, 0, 0, 0x11, 0x12]);

        out.extend_from_slice(b"AMSW");
        // two identifiers, the second one is shadowed by the first entry
        words(&mut out, &[0xC0, 2, 0xD1, 0xD2, 7, 2, 1, 0]);
        words(&mut out, &[0xC1, 1, 0xD2, 8, 0, 0, 0]);
        out
    }

    #[test]
    fn resolves_render_passes() -> Result<()> {
        let registry = HashRegistry::new();
        let mut sink = MemorySink::new();
        let count = extract_materials(
            &mut StreamCursor::new(Cursor::new(bank())),
            &registry,
            &mut sink,
        )?;

        assert_eq!(count, 2);
        assert_eq!(
            sink.files().keys().cloned().collect::<Vec<_>>(),
            vec!["D/D1.json", "D/D2.json"]
        );

        let json: serde_json::Value =
            serde_json::from_slice(sink.get("D/D2.json").unwrap_or_default())?;
        assert_eq!(json["uid"], "C0");
        assert_eq!(json["textures"], serde_json::json!(["A1", "A2"]));
        assert_eq!(json["renderPass"], "BEEF");
        assert_eq!(json["st0"], serde_json::json!([{ "unk0": 5, "unk1": 6 }]));
        assert_eq!(json["st1"], serde_json::json!([]));
        assert_eq!(
            json["constantProperties"],
            serde_json::json!([{ "id": 9, "data": [1.0, 2.0, 3.0, 4.0] }])
        );
        assert_eq!(json["vertexProperties"], serde_json::json!([]));
        assert_eq!(json["pixelShader"], "11");
        assert_eq!(json["version"], 1);
        Ok(())
    }

    #[test]
    fn rejects_dangling_render_pass() -> Result<()> {
        let mut data = bank();
        // point the first material at a second render pass
        let position = data.len() - 4 * 8;
        data[position..position + 4].copy_from_slice(&1u32.to_le_bytes());

        let result = extract_materials(
            &mut StreamCursor::new(Cursor::new(data)),
            &HashRegistry::new(),
            &mut MemorySink::new(),
        );
        assert!(matches!(
            result,
            Err(Error::IndexOutOfRange { field: "render pass", index: 1, len: 1 })
        ));
        Ok(())
    }
}
