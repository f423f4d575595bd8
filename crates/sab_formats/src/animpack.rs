//! Animation packs (`L0PA`).
//!
//! After the magic, the pack is a sequence of blocks, each introduced by a tag and running
//! until the next one:
//!
//! | Tag    | Block         | JSON key          | Contents                                         |
//! |--------|---------------|-------------------|--------------------------------------------------|
//! | `MINA` | ANIM          | `anims`           | animation table, then the Havok animation blob   |
//! | `VTNI` | INTV          | `interruptions`   | interruption groups                              |
//! | `CQES` | SEQC          | `sequences`       | animation sequences                              |
//! | `NART` | TRAN          | `transitions`     | transitions between animations                   |
//! | `EGDE` | EDGE          |                   | 5030 opaque values                               |
//! | `TSID` | DIST          | `dists`           | 24 floats                                        |
//! | `KNAB` | BANK          | `banks`           | named animation banks                            |
//! | `1DDA` | ADD1          | `adds`            | additive pairs                                   |
//! | `HPLA` | ALPH          | `alpha`           | two identifier lists                             |
//! | `0PSS` | SSP0          | `ssp`             | streamed animations, one Havok blob each         |
//! | `AMNA` | ANMA          |                   | skipped                                          |
//!
//! Most fields are only partially understood, they keep their position based names
//! (`unk0`, `unk1`, ...) and are written out as read.

use std::io::{Read, Seek};

use binrw::BinRead;
use sab_core::{
    cursor::ensure_zero, error::Error as CoreError, fourcc, HashRegistry, OutputSink,
    StreamCursor, StringHash,
};
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::{
    bind_or_lookup,
    error::{Error, Result},
    read_hash, read_hashes, write_json,
};

/// Magic of an animation pack
pub const ANIM_PACK_MAGIC: u32 = fourcc(b"L0PA");

const ANIM_TAG: u32 = fourcc(b"MINA");
const INTV_TAG: u32 = fourcc(b"VTNI");
const SEQC_TAG: u32 = fourcc(b"CQES");
const TRAN_TAG: u32 = fourcc(b"NART");
const EDGE_TAG: u32 = fourcc(b"EGDE");
const DIST_TAG: u32 = fourcc(b"TSID");
const BANK_TAG: u32 = fourcc(b"KNAB");
const ADD1_TAG: u32 = fourcc(b"1DDA");
const ALPH_TAG: u32 = fourcc(b"HPLA");
const SSP0_TAG: u32 = fourcc(b"0PSS");
const ANMA_TAG: u32 = fourcc(b"AMNA");

const EDGE_VALUES: i64 = 5030;
const DIST_VALUES: usize = 24;
const SSP_GROUP_MARKER: u32 = 8;
const SSP_GROUP_SIZE: usize = 17;
const COPY_BLOCK: usize = 0x40000;

#[derive(BinRead, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnimExtra {
    pub unk2: u32,
    #[serde(skip)]
    pub null: u8,
    pub unk0: [f32; 2],
    pub unk1: u32,
}

/// Entry of the animation table
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Anim {
    pub id: StringHash,
    /// Bones driven by the animation, empty for streamed animations
    pub bones: Vec<u32>,
    /// Length in seconds
    pub duration: f32,
    pub unk0: [f32; 8],
    /// Whether the animation lives in an SSP0 block
    pub streamed: bool,
    pub unk1: bool,
    pub unk4: bool,
    pub unk2: Vec<[u32; 10]>,
    pub unk3: Vec<AnimExtra>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Interruption {
    pub id: StringHash,
    pub unk: u32,
    pub anim_ids: Vec<StringHash>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SequenceStep {
    pub unk0: u32,
    pub unk1: i32,
    pub anims: Vec<StringHash>,
    pub tags: Vec<StringHash>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Sequence {
    pub id: StringHash,
    pub unk0: Vec<SequenceStep>,
    pub unk1: [f32; 5],
    pub unk2: u32,
    pub unk3: [f32; 4],
    pub unk4: Vec<[f32; 2]>,
    pub unk5: Vec<[f32; 2]>,
    pub unk6: Vec<[f32; 2]>,
    pub is_looped: bool,
    pub unk7: bool,
}

/// One way of moving from an animation to another
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransitionItem {
    pub from: StringHash,
    pub from_tag: StringHash,
    pub to: StringHash,
    pub to_tag: StringHash,
    pub unk0: [u32; 3],
    pub tag: StringHash,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unk1: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unk2: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unk3: Option<[u32; 3]>,
    pub name: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Transition {
    pub id: StringHash,
    pub items: Vec<TransitionItem>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct BankItem {
    pub unk0: StringHash,
    pub unk1: StringHash,
    pub unk2: Vec<StringHash>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Bank {
    pub id: StringHash,
    pub parent: StringHash,
    pub items: Vec<BankItem>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Additive {
    pub unk0: StringHash,
    pub unk1: StringHash,
    pub unk2: u32,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Alpha {
    pub unk0: Vec<StringHash>,
    pub unk1: Vec<StringHash>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SspUnk0 {
    pub id: StringHash,
    pub unk: u32,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SspRange {
    pub id: StringHash,
    pub count: u32,
    pub begin: u32,
}

/// Streamed animation, its blob is written to `<id>.hkx`
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SspAnim {
    pub id: StringHash,
    #[serde(skip)]
    pub size: u32,
    /// Absolute position in the pack
    #[serde(skip)]
    pub offset: u32,
    pub bones: Vec<StringHash>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct Ssp {
    pub groups: Vec<Vec<StringHash>>,
    pub unk0: Vec<SspUnk0>,
    pub unk1: Vec<SspRange>,
    pub unk2: Vec<SspAnim>,
    pub unk3: Vec<SspAnim>,
}

/// Everything decoded from an animation pack, serialized as `animations.json`
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct AnimPack {
    pub version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anims: Option<Vec<Anim>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interruptions: Option<Vec<Interruption>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequences: Option<Vec<Sequence>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transitions: Option<Vec<Transition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dists: Option<Vec<f32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub banks: Option<Vec<Bank>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adds: Option<Vec<Additive>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alpha: Option<Alpha>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssp: Option<Ssp>,
}

impl Default for AnimPack {
    fn default() -> Self {
        Self {
            version: 1,
            anims: None,
            interruptions: None,
            sequences: None,
            transitions: None,
            dists: None,
            banks: None,
            adds: None,
            alpha: None,
            ssp: None,
        }
    }
}

type BlockDecoder<'a, R, S> = fn(&mut AnimPackReader<'a, S>, &mut StreamCursor<R>) -> Result<()>;

struct AnimPackReader<'a, S> {
    registry: &'a HashRegistry,
    sink: &'a mut S,
    pack: AnimPack,
}

impl<'a, S: OutputSink> AnimPackReader<'a, S> {
    fn decoder<R: Read + Seek>(tag: u32) -> Option<BlockDecoder<'a, R, S>> {
        let decoder: BlockDecoder<'a, R, S> = match tag {
            ANIM_TAG => Self::read_anims,
            INTV_TAG => Self::read_interruptions,
            SEQC_TAG => Self::read_sequences,
            TRAN_TAG => Self::read_transitions,
            EDGE_TAG => Self::skip_edges,
            DIST_TAG => Self::read_dists,
            BANK_TAG => Self::read_banks,
            ADD1_TAG => Self::read_adds,
            ALPH_TAG => Self::read_alpha,
            SSP0_TAG => Self::read_ssp,
            ANMA_TAG => Self::skip_anma,
            _ => return None,
        };
        Some(decoder)
    }

    fn read_anim<R: Read + Seek>(&self, cursor: &mut StreamCursor<R>) -> Result<Anim> {
        let id = cursor.read_u32()?;
        let unk4 = cursor.read_bool()?;
        let streamed = cursor.read_bool()?;
        let name = cursor.read_string()?;
        let duration = cursor.read_f32()?;
        let id = bind_or_lookup(self.registry, id, &name);

        let bones = if streamed {
            Vec::new()
        } else {
            cursor.read_container()?
        };
        let unk0 = cursor.read_f32_array()?;
        let unk1 = cursor.read_bool()?;
        let unk2 = cursor.read_container()?;
        let unk3: Vec<AnimExtra> = cursor.read_container()?;
        for extra in &unk3 {
            ensure_zero("anim extra null", extra.null)?;
        }

        Ok(Anim {
            id,
            bones,
            duration,
            unk0,
            streamed,
            unk1,
            unk4,
            unk2,
            unk3,
        })
    }

    fn read_anims<R: Read + Seek>(&mut self, cursor: &mut StreamCursor<R>) -> Result<()> {
        let anims = cursor.read_container_with(|c| self.read_anim(c))?;
        let num_anims = cursor.read_u32()?;
        let hk_size = cursor.read_u32()? as usize;
        debug!("{} animations ({} in blob), blob of {} bytes", anims.len(), num_anims, hk_size);

        self.sink.new_file("animations.hkx")?;
        let mut remaining = hk_size;
        while remaining > 0 {
            let block = cursor.read_bytes(remaining.min(COPY_BLOCK))?;
            remaining -= block.len();
            self.sink.send_data(&block)?;
        }

        // constant, same value in every pack
        cursor.read_u32()?;

        self.pack.anims = Some(anims);
        Ok(())
    }

    fn read_interruptions<R: Read + Seek>(&mut self, cursor: &mut StreamCursor<R>) -> Result<()> {
        let registry = self.registry;
        let items = cursor.read_container_with(|c| {
            Ok::<_, Error>(Interruption {
                id: read_hash(c, registry)?,
                unk: c.read_u32()?,
                anim_ids: read_hashes(c, registry)?,
            })
        })?;
        self.pack.interruptions = Some(items);
        Ok(())
    }

    fn read_sequence<R: Read + Seek>(&self, cursor: &mut StreamCursor<R>) -> Result<Sequence> {
        let registry = self.registry;
        let id = read_hash(cursor, registry)?;
        let unk0 = cursor.read_container_with(|c| {
            Ok::<_, Error>(SequenceStep {
                unk0: c.read_u32()?,
                unk1: c.read_i32()?,
                anims: read_hashes(c, registry)?,
                tags: read_hashes(c, registry)?,
            })
        })?;
        let unk1 = cursor.read_f32_array()?;
        let unk2 = cursor.read_u32()?;
        let unk3 = cursor.read_f32_array()?;

        let counts = [cursor.read_u8()?, cursor.read_u8()?, cursor.read_u8()?];
        let unk4 = cursor.read_records(counts[0] as usize)?;
        let unk5 = cursor.read_records(counts[1] as usize)?;
        let unk6 = cursor.read_records(counts[2] as usize)?;

        Ok(Sequence {
            id,
            unk0,
            unk1,
            unk2,
            unk3,
            unk4,
            unk5,
            unk6,
            is_looped: cursor.read_bool()?,
            unk7: cursor.read_bool()?,
        })
    }

    fn read_sequences<R: Read + Seek>(&mut self, cursor: &mut StreamCursor<R>) -> Result<()> {
        let sequences = cursor.read_container_with(|c| self.read_sequence(c))?;
        self.pack.sequences = Some(sequences);
        Ok(())
    }

    fn read_transition_item<R: Read + Seek>(
        &self,
        cursor: &mut StreamCursor<R>,
    ) -> Result<TransitionItem> {
        let registry = self.registry;
        let from = read_hash(cursor, registry)?;
        let from_tag = read_hash(cursor, registry)?;
        let to = read_hash(cursor, registry)?;
        let to_tag = read_hash(cursor, registry)?;
        let unk0 = [cursor.read_u32()?, cursor.read_u32()?, cursor.read_u32()?];
        let tag = cursor.read_u32()?;

        let (unk1, unk2, unk3) = if tag != 0 {
            (Some(cursor.read_u32s(16)?), Some(cursor.read_u8()?), None)
        } else {
            let unk3 = [cursor.read_u32()?, cursor.read_u32()?, cursor.read_u32()?];
            (None, None, Some(unk3))
        };

        let name = cursor.read_string16()?;
        bind_name_tokens(registry, &name);

        Ok(TransitionItem {
            from,
            from_tag,
            to,
            to_tag,
            unk0,
            tag: registry.lookup(tag),
            unk1,
            unk2,
            unk3,
            name,
        })
    }

    fn read_transitions<R: Read + Seek>(&mut self, cursor: &mut StreamCursor<R>) -> Result<()> {
        let transitions = cursor.read_container_with(|c| {
            Ok::<_, Error>(Transition {
                id: read_hash(c, self.registry)?,
                items: c.read_container_with(|c| self.read_transition_item(c))?,
            })
        })?;
        self.pack.transitions = Some(transitions);
        Ok(())
    }

    fn skip_edges<R: Read + Seek>(&mut self, cursor: &mut StreamCursor<R>) -> Result<()> {
        cursor.skip(EDGE_VALUES * 4)?;
        Ok(())
    }

    fn read_dists<R: Read + Seek>(&mut self, cursor: &mut StreamCursor<R>) -> Result<()> {
        self.pack.dists = Some(cursor.read_f32s(DIST_VALUES)?);
        Ok(())
    }

    fn read_bank<R: Read + Seek>(&self, cursor: &mut StreamCursor<R>) -> Result<Bank> {
        let registry = self.registry;
        let id = cursor.read_u32()?;
        let name = cursor.read_string16()?;
        let parent = read_hash(cursor, registry)?;
        let id = bind_or_lookup(registry, id, &name);

        let items = cursor.read_container_with(|c| {
            Ok::<_, Error>(BankItem {
                unk0: read_hash(c, registry)?,
                unk1: read_hash(c, registry)?,
                unk2: read_hashes(c, registry)?,
            })
        })?;

        Ok(Bank { id, parent, items })
    }

    fn read_banks<R: Read + Seek>(&mut self, cursor: &mut StreamCursor<R>) -> Result<()> {
        let banks = cursor.read_container_with(|c| self.read_bank(c))?;
        self.pack.banks = Some(banks);
        Ok(())
    }

    fn read_adds<R: Read + Seek>(&mut self, cursor: &mut StreamCursor<R>) -> Result<()> {
        let registry = self.registry;
        let adds = cursor.read_container_with(|c| {
            Ok::<_, Error>(Additive {
                unk0: read_hash(c, registry)?,
                unk1: read_hash(c, registry)?,
                unk2: c.read_u32()?,
            })
        })?;
        self.pack.adds = Some(adds);
        Ok(())
    }

    fn read_alpha<R: Read + Seek>(&mut self, cursor: &mut StreamCursor<R>) -> Result<()> {
        self.pack.alpha = Some(Alpha {
            unk0: read_hashes(cursor, self.registry)?,
            unk1: read_hashes(cursor, self.registry)?,
        });
        Ok(())
    }

    fn read_ssp_anims<R: Read + Seek>(
        &self,
        cursor: &mut StreamCursor<R>,
        count: usize,
    ) -> Result<Vec<SspAnim>> {
        (0..count)
            .map(|_| -> Result<SspAnim> {
                Ok(SspAnim {
                    id: read_hash(cursor, self.registry)?,
                    size: cursor.read_u32()?,
                    offset: cursor.read_u32()?,
                    bones: Vec::new(),
                })
            })
            .collect()
    }

    /// Writes the blob of each animation, returning the furthest position read.
    fn extract_ssp_anims<R: Read + Seek>(
        &mut self,
        cursor: &mut StreamCursor<R>,
        anims: &mut [SspAnim],
    ) -> Result<u64> {
        let mut end = 0;
        for anim in anims {
            cursor.seek(anim.offset as u64)?;
            let _id = cursor.read_u64()?;
            let length = cursor.read_u32()? as usize;
            let data = cursor.read_bytes(length)?;
            anim.bones = read_hashes(cursor, self.registry)?;
            end = end.max(cursor.tell()?);

            self.sink.write_file(&format!("{}.hkx", anim.id), &data)?;
        }
        Ok(end)
    }

    fn read_ssp<R: Read + Seek>(&mut self, cursor: &mut StreamCursor<R>) -> Result<()> {
        let registry = self.registry;
        let mut ssp = Ssp::default();

        if cursor.peek_u32()? == SSP_GROUP_MARKER {
            ssp.groups = cursor.read_container_with(|c| {
                (0..SSP_GROUP_SIZE)
                    .map(|_| read_hash(c, registry))
                    .collect::<Result<Vec<_>>>()
            })?;
        }

        ssp.unk0 = cursor.read_container_with(|c| {
            Ok::<_, Error>(SspUnk0 {
                id: read_hash(c, registry)?,
                unk: c.read_u32()?,
            })
        })?;
        ssp.unk1 = cursor.read_container_with(|c| {
            Ok::<_, Error>(SspRange {
                id: read_hash(c, registry)?,
                count: c.read_u32()?,
                begin: c.read_u32()?,
            })
        })?;

        let num_anims0 = cursor.read_u32()? as usize;
        let num_anims1 = cursor.read_u32()? as usize;
        ssp.unk2 = self.read_ssp_anims(cursor, num_anims0)?;
        ssp.unk3 = self.read_ssp_anims(cursor, num_anims1)?;

        cursor.push()?;
        let extracted = self
            .extract_ssp_anims(cursor, &mut ssp.unk2)
            .and_then(|end| Ok(end.max(self.extract_ssp_anims(cursor, &mut ssp.unk3)?)));
        cursor.pop()?;

        // blobs stored right behind the table are not blocks
        let end = extracted?;
        if end > cursor.tell()? {
            cursor.seek(end)?;
        }

        self.pack.ssp = Some(ssp);
        Ok(())
    }

    fn skip_anma<R: Read + Seek>(&mut self, cursor: &mut StreamCursor<R>) -> Result<()> {
        // spl2
        cursor.read_u32()?;
        let size = cursor.read_u32()?;
        cursor.skip(size as i64)?;
        let count = cursor.read_u32()?;
        cursor.skip(count as i64 * 4)?;
        Ok(())
    }
}

/// Binds every identifier-like token of a transition name.
///
/// Tokens are runs of ASCII alphanumerics and `_`.
fn bind_name_tokens(registry: &HashRegistry, name: &str) {
    name.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|token| !token.is_empty())
        .for_each(|token| {
            if let Err(e) = registry.bind_name(token) {
                warn!("{}", e);
            }
        });
}

/// Decodes an animation pack.
///
/// Writes `animations.hkx`, one `<id>.hkx` per streamed animation and `animations.json`.
#[instrument(skip_all)]
pub fn extract_anim_pack<R: Read + Seek>(
    cursor: &mut StreamCursor<R>,
    registry: &HashRegistry,
    sink: &mut impl OutputSink,
) -> Result<AnimPack> {
    cursor.read_magic(ANIM_PACK_MAGIC)?;
    let size = cursor.size()?;

    let mut reader = AnimPackReader {
        registry,
        sink,
        pack: AnimPack::default(),
    };

    while cursor.tell()? < size {
        let tag = cursor.read_u32()?;
        let decoder = AnimPackReader::decoder(tag).ok_or(CoreError::UnknownBlock(tag))?;
        decoder(&mut reader, cursor)?;
    }

    write_json(reader.sink, "animations.json", &reader.pack)?;
    Ok(reader.pack)
}
