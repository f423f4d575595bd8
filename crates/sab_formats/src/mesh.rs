//! Meshes (`MESH`) and their vertex buffers (`.dat`).
//!
//! The mesh file describes the geometry, the buffers live in a sibling file with the same
//! stem and a `.dat` extension:
//!
//! | Section        | Present when              | Contents                                           |
//! |----------------|---------------------------|----------------------------------------------------|
//! | Header         | always                    | bounding box, name, table sizes                    |
//! | Skeleton       | more than one bone        | bone ids, local matrices, bones, TRS, parents      |
//! | Bone remaps    | remap count not zero      | skin slot to bone id, with a bind matrix           |
//! | Streams        | stream count not zero     | vertex format, buffer offsets, strides             |
//! | Primitives     |                           | index ranges into a stream                         |
//! | Draw calls     |                           | primitive and material pairs                       |
//!
//! Vertex streams declare a format tag selecting which channels are interleaved, see
//! [`vertex_layout`]. Streams with an unknown format are skipped.

use std::io::{Cursor, Read, Seek};

use glam::{Mat4, Quat, Vec3, Vec4};
use half::f16;
use sab_core::{
    cursor::ensure_zero, error::Error as CoreError, fourcc, HashRegistry, OutputSink,
    StreamCursor, StringHash,
};
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::{
    error::{Error, Result},
    read_hash, write_json,
};

/// Magic of a mesh description
pub const MESH_MAGIC: u32 = fourcc(b"MESH");

/// Face type of indexed triangle lists, the only one in use
const FACE_TYPE_TRIANGLES: u32 = 1;

fn read_nulls<R: Read + Seek>(
    cursor: &mut StreamCursor<R>,
    count: usize,
    field: &'static str,
) -> Result<()> {
    for _ in 0..count {
        cursor.read_reserved_u32(field)?;
    }
    Ok(())
}

fn read_vec3<R: Read + Seek>(cursor: &mut StreamCursor<R>) -> Result<Vec3> {
    Ok(Vec3::from_array(cursor.read_f32_array()?))
}

fn read_vec4<R: Read + Seek>(cursor: &mut StreamCursor<R>) -> Result<Vec4> {
    Ok(Vec4::from_array(cursor.read_f32_array()?))
}

fn read_mat4<R: Read + Seek>(cursor: &mut StreamCursor<R>) -> Result<Mat4> {
    Ok(Mat4::from_cols_array(&cursor.read_f32_array()?))
}

fn unexpected(field: &'static str, value: impl Into<u64>) -> Error {
    CoreError::UnexpectedValue {
        field,
        value: value.into(),
    }
    .into()
}

#[derive(Serialize, Debug, Copy, Clone, PartialEq)]
pub struct BoundingBox {
    pub min: Vec4,
    pub max: Vec4,
}

impl BoundingBox {
    fn read<R: Read + Seek>(cursor: &mut StreamCursor<R>) -> Result<Self> {
        Ok(Self {
            min: read_vec4(cursor)?,
            max: read_vec4(cursor)?,
        })
    }
}

/// Table sizes and identity of a mesh
#[derive(Debug, Clone, PartialEq)]
pub struct MeshHeader {
    pub bbox_min: Vec3,
    pub bbox_max: Vec4,
    pub name: StringHash,
    pub unk0: u32,
    pub num_bones: u32,
    pub num_bone_remaps: u32,
    pub num_streams: u16,
    pub num_primitives: u16,
    pub num_draw_calls: u32,
}

impl MeshHeader {
    pub fn read<R: Read + Seek>(
        cursor: &mut StreamCursor<R>,
        registry: &HashRegistry,
    ) -> Result<Self> {
        read_nulls(cursor, 19, "mesh header null")?;
        let bbox_min = read_vec3(cursor)?;
        let bbox_max = read_vec4(cursor)?;
        read_nulls(cursor, 11, "mesh header null")?;
        let name = read_hash(cursor, registry)?;
        read_nulls(cursor, 8, "mesh header null")?;
        let unk0 = cursor.read_u32()?;
        read_nulls(cursor, 4, "mesh header null")?;

        let num_bones = cursor.read_u32()?;
        let num_bone_remaps = cursor.read_u32()?;
        read_nulls(cursor, 1, "mesh header null")?;
        let num_streams = cursor.read_u16()?;
        let num_primitives = cursor.read_u16()?;
        read_nulls(cursor, 3, "mesh header null")?;
        let num_draw_calls = cursor.read_u32()?;
        read_nulls(cursor, 2, "mesh header null")?;

        if num_bones == 0 {
            return Err(unexpected("mesh bone count", num_bones));
        }

        Ok(Self {
            bbox_min,
            bbox_max,
            name,
            unk0,
            num_bones,
            num_bone_remaps,
            num_streams,
            num_primitives,
            num_draw_calls,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bone {
    pub name0: StringHash,
    pub name1: StringHash,
    pub unk0: u32,
    pub bbox: BoundingBox,
}

/// Rest pose of a bone, relative to its parent
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct BoneTransform {
    pub translation: Vec4,
    pub rotation: Quat,
    pub scale: Vec4,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Skeleton {
    /// Bone index of each skin slot
    pub bone_ids: Vec<u8>,
    pub local_tms: Vec<Mat4>,
    pub bones: Vec<Bone>,
    pub transforms: Vec<BoneTransform>,
    /// Parent bone of each bone, negative for roots
    pub parent_ids: Vec<i16>,
    pub ibms: Vec<Mat4>,
}

impl Skeleton {
    pub fn read<R: Read + Seek>(
        cursor: &mut StreamCursor<R>,
        registry: &HashRegistry,
    ) -> Result<Self> {
        let num_unk_bones0 = cursor.read_u32()?;
        read_nulls(cursor, 2, "skeleton null")?;
        let num_bones = cursor.read_u32()?;
        let num_unk_bones1 = cursor.read_u32()?;
        let num_bones3 = cursor.read_u32()?;
        read_nulls(cursor, 1, "skeleton null")?;
        let num_bones4 = cursor.read_u32()?;
        read_nulls(cursor, 3, "skeleton null")?;

        for other in [num_bones3, num_bones4] {
            if other != num_bones {
                return Err(unexpected("skeleton bone count", other));
            }
        }
        let count = num_bones as usize;

        let bone_ids = cursor.read_bytes(count)?;
        for _ in 0..num_unk_bones0 {
            ensure_zero("skeleton padding", cursor.read_u8()?)?;
        }

        let local_tms = (0..count)
            .map(|_| read_mat4(cursor))
            .collect::<Result<Vec<_>>>()?;

        let bones = (0..count)
            .map(|_| -> Result<Bone> {
                let name0 = read_hash(cursor, registry)?;
                read_nulls(cursor, 4, "bone null")?;
                let name1 = read_hash(cursor, registry)?;
                read_nulls(cursor, 1, "bone null")?;
                Ok(Bone {
                    name0,
                    name1,
                    unk0: cursor.read_u32()?,
                    bbox: BoundingBox::read(cursor)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let transforms = (0..count)
            .map(|_| -> Result<BoneTransform> {
                Ok(BoneTransform {
                    translation: read_vec4(cursor)?,
                    rotation: Quat::from_vec4(read_vec4(cursor)?),
                    scale: read_vec4(cursor)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let parent_ids = (0..count)
            .map(|_| cursor.read_i16())
            .collect::<sab_core::error::Result<Vec<_>>>()?;

        read_nulls(cursor, count, "skeleton null")?;
        if num_unk_bones1 != 0 {
            cursor.read_reserved_u16("skeleton null")?;
        }

        let ibms = inverse_bind_matrices(&local_tms, &parent_ids)?;

        Ok(Self {
            bone_ids,
            local_tms,
            bones,
            transforms,
            parent_ids,
            ibms,
        })
    }
}

/// Computes the inverse bind matrix of every bone.
///
/// The bind matrix of a bone is its local matrix composed with the bind matrix of its
/// parent. The tree is walked once from its roots with an explicit stack, so the result
/// only depends on the parent links, not on the order of the bones.
pub fn inverse_bind_matrices(locals: &[Mat4], parents: &[i16]) -> Result<Vec<Mat4>> {
    let count = locals.len();
    let mut children = vec![Vec::new(); count];
    let mut stack = Vec::new();

    for (bone, &parent) in parents.iter().enumerate().take(count) {
        match usize::try_from(parent) {
            Err(_) => stack.push((bone, Mat4::IDENTITY)),
            Ok(parent) if parent < count => children[parent].push(bone),
            Ok(parent) => {
                return Err(Error::IndexOutOfRange {
                    field: "parent bone",
                    index: parent,
                    len: count,
                })
            }
        }
    }

    let mut binds: Vec<Option<Mat4>> = vec![None; count];
    while let Some((bone, parent_bind)) = stack.pop() {
        let bind = parent_bind * locals[bone];
        binds[bone] = Some(bind);
        stack.extend(children[bone].iter().map(|&child| (child, bind)));
    }

    binds
        .into_iter()
        .enumerate()
        .map(|(bone, bind)| {
            bind.map(|m| m.inverse()).ok_or_else(|| {
                Error::CustomError(format!("bone {bone} is not reachable from a root"))
            })
        })
        .collect()
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct BoneRemap {
    pub ibm: Mat4,
    pub bone_id: u32,
}

/// Vertex and index buffer description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexStreamHeader {
    pub num_vertices: u32,
    pub format: u32,
    pub vertex_buffer_offset: u32,
    pub vertex_buffer_size: u32,
    pub vertex_buffer_stride: u32,
    pub index_buffer_offset: u32,
    pub index_buffer_size: u32,
    pub unk0: u32,
    pub num_indices: u32,
}

impl VertexStreamHeader {
    fn read<R: Read + Seek>(cursor: &mut StreamCursor<R>) -> Result<Self> {
        read_nulls(cursor, 6, "stream null")?;
        let num_vertices = cursor.read_u32()?;
        read_nulls(cursor, 3, "stream null")?;
        let format = cursor.read_u32()?;
        read_nulls(cursor, 11, "stream null")?;
        let vertex_buffer_offset = cursor.read_u32()?;
        read_nulls(cursor, 3, "stream null")?;
        let vertex_buffer_size = cursor.read_u32()?;
        read_nulls(cursor, 3, "stream null")?;
        let vertex_buffer_stride = cursor.read_u32()?;
        read_nulls(cursor, 1, "stream null")?;
        let index_buffer_offset = cursor.read_u32()?;
        let index_buffer_size = cursor.read_u32()?;
        let unk0 = cursor.read_u32()?;
        let face_type = cursor.read_u32()?;
        let num_indices = cursor.read_u32()?;
        read_nulls(cursor, 1, "stream null")?;

        if face_type != FACE_TYPE_TRIANGLES {
            return Err(unexpected("stream face type", face_type));
        }

        Ok(Self {
            num_vertices,
            format,
            vertex_buffer_offset,
            vertex_buffer_size,
            vertex_buffer_stride,
            index_buffer_offset,
            index_buffer_size,
            unk0,
            num_indices,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrimitiveHeader {
    pub bbox: BoundingBox,
    pub stream_index: u32,
    pub index_offset: u32,
    pub num_faces: u32,
    pub num_indices: u32,
}

impl PrimitiveHeader {
    fn read<R: Read + Seek>(cursor: &mut StreamCursor<R>) -> Result<Self> {
        read_nulls(cursor, 1, "primitive null")?;
        let marker = cursor.read_i32()?;
        if marker != -1 {
            return Err(unexpected("primitive marker", marker as u32));
        }
        read_nulls(cursor, 10, "primitive null")?;
        let bbox = BoundingBox::read(cursor)?;
        let stream_index = cursor.read_u32()?;
        read_nulls(cursor, 1, "primitive null")?;

        Ok(Self {
            bbox,
            stream_index,
            index_offset: cursor.read_u32()?,
            num_faces: cursor.read_u32()?,
            num_indices: cursor.read_u32()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub primitive_index: u32,
    pub material: StringHash,
    pub unk1: u32,
}

impl DrawCall {
    fn read<R: Read + Seek>(cursor: &mut StreamCursor<R>, registry: &HashRegistry) -> Result<Self> {
        let primitive_index = cursor.read_u32()?;
        let material = read_hash(cursor, registry)?;
        read_nulls(cursor, 1, "draw call null")?;
        Ok(Self {
            primitive_index,
            material,
            unk1: cursor.read_u32()?,
        })
    }
}

/// Interleaved vertex channel
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Channel {
    /// 4 half floats, the last one unused
    Position,
    /// 4 normalized bytes
    BoneWeights,
    /// 4 bytes
    BoneIndices,
    /// 2 half floats
    TexCoord,
    /// 3 floats
    Normal,
    /// 4 normalized bytes
    Tangent,
    /// 4 normalized bytes
    Color,
}

impl Channel {
    pub const fn size(self) -> usize {
        match self {
            Channel::Position => 8,
            Channel::Normal => 12,
            Channel::TexCoord
            | Channel::BoneWeights
            | Channel::BoneIndices
            | Channel::Tangent
            | Channel::Color => 4,
        }
    }
}

/// Channels of a vertex format, in buffer order.
///
/// Channels are packed without padding, each one starts where the previous one ends.
pub fn vertex_layout(format: u32) -> Option<&'static [Channel]> {
    use Channel::*;

    let layout: &'static [Channel] = match format {
        0x1b001102 => &[Position, TexCoord, Normal],
        0x1b001112 => &[Position, Color, TexCoord, Normal],
        0x1b001202 => &[Position, TexCoord, TexCoord, Normal],
        0x1b001302 => &[Position, TexCoord, TexCoord, TexCoord, Normal],
        0x1b001402 => &[Position, TexCoord, TexCoord, TexCoord, TexCoord, Normal],
        0x1b003102 => &[Position, TexCoord, Normal, Tangent],
        0x1b003112 => &[Position, Color, TexCoord, Normal, Tangent],
        0x1b003202 => &[Position, TexCoord, TexCoord, Normal, Tangent],
        0x1b003302 => &[Position, TexCoord, TexCoord, TexCoord, Normal, Tangent],
        0x1b003402 => &[Position, TexCoord, TexCoord, TexCoord, TexCoord, Normal, Tangent],
        0x1b001106 => &[Position, BoneWeights, BoneIndices, TexCoord, Normal],
        0x1b001206 => &[Position, BoneWeights, BoneIndices, TexCoord, TexCoord, Normal],
        0x1b001306 => &[Position, BoneWeights, BoneIndices, TexCoord, TexCoord, TexCoord, Normal],
        0x1b001116 => &[Position, BoneWeights, BoneIndices, Color, TexCoord, Normal],
        0x1b003106 => &[Position, BoneWeights, BoneIndices, TexCoord, Normal, Tangent],
        0x1b003206 => &[Position, BoneWeights, BoneIndices, TexCoord, TexCoord, Normal, Tangent],
        0x1b003306 => &[
            Position, BoneWeights, BoneIndices, TexCoord, TexCoord, TexCoord, Normal, Tangent,
        ],
        0x1b003116 => &[Position, BoneWeights, BoneIndices, Color, TexCoord, Normal, Tangent],
        _ => return None,
    };
    Some(layout)
}

/// Decoded channels of a vertex stream
#[derive(Serialize, Debug, Default, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VertexAttributes {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub positions: Vec<Vec3>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub normals: Vec<Vec3>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tex_coords: Vec<Vec<[f32; 2]>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub colors: Vec<Vec<[f32; 4]>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub joints: Vec<[u8; 4]>,
    /// Normalized to `0..=255`
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub weights: Vec<[u8; 4]>,
}

fn read_half<R: Read + Seek>(cursor: &mut StreamCursor<R>) -> Result<f32> {
    Ok(f16::from_bits(cursor.read_u16()?).to_f32())
}

fn read_unorm4<R: Read + Seek>(cursor: &mut StreamCursor<R>) -> Result<[f32; 4]> {
    let mut out = [0.0; 4];
    for value in out.iter_mut() {
        *value = f32::from(cursor.read_u8()?) / 255.0;
    }
    Ok(out)
}

fn read_bytes4<R: Read + Seek>(cursor: &mut StreamCursor<R>) -> Result<[u8; 4]> {
    Ok([
        cursor.read_u8()?,
        cursor.read_u8()?,
        cursor.read_u8()?,
        cursor.read_u8()?,
    ])
}

/// Decodes the channels of `count` vertices spaced `stride` bytes apart.
///
/// Joint indices whose weight is zero are reset to `0`.
pub fn decode_vertices<R: Read + Seek>(
    buffer: &mut StreamCursor<R>,
    layout: &[Channel],
    count: usize,
    stride: usize,
) -> Result<VertexAttributes> {
    let mut attributes = VertexAttributes::default();
    let mut offset = 0;

    for &channel in layout {
        let position = |vertex: usize| (vertex * stride + offset) as u64;

        match channel {
            Channel::Position => {
                for vertex in 0..count {
                    buffer.seek(position(vertex))?;
                    let xyz = [read_half(buffer)?, read_half(buffer)?, read_half(buffer)?];
                    attributes.positions.push(Vec3::from_array(xyz));
                }
            }
            Channel::Normal => {
                for vertex in 0..count {
                    buffer.seek(position(vertex))?;
                    attributes.normals.push(Vec3::from_array(buffer.read_f32_array()?));
                }
            }
            Channel::TexCoord => {
                let mut set = Vec::with_capacity(count);
                for vertex in 0..count {
                    buffer.seek(position(vertex))?;
                    set.push([read_half(buffer)?, read_half(buffer)?]);
                }
                attributes.tex_coords.push(set);
            }
            Channel::Color => {
                let mut set = Vec::with_capacity(count);
                for vertex in 0..count {
                    buffer.seek(position(vertex))?;
                    set.push(read_unorm4(buffer)?);
                }
                attributes.colors.push(set);
            }
            Channel::BoneWeights => {
                for vertex in 0..count {
                    buffer.seek(position(vertex))?;
                    attributes.weights.push(read_bytes4(buffer)?);
                }
            }
            Channel::BoneIndices => {
                for vertex in 0..count {
                    buffer.seek(position(vertex))?;
                    attributes.joints.push(read_bytes4(buffer)?);
                }
            }
            // not carried over
            Channel::Tangent => {}
        }

        offset += channel.size();
    }

    for (joints, weights) in attributes.joints.iter_mut().zip(&attributes.weights) {
        for (joint, weight) in joints.iter_mut().zip(weights) {
            if *weight == 0 {
                *joint = 0;
            }
        }
    }

    Ok(attributes)
}

/// Vertex stream with its decoded vertices and indices
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VertexStream {
    pub format: u32,
    pub num_vertices: u32,
    /// Empty when the format is unknown
    pub attributes: VertexAttributes,
    #[serde(skip)]
    pub indices: Vec<u16>,
}

fn read_stream<R: Read + Seek>(
    buffers: &mut StreamCursor<R>,
    header: &VertexStreamHeader,
) -> Result<VertexStream> {
    buffers.seek(header.index_buffer_offset.into())?;
    let indices = buffers.read_u16s(header.num_indices as usize)?;

    let attributes = match vertex_layout(header.format) {
        Some(layout) => {
            buffers.seek(header.vertex_buffer_offset.into())?;
            let data = buffers.read_bytes(header.vertex_buffer_size as usize)?;
            let mut vertices = StreamCursor::new(Cursor::new(data));
            vertices.set_swapped(buffers.is_swapped());

            decode_vertices(
                &mut vertices,
                layout,
                header.num_vertices as usize,
                header.vertex_buffer_stride as usize,
            )?
        }
        None => {
            warn!("undefined vertex format {:#x}, skipping stream", header.format);
            VertexAttributes::default()
        }
    };

    Ok(VertexStream {
        format: header.format,
        num_vertices: header.num_vertices,
        attributes,
        indices,
    })
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Node {
    pub name: StringHash,
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub children: Vec<usize>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Skin {
    /// Node of each skin slot
    pub joints: Vec<usize>,
    pub inverse_bind_matrices: Vec<Mat4>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Primitive {
    pub stream: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub material: Option<StringHash>,
    pub bbox: BoundingBox,
    pub indices: Vec<u16>,
}

/// A decoded mesh, serialized as `<name>.json`
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct MeshModel {
    pub name: StringHash,
    pub bbox: [Vec4; 2],
    /// One node per bone
    pub nodes: Vec<Node>,
    /// Root nodes
    pub scene: Vec<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skin: Option<Skin>,
    pub streams: Vec<VertexStream>,
    pub primitives: Vec<Primitive>,
}

fn build_nodes(skeleton: &Skeleton) -> (Vec<Node>, Vec<usize>) {
    let mut nodes: Vec<Node> = skeleton
        .bones
        .iter()
        .zip(&skeleton.transforms)
        .map(|(bone, tm)| Node {
            name: bone.name0.clone(),
            translation: tm.translation.truncate(),
            rotation: tm.rotation,
            scale: tm.scale.truncate(),
            children: Vec::new(),
        })
        .collect();

    let mut roots = Vec::new();
    for (bone, &parent) in skeleton.parent_ids.iter().enumerate() {
        match usize::try_from(parent).ok().and_then(|p| nodes.get_mut(p)) {
            Some(node) => node.children.push(bone),
            None => roots.push(bone),
        }
    }
    (nodes, roots)
}

fn build_skin(skeleton: &Skeleton, remaps: &[BoneRemap]) -> Result<Skin> {
    let mut joints = Vec::with_capacity(remaps.len());
    let mut inverse_bind_matrices = Vec::with_capacity(remaps.len());

    for remap in remaps {
        let bone = skeleton
            .bone_ids
            .get(remap.bone_id as usize)
            .map(|&b| b as usize)
            .ok_or(Error::IndexOutOfRange {
                field: "bone remap",
                index: remap.bone_id as usize,
                len: skeleton.bone_ids.len(),
            })?;
        let ibm = skeleton.ibms.get(bone).ok_or(Error::IndexOutOfRange {
            field: "bone id",
            index: bone,
            len: skeleton.ibms.len(),
        })?;
        joints.push(bone);
        inverse_bind_matrices.push(*ibm);
    }

    Ok(Skin {
        joints,
        inverse_bind_matrices,
    })
}

/// Decodes a mesh, reading vertex data from `buffers`.
///
/// `buffers` is the sibling `.dat` file, it may be omitted for meshes without streams.
#[instrument(skip_all)]
pub fn decode_mesh<R: Read + Seek, B: Read + Seek>(
    cursor: &mut StreamCursor<R>,
    buffers: Option<&mut StreamCursor<B>>,
    registry: &HashRegistry,
) -> Result<MeshModel> {
    cursor.read_magic(MESH_MAGIC)?;
    let header = MeshHeader::read(cursor, registry)?;
    debug!(
        "{}: {} bones, {} streams, {} primitives",
        header.name, header.num_bones, header.num_streams, header.num_primitives
    );

    let skeleton = if header.num_bones > 1 {
        Skeleton::read(cursor, registry)?
    } else if header.num_bone_remaps != 0 {
        return Err(unexpected("bone remap count", header.num_bone_remaps));
    } else {
        Skeleton::default()
    };
    let (nodes, scene) = build_nodes(&skeleton);

    let mut model = MeshModel {
        name: header.name.clone(),
        bbox: [header.bbox_min.extend(0.0), header.bbox_max],
        nodes,
        scene,
        skin: None,
        streams: Vec::new(),
        primitives: Vec::new(),
    };

    if header.num_streams == 0 {
        return Ok(model);
    }
    let buffers = buffers.ok_or(Error::MissingVertexBuffer(header.num_streams))?;

    let mut remaps = Vec::new();
    if header.num_bone_remaps != 0 {
        let count = cursor.read_u32()?;
        if count != header.num_bone_remaps {
            return Err(unexpected("bone remap count", count));
        }
        read_nulls(cursor, 1, "bone remap null")?;
        for _ in 0..count {
            remaps.push(BoneRemap {
                ibm: read_mat4(cursor)?,
                bone_id: cursor.read_u32()?,
            });
        }
    }

    let streams = (0..header.num_streams)
        .map(|_| VertexStreamHeader::read(cursor))
        .collect::<Result<Vec<_>>>()?;
    let primitives = (0..header.num_primitives)
        .map(|_| PrimitiveHeader::read(cursor))
        .collect::<Result<Vec<_>>>()?;
    let draw_calls = (0..header.num_draw_calls)
        .map(|_| DrawCall::read(cursor, registry))
        .collect::<Result<Vec<_>>>()?;

    model.streams = streams
        .iter()
        .map(|stream| read_stream(buffers, stream))
        .collect::<Result<_>>()?;

    for (index, primitive) in primitives.iter().enumerate() {
        let stream = primitive.stream_index as usize;
        let indices = model.streams.get(stream).map(|s| &s.indices).ok_or(
            Error::IndexOutOfRange {
                field: "primitive stream",
                index: stream,
                len: model.streams.len(),
            },
        )?;

        let begin = primitive.index_offset as usize;
        let end = begin + primitive.num_indices as usize;
        let indices = indices.get(begin..end).ok_or(Error::IndexOutOfRange {
            field: "primitive index",
            index: end,
            len: indices.len(),
        })?;

        let material = draw_calls
            .iter()
            .find(|call| call.primitive_index as usize == index)
            .map(|call| call.material.clone());

        model.primitives.push(Primitive {
            stream,
            material,
            bbox: primitive.bbox,
            indices: indices.to_vec(),
        });
    }

    if !skeleton.bone_ids.is_empty() && !remaps.is_empty() {
        model.skin = Some(build_skin(&skeleton, &remaps)?);
    }

    Ok(model)
}

/// Decodes a mesh and writes it to `<name>.json`.
pub fn extract_mesh<R: Read + Seek, B: Read + Seek>(
    cursor: &mut StreamCursor<R>,
    buffers: Option<&mut StreamCursor<B>>,
    name: &str,
    registry: &HashRegistry,
    sink: &mut impl OutputSink,
) -> Result<MeshModel> {
    let model = decode_mesh(cursor, buffers, registry)?;
    write_json(sink, &format!("{name}.json"), &model)?;
    Ok(model)
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use pretty_assertions::assert_eq;
    use sab_core::MemorySink;
    use tracing_test::traced_test;

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

    fn half(out: &mut Vec<u8>, value: f32) {
        out.extend_from_slice(&f16::from_f32(value).to_bits().to_le_bytes());
    }

    fn header(out: &mut Vec<u8>, bones: u32, remaps: u32, streams: u16) {
        out.extend_from_slice(b"MESH");
        words(out, &[0; 19]);
        floats(out, &[-1.0, -1.0, -1.0, 1.0, 1.0, 1.0, 0.0]);
        words(out, &[0; 11]);
        words(out, &[0x4D45]);
        words(out, &[0; 8]);
        words(out, &[7, 0, 0, 0, 0]);
        words(out, &[bones, remaps, 0]);
        out.extend_from_slice(&streams.to_le_bytes());
        out.extend_from_slice(&streams.to_le_bytes());
        words(out, &[0, 0, 0, streams as u32, 0, 0]);
    }

    fn translation(x: f32) -> [f32; 16] {
        Mat4::from_translation(Vec3::new(x, 0.0, 0.0)).to_cols_array()
    }

    /// Two bones, the second one child of the first
    fn skeleton(out: &mut Vec<u8>) {
        words(out, &[0, 0, 0, 2, 0, 2, 0, 2, 0, 0, 0]);
        out.extend_from_slice(&[0, 1]);
        floats(out, &translation(1.0));
        floats(out, &translation(2.0));
        for name in [0xB0, 0xB1] {
            words(out, &[name, 0, 0, 0, 0, name, 0, 0]);
            floats(out, &[0.0; 8]);
        }
        for x in [1.0, 2.0] {
            floats(out, &[x, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 0.0]);
        }
        out.extend_from_slice(&(-1i16).to_le_bytes());
        out.extend_from_slice(&0i16.to_le_bytes());
        words(out, &[0, 0]);
    }

    fn stream(out: &mut Vec<u8>, vertices: u32, format: u32, stride: u32, vb_size: u32, indices: u32) {
        words(out, &[0; 6]);
        words(out, &[vertices, 0, 0, 0, format]);
        words(out, &[0; 11]);
        // vertex buffer at 0x10, index buffer at 0
        words(out, &[0x10, 0, 0, 0, vb_size, 0, 0, 0, stride, 0, 0, indices * 2, 0, 1, indices, 0]);
    }

    fn primitive(out: &mut Vec<u8>, indices: u32) {
        words(out, &[0, u32::MAX]);
        words(out, &[0; 10]);
        floats(out, &[0.0; 8]);
        words(out, &[0, 0, 0, indices / 3, indices]);
    }

    /// Indices padded to 0x10, then the vertices
    fn buffers(indices: &[u16], vertices: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        indices
            .iter()
            .for_each(|i| out.extend_from_slice(&i.to_le_bytes()));
        out.resize(0x10, 0);
        out.extend_from_slice(vertices);
        out
    }

    #[test]
    fn static_mesh() -> Result<()> {
        let mut data = Vec::new();
        header(&mut data, 1, 0, 1);
        stream(&mut data, 3, 0x1b001102, 24, 72, 3);
        primitive(&mut data, 3);
        words(&mut data, &[0, 0x3A7, 0, 0]);

        let mut vertices = Vec::new();
        for v in 0..3 {
            for c in [v as f32, 0.5, -2.0, 1.0, 0.25, 0.75] {
                half(&mut vertices, c);
            }
            floats(&mut vertices, &[0.0, 1.0, 0.0]);
        }
        let mut dat = StreamCursor::new(Cursor::new(buffers(&[0, 1, 2], &vertices)));

        let registry = HashRegistry::new();
        let mut sink = MemorySink::new();
        let model = extract_mesh(
            &mut StreamCursor::new(Cursor::new(data)),
            Some(&mut dat),
            "crate",
            &registry,
            &mut sink,
        )?;

        assert!(model.nodes.is_empty());
        assert!(model.skin.is_none());
        let attributes = &model.streams[0].attributes;
        assert_eq!(
            attributes.positions,
            vec![
                Vec3::new(0.0, 0.5, -2.0),
                Vec3::new(1.0, 0.5, -2.0),
                Vec3::new(2.0, 0.5, -2.0)
            ]
        );
        assert_eq!(attributes.tex_coords, vec![vec![[0.25, 0.75]; 3]]);
        assert_eq!(attributes.normals, vec![Vec3::Y; 3]);
        assert_eq!(model.primitives[0].indices, vec![0, 1, 2]);
        assert_eq!(model.primitives[0].material, Some(registry.lookup(0x3A7)));

        let json: serde_json::Value = serde_json::from_slice(sink.get("crate.json").unwrap_or_default())?;
        assert_eq!(json["name"], "4D45");
        assert_eq!(json["primitives"][0]["material"], "3A7");
        Ok(())
    }

    #[test]
    fn skinned_mesh() -> Result<()> {
        let mut data = Vec::new();
        header(&mut data, 2, 1, 1);
        skeleton(&mut data);
        words(&mut data, &[1, 0]);
        floats(&mut data, &[0.0; 16]);
        words(&mut data, &[1]);
        stream(&mut data, 1, 0x1b001106, 32, 32, 3);
        primitive(&mut data, 3);
        words(&mut data, &[0, 0x3A7, 0, 0]);

        let mut vertices = Vec::new();
        (0..4).for_each(|_| half(&mut vertices, 0.0));
        // weights, joints
        vertices.extend_from_slice(&[255, 0, 0, 0]);
        vertices.extend_from_slice(&[1, 1, 1, 1]);
        (0..2).for_each(|_| half(&mut vertices, 0.0));
        floats(&mut vertices, &[0.0, 0.0, 1.0]);
        let mut dat = StreamCursor::new(Cursor::new(buffers(&[0, 0, 0], &vertices)));

        let model = decode_mesh(
            &mut StreamCursor::new(Cursor::new(data)),
            Some(&mut dat),
            &HashRegistry::new(),
        )?;

        assert_eq!(model.scene, vec![0]);
        assert_eq!(model.nodes[0].children, vec![1]);
        assert_eq!(model.nodes[1].name.to_string(), "B1");
        assert_eq!(model.nodes[1].translation, Vec3::new(2.0, 0.0, 0.0));

        let skin = model.skin.unwrap_or_else(|| panic!("mesh has a skin"));
        assert_eq!(skin.joints, vec![1]);
        assert!(skin.inverse_bind_matrices[0]
            .abs_diff_eq(Mat4::from_translation(Vec3::new(-3.0, 0.0, 0.0)), 1e-6));

        let attributes = &model.streams[0].attributes;
        assert_eq!(attributes.weights, vec![[255, 0, 0, 0]]);
        assert_eq!(attributes.joints, vec![[1, 0, 0, 0]]);
        Ok(())
    }

    #[traced_test]
    #[test]
    fn skips_unknown_vertex_format() -> Result<()> {
        let mut data = Vec::new();
        header(&mut data, 1, 0, 1);
        stream(&mut data, 1, 0x1b00ffff, 8, 8, 3);
        primitive(&mut data, 3);
        words(&mut data, &[0, 0x3A7, 0, 0]);
        let mut dat = StreamCursor::new(Cursor::new(buffers(&[0, 0, 0], &[0; 8])));

        let model = decode_mesh(
            &mut StreamCursor::new(Cursor::new(data)),
            Some(&mut dat),
            &HashRegistry::new(),
        )?;

        assert_eq!(model.streams[0].attributes, VertexAttributes::default());
        assert_eq!(model.primitives[0].indices, vec![0, 0, 0]);
        assert!(logs_contain("undefined vertex format 0x1b00ffff"));
        Ok(())
    }

    #[test]
    fn requires_vertex_buffer() {
        let mut data = Vec::new();
        header(&mut data, 1, 0, 1);
        let result = decode_mesh::<_, Cursor<Vec<u8>>>(
            &mut StreamCursor::new(Cursor::new(data)),
            None,
            &HashRegistry::new(),
        );
        assert!(matches!(result, Err(Error::MissingVertexBuffer(1))));
    }

    #[test]
    fn bind_matrices_ignore_bone_order() -> Result<()> {
        let root = Mat4::from_translation(Vec3::new(0.0, 1.0, 0.0));
        let spine = Mat4::from_rotation_z(0.5) * Mat4::from_translation(Vec3::X);
        let head = Mat4::from_scale(Vec3::splat(2.0)) * Mat4::from_translation(Vec3::Y);
        let arm = Mat4::from_translation(Vec3::Z);

        // root, spine, head, arm
        let ordered = inverse_bind_matrices(&[root, spine, head, arm], &[-1, 0, 1, 1])?;
        // head, arm, spine, root
        let shuffled = inverse_bind_matrices(&[head, arm, spine, root], &[2, 2, 3, -1])?;

        for (a, b) in [(0, 3), (1, 2), (2, 0), (3, 1)] {
            assert!(ordered[a].abs_diff_eq(shuffled[b], 1e-5));
        }
        assert!(ordered[2].abs_diff_eq((root * spine * head).inverse(), 1e-5));
        Ok(())
    }

    #[test]
    fn bind_matrices_reject_bad_parents() {
        let result = inverse_bind_matrices(&[Mat4::IDENTITY], &[4]);
        assert!(matches!(
            result,
            Err(Error::IndexOutOfRange { field: "parent bone", index: 4, len: 1 })
        ));

        let result = inverse_bind_matrices(&[Mat4::IDENTITY, Mat4::IDENTITY], &[1, 0]);
        assert!(result.is_err());
    }
}
