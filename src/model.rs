//! Structural decoding of the export blob.
//!
//! The blob is a concatenation of records located by the OFS table.  By the
//! time a record reaches this module its bounds are already fixed (see
//! [`crate::layout`]), so every decoder here works on a cursor limited to one
//! record and only checks fields.
//!
//! # Element record
//! ```text
//! 0x000  u32 id                    (must equal the OFS logical id)
//! 0x004  16 reserved bytes
//! 0x014  5 × [f32; 3]              min, max, mid, 2 reserved vectors
//! 0x050  2 × f32, u32              unknown
//! 0x05c  128-byte NUL-terminated element tag
//! 0x0dc  36-byte GUID
//! 0x100  12 reserved bytes
//! 0x10c  u16 type code
//! 0x10e  82 reserved bytes
//! 0x160  12 × u32                  unknown
//! 0x190  "MSH", u32 mesh_count
//! 0x197  mesh_count mesh records, back to back
//! ```
//!
//! # Mesh record
//! ```text
//! u32 unknown, u16 vertex_count, u16 triangle_index_count,
//! u16 edge_index_count, 2 × u16 unknown, u64 unknown
//! 9 × f32 transform, u16 aux_count
//! vertex_count × (2 × f32 texcoord, 3 × f32 normal, 3 × f32 position)
//! triangle_index_count × u16, edge_index_count × u16
//! aux_count × (2 × u16, f32)
//! ```
//!
//! # Texture record
//! ```text
//! 128-byte NUL-terminated name, 2 × u32 + 4 × u16 unknown,
//! 28 reserved bytes, raw image bytes to the end of the record
//! ```
//!
//! Reserved regions must be zero.  They are the format's only self-check on
//! record alignment, so a non-zero byte fails the record with
//! [`FormatError::ReservedFieldViolation`].

use serde::Serialize;

use crate::cursor::{nul_terminated, ByteCursor};
use crate::error::{FormatError, Result};
use crate::layout::ExportEntry;
use crate::ofs::GroupTag;

pub const MESH_MAGIC: &[u8; 3] = b"MSH";
pub const ELEMENT_HEADER_MAGIC: &[u8; 3] = b"ELM";
pub const NAME_FIELD: usize = 128;
pub const GUID_LEN:   usize = 36;

// ── Geometry ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Vertex {
    pub texcoord: [f32; 2],
    pub normal:   [f32; 3],
    pub position: [f32; 3],
}

impl Vertex {
    fn from_floats(a: [f32; 8]) -> Self {
        Self {
            texcoord: [a[0], a[1]],
            normal:   [a[2], a[3], a[4]],
            position: [a[5], a[6], a[7]],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Aabb {
    pub min:      [f32; 3],
    pub max:      [f32; 3],
    pub mid:      [f32; 3],
    /// Two trailing vectors with no known meaning.
    pub reserved: [[f32; 3]; 2],
}

impl Aabb {
    fn from_floats(a: [f32; 15]) -> Self {
        let v = |i: usize| [a[i * 3], a[i * 3 + 1], a[i * 3 + 2]];
        Self { min: v(0), max: v(1), mid: v(2), reserved: [v(3), v(4)] }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AuxRecord {
    pub keys:  [u16; 2],
    pub value: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mesh {
    pub unknown_u32:       u32,
    pub unknown_u16:       [u16; 2],
    pub unknown_u64:       u64,
    pub transform:         [[f32; 3]; 3],
    pub vertices:          Vec<Vertex>,
    pub triangle_indices:  Vec<[u16; 3]>,
    pub edge_indices:      Vec<[u16; 2]>,
    pub auxiliary_records: Vec<AuxRecord>,
}

impl Mesh {
    /// Decode one mesh and leave `c` at the first byte after it.
    pub fn decode(c: &mut ByteCursor<'_>) -> Result<Self> {
        let at = c.absolute_position();
        let unknown_u32 = c.read_u32()?;
        let [vertex_count, triangle_index_count, edge_index_count, u4, u5] = c.read_u16s::<5>()?;
        let unknown_u64 = c.read_u64()?;
        let m = c.read_f32s::<9>()?;
        let transform = [[m[0], m[1], m[2]], [m[3], m[4], m[5]], [m[6], m[7], m[8]]];
        let aux_count = c.read_u16()?;

        if triangle_index_count % 3 != 0 {
            return Err(FormatError::mismatch(at, format!(
                "triangle index count {triangle_index_count} is not a multiple of 3"
            )));
        }
        if edge_index_count % 2 != 0 {
            return Err(FormatError::mismatch(at, format!(
                "edge index count {edge_index_count} is not a multiple of 2"
            )));
        }

        // Each array is taken as one bounded slice first so a bad count fails
        // before anything is allocated for it.
        let mut v = c.take(vertex_count as usize * 32)?;
        let vertices: Vec<Vertex> = (0..vertex_count)
            .map(|_| v.read_f32s::<8>().map(Vertex::from_floats))
            .collect::<Result<_>>()?;

        let mut t = c.take(triangle_index_count as usize * 2)?;
        let triangle_indices: Vec<[u16; 3]> = (0..triangle_index_count / 3)
            .map(|_| t.read_u16s::<3>())
            .collect::<Result<_>>()?;

        let mut e = c.take(edge_index_count as usize * 2)?;
        let edge_indices: Vec<[u16; 2]> = (0..edge_index_count / 2)
            .map(|_| e.read_u16s::<2>())
            .collect::<Result<_>>()?;

        let mut a = c.take(aux_count as usize * 8)?;
        let auxiliary_records: Vec<AuxRecord> = (0..aux_count)
            .map(|_| -> Result<AuxRecord> { Ok(AuxRecord { keys: a.read_u16s::<2>()?, value: a.read_f32()? }) })
            .collect::<Result<_>>()?;

        Ok(Self {
            unknown_u32,
            unknown_u16: [u4, u5],
            unknown_u64,
            transform,
            vertices,
            triangle_indices,
            edge_indices,
            auxiliary_records,
        })
    }
}

// ── Element ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Element<'a> {
    pub id:            u32,
    pub aabb:          Aabb,
    pub unknown_f32:   [f32; 2],
    pub unknown_u32:   u32,
    pub element_tag:   String,
    pub guid:          String,
    pub type_code:     u16,
    pub unknown_words: [u32; 12],
    pub meshes:        Vec<Mesh>,
    /// Bytes between the last mesh and the end of the record.
    #[serde(skip)]
    pub trailing:      &'a [u8],
}

impl<'a> Element<'a> {
    /// Decode an element record.  `c` must span exactly one record.
    pub fn decode(c: &mut ByteCursor<'a>, expected_id: i32, record: usize) -> Result<Self> {
        let id = c.read_u32()?;
        if i64::from(id) != i64::from(expected_id) {
            return Err(FormatError::IdMismatch { record, expected: expected_id, found: id });
        }
        c.read_reserved(16)?;
        let aabb = Aabb::from_floats(c.read_f32s::<15>()?);
        let unknown_f32 = c.read_f32s::<2>()?;
        let unknown_u32 = c.read_u32()?;

        let tag_at = c.absolute_position();
        let element_tag = nul_terminated(c.read_fixed(NAME_FIELD)?, tag_at)?.to_owned();
        let guid_at = c.absolute_position();
        let guid = std::str::from_utf8(c.read_fixed(GUID_LEN)?)
            .map_err(|_| FormatError::mismatch(guid_at, "GUID is not ASCII"))?
            .to_owned();
        c.read_reserved(12)?;

        let type_code = c.read_u16()?;
        c.read_reserved(82)?;

        let unknown_words = c.read_u32s::<12>()?;
        let magic_at = c.absolute_position();
        if &c.read_array::<3>()? != MESH_MAGIC {
            return Err(FormatError::mismatch(magic_at, "missing MSH tag before mesh count"));
        }
        let mesh_count = c.read_u32()?;

        let mut meshes = Vec::with_capacity((mesh_count as usize).min(c.remaining_len() / 64));
        for _ in 0..mesh_count {
            meshes.push(Mesh::decode(c)?);
        }

        Ok(Self {
            id,
            aabb,
            unknown_f32,
            unknown_u32,
            element_tag,
            guid,
            type_code,
            unknown_words,
            meshes,
            trailing: c.rest(),
        })
    }

    /// The GUID field parsed as a UUID, if it is one.
    pub fn parsed_guid(&self) -> Option<uuid::Uuid> {
        uuid::Uuid::parse_str(&self.guid).ok()
    }

    pub fn vertex_count(&self) -> usize {
        self.meshes.iter().map(|m| m.vertices.len()).sum()
    }

    pub fn triangle_count(&self) -> usize {
        self.meshes.iter().map(|m| m.triangle_indices.len()).sum()
    }
}

/// The ELM group header record (logical id -1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ElementGroupHeader {
    pub info: [u32; 2],
}

impl ElementGroupHeader {
    pub fn decode(c: &mut ByteCursor<'_>) -> Result<Self> {
        let at = c.absolute_position();
        if &c.read_array::<3>()? != ELEMENT_HEADER_MAGIC {
            return Err(FormatError::mismatch(at, "ELM group header has the wrong tag"));
        }
        let info = c.read_u32s::<2>()?;
        if !c.is_empty() {
            return Err(FormatError::mismatch(c.absolute_position(), format!(
                "{} unexpected byte(s) after the ELM group header", c.remaining_len()
            )));
        }
        Ok(Self { info })
    }
}

// ── Texture ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Texture<'a> {
    pub name:        String,
    pub unknown_u32: [u32; 2],
    pub unknown_u16: [u16; 4],
    /// Raw image bytes as stored.
    #[serde(skip)]
    pub data:        &'a [u8],
}

impl<'a> Texture<'a> {
    pub fn decode(c: &mut ByteCursor<'a>) -> Result<Self> {
        let at = c.absolute_position();
        let name = nul_terminated(c.read_fixed(NAME_FIELD)?, at)?.to_owned();
        let unknown_u32 = c.read_u32s::<2>()?;
        let unknown_u16 = c.read_u16s::<4>()?;
        c.read_reserved(28)?;
        Ok(Self { name, unknown_u32, unknown_u16, data: c.rest() })
    }

    /// Path the texture is extracted under, next to the archive members.
    pub fn member_name(&self) -> String {
        format!("TEX/{}", self.name)
    }
}

// ── Model ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ModelRecord<'a> {
    Element(Element<'a>),
    Texture(Texture<'a>),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Model<'a> {
    /// Elements and textures in export-blob order.
    pub records:        Vec<ModelRecord<'a>>,
    pub element_header: Option<ElementGroupHeader>,
    /// MAT records and records of unrecognised groups, left undecoded.
    pub skipped:        usize,
}

impl<'a> Model<'a> {
    /// Decode every record of `export` located by `layout`.
    pub fn decode(export: &'a [u8], layout: &[ExportEntry]) -> Result<Self> {
        let mut model = Model::default();
        for (record, entry) in layout.iter().enumerate() {
            let offset = entry.offset as usize;
            model.decode_entry(export, entry, record)
                .map_err(|e| e.in_record(record, offset))?;
        }
        tracing::debug!(
            elements = model.elements().count(),
            textures = model.textures().count(),
            skipped = model.skipped,
            "model decoded"
        );
        Ok(model)
    }

    fn decode_entry(&mut self, export: &'a [u8], entry: &ExportEntry, record: usize) -> Result<()> {
        let mut c = record_cursor(export, entry)?;

        match (entry.tag, entry.is_group_header()) {
            (GroupTag::TEX, false) => {
                self.records.push(ModelRecord::Texture(Texture::decode(&mut c)?));
            }
            (GroupTag::ELM, true) => {
                let header = ElementGroupHeader::decode(&mut c)?;
                if self.element_header.replace(header).is_some() {
                    tracing::warn!(record, "second ELM group header replaces the first");
                }
            }
            (GroupTag::ELM, false) => {
                let element = Element::decode(&mut c, entry.logical_id, record)?;
                self.records.push(ModelRecord::Element(element));
            }
            (GroupTag::TEX, true) => {}
            (tag, _) => {
                if tag != GroupTag::MAT {
                    tracing::warn!(record, group = %tag, "skipping record of unknown group");
                }
                self.skipped += 1;
            }
        }
        Ok(())
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element<'a>> {
        self.records.iter().filter_map(|r| match r {
            ModelRecord::Element(e) => Some(e),
            ModelRecord::Texture(_) => None,
        })
    }

    pub fn textures(&self) -> impl Iterator<Item = &Texture<'a>> {
        self.records.iter().filter_map(|r| match r {
            ModelRecord::Texture(t) => Some(t),
            ModelRecord::Element(_) => None,
        })
    }
}

/// Cursor over exactly the bytes of one layout entry.
fn record_cursor<'a>(export: &'a [u8], entry: &ExportEntry) -> Result<ByteCursor<'a>> {
    let bytes = export.get(entry.range()).ok_or(FormatError::TruncatedInput {
        offset:    entry.offset as usize,
        wanted:    entry.size as usize,
        available: export.len().saturating_sub(entry.offset as usize),
    })?;
    Ok(ByteCursor::with_base(bytes, entry.offset as usize))
}

/// Decode only the texture records located by `layout`.  Element and
/// material records are not read, so a damaged element cannot hide the
/// textures next to it.
pub fn decode_textures<'a>(export: &'a [u8], layout: &[ExportEntry]) -> Result<Vec<Texture<'a>>> {
    layout.iter().enumerate()
        .filter(|(_, entry)| entry.tag == GroupTag::TEX && !entry.is_group_header())
        .map(|(record, entry)| {
            record_cursor(export, entry)
                .and_then(|mut c| Texture::decode(&mut c))
                .map_err(|e| e.in_record(record, entry.offset as usize))
        })
        .collect()
}
