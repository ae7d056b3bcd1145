//! ZRES resource archives.
//!
//! # Layout
//! ```text
//! [ payload area ][ file_count × 520-byte record ][ u32 file_count, "ZRES" ]
//!
//! record: 512-byte NUL-terminated name, u32 offset, u32 size
//! ```
//!
//! Records address regions of the payload area.  A record with an empty name
//! is an unused slot.  A region beginning with `QLZ\x01` is compressed; the
//! bytes after the marker go through the caller's [`Decompress`] and the
//! result replaces the region.
//!
//! Two members are special.  When both `Offsets.bin` (an OFS table) and
//! `Export.bin` turn up, they form an [`ExportBundle`]: the OFS table locates
//! the element, texture and material records inside the export blob.

use std::ops::Deref;
use std::sync::Arc;

use crate::codec::{Decompress, QLZ_MARKER};
use crate::cursor::{nul_terminated, ByteCursor};
use crate::error::{FormatError, Result};
use crate::layout::{self, ExportEntry};
use crate::model::{self, Model, Texture};
use crate::ofs::{self, OffsetTable};

pub const MAGIC: &[u8; 4] = b"ZRES";
pub const FOOTER_SIZE: usize = 8;
pub const RECORD_SIZE: usize = 520;
pub const NAME_FIELD:  usize = 512;

pub const OFFSETS_MEMBER: &str = "Offsets.bin";
pub const EXPORT_MEMBER:  &str = "Export.bin";

// ── Payload ───────────────────────────────────────────────────────────────────

/// Member bytes: a slice of the archive when stored raw, a shared buffer when
/// decompressed.  Clones never copy the bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload<'a> {
    Stored(&'a [u8]),
    Expanded(Arc<Vec<u8>>),
}

impl Deref for Payload<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match *self {
            Payload::Stored(bytes) => bytes,
            Payload::Expanded(ref buf) => buf.as_slice(),
        }
    }
}

impl AsRef<[u8]> for Payload<'_> {
    fn as_ref(&self) -> &[u8] { self }
}

// ── CompressedMember ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedMember<'a> {
    pub name:           String,
    pub stored_offset:  u32,
    pub stored_size:    u32,
    pub payload:        Payload<'a>,
    pub was_compressed: bool,
}

impl<'a> CompressedMember<'a> {
    pub fn data(&self) -> &[u8] { &self.payload }

    /// Expanded size over stored size, for compressed members.
    pub fn ratio(&self) -> Option<f64> {
        (self.was_compressed && self.stored_size > 0)
            .then(|| self.payload.len() as f64 / self.stored_size as f64)
    }
}

// ── Decoding ──────────────────────────────────────────────────────────────────

/// Lazy, single-pass iterator over the members of a ZRES archive.
pub struct Members<'a> {
    payload:    &'a [u8],
    table:      ByteCursor<'a>,
    file_count: usize,
    next:       usize,
    done:       bool,
    codec:      &'a dyn Decompress,
    offsets:    Option<Payload<'a>>,
    export:     Option<Payload<'a>>,
}

impl<'a> Members<'a> {
    pub fn file_count(&self) -> usize { self.file_count }

    /// The export bundle, if both companion members have been yielded.
    pub fn into_bundle(self) -> Option<ExportBundle<'a>> {
        Some(ExportBundle { offsets: self.offsets?, export: self.export? })
    }

    fn read_record(&mut self, record: usize) -> Result<Option<CompressedMember<'a>>> {
        let at = self.table.absolute_position();
        let (name_field, stored_offset, stored_size) = self.table.read_struct(|c| {
            Ok((c.read_fixed(NAME_FIELD)?, c.read_u32()?, c.read_u32()?))
        })?;

        let name = nul_terminated(name_field, at)?;
        if name.is_empty() {
            tracing::debug!(record, "unused zres slot");
            return Ok(None);
        }

        let (start, len) = (stored_offset as usize, stored_size as usize);
        let region = start.checked_add(len)
            .and_then(|end| self.payload.get(start..end))
            .ok_or(FormatError::TruncatedInput {
                offset:    start,
                wanted:    len,
                available: self.payload.len().saturating_sub(start),
            })?;

        let (payload, was_compressed) = match region.strip_prefix(QLZ_MARKER.as_slice()) {
            Some(stream) => {
                let out = self.codec.decompress(stream).map_err(|source| {
                    FormatError::Decompression { record, offset: start, source }
                })?;
                (Payload::Expanded(Arc::new(out)), true)
            }
            None => (Payload::Stored(region), false),
        };

        tracing::debug!(
            record, name, stored_size, size = payload.len(), codec = was_compressed.then(|| self.codec.name()),
            "zres member"
        );
        Ok(Some(CompressedMember {
            name: name.to_owned(),
            stored_offset,
            stored_size,
            payload,
            was_compressed,
        }))
    }
}

impl<'a> Iterator for Members<'a> {
    type Item = Result<CompressedMember<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            if self.next == self.file_count {
                self.done = true;
                break;
            }
            let record = self.next;
            let at = self.table.absolute_position();
            self.next += 1;

            match self.read_record(record) {
                Ok(None) => continue,
                Ok(Some(member)) => {
                    match member.name.as_str() {
                        OFFSETS_MEMBER => self.offsets = Some(member.payload.clone()),
                        EXPORT_MEMBER  => self.export  = Some(member.payload.clone()),
                        _ => {}
                    }
                    return Some(Ok(member));
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(match e {
                        e @ FormatError::Decompression { .. } => e,
                        e => e.in_record(record, at),
                    }));
                }
            }
        }
        None
    }
}

/// Validate the footer of `buf` and return an iterator over its members.
pub fn decode<'a>(buf: &'a [u8], codec: &'a dyn Decompress) -> Result<Members<'a>> {
    if buf.len() < FOOTER_SIZE || &buf[buf.len() - MAGIC.len()..] != MAGIC {
        return Err(FormatError::BadMagic { format: "ZRES", offset: buf.len().saturating_sub(MAGIC.len()) });
    }
    let body_len = buf.len() - FOOTER_SIZE;
    let file_count = ByteCursor::with_base(&buf[body_len..], body_len).read_u32()? as usize;

    let table_len = file_count.checked_mul(RECORD_SIZE).filter(|&n| n <= body_len)
        .ok_or(FormatError::TruncatedInput {
            offset:    0,
            wanted:    file_count.saturating_mul(RECORD_SIZE),
            available: body_len,
        })?;
    let payload_len = body_len - table_len;

    Ok(Members {
        payload: &buf[..payload_len],
        table:   ByteCursor::with_base(&buf[payload_len..body_len], payload_len),
        file_count,
        next:    0,
        done:    false,
        codec,
        offsets: None,
        export:  None,
    })
}

/// Decode every member and, when present, the export bundle.
pub fn read_bundle<'a>(
    buf:   &'a [u8],
    codec: &'a dyn Decompress,
) -> Result<(Vec<CompressedMember<'a>>, Option<ExportBundle<'a>>)> {
    let mut members = decode(buf, codec)?;
    let collected = members.by_ref().collect::<Result<Vec<_>>>()?;
    Ok((collected, members.into_bundle()))
}

// ── ExportBundle ──────────────────────────────────────────────────────────────

/// The `Offsets.bin` / `Export.bin` pair of a ZRES archive.
#[derive(Debug, Clone)]
pub struct ExportBundle<'a> {
    pub offsets: Payload<'a>,
    pub export:  Payload<'a>,
}

impl<'a> ExportBundle<'a> {
    pub fn offset_table(&self) -> Result<OffsetTable> {
        ofs::decode(&self.offsets)
    }

    /// Every OFS entry with its derived size, sorted by offset.
    pub fn layout(&self) -> Result<Vec<ExportEntry>> {
        layout::derive(&self.offset_table()?, self.export.len())
    }

    pub fn model(&self) -> Result<Model<'_>> {
        Model::decode(&self.export, &self.layout()?)
    }

    /// Texture records only; element and material records are not read.
    pub fn textures(&self) -> Result<Vec<Texture<'_>>> {
        model::decode_textures(&self.export, &self.layout()?)
    }
}
