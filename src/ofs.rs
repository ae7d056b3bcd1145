//! OFS offset tables ("Offsets.bin").
//!
//! # Layout
//! ```text
//! header:      "OFS\x01", u32 group_count, u32 reserved
//! descriptor:  u8 spacer (= 0x20), 3-byte group name stored reversed, u32 chunk_offset
//! chunk table: 3-byte group name (forward), u8 (= 1), u32 entry_count,
//!              entry_count × (i32 logical_id, u32 byte_offset)
//! ```
//!
//! Descriptors follow the header back to back; `group_count` may overstate
//! how many are populated, and the first descriptor whose name starts with a
//! NUL ends the list.  The repeated name and the `1` byte at the head of each
//! chunk table are the only internal cross-checks the format has.

use std::fmt;

use serde::Serialize;

use crate::cursor::ByteCursor;
use crate::error::{FormatError, Result};

pub const MAGIC: &[u8; 4] = b"OFS\x01";
pub const HEADER_SIZE: usize = 12;
pub const DESCRIPTOR_SPACER: u8 = 0x20;
/// Logical id marking a group header record rather than an addressable item.
pub const GROUP_HEADER_ID: i32 = -1;

// ── GroupTag ──────────────────────────────────────────────────────────────────

/// Three-byte chunk group name, in reading order (`ELM`, `TEX`, `MAT`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct GroupTag(pub [u8; 3]);

impl GroupTag {
    pub const ELM: GroupTag = GroupTag(*b"ELM");
    pub const TEX: GroupTag = GroupTag(*b"TEX");
    pub const MAT: GroupTag = GroupTag(*b"MAT");

    /// Tag from a descriptor's name field, which stores the bytes reversed.
    pub fn from_stored(stored: [u8; 3]) -> Self {
        GroupTag([stored[2], stored[1], stored[0]])
    }

    pub fn as_bytes(&self) -> &[u8; 3] { &self.0 }
}

impl fmt::Display for GroupTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

// ── Table types ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OffsetEntry {
    pub logical_id:  i32,
    pub byte_offset: u32,
}

impl OffsetEntry {
    pub fn is_group_header(&self) -> bool {
        self.logical_id == GROUP_HEADER_ID
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OffsetGroup {
    pub tag:          GroupTag,
    /// Where this group's chunk table starts inside the OFS buffer.
    pub chunk_offset: u32,
    /// Entries in file order.
    pub entries:      Vec<OffsetEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct OffsetTable {
    /// `group_count` as declared by the header; may exceed `groups.len()`.
    pub declared_groups: u32,
    /// Third header word; meaning unknown.
    pub reserved:        u32,
    /// Populated groups in descriptor order.
    pub groups:          Vec<OffsetGroup>,
}

impl OffsetTable {
    pub fn get(&self, tag: GroupTag) -> Option<&OffsetGroup> {
        self.groups.iter().find(|g| g.tag == tag)
    }

    pub fn entry_count(&self) -> usize {
        self.groups.iter().map(|g| g.entries.len()).sum()
    }
}

// ── Decoding ──────────────────────────────────────────────────────────────────

/// True if `buf` starts with the OFS signature.
pub fn has_magic(buf: &[u8]) -> bool {
    buf.starts_with(MAGIC)
}

pub fn decode(buf: &[u8]) -> Result<OffsetTable> {
    if !has_magic(buf) {
        return Err(FormatError::BadMagic { format: "OFS", offset: 0 });
    }
    let mut c = ByteCursor::new(buf);
    c.skip(MAGIC.len())?;
    let declared_groups = c.read_u32()?;
    let reserved        = c.read_u32()?;

    let mut groups = Vec::new();
    for _ in 0..declared_groups {
        let at = c.absolute_position();
        let (spacer, stored, chunk_offset) =
            c.read_struct(|c| Ok((c.read_u8()?, c.read_array::<3>()?, c.read_u32()?)))?;
        if stored[0] == 0 {
            tracing::debug!(at, "empty OFS descriptor, {} group(s) read", groups.len());
            break;
        }
        if spacer != DESCRIPTOR_SPACER {
            return Err(FormatError::mismatch(at, format!("descriptor spacer is {spacer:#04x}, expected 0x20")));
        }
        let tag = GroupTag::from_stored(stored);
        let entries = read_chunk_table(&c, tag, chunk_offset)?;
        tracing::debug!(group = %tag, entries = entries.len(), "ofs group");
        groups.push(OffsetGroup { tag, chunk_offset, entries });
    }

    Ok(OffsetTable { declared_groups, reserved, groups })
}

fn read_chunk_table(c: &ByteCursor<'_>, tag: GroupTag, chunk_offset: u32) -> Result<Vec<OffsetEntry>> {
    let mut t = c.at(chunk_offset as usize)?;
    let at = t.absolute_position();
    let (repeat, one, count) =
        t.read_struct(|t| Ok((t.read_array::<3>()?, t.read_u8()?, t.read_u32()?)))?;

    if GroupTag(repeat) != tag {
        return Err(FormatError::mismatch(at, format!(
            "chunk table names group {}, descriptor names {tag}", GroupTag(repeat)
        )));
    }
    if one != 1 {
        return Err(FormatError::mismatch(at + 3, format!("chunk table marker is {one}, expected 1")));
    }

    let count = count as usize;
    let mut entries = Vec::with_capacity(count.min(t.remaining_len() / 8));
    for _ in 0..count {
        let (logical_id, byte_offset) = t.read_struct(|t| Ok((t.read_i32()?, t.read_u32()?)))?;
        entries.push(OffsetEntry { logical_id, byte_offset });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Header, one descriptor per group (plus `extra_declared` empty
    /// descriptors), then the chunk tables.
    fn build(groups: &[(&[u8; 3], Vec<(i32, u32)>)], extra_declared: u32) -> Vec<u8> {
        let declared = groups.len() as u32 + extra_declared;
        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&declared.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());

        let mut table_at = HEADER_SIZE + 8 * declared as usize;
        let mut tables = Vec::new();
        for (name, entries) in groups {
            out.push(DESCRIPTOR_SPACER);
            out.extend_from_slice(&[name[2], name[1], name[0]]);
            out.extend_from_slice(&(table_at as u32).to_le_bytes());

            let mut t = Vec::new();
            t.extend_from_slice(*name);
            t.push(1);
            t.extend_from_slice(&(entries.len() as u32).to_le_bytes());
            for (id, off) in entries.iter() {
                t.extend_from_slice(&id.to_le_bytes());
                t.extend_from_slice(&off.to_le_bytes());
            }
            table_at += t.len();
            tables.extend(t);
        }
        out.extend(std::iter::repeat(0u8).take(8 * extra_declared as usize));
        out.extend(tables);
        out
    }

    #[test]
    fn single_texture_group() {
        let buf = build(&[(b"TEX", vec![(5, 100)])], 0);
        let table = decode(&buf).unwrap();
        assert_eq!(table.groups.len(), 1);
        let tex = table.get(GroupTag::TEX).unwrap();
        assert_eq!(tex.entries, vec![OffsetEntry { logical_id: 5, byte_offset: 100 }]);
    }

    #[test]
    fn descriptors_start_after_twelve_byte_header() {
        let mut buf = b"OFS\x01".to_vec();
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.push(DESCRIPTOR_SPACER);
        buf.extend_from_slice(b"XET");
        buf.extend_from_slice(&20u32.to_le_bytes());
        buf.extend_from_slice(b"TEX\x01");
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(&5i32.to_le_bytes());
        buf.extend_from_slice(&100u32.to_le_bytes());

        assert_eq!(HEADER_SIZE, 12);
        let table = decode(&buf).unwrap();
        assert_eq!(table.groups[0].chunk_offset, 20);
        assert_eq!(table.groups[0].entries, vec![OffsetEntry { logical_id: 5, byte_offset: 100 }]);
    }

    #[test]
    fn empty_descriptor_stops_early() {
        // group_count = 3, second descriptor all zero
        let buf = build(&[(b"ELM", vec![(-1, 0), (1, 16)])], 2);
        let table = decode(&buf).unwrap();
        assert_eq!(table.declared_groups, 3);
        assert_eq!(table.groups.len(), 1);
        assert_eq!(table.groups[0].tag, GroupTag::ELM);
        assert!(table.groups[0].entries[0].is_group_header());
    }

    #[test]
    fn names_are_stored_reversed() {
        let buf = build(&[(b"MAT", vec![]), (b"TEX", vec![(0, 8)])], 0);
        assert_eq!(&buf[HEADER_SIZE + 1..HEADER_SIZE + 4], b"TAM");
        let table = decode(&buf).unwrap();
        assert_eq!(table.groups[0].tag.to_string(), "MAT");
        assert_eq!(table.groups[1].tag, GroupTag::TEX);
    }

    #[test]
    fn bad_magic() {
        let mut buf = build(&[(b"TEX", vec![(5, 100)])], 0);
        buf[3] = 2;
        assert!(matches!(decode(&buf), Err(FormatError::BadMagic { .. })));
        assert!(matches!(decode(b"OF"), Err(FormatError::BadMagic { .. })));
    }

    #[test]
    fn repeated_name_must_match() {
        let mut buf = build(&[(b"TEX", vec![(5, 100)])], 0);
        let table_at = HEADER_SIZE + 8;
        buf[table_at] = b'M';
        assert!(matches!(decode(&buf), Err(FormatError::StructuralMismatch { .. })));
    }

    #[test]
    fn marker_must_be_one() {
        let mut buf = build(&[(b"TEX", vec![(5, 100)])], 0);
        buf[HEADER_SIZE + 8 + 3] = 2;
        assert!(matches!(decode(&buf), Err(FormatError::StructuralMismatch { .. })));
    }

    #[test]
    fn spacer_must_be_0x20() {
        let mut buf = build(&[(b"TEX", vec![(5, 100)])], 0);
        buf[HEADER_SIZE] = 0x21;
        assert!(matches!(decode(&buf), Err(FormatError::StructuralMismatch { .. })));
    }

    #[test]
    fn truncated_entries() {
        let mut buf = build(&[(b"TEX", vec![(5, 100), (6, 200)])], 0);
        buf.truncate(buf.len() - 3);
        assert!(matches!(decode(&buf), Err(FormatError::TruncatedInput { .. })));
    }
}
