//! Record boundaries inside an export blob.
//!
//! OFS entries only carry start offsets.  Sizes are implicit: once every
//! group's entries are merged and sorted by offset, each record runs up to
//! the next record's start, and the last one runs to the end of the blob.
//! This pass does nothing but that arithmetic, so by the time a record is
//! parsed it is already fully bounded.

use serde::Serialize;

use crate::error::{FormatError, Result};
use crate::ofs::{GroupTag, OffsetTable, GROUP_HEADER_ID};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExportEntry {
    pub offset:     u32,
    pub tag:        GroupTag,
    pub logical_id: i32,
    pub size:       u32,
}

impl ExportEntry {
    pub fn is_group_header(&self) -> bool {
        self.logical_id == GROUP_HEADER_ID
    }

    /// Byte range of this record inside the export blob.
    pub fn range(&self) -> std::ops::Range<usize> {
        let start = self.offset as usize;
        start..start + self.size as usize
    }
}

/// Flatten `table`, sort by offset (ties by tag, then id) and derive each
/// record's size against a blob of `blob_len` bytes.
pub fn derive(table: &OffsetTable, blob_len: usize) -> Result<Vec<ExportEntry>> {
    let mut flat: Vec<(u32, GroupTag, i32)> = table.groups.iter()
        .flat_map(|g| g.entries.iter().map(move |e| (e.byte_offset, g.tag, e.logical_id)))
        .collect();
    flat.sort_unstable();

    if let Some(&(last, tag, id)) = flat.last() {
        if last as usize > blob_len {
            return Err(FormatError::mismatch(last as usize, format!(
                "{tag} record {id} starts past the end of a {blob_len}-byte export blob"
            )));
        }
    }

    let entries = flat.iter().enumerate().map(|(i, &(offset, tag, logical_id))| {
        let end = flat.get(i + 1).map_or(blob_len, |next| next.0 as usize);
        ExportEntry { offset, tag, logical_id, size: (end - offset as usize) as u32 }
    }).collect();
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ofs::{OffsetEntry, OffsetGroup};

    fn group(tag: GroupTag, entries: &[(i32, u32)]) -> OffsetGroup {
        OffsetGroup {
            tag,
            chunk_offset: 0,
            entries: entries.iter()
                .map(|&(logical_id, byte_offset)| OffsetEntry { logical_id, byte_offset })
                .collect(),
        }
    }

    #[test]
    fn sizes_follow_sorted_offsets_across_groups() {
        let table = OffsetTable {
            declared_groups: 2,
            reserved: 0,
            groups: vec![
                group(GroupTag::TEX, &[(7, 40), (-1, 10)]),
                group(GroupTag::ELM, &[(-1, 0), (3, 25)]),
            ],
        };
        let layout = derive(&table, 100).unwrap();
        let view: Vec<_> = layout.iter().map(|e| (e.offset, e.tag, e.logical_id, e.size)).collect();
        assert_eq!(view, vec![
            (0,  GroupTag::ELM, -1, 10),
            (10, GroupTag::TEX, -1, 15),
            (25, GroupTag::ELM, 3, 15),
            (40, GroupTag::TEX, 7, 60),
        ]);
        assert_eq!(layout[2].range(), 25..40);
    }

    #[test]
    fn last_entry_may_end_exactly_at_blob_end() {
        let table = OffsetTable { groups: vec![group(GroupTag::MAT, &[(1, 8)])], ..Default::default() };
        assert_eq!(derive(&table, 8).unwrap()[0].size, 0);
        assert!(matches!(derive(&table, 7), Err(FormatError::StructuralMismatch { .. })));
    }

    #[test]
    fn empty_table_has_empty_layout() {
        assert!(derive(&OffsetTable::default(), 10).unwrap().is_empty());
    }
}
