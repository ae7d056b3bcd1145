//! BXPK indexed archives: decode and encode.
//!
//! # Layout
//! ```text
//! [ member payloads ... ][ inode 0 ][ inode 1 ] ... [ footer (16 B) ]
//!
//! footer: u32 member_count, u32 index_size, u32 format_flag, "KPXB"
//! inode:  u32 name_len, name, u64 reserved, u64 data_size, u64 data_offset,
//!         40-byte lowercase hex SHA-1 of the member bytes
//! ```
//!
//! The footer is the only reliable signature.  The index occupies the last
//! `index_size` bytes before it; each inode locates its member by absolute
//! offset into the payload region, so members need not be contiguous or in
//! index order.
//!
//! Decoding is lazy: [`decode`] validates the footer and returns a
//! [`Members`] iterator that parses one inode per step.  A malformed inode
//! ends the iteration with [`FormatError::IndexCorrupted`]; members yielded
//! before it stay valid.

use std::io::{self, Write};

use byteorder::{LittleEndian, WriteBytesExt};
use sha1::{Digest, Sha1};

use crate::cursor::ByteCursor;
use crate::error::{FormatError, Result};

pub const MAGIC: &[u8; 4] = b"KPXB";
pub const FOOTER_SIZE: usize = 16;
pub const DIGEST_LEN: usize = 40;
/// The only `format_flag` value this crate has seen in well-formed archives.
pub const FORMAT_FLAG: u32 = 1;

/// Lowercase hex SHA-1 of `data`, as stored in an inode.
pub fn sha1_hex(data: &[u8]) -> String {
    hex::encode(Sha1::digest(data))
}

// ── Footer ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    pub member_count: u32,
    pub index_size:   u32,
    pub format_flag:  u32,
}

impl Footer {
    /// Read the footer from the tail of `buf`.
    pub fn read(buf: &[u8]) -> Result<Self> {
        let bad_magic = FormatError::BadMagic {
            format: "BXPK",
            offset: buf.len().saturating_sub(MAGIC.len()),
        };
        if buf.len() < FOOTER_SIZE {
            return Err(bad_magic);
        }
        let start = buf.len() - FOOTER_SIZE;
        let mut c = ByteCursor::with_base(&buf[start..], start);
        let member_count = c.read_u32()?;
        let index_size   = c.read_u32()?;
        let format_flag  = c.read_u32()?;
        if &c.read_array::<4>()? != MAGIC {
            return Err(bad_magic);
        }
        Ok(Self { member_count, index_size, format_flag })
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(self.member_count)?;
        writer.write_u32::<LittleEndian>(self.index_size)?;
        writer.write_u32::<LittleEndian>(self.format_flag)?;
        writer.write_all(MAGIC)?;
        Ok(())
    }
}

// ── Member ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member<'a> {
    /// Position in the index; 0 for members built with [`Member::new`].
    pub record:   usize,
    pub name:     String,
    /// 40 hex characters as recorded in the index (or computed on the write path).
    pub digest:   String,
    /// Absolute offset of `data` inside the payload region.
    pub offset:   u64,
    pub data:     &'a [u8],
    /// First u64 of the inode; meaning unknown, re-emitted verbatim.
    pub reserved: u64,
}

impl<'a> Member<'a> {
    /// Build a member for encoding; the digest is computed from `data`.
    pub fn new(name: impl Into<String>, data: &'a [u8]) -> Self {
        Self {
            record:   0,
            name:     name.into(),
            digest:   sha1_hex(data),
            offset:   0,
            data,
            reserved: 0,
        }
    }

    pub fn check_digest(&self) -> bool {
        self.digest == sha1_hex(self.data)
    }

    pub fn verify(&self) -> Result<()> {
        let actual = sha1_hex(self.data);
        if self.digest != actual {
            return Err(FormatError::IntegrityFailure {
                record:   self.record,
                offset:   self.offset as usize,
                name:     self.name.clone(),
                expected: self.digest.clone(),
                actual,
            });
        }
        Ok(())
    }

    /// Serialized size of this member's inode.
    pub fn inode_len(&self) -> usize {
        4 + self.name.len() + 3 * 8 + DIGEST_LEN
    }

    fn read_inode(index: &mut ByteCursor<'a>, payload: &'a [u8], record: usize) -> Result<Self> {
        index.read_struct(|c| {
            let name_len = c.read_u32()? as usize;
            let name     = c.read_fixed(name_len)?;
            let reserved = c.read_u64()?;
            let size     = c.read_u64()?;
            let offset   = c.read_u64()?;
            let digest   = c.read_fixed(DIGEST_LEN)?;

            let name   = std::str::from_utf8(name).map_err(|_| invalid("member name is not UTF-8"))?;
            let digest = std::str::from_utf8(digest).map_err(|_| invalid("digest is not ASCII"))?;
            let data = usize::try_from(offset).ok()
                .zip(usize::try_from(size).ok())
                .and_then(|(start, len)| payload.get(start..start.checked_add(len)?))
                .ok_or_else(|| invalid("member data lies outside the payload region"))?;

            Ok(Self {
                record,
                name: name.to_owned(),
                digest: digest.to_owned(),
                offset,
                data,
                reserved,
            })
        })
    }

    fn write_inode<W: Write>(&self, mut writer: W, offset: u64) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(self.name.len() as u32)?;
        writer.write_all(self.name.as_bytes())?;
        writer.write_u64::<LittleEndian>(self.reserved)?;
        writer.write_u64::<LittleEndian>(self.data.len() as u64)?;
        writer.write_u64::<LittleEndian>(offset)?;
        writer.write_all(sha1_hex(self.data).as_bytes())?;
        Ok(())
    }
}

// Inode-level failures are all reported as IndexCorrupted by the iterator;
// the detail only matters for the debug log.
fn invalid(what: &str) -> FormatError {
    FormatError::mismatch(0, what)
}

// ── Decoding ──────────────────────────────────────────────────────────────────

/// Lazy, single-pass iterator over the members of a BXPK archive.
pub struct Members<'a> {
    footer:  Footer,
    payload: &'a [u8],
    index:   ByteCursor<'a>,
    next:    usize,
    done:    bool,
}

impl<'a> Members<'a> {
    pub fn footer(&self) -> Footer { self.footer }

    /// Number of members not yet yielded.
    pub fn remaining(&self) -> usize {
        if self.done { 0 } else { self.footer.member_count as usize - self.next }
    }
}

impl<'a> Iterator for Members<'a> {
    type Item = Result<Member<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.next == self.footer.member_count as usize {
            self.done = true;
            if !self.index.is_empty() {
                tracing::debug!("{} unread byte(s) after the last inode", self.index.remaining_len());
            }
            return None;
        }

        let record = self.next;
        let offset = self.index.absolute_position();
        match Member::read_inode(&mut self.index, self.payload, record) {
            Ok(member) => {
                self.next += 1;
                tracing::debug!(record, name = %member.name, size = member.data.len(), "bxpk member");
                Some(Ok(member))
            }
            Err(e) => {
                self.done = true;
                tracing::debug!(record, offset, error = %e, "bxpk inode rejected");
                Some(Err(FormatError::IndexCorrupted { record, offset }))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining()))
    }
}

/// Validate the footer of `buf` and return an iterator over its members.
pub fn decode(buf: &[u8]) -> Result<Members<'_>> {
    let footer = Footer::read(buf)?;
    if footer.format_flag != FORMAT_FLAG {
        tracing::warn!(
            "abnormal BXPK format flag: {:#010x} / {}",
            footer.format_flag, footer.format_flag
        );
    }

    let body_len = buf.len() - FOOTER_SIZE;
    let index_size = footer.index_size as usize;
    if index_size > body_len {
        return Err(FormatError::IndexCorrupted { record: 0, offset: body_len });
    }
    let payload_len = body_len - index_size;

    Ok(Members {
        footer,
        payload: &buf[..payload_len],
        index:   ByteCursor::with_base(&buf[payload_len..body_len], payload_len),
        next:    0,
        done:    false,
    })
}

/// Decode every member, stopping at the first error.
pub fn decode_all(buf: &[u8]) -> Result<Vec<Member<'_>>> {
    decode(buf)?.collect()
}

// ── Encoding ──────────────────────────────────────────────────────────────────

/// Write `members` as a BXPK archive: payloads back to back, one inode per
/// member in the given order, then the footer with `format_flag = 1`.
pub fn encode<W: Write>(members: &[Member<'_>], mut writer: W) -> io::Result<()> {
    let mut offsets = Vec::with_capacity(members.len());
    let mut offset = 0u64;
    for member in members {
        writer.write_all(member.data)?;
        offsets.push(offset);
        offset += member.data.len() as u64;
    }

    let mut index_size = 0usize;
    for (member, &offset) in members.iter().zip(&offsets) {
        member.write_inode(&mut writer, offset)?;
        index_size += member.inode_len();
    }

    let too_big = |what: &str| io::Error::new(io::ErrorKind::InvalidInput, format!("{what} exceeds u32"));
    Footer {
        member_count: u32::try_from(members.len()).map_err(|_| too_big("member count"))?,
        index_size:   u32::try_from(index_size).map_err(|_| too_big("index size"))?,
        format_flag:  FORMAT_FLAG,
    }
    .write(&mut writer)
}

/// Encode into a fresh buffer.
pub fn encode_to_vec(members: &[Member<'_>]) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    encode(members, &mut out)?;
    Ok(out)
}
