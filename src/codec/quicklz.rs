//! QuickLZ 1.5 streams, as found behind the `QLZ\x01` marker.
//!
//! # Stream header
//! ```text
//! byte 0      flags: bit0 compressed, bit1 long header, bits2-3 level
//! short hdr   u8 compressed_size, u8 decompressed_size          (3 bytes total)
//! long hdr    u32 compressed_size, u32 decompressed_size        (9 bytes total)
//! ```
//!
//! The body is decoded by the `quicklz` crate.  The header is read here as
//! well so the declared sizes can be checked against the region that was
//! handed over and against what the decoder produced.

use byteorder::{ByteOrder, LittleEndian};

use super::{CodecError, Decompress};

const SHORT_HEADER: usize = 3;
const LONG_HEADER:  usize = 9;

/// Largest decompressed size accepted from a stream header.
pub const MAX_DECOMPRESSED_SIZE: u32 = 1 << 30;

#[derive(Debug, Clone, Copy, Default)]
pub struct QuickLz;

/// Header size implied by the flag byte.
pub fn header_len(flags: u8) -> usize {
    if flags & 2 == 2 { LONG_HEADER } else { SHORT_HEADER }
}

/// `(compressed_size, decompressed_size)` as declared by the stream header.
pub fn declared_sizes(src: &[u8]) -> Result<(usize, usize), CodecError> {
    let flags = *src.first().ok_or_else(|| CodecError::Header("header missing".into()))?;
    let hlen = header_len(flags);
    if src.len() < hlen {
        return Err(CodecError::Header(format!("{} byte(s) is shorter than the {hlen}-byte header", src.len())));
    }
    Ok(if hlen == LONG_HEADER {
        (LittleEndian::read_u32(&src[1..5]) as usize, LittleEndian::read_u32(&src[5..9]) as usize)
    } else {
        (src[1] as usize, src[2] as usize)
    })
}

impl From<::quicklz::Error> for CodecError {
    fn from(e: ::quicklz::Error) -> Self {
        match e {
            ::quicklz::Error::UnsupportedLevel => CodecError::Unsupported(e.to_string()),
            ::quicklz::Error::SizeLimitExceeded { .. } => CodecError::Unsupported(e.to_string()),
            ::quicklz::Error::Io(io) => CodecError::Decompression(format!("stream ends early: {io}")),
            ::quicklz::Error::CorruptData(what) => CodecError::Decompression(what),
        }
    }
}

impl Decompress for QuickLz {
    fn name(&self) -> &'static str { "quicklz" }

    fn decompress(&self, src: &[u8]) -> Result<Vec<u8>, CodecError> {
        let (compressed, size) = declared_sizes(src)?;
        if compressed != src.len() {
            return Err(CodecError::Header(format!(
                "header declares {compressed} compressed byte(s), {} given", src.len()
            )));
        }
        let out = ::quicklz::decompress(&mut &src[..], MAX_DECOMPRESSED_SIZE)?;
        if out.len() != size {
            return Err(CodecError::Decompression(format!(
                "header declares {size} byte(s), stream produced {}", out.len()
            )));
        }
        Ok(out)
    }
}
