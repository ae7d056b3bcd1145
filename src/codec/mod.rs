//! Decompression seam.
//!
//! The container decoders never know which algorithm produced a compressed
//! region; they hand the bytes that follow the marker to a [`Decompress`]
//! implementation and take back the expanded payload.  The built-in
//! implementation is [`QuickLz`], which covers every `QLZ\x01` region seen in
//! exported bundles.  Closures of the right shape implement the trait too,
//! so callers can plug in their own codec.

use thiserror::Error;

pub mod quicklz;

pub use quicklz::QuickLz;

/// Tag prefixing a compressed region inside a ZRES payload.
pub const QLZ_MARKER: &[u8; 4] = b"QLZ\x01";

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Invalid header: {0}")]
    Header(String),
    #[error("Decompression error: {0}")]
    Decompression(String),
    #[error("Unsupported stream: {0}")]
    Unsupported(String),
}

// ── Decompress trait ─────────────────────────────────────────────────────────

pub trait Decompress: Send + Sync {
    /// Human-readable name (diagnostics only).
    fn name(&self) -> &'static str;
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError>;
}

impl<F> Decompress for F
where
    F: Fn(&[u8]) -> Result<Vec<u8>, CodecError> + Send + Sync,
{
    fn name(&self) -> &'static str { "custom" }
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> { self(data) }
}
