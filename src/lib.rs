//! Decoders for the containers and record formats found in BIMx
//! hyper-model bundles.
//!
//! A bundle is a BXPK archive whose members include ZRES archives.  A ZRES
//! archive may carry an `Offsets.bin` / `Export.bin` pair: an OFS offset
//! table and the export blob it indexes, which holds element geometry,
//! textures and materials.
//!
//! ```no_run
//! use bimx::{bxpk, zres, codec::QuickLz};
//!
//! let buf = std::fs::read("model.bimx")?;
//! for member in bxpk::decode(&buf)? {
//!     let member = member?;
//!     member.verify()?;
//!     if member.name.ends_with(".zres") {
//!         let (_, bundle) = zres::read_bundle(member.data, &QuickLz)?;
//!         if let Some(bundle) = bundle {
//!             let model = bundle.model()?;
//!             println!("{}: {} element(s)", member.name, model.elements().count());
//!         }
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod cursor;
pub mod error;
pub mod codec;
pub mod bxpk;
pub mod ofs;
pub mod layout;
pub mod zres;
pub mod model;
pub mod archive;
pub mod verify;

pub use cursor::ByteCursor;
pub use error::{FormatError, Result};
pub use codec::{CodecError, Decompress, QuickLz};
pub use bxpk::{Footer, Member};
pub use ofs::{GroupTag, OffsetTable};
pub use layout::ExportEntry;
pub use zres::{CompressedMember, ExportBundle, Payload};
pub use model::{Element, Mesh, Model, ModelRecord, Texture};
