//! Scanner and asset converter for proprietary game data packs.
//!
//! A pack is a monolithic archive with no index: named sub-files are
//! discovered by sweeping the whole file for record headers, optionally
//! through a fixed XOR keystream. Recovered sub-files may themselves be
//! proprietary containers that this crate converts to portable formats:
//! SCT/SCT2 textures to PNG, table databases to JSON, and SCSP skeletal
//! animations to Spine-3.x-shaped JSON.
//!
//! ```no_run
//! use pack_ripper::{extract, pack::PackArchive, Progress};
//!
//! # fn main() -> pack_ripper::Result<()> {
//! let mut archive = PackArchive::open("assets.pack")?;
//! let progress = Progress::new();
//! archive.scan(&progress);
//! extract::extract_all(
//!     &archive,
//!     archive.tree(),
//!     "out".as_ref(),
//!     &progress,
//!     extract::ExtractOptions::default(),
//! )?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod etc2;
pub mod extract;
pub mod keystream;
pub mod lz4;
pub mod pack;
pub mod progress;
pub mod reader;
pub mod skeleton;
pub mod table;
pub mod texture;

pub use error::{Error, Result};
pub use pack::{FileNode, PackArchive, PackKind};
pub use progress::Progress;
