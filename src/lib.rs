//! # torrentzip
//!
//! Builds ZIP archives that are byte-for-byte reproducible: the same
//! `(name, content)` pairs added in the same order always produce the same
//! archive, whatever the timestamps, permissions or platform of the source
//! files. Archives carry a `TORRENTZIPPED-XXXXXXXX` comment holding the
//! CRC-32 of their central directory, so canonical form can be confirmed by
//! re-deriving that single value.
//!
//! ## Features
//!
//! - Fixed, normalized header fields and maximum-level raw deflate
//! - Parallel compression with output identical to sequential adds
//! - Case-insensitive, separator-normalized input ordering
//! - Verification of local archives, or remote ones via HTTP Range requests
//!
//! ## Example
//!
//! ```
//! use torrentzip::ArchiveAssembler;
//!
//! let mut zip = ArchiveAssembler::new();
//! zip.add_entry("a.txt", b"hello")?;
//! let bytes = zip.finalize();
//! assert_eq!(&bytes[..4], b"PK\x03\x04");
//! # Ok::<(), torrentzip::EncodeError>(())
//! ```

pub mod cli;
pub mod io;
pub mod walk;
pub mod zip;

pub use cli::Cli;
pub use io::{HttpRangeReader, LocalFileReader, ReadAt};
pub use zip::{ArchiveAssembler, ArchiveVerifier, EncodeError, ZipFileEntry};
