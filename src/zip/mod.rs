//! Reproducible ZIP archive writing and verification.
//!
//! ## Architecture
//!
//! - [`structures`]: the three on-disk records (local header, central
//!   directory header, EOCD) with their pinned field values
//! - [`codec`]: CRC-32 and raw deflate
//! - [`assembler`]: places entries, tracks offsets and projects the archive
//! - [`parser`] and [`verifier`]: read an archive back and check that it is
//!   in canonical form
//!
//! ## Canonical Form
//!
//! Every entry is raw deflate at the maximum level with the same version,
//! flags, DOS timestamp (1996-12-24 23:32:00) and zeroed attributes. The EOCD
//! comment is `TORRENTZIPPED-` followed by the uppercase hex CRC-32 of the
//! encoded central directory, so two archives built from the same entries in
//! the same order are byte-identical and can be compared by checksum.
//!
//! ## Limitations
//!
//! - No ZIP64: sizes and offsets must fit 32 bits, at most 65535 entries
//! - No encryption
//! - No multi-disk archives
//! - DEFLATE only

pub mod assembler;
pub mod codec;
mod error;
mod parser;
pub mod structures;
mod verifier;

pub use assembler::{ArchiveAssembler, CompressedData, Entry};
pub use error::{EncodeError, Result};
pub use parser::{CentralDirectory, ZipParser};
pub use structures::{
    CentralDirectoryHeader, CompressionMethod, EndOfCentralDirectory, LocalFileHeader,
    LocalHeaderRecord, ZipFileEntry,
};
pub use verifier::{ArchiveVerifier, EntryIssue, Verification};
