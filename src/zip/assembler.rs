//! Archive assembly.
//!
//! The assembler owns the entry sequence of one archive. Entries are placed
//! strictly in the order they are added, and the finished archive is a pure
//! projection of what has been placed so far:
//!
//! ```text
//! [local header + deflate data]*  [central directory header]*  EOCD
//! ```

use std::path::Path;

use rayon::prelude::*;
use tracing::{debug, instrument, trace};

use super::codec;
use super::error::{EncodeError, Result, fit};
use super::structures::{CentralDirectoryHeader, EndOfCentralDirectory, LocalFileHeader};

/// One entry as recorded in the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub file_name: Vec<u8>,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub local_header_offset: u32,
}

/// Checksummed and compressed content that has not been placed yet.
///
/// Computing this is independent per entry, so it may happen on any thread
/// and in any order; placement through [`ArchiveAssembler::push_compressed`]
/// is what fixes the layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedData {
    pub crc32: u32,
    pub uncompressed_size: u64,
    pub data: Vec<u8>,
}

impl CompressedData {
    pub fn new(content: &[u8]) -> Result<Self> {
        Ok(Self {
            crc32: codec::crc32(content),
            uncompressed_size: content.len() as u64,
            data: codec::deflate_raw(content).map_err(EncodeError::Compression)?,
        })
    }

    /// Read `path` and compress its content.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read(path).map_err(|source| EncodeError::SourceRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::new(&content)
    }
}

/// Running totals. Only ever advanced by [`Layout::place`].
#[derive(Debug, Clone, Copy, Default)]
struct Layout {
    entries: usize,
    offset: u64,
    cd_size: u64,
}

/// A fully encoded entry, ready to be committed.
struct Placed {
    entry: Entry,
    local_header: Vec<u8>,
    data: Vec<u8>,
    central_header: Vec<u8>,
}

impl Layout {
    /// Encode both headers for the next entry and advance the totals.
    ///
    /// Every width the EOCD will later need is checked here, so `self` is
    /// left untouched on error and finalizing can never fail.
    fn place(&mut self, file_name: &[u8], payload: CompressedData) -> Result<Placed> {
        let entries: u16 = fit("entry count", self.entries + 1)?;
        let compressed_size = payload.data.len() as u64;

        let local = LocalFileHeader::new(
            payload.crc32,
            compressed_size,
            payload.uncompressed_size,
            file_name,
        )?;
        let central = CentralDirectoryHeader::new(
            payload.crc32,
            compressed_size,
            payload.uncompressed_size,
            self.offset,
            file_name,
        )?;

        let offset = self.offset + local.encoded_len() as u64 + compressed_size;
        let cd_size = self.cd_size + central.encoded_len() as u64;
        fit::<u32, _>("central directory offset", offset)?;
        fit::<u32, _>("central directory size", cd_size)?;

        let entry = Entry {
            file_name: file_name.to_vec(),
            crc32: central.crc32,
            compressed_size: central.compressed_size,
            uncompressed_size: central.uncompressed_size,
            local_header_offset: central.local_header_offset,
        };

        *self = Layout {
            entries: entries as usize,
            offset,
            cd_size,
        };

        Ok(Placed {
            entry,
            local_header: local.encode(),
            data: payload.data,
            central_header: central.encode(),
        })
    }
}

/// Builder for one reproducible archive.
///
/// Not meant to be shared between producers: placement order is the add
/// order, so all adds must come from a single writer.
#[derive(Debug, Default)]
pub struct ArchiveAssembler {
    layout: Layout,
    entries: Vec<Entry>,
    files: Vec<(Vec<u8>, Vec<u8>)>,
    central_directory: Vec<u8>,
}

impl ArchiveAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compress `content` and append it under `file_name`.
    #[instrument(
        level = "debug",
        skip_all,
        fields(name = %String::from_utf8_lossy(file_name.as_ref()), size = content.len())
    )]
    pub fn add_entry(&mut self, file_name: impl AsRef<[u8]>, content: &[u8]) -> Result<()> {
        let payload = CompressedData::new(content)?;
        self.push_compressed(file_name, payload)
    }

    /// Read the file at `path` and append it under `file_name`.
    #[instrument(
        level = "debug",
        skip_all,
        fields(
            name = %String::from_utf8_lossy(file_name.as_ref()),
            path = %path.as_ref().display()
        )
    )]
    pub fn add_file(&mut self, file_name: impl AsRef<[u8]>, path: impl AsRef<Path>) -> Result<()> {
        let payload = CompressedData::from_path(path.as_ref())?;
        self.push_compressed(file_name, payload)
    }

    /// Append an entry whose content was compressed ahead of time.
    pub fn push_compressed(
        &mut self,
        file_name: impl AsRef<[u8]>,
        payload: CompressedData,
    ) -> Result<()> {
        let placed = self.layout.place(file_name.as_ref(), payload)?;
        self.commit(placed);
        Ok(())
    }

    /// Read and compress `files` concurrently, then append them in slice order.
    ///
    /// The output is byte-identical to calling [`add_file`](Self::add_file)
    /// for each pair in turn. The batch is all-or-nothing: on error, the error
    /// of the earliest failing pair is returned and nothing is appended.
    #[instrument(level = "debug", skip_all, fields(count = files.len()))]
    pub fn add_files<N, P>(&mut self, files: &[(N, P)]) -> Result<()>
    where
        N: AsRef<[u8]> + Sync,
        P: AsRef<Path> + Sync,
    {
        let payloads: Vec<Result<CompressedData>> = files
            .par_iter()
            .map(|(_, path)| CompressedData::from_path(path.as_ref()))
            .collect();
        debug!("compressed batch");

        let mut layout = self.layout;
        let mut staged = Vec::with_capacity(files.len());
        for ((name, _), payload) in files.iter().zip(payloads) {
            staged.push(layout.place(name.as_ref(), payload?)?);
        }

        self.layout = layout;
        for placed in staged {
            self.commit(placed);
        }
        Ok(())
    }

    fn commit(&mut self, placed: Placed) {
        trace!(
            offset = placed.entry.local_header_offset,
            compressed = placed.entry.compressed_size,
            "placed entry"
        );
        self.central_directory.extend_from_slice(&placed.central_header);
        self.files.push((placed.local_header, placed.data));
        self.entries.push(placed.entry);
    }

    /// Entries in archive order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encoded central directory: every central header, in archive order.
    pub fn central_directory(&self) -> &[u8] {
        &self.central_directory
    }

    /// CRC-32 over the encoded central directory.
    pub fn central_directory_crc32(&self) -> u32 {
        codec::crc32(&self.central_directory)
    }

    pub fn end_of_central_directory(&self) -> EndOfCentralDirectory {
        // Widths were checked by `Layout::place` for every entry.
        EndOfCentralDirectory::new(
            self.layout.entries as u16,
            self.layout.cd_size as u32,
            self.layout.offset as u32,
            self.central_directory_crc32(),
        )
    }

    /// The complete archive.
    ///
    /// Repeatable and side-effect free; entries added afterwards simply show
    /// up in the next call.
    pub fn finalize(&self) -> Vec<u8> {
        let eocd = self.end_of_central_directory();
        let total =
            self.layout.offset as usize + self.central_directory.len() + eocd.encoded_len();

        let mut out = Vec::with_capacity(total);
        for (header, data) in &self.files {
            out.extend_from_slice(header);
            out.extend_from_slice(data);
        }
        out.extend_from_slice(&self.central_directory);
        out.extend_from_slice(&eocd.encode());
        debug!(entries = self.len(), bytes = out.len(), "finalized archive");
        out
    }
}
