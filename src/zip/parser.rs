//! Low-level ZIP archive parser.
//!
//! Reads the structures written by the assembler back from any source that
//! implements the [`ReadAt`] trait, so an archive can be checked without
//! trusting the process that produced it.
//!
//! ## Parsing Strategy
//!
//! ZIP files are designed to be read from the end:
//! 1. Find the End of Central Directory (EOCD) at the file's end
//! 2. Read the Central Directory in one piece, keeping the raw bytes
//!    (its CRC-32 is what the `TORRENTZIPPED-` comment records)
//! 3. Read each entry's Local File Header to compare it with its central record
//!
//! Only the tail of the archive and the local headers are read; payloads never
//! are, which keeps remote verification over HTTP Range requests cheap.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};
use std::sync::Arc;

use crate::io::ReadAt;
use anyhow::{Result, bail};
use tracing::{debug, trace};

use super::structures::*;

/// Maximum ZIP comment size allowed by the format (65535 bytes).
///
/// This limits the search area when looking for EOCD with a comment.
const MAX_COMMENT_SIZE: u64 = 65535;

/// Raw central directory together with its parsed entries.
#[derive(Debug, Clone)]
pub struct CentralDirectory {
    pub eocd: EndOfCentralDirectory,
    pub bytes: Vec<u8>,
    pub entries: Vec<ZipFileEntry>,
}

/// Low-level ZIP file parser, generic over the data source.
///
/// Typically used through [`ArchiveVerifier`](super::ArchiveVerifier).
pub struct ZipParser<R: ReadAt> {
    reader: Arc<R>,
    size: u64,
}

impl<R: ReadAt> ZipParser<R> {
    pub fn new(reader: Arc<R>) -> Self {
        let size = reader.size();
        Self { reader, size }
    }

    /// Find and parse the End of Central Directory record.
    ///
    /// Canonical archives carry a 22-byte comment, so that position is
    /// tried first before falling back to a backwards scan.
    ///
    /// Returns the record and its offset in the file.
    pub async fn find_eocd(&self) -> Result<(EndOfCentralDirectory, u64)> {
        let canonical_len = (EndOfCentralDirectory::SIZE + COMMENT_LEN) as u64;
        if self.size >= canonical_len {
            let offset = self.size - canonical_len;
            let mut buf = vec![0u8; canonical_len as usize];
            self.reader.read_exact_at(offset, &mut buf).await?;

            if &buf[0..4] == EndOfCentralDirectory::SIGNATURE
                && buf[20..22] == (COMMENT_LEN as u16).to_le_bytes()
            {
                trace!(offset, "EOCD at canonical position");
                return Ok((EndOfCentralDirectory::from_bytes(&buf)?, offset));
            }
        }

        // The comment has some other length: scan backwards for a signature
        // whose comment length reaches exactly to the end of the file.
        let search_size = (MAX_COMMENT_SIZE + EndOfCentralDirectory::SIZE as u64).min(self.size);
        let search_start = self.size - search_size;

        let mut buf = vec![0u8; search_size as usize];
        self.reader.read_exact_at(search_start, &mut buf).await?;

        let Some(last) = buf.len().checked_sub(EndOfCentralDirectory::SIZE) else {
            bail!("Not a valid ZIP file");
        };
        for i in (0..=last).rev() {
            if &buf[i..i + 4] == EndOfCentralDirectory::SIGNATURE {
                let comment_len = u16::from_le_bytes([buf[i + 20], buf[i + 21]]) as usize;

                if comment_len == buf.len() - i - EndOfCentralDirectory::SIZE {
                    let offset = search_start + i as u64;
                    debug!(offset, comment_len, "EOCD found by scan");
                    return Ok((EndOfCentralDirectory::from_bytes(&buf[i..])?, offset));
                }
            }
        }

        bail!("Not a valid ZIP file")
    }

    /// Read the whole Central Directory and parse every header in it.
    pub async fn read_central_directory(&self) -> Result<CentralDirectory> {
        let (eocd, eocd_offset) = self.find_eocd().await?;

        if eocd.has_zip64_sentinels() && self.has_zip64_locator(eocd_offset).await? {
            bail!("ZIP64 archives are not supported");
        }
        if eocd.disk_number != 0
            || eocd.disk_with_cd != 0
            || eocd.disk_entries != eocd.total_entries
        {
            bail!("Multi-disk archives are not supported");
        }
        let cd_end = eocd.cd_offset as u64 + eocd.cd_size as u64;
        if cd_end > eocd_offset {
            bail!("Central Directory overlaps the End of Central Directory");
        }

        let mut bytes = vec![0u8; eocd.cd_size as usize];
        self.reader
            .read_exact_at(eocd.cd_offset as u64, &mut bytes)
            .await?;

        let mut entries = Vec::with_capacity(eocd.total_entries as usize);
        let mut cursor = Cursor::new(bytes.as_slice());
        for _ in 0..eocd.total_entries {
            entries.push(parse_cdfh(&mut cursor)?);
        }
        if cursor.position() != bytes.len() as u64 {
            bail!(
                "Central Directory has {} trailing bytes",
                bytes.len() as u64 - cursor.position()
            );
        }

        Ok(CentralDirectory {
            eocd,
            bytes,
            entries,
        })
    }

    /// Whether a ZIP64 EOCD locator sits right before the EOCD.
    ///
    /// 0xFFFF entries or an offset of 0xFFFFFFFF are legal plain values, so
    /// the sentinels alone do not make an archive ZIP64.
    async fn has_zip64_locator(&self, eocd_offset: u64) -> Result<bool> {
        let Some(locator_offset) = eocd_offset.checked_sub(ZIP64_LOCATOR_SIZE as u64) else {
            return Ok(false);
        };
        let mut sig = [0u8; 4];
        self.reader.read_exact_at(locator_offset, &mut sig).await?;
        Ok(sig == ZIP64_LOCATOR_SIGNATURE)
    }

    /// Read and decode an entry's Local File Header, name included.
    pub async fn read_local_header(&self, entry: &ZipFileEntry) -> Result<LocalHeaderRecord> {
        let offset = entry.lfh_offset as u64;
        let mut lfh_buf = vec![0u8; LFH_SIZE];
        self.reader.read_exact_at(offset, &mut lfh_buf).await?;

        let mut cursor = Cursor::new(lfh_buf.as_slice());
        let mut sig = [0u8; 4];
        cursor.read_exact(&mut sig)?;
        if sig != LFH_SIGNATURE {
            bail!("Invalid Local File Header for {}", entry.file_name);
        }

        let version_needed = cursor.read_u16::<LittleEndian>()?;
        let flags = cursor.read_u16::<LittleEndian>()?;
        let compression_method = cursor.read_u16::<LittleEndian>()?;
        let last_mod_time = cursor.read_u16::<LittleEndian>()?;
        let last_mod_date = cursor.read_u16::<LittleEndian>()?;
        let crc32 = cursor.read_u32::<LittleEndian>()?;
        let compressed_size = cursor.read_u32::<LittleEndian>()?;
        let uncompressed_size = cursor.read_u32::<LittleEndian>()?;
        let file_name_length = cursor.read_u16::<LittleEndian>()?;
        let extra_field_length = cursor.read_u16::<LittleEndian>()?;

        let mut file_name = vec![0u8; file_name_length as usize];
        self.reader
            .read_exact_at(offset + LFH_SIZE as u64, &mut file_name)
            .await?;

        Ok(LocalHeaderRecord {
            offset: entry.lfh_offset,
            version_needed,
            flags,
            compression_method: CompressionMethod::from_u16(compression_method),
            last_mod_time,
            last_mod_date,
            crc32,
            compressed_size,
            uncompressed_size,
            extra_field_length,
            file_name,
        })
    }
}

/// Parse one Central Directory File Header, including its name and
/// skipping any extra field and comment.
fn parse_cdfh(cursor: &mut Cursor<&[u8]>) -> Result<ZipFileEntry> {
    let mut sig = [0u8; 4];
    cursor.read_exact(&mut sig)?;
    if sig != CDFH_SIGNATURE {
        bail!("Invalid Central Directory File Header");
    }

    let version_made_by = cursor.read_u16::<LittleEndian>()?;
    let version_needed = cursor.read_u16::<LittleEndian>()?;
    let flags = cursor.read_u16::<LittleEndian>()?;
    let compression_method = cursor.read_u16::<LittleEndian>()?;
    let last_mod_time = cursor.read_u16::<LittleEndian>()?;
    let last_mod_date = cursor.read_u16::<LittleEndian>()?;
    let crc32 = cursor.read_u32::<LittleEndian>()?;
    let compressed_size = cursor.read_u32::<LittleEndian>()?;
    let uncompressed_size = cursor.read_u32::<LittleEndian>()?;
    let file_name_length = cursor.read_u16::<LittleEndian>()?;
    let extra_field_length = cursor.read_u16::<LittleEndian>()?;
    let comment_length = cursor.read_u16::<LittleEndian>()?;
    let disk_number_start = cursor.read_u16::<LittleEndian>()?;
    let internal_attrs = cursor.read_u16::<LittleEndian>()?;
    let external_attrs = cursor.read_u32::<LittleEndian>()?;
    let lfh_offset = cursor.read_u32::<LittleEndian>()?;

    let mut raw_name = vec![0u8; file_name_length as usize];
    cursor.read_exact(&mut raw_name)?;
    let file_name = String::from_utf8_lossy(&raw_name).into_owned();

    let skip = extra_field_length as u64 + comment_length as u64;
    let end = cursor.position() + skip;
    if end > cursor.get_ref().len() as u64 {
        bail!("Central Directory File Header for {file_name} is truncated");
    }
    cursor.set_position(end);

    Ok(ZipFileEntry {
        file_name,
        raw_name,
        version_made_by,
        version_needed,
        flags,
        compression_method: CompressionMethod::from_u16(compression_method),
        compressed_size,
        uncompressed_size,
        crc32,
        lfh_offset,
        last_mod_time,
        last_mod_date,
        extra_field_length,
        comment_length,
        disk_number_start,
        internal_attrs,
        external_attrs,
    })
}
