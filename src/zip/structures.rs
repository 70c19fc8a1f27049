use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use std::io::Cursor;

use anyhow::{Result, bail};

use super::error::{self, fit};

/// Version needed to extract: 2.0, the first version with deflate.
pub const VERSION_NEEDED: u16 = 20;
/// Version made by: MS-DOS host, spec version 0.
pub const VERSION_MADE_BY: u16 = 0;
/// General purpose flags: bit 1, "maximum compression".
pub const GENERAL_PURPOSE_FLAGS: u16 = 2;
/// Normalized DOS modification time, 23:32:00.
pub const DOS_TIME: u16 = 48128;
/// Normalized DOS modification date, 1996-12-24.
pub const DOS_DATE: u16 = 8600;

/// Prefix of the archive comment that marks a canonical archive.
pub const COMMENT_PREFIX: &[u8] = b"TORRENTZIPPED-";
/// Full comment length: the prefix plus eight hex digits.
pub const COMMENT_LEN: usize = 22;

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Unknown(v) => *v,
        }
    }
}

/// Local File Header (LFH) - 30 bytes plus the file name
pub const LFH_SIGNATURE: &[u8] = b"PK\x03\x04";
pub const LFH_SIZE: usize = 30;

/// Central Directory File Header (CDFH) - 46 bytes plus the file name
pub const CDFH_SIGNATURE: &[u8] = b"PK\x01\x02";
pub const CDFH_SIZE: usize = 46;

/// ZIP64 End of Central Directory Locator - 20 bytes, right before the EOCD
pub const ZIP64_LOCATOR_SIGNATURE: &[u8] = b"PK\x06\x07";
pub const ZIP64_LOCATOR_SIZE: usize = 20;

/// Local File Header with every normalizable field pinned.
///
/// Only the checksum, the two sizes and the name vary between entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFileHeader {
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub file_name: Vec<u8>,
}

impl LocalFileHeader {
    /// Validate field widths. Sizes are taken wide so that an oversized
    /// payload is reported instead of silently truncated.
    pub fn new(
        crc32: u32,
        compressed_size: u64,
        uncompressed_size: u64,
        file_name: &[u8],
    ) -> error::Result<Self> {
        fit::<u16, _>("file name length", file_name.len())?;
        Ok(Self {
            crc32,
            compressed_size: fit("compressed size", compressed_size)?,
            uncompressed_size: fit("uncompressed size", uncompressed_size)?,
            file_name: file_name.to_vec(),
        })
    }

    /// Encoded length in bytes.
    pub fn encoded_len(&self) -> usize {
        LFH_SIZE + self.file_name.len()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.encoded_len()];
        buf[0..4].copy_from_slice(LFH_SIGNATURE);
        LittleEndian::write_u16(&mut buf[4..], VERSION_NEEDED);
        LittleEndian::write_u16(&mut buf[6..], GENERAL_PURPOSE_FLAGS);
        LittleEndian::write_u16(&mut buf[8..], CompressionMethod::Deflate.as_u16());
        LittleEndian::write_u16(&mut buf[10..], DOS_TIME);
        LittleEndian::write_u16(&mut buf[12..], DOS_DATE);
        LittleEndian::write_u32(&mut buf[14..], self.crc32);
        LittleEndian::write_u32(&mut buf[18..], self.compressed_size);
        LittleEndian::write_u32(&mut buf[22..], self.uncompressed_size);
        // Width checked in `new`.
        LittleEndian::write_u16(&mut buf[26..], self.file_name.len() as u16);
        // Extra field length stays zero.
        buf[LFH_SIZE..].copy_from_slice(&self.file_name);
        buf
    }
}

/// Central Directory File Header with every normalizable field pinned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentralDirectoryHeader {
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub local_header_offset: u32,
    pub file_name: Vec<u8>,
}

impl CentralDirectoryHeader {
    pub fn new(
        crc32: u32,
        compressed_size: u64,
        uncompressed_size: u64,
        local_header_offset: u64,
        file_name: &[u8],
    ) -> error::Result<Self> {
        fit::<u16, _>("file name length", file_name.len())?;
        Ok(Self {
            crc32,
            compressed_size: fit("compressed size", compressed_size)?,
            uncompressed_size: fit("uncompressed size", uncompressed_size)?,
            local_header_offset: fit("local header offset", local_header_offset)?,
            file_name: file_name.to_vec(),
        })
    }

    /// Encoded length in bytes.
    pub fn encoded_len(&self) -> usize {
        CDFH_SIZE + self.file_name.len()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.encoded_len()];
        buf[0..4].copy_from_slice(CDFH_SIGNATURE);
        LittleEndian::write_u16(&mut buf[4..], VERSION_MADE_BY);
        LittleEndian::write_u16(&mut buf[6..], VERSION_NEEDED);
        LittleEndian::write_u16(&mut buf[8..], GENERAL_PURPOSE_FLAGS);
        LittleEndian::write_u16(&mut buf[10..], CompressionMethod::Deflate.as_u16());
        LittleEndian::write_u16(&mut buf[12..], DOS_TIME);
        LittleEndian::write_u16(&mut buf[14..], DOS_DATE);
        LittleEndian::write_u32(&mut buf[16..], self.crc32);
        LittleEndian::write_u32(&mut buf[20..], self.compressed_size);
        LittleEndian::write_u32(&mut buf[24..], self.uncompressed_size);
        LittleEndian::write_u16(&mut buf[28..], self.file_name.len() as u16);
        // Extra length, comment length, disk number start, internal and
        // external attributes (bytes 30..42) stay zero.
        LittleEndian::write_u32(&mut buf[42..], self.local_header_offset);
        buf[CDFH_SIZE..].copy_from_slice(&self.file_name);
        buf
    }
}

/// End of Central Directory (EOCD) - 22 bytes plus the comment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_cd: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_len: u16,
    pub comment: Vec<u8>,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: &'static [u8] = b"PK\x05\x06";
    pub const SIZE: usize = 22;

    /// Build the single-disk record for a canonical archive whose central
    /// directory checksums to `cd_crc32`.
    pub fn new(total_entries: u16, cd_size: u32, cd_offset: u32, cd_crc32: u32) -> Self {
        let comment = torrentzip_comment(cd_crc32);
        Self {
            disk_number: 0,
            disk_with_cd: 0,
            disk_entries: total_entries,
            total_entries,
            cd_size,
            cd_offset,
            comment_len: COMMENT_LEN as u16,
            comment,
        }
    }

    /// Like [`new`](Self::new), validating widths first.
    pub fn try_new(
        total_entries: usize,
        cd_size: u64,
        cd_offset: u64,
        cd_crc32: u32,
    ) -> error::Result<Self> {
        Ok(Self::new(
            fit("entry count", total_entries)?,
            fit("central directory size", cd_size)?,
            fit("central directory offset", cd_offset)?,
            cd_crc32,
        ))
    }

    /// Encoded length in bytes.
    pub fn encoded_len(&self) -> usize {
        Self::SIZE + self.comment.len()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.encoded_len()];
        buf[0..4].copy_from_slice(Self::SIGNATURE);
        LittleEndian::write_u16(&mut buf[4..], self.disk_number);
        LittleEndian::write_u16(&mut buf[6..], self.disk_with_cd);
        LittleEndian::write_u16(&mut buf[8..], self.disk_entries);
        LittleEndian::write_u16(&mut buf[10..], self.total_entries);
        LittleEndian::write_u32(&mut buf[12..], self.cd_size);
        LittleEndian::write_u32(&mut buf[16..], self.cd_offset);
        LittleEndian::write_u16(&mut buf[20..], self.comment_len);
        buf[Self::SIZE..].copy_from_slice(&self.comment);
        buf
    }

    /// Parse the fixed part and, when present in `data`, the comment.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            bail!("Invalid End of Central Directory");
        }

        // Verify signature
        if &data[0..4] != Self::SIGNATURE {
            bail!("Invalid End of Central Directory");
        }

        let mut cursor = Cursor::new(&data[4..]);

        let disk_number = cursor.read_u16::<LittleEndian>()?;
        let disk_with_cd = cursor.read_u16::<LittleEndian>()?;
        let disk_entries = cursor.read_u16::<LittleEndian>()?;
        let total_entries = cursor.read_u16::<LittleEndian>()?;
        let cd_size = cursor.read_u32::<LittleEndian>()?;
        let cd_offset = cursor.read_u32::<LittleEndian>()?;
        let comment_len = cursor.read_u16::<LittleEndian>()?;

        let comment_end = Self::SIZE + comment_len as usize;
        let comment = data.get(Self::SIZE..comment_end).unwrap_or_default().to_vec();

        Ok(Self {
            disk_number,
            disk_with_cd,
            disk_entries,
            total_entries,
            cd_size,
            cd_offset,
            comment_len,
            comment,
        })
    }

    /// Whether any field holds the value ZIP64 uses to defer to its own
    /// record. These are also valid plain values; only a ZIP64 locator in
    /// front of the EOCD settles it.
    pub fn has_zip64_sentinels(&self) -> bool {
        self.disk_entries == 0xFFFF
            || self.total_entries == 0xFFFF
            || self.cd_size == 0xFFFFFFFF
            || self.cd_offset == 0xFFFFFFFF
    }

    /// The central directory CRC-32 recorded in a `TORRENTZIPPED-` comment.
    ///
    /// Returns `None` unless the comment is exactly the prefix followed by
    /// eight uppercase hex digits.
    pub fn torrentzip_crc(&self) -> Option<u32> {
        if self.comment.len() != COMMENT_LEN {
            return None;
        }
        let digits = self.comment.strip_prefix(COMMENT_PREFIX)?;
        if !digits
            .iter()
            .all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(b))
        {
            return None;
        }
        let digits = std::str::from_utf8(digits).ok()?;
        u32::from_str_radix(digits, 16).ok()
    }
}

/// `TORRENTZIPPED-` followed by the zero-padded uppercase hex CRC.
pub fn torrentzip_comment(cd_crc32: u32) -> Vec<u8> {
    let mut comment = Vec::with_capacity(COMMENT_LEN);
    comment.extend_from_slice(COMMENT_PREFIX);
    comment.extend_from_slice(format!("{cd_crc32:08X}").as_bytes());
    comment
}

/// Parsed ZIP file entry information
#[derive(Debug, Clone)]
pub struct ZipFileEntry {
    pub file_name: String,
    pub raw_name: Vec<u8>,
    pub version_made_by: u16,
    pub version_needed: u16,
    pub flags: u16,
    pub compression_method: CompressionMethod,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub crc32: u32,
    pub lfh_offset: u32,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub extra_field_length: u16,
    pub comment_length: u16,
    pub disk_number_start: u16,
    pub internal_attrs: u16,
    pub external_attrs: u32,
}

impl ZipFileEntry {
    /// Parse modification date to (year, month, day)
    pub fn mod_date(&self) -> (u16, u8, u8) {
        let day = (self.last_mod_date & 0x1F) as u8;
        let month = ((self.last_mod_date >> 5) & 0x0F) as u8;
        let year = ((self.last_mod_date >> 9) & 0x7F) + 1980;
        (year, month, day)
    }

    /// Parse modification time to (hour, minute, second)
    pub fn mod_time(&self) -> (u8, u8, u8) {
        let second = ((self.last_mod_time & 0x1F) * 2) as u8;
        let minute = ((self.last_mod_time >> 5) & 0x3F) as u8;
        let hour = ((self.last_mod_time >> 11) & 0x1F) as u8;
        (hour, minute, second)
    }

    /// Names of the fixed header fields that deviate from the normalized
    /// values this crate writes.
    pub fn deviations(&self) -> Vec<&'static str> {
        let checks = [
            ("version made by", self.version_made_by == VERSION_MADE_BY),
            ("version needed", self.version_needed == VERSION_NEEDED),
            ("flags", self.flags == GENERAL_PURPOSE_FLAGS),
            (
                "compression method",
                self.compression_method == CompressionMethod::Deflate,
            ),
            ("modification time", self.last_mod_time == DOS_TIME),
            ("modification date", self.last_mod_date == DOS_DATE),
            ("extra field", self.extra_field_length == 0),
            ("file comment", self.comment_length == 0),
            ("disk number start", self.disk_number_start == 0),
            ("internal attributes", self.internal_attrs == 0),
            ("external attributes", self.external_attrs == 0),
        ];
        checks
            .into_iter()
            .filter(|(_, ok)| !ok)
            .map(|(field, _)| field)
            .collect()
    }
}

/// Local File Header as read back from an archive.
#[derive(Debug, Clone)]
pub struct LocalHeaderRecord {
    pub offset: u32,
    pub version_needed: u16,
    pub flags: u16,
    pub compression_method: CompressionMethod,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub extra_field_length: u16,
    pub file_name: Vec<u8>,
}

impl LocalHeaderRecord {
    /// Offset where the entry's compressed data begins.
    pub fn data_offset(&self) -> u64 {
        self.offset as u64
            + LFH_SIZE as u64
            + self.file_name.len() as u64
            + self.extra_field_length as u64
    }

    /// Fields that deviate from the normalized values or disagree with the
    /// central directory record of the same entry.
    pub fn deviations(&self, central: &ZipFileEntry) -> Vec<&'static str> {
        let checks = [
            ("local version needed", self.version_needed == VERSION_NEEDED),
            ("local flags", self.flags == GENERAL_PURPOSE_FLAGS),
            (
                "local compression method",
                self.compression_method == CompressionMethod::Deflate,
            ),
            ("local modification time", self.last_mod_time == DOS_TIME),
            ("local modification date", self.last_mod_date == DOS_DATE),
            ("local extra field", self.extra_field_length == 0),
            ("local CRC-32", self.crc32 == central.crc32),
            (
                "local compressed size",
                self.compressed_size == central.compressed_size,
            ),
            (
                "local uncompressed size",
                self.uncompressed_size == central.uncompressed_size,
            ),
            ("local file name", self.file_name == central.raw_name),
        ];
        checks
            .into_iter()
            .filter(|(_, ok)| !ok)
            .map(|(field, _)| field)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::error::EncodeError;

    #[test]
    fn local_header_layout() {
        let header = LocalFileHeader::new(0x3610a686, 7, 5, b"a.txt").unwrap();
        let bytes = header.encode();

        assert_eq!(bytes.len(), 35);
        assert_eq!(
            &bytes[..30],
            &[
                0x50, 0x4b, 0x03, 0x04, // signature
                20, 0, // version needed
                2, 0, // flags
                8, 0, // deflate
                0x00, 0xbc, // 48128
                0x98, 0x21, // 8600
                0x86, 0xa6, 0x10, 0x36, // crc32
                7, 0, 0, 0, // compressed size
                5, 0, 0, 0, // uncompressed size
                5, 0, // name length
                0, 0, // extra length
            ]
        );
        assert_eq!(&bytes[30..], b"a.txt");
    }

    #[test]
    fn central_header_layout() {
        let header = CentralDirectoryHeader::new(0x3610a686, 7, 5, 0x0102_0304, b"a.txt");
        let bytes = header.unwrap().encode();

        assert_eq!(bytes.len(), 51);
        assert_eq!(&bytes[0..4], b"PK\x01\x02");
        assert_eq!(&bytes[4..6], &[0, 0]);
        assert_eq!(&bytes[6..16], &[20, 0, 2, 0, 8, 0, 0x00, 0xbc, 0x98, 0x21]);
        assert_eq!(&bytes[16..20], &0x3610a686u32.to_le_bytes());
        assert_eq!(&bytes[28..30], &[5, 0]);
        assert!(bytes[30..42].iter().all(|b| *b == 0));
        assert_eq!(&bytes[42..46], &[4, 3, 2, 1]);
        assert_eq!(&bytes[46..], b"a.txt");
    }

    #[test]
    fn name_length_counts_bytes() {
        // Five characters, eight bytes.
        let name = "ä/ü/ß".as_bytes();
        let bytes = LocalFileHeader::new(0, 0, 0, name).unwrap().encode();
        assert_eq!(LittleEndian::read_u16(&bytes[26..]), 8);
        assert_eq!(bytes.len(), LFH_SIZE + 8);

        let name = "日本.txt".as_bytes();
        let bytes = CentralDirectoryHeader::new(0, 0, 0, 0, name).unwrap().encode();
        assert_eq!(LittleEndian::read_u16(&bytes[28..]), 10);
    }

    #[test]
    fn name_length_boundary() {
        let longest = vec![b'a'; 65535];
        assert!(LocalFileHeader::new(0, 0, 0, &longest).is_ok());
        assert!(CentralDirectoryHeader::new(0, 0, 0, 0, &longest).is_ok());

        let too_long = vec![b'a'; 65536];
        assert!(matches!(
            LocalFileHeader::new(0, 0, 0, &too_long),
            Err(EncodeError::FieldOverflow { value: 65536, .. })
        ));
        assert!(matches!(
            CentralDirectoryHeader::new(0, 0, 0, 0, &too_long),
            Err(EncodeError::FieldOverflow { max: 65535, .. })
        ));
    }

    #[test]
    fn size_overflow() {
        let limit = u32::MAX as u64;
        assert!(LocalFileHeader::new(0, limit, limit, b"x").is_ok());
        assert!(matches!(
            LocalFileHeader::new(0, limit + 1, 0, b"x"),
            Err(EncodeError::FieldOverflow {
                field: "compressed size",
                ..
            })
        ));
        assert!(matches!(
            CentralDirectoryHeader::new(0, 0, limit + 1, 0, b"x"),
            Err(EncodeError::FieldOverflow {
                field: "uncompressed size",
                ..
            })
        ));
        assert!(matches!(
            CentralDirectoryHeader::new(0, 0, 0, limit + 1, b"x"),
            Err(EncodeError::FieldOverflow {
                field: "local header offset",
                ..
            })
        ));
    }

    #[test]
    fn eocd_layout_and_comment() {
        let eocd = EndOfCentralDirectory::new(3, 0x99, 0x1234, 0x0abc_def0);
        let bytes = eocd.encode();

        assert_eq!(bytes.len(), 44);
        assert_eq!(&bytes[0..4], b"PK\x05\x06");
        assert_eq!(&bytes[4..8], &[0, 0, 0, 0]);
        assert_eq!(&bytes[8..12], &[3, 0, 3, 0]);
        assert_eq!(&bytes[12..16], &[0x99, 0, 0, 0]);
        assert_eq!(&bytes[16..20], &[0x34, 0x12, 0, 0]);
        assert_eq!(&bytes[20..22], &[22, 0]);
        // Leading zero nibble is kept.
        assert_eq!(&bytes[22..], b"TORRENTZIPPED-0ABCDEF0");

        let parsed = EndOfCentralDirectory::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, eocd);
        assert_eq!(parsed.torrentzip_crc(), Some(0x0abc_def0));
    }

    #[test]
    fn eocd_entry_count_overflow() {
        assert!(EndOfCentralDirectory::try_new(65535, 0, 0, 0).is_ok());
        assert!(matches!(
            EndOfCentralDirectory::try_new(65536, 0, 0, 0),
            Err(EncodeError::FieldOverflow {
                field: "entry count",
                ..
            })
        ));
    }

    #[test]
    fn foreign_comments_are_not_torrentzip() {
        let mut eocd = EndOfCentralDirectory::new(0, 0, 0, 0);
        eocd.comment = b"TORRENTZIPPED-0abcdef0".to_vec();
        assert_eq!(eocd.torrentzip_crc(), None);

        eocd.comment = b"made by something else".to_vec();
        assert_eq!(eocd.torrentzip_crc(), None);
    }

    #[test]
    fn sentinels_are_plain_values() {
        let eocd = EndOfCentralDirectory::new(0xFFFF, 0, 0, 0);
        assert!(eocd.has_zip64_sentinels());
        assert!(!EndOfCentralDirectory::new(0xFFFE, 0, 0, 0).has_zip64_sentinels());
    }

    fn central_for(name: &[u8]) -> ZipFileEntry {
        ZipFileEntry {
            file_name: String::from_utf8_lossy(name).into_owned(),
            raw_name: name.to_vec(),
            version_made_by: VERSION_MADE_BY,
            version_needed: VERSION_NEEDED,
            flags: GENERAL_PURPOSE_FLAGS,
            compression_method: CompressionMethod::Deflate,
            compressed_size: 7,
            uncompressed_size: 5,
            crc32: 0x3610a686,
            lfh_offset: 0,
            last_mod_time: DOS_TIME,
            last_mod_date: DOS_DATE,
            extra_field_length: 0,
            comment_length: 0,
            disk_number_start: 0,
            internal_attrs: 0,
            external_attrs: 0,
        }
    }

    #[test]
    fn local_header_checked_against_central() {
        let central = central_for(b"a.txt");
        let mut local = LocalHeaderRecord {
            offset: 0,
            version_needed: VERSION_NEEDED,
            flags: GENERAL_PURPOSE_FLAGS,
            compression_method: CompressionMethod::Deflate,
            last_mod_time: DOS_TIME,
            last_mod_date: DOS_DATE,
            crc32: 0x3610a686,
            compressed_size: 7,
            uncompressed_size: 5,
            extra_field_length: 0,
            file_name: b"a.txt".to_vec(),
        };
        assert!(local.deviations(&central).is_empty());
        assert_eq!(local.data_offset(), 35);

        local.last_mod_time = 0;
        local.uncompressed_size = 6;
        local.file_name = b"A.txt".to_vec();
        assert_eq!(
            local.deviations(&central),
            [
                "local modification time",
                "local uncompressed size",
                "local file name"
            ]
        );
    }
}
