use std::sync::Arc;

use crate::io::ReadAt;
use anyhow::Result;
use tracing::{debug, instrument, warn};

use super::codec;
use super::parser::ZipParser;
use super::structures::ZipFileEntry;

/// A problem found with one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryIssue {
    pub file_name: String,
    pub problem: String,
}

/// Outcome of checking an archive for canonical form.
#[derive(Debug, Clone)]
pub struct Verification {
    /// CRC recorded in a `TORRENTZIPPED-` comment, if the comment has that shape.
    pub stored_crc: Option<u32>,
    /// CRC-32 recomputed over the raw central directory.
    pub computed_crc: u32,
    pub entries: Vec<ZipFileEntry>,
    pub issues: Vec<EntryIssue>,
}

impl Verification {
    /// True when the comment matches the directory and no entry deviates.
    pub fn is_canonical(&self) -> bool {
        self.stored_crc == Some(self.computed_crc) && self.issues.is_empty()
    }
}

/// Checks archives against the normalized layout the assembler writes.
pub struct ArchiveVerifier<R: ReadAt> {
    parser: ZipParser<R>,
}

impl<R: ReadAt> ArchiveVerifier<R> {
    pub fn new(reader: Arc<R>) -> Self {
        Self {
            parser: ZipParser::new(reader),
        }
    }

    /// List all files in the archive
    pub async fn list_files(&self) -> Result<Vec<ZipFileEntry>> {
        Ok(self.parser.read_central_directory().await?.entries)
    }

    /// Re-derive the central directory CRC and compare it with the comment,
    /// then check every central and local header for normalized fields.
    ///
    /// Local headers must agree with their central records and follow each
    /// other without gaps. Payloads are not read.
    #[instrument(level = "debug", skip(self))]
    pub async fn verify(&self) -> Result<Verification> {
        let directory = self.parser.read_central_directory().await?;
        let stored_crc = directory.eocd.torrentzip_crc();
        let computed_crc = codec::crc32(&directory.bytes);
        debug!(?stored_crc, computed_crc, "central directory checksum");

        let mut issues = Vec::new();
        let mut expected_offset = 0u64;
        for entry in &directory.entries {
            let mut report = |problem: String| {
                issues.push(EntryIssue {
                    file_name: entry.file_name.clone(),
                    problem,
                })
            };

            for field in entry.deviations() {
                report(format!("{field} is not normalized"));
            }

            if entry.lfh_offset as u64 != expected_offset {
                report(format!(
                    "local header at {}, previous entry ends at {expected_offset}",
                    entry.lfh_offset
                ));
            }

            match self.parser.read_local_header(entry).await {
                Ok(local) => {
                    for field in local.deviations(entry) {
                        report(format!("{field} does not match"));
                    }
                    expected_offset = local.data_offset() + entry.compressed_size as u64;
                }
                Err(err) => {
                    warn!(name = %entry.file_name, "unreadable local header: {err:#}");
                    report(format!("{err:#}"));
                    expected_offset = u64::MAX;
                }
            }
        }

        if let Some(last) = directory.entries.last()
            && expected_offset != directory.eocd.cd_offset as u64
        {
            issues.push(EntryIssue {
                file_name: last.file_name.clone(),
                problem: "central directory does not follow this entry".to_string(),
            });
        }

        Ok(Verification {
            stored_crc,
            computed_crc,
            entries: directory.entries,
            issues,
        })
    }
}
