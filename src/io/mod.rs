mod http;
mod local;

pub use http::HttpRangeReader;
pub use local::LocalFileReader;

use anyhow::{Result, bail};
use async_trait::async_trait;

/// Trait for random access reading from a data source
#[async_trait]
pub trait ReadAt: Send + Sync {
    /// Read data at the specified offset into the buffer, returning how
    /// many bytes were read. Zero means the offset is at or past the end.
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Get the total size of the data source
    fn size(&self) -> u64;

    /// Fill `buf` completely from `offset`, failing on a short source.
    async fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let at = offset + filled as u64;
            let n = self.read_at(at, &mut buf[filled..]).await?;
            if n == 0 {
                bail!(
                    "unexpected end of data at offset {at} ({} of {} bytes read)",
                    filled,
                    buf.len()
                );
            }
            filled += n;
        }
        Ok(())
    }
}
