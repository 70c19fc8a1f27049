use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while encoding entries into an archive.
///
/// A failed call never leaves a half-added entry behind.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// A value does not fit the fixed-width field it is written to.
    #[error("{field} of {value} exceeds the ZIP field maximum of {max}")]
    FieldOverflow {
        field: &'static str,
        value: u64,
        max: u64,
    },

    /// The entry's source bytes could not be read.
    #[error("failed to read {}: {source}", path.display())]
    SourceRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The deflate stream could not be produced.
    #[error("deflate failed: {0}")]
    Compression(#[source] std::io::Error),
}

impl EncodeError {
    pub(crate) fn overflow(field: &'static str, value: impl TryInto<u64>, max: u64) -> Self {
        EncodeError::FieldOverflow {
            field,
            value: value.try_into().unwrap_or(u64::MAX),
            max,
        }
    }
}

pub type Result<T> = std::result::Result<T, EncodeError>;

/// Narrow `value` into a fixed-width field, reporting `field` on overflow.
pub(crate) fn fit<T, V>(field: &'static str, value: V) -> Result<T>
where
    V: Copy + TryInto<u64>,
    T: TryFrom<V> + Bounded,
{
    T::try_from(value).map_err(|_| EncodeError::overflow(field, value, T::MAX_U64))
}

/// Maximum value of an unsigned field, widened for error reporting.
pub(crate) trait Bounded {
    const MAX_U64: u64;
}

impl Bounded for u16 {
    const MAX_U64: u64 = u16::MAX as u64;
}

impl Bounded for u32 {
    const MAX_U64: u64 = u32::MAX as u64;
}
