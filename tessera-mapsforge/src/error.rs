//! Errors of the map reader.

use thiserror::Error;

/// Errors produced while reading a map file.
///
/// Errors found in the header or the tile index make the whole map unusable. Errors found while
/// decoding a single tile only affect that tile, see [`MapsforgeError::is_format_error`].
#[derive(Debug, Clone, Error)]
pub enum MapsforgeError {
    /// The file does not start with the mapsforge signature.
    #[error("Not a mapsforge map")]
    InvalidMagic,

    /// Projection other than Mercator.
    #[error("{0}: invalid/unsupported projection")]
    UnsupportedProjection(String),

    /// Files with debug signatures are not supported.
    #[error("DEBUG maps not supported")]
    DebugFile,

    /// Header fields are inconsistent.
    #[error("invalid map header: {0}")]
    InvalidHeader(String),

    /// A tile index pointer points outside of its zoom band.
    #[error("invalid tile offset {offset:#x} in zoom band {band}")]
    InvalidOffset {
        /// Band index.
        band: usize,
        /// Offset read from the index.
        offset: u64,
    },

    /// Read past the end of the current region.
    #[error("unexpected end of data at position {0}")]
    UnexpectedEnd(usize),

    /// Tag id not present in the tag dictionary.
    #[error("invalid tag id {id} (dictionary size {size})")]
    InvalidTagId {
        /// Id read from the record.
        id: u32,
        /// Number of entries in the dictionary.
        size: usize,
    },

    /// A varint does not fit into 32 bits.
    #[error("variable length integer overflow at position {0}")]
    VarintOverflow(usize),

    /// Record content is inconsistent.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// Error from the underlying storage.
    #[error("I/O error: {0}")]
    Io(String),
}

impl MapsforgeError {
    /// Returns true for errors that make the whole map unusable, as opposed to errors that only
    /// invalidate a single tile.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidMagic
                | Self::UnsupportedProjection(_)
                | Self::DebugFile
                | Self::InvalidHeader(_)
                | Self::InvalidOffset { .. }
                | Self::Io(_)
        )
    }
}

impl From<std::io::Error> for MapsforgeError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}
