//! Error types used by the crate.

use tessera_mapsforge::MapsforgeError;
use thiserror::Error;

/// Error loading a render theme.
///
/// A theme that fails to load is replaced by the built-in one, see
/// [`RenderTheme::load_or_default`](crate::theme::RenderTheme::load_or_default).
#[derive(Debug, Clone, Error)]
pub enum ThemeError {
    /// The root element is not `rendertheme`.
    #[error("Not a Mapsforge style file")]
    NotATheme,
    /// Numeric attribute that cannot be parsed or is negative.
    #[error("invalid {attribute} value: {value:?}")]
    InvalidAttribute {
        /// Attribute name.
        attribute: String,
        /// Raw attribute value.
        value: String,
    },
    /// Theme file cannot be read.
    #[error("failed to read theme: {0}")]
    Io(String),
    /// Theme file is not a valid attribute tree.
    #[error("failed to parse theme: {0}")]
    Parse(String),
}

impl From<std::io::Error> for ThemeError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<serde_json::Error> for ThemeError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value.to_string())
    }
}

/// Tessera error type.
#[derive(Debug, Error)]
pub enum TesseraError {
    /// Map file cannot be used.
    #[error("map error: {0}")]
    Map(#[from] MapsforgeError),
    /// Render theme cannot be used.
    #[error("theme error: {0}")]
    Theme(#[from] ThemeError),
    /// Generic error - details are inside.
    #[error("{0}")]
    Generic(String),
}
