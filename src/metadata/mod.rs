//! Metadata reading, filtering, and writing.
//!
//! - [`MetadataService`] / [`MetadataSession`] — the seam to the external
//!   metadata tool; [`ExifTool`] is the production implementation
//! - [`extract_required`] and [`ImageRecord::from_metadata`] — turn a raw
//!   tag mapping into a complete or incomplete record under the discard policy

mod exiftool;
mod filter;

pub use exiftool::{ExifTool, ExifToolConfig, ExifToolSession};
pub use filter::{
    extract_required, Extracted, ImageRecord, REQUIRED_KEYS, KEY_ALTITUDE, KEY_DATETIME,
    KEY_LATITUDE, KEY_LONGITUDE,
};

use std::path::Path;

use crate::error::Result;

/// Raw per-image metadata: tag name (`Group:Tag`) → value.
pub type RawMetadata = serde_json::Map<String, serde_json::Value>;

/// A single tag assignment sent to the write-back phase.
#[derive(Debug, Clone, PartialEq)]
pub struct TagValue {
    pub tag: &'static str,
    pub value: f64,
}

/// An open connection to the metadata tool.
///
/// A session is acquired for one phase (read or write) and released when it
/// is dropped, including on early return through `?`.
pub trait MetadataSession {
    /// Read every tag of an image.
    fn read(&mut self, image: &Path) -> Result<RawMetadata>;

    /// Write the given tags into the image in place.
    ///
    /// The tool is expected to leave the untouched original next to the image
    /// as `<file name>_original`.
    fn write(&mut self, image: &Path, tags: &[TagValue]) -> Result<()>;
}

/// Factory for [`MetadataSession`]s.
pub trait MetadataService {
    type Session: MetadataSession;

    /// Start a session.
    fn open(&self) -> Result<Self::Session>;
}
