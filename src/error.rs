use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a run.
///
/// Every variant is fatal for the whole batch: nothing is written once one
/// of these is returned before the write phase. [`AzipiError::ResourceBusy`]
/// is only surfaced after the single cleanup retry has failed too.
#[derive(Debug, Error)]
pub enum AzipiError {
    /// Invalid input directory, missing ExifTool executable, bad config.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A required tag is absent and the discard policy is off.
    #[error(
        "Image {image} is missing required metadata key {}. Consider using --discard to skip such images",
        short_key(.key)
    )]
    MissingMetadata { image: String, key: String },

    /// A required tag is present but its value cannot be interpreted.
    #[error("Image {image} has an unreadable value for {}: {value}", short_key(.key))]
    InvalidMetadata {
        image: String,
        key: String,
        value: String,
    },

    /// Fewer than two images survived filtering.
    #[error("{}", insufficient_message(.remaining))]
    InsufficientData { remaining: usize },

    /// A file is still held by the ExifTool process after the retry.
    #[error("{} is still in use: {source}", .path.display())]
    ResourceBusy {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The ExifTool process failed or returned something unexpected.
    #[error("ExifTool error: {0}")]
    ExifTool(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AzipiError>;

impl AzipiError {
    /// Process exit code for this error kind.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Configuration(_) => 2,
            Self::MissingMetadata { .. } | Self::InvalidMetadata { .. } => 3,
            Self::InsufficientData { .. } => 4,
            Self::ResourceBusy { .. } => 5,
            Self::ExifTool(_) => 6,
            Self::Io(_) | Self::Json(_) => 1,
        }
    }
}

/// Strip the group prefix from a tag name (`Composite:GPSAltitude` → `GPSAltitude`).
pub(crate) fn short_key(key: &str) -> &str {
    key.rsplit(':').next().unwrap_or(key)
}

fn insufficient_message(remaining: &usize) -> String {
    match *remaining {
        0 => "All images were discarded. No images left to process".to_string(),
        1 => "Only one image to process. No possible links".to_string(),
        n => format!("{n} images are not enough to link"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_key_strips_group() {
        assert_eq!(short_key("Composite:GPSAltitude"), "GPSAltitude");
        assert_eq!(short_key("GPSAltitude"), "GPSAltitude");
    }

    #[test]
    fn missing_metadata_message_names_image_and_key() {
        let err = AzipiError::MissingMetadata {
            image: "/photos/a.jpg".into(),
            key: "Composite:GPSAltitude".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("/photos/a.jpg"));
        assert!(msg.contains("GPSAltitude"));
        assert!(!msg.contains("Composite:"));
    }

    #[test]
    fn insufficient_data_messages() {
        assert!(
            AzipiError::InsufficientData { remaining: 0 }
                .to_string()
                .contains("discarded")
        );
        assert!(
            AzipiError::InsufficientData { remaining: 1 }
                .to_string()
                .contains("No possible links")
        );
    }

    #[test]
    fn exit_codes_are_distinct_per_kind() {
        let codes = [
            AzipiError::Configuration(String::new()).exit_code(),
            AzipiError::MissingMetadata { image: String::new(), key: String::new() }.exit_code(),
            AzipiError::InsufficientData { remaining: 0 }.exit_code(),
            AzipiError::ExifTool(String::new()).exit_code(),
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
