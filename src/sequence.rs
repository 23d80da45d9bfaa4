//! Ordering records and deriving the link from each image to the next.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::error::{AzipiError, Result};
use crate::geodesy::{bearing, distance};
use crate::metadata::{ImageRecord, TagValue};

/// Key the images are connected by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    /// GPS capture time.
    Time,
    /// Image path.
    #[default]
    Filename,
}

impl ConnectionType {
    /// `time`, `Time`, `t` and `T` select time; anything else is filename.
    pub fn from_alias(alias: &str) -> Self {
        match alias {
            "time" | "Time" | "t" | "T" => Self::Time,
            _ => Self::Filename,
        }
    }
}

/// Direction the sequence runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionOrder {
    #[default]
    Ascending,
    Descending,
}

impl ConnectionOrder {
    /// `ascending`, `Ascending`, `a` and `A` select ascending; anything else is descending.
    pub fn from_alias(alias: &str) -> Self {
        match alias {
            "ascending" | "Ascending" | "a" | "A" => Self::Ascending,
            _ => Self::Descending,
        }
    }
}

/// Geometry from one image toward the next one in the sequence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DerivedLink {
    /// Compass bearing in `[0, 360)`.
    pub azimuth_degrees: f64,
    pub distance_meters: f64,
    /// Altitude change over horizontal distance (a slope, not an angle).
    pub pitch_ratio: f64,
    /// Set on the last image, which has no successor and repeats the
    /// previous link.
    pub is_extrapolated: bool,
}

impl DerivedLink {
    /// Link from `from` toward `to`.
    ///
    /// Coincident positions have no defined slope; their pitch is `0.0`.
    pub fn between(from: &ImageRecord, to: &ImageRecord) -> Self {
        let azimuth_degrees = bearing(from.position(), to.position());
        let distance_meters = distance(from.longitude, from.latitude, to.longitude, to.latitude);
        let pitch_ratio = if distance_meters > 0.0 {
            (to.altitude - from.altitude) / distance_meters
        } else {
            log::warn!(
                "{} and {} share a position; pitch set to 0",
                from.image_identifier,
                to.image_identifier
            );
            0.0
        };

        Self {
            azimuth_degrees,
            distance_meters,
            pitch_ratio,
            is_extrapolated: false,
        }
    }
}

/// An image together with its derived link.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkedImage {
    pub record: ImageRecord,
    pub link: DerivedLink,
}

/// One row of the `--json` report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkSummary {
    pub image: String,
    pub azimuth: f64,
    pub distance: f64,
    pub pitch: f64,
    pub is_extrapolated: bool,
}

impl From<&LinkedImage> for LinkSummary {
    fn from(linked: &LinkedImage) -> Self {
        Self {
            image: linked.record.image_identifier.clone(),
            azimuth: linked.link.azimuth_degrees,
            distance: linked.link.distance_meters,
            pitch: linked.link.pitch_ratio,
            is_extrapolated: linked.link.is_extrapolated,
        }
    }
}

/// Values written back into one image.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteBack {
    pub image_identifier: String,
    pub azimuth: f64,
    pub pitch: f64,
}

impl WriteBack {
    /// The five tags that receive the azimuth and pitch.
    pub fn tags(&self) -> Vec<TagValue> {
        vec![
            TagValue { tag: "GPSPitch", value: self.pitch },
            TagValue { tag: "PoseHeadingDegrees", value: self.azimuth },
            TagValue { tag: "GPSImgDirection", value: self.azimuth },
            TagValue { tag: "CameraElevationAngle", value: self.pitch },
            TagValue { tag: "PosePitchDegrees", value: self.pitch },
        ]
    }
}

/// Records ordered for linking. Always holds at least two records.
#[derive(Debug, Clone)]
pub struct Sequence {
    records: Vec<ImageRecord>,
}

impl Sequence {
    /// Sort `records` by `connection` in `order`.
    ///
    /// The sort is stable in both directions: records with equal keys keep
    /// their input order. Fewer than two records is
    /// [`AzipiError::InsufficientData`].
    pub fn new(
        mut records: Vec<ImageRecord>,
        connection: ConnectionType,
        order: ConnectionOrder,
    ) -> Result<Self> {
        if records.len() < 2 {
            return Err(AzipiError::InsufficientData {
                remaining: records.len(),
            });
        }

        let by_key = |a: &ImageRecord, b: &ImageRecord| -> Ordering {
            match connection {
                ConnectionType::Time => a.capture_datetime.cmp(&b.capture_datetime),
                ConnectionType::Filename => a.image_identifier.cmp(&b.image_identifier),
            }
        };
        match order {
            ConnectionOrder::Ascending => records.sort_by(by_key),
            ConnectionOrder::Descending => records.sort_by(|a, b| by_key(b, a)),
        }

        Ok(Self { records })
    }

    pub fn records(&self) -> &[ImageRecord] {
        &self.records
    }

    // Never empty: `new` rejects fewer than two records.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Pair every record with its successor and derive the link toward it.
    ///
    /// The last record repeats the second-to-last link, flagged
    /// `is_extrapolated`.
    pub fn link(self) -> Vec<LinkedImage> {
        let mut links: Vec<DerivedLink> = self
            .records
            .windows(2)
            .map(|pair| DerivedLink::between(&pair[0], &pair[1]))
            .collect();

        // `new` guarantees two records, hence at least one link.
        if let Some(&last) = links.last() {
            links.push(DerivedLink {
                is_extrapolated: true,
                ..last
            });
        }

        self.records
            .into_iter()
            .zip(links)
            .map(|(record, link)| LinkedImage { record, link })
            .collect()
    }
}

/// Write-backs in sequence order.
pub fn emit(linked: &[LinkedImage]) -> Vec<WriteBack> {
    linked
        .iter()
        .map(|l| WriteBack {
            image_identifier: l.record.image_identifier.clone(),
            azimuth: l.link.azimuth_degrees,
            pitch: l.link.pitch_ratio,
        })
        .collect()
}
