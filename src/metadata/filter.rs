use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

use super::RawMetadata;
use crate::error::{AzipiError, Result};

pub const KEY_DATETIME: &str = "Composite:GPSDateTime";
pub const KEY_LATITUDE: &str = "Composite:GPSLatitude";
pub const KEY_LONGITUDE: &str = "Composite:GPSLongitude";
pub const KEY_ALTITUDE: &str = "Composite:GPSAltitude";

/// Tags every image must carry, in the order [`extract_required`] returns them.
pub const REQUIRED_KEYS: [&str; 4] = [KEY_DATETIME, KEY_LATITUDE, KEY_LONGITUDE, KEY_ALTITUDE];

/// A geotagged image with everything needed to link it to its neighbours.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageRecord {
    /// Unique within a run; the image path as given to the metadata tool.
    pub image_identifier: String,
    #[serde(skip)]
    pub path: PathBuf,
    pub capture_datetime: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
}

/// Outcome of building a record from raw metadata.
#[derive(Debug, Clone, PartialEq)]
pub enum Extracted {
    Complete(ImageRecord),
    /// Only produced when discarding; lists the keys that were missing or unreadable.
    Incomplete {
        image_identifier: String,
        missing: Vec<&'static str>,
    },
}

/// Pull the four required values out of `raw`, in `keys` order.
///
/// With `discard` set, an absent key yields `None` in its slot. Without it,
/// the first absent key is a [`AzipiError::MissingMetadata`] naming `image`.
pub fn extract_required<'a>(
    image: &str,
    raw: &'a RawMetadata,
    keys: &[&str; 4],
    discard: bool,
) -> Result<[Option<&'a Value>; 4]> {
    let mut values = [None; 4];
    for (slot, key) in values.iter_mut().zip(keys) {
        match raw.get(*key) {
            Some(value) => *slot = Some(value),
            None if discard => {
                log::debug!("{image}: missing {key}, image will be discarded");
            }
            None => {
                return Err(AzipiError::MissingMetadata {
                    image: image.to_string(),
                    key: key.to_string(),
                });
            }
        }
    }
    Ok(values)
}

impl ImageRecord {
    /// Build a record for `path` from its raw metadata.
    ///
    /// Missing and unreadable values are collected into
    /// [`Extracted::Incomplete`] when `discard` is set; otherwise the first
    /// one aborts with [`AzipiError::MissingMetadata`] or
    /// [`AzipiError::InvalidMetadata`].
    pub fn from_metadata(path: &Path, raw: &RawMetadata, discard: bool) -> Result<Extracted> {
        let image = path.display().to_string();
        let [datetime, latitude, longitude, altitude] =
            extract_required(&image, raw, &REQUIRED_KEYS, discard)?;

        let mut missing = Vec::new();

        let capture_datetime = interpret(&image, KEY_DATETIME, datetime, discard, &mut missing, |v| {
            v.as_str().and_then(parse_gps_datetime)
        })?;
        let latitude = interpret(&image, KEY_LATITUDE, latitude, discard, &mut missing, as_latitude)?;
        let longitude = interpret(&image, KEY_LONGITUDE, longitude, discard, &mut missing, as_longitude)?;
        let altitude = interpret(&image, KEY_ALTITUDE, altitude, discard, &mut missing, as_number)?;

        match (capture_datetime, latitude, longitude, altitude) {
            (Some(capture_datetime), Some(latitude), Some(longitude), Some(altitude)) => {
                Ok(Extracted::Complete(ImageRecord {
                    image_identifier: image,
                    path: path.to_path_buf(),
                    capture_datetime,
                    latitude,
                    longitude,
                    altitude,
                }))
            }
            _ => Ok(Extracted::Incomplete {
                image_identifier: image,
                missing,
            }),
        }
    }

    /// `(latitude, longitude)` as taken by [`crate::geodesy::bearing`].
    pub fn position(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }
}

/// Convert one extracted value, applying the discard policy to unreadable ones.
fn interpret<T>(
    image: &str,
    key: &'static str,
    value: Option<&Value>,
    discard: bool,
    missing: &mut Vec<&'static str>,
    convert: impl Fn(&Value) -> Option<T>,
) -> Result<Option<T>> {
    let Some(value) = value else {
        missing.push(key);
        return Ok(None);
    };
    match convert(value) {
        Some(converted) => Ok(Some(converted)),
        None if discard => {
            log::debug!("{image}: unreadable {key} ({value}), image will be discarded");
            missing.push(key);
            Ok(None)
        }
        None => Err(AzipiError::InvalidMetadata {
            image: image.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

/// A finite number, either as a JSON number or a string starting with one
/// (`"12.5 m Above Sea Level"` when ExifTool runs without `-n`).
///
/// A `Below` qualifier negates the value.
fn as_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let number: f64 = s.split_whitespace().next()?.parse().ok()?;
            if s.contains("Below") { -number } else { number }
        }
        _ => return None,
    };
    number.is_finite().then_some(number)
}

fn as_latitude(value: &Value) -> Option<f64> {
    as_number(value).filter(|deg| deg.abs() <= 90.0)
}

fn as_longitude(value: &Value) -> Option<f64> {
    as_number(value).filter(|deg| deg.abs() <= 180.0)
}

/// Parse ExifTool's GPS date/time (`2020:06:04 10:21:07.5Z`).
///
/// A trailing `Z` or numeric offset is honoured; no zone at all means UTC.
pub(crate) fn parse_gps_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::<FixedOffset>::parse_from_str(raw, "%Y:%m:%d %H:%M:%S%.f%:z") {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = raw.strip_suffix('Z').unwrap_or(raw);
    NaiveDateTime::parse_from_str(naive, "%Y:%m:%d %H:%M:%S%.f")
        .ok()
        .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};
    use serde_json::json;

    fn raw(value: Value) -> RawMetadata {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn full() -> RawMetadata {
        raw(json!({
            "SourceFile": "/photos/a.jpg",
            "Composite:GPSDateTime": "2020:06:04 10:21:07Z",
            "Composite:GPSLatitude": 51.5,
            "Composite:GPSLongitude": -0.12,
            "Composite:GPSAltitude": 35.2,
        }))
    }

    // ── extract_required ─────────────────────────────────────────────

    #[test]
    fn extract_returns_values_in_key_order() {
        let meta = full();
        let values = extract_required("a.jpg", &meta, &REQUIRED_KEYS, false).unwrap();
        assert_eq!(values[0], Some(&json!("2020:06:04 10:21:07Z")));
        assert_eq!(values[1], Some(&json!(51.5)));
        assert_eq!(values[2], Some(&json!(-0.12)));
        assert_eq!(values[3], Some(&json!(35.2)));
    }

    #[test]
    fn extract_missing_key_with_discard_yields_none() {
        let mut meta = full();
        meta.remove(KEY_ALTITUDE);
        let values = extract_required("a.jpg", &meta, &REQUIRED_KEYS, true).unwrap();
        assert!(values[0].is_some());
        assert!(values[3].is_none());
    }

    #[test]
    fn extract_missing_key_without_discard_is_fatal() {
        let mut meta = full();
        meta.remove(KEY_LATITUDE);
        meta.remove(KEY_ALTITUDE);
        let err = extract_required("a.jpg", &meta, &REQUIRED_KEYS, false).unwrap_err();
        match err {
            AzipiError::MissingMetadata { image, key } => {
                assert_eq!(image, "a.jpg");
                // The first missing key in order is reported.
                assert_eq!(key, KEY_LATITUDE);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    // ── ImageRecord::from_metadata ───────────────────────────────────

    #[test]
    fn complete_record_from_full_metadata() {
        let extracted = ImageRecord::from_metadata(Path::new("/photos/a.jpg"), &full(), false).unwrap();
        let Extracted::Complete(record) = extracted else {
            panic!("expected a complete record");
        };
        assert_eq!(record.image_identifier, "/photos/a.jpg");
        assert_eq!(record.position(), (51.5, -0.12));
        assert!((record.altitude - 35.2).abs() < 1e-12);
        assert_eq!(
            record.capture_datetime,
            Utc.with_ymd_and_hms(2020, 6, 4, 10, 21, 7).unwrap()
        );
    }

    #[test]
    fn incomplete_record_lists_missing_keys() {
        let mut meta = full();
        meta.remove(KEY_DATETIME);
        meta.remove(KEY_ALTITUDE);
        let extracted = ImageRecord::from_metadata(Path::new("b.jpg"), &meta, true).unwrap();
        assert_eq!(
            extracted,
            Extracted::Incomplete {
                image_identifier: "b.jpg".into(),
                missing: vec![KEY_DATETIME, KEY_ALTITUDE],
            }
        );
    }

    #[test]
    fn unreadable_value_is_discarded_or_fatal() {
        let mut meta = full();
        meta.insert(KEY_LONGITUDE.into(), json!("somewhere"));

        let extracted = ImageRecord::from_metadata(Path::new("c.jpg"), &meta, true).unwrap();
        assert!(matches!(extracted, Extracted::Incomplete { ref missing, .. } if missing == &[KEY_LONGITUDE]));

        let err = ImageRecord::from_metadata(Path::new("c.jpg"), &meta, false).unwrap_err();
        assert!(matches!(err, AzipiError::InvalidMetadata { ref key, .. } if key == KEY_LONGITUDE));
    }

    #[test]
    fn altitude_with_unit_suffix_is_accepted() {
        let mut meta = full();
        meta.insert(KEY_ALTITUDE.into(), json!("12.5 m Above Sea Level"));
        let Extracted::Complete(record) =
            ImageRecord::from_metadata(Path::new("d.jpg"), &meta, false).unwrap()
        else {
            panic!("expected a complete record");
        };
        assert!((record.altitude - 12.5).abs() < 1e-12);
    }

    #[test]
    fn altitude_below_sea_level_is_negative() {
        let mut meta = full();
        meta.insert(KEY_ALTITUDE.into(), json!("12.5 m Below Sea Level"));
        let Extracted::Complete(record) =
            ImageRecord::from_metadata(Path::new("d.jpg"), &meta, false).unwrap()
        else {
            panic!("expected a complete record");
        };
        assert!((record.altitude + 12.5).abs() < 1e-12);
    }

    #[test]
    fn latitude_beyond_poles_is_unreadable() {
        let mut meta = full();
        meta.insert(KEY_LATITUDE.into(), json!(120.0));
        let err = ImageRecord::from_metadata(Path::new("e.jpg"), &meta, false).unwrap_err();
        assert!(matches!(err, AzipiError::InvalidMetadata { ref key, .. } if key == KEY_LATITUDE));

        // The same value is a valid longitude.
        let mut meta = full();
        meta.insert(KEY_LONGITUDE.into(), json!(120.0));
        let extracted = ImageRecord::from_metadata(Path::new("e.jpg"), &meta, false).unwrap();
        assert!(matches!(extracted, Extracted::Complete(_)));
    }

    #[test]
    fn out_of_range_coordinate_is_unreadable() {
        let mut meta = full();
        meta.insert(KEY_LATITUDE.into(), json!(512.0));
        let err = ImageRecord::from_metadata(Path::new("e.jpg"), &meta, false).unwrap_err();
        assert!(matches!(err, AzipiError::InvalidMetadata { .. }));
    }

    // ── parse_gps_datetime ───────────────────────────────────────────

    #[test]
    fn parse_datetime_variants() {
        let base = Utc.with_ymd_and_hms(2020, 6, 4, 10, 21, 7).unwrap();
        assert_eq!(parse_gps_datetime("2020:06:04 10:21:07Z"), Some(base));
        assert_eq!(parse_gps_datetime("2020:06:04 10:21:07"), Some(base));
        assert_eq!(parse_gps_datetime("2020:06:04 12:21:07+02:00"), Some(base));

        let fractional = parse_gps_datetime("2020:06:04 10:21:07.25Z").unwrap();
        assert_eq!(fractional.nanosecond(), 250_000_000);
    }

    #[test]
    fn parse_datetime_rejects_garbage() {
        assert_eq!(parse_gps_datetime("yesterday"), None);
        assert_eq!(parse_gps_datetime(""), None);
    }
}
