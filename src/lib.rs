//! # azipi
//!
//! Add heading and pitch metadata to a sequence of geotagged photos. Each
//! photo gets the compass bearing (azimuth) and slope (pitch) toward the next
//! photo in the sequence, written with ExifTool into `GPSImgDirection`,
//! `PoseHeadingDegrees`, `GPSPitch`, `CameraElevationAngle` and
//! `PosePitchDegrees`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use azipi::metadata::{ExifTool, ExifToolConfig};
//! use azipi::pipeline::{run, RunSettings};
//! use azipi::sequence::{ConnectionOrder, ConnectionType};
//! use std::time::Duration;
//!
//! fn main() -> azipi::Result<()> {
//!     let tool = ExifTool::new(&ExifToolConfig::default())?;
//!     let settings = RunSettings {
//!         input_dir: "./photos".into(),
//!         output_dir: "./photos-out".into(),
//!         connection_type: ConnectionType::Time,
//!         connection_order: ConnectionOrder::Ascending,
//!         discard: true,
//!         dry_run: false,
//!         retry_delay: Duration::from_secs(3),
//!     };
//!
//!     let report = run(&settings, &tool)?;
//!     for linked in &report.linked {
//!         println!(
//!             "{}: {:.1}°",
//!             linked.record.image_identifier, linked.link.azimuth_degrees
//!         );
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`geodesy`] — bearing and haversine distance
//! - [`metadata`] — ExifTool session, required-tag extraction, image records
//! - [`sequence`] — ordering and per-image link derivation
//! - [`pipeline`] — directory listing, the full run, and output cleanup
//! - [`config`] — persistent JSON defaults

pub mod config;
pub mod error;
pub mod geodesy;
pub mod metadata;
pub mod pipeline;
pub mod sequence;

pub use error::{AzipiError, Result};
