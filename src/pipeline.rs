use std::path::{Path, PathBuf};
use std::time::Duration;
use walkdir::WalkDir;

use crate::error::{AzipiError, Result};
use crate::metadata::{Extracted, ImageRecord, MetadataService, MetadataSession, RawMetadata};
use crate::sequence::{self, ConnectionOrder, ConnectionType, LinkedImage, Sequence};

/// Image extensions ExifTool can write the azimuth/pitch tags into.
const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "webp", "tif", "tiff", "heic", "heif", "avif",
    // RAW formats
    "cr3", "cr2", "dng", "nef", "arw", "raf", "orf", "rw2", "pef", "srw",
];

/// Suffix ExifTool appends to the untouched copy of a file it modifies.
const BACKUP_SUFFIX: &str = "_original";

/// Everything a run needs, resolved from the config file and the command line.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub connection_type: ConnectionType,
    pub connection_order: ConnectionOrder,
    pub discard: bool,
    /// Derive the links but write nothing.
    pub dry_run: bool,
    pub retry_delay: Duration,
}

/// What a run did.
#[derive(Debug)]
pub struct RunReport {
    /// Images found in the input directory.
    pub found: usize,
    /// Images dropped for missing or unreadable metadata.
    pub dropped: usize,
    /// The linked sequence, in write-back order.
    pub linked: Vec<LinkedImage>,
    /// Files written to the output directory (empty on a dry run).
    pub outputs: Vec<PathBuf>,
}

/// Resolve the input and output directories.
///
/// An input directory that does not exist as given is retried relative to
/// `fallback_base` (the executable's directory). When that fallback is used,
/// an output directory that does not exist as given is resolved against the
/// same base.
pub fn resolve_directories(
    input: &Path,
    output: &Path,
    fallback_base: Option<&Path>,
) -> Result<(PathBuf, PathBuf)> {
    let input_abs = std::path::absolute(input)?;
    let output_abs = std::path::absolute(output)?;
    if input_abs.is_dir() {
        return Ok((input_abs, output_abs));
    }

    if let Some(base) = fallback_base {
        let candidate = base.join(input);
        if candidate.is_dir() {
            let output = if output_abs.is_dir() {
                output_abs
            } else {
                base.join(output)
            };
            return Ok((candidate, output));
        }
        return Err(AzipiError::Configuration(format!(
            "No valid input folder is given! Input folder {} or {} does not exist",
            input_abs.display(),
            candidate.display()
        )));
    }

    Err(AzipiError::Configuration(format!(
        "No valid input folder is given! Input folder {} does not exist",
        input_abs.display()
    )))
}

/// List the supported images directly inside `dir`, sorted by file name.
pub fn collect_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| {
            AzipiError::Io(e.into_io_error().unwrap_or_else(|| {
                std::io::Error::other(format!("Failed to list {}", dir.display()))
            }))
        })?;
        let path = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }
        if is_supported_image(path) {
            images.push(path.to_path_buf());
        } else {
            log::debug!("Skipping unsupported file: {}", path.display());
        }
    }
    Ok(images)
}

/// Check if a file has a supported image extension.
fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Read the metadata of every image in one session.
///
/// The session is released when this returns, on success or error.
pub fn read_all<S: MetadataService>(service: &S, images: &[PathBuf]) -> Result<Vec<RawMetadata>> {
    let mut session = service.open()?;
    images
        .iter()
        .map(|image| {
            log::debug!("Reading {}", image.display());
            session.read(image)
        })
        .collect()
}

/// Turn raw metadata into records, applying the discard policy.
///
/// Returns the surviving records in input order and the number dropped.
pub fn build_records(
    images: &[PathBuf],
    metadata: &[RawMetadata],
    discard: bool,
) -> Result<(Vec<ImageRecord>, usize)> {
    let mut records = Vec::with_capacity(images.len());
    let mut dropped = 0;
    for (image, raw) in images.iter().zip(metadata) {
        match ImageRecord::from_metadata(image, raw, discard)? {
            Extracted::Complete(record) => records.push(record),
            Extracted::Incomplete {
                image_identifier,
                missing,
            } => {
                log::debug!("Discarding {image_identifier}: missing {}", missing.join(", "));
                dropped += 1;
            }
        }
    }
    Ok((records, dropped))
}

/// Run the whole batch: read, filter, link, write, clean up.
///
/// Nothing is written unless every step up to and including linking
/// succeeds.
pub fn run<S: MetadataService>(settings: &RunSettings, service: &S) -> Result<RunReport> {
    log::info!("Input folder: {}", settings.input_dir.display());
    log::info!("Output folder: {}", settings.output_dir.display());

    let images = collect_images(&settings.input_dir)?;
    log::info!("{} file(s) have been found in input directory", images.len());

    log::info!("Fetching metadata from all images...");
    let metadata = read_all(service, &images)?;

    log::info!("Checking metadata tags of all images...");
    let (records, dropped) = build_records(&images, &metadata, settings.discard)?;
    log::info!("{dropped} images dropped. \"DISCARD\" is {}.", settings.discard);

    let sequence = Sequence::new(records, settings.connection_type, settings.connection_order)?;

    log::info!("Calculating distance, azimuth and pitch between {} images...", sequence.len());
    let linked = sequence.link();

    let mut report = RunReport {
        found: images.len(),
        dropped,
        linked,
        outputs: Vec::new(),
    };

    if settings.dry_run {
        log::info!("DRY RUN — no files will be modified");
        return Ok(report);
    }

    log::info!("Writing metadata to EXIF & XMP tags of qualified images...");
    let written = write_all(service, &report.linked)?;

    log::info!("Cleaning up old and new files...");
    report.outputs = clean_up(&settings.output_dir, &written, settings.retry_delay)?;
    log::info!("Output files saved to {}", settings.output_dir.display());

    Ok(report)
}

/// Write every link back in one session. Returns the modified image paths.
///
/// If any write fails, every image touched so far is restored from its
/// backup before the error is returned.
fn write_all<S: MetadataService>(service: &S, linked: &[LinkedImage]) -> Result<Vec<PathBuf>> {
    let writes = sequence::emit(linked);
    let mut session = service.open()?;
    let mut written = Vec::with_capacity(writes.len());
    for (write, image) in writes.iter().zip(linked) {
        let path = &image.record.path;
        log::debug!(
            "  {}: azimuth {:.2}, pitch {:.4}",
            write.image_identifier,
            write.azimuth,
            write.pitch
        );
        // The failing image may have been partly written too.
        written.push(path.clone());
        if let Err(e) = session.write(path, &write.tags()) {
            drop(session);
            restore_originals(&written);
            return Err(e);
        }
    }
    Ok(written)
}

/// Put ExifTool's backup back over each image that has one.
fn restore_originals(images: &[PathBuf]) {
    for image in images {
        let backup = backup_path(image);
        if !backup.exists() {
            continue;
        }
        match rename_or_copy(&backup, image) {
            Ok(()) => log::info!("Restored original {}", image.display()),
            Err(e) => log::error!(
                "Failed to restore {} from {}: {e}",
                image.display(),
                backup.display()
            ),
        }
    }
}

/// Move each modified image into `output_dir` as `<stem>_calculated.<ext>`
/// and put ExifTool's backup back in its place.
pub fn clean_up(output_dir: &Path, images: &[PathBuf], retry_delay: Duration) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir)?;

    let mut outputs = Vec::with_capacity(images.len());
    for image in images {
        let target = output_dir.join(calculated_name(image));
        move_file(image, &target, retry_delay)?;
        move_file(&backup_path(image), image, retry_delay)?;
        outputs.push(target);
    }
    Ok(outputs)
}

/// `IMG_0001.jpg` → `IMG_0001_calculated.jpg`.
fn calculated_name(image: &Path) -> String {
    let stem = image
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();
    match image.extension() {
        Some(ext) => format!("{stem}_calculated.{}", ext.to_string_lossy()),
        None => format!("{stem}_calculated"),
    }
}

/// `IMG_0001.jpg` → `IMG_0001.jpg_original`.
fn backup_path(image: &Path) -> PathBuf {
    let mut name = image.file_name().unwrap_or_default().to_os_string();
    name.push(BACKUP_SUFFIX);
    image.with_file_name(name)
}

/// Rename `from` to `to`, retrying once after `retry_delay`.
fn move_file(from: &Path, to: &Path, retry_delay: Duration) -> Result<()> {
    retry_once(from, retry_delay, || rename_or_copy(from, to))
}

/// Run `op`; on failure wait `retry_delay` and run it once more.
///
/// Only a second failure is surfaced, as [`AzipiError::ResourceBusy`] on `path`.
fn retry_once<T>(
    path: &Path,
    retry_delay: Duration,
    mut op: impl FnMut() -> std::io::Result<T>,
) -> Result<T> {
    match op() {
        Ok(value) => Ok(value),
        Err(e) => {
            log::warn!(
                "{} is still in use by the ExifTool process ({e}). Waiting...",
                path.display()
            );
            std::thread::sleep(retry_delay);
            op().map_err(|source| AzipiError::ResourceBusy {
                path: path.to_path_buf(),
                source,
            })
        }
    }
}

fn rename_or_copy(from: &Path, to: &Path) -> std::io::Result<()> {
    match std::fs::rename(from, to) {
        Err(e) if e.kind() == std::io::ErrorKind::CrossesDevices => {
            std::fs::copy(from, to)?;
            std::fs::remove_file(from)
        }
        other => other,
    }
}
