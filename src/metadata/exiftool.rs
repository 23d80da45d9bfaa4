use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use super::{MetadataService, MetadataSession, RawMetadata, TagValue};
use crate::error::{AzipiError, Result};

/// Marker ExifTool prints after each `-execute` in `-stay_open` mode.
const READY_MARKER: &str = "{ready}";

/// Where to find the ExifTool executable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExifToolConfig {
    /// Explicit executable path. `None` means `exiftool` from `PATH`,
    /// or `exiftool.exe` next to our own binary on Windows.
    pub path: Option<PathBuf>,
}

impl ExifToolConfig {
    /// Resolve the executable to launch.
    pub fn executable(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.path {
            return Ok(path.clone());
        }

        if cfg!(windows) {
            // exiftool.exe is rarely on PATH on Windows.
            let exe_dir = std::env::current_exe()?
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default();
            let bundled = exe_dir.join("exiftool.exe");
            if bundled.is_file() {
                return Ok(bundled);
            }
            return Err(AzipiError::Configuration(format!(
                "Running on Windows requires either --exiftool-path or exiftool.exe in {}",
                exe_dir.display()
            )));
        }

        Ok(PathBuf::from("exiftool"))
    }
}

/// The ExifTool command-line utility, driven in `-stay_open` mode.
#[derive(Debug, Clone)]
pub struct ExifTool {
    executable: PathBuf,
}

impl ExifTool {
    pub fn new(config: &ExifToolConfig) -> Result<Self> {
        Ok(Self {
            executable: config.executable()?,
        })
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }
}

impl MetadataService for ExifTool {
    type Session = ExifToolSession;

    fn open(&self) -> Result<ExifToolSession> {
        log::debug!("Starting {}", self.executable.display());
        let mut child = Command::new(&self.executable)
            .args(["-stay_open", "True", "-@", "-", "-common_args", "-G", "-n"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                AzipiError::Configuration(format!(
                    "Failed to start ExifTool at {}: {e}",
                    self.executable.display()
                ))
            })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            return Err(AzipiError::ExifTool("ExifTool pipes unavailable".into()));
        };

        Ok(ExifToolSession {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }
}

/// A running ExifTool process. Dropping it shuts the process down.
pub struct ExifToolSession {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl ExifToolSession {
    /// Send one argument list and return everything printed before `{ready}`.
    fn execute(&mut self, args: &[String]) -> Result<String> {
        for arg in args {
            writeln!(self.stdin, "{arg}")?;
        }
        writeln!(self.stdin, "-execute")?;
        self.stdin.flush()?;

        let mut output = String::new();
        let mut line = String::new();
        loop {
            line.clear();
            if self.stdout.read_line(&mut line)? == 0 {
                return Err(AzipiError::ExifTool(
                    "ExifTool exited before finishing the command".into(),
                ));
            }
            if line.trim_end() == READY_MARKER {
                break;
            }
            output.push_str(&line);
        }
        Ok(output)
    }
}

impl MetadataSession for ExifToolSession {
    fn read(&mut self, image: &Path) -> Result<RawMetadata> {
        let output = self.execute(&["-j".to_string(), image.display().to_string()])?;
        if output.trim().is_empty() {
            return Err(AzipiError::ExifTool(format!(
                "No metadata returned for {}",
                image.display()
            )));
        }
        parse_json_output(&output)
    }

    fn write(&mut self, image: &Path, tags: &[TagValue]) -> Result<()> {
        let mut args: Vec<String> = tags
            .iter()
            .map(|t| format!("-{}={}", t.tag, t.value))
            .collect();
        args.push(image.display().to_string());

        let output = self.execute(&args)?;
        log::debug!("  exiftool: {}", output.trim());
        if updated_count(&output) == 0 {
            return Err(AzipiError::ExifTool(format!(
                "Failed to update {}: {}",
                image.display(),
                output.trim()
            )));
        }
        Ok(())
    }
}

impl Drop for ExifToolSession {
    fn drop(&mut self) {
        let _ = writeln!(self.stdin, "-stay_open\nFalse");
        let _ = self.stdin.flush();
        match self.child.wait() {
            Ok(status) => log::debug!("ExifTool exited with {status}"),
            Err(e) => log::warn!("Failed to wait for ExifTool: {e}"),
        }
    }
}

/// Parse `exiftool -j` output (an array with one object per file).
fn parse_json_output(output: &str) -> Result<RawMetadata> {
    let mut entries: Vec<RawMetadata> = serde_json::from_str(output)?;
    if entries.is_empty() {
        return Err(AzipiError::ExifTool("Empty JSON array from ExifTool".into()));
    }
    Ok(entries.swap_remove(0))
}

/// Number from ExifTool's `N image files updated` summary line.
fn updated_count(output: &str) -> usize {
    output
        .lines()
        .filter_map(|line| line.trim().strip_suffix("image files updated"))
        .filter_map(|n| n.trim().parse::<usize>().ok())
        .sum()
}
