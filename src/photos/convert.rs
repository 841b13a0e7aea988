//! External image conversion for web renditions.
//!
//! The transform is fixed: render at 72 DPI into a 1200x1200 bounding box,
//! aspect preserved, downscale only. The tool is external (ImageMagick by
//! default) and comparatively expensive; derivation runs in bounded batches
//! rather than at upload time.

use std::io::Write;
use std::process::{Command, Stdio};

use crate::errors::{IngestError, Result};

pub const WEB_SOURCE_DPI: u32 = 72;
pub const WEB_BOX_PX: u32 = 1200;

/// Seam for the external conversion capability: source bytes in,
/// transformed bytes out.
pub trait Converter {
    fn downscale(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Converter backed by an ImageMagick-compatible command line, reading the
/// source from stdin and writing the rendition to stdout.
pub struct ImageToolConverter {
    command: String,
}

impl ImageToolConverter {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Converter for ImageToolConverter {
    fn downscale(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut child = Command::new(&self.command)
            .arg("-density")
            .arg(WEB_SOURCE_DPI.to_string())
            .arg("-")
            .arg("-resize")
            .arg(format!("{WEB_BOX_PX}x{WEB_BOX_PX}>"))
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| IngestError::Convert(format!("failed to spawn {}: {e}", self.command)))?;

        // Feed stdin from a thread; waiting for output while the pipe is
        // still full would deadlock on large sources.
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| IngestError::Convert("converter stdin unavailable".to_string()))?;
        let source = data.to_vec();
        let writer = std::thread::spawn(move || stdin.write_all(&source));

        let output = child
            .wait_with_output()
            .map_err(|e| IngestError::Convert(e.to_string()))?;
        let write_result = writer
            .join()
            .map_err(|_| IngestError::Convert("stdin writer panicked".to_string()))?;

        if !output.status.success() {
            return Err(IngestError::Convert(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        // A broken pipe before all bytes were written means the tool gave up
        // mid-read even if it exited zero.
        write_result.map_err(|e| IngestError::Convert(e.to_string()))?;
        if output.stdout.is_empty() {
            return Err(IngestError::Convert("converter produced no output".to_string()));
        }
        Ok(output.stdout)
    }
}
