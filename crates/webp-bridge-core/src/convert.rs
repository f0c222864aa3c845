//! Converting downloaded chapter pages to WebP.
//!
//! Each PNG page in a chapter directory is decoded, encoded to a temporary
//! `<name>.out` file, and renamed to `<name>.webp` once the encode succeeds.
//! The original PNG is then removed. A failed encode removes the partial
//! `.out` file and leaves the PNG in place.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use image::DynamicImage;
use log::{error, info, warn};
use thiserror::Error;

use crate::encode::{encode_webp_with, EncodeError, EncodeOptions, PixelBuffer};
use crate::settings::{Settings, SettingsError};
use crate::sink::{ChunkedSinkWriter, TransferError};

/// Extension of the temporary file a page is encoded into.
const PARTIAL_EXTENSION: &str = "out";

/// Errors that abort a conversion.
///
/// Per-page encode failures are not errors; they are recorded in the
/// [`ConversionReport`].
#[derive(Debug, Error)]
pub enum ConvertError {
    /// Settings failed validation
    #[error("Invalid settings: {0}")]
    Settings(#[from] SettingsError),

    /// Filesystem error while listing, renaming or deleting
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Why a single page could not be converted.
#[derive(Debug, Error)]
pub enum PageError {
    /// libwebp or the output file rejected the encode
    #[error("Encoding failed: {0}")]
    Encode(#[from] EncodeError),

    /// The finished output could not be moved into place
    #[error("Could not finish page: {0}")]
    Io(#[from] io::Error),
}

/// What happened to a single page.
#[derive(Debug)]
pub enum PageOutcome {
    /// Converted; holds the path of the new WebP file.
    Converted(PathBuf),
    /// Could not be decoded; left untouched.
    Skipped,
    /// Conversion failed; the PNG was kept and the partial output removed.
    Failed(PageError),
}

/// Summary of a chapter conversion.
#[derive(Debug, Default)]
pub struct ConversionReport {
    /// WebP files written.
    pub converted: Vec<PathBuf>,
    /// Pages that could not be decoded.
    pub skipped: Vec<PathBuf>,
    /// Pages whose encode failed.
    pub failed: Vec<PathBuf>,
}

impl ConversionReport {
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty() && self.failed.is_empty()
    }
}

/// Converts chapter pages according to [`Settings`].
#[derive(Debug, Clone)]
pub struct ChapterConverter {
    settings: Settings,
}

impl ChapterConverter {
    pub fn new(settings: Settings) -> Result<Self, ConvertError> {
        settings.validate()?;
        Ok(Self { settings })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Convert every PNG page directly inside `chapter_dir`.
    ///
    /// Does nothing when conversion is disabled. Pages are processed in
    /// file-name order.
    pub fn convert_chapter(&self, chapter_dir: &Path) -> Result<ConversionReport, ConvertError> {
        let mut report = ConversionReport::default();
        if self.settings.mode.extension().is_none() {
            return Ok(report);
        }

        let mut pages = Vec::new();
        for entry in fs::read_dir(chapter_dir)? {
            let path = entry?.path();
            if path.is_file() && is_png(&path) {
                pages.push(path);
            }
        }
        pages.sort();

        for page in pages {
            match self.convert_page(&page)? {
                PageOutcome::Converted(webp) => report.converted.push(webp),
                PageOutcome::Skipped => report.skipped.push(page),
                PageOutcome::Failed(_) => report.failed.push(page),
            }
        }

        info!(
            "Converted {} pages in {} ({} skipped, {} failed)",
            report.converted.len(),
            chapter_dir.display(),
            report.skipped.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Convert a single page.
    ///
    /// Returns an error only when the partial output file cannot be created
    /// or cleaned up. A page whose output cannot be moved into place is
    /// reported as [`PageOutcome::Failed`].
    pub fn convert_page(&self, page: &Path) -> Result<PageOutcome, ConvertError> {
        let Some(extension) = self.settings.mode.extension() else {
            return Ok(PageOutcome::Skipped);
        };

        let decode_start = Instant::now();
        let image = match image::open(page) {
            Ok(image) => image,
            Err(e) => {
                warn!("Could not decode {}: {}", page.display(), e);
                return Ok(PageOutcome::Skipped);
            }
        };
        info!("decode took {:?}", decode_start.elapsed());

        let opaque = !image.color().has_alpha();
        let Some(options) = self.settings.encode_options(opaque) else {
            return Ok(PageOutcome::Skipped);
        };

        let staging = vec![0u8; self.settings.staging_capacity];
        let partial = page.with_extension(PARTIAL_EXTENSION);
        let file = File::create(&partial)?;

        let encode_start = Instant::now();
        let result = encode_to_file(image, &options, staging, file);
        info!("encode took {:?}", encode_start.elapsed());

        if let Err(e) = result {
            error!("Encoding failed for {}: {}", page.display(), e);
            remove_if_exists(&partial)?;
            return Ok(PageOutcome::Failed(e.into()));
        }

        let target = page.with_extension(extension);
        if let Err(e) = fs::rename(&partial, &target) {
            error!("Could not move {} into place: {}", target.display(), e);
            remove_if_exists(&partial)?;
            return Ok(PageOutcome::Failed(e.into()));
        }
        if let Err(e) = fs::remove_file(page) {
            warn!("Converted {} but could not remove it: {}", page.display(), e);
        }
        Ok(PageOutcome::Converted(target))
    }
}

fn encode_to_file(
    image: DynamicImage,
    options: &EncodeOptions,
    staging: Vec<u8>,
    file: File,
) -> Result<(), EncodeError> {
    let rgba = image.into_rgba8();
    let (width, height) = rgba.dimensions();
    let pixels = PixelBuffer::packed(rgba.as_raw(), width, height)?;

    let mut writer = ChunkedSinkWriter::new(staging, BufWriter::new(file));
    let written = encode_webp_with(&pixels, options, &mut writer)?;

    let (_, mut out) = writer.into_inner();
    out.flush().map_err(|e| TransferError::SinkWriteFailed {
        delivered: written.bytes,
        reason: e.to_string(),
    })?;
    Ok(())
}

fn is_png(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
