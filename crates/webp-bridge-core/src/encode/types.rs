//! Core types for WebP encoding.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::runtime::InitError;
use crate::sink::TransferError;

/// RGBA and RGBX pixels are both 4 bytes wide.
pub const BYTES_PER_PIXEL: usize = 4;

/// Largest width or height libwebp accepts.
pub const MAX_DIMENSION: u32 = 16383;

/// Quality used for lossy encodes (0-100).
pub const LOSSY_QUALITY: f32 = 90.0;

/// Lossless effort level (0 = fastest, 9 = smallest).
pub const LOSSLESS_LEVEL: u8 = 2;

/// Errors that can occur during WebP encoding.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Width or height is zero or above [`MAX_DIMENSION`]
    #[error("Invalid dimensions: width ({width}) and height ({height}) must be between 1 and {max}", max = MAX_DIMENSION)]
    InvalidDimensions { width: u32, height: u32 },

    /// Row stride is too short for the width, or too large for libwebp
    #[error("Invalid stride: {stride} bytes per row (need at least {min})")]
    InvalidStride { stride: usize, min: usize },

    /// Pixel data length doesn't match stride * height
    #[error("Invalid pixel data: expected {expected} bytes (stride * height), got {actual}")]
    InvalidPixelData { expected: usize, actual: usize },

    /// The encoder runtime could not be initialized
    #[error("WebP encoder not initialized: {0}")]
    NotInitialized(#[from] InitError),

    /// libwebp rejected the encoder configuration
    #[error("Invalid encoder configuration: {0}")]
    InvalidConfig(&'static str),

    /// libwebp could not import the pixel buffer
    #[error("Picture import failed: {0}")]
    ImportFailed(String),

    /// libwebp failed while encoding
    #[error("WebP encoding failed: {0}")]
    EncodingFailed(String),

    /// The compressed output could not be streamed to the sink
    #[error("Could not stream encoded output: {0}")]
    Transfer(#[from] TransferError),
}

/// How libwebp should read the pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PixelLayout {
    /// Alpha channel is kept.
    #[default]
    Rgba,
    /// Fourth byte is ignored; the image is treated as opaque.
    Rgbx,
}

impl PixelLayout {
    pub fn from_opaque(opaque: bool) -> Self {
        if opaque {
            PixelLayout::Rgbx
        } else {
            PixelLayout::Rgba
        }
    }
}

/// Encoder parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EncodeOptions {
    /// Use lossless compression instead of lossy.
    pub lossless: bool,
    /// How the fourth byte of each pixel is interpreted.
    pub layout: PixelLayout,
    /// Lossy quality (0-100). Clamped on use.
    pub quality: f32,
    /// Lossless level (0-9). Clamped on use.
    pub lossless_level: u8,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            lossless: false,
            layout: PixelLayout::Rgba,
            quality: LOSSY_QUALITY,
            lossless_level: LOSSLESS_LEVEL,
        }
    }
}

impl EncodeOptions {
    pub fn lossy() -> Self {
        Self::default()
    }

    pub fn lossless() -> Self {
        Self {
            lossless: true,
            ..Self::default()
        }
    }

    pub fn with_opaque(mut self, opaque: bool) -> Self {
        self.layout = PixelLayout::from_opaque(opaque);
        self
    }

    pub(crate) fn clamped_quality(&self) -> f32 {
        if self.quality.is_nan() {
            LOSSY_QUALITY
        } else {
            self.quality.clamp(0.0, 100.0)
        }
    }

    pub(crate) fn clamped_lossless_level(&self) -> u8 {
        self.lossless_level.min(9)
    }
}

/// A borrowed 4-byte-per-pixel image with an explicit row stride.
#[derive(Debug, Clone, Copy)]
pub struct PixelBuffer<'a> {
    pixels: &'a [u8],
    width: u32,
    height: u32,
    stride: usize,
}

impl<'a> PixelBuffer<'a> {
    /// Wrap `pixels` after checking it describes a `width` x `height` image
    /// with `stride` bytes per row.
    pub fn new(pixels: &'a [u8], width: u32, height: u32, stride: usize) -> Result<Self, EncodeError> {
        if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(EncodeError::InvalidDimensions { width, height });
        }

        let min = width as usize * BYTES_PER_PIXEL;
        if stride < min || stride > i32::MAX as usize {
            return Err(EncodeError::InvalidStride { stride, min });
        }

        let expected = stride
            .checked_mul(height as usize)
            .ok_or(EncodeError::InvalidStride { stride, min })?;
        if pixels.len() != expected {
            return Err(EncodeError::InvalidPixelData {
                expected,
                actual: pixels.len(),
            });
        }

        Ok(Self {
            pixels,
            width,
            height,
            stride,
        })
    }

    /// Wrap tightly packed pixels (stride = width * 4).
    pub fn packed(pixels: &'a [u8], width: u32, height: u32) -> Result<Self, EncodeError> {
        Self::new(pixels, width, height, width as usize * BYTES_PER_PIXEL)
    }

    pub fn pixels(&self) -> &'a [u8] {
        self.pixels
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }
}
