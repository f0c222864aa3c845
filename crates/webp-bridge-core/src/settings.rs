//! Conversion settings.
//!
//! Settings are plain serde structs so they can come from a config file or
//! cross the WASM boundary as a JavaScript object. Missing fields take their
//! defaults.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::encode::{EncodeOptions, LOSSLESS_LEVEL, LOSSY_QUALITY};
use crate::sink::DEFAULT_STAGING_CAPACITY;

/// Largest staging buffer settings may ask for (16 MiB).
pub const MAX_STAGING_CAPACITY: usize = 16 * 1024 * 1024;

/// Errors raised by invalid settings.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SettingsError {
    /// A stored conversion mode value is not one of -1, 0, 1
    #[error("Unknown conversion mode value {0}")]
    UnknownMode(i32),

    /// Lossy quality outside 0-100
    #[error("Invalid lossy quality {0}: must be between 0 and 100")]
    InvalidQuality(f32),

    /// Lossless level outside 0-9
    #[error("Invalid lossless level {0}: must be between 0 and 9")]
    InvalidLosslessLevel(u8),

    /// Staging capacity above [`MAX_STAGING_CAPACITY`]
    #[error("Invalid staging capacity {0}: must be at most {max}", max = MAX_STAGING_CAPACITY)]
    InvalidStagingCapacity(usize),
}

/// What downloaded pages are converted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionMode {
    /// Pages are left as they are.
    #[default]
    Disabled,
    /// Pages become lossless WebP.
    LosslessWebp,
    /// Pages become lossy WebP.
    LossyWebp,
}

impl ConversionMode {
    /// Whether this mode produces lossless output, or `None` when disabled.
    pub fn lossless(self) -> Option<bool> {
        match self {
            ConversionMode::Disabled => None,
            ConversionMode::LosslessWebp => Some(true),
            ConversionMode::LossyWebp => Some(false),
        }
    }

    /// File extension of converted pages, or `None` when disabled.
    pub fn extension(self) -> Option<&'static str> {
        match self {
            ConversionMode::Disabled => None,
            ConversionMode::LosslessWebp | ConversionMode::LossyWebp => Some("webp"),
        }
    }

    /// The integer stored in preferences for this mode.
    pub fn as_i32(self) -> i32 {
        match self {
            ConversionMode::Disabled => -1,
            ConversionMode::LosslessWebp => 0,
            ConversionMode::LossyWebp => 1,
        }
    }
}

impl TryFrom<i32> for ConversionMode {
    type Error = SettingsError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(ConversionMode::Disabled),
            0 => Ok(ConversionMode::LosslessWebp),
            1 => Ok(ConversionMode::LossyWebp),
            other => Err(SettingsError::UnknownMode(other)),
        }
    }
}

impl fmt::Display for ConversionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConversionMode::Disabled => "DISABLED",
            ConversionMode::LosslessWebp => "LOSSLESS_WEBP",
            ConversionMode::LossyWebp => "LOSSY_WEBP",
        };
        f.write_str(name)
    }
}

/// Settings for converting pages to WebP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Conversion mode
    pub mode: ConversionMode,
    /// Size of the staging buffer output is streamed through (bytes)
    pub staging_capacity: usize,
    /// Lossy quality (0-100)
    pub lossy_quality: f32,
    /// Lossless level (0-9)
    pub lossless_level: u8,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: ConversionMode::Disabled,
            staging_capacity: DEFAULT_STAGING_CAPACITY,
            lossy_quality: LOSSY_QUALITY,
            lossless_level: LOSSLESS_LEVEL,
        }
    }
}

impl Settings {
    /// Create settings with the given mode and default parameters.
    pub fn new(mode: ConversionMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Check encoder parameters.
    ///
    /// A zero staging capacity is not rejected here; the transfer itself
    /// reports it as an invalid staging buffer. Capacities above
    /// [`MAX_STAGING_CAPACITY`] are rejected before anything is allocated.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.staging_capacity > MAX_STAGING_CAPACITY {
            return Err(SettingsError::InvalidStagingCapacity(self.staging_capacity));
        }
        if !(0.0..=100.0).contains(&self.lossy_quality) {
            return Err(SettingsError::InvalidQuality(self.lossy_quality));
        }
        if self.lossless_level > 9 {
            return Err(SettingsError::InvalidLosslessLevel(self.lossless_level));
        }
        Ok(())
    }

    /// Encoder options for an image, or `None` when conversion is disabled.
    pub fn encode_options(&self, opaque: bool) -> Option<EncodeOptions> {
        let lossless = self.mode.lossless()?;
        Some(
            EncodeOptions {
                lossless,
                quality: self.lossy_quality,
                lossless_level: self.lossless_level,
                ..EncodeOptions::default()
            }
            .with_opaque(opaque),
        )
    }
}
