//! webp-bridge core - WebP encoding with chunked sink streaming
//!
//! This crate takes raw RGBA pixel buffers, compresses them with libwebp, and
//! streams the compressed bytes into a push-based sink through a small,
//! fixed-size staging buffer. It also converts downloaded chapter pages from
//! PNG to WebP on disk.
//!
//! # Module Structure
//!
//! - `sink` - Chunked transfer of producer output into a sink
//! - `runtime` - Process-wide, init-once encoder setup
//! - `encode` - libwebp configuration and encoding
//! - `settings` - Serializable conversion settings
//! - `convert` - Chapter page conversion

pub mod convert;
pub mod encode;
pub mod runtime;
pub mod settings;
pub mod sink;

pub use convert::{ChapterConverter, ConversionReport, ConvertError, PageError, PageOutcome};
pub use encode::{encode_webp, encode_webp_with, EncodeError, EncodeOptions, PixelBuffer, PixelLayout};
pub use runtime::{initialize, is_initialized, EncoderVersion, InitError, Runtime};
pub use settings::{ConversionMode, Settings, SettingsError, MAX_STAGING_CAPACITY};
pub use sink::{
    transfer, ChunkedSinkWriter, Sink, Staging, StagingOverflow, Transfer, TransferError,
    DEFAULT_STAGING_CAPACITY,
};
