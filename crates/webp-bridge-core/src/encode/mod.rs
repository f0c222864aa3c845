//! WebP encoding for the bridge.
//!
//! This module provides functionality for:
//! - Validating 4-byte-per-pixel buffers (RGBA, or RGBX for opaque images)
//! - Configuring libwebp (drawing preset, lossy quality 90, lossless level 2)
//! - Streaming the compressed output through a chunked sink writer
//!
//! # Architecture
//!
//! Encoding is synchronous and single-threaded. libwebp calls back into the
//! writer as it produces output, and each piece is pushed to the sink before
//! libwebp continues.
//!
//! # Examples
//!
//! ```ignore
//! use webp_bridge_core::encode::encode_webp;
//!
//! let pixels = vec![128u8; 100 * 100 * 4]; // Gray RGBA image
//! let mut file = std::fs::File::create("page.webp").unwrap();
//! let written = encode_webp(&pixels, 100, 100, 400, true, false, &mut file).unwrap();
//! println!("Wrote {} bytes", written.bytes);
//! ```

mod types;
mod webp;

pub use types::{
    EncodeError, EncodeOptions, PixelBuffer, PixelLayout, BYTES_PER_PIXEL, LOSSLESS_LEVEL,
    LOSSY_QUALITY, MAX_DIMENSION,
};
pub use webp::{encode_webp, encode_webp_with};
