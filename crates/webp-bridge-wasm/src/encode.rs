//! WebP encoding WASM bindings.
//!
//! This module exposes webp-bridge-core encoding to JavaScript. Compressed
//! output is not returned as one array; it is pushed into a JavaScript
//! output stream through a reusable `Uint8Array` staging buffer.
//!
//! # Functions
//!
//! - [`encode_webp`] - Encode RGBA pixels with the default settings
//! - [`encode_webp_with_settings`] - Encode RGBA pixels with a settings object
//!
//! # Example
//!
//! ```typescript
//! import { encode_webp } from '@webp-bridge/wasm';
//!
//! const parts: Uint8Array[] = [];
//! const out = {
//!   write(buf: Uint8Array, off: number, len: number) {
//!     parts.push(buf.slice(off, off + len));
//!   },
//! };
//! const written = encode_webp(rgba, width, height, width * 4, true, false, out);
//! ```

use wasm_bindgen::prelude::*;
use webp_bridge_core::encode::{self, EncodeOptions, PixelBuffer};
use webp_bridge_core::{ChunkedSinkWriter, ConversionMode, Settings};

use crate::stream::{JsOutputStream, JsStaging};

/// Encode RGBA pixel data to WebP and stream it into `output_stream`.
///
/// # Arguments
///
/// * `rgba` - Pixel data as a `Uint8Array` (4 bytes per pixel)
/// * `width` - Image width in pixels
/// * `height` - Image height in pixels
/// * `stride` - Bytes per row (at least `width * 4`)
/// * `opaque` - Ignore the alpha byte (RGBX import)
/// * `lossless` - Lossless (level 2) instead of lossy (quality 90)
/// * `output_stream` - Object with a `write(buffer, offset, length)` method
///
/// # Returns
///
/// The number of bytes written to the stream.
///
/// # Errors
///
/// Returns an error if the dimensions, stride or pixel length are invalid,
/// if the stream has no `write` method, if the stream throws, or if libwebp
/// fails. Chunks written before a failure are not retracted.
#[wasm_bindgen]
pub fn encode_webp(
    rgba: &[u8],
    width: u32,
    height: u32,
    stride: u32,
    opaque: bool,
    lossless: bool,
    output_stream: JsValue,
) -> Result<usize, JsValue> {
    let settings = Settings::new(mode_for(lossless));
    stream_encode(rgba, width, height, stride, opaque, &settings, output_stream)
}

/// Encode RGBA pixel data to WebP using a settings object.
///
/// `settings` is a plain object with any of `mode` (`"lossless_webp"` or
/// `"lossy_webp"`), `staging_capacity`, `lossy_quality` and
/// `lossless_level`. Missing fields take their defaults.
///
/// # Example
///
/// ```typescript
/// encode_webp_with_settings(rgba, w, h, w * 4, false,
///   { mode: 'lossy_webp', lossy_quality: 75, staging_capacity: 8192 }, out);
/// ```
#[wasm_bindgen]
pub fn encode_webp_with_settings(
    rgba: &[u8],
    width: u32,
    height: u32,
    stride: u32,
    opaque: bool,
    settings: JsValue,
    output_stream: JsValue,
) -> Result<usize, JsValue> {
    let settings: Settings = serde_wasm_bindgen::from_value(settings)?;
    stream_encode(rgba, width, height, stride, opaque, &settings, output_stream)
}

fn stream_encode(
    rgba: &[u8],
    width: u32,
    height: u32,
    stride: u32,
    opaque: bool,
    settings: &Settings,
    output_stream: JsValue,
) -> Result<usize, JsValue> {
    // Validation bounds the staging capacity before the Uint8Array is allocated
    let options = options_for(settings, opaque).map_err(|e| crate::report(&e))?;
    let image = PixelBuffer::new(rgba, width, height, stride as usize).map_err(|e| crate::report(&e))?;
    let sink = JsOutputStream::from_js(output_stream)?;

    let mut writer = ChunkedSinkWriter::new(JsStaging::with_capacity(settings.staging_capacity), sink);
    encode::encode_webp_with(&image, &options, &mut writer)
        .map(|written| written.bytes)
        .map_err(|e| crate::report(&e))
}

fn mode_for(lossless: bool) -> ConversionMode {
    if lossless {
        ConversionMode::LosslessWebp
    } else {
        ConversionMode::LossyWebp
    }
}

/// Validate settings and derive encoder options.
fn options_for(settings: &Settings, opaque: bool) -> Result<EncodeOptions, String> {
    settings.validate().map_err(|e| e.to_string())?;
    settings
        .encode_options(opaque)
        .ok_or_else(|| "Conversion is disabled in settings".to_string())
}

/// Tests for encode bindings.
///
/// Note: The exported functions take `JsValue` streams, which only work on
/// wasm32 targets. For comprehensive encode testing, see the tests in
/// `webp_bridge_core::encode`.
#[cfg(test)]
mod tests {
    use super::*;
    use webp_bridge_core::PixelLayout;

    #[test]
    fn test_mode_for() {
        assert_eq!(mode_for(true), ConversionMode::LosslessWebp);
        assert_eq!(mode_for(false), ConversionMode::LossyWebp);
    }

    #[test]
    fn test_options_for_default_settings() {
        let mut settings = Settings::default();
        settings.mode = ConversionMode::LossyWebp;

        let options = options_for(&settings, true).unwrap();
        assert!(!options.lossless);
        assert_eq!(options.quality, 90.0);
        assert_eq!(options.layout, PixelLayout::Rgbx);
    }

    #[test]
    fn test_options_for_disabled_settings() {
        let err = options_for(&Settings::default(), false).unwrap_err();
        assert!(err.contains("disabled"));
    }

    #[test]
    fn test_options_for_invalid_settings() {
        let mut settings = Settings::new(ConversionMode::LosslessWebp);
        settings.lossless_level = 12;
        assert!(options_for(&settings, false).is_err());
    }

    #[test]
    fn test_options_for_oversized_staging_capacity() {
        let mut settings = Settings::new(ConversionMode::LossyWebp);
        settings.staging_capacity = usize::MAX / 2;

        let err = options_for(&settings, false).unwrap_err();
        assert!(err.contains("staging capacity"));

        settings.staging_capacity = webp_bridge_core::MAX_STAGING_CAPACITY;
        assert!(options_for(&settings, false).is_ok());
    }
}

/// WASM-specific tests that require JsValue.
///
/// These tests use functions that take or return `JsValue` and can only
/// run on wasm32 targets. Use `wasm-pack test` to run these.
#[cfg(all(test, target_arch = "wasm32"))]
mod wasm_tests {
    use super::*;
    use js_sys::{Array, Function, Object, Reflect, Uint8Array};
    use wasm_bindgen::JsCast;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    fn collecting_stream() -> (JsValue, Array) {
        let chunks = Array::new();
        let write = Function::new_with_args(
            "buf, off, len",
            "this.chunks.push(buf.slice(off, off + len));",
        );
        let target = Object::new();
        Reflect::set(&target, &"chunks".into(), &chunks).unwrap();
        Reflect::set(&target, &"write".into(), &write).unwrap();
        (target.into(), chunks)
    }

    fn collected(chunks: &Array) -> Vec<u8> {
        chunks
            .iter()
            .flat_map(|c| c.unchecked_into::<Uint8Array>().to_vec())
            .collect()
    }

    #[wasm_bindgen_test]
    fn test_encode_webp_basic() {
        let pixels = vec![128u8; 50 * 50 * 4];
        let (out, chunks) = collecting_stream();

        let written = encode_webp(&pixels, 50, 50, 200, true, false, out).unwrap();

        let bytes = collected(&chunks);
        assert_eq!(bytes.len(), written);
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WEBP");
    }

    #[wasm_bindgen_test]
    fn test_encode_webp_chunk_sizes() {
        let pixels: Vec<u8> = (0..200 * 200 * 4).map(|i| (i * 37 % 256) as u8).collect();
        let (out, chunks) = collecting_stream();

        encode_webp(&pixels, 200, 200, 800, false, true, out).unwrap();

        assert!(chunks
            .iter()
            .all(|c| c.unchecked_into::<Uint8Array>().length() <= 4096));
    }

    #[wasm_bindgen_test]
    fn test_encode_webp_invalid_dimensions() {
        let (out, _) = collecting_stream();
        assert!(encode_webp(&[0u8; 16], 0, 2, 8, false, false, out).is_err());
    }

    #[wasm_bindgen_test]
    fn test_encode_webp_with_settings_object() {
        let pixels = vec![200u8; 20 * 20 * 4];
        let settings = Object::new();
        Reflect::set(&settings, &"mode".into(), &"lossless_webp".into()).unwrap();
        Reflect::set(&settings, &"staging_capacity".into(), &JsValue::from(16)).unwrap();
        let (out, chunks) = collecting_stream();

        encode_webp_with_settings(&pixels, 20, 20, 80, false, settings.into(), out).unwrap();

        assert!(chunks
            .iter()
            .all(|c| c.unchecked_into::<Uint8Array>().length() <= 16));
    }
}
