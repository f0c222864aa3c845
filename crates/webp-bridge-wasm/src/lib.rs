//! webp-bridge WASM - WebAssembly bindings for webp-bridge
//!
//! This crate lets JavaScript hand raw RGBA pixels to libwebp and receive the
//! compressed output through its own output stream object.
//!
//! # Module Structure
//!
//! - `stream` - JavaScript output streams and `Uint8Array` staging buffers
//! - `encode` - WebP encoding bindings
//!
//! # Usage
//!
//! ```typescript
//! import init, { encode_webp, encoder_version } from '@webp-bridge/wasm';
//!
//! // Initialize WASM module (must call first)
//! await init();
//! console.log(`libwebp ${encoder_version()}`);
//!
//! const parts: Uint8Array[] = [];
//! const out = { write: (buf, off, len) => parts.push(buf.slice(off, off + len)) };
//! encode_webp(rgba, width, height, width * 4, false, true, out);
//! const webp = new Blob(parts, { type: 'image/webp' });
//! ```

use std::fmt;

use wasm_bindgen::prelude::*;

mod encode;
mod stream;

// Re-export public types
pub use encode::{encode_webp, encode_webp_with_settings};
pub use stream::{JsFailure, JsOutputStream, JsStaging};

/// Initialize the WASM module (called automatically on load)
///
/// Probes the encoder once. A failure is logged to the console; encode
/// calls will retry the probe and report the error themselves.
#[wasm_bindgen(start)]
pub fn init() {
    if let Err(e) = webp_bridge_core::initialize() {
        report(&e);
    }
}

/// Get the version of the WASM module
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Get the version of the linked libwebp encoder, e.g. "1.4.0"
#[wasm_bindgen]
pub fn encoder_version() -> Result<String, JsValue> {
    webp_bridge_core::initialize()
        .map(|runtime| runtime.encoder_version().to_string())
        .map_err(|e| report(&e))
}

/// Whether the encoder runtime has been initialized
#[wasm_bindgen]
pub fn is_initialized() -> bool {
    webp_bridge_core::is_initialized()
}

/// Log an error to the browser console and convert it for JavaScript.
pub(crate) fn report(err: &dyn fmt::Display) -> JsValue {
    let message = JsValue::from_str(&err.to_string());
    web_sys::console::error_1(&message);
    message
}
