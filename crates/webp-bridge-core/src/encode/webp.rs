//! WebP encoding through libwebp.
//!
//! libwebp is configured with the drawing preset, then handed a writer
//! callback that pushes every piece of compressed output through a
//! [`ChunkedSinkWriter`]. Nothing is buffered on the Rust side beyond the
//! writer's staging buffer.
//!
//! Lossless encodes store the picture as ARGB; lossy encodes use YUV, which
//! is what libwebp recommends for them.

use std::ffi::{c_int, c_void};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::time::Instant;

use libwebp_sys::{
    WebPConfig, WebPConfigLosslessPreset, WebPEncode, WebPPicture, WebPPictureFree,
    WebPPictureImportRGBA, WebPPictureImportRGBX, WebPPreset, WebPValidateConfig,
};
use log::{debug, error, info};

use super::{EncodeError, EncodeOptions, PixelBuffer, PixelLayout};
use crate::runtime;
use crate::sink::{ChunkedSinkWriter, Sink, Staging, Transfer, TransferError, DEFAULT_STAGING_CAPACITY};

/// Encode `image` and stream the result into `writer`.
///
/// Returns the bytes and chunks this encode delivered to the sink.
///
/// # Errors
///
/// - [`EncodeError::NotInitialized`] if the encoder runtime cannot start
/// - [`EncodeError::InvalidConfig`] if libwebp rejects the options
/// - [`EncodeError::ImportFailed`] if libwebp cannot import the pixels
/// - [`EncodeError::Transfer`] if the sink or staging buffer fails mid-stream
/// - [`EncodeError::EncodingFailed`] for any other libwebp failure
///
/// Output already delivered before a failure is not retracted.
pub fn encode_webp_with<S, K>(
    image: &PixelBuffer<'_>,
    options: &EncodeOptions,
    writer: &mut ChunkedSinkWriter<S, K>,
) -> Result<Transfer, EncodeError>
where
    S: Staging,
    K: Sink<S>,
{
    runtime::initialize()?;

    let start = Instant::now();
    let config = configure(options)?;

    let mut picture = Picture::new()?;
    picture.0.width = image.width() as c_int;
    picture.0.height = image.height() as c_int;
    picture.0.use_argb = c_int::from(options.lossless);

    let before = writer.totals();
    let mut ctx = WriterContext {
        writer,
        failure: None,
    };
    picture.0.writer = Some(write_chunks::<S, K>);
    picture.0.custom_ptr = &mut ctx as *mut WriterContext<'_, S, K> as *mut c_void;

    import(&mut picture, image, options.layout)?;

    // SAFETY: config was initialized by libwebp and validated; picture holds
    // imported pixels and custom_ptr points at ctx, which outlives this call.
    let encoded = unsafe { WebPEncode(&config, &mut picture.0) } != 0;

    picture.0.writer = None;
    picture.0.custom_ptr = ptr::null_mut();

    if !encoded {
        if let Some(failure) = ctx.failure.take() {
            error!("WebP output could not be streamed: {}", failure);
            return Err(EncodeError::Transfer(failure));
        }
        let reason = describe_error(picture.0.error_code as i32);
        error!("WebPEncode failed: {}", reason);
        return Err(EncodeError::EncodingFailed(reason.to_string()));
    }

    let after = ctx.writer.totals();
    let delivered = Transfer {
        bytes: after.bytes - before.bytes,
        chunks: after.chunks - before.chunks,
    };
    info!(
        "Encoded {}x{} {} WebP ({} bytes, {} chunks) in {:?}",
        image.width(),
        image.height(),
        if options.lossless { "lossless" } else { "lossy" },
        delivered.bytes,
        delivered.chunks,
        start.elapsed()
    );
    Ok(delivered)
}

/// Encode a 4-byte-per-pixel buffer to WebP and write it to `out`.
///
/// Uses the default settings: drawing preset, lossy quality 90 or lossless
/// level 2, and a [`DEFAULT_STAGING_CAPACITY`] staging buffer. `opaque`
/// makes the encoder ignore the alpha byte.
pub fn encode_webp<W: io::Write>(
    pixels: &[u8],
    width: u32,
    height: u32,
    stride: usize,
    opaque: bool,
    lossless: bool,
    out: &mut W,
) -> Result<Transfer, EncodeError> {
    let image = PixelBuffer::new(pixels, width, height, stride)?;
    let options = if lossless {
        EncodeOptions::lossless()
    } else {
        EncodeOptions::lossy()
    }
    .with_opaque(opaque);

    let mut writer = ChunkedSinkWriter::new(vec![0u8; DEFAULT_STAGING_CAPACITY], out);
    encode_webp_with(&image, &options, &mut writer)
}

fn configure(options: &EncodeOptions) -> Result<WebPConfig, EncodeError> {
    let quality = options.clamped_quality();
    let mut config = WebPConfig::new_with_preset(WebPPreset::WEBP_PRESET_DRAWING, quality).map_err(|()| {
        error!("Drawing preset rejected at quality {}", quality);
        EncodeError::InvalidConfig("preset rejected (libwebp version mismatch)")
    })?;

    if options.lossless {
        let level = c_int::from(options.clamped_lossless_level());
        // SAFETY: config is a valid, initialized WebPConfig.
        if unsafe { WebPConfigLosslessPreset(&mut config, level) } == 0 {
            error!("WebPConfigLosslessPreset failed for level {}", level);
            return Err(EncodeError::InvalidConfig("lossless preset rejected"));
        }
    }

    // SAFETY: config is a valid, initialized WebPConfig.
    if unsafe { WebPValidateConfig(&config) } == 0 {
        error!("WebPValidateConfig failed");
        return Err(EncodeError::InvalidConfig("configuration did not validate"));
    }

    Ok(config)
}

fn import(picture: &mut Picture, image: &PixelBuffer<'_>, layout: PixelLayout) -> Result<(), EncodeError> {
    let stride = image.stride() as c_int;
    let src = image.pixels().as_ptr();

    // SAFETY: PixelBuffer guarantees pixels.len() == stride * height with
    // stride >= width * 4, and width/height were copied into the picture.
    let ok = unsafe {
        match layout {
            PixelLayout::Rgba => WebPPictureImportRGBA(&mut picture.0, src, stride),
            PixelLayout::Rgbx => WebPPictureImportRGBX(&mut picture.0, src, stride),
        }
    };

    if ok == 0 {
        let reason = describe_error(picture.0.error_code as i32);
        error!("Picture import ({:?}) failed: {}", layout, reason);
        return Err(EncodeError::ImportFailed(reason.to_string()));
    }
    Ok(())
}

/// Owns a `WebPPicture` and frees its pixel memory on every exit path.
struct Picture(WebPPicture);

impl Picture {
    fn new() -> Result<Self, EncodeError> {
        WebPPicture::new().map(Self).map_err(|()| {
            error!("WebPPictureInit failed");
            EncodeError::InvalidConfig("picture init rejected (libwebp version mismatch)")
        })
    }
}

impl Drop for Picture {
    fn drop(&mut self) {
        // SAFETY: the picture was initialized; freeing an empty picture is a no-op.
        unsafe { WebPPictureFree(&mut self.0) };
    }
}

struct WriterContext<'w, S, K> {
    writer: &'w mut ChunkedSinkWriter<S, K>,
    failure: Option<TransferError>,
}

/// libwebp writer callback. Returns 1 to continue, 0 to abort the encode.
unsafe extern "C" fn write_chunks<S, K>(
    data: *const u8,
    data_size: usize,
    picture: *const WebPPicture,
) -> c_int
where
    S: Staging,
    K: Sink<S>,
{
    if picture.is_null() {
        return 0;
    }
    // SAFETY: custom_ptr is set to a live WriterContext<S, K> by
    // encode_webp_with for the whole duration of WebPEncode.
    let ctx = unsafe { &mut *((*picture).custom_ptr as *mut WriterContext<'_, S, K>) };

    if data_size == 0 {
        return 1;
    }
    if data.is_null() {
        ctx.failure = Some(TransferError::CopyFailed {
            delivered: ctx.writer.totals().bytes,
            reason: "encoder passed a null buffer".to_string(),
        });
        return 0;
    }

    // SAFETY: libwebp guarantees data points at data_size readable bytes.
    let chunk = unsafe { std::slice::from_raw_parts(data, data_size) };
    debug!("Encoder produced {} bytes", data_size);

    let writer = &mut *ctx.writer;
    match panic::catch_unwind(AssertUnwindSafe(|| writer.write_chunked(chunk))) {
        Ok(Ok(_)) => 1,
        Ok(Err(e)) => {
            ctx.failure = Some(e);
            0
        }
        Err(_) => {
            ctx.failure = Some(TransferError::SinkWriteFailed {
                delivered: ctx.writer.totals().bytes,
                reason: "sink panicked".to_string(),
            });
            0
        }
    }
}

fn describe_error(code: i32) -> &'static str {
    match code {
        0 => "no error reported",
        1 => "out of memory",
        2 => "out of memory while flushing bits",
        3 => "null parameter",
        4 => "invalid configuration",
        5 => "bad picture dimension",
        6 => "first partition too big",
        7 => "partition too big",
        8 => "error while flushing bytes",
        9 => "file too big",
        10 => "aborted by user",
        _ => "unknown encoder error",
    }
}
