//! Process-wide encoder initialization.
//!
//! The native encoder is probed once per process. [`initialize`] is
//! idempotent and safe to call from several threads at once: concurrent
//! first callers may each probe the library, but exactly one result is
//! published and every caller observes the same [`Runtime`].

use std::fmt;
use std::sync::OnceLock;

use log::{error, info};
use thiserror::Error;

/// Oldest libwebp release whose picture import and writer callback
/// behave as this crate expects.
pub const MIN_ENCODER_VERSION: EncoderVersion = EncoderVersion {
    major: 0,
    minor: 5,
    revision: 0,
};

static RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// Errors raised while initializing the encoder runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InitError {
    /// The linked libwebp is older than [`MIN_ENCODER_VERSION`].
    #[error("Unsupported libwebp encoder version {found} (need at least {required})")]
    UnsupportedEncoderVersion {
        found: EncoderVersion,
        required: EncoderVersion,
    },
}

/// A libwebp version as reported by `WebPGetEncoderVersion`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct EncoderVersion {
    pub major: u8,
    pub minor: u8,
    pub revision: u8,
}

impl EncoderVersion {
    /// Unpack libwebp's `0x00MMmmrr` version encoding.
    pub fn from_packed(packed: u32) -> Self {
        Self {
            major: ((packed >> 16) & 0xff) as u8,
            minor: ((packed >> 8) & 0xff) as u8,
            revision: (packed & 0xff) as u8,
        }
    }
}

impl fmt::Display for EncoderVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.revision)
    }
}

/// State shared by every encode in the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Runtime {
    encoder_version: EncoderVersion,
}

impl Runtime {
    pub fn encoder_version(&self) -> EncoderVersion {
        self.encoder_version
    }
}

/// Initialize the encoder runtime, or return the one already initialized.
///
/// A failed probe is not cached, so a later call will probe again.
pub fn initialize() -> Result<&'static Runtime, InitError> {
    if let Some(runtime) = RUNTIME.get() {
        return Ok(runtime);
    }

    let runtime = probe()?;
    let runtime = RUNTIME.get_or_init(|| runtime);
    info!(
        "Initialized WebP encoder runtime (libwebp {})",
        runtime.encoder_version
    );
    Ok(runtime)
}

/// Whether [`initialize`] has succeeded in this process.
pub fn is_initialized() -> bool {
    RUNTIME.get().is_some()
}

fn probe() -> Result<Runtime, InitError> {
    // SAFETY: WebPGetEncoderVersion takes no arguments and has no preconditions.
    let packed = unsafe { libwebp_sys::WebPGetEncoderVersion() };
    let found = EncoderVersion::from_packed(packed as u32);

    if found < MIN_ENCODER_VERSION {
        error!("libwebp {} is older than {}", found, MIN_ENCODER_VERSION);
        return Err(InitError::UnsupportedEncoderVersion {
            found,
            required: MIN_ENCODER_VERSION,
        });
    }

    Ok(Runtime {
        encoder_version: found,
    })
}
