//! JavaScript output streams and staging buffers.
//!
//! A JavaScript sink is any object with a `write(buffer, offset, length)`
//! method, the shape of a Java-style `OutputStream`. Chunks are staged in a
//! `Uint8Array` that lives in JavaScript memory and is reused for every
//! call, so the sink only ever sees that one buffer.

use std::fmt;

use js_sys::{Function, Reflect, Uint8Array};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use webp_bridge_core::{Sink, Staging, StagingOverflow};

/// A failure raised by JavaScript, rendered as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsFailure(pub String);

impl JsFailure {
    pub(crate) fn from_js(value: &JsValue) -> Self {
        Self(
            value
                .as_string()
                .unwrap_or_else(|| format!("{:?}", value)),
        )
    }
}

impl fmt::Display for JsFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Staging buffer backed by a JavaScript `Uint8Array`.
pub struct JsStaging(Uint8Array);

impl JsStaging {
    pub fn with_capacity(capacity: usize) -> Self {
        Self(Uint8Array::new_with_length(capacity as u32))
    }

    pub fn array(&self) -> &Uint8Array {
        &self.0
    }
}

impl Staging for JsStaging {
    type Error = StagingOverflow;

    fn capacity(&self) -> usize {
        self.0.length() as usize
    }

    fn fill(&mut self, chunk: &[u8]) -> Result<(), StagingOverflow> {
        let capacity = self.capacity();
        if chunk.len() > capacity {
            return Err(StagingOverflow {
                requested: chunk.len(),
                capacity,
            });
        }
        self.0.subarray(0, chunk.len() as u32).copy_from(chunk);
        Ok(())
    }
}

/// A JavaScript object exposing `write(buffer, offset, length)`.
pub struct JsOutputStream {
    target: JsValue,
    write: Function,
}

impl JsOutputStream {
    /// Look up the `write` method on `target`.
    pub fn from_js(target: JsValue) -> Result<Self, JsValue> {
        if !target.is_object() {
            return Err(JsValue::from_str("Output stream must be an object"));
        }
        let write = Reflect::get(&target, &JsValue::from_str("write"))?
            .dyn_into::<Function>()
            .map_err(|_| JsValue::from_str("Output stream has no write(buffer, offset, length) method"))?;
        Ok(Self { target, write })
    }
}

impl Sink<JsStaging> for JsOutputStream {
    type Error = JsFailure;

    fn write(&mut self, staging: &JsStaging, offset: usize, length: usize) -> Result<(), JsFailure> {
        self.write
            .call3(
                &self.target,
                staging.array(),
                &JsValue::from(offset as u32),
                &JsValue::from(length as u32),
            )
            .map(|_| ())
            .map_err(|e| JsFailure::from_js(&e))
    }
}
