//! Chunked streaming of producer output into a push-based sink.
//!
//! A producer (the WebP encoder) hands over a byte buffer of arbitrary size.
//! The consumer on the other side of the boundary only accepts writes out of
//! a fixed-capacity staging buffer, so the payload is pushed through that
//! buffer in bounded chunks:
//!
//! ```text
//! source ──copy──▶ staging[0..chunk) ──write(staging, 0, chunk)──▶ sink
//! ```
//!
//! # Guarantees
//!
//! - The sink receives every byte of the source exactly once, in order.
//! - Each chunk is at most the staging capacity; only the last may be shorter.
//! - The staging buffer is reused for every chunk and never reallocated.
//! - The first failure stops the transfer. Chunks already delivered stay
//!   delivered; the error reports how many bytes the sink accepted.

use std::fmt;
use std::io;

use log::{debug, error};
use thiserror::Error;

/// Staging capacity used when the caller does not pick one.
pub const DEFAULT_STAGING_CAPACITY: usize = 4096;

/// Errors that terminate a chunked transfer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    /// The staging buffer has no room for even a single byte.
    #[error("Invalid staging buffer: capacity must be greater than zero")]
    InvalidStagingBuffer,

    /// A chunk could not be copied into the staging buffer.
    #[error("Could not copy chunk into staging buffer after {delivered} bytes: {reason}")]
    CopyFailed { delivered: usize, reason: String },

    /// The sink rejected a chunk.
    #[error("Could not write chunk to sink after {delivered} bytes: {reason}")]
    SinkWriteFailed { delivered: usize, reason: String },
}

impl TransferError {
    /// Number of bytes the sink accepted before the transfer failed.
    pub fn delivered(&self) -> usize {
        match self {
            TransferError::InvalidStagingBuffer => 0,
            TransferError::CopyFailed { delivered, .. }
            | TransferError::SinkWriteFailed { delivered, .. } => *delivered,
        }
    }
}

/// Returned by the byte-slice staging buffers when a chunk does not fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("chunk of {requested} bytes exceeds staging capacity of {capacity} bytes")]
pub struct StagingOverflow {
    pub requested: usize,
    pub capacity: usize,
}

/// Fixed-capacity intermediate storage that chunks are copied into.
pub trait Staging {
    type Error: fmt::Display;

    /// Number of bytes a single chunk may occupy.
    fn capacity(&self) -> usize;

    /// Copy `chunk` into the start of the buffer.
    fn fill(&mut self, chunk: &[u8]) -> Result<(), Self::Error>;
}

impl Staging for [u8] {
    type Error = StagingOverflow;

    fn capacity(&self) -> usize {
        self.len()
    }

    fn fill(&mut self, chunk: &[u8]) -> Result<(), StagingOverflow> {
        let capacity = self.len();
        let region = self.get_mut(..chunk.len()).ok_or(StagingOverflow {
            requested: chunk.len(),
            capacity,
        })?;
        region.copy_from_slice(chunk);
        Ok(())
    }
}

impl Staging for Vec<u8> {
    type Error = StagingOverflow;

    fn capacity(&self) -> usize {
        self.len()
    }

    fn fill(&mut self, chunk: &[u8]) -> Result<(), StagingOverflow> {
        Staging::fill(self.as_mut_slice(), chunk)
    }
}

impl Staging for Box<[u8]> {
    type Error = StagingOverflow;

    fn capacity(&self) -> usize {
        self.len()
    }

    fn fill(&mut self, chunk: &[u8]) -> Result<(), StagingOverflow> {
        Staging::fill(&mut **self, chunk)
    }
}

/// A push-based consumer that reads `length` bytes at `offset` out of the
/// staging buffer `S`.
///
/// The chunked writer always calls this with `offset == 0` and
/// `length <= staging.capacity()`.
pub trait Sink<S: ?Sized> {
    type Error: fmt::Display;

    fn write(&mut self, staging: &S, offset: usize, length: usize) -> Result<(), Self::Error>;
}

/// Any `std::io::Write` is a sink over byte-slice staging buffers.
impl<W, S> Sink<S> for W
where
    W: io::Write,
    S: AsRef<[u8]> + ?Sized,
{
    type Error = io::Error;

    fn write(&mut self, staging: &S, offset: usize, length: usize) -> io::Result<()> {
        let bytes = staging.as_ref();
        let region = offset
            .checked_add(length)
            .and_then(|end| bytes.get(offset..end))
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!(
                        "region {}+{} is outside staging buffer of {} bytes",
                        offset,
                        length,
                        bytes.len()
                    ),
                )
            })?;
        self.write_all(region)
    }
}

/// Totals for a completed transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Transfer {
    /// Bytes delivered to the sink.
    pub bytes: usize,
    /// Number of `Sink::write` calls made.
    pub chunks: usize,
}

/// Push `source` into `sink` through `staging`, one chunk at a time.
///
/// # Errors
///
/// - [`TransferError::InvalidStagingBuffer`] if the staging capacity is zero.
///   The sink is never contacted.
/// - [`TransferError::CopyFailed`] if the staging buffer rejects a chunk.
/// - [`TransferError::SinkWriteFailed`] if the sink rejects a chunk.
///
/// No chunk is attempted after a failure.
pub fn transfer<S, K>(source: &[u8], sink: &mut K, staging: &mut S) -> Result<Transfer, TransferError>
where
    S: Staging + ?Sized,
    K: Sink<S> + ?Sized,
{
    let capacity = staging.capacity();
    if capacity == 0 {
        error!("Cannot stage {} bytes through a zero-capacity buffer", source.len());
        return Err(TransferError::InvalidStagingBuffer);
    }

    if source.is_empty() {
        return Ok(Transfer::default());
    }

    let mut progress = Transfer::default();
    for chunk in source.chunks(capacity) {
        staging.fill(chunk).map_err(|e| {
            error!("Could not update staging buffer with chunk data: {}", e);
            TransferError::CopyFailed {
                delivered: progress.bytes,
                reason: e.to_string(),
            }
        })?;

        sink.write(staging, 0, chunk.len()).map_err(|e| {
            error!("Could not write staging buffer to sink: {}", e);
            TransferError::SinkWriteFailed {
                delivered: progress.bytes,
                reason: e.to_string(),
            }
        })?;

        progress.bytes += chunk.len();
        progress.chunks += 1;
    }

    debug!(
        "Transferred {} bytes in {} chunks of at most {}",
        progress.bytes, progress.chunks, capacity
    );
    Ok(progress)
}

/// Owns a staging buffer and a sink, and accepts successive producer writes.
///
/// Encoders usually emit their output in several pieces. Each piece is
/// streamed with [`transfer`] through the same staging buffer, and the
/// writer keeps running totals across pieces.
pub struct ChunkedSinkWriter<S, K> {
    staging: S,
    sink: K,
    totals: Transfer,
}

impl<S, K> ChunkedSinkWriter<S, K>
where
    S: Staging,
    K: Sink<S>,
{
    pub fn new(staging: S, sink: K) -> Self {
        Self {
            staging,
            sink,
            totals: Transfer::default(),
        }
    }

    /// Stream one producer buffer into the sink.
    ///
    /// On failure the running totals still count the chunks that reached the
    /// sink before the error.
    pub fn write_chunked(&mut self, source: &[u8]) -> Result<Transfer, TransferError> {
        match transfer(source, &mut self.sink, &mut self.staging) {
            Ok(done) => {
                self.totals.bytes += done.bytes;
                self.totals.chunks += done.chunks;
                Ok(done)
            }
            Err(e) => {
                // Every chunk before the failing one was full-sized.
                let delivered = e.delivered();
                self.totals.bytes += delivered;
                self.totals.chunks += delivered / self.staging.capacity().max(1);
                Err(e)
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.staging.capacity()
    }

    /// Bytes and chunks delivered since the writer was created.
    pub fn totals(&self) -> Transfer {
        self.totals
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn into_inner(self) -> (S, K) {
        (self.staging, self.sink)
    }
}

impl<S, K> io::Write for ChunkedSinkWriter<S, K>
where
    S: Staging,
    K: Sink<S>,
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_chunked(buf).map_err(io::Error::other)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sink that records every call and can be told to fail on the n-th one.
    #[derive(Default)]
    struct RecordingSink {
        calls: Vec<(usize, usize)>,
        received: Vec<u8>,
        fail_on_call: Option<usize>,
    }

    impl Sink<[u8]> for RecordingSink {
        type Error = String;

        fn write(&mut self, staging: &[u8], offset: usize, length: usize) -> Result<(), String> {
            let call = self.calls.len() + 1;
            self.calls.push((offset, length));
            if self.fail_on_call == Some(call) {
                return Err(format!("refused call {}", call));
            }
            self.received.extend_from_slice(&staging[offset..offset + length]);
            Ok(())
        }
    }

    /// Staging buffer that refuses the n-th copy.
    struct RejectingStaging {
        buf: Vec<u8>,
        fills: usize,
        reject_on_fill: usize,
    }

    impl Staging for RejectingStaging {
        type Error = &'static str;

        fn capacity(&self) -> usize {
            self.buf.len()
        }

        fn fill(&mut self, chunk: &[u8]) -> Result<(), &'static str> {
            self.fills += 1;
            if self.fills == self.reject_on_fill {
                return Err("region is read-only");
            }
            self.buf[..chunk.len()].copy_from_slice(chunk);
            Ok(())
        }
    }

    impl Sink<Vec<u8>> for RecordingSink {
        type Error = String;

        fn write(&mut self, staging: &Vec<u8>, offset: usize, length: usize) -> Result<(), String> {
            Sink::<[u8]>::write(self, staging, offset, length)
        }
    }

    impl Sink<RejectingStaging> for RecordingSink {
        type Error = String;

        fn write(
            &mut self,
            staging: &RejectingStaging,
            offset: usize,
            length: usize,
        ) -> Result<(), String> {
            Sink::<[u8]>::write(self, &staging.buf, offset, length)
        }
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    #[test]
    fn test_empty_source_is_noop() {
        let mut sink = RecordingSink::default();
        let mut staging = vec![0u8; 16];

        let result = transfer(&[], &mut sink, staging.as_mut_slice());

        assert_eq!(result, Ok(Transfer::default()));
        assert!(sink.calls.is_empty());
    }

    #[test]
    fn test_source_equal_to_capacity_is_one_chunk() {
        let source = pattern(16);
        let mut sink = RecordingSink::default();
        let mut staging = vec![0u8; 16];

        let result = transfer(&source, &mut sink, staging.as_mut_slice()).unwrap();

        assert_eq!(result, Transfer { bytes: 16, chunks: 1 });
        assert_eq!(sink.calls, vec![(0, 16)]);
        assert_eq!(sink.received, source);
    }

    #[test]
    fn test_source_one_past_capacity_is_two_chunks() {
        let source = pattern(17);
        let mut sink = RecordingSink::default();
        let mut staging = vec![0u8; 16];

        let result = transfer(&source, &mut sink, staging.as_mut_slice()).unwrap();

        assert_eq!(result, Transfer { bytes: 17, chunks: 2 });
        assert_eq!(sink.calls, vec![(0, 16), (0, 1)]);
        assert_eq!(sink.received, source);
    }

    #[test]
    fn test_source_smaller_than_capacity() {
        let source = pattern(5);
        let mut sink = RecordingSink::default();
        let mut staging = vec![0u8; DEFAULT_STAGING_CAPACITY];

        transfer(&source, &mut sink, staging.as_mut_slice()).unwrap();

        assert_eq!(sink.calls, vec![(0, 5)]);
        assert_eq!(sink.received, source);
    }

    #[test]
    fn test_remainder_chunk_is_last_and_shorter() {
        let source = pattern(4096 * 3 + 100);
        let mut sink = RecordingSink::default();
        let mut staging = vec![0u8; 4096];

        transfer(&source, &mut sink, staging.as_mut_slice()).unwrap();

        let lengths: Vec<usize> = sink.calls.iter().map(|&(_, len)| len).collect();
        assert_eq!(lengths, vec![4096, 4096, 4096, 100]);
        assert!(sink.calls.iter().all(|&(offset, _)| offset == 0));
    }

    #[test]
    fn test_zero_capacity_fails_before_sink() {
        let mut sink = RecordingSink::default();
        let mut staging: Vec<u8> = Vec::new();

        let result = transfer(&pattern(10), &mut sink, staging.as_mut_slice());

        assert_eq!(result, Err(TransferError::InvalidStagingBuffer));
        assert!(sink.calls.is_empty());
    }

    #[test]
    fn test_zero_capacity_fails_even_for_empty_source() {
        let mut sink = RecordingSink::default();
        let mut staging: Vec<u8> = Vec::new();

        let result = transfer(&[], &mut sink, staging.as_mut_slice());

        assert_eq!(result, Err(TransferError::InvalidStagingBuffer));
    }

    #[test]
    fn test_sink_failure_on_second_call_stops_transfer() {
        let source = pattern(40);
        let mut sink = RecordingSink {
            fail_on_call: Some(2),
            ..Default::default()
        };
        let mut staging = vec![0u8; 16];

        let result = transfer(&source, &mut sink, staging.as_mut_slice());

        assert!(matches!(
            result,
            Err(TransferError::SinkWriteFailed { delivered: 16, .. })
        ));
        // One successful write, one failed, never a third
        assert_eq!(sink.calls.len(), 2);
        assert_eq!(sink.received, source[..16]);
    }

    #[test]
    fn test_copy_failure_stops_transfer() {
        let source = pattern(40);
        let mut sink = RecordingSink::default();
        let mut staging = RejectingStaging {
            buf: vec![0u8; 16],
            fills: 0,
            reject_on_fill: 3,
        };

        let result = transfer(&source, &mut sink, &mut staging);

        assert_eq!(
            result,
            Err(TransferError::CopyFailed {
                delivered: 32,
                reason: "region is read-only".to_string(),
            })
        );
        assert_eq!(sink.calls.len(), 2);
        assert_eq!(sink.received, source[..32]);
    }

    #[test]
    fn test_error_delivered_counts() {
        assert_eq!(TransferError::InvalidStagingBuffer.delivered(), 0);
        let err = TransferError::SinkWriteFailed {
            delivered: 8192,
            reason: "closed".into(),
        };
        assert_eq!(err.delivered(), 8192);
        assert!(err.to_string().contains("8192"));
    }

    #[test]
    fn test_slice_staging_rejects_oversized_chunk() {
        let mut staging = [0u8; 4];
        let err = Staging::fill(&mut staging[..], &[1, 2, 3, 4, 5]).unwrap_err();
        assert_eq!(
            err,
            StagingOverflow {
                requested: 5,
                capacity: 4
            }
        );
    }

    #[test]
    fn test_io_write_sink_accepts_vec() {
        let source = pattern(10_000);
        let mut out: Vec<u8> = Vec::new();
        let mut staging = vec![0u8; 4096];

        let result = transfer(&source, &mut out, &mut staging).unwrap();

        assert_eq!(result.chunks, 3);
        assert_eq!(out, source);
    }

    #[test]
    fn test_io_write_sink_rejects_region_outside_staging() {
        let mut out: Vec<u8> = Vec::new();
        let staging = [0u8; 4];
        let result = Sink::<[u8]>::write(&mut out, &staging, 2, 4);
        assert!(result.is_err());
        assert!(out.is_empty());
    }

    #[test]
    fn test_io_write_failure_maps_to_sink_write_failed() {
        struct Closed;

        impl io::Write for Closed {
            fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "stream closed"))
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut staging = vec![0u8; 8];
        let result = transfer(&pattern(20), &mut Closed, &mut staging);

        match result {
            Err(TransferError::SinkWriteFailed { delivered, reason }) => {
                assert_eq!(delivered, 0);
                assert!(reason.contains("stream closed"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_writer_accumulates_across_producer_writes() {
        let mut writer = ChunkedSinkWriter::new(vec![0u8; 10], Vec::new());

        writer.write_chunked(&pattern(25)).unwrap();
        writer.write_chunked(&[]).unwrap();
        writer.write_chunked(&pattern(10)).unwrap();

        assert_eq!(writer.totals(), Transfer { bytes: 35, chunks: 4 });
        let (_, out) = writer.into_inner();
        let mut expected = pattern(25);
        expected.extend(pattern(10));
        assert_eq!(out, expected);
    }

    #[test]
    fn test_writer_counts_partial_progress_on_failure() {
        let sink = RecordingSink {
            fail_on_call: Some(3),
            ..Default::default()
        };
        let mut writer = ChunkedSinkWriter::new(vec![0u8; 4], sink);

        let result = writer.write_chunked(&pattern(20));

        assert!(matches!(
            result,
            Err(TransferError::SinkWriteFailed { delivered: 8, .. })
        ));
        assert_eq!(writer.totals(), Transfer { bytes: 8, chunks: 2 });
        assert_eq!(writer.sink().calls.len(), 3);
    }

    #[test]
    fn test_writer_as_io_write() {
        use std::io::Write;

        let mut writer = ChunkedSinkWriter::new(vec![0u8; 3].into_boxed_slice(), Vec::new());
        writer.write_all(b"chunked output").unwrap();
        writer.flush().unwrap();

        assert_eq!(writer.capacity(), 3);
        assert_eq!(writer.sink().as_slice(), b"chunked output");
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================
