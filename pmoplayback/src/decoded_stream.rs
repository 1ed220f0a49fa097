//! The "file-opening subsystem" external collaborator.
//!
//! The upstream design speaks of a demuxer/decoder library exposing
//! `read_packet`/`decode_audio_frame` plus a seek/abort interface on a
//! per-file handle. `pmoflac` fuses demuxing and decoding behind a single
//! `AsyncRead` stream instead of exposing them as separate steps, so
//! [`DecodedStream::next_chunk`] collapses "read one packet, decode it" into
//! one pull. This does not change the decoder loop's pause/seek/EOF/backpressure
//! coordination, which only ever needed "give me the next decoded chunk, or
//! tell me we're done."

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;

use crate::audio_chunk::{AudioChunk, AudioChunkData};
use crate::bit_depth::BitDepth;
use crate::error::{EngineError, Result};

/// Native format of a decoded stream, before the filter graph's `aformat`
/// stage resamples/retypes it to match a sink's declared [`crate::format::AudioFormat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeFormat {
    pub sample_rate: u32,
    pub channels: u8,
    pub bit_depth: BitDepth,
}

/// Number of PCM frames pulled from the underlying stream per [`DecodedStream::next_chunk`] call.
///
/// Mirrors a FLAC block: large enough to amortize the `AsyncRead` call, small
/// enough to keep per-iteration decoder-loop latency low.
const CHUNK_FRAMES: usize = 4096;

/// Stand-in for an external demuxer/decoder plus per-file handle collaborator.
///
/// One instance per playlist item, wrapped in a `tokio::sync::Mutex` on
/// [`crate::playlist_item::PlaylistItemInner`] — that outer lock is this
/// trait's "file seek mutex": whoever holds it has exclusive access to the
/// stream's pause/seek/EOF bookkeeping, so those fields need no additional
/// synchronization of their own.
#[async_trait]
pub trait DecodedStream: Send + Sync {
    /// Native sample rate / channel count / bit depth of the undecoded stream.
    fn native_format(&self) -> NativeFormat;

    /// Current playback position, in seconds, of the last chunk handed out.
    fn audio_clock(&self) -> f64;

    /// Pulls and decodes the next chunk of audio. `Ok(None)` signals EOF.
    async fn next_chunk(&mut self) -> Result<Option<AudioChunk>>;

    /// Records a pending seek request, effective the next time the decoder
    /// loop calls [`DecodedStream::take_and_perform_seek`]. `flush` records
    /// whether attached sinks should be flushed once the seek completes: an
    /// explicit `Playlist::seek` sets it, the decoder loop's own
    /// auto-restart-at-0 on file advance/insert does not.
    fn request_seek(&mut self, seconds: f64, flush: bool);

    /// If a seek is pending, performs it and clears the pending request,
    /// returning whether sinks should be flushed. Returns `Ok(None)` when no
    /// seek was pending. A failed seek still clears the pending request —
    /// the caller is expected to log `Err` and continue decoding from the
    /// current position.
    async fn take_and_perform_seek(&mut self) -> Result<Option<bool>>;

    fn read_pause(&mut self);
    fn read_play(&mut self);

    fn abort_request(&self) -> bool;
    fn request_abort(&self);

    /// Pushes a final, empty decode to flush any delayed frames held by the
    /// codec. Returns `Ok(None)` once the codec has nothing left to drain.
    async fn flush_codec(&mut self) -> Result<Option<AudioChunk>>;
}

/// `DecodedStream` backed by `pmoflac`.
///
/// Constructed over a fully-buffered in-memory copy of the file: `pmoflac`
/// decodes from any `AsyncRead + Unpin + Send`, but seeking requires
/// restarting decode from byte 0 and discarding frames up to the target
/// position (FLAC has no random-access frame index in this crate), so the
/// adapter keeps the encoded bytes around to reopen the decode stream on seek.
pub struct FlacFileStream {
    encoded: Arc<Vec<u8>>,
    reader: Box<pmoflac::FlacDecodedStream>,
    native: NativeFormat,
    audio_clock: f64,
    pending_seek: Option<(f64, bool)>,
    paused: bool,
    aborted: AtomicBool,
    eof: bool,
}

impl FlacFileStream {
    pub async fn open(encoded: Vec<u8>) -> Result<Self> {
        let encoded = Arc::new(encoded);
        let stream = pmoflac::decode_flac_stream(Cursor::new((*encoded).clone()))
            .await
            .map_err(EngineError::DecodeError)?;
        let info = stream.info().clone();
        let bit_depth = nearest_supported_bit_depth(info.bits_per_sample);
        Ok(Self {
            encoded,
            reader: Box::new(stream),
            native: NativeFormat {
                sample_rate: info.sample_rate,
                channels: info.channels,
                bit_depth,
            },
            audio_clock: 0.0,
            pending_seek: None,
            paused: false,
            aborted: AtomicBool::new(false),
            eof: false,
        })
    }

    async fn reopen_at(&mut self, seconds: f64) -> Result<()> {
        let mut stream = pmoflac::decode_flac_stream(Cursor::new((*self.encoded).clone()))
            .await
            .map_err(EngineError::DecodeError)?;

        let bytes_per_frame = self.native.channels as usize * (self.native.bit_depth.bits() as usize / 8);
        let skip_frames = (seconds.max(0.0) * self.native.sample_rate as f64) as usize;
        let mut to_skip = skip_frames * bytes_per_frame;
        let mut scratch = vec![0u8; 64 * 1024];
        while to_skip > 0 {
            let take = to_skip.min(scratch.len());
            let n = stream.read(&mut scratch[..take]).await.map_err(EngineError::Io)?;
            if n == 0 {
                break;
            }
            to_skip -= n;
        }

        self.reader = Box::new(stream);
        self.audio_clock = seconds.max(0.0);
        self.eof = false;
        Ok(())
    }
}

fn nearest_supported_bit_depth(bits: u8) -> BitDepth {
    match bits {
        0..=8 => BitDepth::B8,
        9..=16 => BitDepth::B16,
        17..=24 => BitDepth::B24,
        _ => BitDepth::B32,
    }
}

/// Sign-extends packed little-endian PCM at `bits_per_sample` into `i32`s,
/// mirroring `pmoflac`'s own wire format (it is not re-exported from that
/// crate, so the conversion is reproduced here rather than depended on).
fn le_bytes_to_i32(bytes: &[u8], bit_depth: BitDepth) -> Vec<i32> {
    let bytes_per_sample = (bit_depth.bits() as usize) / 8;
    let shift = 32 - bit_depth.bits() as i32;
    let mut out = Vec::with_capacity(bytes.len() / bytes_per_sample);
    for chunk in bytes.chunks_exact(bytes_per_sample) {
        let mut value: i32 = 0;
        for (i, byte) in chunk.iter().enumerate() {
            value |= (*byte as i32) << (8 * i);
        }
        if shift > 0 {
            value = (value << shift) >> shift;
        }
        out.push(value);
    }
    out
}

#[async_trait]
impl DecodedStream for FlacFileStream {
    fn native_format(&self) -> NativeFormat {
        self.native
    }

    fn audio_clock(&self) -> f64 {
        self.audio_clock
    }

    async fn next_chunk(&mut self) -> Result<Option<AudioChunk>> {
        if self.eof || self.aborted.load(Ordering::Relaxed) || self.paused {
            return Ok(None);
        }

        let bytes_per_sample = self.native.bit_depth.bits() as usize / 8;
        let bytes_per_frame = self.native.channels as usize * bytes_per_sample;
        let mut raw = vec![0u8; CHUNK_FRAMES * bytes_per_frame];
        let mut filled = 0;
        while filled < raw.len() {
            let n = self.reader.read(&mut raw[filled..]).await.map_err(EngineError::Io)?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            self.eof = true;
            return Ok(None);
        }
        raw.truncate(filled - (filled % bytes_per_frame));

        let samples = le_bytes_to_i32(&raw, self.native.bit_depth);
        let frames = samples.len() / self.native.channels as usize;
        let stereo = deinterleave_to_stereo(&samples, self.native.channels as usize, frames);

        self.audio_clock += frames as f64 / self.native.sample_rate as f64;
        let chunk = AudioChunkData::new(stereo, self.native.sample_rate, 0.0);
        Ok(Some(AudioChunk::I32(chunk)))
    }

    fn request_seek(&mut self, seconds: f64, flush: bool) {
        self.pending_seek = Some((seconds.max(0.0), flush));
    }

    async fn take_and_perform_seek(&mut self) -> Result<Option<bool>> {
        let Some((target, flush)) = self.pending_seek.take() else {
            return Ok(None);
        };
        self.reopen_at(target).await?;
        Ok(Some(flush))
    }

    fn read_pause(&mut self) {
        self.paused = true;
    }

    fn read_play(&mut self) {
        self.paused = false;
    }

    fn abort_request(&self) -> bool {
        self.aborted.load(Ordering::Relaxed)
    }

    fn request_abort(&self) {
        self.aborted.store(true, Ordering::Relaxed);
    }

    async fn flush_codec(&mut self) -> Result<Option<AudioChunk>> {
        // `pmoflac` has no delayed-frame concept (claxon decodes block-synchronously);
        // the codec never holds frames back, so flushing is a no-op that reports done.
        Ok(None)
    }
}

/// Deinterleaves `channels`-wide PCM into `[i32; 2]` stereo pairs, duplicating
/// a mono source across both channels (matching [`crate::format::ChannelLayout`]'s
/// storage convention).
fn deinterleave_to_stereo(samples: &[i32], channels: usize, frames: usize) -> Vec<[i32; 2]> {
    let mut out = Vec::with_capacity(frames);
    match channels {
        1 => {
            for i in 0..frames {
                let s = samples[i];
                out.push([s, s]);
            }
        }
        _ => {
            for i in 0..frames {
                let base = i * channels;
                out.push([samples[base], samples[base + 1]]);
            }
        }
    }
    out
}

/// In-memory test support, not gated behind `#[cfg(test)]`: integration
/// tests in `tests/` link the crate as an ordinary dependency and would not
/// otherwise see anything compiled only under the crate's own `cfg(test)`.
pub mod tests {
    use super::*;

    /// In-memory `DecodedStream` used by the engine's own integration tests;
    /// not backed by `pmoflac` at all, so tests don't need real FLAC bytes.
    pub struct MockStream {
        pub native: NativeFormat,
        pub total_frames: usize,
        pub remaining_frames: usize,
        pub clock: f64,
        pub pending_seek: Option<(f64, bool)>,
        pub paused: bool,
        pub aborted: AtomicBool,
    }

    impl MockStream {
        pub fn new(sample_rate: u32, seconds: f64) -> Self {
            let total_frames = (sample_rate as f64 * seconds) as usize;
            Self {
                native: NativeFormat {
                    sample_rate,
                    channels: 2,
                    bit_depth: BitDepth::B16,
                },
                total_frames,
                remaining_frames: total_frames,
                clock: 0.0,
                pending_seek: None,
                paused: false,
                aborted: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl DecodedStream for MockStream {
        fn native_format(&self) -> NativeFormat {
            self.native
        }
        fn audio_clock(&self) -> f64 {
            self.clock
        }
        async fn next_chunk(&mut self) -> Result<Option<AudioChunk>> {
            if self.aborted.load(Ordering::Relaxed) || self.paused || self.remaining_frames == 0 {
                return Ok(None);
            }
            let n = self.remaining_frames.min(CHUNK_FRAMES);
            self.remaining_frames -= n;
            self.clock += n as f64 / self.native.sample_rate as f64;
            let stereo = vec![[0i32, 0i32]; n];
            Ok(Some(AudioChunk::I32(AudioChunkData::new(stereo, self.native.sample_rate, 0.0))))
        }
        fn request_seek(&mut self, seconds: f64, flush: bool) {
            self.pending_seek = Some((seconds.max(0.0), flush));
        }
        async fn take_and_perform_seek(&mut self) -> Result<Option<bool>> {
            let Some((target, flush)) = self.pending_seek.take() else {
                return Ok(None);
            };
            self.clock = target;
            let played_frames = (target * self.native.sample_rate as f64) as usize;
            self.remaining_frames = self.total_frames.saturating_sub(played_frames);
            Ok(Some(flush))
        }
        fn read_pause(&mut self) {
            self.paused = true;
        }
        fn read_play(&mut self) {
            self.paused = false;
        }
        fn abort_request(&self) -> bool {
            self.aborted.load(Ordering::Relaxed)
        }
        fn request_abort(&self) {
            self.aborted.store(true, Ordering::Relaxed);
        }
        async fn flush_codec(&mut self) -> Result<Option<AudioChunk>> {
            Ok(None)
        }
    }

    #[cfg(test)]
    #[tokio::test]
    async fn mock_stream_yields_expected_frame_count() {
        let mut s = MockStream::new(44_100, 10.0);
        let mut total = 0usize;
        while let Some(chunk) = s.next_chunk().await.unwrap() {
            total += chunk.len();
        }
        assert_eq!(total, 44_100 * 10);
    }
}
