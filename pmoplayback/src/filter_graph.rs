//! `input_buffer_src -> [volume] -> [split(N)] -> aformat_i -> sink_buffer_i`
//!
//! No external libavfilter-equivalent crate exists in this stack, so every
//! stage is implemented directly against the project's own DSP code: the
//! volume stage and each branch's `aformat` stage both go through
//! [`crate::dsp::int_float`]'s normalized-float conversions (the same
//! intermediate representation [`crate::dsp::resampling`] already uses),
//! rather than [`crate::audio_chunk::AudioChunk::apply_gain`], whose integer
//! gain path assumes full-scale 32-bit samples — not the bit-depth-tagged
//! storage a freshly decoded chunk actually holds.

use crate::audio_chunk::{AudioChunk, AudioChunkData};
use crate::bit_depth::BitDepth;
use crate::buffer::Buffer;
use crate::decoded_stream::NativeFormat;
use crate::dsp::int_float::{self, Bit16, Bit24, Bit32, Bit8};
use crate::dsp::resampling::{build_resampler, resampling, Resampler};
use crate::error::{EngineError, Result};
use crate::format::{AudioFormat, ChannelLayout, SampleFmt};
use crate::playlist_item::PlaylistItemInner;
use crate::sink_map::SinkMap;
use std::sync::Arc;

/// One input-format branch: resamples/retypes into one sink-format group's output.
struct Branch {
    target: AudioFormat,
    resampler: Option<Resampler>,
}

/// A built transform from one native decode format + one composite volume to
/// N sink-format branches. Rebuilt wholesale whenever [`crate::filter_graph::rebuild_is_needed`]
/// says the input format, sink-format set, or volume has changed.
pub struct FilterGraph {
    native: NativeFormat,
    volume: f64,
    branches: Vec<Branch>,
}

/// Snapshot of the state a rebuild decision is made against.
#[derive(Clone, Copy, PartialEq)]
pub struct GraphKey {
    pub native: NativeFormat,
    pub volume: f64,
}

impl FilterGraph {
    pub fn build(native: NativeFormat, volume: f64, sink_map: &SinkMap) -> Self {
        let branches = sink_map
            .iter()
            .map(|entry| Branch {
                target: entry.format,
                resampler: build_branch_resampler(native, entry.format),
            })
            .collect();
        Self {
            native,
            volume: volume.clamp(0.0, 1.0),
            branches,
        }
    }

    pub fn key(&self) -> GraphKey {
        GraphKey {
            native: self.native,
            volume: self.volume,
        }
    }

    /// Runs one decoded chunk through volume, split, and every branch's
    /// `aformat` stage, producing one [`Buffer`] per branch.
    pub fn process(&mut self, chunk: &AudioChunk, pos: f64, item: &Arc<PlaylistItemInner>) -> Result<Vec<(usize, Buffer)>> {
        let AudioChunk::I32(data) = chunk else {
            return Err(EngineError::FilterGraphError(
                "filter graph input must be a freshly decoded I32 chunk".into(),
            ));
        };

        let with_volume = if (self.volume - 1.0).abs() < f64::EPSILON {
            data.clone_frames()
        } else {
            apply_volume(data.frames(), self.native.bit_depth, self.volume)
        };

        let mut outputs = Vec::with_capacity(self.branches.len());
        for (idx, branch) in self.branches.iter_mut().enumerate() {
            let converted = aformat(&with_volume, self.native, branch)?;
            let buffer = Buffer::new(converted, branch.target, pos, item);
            outputs.push((idx, buffer));
        }
        Ok(outputs)
    }
}

/// Whether the graph needs rebuilding: no graph yet, or the key (input
/// format + composite volume, compared with exact `f64` equality — a
/// tolerant comparison was considered and rejected so that setting the same
/// volume twice in a row triggers at most one rebuild) no longer matches
/// what it was last built with.
pub fn rebuild_is_needed(current: Option<GraphKey>, native: NativeFormat, volume: f64) -> bool {
    match current {
        None => true,
        Some(key) => key.native != native || key.volume != volume.clamp(0.0, 1.0),
    }
}

fn build_branch_resampler(native: NativeFormat, target: AudioFormat) -> Option<Resampler> {
    if native.sample_rate == target.sample_rate {
        return None;
    }
    build_resampler(native.sample_rate, target.sample_rate, native.bit_depth.bits()).ok()
}

fn apply_volume(frames: &[[i32; 2]], bit_depth: BitDepth, volume: f64) -> Vec<[i32; 2]> {
    let (mut left, mut right) = split_stereo(frames);
    let mut pairs = vec![[0.0f32; 2]; frames.len()];
    to_pairs_f32(bit_depth, &left, &right, &mut pairs);
    for p in pairs.iter_mut() {
        p[0] *= volume as f32;
        p[1] *= volume as f32;
    }
    from_pairs_f32(bit_depth, &pairs, &mut left, &mut right);
    left.into_iter().zip(right).map(|(l, r)| [l, r]).collect()
}

fn aformat(frames: &[[i32; 2]], native: NativeFormat, branch: &mut Branch) -> Result<AudioChunk> {
    let (left, right) = split_stereo(frames);
    let (left, right) = match branch.resampler.as_mut() {
        Some(r) => resampling(&left, &right, r),
        None => (left, right),
    };

    let mut pairs = vec![[0.0f32; 2]; left.len()];
    to_pairs_f32(native.bit_depth, &left, &right, &mut pairs);

    if branch.target.channel_layout == ChannelLayout::Mono {
        for p in pairs.iter_mut() {
            let mono = (p[0] + p[1]) * 0.5;
            *p = [mono, mono];
        }
    }

    Ok(to_chunk(&pairs, branch.target.sample_fmt, branch.target.sample_rate))
}

fn split_stereo(frames: &[[i32; 2]]) -> (Vec<i32>, Vec<i32>) {
    let mut left = Vec::with_capacity(frames.len());
    let mut right = Vec::with_capacity(frames.len());
    for f in frames {
        left.push(f[0]);
        right.push(f[1]);
    }
    (left, right)
}

fn to_pairs_f32(bit_depth: BitDepth, left: &[i32], right: &[i32], out: &mut [[f32; 2]]) {
    match bit_depth {
        BitDepth::B8 => int_float::i32_stereo_to_pairs_f32::<Bit8>(left, right, out),
        BitDepth::B16 => int_float::i32_stereo_to_pairs_f32::<Bit16>(left, right, out),
        BitDepth::B24 => int_float::i32_stereo_to_pairs_f32::<Bit24>(left, right, out),
        BitDepth::B32 => int_float::i32_stereo_to_pairs_f32::<Bit32>(left, right, out),
    }
}

fn from_pairs_f32(bit_depth: BitDepth, pairs: &[[f32; 2]], left: &mut [i32], right: &mut [i32]) {
    match bit_depth {
        BitDepth::B8 => int_float::pairs_f32_to_i32_stereo::<Bit8>(pairs, left, right),
        BitDepth::B16 => int_float::pairs_f32_to_i32_stereo::<Bit16>(pairs, left, right),
        BitDepth::B24 => int_float::pairs_f32_to_i32_stereo::<Bit24>(pairs, left, right),
        BitDepth::B32 => int_float::pairs_f32_to_i32_stereo::<Bit32>(pairs, left, right),
    }
}

fn to_chunk(pairs: &[[f32; 2]], fmt: SampleFmt, sample_rate: u32) -> AudioChunk {
    match fmt {
        SampleFmt::F32 => AudioChunk::F32(AudioChunkData::new(pairs.to_vec(), sample_rate, 0.0)),
        SampleFmt::F64 => {
            let frames: Vec<[f64; 2]> = pairs.iter().map(|p| [p[0] as f64, p[1] as f64]).collect();
            AudioChunk::F64(AudioChunkData::new(frames, sample_rate, 0.0))
        }
        SampleFmt::I8 => {
            let mut left = vec![0i32; pairs.len()];
            let mut right = vec![0i32; pairs.len()];
            int_float::pairs_f32_to_i32_stereo::<Bit8>(pairs, &mut left, &mut right);
            let frames: Vec<[i8; 2]> = left
                .into_iter()
                .zip(right)
                .map(|(l, r)| [l.clamp(-128, 127) as i8, r.clamp(-128, 127) as i8])
                .collect();
            AudioChunk::I8(AudioChunkData::new(frames, sample_rate, 0.0))
        }
        SampleFmt::I16 => {
            let mut left = vec![0i32; pairs.len()];
            let mut right = vec![0i32; pairs.len()];
            int_float::pairs_f32_to_i32_stereo::<Bit16>(pairs, &mut left, &mut right);
            let frames: Vec<[i16; 2]> = left
                .into_iter()
                .zip(right)
                .map(|(l, r)| [l.clamp(-32768, 32767) as i16, r.clamp(-32768, 32767) as i16])
                .collect();
            AudioChunk::I16(AudioChunkData::new(frames, sample_rate, 0.0))
        }
        SampleFmt::I24 => {
            let mut left = vec![0i32; pairs.len()];
            let mut right = vec![0i32; pairs.len()];
            int_float::pairs_f32_to_i32_stereo::<Bit24>(pairs, &mut left, &mut right);
            let frames: Vec<[crate::I24; 2]> = left
                .into_iter()
                .zip(right)
                .map(|(l, r)| [crate::I24::new_clamped(l), crate::I24::new_clamped(r)])
                .collect();
            AudioChunk::I24(AudioChunkData::new(frames, sample_rate, 0.0))
        }
        SampleFmt::I32 => {
            let mut left = vec![0i32; pairs.len()];
            let mut right = vec![0i32; pairs.len()];
            int_float::pairs_f32_to_i32_stereo::<Bit32>(pairs, &mut left, &mut right);
            let frames: Vec<[i32; 2]> = left.into_iter().zip(right).map(|(l, r)| [l, r]).collect();
            AudioChunk::I32(AudioChunkData::new(frames, sample_rate, 0.0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playlist_item::PlaylistItemInner;
    use crate::sink::Sink;

    fn native() -> NativeFormat {
        NativeFormat {
            sample_rate: 44_100,
            channels: 2,
            bit_depth: BitDepth::B16,
        }
    }

    #[test]
    fn no_volume_stage_when_volume_is_exactly_one() {
        assert!(!rebuild_is_needed(
            Some(GraphKey { native: native(), volume: 1.0 }),
            native(),
            1.0
        ));
        assert!(rebuild_is_needed(
            Some(GraphKey { native: native(), volume: 1.0 }),
            native(),
            0.99
        ));
    }

    #[test]
    fn set_volume_twice_to_same_value_does_not_rebuild_twice() {
        let key = GraphKey { native: native(), volume: 0.5 };
        assert!(!rebuild_is_needed(Some(key), native(), 0.5));
    }

    #[test]
    fn process_produces_one_buffer_per_branch() {
        let mut map = SinkMap::new();
        map.add_sink(Sink::create(AudioFormat::new(44_100, ChannelLayout::Stereo, SampleFmt::I16)));
        map.add_sink(Sink::create(AudioFormat::new(48_000, ChannelLayout::Mono, SampleFmt::F32)));

        let mut graph = FilterGraph::build(native(), 1.0, &map);
        let item = PlaylistItemInner::for_test();
        let chunk = AudioChunk::I32(AudioChunkData::new(vec![[1000i32, -1000i32]; 512], 44_100, 0.0));

        let outputs = graph.process(&chunk, 0.0, &item).unwrap();
        assert_eq!(outputs.len(), 2);
    }
}
