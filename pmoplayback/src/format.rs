//! Audio format description shared by sinks, buffers and the filter graph.

use std::fmt;

/// Number of channels the engine knows how to carry.
///
/// [`crate::audio_chunk::AudioChunk`] stores frames as `[T; 2]` stereo pairs
/// unconditionally; a mono format is represented as stereo storage with both
/// channels holding the same sample, matching what the filter graph's
/// `aformat` stage produces for a mono branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelLayout {
    Mono,
    Stereo,
}

impl ChannelLayout {
    pub fn channel_count(self) -> usize {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
        }
    }
}

/// Sample representation, mirroring [`crate::audio_chunk::AudioChunk`]'s variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFmt {
    I8,
    I16,
    I24,
    I32,
    F32,
    F64,
}

impl SampleFmt {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFmt::I8 => 1,
            SampleFmt::I16 => 2,
            SampleFmt::I24 => 4, // stored in a 32-bit word, see `crate::I24`
            SampleFmt::I32 => 4,
            SampleFmt::F32 => 4,
            SampleFmt::F64 => 8,
        }
    }
}

impl fmt::Display for SampleFmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SampleFmt::I8 => "i8",
            SampleFmt::I16 => "i16",
            SampleFmt::I24 => "i24",
            SampleFmt::I32 => "i32",
            SampleFmt::F32 => "f32",
            SampleFmt::F64 => "f64",
        };
        write!(f, "{s}")
    }
}

/// `{sample_rate, channel_layout, sample_fmt}`. Equality is component-wise,
/// which is what [`crate::sink_map::SinkMap`] groups sinks on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channel_layout: ChannelLayout,
    pub sample_fmt: SampleFmt,
}

impl AudioFormat {
    pub fn new(sample_rate: u32, channel_layout: ChannelLayout, sample_fmt: SampleFmt) -> Self {
        Self {
            sample_rate,
            channel_layout,
            sample_fmt,
        }
    }

    /// `channels * sample_rate * bytes_per_sample` — used to derive a sink's
    /// backpressure threshold and to convert decoded byte counts into a
    /// clock adjustment.
    pub fn bytes_per_sec(self) -> usize {
        self.channel_layout.channel_count() * self.sample_rate as usize * self.sample_fmt.bytes_per_sample()
    }

    pub fn bytes_per_frame(self) -> usize {
        self.channel_layout.channel_count() * self.sample_fmt.bytes_per_sample()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_per_sec_matches_spec_example() {
        // 10s x 44100 x 2 x 2 = 1_764_000 bytes total for one stereo 16-bit track
        let fmt = AudioFormat::new(44_100, ChannelLayout::Stereo, SampleFmt::I16);
        assert_eq!(fmt.bytes_per_sec(), 44_100 * 2 * 2);
        assert_eq!(fmt.bytes_per_sec() * 10, 1_764_000);
    }

    #[test]
    fn format_equality_is_componentwise() {
        let a = AudioFormat::new(48_000, ChannelLayout::Mono, SampleFmt::F32);
        let b = AudioFormat::new(48_000, ChannelLayout::Mono, SampleFmt::F32);
        let c = AudioFormat::new(48_000, ChannelLayout::Stereo, SampleFmt::F32);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
