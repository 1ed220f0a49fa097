//! DSP helpers shared by `AudioChunkData`'s per-chunk gain and the filter
//! graph's volume/resample/format-conversion stages.

pub mod depth;
pub mod gain_32bits;
pub mod int_float;
pub mod resampling;

pub use depth::bitdepth_change_stereo;
pub use gain_32bits::apply_gain_stereo_i32;
pub use int_float::{i32_stereo_to_pairs_f32, pairs_f32_to_i32_stereo};

pub use resampling::resampling;
