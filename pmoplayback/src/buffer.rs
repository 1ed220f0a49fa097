//! Reference-counted container for one decoded, format-converted audio frame.

use std::sync::{Arc, Weak};

use crate::audio_chunk::AudioChunk;
use crate::format::AudioFormat;
use crate::playlist_item::PlaylistItemInner;

/// One decoded frame, already converted to a sink's declared [`AudioFormat`].
///
/// Reference counting is Rust's native `Arc` strong count rather than a
/// hand-rolled atomic field: cloning a `Buffer` is `buffer_ref`, dropping one
/// is `buffer_unref`, and the underlying [`AudioChunk`] is released the
/// moment the last clone drops.
#[derive(Clone)]
pub struct Buffer {
    inner: Arc<BufferInner>,
}

struct BufferInner {
    data: AudioChunk,
    format: AudioFormat,
    pos: f64,
    item: Weak<PlaylistItemInner>,
}

impl Buffer {
    /// Builds a buffer from a filter-graph output frame, stamping it with the
    /// decode position and a weak back-reference to the originating item.
    pub fn new(data: AudioChunk, format: AudioFormat, pos: f64, item: &Arc<PlaylistItemInner>) -> Self {
        Self {
            inner: Arc::new(BufferInner {
                data,
                format,
                pos,
                item: Arc::downgrade(item),
            }),
        }
    }

    pub fn format(&self) -> AudioFormat {
        self.inner.format
    }

    pub fn pos(&self) -> f64 {
        self.inner.pos
    }

    pub fn data(&self) -> &AudioChunk {
        &self.inner.data
    }

    pub fn frame_count(&self) -> usize {
        self.inner.data.len()
    }

    pub fn size_bytes(&self) -> usize {
        self.inner.data.len() * self.inner.format.bytes_per_frame()
    }

    /// True if this buffer's originating item is still alive and is `item`.
    pub fn belongs_to(&self, item: &Arc<PlaylistItemInner>) -> bool {
        match self.inner.item.upgrade() {
            Some(owner) => Arc::ptr_eq(&owner, item),
            None => false,
        }
    }

    /// Number of live references to this buffer's data, i.e. `Arc::strong_count`.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

/// `Arc::clone` spelled out as its own named entry point for callers used to
/// an explicit increment/decrement API rather than RAII.
pub fn buffer_ref(b: &Buffer) -> Buffer {
    b.clone()
}

/// `drop`, spelled out the same way. Taking an owned `Buffer` (rather than
/// e.g. `&mut Option<Buffer>`) is enough: the caller's binding goes out of
/// scope here, decrementing the strong count.
pub fn buffer_unref(b: Buffer) {
    drop(b);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_chunk::AudioChunkData;
    use crate::format::{ChannelLayout, SampleFmt};
    use crate::playlist_item::PlaylistItemInner;

    fn sample_buffer(item: &Arc<PlaylistItemInner>) -> Buffer {
        let data = AudioChunk::I16(AudioChunkData::new(vec![[0i16, 0i16]; 100], 44_100, 0.0));
        let format = AudioFormat::new(44_100, ChannelLayout::Stereo, SampleFmt::I16);
        Buffer::new(data, format, 1.5, item)
    }

    #[test]
    fn ref_unref_is_a_noop_on_strong_count() {
        let item = PlaylistItemInner::for_test();
        let b = sample_buffer(&item);
        let before = b.ref_count();
        let cloned = buffer_ref(&b);
        assert_eq!(cloned.ref_count(), before + 1);
        buffer_unref(cloned);
        assert_eq!(b.ref_count(), before);
    }

    #[test]
    fn belongs_to_is_false_after_item_is_dropped() {
        let item = PlaylistItemInner::for_test();
        let b = sample_buffer(&item);
        assert!(b.belongs_to(&item));
        drop(item);
        let other = PlaylistItemInner::for_test();
        assert!(!b.belongs_to(&other));
    }

    #[test]
    fn size_bytes_matches_format() {
        let item = PlaylistItemInner::for_test();
        let b = sample_buffer(&item);
        assert_eq!(b.size_bytes(), 100 * 2 * 2);
    }
}
