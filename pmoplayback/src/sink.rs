//! Per-consumer FIFO of decoded buffers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};

use crate::buffer::Buffer;
use crate::format::AudioFormat;
use crate::playlist::Playlist;
use crate::playlist_item::PlaylistItemInner;

/// Tagged queue element: a real decoded buffer, or the end-of-queue marker.
///
/// A tagged variant rather than a magic sentinel pointer, so queue
/// accounting simply skips the `EndOfQueue` arm instead of special-casing a
/// null/poison value.
enum QueueItem {
    Buffer(Buffer),
    EndOfQueue,
}

/// Outcome of [`Sink::get_buffer`].
pub enum SinkResult {
    /// A real buffer, ownership transferred to the caller.
    Ok(Buffer),
    /// The playlist reached the end of its current traversal.
    End,
    /// The queue was empty (non-blocking call) or aborted.
    None,
}

type FlushCallback = Box<dyn Fn(&Sink) + Send + Sync>;
type PurgeCallback = Box<dyn Fn(&Sink, &Arc<PlaylistItemInner>) + Send + Sync>;

/// A consumer endpoint: declares the [`AudioFormat`] it wants and holds a
/// backpressure-bounded FIFO of decoded buffers in that format.
pub struct Sink {
    format: AudioFormat,
    buffer_size: usize,
    bytes_per_sec: usize,
    min_queue_bytes: usize,
    queue: Mutex<VecDeque<QueueItem>>,
    notify: Notify,
    aborted: AtomicBool,
    audioq_size: AtomicUsize,
    audioq_buf_count: AtomicUsize,
    flush_cb: Option<FlushCallback>,
    purge_cb: Option<PurgeCallback>,
}

impl Sink {
    /// Default `buffer_size` of 8192 frames.
    pub fn create(format: AudioFormat) -> Arc<Self> {
        Self::with_buffer_frames(format, crate::config::DEFAULT_SINK_BUFFER_FRAMES)
    }

    pub fn with_buffer_frames(format: AudioFormat, buffer_size: usize) -> Arc<Self> {
        Self::with_callbacks(format, buffer_size, None, None)
    }

    pub fn with_callbacks(
        format: AudioFormat,
        buffer_size: usize,
        flush_cb: Option<FlushCallback>,
        purge_cb: Option<PurgeCallback>,
    ) -> Arc<Self> {
        let bytes_per_sec = format.bytes_per_sec();
        let min_queue_bytes = buffer_size * format.bytes_per_frame();
        Arc::new(Self {
            format,
            buffer_size,
            bytes_per_sec,
            min_queue_bytes,
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            aborted: AtomicBool::new(false),
            audioq_size: AtomicUsize::new(0),
            audioq_buf_count: AtomicUsize::new(0),
            flush_cb,
            purge_cb,
        })
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn bytes_per_sec(&self) -> usize {
        self.bytes_per_sec
    }

    pub fn audioq_size(&self) -> usize {
        self.audioq_size.load(Ordering::Acquire)
    }

    pub fn audioq_buf_count(&self) -> usize {
        self.audioq_buf_count.load(Ordering::Acquire)
    }

    /// A sink is full iff its queued byte total has reached its backpressure threshold.
    pub fn is_full(&self) -> bool {
        self.audioq_size() >= self.min_queue_bytes
    }

    /// Re-arms the queue after attach, unblocking any stale abort state.
    pub(crate) fn reset(&self) {
        self.aborted.store(false, Ordering::Release);
    }

    pub(crate) async fn push_buffer(&self, buffer: Buffer) {
        let size = buffer.size_bytes();
        let mut q = self.queue.lock().await;
        q.push_back(QueueItem::Buffer(buffer));
        self.audioq_size.fetch_add(size, Ordering::AcqRel);
        self.audioq_buf_count.fetch_add(1, Ordering::AcqRel);
        drop(q);
        self.notify.notify_waiters();
    }

    pub(crate) async fn push_end_of_queue(&self) {
        let mut q = self.queue.lock().await;
        q.push_back(QueueItem::EndOfQueue);
        drop(q);
        self.notify.notify_waiters();
    }

    /// Dequeues the next item, blocking on the queue's `Notify` when `block`
    /// is true and the queue is momentarily empty (the async equivalent of a
    /// condition-variable wait).
    ///
    /// The waiter is registered with `enable()` before the queue is even
    /// locked, so a `push_buffer`/`push_end_of_queue` landing between the
    /// emptiness check and the `.await` below still wakes this call — the
    /// registration, not the poll, is what catches `notify_waiters()`.
    pub async fn get_buffer(&self, block: bool) -> SinkResult {
        loop {
            if self.aborted.load(Ordering::Acquire) {
                return SinkResult::None;
            }

            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut q = self.queue.lock().await;
                if let Some(item) = q.pop_front() {
                    return match item {
                        QueueItem::Buffer(b) => {
                            self.audioq_size.fetch_sub(b.size_bytes(), Ordering::AcqRel);
                            self.audioq_buf_count.fetch_sub(1, Ordering::AcqRel);
                            SinkResult::Ok(b)
                        }
                        QueueItem::EndOfQueue => SinkResult::End,
                    };
                }
            }
            if !block {
                return SinkResult::None;
            }
            notified.await;
        }
    }

    /// Evicts every queued buffer originating from `item`, then invokes the
    /// purge callback once. Used by `Playlist::remove`.
    pub(crate) async fn purge(&self, item: &Arc<PlaylistItemInner>) {
        let mut q = self.queue.lock().await;
        let mut removed_bytes = 0usize;
        let mut removed_count = 0usize;
        q.retain(|entry| match entry {
            QueueItem::Buffer(b) if b.belongs_to(item) => {
                removed_bytes += b.size_bytes();
                removed_count += 1;
                false
            }
            _ => true,
        });
        drop(q);
        self.audioq_size.fetch_sub(removed_bytes, Ordering::AcqRel);
        self.audioq_buf_count.fetch_sub(removed_count, Ordering::AcqRel);
        if let Some(cb) = &self.purge_cb {
            cb(self, item);
        }
    }

    /// Discards every queued item and invokes the flush callback. Used after
    /// a seek with `seek_flush` set.
    pub(crate) async fn flush(&self) {
        let mut q = self.queue.lock().await;
        q.clear();
        drop(q);
        self.audioq_size.store(0, Ordering::Release);
        self.audioq_buf_count.store(0, Ordering::Release);
        if let Some(cb) = &self.flush_cb {
            cb(self);
        }
    }

    /// Aborts the queue: wakes any blocked `get_buffer` with `SinkResult::None`.
    pub(crate) fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    /// Attaches this sink to `playlist`'s `SinkMap`.
    pub async fn attach(self: &Arc<Self>, playlist: &Playlist) {
        playlist.attach_sink(self.clone()).await;
    }

    /// Detaches this sink from `playlist`, aborting and flushing its queue first.
    pub async fn detach(self: &Arc<Self>, playlist: &Playlist) {
        playlist.detach_sink(self).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_chunk::{AudioChunk, AudioChunkData};
    use crate::format::{ChannelLayout, SampleFmt};
    use crate::playlist_item::PlaylistItemInner;

    fn fmt() -> AudioFormat {
        AudioFormat::new(44_100, ChannelLayout::Stereo, SampleFmt::I16)
    }

    fn one_frame_buffer(item: &Arc<PlaylistItemInner>) -> Buffer {
        let data = AudioChunk::I16(AudioChunkData::new(vec![[0i16, 0i16]; 1], 44_100, 0.0));
        Buffer::new(data, fmt(), 0.0, item)
    }

    #[tokio::test]
    async fn accounting_matches_enqueued_bytes() {
        let sink = Sink::create(fmt());
        let item = PlaylistItemInner::for_test();
        for _ in 0..4 {
            sink.push_buffer(one_frame_buffer(&item)).await;
        }
        assert_eq!(sink.audioq_buf_count(), 4);
        assert_eq!(sink.audioq_size(), 4 * fmt().bytes_per_frame());

        match sink.get_buffer(false).await {
            SinkResult::Ok(_) => {}
            _ => panic!("expected a buffer"),
        }
        assert_eq!(sink.audioq_buf_count(), 3);
        assert_eq!(sink.audioq_size(), 3 * fmt().bytes_per_frame());
    }

    #[tokio::test]
    async fn end_of_queue_is_not_counted_and_is_delivered_once() {
        let sink = Sink::create(fmt());
        let item = PlaylistItemInner::for_test();
        sink.push_buffer(one_frame_buffer(&item)).await;
        sink.push_end_of_queue().await;

        assert!(matches!(sink.get_buffer(false).await, SinkResult::Ok(_)));
        assert!(matches!(sink.get_buffer(false).await, SinkResult::End));
        assert!(matches!(sink.get_buffer(false).await, SinkResult::None));
    }

    #[tokio::test]
    async fn full_sink_reports_backpressure() {
        let sink = Sink::with_buffer_frames(fmt(), 2);
        let item = PlaylistItemInner::for_test();
        assert!(!sink.is_full());
        sink.push_buffer(one_frame_buffer(&item)).await;
        sink.push_buffer(one_frame_buffer(&item)).await;
        assert!(sink.is_full());
    }

    #[tokio::test]
    async fn purge_evicts_only_matching_item() {
        let sink = Sink::create(fmt());
        let a = PlaylistItemInner::for_test();
        let b = PlaylistItemInner::for_test();
        sink.push_buffer(one_frame_buffer(&a)).await;
        sink.push_buffer(one_frame_buffer(&b)).await;
        sink.purge(&a).await;
        assert_eq!(sink.audioq_buf_count(), 1);
        match sink.get_buffer(false).await {
            SinkResult::Ok(buf) => assert!(buf.belongs_to(&b)),
            _ => panic!("expected the surviving buffer"),
        }
    }

    #[tokio::test]
    async fn blocking_get_buffer_wakes_on_later_push() {
        let sink = Sink::create(fmt());
        let item = PlaylistItemInner::for_test();
        let sink2 = sink.clone();
        let handle = tokio::spawn(async move { sink2.get_buffer(true).await });
        tokio::task::yield_now().await;
        sink.push_buffer(one_frame_buffer(&item)).await;
        let result = handle.await.unwrap();
        assert!(matches!(result, SinkResult::Ok(_)));
    }
}
