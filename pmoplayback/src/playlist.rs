//! Doubly-linked sequence of playlist items plus the mutation API.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::EngineConfig;
use crate::decoded_stream::DecodedStream;
use crate::decoder;
use crate::filter_graph::FilterGraph;
use crate::playlist_item::{PlaylistItemHandle, PlaylistItemInner};
use crate::sink::Sink;
use crate::sink_map::SinkMap;

/// Everything the decoder loop and the public mutation API share under one
/// mutex.
pub(crate) struct PlaylistState {
    pub(crate) head: Option<Arc<PlaylistItemInner>>,
    pub(crate) tail: Option<Arc<PlaylistItemInner>>,
    pub(crate) volume: f64,
    pub(crate) decode_head: Option<Arc<PlaylistItemInner>>,
    pub(crate) composite_volume: f64,
    pub(crate) filter_graph: Option<FilterGraph>,
    pub(crate) sink_map: SinkMap,
    pub(crate) sent_end_of_q: bool,
    pub(crate) last_paused: bool,
    /// Set whenever the attached sink set changes; `rebuild_is_needed` alone
    /// only tracks input format and volume, not the output-format set, so
    /// attach/detach force a rebuild on the next iteration through this flag.
    pub(crate) rebuild_flag: bool,
}

impl PlaylistState {
    fn recompute_composite_volume(&mut self) {
        self.composite_volume = match &self.decode_head {
            Some(item) => self.volume * item.gain(),
            None => self.volume,
        };
    }
}

/// The playback engine core: a mutable, decoder-task-driven sequence of
/// files plus the set of sinks currently consuming its output.
pub struct Playlist {
    pub(crate) state: Arc<Mutex<PlaylistState>>,
    pub(crate) paused: Arc<AtomicBool>,
    abort: CancellationToken,
    decoder_task: Mutex<Option<JoinHandle<()>>>,
    config: EngineConfig,
}

impl Playlist {
    /// Allocates a playlist and spawns its decoder task with `volume = 1.0`.
    pub fn create() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let state = Arc::new(Mutex::new(PlaylistState {
            head: None,
            tail: None,
            volume: 1.0,
            decode_head: None,
            composite_volume: 1.0,
            filter_graph: None,
            sink_map: SinkMap::new(),
            sent_end_of_q: false,
            last_paused: false,
            rebuild_flag: false,
        }));
        let paused = Arc::new(AtomicBool::new(false));
        let abort = CancellationToken::new();

        let task = tokio::spawn(decoder::run(
            state.clone(),
            paused.clone(),
            abort.clone(),
            config.clone(),
        ));

        Self {
            state,
            paused,
            abort,
            decoder_task: Mutex::new(Some(task)),
            config,
        }
    }

    /// Clears the playlist, cancels the decoder task and awaits it, detaches
    /// every sink, and drops the filter graph.
    pub async fn shutdown(&self) {
        self.clear().await;
        self.abort.cancel();
        if let Some(task) = self.decoder_task.lock().await.take() {
            let _ = task.await;
        }
        let mut state = self.state.lock().await;
        for entry in state.sink_map.iter() {
            for sink in entry.stack.iter() {
                sink.abort();
            }
        }
        state.sink_map = SinkMap::new();
        state.filter_graph = None;
    }

    pub fn play(&self) {
        self.paused.store(false, Ordering::Release);
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    pub fn playing(&self) -> bool {
        !self.paused.load(Ordering::Acquire)
    }

    /// Splices a new item before `next`, or appends to the tail when `next`
    /// is `None`. If the playlist was empty, the new item becomes the decode
    /// head and a non-flushing seek-to-0 is queued so decoding starts clean.
    pub async fn insert(
        &self,
        file: Box<dyn DecodedStream>,
        gain: f64,
        next: Option<&PlaylistItemHandle>,
    ) -> PlaylistItemHandle {
        let item = PlaylistItemInner::new(file, gain);
        let mut state = self.state.lock().await;

        match next {
            Some(next_handle) => {
                let next_inner = next_handle.inner.clone();
                let prev_inner = next_inner.prev();
                *item.prev.lock().unwrap() = prev_inner.as_ref().map(Arc::downgrade);
                *item.next.lock().unwrap() = Some(next_inner.clone());
                match &prev_inner {
                    Some(p) => *p.next.lock().unwrap() = Some(item.clone()),
                    None => state.head = Some(item.clone()),
                }
                *next_inner.prev.lock().unwrap() = Some(Arc::downgrade(&item));
            }
            None => {
                match state.tail.clone() {
                    Some(tail) => {
                        *item.prev.lock().unwrap() = Some(Arc::downgrade(&tail));
                        *tail.next.lock().unwrap() = Some(item.clone());
                    }
                    None => state.head = Some(item.clone()),
                }
                state.tail = Some(item.clone());
            }
        }

        if state.decode_head.is_none() {
            state.decode_head = Some(item.clone());
            item.file.lock().await.request_seek(0.0, false);
            state.recompute_composite_volume();
        }

        info!("playlist item inserted");
        PlaylistItemHandle::new(item)
    }

    /// Unlinks `item`; advances `decode_head` past it if it was the head, and
    /// purges every sink's queue of buffers originating from it before
    /// returning, so no sink can observe a buffer from a removed item.
    pub async fn remove(&self, item: &PlaylistItemHandle) {
        let inner = item.inner.clone();
        let mut state = self.state.lock().await;

        let prev = inner.prev();
        let next = inner.next();

        match &prev {
            Some(p) => *p.next.lock().unwrap() = next.clone(),
            None => state.head = next.clone(),
        }
        match &next {
            Some(n) => *n.prev.lock().unwrap() = prev.as_ref().map(Arc::downgrade),
            None => state.tail = prev.clone(),
        }

        let was_decode_head = state
            .decode_head
            .as_ref()
            .map(|h| Arc::ptr_eq(h, &inner))
            .unwrap_or(false);
        if was_decode_head {
            state.decode_head = next.clone();
            if let Some(n) = &state.decode_head {
                n.file.lock().await.request_seek(0.0, false);
            }
            state.recompute_composite_volume();
        }

        for entry in state.sink_map.iter() {
            for sink in entry.stack.iter() {
                sink.purge(&inner).await;
            }
        }

        *inner.next.lock().unwrap() = None;
        *inner.prev.lock().unwrap() = None;

        info!("playlist item removed");
    }

    /// Removes every item, head-first, re-reading the new head after each
    /// removal rather than capturing `next` up front.
    pub async fn clear(&self) {
        loop {
            let head = {
                let state = self.state.lock().await;
                state.head.clone()
            };
            let Some(head) = head else { break };
            self.remove(&PlaylistItemHandle::new(head)).await;
        }
    }

    pub async fn count(&self) -> usize {
        let state = self.state.lock().await;
        let mut n = 0;
        let mut cur = state.head.clone();
        while let Some(item) = cur {
            n += 1;
            cur = item.next();
        }
        n
    }

    /// Queues a flushing seek on `item` and makes it the decode head.
    pub async fn seek(&self, item: &PlaylistItemHandle, seconds: f64) {
        let mut state = self.state.lock().await;
        item.inner.file.lock().await.request_seek(seconds, true);
        state.decode_head = Some(item.inner.clone());
        state.recompute_composite_volume();
        info!(seconds, "playlist seek");
    }

    pub async fn set_gain(&self, item: &PlaylistItemHandle, gain: f64) {
        item.inner.set_gain(gain);
        let mut state = self.state.lock().await;
        if state.decode_head.as_ref().map(|h| item.ptr_eq(h)).unwrap_or(false) {
            state.recompute_composite_volume();
        }
    }

    pub async fn set_volume(&self, v: f64) {
        let mut state = self.state.lock().await;
        state.volume = v;
        state.recompute_composite_volume();
    }

    /// Current decode head and its file's playback clock, if any.
    pub async fn position(&self) -> Option<(PlaylistItemHandle, f64)> {
        let state = self.state.lock().await;
        match &state.decode_head {
            Some(item) => {
                let clock = item.file.lock().await.audio_clock();
                Some((PlaylistItemHandle::new(item.clone()), clock))
            }
            None => None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Attaches `sink` to this playlist's [`SinkMap`], re-arming its queue
    /// and forcing a filter-graph rebuild at the next decode iteration.
    pub(crate) async fn attach_sink(&self, sink: Arc<Sink>) {
        sink.reset();
        let mut state = self.state.lock().await;
        state.sink_map.add_sink(sink);
        state.rebuild_flag = true;
        info!("sink attached");
    }

    /// Aborts and flushes `sink`'s queue, then removes it from the map; the
    /// emptied-entry case also forces a rebuild.
    pub(crate) async fn detach_sink(&self, sink: &Arc<Sink>) {
        sink.abort();
        sink.flush().await;
        let mut state = self.state.lock().await;
        state.sink_map.remove_sink(sink);
        state.rebuild_flag = true;
        info!("sink detached");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoded_stream::tests::MockStream;
    use crate::format::{AudioFormat, ChannelLayout, SampleFmt};
    use crate::sink::SinkResult;

    fn fmt() -> AudioFormat {
        AudioFormat::new(44_100, ChannelLayout::Stereo, SampleFmt::I16)
    }

    #[tokio::test]
    async fn insert_into_empty_playlist_becomes_decode_head_and_drains() {
        let playlist = Playlist::with_config(EngineConfig {
            noop_delay: std::time::Duration::from_millis(1),
            ..EngineConfig::default()
        });
        let sink = Sink::create(fmt());
        sink.attach(&playlist).await;

        playlist
            .insert(Box::new(MockStream::new(44_100, 0.2)), 1.0, None)
            .await;

        let mut saw_end = false;
        for _ in 0..2000 {
            match sink.get_buffer(false).await {
                SinkResult::End => {
                    saw_end = true;
                    break;
                }
                SinkResult::Ok(_) => {}
                SinkResult::None => tokio::task::yield_now().await,
            }
        }
        assert!(saw_end, "expected end-of-queue sentinel within the poll budget");
        playlist.shutdown().await;
    }

    #[tokio::test]
    async fn remove_purges_sink_queue() {
        let playlist = Playlist::with_config(EngineConfig {
            noop_delay: std::time::Duration::from_millis(1),
            ..EngineConfig::default()
        });
        let sink = Sink::create(fmt());
        sink.attach(&playlist).await;
        playlist.pause();

        let item = playlist
            .insert(Box::new(MockStream::new(44_100, 5.0)), 1.0, None)
            .await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        playlist.remove(&item).await;
        assert_eq!(playlist.count().await, 0);
        playlist.shutdown().await;
    }
}
