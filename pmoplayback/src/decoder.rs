//! The decoder task: decode → filter → fan-out, one iteration at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::filter_graph::{rebuild_is_needed, FilterGraph};
use crate::playlist::PlaylistState;
use crate::playlist_item::PlaylistItemInner;

/// Outcome of one `decode_one_frame` call: whether the decode head should
/// advance to the next playlist item.
enum FrameOutcome {
    Continue,
    Advance,
    /// Playback is paused; nothing was decoded this iteration. Distinct from
    /// `Continue` so the run loop sleeps here too — paused is a suspension
    /// point alongside "no decode head" and "every sink full", not a spin.
    Paused,
}

/// Runs until `abort` fires. One `tokio::task` per [`crate::playlist::Playlist`];
/// no `std::thread` is spawned anywhere in this crate.
pub(crate) async fn run(
    state: Arc<Mutex<PlaylistState>>,
    paused: Arc<AtomicBool>,
    abort: CancellationToken,
    config: EngineConfig,
) {
    loop {
        if abort.is_cancelled() {
            return;
        }

        let mut guard = state.lock().await;

        let decode_head = match guard.decode_head.clone() {
            Some(item) => item,
            None => {
                if !guard.sent_end_of_q {
                    for entry in guard.sink_map.iter() {
                        for sink in entry.stack.iter() {
                            sink.push_end_of_queue().await;
                        }
                    }
                    guard.sent_end_of_q = true;
                }
                drop(guard);
                tokio::time::sleep(config.noop_delay).await;
                continue;
            }
        };
        guard.sent_end_of_q = false;

        let all_full = !guard.sink_map.is_empty()
            && guard
                .sink_map
                .iter()
                .all(|entry| entry.stack.iter().all(|s| s.is_full()));
        if all_full {
            drop(guard);
            tokio::time::sleep(config.noop_delay).await;
            continue;
        }

        guard.composite_volume = decode_head.gain() * guard.volume;
        let composite_volume = guard.composite_volume;

        let outcome = decode_one_frame(&mut guard, &decode_head, composite_volume, &paused).await;
        match outcome {
            FrameOutcome::Continue => {}
            FrameOutcome::Advance => {
                let next = decode_head.next();
                guard.decode_head = next.clone();
                if let Some(next_item) = &next {
                    next_item.file.lock().await.request_seek(0.0, false);
                }
                guard.composite_volume = next
                    .as_ref()
                    .map(|item| item.gain() * guard.volume)
                    .unwrap_or(guard.volume);
            }
            FrameOutcome::Paused => {}
        }

        drop(guard);
        if let FrameOutcome::Paused = outcome {
            tokio::time::sleep(config.noop_delay).await;
        }
    }
}

async fn decode_one_frame(
    state: &mut PlaylistState,
    item: &Arc<PlaylistItemInner>,
    composite_volume: f64,
    paused: &AtomicBool,
) -> FrameOutcome {
    if item.file.lock().await.abort_request() {
        return FrameOutcome::Advance;
    }

    let native = item.file.lock().await.native_format();
    if state.rebuild_flag
        || rebuild_is_needed(state.filter_graph.as_ref().map(FilterGraph::key), native, composite_volume)
    {
        debug!(?native, composite_volume, "rebuilding filter graph");
        state.filter_graph = Some(FilterGraph::build(native, composite_volume, &state.sink_map));
        state.rebuild_flag = false;
    }

    let is_paused = paused.load(Ordering::Acquire);
    if is_paused != state.last_paused {
        let mut file = item.file.lock().await;
        if is_paused {
            file.read_pause();
        } else {
            file.read_play();
        }
        state.last_paused = is_paused;
    }
    if is_paused {
        return FrameOutcome::Paused;
    }

    {
        let mut file = item.file.lock().await;
        match file.take_and_perform_seek().await {
            Ok(Some(flush)) if flush => {
                drop(file);
                for entry in state.sink_map.iter() {
                    for sink in entry.stack.iter() {
                        sink.flush().await;
                    }
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "seek failed, resuming at current position"),
        }
    }

    let chunk_result = {
        let mut file = item.file.lock().await;
        file.next_chunk().await
    };

    let chunk = match chunk_result {
        Ok(Some(chunk)) => chunk,
        Ok(None) => {
            let flushed = item.file.lock().await.flush_codec().await;
            match flushed {
                Ok(Some(chunk)) => chunk,
                Ok(None) => return FrameOutcome::Advance,
                Err(e) => {
                    warn!(error = %e, "codec flush failed, advancing to next item");
                    return FrameOutcome::Advance;
                }
            }
        }
        Err(e) => {
            warn!(error = %e, "read error, treating as end of file");
            return FrameOutcome::Advance;
        }
    };

    let pos = item.file.lock().await.audio_clock();

    let graph = state
        .filter_graph
        .as_mut()
        .expect("filter graph was just rebuilt above");
    let outputs = match graph.process(&chunk, pos, item) {
        Ok(outputs) => outputs,
        Err(e) => {
            warn!(error = %e, "filter graph processing failed, dropping frame");
            return FrameOutcome::Continue;
        }
    };

    for (idx, buffer) in outputs {
        if let Some(entry) = state.sink_map.iter().nth(idx) {
            for sink in entry.stack.iter() {
                sink.push_buffer(buffer.clone()).await;
            }
        }
    }

    FrameOutcome::Continue
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoded_stream::tests::MockStream;
    use crate::format::{AudioFormat, ChannelLayout, SampleFmt};
    use crate::playlist::Playlist;
    use crate::sink::{Sink, SinkResult};

    fn fmt() -> AudioFormat {
        AudioFormat::new(44_100, ChannelLayout::Stereo, SampleFmt::I16)
    }

    #[tokio::test]
    async fn end_of_queue_sentinel_is_delivered_exactly_once() {
        let playlist = Playlist::with_config(EngineConfig {
            noop_delay: std::time::Duration::from_millis(1),
            ..EngineConfig::default()
        });
        let sink = Sink::create(fmt());
        sink.attach(&playlist).await;
        playlist
            .insert(Box::new(MockStream::new(44_100, 0.05)), 1.0, None)
            .await;

        let mut ends = 0;
        for _ in 0..3000 {
            if let SinkResult::End = sink.get_buffer(false).await {
                ends += 1;
                if ends > 1 {
                    break;
                }
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(ends, 1);
        playlist.shutdown().await;
    }

    #[tokio::test]
    async fn backpressure_plateaus_at_min_queue_bytes() {
        let playlist = Playlist::with_config(EngineConfig {
            noop_delay: std::time::Duration::from_millis(1),
            ..EngineConfig::default()
        });
        let sink = Sink::with_buffer_frames(fmt(), 64);
        sink.attach(&playlist).await;
        playlist
            .insert(Box::new(MockStream::new(44_100, 30.0)), 1.0, None)
            .await;

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let size_at_first_check = sink.audioq_size();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let size_at_second_check = sink.audioq_size();

        assert!(size_at_first_check >= sink.buffer_size() * fmt().bytes_per_frame());
        assert!(size_at_second_check < size_at_first_check * 2);
        playlist.shutdown().await;
    }
}
