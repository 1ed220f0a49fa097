//! End-to-end tests against the playback engine's public API, using
//! in-memory `MockStream`s instead of real FLAC files.

use std::time::Duration;

use pmoplayback::config::EngineConfig;
use pmoplayback::decoded_stream::tests::MockStream;
use pmoplayback::{AudioFormat, ChannelLayout, Playlist, SampleFmt, Sink, SinkResult};

fn fast_config() -> EngineConfig {
    EngineConfig {
        noop_delay: Duration::from_millis(1),
        ..EngineConfig::default()
    }
}

async fn drain_until_end(sink: &Sink, budget: usize) -> (usize, bool) {
    let mut bytes = 0;
    for _ in 0..budget {
        match sink.get_buffer(false).await {
            SinkResult::Ok(buffer) => bytes += buffer.size_bytes(),
            SinkResult::End => return (bytes, true),
            SinkResult::None => tokio::task::yield_now().await,
        }
    }
    (bytes, false)
}

#[tokio::test]
async fn single_sink_single_file_yields_expected_byte_count() {
    let playlist = Playlist::with_config(fast_config());
    let sink = Sink::create(AudioFormat::new(44_100, ChannelLayout::Stereo, SampleFmt::I16));
    sink.attach(&playlist).await;

    playlist.insert(Box::new(MockStream::new(44_100, 10.0)), 1.0, None).await;
    playlist.play();

    let (bytes, ended) = drain_until_end(&sink, 20_000).await;
    assert!(ended, "playlist should reach end of queue");
    // 10s x 44100 x 2 channels x 2 bytes = 1_764_000, allow slack for one partial chunk.
    assert!((bytes as i64 - 1_764_000i64).unsigned_abs() < 4096 * 4, "bytes = {bytes}");

    playlist.shutdown().await;
}

#[tokio::test]
async fn two_sinks_with_different_formats_both_get_fed() {
    let playlist = Playlist::with_config(fast_config());
    let sink_a = Sink::create(AudioFormat::new(44_100, ChannelLayout::Stereo, SampleFmt::I16));
    let sink_b = Sink::create(AudioFormat::new(48_000, ChannelLayout::Mono, SampleFmt::F32));
    sink_a.attach(&playlist).await;
    sink_b.attach(&playlist).await;

    playlist.insert(Box::new(MockStream::new(44_100, 1.0)), 1.0, None).await;
    playlist.play();

    let (bytes_a, ended_a) = drain_until_end(&sink_a, 20_000).await;
    let (bytes_b, ended_b) = drain_until_end(&sink_b, 20_000).await;

    assert!(ended_a && ended_b);
    assert!(bytes_a > 0);
    assert!(bytes_b > 0);

    playlist.shutdown().await;
}

#[tokio::test]
async fn removing_the_playing_item_advances_decode_head_and_purges_its_buffers() {
    let playlist = Playlist::with_config(fast_config());
    let sink = Sink::create(AudioFormat::new(44_100, ChannelLayout::Stereo, SampleFmt::I16));
    sink.attach(&playlist).await;
    playlist.pause();

    let x = playlist.insert(Box::new(MockStream::new(44_100, 5.0)), 1.0, None).await;
    let y = playlist.insert(Box::new(MockStream::new(44_100, 5.0)), 1.0, None).await;

    playlist.seek(&x, 0.0).await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    playlist.remove(&x).await;

    let position = playlist.position().await;
    assert!(position.is_some());
    let (item, _) = position.unwrap();
    assert!(item.is(&y));

    playlist.shutdown().await;
}

#[tokio::test]
async fn seek_with_flush_discards_queued_buffers() {
    let playlist = Playlist::with_config(fast_config());
    let sink = Sink::create(AudioFormat::new(44_100, ChannelLayout::Stereo, SampleFmt::I16));
    sink.attach(&playlist).await;

    let item = playlist.insert(Box::new(MockStream::new(44_100, 10.0)), 1.0, None).await;
    playlist.play();
    tokio::time::sleep(Duration::from_millis(20)).await;

    playlist.seek(&item, 5.0).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    if let SinkResult::Ok(buffer) = sink.get_buffer(false).await {
        assert!(buffer.pos() >= 4.9, "pos = {}", buffer.pos());
    }

    playlist.shutdown().await;
}

#[tokio::test]
async fn backpressure_keeps_queue_near_threshold() {
    let playlist = Playlist::with_config(fast_config());
    let format = AudioFormat::new(44_100, ChannelLayout::Stereo, SampleFmt::I16);
    let sink = Sink::with_buffer_frames(format, 64);
    sink.attach(&playlist).await;

    playlist.insert(Box::new(MockStream::new(44_100, 30.0)), 1.0, None).await;
    playlist.play();

    tokio::time::sleep(Duration::from_millis(60)).await;
    let first = sink.audioq_size();
    tokio::time::sleep(Duration::from_millis(60)).await;
    let second = sink.audioq_size();

    assert!(first >= sink.buffer_size() * format.bytes_per_frame());
    assert!(second < first * 2, "queue kept growing: {first} -> {second}");

    playlist.shutdown().await;
}

#[tokio::test]
async fn volume_change_triggers_rebuild_without_dropping_frames() {
    let playlist = Playlist::with_config(fast_config());
    let sink = Sink::create(AudioFormat::new(44_100, ChannelLayout::Stereo, SampleFmt::I16));
    sink.attach(&playlist).await;

    playlist.insert(Box::new(MockStream::new(44_100, 2.0)), 1.0, None).await;
    playlist.play();
    tokio::time::sleep(Duration::from_millis(20)).await;

    playlist.set_volume(0.5).await;

    let mut last_pos = -1.0;
    for _ in 0..5000 {
        match sink.get_buffer(false).await {
            SinkResult::Ok(buffer) => {
                assert!(buffer.pos() >= last_pos);
                last_pos = buffer.pos();
            }
            SinkResult::End => break,
            SinkResult::None => tokio::task::yield_now().await,
        }
    }

    playlist.shutdown().await;
}
