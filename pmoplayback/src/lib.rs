#![doc = r#"
pmoplayback - concurrent decode-and-distribute playback engine core

Continuously decodes a playlist of audio files and delivers decoded,
format-converted, volume-adjusted audio as reference-counted [`Buffer`]s to
one or more independent [`Sink`]s. Each sink declares its desired output
[`AudioFormat`]; a single decoded stream is multiplexed into per-format
branches by the [`FilterGraph`] and fanned out to every sink sharing a format.

# Architecture

```text
File -> packet -> decoder -> input frame -> [volume] -> [split(N)] ->
    per-format (aformat -> sink buffer) -> Buffer -> each attached Sink's FIFO
```

One [`Playlist`] owns exactly one decoder task (a `tokio::task`, not an OS
thread) that drives this pipeline; external callers mutate the playlist and
attach/detach sinks concurrently while it runs.

# Example

```no_run
use pmoplayback::{FlacFileStream, Playlist, Sink};
use pmoplayback::{AudioFormat, ChannelLayout, SampleFmt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let playlist = Playlist::create();

    let sink = Sink::create(AudioFormat::new(44_100, ChannelLayout::Stereo, SampleFmt::I16));
    sink.attach(&playlist).await;

    let encoded = std::fs::read("track.flac")?;
    let stream = FlacFileStream::open(encoded).await?;
    playlist.insert(Box::new(stream), 1.0, None).await;

    playlist.play();
    loop {
        match sink.get_buffer(true).await {
            pmoplayback::SinkResult::Ok(_buffer) => {}
            pmoplayback::SinkResult::End => break,
            pmoplayback::SinkResult::None => break,
        }
    }

    playlist.shutdown().await;
    Ok(())
}
```
"#]

mod audio_chunk;
pub mod bit_depth;
pub mod buffer;
pub mod config;
pub mod decoded_stream;
mod decoder;
pub mod dsp;
pub mod error;
pub mod filter_graph;
pub mod format;
pub mod playlist;
pub mod playlist_item;
mod sample_types;
pub mod sink;
pub mod sink_map;

pub use audio_chunk::{
    gain_db_from_linear, gain_linear_from_db, AudioChunk, AudioChunkData, AudioFloatChunk,
    AudioIntegerChunk,
};
pub use bit_depth::{Bit16, Bit24, Bit32, Bit8, BitDepth};
pub use buffer::{buffer_ref, buffer_unref, Buffer};
pub use config::EngineConfig;
pub use decoded_stream::{DecodedStream, FlacFileStream, NativeFormat};
pub use error::{EngineError, Result};
pub use filter_graph::FilterGraph;
pub use format::{AudioFormat, ChannelLayout, SampleFmt};
pub use playlist::Playlist;
pub use playlist_item::PlaylistItemHandle;
pub use sample_types::{Sample, I24};
pub use sink::{Sink, SinkResult};
pub use sink_map::SinkMap;
