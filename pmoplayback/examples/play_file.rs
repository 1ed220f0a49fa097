//! Decodes a FLAC file and drains it through a single sink, reporting the
//! total number of bytes produced.
//!
//! Usage:
//!   cargo run --example play_file -- <file.flac>

use std::env;

use pmoplayback::{AudioFormat, ChannelLayout, FlacFileStream, Playlist, SampleFmt, Sink, SinkResult};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let path = env::args().nth(1).expect("Usage: play_file <file.flac>");
    let encoded = std::fs::read(&path)?;

    let playlist = Playlist::create();
    let sink = Sink::create(AudioFormat::new(44_100, ChannelLayout::Stereo, SampleFmt::I16));
    sink.attach(&playlist).await;

    let stream = FlacFileStream::open(encoded).await?;
    playlist.insert(Box::new(stream), 1.0, None).await;
    playlist.play();

    let mut total_bytes = 0usize;
    loop {
        match sink.get_buffer(true).await {
            SinkResult::Ok(buffer) => total_bytes += buffer.size_bytes(),
            SinkResult::End | SinkResult::None => break,
        }
    }

    println!("decoded {total_bytes} bytes");
    playlist.shutdown().await;
    Ok(())
}
