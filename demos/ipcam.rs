//! Supervised camera transcoding example
//!
//! Run with: cargo run --example ipcam RTSP_URL [VIDEO_CODEC]
//!
//! Examples:
//!   cargo run --example ipcam rtsp://192.168.1.20:554/stream1
//!   cargo run --example ipcam rtsp://192.168.1.20:554/stream1 libx264
//!
//! Starts ffmpeg under the supervisor, then:
//! - prints the HLS playlist once the first fragment is cached
//! - follows the stream as an MSE viewer and a JPEG viewer
//! - logs cache and session statistics every 5 seconds
//!
//! Set `RUST_LOG=ipcam_live=debug` to see ffmpeg's own log lines.

use std::sync::Arc;
use std::time::Duration;

use ipcam_live::{
    FfmpegTranscoder, FragmentCache, FrameRelay, HlsEndpoint, JpegViewer, MseCommand, MseViewer,
    RestartPolicy, Supervisor, TranscodeParams, ViewerConfig, ViewerMessage,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ipcam_live=info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let url = args.next().unwrap_or_default();
    let video_codec = args.next().unwrap_or_else(|| "copy".to_string());

    let params = TranscodeParams::new(url)
        .rtsp_transport("tcp")
        .log_level("error")
        .video_codec(video_codec)
        .frag_duration("1000000");

    let cache = Arc::new(FragmentCache::new());
    let relay = Arc::new(FrameRelay::new());
    let supervisor = Supervisor::new(FfmpegTranscoder::new(), Arc::clone(&cache), Arc::clone(&relay));

    supervisor
        .start_params(&params, RestartPolicy::default().kill_after_stall(Duration::from_secs(20)))
        .await?;

    let hls = HlsEndpoint::new(Arc::clone(&cache), supervisor.watch());
    tokio::spawn(async move {
        match hls.playlist().await {
            Ok(playlist) => println!("{}", String::from_utf8_lossy(&playlist.body)),
            Err(e) => println!("Playlist unavailable: {} ({})", e, e.status()),
        }
    });

    let config = ViewerConfig::default();
    let (mse, mut mse_outbox) = MseViewer::join(Arc::clone(&cache), &supervisor.watch(), &config).await?;
    for command in [MseCommand::Mime, MseCommand::Initialization, MseCommand::Segments] {
        mse.command(command).await;
    }
    tokio::spawn(async move {
        while let Some(message) = mse_outbox.recv().await {
            match message {
                ViewerMessage::Mime(mime) => println!("MSE mime: {}", mime),
                ViewerMessage::Initialization(data) => println!("MSE init: {} bytes", data.len()),
                ViewerMessage::Segment { sequence, data } => {
                    println!("MSE segment {}: {} bytes", sequence, data.len())
                }
                ViewerMessage::Jpeg(_) => {}
            }
        }
    });

    let (_jpeg, mut jpeg_outbox) = JpegViewer::join(Arc::clone(&relay), &supervisor.watch(), &config).await?;
    tokio::spawn(async move {
        let mut frames = 0u64;
        while let Some(ViewerMessage::Jpeg(frame)) = jpeg_outbox.recv().await {
            frames += 1;
            if frames % 50 == 0 {
                println!("JPEG frames: {} (last {} bytes)", frames, frame.len());
            }
        }
    });

    let mut ticker = tokio::time::interval(Duration::from_secs(5));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let stats = cache.stats().await;
                let info = supervisor.info().await;
                tracing::info!(
                    state = ?stats.state,
                    fragments = stats.fragment_count,
                    bytes = stats.window_size_bytes,
                    total = stats.fragments_total,
                    subscribers = stats.subscriber_count,
                    restarts = info.as_ref().map(|i| i.restarts),
                    pid = ?info.as_ref().and_then(|i| i.pid),
                    "Stats"
                );
                if !supervisor.is_running() {
                    println!("Transcoder gave up");
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("Stopping");
                break;
            }
        }
    }

    supervisor.stop().await;
    Ok(())
}
