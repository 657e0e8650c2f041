use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use mirrorcast::media::h264;
use mirrorcast::{Server, ServerConfig};

#[derive(Parser)]
#[command(
    name = "mirrorcast-server",
    about = "RTSP/TCP mirroring server for live H.264 streams"
)]
struct Args {
    /// Bind address (host:port)
    #[arg(long, short, default_value = "0.0.0.0:8554")]
    bind: String,

    /// SDP session name
    #[arg(long, default_value = "Screen")]
    session_name: String,

    /// Raw Annex-B H.264 file looped as the live source
    #[arg(long, short)]
    input: Option<PathBuf>,

    /// Frame pacing for --input, in frames per second
    #[arg(long, default_value_t = 30)]
    fps: u32,
}

fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let config = ServerConfig {
        session_name: args.session_name,
        ..ServerConfig::default()
    };
    let mut server = Server::with_config(&args.bind, config);

    if let Err(e) = server.start() {
        eprintln!("Failed to start server: {}", e);
        std::process::exit(1);
    }

    let server = Arc::new(server);

    if let Some(path) = &args.input {
        match std::fs::read(path) {
            Ok(data) => {
                let feeder = server.clone();
                let fps = args.fps.max(1);
                thread::spawn(move || stream_file(&feeder, &data, fps));
            }
            Err(e) => {
                eprintln!("Failed to read {}: {}", path.display(), e);
                server.stop();
                std::process::exit(1);
            }
        }
    }

    println!(
        "RTSP server on rtsp://{}/stream — press Enter to stop",
        args.bind
    );
    let mut line = String::new();
    let _ = io::stdin().read_line(&mut line);

    server.stop();
}

/// Replay an Annex-B file as if it were a live encoder.
///
/// The first SPS/PPS in the bitstream seed the parameter-set cache;
/// every other NAL unit is delivered as one frame, paced at `fps`. The
/// file loops until the process exits.
fn stream_file(server: &Server, data: &[u8], fps: u32) {
    let units = h264::split_units(data);
    if units.is_empty() {
        tracing::warn!("input contains no Annex-B start codes, nothing to stream");
        return;
    }

    let sps = units
        .iter()
        .find(|u| h264::unit_type(u) == Some(h264::NAL_SPS));
    let pps = units
        .iter()
        .find(|u| h264::unit_type(u) == Some(h264::NAL_PPS));
    match (sps, pps) {
        (Some(sps), Some(pps)) => server.on_parameter_sets(sps, pps),
        _ => tracing::warn!("input carries no SPS/PPS, DESCRIBE will degrade"),
    }

    let interval = Duration::from_secs(1) / fps;
    tracing::info!(units = units.len(), fps, "streaming input file");

    loop {
        for unit in &units {
            let nal_type = h264::unit_type(unit);
            if matches!(nal_type, Some(h264::NAL_SPS) | Some(h264::NAL_PPS)) {
                continue;
            }
            server.on_encoded_frame(unit, nal_type == Some(h264::NAL_IDR));
            thread::sleep(interval);
        }
    }
}
