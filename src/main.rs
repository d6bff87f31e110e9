use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use serde::Deserialize;
use tracing::{info, warn, Level};
use tracing_subscriber;

use video_merge::{
    composition::SourceClip,
    config::Config,
    engine::FfmpegEngine,
    export::ExportOrchestrator,
    overlay::{Emoji, OverlayFragment},
};

#[derive(Parser)]
#[command(
    name = "video-merge",
    version,
    about = "Merge video clips with scrolling comment overlays",
    long_about = "Video-Merge concatenates source clips into one scaled output, overlays timed scrolling comments and a corner watermark, and writes the finished video together with a JPEG preview of its first frame."
)]
struct Cli {
    /// Source video file, repeat for sequential concatenation
    #[arg(short, long = "video", required = true)]
    videos: Vec<PathBuf>,

    /// Comment overlay file (TOML, see `video-merge --help` for the shape)
    #[arg(short = 'm', long)]
    comments: Option<PathBuf>,

    /// Output video file path
    #[arg(short, long)]
    output: PathBuf,

    /// Where to write the JPEG preview (optional)
    #[arg(short, long)]
    thumbnail: Option<PathBuf>,

    /// Configuration file (optional)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

/// On-disk shape of the comments file
#[derive(Debug, Deserialize)]
struct CommentsFile {
    #[serde(default)]
    emoji: Vec<Emoji>,

    #[serde(default)]
    fragment: Vec<FragmentEntry>,
}

#[derive(Debug, Deserialize)]
struct FragmentEntry {
    text: String,

    /// Appearance time, seconds from output start
    time: f64,

    /// Vertical slot in display coordinates
    #[serde(default)]
    place: f64,
}

fn load_fragments(path: &PathBuf) -> Result<Vec<OverlayFragment>> {
    let content = std::fs::read_to_string(path)?;
    let file: CommentsFile = toml::from_str(&content)?;

    Ok(file
        .fragment
        .iter()
        .map(|entry| OverlayFragment::from_message(&entry.text, &file.emoji, entry.time, entry.place))
        .collect())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .init();

    info!("Starting Video-Merge v{}", env!("CARGO_PKG_VERSION"));

    if !FfmpegEngine::check_ffmpeg_available() {
        anyhow::bail!("ffmpeg/ffprobe not found on PATH");
    }

    // Load configuration
    let config = match cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(&config_path)?
        }
        None => Config::default(),
    };
    config.validate()?;

    let fragments = match &cli.comments {
        Some(path) => {
            let fragments = load_fragments(path)?;
            info!("Loaded {} comment fragments from {:?}", fragments.len(), path);
            fragments
        }
        None => Vec::new(),
    };

    let clips: Vec<SourceClip> = cli.videos.iter().map(SourceClip::new).collect();
    info!("Merging {} clips -> {:?}", clips.len(), cli.output);

    let orchestrator = ExportOrchestrator::new(FfmpegEngine::new(), clips, fragments, config);

    // The orchestrator reports through callbacks; bridge completion onto a
    // channel so main can await it
    let (tx, rx) = tokio::sync::oneshot::channel();
    let mut last_logged = -1i32;
    orchestrator.start(
        move |fraction| {
            // Log every 10% step, not every poll
            let decile = (fraction * 10.0) as i32;
            if decile > last_logged {
                last_logged = decile;
                info!("export progress: {:.0}%", fraction * 100.0);
            }
        },
        move |result| {
            let _ = tx.send(result);
        },
    );

    let output = rx.await??;

    tokio::fs::write(&cli.output, &output.video).await?;
    info!("Wrote {} bytes to {:?}", output.video.len(), cli.output);

    match cli.thumbnail {
        Some(path) => {
            tokio::fs::write(&path, &output.thumbnail).await?;
            info!("Wrote preview ({} bytes) to {:?}", output.thumbnail.len(), path);
        }
        None => warn!("No --thumbnail path given, discarding preview"),
    }

    Ok(())
}
