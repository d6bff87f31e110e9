//! Compositor engine backed by the system `ffmpeg`/`ffprobe` binaries.
//!
//! One export becomes a single ffmpeg invocation: per-clip scaling, the
//! concat filter for sequential insertion, `drawtext`/`overlay` for the
//! timed fragments and the watermark. Progress is read from ffmpeg's
//! `-progress` pipe and cancellation kills the child process.

use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use image::RgbImage;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::composition::types::{AssetInfo, ExportRequest, VideoStreamInfo};
use crate::engine::{CompositorEngine, ExportTask, TaskStatus};
use crate::error::{ExportError, Result};
use crate::overlay::layout::OverlayContent;

/// Engine driving the external ffmpeg binaries
#[derive(Debug, Clone, Default)]
pub struct FfmpegEngine;

impl FfmpegEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn check_ffmpeg_available() -> bool {
        std::process::Command::new("ffmpeg")
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

// ---- probing ----------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
    #[serde(default)]
    side_data_list: Vec<ProbeSideData>,
    tags: Option<ProbeTags>,
}

#[derive(Debug, Deserialize)]
struct ProbeSideData {
    rotation: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ProbeTags {
    rotate: Option<String>,
}

impl ProbeStream {
    fn rotation(&self) -> i32 {
        if let Some(rotation) = self.side_data_list.iter().find_map(|d| d.rotation) {
            // Display matrix rotations are counter-clockwise
            return (-rotation as i32).rem_euclid(360);
        }
        self.tags
            .as_ref()
            .and_then(|t| t.rotate.as_deref())
            .and_then(|r| r.parse::<i32>().ok())
            .map(|r| r.rem_euclid(360))
            .unwrap_or(0)
    }
}

fn parse_probe(path: &Path, raw: &[u8]) -> Result<AssetInfo> {
    let invalid = |reason: String| ExportError::InvalidAsset {
        path: path.display().to_string(),
        reason,
    };

    let probe: ProbeOutput = serde_json::from_slice(raw)
        .map_err(|e| invalid(format!("unreadable probe output: {}", e)))?;

    let duration = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or_else(|| probe.streams.iter().find_map(|s| s.duration.as_deref()))
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .and_then(|s| {
            Some(VideoStreamInfo {
                width: s.width?,
                height: s.height?,
                rotation: s.rotation(),
            })
        });

    let has_audio = probe
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    Ok(AssetInfo { duration, video, has_audio })
}

// ---- filter graph assembly --------------------------------------------

/// Map a 0-100 quality knob onto ffmpeg's inverted CRF scale. Out-of-range
/// input pins to 100 instead of underflowing.
fn quality_to_crf(quality: u8) -> u8 {
    let quality = quality.min(100);
    51 - ((quality as f32 / 100.0) * 51.0) as u8
}

/// Escape a string for use inside a '…'-quoted drawtext text= value.
///
/// Inside filtergraph quotes a backslash stays literal, so a quote cannot be
/// backslash-escaped; it has to close the quoted section, emit an escaped
/// quote and reopen it.
fn escape_drawtext(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\'' => escaped.push_str("'\\''"),
            '\\' | ':' | '%' | ',' | '[' | ']' => {
                escaped.push('\\');
                escaped.push(c);
            }
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Scroll position expression: enters at the right frame edge at `begin` and
/// travels the frame width plus the fragment width over `duration` seconds
fn scroll_x(begin: f64, duration: f64, fragment_width: f32, x_offset: f32) -> String {
    format!(
        "W-(t-{begin:.4})*(W+{width:.1})/{duration:.4}+{offset:.1}",
        begin = begin,
        width = fragment_width,
        duration = duration.max(f64::EPSILON),
        offset = x_offset,
    )
}

/// Build the complete -filter_complex graph for a request
fn build_filter(request: &ExportRequest) -> String {
    let mut filter = String::new();
    let n = request.composition.segments.len();
    let with_audio = request.composition.all_audio();
    let (width, height) = (request.render_size.width, request.render_size.height);

    // Per-clip scale into the render frame, aspect padded
    for i in 0..n {
        filter.push_str(&format!(
            "[{i}:v]scale={w}:{h}:force_original_aspect_ratio=decrease,\
             pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1,fps={fps}[v{i}];",
            i = i,
            w = width,
            h = height,
            fps = request.fps,
        ));
    }

    // Sequential concatenation; the per-layer opacity ramp at each clip's end
    // is realized as concat's hard cut between sources
    for i in 0..n {
        filter.push_str(&format!("[v{}]", i));
        if with_audio {
            filter.push_str(&format!("[{}:a]", i));
        }
    }
    filter.push_str(&format!(
        "concat=n={}:v=1:a={}[vcat]",
        n,
        if with_audio { 1 } else { 0 }
    ));
    if with_audio {
        filter.push_str("[acat]");
    }
    filter.push(';');

    let mut current = "vcat".to_string();
    let mut label = 0usize;
    fn next(filter: &mut String, current: &mut String, label: &mut usize, stage: String) {
        let out = format!("ov{}", label);
        *label += 1;
        filter.push_str(&format!("[{}]{}[{}];", current, stage, out));
        *current = out;
    }

    // Scrolling fragments, one drawtext/overlay per run
    for element in &request.overlays {
        let end = element.begin + element.duration;
        for run in &element.runs {
            let x = scroll_x(element.begin, element.duration, element.width, run.x_offset);
            match &run.content {
                OverlayContent::Text(text) => {
                    next(&mut filter, &mut current, &mut label, format!(
                        "drawtext=text='{text}':fontsize={size:.0}:fontcolor=white:\
                         borderw=2:bordercolor=black@0.5:x='{x}':y={y:.1}:\
                         enable='between(t,{begin:.4},{end:.4})'",
                        text = escape_drawtext(text),
                        size = element.font_size,
                        x = x,
                        y = element.y,
                        begin = element.begin,
                        end = end,
                    ));
                }
                OverlayContent::Image { path, width, height } => {
                    let source = format!("em{}", label);
                    filter.push_str(&format!(
                        "movie='{path}',scale={w:.0}:{h:.0}[{source}];",
                        path = escape_drawtext(path),
                        w = width,
                        h = height,
                        source = source,
                    ));
                    let out = format!("ov{}", label);
                    label += 1;
                    filter.push_str(&format!(
                        "[{current}][{source}]overlay=x='{x}':y={y:.1}:\
                         enable='between(t,{begin:.4},{end:.4})'[{out}];",
                        current = current,
                        source = source,
                        x = x,
                        y = element.y,
                        begin = element.begin,
                        end = end,
                        out = out,
                    ));
                    current = out;
                }
            }
        }
    }

    // Static corner watermark over a translucent box
    let wm = &request.watermark;
    next(&mut filter, &mut current, &mut label, format!(
        "drawbox=x=iw-{w:.0}:y=0:w={w:.0}:h={h:.0}:color=black@{alpha}:t=fill",
        w = wm.width,
        h = wm.height,
        alpha = wm.background_alpha,
    ));
    next(&mut filter, &mut current, &mut label, format!(
        "drawtext=text='{text}':fontsize={size:.0}:fontcolor=white:\
         x=W-{w:.0}+({w:.0}-text_w)/2:y=({h:.0}-text_h)/2",
        text = escape_drawtext(&wm.text),
        size = wm.font_size,
        w = wm.width,
        h = wm.height,
    ));

    filter.push_str(&format!("[{}]null[vout]", current));
    filter
}

/// Build the full ffmpeg argument list for a request
fn build_args(request: &ExportRequest) -> Vec<String> {
    let mut args = Vec::new();

    for segment in &request.composition.segments {
        args.push("-i".to_string());
        args.push(segment.source.display().to_string());
    }

    args.push("-filter_complex".to_string());
    args.push(build_filter(request));

    args.push("-map".to_string());
    args.push("[vout]".to_string());
    if request.composition.all_audio() {
        args.push("-map".to_string());
        args.push("[acat]".to_string());
        args.push("-c:a".to_string());
        args.push("aac".to_string());
    }

    args.extend([
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        "slow".to_string(),
        "-crf".to_string(),
        quality_to_crf(request.quality).to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-r".to_string(),
        request.fps.to_string(),
        // Streaming-friendly layout for upload targets
        "-movflags".to_string(),
        "+faststart".to_string(),
        "-t".to_string(),
        format!("{:.4}", request.instruction.time_range.1),
        "-progress".to_string(),
        "pipe:1".to_string(),
        "-nostats".to_string(),
        "-v".to_string(),
        "error".to_string(),
        "-y".to_string(),
    ]);
    args.push(request.output.display().to_string());

    args
}

// ---- export task -------------------------------------------------------

struct TaskShared {
    status: Mutex<TaskStatus>,
    progress: AtomicU32,
    cancelled: AtomicBool,
    child: Mutex<Option<Child>>,
}

/// Handle to one running ffmpeg export
pub struct FfmpegTask {
    shared: Arc<TaskShared>,
}

impl ExportTask for FfmpegTask {
    fn status(&self) -> TaskStatus {
        self.shared.status.lock().expect("status lock").clone()
    }

    fn progress(&self) -> f32 {
        f32::from_bits(self.shared.progress.load(Ordering::Relaxed))
    }

    fn cancel(&self) {
        self.shared.cancelled.store(true, Ordering::SeqCst);
        if let Ok(mut child) = self.shared.child.lock() {
            if let Some(child) = child.as_mut() {
                let _ = child.start_kill();
            }
        }
    }
}

async fn monitor_task(
    shared: Arc<TaskShared>,
    stdout: Option<tokio::process::ChildStdout>,
    stderr: Option<tokio::process::ChildStderr>,
    total_duration: f64,
) {
    // Collect stderr off to the side so the pipe never backs up
    let stderr_task = tokio::spawn(async move {
        let mut collected = String::new();
        if let Some(mut stderr) = stderr {
            let _ = stderr.read_to_string(&mut collected).await;
        }
        collected
    });

    if let Some(stdout) = stdout {
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(raw) = line.strip_prefix("out_time_us=") {
                if let Ok(us) = raw.trim().parse::<i64>() {
                    let fraction = if total_duration > 0.0 {
                        ((us as f64 / 1_000_000.0) / total_duration).clamp(0.0, 1.0) as f32
                    } else {
                        0.0
                    };
                    shared.progress.store(fraction.to_bits(), Ordering::Relaxed);
                    let mut status = shared.status.lock().expect("status lock");
                    if status.is_transient() {
                        *status = TaskStatus::Exporting;
                    }
                }
            }
        }
    }

    let child = shared.child.lock().expect("child lock").take();
    let exit = match child {
        Some(mut child) => child.wait().await.ok(),
        None => None,
    };
    let stderr_tail = stderr_task.await.unwrap_or_default();

    let final_status = if shared.cancelled.load(Ordering::SeqCst) {
        TaskStatus::Cancelled
    } else {
        match exit {
            Some(status) if status.success() => {
                shared.progress.store(1.0f32.to_bits(), Ordering::Relaxed);
                TaskStatus::Completed
            }
            Some(status) => TaskStatus::Failed(format!(
                "ffmpeg exited with {}: {}",
                status,
                stderr_tail.trim()
            )),
            None => TaskStatus::Unknown,
        }
    };

    debug!("ffmpeg task finished: {:?}", final_status);
    *shared.status.lock().expect("status lock") = final_status;
}

impl CompositorEngine for FfmpegEngine {
    type Task = FfmpegTask;

    async fn probe(&self, path: &Path) -> Result<AssetInfo> {
        let output = Command::new("ffprobe")
            .args([
                "-v", "error",
                "-print_format", "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .output()
            .await
            .map_err(|e| ExportError::InvalidAsset {
                path: path.display().to_string(),
                reason: format!("ffprobe could not run: {}", e),
            })?;

        if !output.status.success() {
            return Err(ExportError::InvalidAsset {
                path: path.display().to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }

        parse_probe(path, &output.stdout)
    }

    async fn submit(&self, request: ExportRequest) -> Result<Self::Task> {
        let args = build_args(&request);
        debug!("ffmpeg {}", args.join(" "));

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExportError::SessionCreationFailed {
                reason: format!("could not spawn ffmpeg: {}", e),
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let shared = Arc::new(TaskShared {
            status: Mutex::new(TaskStatus::Waiting),
            progress: AtomicU32::new(0.0f32.to_bits()),
            cancelled: AtomicBool::new(false),
            child: Mutex::new(Some(child)),
        });

        tokio::spawn(monitor_task(
            shared.clone(),
            stdout,
            stderr,
            request.composition.duration,
        ));

        Ok(FfmpegTask { shared })
    }

    async fn extract_frame(&self, path: &Path, at_seconds: f64) -> Result<RgbImage> {
        let failed = |reason: String| ExportError::ThumbnailExtractionFailed { reason };

        // ffmpeg applies the container's rotation metadata on decode, so the
        // frame comes out in display orientation
        let output = Command::new("ffmpeg")
            .args(["-ss", &format!("{:.6}", at_seconds), "-i"])
            .arg(path)
            .args([
                "-frames:v", "1",
                "-f", "image2pipe",
                "-c:v", "png",
                "-v", "error",
                "pipe:1",
            ])
            .output()
            .await
            .map_err(|e| failed(format!("ffmpeg could not run: {}", e)))?;

        if !output.status.success() {
            return Err(failed(String::from_utf8_lossy(&output.stderr).trim().to_string()).into());
        }

        if output.stdout.is_empty() {
            warn!("no frame decoded at {:.3}s from {:?}", at_seconds, path);
            return Err(failed(format!("no frame at {:.3}s", at_seconds)).into());
        }

        let image = image::load_from_memory(&output.stdout)
            .map_err(|e| failed(format!("frame decode failed: {}", e)))?;
        Ok(image.to_rgb8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::types::{Composition, CompositionInstruction, RenderSize};
    use crate::overlay::layout::{OverlayElement, OverlayRun, Watermark};
    use std::path::PathBuf;

    fn request(with_audio: bool) -> ExportRequest {
        let mut composition = Composition::default();
        composition.append(PathBuf::from("a.mp4"), 10.0, with_audio);
        composition.append(PathBuf::from("b.mp4"), 5.0, with_audio);

        ExportRequest {
            instruction: CompositionInstruction {
                time_range: (0.0, composition.duration),
                layers: Vec::new(),
            },
            composition,
            render_size: RenderSize { width: 800, height: 450 },
            overlays: vec![OverlayElement {
                runs: vec![OverlayRun {
                    content: OverlayContent::Text("hi there".to_string()),
                    x_offset: 0.0,
                    width: 120.0,
                }],
                begin: 2.0,
                duration: 6.0,
                y: 40.0,
                width: 120.0,
                font_size: 28.0,
            }],
            watermark: Watermark {
                text: "video-merge".to_string(),
                width: 150.0,
                height: 56.0,
                font_size: 23.0,
                background_alpha: 0.25,
            },
            output: PathBuf::from("/tmp/out.mov"),
            fps: 30.0,
            quality: 95,
        }
    }

    #[test]
    fn test_quality_to_crf_bounds() {
        assert_eq!(quality_to_crf(100), 0);
        assert_eq!(quality_to_crf(0), 51);
        assert!(quality_to_crf(95) < quality_to_crf(50));
        // Unvalidated inputs above 100 pin instead of underflowing
        assert_eq!(quality_to_crf(255), 0);
    }

    #[test]
    fn test_escape_drawtext() {
        assert_eq!(escape_drawtext("a:b"), "a\\:b");
        assert_eq!(escape_drawtext("50%"), "50\\%");
        // Quotes leave the quoted section rather than backslash-escaping
        assert_eq!(escape_drawtext("it's"), "it'\\''s");
    }

    #[test]
    fn test_filter_keeps_apostrophe_text_balanced() {
        let mut req = request(true);
        req.overlays[0].runs[0].content = OverlayContent::Text("it's fine".to_string());

        let filter = build_filter(&req);
        assert!(filter.contains(r#"text='it'\''s fine'"#));
        // A backslash-quote inside the quoted value would truncate the graph
        assert!(!filter.contains(r#"\'s"#));
    }

    #[test]
    fn test_filter_concats_all_clips() {
        let filter = build_filter(&request(true));
        assert!(filter.contains("[0:v]scale=800:450"));
        assert!(filter.contains("[1:v]scale=800:450"));
        assert!(filter.contains("concat=n=2:v=1:a=1"));
    }

    #[test]
    fn test_filter_video_only_without_full_audio() {
        let filter = build_filter(&request(false));
        assert!(filter.contains("concat=n=2:v=1:a=0"));
        assert!(!filter.contains("[acat]"));
    }

    #[test]
    fn test_filter_includes_overlay_window_and_watermark() {
        let filter = build_filter(&request(true));
        assert!(filter.contains("between(t,2.0000,8.0000)"));
        assert!(filter.contains("drawbox=x=iw-150"));
        assert!(filter.contains("video-merge"));
    }

    #[test]
    fn test_args_map_audio_only_when_present() {
        let args = build_args(&request(true));
        assert!(args.iter().any(|a| a == "[acat]"));

        let args = build_args(&request(false));
        assert!(!args.iter().any(|a| a == "[acat]"));
        assert!(args.iter().any(|a| a == "+faststart"));
        assert_eq!(args.last().unwrap(), "/tmp/out.mov");
    }

    #[test]
    fn test_scroll_reaches_left_edge() {
        // At t = begin + duration the expression evaluates to -width
        let expr = scroll_x(0.0, 5.0, 100.0, 0.0);
        assert!(expr.contains("(W+100.0)/5.0000"));
    }

    #[test]
    fn test_parse_probe_rotated_stream() {
        let raw = br#"{
            "streams": [
                {"codec_type": "video", "width": 1920, "height": 1080,
                 "side_data_list": [{"rotation": -90.0}]},
                {"codec_type": "audio"}
            ],
            "format": {"duration": "20.5"}
        }"#;
        let info = parse_probe(Path::new("x.mp4"), raw).unwrap();
        assert_eq!(info.duration, 20.5);
        assert!(info.has_audio);
        let video = info.video.unwrap();
        assert_eq!(video.rotation, 90);
        assert_eq!(video.display_size(), (1080, 1920));
    }

    #[test]
    fn test_parse_probe_no_video() {
        let raw = br#"{"streams": [{"codec_type": "audio"}], "format": {"duration": "3.0"}}"#;
        let info = parse_probe(Path::new("x.m4a"), raw).unwrap();
        assert!(info.video.is_none());
        assert!(info.has_audio);
    }
}
