//! Build phase for one export job.
//!
//! Probes every source clip, assembles the sequential composition and its
//! per-clip layer instructions, derives the render size from the primary
//! clip, lays out the timed overlays, and picks a fresh output location.
//! Any failure aborts the whole build; a partial session is never produced.

use std::path::PathBuf;

use chrono::Utc;
use tracing::{debug, info};

use crate::composition::types::{
    Composition, CompositionInstruction, ExportRequest, LayerInstruction, RenderSize, SourceClip,
};
use crate::config::Config;
use crate::engine::CompositorEngine;
use crate::error::{ExportError, Result};
use crate::overlay::layout::OverlayLayout;
use crate::overlay::types::OverlayFragment;

/// Probe all clips and assemble the export request
pub async fn build<E: CompositorEngine>(
    engine: &E,
    clips: &[SourceClip],
    fragments: &[OverlayFragment],
    config: &Config,
) -> Result<ExportRequest> {
    if clips.is_empty() {
        return Err(ExportError::EmptyVideo { path: "(no sources)".to_string() }.into());
    }

    let mut composition = Composition::default();
    let mut layers = Vec::with_capacity(clips.len());
    let mut render_size = None;

    for (index, clip) in clips.iter().enumerate() {
        let path = clip.path.display().to_string();
        let info = engine.probe(&clip.path).await?;

        if info.duration <= 0.0 {
            return Err(ExportError::InvalidAsset {
                path,
                reason: format!("non-positive duration {:.3}s", info.duration),
            }
            .into());
        }

        // A clip contributes only through its video track; a clip without
        // one fails the whole job rather than producing partial output
        let video = info.video.as_ref().ok_or_else(|| ExportError::EmptyVideo {
            path: path.clone(),
        })?;

        let (display_width, display_height) = video.display_size();
        let scale = config.export.export_width as f64 / display_width as f64;

        if render_size.is_none() {
            // Primary clip drives the output geometry; dimensions rounded
            // down to even, the encoder rejects odd sizes
            let width = (config.export.export_width & !1).max(2);
            let height =
                ((display_height as f64 * scale).round() as u32 & !1).max(2);
            render_size = Some(RenderSize { width, height });
        }

        composition.append(clip.path.clone(), info.duration, info.has_audio);
        let segment_end = composition.segments[index].end();
        layers.push(LayerInstruction {
            segment_index: index,
            scale,
            // Invisible at its own end time so sequential clips hard-cut
            opacity_ramp: (segment_end, 0.0),
        });

        debug!(
            "clip {}: {:.2}s, {}x{} (audio: {})",
            path, info.duration, display_width, display_height, info.has_audio
        );
    }

    let render_size = render_size.expect("at least one clip probed");
    let instruction = CompositionInstruction {
        time_range: (0.0, composition.duration),
        layers,
    };

    let layout = OverlayLayout::new(
        config.overlay.clone(),
        config.export.default_fragment_duration,
    );
    let overlays = layout.elements(fragments, render_size);
    let watermark = layout.watermark();

    let output = fresh_output_path(config)?;

    info!(
        "built composition: {} clips, {:.2}s, {}x{}, {} overlays -> {:?}",
        composition.segments.len(),
        composition.duration,
        render_size.width,
        render_size.height,
        overlays.len(),
        output
    );

    Ok(ExportRequest {
        composition,
        instruction,
        render_size,
        overlays,
        watermark,
        output,
        fps: config.export.fps,
        quality: config.export.quality,
    })
}

/// A collision-free output location; any stale file at the chosen name is
/// removed first
fn fresh_output_path(config: &Config) -> Result<PathBuf> {
    let dir = config
        .export
        .output_dir
        .clone()
        .unwrap_or_else(std::env::temp_dir);

    let name = format!(
        "merge-video-{}-{:016x}.{}",
        Utc::now().timestamp_millis(),
        rand::random::<u64>(),
        config.export.container,
    );
    let path = dir.join(name);

    match std::fs::remove_file(&path) {
        Ok(()) => debug!("removed stale output file at {:?}", path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    Ok(path)
}
