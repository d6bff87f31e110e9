//! Single-frame JPEG preview of a finished export.

use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use tracing::debug;

use crate::engine::CompositorEngine;
use crate::error::{ExportError, Result};

/// Earliest non-zero frame timestamp, one tick of the usual 600-unit media
/// timescale. Clamped to the asset duration so sub-tick outputs still work.
const FIRST_FRAME_TICK: f64 = 1.0 / 600.0;

/// JPEG quality factor for the preview
const JPEG_QUALITY: u8 = 95;

/// Decode one frame near the start of the finished file and encode it as JPEG.
///
/// Failure here is a job-level failure, not a warning: the caller reports the
/// whole export as failed rather than delivering a partial success.
pub async fn capture<E: CompositorEngine>(engine: &E, path: &Path) -> Result<Vec<u8>> {
    let failed = |reason: String| ExportError::ThumbnailExtractionFailed { reason };

    let info = engine
        .probe(path)
        .await
        .map_err(|e| failed(format!("could not probe finished file: {}", e)))?;

    let at = FIRST_FRAME_TICK.min(info.duration).max(0.0);
    debug!("capturing preview frame at {:.4}s of {:.2}s", at, info.duration);

    let frame = engine.extract_frame(path, at).await?;

    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY)
        .encode_image(&frame)
        .map_err(|e| failed(format!("JPEG encode failed: {}", e)))?;

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::types::{AssetInfo, VideoStreamInfo};
    use crate::engine::mock::MockEngine;
    use tempfile::tempdir;

    fn finished_asset(duration: f64) -> AssetInfo {
        AssetInfo {
            duration,
            video: Some(VideoStreamInfo { width: 800, height: 450, rotation: 0 }),
            has_audio: true,
        }
    }

    #[tokio::test]
    async fn test_capture_encodes_jpeg() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.mov");
        std::fs::write(&path, b"payload").unwrap();

        let engine = MockEngine::new().with_asset(path.clone(), finished_asset(20.0));
        let bytes = capture(&engine, &path).await.unwrap();

        // JPEG magic
        assert!(bytes.len() > 2);
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[tokio::test]
    async fn test_capture_missing_file_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.mov");

        // Probed fine but no frame can be decoded
        let engine = MockEngine::new().with_asset(path.clone(), finished_asset(20.0));
        let err = capture(&engine, &path).await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::MergeError::Export(ExportError::ThumbnailExtractionFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_capture_clamps_to_short_duration() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tiny.mov");
        std::fs::write(&path, b"payload").unwrap();

        // Shorter than one tick; the clamp keeps the request inside the asset
        let engine = MockEngine::new().with_asset(path.clone(), finished_asset(0.0005));
        assert!(capture(&engine, &path).await.is_ok());
    }
}
