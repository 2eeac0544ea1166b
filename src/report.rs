// Scene reports and representative frame export
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use image::ImageFormat;
use serde::Serialize;
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::pipeline::SceneList;
use crate::video::VideoSource;

/// One scene as handed to the scoring layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneSummary {
    pub index: usize,
    pub start_ms: u64,
    pub end_ms: u64,
    /// Seconds, rounded to two decimals
    pub start: f64,
    pub end: f64,
    pub boundary_score: f64,
    pub frame_count: u64,
    /// Timestamp of the representative frame
    pub keyframe_ms: u64,
    /// Mean luma of the representative frame, 0-255
    pub brightness: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyframe_path: Option<PathBuf>,
}

/// Serializable result of one pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct SceneReport {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    pub duration_ms: u64,
    pub sample_rate_fps: f64,
    pub boundary_threshold: f64,
    pub analyzed_at: DateTime<Utc>,
    pub scenes: Vec<SceneSummary>,
}

impl SceneReport {
    pub fn from_scenes(source: &VideoSource, fingerprint: Option<String>, list: &SceneList) -> Self {
        let scenes = list
            .scenes
            .iter()
            .enumerate()
            .map(|(index, scene)| SceneSummary {
                index,
                start_ms: scene.start_ms,
                end_ms: scene.end_ms,
                start: ms_to_secs(scene.start_ms),
                end: ms_to_secs(scene.end_ms),
                boundary_score: scene.boundary_score,
                frame_count: scene.frame_count,
                keyframe_ms: scene.representative_frame.timestamp_ms,
                brightness: scene.representative_frame.mean_luma(),
                keyframe_path: None,
            })
            .collect();

        Self {
            source: source.describe(),
            fingerprint,
            duration_ms: list.duration_ms,
            sample_rate_fps: list.sample_rate_fps,
            boundary_threshold: list.boundary_threshold,
            analyzed_at: Utc::now(),
            scenes,
        }
    }

    /// Attach exported keyframe paths, in scene order
    pub fn with_keyframes(mut self, paths: Vec<PathBuf>) -> Self {
        for (scene, path) in self.scenes.iter_mut().zip(paths) {
            scene.keyframe_path = Some(path);
        }
        self
    }

    pub fn to_json(&self, pretty: bool) -> Result<String> {
        let json = if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        };
        json.map_err(|e| PipelineError::Export(format!("report serialization: {e}")))
    }
}

/// Write each scene's representative frame as `<stem>_scene_<NN>.jpg`.
///
/// Returns the written paths in scene order.
pub fn export_keyframes(list: &SceneList, dir: &Path, stem: &str) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .map_err(|e| PipelineError::Export(format!("{}: {e}", dir.display())))?;

    let mut written = Vec::with_capacity(list.scenes.len());
    for (index, scene) in list.scenes.iter().enumerate() {
        let path = dir.join(format!("{stem}_scene_{index:02}.jpg"));
        scene
            .representative_frame
            .pixels
            .save_with_format(&path, ImageFormat::Jpeg)
            .map_err(|e| PipelineError::Export(format!("{}: {e}", path.display())))?;
        written.push(path);
    }

    debug!(count = written.len(), dir = %dir.display(), "keyframes exported");
    Ok(written)
}

fn ms_to_secs(ms: u64) -> f64 {
    (ms as f64 / 10.0).round() / 100.0
}
