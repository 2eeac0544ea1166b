// Scanner module - recursive video discovery and parallel pipeline runs
mod fingerprint;

pub use fingerprint::*;

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::error::Result;
use crate::pipeline::detect_scenes;
use crate::report::{export_keyframes, SceneReport};
use crate::settings::PipelineConfig;
use crate::video::VideoSource;

/// Supported video extensions
const VIDEO_EXTENSIONS: &[&str] = &[".mov", ".mp4", ".m4v", ".avi", ".mkv", ".webm"];

/// Directories to skip
const SKIP_DIRS: &[&str] = &["node_modules", "__MACOSX", ".Trash", ".Spotlight-V100", ".fseventsd"];

/// Outcome of analyzing one input path
#[derive(Debug)]
pub struct AnalysisOutcome {
    pub path: PathBuf,
    pub result: Result<SceneReport>,
}

/// Find all video files under a directory, sorted by path
pub fn find_video_files(path: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            // The root itself is never filtered
            if entry.depth() == 0 {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            // Skip hidden files and directories
            if name.starts_with('.') {
                return false;
            }
            // Skip known non-video directories
            if entry.file_type().is_dir() {
                return !SKIP_DIRS.contains(&name.as_ref());
            }
            true
        })
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && is_video_file(entry.path()))
        .map(|entry| entry.into_path())
        .collect();

    files.sort();
    files
}

/// Expand directories into the videos they contain, keep files as given
pub fn collect_inputs(inputs: &[PathBuf]) -> Vec<PathBuf> {
    inputs
        .iter()
        .flat_map(|input| {
            if input.is_dir() {
                find_video_files(input)
            } else {
                vec![input.clone()]
            }
        })
        .collect()
}

fn is_video_file(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    VIDEO_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}

/// Analyze every path in parallel.
///
/// Each run owns its own decoder; one failure never affects another.
/// Outcomes come back in input order.
pub fn analyze_paths(
    paths: &[PathBuf],
    config: &PipelineConfig,
    keyframe_dir: Option<&Path>,
) -> Vec<AnalysisOutcome> {
    info!(count = paths.len(), "analyzing videos");

    paths
        .par_iter()
        .map(|path| AnalysisOutcome {
            path: path.clone(),
            result: analyze_path(path, config, keyframe_dir),
        })
        .collect()
}

/// Run the pipeline on one file and build its report
pub fn analyze_path(
    path: &Path,
    config: &PipelineConfig,
    keyframe_dir: Option<&Path>,
) -> Result<SceneReport> {
    let fingerprint = match file_fingerprint(path) {
        Ok(fp) => Some(fp),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not fingerprint file");
            None
        }
    };

    let source = VideoSource::from(path);
    let scene_list = detect_scenes(&source, config)?;
    let report = SceneReport::from_scenes(&source, fingerprint.clone(), &scene_list);

    let Some(dir) = keyframe_dir else {
        return Ok(report);
    };

    let file_stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "video".to_string());
    // Same-named files from different folders must not overwrite each other
    let stem = match &fingerprint {
        Some(fp) => format!("{}_{}", file_stem, &fp[..8]),
        None => file_stem,
    };

    let paths = export_keyframes(&scene_list, dir, &stem)?;
    Ok(report.with_keyframes(paths))
}
