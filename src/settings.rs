// Pipeline settings - loaded from a TOML file, overridable from the CLI
use directories::ProjectDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default sampling rate in frames per second
pub const DEFAULT_SAMPLE_RATE_FPS: f64 = 2.0;

/// Default boundary threshold on the HSV content delta (0-255 scale)
pub const DEFAULT_BOUNDARY_THRESHOLD: f64 = 30.0;

/// Default width frames are scaled to before analysis
pub const DEFAULT_ANALYSIS_WIDTH: u32 = 320;

/// Which frame of a scene is kept as its representative frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum KeyframePolicy {
    /// First sampled frame of the span
    #[default]
    First,
    /// Frame with the largest difference from its predecessor
    MaxDifference,
    /// Sampled frame nearest the scene's midpoint. The midpoint is only
    /// known once a scene closes, so `detect_scenes` resolves it with a
    /// second sampling pass; a lazily consumed segmenter keeps the first frame.
    Middle,
}

/// Options consumed by a single pipeline run.
///
/// Only `sample_rate_fps` and `boundary_threshold` influence where scene
/// boundaries fall. The remaining fields change cost or presentation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub sample_rate_fps: f64,
    pub boundary_threshold: f64,
    pub analysis_width: u32,
    pub keyframe_policy: KeyframePolicy,
    /// Bounded channel capacity for background decoding, 0 disables it
    pub prefetch: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate_fps: DEFAULT_SAMPLE_RATE_FPS,
            boundary_threshold: DEFAULT_BOUNDARY_THRESHOLD,
            analysis_width: DEFAULT_ANALYSIS_WIDTH,
            keyframe_policy: KeyframePolicy::default(),
            prefetch: 0,
        }
    }
}

impl PipelineConfig {
    /// Reject values that would make the run meaningless
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.sample_rate_fps.is_finite() || self.sample_rate_fps <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "sample_rate_fps must be a positive number, got {}",
                self.sample_rate_fps
            )));
        }
        if !self.boundary_threshold.is_finite() || self.boundary_threshold < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "boundary_threshold must be a non-negative number, got {}",
                self.boundary_threshold
            )));
        }
        if self.analysis_width == 0 {
            return Err(ConfigError::Invalid(
                "analysis_width must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Directory representative frames are written to, if any
    pub keyframe_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

/// Top-level settings file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub pipeline: PipelineConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

impl Settings {
    /// Load settings from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::from_toml_str(&content)
    }

    /// Parse settings from TOML text and validate them
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let settings: Settings =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        settings.pipeline.validate()?;
        Ok(settings)
    }

    /// Load from an explicit path, or from the platform config directory
    /// when that file exists, or fall back to defaults.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Path of the settings file in the platform config directory
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "videoteam", "ScenePipeline")
            .map(|dirs| dirs.config_dir().join("settings.toml"))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_empty_file_uses_defaults() {
        let settings = Settings::from_toml_str("").unwrap();
        assert_eq!(settings.pipeline, PipelineConfig::default());
        assert_eq!(settings.logging.level, "info");
        assert!(settings.output.keyframe_dir.is_none());
    }

    #[test]
    fn test_full_file() {
        let settings = Settings::from_toml_str(
            r#"
            [pipeline]
            sample_rate_fps = 1.0
            boundary_threshold = 12.5
            analysis_width = 160
            keyframe_policy = "max_difference"
            prefetch = 4

            [output]
            keyframe_dir = "frames"

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(
            settings.pipeline,
            PipelineConfig {
                sample_rate_fps: 1.0,
                boundary_threshold: 12.5,
                analysis_width: 160,
                keyframe_policy: KeyframePolicy::MaxDifference,
                prefetch: 4,
            }
        );
        assert_eq!(settings.output.keyframe_dir, Some(PathBuf::from("frames")));
        assert_eq!(settings.logging.level, "debug");
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let settings = Settings::from_toml_str("[pipeline]\nboundary_threshold = 0.0\n").unwrap();
        assert_eq!(settings.pipeline.boundary_threshold, 0.0);
        assert_eq!(settings.pipeline.sample_rate_fps, DEFAULT_SAMPLE_RATE_FPS);
    }

    #[test]
    fn test_rejects_invalid_values() {
        for body in [
            "[pipeline]\nsample_rate_fps = 0.0\n",
            "[pipeline]\nsample_rate_fps = -1.0\n",
            "[pipeline]\nboundary_threshold = -0.5\n",
            "[pipeline]\nanalysis_width = 0\n",
        ] {
            let err = Settings::from_toml_str(body).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)), "{body}: {err}");
        }
    }

    #[test]
    fn test_keyframe_policy_names() {
        for (name, policy) in [
            ("first", KeyframePolicy::First),
            ("max_difference", KeyframePolicy::MaxDifference),
            ("middle", KeyframePolicy::Middle),
        ] {
            let body = format!("[pipeline]\nkeyframe_policy = \"{name}\"\n");
            let settings = Settings::from_toml_str(&body).unwrap();
            assert_eq!(settings.pipeline.keyframe_policy, policy);
        }
    }

    #[test]
    fn test_rejects_unknown_keys() {
        let err = Settings::from_toml_str("[pipeline]\ntreshold = 3.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[pipeline]\nsample_rate_fps = 4.0").unwrap();

        let settings = Settings::load_or_default(Some(file.path())).unwrap();
        assert_eq!(settings.pipeline.sample_rate_fps, 4.0);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::load_or_default(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile(_, _)));
    }
}
