// Deterministic frame sampling and scene segmentation for video scoring

pub mod error;
pub mod pipeline;
pub mod report;
pub mod scanner;
pub mod scene;
pub mod settings;
pub mod video;

pub use error::{PipelineError, Result};
pub use pipeline::{detect_scenes, pick_middle_keyframes, scenes, segment_stream, SceneList};
pub use report::{export_keyframes, SceneReport, SceneSummary};
pub use scene::{Scene, SceneSegmenter};
pub use settings::{ConfigError, KeyframePolicy, PipelineConfig, Settings};
pub use video::{Frame, FrameDecoder, FrameSampler, FrameStream, PrefetchSampler, VideoSource};
