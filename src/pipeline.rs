// Pipeline facade - wires decoder, sampler and segmenter together
use std::time::Instant;

use tracing::info;

use crate::error::Result;
use crate::scene::{Scene, SceneSegmenter};
use crate::settings::{KeyframePolicy, PipelineConfig};
use crate::video::{Frame, FrameSampler, FrameStream, PrefetchSampler, VideoDecoder, VideoSource};

/// Ordered scenes of one video plus the parameters that produced them
#[derive(Debug, Clone)]
pub struct SceneList {
    pub duration_ms: u64,
    /// Effective rate after clamping
    pub sample_rate_fps: f64,
    pub boundary_threshold: f64,
    pub scenes: Vec<Scene>,
}

impl SceneList {
    /// Opening scene, the one scored as the video's hook
    pub fn hook(&self) -> Option<&Scene> {
        self.scenes.first()
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }
}

/// Lazy scene sequence over an FFmpeg-decoded source.
///
/// The decoder is opened here, so open failures surface immediately.
/// Frames are decoded only as scenes are pulled. With
/// `KeyframePolicy::Middle` scenes carry their first frame; see
/// [`pick_middle_keyframes`].
pub fn scenes(
    source: &VideoSource,
    config: &PipelineConfig,
) -> Result<SceneSegmenter<FrameSampler<VideoDecoder>>> {
    config.validate()?;

    let decoder = VideoDecoder::open(source, config.analysis_width)?;
    let sampler = FrameSampler::new(decoder, config.sample_rate_fps)?;

    Ok(SceneSegmenter::new(
        sampler,
        config.boundary_threshold,
        config.keyframe_policy,
    ))
}

/// Run the whole pipeline on a source and collect its scenes
pub fn detect_scenes(source: &VideoSource, config: &PipelineConfig) -> Result<SceneList> {
    config.validate()?;
    let start = Instant::now();

    let mut scene_list = segment_stream(open_stream(source, config)?, config)?;
    if config.keyframe_policy == KeyframePolicy::Middle {
        pick_middle_keyframes(&mut scene_list, open_stream(source, config)?)?;
    }

    info!(
        source = %source.describe(),
        scenes = scene_list.len(),
        duration_ms = scene_list.duration_ms,
        sample_rate_fps = scene_list.sample_rate_fps,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "scene detection complete"
    );

    Ok(scene_list)
}

/// Sampled frames of a source, decoded in the background when configured
fn open_stream(source: &VideoSource, config: &PipelineConfig) -> Result<Box<dyn FrameStream>> {
    if config.prefetch > 0 {
        let owned = source.clone();
        let analysis_width = config.analysis_width;
        let sampler = PrefetchSampler::spawn(
            move || VideoDecoder::open(&owned, analysis_width),
            config.sample_rate_fps,
            config.prefetch,
        )?;
        return Ok(Box::new(sampler));
    }

    let decoder = VideoDecoder::open(source, config.analysis_width)?;
    Ok(Box::new(FrameSampler::new(decoder, config.sample_rate_fps)?))
}

/// Replace each scene's representative frame with the sampled frame
/// nearest its midpoint.
///
/// `frames` must sample the same source at the same rate as the run that
/// produced `list`. Ties go to the earlier frame.
pub fn pick_middle_keyframes<S: FrameStream>(list: &mut SceneList, frames: S) -> Result<()> {
    let mut picks: Vec<Option<(u64, Frame)>> = vec![None; list.scenes.len()];
    let mut current = 0;

    for frame in frames {
        let frame = frame?;
        while current < list.scenes.len() && frame.timestamp_ms >= list.scenes[current].end_ms {
            current += 1;
        }
        let Some(scene) = list.scenes.get(current) else {
            break;
        };
        if frame.timestamp_ms < scene.start_ms {
            continue;
        }

        // Doubled to stay in whole milliseconds
        let distance = (2 * frame.timestamp_ms).abs_diff(scene.start_ms + scene.end_ms);
        if picks[current].as_ref().map_or(true, |(best, _)| distance < *best) {
            picks[current] = Some((distance, frame));
        }
    }

    for (scene, pick) in list.scenes.iter_mut().zip(picks) {
        if let Some((_, frame)) = pick {
            scene.representative_frame = frame;
        }
    }
    Ok(())
}

/// Segment any frame stream with the given configuration
pub fn segment_stream<S: FrameStream>(stream: S, config: &PipelineConfig) -> Result<SceneList> {
    let sample_rate_fps = stream.sample_rate_fps();
    let mut segmenter = SceneSegmenter::new(stream, config.boundary_threshold, config.keyframe_policy);

    let scenes = segmenter.by_ref().collect::<Result<Vec<_>>>()?;

    Ok(SceneList {
        duration_ms: segmenter.frames().duration_ms(),
        sample_rate_fps,
        boundary_threshold: config.boundary_threshold,
        scenes,
    })
}
