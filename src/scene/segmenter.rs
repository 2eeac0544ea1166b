// Scene segmentation - single pass over sampled frames, cut on large content changes
use tracing::debug;

use super::metric::ContentFeatures;
use crate::error::{PipelineError, Result};
use crate::settings::KeyframePolicy;
use crate::video::{Frame, FrameStream};

/// A contiguous span of the video between two boundaries
#[derive(Debug, Clone)]
pub struct Scene {
    /// Inclusive start
    pub start_ms: u64,
    /// Exclusive end, equal to the next scene's start
    pub end_ms: u64,
    pub representative_frame: Frame,
    /// Difference that opened this scene, 0 for the first one
    pub boundary_score: f64,
    /// Sampled frames inside the span
    pub frame_count: u64,
}

impl Scene {
    pub fn duration_ms(&self) -> u64 {
        self.end_ms - self.start_ms
    }
}

/// Scene still collecting frames
struct OpenScene {
    start_ms: u64,
    keyframe: Frame,
    keyframe_score: f64,
    boundary_score: f64,
    frame_count: u64,
}

impl OpenScene {
    fn start(frame: Frame, boundary_score: f64) -> Self {
        Self {
            start_ms: frame.timestamp_ms,
            keyframe: frame,
            keyframe_score: boundary_score,
            boundary_score,
            frame_count: 1,
        }
    }

    fn extend(&mut self, frame: Frame, score: f64, policy: KeyframePolicy) {
        self.frame_count += 1;
        if policy == KeyframePolicy::MaxDifference && score > self.keyframe_score {
            self.keyframe = frame;
            self.keyframe_score = score;
        }
    }

    fn close(self, end_ms: u64) -> Scene {
        Scene {
            start_ms: self.start_ms,
            end_ms,
            representative_frame: self.keyframe,
            boundary_score: self.boundary_score,
            frame_count: self.frame_count,
        }
    }
}

/// Lazily partitions a frame stream into scenes.
///
/// A boundary falls before every frame whose difference from its
/// predecessor is strictly greater than the threshold. Yields an error at
/// most once and is fused afterwards.
pub struct SceneSegmenter<S: FrameStream> {
    frames: S,
    threshold: f64,
    policy: KeyframePolicy,
    previous: Option<ContentFeatures>,
    open: Option<OpenScene>,
    emitted: usize,
    finished: bool,
}

impl<S: FrameStream> SceneSegmenter<S> {
    pub fn new(frames: S, threshold: f64, policy: KeyframePolicy) -> Self {
        Self {
            frames,
            threshold,
            policy,
            previous: None,
            open: None,
            emitted: 0,
            finished: false,
        }
    }

    /// The underlying frame stream, e.g. to read its final duration
    pub fn frames(&self) -> &S {
        &self.frames
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    fn emit(&mut self, scene: Scene) -> Option<Result<Scene>> {
        debug!(
            index = self.emitted,
            start_ms = scene.start_ms,
            end_ms = scene.end_ms,
            boundary_score = scene.boundary_score,
            frames = scene.frame_count,
            "scene closed"
        );
        self.emitted += 1;
        Some(Ok(scene))
    }

    /// Score a frame against its predecessor and remember its features
    fn score(&mut self, frame: &Frame) -> Option<f64> {
        let features = match &self.previous {
            Some(previous) => ContentFeatures::matching(&frame.pixels, previous),
            None => ContentFeatures::from_image(&frame.pixels),
        };
        let score = self.previous.as_ref().map(|previous| previous.distance(&features));
        self.previous = Some(features);
        score
    }
}

impl<S: FrameStream> Iterator for SceneSegmenter<S> {
    type Item = Result<Scene>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            match self.frames.next() {
                Some(Ok(frame)) => {
                    let score = self.score(&frame);

                    match (self.open.take(), score) {
                        (Some(scene), Some(score)) if score > self.threshold => {
                            let closed = scene.close(frame.timestamp_ms);
                            self.open = Some(OpenScene::start(frame, score));
                            return self.emit(closed);
                        }
                        (Some(mut scene), score) => {
                            scene.extend(frame, score.unwrap_or(0.0), self.policy);
                            self.open = Some(scene);
                        }
                        (None, _) => self.open = Some(OpenScene::start(frame, 0.0)),
                    }
                }
                Some(Err(e)) => {
                    self.finished = true;
                    self.open = None;
                    self.previous = None;
                    return Some(Err(e));
                }
                None => {
                    self.finished = true;
                    self.previous = None;

                    let Some(scene) = self.open.take() else {
                        return Some(Err(PipelineError::EmptyVideo));
                    };
                    let end_ms = self.frames.duration_ms().max(scene.start_ms + 1);
                    return self.emit(scene.close(end_ms));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::testing::{ScheduledDecoder, SyntheticDecoder};
    use crate::video::FrameSampler;
    use std::sync::atomic::Ordering;

    fn segment(
        decoder: SyntheticDecoder,
        rate: f64,
        threshold: f64,
        policy: KeyframePolicy,
    ) -> Vec<Result<Scene>> {
        let sampler = FrameSampler::new(decoder, rate).unwrap();
        SceneSegmenter::new(sampler, threshold, policy).collect()
    }

    fn spans(scenes: &[Result<Scene>]) -> Vec<(u64, u64)> {
        scenes
            .iter()
            .map(|s| s.as_ref().unwrap())
            .map(|s| (s.start_ms, s.end_ms))
            .collect()
    }

    #[test]
    fn test_single_jump_splits_in_two() {
        let decoder = SyntheticDecoder::new(10, 10, |i| if i < 50 { 0 } else { 200 });
        let scenes = segment(decoder, 1.0, 30.0, KeyframePolicy::First);

        assert_eq!(spans(&scenes), vec![(0, 5000), (5000, 10000)]);
        let first = scenes[0].as_ref().unwrap();
        let second = scenes[1].as_ref().unwrap();
        assert_eq!(first.boundary_score, 0.0);
        assert!(second.boundary_score > 30.0);
        assert_eq!(first.frame_count, 5);
        assert_eq!(second.frame_count, 5);
    }

    #[test]
    fn test_uniform_video_is_one_scene() {
        let decoder = SyntheticDecoder::new(30, 3, |_| 77);
        let scenes = segment(decoder, 2.0, 30.0, KeyframePolicy::First);

        assert_eq!(spans(&scenes), vec![(0, 3000)]);
        let scene = scenes[0].as_ref().unwrap();
        assert_eq!(scene.boundary_score, 0.0);
        assert_eq!(scene.frame_count, 6);
    }

    #[test]
    fn test_score_equal_to_threshold_is_not_a_cut() {
        // Gray steps of 90 score exactly 30
        let steps = |i: u64| ((i / 10) * 90).min(255) as u8;

        let scenes = segment(SyntheticDecoder::new(10, 3, steps), 1.0, 30.0, KeyframePolicy::First);
        assert_eq!(spans(&scenes), vec![(0, 3000)]);

        let scenes = segment(SyntheticDecoder::new(10, 3, steps), 1.0, 29.9, KeyframePolicy::First);
        assert_eq!(spans(&scenes), vec![(0, 1000), (1000, 2000), (2000, 3000)]);
    }

    #[test]
    fn test_video_shorter_than_one_interval() {
        let mut decoder = SyntheticDecoder::new(10, 1, |_| 0);
        decoder.total = 3;
        let scenes = segment(decoder, 2.0, 30.0, KeyframePolicy::First);

        assert_eq!(spans(&scenes), vec![(0, 300)]);
        assert_eq!(scenes[0].as_ref().unwrap().boundary_score, 0.0);
    }

    #[test]
    fn test_no_frames_is_empty_video() {
        let scenes = segment(SyntheticDecoder::new(10, 0, |_| 0), 1.0, 30.0, KeyframePolicy::First);

        assert_eq!(scenes.len(), 1);
        assert!(matches!(scenes[0], Err(PipelineError::EmptyVideo)));
    }

    #[test]
    fn test_error_is_propagated_and_fuses() {
        let mut decoder = SyntheticDecoder::new(10, 10, |i| if i < 20 { 0 } else { 255 });
        decoder.fail_at = Some(45);
        let open = decoder.handle_count();

        let sampler = FrameSampler::new(decoder, 1.0).unwrap();
        let mut segmenter = SceneSegmenter::new(sampler, 30.0, KeyframePolicy::First);

        let first = segmenter.next().unwrap().unwrap();
        assert_eq!((first.start_ms, first.end_ms), (0, 2000));
        assert!(matches!(segmenter.next(), Some(Err(PipelineError::UnreadableSource(_)))));
        assert!(segmenter.next().is_none());
        assert_eq!(open.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_keyframe_policy() {
        // Differences 10, 20, 0 stay under the threshold
        let ramp = |i: u64| -> u8 {
            match i / 10 {
                0 => 0,
                1 => 30,
                _ => 90,
            }
        };

        let first = segment(SyntheticDecoder::new(10, 4, ramp), 1.0, 30.0, KeyframePolicy::First);
        let first = first[0].as_ref().unwrap();
        assert_eq!(first.representative_frame.timestamp_ms, 0);

        let max = segment(SyntheticDecoder::new(10, 4, ramp), 1.0, 30.0, KeyframePolicy::MaxDifference);
        assert_eq!(max.len(), 1);
        let max = max[0].as_ref().unwrap();
        assert_eq!(max.representative_frame.timestamp_ms, 2000);
        assert_eq!(max.representative_frame.pixels.get_pixel(0, 0)[0], 90);
        assert_eq!(max.boundary_score, 0.0);
    }

    #[test]
    fn test_slideshow_cut_lands_on_the_new_slide() {
        let decoder = ScheduledDecoder::new(&[(0, 0), (5000, 255)], Some(6000));
        let sampler = FrameSampler::new(decoder, 1.0).unwrap();
        let scenes: Vec<Scene> = SceneSegmenter::new(sampler, 30.0, KeyframePolicy::First)
            .map(|s| s.unwrap())
            .collect();

        let spans: Vec<(u64, u64, u64)> = scenes
            .iter()
            .map(|s| (s.start_ms, s.end_ms, s.frame_count))
            .collect();
        assert_eq!(spans, vec![(0, 5000, 5), (5000, 6000, 1)]);
    }

    #[test]
    fn test_zero_threshold_cuts_on_any_change() {
        let decoder = SyntheticDecoder::new(10, 4, |i| (i / 10) as u8);
        let scenes = segment(decoder, 1.0, 0.0, KeyframePolicy::First);
        assert_eq!(scenes.len(), 4);
    }
}
