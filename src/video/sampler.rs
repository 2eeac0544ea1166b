// Uniform temporal sampling over a frame decoder
use image::RgbImage;
use tracing::{debug, warn};

use super::decoder::{DecodedFrame, FrameDecoder};
use crate::error::{PipelineError, Result};

/// A sampled frame handed to the segmenter
#[derive(Debug, Clone)]
pub struct Frame {
    /// Position among sampled frames, not source frames
    pub index: u64,
    /// Tick time, `index / sample_rate` rounded to the millisecond
    pub timestamp_ms: u64,
    pub pixels: RgbImage,
}

impl Frame {
    /// Mean Rec. 601 luma of the frame, 0-255
    pub fn mean_luma(&self) -> f64 {
        let pixel_count = self.pixels.width() as u64 * self.pixels.height() as u64;
        if pixel_count == 0 {
            return 0.0;
        }

        let sum: u64 = self
            .pixels
            .pixels()
            .map(|p| (p[0] as u64 * 299 + p[1] as u64 * 587 + p[2] as u64 * 114) / 1000)
            .sum();
        sum as f64 / pixel_count as f64
    }
}

/// A finite stream of sampled frames that knows the video's duration
/// once it has been exhausted.
pub trait FrameStream: Iterator<Item = Result<Frame>> {
    /// Rate actually used, after clamping
    fn sample_rate_fps(&self) -> f64;

    /// Total video duration. Exact when the container reports it,
    /// otherwise the observed end of the stream.
    fn duration_ms(&self) -> u64;
}

impl<S: FrameStream + ?Sized> FrameStream for Box<S> {
    fn sample_rate_fps(&self) -> f64 {
        (**self).sample_rate_fps()
    }

    fn duration_ms(&self) -> u64 {
        (**self).duration_ms()
    }
}

/// Lazily samples a decoder at a fixed rate.
///
/// Owns the decoder and drops it as soon as iteration ends, fails, or the
/// sampler itself is dropped.
pub struct FrameSampler<D: FrameDecoder> {
    decoder: Option<D>,
    sample_rate_fps: f64,
    native_fps: Option<f64>,
    duration_ms: Option<u64>,
    next_index: u64,
    lookahead: Option<DecodedFrame>,
    /// Last frame handed out, still on screen until a newer one arrives
    held: Option<DecodedFrame>,
    last_pts_ms: Option<u64>,
}

impl<D: FrameDecoder> FrameSampler<D> {
    /// Wrap a decoder. `requested_fps` above the native rate is clamped.
    pub fn new(decoder: D, requested_fps: f64) -> Result<Self> {
        if !requested_fps.is_finite() || requested_fps <= 0.0 {
            return Err(crate::settings::ConfigError::Invalid(format!(
                "sample rate must be positive, got {requested_fps}"
            ))
            .into());
        }

        let info = decoder.info();
        let sample_rate_fps = match info.native_fps {
            Some(native) if requested_fps > native => {
                warn!(
                    requested_fps,
                    native_fps = native,
                    "sample rate above native frame rate, clamping"
                );
                native
            }
            _ => requested_fps,
        };

        Ok(Self {
            decoder: Some(decoder),
            sample_rate_fps,
            native_fps: info.native_fps,
            duration_ms: info.duration_ms,
            next_index: 0,
            lookahead: None,
            held: None,
            last_pts_ms: None,
        })
    }

    /// Whether the decoding handle is still held
    pub fn is_open(&self) -> bool {
        self.decoder.is_some()
    }

    fn tick_ms(&self, index: u64) -> u64 {
        (index as f64 * 1000.0 / self.sample_rate_fps).round() as u64
    }

    /// Last decoded frame time plus one native frame interval
    fn observed_end_ms(&self) -> u64 {
        let frame_ms = self
            .native_fps
            .map(|fps| (1000.0 / fps).round() as u64)
            .unwrap_or(0);
        self.last_pts_ms.map_or(0, |pts| pts + frame_ms)
    }

    fn release(&mut self) {
        if self.decoder.take().is_some() {
            debug!(frames_sampled = self.next_index, "frame sampler released decoder");
        }
        self.lookahead = None;
        self.held = None;
    }

    /// Next decoded frame, preferring one already read ahead
    fn pull(&mut self) -> Result<Option<DecodedFrame>> {
        if let Some(frame) = self.lookahead.take() {
            return Ok(Some(frame));
        }

        let Some(decoder) = self.decoder.as_mut() else {
            return Ok(None);
        };
        let frame = decoder.next_frame()?;
        if let Some(frame) = &frame {
            self.last_pts_ms = Some(frame.pts_ms);
        }
        Ok(frame)
    }
}

impl<D: FrameDecoder> Iterator for FrameSampler<D> {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        self.decoder.as_ref()?;

        let tick_ms = self.tick_ms(self.next_index);
        if self.duration_ms.is_some_and(|duration| tick_ms >= duration) {
            self.release();
            return None;
        }

        // Latest frame on screen at the tick
        let mut latest = None;
        let mut exhausted = false;
        loop {
            match self.pull() {
                Ok(Some(frame)) if frame.pts_ms <= tick_ms => latest = Some(frame),
                Ok(Some(frame)) => {
                    self.lookahead = Some(frame);
                    break;
                }
                Ok(None) => {
                    exhausted = true;
                    break;
                }
                Err(e) => {
                    self.release();
                    return Some(Err(e));
                }
            }
        }

        // Without a container duration the stream ends with its last frame
        if exhausted
            && self.duration_ms.is_none()
            && self.held.is_some()
            && tick_ms >= self.observed_end_ms()
        {
            self.release();
            return None;
        }

        // Nothing new since the last tick: the held frame is still on screen.
        // Only the first tick may look ahead, when the video starts late.
        let Some(decoded) = latest
            .or_else(|| self.held.take())
            .or_else(|| self.lookahead.take())
        else {
            self.release();
            return Some(Err(PipelineError::unreadable(
                "source contains no decodable frames",
            )));
        };

        let frame = Frame {
            index: self.next_index,
            timestamp_ms: tick_ms,
            pixels: decoded.image.clone(),
        };
        self.held = Some(decoded);
        self.next_index += 1;
        Some(Ok(frame))
    }
}

impl<D: FrameDecoder> FrameStream for FrameSampler<D> {
    fn sample_rate_fps(&self) -> f64 {
        self.sample_rate_fps
    }

    fn duration_ms(&self) -> u64 {
        if let Some(duration) = self.duration_ms {
            return duration;
        }

        let last_tick = self.next_index.checked_sub(1).map(|i| self.tick_ms(i));
        let observed = self.last_pts_ms.map(|_| self.observed_end_ms());

        match (observed, last_tick) {
            (Some(observed), Some(tick)) => observed.max(tick + 1),
            (Some(observed), None) => observed,
            (None, Some(tick)) => tick + 1,
            (None, None) => 0,
        }
    }
}
