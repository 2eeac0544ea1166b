// Synthetic decoder for unit tests
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use image::{Rgb, RgbImage};

use super::decoder::{DecodedFrame, FrameDecoder, StreamInfo};
use crate::error::{PipelineError, Result};

/// Constant-rate decoder whose frames are flat gray at a per-frame value.
///
/// `handle_count` drops to zero when the decoder is dropped, which lets
/// tests check that the handle was released.
pub(crate) struct SyntheticDecoder {
    pub fps: u64,
    pub total: u64,
    pub report_duration: bool,
    pub fail_at: Option<u64>,
    next: u64,
    gray: fn(u64) -> u8,
    open: Arc<AtomicUsize>,
}

impl SyntheticDecoder {
    pub fn new(fps: u64, seconds: u64, gray: fn(u64) -> u8) -> Self {
        Self {
            fps,
            total: fps * seconds,
            report_duration: true,
            fail_at: None,
            next: 0,
            gray,
            open: Arc::new(AtomicUsize::new(1)),
        }
    }

    pub fn handle_count(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.open)
    }
}

impl Drop for SyntheticDecoder {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FrameDecoder for SyntheticDecoder {
    fn info(&self) -> StreamInfo {
        StreamInfo {
            duration_ms: self.report_duration.then(|| self.total * 1000 / self.fps),
            native_fps: Some(self.fps as f64),
            width: 8,
            height: 8,
        }
    }

    fn next_frame(&mut self) -> Result<Option<DecodedFrame>> {
        if self.fail_at == Some(self.next) {
            return Err(PipelineError::unreadable("corrupt packet"));
        }
        if self.next >= self.total {
            return Ok(None);
        }

        let i = self.next;
        self.next += 1;
        let value = (self.gray)(i);
        Ok(Some(DecodedFrame {
            pts_ms: i * 1000 / self.fps,
            image: RgbImage::from_pixel(8, 8, Rgb([value, value, value])),
        }))
    }
}

/// Decoder replaying an explicit `(pts_ms, gray)` schedule, for sources
/// with gaps between frames such as slideshows or stalled recordings
pub(crate) struct ScheduledDecoder {
    frames: std::collections::VecDeque<(u64, u8)>,
    duration_ms: Option<u64>,
}

impl ScheduledDecoder {
    pub fn new(frames: &[(u64, u8)], duration_ms: Option<u64>) -> Self {
        Self {
            frames: frames.iter().copied().collect(),
            duration_ms,
        }
    }
}

impl FrameDecoder for ScheduledDecoder {
    fn info(&self) -> StreamInfo {
        StreamInfo {
            duration_ms: self.duration_ms,
            native_fps: Some(30.0),
            width: 8,
            height: 8,
        }
    }

    fn next_frame(&mut self) -> Result<Option<DecodedFrame>> {
        Ok(self.frames.pop_front().map(|(pts_ms, value)| DecodedFrame {
            pts_ms,
            image: RgbImage::from_pixel(8, 8, Rgb([value, value, value])),
        }))
    }
}
