// Video decoder for frame sampling using ffmpeg-next
use std::io::Write;
use std::path::{Path, PathBuf};

use image::RgbImage;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};

extern crate ffmpeg_next as ffmpeg;

/// Where a video is read from
#[derive(Debug, Clone)]
pub enum VideoSource {
    /// Local file in any container FFmpeg can demux
    Path(PathBuf),
    /// In-memory upload, spilled to a temporary file while decoding
    Bytes(Vec<u8>),
}

impl VideoSource {
    /// Short human-readable label for logs and reports
    pub fn describe(&self) -> String {
        match self {
            VideoSource::Path(path) => path.display().to_string(),
            VideoSource::Bytes(bytes) => format!("<{} byte stream>", bytes.len()),
        }
    }
}

impl From<PathBuf> for VideoSource {
    fn from(path: PathBuf) -> Self {
        VideoSource::Path(path)
    }
}

impl From<&Path> for VideoSource {
    fn from(path: &Path) -> Self {
        VideoSource::Path(path.to_path_buf())
    }
}

impl From<Vec<u8>> for VideoSource {
    fn from(bytes: Vec<u8>) -> Self {
        VideoSource::Bytes(bytes)
    }
}

/// Properties of an opened video stream
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamInfo {
    /// Container duration, if the container reports one
    pub duration_ms: Option<u64>,
    /// Average native frame rate, if known
    pub native_fps: Option<f64>,
    /// Size of the frames handed out by the decoder
    pub width: u32,
    pub height: u32,
}

/// A decoded frame in presentation order, before sampling
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    /// Presentation time relative to the stream start
    pub pts_ms: u64,
    pub image: RgbImage,
}

/// A forward-only source of decoded frames.
///
/// The decoder owns whatever handle it reads from; dropping it releases
/// the handle. Frames must come out in non-decreasing `pts_ms` order.
pub trait FrameDecoder {
    fn info(&self) -> StreamInfo;

    /// Decode the next frame, or `None` once the stream is exhausted
    fn next_frame(&mut self) -> Result<Option<DecodedFrame>>;
}

impl<D: FrameDecoder + ?Sized> FrameDecoder for Box<D> {
    fn info(&self) -> StreamInfo {
        (**self).info()
    }

    fn next_frame(&mut self) -> Result<Option<DecodedFrame>> {
        (**self).next_frame()
    }
}

/// FFmpeg-backed decoder producing RGB frames at the analysis width
pub struct VideoDecoder {
    format_ctx: ffmpeg::format::context::Input,
    video_stream_index: usize,
    decoder: ffmpeg::decoder::Video,
    scaler: Option<ffmpeg::software::scaling::Context>,
    scaler_input: Option<(ffmpeg::format::Pixel, u32, u32)>,
    decoded: ffmpeg::frame::Video,
    scaled: ffmpeg::frame::Video,
    time_base: ffmpeg::Rational,
    start_pts: i64,
    info: StreamInfo,
    frames_decoded: u64,
    skipped_packets: u64,
    eof_sent: bool,
    finished: bool,
    label: String,
    // Declared last so the container is closed before the file is removed
    _spill: Option<NamedTempFile>,
}

impl VideoDecoder {
    /// Open a video source for sequential decoding
    pub fn open(source: &VideoSource, analysis_width: u32) -> Result<Self> {
        ffmpeg::init().map_err(|e| PipelineError::unreadable(format!("ffmpeg init failed: {e}")))?;

        let (path, spill) = match source {
            VideoSource::Path(path) => (path.clone(), None),
            VideoSource::Bytes(bytes) => {
                let spill = spill_to_temp(bytes)?;
                (spill.path().to_path_buf(), Some(spill))
            }
        };
        let label = source.describe();

        let format_ctx = ffmpeg::format::input(&path)
            .map_err(|e| PipelineError::unreadable(format!("{label}: {e}")))?;

        let (video_stream_index, time_base, start_pts, stream_duration, native_fps, decoder) = {
            let stream = format_ctx
                .streams()
                .best(ffmpeg::media::Type::Video)
                .ok_or_else(|| PipelineError::unreadable(format!("{label}: no video stream found")))?;

            let codec_id = stream.parameters().id();
            if codec_id == ffmpeg::codec::Id::None {
                return Err(PipelineError::UnsupportedFormat(format!(
                    "{label}: unknown codec"
                )));
            }

            let context_decoder =
                ffmpeg::codec::context::Context::from_parameters(stream.parameters())
                    .map_err(|e| PipelineError::unreadable(format!("{label}: {e}")))?;
            let decoder = context_decoder.decoder().video().map_err(|e| match e {
                ffmpeg::Error::DecoderNotFound => PipelineError::UnsupportedFormat(format!(
                    "{label}: no decoder for codec {codec_id:?}"
                )),
                other => PipelineError::unreadable(format!("{label}: {other}")),
            })?;

            // AV_NOPTS_VALUE is i64::MIN
            let start = stream.start_time();
            let start_pts = if start == i64::MIN { 0 } else { start };

            let stream_duration = if stream.duration() > 0 {
                Some(pts_to_ms(stream.duration(), stream.time_base()))
            } else {
                None
            };

            let native_fps = [stream.avg_frame_rate(), stream.rate()]
                .into_iter()
                .map(f64::from)
                .find(|fps| fps.is_finite() && *fps > 0.0);

            (
                stream.index(),
                stream.time_base(),
                start_pts,
                stream_duration,
                native_fps,
                decoder,
            )
        };

        let width = decoder.width();
        let height = decoder.height();
        if width == 0 || height == 0 {
            return Err(PipelineError::unreadable(format!(
                "{label}: video stream has no frame size"
            )));
        }

        // Scale down to the analysis width, never up, keeping aspect ratio
        let out_width = analysis_width.clamp(1, width);
        let out_height = ((u64::from(height) * u64::from(out_width) + u64::from(width) / 2)
            / u64::from(width))
        .max(1) as u32;

        // Prefer the container duration, fall back to the stream's
        let duration_ms = if format_ctx.duration() > 0 {
            Some((format_ctx.duration() * 1000 / i64::from(ffmpeg::ffi::AV_TIME_BASE)) as u64)
        } else {
            stream_duration
        };

        let info = StreamInfo {
            duration_ms,
            native_fps,
            width: out_width,
            height: out_height,
        };

        debug!(
            source = %label,
            duration_ms = ?info.duration_ms,
            native_fps = ?info.native_fps,
            width,
            height,
            out_width,
            out_height,
            "decoder opened"
        );

        Ok(Self {
            format_ctx,
            video_stream_index,
            decoder,
            scaler: None,
            scaler_input: None,
            decoded: ffmpeg::frame::Video::empty(),
            scaled: ffmpeg::frame::Video::empty(),
            time_base,
            start_pts,
            info,
            frames_decoded: 0,
            skipped_packets: 0,
            eof_sent: false,
            finished: false,
            label,
            _spill: spill,
        })
    }

    /// Read packets until one is accepted by the decoder or the input ends
    fn feed_packet(&mut self) -> Result<()> {
        let mut packet = ffmpeg::Packet::empty();

        loop {
            match packet.read(&mut self.format_ctx) {
                Ok(()) => {
                    if packet.stream() != self.video_stream_index {
                        continue;
                    }

                    if let Err(e) = self.decoder.send_packet(&packet) {
                        // Corrupt packets are skipped, the stream may recover
                        self.skipped_packets += 1;
                        warn!(source = %self.label, error = %e, "skipping undecodable packet");
                        continue;
                    }
                    return Ok(());
                }
                Err(ffmpeg::Error::Eof) => {
                    self.decoder
                        .send_eof()
                        .map_err(|e| PipelineError::unreadable(format!("{}: {e}", self.label)))?;
                    self.eof_sent = true;
                    return Ok(());
                }
                Err(e) => {
                    return Err(PipelineError::unreadable(format!(
                        "{}: demux failed: {e}",
                        self.label
                    )))
                }
            }
        }
    }

    /// Scale the frame in `self.decoded` and copy it out as RGB
    fn convert_decoded(&mut self) -> Result<DecodedFrame> {
        let pts_ms = match self.decoded.timestamp().or(self.decoded.pts()) {
            Some(pts) => pts_to_ms(pts - self.start_pts, self.time_base),
            None => {
                // No timestamps at all: assume a constant native rate
                let fps = self.info.native_fps.unwrap_or(25.0);
                (self.frames_decoded as f64 * 1000.0 / fps).round() as u64
            }
        };
        self.frames_decoded += 1;

        let key = (
            self.decoded.format(),
            self.decoded.width(),
            self.decoded.height(),
        );
        if self.scaler.is_none() || self.scaler_input != Some(key) {
            let scaler = ffmpeg::software::scaling::Context::get(
                key.0,
                key.1,
                key.2,
                ffmpeg::format::Pixel::RGB24,
                self.info.width,
                self.info.height,
                ffmpeg::software::scaling::Flags::BILINEAR,
            )
            .map_err(|e| PipelineError::unreadable(format!("{}: scaler: {e}", self.label)))?;
            self.scaler = Some(scaler);
            self.scaler_input = Some(key);
        }

        let Some(scaler) = self.scaler.as_mut() else {
            return Err(PipelineError::unreadable("scaler unavailable"));
        };
        scaler
            .run(&self.decoded, &mut self.scaled)
            .map_err(|e| PipelineError::unreadable(format!("{}: scaling failed: {e}", self.label)))?;

        // Copy data accounting for stride
        let data = self.scaled.data(0);
        let stride = self.scaled.stride(0);
        let width = self.info.width as usize;
        let height = self.info.height as usize;

        let mut rgb_data = Vec::with_capacity(width * height * 3);
        for y in 0..height {
            let row_start = y * stride;
            let row_end = row_start + width * 3;
            rgb_data.extend_from_slice(&data[row_start..row_end]);
        }

        let image = RgbImage::from_raw(self.info.width, self.info.height, rgb_data)
            .ok_or_else(|| PipelineError::unreadable("decoded frame has unexpected size"))?;

        Ok(DecodedFrame { pts_ms, image })
    }
}

impl FrameDecoder for VideoDecoder {
    fn info(&self) -> StreamInfo {
        self.info
    }

    fn next_frame(&mut self) -> Result<Option<DecodedFrame>> {
        if self.finished {
            return Ok(None);
        }

        loop {
            match self.decoder.receive_frame(&mut self.decoded) {
                Ok(()) => return self.convert_decoded().map(Some),
                Err(ffmpeg::Error::Eof) => {
                    self.finished = true;
                    return Ok(None);
                }
                Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => {}
                Err(e) => {
                    return Err(PipelineError::unreadable(format!(
                        "{}: decode failed: {e}",
                        self.label
                    )))
                }
            }

            if self.eof_sent {
                self.finished = true;
                return Ok(None);
            }
            self.feed_packet()?;
        }
    }
}

impl Drop for VideoDecoder {
    fn drop(&mut self) {
        debug!(
            source = %self.label,
            frames_decoded = self.frames_decoded,
            skipped_packets = self.skipped_packets,
            "decoder released"
        );
    }
}

/// Convert a timestamp in `time_base` units to whole milliseconds
pub(crate) fn pts_to_ms(pts: i64, time_base: ffmpeg::Rational) -> u64 {
    let num = i128::from(time_base.numerator());
    let den = i128::from(time_base.denominator());
    if den == 0 {
        return 0;
    }

    let ms = (i128::from(pts) * num * 1000 + den / 2) / den;
    ms.clamp(0, i128::from(u64::MAX)) as u64
}

fn spill_to_temp(bytes: &[u8]) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("scene-pipeline-")
        .tempfile()
        .map_err(|e| PipelineError::unreadable(format!("failed to spill byte stream: {e}")))?;

    file.write_all(bytes)
        .and_then(|_| file.flush())
        .map_err(|e| PipelineError::unreadable(format!("failed to spill byte stream: {e}")))?;

    Ok(file)
}
