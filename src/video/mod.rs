// Video processing module
// Contains: ffmpeg decoding, uniform frame sampling, background prefetch

mod decoder;
mod prefetch;
mod sampler;

#[cfg(test)]
pub(crate) mod testing;

pub use decoder::{DecodedFrame, FrameDecoder, StreamInfo, VideoDecoder, VideoSource};
pub use prefetch::PrefetchSampler;
pub use sampler::{Frame, FrameSampler, FrameStream};
