// Background frame sampler - moves decoding off the segmenting thread
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::debug;

use super::decoder::FrameDecoder;
use super::sampler::{Frame, FrameSampler, FrameStream};
use crate::error::{PipelineError, Result};

/// Message sent from the sampling thread
enum Prefetched {
    /// Decoder opened, carries the effective sample rate
    Opened { sample_rate_fps: f64 },
    Frame(Frame),
    Failed(PipelineError),
    /// Stream exhausted
    End { duration_ms: u64 },
}

/// Frame sampler running on a background thread.
///
/// Architecture:
/// - The thread opens the decoder itself and samples it
/// - Frames travel over a bounded channel, so decoding stays at most
///   `capacity` frames ahead of the consumer
/// - Dropping the consumer disconnects the channel; the thread notices on
///   its next send, drops the decoder and exits
///
/// Frames come out in exactly the order the sequential sampler yields them.
pub struct PrefetchSampler {
    frame_rx: Option<Receiver<Prefetched>>,
    thread_handle: Option<JoinHandle<()>>,
    sample_rate_fps: f64,
    duration_ms: u64,
    finished: bool,
}

impl PrefetchSampler {
    /// Spawn the sampling thread and wait until the decoder is open.
    ///
    /// Open failures are returned here rather than from the first frame.
    pub fn spawn<F, D>(open: F, requested_fps: f64, capacity: usize) -> Result<Self>
    where
        F: FnOnce() -> Result<D> + Send + 'static,
        D: FrameDecoder,
    {
        let (frame_tx, frame_rx) = bounded(capacity.max(1));

        let thread_handle = thread::spawn(move || {
            sample_thread_main(open, requested_fps, frame_tx);
        });

        let mut sampler = Self {
            frame_rx: Some(frame_rx),
            thread_handle: Some(thread_handle),
            sample_rate_fps: requested_fps,
            duration_ms: 0,
            finished: false,
        };

        match sampler.recv() {
            Some(Prefetched::Opened { sample_rate_fps }) => {
                sampler.sample_rate_fps = sample_rate_fps;
                Ok(sampler)
            }
            Some(Prefetched::Failed(e)) => {
                sampler.finish();
                Err(e)
            }
            _ => {
                sampler.finish();
                Err(PipelineError::unreadable(
                    "frame prefetch thread stopped before opening the source",
                ))
            }
        }
    }

    fn recv(&self) -> Option<Prefetched> {
        self.frame_rx.as_ref()?.recv().ok()
    }

    /// Disconnect the channel and wait for the thread to exit
    fn finish(&mut self) {
        self.finished = true;
        self.frame_rx = None;

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Iterator for PrefetchSampler {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.recv() {
            Some(Prefetched::Frame(frame)) => Some(Ok(frame)),
            Some(Prefetched::Failed(e)) => {
                self.finish();
                Some(Err(e))
            }
            Some(Prefetched::End { duration_ms }) => {
                self.duration_ms = duration_ms;
                self.finish();
                None
            }
            Some(Prefetched::Opened { .. }) | None => {
                self.finish();
                Some(Err(PipelineError::unreadable(
                    "frame prefetch thread stopped unexpectedly",
                )))
            }
        }
    }
}

impl FrameStream for PrefetchSampler {
    fn sample_rate_fps(&self) -> f64 {
        self.sample_rate_fps
    }

    fn duration_ms(&self) -> u64 {
        self.duration_ms
    }
}

impl Drop for PrefetchSampler {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Sampling thread main loop
fn sample_thread_main<F, D>(open: F, requested_fps: f64, frame_tx: Sender<Prefetched>)
where
    F: FnOnce() -> Result<D>,
    D: FrameDecoder,
{
    let mut sampler = match open().and_then(|decoder| FrameSampler::new(decoder, requested_fps)) {
        Ok(sampler) => sampler,
        Err(e) => {
            let _ = frame_tx.send(Prefetched::Failed(e));
            return;
        }
    };

    let opened = Prefetched::Opened {
        sample_rate_fps: sampler.sample_rate_fps(),
    };
    if frame_tx.send(opened).is_err() {
        return;
    }

    for item in sampler.by_ref() {
        let message = match item {
            Ok(frame) => Prefetched::Frame(frame),
            Err(e) => Prefetched::Failed(e),
        };

        if frame_tx.send(message).is_err() {
            debug!("frame consumer went away, stopping prefetch");
            return;
        }
    }

    let _ = frame_tx.send(Prefetched::End {
        duration_ms: sampler.duration_ms(),
    });
}
