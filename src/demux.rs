use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use tracing::{debug, info, warn};

use crate::decode::PacketQueue;
use crate::playback::frame_queue::FrameQueue;
use crate::playback::{AudioFrame, VideoFrame};

/// A pending seek, armed by the control side and consumed by the demuxer.
///
/// While armed, the target fields are stable; arming is refused until the
/// demuxer disarms, so a request in flight cannot be overwritten.
pub struct SeekRequest {
    armed: AtomicBool,
    target_us: AtomicI64,
    backward: AtomicBool,
}

/// Snapshot of an armed request, taken by the demuxer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SeekTarget {
    pub target_us: i64,
    pub backward: bool,
}

impl SeekRequest {
    pub fn new() -> Self {
        Self {
            armed: AtomicBool::new(false),
            target_us: AtomicI64::new(0),
            backward: AtomicBool::new(false),
        }
    }

    /// Arm a seek to `target_us` microseconds. Returns `false` without
    /// touching anything if a request is already armed.
    pub fn arm(&self, target_us: i64, backward: bool) -> bool {
        if self.armed.load(Ordering::Acquire) {
            return false;
        }
        self.target_us.store(target_us, Ordering::Relaxed);
        self.backward.store(backward, Ordering::Relaxed);
        self.armed.store(true, Ordering::Release);
        true
    }

    /// Take and disarm the pending request, if any.
    pub fn take(&self) -> Option<SeekTarget> {
        if !self.armed.load(Ordering::Acquire) {
            return None;
        }
        let target = SeekTarget {
            target_us: self.target_us.load(Ordering::Relaxed),
            backward: self.backward.load(Ordering::Relaxed),
        };
        self.armed.store(false, Ordering::Release);
        Some(target)
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }
}

impl Default for SeekRequest {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the demuxer feeds or flushes, one set per stream.
pub struct DemuxSinks {
    pub video_packets: Arc<PacketQueue>,
    pub audio_packets: Arc<PacketQueue>,
    pub video_frames: Arc<FrameQueue<VideoFrame>>,
    pub audio_frames: Arc<FrameQueue<AudioFrame>>,
}

/// Demuxer loop: honor pending seeks, read packets, route them to the owning
/// stream's queue. EOF and read errors end playback via the stop flag.
pub fn run(
    path: impl AsRef<Path>,
    video_index: usize,
    audio_index: usize,
    sinks: DemuxSinks,
    seek: Arc<SeekRequest>,
    stop: Arc<AtomicBool>,
) -> crate::Result<()> {
    let mut ictx = ffmpeg::format::input(&path.as_ref())?;

    loop {
        if stop.load(Ordering::Relaxed) {
            break;
        }

        if let Some(target) = seek.take() {
            apply_seek(&mut ictx, target, &sinks);
        }

        let mut packet = ffmpeg::Packet::empty();
        match packet.read(&mut ictx) {
            Ok(()) => {
                let index = packet.stream();
                if index == video_index {
                    sinks.video_packets.push(packet);
                } else if index == audio_index {
                    sinks.audio_packets.push(packet);
                }
                // Other streams are discarded.
            }
            Err(ffmpeg::Error::Eof) => {
                info!("end of stream");
                break;
            }
            Err(err) => {
                // Transient read errors terminate the stream as EOF.
                warn!("read failed, ending stream: {err}");
                break;
            }
        }
    }

    stop.store(true, Ordering::Relaxed);
    debug!("demuxer finished");
    Ok(())
}

fn apply_seek(ictx: &mut ffmpeg::format::context::Input, target: SeekTarget, sinks: &DemuxSinks) {
    let ts = target.target_us;
    let seeked = if target.backward {
        ictx.seek(ts, ..ts)
    } else {
        ictx.seek(ts, ts..)
    };
    match seeked {
        Ok(()) => {
            debug!(
                target_us = ts,
                backward = target.backward,
                "seek applied, flushing queues"
            );
            // Flush both streams and leave a reset marker for each decoder.
            sinks.video_packets.flush();
            sinks.audio_packets.flush();
            sinks.video_frames.flush();
            sinks.audio_frames.flush();
        }
        Err(err) => {
            // Playback continues at the current position.
            warn!("seek to {ts}us failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arm_take_roundtrip() {
        let seek = SeekRequest::new();
        assert!(seek.arm(12_000_000, false));
        assert!(seek.is_armed());

        let target = seek.take().unwrap();
        assert_eq!(target.target_us, 12_000_000);
        assert!(!target.backward);
        assert!(!seek.is_armed());
        assert!(seek.take().is_none());
    }

    #[test]
    fn second_arm_is_rejected_while_armed() {
        let seek = SeekRequest::new();
        assert!(seek.arm(5_000_000, false));
        // Latest-wins is explicitly rejected: the in-flight request stands.
        assert!(!seek.arm(9_000_000, true));

        let target = seek.take().unwrap();
        assert_eq!(target.target_us, 5_000_000);
        assert!(!target.backward);
    }

    #[test]
    fn rearm_after_take_succeeds() {
        let seek = SeekRequest::new();
        assert!(seek.arm(1, false));
        seek.take();
        assert!(seek.arm(2, true));
        let target = seek.take().unwrap();
        assert_eq!(target.target_us, 2);
        assert!(target.backward);
    }

    #[test]
    fn backward_flag_is_preserved() {
        let seek = SeekRequest::new();
        seek.arm(-3_000_000, true);
        assert!(seek.take().unwrap().backward);
    }
}
