use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ffmpeg::codec;
use ffmpeg::ffi;
use tracing::{debug, warn};

use crate::QUEUE_WAIT;
use crate::decode::{PacketEntry, PacketQueue};
use crate::playback::VideoFrame;
use crate::playback::frame_queue::FrameQueue;

/// Fabricates a usable, monotonic PTS stream even when the source drops
/// timestamps.
///
/// Whenever a frame arrives with a real timestamp the predicted clock snaps
/// to it; a frame without one inherits the prediction. Either way the clock
/// then advances by one frame interval, stretched by half an interval per
/// `repeat_pict` tick.
pub struct VideoPtsSync {
    video_clock: f64,
    time_base: f64,
}

impl VideoPtsSync {
    pub fn new(time_base: f64) -> Self {
        Self {
            video_clock: 0.0,
            time_base,
        }
    }

    /// `pts` is the frame's timestamp in seconds, or 0.0 when the source had
    /// none. Returns the PTS to present the frame at.
    pub fn advance(&mut self, pts: f64, repeat_pict: f64) -> f64 {
        let pts = if pts != 0.0 {
            self.video_clock = pts;
            pts
        } else {
            self.video_clock
        };
        self.video_clock += self.time_base * (1.0 + repeat_pict * 0.5);
        pts
    }
}

/// Video decoder worker: drains the packet queue, decodes, stamps each frame
/// with a presentation time, and feeds the frame queue.
pub fn run(
    path: impl AsRef<Path>,
    stream_index: usize,
    packets: Arc<PacketQueue>,
    frames: Arc<FrameQueue<VideoFrame>>,
    stop: Arc<AtomicBool>,
) -> crate::Result<()> {
    // Re-open the source just long enough to build this stream's decoder.
    let ictx = ffmpeg::format::input(&path.as_ref())?;
    let stream = ictx
        .stream(stream_index)
        .ok_or(crate::Error::StreamNotFound("video"))?;
    let time_base = f64::from(stream.time_base());
    let context = codec::context::Context::from_parameters(stream.parameters())?;
    let mut decoder = context.decoder().video()?;
    drop(ictx);

    let mut pts_sync = VideoPtsSync::new(time_base);

    loop {
        let entry = match packets.pop_timeout(QUEUE_WAIT) {
            Some(entry) => entry,
            None => {
                if stop.load(Ordering::Relaxed) && packets.is_empty() {
                    break;
                }
                continue;
            }
        };

        match entry {
            PacketEntry::Flush => {
                decoder.flush();
                continue;
            }
            PacketEntry::Packet(packet) => {
                let packet_dts = packet.dts();
                if let Err(err) = decoder.send_packet(&packet) {
                    warn!("video decode submit failed: {err}");
                    return Err(err.into());
                }
                receive_frames(&mut decoder, packet_dts, time_base, &mut pts_sync, &frames)?;
            }
        }
    }

    // Drain frames still buffered inside the codec.
    let _ = decoder.send_eof();
    let _ = receive_frames(&mut decoder, None, time_base, &mut pts_sync, &frames);

    debug!("video decoder finished");
    Ok(())
}

fn receive_frames(
    decoder: &mut ffmpeg::decoder::Video,
    packet_dts: Option<i64>,
    time_base: f64,
    pts_sync: &mut VideoPtsSync,
    frames: &FrameQueue<VideoFrame>,
) -> crate::Result<()> {
    loop {
        let mut frame = ffmpeg::frame::Video::empty();
        match decoder.receive_frame(&mut frame) {
            Ok(()) => {
                let raw = packet_dts.or_else(|| frame.timestamp()).unwrap_or(0);
                let pts = raw as f64 * time_base;
                let repeat = unsafe { (*frame.as_ptr()).repeat_pict } as f64;
                let pts = pts_sync.advance(pts, repeat);
                frames.push(VideoFrame { frame, pts });
            }
            Err(ffmpeg::Error::Eof) => return Ok(()),
            Err(ffmpeg::Error::Other { errno }) if errno == ffi::EAGAIN => return Ok(()),
            Err(err) => {
                warn!("video decode failed: {err}");
                return Err(err.into());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TB: f64 = 1.0 / 25.0;

    #[test]
    fn valid_pts_resets_the_prediction() {
        let mut sync = VideoPtsSync::new(TB);
        assert_eq!(sync.advance(0.40, 0.0), 0.40);
        assert_eq!(sync.advance(0.44, 0.0), 0.44);
    }

    #[test]
    fn missing_pts_inherits_prediction_with_frame_spacing() {
        let mut sync = VideoPtsSync::new(TB);
        let a = sync.advance(0.40, 0.0);
        // Two stamp-less frames in a row continue at 1/fps spacing.
        let b = sync.advance(0.0, 0.0);
        let c = sync.advance(0.0, 0.0);
        assert!((b - (a + TB)).abs() < 1e-9);
        assert!((c - (a + 2.0 * TB)).abs() < 1e-9);
    }

    #[test]
    fn fabricated_pts_is_monotonic() {
        let mut sync = VideoPtsSync::new(TB);
        let mut last = -1.0;
        for i in 0..30 {
            // Every third frame has no timestamp.
            let pts = if i % 3 == 2 { 0.0 } else { (i + 1) as f64 * TB };
            let out = sync.advance(pts, 0.0);
            assert!(out > last, "frame {i}: {out} <= {last}");
            last = out;
        }
    }

    #[test]
    fn repeat_pict_stretches_the_prediction() {
        let mut sync = VideoPtsSync::new(TB);
        sync.advance(0.40, 1.0);
        // The repeated field holds the next frame back half an interval.
        let b = sync.advance(0.0, 0.0);
        assert!((b - (0.40 + 1.5 * TB)).abs() < 1e-9);
    }
}
