use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use ffmpeg::format::Pixel;
use ffmpeg::software::scaling;
use tracing::{debug, warn};

use crate::display::{DisplayFrame, VideoOutput};
use crate::playback::VideoFrame;
use crate::playback::clock::{Clocks, SyncMode};
use crate::playback::frame_queue::FrameQueue;
use crate::{NOSYNC_THRESHOLD, QUEUE_WAIT};

/// Smallest per-frame sync threshold, in seconds.
const SYNC_THRESHOLD_MIN: f64 = 0.01;

/// Natural delays outside (0, MAX_FRAME_DELAY) are treated as broken
/// timestamps and replaced by the previous delay.
const MAX_FRAME_DELAY: f64 = 1.0;

/// Floor on the scheduled sleep so a late frame still gets one tick of
/// presentation instead of being skipped outright.
const MIN_REFRESH: f64 = 0.010;

/// Per-frame pacing state for the presenter.
///
/// Scheduling is absolute: `frame_timer` accumulates every chosen delay and
/// each sleep is computed against total elapsed time, so per-frame errors do
/// not add up the way relative sleeps would.
pub struct FramePacer {
    frame_timer: f64,
    last_pts: f64,
    last_delay: f64,
}

impl FramePacer {
    pub fn new() -> Self {
        Self {
            frame_timer: 0.0,
            last_pts: 0.0,
            last_delay: 0.040,
        }
    }

    /// Natural inter-frame delay, adjusted against the reference clock when
    /// one is supplied (master is not the video clock).
    pub fn target_delay(&mut self, pts: f64, reference: Option<f64>) -> f64 {
        let mut delay = pts - self.last_pts;
        if delay <= 0.0 || delay >= MAX_FRAME_DELAY {
            delay = self.last_delay;
        }
        self.last_delay = delay;
        self.last_pts = pts;

        if let Some(reference) = reference {
            let diff = pts - reference;
            let sync_threshold = delay.max(SYNC_THRESHOLD_MIN);
            if diff.abs() < NOSYNC_THRESHOLD {
                if diff <= -sync_threshold {
                    // Behind the master: show immediately to catch up.
                    delay = 0.0;
                } else if diff >= sync_threshold {
                    // Ahead of the master: linger on the previous frame.
                    delay = 2.0 * delay;
                }
            }
        }
        delay
    }

    /// Fold `delay` into the absolute schedule and return how long to sleep
    /// given `elapsed` seconds of playback so far.
    pub fn schedule(&mut self, delay: f64, elapsed: f64) -> f64 {
        self.frame_timer += delay;
        let actual = self.frame_timer - elapsed;
        actual.max(MIN_REFRESH)
    }
}

impl Default for FramePacer {
    fn default() -> Self {
        Self::new()
    }
}

/// Video presenter loop: dequeue, convert, pace, present.
///
/// Owns the scaler; nothing else touches it. Exits when the stop flag is set
/// and the frame queue has drained.
pub fn run(
    frames: Arc<FrameQueue<VideoFrame>>,
    clocks: Arc<Clocks>,
    stop: Arc<AtomicBool>,
    mut output: impl VideoOutput,
) {
    let mut pacer = FramePacer::new();
    let mut scaler: Option<scaling::Context> = None;
    let start = clocks.playback_now();

    loop {
        if clocks.is_paused() {
            if stop.load(Ordering::Relaxed) {
                break;
            }
            thread::sleep(Duration::from_millis(10));
            continue;
        }

        let Some(video_frame) = frames.pop_timeout(QUEUE_WAIT) else {
            if stop.load(Ordering::Relaxed) && frames.is_empty() {
                break;
            }
            continue;
        };

        clocks.set_video_pts(video_frame.pts);

        let display = match convert(&mut scaler, &video_frame.frame, video_frame.pts) {
            Ok(display) => display,
            Err(err) => {
                // A single undisplayable frame is tolerable.
                warn!("pixel conversion failed: {err}");
                continue;
            }
        };

        if let Err(err) = output.render(display) {
            warn!("render failed: {err}");
        }

        let reference = (clocks.mode() != SyncMode::Video).then(|| clocks.audio());
        let delay = pacer.target_delay(video_frame.pts, reference);
        let sleep = pacer.schedule(delay, clocks.playback_now() - start);
        thread::sleep(Duration::from_secs_f64(sleep));

        if let Err(err) = output.present() {
            warn!("present failed: {err}");
        }
    }
    debug!("video presenter finished");
}

/// Convert a decoded frame to tightly packed RGBA at its own resolution.
fn convert(
    scaler: &mut Option<scaling::Context>,
    frame: &ffmpeg::frame::Video,
    pts: f64,
) -> Result<DisplayFrame, ffmpeg::Error> {
    let context = match scaler {
        Some(context) => {
            context.cached(
                frame.format(),
                frame.width(),
                frame.height(),
                Pixel::RGBA,
                frame.width(),
                frame.height(),
                scaling::Flags::BILINEAR,
            );
            context
        }
        None => scaler.insert(scaling::Context::get(
            frame.format(),
            frame.width(),
            frame.height(),
            Pixel::RGBA,
            frame.width(),
            frame.height(),
            scaling::Flags::BILINEAR,
        )?),
    };

    let mut rgba = ffmpeg::frame::Video::empty();
    context.run(frame, &mut rgba)?;

    let width = rgba.width() as usize;
    let height = rgba.height() as usize;
    let stride = rgba.stride(0);
    let plane = rgba.data(0);
    let row_bytes = width * 4;

    let mut data = Vec::with_capacity(row_bytes * height);
    for row in 0..height {
        let offset = row * stride;
        data.extend_from_slice(&plane[offset..offset + row_bytes]);
    }

    Ok(DisplayFrame {
        data,
        width: width as u32,
        height: height as u32,
        pts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn natural_delay_follows_pts_spacing() {
        let mut pacer = FramePacer::new();
        pacer.target_delay(0.00, None);
        let delay = pacer.target_delay(0.04, None);
        assert!((delay - 0.04).abs() < 1e-9);
    }

    #[test]
    fn broken_spacing_falls_back_to_previous_delay() {
        let mut pacer = FramePacer::new();
        pacer.target_delay(0.00, None);
        pacer.target_delay(0.04, None);
        // Backwards PTS (post-seek) and a multi-second gap both fall back.
        let delay = pacer.target_delay(0.02, None);
        assert!((delay - 0.04).abs() < 1e-9);
        let delay = pacer.target_delay(5.0, None);
        assert!((delay - 0.04).abs() < 1e-9);
    }

    #[test]
    fn behind_master_drops_delay_to_zero() {
        let mut pacer = FramePacer::new();
        pacer.target_delay(0.00, None);
        // Frame at 0.04, master already at 0.30.
        let delay = pacer.target_delay(0.04, Some(0.30));
        assert_eq!(delay, 0.0);
    }

    #[test]
    fn ahead_of_master_doubles_delay() {
        let mut pacer = FramePacer::new();
        pacer.target_delay(0.00, None);
        let delay = pacer.target_delay(0.04, Some(-0.30));
        assert!((delay - 0.08).abs() < 1e-9);
    }

    #[test]
    fn within_threshold_leaves_delay_untouched() {
        let mut pacer = FramePacer::new();
        pacer.target_delay(0.00, None);
        let delay = pacer.target_delay(0.04, Some(0.045));
        assert!((delay - 0.04).abs() < 1e-9);
    }

    #[test]
    fn wild_clock_difference_disables_adjustment() {
        let mut pacer = FramePacer::new();
        pacer.target_delay(0.00, None);
        // A 20-second disagreement is breakage, not drift.
        let delay = pacer.target_delay(0.04, Some(20.0));
        assert!((delay - 0.04).abs() < 1e-9);
    }

    #[test]
    fn video_master_pacing_is_identity() {
        // No reference clock: the natural delay is used as-is.
        let mut pacer = FramePacer::new();
        pacer.target_delay(0.00, None);
        for i in 1..10 {
            let pts = i as f64 * 0.04;
            let delay = pacer.target_delay(pts, None);
            assert!((delay - 0.04).abs() < 1e-9);
        }
    }

    #[test]
    fn schedule_is_absolute_not_relative() {
        let mut pacer = FramePacer::new();
        // Two 40 ms frames; we wake 30 ms into the second interval, so the
        // remaining sleep is 50 ms rather than a fresh 40 ms.
        let s = pacer.schedule(0.04, 0.0);
        assert!((s - 0.04).abs() < 1e-9);
        let s = pacer.schedule(0.04, 0.03);
        assert!((s - 0.05).abs() < 1e-9);
    }

    #[test]
    fn schedule_clamps_to_min_refresh() {
        let mut pacer = FramePacer::new();
        // Hopelessly behind schedule: still present for one tick.
        let s = pacer.schedule(0.04, 10.0);
        assert!((s - MIN_REFRESH).abs() < 1e-9);
    }
}
