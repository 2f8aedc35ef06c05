use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

/// Which timeline the other streams adjust to.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SyncMode {
    /// Audio hardware time drives; video paces itself against it (default).
    Audio,
    /// Video paces freely; audio resamples toward the video clock.
    Video,
    /// Wall time drives; both streams adjust.
    External,
}

struct AtomicF64 {
    inner: AtomicU64,
}

impl AtomicF64 {
    fn new(value: f64) -> Self {
        Self {
            inner: AtomicU64::new(value.to_bits()),
        }
    }

    fn load(&self, ordering: Ordering) -> f64 {
        f64::from_bits(self.inner.load(ordering))
    }

    fn store(&self, value: f64, ordering: Ordering) {
        self.inner.store(value.to_bits(), ordering);
    }
}

/// Shared clock state for the whole pipeline.
///
/// Three time sources are reconciled here: the audio clock (PTS of the audio
/// currently being handed to the device, less the part still sitting in the
/// output buffer), the video clock (last presented PTS extrapolated by wall
/// time), and an external wall clock. Writers are single per field; readers
/// may observe a snapshot up to one frame stale, which the sync loops
/// tolerate.
pub struct Clocks {
    mode: SyncMode,
    epoch: Instant,

    // Written by the audio callback, read by clock queries.
    audio_clock: AtomicF64,
    audio_buf_size: AtomicUsize,
    audio_buf_index: AtomicUsize,
    audio_bytes_per_sec: f64,

    // Written by the presenter only.
    video_pts: AtomicF64,
    video_pts_time: AtomicF64,

    // Pause bookkeeping: accumulated paused seconds plus the start of the
    // current pause, if any.
    pause_offset: AtomicF64,
    paused_at: Mutex<Option<Instant>>,
}

impl Clocks {
    /// `sample_rate`/`channels` describe the audio output format (packed
    /// S16), fixing the byte rate used to discount unplayed buffer content.
    pub fn new(mode: SyncMode, sample_rate: u32, channels: u16) -> Self {
        Self {
            mode,
            epoch: Instant::now(),
            audio_clock: AtomicF64::new(0.0),
            audio_buf_size: AtomicUsize::new(0),
            audio_buf_index: AtomicUsize::new(0),
            audio_bytes_per_sec: f64::from(sample_rate) * f64::from(channels) * 2.0,
            video_pts: AtomicF64::new(0.0),
            video_pts_time: AtomicF64::new(0.0),
            pause_offset: AtomicF64::new(0.0),
            paused_at: Mutex::new(None),
        }
    }

    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    /// Seconds of playback wall time: time since construction minus every
    /// paused span. Frozen while paused.
    pub fn playback_now(&self) -> f64 {
        let mut now = self.epoch.elapsed().as_secs_f64();
        if let Some(paused_at) = *self.paused_at.lock() {
            now -= paused_at.elapsed().as_secs_f64();
        }
        now - self.pause_offset.load(Ordering::Relaxed)
    }

    pub fn pause(&self) {
        let mut paused_at = self.paused_at.lock();
        if paused_at.is_none() {
            *paused_at = Some(Instant::now());
        }
    }

    pub fn resume(&self) {
        let mut paused_at = self.paused_at.lock();
        if let Some(at) = paused_at.take() {
            let offset = self.pause_offset.load(Ordering::Relaxed);
            self.pause_offset
                .store(offset + at.elapsed().as_secs_f64(), Ordering::Relaxed);
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at.lock().is_some()
    }

    /// Called by the audio callback when it starts draining a new frame.
    pub fn set_audio_clock(&self, pts: f64) {
        self.audio_clock.store(pts, Ordering::Release);
    }

    /// Publish the staging-buffer fill state (total bytes, consumed bytes).
    pub fn set_audio_buffer(&self, size: usize, index: usize) {
        self.audio_buf_size.store(size, Ordering::Relaxed);
        self.audio_buf_index.store(index, Ordering::Relaxed);
    }

    /// Audio timeline position: the stored PTS minus the duration of sample
    /// bytes produced into the output buffer but not yet consumed.
    pub fn audio(&self) -> f64 {
        let pts = self.audio_clock.load(Ordering::Acquire);
        let size = self.audio_buf_size.load(Ordering::Relaxed);
        let index = self.audio_buf_index.load(Ordering::Relaxed);
        let pending = size.saturating_sub(index) as f64 / self.audio_bytes_per_sec;
        pts - pending
    }

    /// Called by the presenter when a frame is handed to the display.
    pub fn set_video_pts(&self, pts: f64) {
        self.video_pts.store(pts, Ordering::Relaxed);
        self.video_pts_time
            .store(self.playback_now(), Ordering::Relaxed);
    }

    /// Video timeline position: last presented PTS extrapolated by the wall
    /// time elapsed since presentation.
    pub fn video(&self) -> f64 {
        let pts = self.video_pts.load(Ordering::Relaxed);
        let at = self.video_pts_time.load(Ordering::Relaxed);
        pts + (self.playback_now() - at)
    }

    /// Wall-clock seconds since construction, excluding paused spans.
    pub fn external(&self) -> f64 {
        self.playback_now()
    }

    /// The reference timeline selected by the sync mode.
    pub fn master(&self) -> f64 {
        match self.mode {
            SyncMode::Audio => self.audio(),
            SyncMode::Video => self.video(),
            SyncMode::External => self.external(),
        }
    }
}
