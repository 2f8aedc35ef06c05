use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use ffmpeg::software::resampling;
use tracing::warn;

use crate::AUDIO_BUFFER_FRAMES;
use crate::playback::AudioFrame;
use crate::playback::clock::{Clocks, SyncMode};
use crate::playback::frame_queue::FrameQueue;
use crate::playback::sync::AudioDriftFilter;

struct AtomicF32 {
    inner: AtomicU32,
}

impl AtomicF32 {
    fn new(value: f32) -> Self {
        Self {
            inner: AtomicU32::new(value.to_bits()),
        }
    }

    fn load(&self, ordering: Ordering) -> f32 {
        f32::from_bits(self.inner.load(ordering))
    }

    fn store(&self, value: f32, ordering: Ordering) {
        self.inner.store(value.to_bits(), ordering);
    }
}

/// Volume and mute state, shared between the control side and the callback.
pub struct AudioControls {
    volume: AtomicF32,
    muted: AtomicBool,
}

impl AudioControls {
    pub fn new() -> Self {
        Self {
            volume: AtomicF32::new(1.0),
            muted: AtomicBool::new(false),
        }
    }

    pub fn volume(&self) -> f32 {
        self.volume.load(Ordering::Relaxed)
    }

    pub fn set_volume(&self, volume: f32) {
        self.volume.store(volume.clamp(0.0, 1.0), Ordering::Relaxed);
    }

    pub fn toggle_mute(&self) -> bool {
        let was = self.muted.load(Ordering::Relaxed);
        self.muted.store(!was, Ordering::Relaxed);
        !was
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }
}

impl Default for AudioControls {
    fn default() -> Self {
        Self::new()
    }
}

/// Fills the output device's pull buffer from the decoded-audio frame queue.
///
/// Runs on the output subsystem's callback thread. It never waits: the only
/// lock taken is the frame queue's, for a single pop. The resampler is owned
/// here and nowhere else.
pub struct AudioProducer {
    frames: Arc<FrameQueue<AudioFrame>>,
    resampler: resampling::Context,
    clocks: Arc<Clocks>,
    controls: Arc<AudioControls>,
    drift: AudioDriftFilter,
    bytes_per_sec: f64,
    buf: Vec<u8>,
    buf_size: usize,
    buf_index: usize,
}

impl AudioProducer {
    pub fn new(
        frames: Arc<FrameQueue<AudioFrame>>,
        resampler: resampling::Context,
        clocks: Arc<Clocks>,
        controls: Arc<AudioControls>,
        sample_rate: u32,
        channels: u16,
    ) -> Self {
        Self {
            frames,
            resampler,
            clocks,
            controls,
            drift: AudioDriftFilter::new(sample_rate, channels, AUDIO_BUFFER_FRAMES),
            bytes_per_sec: f64::from(sample_rate) * f64::from(channels) * 2.0,
            buf: Vec::with_capacity(192_000),
            buf_size: 0,
            buf_index: 0,
        }
    }

    /// Fill `out` completely with S16 sample bytes, silence-padding on
    /// underflow.
    pub fn fill(&mut self, out: &mut [u8]) {
        if self.clocks.is_paused() {
            out.fill(0);
            return;
        }

        let mut offset = 0;
        while offset < out.len() {
            if self.buf_index >= self.buf_size {
                let Some(frame) = self.frames.try_pop() else {
                    // Underflow: the device still needs exactly `len` bytes.
                    out[offset..].fill(0);
                    break;
                };

                // Store the PTS of the frame's end; the clock query discounts
                // the unconsumed staging bytes, so it reads as the PTS of the
                // sample entering the device.
                self.clocks
                    .set_audio_clock(frame.pts + f64::from(frame.bytes) / self.bytes_per_sec);

                let size = match self.resample(&frame.frame) {
                    Ok(size) => size,
                    Err(err) => {
                        warn!("audio resample failed: {err}");
                        continue;
                    }
                };

                let size = if self.clocks.mode() != SyncMode::Audio {
                    let diff = self.clocks.audio() - self.clocks.master();
                    self.drift.adjust(&mut self.buf, size, diff)
                } else {
                    size
                };

                self.buf_size = size;
                self.buf_index = 0;
                self.clocks.set_audio_buffer(size, 0);
            }

            let chunk = (self.buf_size - self.buf_index).min(out.len() - offset);
            out[offset..offset + chunk]
                .copy_from_slice(&self.buf[self.buf_index..self.buf_index + chunk]);
            self.buf_index += chunk;
            offset += chunk;
            self.clocks.set_audio_buffer(self.buf_size, self.buf_index);
        }

        self.apply_volume(out);
    }

    fn resample(&mut self, frame: &ffmpeg::frame::Audio) -> crate::Result<usize> {
        let mut resampled = ffmpeg::frame::Audio::empty();
        self.resampler.run(frame, &mut resampled)?;

        let size = resampled.samples() * usize::from(resampled.channels()) * 2;
        if self.buf.len() < size {
            self.buf.resize(size, 0);
        }
        self.buf[..size].copy_from_slice(&resampled.data(0)[..size]);
        Ok(size)
    }

    fn apply_volume(&self, out: &mut [u8]) {
        if self.controls.is_muted() {
            out.fill(0);
            return;
        }
        let volume = self.controls.volume();
        if (volume - 1.0).abs() < f32::EPSILON {
            return;
        }
        for sample in out.chunks_exact_mut(2) {
            let value = i16::from_ne_bytes([sample[0], sample[1]]);
            let scaled = (f32::from(value) * volume) as i16;
            sample.copy_from_slice(&scaled.to_ne_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MAX_QUEUE_SIZE;
    use ffmpeg::ChannelLayout;
    use ffmpeg::format::Sample;
    use ffmpeg::format::sample::Type;

    const RATE: u32 = 48_000;

    fn producer(clocks: Arc<Clocks>, controls: Arc<AudioControls>) -> AudioProducer {
        let frames = Arc::new(FrameQueue::new(MAX_QUEUE_SIZE));
        let resampler = resampling::Context::get(
            Sample::I16(Type::Packed),
            ChannelLayout::STEREO,
            RATE,
            Sample::I16(Type::Packed),
            ChannelLayout::STEREO,
            RATE,
        )
        .unwrap();
        AudioProducer::new(frames, resampler, clocks, controls, RATE, 2)
    }

    fn s16_frame(samples: usize, value: i16, pts: f64) -> AudioFrame {
        let mut frame =
            ffmpeg::frame::Audio::new(Sample::I16(Type::Packed), samples, ChannelLayout::STEREO);
        frame.set_rate(RATE);
        let bytes = samples * 2 * 2;
        for chunk in frame.data_mut(0)[..bytes].chunks_exact_mut(2) {
            chunk.copy_from_slice(&value.to_ne_bytes());
        }
        AudioFrame {
            frame,
            pts,
            bytes: bytes as u32,
        }
    }

    #[test]
    fn underflow_fills_exact_length_with_silence() {
        let clocks = Arc::new(Clocks::new(SyncMode::Audio, RATE, 2));
        let mut producer = producer(Arc::clone(&clocks), Arc::new(AudioControls::new()));

        let mut out = vec![0xAAu8; 1024];
        producer.fill(&mut out);
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn fill_streams_frame_bytes_and_updates_clock() {
        let clocks = Arc::new(Clocks::new(SyncMode::Audio, RATE, 2));
        let mut producer = producer(Arc::clone(&clocks), Arc::new(AudioControls::new()));

        producer.frames.push(s16_frame(256, 0x0123, 4.0));

        let mut out = vec![0u8; 256];
        producer.fill(&mut out);
        for chunk in out.chunks_exact(2) {
            assert_eq!(i16::from_ne_bytes([chunk[0], chunk[1]]), 0x0123);
        }

        // 64 of the frame's 256 sample frames have left the staging buffer,
        // so the clock points at the 64th sample past the frame's PTS.
        let expected = 4.0 + 64.0 / f64::from(RATE);
        assert!((clocks.audio() - expected).abs() < 1e-9);
    }

    #[test]
    fn drained_frame_leaves_clock_at_frame_end() {
        let clocks = Arc::new(Clocks::new(SyncMode::Audio, RATE, 2));
        let mut producer = producer(Arc::clone(&clocks), Arc::new(AudioControls::new()));

        producer.frames.push(s16_frame(256, 1, 2.0));
        let mut out = vec![0u8; 1024];
        producer.fill(&mut out);

        // The whole frame left the staging buffer, so the clock sits at its
        // end, 256 sample frames past the frame's PTS.
        let expected = 2.0 + 256.0 / f64::from(RATE);
        assert!((clocks.audio() - expected).abs() < 1e-9);
    }

    #[test]
    fn short_frame_is_padded_with_silence() {
        let clocks = Arc::new(Clocks::new(SyncMode::Audio, RATE, 2));
        let mut producer = producer(Arc::clone(&clocks), Arc::new(AudioControls::new()));

        // One 64-sample frame = 256 bytes, but the device wants 512.
        producer.frames.push(s16_frame(64, 0x0042, 0.0));

        let mut out = vec![0xAAu8; 512];
        producer.fill(&mut out);
        for chunk in out[..256].chunks_exact(2) {
            assert_eq!(i16::from_ne_bytes([chunk[0], chunk[1]]), 0x0042);
        }
        assert!(out[256..].iter().all(|&b| b == 0));
    }

    #[test]
    fn mute_silences_output() {
        let clocks = Arc::new(Clocks::new(SyncMode::Audio, RATE, 2));
        let controls = Arc::new(AudioControls::new());
        controls.toggle_mute();
        let mut producer = producer(clocks, Arc::clone(&controls));

        producer.frames.push(s16_frame(128, 0x7FFF, 0.0));
        let mut out = vec![0xAAu8; 256];
        producer.fill(&mut out);
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn volume_scales_samples() {
        let clocks = Arc::new(Clocks::new(SyncMode::Audio, RATE, 2));
        let controls = Arc::new(AudioControls::new());
        controls.set_volume(0.5);
        let mut producer = producer(clocks, Arc::clone(&controls));

        producer.frames.push(s16_frame(128, 1000, 0.0));
        let mut out = vec![0u8; 256];
        producer.fill(&mut out);
        for chunk in out.chunks_exact(2) {
            assert_eq!(i16::from_ne_bytes([chunk[0], chunk[1]]), 500);
        }
    }

    #[test]
    fn paused_output_is_silent_without_consuming() {
        let clocks = Arc::new(Clocks::new(SyncMode::Audio, RATE, 2));
        let mut producer = producer(Arc::clone(&clocks), Arc::new(AudioControls::new()));

        producer.frames.push(s16_frame(128, 0x0042, 0.0));
        clocks.pause();

        let mut out = vec![0xAAu8; 256];
        producer.fill(&mut out);
        assert!(out.iter().all(|&b| b == 0));
        assert_eq!(producer.frames.len(), 1);
    }

    #[test]
    fn audio_master_mode_never_resizes_frames() {
        let clocks = Arc::new(Clocks::new(SyncMode::Audio, RATE, 2));
        let mut producer = producer(Arc::clone(&clocks), Arc::new(AudioControls::new()));

        // 256 samples -> 1024 bytes exactly; any drift correction would
        // leave a remainder behind for the next fill.
        producer.frames.push(s16_frame(256, 7, 0.0));
        let mut out = vec![0u8; 1024];
        producer.fill(&mut out);
        assert_eq!(producer.buf_index, producer.buf_size);
        assert_eq!(producer.buf_size, 1024);
    }
}
