use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, info};

use crate::demux::SeekRequest;
use crate::playback::audio_producer::AudioControls;
use crate::playback::clock::Clocks;

/// Seek increment for the left/right keys, seconds.
pub const SEEK_STEP_SMALL: f64 = 10.0;
/// Seek increment for the up/down keys, seconds.
pub const SEEK_STEP_LARGE: f64 = 60.0;

const VOLUME_STEP: f32 = 0.1;

/// A user intention, as produced by the event source.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ControlEvent {
    Quit,
    /// Seek relative to the master clock, in seconds.
    SeekBy(f64),
    TogglePause,
    ToggleMute,
    VolumeUp,
    VolumeDown,
}

/// Translates user events into pipeline requests.
pub struct Controller {
    clocks: Arc<Clocks>,
    seek: Arc<SeekRequest>,
    controls: Arc<AudioControls>,
    stop: Arc<AtomicBool>,
}

impl Controller {
    pub fn new(
        clocks: Arc<Clocks>,
        seek: Arc<SeekRequest>,
        controls: Arc<AudioControls>,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            clocks,
            seek,
            controls,
            stop,
        }
    }

    /// Apply one event.
    pub fn handle(&self, event: ControlEvent) {
        match event {
            ControlEvent::Quit => {
                info!("quit requested");
                self.stop.store(true, Ordering::Relaxed);
            }
            ControlEvent::SeekBy(increment) => {
                let target = self.clocks.master() + increment;
                let target_us = (target * 1_000_000.0) as i64;
                // A request already in flight wins; this one is dropped.
                if self.seek.arm(target_us.max(0), increment < 0.0) {
                    debug!(target_us, "seek armed");
                }
            }
            ControlEvent::TogglePause => {
                if self.clocks.is_paused() {
                    self.clocks.resume();
                } else {
                    self.clocks.pause();
                }
            }
            ControlEvent::ToggleMute => {
                self.controls.toggle_mute();
            }
            ControlEvent::VolumeUp => {
                self.controls.set_volume(self.controls.volume() + VOLUME_STEP);
            }
            ControlEvent::VolumeDown => {
                self.controls.set_volume(self.controls.volume() - VOLUME_STEP);
            }
        }
    }

    /// Event loop: drain the source until quit or shutdown.
    pub fn run(&self, events: Receiver<ControlEvent>) {
        loop {
            if self.stop.load(Ordering::Relaxed) {
                break;
            }
            match events.recv_timeout(Duration::from_secs(1)) {
                Ok(ControlEvent::Quit) => {
                    self.handle(ControlEvent::Quit);
                    break;
                }
                Ok(event) => self.handle(event),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!("control loop finished");
    }
}
