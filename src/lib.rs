//! Threaded media-player core.
//!
//! The pipeline reads a container-multiplexed source, routes compressed
//! packets into bounded per-stream queues, decodes each stream on its own
//! thread, and plays the decoded frames back against a selectable master
//! clock (audio, video, or wall time). Seeks flush the queues and leave an
//! in-band marker so the decoders reset their codec buffers.
//!
//! ```text
//! source -> demux -> packet_q[v|a] -> decode[v|a] -> frame_q[v|a]
//!                                                      |        \
//!                                                 presenter   audio callback
//! ```

use std::time::Duration;

pub mod control;
pub mod decode;
pub mod demux;
pub mod display;
pub mod error;
pub mod logging;
pub mod playback;

#[cfg(feature = "audio-out")]
pub mod audio;

pub use control::{ControlEvent, Controller};
pub use display::{DisplayFrame, NullOutput, VideoOutput};
pub use error::{Error, Result};
pub use playback::clock::{Clocks, SyncMode};
pub use playback::player::{AudioParams, Player};

/// Capacity of every packet and frame queue, in entries. Overflow drops the
/// oldest entry: real-time demuxing must not stall behind a slow consumer.
pub const MAX_QUEUE_SIZE: usize = 1024;

/// How long workers wait on an empty queue before re-checking the stop flag.
pub const QUEUE_WAIT: Duration = Duration::from_secs(1);

/// Differences beyond this many seconds are treated as clock breakage rather
/// than drift, and no correction is attempted.
pub const NOSYNC_THRESHOLD: f64 = 10.0;

/// Number of audio callbacks the drift estimator observes before it trusts
/// its moving average.
pub const AUDIO_DIFF_AVG_COUNT: u32 = 10;

/// Bound on audio resample-length correction, in percent of the frame size.
pub const SAMPLE_CORRECTION_MAX_PCT: usize = 10;

/// Sample frames per hardware audio buffer requested from the device.
pub const AUDIO_BUFFER_FRAMES: u32 = 1024;
