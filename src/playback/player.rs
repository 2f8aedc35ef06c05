use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use ffmpeg::codec;
use ffmpeg::format::Sample;
use ffmpeg::format::sample::Type as SampleType;
use ffmpeg::media::Type as MediaType;
use ffmpeg::software::resampling;
use parking_lot::Mutex;
use tracing::{error, info};

use crate::control::Controller;
use crate::decode::{self, PacketQueue};
use crate::demux::{self, DemuxSinks, SeekRequest};
use crate::display::VideoOutput;
use crate::error::{Error, Result};
use crate::playback::audio_producer::{AudioControls, AudioProducer};
use crate::playback::clock::{Clocks, SyncMode};
use crate::playback::frame_queue::FrameQueue;
use crate::playback::presenter;
use crate::playback::{AudioFrame, VideoFrame};
use crate::MAX_QUEUE_SIZE;

/// Output format of the audio side of the pipeline.
#[derive(Clone, Copy, Debug)]
pub struct AudioParams {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Owns the whole pipeline: queues, clocks, worker threads.
///
/// Construction probes the source and fails fatally on open/probe/stream
/// errors. [`Player::start`] spawns the demuxer, both decoders and the
/// presenter; shutdown is announced through one atomic flag and finalized by
/// joining every worker.
pub struct Player {
    path: PathBuf,
    stop: Arc<AtomicBool>,
    clocks: Arc<Clocks>,
    seek: Arc<SeekRequest>,
    controls: Arc<AudioControls>,

    video_packets: Arc<PacketQueue>,
    audio_packets: Arc<PacketQueue>,
    video_frames: Arc<FrameQueue<VideoFrame>>,
    audio_frames: Arc<FrameQueue<AudioFrame>>,

    producer: Mutex<Option<AudioProducer>>,
    handles: Mutex<Vec<JoinHandle<()>>>,

    video_index: usize,
    audio_index: usize,
    width: u32,
    height: u32,
    audio_params: AudioParams,
    duration: f64,
}

impl Player {
    /// Open and probe the source, locate the best video and audio streams,
    /// and prepare (but do not start) the pipeline.
    pub fn open(path: impl AsRef<Path>, mode: SyncMode) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        ffmpeg::init().map_err(Error::Open)?;
        let ictx = ffmpeg::format::input(&path).map_err(Error::Open)?;

        let (video_index, video_parameters) = {
            let stream = ictx
                .streams()
                .best(MediaType::Video)
                .ok_or(Error::StreamNotFound("video"))?;
            (stream.index(), stream.parameters())
        };
        let (audio_index, audio_parameters) = {
            let stream = ictx
                .streams()
                .best(MediaType::Audio)
                .ok_or(Error::StreamNotFound("audio"))?;
            (stream.index(), stream.parameters())
        };
        let duration = container_duration(ictx.duration());

        let video_decoder = codec::context::Context::from_parameters(video_parameters)?
            .decoder()
            .video()?;
        let width = video_decoder.width();
        let height = video_decoder.height();

        let audio_decoder = codec::context::Context::from_parameters(audio_parameters)?
            .decoder()
            .audio()?;
        let sample_rate = audio_decoder.rate();
        let channels = audio_decoder.channels() as u16;

        // Output format is packed S16 at the source rate and channel layout.
        let resampler = resampling::Context::get(
            audio_decoder.format(),
            audio_decoder.channel_layout(),
            sample_rate,
            Sample::I16(SampleType::Packed),
            audio_decoder.channel_layout(),
            sample_rate,
        )?;

        info!(
            source = %path.display(),
            width,
            height,
            sample_rate,
            channels,
            duration_secs = duration,
            "opened media source"
        );

        let stop = Arc::new(AtomicBool::new(false));
        let clocks = Arc::new(Clocks::new(mode, sample_rate, channels));
        let controls = Arc::new(AudioControls::new());
        let audio_frames = Arc::new(FrameQueue::new(MAX_QUEUE_SIZE));

        let producer = AudioProducer::new(
            Arc::clone(&audio_frames),
            resampler,
            Arc::clone(&clocks),
            Arc::clone(&controls),
            sample_rate,
            channels,
        );

        Ok(Self {
            path,
            stop,
            clocks,
            seek: Arc::new(SeekRequest::new()),
            controls,
            video_packets: Arc::new(PacketQueue::new(MAX_QUEUE_SIZE)),
            audio_packets: Arc::new(PacketQueue::new(MAX_QUEUE_SIZE)),
            video_frames: Arc::new(FrameQueue::new(MAX_QUEUE_SIZE)),
            audio_frames,
            producer: Mutex::new(Some(producer)),
            handles: Mutex::new(Vec::new()),
            video_index,
            audio_index,
            width,
            height,
            audio_params: AudioParams {
                sample_rate,
                channels,
            },
            duration,
        })
    }

    /// Spawn the demuxer, decoders and presenter.
    pub fn start(&self, output: impl VideoOutput) {
        let mut handles = self.handles.lock();

        let demux_handle = {
            let path = self.path.clone();
            let sinks = DemuxSinks {
                video_packets: Arc::clone(&self.video_packets),
                audio_packets: Arc::clone(&self.audio_packets),
                video_frames: Arc::clone(&self.video_frames),
                audio_frames: Arc::clone(&self.audio_frames),
            };
            let seek = Arc::clone(&self.seek);
            let stop = Arc::clone(&self.stop);
            let (video_index, audio_index) = (self.video_index, self.audio_index);
            spawn_named("demux", move || {
                if let Err(err) =
                    demux::run(&path, video_index, audio_index, sinks, seek, Arc::clone(&stop))
                {
                    error!("demuxer failed: {err}");
                    stop.store(true, Ordering::Relaxed);
                }
            })
        };

        let video_decode_handle = {
            let path = self.path.clone();
            let packets = Arc::clone(&self.video_packets);
            let frames = Arc::clone(&self.video_frames);
            let stop = Arc::clone(&self.stop);
            let index = self.video_index;
            spawn_named("video-decode", move || {
                if let Err(err) = decode::video::run(&path, index, packets, frames, stop) {
                    error!("video decoder failed: {err}");
                }
            })
        };

        let audio_decode_handle = {
            let path = self.path.clone();
            let packets = Arc::clone(&self.audio_packets);
            let frames = Arc::clone(&self.audio_frames);
            let stop = Arc::clone(&self.stop);
            let index = self.audio_index;
            spawn_named("audio-decode", move || {
                if let Err(err) = decode::audio::run(&path, index, packets, frames, stop) {
                    error!("audio decoder failed: {err}");
                }
            })
        };

        let present_handle = {
            let frames = Arc::clone(&self.video_frames);
            let clocks = Arc::clone(&self.clocks);
            let stop = Arc::clone(&self.stop);
            spawn_named("video-present", move || {
                presenter::run(frames, clocks, stop, output);
            })
        };

        handles.extend([
            demux_handle,
            video_decode_handle,
            audio_decode_handle,
            present_handle,
        ]);
    }

    /// The audio producer for the output device's pull callback. Yields
    /// `Some` exactly once.
    pub fn audio_producer(&self) -> Option<AudioProducer> {
        self.producer.lock().take()
    }

    /// A controller bound to this player's pipeline.
    pub fn controller(&self) -> Controller {
        Controller::new(
            Arc::clone(&self.clocks),
            Arc::clone(&self.seek),
            Arc::clone(&self.controls),
            Arc::clone(&self.stop),
        )
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn audio_params(&self) -> AudioParams {
        self.audio_params
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Current playback position on the master timeline, seconds.
    pub fn position(&self) -> f64 {
        master_position(&self.clocks)
    }

    pub fn is_ended(&self) -> bool {
        pipeline_ended(&self.stop, &self.video_frames, &self.audio_frames)
    }

    /// Announce shutdown. Workers observe the flag within one queue-wait
    /// interval.
    pub fn close(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Announce shutdown and join every worker. Queued packets and frames
    /// are released rather than played out.
    pub fn stop(&self) {
        self.close();
        self.video_packets.flush();
        self.audio_packets.flush();
        self.video_frames.flush();
        self.audio_frames.flush();
        let mut handles = self.handles.lock();
        for handle in handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn_named(name: &str, f: impl FnOnce() + Send + 'static) -> JoinHandle<()> {
    thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .expect("failed to spawn worker thread")
}

/// Seconds of media in the container; unknown durations read as zero.
fn container_duration(raw: i64) -> f64 {
    (raw as f64 / f64::from(ffmpeg::ffi::AV_TIME_BASE)).max(0.0)
}

/// Master-clock position clamped to the playable range.
fn master_position(clocks: &Clocks) -> f64 {
    clocks.master().max(0.0)
}

/// Playback has ended once shutdown is announced and both frame queues have
/// drained.
fn pipeline_ended(
    stop: &AtomicBool,
    video_frames: &FrameQueue<VideoFrame>,
    audio_frames: &FrameQueue<AudioFrame>,
) -> bool {
    stop.load(Ordering::Relaxed) && video_frames.is_empty() && audio_frames.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ffmpeg::format::Pixel;

    #[test]
    fn open_rejects_missing_source() {
        let err = Player::open("/nonexistent/clip.mkv", SyncMode::Audio).unwrap_err();
        assert!(matches!(err, Error::Open(_)));
    }

    #[test]
    fn container_duration_converts_and_clamps() {
        assert!((container_duration(2_500_000) - 2.5).abs() < 1e-9);
        // Containers without a known duration report a negative sentinel.
        assert_eq!(container_duration(-1), 0.0);
        assert_eq!(container_duration(i64::MIN), 0.0);
    }

    #[test]
    fn position_clamps_negative_master_clock() {
        let clocks = Clocks::new(SyncMode::Audio, 48_000, 2);
        clocks.set_audio_buffer(0, 0);

        // Pre-roll can put the audio clock slightly before zero.
        clocks.set_audio_clock(-0.25);
        assert_eq!(master_position(&clocks), 0.0);

        clocks.set_audio_clock(12.5);
        assert!((master_position(&clocks) - 12.5).abs() < 1e-9);
    }

    #[test]
    fn pipeline_is_ended_only_when_stopped_and_drained() {
        let stop = AtomicBool::new(false);
        let video_frames: FrameQueue<VideoFrame> = FrameQueue::new(8);
        let audio_frames: FrameQueue<AudioFrame> = FrameQueue::new(8);

        // Still running.
        assert!(!pipeline_ended(&stop, &video_frames, &audio_frames));

        video_frames.push(VideoFrame {
            frame: ffmpeg::frame::Video::new(Pixel::RGB24, 2, 2),
            pts: 0.0,
        });
        stop.store(true, Ordering::Relaxed);
        // Shutdown announced, but a frame is still queued.
        assert!(!pipeline_ended(&stop, &video_frames, &audio_frames));

        video_frames.flush();
        assert!(pipeline_ended(&stop, &video_frames, &audio_frames));
    }
}
