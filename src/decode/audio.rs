use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ffmpeg::codec;
use ffmpeg::ffi;
use tracing::{debug, warn};

use crate::QUEUE_WAIT;
use crate::decode::{PacketEntry, PacketQueue};
use crate::playback::AudioFrame;
use crate::playback::frame_queue::FrameQueue;

/// Audio decoder worker: drains the packet queue, decodes, stamps each frame
/// with a presentation time, and feeds the frame queue consumed by the
/// output callback.
pub fn run(
    path: impl AsRef<Path>,
    stream_index: usize,
    packets: Arc<PacketQueue>,
    frames: Arc<FrameQueue<AudioFrame>>,
    stop: Arc<AtomicBool>,
) -> crate::Result<()> {
    let ictx = ffmpeg::format::input(&path.as_ref())?;
    let stream = ictx
        .stream(stream_index)
        .ok_or(crate::Error::StreamNotFound("audio"))?;
    let time_base = f64::from(stream.time_base());
    let context = codec::context::Context::from_parameters(stream.parameters())?;
    let mut decoder = context.decoder().audio()?;
    drop(ictx);

    // Frames without a stamp inherit the previous one.
    let mut last_pts = 0.0f64;

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
                let pts = match packet.pts() {
                    Some(raw) => raw as f64 * time_base,
                    None => last_pts,
                };
                last_pts = pts;

                if let Err(err) = decoder.send_packet(&packet) {
                    warn!("audio decode submit failed: {err}");
                    return Err(err.into());
                }
                receive_frames(&mut decoder, pts, &frames)?;
            }
        }
    }

    let _ = decoder.send_eof();
    let _ = receive_frames(&mut decoder, last_pts, &frames);

    debug!("audio decoder finished");
    Ok(())
}

fn receive_frames(
    decoder: &mut ffmpeg::decoder::Audio,
    pts: f64,
    frames: &FrameQueue<AudioFrame>,
) -> crate::Result<()> {
    loop {
        let mut frame = ffmpeg::frame::Audio::empty();
        match decoder.receive_frame(&mut frame) {
            Ok(()) => {
                // Payload size in the playback format (packed S16), used by
                // the output callback to advance the audio clock.
                let bytes = frame.samples() * usize::from(frame.channels()) * 2;
                frames.push(AudioFrame {
                    frame,
                    pts,
                    bytes: bytes as u32,
                });
            }
            Err(ffmpeg::Error::Eof) => return Ok(()),
            Err(ffmpeg::Error::Other { errno }) if errno == ffi::EAGAIN => return Ok(()),
            Err(err) => {
                warn!("audio decode failed: {err}");
                return Err(err.into());
            }
        }
    }
}
