/// Decoded picture plus its presentation time in stream seconds.
pub struct VideoFrame {
    pub frame: ffmpeg::frame::Video,
    pub pts: f64,
}

/// Decoded audio frame plus presentation time and payload size.
///
/// `bytes` is the payload size in the playback format (packed S16 at the
/// source rate and channel count); the output callback advances the audio
/// clock past the frame by this amount.
pub struct AudioFrame {
    pub frame: ffmpeg::frame::Audio,
    pub pts: f64,
    pub bytes: u32,
}
