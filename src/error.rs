use thiserror::Error;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-wide error type.
///
/// Construction failures (open, probe, missing stream, codec setup) are the
/// fatal kind; everything downstream of construction is either absorbed by
/// the pipeline or reported through the stop flag.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to open media source: {0}")]
    Open(#[source] ffmpeg::Error),

    #[error("no {0} stream in source")]
    StreamNotFound(&'static str),

    #[error("codec error: {0}")]
    Codec(#[from] ffmpeg::Error),

    #[error("no audio output device found")]
    NoAudioDevice,

    #[error("audio output error: {0}")]
    AudioOutput(String),

    #[error("video output error: {0}")]
    VideoOutput(String),
}
