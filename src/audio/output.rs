use cpal::{
    BufferSize, SampleRate, Stream, StreamConfig,
    traits::{DeviceTrait, HostTrait, StreamTrait},
};
use tracing::info;

use crate::error::{Error, Result};
use crate::playback::audio_producer::AudioProducer;
use crate::playback::player::AudioParams;
use crate::AUDIO_BUFFER_FRAMES;

/// Audio device wrapper. The stream plays for as long as this value lives;
/// keep it on the thread that created it.
pub struct AudioOutput {
    _stream: Stream,
}

impl AudioOutput {
    /// Open the default output device at the source's rate and channel
    /// count, signed 16-bit native-endian, and start pulling from
    /// `producer`.
    pub fn open(mut producer: AudioProducer, params: AudioParams) -> Result<Self> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(Error::NoAudioDevice)?;

        info!(
            device = %device.name().unwrap_or_default(),
            sample_rate = params.sample_rate,
            channels = params.channels,
            "audio output opened"
        );

        let config = StreamConfig {
            channels: params.channels,
            sample_rate: SampleRate(params.sample_rate),
            buffer_size: BufferSize::Fixed(AUDIO_BUFFER_FRAMES),
        };

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    producer.fill(bytemuck::cast_slice_mut(data));
                },
                |err| {
                    tracing::warn!("audio stream error: {err}");
                },
                None,
            )
            .map_err(|err| Error::AudioOutput(err.to_string()))?;

        stream
            .play()
            .map_err(|err| Error::AudioOutput(err.to_string()))?;

        Ok(Self { _stream: stream })
    }
}
