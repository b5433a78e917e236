use anyhow::{anyhow, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{error, info};

use crate::audio::Stereo;
use crate::engine::Engine;
use crate::{FRAMES_PER_BUFFER, INTERNAL_BUFFER_SIZE, SAMPLE_RATE};

/// Owns the output stream. The engine runs inside the stream callback;
/// dropping the host tears the stream down.
pub struct Host {
    stream: cpal::Stream,
}

impl Host {
    pub fn run(mut engine: Engine) -> Result<Host> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| anyhow!("no default output device"))?;
        info!("output device: {}", device.name()?);

        let config = cpal::StreamConfig {
            channels: 2,
            sample_rate: cpal::SampleRate(SAMPLE_RATE as u32),
            buffer_size: cpal::BufferSize::Fixed(FRAMES_PER_BUFFER as u32),
        };

        let mut scratch = vec![Stereo::ZERO; INTERNAL_BUFFER_SIZE];
        let stream = device.build_output_stream(
            &config,
            move |output: &mut [f32], _: &cpal::OutputCallbackInfo| {
                // The device may hand us more frames than one internal
                // buffer holds; render in chunks.
                for chunk in output.chunks_mut(2 * INTERNAL_BUFFER_SIZE) {
                    let frames = chunk.len() / 2;
                    let buffer = &mut scratch[..frames];
                    buffer.fill(Stereo::ZERO);
                    engine.render(buffer);
                    for (frame, out) in buffer.iter().zip(chunk.chunks_exact_mut(2)) {
                        out[0] = frame.channel(0);
                        out[1] = frame.channel(1);
                    }
                }
            },
            |err| error!("output stream error: {err}"),
            None,
        )?;
        stream.play()?;

        Ok(Host { stream })
    }

    pub fn shutdown(&self) -> Result<()> {
        self.stream.pause()?;
        Ok(())
    }
}
