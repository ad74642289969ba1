//! Output device streams fed by a [`FrameConsumer`].

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample, StreamConfig};
use tracing::info;

use super::consumer::FrameConsumer;
use crate::error::SynthError;

/// Opens an output stream at `sample_rate` and starts it. The consumer is
/// drained from the device callback.
pub fn open_output(
    device_name: Option<&str>,
    sample_rate: u32,
    consumer: FrameConsumer,
) -> Result<cpal::Stream, SynthError> {
    let host = cpal::default_host();
    let device = select_device(&host, device_name)?;
    let supported = select_config(&device, sample_rate)?;
    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.config();

    let stream = build_stream(&device, &config, sample_format, consumer)?;
    stream
        .play()
        .map_err(|err| SynthError::Device(err.to_string()))?;

    info!(
        device = %device.name().unwrap_or_else(|_| "unknown".into()),
        sample_rate = config.sample_rate.0,
        channels = config.channels,
        ?sample_format,
        "output stream started"
    );
    Ok(stream)
}

fn select_device(host: &cpal::Host, selection: Option<&str>) -> Result<cpal::Device, SynthError> {
    if let Some(target) = selection {
        let devices = host
            .output_devices()
            .map_err(|err| SynthError::Device(err.to_string()))?;
        for device in devices {
            if device.name().map(|name| name == target).unwrap_or(false) {
                return Ok(device);
            }
        }
        return Err(SynthError::Device(format!("output device {target} not found")));
    }

    host.default_output_device()
        .ok_or_else(|| SynthError::Device("no output device available".into()))
}

fn select_config(
    device: &cpal::Device,
    sample_rate: u32,
) -> Result<cpal::SupportedStreamConfig, SynthError> {
    let desired = cpal::SampleRate(sample_rate);
    let configs = device
        .supported_output_configs()
        .map_err(|err| SynthError::Device(err.to_string()))?;

    let mut fallback = None;
    for range in configs {
        if range.min_sample_rate() <= desired && range.max_sample_rate() >= desired {
            if range.channels() == 2 {
                return Ok(range.with_sample_rate(desired));
            }
            fallback.get_or_insert(range.with_sample_rate(desired));
        }
    }
    fallback.ok_or_else(|| {
        SynthError::Device(format!("output device does not support {sample_rate} Hz"))
    })
}

fn build_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    sample_format: SampleFormat,
    consumer: FrameConsumer,
) -> Result<cpal::Stream, SynthError> {
    match sample_format {
        SampleFormat::F32 => build_typed::<f32>(device, config, consumer),
        SampleFormat::I16 => build_typed::<i16>(device, config, consumer),
        SampleFormat::U16 => build_typed::<u16>(device, config, consumer),
        SampleFormat::U8 => build_typed::<u8>(device, config, consumer),
        other => Err(SynthError::Device(format!(
            "unsupported sample format: {other:?}"
        ))),
    }
}

fn build_typed<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut consumer: FrameConsumer,
) -> Result<cpal::Stream, SynthError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = usize::from(config.channels);
    let mut scratch: Vec<f32> = Vec::new();
    let err_fn = |err| tracing::error!(?err, "audio stream error");

    device
        .build_output_stream(
            config,
            move |output: &mut [T], _: &cpal::OutputCallbackInfo| {
                if scratch.len() < output.len() {
                    scratch.resize(output.len(), 0.0);
                }
                let scratch = &mut scratch[..output.len()];
                consumer.fill_interleaved(scratch, channels);
                for (sample, value) in output.iter_mut().zip(scratch.iter()) {
                    *sample = T::from_sample(*value);
                }
            },
            err_fn,
            None,
        )
        .map_err(|err| SynthError::Device(err.to_string()))
}
