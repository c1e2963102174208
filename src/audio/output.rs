use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use super::buffer::AudioBuffer;
use super::types::EngineState;

/// Keeps a stream open on the default output device, reopening it when
/// the default device changes, until `shutdown` is raised.
pub fn run_output(buffer: Arc<AudioBuffer>, state: EngineState, shutdown: Arc<AtomicBool>) {
    let host = cpal::default_host();
    let mut current_device_name: Option<String> = None;
    let mut warned_no_device = false;

    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        let Some(device) = host.default_output_device() else {
            if !warned_no_device {
                log::warn!("[Output] No audio output device found");
                warned_no_device = true;
            }
            thread::sleep(Duration::from_secs(1));
            continue;
        };
        warned_no_device = false;

        let device_name = device.name().unwrap_or_default();
        if current_device_name.as_ref() != Some(&device_name) {
            if current_device_name.is_some() {
                log::info!("[Output] Default device changed to {}", device_name);
            }
            current_device_name = Some(device_name);
        }

        let config = match device.default_output_config() {
            Ok(c) => c,
            Err(e) => {
                log::error!("[Output] Failed to get device config: {}", e);
                thread::sleep(Duration::from_secs(1));
                continue;
            }
        };

        state
            .device_sample_rate
            .store(config.sample_rate().0, Ordering::Relaxed);

        let err_fn = |err| log::error!("[Output] Stream error: {}", err);
        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => {
                run_stream::<f32>(&device, &config.into(), buffer.clone(), state.clone(), err_fn)
            }
            cpal::SampleFormat::I16 => {
                run_stream::<i16>(&device, &config.into(), buffer.clone(), state.clone(), err_fn)
            }
            cpal::SampleFormat::U16 => {
                run_stream::<u16>(&device, &config.into(), buffer.clone(), state.clone(), err_fn)
            }
            _ => Err(cpal::BuildStreamError::StreamConfigNotSupported),
        };

        match stream {
            Ok(stream) => {
                if let Err(e) = stream.play() {
                    log::error!("[Output] Failed to start stream: {}", e);
                } else {
                    loop {
                        if shutdown.load(Ordering::Relaxed) {
                            break;
                        }
                        let name = host.default_output_device().and_then(|d| d.name().ok());
                        if name.as_ref() != current_device_name.as_ref() {
                            break;
                        }
                        thread::sleep(Duration::from_millis(500));
                    }
                }
            }
            Err(e) => log::error!("[Output] Failed to build stream: {}", e),
        }

        thread::sleep(Duration::from_millis(500));
    }

    log::info!("[Output] Thread stopped");
}

fn run_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    buffer: Arc<AudioBuffer>,
    state: EngineState,
    err_fn: impl Fn(cpal::StreamError) + Send + 'static,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = config.channels as usize;
    let mut stereo = Vec::new();

    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            if !state.is_playing.load(Ordering::Relaxed) || channels == 0 {
                data.fill(T::from_sample(0.0));
                return;
            }

            let frames = data.len() / channels;
            stereo.resize(frames * 2, 0.0);
            let read = buffer.pop_samples(&mut stereo);
            let read_frames = read / 2;

            for (i, frame) in data.chunks_exact_mut(channels).enumerate() {
                let (left, right) = if i < read_frames {
                    (stereo[i * 2], stereo[i * 2 + 1])
                } else {
                    (0.0, 0.0)
                };
                map_frame(frame, left, right);
            }

            if read_frames > 0 {
                state
                    .played_frames
                    .fetch_add(read_frames as u64, Ordering::Relaxed);
            }
        },
        err_fn,
        None,
    )
}

fn map_frame<T>(frame: &mut [T], left: f32, right: f32)
where
    T: cpal::Sample + cpal::FromSample<f32>,
{
    match frame.len() {
        1 => frame[0] = T::from_sample((left + right) * 0.5),
        _ => {
            for (c, sample) in frame.iter_mut().enumerate() {
                *sample = T::from_sample(match c {
                    0 => left,
                    1 => right,
                    _ => 0.0,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_frame_layouts() {
        let mut mono = [0.0f32];
        map_frame(&mut mono, 0.2, 0.4);
        assert!((mono[0] - 0.3).abs() < 1e-6);

        let mut surround = [1.0f32; 4];
        map_frame(&mut surround, 0.1, -0.1);
        assert_eq!(surround, [0.1, -0.1, 0.0, 0.0]);
    }
}
