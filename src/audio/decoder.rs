use std::collections::VecDeque;
use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;

use super::buffer::AudioBuffer;
use super::types::{DecoderCommand, EngineState, OpenedMedia, DECODE_HEADROOM};
use crate::errors::AppError;
use crate::playback::{EngineEvent, EngineEventSink};

const POSITION_REPORT_INTERVAL: Duration = Duration::from_millis(250);
const RESAMPLER_CHUNK: usize = 1024;

struct ActiveMedia {
    reader: Box<dyn symphonia::core::formats::FormatReader>,
    decoder: Box<dyn symphonia::core::codecs::Decoder>,
    track_id: u32,
    events: EngineEventSink,
    sample_buf: Option<SampleBuffer<f32>>,
    converter: RateConverter,
    /// Decoded stereo samples the ring had no room for yet.
    pending: Vec<f32>,
    started: bool,
    reached_eof: bool,
    last_report: Instant,
}

/// Probes `path` and prepares a decoder for its first audio track.
pub fn open_media(path: &Path) -> Result<OpenedMedia, AppError> {
    let file = File::open(path).map_err(|e| AppError::Engine(format!("{}: {}", path.display(), e)))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let format_opts = FormatOptions {
        enable_gapless: true,
        ..Default::default()
    };
    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &format_opts, &MetadataOptions::default())
        .map_err(|e| AppError::Engine(format!("Unsupported media: {}", e)))?;

    let reader = probed.format;
    let track = reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AppError::Engine("No playable audio track".to_string()))?;

    let track_id = track.id;
    let sample_rate = track.codec_params.sample_rate.unwrap_or(44100);
    let duration_frames = track.codec_params.n_frames;
    let decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| AppError::Engine(format!("Unsupported codec: {}", e)))?;

    Ok(OpenedMedia {
        reader,
        decoder,
        track_id,
        sample_rate,
        duration_frames,
    })
}

pub fn decoder_thread(
    command_rx: Receiver<DecoderCommand>,
    buffer: Arc<AudioBuffer>,
    state: EngineState,
    shutdown: Arc<AtomicBool>,
) {
    let mut current: Option<ActiveMedia> = None;
    log::info!("[Decoder] Thread started");

    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        let command = if current.is_some() && state.is_playing.load(Ordering::Relaxed) {
            command_rx.try_recv().ok()
        } else {
            command_rx.recv_timeout(Duration::from_millis(100)).ok()
        };

        if let Some(cmd) = command {
            match cmd {
                DecoderCommand::Load { media, events } => {
                    buffer.clear();
                    state.reset_position(0);

                    let device_rate = state.device_sample_rate.load(Ordering::Relaxed);
                    current = Some(ActiveMedia {
                        reader: media.reader,
                        decoder: media.decoder,
                        track_id: media.track_id,
                        events,
                        sample_buf: None,
                        converter: RateConverter::new(media.sample_rate, device_rate),
                        pending: Vec::new(),
                        started: false,
                        reached_eof: false,
                        last_report: Instant::now(),
                    });
                }
                DecoderCommand::Seek(position_ms) => {
                    if let Some(media) = current.as_mut() {
                        seek(media, position_ms, &buffer, &state);
                    }
                }
                DecoderCommand::Stop => {
                    buffer.clear();
                    state.reset_position(0);
                    current = None;
                }
            }
        }

        let Some(media) = current.as_mut() else {
            continue;
        };

        if !state.is_playing.load(Ordering::Relaxed) {
            thread::sleep(Duration::from_millis(10));
            continue;
        }

        let device_rate = state.device_sample_rate.load(Ordering::Relaxed);
        if media.converter.follow_device(device_rate, &mut media.pending) {
            log::info!(
                "[Decoder] Output rate is now {} Hz, resampling from {} Hz",
                device_rate,
                media.converter.source_rate
            );
        }

        if media.last_report.elapsed() >= POSITION_REPORT_INTERVAL {
            media.events.emit(EngineEvent::PositionChanged(state.position_ms()));
            media.last_report = Instant::now();
        }

        match step(media, &buffer) {
            Step::Continue => {}
            Step::Wait => thread::sleep(Duration::from_micros(500)),
            Step::Drained => {
                log::info!("[Decoder] End of stream");
                media.events.emit(EngineEvent::PositionChanged(state.position_ms()));
                media.events.emit(EngineEvent::EndReached);
                state.is_playing.store(false, Ordering::Relaxed);
                current = None;
            }
            Step::Failed(message) => {
                log::error!("[Decoder] {}", message);
                media.events.emit(EngineEvent::Error(message));
                state.is_playing.store(false, Ordering::Relaxed);
                buffer.clear();
                current = None;
            }
        }
    }

    log::info!("[Decoder] Thread stopped");
}

enum Step {
    Continue,
    Wait,
    Drained,
    Failed(String),
}

fn step(media: &mut ActiveMedia, buffer: &AudioBuffer) -> Step {
    if !media.pending.is_empty() {
        let written = buffer.push_samples(&media.pending);
        media.pending.drain(..written);
        if written > 0 && !media.started {
            media.started = true;
            media.events.emit(EngineEvent::Started);
        }
        return if media.pending.is_empty() {
            Step::Continue
        } else {
            Step::Wait
        };
    }

    if media.reached_eof {
        return if buffer.occupied() < DECODE_HEADROOM {
            Step::Drained
        } else {
            Step::Wait
        };
    }

    if buffer.available_space() < DECODE_HEADROOM {
        return Step::Wait;
    }

    let packet = match media.reader.next_packet() {
        Ok(packet) => packet,
        Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            media.reached_eof = true;
            media.converter.flush(&mut media.pending);
            return Step::Continue;
        }
        Err(SymphoniaError::ResetRequired) => {
            media.decoder.reset();
            return Step::Continue;
        }
        Err(e) => return Step::Failed(format!("Read error: {}", e)),
    };

    if packet.track_id() != media.track_id {
        return Step::Continue;
    }

    match media.decoder.decode(&packet) {
        Ok(decoded) => {
            let spec = *decoded.spec();
            let channels = spec.channels.count();
            let capacity = decoded.capacity() as u64;
            let needs_new = media
                .sample_buf
                .as_ref()
                .map(|buf| buf.capacity() < capacity as usize * channels)
                .unwrap_or(true);
            if needs_new {
                media.sample_buf = Some(SampleBuffer::new(capacity, spec));
            }

            if let Some(buf) = media.sample_buf.as_mut() {
                buf.copy_interleaved_ref(decoded);
                let stereo = to_stereo(buf.samples(), channels);
                media.converter.process(&stereo, &mut media.pending);
            }
            Step::Continue
        }
        // Corrupt packets are skipped.
        Err(SymphoniaError::DecodeError(e)) => {
            log::warn!("[Decoder] Skipping bad packet: {}", e);
            Step::Continue
        }
        Err(e) => Step::Failed(format!("Decode error: {}", e)),
    }
}

fn seek(media: &mut ActiveMedia, position_ms: u64, buffer: &AudioBuffer, state: &EngineState) {
    let seek_time = Time::new(position_ms / 1000, (position_ms % 1000) as f64 / 1000.0);
    match media.reader.seek(
        SeekMode::Accurate,
        SeekTo::Time {
            time: seek_time,
            track_id: None,
        },
    ) {
        Ok(_) => {
            media.decoder.reset();
            media.converter.reset();
            media.pending.clear();
            media.reached_eof = false;
            buffer.clear();
            state.reset_position(position_ms);
        }
        Err(e) => log::warn!("[Decoder] Seek to {}ms failed: {}", position_ms, e),
    }
}

fn build_resampler(source_rate: u32, device_rate: u32) -> Option<SincFixedIn<f32>> {
    if device_rate == 0 || device_rate == source_rate {
        return None;
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        window: WindowFunction::BlackmanHarris2,
        oversampling_factor: 128,
    };
    match SincFixedIn::<f32>::new(
        device_rate as f64 / source_rate as f64,
        2.0,
        params,
        RESAMPLER_CHUNK,
        2,
    ) {
        Ok(r) => Some(r),
        Err(e) => {
            log::warn!("[Decoder] Resampler unavailable ({} -> {}): {}", source_rate, device_rate, e);
            None
        }
    }
}

/// Folds any channel layout into interleaved stereo.
pub fn to_stereo(samples: &[f32], channels: usize) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.iter().flat_map(|&s| [s, s]).collect(),
        2 => samples.to_vec(),
        n => samples
            .chunks_exact(n)
            .flat_map(|frame| [frame[0], frame[1]])
            .collect(),
    }
}

/// Converts interleaved stereo from the media's rate to the output
/// device's rate. Passes samples through while the rates match or the
/// device rate is still unknown.
struct RateConverter {
    source_rate: u32,
    device_rate: u32,
    resampler: Option<SincFixedIn<f32>>,
    input: Vec<Vec<f32>>,
    accumulator: VecDeque<f32>,
}

impl RateConverter {
    fn new(source_rate: u32, device_rate: u32) -> Self {
        Self {
            source_rate,
            device_rate,
            resampler: build_resampler(source_rate, device_rate),
            input: vec![vec![0.0; RESAMPLER_CHUNK]; 2],
            accumulator: VecDeque::new(),
        }
    }

    /// Rebuilds the resampler when the device rate moved. Samples held
    /// for the old resampler are flushed to `out` first. Returns whether
    /// anything changed.
    fn follow_device(&mut self, device_rate: u32, out: &mut Vec<f32>) -> bool {
        if device_rate == self.device_rate {
            return false;
        }
        self.flush(out);
        self.device_rate = device_rate;
        self.resampler = build_resampler(self.source_rate, device_rate);
        true
    }

    #[allow(clippy::needless_range_loop)]
    fn process(&mut self, samples: &[f32], out: &mut Vec<f32>) {
        let Some(resampler) = self.resampler.as_mut() else {
            out.extend_from_slice(samples);
            return;
        };

        self.accumulator.extend(samples.iter());
        let chunk_size = resampler.input_frames_max();
        let channels = 2;
        let chunk_len = chunk_size * channels;

        if self.input.iter().any(|c| c.len() != chunk_size) {
            self.input = vec![vec![0.0; chunk_size]; channels];
        }

        while self.accumulator.len() >= chunk_len {
            for c in 0..channels {
                for i in 0..chunk_size {
                    self.input[c][i] = self.accumulator[(i * channels) + c];
                }
            }
            self.accumulator.drain(0..chunk_len);

            match resampler.process(&self.input, None) {
                Ok(output_frames) => {
                    let out_len = output_frames[0].len();
                    for i in 0..out_len {
                        for c in 0..channels {
                            out.push(output_frames[c][i]);
                        }
                    }
                }
                Err(e) => log::warn!("[Decoder] Resampling failed: {}", e),
            }
        }
    }

    /// The resampler only takes whole chunks; the tail goes out
    /// unresampled rather than being lost.
    fn flush(&mut self, out: &mut Vec<f32>) {
        out.extend(self.accumulator.drain(..));
    }

    fn reset(&mut self) {
        self.accumulator.clear();
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use std::path::PathBuf;

    fn write_silent_wav(path: &PathBuf, sample_rate: u32, frames: u32) {
        let data_len = frames * 2;
        let mut file = fs::File::create(path).unwrap();
        file.write_all(b"RIFF").unwrap();
        file.write_all(&(36 + data_len).to_le_bytes()).unwrap();
        file.write_all(b"WAVEfmt ").unwrap();
        file.write_all(&16u32.to_le_bytes()).unwrap();
        file.write_all(&1u16.to_le_bytes()).unwrap(); // PCM
        file.write_all(&1u16.to_le_bytes()).unwrap(); // mono
        file.write_all(&sample_rate.to_le_bytes()).unwrap();
        file.write_all(&(sample_rate * 2).to_le_bytes()).unwrap();
        file.write_all(&2u16.to_le_bytes()).unwrap();
        file.write_all(&16u16.to_le_bytes()).unwrap();
        file.write_all(b"data").unwrap();
        file.write_all(&data_len.to_le_bytes()).unwrap();
        file.write_all(&vec![0u8; data_len as usize]).unwrap();
    }

    #[test]
    fn test_open_media_reads_wav_header() {
        let path = std::env::temp_dir().join(format!("tapedeck-{}.wav", uuid::Uuid::new_v4()));
        write_silent_wav(&path, 8_000, 12_000);

        let media = open_media(&path).unwrap();
        assert_eq!(media.sample_rate, 8_000);
        assert_eq!(media.duration_frames, Some(12_000));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_open_media_rejects_garbage() {
        let path = std::env::temp_dir().join(format!("tapedeck-{}.mp3", uuid::Uuid::new_v4()));
        fs::write(&path, b"definitely not audio").unwrap();

        assert!(matches!(open_media(&path), Err(AppError::Engine(_))));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_converter_follows_device_rate() {
        let samples = vec![0.25; 4 * RESAMPLER_CHUNK];
        let mut out = Vec::new();

        // Device rate not known yet.
        let mut converter = RateConverter::new(24_000, 0);
        converter.process(&samples, &mut out);
        assert_eq!(out.len(), samples.len());

        out.clear();
        assert!(converter.follow_device(48_000, &mut out));
        assert!(!converter.follow_device(48_000, &mut out));
        converter.process(&samples, &mut out);
        assert!(out.len() > samples.len());

        out.clear();
        assert!(converter.follow_device(24_000, &mut out));
        converter.process(&samples, &mut out);
        assert_eq!(out.len(), samples.len());
    }

    #[test]
    fn test_converter_flushes_held_tail_on_rate_change() {
        let mut converter = RateConverter::new(44_100, 48_000);
        let mut out = Vec::new();
        // Less than one chunk stays held by the resampler.
        converter.process(&[0.5; 10], &mut out);
        assert!(out.is_empty());

        assert!(converter.follow_device(44_100, &mut out));
        assert_eq!(out, vec![0.5; 10]);
    }

    #[test]
    fn test_to_stereo() {
        assert_eq!(to_stereo(&[0.5, -0.5], 1), vec![0.5, 0.5, -0.5, -0.5]);
        assert_eq!(to_stereo(&[0.1, 0.2], 2), vec![0.1, 0.2]);
        assert_eq!(
            to_stereo(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 3),
            vec![1.0, 2.0, 4.0, 5.0]
        );
    }
}
