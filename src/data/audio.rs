//! Audio column casting: decode with symphonia, mix to mono, resample with rubato.
//!
//! Supports whatever symphonia's enabled codecs read (WAV, FLAC, OGG/Vorbis, MP3).

use std::io::Cursor;
use std::path::Path;

use anyhow::{Context, Result, bail};
use rayon::prelude::*;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

use super::model::{AudioData, AudioDataset, FieldValue};
use crate::progress;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Symphonia error: {0}")]
    Symphonia(#[from] symphonia::core::errors::Error),
    #[error("No audio track found")]
    NoAudioTrack,
    #[error("Unsupported codec")]
    UnsupportedCodec,
    #[error("Track does not declare a sample rate")]
    MissingSampleRate,
    #[error("Cannot resample from {from_rate} Hz to {to_rate} Hz")]
    InvalidSampleRate { from_rate: u32, to_rate: u32 },
    #[error("Resampler setup failed: {0}")]
    ResamplerConstruction(#[from] rubato::ResamplerConstructionError),
    #[error("Resampling failed: {0}")]
    Resample(#[from] rubato::ResampleError),
}

/// Decoded, interleaved audio samples.
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: usize,
}

impl DecodedAudio {
    /// Convert to mono by averaging channels.
    pub fn to_mono(&self) -> Vec<f32> {
        if self.channels <= 1 {
            return self.samples.clone();
        }
        self.samples
            .chunks_exact(self.channels)
            .map(|frame| frame.iter().sum::<f32>() / self.channels as f32)
            .collect()
    }

    /// Mono samples at `target_rate`.
    pub fn resample(&self, target_rate: u32) -> Result<Vec<f32>, DecodeError> {
        resample_mono(&self.to_mono(), self.sample_rate, target_rate)
    }
}

/// Resample a mono signal using sinc interpolation.
///
/// The output holds `round(len * to_rate / from_rate)` samples aligned with
/// the input; the resampler's delay is trimmed and its tail flushed.
pub fn resample_mono(mono: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, DecodeError> {
    if from_rate == 0 || to_rate == 0 {
        return Err(DecodeError::InvalidSampleRate { from_rate, to_rate });
    }
    if from_rate == to_rate || mono.is_empty() {
        return Ok(mono.to_vec());
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let resample_ratio = to_rate as f64 / from_rate as f64;
    let chunk_size = 1024;
    // must cover the actual ratio in both directions (8kHz→32kHz = 4x)
    let max_ratio = resample_ratio.max(1.0 / resample_ratio) * 1.1;

    let mut resampler = SincFixedIn::<f32>::new(resample_ratio, max_ratio, params, chunk_size, 1)?;

    let delay = resampler.output_delay();
    let expected_len = (mono.len() as f64 * resample_ratio).round() as usize;
    let mut output = Vec::with_capacity(delay + expected_len + chunk_size);

    let mut chunks = mono.chunks_exact(chunk_size);
    for chunk in &mut chunks {
        let waves_in = vec![chunk];
        let resampled = resampler.process(&waves_in, None)?;
        output.extend_from_slice(&resampled[0]);
    }

    let remainder = chunks.remainder();
    if !remainder.is_empty() {
        let waves_in = vec![remainder];
        let resampled = resampler.process_partial(Some(waves_in.as_slice()), None)?;
        output.extend_from_slice(&resampled[0]);
    }

    // flush the samples still held back by the filter
    while output.len() < delay + expected_len {
        let resampled = resampler.process_partial::<Vec<f32>>(None, None)?;
        if resampled[0].is_empty() {
            break;
        }
        output.extend_from_slice(&resampled[0]);
    }

    output.drain(..delay.min(output.len()));
    output.truncate(expected_len);
    Ok(output)
}

/// Decode an encoded audio file held in memory.
pub fn decode_audio(bytes: &[u8], extension: Option<&str>) -> Result<DecodedAudio, DecodeError> {
    let cursor = Cursor::new(bytes.to_vec());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoAudioTrack)?;

    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or(DecodeError::MissingSampleRate)?;
    let mut channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(1);
    let track_id = track.id;
    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(symphonia::core::errors::Error::ResetRequired) => break,
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(symphonia::core::errors::Error::DecodeError(e)) => {
                log::warn!("skipping corrupt audio packet: {e}");
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        let spec = *decoded.spec();
        channels = spec.channels.count();
        let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buf.samples());
    }

    if samples.is_empty() {
        return Err(DecodeError::NoAudioTrack);
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
        channels,
    })
}

// ---------------------------------------------------------------------------
// Column cast
// ---------------------------------------------------------------------------

/// Replace every value of `column` with audio decoded at `sample_rate`.
///
/// Accepted cell shapes: `{bytes, path}` structs (bytes win when present),
/// bare path strings, raw bytes, `{array, sampling_rate}` structs and values
/// that are already decoded. Null cells stay null.
pub fn cast_audio_column(
    dataset: AudioDataset,
    column: &str,
    sample_rate: u32,
) -> Result<AudioDataset> {
    if !dataset.has_column(column) {
        bail!(
            "Column '{column}' not in the dataset. Current columns in the dataset: {:?}",
            dataset.column_names
        );
    }

    let AudioDataset {
        column_names,
        mut records,
    } = dataset;

    let pb = progress::progress_bar(records.len() as u64, "Decoding audio");
    records
        .par_iter_mut()
        .enumerate()
        .try_for_each(|(row, record)| -> Result<()> {
            let value = record
                .get(column)
                .with_context(|| format!("Row {row}: missing '{column}'"))?;
            let decoded = decode_value(value, sample_rate)
                .with_context(|| format!("Row {row}: decoding '{column}'"))?;
            record.insert(column.to_string(), decoded);
            pb.inc(1);
            Ok(())
        })?;
    pb.finish_and_clear();

    log::debug!("cast '{column}' to audio @ {sample_rate} Hz");
    Ok(AudioDataset::new(column_names, records))
}

fn decode_value(value: &FieldValue, sample_rate: u32) -> Result<FieldValue> {
    let audio = match value {
        FieldValue::Null => return Ok(FieldValue::Null),
        FieldValue::Audio(audio) => AudioData {
            path: audio.path.clone(),
            array: resample_mono(&audio.array, audio.sampling_rate, sample_rate)?,
            sampling_rate: sample_rate,
        },
        FieldValue::String(path) => decode_path(path, sample_rate)?,
        FieldValue::Binary(bytes) => decode_bytes(bytes, None, sample_rate)?,
        FieldValue::Struct(fields) => {
            let path = fields.get("path").and_then(FieldValue::as_str);
            match (fields.get("bytes"), fields.get("array")) {
                (Some(FieldValue::Binary(bytes)), _) => decode_bytes(bytes, path, sample_rate)?,
                (_, Some(array)) => {
                    let rate = fields
                        .get("sampling_rate")
                        .context("audio struct has 'array' but no 'sampling_rate'")?;
                    let source_rate = sampling_rate(rate)
                        .with_context(|| format!("invalid audio 'sampling_rate': {rate}"))?;
                    let samples = array
                        .to_samples()
                        .context("audio 'array' is not a list of numbers")?;
                    AudioData {
                        path: path.map(str::to_string),
                        array: resample_mono(&samples, source_rate, sample_rate)?,
                        sampling_rate: sample_rate,
                    }
                }
                _ => match path {
                    Some(path) => decode_path(path, sample_rate)?,
                    None => bail!("audio struct has neither 'bytes', 'array' nor 'path'"),
                },
            }
        }
        other => bail!("cannot decode {other} as audio"),
    };
    Ok(FieldValue::Audio(audio))
}

/// A positive rate that fits in `u32`, stored as an integer or a whole float.
fn sampling_rate(value: &FieldValue) -> Option<u32> {
    let rate = match value {
        FieldValue::Integer(rate) => u32::try_from(*rate).ok()?,
        FieldValue::Float(rate)
            if rate.fract() == 0.0 && *rate >= 0.0 && *rate <= f64::from(u32::MAX) =>
        {
            *rate as u32
        }
        _ => return None,
    };
    (rate > 0).then_some(rate)
}

fn decode_path(path: &str, sample_rate: u32) -> Result<AudioData> {
    let bytes = std::fs::read(path).with_context(|| format!("reading audio file {path}"))?;
    decode_bytes(&bytes, Some(path), sample_rate)
}

fn decode_bytes(bytes: &[u8], path: Option<&str>, sample_rate: u32) -> Result<AudioData> {
    let extension = path
        .and_then(|p| Path::new(p).extension())
        .and_then(|e| e.to_str());
    let decoded = decode_audio(bytes, extension)?;
    Ok(AudioData {
        path: path.map(str::to_string),
        array: decoded.resample(sample_rate)?,
        sampling_rate: sample_rate,
    })
}
