// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Decoding fetched sample bytes into memory-resident buffers.

use std::io::Cursor;

use rubato::{
    SincFixedIn, SincInterpolationParameters, SincInterpolationType, VecResampler, WindowFunction,
};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::debug;

use crate::audio::DecodedBuffer;

/// Input frames handed to the resampler per call.
const INPUT_BLOCK_SIZE: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("not a recognized audio format: {0}")]
    Format(SymphoniaError),
    #[error("no audio track found")]
    NoTrack,
    #[error("{0} not specified")]
    MissingParameter(&'static str),
    #[error("decoding failed: {0}")]
    Codec(SymphoniaError),
    #[error("file holds no audio")]
    Empty,
    #[error("resampling failed: {0}")]
    Resample(String),
}

/// Decodes a complete audio file held in memory and resamples it to `target_rate`.
pub fn decode(
    bytes: Vec<u8>,
    extension: &str,
    target_rate: u32,
) -> Result<DecodedBuffer, DecodeError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());
    let mut hint = Hint::new();
    hint.with_extension(extension);

    let probed = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(DecodeError::Format)?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|track| track.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoTrack)?;
    let track_id = track.id;
    let source_rate = track
        .codec_params
        .sample_rate
        .ok_or(DecodeError::MissingParameter("sample rate"))?;
    let mut decoder = get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(DecodeError::Codec)?;

    let mut channels = track
        .codec_params
        .channels
        .map(|channels| channels.count())
        .unwrap_or(0);
    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            // Some decoders report the end of the stream as a decode error.
            Err(SymphoniaError::DecodeError(_)) => break,
            Err(e) => return Err(DecodeError::Codec(e)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                debug!(err = e, "Skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(DecodeError::Codec(e)),
        };
        if channels == 0 {
            channels = decoded.spec().channels.count();
        }

        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
        buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buffer.samples());
    }

    if channels == 0 {
        return Err(DecodeError::MissingParameter("channel count"));
    }
    if samples.is_empty() {
        return Err(DecodeError::Empty);
    }

    let samples = if source_rate != target_rate {
        debug!(source_rate, target_rate, "Transcoding sample");
        transcode(&samples, channels, source_rate, target_rate)?
    } else {
        samples
    };

    Ok(DecodedBuffer::new(samples, channels as u16, target_rate))
}

/// Resamples interleaved audio with a sinc resampler. The output holds exactly
/// `frames * target_rate / source_rate` frames (rounded up), aligned with the input.
pub fn transcode(
    samples: &[f32],
    channels: usize,
    source_rate: u32,
    target_rate: u32,
) -> Result<Vec<f32>, DecodeError> {
    let ratio = target_rate as f64 / source_rate as f64;
    let source_frames = samples.len() / channels;
    let target_frames = (source_frames as f64 * ratio).ceil() as usize;

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        oversampling_factor: 128,
        interpolation: SincInterpolationType::Linear,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, INPUT_BLOCK_SIZE, channels)
        .map_err(|e| DecodeError::Resample(e.to_string()))?;

    let planar: Vec<Vec<f32>> = (0..channels)
        .map(|channel| samples.iter().skip(channel).step_by(channels).copied().collect())
        .collect();

    // The resampler delays its output; that much extra is produced and skipped.
    let delay = resampler.output_delay();
    let wanted = delay + target_frames;
    let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(wanted); channels];
    let mut scratch = resampler.output_buffer_allocate(true);

    let mut position = 0;
    while position < source_frames {
        let needed = resampler.input_frames_next();
        let end = (position + needed).min(source_frames);
        let chunk: Vec<Vec<f32>> = planar
            .iter()
            .map(|channel| channel[position..end].to_vec())
            .collect();
        let (_, produced) = if end - position == needed {
            resampler.process_into_buffer(&chunk, &mut scratch, None)
        } else {
            // The last chunk is short; the resampler pads it with silence.
            resampler.process_partial_into_buffer(Some(chunk.as_slice()), &mut scratch, None)
        }
        .map_err(|e| DecodeError::Resample(e.to_string()))?;
        append_planar(&mut output, &scratch, produced);
        position = end;
    }

    // Flush what is still inside the filter.
    while output[0].len() < wanted {
        let (_, produced) = resampler
            .process_partial_into_buffer(None, &mut scratch, None)
            .map_err(|e| DecodeError::Resample(e.to_string()))?;
        if produced == 0 {
            break;
        }
        append_planar(&mut output, &scratch, produced);
    }

    let mut interleaved = Vec::with_capacity(target_frames * channels);
    for frame in delay..wanted {
        for channel in &output {
            interleaved.push(channel.get(frame).copied().unwrap_or(0.0));
        }
    }
    Ok(interleaved)
}

fn append_planar(output: &mut [Vec<f32>], produced: &[Vec<f32>], frames: usize) {
    for (out, channel) in output.iter_mut().zip(produced) {
        out.extend_from_slice(&channel[..frames.min(channel.len())]);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testutil::wav_bytes;

    #[test]
    fn test_decode_wav() -> Result<(), Box<dyn std::error::Error>> {
        let bytes = wav_bytes(&[0.5; 200], 2, 1000)?;
        let buffer = decode(bytes, "wav", 1000)?;
        assert_eq!(2, buffer.channel_count());
        assert_eq!(100, buffer.frames());
        assert_eq!(0.1, buffer.duration_secs());
        assert!((buffer.frame_at(10.0)[0] - 0.5).abs() < 1e-3);
        Ok(())
    }

    #[test]
    fn test_decode_resamples() -> Result<(), Box<dyn std::error::Error>> {
        let bytes = wav_bytes(&[0.25; 100], 1, 1000)?;
        let buffer = decode(bytes, "wav", 2000)?;
        assert_eq!(2000, buffer.sample_rate());
        assert_eq!(200, buffer.frames());
        Ok(())
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(decode(b"definitely not audio".to_vec(), "wav", 1000).is_err());
    }

    #[test]
    fn test_transcode_stereo() -> Result<(), DecodeError> {
        let samples: Vec<f32> = (0..4410).flat_map(|_| [0.5, -0.5]).collect();
        let result = transcode(&samples, 2, 44100, 48000)?;
        assert_eq!(4800 * 2, result.len());

        // Away from the edges a constant signal comes through unchanged, channels intact.
        for frame in [1000, 2400, 3800] {
            assert!((result[frame * 2] - 0.5).abs() < 1e-2);
            assert!((result[frame * 2 + 1] + 0.5).abs() < 1e-2);
        }
        Ok(())
    }

    #[test]
    fn test_transcode_keeps_timing() -> Result<(), DecodeError> {
        // A single click halfway through lands halfway through the output.
        let mut samples = vec![0.0f32; 2000];
        samples[1000] = 1.0;
        let result = transcode(&samples, 1, 1000, 2000)?;
        assert_eq!(4000, result.len());
        let peak = (0..result.len())
            .max_by(|a, b| result[*a].abs().total_cmp(&result[*b].abs()))
            .unwrap();
        assert!((1998..=2002).contains(&peak), "peak at {}", peak);
        Ok(())
    }
}
