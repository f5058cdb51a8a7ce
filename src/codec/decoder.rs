//! Full-file decoder using symphonia
//!
//! The whole file is decoded up front; playback then reads from memory.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use crate::audio::Track;
use crate::codec::format::FileFormat;
use crate::error::AudioError;

/// Decode an entire `.wav` or `.mp3` file into a [`Track`].
///
/// The extension is checked before the file is opened. Open failures map
/// to [`AudioError::Io`], anything the demuxer or codec rejects to
/// [`AudioError::Decode`].
pub fn decode_file(path: &str) -> Result<Track, AudioError> {
    let format = FileFormat::from_path(path)?;
    debug!("Decoding {} as {}", path, format);

    let file = File::open(Path::new(path))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    hint.with_extension(format.hint());

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| AudioError::Decode(format!("Failed to probe format: {}", e)))?;
    let mut reader = probed.format;

    let track = reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AudioError::Decode("No audio track found".to_string()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| AudioError::Decode(format!("Failed to create decoder: {}", e)))?;

    let mut sample_rate = codec_params.sample_rate;
    let mut channels = codec_params.channels.map(|c| c.count() as u16);
    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                return Err(AudioError::Decode(format!("Failed to read packet: {}", e)));
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                // Corrupt frame; skip it like a player would
                warn!("Skipping undecodable packet in {}: {}", path, e);
                continue;
            }
            Err(e) => return Err(AudioError::Decode(e.to_string())),
        };

        let spec = *decoded.spec();
        sample_rate.get_or_insert(spec.rate);
        channels.get_or_insert(spec.channels.count() as u16);

        let needed = decoded.capacity() * spec.channels.count();
        if sample_buf.as_ref().map_or(true, |buf| buf.capacity() < needed) {
            sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
        }
        if let Some(buf) = sample_buf.as_mut() {
            buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buf.samples());
        }
    }

    let sample_rate =
        sample_rate.ok_or_else(|| AudioError::Decode("Sample rate not found".to_string()))?;
    let channels =
        channels.ok_or_else(|| AudioError::Decode("Channel count not found".to_string()))?;
    if samples.is_empty() {
        return Err(AudioError::Decode("No audio decoded".to_string()));
    }

    debug!(
        "Decoded {}: {} frames, {}Hz, {} channels",
        path,
        samples.len() / channels.max(1) as usize,
        sample_rate,
        channels
    );

    Ok(Track::new(samples, sample_rate, channels, path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{SampleFormat, WavSpec, WavWriter};

    fn write_wav(path: &Path, sample_rate: u32, channels: u16, frames: u32) {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for i in 0..frames * channels as u32 {
            let t = i as f32 / sample_rate as f32;
            let val = (t * 440.0 * 2.0 * std::f32::consts::PI).sin() * 0.5;
            writer.write_sample((val * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_decode_mono_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.wav");
        write_wav(&path, 44100, 1, 88200);

        let track = decode_file(path.to_str().unwrap()).unwrap();
        assert_eq!(track.sample_rate(), 44100);
        assert_eq!(track.channels(), 1);
        assert_eq!(track.total_samples(), 88200);
        assert_eq!(track.duration_secs(), 2.0);
    }

    #[test]
    fn test_decode_stereo_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.WAV");
        write_wav(&path, 48000, 2, 4800);

        let track = decode_file(path.to_str().unwrap()).unwrap();
        assert_eq!(track.channels(), 2);
        assert_eq!(track.total_samples(), 4800);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = decode_file("/definitely/not/here.wav").unwrap_err();
        assert!(matches!(err, AudioError::Io(_)));
        assert!(err.to_string().starts_with("Open failed"));
    }

    #[test]
    fn test_unsupported_extension_checked_first() {
        // The file does not exist; the extension is rejected before opening
        let err = decode_file("/definitely/not/here.flac").unwrap_err();
        assert!(matches!(err, AudioError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.wav");
        std::fs::write(&path, b"this is not a riff file at all").unwrap();

        let err = decode_file(path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, AudioError::Decode(_)));
    }
}
