//! Reads the PCM payload of a mono 16-bit WAV file

use std::io::{Cursor, Read};

use hound::{SampleFormat, WavReader, WavSpec};

use crate::{config::SAMPLE_RATE, error::MatchError};

/// The only layout the encoder accepts
pub const PCM_SPEC: WavSpec = WavSpec {
	channels: 1,
	sample_rate: SAMPLE_RATE,
	bits_per_sample: 16,
	sample_format: SampleFormat::Int,
};

fn unsupported(err: hound::Error) -> MatchError {
	MatchError::UnsupportedAudio(err.to_string())
}

/// Decodes a WAV stream into little-endian 16-bit PCM bytes.
///
/// Only uncompressed, single channel, 16-bit, 44.1 kHz files are accepted.
pub fn read_pcm<R: Read>(source: R) -> Result<Vec<u8>, MatchError> {
	let reader = WavReader::new(source).map_err(unsupported)?;
	let spec = reader.spec();
	if spec != PCM_SPEC {
		return Err(MatchError::UnsupportedAudio(format!(
			"{} channel(s), {}-bit {:?} at {} Hz; expected mono 16-bit Int at {SAMPLE_RATE} Hz",
			spec.channels, spec.bits_per_sample, spec.sample_format, spec.sample_rate
		)));
	}
	let mut pcm = Vec::with_capacity(reader.len() as usize * 2);
	for sample in reader.into_samples::<i16>() {
		pcm.extend_from_slice(&sample.map_err(unsupported)?.to_le_bytes());
	}
	Ok(pcm)
}

pub fn pcm_payload(bytes: &[u8]) -> Result<Vec<u8>, MatchError> {
	read_pcm(Cursor::new(bytes))
}
