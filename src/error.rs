//! Error type shared by the encoder, the fingerprint store and the matching service

use thiserror::Error;

/// Failures reported to callers of the matching service.
///
/// A query that simply finds nothing is not an error, it yields an empty
/// match list.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MatchError {
	#[error("Audio data is empty")]
	EmptyAudio,

	#[error("Track id is empty")]
	MissingTrackId,

	#[error("PCM buffer has odd length {0}, expected 16-bit samples")]
	OddLength(usize),

	#[error("Invalid argument: {0}")]
	InvalidArgument(String),

	#[error("Invalid configuration: {0}")]
	InvalidConfig(String),

	#[error("Unsupported audio: {0}")]
	UnsupportedAudio(String),

	#[error("Processing error: {0}")]
	Processing(String),
}
