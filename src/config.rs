//! Tunables for fingerprint generation and matching

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::MatchError;

/// Sample rate every PCM buffer is expected to be recorded at
pub const SAMPLE_RATE: u32 = 44_100;

/// Parameters of the spectral analysis and landmark hashing stages
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
	pub sample_rate: u32,
	/// FFT length, must be a power of two
	pub window_size: usize,
	pub hop_size: usize,
	/// Loudness normalization scales the signal to this RMS
	pub target_rms: f64,
	/// Below this RMS the signal is treated as silence and left untouched
	pub min_rms: f64,
	/// Mean absolute amplitude a block needs to be considered active
	pub silence_threshold: f64,
	pub min_frequency: f64,
	pub max_frequency: f64,
	/// Spectral bins quieter than this never become peaks
	pub min_magnitude: f64,
	/// The `min_frequency..max_frequency` range is split into this many
	/// equal-width bands
	pub band_count: usize,
	pub peaks_per_band: usize,
	pub peaks_per_window: usize,
	/// Each anchor peak is paired with the next `target_zone_size - 1` peaks
	pub target_zone_size: usize,
}

impl Default for EncoderConfig {
	fn default() -> Self {
		Self {
			sample_rate: SAMPLE_RATE,
			window_size: 4096,
			hop_size: 2048,
			target_rms: 0.15,
			min_rms: 0.001,
			silence_threshold: 0.02,
			min_frequency: 20.,
			max_frequency: 5000.,
			min_magnitude: 0.02,
			band_count: 30,
			peaks_per_band: 2,
			peaks_per_window: 5,
			target_zone_size: 5,
		}
	}
}

impl EncoderConfig {
	/// Size of the blocks used for active-region detection
	pub fn block_size(&self) -> usize {
		(self.window_size / 2).max(1)
	}

	pub fn validate(&self) -> Result<(), MatchError> {
		if self.sample_rate == 0 {
			return Err(MatchError::InvalidConfig("sample_rate must be positive".into()));
		}
		if !self.window_size.is_power_of_two() || self.window_size < 4 {
			return Err(MatchError::InvalidConfig(format!(
				"window_size must be a power of two >= 4, got {}",
				self.window_size
			)));
		}
		if self.hop_size == 0 || self.hop_size > self.window_size {
			return Err(MatchError::InvalidConfig(format!(
				"hop_size must be in 1..={}, got {}",
				self.window_size, self.hop_size
			)));
		}
		if !(self.min_frequency >= 0. && self.min_frequency < self.max_frequency) {
			return Err(MatchError::InvalidConfig(format!(
				"frequency range {}..{} is empty",
				self.min_frequency, self.max_frequency
			)));
		}
		if self.band_count == 0 || self.peaks_per_band == 0 || self.peaks_per_window == 0 {
			return Err(MatchError::InvalidConfig(
				"band_count, peaks_per_band and peaks_per_window must be positive".into(),
			));
		}
		if self.target_zone_size < 2 {
			return Err(MatchError::InvalidConfig(format!(
				"target_zone_size must be at least 2, got {}",
				self.target_zone_size
			)));
		}
		Ok(())
	}
}

/// Parameters of the vote counting stage
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
	/// A (track, offset) pair needs at least this many votes to be reported
	/// by `find_best_match`
	pub min_matches: usize,
	/// Used to convert positional offsets into milliseconds
	pub sample_rate: u32,
	pub default_limit: usize,
	pub default_min_confidence: f32,
}

impl Default for MatcherConfig {
	fn default() -> Self {
		Self {
			min_matches: 5,
			sample_rate: SAMPLE_RATE,
			default_limit: 20,
			default_min_confidence: 0.5,
		}
	}
}

impl MatcherConfig {
	pub fn validate(&self) -> Result<(), MatchError> {
		if self.sample_rate == 0 {
			return Err(MatchError::InvalidConfig("sample_rate must be positive".into()));
		}
		if self.default_limit == 0 {
			return Err(MatchError::InvalidConfig("default_limit must be positive".into()));
		}
		if !(0. ..=1.).contains(&self.default_min_confidence) {
			return Err(MatchError::InvalidConfig(format!(
				"default_min_confidence must be in [0, 1], got {}",
				self.default_min_confidence
			)));
		}
		Ok(())
	}
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
	pub encoder: EncoderConfig,
	pub matcher: MatcherConfig,
}

impl Config {
	/// Reads a JSON file; keys that are absent keep their default value
	pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, MatchError> {
		let path = path.as_ref();
		let text = std::fs::read_to_string(path).map_err(|err| {
			MatchError::InvalidConfig(format!("cannot read {}: {err}", path.display()))
		})?;
		Self::from_json_str(&text)
	}

	pub fn from_json_str(text: &str) -> Result<Self, MatchError> {
		let config: Config =
			serde_json::from_str(text).map_err(|err| MatchError::InvalidConfig(err.to_string()))?;
		config.validate()?;
		Ok(config)
	}

	pub fn validate(&self) -> Result<(), MatchError> {
		self.encoder.validate()?;
		self.matcher.validate()
	}
}
