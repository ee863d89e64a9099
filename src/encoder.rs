//! Handles conversion of raw PCM into spectral peaks and fingerprint codes

use log::debug;
use num_complex::Complex64;
use rayon::prelude::*;
use serde::Serialize;

use crate::{
	config::EncoderConfig,
	dft,
	error::MatchError,
	landmark::{self, FingerprintCode},
};

/// A local maximum of one window's magnitude spectrum
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Peak {
	/// Hz
	pub frequency: f64,
	/// Magnitude of the FFT bin
	pub amplitude: f64,
	/// Seconds from the start of the clip
	pub time: f64,
}

/// A mono clip, samples normalized to [-1, 1]
#[derive(Debug, Clone)]
pub struct Song {
	pub sample_rate: u32,
	pub samples: Vec<f64>,
}

impl Song {
	/// Decodes little-endian signed 16-bit samples
	pub fn from_pcm(bytes: &[u8], sample_rate: u32) -> Result<Song, MatchError> {
		if bytes.len() % 2 != 0 {
			return Err(MatchError::OddLength(bytes.len()));
		}
		let samples = bytes
			.chunks_exact(2)
			.map(|word| i16::from_le_bytes([word[0], word[1]]) as f64 / 32768.)
			.collect();
		Ok(Song {
			sample_rate,
			samples,
		})
	}

	pub fn length(&self) -> std::time::Duration {
		std::time::Duration::from_millis(self.duration_ms())
	}

	pub fn duration_ms(&self) -> u64 {
		if self.sample_rate == 0 {
			return 0;
		}
		self.samples.len() as u64 * 1000 / self.sample_rate as u64
	}
}

/// Scales the clip to the target RMS, clamping to [-1, 1].
///
/// Near-silent clips are left alone. Returns the gain that was applied.
pub fn normalize_loudness(samples: &mut [f64], target_rms: f64, min_rms: f64) -> f64 {
	if samples.is_empty() {
		return 1.;
	}
	let rms = (samples.iter().map(|s| s * s).sum::<f64>() / samples.len() as f64).sqrt();
	if rms < min_rms {
		return 1.;
	}
	let gain = target_rms / rms;
	samples
		.iter_mut()
		.for_each(|sample| *sample = (*sample * gain).clamp(-1., 1.));
	gain
}

/// Flags every `block_size` block whose mean absolute amplitude exceeds
/// `threshold`
pub fn active_blocks(samples: &[f64], block_size: usize, threshold: f64) -> Vec<bool> {
	samples
		.par_chunks(block_size.max(1))
		.map(|block| block.iter().map(|s| s.abs()).sum::<f64>() / block.len() as f64 > threshold)
		.collect()
}

/// The significant peaks of one analysis window
#[derive(Debug, Clone, PartialEq)]
pub struct WindowPeaks {
	pub index: usize,
	/// First sample of the window
	pub start: usize,
	pub peaks: Vec<Peak>,
}

/// Turns clips into peaks and fingerprint codes with a fixed configuration
#[derive(Debug, Clone)]
pub struct Encoder {
	config: EncoderConfig,
	hann: Vec<f64>,
}

impl Encoder {
	pub fn new(config: EncoderConfig) -> Result<Self, MatchError> {
		config.validate()?;
		Ok(Self {
			hann: dft::hann_window(config.window_size),
			config,
		})
	}

	pub fn config(&self) -> &EncoderConfig {
		&self.config
	}

	/// Normalizes the clip and detects its active regions
	pub fn spectrogram(&self, mut samples: Vec<f64>) -> Spectrogram<'_> {
		normalize_loudness(&mut samples, self.config.target_rms, self.config.min_rms);
		let active = active_blocks(
			&samples,
			self.config.block_size(),
			self.config.silence_threshold,
		);
		Spectrogram {
			encoder: self,
			samples,
			active,
		}
	}

	/// Full pipeline: normalization, windowed analysis and landmark hashing
	pub fn fingerprints(&self, samples: Vec<f64>) -> Vec<FingerprintCode> {
		self.spectrogram(samples).fingerprints()
	}

	/// Keeps at most `peaks_per_band` local maxima per frequency band, then
	/// the `peaks_per_window` strongest overall, strongest first
	fn significant_peaks(&self, spectrum: &[Complex64], window_start: usize) -> Vec<Peak> {
		let config = &self.config;
		let fft_len = spectrum.len();
		let magnitudes: Vec<f64> = spectrum[..fft_len / 2].iter().map(|c| c.norm()).collect();
		let bin_width = config.sample_rate as f64 / fft_len as f64;
		let band_width = (config.max_frequency - config.min_frequency) / config.band_count as f64;

		let mut bands: Vec<Vec<Peak>> = vec![Vec::new(); config.band_count];
		for bin in 1..magnitudes.len().saturating_sub(1) {
			let frequency = bin as f64 * bin_width;
			if frequency < config.min_frequency || frequency > config.max_frequency {
				continue;
			}
			let magnitude = magnitudes[bin];
			if magnitude < config.min_magnitude {
				continue;
			}
			if magnitude > magnitudes[bin - 1] && magnitude > magnitudes[bin + 1] {
				let band = (((frequency - config.min_frequency) / band_width) as usize)
					.min(config.band_count - 1);
				bands[band].push(Peak {
					frequency,
					amplitude: magnitude,
					time: (window_start + bin) as f64 / config.sample_rate as f64,
				});
			}
		}

		let mut peaks: Vec<Peak> = bands
			.into_iter()
			.flat_map(|mut band| {
				band.sort_by(|a, b| b.amplitude.total_cmp(&a.amplitude));
				band.truncate(config.peaks_per_band);
				band
			})
			.collect();
		peaks.sort_by(|a, b| b.amplitude.total_cmp(&a.amplitude));
		peaks.truncate(config.peaks_per_window);
		peaks
	}
}

/// A normalized clip ready for windowed analysis.
///
/// [`Spectrogram::windows`] is lazy and can be called any number of times;
/// [`Spectrogram::par_windows`] computes every window on the rayon pool.
#[derive(Debug, Clone)]
pub struct Spectrogram<'a> {
	encoder: &'a Encoder,
	samples: Vec<f64>,
	active: Vec<bool>,
}

impl Spectrogram<'_> {
	pub fn samples(&self) -> &[f64] {
		&self.samples
	}

	pub fn active_blocks(&self) -> &[bool] {
		&self.active
	}

	/// Number of window positions, including trailing windows shorter than
	/// `window_size`
	pub fn window_count(&self) -> usize {
		self.samples.len().div_ceil(self.encoder.config.hop_size)
	}

	/// Whether any block overlapped by window `index` is active
	pub fn is_window_active(&self, index: usize) -> bool {
		let (start, end) = self.window_bounds(index);
		if start >= end {
			return false;
		}
		let block_size = self.encoder.config.block_size();
		self.active[start / block_size..=(end - 1) / block_size]
			.iter()
			.any(|&active| active)
	}

	fn window_bounds(&self, index: usize) -> (usize, usize) {
		let config = &self.encoder.config;
		let start = (index * config.hop_size).min(self.samples.len());
		let end = (start + config.window_size).min(self.samples.len());
		(start, end)
	}

	/// Analyzes one window; `None` when it lies entirely in silence.
	///
	/// A trailing window shorter than `window_size` is tapered with the head
	/// of the full Hann window and zero-padded to `window_size`, so every
	/// window shares the same bin spacing.
	pub fn window(&self, index: usize) -> Option<WindowPeaks> {
		if index >= self.window_count() || !self.is_window_active(index) {
			return None;
		}
		let (start, end) = self.window_bounds(index);
		let mut frame = vec![0.; self.encoder.config.window_size];
		frame
			.iter_mut()
			.zip(&self.samples[start..end])
			.zip(&self.encoder.hann)
			.for_each(|((slot, &sample), &taper)| *slot = sample * taper);
		let spectrum = dft::real_fft_padded(&frame);
		Some(WindowPeaks {
			index,
			start,
			peaks: self.encoder.significant_peaks(&spectrum, start),
		})
	}

	pub fn windows(&self) -> impl Iterator<Item = WindowPeaks> + '_ {
		(0..self.window_count()).filter_map(move |index| self.window(index))
	}

	/// Same windows as [`Spectrogram::windows`], in the same order
	pub fn par_windows(&self) -> Vec<WindowPeaks> {
		let windows: Vec<Option<WindowPeaks>> = (0..self.window_count())
			.into_par_iter()
			.map(|index| self.window(index))
			.collect();
		windows.into_iter().flatten().collect()
	}

	pub fn fingerprints(&self) -> Vec<FingerprintCode> {
		let target_zone_size = self.encoder.config.target_zone_size;
		let windows = self.par_windows();
		let codes: Vec<FingerprintCode> = windows
			.iter()
			.flat_map(|window| landmark::hash_peaks(&window.peaks, target_zone_size))
			.collect();
		debug!(
			"{} samples, {} of {} windows active, {} fingerprint codes",
			self.samples.len(),
			windows.len(),
			self.window_count(),
			codes.len()
		);
		codes
	}
}
