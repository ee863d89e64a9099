//! Radix-2 fast Fourier transform used by the spectral analysis stage

use std::f64::consts::PI;

use num_complex::Complex64;

use crate::error::MatchError;

/// Transforms `input`, whose length must be a power of two.
///
/// An empty input yields an empty spectrum.
pub fn fft(input: &[Complex64]) -> Result<Vec<Complex64>, MatchError> {
	if input.is_empty() {
		return Ok(Vec::new());
	}
	if !input.len().is_power_of_two() {
		return Err(MatchError::Processing(format!(
			"FFT length must be a power of two, got {}",
			input.len()
		)));
	}
	Ok(transform(input))
}

/// Transforms a real signal, zero-padding it to the next power of two
pub fn real_fft_padded(samples: &[f64]) -> Vec<Complex64> {
	if samples.is_empty() {
		return Vec::new();
	}
	let mut buffer = vec![Complex64::default(); samples.len().next_power_of_two()];
	buffer
		.iter_mut()
		.zip(samples)
		.for_each(|(slot, &sample)| slot.re = sample);
	transform(&buffer)
}

// Recursive even/odd split; `x.len()` is a power of two here
fn transform(x: &[Complex64]) -> Vec<Complex64> {
	let n = x.len();
	if n == 1 {
		return vec![x[0]];
	}
	let even: Vec<_> = x.iter().step_by(2).copied().collect();
	let odd: Vec<_> = x.iter().skip(1).step_by(2).copied().collect();
	let even = transform(&even);
	let odd = transform(&odd);

	let half = n / 2;
	let mut spectrum = vec![Complex64::default(); n];
	for k in 0..half {
		let twiddle = Complex64::from_polar(1., -2. * PI * k as f64 / n as f64);
		let product = twiddle * odd[k];
		spectrum[k] = even[k] + product;
		spectrum[k + half] = even[k] - product;
	}
	spectrum
}

/// Symmetric Hann taper of the given length
pub fn hann_window(size: usize) -> Vec<f64> {
	if size < 2 {
		return vec![1.; size];
	}
	let denominator = (size - 1) as f64;
	(0..size)
		.map(|i| 0.5 * (1. - (2. * PI * i as f64 / denominator).cos()))
		.collect()
}
