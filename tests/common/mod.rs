//! Synthetic test signals

use std::f64::consts::PI;

pub const SAMPLE_RATE: usize = 44_100;

/// The tone set changes every this many samples
const SEGMENT: usize = 2048;
const FFT_LEN: f64 = 4096.;

const BASES: [usize; 4] = [30, 90, 170, 260];
const RANGES: [usize; 4] = [40, 50, 60, 70];
const STEPS: [[usize; 4]; 3] = [[9, 11, 17, 13], [13, 7, 19, 23], [7, 17, 23, 11]];
const AMPLITUDES: [f64; 4] = [0.25, 0.2, 0.15, 0.1];

/// Four bin-centred tones per segment, walking through their ranges at a
/// per-variant pace so no two variants line up
pub fn melody(variant: usize, len: usize) -> Vec<f64> {
	let steps = STEPS[variant % STEPS.len()];
	(0..len)
		.map(|n| {
			let segment = n / SEGMENT;
			let loudness = 1. + 0.1 * (segment % 3) as f64;
			(0..4)
				.map(|tone| {
					let bin = BASES[tone] + (steps[tone] * segment) % RANGES[tone];
					let frequency = bin as f64 * SAMPLE_RATE as f64 / FFT_LEN;
					loudness
						* AMPLITUDES[tone]
						* (2. * PI * frequency * n as f64 / SAMPLE_RATE as f64).sin()
				})
				.sum::<f64>()
		})
		.collect()
}

pub fn to_pcm(samples: &[f64]) -> Vec<u8> {
	samples
		.iter()
		.flat_map(|&sample| ((sample.clamp(-1., 1.) * 32767.).round() as i16).to_le_bytes())
		.collect()
}

pub fn melody_pcm(variant: usize, seconds: f64) -> Vec<u8> {
	to_pcm(&melody(variant, (seconds * SAMPLE_RATE as f64) as usize))
}

/// `len` samples starting at sample `start`
pub fn slice(pcm: &[u8], start: usize, len: usize) -> Vec<u8> {
	pcm[start * 2..(start + len) * 2].to_vec()
}

/// Adds uniform noise in `[-amplitude, amplitude]` from a fixed-seed LCG
pub fn add_noise(pcm: &[u8], amplitude: f64, seed: u64) -> Vec<u8> {
	let mut state = seed;
	let samples: Vec<f64> = pcm
		.chunks_exact(2)
		.map(|word| {
			state = state
				.wrapping_mul(6_364_136_223_846_793_005)
				.wrapping_add(1_442_695_040_888_963_407);
			let unit = (state >> 11) as f64 / (1u64 << 53) as f64;
			i16::from_le_bytes([word[0], word[1]]) as f64 / 32768. + amplitude * (2. * unit - 1.)
		})
		.collect();
	to_pcm(&samples)
}
