//! Landmark hashing: pairs of spectral peaks packed into 48-bit fingerprint codes
//!
//! Layout of a code, most significant field first:
//!
//! | bits  | field                               |
//! |-------|-------------------------------------|
//! | 32-47 | anchor frequency / 10 Hz            |
//! | 16-31 | paired peak frequency / 10 Hz       |
//! | 0-15  | paired time - anchor time, in ms    |
//!
//! Every field is truncated toward zero and wrapped to 16 bits.

use crate::encoder::Peak;

/// A packed landmark hash; only the low [`CODE_BITS`] bits are used
pub type FingerprintCode = u64;

pub const CODE_BITS: u32 = 48;

/// Lookups treat codes within this Hamming distance as equal.
/// Raising it changes the per-code fan-out from `CODE_BITS + 1` to
/// `sum(C(CODE_BITS, r))`; [`HammingNeighbors`] only implements radius 1.
pub const HAMMING_RADIUS: u32 = 1;

const FIELD_MASK: u64 = 0xFFFF;
const FREQUENCY_QUANTUM_HZ: f64 = 10.;

/// Truncates toward zero then keeps the low 16 bits (negative values wrap)
fn quantize(value: f64) -> u64 {
	(value as i64 as u64) & FIELD_MASK
}

pub const fn pack(anchor_bucket: u16, paired_bucket: u16, delta_ms: u16) -> FingerprintCode {
	(anchor_bucket as u64) << 32 | (paired_bucket as u64) << 16 | delta_ms as u64
}

/// Inverse of [`pack`]: `(anchor_bucket, paired_bucket, delta_ms)`
pub const fn unpack(code: FingerprintCode) -> (u16, u16, u16) {
	(
		((code >> 32) & FIELD_MASK) as u16,
		((code >> 16) & FIELD_MASK) as u16,
		(code & FIELD_MASK) as u16,
	)
}

pub fn landmark_code(anchor: &Peak, paired: &Peak) -> FingerprintCode {
	quantize(anchor.frequency / FREQUENCY_QUANTUM_HZ) << 32
		| quantize(paired.frequency / FREQUENCY_QUANTUM_HZ) << 16
		| quantize((paired.time - anchor.time) * 1000.)
}

/// Hashes the significant peaks of one window.
///
/// Each peak in turn is an anchor, paired with the peaks that follow it
/// inside a target zone of `target_zone_size` peaks (the anchor included).
/// Windows with fewer than two peaks produce nothing.
pub fn hash_peaks(peaks: &[Peak], target_zone_size: usize) -> Vec<FingerprintCode> {
	if peaks.len() < 2 {
		return Vec::new();
	}
	peaks
		.iter()
		.enumerate()
		.flat_map(|(i, anchor)| {
			let zone_end = peaks.len().min(i + target_zone_size);
			peaks[i + 1..zone_end.max(i + 1)]
				.iter()
				.map(move |paired| landmark_code(anchor, paired))
		})
		.collect()
}

pub const fn hamming_distance(a: FingerprintCode, b: FingerprintCode) -> u32 {
	(a ^ b).count_ones()
}

/// Iterates `code` followed by every code one bit flip away from it
pub fn hamming_neighbors(code: FingerprintCode) -> HammingNeighbors {
	HammingNeighbors { code, next: 0 }
}

/// Bounded enumeration of the radius-1 neighbourhood: exactly
/// `CODE_BITS + 1` items, all distinct
#[derive(Clone, Debug)]
pub struct HammingNeighbors {
	code: FingerprintCode,
	// 0 yields the code itself, n yields the flip of bit n - 1
	next: u32,
}

impl Iterator for HammingNeighbors {
	type Item = FingerprintCode;

	fn next(&mut self) -> Option<FingerprintCode> {
		let item = match self.next {
			0 => self.code,
			n if n <= CODE_BITS => self.code ^ (1 << (n - 1)),
			_ => return None,
		};
		self.next += 1;
		Some(item)
	}

	fn size_hint(&self) -> (usize, Option<usize>) {
		let remaining = (CODE_BITS + 1).saturating_sub(self.next) as usize;
		(remaining, Some(remaining))
	}
}

impl ExactSizeIterator for HammingNeighbors {}
