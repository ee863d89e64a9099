//! Entry points for registering and identifying raw PCM clips

use std::{
	any::Any,
	panic::{self, AssertUnwindSafe},
	sync::Arc,
};

use log::{debug, info};
use serde::Serialize;

use crate::{
	config::{Config, MatcherConfig},
	database::{FingerprintDatabase, InMemoryDatabase, TrackMatch},
	encoder::{Encoder, Song},
	error::MatchError,
	landmark::FingerprintCode,
};

/// Outcome of a query. An empty `matches` list means nothing matched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingResult {
	pub matches: Vec<TrackMatch>,
	pub samples_processed: usize,
	pub duration_ms: u64,
	pub fingerprint_count: usize,
}

impl ProcessingResult {
	pub fn has_matches(&self) -> bool {
		!self.matches.is_empty()
	}

	pub fn best(&self) -> Option<&TrackMatch> {
		self.matches.first()
	}
}

/// A decoded and fingerprinted clip
struct Analyzed {
	samples: usize,
	duration_ms: u64,
	codes: Vec<FingerprintCode>,
}

/// Decodes, fingerprints and forwards clips to a shared [`FingerprintDatabase`]
pub struct MatchingService<D: FingerprintDatabase = InMemoryDatabase> {
	encoder: Encoder,
	matcher: MatcherConfig,
	database: Arc<D>,
}

impl MatchingService<InMemoryDatabase> {
	/// A service backed by a fresh in-memory database
	pub fn in_memory(config: Config) -> Result<Self, MatchError> {
		Self::new(config, Arc::new(InMemoryDatabase::new(config.matcher)))
	}
}

impl<D: FingerprintDatabase> MatchingService<D> {
	pub fn new(config: Config, database: Arc<D>) -> Result<Self, MatchError> {
		config.validate()?;
		Ok(Self {
			encoder: Encoder::new(config.encoder)?,
			matcher: config.matcher,
			database,
		})
	}

	pub fn database(&self) -> &Arc<D> {
		&self.database
	}

	/// Fingerprints the clip and stores it under `track_id`.
	/// Returns the number of codes registered.
	pub fn register_track(
		&self,
		track_id: &str,
		title: &str,
		audio: &[u8],
	) -> Result<usize, MatchError> {
		if track_id.trim().is_empty() {
			return Err(MatchError::MissingTrackId);
		}
		let analyzed = self.analyze(audio)?;
		guarded(|| self.database.add_track(track_id, title, &analyzed.codes))?;
		Ok(analyzed.codes.len())
	}

	/// The single best match, if any
	pub fn identify_track(&self, audio: &[u8]) -> Result<ProcessingResult, MatchError> {
		let analyzed = self.analyze(audio)?;
		let best = guarded(|| self.database.find_best_match(&analyzed.codes))?;
		match &best {
			Some(best) => info!(
				"Identified {} with score {} (confidence {:.2})",
				best.track_id, best.match_score, best.confidence
			),
			None => info!("No match among {} query codes", analyzed.codes.len()),
		}
		Ok(analyzed.into_result(best.into_iter().collect()))
	}

	/// Up to `limit` tracks at or above `min_confidence`, best first
	pub fn find_best_matches(
		&self,
		audio: &[u8],
		limit: usize,
		min_confidence: f32,
	) -> Result<ProcessingResult, MatchError> {
		if limit == 0 {
			return Err(MatchError::InvalidArgument("limit must be positive".into()));
		}
		if !(0. ..=1.).contains(&min_confidence) {
			return Err(MatchError::InvalidArgument(format!(
				"min_confidence must be in [0, 1], got {min_confidence}"
			)));
		}
		let analyzed = self.analyze(audio)?;
		let matches =
			guarded(|| self.database.best_matches(&analyzed.codes, limit, min_confidence))?;
		info!("{} candidate tracks above {min_confidence}", matches.len());
		Ok(analyzed.into_result(matches))
	}

	/// [`Self::find_best_matches`] with the configured default limit and
	/// confidence
	pub fn top_matches(&self, audio: &[u8]) -> Result<ProcessingResult, MatchError> {
		self.find_best_matches(
			audio,
			self.matcher.default_limit,
			self.matcher.default_min_confidence,
		)
	}

	fn analyze(&self, audio: &[u8]) -> Result<Analyzed, MatchError> {
		if audio.is_empty() {
			return Err(MatchError::EmptyAudio);
		}
		let song = Song::from_pcm(audio, self.encoder.config().sample_rate)?;
		let samples = song.samples.len();
		let duration_ms = song.duration_ms();
		let codes = guarded(|| self.encoder.fingerprints(song.samples))?;
		debug!("{samples} samples ({duration_ms} ms) produced {} codes", codes.len());
		Ok(Analyzed {
			samples,
			duration_ms,
			codes,
		})
	}
}

impl Analyzed {
	fn into_result(self, matches: Vec<TrackMatch>) -> ProcessingResult {
		ProcessingResult {
			matches,
			samples_processed: self.samples,
			duration_ms: self.duration_ms,
			fingerprint_count: self.codes.len(),
		}
	}
}

/// Runs `task`, turning a panic (including one raised on a rayon worker) into
/// [`MatchError::Processing`]
fn guarded<T>(task: impl FnOnce() -> T) -> Result<T, MatchError> {
	panic::catch_unwind(AssertUnwindSafe(task))
		.map_err(|payload| MatchError::Processing(panic_message(payload.as_ref())))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
	if let Some(message) = payload.downcast_ref::<&str>() {
		message.to_string()
	} else if let Some(message) = payload.downcast_ref::<String>() {
		message.clone()
	} else {
		"analysis panicked".to_string()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::database::TrackRecord;

	fn service() -> MatchingService {
		MatchingService::in_memory(Config::default()).unwrap()
	}

	#[test]
	fn empty_audio_is_a_validation_error() {
		let service = service();
		assert_eq!(service.identify_track(&[]), Err(MatchError::EmptyAudio));
		assert_eq!(service.register_track("t1", "T", &[]), Err(MatchError::EmptyAudio));
		assert_eq!(service.find_best_matches(&[], 5, 0.5), Err(MatchError::EmptyAudio));
		assert_eq!(MatchError::EmptyAudio.to_string(), "Audio data is empty");
	}

	#[test]
	fn missing_track_id_is_rejected() {
		let service = service();
		assert_eq!(
			service.register_track("  ", "T", &[0, 0]),
			Err(MatchError::MissingTrackId)
		);
		assert_eq!(service.database().track_count(), 0);
	}

	#[test]
	fn odd_length_is_rejected() {
		assert_eq!(
			service().identify_track(&[0, 0, 0]),
			Err(MatchError::OddLength(3))
		);
	}

	#[test]
	fn silence_is_no_match_not_an_error() {
		let service = service();
		let silence = vec![0u8; 44_100 * 2];
		assert_eq!(service.register_track("quiet", "Quiet", &silence), Ok(0));
		let result = service.identify_track(&silence).unwrap();
		assert!(!result.has_matches());
		assert_eq!(result.samples_processed, 44_100);
		assert_eq!(result.duration_ms, 1000);
		assert_eq!(result.fingerprint_count, 0);
	}

	#[test]
	fn rejects_bad_query_arguments() {
		let service = service();
		assert!(matches!(
			service.find_best_matches(&[0, 0], 0, 0.5),
			Err(MatchError::InvalidArgument(_))
		));
		assert!(matches!(
			service.find_best_matches(&[0, 0], 5, 1.5),
			Err(MatchError::InvalidArgument(_))
		));
		assert!(matches!(
			service.find_best_matches(&[0, 0], 5, f32::NAN),
			Err(MatchError::InvalidArgument(_))
		));
	}

	#[test]
	fn invalid_config_is_rejected() {
		let mut config = Config::default();
		config.encoder.window_size = 1000;
		assert!(matches!(
			MatchingService::in_memory(config),
			Err(MatchError::InvalidConfig(_))
		));
	}

	/// Fails every lookup the way a corrupted index would
	struct BrokenDatabase;

	impl FingerprintDatabase for BrokenDatabase {
		fn add_track(&self, track_id: &str, _: &str, _: &[FingerprintCode]) {
			panic!("cannot index {track_id}");
		}

		fn find_best_match(&self, _: &[FingerprintCode]) -> Option<TrackMatch> {
			panic!("posting list poisoned");
		}

		fn best_matches(&self, _: &[FingerprintCode], _: usize, _: f32) -> Vec<TrackMatch> {
			panic!("posting list poisoned");
		}

		fn track(&self, _: &str) -> Option<TrackRecord> {
			None
		}

		fn track_count(&self) -> usize {
			0
		}
	}

	#[test]
	fn panics_during_processing_become_errors() {
		let service = MatchingService::new(Config::default(), Arc::new(BrokenDatabase)).unwrap();
		let clip = vec![0u8; 8192];
		assert_eq!(
			service.register_track("t1", "T", &clip),
			Err(MatchError::Processing("cannot index t1".into()))
		);
		assert_eq!(
			service.identify_track(&clip),
			Err(MatchError::Processing("posting list poisoned".into()))
		);
		assert_eq!(
			service.top_matches(&clip),
			Err(MatchError::Processing("posting list poisoned".into()))
		);
	}

	#[test]
	fn panicking_analysis_becomes_an_error() {
		assert_eq!(
			guarded(|| -> Vec<FingerprintCode> { panic!("window {} out of range", 7) }),
			Err(MatchError::Processing("window 7 out of range".into()))
		);
		assert_eq!(guarded(|| 3), Ok(3));
	}

	#[test]
	fn panic_payloads_become_messages() {
		let payload = panic::catch_unwind(|| panic!("bad bin {}", 3)).unwrap_err();
		assert_eq!(panic_message(payload.as_ref()), "bad bin 3");
	}
}
