//! Handles management of the track fingerprints
//!
//! Each fingerprint code maps to the postings `(track, position)` of every
//! registered sequence it occurs in. A query votes for `(track, delta)`
//! pairs, where `delta = reference position - query position`; a genuine
//! match piles its votes onto a single delta while collisions scatter.

use std::{
	cmp::{Ordering, Reverse},
	hash::BuildHasherDefault,
	sync::Arc,
};

use dashmap::DashMap;
use log::{debug, info, warn};
use rustc_hash::{FxHashMap, FxHashSet, FxHasher};
use serde::Serialize;

use crate::{
	config::MatcherConfig,
	landmark::{hamming_neighbors, FingerprintCode},
};

type FxBuildHasher = BuildHasherDefault<FxHasher>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackRecord {
	pub id: String,
	pub title: String,
}

/// Occurrence of a code at `position` in the fingerprint sequence of `track`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
	pub track: Arc<str>,
	pub position: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackMatch {
	pub track_id: String,
	pub title: String,
	/// Votes received by the winning offset
	pub match_score: usize,
	/// `match_score` over the number of query codes, in [0, 1]
	pub confidence: f32,
	pub offset_ms: i64,
}

impl TrackMatch {
	pub fn new(
		record: &TrackRecord,
		match_score: usize,
		query_len: usize,
		delta: i64,
		sample_rate: u32,
	) -> Self {
		let confidence = if query_len > 0 {
			(match_score as f32 / query_len as f32).clamp(0., 1.)
		} else {
			0.
		};
		Self {
			track_id: record.id.clone(),
			title: record.title.clone(),
			match_score,
			confidence,
			offset_ms: delta * 1000 / sample_rate.max(1) as i64,
		}
	}

	pub fn is_valid(&self, min_confidence: f32) -> bool {
		self.confidence >= min_confidence
	}

	/// Higher score first, then higher confidence
	pub fn cmp_rank(&self, other: &Self) -> Ordering {
		other
			.match_score
			.cmp(&self.match_score)
			.then_with(|| other.confidence.total_cmp(&self.confidence))
	}
}

/// Storage backend for registered fingerprints
pub trait FingerprintDatabase: Send + Sync {
	/// Records the track and appends a posting for every code of the sequence
	fn add_track(&self, track_id: &str, title: &str, fingerprints: &[FingerprintCode]);

	/// The best `(track, offset)` pair, if it collected enough votes
	fn find_best_match(&self, query: &[FingerprintCode]) -> Option<TrackMatch>;

	/// The best offset of every candidate track, ranked by score
	fn best_matches(
		&self,
		query: &[FingerprintCode],
		limit: usize,
		min_confidence: f32,
	) -> Vec<TrackMatch>;

	fn track(&self, track_id: &str) -> Option<TrackRecord>;

	fn track_count(&self) -> usize;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Vote {
	count: usize,
	first_seen: usize,
}

/// Delta histogram built while scanning a query.
///
/// A query position casts at most one vote per `(track, delta)`, which keeps
/// every count at or below the query length even when a track was
/// registered more than once.
#[derive(Debug, Default)]
pub struct VoteTally {
	votes: FxHashMap<(Arc<str>, i64), Vote>,
	ballot: Vec<(Arc<str>, i64)>,
	dedup: FxHashSet<(Arc<str>, i64)>,
}

impl VoteTally {
	/// Adds the candidates found for one query position
	pub fn cast(&mut self, candidates: impl IntoIterator<Item = (Arc<str>, i64)>) {
		self.ballot.clear();
		self.dedup.clear();
		for candidate in candidates {
			if self.dedup.insert(candidate.clone()) {
				self.ballot.push(candidate);
			}
		}
		for candidate in self.ballot.drain(..) {
			let first_seen = self.votes.len();
			self.votes
				.entry(candidate)
				.or_insert(Vote {
					count: 0,
					first_seen,
				})
				.count += 1;
		}
	}

	pub fn candidate_count(&self) -> usize {
		self.votes.len()
	}

	/// Highest count overall; ties go to the pair voted for first
	pub fn winner(&self, min_votes: usize) -> Option<(Arc<str>, i64, usize)> {
		self.votes
			.iter()
			.filter(|(_, vote)| vote.count >= min_votes)
			.max_by_key(|(_, vote)| (vote.count, Reverse(vote.first_seen)))
			.map(|((track, delta), vote)| (track.clone(), *delta, vote.count))
	}

	/// The winning delta of each track, best track first
	pub fn best_per_track(&self) -> Vec<(Arc<str>, i64, usize)> {
		let mut best: FxHashMap<&Arc<str>, (i64, Vote)> = FxHashMap::default();
		for ((track, delta), vote) in &self.votes {
			let better = best.get(track).map_or(true, |(_, current)| {
				(vote.count, Reverse(vote.first_seen))
					> (current.count, Reverse(current.first_seen))
			});
			if better {
				best.insert(track, (*delta, *vote));
			}
		}
		let mut ranked: Vec<_> = best.into_iter().collect();
		ranked.sort_by_key(|(_, (_, vote))| (Reverse(vote.count), vote.first_seen));
		ranked
			.into_iter()
			.map(|(track, (delta, vote))| (track.clone(), delta, vote.count))
			.collect()
	}
}

/// Process-lifetime index, safe to share between registering and querying
/// threads. Buckets are locked per shard, never as a whole.
#[derive(Debug)]
pub struct InMemoryDatabase {
	config: MatcherConfig,
	tracks: DashMap<Arc<str>, TrackRecord, FxBuildHasher>,
	postings: DashMap<FingerprintCode, Vec<Posting>, FxBuildHasher>,
}

impl Default for InMemoryDatabase {
	fn default() -> Self {
		Self::new(MatcherConfig::default())
	}
}

impl InMemoryDatabase {
	pub fn new(config: MatcherConfig) -> Self {
		Self {
			config,
			tracks: DashMap::with_hasher(FxBuildHasher::default()),
			postings: DashMap::with_hasher(FxBuildHasher::default()),
		}
	}

	pub fn config(&self) -> &MatcherConfig {
		&self.config
	}

	/// Number of distinct codes with at least one posting
	pub fn code_count(&self) -> usize {
		self.postings.len()
	}

	pub fn posting_count(&self) -> usize {
		self.postings.iter().map(|bucket| bucket.value().len()).sum()
	}

	/// Scans the radius-1 neighbourhood of every query code
	fn tally(&self, query: &[FingerprintCode]) -> VoteTally {
		let mut tally = VoteTally::default();
		let mut candidates = Vec::new();
		for (query_position, &code) in query.iter().enumerate() {
			candidates.clear();
			for neighbor in hamming_neighbors(code) {
				if let Some(bucket) = self.postings.get(&neighbor) {
					candidates.extend(bucket.iter().map(|posting| {
						(
							posting.track.clone(),
							posting.position as i64 - query_position as i64,
						)
					}));
				}
			}
			tally.cast(candidates.drain(..));
		}
		debug!(
			"{} query codes voted for {} (track, offset) pairs",
			query.len(),
			tally.candidate_count()
		);
		tally
	}

	fn to_match(
		&self,
		track: &str,
		delta: i64,
		votes: usize,
		query_len: usize,
	) -> Option<TrackMatch> {
		let record = self.tracks.get(track)?;
		Some(TrackMatch::new(
			record.value(),
			votes,
			query_len,
			delta,
			self.config.sample_rate,
		))
	}
}

impl FingerprintDatabase for InMemoryDatabase {
	fn add_track(&self, track_id: &str, title: &str, fingerprints: &[FingerprintCode]) {
		let mut registered = false;
		let track = self
			.tracks
			.entry(Arc::from(track_id))
			.or_insert_with(|| {
				registered = true;
				TrackRecord {
					id: track_id.to_string(),
					title: title.to_string(),
				}
			})
			.key()
			.clone();
		if !registered {
			warn!("Track {track_id} is already registered, appending duplicate postings");
		}
		for (position, &code) in fingerprints.iter().enumerate() {
			self.postings.entry(code).or_default().push(Posting {
				track: track.clone(),
				position,
			});
		}
		info!("Registered {track_id} ({title}) with {} codes", fingerprints.len());
	}

	fn find_best_match(&self, query: &[FingerprintCode]) -> Option<TrackMatch> {
		if query.is_empty() {
			return None;
		}
		let (track, delta, votes) = self
			.tally(query)
			.winner(self.config.min_matches.max(1))?;
		self.to_match(&track, delta, votes, query.len())
	}

	fn best_matches(
		&self,
		query: &[FingerprintCode],
		limit: usize,
		min_confidence: f32,
	) -> Vec<TrackMatch> {
		if query.is_empty() || limit == 0 {
			return Vec::new();
		}
		let mut matches: Vec<TrackMatch> = self
			.tally(query)
			.best_per_track()
			.into_iter()
			.filter_map(|(track, delta, votes)| self.to_match(&track, delta, votes, query.len()))
			.filter(|track_match| track_match.is_valid(min_confidence))
			.collect();
		matches.sort_by(TrackMatch::cmp_rank);
		matches.truncate(limit);
		matches
	}

	fn track(&self, track_id: &str) -> Option<TrackRecord> {
		self.tracks.get(track_id).map(|record| record.value().clone())
	}

	fn track_count(&self) -> usize {
		self.tracks.len()
	}
}
