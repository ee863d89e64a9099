//! Landmark-based audio fingerprinting.
//!
//! Reference tracks are registered as raw mono 16-bit PCM at 44.1 kHz; short,
//! possibly noisy clips are then identified against them.
//!
//! ```no_run
//! use audiomark::{Config, MatchingService};
//!
//! let service = MatchingService::in_memory(Config::default())?;
//! let reference: Vec<u8> = std::fs::read("track.pcm").unwrap();
//! service.register_track("t1", "Some Track", &reference)?;
//! let result = service.identify_track(&reference[44_100..176_400])?;
//! if let Some(best) = result.best() {
//! 	println!("{} ({:.2})", best.track_id, best.confidence);
//! }
//! # Ok::<(), audiomark::MatchError>(())
//! ```

pub mod config;
pub mod database;
pub mod dft;
pub mod encoder;
pub mod error;
pub mod landmark;
pub mod service;
pub mod wav;

pub use config::{Config, EncoderConfig, MatcherConfig, SAMPLE_RATE};
pub use database::{FingerprintDatabase, InMemoryDatabase, TrackMatch, TrackRecord};
pub use encoder::{Encoder, Peak, Song};
pub use error::MatchError;
pub use landmark::FingerprintCode;
pub use service::{MatchingService, ProcessingResult};
