use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use audiomark::{wav, Config, FingerprintDatabase, MatchingService};
use clap::Parser;
use log::{error, info};

/// Registers every audio file of a catalog directory, then identifies the
/// query clips against it. Files are mono 16-bit 44.1 kHz WAV or raw
/// little-endian PCM (`.pcm`, `.raw`).
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
	/// Directory of reference tracks; the file stem becomes the track id
	#[arg(long)]
	catalog: PathBuf,

	/// JSON file overriding matcher and encoder settings
	#[arg(long)]
	config: Option<PathBuf>,

	/// Report every track above `--min-confidence` instead of the single best
	#[arg(long)]
	top: bool,

	#[arg(long)]
	limit: Option<usize>,

	#[arg(long)]
	min_confidence: Option<f32>,

	/// Clips to identify
	#[arg(required = true)]
	queries: Vec<PathBuf>,
}

fn read_pcm(path: &Path) -> anyhow::Result<Vec<u8>> {
	let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
	match path.extension().and_then(|ext| ext.to_str()) {
		Some("wav") => {
			wav::pcm_payload(&bytes).with_context(|| format!("parsing {}", path.display()))
		}
		Some("pcm" | "raw") => Ok(bytes),
		_ => bail!("{} is neither .wav nor raw .pcm", path.display()),
	}
}

fn is_audio(path: &Path) -> bool {
	matches!(
		path.extension().and_then(|ext| ext.to_str()),
		Some("wav" | "pcm" | "raw")
	)
}

fn main() -> anyhow::Result<()> {
	env_logger::init();
	let args = Args::parse();
	let config = match &args.config {
		Some(path) => Config::from_json_file(path)?,
		None => Config::default(),
	};
	let service = MatchingService::in_memory(config)?;

	let start = std::time::Instant::now();
	let mut catalog: Vec<PathBuf> = std::fs::read_dir(&args.catalog)
		.with_context(|| format!("listing {}", args.catalog.display()))?
		.filter_map(|entry| entry.ok().map(|entry| entry.path()))
		.filter(|path| is_audio(path))
		.collect();
	catalog.sort();
	for path in &catalog {
		let Some(track_id) = path.file_stem().and_then(|stem| stem.to_str()) else {
			continue;
		};
		match read_pcm(path).and_then(|pcm| Ok(service.register_track(track_id, track_id, &pcm)?)) {
			Ok(codes) => info!("{track_id}: {codes} codes"),
			Err(err) => error!("Skipping {}: {err:#}", path.display()),
		}
	}
	info!(
		"Catalog of {} tracks built in {:?}",
		service.database().track_count(),
		start.elapsed()
	);

	let start = std::time::Instant::now();
	for path in &args.queries {
		let pcm = read_pcm(path)?;
		let result = if args.top {
			service.find_best_matches(
				&pcm,
				args.limit.unwrap_or(config.matcher.default_limit),
				args.min_confidence
					.unwrap_or(config.matcher.default_min_confidence),
			)?
		} else {
			service.identify_track(&pcm)?
		};
		match result.best() {
			Some(best) => info!("{}: {} ({:.2})", path.display(), best.track_id, best.confidence),
			None => info!("{}: no match", path.display()),
		}
		println!(
			"{}",
			serde_json::json!({ "query": path.display().to_string(), "result": result })
		);
	}
	info!("Matching took {:?}", start.elapsed());
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn reads_wav_and_raw_catalog_entries() {
		let dir = tempfile::tempdir().unwrap();
		let wav_path = dir.path().join("tone.wav");
		let mut writer = hound::WavWriter::create(&wav_path, wav::PCM_SPEC).unwrap();
		writer.write_sample(0x0201i16).unwrap();
		writer.finalize().unwrap();
		let raw_path = dir.path().join("tone.pcm");
		std::fs::write(&raw_path, [1u8, 2]).unwrap();

		assert_eq!(read_pcm(&wav_path).unwrap(), [1, 2]);
		assert_eq!(read_pcm(&raw_path).unwrap(), [1, 2]);
		assert!(read_pcm(&dir.path().join("notes.txt")).is_err());
		assert!(is_audio(&wav_path));
		assert!(!is_audio(Path::new("cover.jpg")));
	}

	#[test]
	fn catalog_size_is_reported_through_the_database() {
		let service = MatchingService::in_memory(Config::default()).unwrap();
		service.register_track("quiet", "quiet", &[0, 0]).unwrap();
		assert_eq!(service.database().track_count(), 1);
	}
}
