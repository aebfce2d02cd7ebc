#![warn(trivial_casts, trivial_numeric_casts, future_incompatible)]
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

use mdk_cmi::file_formats::{Dti, cmi::strip_size_prefix};
use mdk_cmi::{BspEntity, LoadConfig, OutputWriter, load_with_config};

#[derive(Parser, Debug)]
#[command(about = "Decode and run the level scripts in an MDK CMI file", version)]
struct Args {
	/// CMI file to load
	cmi: PathBuf,

	/// DTI file to seed placed entities from
	#[arg(long, value_name = "PATH")]
	dti: Option<PathBuf>,

	/// Directory to write traces into
	#[arg(long, value_name = "DIR", default_value = "output")]
	output: PathBuf,

	/// TOML file with load settings
	#[arg(long, value_name = "FILE")]
	config: Option<PathBuf>,

	/// Override the number of delay ticks run after loading
	#[arg(long, value_name = "N")]
	ticks: Option<usize>,

	/// Skip writing summary.json
	#[arg(long)]
	no_json: bool,
}

fn read_placements(path: &Path) -> Result<Vec<BspEntity>> {
	let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
	let dti = Dti::parse(&bytes).with_context(|| format!("parsing {}", path.display()))?;
	log::debug!("{}", dti.info());
	Ok(dti.placements())
}

fn main() -> Result<()> {
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
	let args = Args::parse();

	#[cfg(feature = "readranges")]
	log::info!("read ranges enabled");

	let start_time = std::time::Instant::now();

	let mut config = match &args.config {
		Some(path) => LoadConfig::from_file(path)
			.with_context(|| format!("loading config {}", path.display()))?,
		None => LoadConfig::default(),
	};
	if let Some(ticks) = args.ticks {
		config.tick_iterations = ticks;
	}

	let placements = match &args.dti {
		Some(path) => read_placements(path)?,
		None => Vec::new(),
	};

	let file = fs::read(&args.cmi).with_context(|| format!("reading {}", args.cmi.display()))?;
	let cmi = strip_size_prefix(&file);
	let level = load_with_config(cmi, &placements, &config)
		.with_context(|| format!("loading {}", args.cmi.display()))?;

	let writer = OutputWriter::new(&args.output, true)
		.with_context(|| format!("creating {}", args.output.display()))?;
	writer
		.write_level(&level, !args.no_json)
		.context("writing traces")?;

	#[cfg(feature = "readranges")]
	for span in mdk_cmi::reader::unread_spans(cmi) {
		log::info!("unread: {:06X}..{:06X} ({} bytes)", span.start, span.end, span.len());
	}

	log::info!("done in {:.2?}", start_time.elapsed());
	Ok(())
}
