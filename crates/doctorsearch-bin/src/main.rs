//! Development CLI for the physician registry search engine.
//!
//! This binary is a smoke-testing affordance, not the production HTTP
//! dispatcher: it wires up the engine against a local registry file and
//! lets you type queries at a prompt.

use std::io::Write;
use std::path::PathBuf;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::info;
use xeno_doctorsearch::{SearchConfig, SearchEngine};

/// Command line arguments for the development query loop.
#[derive(Parser, Debug)]
#[command(name = "xeno-doctorsearch")]
#[command(about = "Query the physician registry search engine")]
struct Args {
	/// Path to the registry data file.
	#[arg(short, long, value_name = "PATH")]
	data_file: Option<PathBuf>,

	/// Path to a TOML configuration file overlaying the defaults.
	#[arg(short, long, value_name = "PATH")]
	config: Option<PathBuf>,

	/// Verbose logging.
	#[arg(short, long)]
	verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	tracing_subscriber::fmt()
		.with_max_level(if args.verbose {
			tracing::Level::DEBUG
		} else {
			tracing::Level::INFO
		})
		.init();

	let mut config = match &args.config {
		Some(path) => SearchConfig::load(path)?,
		None => SearchConfig::default(),
	};
	if let Some(data_file) = args.data_file {
		config.data_file_path = data_file;
	}

	info!(path = %config.data_file_path.display(), "starting search engine");
	let engine = SearchEngine::spawn(config).await?;

	let stdin = BufReader::new(tokio::io::stdin());
	let mut lines = stdin.lines();
	print!("> ");
	std::io::stdout().flush()?;
	while let Some(line) = lines.next_line().await? {
		if line.trim().is_empty() {
			print!("> ");
			std::io::stdout().flush()?;
			continue;
		}
		match engine.query(&line, 10, CancellationToken::new()).await {
			Ok(results) => {
				for record in results {
					println!("{}\t{}\t{}", record.rpps, record.name, record.address);
				}
			}
			Err(error) => println!("error: {error}"),
		}
		print!("> ");
		std::io::stdout().flush()?;
	}

	engine.shutdown();
	Ok(())
}
