mod error;

pub use error::{Error, Result};

use std::{fs, path::PathBuf};

use clap::{
	Parser,
	builder::{
		Styles,
		styling::{AnsiColor, Effects},
	},
};
use tracing_subscriber::EnvFilter;

use sift_service::{SearchRequest, SearchResponse, SiftService};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(
	version = VERSION,
	rename_all = "kebab",
	styles = styles(),
	about = "Search the literature for papers relevant to a research question."
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE", default_value = "sift.toml")]
	pub config: PathBuf,
	#[arg(long, short = 'q', value_name = "TEXT")]
	pub query: String,
	/// Defaults to `ranking.max_results`.
	#[arg(long, short = 'n', value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
	pub max_results: Option<u32>,
	/// Writes the JSON report here instead of stdout.
	#[arg(long, short = 'o', value_name = "FILE")]
	pub output: Option<PathBuf>,
}

pub fn styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Cyan.on_default() | Effects::BOLD)
		.usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
		.literal(AnsiColor::Yellow.on_default() | Effects::BOLD)
		.placeholder(AnsiColor::Green.on_default())
}

pub async fn run(args: Args) -> Result<SearchResponse> {
	let config = sift_config::load(&args.config)?;
	let filter = EnvFilter::new(config.service.log_level.clone());

	tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

	let service = SiftService::new(config)?;
	let mut request = SearchRequest::new(args.query.clone());

	request.max_results = args.max_results;

	let response = service.search(request).await?;

	if response.is_degraded() {
		tracing::warn!(
			diagnostics = response.diagnostics.len(),
			"Search completed with absorbed failures."
		);
	}

	let json = serde_json::to_string_pretty(&response)?;

	match &args.output {
		Some(path) => {
			fs::write(path, format!("{json}\n"))
				.map_err(|source| Error::WriteOutput { path: path.clone(), source })?;

			tracing::info!(path = %path.display(), results = response.results.len(), "Report written.");
		},
		None => println!("{json}"),
	}

	Ok(response)
}
