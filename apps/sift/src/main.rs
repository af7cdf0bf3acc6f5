use std::process::ExitCode;

use clap::Parser;

use sift::Args;

#[tokio::main]
async fn main() -> ExitCode {
	if let Err(err) = color_eyre::install() {
		eprintln!("Failed to install error reporter: {err}");
	}

	let args = Args::parse();

	match sift::run(args).await {
		Ok(_) => ExitCode::SUCCESS,
		Err(err) => {
			let code = err.exit_code();

			eprintln!("Error: {:?}", color_eyre::Report::new(err));

			ExitCode::from(code)
		},
	}
}
