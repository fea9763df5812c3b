use std::num::NonZeroU32;

use clap::Parser;
use miette::{IntoDiagnostic, Result};
use tracing::info;

use super::{CaptureArgs, TuningArgs};
use crate::actions::{ConnectArgs, Context};

/// Characterize the focus function: equally spaced captures over the whole
/// travel, with every score appended to the focus log.
///
/// Offline analysis only; this does not move the stage to the best score.
#[derive(Debug, Clone, Parser)]
pub struct TestRunArgs {
	#[command(flatten)]
	pub connect: ConnectArgs,

	#[command(flatten)]
	pub capture: CaptureArgs,

	#[command(flatten)]
	pub tuning: TuningArgs,

	/// Number of stills to take
	pub images: NonZeroU32,
}

pub async fn run(ctx: Context<TestRunArgs>) -> Result<()> {
	let args = ctx.args_top;
	let mut autofocus = super::engine(&args.connect, &args.capture, &args.tuning)?;

	autofocus.test_run(args.images.get()).into_diagnostic()?;

	let log = args.capture.dir.join(crate::autofocus::FOCUS_LOG_NAME);
	info!(log = %log.display(), "test run complete");
	println!("scores written to {}", log.display());
	Ok(())
}
