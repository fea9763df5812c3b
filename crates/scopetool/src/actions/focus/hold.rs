use clap::Parser;
use miette::{IntoDiagnostic, Result};
use tokio::time::sleep;
use tracing::info;

use super::{CaptureArgs, TuningArgs};
use crate::{
	actions::{ConnectArgs, Context},
	autofocus::HOLD_STEP,
};

/// Focus once, then keep the sample in focus by re-tuning on an interval.
///
/// Runs until interrupted. Each round resets the search step to a small
/// value, so drift is corrected without big excursions.
#[derive(Debug, Clone, Parser)]
pub struct HoldArgs {
	#[command(flatten)]
	pub connect: ConnectArgs,

	#[command(flatten)]
	pub capture: CaptureArgs,

	#[command(flatten)]
	pub tuning: TuningArgs,

	/// How long between re-tunes
	///
	/// Syntax is a number followed by a unit, such as "90s" or "2m".
	#[arg(long, default_value = "120s")]
	pub interval: humantime::Duration,

	/// Step used by each re-tune
	#[arg(long, default_value_t = HOLD_STEP)]
	pub hold_step: i64,
}

pub async fn run(ctx: Context<HoldArgs>) -> Result<()> {
	let args = ctx.args_top;
	let mut autofocus = super::engine(&args.connect, &args.capture, &args.tuning)?;

	let best = autofocus.fine_tune().into_diagnostic()?;
	info!(position = best.position, score = best.score, "initial focus found");

	loop {
		sleep(*args.interval.as_ref()).await;
		autofocus.set_step(args.hold_step);
		let best = autofocus.fine_tune().into_diagnostic()?;
		info!(position = best.position, score = best.score, "focus refreshed");
	}
}
