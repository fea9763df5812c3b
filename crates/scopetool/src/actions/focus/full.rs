use clap::Parser;
use miette::{IntoDiagnostic, Result};
use tracing::info;

use super::{CaptureArgs, TuningArgs};
use crate::actions::{ConnectArgs, Context};

/// Run the complete autofocus: sweep from the top, then fine-tune.
///
/// Requires a calibrated stage; run `calibrate` first after power-up.
#[derive(Debug, Clone, Parser)]
pub struct FullArgs {
	#[command(flatten)]
	pub connect: ConnectArgs,

	#[command(flatten)]
	pub capture: CaptureArgs,

	#[command(flatten)]
	pub tuning: TuningArgs,
}

pub async fn run(ctx: Context<FullArgs>) -> Result<()> {
	let args = ctx.args_top;
	let mut autofocus = super::engine(&args.connect, &args.capture, &args.tuning)?;

	let best = autofocus.full().into_diagnostic()?;
	info!(position = best.position, score = best.score, "focus found");
	println!("in focus at z={} (score {:.3})", best.position, best.score);
	Ok(())
}
