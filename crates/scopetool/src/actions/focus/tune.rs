use clap::Parser;
use miette::{IntoDiagnostic, Result};
use tracing::info;

use super::{CaptureArgs, TuningArgs};
use crate::{
	actions::{ConnectArgs, Context},
	autofocus::Scope,
};

/// Fine-tune around the current position (or a given starting point).
///
/// Assumes the stage is already near focus, e.g. after a sweep or a manual
/// adjustment with the jog buttons.
#[derive(Debug, Clone, Parser)]
pub struct TuneArgs {
	#[command(flatten)]
	pub connect: ConnectArgs,

	#[command(flatten)]
	pub capture: CaptureArgs,

	#[command(flatten)]
	pub tuning: TuningArgs,

	/// Move to this absolute Z position before tuning
	#[arg(long)]
	pub start: Option<i64>,

	/// Override the objective's initial step
	#[arg(long)]
	pub step: Option<i64>,
}

pub async fn run(ctx: Context<TuneArgs>) -> Result<()> {
	let args = ctx.args_top;
	let mut autofocus = super::engine(&args.connect, &args.capture, &args.tuning)?;

	if let Some(start) = args.start {
		let scope = autofocus.scope_mut();
		scope.move_to(start).into_diagnostic()?;
		scope.wait_idle().into_diagnostic()?;
	}
	if let Some(step) = args.step {
		autofocus.set_step(step);
	}

	let best = autofocus.fine_tune().into_diagnostic()?;
	info!(position = best.position, score = best.score, "fine-tune complete");
	println!("in focus at z={} (score {:.3})", best.position, best.score);
	Ok(())
}
