use clap::Parser;
use miette::{IntoDiagnostic, Result};
use tracing::info;

use super::{CaptureArgs, TuningArgs};
use crate::{
	actions::{ConnectArgs, Context},
	autofocus::Scope,
};

/// Coarse sweep only: descend from the top of the travel, scoring as we go.
///
/// Useful for a first look at an unknown sample, or to seed a later `tune`.
#[derive(Debug, Clone, Parser)]
pub struct SweepArgs {
	#[command(flatten)]
	pub connect: ConnectArgs,

	#[command(flatten)]
	pub capture: CaptureArgs,

	#[command(flatten)]
	pub tuning: TuningArgs,

	/// Move to the sweep maximum afterwards
	#[arg(long)]
	pub goto_max: bool,
}

pub async fn run(ctx: Context<SweepArgs>) -> Result<()> {
	let args = ctx.args_top;
	let mut autofocus = super::engine(&args.connect, &args.capture, &args.tuning)?;

	let scope = autofocus.scope_mut();
	let length = scope.length().into_diagnostic()?;
	scope.move_to(length).into_diagnostic()?;
	scope.wait_idle().into_diagnostic()?;

	let max = autofocus.sweep().into_diagnostic()?;
	info!(position = max.position, index = max.index, score = max.score, "sweep maximum");
	println!("sweep maximum at z={} (image {}, score {:.3})", max.position, max.index, max.score);

	if args.goto_max {
		let scope = autofocus.scope_mut();
		scope.move_to(max.position).into_diagnostic()?;
		scope.wait_idle().into_diagnostic()?;
		println!("moved to z={}", max.position);
	}
	Ok(())
}
