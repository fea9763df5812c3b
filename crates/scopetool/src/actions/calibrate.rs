use clap::Parser;
use miette::{IntoDiagnostic, Result};
use tracing::info;

use super::{ConnectArgs, Context};

/// Home the stage and report the measured travel.
///
/// The instrument drives Z to its lower limit to establish the origin, then
/// to the upper limit to measure the travel length. Nothing else happens on
/// the instrument until homing completes, so this can take a while.
#[derive(Debug, Clone, Parser)]
pub struct CalibrateArgs {
	#[command(flatten)]
	pub connect: ConnectArgs,
}

pub async fn run(ctx: Context<CalibrateArgs>) -> Result<()> {
	let mut client = ctx.args_top.connect.client()?;

	info!("starting calibration");
	client.start_calibrate().into_diagnostic()?;
	client.wait_for_calibration().into_diagnostic()?;

	let length = client.z_length().into_diagnostic()?;
	info!(length, "calibration complete");
	println!("calibrated: travel is {length} steps");
	Ok(())
}
