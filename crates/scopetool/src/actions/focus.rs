use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use serialport::SerialPort;

use super::{ConnectArgs, Context};
use crate::{
	autofocus::{Autofocus, DEFAULT_IMPROVEMENT_RATIO, LiveScope, Objective},
	capture::{Capture, DEFAULT_PROGRAM},
};

/// Autofocus routines.
#[derive(Debug, Clone, Parser)]
pub struct FocusArgs {
	/// Subcommand
	#[command(subcommand)]
	pub action: Action,
}

super::subcommands! {
	[Context<FocusArgs> => {|ctx: Context<FocusArgs>| -> Result<(Action, Context<()>)> {
		Ok((ctx.args_top.action, Context::new()))
	}}]

	full => Full(FullArgs),
	hold => Hold(HoldArgs),
	sweep => Sweep(SweepArgs),
	test_run => TestRun(TestRunArgs),
	tune => Tune(TuneArgs)
}

/// Options for capturing stills.
#[derive(Debug, Clone, clap::Args)]
pub struct CaptureArgs {
	/// Width of captured stills
	#[arg(long, default_value_t = 480)]
	pub width: u32,

	/// Height of captured stills
	#[arg(long, default_value_t = 360)]
	pub height: u32,

	/// Directory for stills and the focus-score log
	#[arg(long, default_value = "./test")]
	pub dir: PathBuf,

	/// Common base name for stills
	#[arg(long, default_value = "test")]
	pub name: String,

	/// Capture tool to invoke
	#[arg(long, default_value = DEFAULT_PROGRAM)]
	pub program: String,

	/// Delete each still once it has been scored
	#[arg(long)]
	pub discard_images: bool,
}

impl CaptureArgs {
	fn capture(&self) -> Capture {
		let mut capture = Capture::new(&self.dir, &self.name);
		capture.program = self.program.clone();
		capture.width = self.width;
		capture.height = self.height;
		capture
	}
}

/// Options for the search itself.
#[derive(Debug, Clone, clap::Args)]
pub struct TuningArgs {
	/// Objective fitted to the microscope: 4x, 10x, 40x, or 100x
	#[arg(long, default_value = "4x")]
	pub objective: String,

	/// Required relative improvement for a probe to win
	///
	/// A probe beats the current best when its score is at least
	/// (2 - ratio) times the best score, so the default of 0.99 demands a
	/// 1% improvement.
	#[arg(long, default_value_t = DEFAULT_IMPROVEMENT_RATIO)]
	pub improvement_ratio: f64,

	/// Stage LED brightness applied before capturing (0-255)
	#[arg(long, default_value_t = 70)]
	pub led_brightness: u8,
}

/// Wire client, camera, and search parameters into a ready engine.
pub(crate) fn engine(
	connect: &ConnectArgs,
	capture_args: &CaptureArgs,
	tuning: &TuningArgs,
) -> Result<Autofocus<LiveScope<Box<dyn SerialPort>>>> {
	let mut client = connect.client()?;
	client
		.set_stage_led_brightness(tuning.led_brightness)
		.into_diagnostic()?;

	let capture = capture_args.capture();
	capture.prepare().into_diagnostic()?;

	let scope = LiveScope {
		client,
		capture: capture.clone(),
		keep_images: !capture_args.discard_images,
	};
	Autofocus::new(scope, Objective::from_name(&tuning.objective))
		.with_improvement_ratio(tuning.improvement_ratio)
		.with_log(&capture.dir)
		.into_diagnostic()
}
