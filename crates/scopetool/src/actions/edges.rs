use std::path::PathBuf;

use clap::Parser;
use miette::{IntoDiagnostic, Result, WrapErr};
use tracing::info;

use super::Context;
use crate::edges::{
	DEFAULT_HIGH_MULTIPLIER, DEFAULT_LOW_MULTIPLIER, EdgeDetector, GradientKind, Kernel,
};

/// Detect edges in an image with the Canny pipeline.
///
/// The result is a binary image, six pixels smaller in each dimension than
/// the input because the border never has enough neighbours to participate.
#[derive(Debug, Clone, Parser)]
pub struct EdgesArgs {
	/// Image to analyse
	pub image: PathBuf,

	/// Smoothing kernel file: a scalar prefactor, then 25 entries
	#[arg(long, default_value = "matrix_size5.txt")]
	pub kernel: PathBuf,

	/// Strong-edge threshold, as a multiple of the average gradient
	#[arg(long, default_value_t = DEFAULT_HIGH_MULTIPLIER)]
	pub high: f32,

	/// Weak-edge threshold, as a multiple of the average gradient
	#[arg(long, default_value_t = DEFAULT_LOW_MULTIPLIER)]
	pub low: f32,

	/// Use the central-difference gradient instead of Sobel
	#[arg(long)]
	pub simple_gradient: bool,

	/// Where to write the result
	#[arg(long, default_value = "result_of_edge_detection.jpg")]
	pub output: PathBuf,
}

pub async fn run(ctx: Context<EdgesArgs>) -> Result<()> {
	let args = ctx.args_top;

	let image = image::open(&args.image)
		.into_diagnostic()
		.wrap_err_with(|| format!("open {}", args.image.display()))?
		.to_rgb8();
	let kernel = Kernel::from_file(&args.kernel).into_diagnostic()?;

	let detector = EdgeDetector {
		kernel,
		gradient: if args.simple_gradient { GradientKind::Central } else { GradientKind::Sobel },
		high_multiplier: args.high,
		low_multiplier: args.low,
	};
	let edges = detector.detect(&image);

	edges
		.save(&args.output)
		.into_diagnostic()
		.wrap_err_with(|| format!("write {}", args.output.display()))?;
	info!(output = %args.output.display(), "edge detection complete");
	println!("wrote {}", args.output.display());
	Ok(())
}
