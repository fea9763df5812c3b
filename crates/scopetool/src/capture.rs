//! Still capture through the external camera tool.
//!
//! Each autofocus sample shells out to the capture utility (`raspistill` on
//! the instrument, anything with the same flags elsewhere), which writes a
//! JPEG at `<dir>/<name><index>.jpg`; the file is then decoded into a pixel
//! buffer for scoring. Capture latency dominates every sample, so nothing
//! here tries to be clever about speed.

use std::{
	fs,
	path::{Path, PathBuf},
};

use duct::cmd;
use image::RgbImage;
use tracing::{debug, instrument};

/// The capture tool on the instrument.
pub const DEFAULT_PROGRAM: &str = "raspistill";

/// Capture failures. All of them abort the current run; none of them
/// desynchronize the serial link.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum CaptureError {
	#[error("capture tool failed")]
	#[diagnostic(help("is the capture tool installed and the camera connected?"))]
	Tool(#[source] std::io::Error),

	#[error("capture tool produced no file at {path}")]
	Missing { path: PathBuf },

	#[error("could not decode captured image {path}")]
	Decode {
		path: PathBuf,
		#[source]
		source: image::ImageError,
	},

	#[error("could not create output directory {path}")]
	OutputDir {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
}

/// Configuration for sequentially numbered still captures.
#[derive(Debug, Clone)]
pub struct Capture {
	pub program: String,
	pub width: u32,
	pub height: u32,
	pub dir: PathBuf,
	pub name: String,
}

impl Capture {
	pub fn new(dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
		Self {
			program: DEFAULT_PROGRAM.into(),
			width: 480,
			height: 360,
			dir: dir.into(),
			name: name.into(),
		}
	}

	/// Where the still with this sequence index lands.
	pub fn path_for(&self, index: u32) -> PathBuf {
		self.dir.join(format!("{}{index}.jpg", self.name))
	}

	/// Create the output directory if needed.
	pub fn prepare(&self) -> Result<(), CaptureError> {
		fs::create_dir_all(&self.dir).map_err(|source| CaptureError::OutputDir {
			path: self.dir.clone(),
			source,
		})
	}

	/// Take one still and decode it.
	#[instrument(level = "debug", skip(self))]
	pub fn take(&self, index: u32) -> Result<RgbImage, CaptureError> {
		let path = self.path_for(index);
		cmd!(
			&self.program,
			"-n",
			"-w",
			self.width.to_string(),
			"-h",
			self.height.to_string(),
			"-o",
			&path,
			"-t",
			"0",
		)
		.run()
		.map_err(CaptureError::Tool)?;

		if !path.exists() {
			return Err(CaptureError::Missing { path });
		}
		let image = image::open(&path)
			.map_err(|source| CaptureError::Decode { path: path.clone(), source })?;
		debug!(path = %path.display(), "captured still");
		Ok(image.to_rgb8())
	}

	/// Delete one captured still, for runs that do not keep their output.
	pub fn remove(&self, index: u32) {
		let path = self.path_for(index);
		if let Err(err) = fs::remove_file(&path) {
			debug!(path = %path.display(), %err, "could not remove still");
		}
	}
}
