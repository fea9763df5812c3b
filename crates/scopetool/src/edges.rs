//! Canny edge detection.
//!
//! Shares the greyscale data path with the focus metric, then runs the
//! classic pipeline: smoothing convolution, gradient, double threshold with
//! non-maximum suppression, hysteresis linking, and a crop of the border
//! that never had enough neighbours to participate.

use std::{
	f32::consts::PI,
	fs,
	path::{Path, PathBuf},
};

use image::{GrayImage, Luma, RgbImage};
use tracing::{debug, instrument};

use crate::grey::greyscale;

/// Side length of the smoothing kernel.
pub const KERNEL_SIZE: usize = 5;

/// Default multiplier over the average gradient for the strong-edge
/// threshold.
pub const DEFAULT_HIGH_MULTIPLIER: f32 = 3.0;

/// Default multiplier over the average gradient for the weak-edge threshold.
pub const DEFAULT_LOW_MULTIPLIER: f32 = 1.2;

/// Rim cropped off each side of the result.
const CROP: u32 = 3;

/// Problems loading the smoothing kernel. Fatal to edge detection, nothing
/// else.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum KernelError {
	#[error("could not read kernel file {path}")]
	Read {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("kernel file {path} is malformed")]
	#[diagnostic(help("the file must hold a prefactor followed by 25 numeric entries"))]
	Malformed { path: PathBuf },
}

/// The 5×5 smoothing kernel, prefactor already applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Kernel {
	weights: [[f32; KERNEL_SIZE]; KERNEL_SIZE],
}

impl Kernel {
	/// Load a kernel from its text form: a scalar prefactor, then 25
	/// whitespace-separated entries in row-major order, each multiplied by
	/// the prefactor. Anything after the 25th entry is ignored.
	pub fn from_file(path: &Path) -> Result<Self, KernelError> {
		let text = fs::read_to_string(path).map_err(|source| KernelError::Read {
			path: path.to_owned(),
			source,
		})?;
		let mut tokens = text.split_whitespace();
		let mut next = || -> Result<f32, KernelError> {
			tokens
				.next()
				.and_then(|token| token.parse().ok())
				.ok_or_else(|| KernelError::Malformed { path: path.to_owned() })
		};

		let factor = next()?;
		let mut weights = [[0.0; KERNEL_SIZE]; KERNEL_SIZE];
		for row in &mut weights {
			for weight in row {
				*weight = factor * next()?;
			}
		}
		Ok(Self { weights })
	}

	pub fn from_entries(factor: f32, entries: [[f32; KERNEL_SIZE]; KERNEL_SIZE]) -> Self {
		let mut weights = entries;
		for row in &mut weights {
			for weight in row {
				*weight *= factor;
			}
		}
		Self { weights }
	}
}

/// Gradient operator choice. Both are provided by tradition; Sobel is the
/// default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GradientKind {
	/// Central differences, `Gx = ½(p[x+1] − p[x−1])`.
	Central,
	#[default]
	Sobel,
}

/// Gradient orientation quantized to the four neighbour directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Orientation {
	Deg0,
	Deg45,
	Deg90,
	Deg135,
}

impl Orientation {
	fn quantize(gx: f32, gy: f32) -> Self {
		let angle = gy.atan2(gx).abs();
		if angle < PI / 8.0 || angle >= 7.0 * PI / 8.0 {
			Self::Deg0
		} else if angle < 3.0 * PI / 8.0 {
			Self::Deg45
		} else if angle < 5.0 * PI / 8.0 {
			Self::Deg90
		} else {
			Self::Deg135
		}
	}

	/// The two neighbour offsets along this orientation.
	fn neighbours(self) -> [(i64, i64); 2] {
		match self {
			Self::Deg0 => [(-1, 0), (1, 0)],
			Self::Deg45 => [(1, 1), (-1, -1)],
			Self::Deg90 => [(0, -1), (0, 1)],
			Self::Deg135 => [(-1, 1), (1, -1)],
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edge {
	None,
	Weak,
	Strong,
}

/// A float-valued image plane.
#[derive(Debug, Clone)]
struct Field {
	width: usize,
	height: usize,
	data: Vec<f32>,
}

impl Field {
	fn from_gray(image: &GrayImage) -> Self {
		Self {
			width: image.width() as usize,
			height: image.height() as usize,
			data: image.pixels().map(|p| p[0] as f32).collect(),
		}
	}

	fn zeroed(width: usize, height: usize) -> Self {
		Self { width, height, data: vec![0.0; width * height] }
	}

	fn at(&self, x: usize, y: usize) -> f32 {
		self.data[y * self.width + x]
	}

	fn set(&mut self, x: usize, y: usize, value: f32) {
		self.data[y * self.width + x] = value;
	}
}

/// The Canny pipeline with its tuning knobs.
#[derive(Debug, Clone)]
pub struct EdgeDetector {
	pub kernel: Kernel,
	pub gradient: GradientKind,
	pub high_multiplier: f32,
	pub low_multiplier: f32,
}

impl EdgeDetector {
	pub fn new(kernel: Kernel) -> Self {
		Self {
			kernel,
			gradient: GradientKind::default(),
			high_multiplier: DEFAULT_HIGH_MULTIPLIER,
			low_multiplier: DEFAULT_LOW_MULTIPLIER,
		}
	}

	/// Run the pipeline. The result is binary (0 or 255) and, because of
	/// the cropped rim, `(W−6)×(H−6)` for a `W×H` input.
	#[instrument(level = "debug", skip(self, image))]
	pub fn detect(&self, image: &RgbImage) -> GrayImage {
		let grey = Field::from_gray(&greyscale(image));
		let smoothed = self.smooth(&grey);
		let (magnitude, orientation) = match self.gradient {
			GradientKind::Central => central_gradient(&smoothed),
			GradientKind::Sobel => sobel_gradient(&smoothed),
		};
		let mut edges = self.threshold(&magnitude, &orientation);
		link_edges(&mut edges, smoothed.width, smoothed.height);
		debug!(
			strong = edges.iter().filter(|e| **e == Edge::Strong).count(),
			"edges established"
		);
		render(&edges, smoothed.width, smoothed.height)
	}

	/// Convolve interior pixels with the smoothing kernel; the 2-pixel
	/// border keeps its greyscale values and is cropped later.
	fn smooth(&self, field: &Field) -> Field {
		let mut out = field.clone();
		let limit = KERNEL_SIZE / 2;
		if field.width < KERNEL_SIZE || field.height < KERNEL_SIZE {
			return out;
		}
		for y in limit..field.height - limit {
			for x in limit..field.width - limit {
				let mut sum = 0.0;
				for (ky, row) in self.kernel.weights.iter().enumerate() {
					for (kx, weight) in row.iter().enumerate() {
						sum += weight * field.at(x - limit + kx, y - limit + ky);
					}
				}
				out.set(x, y, sum);
			}
		}
		out
	}

	/// Double threshold with non-maximum suppression.
	///
	/// Thresholds are multiples of the average gradient magnitude, summed
	/// over the interior but normalized over the full frame; only pixels
	/// that beat both neighbours along their gradient direction are
	/// eligible at all, and a 3-pixel border is forced to no-edge.
	fn threshold(&self, magnitude: &Field, orientation: &[Orientation]) -> Vec<Edge> {
		let (width, height) = (magnitude.width, magnitude.height);
		let mut edges = vec![Edge::None; width * height];
		if width <= 2 * CROP as usize || height <= 2 * CROP as usize {
			return edges;
		}

		let border = CROP as usize;
		let mut total = 0.0;
		for y in border..height - border {
			for x in border..width - border {
				total += magnitude.at(x, y);
			}
		}
		let average = total / (width * height) as f32;
		let high = average * self.high_multiplier;
		let low = average * self.low_multiplier;

		for y in border..height - border {
			for x in border..width - border {
				let value = magnitude.at(x, y);
				let suppressed = orientation[y * width + x]
					.neighbours()
					.iter()
					.any(|(dx, dy)| {
						let nx = (x as i64 + dx) as usize;
						let ny = (y as i64 + dy) as usize;
						magnitude.at(nx, ny) >= value
					});
				edges[y * width + x] = if suppressed {
					Edge::None
				} else if value > high {
					Edge::Strong
				} else if value > low {
					Edge::Weak
				} else {
					Edge::None
				};
			}
		}
		edges
	}
}

fn central_gradient(field: &Field) -> (Field, Vec<Orientation>) {
	gradient_with(field, |field, x, y| {
		let gx = 0.5 * (field.at(x + 1, y) - field.at(x - 1, y));
		let gy = 0.5 * (field.at(x, y + 1) - field.at(x, y - 1));
		(gx, gy)
	})
}

fn sobel_gradient(field: &Field) -> (Field, Vec<Orientation>) {
	gradient_with(field, |field, x, y| {
		let gx = -field.at(x - 1, y - 1) - 2.0 * field.at(x - 1, y) - field.at(x - 1, y + 1)
			+ field.at(x + 1, y - 1)
			+ 2.0 * field.at(x + 1, y)
			+ field.at(x + 1, y + 1);
		let gy = field.at(x - 1, y - 1) + 2.0 * field.at(x, y - 1) + field.at(x + 1, y - 1)
			- field.at(x - 1, y + 1)
			- 2.0 * field.at(x, y + 1)
			- field.at(x + 1, y + 1);
		(gx, gy)
	})
}

fn gradient_with(
	field: &Field,
	operator: impl Fn(&Field, usize, usize) -> (f32, f32),
) -> (Field, Vec<Orientation>) {
	let (width, height) = (field.width, field.height);
	let mut magnitude = Field::zeroed(width, height);
	let mut orientation = vec![Orientation::Deg0; width * height];
	if width < 3 || height < 3 {
		return (magnitude, orientation);
	}
	for y in 1..height - 1 {
		for x in 1..width - 1 {
			let (gx, gy) = operator(field, x, y);
			magnitude.set(x, y, (gx * gx + gy * gy).sqrt());
			orientation[y * width + x] = Orientation::quantize(gx, gy);
		}
	}
	(magnitude, orientation)
}

/// Hysteresis linking: promote weak edges with a strong edge anywhere in
/// their 5×5 neighbourhood. Swept in both raster directions because links
/// can propagate either way; leftover weak edges are dropped.
fn link_edges(edges: &mut [Edge], width: usize, height: usize) {
	if width < 4 || height < 4 {
		edges.fill(Edge::None);
		return;
	}

	let promote = |edges: &mut [Edge], x: usize, y: usize| {
		if edges[y * width + x] != Edge::Weak {
			return;
		}
		for dy in -2i64..=2 {
			for dx in -2i64..=2 {
				let nx = (x as i64 + dx) as usize;
				let ny = (y as i64 + dy) as usize;
				if edges[ny * width + nx] == Edge::Strong {
					edges[y * width + x] = Edge::Strong;
					return;
				}
			}
		}
	};

	for y in 2..height - 2 {
		for x in 2..width - 2 {
			promote(edges, x, y);
		}
	}
	for y in (2..height - 2).rev() {
		for x in (2..width - 2).rev() {
			promote(edges, x, y);
		}
	}

	for edge in edges.iter_mut() {
		if *edge == Edge::Weak {
			*edge = Edge::None;
		}
	}
}

/// Render strong edges white and everything else black, cropping the
/// 3-pixel rim that the border handling blanked.
fn render(edges: &[Edge], width: usize, height: usize) -> GrayImage {
	let out_width = (width as u32).saturating_sub(2 * CROP);
	let out_height = (height as u32).saturating_sub(2 * CROP);
	GrayImage::from_fn(out_width, out_height, |x, y| {
		let index = (y as usize + CROP as usize) * width + x as usize + CROP as usize;
		if edges[index] == Edge::Strong {
			Luma([255])
		} else {
			Luma([0])
		}
	})
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use image::Rgb;

	use super::*;

	fn identity_kernel() -> Kernel {
		let mut entries = [[0.0; KERNEL_SIZE]; KERNEL_SIZE];
		entries[2][2] = 1.0;
		Kernel::from_entries(1.0, entries)
	}

	fn step_image(width: u32, height: u32) -> RgbImage {
		RgbImage::from_fn(width, height, |x, _| {
			if x < width / 2 { Rgb([10, 10, 10]) } else { Rgb([240, 240, 240]) }
		})
	}

	/// A one-pixel bright vertical line; its flanks are clean local maxima
	/// of the gradient, unlike a symmetric step whose two equal columns
	/// suppress each other.
	fn line_image(width: u32, height: u32, line_x: u32) -> RgbImage {
		RgbImage::from_fn(width, height, |x, _| {
			if x == line_x { Rgb([240, 240, 240]) } else { Rgb([10, 10, 10]) }
		})
	}

	#[test]
	fn test_kernel_from_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("matrix_size5.txt");
		let mut file = std::fs::File::create(&path).unwrap();
		write!(file, "0.5").unwrap();
		for i in 0..25 {
			write!(file, " {i}").unwrap();
		}
		drop(file);

		let kernel = Kernel::from_file(&path).unwrap();
		let mut expected = [[0.0f32; KERNEL_SIZE]; KERNEL_SIZE];
		for (row, values) in expected.iter_mut().enumerate() {
			for (col, value) in values.iter_mut().enumerate() {
				*value = 0.5 * (row * KERNEL_SIZE + col) as f32;
			}
		}
		assert_eq!(kernel, Kernel { weights: expected });
	}

	#[test]
	fn test_kernel_with_too_few_entries_is_malformed() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("short.txt");
		std::fs::write(&path, "1.0 1 2 3").unwrap();
		assert!(matches!(Kernel::from_file(&path), Err(KernelError::Malformed { .. })));
	}

	#[test]
	fn test_kernel_with_junk_is_malformed() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("junk.txt");
		std::fs::write(&path, "1.0 1 2 three 4 5 6 7 8 9 10 11 12 13 14 15 16 17 18 19 20 21 22 23 24 25").unwrap();
		assert!(matches!(Kernel::from_file(&path), Err(KernelError::Malformed { .. })));
	}

	#[test]
	fn test_missing_kernel_file() {
		assert!(matches!(
			Kernel::from_file(Path::new("/nonexistent/kernel.txt")),
			Err(KernelError::Read { .. })
		));
	}

	#[test]
	fn test_output_is_binary_and_cropped() {
		let detector = EdgeDetector::new(identity_kernel());
		let out = detector.detect(&step_image(40, 30));
		assert_eq!((out.width(), out.height()), (34, 24));
		assert!(out.pixels().all(|p| p[0] == 0 || p[0] == 255));
	}

	#[test]
	fn test_vertical_line_produces_vertical_edges() {
		let detector = EdgeDetector::new(identity_kernel());
		let out = detector.detect(&line_image(40, 30, 20));
		// the line's flanks sit at input x = 19 and 21, output x = 16 and 18
		for flank in [16, 18] {
			let on_edge =
				(0..out.height()).filter(|y| out.get_pixel(flank, *y)[0] == 255).count();
			assert!(on_edge > (out.height() / 2) as usize, "x={flank}: {on_edge} edge pixels");
		}
		// far from the line everything is background
		assert!((0..out.height()).all(|y| out.get_pixel(2, y)[0] == 0));
		assert!((0..out.height()).all(|y| out.get_pixel(30, y)[0] == 0));
	}

	#[test]
	fn test_central_gradient_finds_the_same_line() {
		let mut detector = EdgeDetector::new(identity_kernel());
		detector.gradient = GradientKind::Central;
		let out = detector.detect(&line_image(40, 30, 20));
		assert!(out.pixels().any(|p| p[0] == 255));
	}

	#[test]
	fn test_uniform_image_has_no_edges() {
		let detector = EdgeDetector::new(identity_kernel());
		let image = RgbImage::from_pixel(32, 32, Rgb([128, 128, 128]));
		let out = detector.detect(&image);
		assert!(out.pixels().all(|p| p[0] == 0));
	}

	#[test]
	fn test_tiny_image_degenerates_to_empty_output() {
		let detector = EdgeDetector::new(identity_kernel());
		let out = detector.detect(&step_image(6, 6));
		assert_eq!((out.width(), out.height()), (0, 0));
	}
}
