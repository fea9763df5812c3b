//! The focus metric.
//!
//! Sharpness is scored as the variance of pixel intensity normalized by the
//! mean, a coefficient-of-dispersion flavour. Defocused images wash out
//! towards their mean, so the score rises monotonically towards best focus
//! in the neighbourhood of the peak. Units are arbitrary; only comparisons
//! between captures of the same scene mean anything.

use image::GrayImage;

/// Score a greyscale image.
///
/// `score = Σ (p − mean)² / (W·H·mean)`, with the mean substituted by 1e-10
/// when it is zero so an all-black frame scores 0 rather than dividing by
/// zero. Non-negative for every image, and exactly 0 iff all pixels are
/// identical.
pub fn focus_score(image: &GrayImage) -> f64 {
	let count = (image.width() as u64 * image.height() as u64) as f64;
	let sum: f64 = image.pixels().map(|p| p[0] as f64).sum();
	let mut mean = sum / count;
	if mean == 0.0 {
		mean = 1e-10;
	}

	let squared_deviation: f64 = image
		.pixels()
		.map(|p| {
			let d = p[0] as f64 - mean;
			d * d
		})
		.sum();

	squared_deviation / (count * mean)
}
