//! Greyscale conversion, shared by the focus metric and edge detection.

use image::{GrayImage, Luma, Rgb, RgbImage};

/// BT.601 luma of one RGB pixel.
pub fn luma(pixel: &Rgb<u8>) -> f32 {
	0.299 * pixel[0] as f32 + 0.587 * pixel[1] as f32 + 0.114 * pixel[2] as f32
}

/// Reduce an image to its luma channel.
pub fn greyscale(image: &RgbImage) -> GrayImage {
	GrayImage::from_fn(image.width(), image.height(), |x, y| {
		Luma([luma(image.get_pixel(x, y)).round() as u8])
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_luma_weights() {
		assert_eq!(luma(&Rgb([255, 255, 255])).round(), 255.0);
		assert_eq!(luma(&Rgb([0, 0, 0])), 0.0);
		assert_eq!(luma(&Rgb([255, 0, 0])), 0.299 * 255.0);
		assert_eq!(luma(&Rgb([0, 255, 0])), 0.587 * 255.0);
		assert_eq!(luma(&Rgb([0, 0, 255])), 0.114 * 255.0);
	}

	#[test]
	fn test_greyscale_is_idempotent() {
		let image = RgbImage::from_fn(16, 12, |x, y| Rgb([(x * 16) as u8, (y * 20) as u8, 77]));
		let once = greyscale(&image);
		// feed the grey values back through as an RGB image with equal
		// channels; a second conversion must not change them
		let as_rgb = RgbImage::from_fn(16, 12, |x, y| {
			let g = once.get_pixel(x, y)[0];
			Rgb([g, g, g])
		});
		assert_eq!(greyscale(&as_rgb), once);
	}
}
