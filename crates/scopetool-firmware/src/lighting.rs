//! The illumination ring and stage LED.
//!
//! Setter calls only touch the pending frame; [`Lighting::tick`] flushes it
//! to the hardware bus, so several setters landing within one main-loop
//! iteration coalesce into a single bus transfer.

use scopetool_proto::Rgb;
use tracing::trace;

use crate::{
	error::Result,
	hal::{PixelRing, StageLed},
};

/// Number of pixels on the illumination ring.
pub const RING_PIXELS: usize = 16;

/// Scale a colour by `brightness / 255`, the way the ring hardware does.
pub fn scale(colour: Rgb, brightness: u8) -> Rgb {
	let channel = |c: u8| ((c as u16 * brightness as u16) / 255) as u8;
	Rgb::new(channel(colour.r), channel(colour.g), channel(colour.b))
}

/// Pending ring frame plus the stage LED, flushed from the main loop.
pub struct Lighting<R, L> {
	frame: [Rgb; RING_PIXELS],
	brightness: u8,
	dirty: bool,
	ring: R,
	led: L,
}

impl<R: PixelRing, L: StageLed> Lighting<R, L> {
	pub fn new(ring: R, led: L) -> Self {
		Self {
			frame: [Rgb::default(); RING_PIXELS],
			brightness: 255,
			// push the all-off frame on the first tick so the ring state
			// is known after boot
			dirty: true,
			ring,
			led,
		}
	}

	/// Set every pixel of the pending frame to one colour.
	pub fn set_ring_colour(&mut self, colour: Rgb) {
		self.frame = [colour; RING_PIXELS];
		self.dirty = true;
	}

	/// Scale all pixel outputs by `value / 255`.
	pub fn set_ring_brightness(&mut self, value: u8) {
		self.brightness = value;
		self.dirty = true;
	}

	/// Set the stage LED PWM duty. Takes effect immediately; the LED is not
	/// part of the ring frame.
	pub fn set_stage_led_brightness(&mut self, value: u8) -> Result<()> {
		self.led.set_duty(value)
	}

	/// Flush the pending frame, if anything changed since the last flush.
	pub fn tick(&mut self) -> Result<()> {
		if self.dirty {
			trace!(brightness = self.brightness, "flushing ring frame");
			self.ring.show(&self.frame, self.brightness)?;
			self.dirty = false;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use std::{cell::RefCell, rc::Rc};

	use super::*;

	#[derive(Debug, Default)]
	struct Recorded {
		frames: Vec<[Rgb; RING_PIXELS]>,
		duties: Vec<u8>,
	}

	#[derive(Clone, Default)]
	struct TestBus(Rc<RefCell<Recorded>>);

	impl PixelRing for TestBus {
		fn show(&mut self, frame: &[Rgb; RING_PIXELS], brightness: u8) -> Result<()> {
			// hardware applies the brightness scalar per channel
			let mut out = [Rgb::default(); RING_PIXELS];
			for (slot, pixel) in out.iter_mut().zip(frame) {
				*slot = scale(*pixel, brightness);
			}
			self.0.borrow_mut().frames.push(out);
			Ok(())
		}
	}

	impl StageLed for TestBus {
		fn set_duty(&mut self, value: u8) -> Result<()> {
			self.0.borrow_mut().duties.push(value);
			Ok(())
		}
	}

	fn lighting() -> (Lighting<TestBus, TestBus>, TestBus) {
		let bus = TestBus::default();
		(Lighting::new(bus.clone(), bus.clone()), bus)
	}

	#[test]
	fn test_setters_coalesce_into_one_flush() {
		let (mut lighting, bus) = lighting();
		lighting.set_ring_colour(Rgb::new(0xff, 0, 0));
		lighting.set_ring_colour(Rgb::new(0, 0xff, 0));
		lighting.set_ring_brightness(128);
		lighting.tick().unwrap();
		assert_eq!(bus.0.borrow().frames.len(), 1);
	}

	#[test]
	fn test_idle_ticks_do_not_touch_the_bus() {
		let (mut lighting, bus) = lighting();
		lighting.tick().unwrap();
		lighting.tick().unwrap();
		lighting.tick().unwrap();
		// only the boot frame goes out
		assert_eq!(bus.0.borrow().frames.len(), 1);
	}

	#[test]
	fn test_brightness_scales_all_pixels() {
		let (mut lighting, bus) = lighting();
		let colour = Rgb::new(200, 100, 50);
		lighting.set_ring_colour(colour);
		lighting.set_ring_brightness(51);
		lighting.tick().unwrap();
		let state = bus.0.borrow();
		let frame = state.frames.last().unwrap();
		assert!(frame.iter().all(|pixel| *pixel == scale(colour, 51)));
	}

	#[test]
	fn test_stage_led_duty_passes_through() {
		let (mut lighting, bus) = lighting();
		lighting.set_stage_led_brightness(70).unwrap();
		assert_eq!(bus.0.borrow().duties, vec![70]);
	}

	#[test]
	fn test_scale_endpoints() {
		let colour = Rgb::new(255, 10, 1);
		assert_eq!(scale(colour, 255), colour);
		assert_eq!(scale(colour, 0), Rgb::default());
	}
}
