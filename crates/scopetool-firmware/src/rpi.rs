//! Raspberry Pi hardware backend.
//!
//! Drives step/dir stepper drivers, limit switches, and jog inputs over
//! GPIO, the illumination ring over SPI, and the stage LED with software
//! PWM. Everything here is plumbing behind the [`crate::hal`] traits; no
//! scheduling or protocol logic lives at this layer.

use std::{thread::sleep, time::Duration};

use rppal::{
	gpio::{Gpio, InputPin as GpioInput, Level, OutputPin},
	spi::{Bus, Mode, SlaveSelect, Spi},
};
use tracing::instrument;

use crate::{
	error::Result,
	hal::{Direction, InputPin, Motors, PixelRing, StageLed, Switches},
	lighting::{self, RING_PIXELS},
	manual::{ButtonPair, RotaryEncoder},
};

/// Width of a step pulse. A4988/DRV8825-class drivers need at least a
/// microsecond in each state.
const STEP_PULSE: Duration = Duration::from_micros(2);

/// SPI clock for the ring: three SPI bits encode one pixel bit at this rate.
const RING_SPI_HZ: u32 = 2_400_000;

/// Software PWM frequency for the stage LED.
const LED_PWM_HZ: f64 = 1000.0;

/// Pin assignments for the instrument, as BCM GPIO numbers.
///
/// It implements [`Default`] with the wiring of the reference build.
#[derive(Debug, Clone)]
pub struct BenchArgs {
	/// Step pulse pin for CoreXY motor A.
	///
	/// Defaults to 17.
	pub a_step: u8,

	/// Direction pin for CoreXY motor A.
	///
	/// Defaults to 4.
	pub a_dir: u8,

	/// Step pulse pin for CoreXY motor B.
	///
	/// Defaults to 27.
	pub b_step: u8,

	/// Direction pin for CoreXY motor B.
	///
	/// Defaults to 22.
	pub b_dir: u8,

	/// Step pulse pin for the Z motor.
	///
	/// Defaults to 23.
	pub z_step: u8,

	/// Direction pin for the Z motor.
	///
	/// Defaults to 24.
	pub z_dir: u8,

	/// Upper Z limit switch, asserted high at the stop.
	///
	/// Defaults to 5.
	pub z_upper: u8,

	/// Lower Z limit switch, asserted high at the stop.
	///
	/// Defaults to 6.
	pub z_lower: u8,

	/// Z jog-up button, active low with the internal pull-up.
	///
	/// Defaults to 19.
	pub up_button: u8,

	/// Z jog-down button, active low with the internal pull-up.
	///
	/// Defaults to 26.
	pub down_button: u8,

	/// Rotary encoder clock line.
	///
	/// Defaults to 20.
	pub rotary_clk: u8,

	/// Rotary encoder data line.
	///
	/// Defaults to 21.
	pub rotary_dat: u8,

	/// Rotary encoder axis-select switch, active low.
	///
	/// Defaults to 16.
	pub rotary_select: u8,

	/// SPI bus for the illumination ring.
	///
	/// Defaults to 0.
	pub ring_spi: u8,

	/// SPI CE number for the illumination ring.
	///
	/// Defaults to 0.
	pub ring_ce: u8,

	/// Stage LED pin, dimmed with software PWM.
	///
	/// Defaults to 12.
	pub stage_led: u8,
}

impl Default for BenchArgs {
	fn default() -> Self {
		Self {
			a_step: 17,
			a_dir: 4,
			b_step: 27,
			b_dir: 22,
			z_step: 23,
			z_dir: 24,
			z_upper: 5,
			z_lower: 6,
			up_button: 19,
			down_button: 26,
			rotary_clk: 20,
			rotary_dat: 21,
			rotary_select: 16,
			ring_spi: 0,
			ring_ce: 0,
			stage_led: 12,
		}
	}
}

struct MotorPins {
	step: OutputPin,
	dir: OutputPin,
}

impl MotorPins {
	fn new(gpio: &Gpio, step: u8, dir: u8) -> Result<Self> {
		Ok(Self {
			step: gpio.get(step)?.into_output_low(),
			dir: gpio.get(dir)?.into_output_low(),
		})
	}

	fn pulse(&mut self, direction: Direction) {
		self.dir.write(match direction {
			Direction::Forward => Level::High,
			Direction::Backward => Level::Low,
		});
		self.step.set_high();
		sleep(STEP_PULSE);
		self.step.set_low();
	}
}

/// The three step/dir stepper drivers.
pub struct RpiMotors {
	a: MotorPins,
	b: MotorPins,
	z: MotorPins,
}

impl RpiMotors {
	#[instrument(level = "debug", skip(gpio))]
	pub fn new(gpio: &Gpio, args: &BenchArgs) -> Result<Self> {
		Ok(Self {
			a: MotorPins::new(gpio, args.a_step, args.a_dir)?,
			b: MotorPins::new(gpio, args.b_step, args.b_dir)?,
			z: MotorPins::new(gpio, args.z_step, args.z_dir)?,
		})
	}
}

impl Motors for RpiMotors {
	fn step_a(&mut self, direction: Direction) {
		self.a.pulse(direction);
	}

	fn step_b(&mut self, direction: Direction) {
		self.b.pulse(direction);
	}

	fn step_z(&mut self, direction: Direction) {
		self.z.pulse(direction);
	}
}

/// The Z limit switches.
pub struct RpiSwitches {
	upper: GpioInput,
	lower: GpioInput,
}

impl RpiSwitches {
	#[instrument(level = "debug", skip(gpio))]
	pub fn new(gpio: &Gpio, args: &BenchArgs) -> Result<Self> {
		Ok(Self {
			upper: gpio.get(args.z_upper)?.into_input(),
			lower: gpio.get(args.z_lower)?.into_input(),
		})
	}
}

impl Switches for RpiSwitches {
	fn z_upper(&mut self) -> bool {
		self.upper.is_high()
	}

	fn z_lower(&mut self) -> bool {
		self.lower.is_high()
	}
}

/// A GPIO input usable with the manual-control providers.
pub struct RpiPin(GpioInput);

impl InputPin for RpiPin {
	fn is_high(&mut self) -> bool {
		self.0.is_high()
	}
}

/// The Z jog buttons, wired active-low against the internal pull-ups.
pub fn jog_buttons(gpio: &Gpio, args: &BenchArgs) -> Result<ButtonPair<RpiPin>> {
	Ok(ButtonPair::new(
		RpiPin(gpio.get(args.up_button)?.into_input_pullup()),
		RpiPin(gpio.get(args.down_button)?.into_input_pullup()),
	))
}

/// The rotary encoder, if the build carries one.
pub fn rotary(gpio: &Gpio, args: &BenchArgs) -> Result<RotaryEncoder<RpiPin>> {
	Ok(RotaryEncoder::new(
		RpiPin(gpio.get(args.rotary_clk)?.into_input_pullup()),
		RpiPin(gpio.get(args.rotary_dat)?.into_input_pullup()),
		RpiPin(gpio.get(args.rotary_select)?.into_input_pullup()),
	))
}

/// The illumination ring, driven as addressable pixels over SPI.
///
/// Each pixel bit becomes three SPI bits at 2.4 MHz (`110` for one, `100`
/// for zero), which lands within the pixels' timing tolerances; a frame is
/// followed by enough idle bytes to latch.
pub struct SpiRing {
	spi: Spi,
}

impl SpiRing {
	#[instrument(level = "debug")]
	pub fn new(args: &BenchArgs) -> Result<Self> {
		let spi = Spi::new(
			match args.ring_spi {
				0 => Bus::Spi0,
				1 => Bus::Spi1,
				2 => Bus::Spi2,
				_ => unreachable!("SPI bus number out of range"),
			},
			match args.ring_ce {
				0 => SlaveSelect::Ss0,
				1 => SlaveSelect::Ss1,
				2 => SlaveSelect::Ss2,
				_ => unreachable!("SPI CE number out of range"),
			},
			RING_SPI_HZ,
			Mode::Mode0,
		)?;
		Ok(Self { spi })
	}
}

impl PixelRing for SpiRing {
	fn show(&mut self, frame: &[scopetool_proto::Rgb; RING_PIXELS], brightness: u8) -> Result<()> {
		let mut data = Vec::with_capacity(RING_PIXELS * 9 + 18);
		for pixel in frame {
			let scaled = lighting::scale(*pixel, brightness);
			// pixels take GRB order
			for channel in [scaled.g, scaled.r, scaled.b] {
				let mut bits: u32 = 0;
				for bit in (0..8).rev() {
					bits <<= 3;
					bits |= if channel >> bit & 1 == 1 { 0b110 } else { 0b100 };
				}
				data.extend_from_slice(&bits.to_be_bytes()[1..]);
			}
		}
		// hold the line low past the latch interval
		data.extend_from_slice(&[0; 18]);
		self.spi.write(&data)?;
		Ok(())
	}
}

/// The stage LED on a software-PWM pin.
pub struct SoftPwmLed {
	pin: OutputPin,
}

impl SoftPwmLed {
	#[instrument(level = "debug", skip(gpio))]
	pub fn new(gpio: &Gpio, args: &BenchArgs) -> Result<Self> {
		Ok(Self { pin: gpio.get(args.stage_led)?.into_output_low() })
	}
}

impl StageLed for SoftPwmLed {
	fn set_duty(&mut self, value: u8) -> Result<()> {
		self.pin.set_pwm_frequency(LED_PWM_HZ, value as f64 / 255.0)?;
		Ok(())
	}
}
