//! Command dispatch.
//!
//! Owns the parse buffer, routes complete lines to the stage and lighting,
//! and writes the framed reply. Every command produces one or more
//! `\r\n`-terminated lines; successful replies end with `OK`, failures are a
//! single `ERR: …` line with no `OK`.

use std::io::Write;

use scopetool_proto::{Command, LINE_ENDING, OK_LINE, ProtoError};
use tracing::trace;

use crate::{
	error::Result,
	hal::{Clock, Motors, PixelRing, StageLed, Switches},
	lighting::Lighting,
	link::CommandLine,
	stage::{Axis, Stage},
};

/// Parses request bytes and executes complete command lines.
#[derive(Debug, Default)]
pub struct Dispatcher {
	line: CommandLine,
}

impl Dispatcher {
	pub fn new() -> Self {
		Self { line: CommandLine::new() }
	}

	/// Consume one serial byte; on a complete line, execute it and write the
	/// reply.
	pub fn feed<M, S, C, R, L>(
		&mut self,
		byte: u8,
		stage: &mut Stage<M, S, C>,
		lighting: &mut Lighting<R, L>,
		reply: &mut impl Write,
	) -> Result<()>
	where
		M: Motors,
		S: Switches,
		C: Clock,
		R: PixelRing,
		L: StageLed,
	{
		if let Some(line) = self.line.push(byte) {
			Self::execute(line, stage, lighting, reply)?;
		}
		Ok(())
	}

	/// Execute one command line and write its reply.
	pub fn execute<M, S, C, R, L>(
		line: &str,
		stage: &mut Stage<M, S, C>,
		lighting: &mut Lighting<R, L>,
		reply: &mut impl Write,
	) -> Result<()>
	where
		M: Motors,
		S: Switches,
		C: Clock,
		R: PixelRing,
		L: StageLed,
	{
		trace!(line, "dispatching command");
		let command = match Command::parse(line) {
			Ok(command) => command,
			Err(err) => return Self::fail(reply, err),
		};

		match command {
			// blocks until homing completes; serial input is not consumed
			// meanwhile, and the OK below only goes out afterwards
			Command::Calibrate => stage.calibrate(),
			Command::IsCalibrated => Self::value(reply, stage.is_calibrated() as i64)?,
			Command::ZGetLength => Self::value(reply, stage.length(Axis::Z))?,
			Command::ZGetPosition => match stage.position(Axis::Z) {
				Ok(position) => Self::value(reply, position)?,
				Err(err) => return Self::fail(reply, err.into()),
			},
			Command::ZGetDistanceToGo => {
				// three-line frame kept for wire compatibility: the
				// distance, then the motion-pending indicator which is
				// literally `0` once the stage is idle, then OK
				let distance = stage.distance_to_go(Axis::Z);
				Self::value(reply, distance)?;
				Self::value(reply, distance)?;
			}
			Command::ZMove(steps) => stage.move_rel(Axis::Z, steps),
			Command::ZMoveTo(position) => {
				if let Err(err) = stage.move_to(Axis::Z, position) {
					return Self::fail(reply, err.into());
				}
			}
			Command::SetRingColour(colour) => lighting.set_ring_colour(colour),
			Command::SetRingBrightness(value) => lighting.set_ring_brightness(value),
			Command::SetStageLedBrightness(value) => {
				lighting.set_stage_led_brightness(value)?
			}
		}

		write!(reply, "{OK_LINE}{LINE_ENDING}")?;
		reply.flush()?;
		Ok(())
	}

	fn value(reply: &mut impl Write, value: i64) -> Result<()> {
		write!(reply, "{value}{LINE_ENDING}")?;
		Ok(())
	}

	fn fail(reply: &mut impl Write, err: ProtoError) -> Result<()> {
		trace!(%err, "command failed");
		write!(reply, "{err}{LINE_ENDING}")?;
		reply.flush()?;
		Ok(())
	}
}
