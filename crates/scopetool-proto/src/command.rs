use std::fmt;

use winnow::{
	PResult, Parser,
	ascii::{dec_int, dec_uint, space1},
	combinator::{eof, fail, preceded},
	token::take_while,
};

use crate::{colour::Rgb, error::ProtoError};

/// Maximum length of a request line, in bytes, excluding the terminator.
///
/// The instrument's line buffer is this long; bytes beyond it are silently
/// discarded until the next newline, and the truncated line is still
/// dispatched (and will normally fail to parse).
pub const MAX_LINE: usize = 40;

/// A request understood by the instrument.
///
/// [`Command::parse`] accepts the wire form and the [`Display`](fmt::Display)
/// impl produces it, so the host encoder and the firmware parser share one
/// grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
	/// Run the Z homing sequence. Blocking on the instrument; the `OK` only
	/// comes back once both limits have been found.
	Calibrate,
	/// Query the calibration flag; value line is `0` or `1`.
	IsCalibrated,
	/// Query the calibrated Z travel in steps.
	ZGetLength,
	/// Query the absolute Z position. Fails with
	/// [`ProtoError::NotCalibrated`] before homing.
	ZGetPosition,
	/// Query the remaining Z motion. The reply is always three lines: the
	/// signed remaining distance, a motion-pending indicator which is
	/// literally `0` once the stage is idle (and the remaining distance
	/// again while it is not), then `OK`.
	ZGetDistanceToGo,
	/// Move Z by a signed number of steps, relative to wherever it is.
	ZMove(i64),
	/// Move Z to an absolute position. Requires calibration and a target
	/// within `[0, z_length]`.
	ZMoveTo(i64),
	/// Set all sixteen ring pixels to one colour.
	SetRingColour(Rgb),
	/// Scale the ring output by `value / 255`.
	SetRingBrightness(u8),
	/// Set the stage LED PWM duty.
	SetStageLedBrightness(u8),
}

impl Command {
	fn parse_next(input: &mut &str) -> PResult<Self> {
		let verb = take_while(1.., |c: char| c != ' ').parse_next(input)?;
		let command = match verb {
			"calibrate" => Self::Calibrate,
			"is_calibrated" => Self::IsCalibrated,
			"z_get_length" => Self::ZGetLength,
			"z_get_position" => Self::ZGetPosition,
			"z_get_distance_to_go" => Self::ZGetDistanceToGo,
			"z_move" => Self::ZMove(preceded(space1, dec_int).parse_next(input)?),
			"z_move_to" => Self::ZMoveTo(preceded(space1, dec_int).parse_next(input)?),
			"set_ring_colour" => {
				Self::SetRingColour(preceded(space1, Rgb::parse_next).parse_next(input)?)
			}
			"set_ring_brightness" => {
				Self::SetRingBrightness(preceded(space1, dec_uint).parse_next(input)?)
			}
			"set_stage_led_brightness" => {
				Self::SetStageLedBrightness(preceded(space1, dec_uint).parse_next(input)?)
			}
			_ => return fail.parse_next(input),
		};
		eof.parse_next(input)?;
		Ok(command)
	}

	/// Parse one request line, with or without its newline.
	///
	/// Anything that does not match the grammar (unknown verb, missing or
	/// malformed argument, trailing junk) is an
	/// [`ProtoError::UnknownCommand`], which is also what the instrument
	/// replies in that case.
	pub fn parse(line: &str) -> Result<Self, ProtoError> {
		Self::parse_next
			.parse(line.trim_end_matches(['\r', '\n']))
			.map_err(|_| ProtoError::UnknownCommand)
	}
}

impl fmt::Display for Command {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Calibrate => f.write_str("calibrate"),
			Self::IsCalibrated => f.write_str("is_calibrated"),
			Self::ZGetLength => f.write_str("z_get_length"),
			Self::ZGetPosition => f.write_str("z_get_position"),
			Self::ZGetDistanceToGo => f.write_str("z_get_distance_to_go"),
			Self::ZMove(steps) => write!(f, "z_move {steps}"),
			Self::ZMoveTo(position) => write!(f, "z_move_to {position}"),
			Self::SetRingColour(colour) => write!(f, "set_ring_colour {colour}"),
			Self::SetRingBrightness(value) => write!(f, "set_ring_brightness {value}"),
			Self::SetStageLedBrightness(value) => {
				write!(f, "set_stage_led_brightness {value}")
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_bare_verbs_parse() {
		assert_eq!(Command::parse("calibrate"), Ok(Command::Calibrate));
		assert_eq!(Command::parse("is_calibrated\n"), Ok(Command::IsCalibrated));
		assert_eq!(Command::parse("z_get_length"), Ok(Command::ZGetLength));
		assert_eq!(Command::parse("z_get_position"), Ok(Command::ZGetPosition));
		assert_eq!(
			Command::parse("z_get_distance_to_go\r\n"),
			Ok(Command::ZGetDistanceToGo)
		);
	}

	#[test]
	fn test_signed_arguments_parse() {
		assert_eq!(Command::parse("z_move -560"), Ok(Command::ZMove(-560)));
		assert_eq!(Command::parse("z_move 5"), Ok(Command::ZMove(5)));
		assert_eq!(Command::parse("z_move_to 1200"), Ok(Command::ZMoveTo(1200)));
	}

	#[test]
	fn test_lighting_arguments_parse() {
		assert_eq!(
			Command::parse("set_ring_colour ff0000"),
			Ok(Command::SetRingColour(Rgb::new(0xff, 0, 0)))
		);
		assert_eq!(
			Command::parse("set_ring_brightness 255"),
			Ok(Command::SetRingBrightness(255))
		);
		assert_eq!(
			Command::parse("set_stage_led_brightness 70"),
			Ok(Command::SetStageLedBrightness(70))
		);
	}

	#[test]
	fn test_malformed_lines_are_unknown_commands() {
		for line in [
			"",
			"frobnicate",
			"z_move",
			"z_move up",
			"z_move 5 5",
			"set_ring_brightness 256",
			"set_ring_brightness -1",
			"set_ring_colour ff00",
			"calibrate now",
		] {
			assert_eq!(Command::parse(line), Err(ProtoError::UnknownCommand), "{line:?}");
		}
	}

	#[test]
	fn test_display_round_trips() {
		let commands = [
			Command::Calibrate,
			Command::IsCalibrated,
			Command::ZGetLength,
			Command::ZGetPosition,
			Command::ZGetDistanceToGo,
			Command::ZMove(-72),
			Command::ZMoveTo(310),
			Command::SetRingColour(Rgb::new(0x12, 0xab, 0xef)),
			Command::SetRingBrightness(128),
			Command::SetStageLedBrightness(0),
		];
		for command in commands {
			assert_eq!(Command::parse(&command.to_string()), Ok(command));
		}
	}

	#[test]
	fn test_wire_lines_fit_the_instrument_buffer() {
		let longest = Command::SetStageLedBrightness(255).to_string();
		assert!(longest.len() <= MAX_LINE);
		assert!(Command::ZMoveTo(i64::MIN).to_string().len() <= MAX_LINE);
	}
}
