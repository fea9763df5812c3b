/// In-band protocol failures, exactly as the instrument spells them.
///
/// Each variant's [`Display`](std::fmt::Display) form is the wire line
/// (without the `\r\n`), so the firmware can write `error.to_string()` and
/// the host can match received lines with [`ProtoError::from_line`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
#[cfg_attr(feature = "miette", derive(miette::Diagnostic))]
pub enum ProtoError {
	/// The verb was not recognised (or its argument did not parse).
	#[error("ERR: UNKNOWN COMMAND")]
	#[cfg_attr(
		feature = "miette",
		diagnostic(help("check the command against the instrument's verb table"))
	)]
	UnknownCommand,

	/// An absolute-position query or move was attempted before homing.
	#[error("ERR: NOT CALIBRATED")]
	#[cfg_attr(
		feature = "miette",
		diagnostic(help("run `calibrate` before absolute-position commands"))
	)]
	NotCalibrated,

	/// An absolute move target fell outside `[0, z_length]`.
	#[error("ERR: POSITION OUT OF RANGE")]
	#[cfg_attr(
		feature = "miette",
		diagnostic(help("the target must be within the calibrated travel"))
	)]
	PositionOutOfRange,
}

impl ProtoError {
	/// Match a received reply line, ignoring any trailing line ending.
	pub fn from_line(line: &str) -> Option<Self> {
		match line.trim_end_matches(['\r', '\n']) {
			"ERR: UNKNOWN COMMAND" => Some(Self::UnknownCommand),
			"ERR: NOT CALIBRATED" => Some(Self::NotCalibrated),
			"ERR: POSITION OUT OF RANGE" => Some(Self::PositionOutOfRange),
			_ => None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_display_matches_wire_spelling() {
		assert_eq!(ProtoError::UnknownCommand.to_string(), "ERR: UNKNOWN COMMAND");
		assert_eq!(ProtoError::NotCalibrated.to_string(), "ERR: NOT CALIBRATED");
		assert_eq!(
			ProtoError::PositionOutOfRange.to_string(),
			"ERR: POSITION OUT OF RANGE"
		);
	}

	#[test]
	fn test_from_line_round_trips_with_and_without_ending() {
		for err in [
			ProtoError::UnknownCommand,
			ProtoError::NotCalibrated,
			ProtoError::PositionOutOfRange,
		] {
			assert_eq!(ProtoError::from_line(&err.to_string()), Some(err));
			assert_eq!(ProtoError::from_line(&format!("{err}\r\n")), Some(err));
		}
		assert_eq!(ProtoError::from_line("OK"), None);
		assert_eq!(ProtoError::from_line("ERR: SOMETHING ELSE"), None);
	}
}
