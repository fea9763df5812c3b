use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use scopetool_proto::Rgb;
use tracing::warn;

use super::{ConnectArgs, Context};

/// Brightness applied when an out-of-range value is given.
const FALLBACK_BRIGHTNESS: u8 = 70;

/// Control the illumination ring and stage LED.
#[derive(Debug, Clone, Parser)]
pub struct LightingArgs {
	#[command(flatten)]
	pub connect: ConnectArgs,

	#[command(subcommand)]
	pub action: LightingAction,
}

#[derive(Debug, Clone, Subcommand)]
pub enum LightingAction {
	/// Set all sixteen ring pixels to one colour
	RingColour {
		/// Colour as six hex digits, like ff0000
		colour: String,
	},

	/// Scale the ring output (0-255)
	RingBrightness { value: i64 },

	/// Set the stage LED brightness (0-255)
	LedBrightness { value: i64 },
}

/// Out-of-range brightnesses fall back to a dim default rather than failing,
/// matching what operators expect from the bench.
fn brightness(value: i64) -> u8 {
	u8::try_from(value).unwrap_or_else(|_| {
		warn!(value, fallback = FALLBACK_BRIGHTNESS, "brightness out of range, using fallback");
		FALLBACK_BRIGHTNESS
	})
}

pub async fn run(ctx: Context<LightingArgs>) -> Result<()> {
	let mut client = ctx.args_top.connect.client()?;

	match ctx.args_top.action {
		LightingAction::RingColour { colour } => {
			let colour: Rgb = colour.parse().into_diagnostic()?;
			client.set_ring_colour(colour).into_diagnostic()?;
		}
		LightingAction::RingBrightness { value } => {
			client.set_ring_brightness(brightness(value)).into_diagnostic()?;
		}
		LightingAction::LedBrightness { value } => {
			client.set_stage_led_brightness(brightness(value)).into_diagnostic()?;
		}
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_brightness_fallback() {
		assert_eq!(brightness(0), 0);
		assert_eq!(brightness(255), 255);
		assert_eq!(brightness(256), FALLBACK_BRIGHTNESS);
		assert_eq!(brightness(-1), FALLBACK_BRIGHTNESS);
	}
}
