fn main() -> miette::Result<()> {
	#[cfg(target_os = "linux")]
	{
		linux::run()
	}
	#[cfg(not(target_os = "linux"))]
	{
		Err(miette::miette!(
			"the instrument daemon needs Raspberry Pi GPIO, which is Linux-only"
		))
	}
}

#[cfg(target_os = "linux")]
mod linux {
	use std::time::Duration;

	use clap::Parser;
	use lloggs::{LoggingArgs, PreArgs, WorkerGuard};
	use miette::{IntoDiagnostic, Result, WrapErr, miette};
	use rppal::gpio::Gpio;
	use scopetool_firmware::{
		Dispatcher, Lighting, Stage,
		hal::WallClock,
		rpi::{self, BenchArgs, RpiMotors, RpiSwitches, SoftPwmLed, SpiRing},
	};
	use scopetool_proto::BAUD_RATE;
	use serialport::{DataBits, Parity, StopBits};
	use tracing::{debug, info};

	/// scopetool instrument daemon
	///
	/// Runs the microscope instrument firmware against real hardware: three
	/// stepper axes, the illumination ring, the stage LED, and the manual
	/// jog inputs, commanded over a serial line from the host.
	#[derive(Debug, Clone, Parser)]
	struct Args {
		#[command(flatten)]
		logging: LoggingArgs,

		/// Serial port device connected to the host
		#[arg(long, default_value = "/dev/ttyAMA0")]
		port: String,

		/// Also poll the rotary encoder inputs
		///
		/// Only useful on builds that carry the encoder; on builds without
		/// one the floating lines would produce phantom nudges.
		#[arg(long)]
		rotary: bool,
	}

	fn get_args() -> Result<(Args, WorkerGuard)> {
		let log_guard = PreArgs::parse().setup().map_err(|err| miette!("{err}"))?;

		debug!("parsing arguments");
		let args = Args::parse();

		let log_guard = match log_guard {
			Some(g) => g,
			None => args
				.logging
				.setup(|v| match v {
					0 => "scopetool_firmware=info",
					1 => "info,scopetool_firmware=debug",
					2 => "debug",
					3 => "debug,scopetool_firmware=trace",
					_ => "trace",
				})
				.map_err(|err| miette!("{err}"))?,
		};

		debug!(?args, "got arguments");
		Ok((args, log_guard))
	}

	pub fn run() -> Result<()> {
		let (args, _guard) = get_args()?;

		let gpio = Gpio::new().into_diagnostic().wrap_err("gpio: init")?;
		let bench = BenchArgs::default();

		let motors = RpiMotors::new(&gpio, &bench).into_diagnostic()?;
		let switches = RpiSwitches::new(&gpio, &bench).into_diagnostic()?;
		let mut stage = Stage::new(motors, switches, WallClock::new())
			.with_input(rpi::jog_buttons(&gpio, &bench).into_diagnostic()?);
		if args.rotary {
			stage = stage.with_input(rpi::rotary(&gpio, &bench).into_diagnostic()?);
		}

		let ring = SpiRing::new(&bench).into_diagnostic().wrap_err("spi: ring")?;
		let led = SoftPwmLed::new(&gpio, &bench).into_diagnostic()?;
		let mut lighting = Lighting::new(ring, led);

		let mut port = serialport::new(&args.port, BAUD_RATE)
			.data_bits(DataBits::Eight)
			.parity(Parity::None)
			.stop_bits(StopBits::One)
			.timeout(Duration::from_millis(1))
			.open()
			.into_diagnostic()
			.wrap_err_with(|| format!("serial: open {}", args.port))?;

		let mut dispatcher = Dispatcher::new();
		info!(port = %args.port, "instrument ready");

		let mut buf = [0u8; 64];
		loop {
			match port.read(&mut buf) {
				Ok(0) => {}
				Ok(n) => {
					for &byte in &buf[..n] {
						dispatcher
							.feed(byte, &mut stage, &mut lighting, &mut port)
							.into_diagnostic()?;
					}
				}
				Err(err) if err.kind() == std::io::ErrorKind::TimedOut => {}
				Err(err) => return Err(err).into_diagnostic().wrap_err("serial: read"),
			}

			stage.tick();
			lighting.tick().into_diagnostic()?;
		}
	}
}
