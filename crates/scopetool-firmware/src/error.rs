/// Error type for firmware operations.
#[derive(Debug, thiserror::Error)]
#[cfg_attr(feature = "miette", derive(miette::Diagnostic))]
pub enum Error {
	/// Failure on the serial reply path.
	#[error("serial I/O error")]
	Io(#[from] std::io::Error),

	#[cfg(all(target_os = "linux", feature = "hardware"))]
	#[cfg_attr(
		feature = "miette",
		diagnostic(help("GPIO error, check the pin numbers"))
	)]
	#[error("GPIO error")]
	Gpio(#[from] rppal::gpio::Error),

	#[cfg(all(target_os = "linux", feature = "hardware"))]
	#[cfg_attr(
		feature = "miette",
		diagnostic(help("SPI error, check the ring wiring or increase spidev.bufsiz"))
	)]
	#[error("SPI error")]
	Spi(#[from] rppal::spi::Error),
}

/// Convenience type for Results in this crate.
pub type Result<T> = std::result::Result<T, Error>;
