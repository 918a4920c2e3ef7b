//! Abstract Device transport interface.
use anyhow::Result;

use crate::protocol::InterfaceMode;

#[cfg(feature = "gpio")]
pub use self::gpio::{GpioTransport, GpioTransportConfig};
#[cfg(feature = "spidev")]
pub use self::spidev::{SpidevTransport, SpidevTransportConfig};
pub use self::trace::TraceTransport;

#[cfg(feature = "gpio")]
mod gpio;
#[cfg(feature = "spidev")]
mod spidev;
mod trace;

/// Abstraction of the bit-level link to the chip.
/// Might be a hardware SPI peripheral or bit-banged GPIO lines.
///
/// Every byte and every word is its own chip-select frame. Bytes go out LSB
/// first, words come back MSB first.
pub trait Transport {
    fn shift_out(&mut self, byte: u8) -> Result<()>;
    fn shift_in(&mut self) -> Result<u16>;

    /// Called whenever the chip is switched between 3-wire and 4-wire transfers.
    fn set_interface_mode(&mut self, _mode: InterfaceMode) -> Result<()> {
        Ok(())
    }

    fn send(&mut self, byte: u8, label: &str) -> Result<()> {
        log::trace!("=> {:02x} {}", byte, label);
        self.shift_out(byte)
    }

    fn recv(&mut self) -> Result<u16> {
        let word = self.shift_in()?;
        log::trace!("<= {:04x}", word);
        Ok(word)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn shift_out(&mut self, byte: u8) -> Result<()> {
        (**self).shift_out(byte)
    }

    fn shift_in(&mut self) -> Result<u16> {
        (**self).shift_in()
    }

    fn set_interface_mode(&mut self, mode: InterfaceMode) -> Result<()> {
        (**self).set_interface_mode(mode)
    }
}
