//! Hardware SPI peripheral through Linux spidev.
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::io::AsRawFd;

use anyhow::{Context, Result};
use scroll::{BE, Pread};

use super::Transport;
use crate::protocol::InterfaceMode;

/// 4 MHz, the clock the chip is usually run at.
pub const DEFAULT_SPEED_HZ: u32 = 4_000_000;

/// SPI mode 0 (CPOL=0, CPHA=0)
const SPI_MODE_0: u8 = 0x00;
/// SI/SO signals shared
const SPI_3WIRE: u8 = 0x10;

mod ioctl {
    use nix::ioctl_write_ptr;

    const SPI_IOC_MAGIC: u8 = b'k';

    const SPI_IOC_TYPE_MODE: u8 = 1;
    const SPI_IOC_TYPE_BITS_PER_WORD: u8 = 3;
    const SPI_IOC_TYPE_MAX_SPEED_HZ: u8 = 4;

    ioctl_write_ptr!(spi_ioc_wr_mode, SPI_IOC_MAGIC, SPI_IOC_TYPE_MODE, u8);
    ioctl_write_ptr!(
        spi_ioc_wr_bits_per_word,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_BITS_PER_WORD,
        u8
    );
    ioctl_write_ptr!(
        spi_ioc_wr_max_speed_hz,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_MAX_SPEED_HZ,
        u32
    );
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpidevTransportConfig {
    /// Device path, e.g. `/dev/spidev0.0`
    pub device: String,
    pub speed_hz: u32,
}

impl SpidevTransportConfig {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            speed_hz: DEFAULT_SPEED_HZ,
        }
    }

    pub fn with_speed(mut self, speed_hz: u32) -> Self {
        self.speed_hz = speed_hz;
        self
    }
}

/// The controller shifts MSB first, so outgoing bytes are mirrored in software to
/// put the LSB on the wire first.
pub struct SpidevTransport {
    file: File,
}

impl SpidevTransport {
    pub fn open(config: &SpidevTransportConfig) -> Result<Self> {
        anyhow::ensure!(!config.device.is_empty(), "no spidev device given");
        log::debug!("Opening spidev {}", config.device);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&config.device)
            .with_context(|| format!("cannot open {}", config.device))?;

        let mut transport = SpidevTransport { file };
        transport.write_mode(SPI_MODE_0)?;

        let fd = transport.file.as_raw_fd();
        let bits: u8 = 8;
        unsafe { ioctl::spi_ioc_wr_bits_per_word(fd, &bits) }
            .context("cannot set 8 bits per word")?;
        let speed = config.speed_hz;
        unsafe { ioctl::spi_ioc_wr_max_speed_hz(fd, &speed) }
            .with_context(|| format!("cannot set clock to {} Hz", speed))?;

        log::info!(
            "Opened {} (mode 0, {} kHz)",
            config.device,
            config.speed_hz / 1000
        );
        Ok(transport)
    }

    fn write_mode(&mut self, mode: u8) -> Result<()> {
        let fd = self.file.as_raw_fd();
        unsafe { ioctl::spi_ioc_wr_mode(fd, &mode) }
            .with_context(|| format!("cannot set SPI mode 0x{:02x}", mode))?;
        Ok(())
    }
}

impl Transport for SpidevTransport {
    fn shift_out(&mut self, byte: u8) -> Result<()> {
        self.file.write_all(&[byte.reverse_bits()])?;
        Ok(())
    }

    fn shift_in(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.file.read_exact(&mut buf)?;
        Ok(buf.pread_with::<u16>(0, BE)?)
    }

    fn set_interface_mode(&mut self, mode: InterfaceMode) -> Result<()> {
        match mode {
            InterfaceMode::ThreeWire => self.write_mode(SPI_MODE_0 | SPI_3WIRE),
            InterfaceMode::FourWire => self.write_mode(SPI_MODE_0),
        }
    }
}
