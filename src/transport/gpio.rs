//! Software bit-banged link through the Linux GPIO character device.
use std::{thread::sleep, time::Duration};

use anyhow::{Context, Result};
use gpiocdev::line::{Offset, Value};
use gpiocdev::request::{Config, Request};

use super::Transport;
use crate::protocol::InterfaceMode;

/// ~100 kHz clock
pub const DEFAULT_HALF_PERIOD_NS: u64 = 5000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpioTransportConfig {
    /// Chip path, e.g. `/dev/gpiochip0`
    pub chip: String,
    pub cs: Offset,
    pub sck: Offset,
    /// Host to chip data line
    pub data_out: Offset,
    /// Chip to host data line. Same as `data_out` for a 3-wire link.
    pub data_in: Offset,
    pub half_period_ns: u64,
}

impl GpioTransportConfig {
    pub fn new(
        chip: impl Into<String>,
        cs: Offset,
        sck: Offset,
        data_out: Offset,
        data_in: Offset,
    ) -> Self {
        Self {
            chip: chip.into(),
            cs,
            sck,
            data_out,
            data_in,
            half_period_ns: DEFAULT_HALF_PERIOD_NS,
        }
    }

    pub fn with_half_period_ns(mut self, ns: u64) -> Self {
        self.half_period_ns = ns;
        self
    }

    /// A shared data line means the link is 3-wire.
    pub fn is_three_wire(&self) -> bool {
        self.data_in == self.data_out
    }
}

pub struct GpioTransport {
    request: Request,
    config: GpioTransportConfig,
}

impl GpioTransport {
    pub fn open(config: &GpioTransportConfig) -> Result<Self> {
        anyhow::ensure!(!config.chip.is_empty(), "no GPIO chip given");
        log::debug!("Opening GPIO chip {}", config.chip);

        let request = Request::from_config(Self::line_config(config, false))
            .on_chip(&config.chip)
            .with_consumer("max1464")
            .request()
            .with_context(|| format!("cannot request lines on {}", config.chip))?;

        log::info!(
            "Opened {} (cs={}, sck={}, dout={}, din={}, {})",
            config.chip,
            config.cs,
            config.sck,
            config.data_out,
            config.data_in,
            if config.is_three_wire() { "3-wire" } else { "4-wire" }
        );
        Ok(GpioTransport {
            request,
            config: config.clone(),
        })
    }

    /// Idle line state: CS high, SCK low, data out low.
    ///
    /// On a 3-wire link `reading` turns the shared line into an input.
    fn line_config(config: &GpioTransportConfig, reading: bool) -> Config {
        let mut cfg = Config::default();
        cfg.with_line(config.cs).as_output(Value::Active);
        cfg.with_line(config.sck).as_output(Value::Inactive);
        if config.is_three_wire() {
            if reading {
                cfg.with_line(config.data_in).as_input();
            } else {
                cfg.with_line(config.data_out).as_output(Value::Inactive);
            }
        } else {
            cfg.with_line(config.data_out).as_output(Value::Inactive);
            cfg.with_line(config.data_in).as_input();
        }
        cfg
    }

    fn turn_around(&mut self, reading: bool) -> Result<()> {
        if self.config.is_three_wire() {
            self.request
                .reconfigure(&Self::line_config(&self.config, reading))
                .context("cannot turn the data line around")?;
        }
        Ok(())
    }

    fn set(&self, line: Offset, high: bool) -> Result<()> {
        let value = if high { Value::Active } else { Value::Inactive };
        self.request.set_value(line, value)?;
        Ok(())
    }

    fn delay(&self) {
        if self.config.half_period_ns > 0 {
            sleep(Duration::from_nanos(self.config.half_period_ns));
        }
    }

    fn clock_in(&self) -> Result<u16> {
        self.select(true)?;
        let mut word = 0u16;
        for i in (0..16).rev() {
            self.set(self.config.sck, true)?;
            self.delay();
            if self.request.value(self.config.data_in)? == Value::Active {
                word |= 1 << i;
            }
            self.set(self.config.sck, false)?;
            self.delay();
        }
        self.select(false)?;
        Ok(word)
    }

    fn select(&self, active: bool) -> Result<()> {
        self.set(self.config.sck, false)?;
        // active low
        self.set(self.config.cs, !active)?;
        self.delay();
        Ok(())
    }
}

/// Runs `read` with the data line turned into an input. The line is handed back
/// even when `read` fails.
fn with_line_as_input<S, R>(
    state: &mut S,
    turn_around: fn(&mut S, bool) -> Result<()>,
    read: fn(&S) -> Result<R>,
) -> Result<R> {
    turn_around(state, true)?;
    let value = read(state);
    let restored = turn_around(state, false);
    let value = value?;
    restored?;
    Ok(value)
}

impl Transport for GpioTransport {
    fn shift_out(&mut self, byte: u8) -> Result<()> {
        self.select(true)?;
        for i in 0..8 {
            self.set(self.config.data_out, byte & (1 << i) != 0)?;
            self.delay();
            self.set(self.config.sck, true)?;
            self.delay();
            self.set(self.config.sck, false)?;
        }
        self.select(false)
    }

    fn shift_in(&mut self) -> Result<u16> {
        with_line_as_input(self, GpioTransport::turn_around, GpioTransport::clock_in)
    }

    fn set_interface_mode(&mut self, mode: InterfaceMode) -> Result<()> {
        let wired = if self.config.is_three_wire() {
            InterfaceMode::ThreeWire
        } else {
            InterfaceMode::FourWire
        };
        if mode != wired {
            log::warn!("chip switched to {} but the lines are wired {}", mode, wired);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Line {
        input: bool,
        turns: Vec<bool>,
        fail_read: bool,
    }

    fn turn(line: &mut Line, reading: bool) -> Result<()> {
        line.input = reading;
        line.turns.push(reading);
        Ok(())
    }

    fn read(line: &Line) -> Result<u16> {
        anyhow::ensure!(line.input, "line is not an input");
        anyhow::ensure!(!line.fail_read, "read failed");
        Ok(0x1234)
    }

    #[test]
    fn read_turns_line_around_and_back() {
        let mut line = Line::default();
        assert_eq!(with_line_as_input(&mut line, turn, read).unwrap(), 0x1234);
        assert_eq!(line.turns, vec![true, false]);
        assert!(!line.input);
    }

    #[test]
    fn failed_read_still_restores_output() {
        let mut line = Line {
            fail_read: true,
            ..Default::default()
        };
        let err = with_line_as_input(&mut line, turn, read).unwrap_err();
        assert_eq!(err.to_string(), "read failed");
        assert_eq!(line.turns, vec![true, false]);
        assert!(!line.input);
    }

    #[test]
    fn shared_data_line_is_three_wire() {
        let config = GpioTransportConfig::new("/dev/gpiochip0", 8, 11, 10, 10);
        assert!(config.is_three_wire());
        assert!(!GpioTransportConfig::new("/dev/gpiochip0", 8, 11, 10, 9).is_three_wire());
    }
}
