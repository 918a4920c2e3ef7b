//! Programmer configuration, read from YAML.
//!
//! ```yaml
//! transport:
//!   kind: gpio
//!   chip: /dev/gpiochip0
//!   cs: 8
//!   sck: 11
//!   data-out: 10
//!   data-in: 10
//! mode: 3wire
//! ```
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::protocol::InterfaceMode;
use crate::transport::{TraceTransport, Transport};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub transport: TransportConfig,
    /// Interface mode to put the chip in after connecting. Defaults to what the
    /// transport is wired for.
    #[serde(default)]
    pub mode: Option<InterfaceMode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TransportConfig {
    Spidev {
        device: String,
        #[serde(default = "default_speed", deserialize_with = "parse_frequency")]
        speed: u32,
    },
    #[serde(rename_all = "kebab-case")]
    Gpio {
        chip: String,
        cs: u32,
        sck: u32,
        data_out: u32,
        /// Omit for a 3-wire link on `data-out`.
        #[serde(default)]
        data_in: Option<u32>,
        #[serde(default = "default_half_period")]
        half_period_ns: u64,
    },
    /// Logs the traffic without touching any hardware.
    Trace,
}

fn default_speed() -> u32 {
    4_000_000
}

fn default_half_period() -> u64 {
    5000
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let p = path.as_ref();
        let raw = std::fs::read_to_string(p)
            .with_context(|| format!("cannot read config {}", p.display()))?;
        Self::from_yaml(&raw).with_context(|| format!("invalid config {}", p.display()))
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn spidev(device: impl Into<String>) -> Self {
        Config {
            transport: TransportConfig::Spidev {
                device: device.into(),
                speed: default_speed(),
            },
            mode: None,
        }
    }

    pub fn trace() -> Self {
        Config {
            transport: TransportConfig::Trace,
            mode: None,
        }
    }

    /// The mode the chip is switched to after connecting.
    pub fn interface_mode(&self) -> InterfaceMode {
        if let Some(mode) = self.mode {
            return mode;
        }
        match &self.transport {
            TransportConfig::Gpio {
                data_out, data_in, ..
            } if data_in.is_some_and(|din| din != *data_out) => InterfaceMode::FourWire,
            TransportConfig::Gpio { .. } => InterfaceMode::ThreeWire,
            TransportConfig::Spidev { .. } => InterfaceMode::FourWire,
            TransportConfig::Trace => InterfaceMode::ThreeWire,
        }
    }

    pub fn open_transport(&self) -> Result<Box<dyn Transport>> {
        match &self.transport {
            #[cfg(feature = "spidev")]
            TransportConfig::Spidev { device, speed } => {
                use crate::transport::{SpidevTransport, SpidevTransportConfig};
                let config = SpidevTransportConfig::new(device.as_str()).with_speed(*speed);
                Ok(Box::new(SpidevTransport::open(&config)?))
            }
            #[cfg(feature = "gpio")]
            TransportConfig::Gpio {
                chip,
                cs,
                sck,
                data_out,
                data_in,
                half_period_ns,
            } => {
                use crate::transport::{GpioTransport, GpioTransportConfig};
                let config = GpioTransportConfig::new(
                    chip.as_str(),
                    *cs,
                    *sck,
                    *data_out,
                    data_in.unwrap_or(*data_out),
                )
                .with_half_period_ns(*half_period_ns);
                Ok(Box::new(GpioTransport::open(&config)?))
            }
            TransportConfig::Trace => Ok(Box::new(TraceTransport::new())),
            #[allow(unreachable_patterns)]
            other => anyhow::bail!("transport {:?} is not compiled in", other),
        }
    }
}

/// Accepts `4000000`, `"4M"`, `"400K"`, `"100kHz"` or `"0x3d0900"`.
fn parse_frequency<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u32),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(hz) => Ok(hz),
        Raw::Text(s) => parse_frequency_str(&s).ok_or_else(|| {
            serde::de::Error::custom(format!("error while parsing frequency {:?}", s))
        }),
    }
}

fn parse_frequency_str(s: &str) -> Option<u32> {
    let s = s.trim();
    let s = s
        .strip_suffix("Hz")
        .or_else(|| s.strip_suffix("hz"))
        .unwrap_or(s)
        .trim_end();
    let (digits, scale) = if let Some(d) = s.strip_suffix(['M', 'm']) {
        (d, 1_000_000)
    } else if let Some(d) = s.strip_suffix(['K', 'k']) {
        (d, 1_000)
    } else {
        (s, 1)
    };
    let value = crate::protocol::parse_number(digits)?;
    u32::try_from(value.checked_mul(scale)?).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpio_config_defaults_to_three_wire() {
        let config = Config::from_yaml(
            "transport:\n  kind: gpio\n  chip: /dev/gpiochip0\n  cs: 8\n  sck: 11\n  data-out: 10\n",
        )
        .unwrap();
        assert_eq!(
            config.transport,
            TransportConfig::Gpio {
                chip: "/dev/gpiochip0".into(),
                cs: 8,
                sck: 11,
                data_out: 10,
                data_in: None,
                half_period_ns: 5000,
            }
        );
        assert_eq!(config.interface_mode(), InterfaceMode::ThreeWire);
    }

    #[test]
    fn gpio_with_separate_lines_is_four_wire() {
        let config = Config::from_yaml(
            "transport:\n  kind: gpio\n  chip: /dev/gpiochip0\n  cs: 8\n  sck: 11\n  data-out: 10\n  data-in: 9\n",
        )
        .unwrap();
        assert_eq!(config.interface_mode(), InterfaceMode::FourWire);
    }

    #[test]
    fn spidev_speed_accepts_suffixes() {
        let config = Config::from_yaml(
            "transport:\n  kind: spidev\n  device: /dev/spidev0.0\n  speed: 400K\nmode: 3wire\n",
        )
        .unwrap();
        assert_eq!(
            config.transport,
            TransportConfig::Spidev {
                device: "/dev/spidev0.0".into(),
                speed: 400_000,
            }
        );
        assert_eq!(config.interface_mode(), InterfaceMode::ThreeWire);

        let config =
            Config::from_yaml("transport:\n  kind: spidev\n  device: /dev/spidev0.0\n  speed: 1000000\n")
                .unwrap();
        assert!(matches!(
            config.transport,
            TransportConfig::Spidev { speed: 1_000_000, .. }
        ));
        assert_eq!(config.interface_mode(), InterfaceMode::FourWire);
    }

    #[test]
    fn frequency_strings() {
        assert_eq!(parse_frequency_str("4M"), Some(4_000_000));
        assert_eq!(parse_frequency_str("100kHz"), Some(100_000));
        assert_eq!(parse_frequency_str("0x3d0900"), Some(4_000_000));
        assert_eq!(parse_frequency_str("fast"), None);
        assert_eq!(parse_frequency_str("5000M"), None);
    }

    #[test]
    fn trace_transport_needs_no_hardware() {
        let config = Config::from_yaml("transport:\n  kind: trace\n").unwrap();
        assert_eq!(config, Config::trace());
        let mut transport = config.open_transport().unwrap();
        transport.send(0x78, "CR_HALT_CPU").unwrap();
    }
}
