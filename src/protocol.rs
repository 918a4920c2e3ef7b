//! The nibble-oriented register protocol of the MAX1464.
//!
//! Every transaction the host sends is a single byte: the high nibble carries a
//! value and the low nibble selects one of the Internal Register Set Address
//! (IRSA) slots. Multi-nibble registers are written most significant nibble first.

use std::{fmt, str::FromStr};

use anyhow::Result;
use bitfield::bitfield;
use clap::{ValueEnum, builder::PossibleValue};
use serde::{Deserialize, Serialize};

use crate::constants::{PARTITION_0_SIZE, PARTITION_1_SIZE};

/// Declares a closed hardware enumeration with its datasheet names.
macro_rules! hardware_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident: $repr:ty {
            $(
                $(#[$vmeta:meta])*
                $variant:ident = $value:literal => $label:literal,
            )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr($repr)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                $variant = $value,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Datasheet name.
            pub const fn name(self) -> &'static str {
                match self {
                    $($name::$variant => $label,)+
                }
            }
        }

        impl From<$name> for $repr {
            fn from(value: $name) -> $repr {
                value as $repr
            }
        }

        impl TryFrom<$repr> for $name {
            type Error = anyhow::Error;

            fn try_from(raw: $repr) -> Result<Self> {
                match raw {
                    $($value => Ok($name::$variant),)+
                    _ => anyhow::bail!(
                        "0x{:02x} is not a valid {}",
                        raw,
                        stringify!($name)
                    ),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }

        impl FromStr for $name {
            type Err = anyhow::Error;

            /// Accepts the datasheet name (case-insensitive) or a numeric value.
            fn from_str(s: &str) -> Result<Self> {
                if let Some(found) = $name::ALL
                    .iter()
                    .find(|v| v.name().eq_ignore_ascii_case(s))
                {
                    return Ok(*found);
                }
                let raw = parse_number(s)
                    .ok_or_else(|| anyhow::format_err!("unknown {}: {:?}", stringify!($name), s))?;
                let raw = <$repr>::try_from(raw)
                    .map_err(|_| anyhow::format_err!("{} out of range: {:?}", stringify!($name), s))?;
                $name::try_from(raw)
            }
        }
    };
}

pub(crate) use hardware_enum;

hardware_enum! {
    /// Command Register (CR) opcodes.
    pub enum Command: u8 {
        Write16DhrToCpuPort = 0x0 => "CR_WRITE16_DHR_TO_CPU_PORT",
        Write8DhrToFlashMemory = 0x1 => "CR_WRITE8_DHR_TO_FLASH_MEMORY",
        Read16CpuPort = 0x2 => "CR_READ16_CPU_PORT",
        /// Copy the flash byte at PFAR into the DHR.
        Read8Flash = 0x3 => "CR_READ8_FLASH",
        Read16CpuAcc = 0x4 => "CR_READ16_CPU_ACC",
        /// Copy the flash byte at the CPU program counter into the DHR.
        Read8FlashPc = 0x5 => "CR_READ8_FLASH_PC",
        Read16CpuPc = 0x6 => "CR_READ16_CPU_PC",
        HaltCpu = 0x7 => "CR_HALT_CPU",
        StartCpu = 0x8 => "CR_START_CPU",
        SingleStepCpu = 0x9 => "CR_SINGLE_STEP_CPU",
        ResetPc = 0xa => "CR_RESET_PC",
        ResetModules = 0xb => "CR_RESET_MODULES",
        Nop = 0xc => "CR_NOP",
        EraseFlashPage = 0xd => "CR_ERASE_FLASH_PAGE",
        EraseFlashPartition = 0xe => "CR_ERASE_FLASH_PARTITION",
        SelectFlashPartition1 = 0xf => "CR_SELECT_FLASH_PARTITION_1",
    }
}

hardware_enum! {
    /// Internal Register Set Address, the destination of a nibble write.
    pub enum Irsa: u8 {
        Dhr0 = 0x0 => "IRSA_DHR0",
        Dhr1 = 0x1 => "IRSA_DHR1",
        Dhr2 = 0x2 => "IRSA_DHR2",
        Dhr3 = 0x3 => "IRSA_DHR3",
        Pfar0 = 0x4 => "IRSA_PFAR0",
        Pfar1 = 0x5 => "IRSA_PFAR1",
        Pfar2 = 0x6 => "IRSA_PFAR2",
        Pfar3 = 0x7 => "IRSA_PFAR3",
        Cr = 0x8 => "IRSA_CR",
        Imr = 0x9 => "IRSA_IMR",
    }
}

hardware_enum! {
    /// CPU ports. The module registers sit behind ports D, E and F.
    pub enum CpuPort: u8 {
        Port0 = 0x0 => "PORT_0",
        Port1 = 0x1 => "PORT_1",
        Port2 = 0x2 => "PORT_2",
        Port3 = 0x3 => "PORT_3",
        Port4 = 0x4 => "PORT_4",
        Port5 = 0x5 => "PORT_5",
        Port6 = 0x6 => "PORT_6",
        Port7 = 0x7 => "PORT_7",
        Port8 = 0x8 => "PORT_8",
        Port9 = 0x9 => "PORT_9",
        PortA = 0xa => "PORT_A",
        PortB = 0xb => "PORT_B",
        PortC = 0xc => "PORT_C",
        ModuleData = 0xd => "PORT_D",
        ModuleAddress = 0xe => "PORT_E",
        ModuleControl = 0xf => "PORT_F",
    }
}

hardware_enum! {
    /// Module register addresses, reached through the module CPU ports.
    pub enum ModuleRegister: u16 {
        AdcControl = 0x00 => "ADC_CONTROL",
        AdcData1 = 0x01 => "ADC_DATA_1",
        AdcConfig1A = 0x02 => "ADC_CONFIG_1A",
        AdcConfig1B = 0x03 => "ADC_CONFIG_1B",
        AdcData2 = 0x04 => "ADC_DATA_2",
        AdcConfig2A = 0x05 => "ADC_CONFIG_2A",
        AdcConfig2B = 0x06 => "ADC_CONFIG_2B",
        AdcDataT = 0x07 => "ADC_DATA_T",
        AdcConfigTA = 0x08 => "ADC_CONFIG_TA",
        AdcConfigTB = 0x09 => "ADC_CONFIG_TB",
        Dop1Data = 0x10 => "DOP1_DATA",
        Dop1Control = 0x11 => "DOP1_CONTROL",
        Dop1Config = 0x12 => "DOP1_CONFIG",
        Dop2Data = 0x13 => "DOP2_DATA",
        Dop2Control = 0x14 => "DOP2_CONTROL",
        Dop2Config = 0x15 => "DOP2_CONFIG",
        TmrControl = 0x20 => "TMR_CONTROL",
        TmrConfig = 0x21 => "TMR_CONFIG",
        OpampConfig = 0x30 => "OPAMP_CONFIG",
        PoControl = 0x31 => "PO_CONTROL",
        OscControl = 0x32 => "OSC_CONTROL",
        Gpio1Control = 0x40 => "GPIO1_CONTROL",
        Gpio2Control = 0x41 => "GPIO2_CONTROL",
    }
}

/// Interface Mode Register (IMR) values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum InterfaceMode {
    /// Separate data-in and data-out lines.
    #[serde(rename = "4wire", alias = "4")]
    FourWire = 0x0,
    /// Shared bidirectional data line. Power-on default of the device.
    #[default]
    #[serde(rename = "3wire", alias = "3")]
    ThreeWire = 0x1,
}

impl From<InterfaceMode> for u8 {
    fn from(mode: InterfaceMode) -> u8 {
        mode as u8
    }
}

impl fmt::Display for InterfaceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterfaceMode::FourWire => write!(f, "4-wire"),
            InterfaceMode::ThreeWire => write!(f, "3-wire"),
        }
    }
}

impl ValueEnum for InterfaceMode {
    fn value_variants<'a>() -> &'a [Self] {
        &[InterfaceMode::ThreeWire, InterfaceMode::FourWire]
    }

    fn to_possible_value(&self) -> Option<PossibleValue> {
        match self {
            InterfaceMode::ThreeWire => Some(PossibleValue::new("3wire").aliases(["3"])),
            InterfaceMode::FourWire => Some(PossibleValue::new("4wire").aliases(["4"])),
        }
    }
}

/// One of the two independently erasable flash regions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Partition {
    /// Program memory.
    #[default]
    Partition0,
    /// Small information block.
    Partition1,
}

impl Partition {
    /// Size in bytes.
    pub const fn size(self) -> u16 {
        match self {
            Partition::Partition0 => PARTITION_0_SIZE,
            Partition::Partition1 => PARTITION_1_SIZE,
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Partition::Partition0 => write!(f, "partition 0"),
            Partition::Partition1 => write!(f, "partition 1"),
        }
    }
}

impl FromStr for Partition {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "0" => Ok(Partition::Partition0),
            "1" => Ok(Partition::Partition1),
            _ => anyhow::bail!("flash partition must be 0 or 1, got {:?}", s),
        }
    }
}

bitfield! {
    /// A single nibble transaction as shifted out on the wire.
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct WireByte(u8);
    impl Debug;
    pub u8, value, set_value: 7, 4;
    pub u8, irsa, set_irsa: 3, 0;
}

impl WireByte {
    pub fn new(value: u8, irsa: Irsa) -> Self {
        let mut byte = WireByte(0);
        byte.set_value(value & 0x0f);
        byte.set_irsa(irsa.into());
        byte
    }

    pub fn into_raw(self) -> u8 {
        self.0
    }
}

bitfield! {
    /// Word written to the module control port.
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct ModuleControl(u16);
    impl Debug;
    /// Start a transfer between the module data port and the addressed register.
    pub start, set_start: 15;
    /// Set for register reads, clear for writes.
    pub read, set_read: 14;
}

impl ModuleControl {
    pub fn write() -> Self {
        let mut control = ModuleControl(0);
        control.set_start(true);
        control
    }

    pub fn read_back() -> Self {
        let mut control = ModuleControl::write();
        control.set_read(true);
        control
    }

    pub fn into_raw(self) -> u16 {
        self.0
    }
}

/// Parses `0x`-prefixed hex or decimal.
pub fn parse_number(s: &str) -> Option<u64> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        s.parse().ok()
    }
}
