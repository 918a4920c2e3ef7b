//! Bit layouts of the module registers.
//!
//! Each layout converts into the `u16` taken by
//! [`Max1464::write_module_register`](crate::Max1464::write_module_register).
//! Multi-bit fields take the enumerations below; single bits are plain setters.
use std::{fmt, str::FromStr};

use anyhow::Result;
use bitfield::bitfield;

use crate::protocol::{hardware_enum, parse_number};

macro_rules! register_word {
    ($($name:ident),+ $(,)?) => {
        $(
            impl $name {
                pub fn into_raw(self) -> u16 {
                    self.0
                }
            }

            impl From<$name> for u16 {
                fn from(value: $name) -> u16 {
                    value.0
                }
            }
        )+
    };
}

register_word!(
    AdcControl,
    AdcConfigA,
    AdcConfigB,
    DopControl,
    DopConfig,
    OpampConfig,
    GpioControl,
    TmrControl,
    TmrConfig,
    PoControl,
    OscControl,
);

hardware_enum! {
    /// Single-ended conversion input, ADC_CONTROL[11:8].
    pub enum SingleEndedInput: u8 {
        Vbg = 0x1 => "CNVT_SE_VBG",
        Sm = 0x2 => "CNVT_SE_SM",
        Lg = 0x3 => "CNVT_SE_LG",
        Vdd = 0x4 => "CNVT_SE_VDD",
        Vss = 0x5 => "CNVT_SE_VSS",
        DacSm = 0x6 => "CNVT_SE_DACSM",
        DacLg = 0x7 => "CNVT_SE_DACLG",
        Inp = 0x8 => "CNVT_SE_INP",
        Inm = 0x9 => "CNVT_SE_INM",
    }
}

bitfield! {
    /// ADC_CONTROL: conversion triggers.
    #[derive(Clone, Copy, Default, PartialEq, Eq)]
    pub struct AdcControl(u16);
    impl Debug;
    pub u8, single_ended, set_single_ended: 11, 8;
    pub convert_1, set_convert_1: 2;
    pub convert_2, set_convert_2: 1;
    pub convert_t, set_convert_t: 0;
}

impl AdcControl {
    /// Starts a single-ended conversion of `input`.
    pub fn single_ended_conversion(input: SingleEndedInput) -> Self {
        let mut control = AdcControl(0);
        control.set_single_ended(input.into());
        control
    }
}

hardware_enum! {
    /// PGA gain, ADC_CONFIG_nA[15:11]. Not every code is a valid gain step.
    pub enum PgaGain: u8 {
        Gain0_99 = 0x00 => "PGA_GAIN_0_99",
        Gain7_7 = 0x01 => "PGA_GAIN_7_7",
        Gain15_5 = 0x02 => "PGA_GAIN_15_5",
        Gain23 = 0x03 => "PGA_GAIN_23",
        Gain31 = 0x04 => "PGA_GAIN_31",
        Gain39 = 0x05 => "PGA_GAIN_39",
        Gain46 = 0x06 => "PGA_GAIN_46",
        Gain54 = 0x07 => "PGA_GAIN_54",
        Gain65 = 0x08 => "PGA_GAIN_65",
        Gain77 = 0x0a => "PGA_GAIN_77",
        Gain92 = 0x0c => "PGA_GAIN_92",
        Gain107 = 0x0e => "PGA_GAIN_107",
        Gain123 = 0x10 => "PGA_GAIN_123",
        Gain153 = 0x14 => "PGA_GAIN_153",
        Gain183 = 0x18 => "PGA_GAIN_183",
        Gain214 = 0x1c => "PGA_GAIN_214",
        Gain244 = 0x1e => "PGA_GAIN_244",
    }
}

hardware_enum! {
    /// ADC clock, ADC_CONFIG_nA[10:8].
    pub enum AdcClock: u8 {
        Clk1MHz = 0x0 => "CLK_1MHZ",
        Clk500kHz = 0x1 => "CLK_500KHZ",
        Clk250kHz = 0x2 => "CLK_250KHZ",
        Clk125kHz = 0x3 => "CLK_125KHZ",
        Clk62_5kHz = 0x4 => "CLK_62_5KHZ",
        Clk31_25kHz = 0x5 => "CLK_31_25KHZ",
        Clk15_625kHz = 0x6 => "CLK_15_625KHZ",
        Clk7_8125kHz = 0x7 => "CLK_7_8125KHZ",
    }
}

hardware_enum! {
    /// ADC resolution, ADC_CONFIG_nA[6:4]. There is no 11-bit setting.
    pub enum AdcResolution: u8 {
        Bits9 = 0x0 => "RES_9BIT",
        Bits10 = 0x1 => "RES_10BIT",
        Bits12 = 0x2 => "RES_12BIT",
        Bits13 = 0x3 => "RES_13BIT",
        Bits14 = 0x4 => "RES_14BIT",
        Bits15 = 0x5 => "RES_15BIT",
        Bits16 = 0x6 => "RES_16BIT",
    }
}

bitfield! {
    /// ADC_CONFIG_nA: gain, clock, resolution and coarse offset of one channel.
    #[derive(Clone, Copy, Default, PartialEq, Eq)]
    pub struct AdcConfigA(u16);
    impl Debug;
    pub u8, pga, set_pga: 15, 11;
    pub u8, clock, set_clock: 10, 8;
    pub u8, resolution, set_resolution: 6, 4;
    pub u8, coarse_offset, set_coarse_offset: 3, 0;
}

impl AdcConfigA {
    /// `coarse_offset` is the 4-bit CO code.
    pub fn new(
        pga: PgaGain,
        clock: AdcClock,
        resolution: AdcResolution,
        coarse_offset: u8,
    ) -> Self {
        let mut config = AdcConfigA(0);
        config.set_pga(pga.into());
        config.set_clock(clock.into());
        config.set_resolution(resolution.into());
        config.set_coarse_offset(coarse_offset & 0x0f);
        config
    }
}

hardware_enum! {
    /// ADC bias current in eighths of full scale, ADC_CONFIG_nB[6:4].
    pub enum AdcBias: u8 {
        Bias1_8 = 0x0 => "BIAS_1_8",
        Bias2_8 = 0x1 => "BIAS_2_8",
        Bias3_8 = 0x2 => "BIAS_3_8",
        Bias4_8 = 0x3 => "BIAS_4_8",
        Bias5_8 = 0x4 => "BIAS_5_8",
        Bias6_8 = 0x5 => "BIAS_6_8",
        Bias7_8 = 0x6 => "BIAS_7_8",
        Bias8_8 = 0x7 => "BIAS_8_8",
    }
}

hardware_enum! {
    /// ADC reference source, ADC_CONFIG_nB[1:0].
    pub enum AdcReference: u8 {
        Vdd = 0x0 => "REF_VDD",
        TwoVref = 0x1 => "REF_2VREF",
        FourVbg = 0x2 => "REF_4VBG",
    }
}

bitfield! {
    /// ADC_CONFIG_nB
    #[derive(Clone, Copy, Default, PartialEq, Eq)]
    pub struct AdcConfigB(u16);
    impl Debug;
    pub u8, bias, set_bias: 6, 4;
    pub u8, reference, set_reference: 1, 0;
}

impl AdcConfigB {
    pub fn new(bias: AdcBias, reference: AdcReference) -> Self {
        let mut config = AdcConfigB(0);
        config.set_bias(bias.into());
        config.set_reference(reference.into());
        config
    }
}

bitfield! {
    /// DOPn_CONTROL
    #[derive(Clone, Copy, Default, PartialEq, Eq)]
    pub struct DopControl(u16);
    impl Debug;
    pub enable_pwm, set_enable_pwm: 4;
    pub enable_dac, set_enable_dac: 0;
}

bitfield! {
    /// DOPn_CONFIG
    #[derive(Clone, Copy, Default, PartialEq, Eq)]
    pub struct DopConfig(u16);
    impl Debug;
    pub pwm_large, set_pwm_large: 8;
    pub dac_large, set_dac_large: 4;
    pub reference, set_reference: 0;
}

bitfield! {
    /// OPAMP_CONFIG: output buffer enables.
    #[derive(Clone, Copy, Default, PartialEq, Eq)]
    pub struct OpampConfig(u16);
    impl Debug;
    pub buffer_2, set_buffer_2: 1;
    pub buffer_1, set_buffer_1: 0;
}

bitfield! {
    /// GPIOn_CONTROL
    #[derive(Clone, Copy, Default, PartialEq, Eq)]
    pub struct GpioControl(u16);
    impl Debug;
    pub output, set_output: 5;
    pub enable, set_enable: 4;
    /// Pin level, read only.
    pub input, _: 3;
    pub clear, set_clear: 2;
    pub invert, set_invert: 1;
    pub edge, set_edge: 0;
}

impl GpioControl {
    pub fn input_mode() -> Self {
        GpioControl(0x0000)
    }

    pub fn output_low() -> Self {
        GpioControl(0x0010)
    }

    pub fn output_high() -> Self {
        GpioControl(0x0030)
    }

    /// Edge detection on a rising edge, latch cleared.
    pub fn rising_edge() -> Self {
        GpioControl(0x0005)
    }

    /// Edge detection on a falling edge, latch cleared.
    pub fn falling_edge() -> Self {
        GpioControl(0x0007)
    }
}

bitfield! {
    /// TMR_CONTROL
    #[derive(Clone, Copy, Default, PartialEq, Eq)]
    pub struct TmrControl(u16);
    impl Debug;
    /// Timeout reached.
    pub done, set_done: 15;
    pub enable, set_enable: 14;
    /// Halt the CPU until the timer is done.
    pub enable_halt, set_enable_halt: 0;
}

hardware_enum! {
    /// Timer prescaler, TMR_CONFIG[15:12].
    pub enum TmrPrescaler: u8 {
        Div1 = 0x0 => "PS_1",
        Div3 = 0x1 => "PS_3",
        Div2 = 0x2 => "PS_2",
        Div6 = 0x3 => "PS_6",
        Div4 = 0x4 => "PS_4",
        Div12 = 0x5 => "PS_12",
        Div8 = 0x6 => "PS_8",
        Div24 = 0x7 => "PS_24",
        Div16 = 0x8 => "PS_16",
        Div48 = 0x9 => "PS_48",
        Div32 = 0xa => "PS_32",
        Div96 = 0xb => "PS_96",
        Div64 = 0xc => "PS_64",
        Div192 = 0xd => "PS_192",
        Div128 = 0xe => "PS_128",
        Div384 = 0xf => "PS_384",
    }
}

impl TmrPrescaler {
    pub const fn divider(self) -> u32 {
        let code = self as u32;
        // even codes are powers of two, odd codes add a factor of three
        let base = 1 << (code >> 1);
        if code & 1 == 0 { base } else { base * 3 }
    }
}

bitfield! {
    /// TMR_CONFIG: prescaler and terminal count. The timer ticks at 2 MHz.
    #[derive(Clone, Copy, Default, PartialEq, Eq)]
    pub struct TmrConfig(u16);
    impl Debug;
    pub u8, prescaler, set_prescaler: 15, 12;
    pub u16, count, set_count: 11, 0;
}

impl TmrConfig {
    pub const PERIOD_500NS: TmrConfig = TmrConfig(0);
    pub const PERIOD_1US: TmrConfig = TmrConfig(2 - 1);
    pub const PERIOD_10US: TmrConfig = TmrConfig(20 - 1);
    pub const PERIOD_100US: TmrConfig = TmrConfig(200 - 1);
    pub const PERIOD_1MS: TmrConfig = TmrConfig(2000 - 1);
    pub const PERIOD_2MS: TmrConfig = TmrConfig(4000 - 1);
    pub const PERIOD_5MS: TmrConfig = TmrConfig(0x1000 | 3333);
    pub const PERIOD_10MS: TmrConfig = TmrConfig(0xa000 | 625);
    pub const PERIOD_100MS: TmrConfig = TmrConfig(0xc000 | 3125);
    pub const PERIOD_500MS: TmrConfig = TmrConfig(0xf000 | 2604);

    pub fn new(prescaler: TmrPrescaler, count: u16) -> Self {
        let mut config = TmrConfig(0);
        config.set_prescaler(prescaler.into());
        config.set_count(count & 0x0fff);
        config
    }

    /// Timeout in nanoseconds.
    pub fn period_ns(self) -> u64 {
        let divider = TmrPrescaler::try_from(self.prescaler())
            .map(TmrPrescaler::divider)
            .unwrap_or(1);
        (self.count() as u64 + 1) * divider as u64 * 500
    }
}

bitfield! {
    /// PO_CONTROL: analog block power.
    #[derive(Clone, Copy, Default, PartialEq, Eq)]
    pub struct PoControl(u16);
    impl Debug;
    pub adc, set_adc: 8;
    pub dac_2, set_dac_2: 5;
    pub dac_1, set_dac_1: 4;
    pub opamp_2, set_opamp_2: 1;
    pub opamp_1, set_opamp_1: 0;
}

impl PoControl {
    pub fn all_off() -> Self {
        PoControl(0)
    }

    pub fn all_on() -> Self {
        let mut control = PoControl(0);
        control.set_adc(true);
        control.set_dac_2(true);
        control.set_dac_1(true);
        control.set_opamp_2(true);
        control.set_opamp_1(true);
        control
    }
}

bitfield! {
    /// OSC_CONTROL: oscillator trim and clock output.
    #[derive(Clone, Copy, Default, PartialEq, Eq)]
    pub struct OscControl(u16);
    impl Debug;
    u8, trim_code, set_trim_code: 12, 8;
    pub clock_out, set_clock_out: 0;
}

impl OscControl {
    /// `trim` runs from -16 to 15.
    pub fn with_trim(trim: i8) -> Result<Self> {
        let mut control = OscControl(0);
        control.set_trim(trim)?;
        Ok(control)
    }

    pub fn trim(&self) -> i8 {
        let code = self.trim_code();
        if code & 0x10 == 0 {
            code as i8
        } else {
            -((code & 0x0f) as i8) - 1
        }
    }

    pub fn set_trim(&mut self, trim: i8) -> Result<()> {
        anyhow::ensure!(
            (-16..=15).contains(&trim),
            "oscillator trim {} out of range -16..=15",
            trim
        );
        let code = if trim >= 0 {
            trim as u8
        } else {
            0x10 | (-(trim + 1)) as u8
        };
        self.set_trim_code(code);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adc_control_words() {
        assert_eq!(
            AdcControl::single_ended_conversion(SingleEndedInput::Vdd).into_raw(),
            0x0400
        );
        let mut control = AdcControl::default();
        control.set_convert_1(true);
        control.set_convert_t(true);
        assert_eq!(u16::from(control), 0x0005);
    }

    #[test]
    fn adc_config_a_packs_all_fields() {
        let config = AdcConfigA::new(
            PgaGain::Gain77,
            AdcClock::Clk500kHz,
            AdcResolution::Bits16,
            0x7,
        );
        // 0x5000 | 0x0100 | 0x0060 | 0x0007
        assert_eq!(config.into_raw(), 0x5167);
        assert_eq!(
            AdcConfigA::new(PgaGain::Gain244, AdcClock::Clk1MHz, AdcResolution::Bits9, 0)
                .into_raw(),
            0xf000
        );
        assert!(PgaGain::try_from(0x09).is_err());
    }

    #[test]
    fn adc_config_b() {
        assert_eq!(
            AdcConfigB::new(AdcBias::Bias8_8, AdcReference::FourVbg).into_raw(),
            0x0072
        );
    }

    #[test]
    fn gpio_presets_match_bits() {
        let mut high = GpioControl::default();
        high.set_enable(true);
        high.set_output(true);
        assert_eq!(high, GpioControl::output_high());

        let falling = GpioControl::falling_edge();
        assert!(falling.edge() && falling.invert() && falling.clear());
        assert!(!falling.input());
    }

    #[test]
    fn timer_prescaler_dividers() {
        let dividers: Vec<u32> = TmrPrescaler::ALL.iter().map(|p| p.divider()).collect();
        assert_eq!(
            dividers,
            [1, 3, 2, 6, 4, 12, 8, 24, 16, 48, 32, 96, 64, 192, 128, 384]
        );
    }

    #[test]
    fn timer_presets() {
        assert_eq!(TmrConfig::PERIOD_1MS.period_ns(), 1_000_000);
        assert_eq!(
            TmrConfig::new(TmrPrescaler::Div32, 625),
            TmrConfig::PERIOD_10MS
        );
        assert_eq!(TmrConfig::PERIOD_100MS.into_raw(), 0xcc35);
        // 3334 * 3 ticks
        assert_eq!(TmrConfig::PERIOD_5MS.period_ns(), 5_001_000);
    }

    #[test]
    fn power_control() {
        assert_eq!(PoControl::all_on().into_raw(), 0x0133);
        assert_eq!(PoControl::all_off().into_raw(), 0x0000);
    }

    #[test]
    fn oscillator_trim_is_sign_magnitude() {
        for (trim, raw) in [(0, 0x0000), (15, 0x0f00), (-1, 0x1000), (-16, 0x1f00)] {
            let control = OscControl::with_trim(trim).unwrap();
            assert_eq!(control.into_raw(), raw);
            assert_eq!(control.trim(), trim);
        }
        assert!(OscControl::with_trim(16).is_err());
        assert!(OscControl::with_trim(-17).is_err());

        let mut control = OscControl::with_trim(-3).unwrap();
        control.set_clock_out(true);
        assert_eq!(control.into_raw(), 0x1201);
    }

    #[test]
    fn names_parse() {
        assert_eq!(
            "ps_384".parse::<TmrPrescaler>().unwrap(),
            TmrPrescaler::Div384
        );
        assert_eq!(
            "CNVT_SE_INP".parse::<SingleEndedInput>().unwrap(),
            SingleEndedInput::Inp
        );
    }
}
