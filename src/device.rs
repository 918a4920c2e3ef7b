//! MAX1464 register protocol encoder and CPU control.
use anyhow::Result;

use crate::constants::FLASH_ADDRESS_MASK;
use crate::protocol::{
    Command, CpuPort, InterfaceMode, Irsa, ModuleControl, ModuleRegister, Partition, WireByte,
};
use crate::transport::Transport;

/// Driver for one MAX1464 on an exclusive chip-select line.
///
/// The chip never acknowledges anything, so the driver cannot check that a
/// sequence was accepted. Ordering preconditions (for example halting the CPU
/// before single-stepping it) are the caller's responsibility.
pub struct Max1464<T: Transport> {
    transport: T,
    mode: InterfaceMode,
    pub(crate) eof_reached: bool,
    /// Partition the current programming pass writes to.
    pub(crate) target: Partition,
    pub(crate) show_progress: bool,
}

impl<T: Transport> Max1464<T> {
    /// Wraps a transport. The chip powers up in 3-wire mode.
    pub fn new(transport: T) -> Self {
        Max1464 {
            transport,
            mode: InterfaceMode::ThreeWire,
            eof_reached: false,
            target: Partition::Partition0,
            show_progress: false,
        }
    }

    /// Draw progress bars on stderr during long flash operations.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn interface_mode(&self) -> InterfaceMode {
        self.mode
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    // simple CR functions

    pub fn halt_cpu(&mut self) -> Result<()> {
        self.write_cr(Command::HaltCpu)
    }

    /// Halts the CPU, zeroes its program counter and lets it run again.
    pub fn reset_cpu(&mut self) -> Result<()> {
        self.halt_cpu()?;
        self.write_cr(Command::ResetPc)?;
        self.release_cpu()
    }

    pub fn release_cpu(&mut self) -> Result<()> {
        self.write_cr(Command::StartCpu)
    }

    /// Executes one instruction. The CPU must be halted.
    pub fn single_step_cpu(&mut self) -> Result<()> {
        self.write_cr(Command::SingleStepCpu)
    }

    pub fn reset_modules(&mut self) -> Result<()> {
        self.write_cr(Command::ResetModules)
    }

    pub fn copy_flash_to_dhr(&mut self) -> Result<()> {
        self.write_cr(Command::Read8Flash)
    }

    // IRSA functions

    pub fn enable_3wire_mode(&mut self) -> Result<()> {
        self.set_interface_mode(InterfaceMode::ThreeWire)
    }

    pub fn enable_4wire_mode(&mut self) -> Result<()> {
        self.set_interface_mode(InterfaceMode::FourWire)
    }

    pub fn set_interface_mode(&mut self, mode: InterfaceMode) -> Result<()> {
        log::debug!("enable {} data transfer", mode);
        self.write_nibble(mode.into(), Irsa::Imr)?;
        self.mode = mode;
        self.transport.set_interface_mode(mode)
    }

    /// Writes PFAR[11:0]; PFAR3 is always cleared.
    pub fn set_flash_address(&mut self, addr: u16) -> Result<()> {
        let addr = addr & FLASH_ADDRESS_MASK;
        self.write_nibble(0, Irsa::Pfar3)?;
        self.write_nibble((addr >> 8) as u8, Irsa::Pfar2)?;
        self.write_nibble((addr >> 4) as u8, Irsa::Pfar1)?;
        self.write_nibble(addr as u8, Irsa::Pfar0)
    }

    /// Writes DHR[15:0], most significant nibble first.
    pub fn write_dhr(&mut self, data: u16) -> Result<()> {
        self.write_nibble((data >> 12) as u8, Irsa::Dhr3)?;
        self.write_nibble((data >> 8) as u8, Irsa::Dhr2)?;
        self.write_nibble((data >> 4) as u8, Irsa::Dhr1)?;
        self.write_nibble(data as u8, Irsa::Dhr0)
    }

    /// Writes DHR[7:0].
    pub fn write_dhr_lsb(&mut self, data: u8) -> Result<()> {
        self.write_nibble(data >> 4, Irsa::Dhr1)?;
        self.write_nibble(data, Irsa::Dhr0)
    }

    pub fn write_cr(&mut self, cmd: Command) -> Result<()> {
        let byte = WireByte::new(cmd.into(), Irsa::Cr);
        self.transport.send(byte.into_raw(), cmd.name())
    }

    /// Sends `(nibble << 4) | irsa`. Only the low 4 bits of `nibble` are used.
    pub fn write_nibble(&mut self, nibble: u8, irsa: Irsa) -> Result<()> {
        let byte = WireByte::new(nibble, irsa);
        self.transport.send(byte.into_raw(), irsa.name())
    }

    /// Shifts out a byte that is not a nibble transaction.
    pub(crate) fn write_raw(&mut self, byte: u8, label: &str) -> Result<()> {
        self.transport.send(byte, label)
    }

    /// Receives one word, re-arming 3-wire output first when needed.
    pub(crate) fn read_word(&mut self) -> Result<u16> {
        if self.mode == InterfaceMode::ThreeWire {
            self.write_nibble(InterfaceMode::ThreeWire.into(), Irsa::Imr)?;
        }
        self.transport.recv()
    }

    // CPU ports

    pub fn read_cpu_port(&mut self, port: CpuPort) -> Result<u16> {
        self.write_nibble(port.into(), Irsa::Pfar0)?;
        self.write_cr(Command::Read16CpuPort)?;
        self.read_word()
    }

    pub fn write_cpu_port(&mut self, word: u16, port: CpuPort) -> Result<()> {
        self.write_dhr(word)?;
        self.write_nibble(port.into(), Irsa::Pfar0)?;
        self.write_cr(Command::Write16DhrToCpuPort)
    }

    // module registers

    pub fn write_module_register(&mut self, data: u16, reg: ModuleRegister) -> Result<()> {
        log::debug!("write {} = 0x{:04x}", reg, data);
        self.write_cpu_port(data, CpuPort::ModuleData)?;
        self.write_cpu_port(reg.into(), CpuPort::ModuleAddress)?;
        self.write_cpu_port(ModuleControl::write().into_raw(), CpuPort::ModuleControl)
    }

    pub fn read_module_register(&mut self, reg: ModuleRegister) -> Result<u16> {
        self.write_cpu_port(reg.into(), CpuPort::ModuleAddress)?;
        self.write_cpu_port(ModuleControl::read_back().into_raw(), CpuPort::ModuleControl)?;
        let data = self.read_cpu_port(CpuPort::ModuleData)?;
        log::debug!("read {} = 0x{:04x}", reg, data);
        Ok(data)
    }

    // CPU registers

    pub fn read_cpu_accumulator_register(&mut self) -> Result<u16> {
        self.write_cr(Command::Read16CpuAcc)?;
        self.read_word()
    }

    pub fn read_cpu_program_counter(&mut self) -> Result<u16> {
        self.write_cr(Command::Read16CpuPc)?;
        self.read_word()
    }

    /// The flash byte the program counter points at.
    pub fn read_flash_at_pc(&mut self) -> Result<u8> {
        self.write_cr(Command::Read8FlashPc)?;
        Ok(self.read_word()? as u8)
    }

    pub fn dump_info(&mut self) -> Result<()> {
        let pc = self.read_cpu_program_counter()?;
        let acc = self.read_cpu_accumulator_register()?;
        let opcode = self.read_flash_at_pc()?;
        log::info!("Interface: {}", self.mode);
        log::info!("PC: 0x{:04x} (flash: 0x{:02x})", pc, opcode);
        log::info!("ACC: 0x{:04x}", acc);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TraceTransport;

    fn chip() -> Max1464<TraceTransport> {
        Max1464::new(TraceTransport::new())
    }

    fn four_wire_chip() -> Max1464<TraceTransport> {
        let mut chip = chip();
        chip.enable_4wire_mode().unwrap();
        chip.transport_mut().take_sent();
        chip
    }

    #[test]
    fn nibble_writes_are_single_bytes() {
        let mut chip = chip();
        for v in 0..16u8 {
            for &irsa in Irsa::ALL {
                chip.write_nibble(v, irsa).unwrap();
                assert_eq!(
                    chip.transport_mut().take_sent(),
                    vec![(v << 4) | u8::from(irsa)]
                );
            }
        }
    }

    #[test]
    fn dhr_is_written_msn_first() {
        let mut chip = chip();
        for data in [0x0000u16, 0x1234, 0xabcd, 0xffff, 0x8001] {
            chip.write_dhr(data).unwrap();
            let expected = vec![
                (((data >> 12) & 0xf) as u8) << 4 | 0x3,
                (((data >> 8) & 0xf) as u8) << 4 | 0x2,
                (((data >> 4) & 0xf) as u8) << 4 | 0x1,
                ((data & 0xf) as u8) << 4,
            ];
            assert_eq!(chip.transport_mut().take_sent(), expected);
        }
    }

    #[test]
    fn dhr_lsb_is_two_nibbles() {
        let mut chip = chip();
        chip.write_dhr_lsb(0xa5).unwrap();
        assert_eq!(chip.transport().sent(), &[0xa1, 0x50]);
    }

    #[test]
    fn flash_address_keeps_twelve_bits() {
        let mut chip = chip();
        chip.set_flash_address(0xfabc).unwrap();
        assert_eq!(chip.transport().sent(), &[0x07, 0xa6, 0xb5, 0xc4]);
    }

    #[test]
    fn reset_sequence() {
        let mut chip = chip();
        chip.reset_cpu().unwrap();
        assert_eq!(chip.transport().sent(), &[0x78, 0xa8, 0x88]);
    }

    #[test]
    fn single_step_and_release() {
        let mut chip = chip();
        chip.halt_cpu().unwrap();
        chip.single_step_cpu().unwrap();
        chip.release_cpu().unwrap();
        assert_eq!(chip.transport().sent(), &[0x78, 0x98, 0x88]);
    }

    #[test]
    fn mode_switch_updates_flag_and_transport() {
        let mut chip = chip();
        assert_eq!(chip.interface_mode(), InterfaceMode::ThreeWire);
        chip.enable_4wire_mode().unwrap();
        assert_eq!(chip.interface_mode(), InterfaceMode::FourWire);
        assert_eq!(chip.transport().interface_mode(), Some(InterfaceMode::FourWire));
        chip.enable_3wire_mode().unwrap();
        assert_eq!(chip.transport().sent(), &[0x09, 0x19]);
        assert_eq!(chip.transport().interface_mode(), Some(InterfaceMode::ThreeWire));
    }

    #[test]
    fn three_wire_reads_rearm_the_interface() {
        let mut chip = chip();
        chip.transport_mut().queue_reply(0x0123);
        assert_eq!(chip.read_cpu_program_counter().unwrap(), 0x0123);
        assert_eq!(chip.transport().sent(), &[0x68, 0x19]);
    }

    #[test]
    fn four_wire_reads_go_straight_to_the_wire() {
        let mut chip = four_wire_chip();
        chip.transport_mut().queue_reply(0xbeef);
        assert_eq!(chip.read_cpu_accumulator_register().unwrap(), 0xbeef);
        assert_eq!(chip.transport().sent(), &[0x48]);
    }

    #[test]
    fn cpu_port_access() {
        let mut chip = four_wire_chip();
        chip.write_cpu_port(0x1234, CpuPort::Port5).unwrap();
        assert_eq!(
            chip.transport_mut().take_sent(),
            vec![0x13, 0x22, 0x31, 0x40, 0x54, 0x08]
        );

        chip.transport_mut().queue_reply(0x5555);
        assert_eq!(chip.read_cpu_port(CpuPort::PortA).unwrap(), 0x5555);
        assert_eq!(chip.transport().sent(), &[0xa4, 0x28]);
    }

    #[test]
    fn module_register_write_goes_through_ports() {
        let mut chip = four_wire_chip();
        chip.write_module_register(0x0031, ModuleRegister::PoControl)
            .unwrap();
        let sent = chip.transport_mut().take_sent();
        // three port writes of six bytes each
        assert_eq!(sent.len(), 18);
        assert_eq!(&sent[0..6], &[0x03, 0x02, 0x31, 0x10, 0xd4, 0x08]);
        assert_eq!(&sent[6..12], &[0x03, 0x02, 0x31, 0x10, 0xe4, 0x08]);
        assert_eq!(&sent[12..18], &[0x83, 0x02, 0x01, 0x00, 0xf4, 0x08]);
    }

    #[test]
    fn module_register_takes_bit_layouts() {
        use crate::registers::PoControl;

        let mut chip = four_wire_chip();
        chip.write_module_register(PoControl::all_on().into(), ModuleRegister::PoControl)
            .unwrap();
        let sent = chip.transport_mut().take_sent();
        // DHR = 0x0133 for the data port
        assert_eq!(&sent[0..6], &[0x03, 0x12, 0x31, 0x30, 0xd4, 0x08]);
    }

    #[test]
    fn module_register_read_sets_read_bit() {
        let mut chip = four_wire_chip();
        chip.transport_mut().queue_reply(0x0f00);
        assert_eq!(
            chip.read_module_register(ModuleRegister::OscControl).unwrap(),
            0x0f00
        );
        let sent = chip.transport().sent();
        assert_eq!(&sent[0..6], &[0x03, 0x02, 0x31, 0x20, 0xe4, 0x08]);
        assert_eq!(&sent[6..12], &[0xc3, 0x02, 0x01, 0x00, 0xf4, 0x08]);
        assert_eq!(&sent[12..], &[0xd4, 0x28]);
    }

    #[test]
    fn flash_byte_at_pc_drops_padding() {
        let mut chip = four_wire_chip();
        chip.transport_mut().queue_reply(0xff3c);
        assert_eq!(chip.read_flash_at_pc().unwrap(), 0x3c);
        assert_eq!(chip.transport().sent(), &[0x58]);
    }
}
