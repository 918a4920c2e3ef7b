use std::time::Duration;

/// Size of flash partition 0, in bytes.
pub const PARTITION_0_SIZE: u16 = 0x1000;
/// Size of flash partition 1, in bytes.
pub const PARTITION_1_SIZE: u16 = 0x80;

/// Only PFAR[11:0] reach the flash array.
pub const FLASH_ADDRESS_MASK: u16 = 0x0fff;

/// Bytes per record when dumping flash as Intel HEX.
pub const DUMP_RECORD_LEN: usize = 0x10;

/// The device gives no erase-complete signal.
pub const ERASE_DELAY: Duration = Duration::from_millis(5);
/// Flash write cycle time, per byte.
pub const BYTE_WRITE_DELAY: Duration = Duration::from_micros(100);

/// Program-enable sequence, datasheet page 21.
///
/// Each step loads the DHR then shifts out two raw extension bytes.
pub const PROGRAM_ENABLE_SEQUENCE: [(u16, [u8; 2]); 3] = [
    (0x0000, [0xd4, 0x08]),
    (0x0031, [0xe4, 0x08]),
    (0x8000, [0xf4, 0x08]),
];

pub mod records {
    pub const DATA: u8 = 0x00;
    pub const END_OF_FILE: u8 = 0x01;
}
