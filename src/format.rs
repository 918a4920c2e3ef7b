//! Firmware file formats
//!
//! The MAX1464 toolchain speaks Intel HEX: the programmer consumes it one line at a
//! time and the dump engine produces it. Raw binary images are accepted too and
//! transcoded into the same record stream.
use std::path::Path;
use std::str;

use anyhow::Result;
use thiserror::Error;

use crate::constants::{DUMP_RECORD_LEN, records};

/// Terminator record of every HEX stream.
pub const EOF_RECORD: &str = ":00000001FF";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FirmwareFormat {
    IntelHex,
    Binary,
}

/// Reasons a single HEX line is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HexLineError {
    #[error("line does not start with ':'")]
    MissingStartCode,
    #[error("invalid hex digits at column {0}")]
    InvalidDigit(usize),
    #[error("line is truncated")]
    Truncated,
    #[error("wrong checksum, sum is 0x{sum:04x}")]
    Checksum { sum: u16 },
    #[error("wrong record type 0x{0:02x}")]
    RecordType(u8),
}

/// A checksummed Intel HEX record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexRecord {
    pub address: u16,
    pub record_type: u8,
    pub data: Vec<u8>,
}

impl HexRecord {
    /// Parses and validates one line.
    ///
    /// The start code is checked first, then the checksum over every field. The
    /// record type is not restricted here; see [`HexRecord::is_eof`].
    pub fn parse(line: &str) -> Result<Self, HexLineError> {
        let line = line.trim_end();
        let body = line
            .strip_prefix(':')
            .ok_or(HexLineError::MissingStartCode)?;

        let mut cursor = Cursor { body, pos: 0 };
        let byte_count = cursor.byte()?;
        let address_high = cursor.byte()?;
        let address_low = cursor.byte()?;
        let record_type = cursor.byte()?;

        // 260 fields of up to 0xff each do not fit a u16
        let mut sum =
            byte_count as u32 + address_high as u32 + address_low as u32 + record_type as u32;
        let mut data = Vec::with_capacity(byte_count as usize);
        for _ in 0..byte_count {
            let b = cursor.byte()?;
            sum += b as u32;
            data.push(b);
        }
        sum += cursor.byte()? as u32;

        if sum & 0xff != 0 {
            return Err(HexLineError::Checksum { sum: sum as u16 });
        }

        Ok(HexRecord {
            address: u16::from_be_bytes([address_high, address_low]),
            record_type,
            data,
        })
    }

    pub fn is_eof(&self) -> bool {
        self.record_type == records::END_OF_FILE
    }

    pub fn is_data(&self) -> bool {
        self.record_type == records::DATA
    }
}

struct Cursor<'a> {
    body: &'a str,
    pos: usize,
}

impl Cursor<'_> {
    fn byte(&mut self) -> Result<u8, HexLineError> {
        let digits = self
            .body
            .get(self.pos..self.pos + 2)
            .ok_or(HexLineError::Truncated)?;
        let b = u8::from_str_radix(digits, 16)
            .map_err(|_| HexLineError::InvalidDigit(self.pos + 1))?;
        self.pos += 2;
        Ok(b)
    }
}

/// Two's complement of the byte sum, the Intel HEX checksum law.
pub fn checksum(bytes: impl IntoIterator<Item = u8>) -> u8 {
    let sum = bytes.into_iter().fold(0u8, |acc, b| acc.wrapping_add(b));
    sum.wrapping_neg()
}

/// Renders one data record, uppercase and zero-padded.
pub fn encode_data_record(address: u16, data: &[u8]) -> String {
    let [address_high, address_low] = address.to_be_bytes();
    let mut bytes = Vec::with_capacity(5 + data.len());
    bytes.extend_from_slice(&[data.len() as u8, address_high, address_low, records::DATA]);
    bytes.extend_from_slice(data);
    bytes.push(checksum(bytes.iter().copied()));
    format!(":{}", hex::encode_upper(bytes))
}

/// Transcodes a raw image based at address 0 into HEX lines, terminator included.
pub fn binary_to_ihex(image: &[u8]) -> Vec<String> {
    let mut lines: Vec<String> = image
        .chunks(DUMP_RECORD_LEN)
        .enumerate()
        .map(|(i, chunk)| encode_data_record((i * DUMP_RECORD_LEN) as u16, chunk))
        .collect();
    lines.push(EOF_RECORD.to_string());
    lines
}

pub fn read_firmware_from_file<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    let p = path.as_ref();
    let raw = std::fs::read(p)?;

    let format = guess_format(p, &raw);
    log::info!("Read {} as {:?} format", p.display(), format);
    match format {
        FirmwareFormat::IntelHex => Ok(read_ihex(str::from_utf8(&raw)?)?),
        FirmwareFormat::Binary => Ok(raw),
    }
}

/// Returns the file as a stream of HEX lines, transcoding binaries.
pub fn read_firmware_lines<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let p = path.as_ref();
    let raw = std::fs::read(p)?;

    match guess_format(p, &raw) {
        FirmwareFormat::IntelHex => Ok(str::from_utf8(&raw)?
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()),
        FirmwareFormat::Binary => Ok(binary_to_ihex(&raw)),
    }
}

pub fn guess_format(path: &Path, raw: &[u8]) -> FirmwareFormat {
    let ext = path
        .extension()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default()
        .to_lowercase();
    if ["ihex", "ihe", "hex", "a43", "a90"].contains(&&*ext) {
        return FirmwareFormat::IntelHex;
    }

    if raw.first() == Some(&b':')
        && raw
            .iter()
            .all(|&c| c.is_ascii_hexdigit() || c == b':' || c == b'\n' || c == b'\r')
    {
        FirmwareFormat::IntelHex
    } else {
        FirmwareFormat::Binary
    }
}

pub fn read_ihex(data: &str) -> Result<Vec<u8>> {
    use ihex::Record;

    let mut image: Vec<u8> = vec![];
    for record in ihex::Reader::new(data) {
        match record? {
            Record::Data { offset, value } => {
                let start = offset as usize;
                let end = start + value.len();
                if image.len() < end {
                    // erased flash reads back as 0xff
                    image.resize(end, 0xff);
                }
                image[start..end].copy_from_slice(&value);
            }
            Record::EndOfFile => break,
            other => anyhow::bail!("unsupported record for a 12-bit flash: {:?}", other),
        }
    }
    Ok(image)
}
