//! Chip flashing logic.
//!
//! Erasing, the program-enable sequence, byte-by-byte programming from Intel HEX
//! records and dumping a partition back out as Intel HEX.
use std::io::Write;
use std::thread::sleep;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};

use crate::constants::{BYTE_WRITE_DELAY, DUMP_RECORD_LEN, ERASE_DELAY, PROGRAM_ENABLE_SEQUENCE};
use crate::format::{self, EOF_RECORD, HexLineError, HexRecord};
use crate::protocol::{Command, Partition};
use crate::{Max1464, Transport};

impl<T: Transport> Max1464<T> {
    /// Erases both partitions.
    pub fn erase_flash_memory(&mut self) -> Result<()> {
        self.erase_flash_partition(Partition::Partition0)?;
        self.erase_flash_partition(Partition::Partition1)
    }

    /// Erases one partition and waits for the erase cycle to finish.
    ///
    /// The CPU must be halted. Partition 0 halts it itself.
    pub fn erase_flash_partition(&mut self, partition: Partition) -> Result<()> {
        match partition {
            Partition::Partition1 => self.write_cr(Command::SelectFlashPartition1)?,
            Partition::Partition0 => self.halt_cpu()?,
        }
        self.write_cr(Command::EraseFlashPartition)?;
        sleep(ERASE_DELAY);
        log::debug!("{} erased", partition);
        Ok(())
    }

    /// Prepares a programming pass: halts the CPU, runs the program-enable
    /// sequence and erases `partition`.
    ///
    /// Feed the firmware through [`Max1464::write_hex_line_to_flash_memory`]
    /// afterwards.
    pub fn begin_writing_to_flash_partition(&mut self, partition: Partition) -> Result<()> {
        self.halt_cpu()?;
        for (dhr, extension) in PROGRAM_ENABLE_SEQUENCE {
            self.write_dhr(dhr)?;
            for byte in extension {
                self.write_raw(byte, "program enable")?;
            }
        }
        self.erase_flash_partition(partition)?;
        self.eof_reached = false;
        self.target = partition;
        Ok(())
    }

    pub fn write_byte_to_flash(&mut self, addr: u16, value: u8) -> Result<()> {
        self.set_flash_address(addr)?;
        self.write_dhr_lsb(value)?;
        self.write_cr(Command::Write8DhrToFlashMemory)?;
        sleep(BYTE_WRITE_DELAY);
        Ok(())
    }

    /// Programs a single Intel HEX line.
    ///
    /// Returns `Ok(false)` when the line is rejected (no start code, bad checksum,
    /// record type other than data or end-of-file, data past the end of the
    /// partition being programmed); nothing is written in that case. Bytes
    /// written by earlier lines stay written. `Err` is reserved for transport
    /// failures.
    pub fn write_hex_line_to_flash_memory(&mut self, line: &str) -> Result<bool> {
        let record = match HexRecord::parse(line) {
            Ok(record) => record,
            Err(e) => {
                log::warn!("{}: {:?}", e, line.trim_end());
                return Ok(false);
            }
        };
        if record.is_eof() {
            self.eof_reached = true;
            return Ok(true);
        }
        self.eof_reached = false;
        if !record.is_data() {
            log::warn!(
                "{}: {:?}",
                HexLineError::RecordType(record.record_type),
                line.trim_end()
            );
            return Ok(false);
        }
        let end = record.address as usize + record.data.len();
        if end > self.target.size() as usize {
            log::warn!(
                "{} bytes at 0x{:04x} do not fit {} (0x{:x} bytes): {:?}",
                record.data.len(),
                record.address,
                self.target,
                self.target.size(),
                line.trim_end()
            );
            return Ok(false);
        }

        log::debug!(
            "writing {} bytes at 0x{:04x}",
            record.data.len(),
            record.address
        );
        for (i, &b) in record.data.iter().enumerate() {
            self.write_byte_to_flash(record.address.wrapping_add(i as u16), b)?;
        }
        Ok(true)
    }

    /// Whether the last line handed to [`Max1464::write_hex_line_to_flash_memory`]
    /// was an end-of-file record.
    pub fn has_eof_been_reached(&self) -> bool {
        self.eof_reached
    }

    /// Runs a whole programming pass over `lines` and checks it was terminated.
    pub fn flash_hex_lines<S: AsRef<str>>(
        &mut self,
        partition: Partition,
        lines: &[S],
    ) -> Result<()> {
        self.begin_writing_to_flash_partition(partition)?;

        let bar = self.progress_bar(lines.len() as u64, "Flashing");
        for (n, line) in lines.iter().enumerate() {
            let line = line.as_ref();
            if line.trim().is_empty() {
                bar.inc(1);
                continue;
            }
            if !self.write_hex_line_to_flash_memory(line)? {
                bar.abandon();
                anyhow::bail!(
                    "line {} rejected, {} left partially programmed",
                    n + 1,
                    partition
                );
            }
            bar.inc(1);
        }
        bar.finish_and_clear();

        anyhow::ensure!(
            self.has_eof_been_reached(),
            "HEX stream ended without an end-of-file record"
        );
        log::info!("{} programmed", partition);
        Ok(())
    }

    pub fn read_flash_byte(&mut self, addr: u16) -> Result<u8> {
        self.set_flash_address(addr)?;
        self.copy_flash_to_dhr()?;
        // the upper byte is padding
        Ok((self.read_word()? & 0xff) as u8)
    }

    /// Dumps `partition` to `sink` as Intel HEX, sixteen bytes per record.
    ///
    /// The CPU is halted and left halted.
    pub fn read_flash_partition<W: Write>(
        &mut self,
        partition: Partition,
        mut sink: W,
    ) -> Result<()> {
        let mut record = [0u8; DUMP_RECORD_LEN];
        let mut filled = 0;
        self.walk_partition(partition, |addr, b| {
            record[filled] = b;
            filled += 1;
            if filled == DUMP_RECORD_LEN {
                let start = addr - (DUMP_RECORD_LEN as u16 - 1);
                writeln!(sink, "{}", format::encode_data_record(start, &record))?;
                filled = 0;
            }
            Ok(())
        })?;
        writeln!(sink, "{}", EOF_RECORD)?;
        sink.flush()?;
        Ok(())
    }

    /// Reads `partition` into memory.
    pub fn read_flash_partition_to_vec(&mut self, partition: Partition) -> Result<Vec<u8>> {
        let mut image = Vec::with_capacity(partition.size() as usize);
        self.walk_partition(partition, |_, b| {
            image.push(b);
            Ok(())
        })?;
        Ok(image)
    }

    /// Compares `image` with the start of `partition`.
    pub fn verify_flash_partition(&mut self, partition: Partition, image: &[u8]) -> Result<()> {
        anyhow::ensure!(
            image.len() <= partition.size() as usize,
            "image of {} bytes does not fit {} ({} bytes)",
            image.len(),
            partition,
            partition.size()
        );
        let flash = self.read_flash_partition_to_vec(partition)?;
        let mismatches: Vec<usize> = image
            .iter()
            .zip(&flash)
            .enumerate()
            .filter(|(_, (a, b))| a != b)
            .map(|(i, _)| i)
            .collect();
        if let Some(&first) = mismatches.first() {
            anyhow::bail!(
                "verify failed: {} bytes differ, first at 0x{:04x} (expected 0x{:02x}, read 0x{:02x})",
                mismatches.len(),
                first,
                image[first],
                flash[first]
            );
        }
        log::info!("{} verified ({} bytes)", partition, image.len());
        Ok(())
    }

    fn walk_partition<F>(&mut self, partition: Partition, mut f: F) -> Result<()>
    where
        F: FnMut(u16, u8) -> Result<()>,
    {
        self.halt_cpu()?;
        if partition == Partition::Partition1 {
            self.write_cr(Command::SelectFlashPartition1)?;
        }
        let size = partition.size();
        let bar = self.progress_bar(size as u64, "Reading");
        for addr in 0..size {
            let b = self.read_flash_byte(addr)?;
            f(addr, b)?;
            bar.inc(1);
        }
        bar.finish_and_clear();
        Ok(())
    }

    fn progress_bar(&self, len: u64, action: &'static str) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len);
        if let Ok(style) =
            ProgressStyle::with_template("{msg} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
        {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.set_message(action);
        bar
    }
}
