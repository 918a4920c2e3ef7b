//! In-memory transport for dry runs.
use std::collections::VecDeque;

use anyhow::Result;

use super::Transport;
use crate::protocol::InterfaceMode;

/// Records every byte shifted out and answers reads from a queue.
///
/// Reads past the end of the queue return `idle_word`.
#[derive(Debug, Default)]
pub struct TraceTransport {
    sent: Vec<u8>,
    replies: VecDeque<u16>,
    reads: usize,
    mode: Option<InterfaceMode>,
    idle_word: u16,
}

impl TraceTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer reads that find the queue empty with `word`.
    pub fn with_idle_word(mut self, word: u16) -> Self {
        self.idle_word = word;
        self
    }

    pub fn queue_reply(&mut self, word: u16) {
        self.replies.push_back(word);
    }

    pub fn queue_replies(&mut self, words: impl IntoIterator<Item = u16>) {
        self.replies.extend(words);
    }

    /// Everything shifted out so far.
    pub fn sent(&self) -> &[u8] {
        &self.sent
    }

    pub fn take_sent(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.sent)
    }

    /// Number of words shifted in so far.
    pub fn reads(&self) -> usize {
        self.reads
    }

    /// Last mode announced by the driver.
    pub fn interface_mode(&self) -> Option<InterfaceMode> {
        self.mode
    }
}

impl Transport for TraceTransport {
    fn shift_out(&mut self, byte: u8) -> Result<()> {
        self.sent.push(byte);
        Ok(())
    }

    fn shift_in(&mut self) -> Result<u16> {
        self.reads += 1;
        Ok(self.replies.pop_front().unwrap_or(self.idle_word))
    }

    fn set_interface_mode(&mut self, mode: InterfaceMode) -> Result<()> {
        self.mode = Some(mode);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_queued_words_then_idles() {
        let mut t = TraceTransport::new().with_idle_word(0x00ff);
        t.queue_replies([0x1234, 0xabcd]);
        assert_eq!(t.recv().unwrap(), 0x1234);
        assert_eq!(t.recv().unwrap(), 0xabcd);
        assert_eq!(t.recv().unwrap(), 0x00ff);
        assert_eq!(t.reads(), 3);
    }

    #[test]
    fn records_bytes() {
        let mut t = TraceTransport::new();
        t.send(0x78, "CR_HALT_CPU").unwrap();
        t.send(0x08, "").unwrap();
        assert_eq!(t.sent(), &[0x78, 0x08]);
        assert_eq!(t.take_sent(), vec![0x78, 0x08]);
        assert!(t.sent().is_empty());
    }
}
