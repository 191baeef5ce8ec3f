//! Streaming regex matcher
//!
//! Bytes are appended to a ring of `2 * S` bytes, where `S` is the guarantee
//! size. When the ring is full, the last `S` bytes are kept and shifted to the
//! front, so any match of at most `S` bytes is found even when split across
//! writes. After each scan everything through the end of the last match is
//! discarded, so no match is reported twice.
//!
//! Matches longer than `S`, or spanning more than one compaction without `S`
//! bytes of trailing context, are not guaranteed to be found.
//!
//! # Backpressure
//!
//! Each match is handed to the consumer as a rendezvous: [`RegexScanner::write`]
//! does not return until every match it found has been received. A slow
//! consumer therefore stalls the producer feeding the scanner. Dropping the
//! receiver detaches the consumer; later matches are discarded and writes
//! never block on it.

use super::broadcast::Sink;
use async_trait::async_trait;
use regex::bytes::Regex;
use std::collections::HashMap;
use std::io;
use tokio::sync::{mpsc, Mutex};

/// Default number of bytes a match may span and still be guaranteed
pub const DEFAULT_GUARANTEE_SIZE: usize = 1024;

/// Capture groups of one match: `""` is the whole match, plus named groups
pub type Captures = HashMap<String, String>;

/// Fixed-capacity match buffer with a write cursor
#[derive(Debug)]
struct ScanBuffer {
    buf: Vec<u8>,
    pos: usize,
}

impl ScanBuffer {
    fn new(guarantee: usize) -> Self {
        Self {
            buf: vec![0; guarantee.max(1) * 2],
            pos: 0,
        }
    }

    /// Append as much of `data` as fits, compacting first when full
    fn append(&mut self, data: &[u8]) -> usize {
        let remain = self.buf.len() - self.pos;
        if data.len() <= remain {
            self.buf[self.pos..self.pos + data.len()].copy_from_slice(data);
            self.pos += data.len();
            return data.len();
        }

        // keep the trailing half so the next scan can find matches spanning writes
        let start = self.pos.saturating_sub(self.buf.len() / 2);
        self.buf.copy_within(start..self.pos, 0);
        self.pos -= start;

        let n = (self.buf.len() - self.pos).min(data.len());
        self.buf[self.pos..self.pos + n].copy_from_slice(&data[..n]);
        self.pos += n;
        n
    }

    /// Find all non-overlapping matches, then drop everything through the last one
    fn scan(&mut self, re: &Regex) -> Vec<Captures> {
        let live = &self.buf[..self.pos];
        let mut last_end = 0;
        let mut found = Vec::new();

        for caps in re.captures_iter(live) {
            let Some(whole) = caps.get(0) else { continue };
            // an empty match carries no text and would be reported forever
            if whole.is_empty() {
                continue;
            }

            let mut captures = Captures::new();
            captures.insert(String::new(), lossy(whole.as_bytes()));
            for name in re.capture_names().flatten() {
                if let Some(group) = caps.name(name) {
                    captures.insert(name.to_string(), lossy(group.as_bytes()));
                }
            }
            last_end = last_end.max(whole.end());
            found.push(captures);
        }

        if last_end > 0 {
            self.buf.copy_within(last_end..self.pos, 0);
            self.pos -= last_end;
        }
        found
    }

    #[cfg(test)]
    fn live(&self) -> &[u8] {
        &self.buf[..self.pos]
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// A [`Sink`] that emits regex matches found in the stream written to it
pub struct RegexScanner {
    re: Regex,
    state: Mutex<ScanBuffer>,
    tx: mpsc::Sender<Captures>,
}

impl RegexScanner {
    /// Create a scanner with the default guarantee size
    pub fn new(re: Regex) -> (Self, mpsc::Receiver<Captures>) {
        Self::with_size(re, DEFAULT_GUARANTEE_SIZE)
    }

    /// Create a scanner guaranteeing matches of up to `size` bytes
    pub fn with_size(re: Regex, size: usize) -> (Self, mpsc::Receiver<Captures>) {
        // capacity 1 plus `reserve` after each send gives a rendezvous hand-off
        let (tx, rx) = mpsc::channel(1);
        let scanner = Self {
            re,
            state: Mutex::new(ScanBuffer::new(size)),
            tx,
        };
        (scanner, rx)
    }

    /// The pattern being scanned for
    pub fn pattern(&self) -> &str {
        self.re.as_str()
    }

    /// Feed bytes, blocking until each match found has been consumed
    pub async fn write(&self, mut data: &[u8]) -> usize {
        let total = data.len();
        let mut state = self.state.lock().await;

        while !data.is_empty() {
            let n = state.append(data);
            data = &data[n..];

            for captures in state.scan(&self.re) {
                if !self.deliver(captures).await {
                    // consumer detached, keep accepting bytes without emitting
                    break;
                }
            }
        }
        total
    }

    async fn deliver(&self, captures: Captures) -> bool {
        if self.tx.send(captures).await.is_err() {
            return false;
        }
        // the slot frees up only once the receiver has taken the match
        self.tx.reserve().await.is_ok()
    }
}

#[async_trait]
impl Sink for RegexScanner {
    async fn write(&self, data: &[u8]) -> io::Result<()> {
        RegexScanner::write(self, data).await;
        Ok(())
    }
}
