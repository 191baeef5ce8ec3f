//! Fan-out writer with a concurrently mutable sink set

use async_trait::async_trait;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;

/// Destination for broadcast bytes
#[async_trait]
pub trait Sink: Send + Sync {
    /// Accept one chunk of the stream
    async fn write(&self, data: &[u8]) -> io::Result<()>;
}

/// Handle returned by [`Broadcaster::add_writer`], used to deregister
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SinkId(u64);

#[derive(Default)]
struct SinkSet {
    entries: Vec<(SinkId, Arc<dyn Sink>)>,
    closed: bool,
}

/// Delivers every written chunk to all currently registered sinks
///
/// Registration and removal may happen while a write is being delivered: a
/// write goes to the snapshot of sinks taken when it started, and the lock
/// guarding the set is never held while a sink runs.
#[derive(Default)]
pub struct Broadcaster {
    sinks: Mutex<SinkSet>,
    next_id: AtomicU64,
}

impl Broadcaster {
    /// Create a broadcaster with no sinks
    pub fn new() -> Self {
        Self::default()
    }

    fn sinks(&self) -> MutexGuard<'_, SinkSet> {
        // a panicking sink never holds this lock, so the data is always consistent
        self.sinks.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a sink; it sees every byte written from now on
    ///
    /// After [`close`](Self::close) the sink is dropped immediately, so
    /// anything waiting on it observes end of stream.
    pub fn add_writer(&self, sink: Arc<dyn Sink>) -> SinkId {
        let id = SinkId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut sinks = self.sinks();
        if !sinks.closed {
            sinks.entries.push((id, sink));
        }
        id
    }

    /// Deregister a sink, returning whether it was registered
    pub fn remove_writer(&self, id: SinkId) -> bool {
        let mut sinks = self.sinks();
        let before = sinks.entries.len();
        sinks.entries.retain(|(sink_id, _)| *sink_id != id);
        sinks.entries.len() != before
    }

    /// Number of registered sinks
    pub fn len(&self) -> usize {
        self.sinks().entries.len()
    }

    /// Whether no sink is registered
    pub fn is_empty(&self) -> bool {
        self.sinks().entries.is_empty()
    }

    /// Whether the stream has ended
    pub fn is_closed(&self) -> bool {
        self.sinks().closed
    }

    /// Drop every sink and refuse new ones, once the underlying stream hit EOF
    pub fn close(&self) {
        let mut sinks = self.sinks();
        sinks.closed = true;
        sinks.entries.clear();
    }

    /// Deliver `data` to all sinks registered at call time
    ///
    /// Sink errors are logged and never abort delivery to the others.
    pub async fn write(&self, data: &[u8]) -> usize {
        let snapshot: Vec<Arc<dyn Sink>> = self
            .sinks()
            .entries
            .iter()
            .map(|(_, sink)| Arc::clone(sink))
            .collect();

        for sink in snapshot {
            if let Err(e) = sink.write(data).await {
                warn!("Broadcast sink failed: {}", e);
            }
        }
        data.len()
    }
}

/// Echoes the stream to the host's stderr
#[derive(Debug, Default)]
pub struct StderrSink;

#[async_trait]
impl Sink for StderrSink {
    async fn write(&self, data: &[u8]) -> io::Result<()> {
        let mut stderr = io::stderr().lock();
        stderr.write_all(data)?;
        stderr.flush()
    }
}

/// Collects the stream in memory
#[derive(Debug, Default)]
pub struct CaptureSink {
    buf: Mutex<Vec<u8>>,
}

impl CaptureSink {
    /// Create an empty capture
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything captured so far, lossily decoded
    pub fn contents(&self) -> String {
        let buf = self.buf.lock().unwrap_or_else(|e| e.into_inner());
        String::from_utf8_lossy(&buf).into_owned()
    }
}

#[async_trait]
impl Sink for CaptureSink {
    async fn write(&self, data: &[u8]) -> io::Result<()> {
        self.buf
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend_from_slice(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSink;

    #[async_trait]
    impl Sink for FailingSink {
        async fn write(&self, _data: &[u8]) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }
    }

    /// Removes another sink from the broadcaster while a write is in flight
    struct RemovingSink {
        broadcaster: Arc<Broadcaster>,
        victim: Mutex<Option<SinkId>>,
    }

    #[async_trait]
    impl Sink for RemovingSink {
        async fn write(&self, _data: &[u8]) -> io::Result<()> {
            if let Some(id) = self.victim.lock().unwrap().take() {
                self.broadcaster.remove_writer(id);
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn delivers_to_all_sinks_in_order() {
        let b = Broadcaster::new();
        let first = Arc::new(CaptureSink::new());
        let second = Arc::new(CaptureSink::new());
        b.add_writer(first.clone());
        b.add_writer(second.clone());

        assert_eq!(b.write(b"hello ").await, 6);
        b.write(b"world").await;

        assert_eq!(first.contents(), "hello world");
        assert_eq!(second.contents(), "hello world");
    }

    #[tokio::test]
    async fn sink_error_does_not_stop_delivery() {
        let b = Broadcaster::new();
        let capture = Arc::new(CaptureSink::new());
        b.add_writer(Arc::new(FailingSink));
        b.add_writer(capture.clone());

        assert_eq!(b.write(b"data").await, 4);
        assert_eq!(capture.contents(), "data");
    }

    #[tokio::test]
    async fn sink_sees_only_bytes_while_registered() {
        let b = Broadcaster::new();
        let capture = Arc::new(CaptureSink::new());

        b.write(b"before ").await;
        let id = b.add_writer(capture.clone());
        b.write(b"during").await;
        assert!(b.remove_writer(id));
        b.write(b" after").await;

        assert_eq!(capture.contents(), "during");
        assert!(!b.remove_writer(id));
    }

    #[tokio::test]
    async fn removal_during_delivery_keeps_snapshot() {
        let b = Arc::new(Broadcaster::new());
        let remover = Arc::new(RemovingSink {
            broadcaster: Arc::clone(&b),
            victim: Mutex::new(None),
        });
        b.add_writer(remover.clone());
        let capture = Arc::new(CaptureSink::new());
        let id = b.add_writer(capture.clone());
        *remover.victim.lock().unwrap() = Some(id);

        // removed mid-write, but still part of this write's snapshot
        b.write(b"one").await;
        b.write(b"two").await;

        assert_eq!(capture.contents(), "one");
        assert_eq!(b.len(), 1);
    }

    #[tokio::test]
    async fn close_drops_all_sinks() {
        let b = Broadcaster::new();
        b.add_writer(Arc::new(CaptureSink::new()));
        b.add_writer(Arc::new(StderrSink));
        assert_eq!(b.len(), 2);

        b.close();
        assert!(b.is_empty());
        assert!(b.is_closed());

        b.add_writer(Arc::new(CaptureSink::new()));
        assert!(b.is_empty());
    }
}
