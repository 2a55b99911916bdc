//! Byte transport to the connected client

use parking_lot::Mutex;
use std::io::{self, Write};
use std::net::TcpStream;
use std::sync::Arc;

/// Transport trait for client communication
pub trait Transport: Send {
    /// Write data from buffer, returns number of bytes written
    ///
    /// A count smaller than `data.len()` means the transport could not take
    /// the whole message.
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Switch between blocking and non-blocking writes
    fn set_blocking(&mut self, _blocking: bool) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for TcpStream {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut written = 0;
        while written < data.len() {
            match Write::write(self, &data[written..]) {
                Ok(0) => break,
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }
        Ok(written)
    }

    fn set_blocking(&mut self, blocking: bool) -> io::Result<()> {
        self.set_nonblocking(!blocking)
    }
}

/// Mock transport for unit testing
///
/// Clones share the same record, so a test can keep one handle while the
/// session owns another.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Default)]
struct MockTransportInner {
    packets: Vec<Vec<u8>>,
    write_limit: Option<usize>,
    blocking_changes: Vec<bool>,
}

impl MockTransport {
    /// Create a new mock transport
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept at most `limit` bytes per write (simulates a saturated socket)
    pub fn limit_writes(&self, limit: Option<usize>) {
        self.inner.lock().write_limit = limit;
    }

    /// Every accepted write, one entry per call
    pub fn packets(&self) -> Vec<Vec<u8>> {
        self.inner.lock().packets.clone()
    }

    /// All written bytes, concatenated
    pub fn written(&self) -> Vec<u8> {
        self.inner.lock().packets.concat()
    }

    /// Blocking-mode switches in the order they were requested
    pub fn blocking_changes(&self) -> Vec<bool> {
        self.inner.lock().blocking_changes.clone()
    }

    /// Clear written data
    pub fn clear(&self) {
        self.inner.lock().packets.clear();
    }
}

impl Transport for MockTransport {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut inner = self.inner.lock();
        let accepted = match inner.write_limit {
            Some(limit) => data.len().min(limit),
            None => data.len(),
        };
        if accepted > 0 {
            inner.packets.push(data[..accepted].to_vec());
        }
        Ok(accepted)
    }

    fn set_blocking(&mut self, blocking: bool) -> io::Result<()> {
        self.inner.lock().blocking_changes.push(blocking);
        Ok(())
    }
}
