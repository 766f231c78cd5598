use std::io::{Read, Write};

use crate::error::Result;

/// A connected duplex byte stream implementing Read + Write.
///
/// Exactly one call owns a `BridgeStream` for its lifetime. `try_clone`
/// produces a second handle onto the same underlying connection so a
/// cancel handle (or a split reader/writer pair) can coexist with the
/// decode loop; `shutdown` forcibly closes both directions, which a
/// blocked peer read observes as EOF.
pub struct BridgeStream {
    inner: StreamInner,
}

enum StreamInner {
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
}

impl Read for BridgeStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for BridgeStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream.flush(),
        }
    }
}

impl BridgeStream {
    /// Create a BridgeStream from a Unix domain socket stream.
    #[cfg(unix)]
    pub(crate) fn from_unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: StreamInner::Unix(stream),
        }
    }

    /// Create a connected pair of streams backed by a socketpair.
    ///
    /// No listener or filesystem path involved; intended for in-process
    /// wiring and tests.
    #[cfg(unix)]
    pub fn pair() -> Result<(Self, Self)> {
        let (left, right) = std::os::unix::net::UnixStream::pair()?;
        Ok((Self::from_unix(left), Self::from_unix(right)))
    }

    /// Set read timeout on the underlying stream.
    pub fn set_read_timeout(&self, timeout: Option<std::time::Duration>) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
        }
    }

    /// Set write timeout on the underlying stream.
    pub fn set_write_timeout(&self, timeout: Option<std::time::Duration>) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
        }
    }

    /// Try to clone this stream (creates a new file descriptor onto the
    /// same connection).
    pub fn try_clone(&self) -> Result<Self> {
        match &self.inner {
            #[cfg(unix)]
            StreamInner::Unix(stream) => {
                let cloned = stream.try_clone()?;
                Ok(Self::from_unix(cloned))
            }
        }
    }

    /// Forcibly close both directions of the connection.
    ///
    /// Pending and subsequent reads on either side observe EOF; writes
    /// fail. This is the cancellation and fault-injection primitive:
    /// a stream shut down mid-call never carries a trailer frame.
    pub fn shutdown(&self) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream
                .shutdown(std::net::Shutdown::Both)
                .or_else(ignore_not_connected)
                .map_err(Into::into),
        }
    }
}

/// A second shutdown on an already-closed socket reports NotConnected;
/// treat it as done.
fn ignore_not_connected(err: std::io::Error) -> std::io::Result<()> {
    if err.kind() == std::io::ErrorKind::NotConnected {
        Ok(())
    } else {
        Err(err)
    }
}

impl std::fmt::Debug for BridgeStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            #[cfg(unix)]
            StreamInner::Unix(_) => f
                .debug_struct("BridgeStream")
                .field("type", &"unix")
                .finish(),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    #[test]
    fn pair_carries_bytes_both_ways() {
        let (mut left, mut right) = BridgeStream::pair().unwrap();

        left.write_all(b"ping").unwrap();
        let mut buf = [0u8; 4];
        right.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");

        right.write_all(b"pong").unwrap();
        left.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"pong");
    }

    #[test]
    fn shutdown_is_observed_as_eof() {
        let (left, mut right) = BridgeStream::pair().unwrap();

        left.shutdown().unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(right.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn shutdown_via_clone_unblocks_reader() {
        let (left, mut right) = BridgeStream::pair().unwrap();
        let handle = left.try_clone().unwrap();

        let reader = std::thread::spawn(move || {
            let mut buf = [0u8; 1];
            right.read(&mut buf).unwrap()
        });

        // Give the reader a moment to block.
        std::thread::sleep(std::time::Duration::from_millis(20));
        handle.shutdown().unwrap();

        assert_eq!(reader.join().unwrap(), 0);
    }

    #[test]
    fn double_shutdown_is_ok() {
        let (left, _right) = BridgeStream::pair().unwrap();
        left.shutdown().unwrap();
        left.shutdown().unwrap();
    }
}
