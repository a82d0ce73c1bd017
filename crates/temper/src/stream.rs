//! Data channel: bulk reads from the session's resolved endpoint.

use crate::error::{Error, Result, TransferOp};
use crate::session::Session;
use crate::usb::transport::TransportHandle;
use std::io;
use tracing::debug;

impl<H: TransportHandle> Session<H> {
    /// Read from the bulk endpoint into `buf`.
    ///
    /// This is a single bulk transfer. A short read is returned as-is.
    ///
    /// # Errors
    /// Returns [`Error::Transfer`] on timeout or I/O failure; the contents of
    /// `buf` are unspecified in that case.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let endpoint = self.bulk_endpoint.address;

        let read = self
            .handle
            .read_bulk(endpoint, buf, self.timeout)
            .map_err(|source| Error::Transfer {
                op: TransferOp::BulkRead { endpoint },
                source,
            })?;

        debug!("Bulk read {}/{} bytes from {:#04x}", read, buf.len(), endpoint);
        Ok(read)
    }
}

impl<H: TransportHandle> io::Read for Session<H> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Session::read(self, buf).map_err(into_io_error)
    }
}

fn into_io_error(err: Error) -> io::Error {
    let kind = match err.transport_error() {
        Some(rusb::Error::Timeout) => io::ErrorKind::TimedOut,
        Some(rusb::Error::Interrupted) => io::ErrorKind::Interrupted,
        Some(rusb::Error::NoDevice) => io::ErrorKind::NotConnected,
        Some(rusb::Error::Access) => io::ErrorKind::PermissionDenied,
        _ => io::ErrorKind::Other,
    };
    io::Error::new(kind, err)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bulk_error(source: rusb::Error) -> Error {
        Error::Transfer {
            op: TransferOp::BulkRead { endpoint: 0x82 },
            source,
        }
    }

    #[test]
    fn test_into_io_error_kinds() {
        assert_eq!(
            into_io_error(bulk_error(rusb::Error::Timeout)).kind(),
            io::ErrorKind::TimedOut
        );
        assert_eq!(
            into_io_error(bulk_error(rusb::Error::NoDevice)).kind(),
            io::ErrorKind::NotConnected
        );
        assert_eq!(
            into_io_error(bulk_error(rusb::Error::Pipe)).kind(),
            io::ErrorKind::Other
        );
    }

    #[test]
    fn test_into_io_error_keeps_message() {
        let err = into_io_error(bulk_error(rusb::Error::Timeout));
        assert!(err.to_string().contains("0x82"));
    }
}
