//! Command channel
//!
//! Device commands travel in vendor control transfers addressed to the
//! device. The opcode goes in `bRequest`; `wValue` and `wIndex` are always
//! zero. There is no sequencing, acknowledgment, or retry at this layer.

use crate::error::{Error, Result, TransferOp};
use crate::session::Session;
use crate::types::{Command, Direction};
use crate::usb::transport::TransportHandle;
use rusb::{Recipient, RequestType};
use tracing::{debug, warn};

/// `bmRequestType` for a vendor request to the device in `direction`
pub fn command_request_type(direction: Direction) -> u8 {
    let direction = match direction {
        Direction::In => rusb::Direction::In,
        Direction::Out => rusb::Direction::Out,
    };
    rusb::request_type(direction, RequestType::Vendor, Recipient::Device)
}

impl<H: TransportHandle> Session<H> {
    /// Send `cmd` with `data` to the device.
    ///
    /// An empty `data` is sent as a single zero byte; the device's control
    /// framing requires at least one data byte. Returns the number of bytes
    /// written.
    ///
    /// # Errors
    /// Returns [`Error::Transfer`] if the control transfer fails or times out.
    pub fn send_command(&self, cmd: Command, data: &[u8]) -> Result<usize> {
        let data = if data.is_empty() { &[0u8][..] } else { data };

        debug!("Sending command {} ({} bytes)", cmd, data.len());
        self.handle
            .write_control(
                command_request_type(Direction::Out),
                cmd.0,
                0,
                0,
                data,
                self.timeout,
            )
            .map_err(|source| {
                warn!("Command {} failed: {}", cmd, source);
                Error::Transfer {
                    op: TransferOp::SendCommand(cmd),
                    source,
                }
            })
    }

    /// Issue `cmd` and read the device's reply into `data`.
    ///
    /// Follows the same framing as [`send_command`](Self::send_command): an
    /// empty `data` is replaced by a one-byte buffer whose content is
    /// discarded. Returns the number of bytes read.
    ///
    /// # Errors
    /// Returns [`Error::Transfer`] if the control transfer fails or times out.
    pub fn read_command(&self, cmd: Command, data: &mut [u8]) -> Result<usize> {
        let mut scratch = [0u8; 1];
        let data = if data.is_empty() {
            &mut scratch[..]
        } else {
            data
        };

        let read = self
            .handle
            .read_control(
                command_request_type(Direction::In),
                cmd.0,
                0,
                0,
                data,
                self.timeout,
            )
            .map_err(|source| {
                warn!("Command {} failed: {}", cmd, source);
                Error::Transfer {
                    op: TransferOp::ReadCommand(cmd),
                    source,
                }
            })?;

        debug!("Read {} bytes for command {}", read, cmd);
        Ok(read)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_type_bits() {
        // host->device | vendor | device
        assert_eq!(command_request_type(Direction::Out), 0x40);
        // device->host | vendor | device
        assert_eq!(command_request_type(Direction::In), 0xc0);
    }
}
