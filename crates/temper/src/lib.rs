//! Host-side access to TEMPer USB sensors
//!
//! This crate finds an attached TEMPer device (`0c45:7401`), optionally by
//! serial number, opens an exclusive [`Session`] on it, and exposes two
//! blocking primitives on that session: vendor control-transfer commands
//! ([`Session::send_command`], [`Session::read_command`]) and bulk reads from
//! the device's streaming endpoint ([`Session::read`]).
//!
//! The USB stack is reached through the [`Transport`] and [`TransportHandle`]
//! traits. [`RusbTransport`] implements them over libusb; the `test_utils`
//! module (behind the `test-utils` feature) provides an in-memory
//! implementation for tests.
//!
//! # Example
//!
//! ```no_run
//! use temper::{Command, RusbTransport, Session, SessionConfig};
//!
//! # fn main() -> temper::Result<()> {
//! let transport = RusbTransport::new().map_err(temper::Error::DeviceList)?;
//! let session = Session::open_first(&transport, &SessionConfig::default())?;
//!
//! session.send_command(Command(0x01), &[0x01, 0x01])?;
//! let mut reply = [0u8; 8];
//! let n = session.read(&mut reply)?;
//! println!("{:02x?}", &reply[..n]);
//!
//! session.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! Session data is not interpreted here; turning raw bytes into readings is
//! left to the caller.

pub mod command;
pub mod error;
pub mod session;
pub mod stream;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
pub mod usb;

pub use rusb;

pub use command::command_request_type;
pub use error::{DescriptorKind, Error, Result, TransferOp};
pub use session::{DEFAULT_INTERFACE, DEFAULT_TIMEOUT, Session, SessionConfig};
pub use types::{
    AltSettingLayout, Command, ConfigLayout, DeviceIdentity, DeviceListing, DeviceSummary,
    Direction, EndpointInfo, IdentityParseError, InterfaceLayout, TEMPER, TransferKind,
};
pub use usb::{
    RusbHandle, RusbTransport, Transport, TransportHandle, find_by_serial, list_matching,
};
