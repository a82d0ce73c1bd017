//! USB subsystem
//!
//! Transport capability traits, the libusb backend, and device matching.

pub mod backend;
pub mod matcher;
pub mod transport;

pub use backend::{RusbHandle, RusbTransport};
pub use matcher::{find_by_serial, list_matching};
pub use transport::{Transport, TransportHandle};
