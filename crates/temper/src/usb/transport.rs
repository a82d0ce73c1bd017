//! USB transport capability
//!
//! The session layer never talks to libusb directly. It goes through these
//! two traits, which expose exactly the operations it needs: enumerate,
//! open, open by identity, descriptor access, claim/release, control and
//! bulk transfers, and close. [`RusbTransport`](super::RusbTransport) is the
//! production implementation; tests use `MockTransport` from the
//! `test_utils` module.
//!
//! All methods are blocking and report failures as [`rusb::Error`].

use crate::types::{ConfigLayout, DeviceIdentity, DeviceSummary};
use std::time::Duration;

/// Device enumeration and opening
pub trait Transport {
    /// An attached, unopened device
    type Device;
    /// An opened device
    type Handle: TransportHandle;

    /// List all currently attached devices, in transport order.
    fn devices(&self) -> Result<Vec<Self::Device>, rusb::Error>;

    /// Read the device descriptor of an unopened device.
    ///
    /// This must not open the device.
    fn summary(&self, device: &Self::Device) -> Result<DeviceSummary, rusb::Error>;

    /// Open a device returned by [`devices`](Self::devices).
    fn open(&self, device: &Self::Device) -> Result<Self::Handle, rusb::Error>;

    /// Open the first attached device with the given identity.
    fn open_first(&self, identity: DeviceIdentity) -> Result<Self::Handle, rusb::Error>;
}

/// Operations on an opened device
pub trait TransportHandle {
    /// Read the serial number string descriptor as ASCII.
    fn read_serial(&self) -> Result<String, rusb::Error>;

    fn device_summary(&self) -> Result<DeviceSummary, rusb::Error>;

    /// Read the layout of the active configuration.
    fn active_config(&self) -> Result<ConfigLayout, rusb::Error>;

    fn claim_interface(&mut self, interface: u8) -> Result<(), rusb::Error>;

    fn release_interface(&mut self, interface: u8) -> Result<(), rusb::Error>;

    /// Host-to-device control transfer. Returns the number of bytes written.
    fn write_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &[u8],
        timeout: Duration,
    ) -> Result<usize, rusb::Error>;

    /// Device-to-host control transfer. Returns the number of bytes read.
    fn read_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, rusb::Error>;

    /// Bulk IN transfer. May return fewer bytes than `buf.len()`.
    fn read_bulk(
        &self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, rusb::Error>;

    /// Close the handle. Closing cannot fail.
    fn close(self)
    where
        Self: Sized;
}
