//! libusb-backed transport
//!
//! Implements the transport traits on top of `rusb`, translating rusb
//! descriptor objects into the crate's own layout types.

use crate::types::{
    AltSettingLayout, ConfigLayout, DeviceIdentity, DeviceSummary, EndpointInfo, InterfaceLayout,
    TransferKind,
};
use crate::usb::transport::{Transport, TransportHandle};
use rusb::{Context, Device, DeviceHandle, UsbContext};
use std::time::Duration;
use tracing::debug;

/// Transport over a libusb context
pub struct RusbTransport<T: UsbContext = Context> {
    context: T,
}

impl RusbTransport<Context> {
    /// Create a transport with a fresh libusb context
    pub fn new() -> Result<Self, rusb::Error> {
        Ok(Self {
            context: Context::new()?,
        })
    }
}

impl<T: UsbContext> RusbTransport<T> {
    /// Wrap an existing context
    pub fn with_context(context: T) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &T {
        &self.context
    }
}

impl<T: UsbContext> Transport for RusbTransport<T> {
    type Device = Device<T>;
    type Handle = RusbHandle<T>;

    fn devices(&self) -> Result<Vec<Device<T>>, rusb::Error> {
        let list = self.context.devices()?;
        Ok(list.iter().collect())
    }

    fn summary(&self, device: &Device<T>) -> Result<DeviceSummary, rusb::Error> {
        device_summary(device)
    }

    fn open(&self, device: &Device<T>) -> Result<RusbHandle<T>, rusb::Error> {
        let handle = device.open()?;
        debug!(
            "Opened device bus={} addr={}",
            device.bus_number(),
            device.address()
        );
        Ok(RusbHandle { handle })
    }

    fn open_first(&self, identity: DeviceIdentity) -> Result<RusbHandle<T>, rusb::Error> {
        // libusb reports "no such device" and open failures the same way here
        let handle = self
            .context
            .open_device_with_vid_pid(identity.vendor_id, identity.product_id)
            .ok_or(rusb::Error::NotFound)?;
        debug!("Opened first device matching {}", identity);
        Ok(RusbHandle { handle })
    }
}

/// Opened libusb device handle
pub struct RusbHandle<T: UsbContext = Context> {
    handle: DeviceHandle<T>,
}

impl<T: UsbContext> RusbHandle<T> {
    /// Underlying rusb handle, for operations outside the session contract
    pub fn inner(&self) -> &DeviceHandle<T> {
        &self.handle
    }
}

impl<T: UsbContext> TransportHandle for RusbHandle<T> {
    fn read_serial(&self) -> Result<String, rusb::Error> {
        let descriptor = self.handle.device().device_descriptor()?;
        self.handle.read_serial_number_string_ascii(&descriptor)
    }

    fn device_summary(&self) -> Result<DeviceSummary, rusb::Error> {
        device_summary(&self.handle.device())
    }

    fn active_config(&self) -> Result<ConfigLayout, rusb::Error> {
        let config = self.handle.device().active_config_descriptor()?;

        let interfaces = config
            .interfaces()
            .map(|interface| InterfaceLayout {
                number: interface.number(),
                alt_settings: interface
                    .descriptors()
                    .map(|alt| AltSettingLayout {
                        setting: alt.setting_number(),
                        endpoints: alt
                            .endpoint_descriptors()
                            .map(|ep| {
                                EndpointInfo::new(
                                    ep.address(),
                                    map_transfer_type(ep.transfer_type()),
                                    ep.max_packet_size(),
                                )
                            })
                            .collect(),
                    })
                    .collect(),
            })
            .collect();

        Ok(ConfigLayout {
            value: config.number(),
            interfaces,
        })
    }

    fn claim_interface(&mut self, interface: u8) -> Result<(), rusb::Error> {
        self.handle.claim_interface(interface)
    }

    fn release_interface(&mut self, interface: u8) -> Result<(), rusb::Error> {
        self.handle.release_interface(interface)
    }

    fn write_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &[u8],
        timeout: Duration,
    ) -> Result<usize, rusb::Error> {
        self.handle
            .write_control(request_type, request, value, index, buf, timeout)
    }

    fn read_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, rusb::Error> {
        self.handle
            .read_control(request_type, request, value, index, buf, timeout)
    }

    fn read_bulk(
        &self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, rusb::Error> {
        self.handle.read_bulk(endpoint, buf, timeout)
    }

    fn close(self) {
        let device = self.handle.device();
        // libusb_close runs when the handle drops
        drop(self.handle);
        debug!(
            "Closed device bus={} addr={}",
            device.bus_number(),
            device.address()
        );
    }
}

fn device_summary<T: UsbContext>(device: &Device<T>) -> Result<DeviceSummary, rusb::Error> {
    let descriptor = device.device_descriptor()?;
    Ok(DeviceSummary {
        identity: DeviceIdentity::new(descriptor.vendor_id(), descriptor.product_id()),
        serial_number_index: descriptor.serial_number_string_index(),
        num_configurations: descriptor.num_configurations(),
        bus_number: device.bus_number(),
        address: device.address(),
    })
}

/// Map rusb transfer type to the crate's TransferKind
fn map_transfer_type(kind: rusb::TransferType) -> TransferKind {
    match kind {
        rusb::TransferType::Control => TransferKind::Control,
        rusb::TransferType::Isochronous => TransferKind::Isochronous,
        rusb::TransferType::Bulk => TransferKind::Bulk,
        rusb::TransferType::Interrupt => TransferKind::Interrupt,
    }
}
