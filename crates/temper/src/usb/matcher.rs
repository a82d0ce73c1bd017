//! Device matching
//!
//! Narrows an enumerated device list down to the device with a given
//! identity and serial number. Identity is checked on the unopened device;
//! only identity matches are opened to read their serial number, and every
//! rejected handle is closed before the scan moves on.

use crate::error::{Error, Result};
use crate::types::{DeviceIdentity, DeviceListing};
use crate::usb::transport::{Transport, TransportHandle};
use tracing::{debug, info, warn};

/// Find the device with `identity` and serial number `serial` in `devices`.
///
/// On success the opened handle is returned and ownership passes to the
/// caller. The serial comparison is exact and case-sensitive.
///
/// # Errors
/// - [`Error::Open`] if an identity-matching device cannot be opened
/// - [`Error::SerialRead`] if its serial number cannot be read
/// - [`Error::NotFound`] if the list is exhausted without a match
pub fn find_by_serial<T: Transport>(
    transport: &T,
    devices: &[T::Device],
    identity: DeviceIdentity,
    serial: &str,
) -> Result<T::Handle> {
    for device in devices {
        let summary = match transport.summary(device) {
            Ok(summary) => summary,
            Err(e) => {
                warn!("Skipping device, failed to read device descriptor: {}", e);
                continue;
            }
        };

        if summary.identity != identity {
            continue;
        }

        let handle = transport
            .open(device)
            .map_err(|source| Error::Open { identity, source })?;

        let found = match handle.read_serial() {
            Ok(found) => found,
            Err(e) => {
                handle.close();
                return Err(Error::SerialRead(e));
            }
        };

        if found == serial {
            info!(
                "Found S/N {} on bus={} addr={}",
                serial, summary.bus_number, summary.address
            );
            return Ok(handle);
        }

        debug!(
            "Rejecting {} with S/N {} on bus={} addr={}",
            identity, found, summary.bus_number, summary.address
        );
        handle.close();
    }

    Err(Error::NotFound {
        serial: serial.to_string(),
    })
}

/// List every attached device with the given identity.
///
/// Each match is opened briefly to read its serial number; devices that
/// cannot be opened are still listed, without a serial.
///
/// # Errors
/// Returns [`Error::DeviceList`] if enumeration fails.
pub fn list_matching<T: Transport>(
    transport: &T,
    identity: DeviceIdentity,
) -> Result<Vec<DeviceListing>> {
    let devices = transport.devices().map_err(Error::DeviceList)?;
    let mut listings = Vec::new();

    for device in &devices {
        let summary = match transport.summary(device) {
            Ok(summary) => summary,
            Err(e) => {
                debug!("Not listing device, failed to read device descriptor: {}", e);
                continue;
            }
        };
        if summary.identity != identity {
            continue;
        }

        let serial_number = match transport.open(device) {
            Ok(handle) => {
                let serial = handle.read_serial().ok();
                handle.close();
                serial
            }
            Err(e) => {
                debug!(
                    "Could not open bus={} addr={} to read S/N: {}",
                    summary.bus_number, summary.address, e
                );
                None
            }
        };

        listings.push(DeviceListing {
            identity,
            bus_number: summary.bus_number,
            address: summary.address,
            serial_number,
        });
    }

    debug!("Found {} device(s) matching {}", listings.len(), identity);
    Ok(listings)
}
