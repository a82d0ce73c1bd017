//! Device session
//!
//! A [`Session`] owns one opened device handle with interface 0 claimed and
//! the bulk endpoint resolved. It is built by one of two discovery paths,
//! [`Session::open_by_serial`] and [`Session::open_first`], and torn down by
//! [`Session::close`], which consumes it.
//!
//! Construction is all-or-nothing: if any step after opening fails, the
//! interface is released (if it was claimed) and the handle closed before
//! the error is returned.

use crate::error::{DescriptorKind, Error, Result};
use crate::types::{DeviceIdentity, DeviceSummary, EndpointInfo, TEMPER};
use crate::usb::matcher::find_by_serial;
use crate::usb::transport::{Transport, TransportHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default timeout for all transfers issued through a session (5 seconds)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Interface claimed by a session
pub const DEFAULT_INTERFACE: u8 = 0;

/// Immutable session parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Identity of the device model to open
    pub identity: DeviceIdentity,
    /// Interface to claim
    pub interface: u8,
    /// Timeout applied to every control and bulk transfer
    pub timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            identity: TEMPER,
            interface: DEFAULT_INTERFACE,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl SessionConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_identity(mut self, identity: DeviceIdentity) -> Self {
        self.identity = identity;
        self
    }
}

/// Open, interface-claimed device
///
/// Operations on a session block the calling thread and must be issued one at
/// a time.
pub struct Session<H: TransportHandle> {
    pub(crate) handle: H,
    pub(crate) timeout: Duration,
    pub(crate) interface: u8,
    pub(crate) bulk_endpoint: EndpointInfo,
    device: DeviceSummary,
    configuration: u8,
    serial: Option<String>,
}

impl<H: TransportHandle> Session<H> {
    /// Open the device with the configured identity and serial number `serial`.
    ///
    /// # Errors
    /// - [`Error::DeviceList`] if enumeration fails
    /// - [`Error::Open`], [`Error::SerialRead`], [`Error::NotFound`] from matching
    /// - [`Error::Claim`], [`Error::Descriptor`] from finalization
    pub fn open_by_serial<T>(transport: &T, config: &SessionConfig, serial: &str) -> Result<Self>
    where
        T: Transport<Handle = H>,
    {
        let devices = transport.devices().map_err(Error::DeviceList)?;
        debug!("Enumerated {} devices", devices.len());

        let handle = find_by_serial(transport, &devices, config.identity, serial)?;
        Self::finalize(handle, config, Some(serial.to_string()))
    }

    /// Open the first attached device with the configured identity.
    ///
    /// # Errors
    /// - [`Error::Open`] if no device is present or opening fails
    /// - [`Error::Claim`], [`Error::Descriptor`] from finalization
    pub fn open_first<T>(transport: &T, config: &SessionConfig) -> Result<Self>
    where
        T: Transport<Handle = H>,
    {
        let identity = config.identity;
        let handle = transport
            .open_first(identity)
            .map_err(|source| Error::Open { identity, source })?;

        // Serial is informational on this path
        let serial = match handle.read_serial() {
            Ok(serial) => Some(serial),
            Err(e) => {
                debug!("Could not read S/N of {}: {}", identity, e);
                None
            }
        };

        Self::finalize(handle, config, serial)
    }

    /// Claim the interface and resolve descriptors, unwinding on failure.
    fn finalize(mut handle: H, config: &SessionConfig, serial: Option<String>) -> Result<Self> {
        let interface = config.interface;

        if let Err(source) = handle.claim_interface(interface) {
            warn!("Failed to claim interface {}: {}", interface, source);
            handle.close();
            return Err(Error::Claim { interface, source });
        }
        debug!("Claimed interface {}", interface);

        let (device, configuration, bulk_endpoint) = match resolve_descriptors(&handle) {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!("Failed to resolve descriptors: {}", e);
                if let Err(release) = handle.release_interface(interface) {
                    warn!("Failed to release interface {}: {}", interface, release);
                }
                handle.close();
                return Err(e);
            }
        };

        info!(
            "Opened {} (S/N {}) bus={} addr={}, bulk endpoint {:#04x}",
            device.identity,
            serial.as_deref().unwrap_or("unknown"),
            device.bus_number,
            device.address,
            bulk_endpoint.address
        );

        Ok(Self {
            handle,
            timeout: config.timeout,
            interface,
            bulk_endpoint,
            device,
            configuration,
            serial,
        })
    }

    /// Release the interface, then close the handle.
    ///
    /// The handle is closed even if the release fails; the release error is
    /// what gets returned.
    ///
    /// # Errors
    /// Returns [`Error::Release`] if the interface could not be released.
    pub fn close(self) -> Result<()> {
        let Session {
            mut handle,
            interface,
            device,
            ..
        } = self;

        let released = handle.release_interface(interface);
        if let Err(e) = &released {
            warn!("Failed to release interface {}: {}", interface, e);
        }

        handle.close();
        debug!(
            "Closed session on bus={} addr={}",
            device.bus_number, device.address
        );

        released.map_err(|source| Error::Release { interface, source })
    }

    /// Timeout applied to every transfer
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Claimed interface number
    pub fn interface(&self) -> u8 {
        self.interface
    }

    /// Endpoint used by [`read`](Self::read)
    pub fn bulk_endpoint(&self) -> EndpointInfo {
        self.bulk_endpoint
    }

    pub fn device(&self) -> &DeviceSummary {
        &self.device
    }

    /// `bConfigurationValue` of the active configuration
    pub fn configuration(&self) -> u8 {
        self.configuration
    }

    /// Serial number, if known
    pub fn serial(&self) -> Option<&str> {
        self.serial.as_deref()
    }

    /// Transport handle, for operations outside the session contract
    pub fn handle(&self) -> &H {
        &self.handle
    }
}

fn resolve_descriptors<H: TransportHandle>(
    handle: &H,
) -> Result<(DeviceSummary, u8, EndpointInfo)> {
    let device = handle.device_summary().map_err(|source| Error::Descriptor {
        what: DescriptorKind::Device,
        source,
    })?;

    let layout = handle.active_config().map_err(|source| Error::Descriptor {
        what: DescriptorKind::ActiveConfig,
        source,
    })?;

    let endpoint = layout.first_endpoint().ok_or(Error::Descriptor {
        what: DescriptorKind::BulkEndpoint,
        source: rusb::Error::NotFound,
    })?;

    Ok((device, layout.value, endpoint))
}
