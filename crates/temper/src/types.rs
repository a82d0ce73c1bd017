//! Device and descriptor type definitions
//!
//! These are transport-independent copies of the few USB descriptor fields a
//! session needs. The core never holds on to `rusb` descriptor objects; the
//! transport backend translates them into these types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Vendor/product identifier pair that discriminates a device model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceIdentity {
    /// USB Vendor ID
    pub vendor_id: u16,
    /// USB Product ID
    pub product_id: u16,
}

/// TEMPer sensor (Microdia / RDing)
pub const TEMPER: DeviceIdentity = DeviceIdentity::new(0x0c45, 0x7401);

impl DeviceIdentity {
    pub const fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
        }
    }
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        TEMPER
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor_id, self.product_id)
    }
}

/// Error returned when a `VID:PID` string cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid device identity '{input}', expected VID:PID in hex (e.g. '0c45:7401')")]
pub struct IdentityParseError {
    input: String,
}

impl FromStr for DeviceIdentity {
    type Err = IdentityParseError;

    /// Parses `VID:PID`, each part 1-4 hex digits with an optional `0x` prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || IdentityParseError {
            input: s.to_string(),
        };

        let (vid, pid) = s.trim().split_once(':').ok_or_else(err)?;
        let parse = |part: &str| -> Option<u16> {
            let hex = part
                .strip_prefix("0x")
                .or_else(|| part.strip_prefix("0X"))
                .unwrap_or(part);
            if hex.is_empty() || hex.len() > 4 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                return None;
            }
            u16::from_str_radix(hex, 16).ok()
        };

        Ok(Self {
            vendor_id: parse(vid).ok_or_else(err)?,
            product_id: parse(pid).ok_or_else(err)?,
        })
    }
}

impl TryFrom<String> for DeviceIdentity {
    type Error = IdentityParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DeviceIdentity> for String {
    fn from(identity: DeviceIdentity) -> Self {
        identity.to_string()
    }
}

/// Device command opcode, carried in the `bRequest` field of a control transfer
///
/// Opcode meanings belong to the device firmware; the session layer treats
/// them as opaque bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Command(pub u8);

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

impl From<u8> for Command {
    fn from(opcode: u8) -> Self {
        Self(opcode)
    }
}

/// Fields of the device descriptor kept by a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSummary {
    pub identity: DeviceIdentity,
    /// Index of the serial number string descriptor, if the device has one
    pub serial_number_index: Option<u8>,
    pub num_configurations: u8,
    /// Bus number the device is attached to
    pub bus_number: u8,
    /// Device address on the bus
    pub address: u8,
}

/// Endpoint direction, from bit 7 of the endpoint address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Device to host
    In,
    /// Host to device
    Out,
}

/// Endpoint transfer type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Control,
    Isochronous,
    Bulk,
    Interrupt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointInfo {
    /// Endpoint address including the direction bit
    pub address: u8,
    pub direction: Direction,
    pub kind: TransferKind,
    pub max_packet_size: u16,
}

impl EndpointInfo {
    /// Build an endpoint from its address, deriving the direction.
    pub fn new(address: u8, kind: TransferKind, max_packet_size: u16) -> Self {
        let direction = if address & 0x80 != 0 {
            Direction::In
        } else {
            Direction::Out
        };
        Self {
            address,
            direction,
            kind,
            max_packet_size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AltSettingLayout {
    pub setting: u8,
    pub endpoints: Vec<EndpointInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceLayout {
    pub number: u8,
    pub alt_settings: Vec<AltSettingLayout>,
}

/// Layout of the active configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLayout {
    /// `bConfigurationValue` of the active configuration
    pub value: u8,
    pub interfaces: Vec<InterfaceLayout>,
}

impl ConfigLayout {
    /// First endpoint of the first alternate setting of the first interface.
    ///
    /// TEMPer firmware exposes its streaming endpoint at this fixed position;
    /// nothing beyond this indexing is discovered.
    pub fn first_endpoint(&self) -> Option<EndpointInfo> {
        self.interfaces
            .first()?
            .alt_settings
            .first()?
            .endpoints
            .first()
            .copied()
    }
}

/// An identity-matching device seen during enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceListing {
    pub identity: DeviceIdentity,
    pub bus_number: u8,
    pub address: u8,
    /// Serial number, if it could be read
    pub serial_number: Option<String>,
}
