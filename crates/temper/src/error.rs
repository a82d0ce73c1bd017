//! Session error types

use crate::types::{Command, DeviceIdentity};
use std::fmt;
use thiserror::Error;

/// Descriptor read during session finalization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    Device,
    ActiveConfig,
    /// The first endpoint of the first interface's first alternate setting
    BulkEndpoint,
}

impl fmt::Display for DescriptorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescriptorKind::Device => f.write_str("device descriptor"),
            DescriptorKind::ActiveConfig => f.write_str("active config descriptor"),
            DescriptorKind::BulkEndpoint => f.write_str("bulk endpoint descriptor"),
        }
    }
}

/// Transfer that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOp {
    SendCommand(Command),
    ReadCommand(Command),
    BulkRead { endpoint: u8 },
}

impl fmt::Display for TransferOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferOp::SendCommand(cmd) => write!(f, "sending command '{}' to device", cmd),
            TransferOp::ReadCommand(cmd) => write!(f, "reading command '{}' from device", cmd),
            TransferOp::BulkRead { endpoint } => {
                write!(f, "bulk read from endpoint {:#04x}", endpoint)
            }
        }
    }
}

/// Errors raised while discovering, using, or closing a session
#[derive(Debug, Error)]
pub enum Error {
    /// Enumerating attached devices failed
    #[error("Error getting USB device list: {0}")]
    DeviceList(#[source] rusb::Error),

    #[error("Error opening device {identity}: {source}")]
    Open {
        identity: DeviceIdentity,
        #[source]
        source: rusb::Error,
    },

    #[error("Error reading serial number: {0}")]
    SerialRead(#[source] rusb::Error),

    /// Every identity-matching device was checked and none had this serial
    #[error("Couldn't find device with S/N {serial}")]
    NotFound { serial: String },

    #[error("Error claiming interface {interface}: {source}")]
    Claim {
        interface: u8,
        #[source]
        source: rusb::Error,
    },

    #[error("Error getting {what}: {source}")]
    Descriptor {
        what: DescriptorKind,
        #[source]
        source: rusb::Error,
    },

    #[error("Error {op}: {source}")]
    Transfer {
        op: TransferOp,
        #[source]
        source: rusb::Error,
    },

    #[error("Error releasing interface {interface}: {source}")]
    Release {
        interface: u8,
        #[source]
        source: rusb::Error,
    },
}

impl Error {
    /// Whether this error was caused by a transfer timing out
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::Transfer {
                source: rusb::Error::Timeout,
                ..
            }
        )
    }

    /// Underlying transport error, if any
    pub fn transport_error(&self) -> Option<rusb::Error> {
        match self {
            Error::DeviceList(e) | Error::SerialRead(e) => Some(*e),
            Error::Open { source, .. }
            | Error::Claim { source, .. }
            | Error::Descriptor { source, .. }
            | Error::Transfer { source, .. }
            | Error::Release { source, .. } => Some(*source),
            Error::NotFound { .. } => None,
        }
    }
}

/// Type alias for session results
pub type Result<T> = std::result::Result<T, Error>;
