//! Test utilities for temper
//!
//! Provides an in-memory transport that records every call made through it,
//! so session behavior can be checked without hardware.
//!
//! # Example
//!
//! ```
//! use temper::test_utils::{Call, MockDevice, MockTransport};
//! use temper::{Session, SessionConfig};
//!
//! let transport = MockTransport::new(vec![MockDevice::temper(1, "ABC123")]);
//! let session = Session::open_by_serial(&transport, &SessionConfig::default(), "ABC123").unwrap();
//! session.close().unwrap();
//!
//! assert_eq!(transport.close_count(1), 1);
//! assert!(transport.calls().contains(&Call::Claim(1, 0)));
//! ```

use crate::types::{
    AltSettingLayout, ConfigLayout, DeviceIdentity, DeviceSummary, EndpointInfo, InterfaceLayout,
    TEMPER, TransferKind,
};
use crate::usb::transport::{Transport, TransportHandle};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

/// Endpoint reported by [`MockDevice::temper`]
pub const MOCK_ENDPOINT: u8 = 0x81;

/// A call made through the mock transport, tagged with the device id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Open(u32),
    ReadSerial(u32),
    Claim(u32, u8),
    Release(u32, u8),
    WriteControl {
        device: u32,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: Vec<u8>,
        timeout: Duration,
    },
    ReadControl {
        device: u32,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        len: usize,
        timeout: Duration,
    },
    ReadBulk {
        device: u32,
        endpoint: u8,
        len: usize,
        timeout: Duration,
    },
    Close(u32),
}

impl Call {
    /// Device this call was made on
    pub fn device(&self) -> u32 {
        match self {
            Call::Open(id) | Call::ReadSerial(id) | Call::Close(id) => *id,
            Call::Claim(id, _) | Call::Release(id, _) => *id,
            Call::WriteControl { device, .. }
            | Call::ReadControl { device, .. }
            | Call::ReadBulk { device, .. } => *device,
        }
    }
}

/// Simulated attached device
#[derive(Debug, Clone)]
pub struct MockDevice {
    pub id: u32,
    pub identity: DeviceIdentity,
    /// `None` makes serial reads fail
    pub serial: Option<String>,
    pub layout: ConfigLayout,
    /// Bytes returned by device-to-host control transfers
    pub control_reply: Vec<u8>,
    /// Results returned by successive bulk reads; an empty queue times out
    pub bulk_replies: VecDeque<Result<Vec<u8>, rusb::Error>>,
    /// Error returned by every control transfer
    pub control_error: Option<rusb::Error>,
    unreadable: bool,
    fail_open: bool,
    fail_claim: bool,
    fail_release: bool,
    fail_device_descriptor: bool,
    fail_active_config: bool,
}

impl MockDevice {
    /// Device with the given identity and serial and a single-endpoint layout
    pub fn new(id: u32, identity: DeviceIdentity, serial: &str) -> Self {
        Self {
            id,
            identity,
            serial: Some(serial.to_string()),
            layout: ConfigLayout {
                value: 1,
                interfaces: vec![InterfaceLayout {
                    number: 0,
                    alt_settings: vec![AltSettingLayout {
                        setting: 0,
                        endpoints: vec![EndpointInfo::new(
                            MOCK_ENDPOINT,
                            TransferKind::Interrupt,
                            8,
                        )],
                    }],
                }],
            },
            control_reply: Vec::new(),
            bulk_replies: VecDeque::new(),
            control_error: None,
            unreadable: false,
            fail_open: false,
            fail_claim: false,
            fail_release: false,
            fail_device_descriptor: false,
            fail_active_config: false,
        }
    }

    /// TEMPer device with the given serial
    pub fn temper(id: u32, serial: &str) -> Self {
        Self::new(id, TEMPER, serial)
    }

    /// Device whose descriptor cannot be read before opening
    pub fn unreadable(mut self) -> Self {
        self.unreadable = true;
        self
    }

    pub fn fail_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn fail_serial(mut self) -> Self {
        self.serial = None;
        self
    }

    pub fn fail_claim(mut self) -> Self {
        self.fail_claim = true;
        self
    }

    pub fn fail_release(mut self) -> Self {
        self.fail_release = true;
        self
    }

    pub fn fail_device_descriptor(mut self) -> Self {
        self.fail_device_descriptor = true;
        self
    }

    pub fn fail_active_config(mut self) -> Self {
        self.fail_active_config = true;
        self
    }

    /// Remove every endpoint from the layout
    pub fn without_endpoints(mut self) -> Self {
        for interface in &mut self.layout.interfaces {
            for alt in &mut interface.alt_settings {
                alt.endpoints.clear();
            }
        }
        self
    }

    pub fn with_control_reply(mut self, reply: &[u8]) -> Self {
        self.control_reply = reply.to_vec();
        self
    }

    pub fn with_control_error(mut self, error: rusb::Error) -> Self {
        self.control_error = Some(error);
        self
    }

    pub fn with_bulk_reply(mut self, reply: Result<Vec<u8>, rusb::Error>) -> Self {
        self.bulk_replies.push_back(reply);
        self
    }

    fn summary(&self) -> DeviceSummary {
        DeviceSummary {
            identity: self.identity,
            serial_number_index: self.serial.as_ref().map(|_| 3),
            num_configurations: 1,
            bus_number: 1,
            address: (self.id % 128) as u8,
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    devices: Vec<MockDevice>,
    calls: Vec<Call>,
    fail_enumeration: bool,
}

impl MockState {
    fn device(&self, id: u32) -> Result<&MockDevice, rusb::Error> {
        self.devices
            .iter()
            .find(|d| d.id == id)
            .ok_or(rusb::Error::NoDevice)
    }

    fn device_mut(&mut self, id: u32) -> Result<&mut MockDevice, rusb::Error> {
        self.devices
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or(rusb::Error::NoDevice)
    }
}

/// In-memory transport over a fixed list of [`MockDevice`]s
///
/// Not thread-safe; a mock transport and its handles live on one thread.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Rc<RefCell<MockState>>,
}

impl MockTransport {
    /// Create a transport that enumerates `devices` in order
    pub fn new(devices: Vec<MockDevice>) -> Self {
        Self {
            state: Rc::new(RefCell::new(MockState {
                devices,
                ..MockState::default()
            })),
        }
    }

    /// Make enumeration fail
    pub fn fail_enumeration(self) -> Self {
        self.state.borrow_mut().fail_enumeration = true;
        self
    }

    /// All recorded calls, in order
    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    /// Recorded calls made on one device
    pub fn calls_for(&self, id: u32) -> Vec<Call> {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|c| c.device() == id)
            .cloned()
            .collect()
    }

    pub fn open_count(&self, id: u32) -> usize {
        self.count(&Call::Open(id))
    }

    pub fn close_count(&self, id: u32) -> usize {
        self.count(&Call::Close(id))
    }

    fn count(&self, call: &Call) -> usize {
        self.state.borrow().calls.iter().filter(|c| *c == call).count()
    }

    fn open_id(&self, id: u32) -> Result<MockHandle, rusb::Error> {
        let mut state = self.state.borrow_mut();
        state.calls.push(Call::Open(id));
        if state.device(id)?.fail_open {
            return Err(rusb::Error::Access);
        }
        Ok(MockHandle {
            id,
            state: Rc::clone(&self.state),
        })
    }
}

impl Transport for MockTransport {
    type Device = u32;
    type Handle = MockHandle;

    fn devices(&self) -> Result<Vec<u32>, rusb::Error> {
        let state = self.state.borrow();
        if state.fail_enumeration {
            return Err(rusb::Error::NoMem);
        }
        Ok(state.devices.iter().map(|d| d.id).collect())
    }

    fn summary(&self, device: &u32) -> Result<DeviceSummary, rusb::Error> {
        let state = self.state.borrow();
        let device = state.device(*device)?;
        if device.unreadable {
            return Err(rusb::Error::Io);
        }
        Ok(device.summary())
    }

    fn open(&self, device: &u32) -> Result<MockHandle, rusb::Error> {
        self.open_id(*device)
    }

    fn open_first(&self, identity: DeviceIdentity) -> Result<MockHandle, rusb::Error> {
        let id = self
            .state
            .borrow()
            .devices
            .iter()
            .find(|d| d.identity == identity)
            .map(|d| d.id)
            .ok_or(rusb::Error::NotFound)?;
        self.open_id(id)
    }
}

/// Handle returned by [`MockTransport`]
///
/// Dropping a handle without calling `close` records nothing, so leaks show
/// up as an `Open` without a matching `Close`.
#[derive(Debug)]
pub struct MockHandle {
    id: u32,
    state: Rc<RefCell<MockState>>,
}

impl MockHandle {
    pub fn id(&self) -> u32 {
        self.id
    }

    fn record(&self, call: Call) {
        self.state.borrow_mut().calls.push(call);
    }
}

impl TransportHandle for MockHandle {
    fn read_serial(&self) -> Result<String, rusb::Error> {
        self.record(Call::ReadSerial(self.id));
        let state = self.state.borrow();
        state.device(self.id)?.serial.clone().ok_or(rusb::Error::Pipe)
    }

    fn device_summary(&self) -> Result<DeviceSummary, rusb::Error> {
        let state = self.state.borrow();
        let device = state.device(self.id)?;
        if device.fail_device_descriptor {
            return Err(rusb::Error::Io);
        }
        Ok(device.summary())
    }

    fn active_config(&self) -> Result<ConfigLayout, rusb::Error> {
        let state = self.state.borrow();
        let device = state.device(self.id)?;
        if device.fail_active_config {
            return Err(rusb::Error::NotFound);
        }
        Ok(device.layout.clone())
    }

    fn claim_interface(&mut self, interface: u8) -> Result<(), rusb::Error> {
        self.record(Call::Claim(self.id, interface));
        if self.state.borrow().device(self.id)?.fail_claim {
            return Err(rusb::Error::Busy);
        }
        Ok(())
    }

    fn release_interface(&mut self, interface: u8) -> Result<(), rusb::Error> {
        self.record(Call::Release(self.id, interface));
        if self.state.borrow().device(self.id)?.fail_release {
            return Err(rusb::Error::NoDevice);
        }
        Ok(())
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
        self.record(Call::WriteControl {
            device: self.id,
            request_type,
            request,
            value,
            index,
            data: buf.to_vec(),
            timeout,
        });
        match self.state.borrow().device(self.id)?.control_error {
            Some(e) => Err(e),
            None => Ok(buf.len()),
        }
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
        self.record(Call::ReadControl {
            device: self.id,
            request_type,
            request,
            value,
            index,
            len: buf.len(),
            timeout,
        });
        let state = self.state.borrow();
        let device = state.device(self.id)?;
        if let Some(e) = device.control_error {
            return Err(e);
        }
        let n = device.control_reply.len().min(buf.len());
        buf[..n].copy_from_slice(&device.control_reply[..n]);
        Ok(n)
    }

    fn read_bulk(
        &self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, rusb::Error> {
        self.record(Call::ReadBulk {
            device: self.id,
            endpoint,
            len: buf.len(),
            timeout,
        });
        let mut state = self.state.borrow_mut();
        let reply = state
            .device_mut(self.id)?
            .bulk_replies
            .pop_front()
            .unwrap_or(Err(rusb::Error::Timeout))?;
        let n = reply.len().min(buf.len());
        buf[..n].copy_from_slice(&reply[..n]);
        Ok(n)
    }

    fn close(self) {
        self.record(Call::Close(self.id));
    }
}
