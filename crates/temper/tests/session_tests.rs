//! Integration tests for session discovery, lifecycle, and transfers
//!
//! Runs the session layer against the in-memory transport:
//! - Serial matching and handle cleanup during the scan
//! - Open-first discovery
//! - Finalize unwinding
//! - Close ordering
//! - Command and bulk transfer framing
//!
//! Run with: `cargo test -p temper --test session_tests`

use std::io::Read;
use std::time::Duration;
use temper::rusb;
use temper::test_utils::{Call, MOCK_ENDPOINT, MockDevice, MockHandle, MockTransport};
use temper::{Command, DeviceIdentity, Error, Session, SessionConfig, TEMPER, TransferOp};

const OTHER: DeviceIdentity = DeviceIdentity::new(0x046d, 0xc52b);

fn config() -> SessionConfig {
    SessionConfig::default()
}

fn open_session(device: MockDevice) -> (MockTransport, Session<MockHandle>) {
    let transport = MockTransport::new(vec![device]);
    let session = Session::open_first(&transport, &config()).unwrap();
    (transport, session)
}

// ============================================================================
// Open by serial
// ============================================================================

mod open_by_serial {
    use super::*;

    #[test]
    fn test_no_identity_match_opens_nothing() {
        let transport = MockTransport::new(vec![
            MockDevice::new(1, OTHER, "ABC123"),
            MockDevice::new(2, OTHER, "XYZ"),
        ]);

        let err = Session::open_by_serial(&transport, &config(), "ABC123")
            .err()
            .unwrap();

        assert!(matches!(err, Error::NotFound { ref serial } if serial == "ABC123"));
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn test_empty_device_list_is_not_found() {
        let transport = MockTransport::new(vec![]);

        let err = Session::open_by_serial(&transport, &config(), "ABC123")
            .err()
            .unwrap();

        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn test_serial_mismatch_closes_handle_once() {
        let transport = MockTransport::new(vec![MockDevice::temper(1, "ZZZ999")]);

        let err = Session::open_by_serial(&transport, &config(), "ABC123")
            .err()
            .unwrap();

        assert!(matches!(err, Error::NotFound { .. }));
        assert_eq!(transport.open_count(1), 1);
        assert_eq!(transport.close_count(1), 1);
        assert_eq!(
            transport.calls(),
            vec![Call::Open(1), Call::ReadSerial(1), Call::Close(1)]
        );
    }

    #[test]
    fn test_every_rejected_candidate_is_closed() {
        let transport = MockTransport::new(vec![
            MockDevice::temper(1, "AAA"),
            MockDevice::temper(2, "BBB"),
            MockDevice::temper(3, "CCC"),
        ]);

        let err = Session::open_by_serial(&transport, &config(), "DDD")
            .err()
            .unwrap();

        assert!(matches!(err, Error::NotFound { .. }));
        for id in 1..=3 {
            assert_eq!(transport.open_count(id), 1);
            assert_eq!(transport.close_count(id), 1);
        }
        // each candidate is closed before the next is opened
        let order: Vec<Call> = transport
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Open(_) | Call::Close(_)))
            .collect();
        assert_eq!(
            order,
            vec![
                Call::Open(1),
                Call::Close(1),
                Call::Open(2),
                Call::Close(2),
                Call::Open(3),
                Call::Close(3),
            ]
        );
    }

    #[test]
    fn test_match_returns_session_without_closing() {
        let transport = MockTransport::new(vec![MockDevice::temper(7, "ABC123")]);

        let session = Session::open_by_serial(&transport, &config(), "ABC123").unwrap();

        assert_eq!(session.serial(), Some("ABC123"));
        assert_eq!(session.interface(), 0);
        assert_eq!(session.bulk_endpoint().address, MOCK_ENDPOINT);
        assert_eq!(session.device().identity, TEMPER);
        assert_eq!(session.configuration(), 1);
        assert!(transport.calls().contains(&Call::Claim(7, 0)));
        assert_eq!(transport.close_count(7), 0);
    }

    #[test]
    fn test_identity_mismatch_is_never_opened() {
        let transport = MockTransport::new(vec![
            MockDevice::new(1, OTHER, "ABC123"),
            MockDevice::temper(2, "ABC123"),
        ]);

        let session = Session::open_by_serial(&transport, &config(), "ABC123").unwrap();

        assert_eq!(session.handle().id(), 2);
        assert!(transport.calls_for(1).is_empty());
        assert_eq!(transport.open_count(2), 1);
    }

    #[test]
    fn test_serial_match_is_case_sensitive() {
        let transport = MockTransport::new(vec![MockDevice::temper(1, "abc123")]);

        let err = Session::open_by_serial(&transport, &config(), "ABC123")
            .err()
            .unwrap();

        assert!(matches!(err, Error::NotFound { .. }));
        assert_eq!(transport.close_count(1), 1);
    }

    #[test]
    fn test_stops_at_first_match() {
        let transport = MockTransport::new(vec![
            MockDevice::temper(1, "AAA"),
            MockDevice::temper(2, "ABC123"),
            MockDevice::temper(3, "ABC123"),
        ]);

        let session = Session::open_by_serial(&transport, &config(), "ABC123").unwrap();

        assert_eq!(session.handle().id(), 2);
        assert!(transport.calls_for(3).is_empty());
        assert_eq!(transport.close_count(1), 1);
    }

    #[test]
    fn test_enumeration_failure() {
        let transport =
            MockTransport::new(vec![MockDevice::temper(1, "ABC123")]).fail_enumeration();

        let err = Session::open_by_serial(&transport, &config(), "ABC123")
            .err()
            .unwrap();

        assert!(matches!(err, Error::DeviceList(rusb::Error::NoMem)));
    }

    #[test]
    fn test_open_failure_aborts_scan_after_closing_rejects() {
        let transport = MockTransport::new(vec![
            MockDevice::temper(1, "AAA"),
            MockDevice::temper(2, "ABC123").fail_open(),
            MockDevice::temper(3, "ABC123"),
        ]);

        let err = Session::open_by_serial(&transport, &config(), "ABC123")
            .err()
            .unwrap();

        assert!(matches!(
            err,
            Error::Open {
                source: rusb::Error::Access,
                ..
            }
        ));
        assert_eq!(transport.close_count(1), 1);
        assert!(transport.calls_for(3).is_empty());
    }

    #[test]
    fn test_serial_read_failure_closes_candidate() {
        let transport = MockTransport::new(vec![MockDevice::temper(1, "ABC123").fail_serial()]);

        let err = Session::open_by_serial(&transport, &config(), "ABC123")
            .err()
            .unwrap();

        assert!(matches!(err, Error::SerialRead(_)));
        assert_eq!(transport.close_count(1), 1);
    }

    #[test]
    fn test_unreadable_descriptor_is_skipped() {
        let transport = MockTransport::new(vec![
            MockDevice::temper(1, "ABC123").unreadable(),
            MockDevice::temper(2, "ABC123"),
        ]);

        let session = Session::open_by_serial(&transport, &config(), "ABC123").unwrap();

        assert_eq!(session.handle().id(), 2);
        assert!(transport.calls_for(1).is_empty());
    }

    #[test]
    fn test_alternate_identity() {
        let transport = MockTransport::new(vec![
            MockDevice::temper(1, "ABC123"),
            MockDevice::new(2, OTHER, "ABC123"),
        ]);
        let config = SessionConfig::default().with_identity(OTHER);

        let session = Session::open_by_serial(&transport, &config, "ABC123").unwrap();

        assert_eq!(session.handle().id(), 2);
        assert_eq!(session.device().identity, OTHER);
    }
}

// ============================================================================
// Open first
// ============================================================================

mod open_first {
    use super::*;

    #[test]
    fn test_opens_first_identity_match() {
        let transport = MockTransport::new(vec![
            MockDevice::new(1, OTHER, "X"),
            MockDevice::temper(2, "AAA"),
            MockDevice::temper(3, "BBB"),
        ]);

        let session = Session::open_first(&transport, &config()).unwrap();

        assert_eq!(session.handle().id(), 2);
        assert_eq!(session.serial(), Some("AAA"));
        assert!(transport.calls_for(3).is_empty());
    }

    #[test]
    fn test_no_device_is_open_error() {
        let transport = MockTransport::new(vec![MockDevice::new(1, OTHER, "X")]);

        let err = Session::open_first(&transport, &config()).err().unwrap();

        assert!(matches!(
            err,
            Error::Open {
                identity: TEMPER,
                source: rusb::Error::NotFound,
            }
        ));
    }

    #[test]
    fn test_open_failure_is_open_error() {
        let transport = MockTransport::new(vec![MockDevice::temper(1, "AAA").fail_open()]);

        let err = Session::open_first(&transport, &config()).err().unwrap();

        assert!(matches!(err, Error::Open { .. }));
    }

    #[test]
    fn test_unreadable_serial_is_not_an_error() {
        let transport = MockTransport::new(vec![MockDevice::temper(1, "AAA").fail_serial()]);

        let session = Session::open_first(&transport, &config()).unwrap();

        assert_eq!(session.serial(), None);
    }

    #[test]
    fn test_device_descriptor_failure_unwinds() {
        let transport =
            MockTransport::new(vec![MockDevice::temper(1, "AAA").fail_device_descriptor()]);

        let err = Session::open_first(&transport, &config()).err().unwrap();

        assert!(matches!(
            err,
            Error::Descriptor {
                what: temper::DescriptorKind::Device,
                ..
            }
        ));
        let calls = transport.calls();
        assert_eq!(&calls[calls.len() - 2..], &[Call::Release(1, 0), Call::Close(1)]);
    }
}

// ============================================================================
// Close
// ============================================================================

mod close {
    use super::*;

    #[test]
    fn test_release_before_close() {
        let (transport, session) = open_session(MockDevice::temper(1, "AAA"));

        session.close().unwrap();

        let calls = transport.calls();
        assert_eq!(&calls[calls.len() - 2..], &[Call::Release(1, 0), Call::Close(1)]);
        assert_eq!(transport.close_count(1), 1);
    }

    #[test]
    fn test_release_failure_still_closes() {
        let (transport, session) = open_session(MockDevice::temper(1, "AAA").fail_release());

        let err = session.close().unwrap_err();

        assert!(matches!(
            err,
            Error::Release {
                interface: 0,
                source: rusb::Error::NoDevice,
            }
        ));
        let calls = transport.calls();
        assert_eq!(&calls[calls.len() - 2..], &[Call::Release(1, 0), Call::Close(1)]);
    }
}

// ============================================================================
// Command channel
// ============================================================================

mod commands {
    use super::*;

    fn write_calls(transport: &MockTransport) -> Vec<Call> {
        transport
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::WriteControl { .. }))
            .collect()
    }

    #[test]
    fn test_send_command_framing() {
        let (transport, session) = open_session(MockDevice::temper(1, "AAA"));

        let written = session.send_command(Command(0x09), &[0x01, 0x01]).unwrap();

        assert_eq!(written, 2);
        assert_eq!(
            write_calls(&transport),
            vec![Call::WriteControl {
                device: 1,
                request_type: 0x40,
                request: 0x09,
                value: 0,
                index: 0,
                data: vec![0x01, 0x01],
                timeout: Duration::from_secs(5),
            }]
        );
    }

    #[test]
    fn test_empty_payload_equals_single_zero_byte() {
        let (empty_transport, empty) = open_session(MockDevice::temper(1, "AAA"));
        let (zero_transport, zero) = open_session(MockDevice::temper(1, "AAA"));

        let a = empty.send_command(Command(0x01), &[]).unwrap();
        let b = zero.send_command(Command(0x01), &[0]).unwrap();

        assert_eq!(a, b);
        assert_eq!(a, 1);
        assert_eq!(write_calls(&empty_transport), write_calls(&zero_transport));
    }

    #[test]
    fn test_send_command_error_names_opcode() {
        let (_transport, session) =
            open_session(MockDevice::temper(1, "AAA").with_control_error(rusb::Error::Pipe));

        let err = session.send_command(Command(0x42), &[1]).unwrap_err();

        assert!(matches!(
            err,
            Error::Transfer {
                op: TransferOp::SendCommand(Command(0x42)),
                source: rusb::Error::Pipe,
            }
        ));
        assert!(err.to_string().contains("0x42"));
    }

    #[test]
    fn test_read_command_returns_bytes_read() {
        let (transport, session) = open_session(
            MockDevice::temper(1, "AAA").with_control_reply(&[0xde, 0xad, 0xbe, 0xef]),
        );
        let mut buf = [0u8; 4];

        let read = session.read_command(Command(0x01), &mut buf).unwrap();

        assert_eq!(read, 4);
        assert_eq!(buf, [0xde, 0xad, 0xbe, 0xef]);
        assert!(transport.calls().contains(&Call::ReadControl {
            device: 1,
            request_type: 0xc0,
            request: 0x01,
            value: 0,
            index: 0,
            len: 4,
            timeout: Duration::from_secs(5),
        }));
    }

    #[test]
    fn test_read_command_empty_buffer_reads_one_byte() {
        let (transport, session) =
            open_session(MockDevice::temper(1, "AAA").with_control_reply(&[0x7f]));

        let read = session.read_command(Command(0x02), &mut []).unwrap();

        assert_eq!(read, 1);
        assert!(
            transport
                .calls()
                .iter()
                .any(|c| matches!(c, Call::ReadControl { len: 1, .. }))
        );
    }

    #[test]
    fn test_read_command_timeout() {
        let (_transport, session) =
            open_session(MockDevice::temper(1, "AAA").with_control_error(rusb::Error::Timeout));
        let mut buf = [0u8; 8];

        let err = session.read_command(Command(0x03), &mut buf).unwrap_err();

        assert!(err.is_timeout());
        assert!(matches!(
            err,
            Error::Transfer {
                op: TransferOp::ReadCommand(Command(0x03)),
                ..
            }
        ));
    }

    #[test]
    fn test_session_timeout_is_used() {
        let transport = MockTransport::new(vec![MockDevice::temper(1, "AAA")]);
        let config = SessionConfig::default().with_timeout(Duration::from_millis(250));
        let session = Session::open_first(&transport, &config).unwrap();

        session.send_command(Command(0x01), &[]).unwrap();

        assert!(transport.calls().iter().any(|c| matches!(
            c,
            Call::WriteControl { timeout, .. } if *timeout == Duration::from_millis(250)
        )));
    }
}

// ============================================================================
// Data channel
// ============================================================================

mod bulk {
    use super::*;

    #[test]
    fn test_read_from_resolved_endpoint() {
        let (transport, session) =
            open_session(MockDevice::temper(1, "AAA").with_bulk_reply(Ok(vec![1, 2, 3, 4])));
        let mut buf = [0u8; 64];

        let read = session.read(&mut buf).unwrap();

        assert_eq!(read, 4);
        assert_eq!(&buf[..4], &[1, 2, 3, 4]);
        assert!(transport.calls().contains(&Call::ReadBulk {
            device: 1,
            endpoint: MOCK_ENDPOINT,
            len: 64,
            timeout: Duration::from_secs(5),
        }));
    }

    #[test]
    fn test_short_read_is_not_an_error() {
        let (_transport, session) =
            open_session(MockDevice::temper(1, "AAA").with_bulk_reply(Ok(vec![9])));
        let mut buf = [0u8; 8];

        assert_eq!(session.read(&mut buf).unwrap(), 1);
    }

    #[test]
    fn test_timeout_is_transfer_error() {
        let (_transport, session) = open_session(MockDevice::temper(1, "AAA"));
        let mut buf = [0u8; 64];

        let err = session.read(&mut buf).unwrap_err();

        assert!(err.is_timeout());
        assert!(matches!(
            err,
            Error::Transfer {
                op: TransferOp::BulkRead {
                    endpoint: MOCK_ENDPOINT
                },
                ..
            }
        ));
    }

    #[test]
    fn test_io_read_maps_timeout() {
        let (_transport, mut session) =
            open_session(MockDevice::temper(1, "AAA").with_bulk_reply(Ok(vec![5, 6])));
        let mut buf = [0u8; 8];

        assert_eq!(Read::read(&mut session, &mut buf).unwrap(), 2);

        let err = Read::read(&mut session, &mut buf).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);
    }
}
