//! temper-probe
//!
//! Diagnostic tool for TEMPer USB sensors. Lists attached devices, opens a
//! session by serial number or on the first match, and issues raw commands
//! and bulk reads against it.

mod config;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use common::setup_logging;
use config::ProbeConfig;
use temper::{Command, RusbHandle, RusbTransport, Session, SessionConfig, list_matching};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "temper-probe")]
#[command(author, version, about = "Probe TEMPer USB sensors")]
#[command(long_about = "
Talks to TEMPer USB sensors (0c45:7401) over raw control and bulk transfers.
Output is raw bytes in hex; interpreting them is up to you.

EXAMPLES:
    # List attached devices
    temper-probe list

    # Show session details for a specific device
    temper-probe --serial ABC123 info

    # Send command 0x01 with two data bytes
    temper-probe send 0x01 0101

    # Read an 8-byte reply to command 0x02
    temper-probe query 0x02 8

    # Read 4 bulk packets of 8 bytes
    temper-probe stream 8 --count 4

CONFIGURATION:
    The probe looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/temper/probe.toml
    3. /etc/temper/probe.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH", global = true)]
    config: Option<std::path::PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,

    /// Serial number of the device to open (first match if unset)
    #[arg(short, long, value_name = "SERIAL", global = true)]
    serial: Option<String>,

    /// Transfer timeout in milliseconds
    #[arg(long, value_name = "MS", global = true)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Option<ProbeCommand>,
}

#[derive(Subcommand, Debug)]
enum ProbeCommand {
    /// List attached devices (default)
    List,
    /// Open a session and print its details
    Info,
    /// Send a command with optional hex data
    Send {
        /// Opcode, hex (0x01) or decimal
        #[arg(value_parser = parse_opcode)]
        opcode: u8,
        /// Data bytes as hex, e.g. "0101" or "01 01"
        data: Option<String>,
    },
    /// Send a command and read the reply
    Query {
        /// Opcode, hex (0x01) or decimal
        #[arg(value_parser = parse_opcode)]
        opcode: u8,
        /// Reply buffer length in bytes
        len: usize,
    },
    /// Read from the bulk endpoint
    Stream {
        /// Buffer length per read
        len: usize,
        /// Number of reads
        #[arg(short = 'n', long, default_value_t = 1)]
        count: u32,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Handle --save-config flag early (before loading config)
    if args.save_config {
        let config = ProbeConfig::default();
        let path = ProbeConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = if let Some(ref path) = args.config {
        ProbeConfig::load(Some(config::expand_path(path))).context("Failed to load configuration")?
    } else {
        ProbeConfig::load_or_default().context("Failed to load configuration")?
    };

    // Use CLI log level if specified, otherwise use config value
    let log_level = args.log_level.as_deref().unwrap_or(&config.probe.log_level);
    common::validate_log_level(log_level)?;
    setup_logging(log_level).context("Failed to setup logging")?;

    info!("temper-probe v{}", env!("CARGO_PKG_VERSION"));

    let mut session_config = config.device.session_config();
    if let Some(ms) = args.timeout_ms {
        if ms == 0 {
            return Err(anyhow!("--timeout-ms must be greater than 0"));
        }
        session_config.timeout = std::time::Duration::from_millis(ms);
    }
    let serial = args.serial.or(config.device.serial);

    let transport = RusbTransport::new().context("Failed to initialize libusb")?;

    match args.command.unwrap_or(ProbeCommand::List) {
        ProbeCommand::List => list_devices(&transport, &session_config),
        ProbeCommand::Info => with_session(&transport, &session_config, serial.as_deref(), |s| {
            print_info(s);
            Ok(())
        }),
        ProbeCommand::Send { opcode, data } => {
            let data = match data {
                Some(hex) => parse_hex(&hex)?,
                None => Vec::new(),
            };
            with_session(&transport, &session_config, serial.as_deref(), |s| {
                let written = s
                    .send_command(Command(opcode), &data)
                    .context("Failed to send command")?;
                println!("Sent {} byte(s)", written);
                Ok(())
            })
        }
        ProbeCommand::Query { opcode, len } => {
            with_session(&transport, &session_config, serial.as_deref(), |s| {
                let mut buf = vec![0u8; len];
                let read = s
                    .read_command(Command(opcode), &mut buf)
                    .context("Failed to read command reply")?;
                println!("{}", to_hex(&buf[..read.min(buf.len())]));
                Ok(())
            })
        }
        ProbeCommand::Stream { len, count } => {
            with_session(&transport, &session_config, serial.as_deref(), |s| {
                stream(s, len, count)
            })
        }
    }
}

/// List identity-matching devices and exit
fn list_devices(transport: &RusbTransport, config: &SessionConfig) -> Result<()> {
    let devices = list_matching(transport, config.identity).context("Failed to list devices")?;

    if devices.is_empty() {
        println!("No {} devices found.", config.identity);
    } else {
        println!("Found {} device(s):\n", devices.len());
        for device in devices {
            println!(
                "  {} Bus {:03} Device {:03}",
                device.identity, device.bus_number, device.address
            );
            if let Some(serial) = &device.serial_number {
                println!("      Serial: {}", serial);
            }
        }
    }

    Ok(())
}

/// Open a session, run `f`, and close the session again.
///
/// The session is closed even if `f` fails; the error from `f` wins.
fn with_session<F>(
    transport: &RusbTransport,
    config: &SessionConfig,
    serial: Option<&str>,
    f: F,
) -> Result<()>
where
    F: FnOnce(&Session<RusbHandle>) -> Result<()>,
{
    let session = match serial {
        Some(serial) => Session::open_by_serial(transport, config, serial),
        None => Session::open_first(transport, config),
    }
    .context("Failed to open device")?;

    let result = f(&session);

    if let Err(e) = session.close() {
        warn!("Error closing session: {}", e);
        if result.is_ok() {
            return Err(e).context("Failed to close device");
        }
    }

    result
}

fn print_info(session: &Session<RusbHandle>) {
    let device = session.device();
    let endpoint = session.bulk_endpoint();
    println!("Device:        {}", device.identity);
    println!("Serial:        {}", session.serial().unwrap_or("unknown"));
    println!("Location:      Bus {:03} Device {:03}", device.bus_number, device.address);
    println!("Configuration: {}", session.configuration());
    println!("Interface:     {}", session.interface());
    println!(
        "Endpoint:      {:#04x} {:?} {:?}, max packet {}",
        endpoint.address, endpoint.direction, endpoint.kind, endpoint.max_packet_size
    );
    println!("Timeout:       {} ms", session.timeout().as_millis());
}

fn stream(session: &Session<RusbHandle>, len: usize, count: u32) -> Result<()> {
    let mut buf = vec![0u8; len];
    for _ in 0..count {
        match session.read(&mut buf) {
            Ok(read) => println!("{}", to_hex(&buf[..read])),
            Err(e) if e.is_timeout() => warn!("Bulk read timed out"),
            Err(e) => return Err(e).context("Bulk read failed"),
        }
    }
    Ok(())
}

/// Parse an opcode as `0x`-prefixed hex or decimal
fn parse_opcode(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|_| format!("invalid opcode '{}', expected 0x00-0xff or 0-255", s))
}

/// Parse hex bytes, ignoring whitespace
fn parse_hex(s: &str) -> Result<Vec<u8>> {
    let digits: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(digits).with_context(|| format!("Invalid hex data '{}'", s))
}

/// Hex-encode bytes, one space-separated pair per byte
fn to_hex(bytes: &[u8]) -> String {
    bytes.chunks(1).map(hex::encode).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_are_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_opcode() {
        assert_eq!(parse_opcode("0x01"), Ok(0x01));
        assert_eq!(parse_opcode("0XfF"), Ok(0xff));
        assert_eq!(parse_opcode("42"), Ok(42));
        assert!(parse_opcode("256").is_err());
        assert!(parse_opcode("0x").is_err());
        assert!(parse_opcode("abc").is_err());
    }

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("0101").unwrap(), vec![0x01, 0x01]);
        assert_eq!(parse_hex("de ad be ef").unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
        assert!(parse_hex("").unwrap().is_empty());
        assert!(parse_hex("123").is_err());
        assert!(parse_hex("zz").is_err());
    }

    #[test]
    fn test_parse_hex_rejects_non_ascii() {
        assert!(parse_hex("a\u{e9}0").is_err());
        assert!(parse_hex("\u{e9}").is_err());
        assert!(parse_hex("01 \u{1f321}").is_err());
    }

    #[test]
    fn test_to_hex() {
        assert_eq!(to_hex(&[0x00, 0x0f, 0xff]), "00 0f ff");
        assert_eq!(to_hex(&[]), "");
    }

    #[test]
    fn test_parse_subcommands() {
        let args = Args::try_parse_from(["temper-probe", "--serial", "ABC", "query", "0x02", "8"])
            .unwrap();
        assert_eq!(args.serial.as_deref(), Some("ABC"));
        assert!(matches!(
            args.command,
            Some(ProbeCommand::Query { opcode: 2, len: 8 })
        ));

        let args = Args::try_parse_from(["temper-probe", "stream", "8", "-n", "3"]).unwrap();
        assert!(matches!(
            args.command,
            Some(ProbeCommand::Stream { len: 8, count: 3 })
        ));

        let args = Args::try_parse_from(["temper-probe"]).unwrap();
        assert!(args.command.is_none());
    }
}
