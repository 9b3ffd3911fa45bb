//! Weiss Technik LabEvent climate chamber over TCP.
//!
//! ## Wire format
//!
//! ```text
//!   request:  <code> B6 1 B6 <device id> [B6 <arg>]* CR
//!   reply:    1                          command accepted
//!             -5 | -6 | -8               command rejected
//!             <device id> B6 <value>     query result
//! ```
//!
//! All fields are ASCII.  The protocol has no setpoint query, so the last
//! accepted setpoint is cached and reported back.
//!
//! Replies carry no sequence number.  After a read fails or stops short,
//! whatever arrives late is discarded before the next request is sent, so
//! a slow reply is never taken as the answer to the following command.

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::{debug, error, warn};

use crate::app::ports::ClimateChamberPort;
use crate::error::DeviceError;

/// Field delimiter.
pub const DELIM: u8 = 0xB6;
/// Default TCP port of the LabEvent controller.
pub const DEFAULT_PORT: u16 = 2049;

const CMD_SET_TEMPERATURE: &str = "11001";
const CMD_GET_TEMPERATURE: &str = "11004";
const CMD_MANUAL_MODE: &str = "14001";

const MAX_REPLY: usize = 512;
const IO_TIMEOUT: Duration = Duration::from_secs(5);

// ───────────────────────────────────────────────────────────────
// Framing
// ───────────────────────────────────────────────────────────────

/// A decoded reply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reply {
    Ack,
    Value { device_id: u32, value: f64 },
}

/// Build one request frame.
pub fn encode_command(code: &str, device_id: u8, args: &[&str]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(32);
    frame.extend_from_slice(code.as_bytes());
    frame.push(DELIM);
    frame.push(b'1');
    frame.push(DELIM);
    frame.extend_from_slice(device_id.to_string().as_bytes());
    for arg in args {
        frame.push(DELIM);
        frame.extend_from_slice(arg.as_bytes());
    }
    frame.push(b'\r');
    frame
}

/// Decode one reply.  Never panics on arbitrary input.
pub fn parse_reply(data: &[u8]) -> Result<Reply, DeviceError> {
    match data.iter().position(|&b| b == DELIM) {
        None => {
            let text = ascii_field(data)?;
            if text == "1" {
                return Ok(Reply::Ack);
            }
            match text.parse::<i32>() {
                Ok(code) => Err(DeviceError::Rejected(code)),
                Err(_) => Err(DeviceError::Malformed),
            }
        }
        Some(at) => {
            let device_id = ascii_field(&data[..at])?
                .parse::<u32>()
                .map_err(|_| DeviceError::Malformed)?;
            let value = ascii_field(&data[at + 1..])?
                .parse::<f64>()
                .map_err(|_| DeviceError::Malformed)?;
            Ok(Reply::Value { device_id, value })
        }
    }
}

fn ascii_field(bytes: &[u8]) -> Result<&str, DeviceError> {
    core::str::from_utf8(bytes)
        .map(str::trim)
        .map_err(|_| DeviceError::Malformed)
}

/// Operator-facing text for a rejection code.
pub fn describe_code(code: i32) -> &'static str {
    match code {
        1 => "Command is accepted and executed.",
        -5 => "Command number transmitted is unidentified!",
        -6 => "Too few or incorrect parameters entered!",
        -8 => "Data could not be read!",
        _ => "Unknown return code",
    }
}

// ───────────────────────────────────────────────────────────────
// Driver
// ───────────────────────────────────────────────────────────────

pub struct WeissLabEvent<T> {
    stream: T,
    device_id: u8,
    /// Last setpoint the chamber accepted.
    setpoint: Option<f64>,
    /// The last reply was not read completely.
    stale: bool,
}

impl WeissLabEvent<TcpStream> {
    /// Open a TCP connection to the chamber controller.
    pub fn connect(address: &str, port: u16, device_id: u8) -> io::Result<Self> {
        let addr = (address, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no address resolved"))?;
        let stream = TcpStream::connect_timeout(&addr, IO_TIMEOUT)?;
        stream.set_read_timeout(Some(IO_TIMEOUT))?;
        stream.set_write_timeout(Some(IO_TIMEOUT))?;
        Ok(Self::new(stream, device_id))
    }
}

impl<T: Read + Write> WeissLabEvent<T> {
    pub fn new(stream: T, device_id: u8) -> Self {
        Self {
            stream,
            device_id,
            setpoint: None,
            stale: false,
        }
    }

    pub fn into_inner(self) -> T {
        self.stream
    }

    fn transact(&mut self, code: &str, args: &[&str]) -> Result<Reply, DeviceError> {
        if self.stale {
            self.discard_late_reply();
        }
        let frame = encode_command(code, self.device_id, args);
        debug!("weiss -> {:02x?}", frame);
        self.stream.write_all(&frame)?;
        self.stream.flush()?;

        let raw = self.read_reply().inspect_err(|_| self.stale = true)?;
        debug!("weiss <- {:02x?}", raw);
        match parse_reply(&raw) {
            Err(DeviceError::Rejected(code)) => {
                error!("Received error code {}: {}", code, describe_code(code));
                Err(DeviceError::Rejected(code))
            }
            other => other,
        }
    }

    /// Read until CR/LF, EOF, a timeout after partial data, or `MAX_REPLY`.
    fn read_reply(&mut self) -> Result<Vec<u8>, DeviceError> {
        let mut buf = Vec::with_capacity(64);
        let mut chunk = [0u8; 64];
        loop {
            let n = match self.stream.read(&mut chunk) {
                Ok(n) => n,
                Err(e)
                    if !buf.is_empty()
                        && matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
                {
                    self.stale = true;
                    break;
                }
                Err(e) => return Err(e.into()),
            };
            if n == 0 {
                if buf.is_empty() {
                    return Err(DeviceError::Io(io::ErrorKind::UnexpectedEof));
                }
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if buf.iter().any(|&b| b == b'\r' || b == b'\n') || buf.len() >= MAX_REPLY {
                break;
            }
        }
        Ok(buf)
    }

    /// Read and drop input until the stream goes quiet or closes.
    fn discard_late_reply(&mut self) {
        let mut chunk = [0u8; 64];
        let mut discarded = 0;
        while discarded < 4 * MAX_REPLY {
            match self.stream.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => discarded += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(_) => break,
            }
        }
        self.stale = false;
        if discarded > 0 {
            warn!("Discarded {} bytes of a late chamber reply", discarded);
        }
    }

    fn command(&mut self, code: &str, args: &[&str]) -> Result<(), DeviceError> {
        match self.transact(code, args)? {
            Reply::Ack => Ok(()),
            Reply::Value { .. } => Err(DeviceError::Malformed),
        }
    }
}

impl<T: Read + Write> ClimateChamberPort for WeissLabEvent<T> {
    fn temperature(&mut self) -> Result<f64, DeviceError> {
        match self.transact(CMD_GET_TEMPERATURE, &[])? {
            Reply::Value { device_id, value } => {
                if device_id != u32::from(self.device_id) {
                    error!(
                        "Returning device ID {} does not match requested device ID {}",
                        device_id, self.device_id
                    );
                }
                Ok(value)
            }
            Reply::Ack => Err(DeviceError::Malformed),
        }
    }

    fn temperature_setpoint(&mut self) -> Result<f64, DeviceError> {
        self.setpoint.ok_or(DeviceError::Unsupported("get_setpoint"))
    }

    fn set_temperature(&mut self, celsius: f64) -> Result<(), DeviceError> {
        let arg = format!("{celsius:.1}");
        self.command(CMD_SET_TEMPERATURE, &[&arg])?;
        self.setpoint = Some(celsius);
        Ok(())
    }

    fn start_manual_mode(&mut self) -> Result<(), DeviceError> {
        self.command(CMD_MANUAL_MODE, &["1"])
    }

    fn stop_manual_mode(&mut self) -> Result<(), DeviceError> {
        self.command(CMD_MANUAL_MODE, &["0"])
    }

    fn set_air_dryer(&mut self, _on: bool) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported("air_dryer"))
    }
}
