//! # GSM Modem Session Module
//!
//! Thin, fail-fast wrapper around the serial link to the GSM modem. A
//! [`ModemSession`] performs the AT handshake on open, writes raw commands and
//! drains whatever bytes the modem has buffered. There is no framing and no
//! retry logic here: reads are a fixed-settle, non-blocking drain and callers
//! must tolerate partial or garbled responses.
//!
//! A session is not synchronised. The [`crate::gateway::CommandGateway`] owns
//! it and is the only component allowed to call it.
//!
//! ## Device abstraction
//!
//! The session talks to a [`ModemPort`]; real hardware is reached through
//! [`SerialPortOpener`] (feature `serial`), tests plug in scripted ports.
//!
//! ```rust,no_run
//! use smsgate::modem::{ModemSession, ModemTiming, SerialPortOpener};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let opener = SerialPortOpener::new("/dev/ttyUSB2", 115200);
//!     let mut session = ModemSession::connect(&opener, ModemTiming::default()).await?;
//!     let reply = session.write_raw("AT+CSQ").await?;
//!     println!("signal: {}", reply.trim());
//!     Ok(())
//! }
//! ```

pub mod at;

use crate::error::ModemError;
use crate::logutil::{escape_log, truncate_for_log};
use log::{debug, info, trace};
use std::io;
use tokio::time::{sleep, Duration};

/// Upper bound for a single drain, guards against a modem stuck streaming.
const MAX_DRAIN_BYTES: usize = 8192;

/// Fixed wall-clock delays bounding every device interaction.
#[derive(Debug, Clone)]
pub struct ModemTiming {
    /// After opening the port, before the first AT command.
    pub init_settle: Duration,
    /// Between writing a command and draining its response.
    pub command_settle: Duration,
    /// Between handshake steps and between the steps of an SMS send.
    pub step_delay: Duration,
    /// After the Ctrl-Z terminator, before reading the send response.
    pub send_settle: Duration,
}

impl Default for ModemTiming {
    fn default() -> Self {
        Self {
            init_settle: Duration::from_millis(2000),
            command_settle: Duration::from_millis(100),
            step_delay: Duration::from_millis(500),
            send_settle: Duration::from_millis(3000),
        }
    }
}

impl ModemTiming {
    /// No delays at all; for scripted ports that answer instantly.
    pub fn immediate() -> Self {
        Self {
            init_settle: Duration::ZERO,
            command_settle: Duration::ZERO,
            step_delay: Duration::ZERO,
            send_settle: Duration::ZERO,
        }
    }
}

/// Byte-level access to the modem link.
pub trait ModemPort: Send {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;
    fn flush(&mut self) -> io::Result<()>;
    /// Number of bytes that can be read without blocking.
    fn bytes_to_read(&mut self) -> io::Result<usize>;
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Opens a fresh [`ModemPort`]; called at startup and on every reconnect.
pub trait PortOpener: Send + Sync {
    fn open_port(&self) -> Result<Box<dyn ModemPort>, ModemError>;
    /// Human readable device label for logs.
    fn describe(&self) -> String;
}

/// Opens the modem's serial device with 8N1 framing.
#[cfg(feature = "serial")]
#[derive(Debug, Clone)]
pub struct SerialPortOpener {
    pub port_name: String,
    pub baud_rate: u32,
}

#[cfg(feature = "serial")]
impl SerialPortOpener {
    pub fn new(port_name: &str, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.to_string(),
            baud_rate,
        }
    }
}

#[cfg(feature = "serial")]
impl PortOpener for SerialPortOpener {
    fn open_port(&self) -> Result<Box<dyn ModemPort>, ModemError> {
        debug!(
            "Opening modem serial port {} at {} baud",
            self.port_name, self.baud_rate
        );
        let mut builder =
            serialport::new(&self.port_name, self.baud_rate).timeout(Duration::from_millis(1000));
        #[cfg(unix)]
        {
            builder = builder
                .data_bits(serialport::DataBits::Eight)
                .stop_bits(serialport::StopBits::One)
                .parity(serialport::Parity::None);
        }
        let mut port = builder.open().map_err(|e| ModemError::OpenFailed {
            port: self.port_name.clone(),
            reason: e.to_string(),
        })?;
        // Most USB GSM sticks ignore these, some need DTR to accept commands
        let _ = port.write_data_terminal_ready(true);
        let _ = port.write_request_to_send(true);
        Ok(Box::new(SerialLink { port }))
    }

    fn describe(&self) -> String {
        format!("{} @ {} baud", self.port_name, self.baud_rate)
    }
}

#[cfg(feature = "serial")]
struct SerialLink {
    port: Box<dyn serialport::SerialPort>,
}

#[cfg(feature = "serial")]
impl ModemPort for SerialLink {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        io::Write::write_all(&mut self.port, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        io::Write::flush(&mut self.port)
    }

    fn bytes_to_read(&mut self) -> io::Result<usize> {
        Ok(self.port.bytes_to_read()? as usize)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io::Read::read(&mut self.port, buf)
    }
}

/// Stand-in opener for builds without serial support; always fails so the
/// controller runs not-ready and keeps accepting (and failing) commands.
#[cfg(not(feature = "serial"))]
#[derive(Debug, Clone)]
pub struct SerialPortOpener {
    pub port_name: String,
    pub baud_rate: u32,
}

#[cfg(not(feature = "serial"))]
impl SerialPortOpener {
    pub fn new(port_name: &str, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.to_string(),
            baud_rate,
        }
    }
}

#[cfg(not(feature = "serial"))]
impl PortOpener for SerialPortOpener {
    fn open_port(&self) -> Result<Box<dyn ModemPort>, ModemError> {
        log::warn!("Serial support not compiled in; modem stays unavailable");
        Err(ModemError::OpenFailed {
            port: self.port_name.clone(),
            reason: "serial support not compiled in".to_string(),
        })
    }

    fn describe(&self) -> String {
        format!("{} @ {} baud (serial disabled)", self.port_name, self.baud_rate)
    }
}

/// An open, handshaken connection to the modem.
pub struct ModemSession {
    port: Box<dyn ModemPort>,
    label: String,
    timing: ModemTiming,
    /// Everything drained during the handshake, unsolicited lines included.
    handshake_output: String,
}

impl std::fmt::Debug for ModemSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModemSession")
            .field("label", &self.label)
            .field("timing", &self.timing)
            .finish()
    }
}

impl ModemSession {
    /// Open the serial device and run the AT handshake.
    #[cfg(feature = "serial")]
    pub async fn open(port_name: &str, baud_rate: u32, timing: ModemTiming) -> Result<Self, ModemError> {
        Self::connect(&SerialPortOpener::new(port_name, baud_rate), timing).await
    }

    /// Open a port through `opener` and run the AT handshake.
    pub async fn connect(opener: &dyn PortOpener, timing: ModemTiming) -> Result<Self, ModemError> {
        let port = opener.open_port()?;
        Self::handshake(port, opener.describe(), timing).await
    }

    /// Run `AT`, text mode and receive-notification setup on an open port,
    /// each step followed by the step delay.
    pub async fn handshake(
        port: Box<dyn ModemPort>,
        label: String,
        timing: ModemTiming,
    ) -> Result<Self, ModemError> {
        info!("Initializing GSM modem on {}", label);
        let mut session = ModemSession {
            port,
            label,
            timing,
            handshake_output: String::new(),
        };
        sleep(session.timing.init_settle).await;
        for (step, command) in at::HANDSHAKE {
            let response = session
                .write_raw(command)
                .await
                .map_err(|e| ModemError::HandshakeFailed {
                    step,
                    reason: e.to_string(),
                })?;
            if at::is_error_response(&response) {
                return Err(ModemError::HandshakeFailed {
                    step,
                    reason: format!("modem answered {}", escape_log(response.trim())),
                });
            }
            session.handshake_output.push_str(&response);
            sleep(session.timing.step_delay).await;
        }
        debug!("Modem handshake complete on {}", session.label);
        Ok(session)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn timing(&self) -> &ModemTiming {
        &self.timing
    }

    /// Bytes drained while handshaking; a notification may have arrived
    /// between the AT replies. Empty after the first call.
    pub fn take_handshake_output(&mut self) -> String {
        std::mem::take(&mut self.handshake_output)
    }

    /// Write `command` plus line terminator, wait the command settle interval
    /// and return whatever is buffered by then.
    pub async fn write_raw(&mut self, command: &str) -> Result<String, ModemError> {
        self.write_line(command)?;
        sleep(self.timing.command_settle).await;
        let response = self.read_available()?;
        trace!(
            "AT {} -> {}",
            command,
            truncate_for_log(&response, 200)
        );
        Ok(response)
    }

    /// Write `command` plus line terminator without reading anything back.
    pub fn write_line(&mut self, command: &str) -> Result<(), ModemError> {
        let mut line = String::with_capacity(command.len() + at::LINE_END.len());
        line.push_str(command);
        line.push_str(at::LINE_END);
        self.port.write_all(line.as_bytes())?;
        self.port.flush()?;
        Ok(())
    }

    /// Write an SMS body followed by the Ctrl-Z terminator.
    pub fn write_sms_body(&mut self, payload: &str) -> Result<(), ModemError> {
        self.port.write_all(&at::sms_body(payload))?;
        self.port.flush()?;
        Ok(())
    }

    /// Currently buffered bytes, decoded lossily; empty when nothing is waiting.
    /// Never blocks.
    pub fn read_available(&mut self) -> Result<String, ModemError> {
        let mut collected = Vec::new();
        let mut buf = [0u8; 1024];
        while collected.len() < MAX_DRAIN_BYTES {
            let waiting = self.port.bytes_to_read()?;
            if waiting == 0 {
                break;
            }
            let want = waiting.min(buf.len());
            let n = match self.port.read(&mut buf[..want]) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => 0,
                Err(e) => return Err(e.into()),
            };
            if n == 0 {
                break;
            }
            collected.extend_from_slice(&buf[..n]);
        }
        Ok(String::from_utf8_lossy(&collected).into_owned())
    }
}
