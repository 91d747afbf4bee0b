//! Test utilities & fixtures.
//! Provides a scripted in-memory GSM modem and a controller wired to it.
#![allow(dead_code)] // each integration test uses a different subset

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::FixedOffset;
use smsgate::error::ModemError;
use smsgate::gate::{AutoCloseSchedule, ControllerSettings, GateController, GatePayloads};
use smsgate::gateway::CommandGateway;
use smsgate::modem::{ModemPort, ModemTiming, PortOpener};
use smsgate::storage::ActivityLog;

pub const GATE_NUMBER: &str = "5550100";

#[derive(Default)]
struct MockState {
    writes: Vec<Vec<u8>>,
    rx: VecDeque<u8>,
    io_ops: usize,
    opens: usize,
    fail_open: bool,
    fail_io: bool,
    /// Answer to a Ctrl-Z terminated body; `None` means the usual `+CMGS`/`OK`.
    sms_reply: Option<String>,
}

/// Scripted modem: `OK` for AT lines, `>` for `AT+CMGS`, `+CMGS: n` + `OK`
/// after a terminated body. Every port call counts as one I/O operation.
#[derive(Clone, Default)]
pub struct MockModem(Arc<Mutex<MockState>>);

impl MockModem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn opener(&self) -> Box<dyn PortOpener> {
        Box::new(MockOpener(self.0.clone()))
    }

    /// Queue unsolicited bytes as if the modem had pushed them.
    pub fn inject(&self, text: &str) {
        self.0.lock().unwrap().rx.extend(text.bytes());
    }

    pub fn writes(&self) -> Vec<String> {
        self.0
            .lock()
            .unwrap()
            .writes
            .iter()
            .map(|w| String::from_utf8_lossy(w).into_owned())
            .collect()
    }

    /// Writes after the three handshake commands of the first session.
    pub fn writes_after_handshake(&self) -> Vec<String> {
        self.writes().into_iter().skip(3).collect()
    }

    /// SMS bodies (without the Ctrl-Z terminator), in wire order.
    pub fn sms_bodies(&self) -> Vec<String> {
        self.writes()
            .into_iter()
            .filter_map(|w| w.strip_suffix('\u{1a}').map(str::to_string))
            .collect()
    }

    pub fn io_ops(&self) -> usize {
        self.0.lock().unwrap().io_ops
    }

    pub fn opens(&self) -> usize {
        self.0.lock().unwrap().opens
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.0.lock().unwrap().fail_open = fail;
    }

    pub fn set_fail_io(&self, fail: bool) {
        self.0.lock().unwrap().fail_io = fail;
    }

    pub fn set_sms_reply(&self, reply: &str) {
        self.0.lock().unwrap().sms_reply = Some(reply.to_string());
    }
}

struct MockOpener(Arc<Mutex<MockState>>);

impl PortOpener for MockOpener {
    fn open_port(&self) -> Result<Box<dyn ModemPort>, ModemError> {
        let mut s = self.0.lock().unwrap();
        s.opens += 1;
        if s.fail_open {
            return Err(ModemError::OpenFailed {
                port: "mock".into(),
                reason: "no such device".into(),
            });
        }
        Ok(Box::new(MockPort(self.0.clone())))
    }

    fn describe(&self) -> String {
        "mock modem".into()
    }
}

struct MockPort(Arc<Mutex<MockState>>);

impl MockPort {
    fn io(&self) -> io::Result<std::sync::MutexGuard<'_, MockState>> {
        let mut s = self.0.lock().unwrap();
        s.io_ops += 1;
        if s.fail_io {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "modem unplugged"));
        }
        Ok(s)
    }
}

impl ModemPort for MockPort {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        let mut s = self.io()?;
        s.writes.push(buf.to_vec());
        let answer = if buf.ends_with(&[0x1a]) {
            s.sms_reply
                .clone()
                .unwrap_or_else(|| "\r\n+CMGS: 17\r\n\r\nOK\r\n".to_string())
        } else if buf.starts_with(b"AT+CMGS") {
            "\r\n> ".to_string()
        } else {
            "\r\nOK\r\n".to_string()
        };
        s.rx.extend(answer.bytes());
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.io().map(|_| ())
    }

    fn bytes_to_read(&mut self) -> io::Result<usize> {
        Ok(self.io()?.rx.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut s = self.io()?;
        let n = buf.len().min(s.rx.len());
        for (slot, byte) in buf.iter_mut().zip(s.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

pub fn offset() -> FixedOffset {
    FixedOffset::east_opt(-5 * 3600).unwrap()
}

/// Small but non-zero delays so concurrent callers get a chance to interleave.
pub fn short_timing() -> ModemTiming {
    ModemTiming {
        init_settle: Duration::ZERO,
        command_settle: Duration::from_millis(2),
        step_delay: Duration::from_millis(3),
        send_settle: Duration::from_millis(5),
    }
}

pub fn gateway(modem: &MockModem, timing: ModemTiming) -> Arc<CommandGateway> {
    Arc::new(CommandGateway::new(modem.opener(), timing, false))
}

pub fn settings() -> ControllerSettings {
    ControllerSettings {
        phone_number: GATE_NUMBER.into(),
        payloads: GatePayloads::default(),
        utc_offset: offset(),
        momentary_seconds: 60,
        block_lines: 20,
    }
}

/// Controller on `modem` with a fresh log under `dir`; the modem is connected
/// unless it was told to fail opening.
pub async fn controller(
    modem: &MockModem,
    dir: &tempfile::TempDir,
    timing: ModemTiming,
) -> GateController {
    let log = Arc::new(ActivityLog::open(dir.path().join("gate_log.txt"), 100, offset()));
    let c = GateController::start(
        gateway(modem, timing),
        log,
        settings(),
        AutoCloseSchedule::new(22, 0).unwrap(),
    );
    c.initialize_modem().await;
    c
}

/// Log texts, newest first.
pub fn log_texts(c: &GateController, k: usize) -> Vec<String> {
    c.log_tail(k).into_iter().map(|e| e.text).collect()
}
