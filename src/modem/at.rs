//! AT command set and text-mode frame parsing for the GSM modem.
//!
//! Only one fixed dialect is spoken: text-mode SMS (`AT+CMGF=1`) with
//! unsolicited delivery of inbound messages (`AT+CNMI=2,2,0,0,0`), which the
//! modem reports as a `+CMT:` header line followed by the body on the next line.

/// Line terminator appended to every command.
pub const LINE_END: &str = "\r\n";

/// Ctrl-Z, terminates the body of an interactive `AT+CMGS` send.
pub const CTRL_Z: u8 = 0x1A;

pub const ATTENTION: &str = "AT";
pub const TEXT_MODE: &str = "AT+CMGF=1";
pub const NOTIFY_ON_RECEIVE: &str = "AT+CNMI=2,2,0,0,0";

/// Inbound SMS notification marker.
pub const CMT_MARKER: &str = "+CMT:";
/// Send confirmation marker (`+CMGS: <mr>`).
pub const CMGS_MARKER: &str = "+CMGS";

/// Handshake steps run after the port is opened, in order.
pub const HANDSHAKE: [(&str, &str); 3] = [
    ("attention", ATTENTION),
    ("text mode", TEXT_MODE),
    ("receive notifications", NOTIFY_ON_RECEIVE),
];

/// `AT+CMGS="<number>"`, the start of an interactive SMS send.
pub fn send_sms_command(number: &str) -> String {
    format!("AT+CMGS=\"{}\"", number)
}

/// SMS body bytes terminated with Ctrl-Z.
pub fn sms_body(payload: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 1);
    out.extend_from_slice(payload.as_bytes());
    out.push(CTRL_Z);
    out
}

/// True when the modem explicitly rejected the last command.
pub fn is_error_response(response: &str) -> bool {
    response
        .lines()
        .map(str::trim)
        .any(|line| line == "ERROR" || line.starts_with("+CME ERROR") || line.starts_with("+CMS ERROR"))
}

/// True when a send response carries `OK` or a `+CMGS` confirmation.
pub fn is_send_confirmed(response: &str) -> bool {
    response.contains("OK") || response.contains(CMGS_MARKER)
}

/// One `+CMT:` frame found in a drained buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// Body line of a well-formed notification.
    Message(String),
    /// Header with no (or an empty) following line; carries the header for logging.
    Malformed(String),
}

/// Scan buffered modem text for inbound SMS notifications, in arrival order.
///
/// ```
/// use smsgate::modem::at::{parse_inbound, InboundFrame};
///
/// let raw = "\r\n+CMT: \"+15550100\",\"\",\"24/05/01,10:00:00-20\"\r\nGATE OPEN\r\n";
/// assert_eq!(parse_inbound(raw), vec![InboundFrame::Message("GATE OPEN".into())]);
/// ```
pub fn parse_inbound(text: &str) -> Vec<InboundFrame> {
    let lines: Vec<&str> = text.split('\n').collect();
    let mut frames = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        if !line.contains(CMT_MARKER) {
            continue;
        }
        match lines.get(i + 1).map(|l| l.trim()) {
            Some(body) if !body.is_empty() => frames.push(InboundFrame::Message(body.to_string())),
            _ => frames.push(InboundFrame::Malformed(line.trim().to_string())),
        }
    }
    frames
}
