use thiserror::Error;

/// Failures raised by the serial modem session. These never cross the
/// gateway boundary; the gateway folds them into readiness and
/// [`GateError`] values.
#[derive(Debug, Error)]
pub enum ModemError {
    /// The serial device could not be opened (absent, busy, permissions).
    #[error("failed to open serial port {port}: {reason}")]
    OpenFailed { port: String, reason: String },

    /// The device opened but one of the AT handshake steps failed.
    #[error("modem handshake failed at {step}: {reason}")]
    HandshakeFailed { step: &'static str, reason: String },

    /// I/O error on an already open session.
    #[error("serial io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error taxonomy for the gate controller.
#[derive(Debug, Error)]
pub enum GateError {
    /// Open or handshake failed; the session is marked not-ready and the
    /// scheduler keeps retrying.
    #[error("modem unavailable: {0}")]
    DeviceUnavailable(String),

    /// I/O error while sending an SMS. Not retried automatically.
    #[error("sms send failed: {0}")]
    SendFailed(String),

    /// Inbound frame that could not be parsed. Dropped after a debug log.
    #[error("malformed modem reply: {0}")]
    MalformedReply(String),

    /// Activity log append/trim failure. Logged, never fatal.
    #[error("activity log io error: {0}")]
    LogIo(#[from] std::io::Error),

    #[error("invalid auto-close time {hour}:{minute:02}")]
    InvalidSchedule { hour: u32, minute: u32 },

    /// The dispatch worker has shut down.
    #[error("command dispatcher is not running")]
    DispatcherClosed,
}

impl From<ModemError> for GateError {
    fn from(err: ModemError) -> Self {
        match err {
            ModemError::Io(e) => GateError::SendFailed(e.to_string()),
            other => GateError::DeviceUnavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_failures_map_to_device_unavailable() {
        let err: GateError = ModemError::OpenFailed {
            port: "/dev/ttyUSB2".into(),
            reason: "No such file or directory".into(),
        }
        .into();
        assert!(matches!(err, GateError::DeviceUnavailable(_)));
        assert!(err.to_string().contains("/dev/ttyUSB2"));
    }

    #[test]
    fn io_failures_map_to_send_failed() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        let err: GateError = ModemError::Io(io).into();
        assert!(matches!(err, GateError::SendFailed(_)));
    }
}
