pub mod mock;
pub mod port;

use std::io::{self, Read, Write};

use async_trait::async_trait;

/// The two halves of an open serial connection.
pub struct SerialLink {
    pub reader: Box<dyn Read + Send>,
    pub writer: Box<dyn Write + Send>,
}

/// Opens the link to the gateway.
///
/// Reads on the returned reader are blocking and are expected to time out
/// regularly (`TimedOut`/`WouldBlock`) so the read loop can notice a close.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Name shown in logs and link status updates.
    fn port_name(&self) -> &str;

    async fn open(&self) -> Result<SerialLink, ConnectionError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("serial port {port} is busy or access was denied")]
    PortBusy { port: String },

    #[error("serial port {port} not found")]
    PortNotFound { port: String },

    #[error("could not open serial port {port}: {detail}")]
    Other { port: String, detail: String },
}

impl ConnectionError {
    /// What the operator can do about it, when there is something to do.
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            ConnectionError::PortBusy { .. } => Some(
                "close any other program holding the port (serial monitor, another monitor instance) and check you may open it",
            ),
            ConnectionError::PortNotFound { .. } => {
                Some("check the USB cable and pass the right port with --port")
            }
            ConnectionError::Other { .. } => None,
        }
    }
}

/// Sort an open failure into busy, missing or other.
pub fn classify_open_error(port: &str, err: &serialport::Error) -> ConnectionError {
    let detail = err.to_string();
    let lower = detail.to_lowercase();

    let busy = matches!(
        err.kind(),
        serialport::ErrorKind::Io(io::ErrorKind::PermissionDenied | io::ErrorKind::ResourceBusy)
    ) || ["busy", "access is denied", "permission denied"]
        .iter()
        .any(|needle| lower.contains(needle));

    if busy {
        return ConnectionError::PortBusy {
            port: port.to_owned(),
        };
    }

    let missing = matches!(
        err.kind(),
        serialport::ErrorKind::NoDevice | serialport::ErrorKind::Io(io::ErrorKind::NotFound)
    ) || ["no such file", "not found", "could not open port", "cannot find"]
        .iter()
        .any(|needle| lower.contains(needle));

    if missing {
        return ConnectionError::PortNotFound {
            port: port.to_owned(),
        };
    }

    ConnectionError::Other {
        port: port.to_owned(),
        detail,
    }
}

/// Read errors that only mean "no data yet".
pub(crate) fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}
