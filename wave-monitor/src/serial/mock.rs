use std::collections::VecDeque;
use std::io::{self, Cursor, Read, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use super::{ConnectionError, Connector, SerialLink, classify_open_error};

/// Poll interval of a held-open mock once its script is exhausted.
const IDLE_POLL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Busy,
    NotFound,
}

/// Connector that replays a scripted transcript and captures writes.
///
/// Stands in for the gateway in demos and tests.
#[derive(Debug, Clone)]
pub struct MockConnector {
    port: String,
    lines: Arc<[String]>,
    line_interval: Duration,
    hold_open: bool,
    failure: Option<MockFailure>,
    written: SharedBuffer,
}

impl MockConnector {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            port: "mock".to_owned(),
            lines: lines.into_iter().map(Into::into).collect(),
            line_interval: Duration::ZERO,
            hold_open: false,
            failure: None,
            written: SharedBuffer::default(),
        }
    }

    /// Load a transcript, one device line per file line.
    pub fn from_transcript(path: &Path) -> io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::new(content.lines()).with_port(path.display().to_string()))
    }

    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = port.into();
        self
    }

    /// Pause before each line, like a device printing in real time.
    pub fn with_line_interval(mut self, interval: Duration) -> Self {
        self.line_interval = interval;
        self
    }

    /// Keep the link open after the script ends instead of reporting end of
    /// stream.
    pub fn hold_open(mut self, hold_open: bool) -> Self {
        self.hold_open = hold_open;
        self
    }

    /// Make `open` fail the way a real port would.
    pub fn failing(mut self, failure: MockFailure) -> Self {
        self.failure = Some(failure);
        self
    }

    /// Everything written to the link so far.
    pub fn written(&self) -> SharedBuffer {
        self.written.clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    fn port_name(&self) -> &str {
        &self.port
    }

    async fn open(&self) -> Result<SerialLink, ConnectionError> {
        if let Some(failure) = self.failure {
            let err = match failure {
                MockFailure::Busy => serialport::Error::new(
                    serialport::ErrorKind::Io(io::ErrorKind::PermissionDenied),
                    "Permission denied",
                ),
                MockFailure::NotFound => {
                    serialport::Error::new(serialport::ErrorKind::NoDevice, "No such file or directory")
                }
            };
            return Err(classify_open_error(&self.port, &err));
        }

        info!(port = %self.port, lines = self.lines.len(), "Opening mock link");

        Ok(SerialLink {
            reader: Box::new(ScriptReader {
                pending: self.lines.iter().cloned().collect(),
                current: Cursor::new(Vec::new()),
                line_interval: self.line_interval,
                hold_open: self.hold_open,
            }),
            writer: Box::new(self.written.clone()),
        })
    }
}

struct ScriptReader {
    pending: VecDeque<String>,
    current: Cursor<Vec<u8>>,
    line_interval: Duration,
    hold_open: bool,
}

impl Read for ScriptReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let n = self.current.read(buf)?;
            if n > 0 {
                return Ok(n);
            }

            match self.pending.pop_front() {
                Some(line) => {
                    if !self.line_interval.is_zero() {
                        std::thread::sleep(self.line_interval);
                    }
                    let mut bytes = line.into_bytes();
                    bytes.push(b'\n');
                    self.current = Cursor::new(bytes);
                }
                None if self.hold_open => {
                    std::thread::sleep(IDLE_POLL);
                    return Err(io::ErrorKind::TimedOut.into());
                }
                None => return Ok(0),
            }
        }
    }
}

/// Clonable in-memory sink.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> Vec<u8> {
        match self.0.lock() {
            Ok(buf) => buf.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut buf = self
            .0
            .lock()
            .map_err(|e| io::Error::other(e.to_string()))?;
        buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
