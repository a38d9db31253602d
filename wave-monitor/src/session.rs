use std::io::{self, BufRead, BufReader, Read, Write};
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, instrument, warn};
use wave_core::protocol::{Command, CommandError};
use wave_core::{AlertId, LinkStatus, MonitorUpdate};

use crate::journal::Acknowledgement;
use crate::serial::{ConnectionError, Connector, is_transient};
use crate::state::MonitorState;

const LINE_CAPACITY: usize = 256;
const COMMAND_CAPACITY: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error(transparent)]
    Invalid(#[from] CommandError),

    #[error("session is closed")]
    SessionClosed,

    #[error("too many commands waiting to be written")]
    Busy,
}

/// What the reader hands to the dispatcher.
#[derive(Debug, PartialEq, Eq)]
enum Input {
    Line(String),
    Ended(Box<str>),
}

/// Why the read loop stopped.
#[derive(Debug)]
enum ReadEnd {
    Cancelled,
    EndOfStream,
    Failed(io::Error),
    DispatcherGone,
}

/// An open session: reader, dispatcher and writer tasks.
pub struct Session {
    handle: SessionHandle,
    tasks: Vec<JoinHandle<()>>,
}

/// Clonable control surface of a session.
#[derive(Clone)]
pub struct SessionHandle {
    port: Arc<str>,
    cancel: CancellationToken,
    commands: mpsc::Sender<Vec<u8>>,
    state: MonitorState,
}

/// Open the link and start processing its lines into `state`.
///
/// Connect failures are returned as is and never retried.
pub async fn connect<C: Connector>(
    connector: &C,
    state: MonitorState,
) -> Result<Session, ConnectionError> {
    let link = connector.open().await?;
    let port: Arc<str> = connector.port_name().into();
    let cancel = CancellationToken::new();

    let (line_tx, line_rx) = mpsc::channel(LINE_CAPACITY);
    let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);

    state.publish(MonitorUpdate::Link(LinkStatus::Connected {
        port: port.as_ref().into(),
    }));
    info!(port = %port, "Session open");

    let reader = {
        let cancel = cancel.clone();
        let state = state.clone();
        let span = info_span!("reader", port = %port);
        tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            let end = read_lines(link.reader, &line_tx, &cancel);
            let reason = describe_read_end(&end);
            // the dispatcher reports it after the last line; if it is gone, report here
            let delivered = !matches!(end, ReadEnd::Cancelled)
                && line_tx.blocking_send(Input::Ended(reason.clone())).is_ok();
            if !delivered {
                state.publish(MonitorUpdate::Link(LinkStatus::Disconnected { reason }));
            }
        })
    };

    let dispatcher = tokio::spawn(run_dispatcher(line_rx, state.clone(), cancel.clone()));

    let writer = tokio::spawn(
        run_writer(link.writer, command_rx, cancel.clone())
            .instrument(info_span!("writer", port = %port)),
    );

    Ok(Session {
        handle: SessionHandle {
            port,
            cancel,
            commands: command_tx,
            state,
        },
        tasks: vec![reader, dispatcher, writer],
    })
}

impl Session {
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Wait for every session task to finish.
    pub async fn closed(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Session task failed");
            }
        }
        info!(port = %self.handle.port, "Session closed");
    }

    /// Close and wait.
    pub async fn close(self) {
        self.handle.close();
        self.closed().await;
    }
}

impl SessionHandle {
    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    /// Encode and queue a command without waiting for the device.
    ///
    /// Invalid commands are rejected before anything is queued. Writes are
    /// performed one at a time, in submission order. A full queue means the
    /// writer is stuck and is reported as `Busy`.
    pub fn send(&self, command: &Command) -> Result<(), SendError> {
        let bytes = command.encode()?;
        if self.cancel.is_cancelled() {
            return Err(SendError::SessionClosed);
        }

        debug!(?command, "Queueing command");
        self.commands.try_send(bytes).map_err(|e| match e {
            TrySendError::Full(_) => {
                warn!(?command, "Command queue full");
                SendError::Busy
            }
            TrySendError::Closed(_) => SendError::SessionClosed,
        })
    }

    /// Acknowledge a journal entry and, if it was still pending, tell the
    /// device to stop the alert.
    pub async fn acknowledge_alert(&self, id: AlertId) -> Result<Acknowledgement, SendError> {
        let ack = self.state.acknowledge(id).await;
        if ack == Acknowledgement::Acknowledged {
            info!(%id, "Alert acknowledged");
            self.send(&Command::StopAlert)?;
        }
        Ok(ack)
    }

    /// Idempotent.
    pub fn close(&self) {
        if !self.cancel.is_cancelled() {
            info!(port = %self.port, "Closing session");
        }
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the session has been asked to close.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }
}

/// Blocking read loop. Partial lines survive read timeouts.
fn read_lines(
    reader: Box<dyn Read + Send>,
    lines: &mpsc::Sender<Input>,
    cancel: &CancellationToken,
) -> ReadEnd {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        if cancel.is_cancelled() {
            return ReadEnd::Cancelled;
        }

        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => {
                // unterminated last line
                if let Some(line) = decode_line(&buf) {
                    if lines.blocking_send(Input::Line(line)).is_err() {
                        return ReadEnd::DispatcherGone;
                    }
                }
                return ReadEnd::EndOfStream;
            }
            Ok(_) if buf.last() != Some(&b'\n') => {
                // EOF in the middle of a line, next read reports it
            }
            Ok(_) => {
                if let Some(line) = decode_line(&buf) {
                    if lines.blocking_send(Input::Line(line)).is_err() {
                        return ReadEnd::DispatcherGone;
                    }
                }
                buf.clear();
            }
            Err(e) if is_transient(&e) => {}
            Err(e) => return ReadEnd::Failed(e),
        }
    }
}

/// Lossy decode, trimmed. `None` for blank lines.
fn decode_line(bytes: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(bytes);
    let line = text.trim();
    (!line.is_empty()).then(|| line.to_owned())
}

fn describe_read_end(end: &ReadEnd) -> Box<str> {
    match end {
        ReadEnd::Cancelled => {
            debug!("Read loop cancelled");
            "session closed".into()
        }
        ReadEnd::EndOfStream => {
            warn!("Device closed the link");
            "end of stream".into()
        }
        ReadEnd::Failed(e) => {
            error!(error = %e, "Read failed, read loop stopped");
            format!("read error: {e}").into()
        }
        ReadEnd::DispatcherGone => {
            debug!("Dispatcher stopped, read loop stopped");
            "session closed".into()
        }
    }
}

/// Single consumer of lines: classification, reassembly and timers all
/// happen here, in read order.
#[instrument(skip_all)]
async fn run_dispatcher(
    mut lines: mpsc::Receiver<Input>,
    state: MonitorState,
    cancel: CancellationToken,
) {
    let mut reader_done = false;

    loop {
        let deadline = state.next_deadline().await;
        let timer = async {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Dispatcher shutting down");
                break;
            }
            input = lines.recv(), if !reader_done => match input {
                Some(Input::Line(line)) => {
                    state.ingest_line(&line).await;
                }
                Some(Input::Ended(reason)) => {
                    state.publish(MonitorUpdate::Link(LinkStatus::Disconnected { reason }));
                    // timers keep running until the session is closed
                    reader_done = true;
                }
                None => reader_done = true,
            },
            _ = timer => state.expire().await,
        }
    }
}

/// Single writer: one outstanding write at a time.
async fn run_writer(
    mut writer: Box<dyn Write + Send>,
    mut commands: mpsc::Receiver<Vec<u8>>,
    cancel: CancellationToken,
) {
    loop {
        let bytes = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            bytes = commands.recv() => match bytes {
                Some(bytes) => bytes,
                None => break,
            },
        };

        let written = tokio::task::spawn_blocking(move || {
            let result = writer.write_all(&bytes).and_then(|()| writer.flush());
            (writer, result)
        })
        .await;

        match written {
            Ok((w, result)) => {
                writer = w;
                match result {
                    Ok(()) => debug!("Command written"),
                    Err(e) => error!(error = %e, "Command write failed"),
                }
            }
            Err(e) => {
                error!(error = %e, "Writer task failed");
                break;
            }
        }
    }

    debug!("Writer shutting down");
}
