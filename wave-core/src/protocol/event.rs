use serde::{Deserialize, Serialize};

use super::PacketCode;

type BoxStr = Box<str>;

/// A typed reading of one telemetry line emitted by the gateway firmware.
///
/// Receiver-side and transmitter-side firmware share one line protocol, so
/// both sets of variants live here. `Unrecognized` and `DebugGeneric` are the
/// fallbacks that keep classification total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TelemetryEvent {
    /// A 433 MHz signal was picked up by the receiver.
    SignalDetected,
    /// Raw radio code, as printed by the firmware.
    RawCodeReceived { code: BoxStr },
    /// Bit length of the last radio code.
    LengthReport { n: u32 },
    /// Radio protocol number of the last code.
    ProtocolReport { name: BoxStr },
    /// A 32 bit code passed the receiver's validity filter.
    ValidCodeDetected,
    /// Authoritative end of a reassembled message. Never empty.
    MessageReceived { text: BoxStr },
    /// The end code arrived but the reassembled message was empty.
    MessageEmptyError,
    /// Start code seen; the device announces how many characters follow.
    MessageStarted { expected_len: u32 },
    /// One data packet. `total` is only present on the transmitter's wire shape.
    PacketReceived {
        index: u32,
        total: Option<u32>,
        code: PacketCode,
    },
    /// Periodic "buffer actuel" report while a message is being reassembled.
    BufferProgress {
        partial: BoxStr,
        current: u32,
        total: u32,
    },
    AuthorizedCardDetected,
    /// A data code arrived while no message was open on the device.
    OutOfSequence { code: PacketCode },
    BufferReset,
    SignalRejected,
    NoiseDetected,
    LengthMismatch { details: BoxStr },
    UidScanned { uid: BoxStr },
    /// Authorized card; `message` is the text the transmitter is about to send.
    UidAuthorized { message: Option<BoxStr> },
    UidUnauthorized,
    AlertStopped,
    /// Device confirmation that the pending alert was read.
    MessageRead { text: Option<BoxStr> },
    NewAlertActivated,
    /// Device echo of a command line it received.
    CommandEchoed { raw: BoxStr },
    SoundEnabled,
    SoundDisabled,
    CardDetected,
    StartCodeSent { code: PacketCode },
    EndCodeSent { code: PacketCode },
    TransmissionStarted { text: BoxStr, length: Option<u32> },
    TransmissionCompleted,
    RfidSessionClosed,
    MessageDefined { text: BoxStr },
    CurrentMessage { text: BoxStr },
    NoActiveAlert,
    UnknownCommand { raw: BoxStr },
    /// Any other `DEBUG:` line, with the prefix stripped.
    DebugGeneric { text: BoxStr },
    Unrecognized { raw_line: BoxStr },
}

impl TelemetryEvent {
    /// Events that feed the unrecognized counter.
    pub fn is_reception_error(&self) -> bool {
        matches!(
            self,
            TelemetryEvent::MessageEmptyError
                | TelemetryEvent::OutOfSequence { .. }
                | TelemetryEvent::LengthMismatch { .. }
        )
    }

    /// Fallback variants produced when no specific pattern matched.
    pub fn is_fallback(&self) -> bool {
        matches!(
            self,
            TelemetryEvent::DebugGeneric { .. } | TelemetryEvent::Unrecognized { .. }
        )
    }
}
