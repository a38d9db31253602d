use serde::{Deserialize, Serialize};

use super::MAX_MESSAGE_CHARS;
use super::error::CommandError;

/// Commands understood by the gateway firmware.
///
/// Encoding never assumes the command took effect: the device echoes a
/// confirmation line which is what updates the tracked state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Replace the message the transmitter sends on the next authorized scan.
    SetMessage { text: String },
    /// Stop the blinking/sounding alert on the receiver.
    StopAlert,
    Sound { enabled: bool },
    /// Connectivity check.
    Ping,
}

impl Command {
    pub fn encode(&self) -> Result<Vec<u8>, CommandError> {
        match self {
            Command::SetMessage { text } => encode_set_message(text),
            Command::StopAlert => Ok(encode_stop_alert()),
            Command::Sound { enabled } => Ok(encode_sound_toggle(*enabled)),
            Command::Ping => Ok(encode_ping()),
        }
    }
}

pub fn encode_set_message(text: &str) -> Result<Vec<u8>, CommandError> {
    if text.trim().is_empty() {
        return Err(CommandError::EmptyMessage);
    }

    // a line break would split the command on the device side
    if text.contains(['\n', '\r']) {
        return Err(CommandError::LineBreak);
    }

    let length = text.chars().count();
    if length > MAX_MESSAGE_CHARS {
        return Err(CommandError::MessageTooLong {
            length,
            max: MAX_MESSAGE_CHARS,
        });
    }

    let mut bytes = Vec::with_capacity(4 + text.len() + 1);
    bytes.extend_from_slice(b"MSG:");
    bytes.extend_from_slice(text.as_bytes());
    bytes.push(b'\n');
    Ok(bytes)
}

pub fn encode_stop_alert() -> Vec<u8> {
    b"stopalert\n".to_vec()
}

pub fn encode_sound_toggle(next_enabled: bool) -> Vec<u8> {
    if next_enabled {
        b"soundon\n".to_vec()
    } else {
        b"soundoff\n".to_vec()
    }
}

pub fn encode_ping() -> Vec<u8> {
    b"PING\n".to_vec()
}

/// Cut `text` to the longest prefix the device accepts.
///
/// Returns the kept prefix and whether anything was dropped, so callers can
/// warn instead of silently losing the tail.
pub fn truncate_message(text: &str) -> (&str, bool) {
    match text.char_indices().nth(MAX_MESSAGE_CHARS) {
        Some((cut, _)) => (&text[..cut], true),
        None => (text, false),
    }
}
