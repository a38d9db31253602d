mod classify;
mod command;
mod error;
mod event;
mod packet;

pub use classify::{Matcher, RULES, Rule, classify, matching_rule};
pub use command::{
    Command, encode_ping, encode_set_message, encode_sound_toggle, encode_stop_alert,
    truncate_message,
};
pub use error::{CommandError, ProtocolError};
pub use event::TelemetryEvent;
pub use packet::{PacketCode, PacketKind};

/// High byte of the code that opens a message.
pub const START_MARKER: u8 = 0xFF;
/// High byte of the code that closes a message.
pub const END_MARKER: u8 = 0xFE;
/// Longest message the transmitter firmware stores.
pub const MAX_MESSAGE_CHARS: usize = 50;
