pub mod protocol;

use core::fmt;

use serde::{Deserialize, Serialize};

pub use protocol::TelemetryEvent;

// Text that is written once and never grows is kept as `Box<str>`.
type BoxStr = Box<str>;

/// Identifier of a journal entry. Assigned in increasing order, starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertId(pub u64);

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A completed message kept in the alert journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertEntry {
    pub id: AlertId,
    /// When the completed message line was read.
    pub timestamp: jiff::Timestamp,
    /// Never empty.
    pub text: BoxStr,
    /// Flips to `true` once, on an explicit acknowledge.
    pub acknowledged: bool,
}

/// Monotonic session counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    /// Completed messages recorded in the journal.
    pub messages_received: u64,
    /// Empty messages, out of sequence codes, length mismatches and discarded
    /// reassembly buffers.
    pub unrecognized: u64,
    pub cards_scanned: u64,
    pub cards_authorized: u64,
}

/// Access-control phase of the gateway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DevicePhase {
    #[default]
    Idle,
    Detecting,
    Authorized,
    Denied,
}

impl DevicePhase {
    pub fn label(self) -> &'static str {
        match self {
            DevicePhase::Idle => "Waiting for card",
            DevicePhase::Detecting => "Card detected",
            DevicePhase::Authorized => "Access granted",
            DevicePhase::Denied => "Access denied",
        }
    }

    /// Visual cue a display should play while in this phase.
    pub fn effect(self) -> PhaseEffect {
        match self {
            DevicePhase::Idle => PhaseEffect::Steady,
            DevicePhase::Detecting => PhaseEffect::Pulse {
                count: 5,
                period_ms: 400,
            },
            DevicePhase::Authorized | DevicePhase::Denied => PhaseEffect::Flash {
                count: 3,
                period_ms: 300,
            },
        }
    }
}

/// Presentation hint attached to a phase change. Rendering it is up to the
/// subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PhaseEffect {
    Steady,
    /// Repeating cue while a card is being read.
    Pulse { count: u8, period_ms: u32 },
    /// Fixed number of flashes for a verdict.
    Flash { count: u8, period_ms: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseChange {
    pub phase: DevicePhase,
    pub label: BoxStr,
    pub effect: PhaseEffect,
}

impl PhaseChange {
    pub fn new(phase: DevicePhase) -> Self {
        Self {
            phase,
            label: phase.label().into(),
            effect: phase.effect(),
        }
    }

    pub fn should_pulse(&self) -> bool {
        matches!(self.effect, PhaseEffect::Pulse { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    MessageReceived,
    EmptyMessage,
    OutOfSequence,
}

/// Short-lived status text, cleared automatically after a few seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: BoxStr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LinkStatus {
    Connected { port: BoxStr },
    Disconnected { reason: BoxStr },
}

/// Everything a subscriber can observe, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum MonitorUpdate {
    /// Every classified line, including fallbacks.
    Event(TelemetryEvent),
    Phase(PhaseChange),
    AlertRecorded(AlertEntry),
    AlertEvicted(AlertId),
    AlertAcknowledged(AlertId),
    /// Every entry was dropped from the journal.
    JournalCleared { removed: usize },
    Counters(Counters),
    /// Device confirmed sound state.
    Sound { enabled: bool },
    /// `None` when the notice expires.
    Notice(Option<Notice>),
    Link(LinkStatus),
}

/// Point in time view of the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorSnapshot {
    pub phase: DevicePhase,
    pub sound_enabled: bool,
    pub counters: Counters,
    pub unacknowledged: usize,
    pub journal_len: usize,
    pub journal_capacity: usize,
    pub notice: Option<Notice>,
    /// Whether a message is currently being reassembled.
    pub reassembling: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_effects() {
        assert!(PhaseChange::new(DevicePhase::Detecting).should_pulse());
        assert!(!PhaseChange::new(DevicePhase::Authorized).should_pulse());
        assert_eq!(
            DevicePhase::Denied.effect(),
            PhaseEffect::Flash {
                count: 3,
                period_ms: 300
            }
        );
        assert_eq!(DevicePhase::Idle.effect(), PhaseEffect::Steady);
    }

    #[test]
    fn update_wire_shape() {
        let update = MonitorUpdate::Sound { enabled: false };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "type": "sound", "data": { "enabled": false } })
        );

        let update = MonitorUpdate::JournalCleared { removed: 3 };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "type": "journal_cleared", "data": { "removed": 3 } })
        );

        let update = MonitorUpdate::AlertAcknowledged(AlertId(7));
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "type": "alert_acknowledged", "data": 7 })
        );
    }
}
