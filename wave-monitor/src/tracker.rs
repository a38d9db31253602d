use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};
use wave_core::{
    AlertId, DevicePhase, MonitorSnapshot, MonitorUpdate, Notice, NoticeKind, TelemetryEvent,
};

use crate::journal::{Acknowledgement, AlertJournal};
use crate::lifecycle::DeviceLifecycle;
use crate::reassembly::{Outcome, Reassembler};

#[derive(Debug, Clone, Copy)]
pub struct TrackerConfig {
    pub journal_capacity: usize,
    pub idle_timeout: Duration,
    pub notice_timeout: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            journal_capacity: crate::journal::DEFAULT_CAPACITY,
            idle_timeout: Duration::from_secs(4),
            notice_timeout: Duration::from_secs(5),
        }
    }
}

/// Derived state of one session.
///
/// Pure: time comes in as arguments, so callers decide how deadlines are
/// waited on.
#[derive(Debug)]
pub struct Tracker {
    reassembler: Reassembler,
    lifecycle: DeviceLifecycle,
    journal: AlertJournal,
    sound_enabled: bool,
    notice: Option<Notice>,
    notice_deadline: Option<Instant>,
    notice_timeout: Duration,
}

impl Tracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            reassembler: Reassembler::new(),
            lifecycle: DeviceLifecycle::new(config.idle_timeout),
            journal: AlertJournal::new(config.journal_capacity),
            // the receiver boots with sound on
            sound_enabled: true,
            notice: None,
            notice_deadline: None,
            notice_timeout: config.notice_timeout,
        }
    }

    /// Apply one event. The event itself is always the first update.
    pub fn apply(
        &mut self,
        event: TelemetryEvent,
        now: Instant,
        timestamp: jiff::Timestamp,
    ) -> Vec<MonitorUpdate> {
        let mut derived = Vec::new();
        let mut counters_changed = false;

        let outcome = self.reassembler.feed(&event);
        log_outcome(&outcome);

        if event.is_reception_error() || outcome.counts_as_unrecognized() {
            self.journal.count_unrecognized();
            counters_changed = true;
        }

        match &event {
            TelemetryEvent::MessageReceived { text } => match self.journal.record(text, timestamp)
            {
                Ok(recorded) => {
                    info!(id = %recorded.entry.id, text = %recorded.entry.text, "Alert recorded");
                    if let Some(evicted) = recorded.evicted {
                        info!(id = %evicted.id, acknowledged = evicted.acknowledged, "Oldest alert evicted");
                        derived.push(MonitorUpdate::AlertEvicted(evicted.id));
                    }
                    derived.push(MonitorUpdate::AlertRecorded(recorded.entry));
                    counters_changed = true;
                    self.set_notice(
                        NoticeKind::MessageReceived,
                        format!("Message received: {text}"),
                        now,
                        &mut derived,
                    );
                }
                Err(e) => warn!(error = %e, "Completed message not recorded"),
            },
            TelemetryEvent::MessageEmptyError => self.set_notice(
                NoticeKind::EmptyMessage,
                "Empty message received".to_owned(),
                now,
                &mut derived,
            ),
            TelemetryEvent::OutOfSequence { code } => self.set_notice(
                NoticeKind::OutOfSequence,
                format!("Out of sequence signal {code}"),
                now,
                &mut derived,
            ),
            TelemetryEvent::UidScanned { .. } => {
                self.journal.count_card_scanned();
                counters_changed = true;
            }
            TelemetryEvent::UidAuthorized { .. } => {
                self.journal.count_card_authorized();
                counters_changed = true;
            }
            TelemetryEvent::SoundEnabled => {
                self.sound_enabled = true;
                derived.push(MonitorUpdate::Sound { enabled: true });
            }
            TelemetryEvent::SoundDisabled => {
                self.sound_enabled = false;
                derived.push(MonitorUpdate::Sound { enabled: false });
            }
            _ => {}
        }

        if let Some(change) = self.lifecycle.on_event(&event, now) {
            debug!(phase = ?change.phase, "Device phase changed");
            derived.push(MonitorUpdate::Phase(change));
        }

        if counters_changed {
            derived.push(MonitorUpdate::Counters(self.journal.counters()));
        }

        let mut updates = Vec::with_capacity(derived.len() + 1);
        updates.push(MonitorUpdate::Event(event));
        updates.extend(derived);
        updates
    }

    /// Fire every deadline that has passed.
    pub fn expire(&mut self, now: Instant) -> Vec<MonitorUpdate> {
        let mut updates = Vec::new();

        if let Some(change) = self.lifecycle.expire(now) {
            debug!("Device back to idle");
            updates.push(MonitorUpdate::Phase(change));
        }

        if self.notice_deadline.is_some_and(|deadline| now >= deadline) {
            self.notice_deadline = None;
            self.notice = None;
            updates.push(MonitorUpdate::Notice(None));
        }

        updates
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.lifecycle.deadline(), self.notice_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn acknowledge(&mut self, id: AlertId) -> Acknowledgement {
        self.journal.acknowledge(id)
    }

    pub fn journal(&self) -> &AlertJournal {
        &self.journal
    }

    pub fn clear_journal(&mut self) -> usize {
        self.journal.clear()
    }

    pub fn phase(&self) -> DevicePhase {
        self.lifecycle.phase()
    }

    pub fn sound_enabled(&self) -> bool {
        self.sound_enabled
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        MonitorSnapshot {
            phase: self.lifecycle.phase(),
            sound_enabled: self.sound_enabled,
            counters: self.journal.counters(),
            unacknowledged: self.journal.unacknowledged_count(),
            journal_len: self.journal.len(),
            journal_capacity: self.journal.capacity(),
            notice: self.notice.clone(),
            reassembling: self.reassembler.is_open(),
        }
    }

    // a new notice replaces the pending one and re-arms its deadline
    fn set_notice(
        &mut self,
        kind: NoticeKind,
        text: String,
        now: Instant,
        updates: &mut Vec<MonitorUpdate>,
    ) {
        let notice = Notice {
            kind,
            text: text.into(),
        };
        self.notice = Some(notice.clone());
        self.notice_deadline = Some(now + self.notice_timeout);
        updates.push(MonitorUpdate::Notice(Some(notice)));
    }
}

impl Default for Tracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

fn log_outcome(outcome: &Outcome) {
    match outcome {
        Outcome::Started { expected_length } => {
            debug!(expected_length, "Reassembly started");
        }
        Outcome::Restarted {
            expected_length,
            dropped_fragments,
        } => {
            debug!(expected_length, dropped_fragments, "Reassembly restarted");
        }
        Outcome::Completed(message) if !message.is_consistent() => {
            warn!(
                text = %message.text,
                reassembled = %message.reassembled,
                expected_length = message.expected_length,
                fragments = message.fragments,
                "Reassembled text disagrees with the device"
            );
        }
        Outcome::Completed(message) => {
            debug!(
                fragments = message.fragments,
                progress_complete = message.progress_complete,
                "Reassembly complete"
            );
        }
        Outcome::Fragment {
            index,
            added_chars: 0,
        } => {
            debug!(index, "Fragment carried no text");
        }
        Outcome::Discarded(reason) => {
            warn!(?reason, "Partial message discarded");
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wave_core::protocol::{PacketCode, classify};
    use wave_core::{AlertId, Counters};

    fn ts() -> jiff::Timestamp {
        jiff::Timestamp::UNIX_EPOCH
    }

    fn feed(tracker: &mut Tracker, line: &str, now: Instant) -> Vec<MonitorUpdate> {
        tracker.apply(classify(line), now, ts())
    }

    #[test]
    fn message_line_records_alert() {
        let mut tracker = Tracker::default();
        let now = Instant::now();
        let updates = feed(&mut tracker, "✅ MESSAGE PERSONNALISÉ REÇU: 'Evacuate now'", now);

        assert_eq!(
            updates[0],
            MonitorUpdate::Event(TelemetryEvent::MessageReceived {
                text: "Evacuate now".into()
            })
        );
        assert!(updates.iter().any(|u| matches!(
            u,
            MonitorUpdate::AlertRecorded(entry) if entry.id == AlertId(1) && &*entry.text == "Evacuate now"
        )));
        assert_eq!(tracker.journal().len(), 1);
        assert_eq!(tracker.journal().counters().messages_received, 1);
        assert_eq!(tracker.snapshot().unacknowledged, 1);
        assert_eq!(tracker.snapshot().journal_capacity, 500);
    }

    #[test]
    fn empty_message_counts_as_unrecognized() {
        let mut tracker = Tracker::default();
        let updates = feed(&mut tracker, "✅ MESSAGE PERSONNALISÉ REÇU: ''", Instant::now());

        assert_eq!(
            updates[0],
            MonitorUpdate::Event(TelemetryEvent::MessageEmptyError)
        );
        assert_eq!(tracker.journal().len(), 0);
        assert_eq!(
            tracker.journal().counters(),
            Counters {
                unrecognized: 1,
                ..Counters::default()
            }
        );
    }

    #[test]
    fn out_of_sequence_during_reassembly() {
        let mut tracker = Tracker::default();
        let now = Instant::now();
        feed(&mut tracker, "DEBUG: Début de message - Longueur attendue: 12", now);
        feed(&mut tracker, "DEBUG: Paquet 1 reçu: 0x457661", now);
        assert!(tracker.snapshot().reassembling);

        let updates = feed(&mut tracker, "DEBUG: Signal hors séquence: 0x1A2B3C4D", now);
        assert_eq!(
            updates[0],
            MonitorUpdate::Event(TelemetryEvent::OutOfSequence {
                code: PacketCode(0x1A2B_3C4D)
            })
        );

        let snapshot = tracker.snapshot();
        assert!(!snapshot.reassembling);
        assert_eq!(snapshot.counters.unrecognized, 1);
        assert_eq!(snapshot.journal_len, 0);
        assert_eq!(
            snapshot.notice.map(|n| n.kind),
            Some(NoticeKind::OutOfSequence)
        );
    }

    #[test]
    fn index_regression_counts_once() {
        let mut tracker = Tracker::default();
        let now = Instant::now();
        feed(&mut tracker, "DEBUG: Début de message - Longueur attendue: 9", now);
        feed(&mut tracker, "DEBUG: Paquet 2 reçu: 0x1414243", now);
        feed(&mut tracker, "DEBUG: Paquet 1 reçu: 0x444546", now);

        assert_eq!(tracker.journal().counters().unrecognized, 1);
        assert!(!tracker.snapshot().reassembling);
    }

    #[test]
    fn full_transcript() {
        let mut tracker = Tracker::default();
        let now = Instant::now();
        let lines = [
            "DEBUG: Signal détecté !",
            "DEBUG: Début de message - Longueur attendue: 4",
            "DEBUG: Paquet 1 reçu: 0x466972",
            "  Buffer actuel: 'Fir' (3/4 chars)",
            "DEBUG: Paquet 2 reçu: 0x1650000",
            "  Buffer actuel: 'Fire' (4/4 chars)",
            "✅ MESSAGE PERSONNALISÉ REÇU: 'Fire' (4 caractères)",
            "🚨 ALERTE NUCLÉAIRE ACTIVÉE !",
            "DEBUG: Buffer réinitialisé",
        ];
        for line in lines {
            feed(&mut tracker, line, now);
        }

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.journal_len, 1);
        assert_eq!(snapshot.counters.messages_received, 1);
        assert_eq!(snapshot.counters.unrecognized, 0);
        assert!(!snapshot.reassembling);
    }

    #[test]
    fn sound_follows_device_echo() {
        let mut tracker = Tracker::default();
        assert!(tracker.sound_enabled());

        let updates = feed(&mut tracker, "🔇 SON DÉSACTIVÉ - Alertes silencieuses", Instant::now());
        assert!(!tracker.sound_enabled());
        assert!(updates.contains(&MonitorUpdate::Sound { enabled: false }));
    }

    #[test]
    fn transmitter_counters() {
        let mut tracker = Tracker::default();
        let now = Instant::now();
        feed(&mut tracker, "UID scanné : 04 A3 2B 1C", now);
        feed(&mut tracker, "DEBUG: UID AUTORISÉ - Envoi de 'Evacuate now'", now);
        feed(&mut tracker, "UID scanné : 11 22 33 44", now);
        feed(&mut tracker, "DEBUG: UID NON AUTORISÉ - Aucune transmission", now);

        let counters = tracker.journal().counters();
        assert_eq!(counters.cards_scanned, 2);
        assert_eq!(counters.cards_authorized, 1);
        assert_eq!(tracker.phase(), DevicePhase::Denied);
    }

    #[test]
    fn deadlines_expire_independently() {
        let mut tracker = Tracker::default();
        let t0 = Instant::now();
        feed(&mut tracker, "DEBUG: Carte détectée !", t0);
        feed(&mut tracker, "✅ MESSAGE PERSONNALISÉ REÇU: ''", t0);

        assert_eq!(tracker.next_deadline(), Some(t0 + Duration::from_secs(4)));

        let updates = tracker.expire(t0 + Duration::from_secs(4));
        assert_eq!(updates.len(), 1);
        assert_eq!(tracker.phase(), DevicePhase::Idle);
        assert_eq!(tracker.next_deadline(), Some(t0 + Duration::from_secs(5)));

        let updates = tracker.expire(t0 + Duration::from_secs(5));
        assert_eq!(updates, vec![MonitorUpdate::Notice(None)]);
        assert_eq!(tracker.next_deadline(), None);
        assert!(tracker.snapshot().notice.is_none());
    }

    #[test]
    fn new_notice_rearms_timer() {
        let mut tracker = Tracker::default();
        let t0 = Instant::now();
        feed(&mut tracker, "✅ MESSAGE PERSONNALISÉ REÇU: ''", t0);

        let t1 = t0 + Duration::from_secs(3);
        feed(&mut tracker, "✅ MESSAGE PERSONNALISÉ REÇU: 'Evacuate now'", t1);

        assert!(tracker.expire(t0 + Duration::from_secs(5)).is_empty());
        assert_eq!(
            tracker.snapshot().notice.map(|n| n.kind),
            Some(NoticeKind::MessageReceived)
        );
        assert_eq!(
            tracker.expire(t1 + Duration::from_secs(5)),
            vec![MonitorUpdate::Notice(None)]
        );
    }
}
