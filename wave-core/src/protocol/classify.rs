//! Line classification.
//!
//! Firmware lines are matched against an ordered rule table. Specific
//! patterns come before the generic ones they overlap with (`UID NON
//! AUTORISÉ` before `UID AUTORISÉ`, `Longueur incorrecte` before
//! `Longueur :`), and the first rule whose markers match wins. When a rule
//! matches but its payload cannot be extracted, the line degrades to the
//! generic fallback instead of failing.
//!
//! Markers are only searched for in the line header, the text before the
//! first quoted payload. Payloads carry user-set messages and must never
//! change what kind of line they sit in.

use super::{PacketCode, TelemetryEvent};

type Extract = fn(rest: &str) -> Option<TelemetryEvent>;

#[derive(Debug, Clone, Copy)]
pub enum Matcher {
    /// Line contains the marker anywhere.
    Contains(&'static str),
    /// Line contains any of the markers.
    Any(&'static [&'static str]),
    /// Line contains every marker. The first one anchors extraction.
    All(&'static [&'static str]),
    /// Line starts with the marker.
    Prefix(&'static str),
}

impl Matcher {
    /// Returns the text following the matched marker.
    fn matches<'a>(&self, line: &'a str) -> Option<&'a str> {
        let head = header(line);
        match *self {
            Matcher::Contains(marker) => after(line, head, marker),
            Matcher::Any(markers) => markers.iter().find_map(|m| after(line, head, m)),
            Matcher::All(markers) => {
                if markers.iter().all(|m| head.contains(m)) {
                    markers.first().and_then(|m| after(line, head, m))
                } else {
                    None
                }
            }
            Matcher::Prefix(marker) => {
                if head.starts_with(marker) {
                    line.strip_prefix(marker)
                } else {
                    None
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub name: &'static str,
    pub matcher: Matcher,
    extract: Extract,
}

macro_rules! rule {
    ($name:literal, $matcher:expr, $extract:expr) => {
        Rule {
            name: $name,
            matcher: $matcher,
            extract: $extract,
        }
    };
}

/// Rules in evaluation order.
pub const RULES: &[Rule] = &[
    rule!(
        "message_received",
        Matcher::Contains("MESSAGE PERSONNALISÉ REÇU:"),
        |rest| {
            quoted(rest).map(|text| match text {
                "" => TelemetryEvent::MessageEmptyError,
                text => TelemetryEvent::MessageReceived { text: text.into() },
            })
        }
    ),
    rule!(
        "alert_stopped",
        Matcher::Contains("ALERTE ARRÊTÉE"),
        |_| Some(TelemetryEvent::AlertStopped)
    ),
    rule!("message_read", Matcher::Contains("Message lu:"), |rest| {
        Some(TelemetryEvent::MessageRead {
            text: quoted(rest).map(Into::into),
        })
    }),
    rule!(
        "new_alert",
        Matcher::Any(&["NOUVELLE ALERTE ACTIVÉE", "ALERTE NUCLÉAIRE ACTIVÉE"]),
        |_| Some(TelemetryEvent::NewAlertActivated)
    ),
    rule!("command_echoed", Matcher::Contains("Commande reçue:"), |rest| {
        quoted(rest).map(|raw| TelemetryEvent::CommandEchoed { raw: raw.into() })
    }),
    rule!(
        "unknown_command",
        Matcher::Contains("Commande inconnue:"),
        |rest| quoted(rest).map(|raw| TelemetryEvent::UnknownCommand { raw: raw.into() })
    ),
    rule!(
        "no_active_alert",
        Matcher::Contains("Aucune alerte active"),
        |_| Some(TelemetryEvent::NoActiveAlert)
    ),
    rule!(
        "sound_disabled",
        Matcher::Contains("🔇 SON DÉSACTIVÉ"),
        |_| Some(TelemetryEvent::SoundDisabled)
    ),
    rule!(
        "sound_enabled",
        Matcher::Contains("🔊 SON ACTIVÉ"),
        |_| Some(TelemetryEvent::SoundEnabled)
    ),
    rule!(
        "message_started",
        Matcher::Contains("Début de message - Longueur attendue:"),
        |rest| {
            leading_u32(rest).map(|expected_len| TelemetryEvent::MessageStarted { expected_len })
        }
    ),
    rule!(
        "packet_sent",
        Matcher::All(&["DEBUG: Paquet ", " - Code: "]),
        |rest| {
            let (position, code) = rest.split_once(" - Code: ")?;
            let (index, total) = position.trim().split_once('/')?;
            Some(TelemetryEvent::PacketReceived {
                index: index.trim().parse().ok()?,
                total: Some(total.trim().parse().ok()?),
                code: first_token(code)?.parse().ok()?,
            })
        }
    ),
    rule!(
        "packet_received",
        Matcher::All(&["DEBUG: Paquet ", " reçu: "]),
        |rest| {
            let (index, code) = rest.split_once(" reçu: ")?;
            Some(TelemetryEvent::PacketReceived {
                index: index.trim().parse().ok()?,
                total: None,
                code: first_token(code)?.parse().ok()?,
            })
        }
    ),
    rule!("buffer_progress", Matcher::Contains("Buffer actuel:"), |rest| {
        let partial = quoted(rest)?;
        let close = rest.rfind('\'')?;
        let counts = rest[close + 1..].trim().strip_prefix('(')?;
        let (current, total) = counts.split_once('/')?;
        Some(TelemetryEvent::BufferProgress {
            partial: partial.into(),
            current: current.trim().parse().ok()?,
            total: leading_u32(total)?,
        })
    }),
    rule!(
        "authorized_card",
        Matcher::Contains("CARTE AUTORISÉE DÉTECTÉE"),
        |_| Some(TelemetryEvent::AuthorizedCardDetected)
    ),
    rule!(
        "out_of_sequence",
        Matcher::Contains("Signal hors séquence:"),
        |rest| {
            let code: PacketCode = first_token(rest)?.parse().ok()?;
            Some(TelemetryEvent::OutOfSequence { code })
        }
    ),
    rule!(
        "buffer_reset",
        Matcher::Contains("Buffer réinitialisé"),
        |_| Some(TelemetryEvent::BufferReset)
    ),
    rule!(
        "uid_unauthorized",
        Matcher::Contains("UID NON AUTORISÉ"),
        |_| Some(TelemetryEvent::UidUnauthorized)
    ),
    rule!("uid_authorized", Matcher::Contains("UID AUTORISÉ"), |rest| {
        Some(TelemetryEvent::UidAuthorized {
            message: quoted(rest).map(Into::into),
        })
    }),
    rule!("uid_scanned", Matcher::Contains("UID scanné :"), |rest| {
        match rest.trim() {
            "" => None,
            uid => Some(TelemetryEvent::UidScanned { uid: uid.into() }),
        }
    }),
    rule!(
        "card_detected",
        Matcher::Contains("Carte détectée"),
        |_| Some(TelemetryEvent::CardDetected)
    ),
    rule!(
        "start_code_sent",
        Matcher::Contains("Envoi code de début:"),
        |rest| {
            let code = first_token(rest)?.parse().ok()?;
            Some(TelemetryEvent::StartCodeSent { code })
        }
    ),
    rule!("end_code_sent", Matcher::Contains("Envoi code de fin:"), |rest| {
        let code = first_token(rest)?.parse().ok()?;
        Some(TelemetryEvent::EndCodeSent { code })
    }),
    rule!(
        "transmission_completed",
        Matcher::Contains("Transmission terminée avec succès"),
        |_| Some(TelemetryEvent::TransmissionCompleted)
    ),
    rule!(
        "transmission_started",
        Matcher::Contains("Envoi du message personnalisé:"),
        |rest| {
            let text = quoted(rest)?;
            let close = rest.rfind('\'')?;
            let length = rest[close + 1..]
                .trim()
                .strip_prefix('(')
                .and_then(leading_u32);
            Some(TelemetryEvent::TransmissionStarted {
                text: text.into(),
                length,
            })
        }
    ),
    rule!(
        "rfid_closed",
        Matcher::Contains("Communication RFID fermée"),
        |_| Some(TelemetryEvent::RfidSessionClosed)
    ),
    rule!(
        "message_defined",
        Matcher::Contains("Nouveau message défini:"),
        |rest| quoted(rest).map(|text| TelemetryEvent::MessageDefined { text: text.into() })
    ),
    rule!("current_message", Matcher::Contains("Message actuel:"), |rest| {
        quoted(rest).map(|text| TelemetryEvent::CurrentMessage { text: text.into() })
    }),
    rule!(
        "signal_detected",
        Matcher::Contains("Signal détecté"),
        |_| Some(TelemetryEvent::SignalDetected)
    ),
    rule!("raw_code", Matcher::Contains("Code brut reçu :"), |rest| {
        match rest.trim() {
            "" => None,
            code => Some(TelemetryEvent::RawCodeReceived { code: code.into() }),
        }
    }),
    rule!(
        "length_mismatch",
        Matcher::Contains("Longueur incorrecte"),
        |rest| {
            let details = rest.trim().trim_start_matches(':').trim();
            Some(TelemetryEvent::LengthMismatch {
                details: details.into(),
            })
        }
    ),
    rule!("length_report", Matcher::Contains("Longueur :"), |rest| {
        leading_u32(rest).map(|n| TelemetryEvent::LengthReport { n })
    }),
    rule!("protocol_report", Matcher::Contains("Protocole :"), |rest| {
        match rest.trim() {
            "" => None,
            name => Some(TelemetryEvent::ProtocolReport { name: name.into() }),
        }
    }),
    rule!(
        "valid_code",
        Matcher::Contains("Code valide détecté"),
        |_| Some(TelemetryEvent::ValidCodeDetected)
    ),
    rule!(
        "signal_rejected",
        Matcher::Contains("Signal rejeté"),
        |_| Some(TelemetryEvent::SignalRejected)
    ),
    rule!(
        "noise",
        Matcher::Contains("Code = 0"),
        |_| Some(TelemetryEvent::NoiseDetected)
    ),
    rule!("debug", Matcher::Prefix("DEBUG:"), |rest| {
        Some(TelemetryEvent::DebugGeneric {
            text: rest.trim().into(),
        })
    }),
];

/// Map one line of device output to a [`TelemetryEvent`].
///
/// Total: every input yields an event, at worst `Unrecognized`. Leading and
/// trailing whitespace is ignored.
pub fn classify(line: &str) -> TelemetryEvent {
    let line = line.trim();

    for rule in RULES {
        if let Some(rest) = rule.matcher.matches(line) {
            return (rule.extract)(rest).unwrap_or_else(|| fallback(line));
        }
    }

    fallback(line)
}

/// Name of the rule that claims `line`, if any.
pub fn matching_rule(line: &str) -> Option<&'static str> {
    let line = line.trim();
    RULES
        .iter()
        .find(|rule| rule.matcher.matches(line).is_some())
        .map(|rule| rule.name)
}

fn fallback(line: &str) -> TelemetryEvent {
    match line.strip_prefix("DEBUG:") {
        Some(rest) => TelemetryEvent::DebugGeneric {
            text: rest.trim().into(),
        },
        None => TelemetryEvent::Unrecognized {
            raw_line: line.into(),
        },
    }
}

/// Everything before the opening quote of a payload.
///
/// A payload opens with a quote preceded by a space; elisions such as
/// `l'UID` belong to the header.
fn header(line: &str) -> &str {
    line.find(" '").map_or(line, |at| &line[..at])
}

/// Text after `marker`, which must sit inside `head`, a prefix of `line`.
fn after<'a>(line: &'a str, head: &str, marker: &str) -> Option<&'a str> {
    head.find(marker).map(|at| &line[at + marker.len()..])
}

/// Text between the first and the last single quote.
///
/// Messages may themselves contain quotes; the firmware always closes the
/// payload with the last quote on the line.
fn quoted(s: &str) -> Option<&str> {
    let open = s.find('\'')?;
    let close = s.rfind('\'')?;
    (close > open).then(|| &s[open + 1..close])
}

fn leading_u32(s: &str) -> Option<u32> {
    let s = s.trim_start();
    let end = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map_or(s.len(), |(i, _)| i);
    s[..end].parse().ok()
}

fn first_token(s: &str) -> Option<&str> {
    s.split_whitespace().next()
}
