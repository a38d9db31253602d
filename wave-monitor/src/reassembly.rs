//! Packet reassembly.
//!
//! The receiver streams a message as a start code, a run of data codes and
//! an end code, printing one line for each. This module mirrors that buffer
//! on the host side. Completion is decided by the device's own "message
//! received" line only; the mirrored text is a diagnostic that is compared
//! against it, never a replacement for it.

use wave_core::protocol::{PacketCode, PacketKind};
use wave_core::TelemetryEvent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// 1-based, as printed by the firmware.
    pub index: u32,
    pub code: PacketCode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReassemblyBuffer {
    expected_length: u32,
    fragments: Vec<Fragment>,
    accumulated: String,
    /// Set once a progress line reports `current == total`.
    complete: bool,
}

impl ReassemblyBuffer {
    fn new(expected_length: u32) -> Self {
        Self {
            expected_length,
            fragments: Vec::new(),
            accumulated: String::new(),
            complete: false,
        }
    }

    pub fn expected_length(&self) -> u32 {
        self.expected_length
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    pub fn accumulated_text(&self) -> &str {
        &self.accumulated
    }

    fn last_index(&self) -> Option<u32> {
        self.fragments.last().map(|f| f.index)
    }

    /// Appends the characters of a new fragment, capped at the expected length.
    /// Start and end codes carry no text.
    fn decode(&mut self, code: PacketCode) -> usize {
        if !matches!(code.kind(), PacketKind::Data { .. }) {
            return 0;
        }

        let limit = self.expected_length as usize;
        let mut len = self.accumulated.chars().count();
        let mut added = 0;

        for c in code.payload_chars() {
            if len >= limit {
                break;
            }
            self.accumulated.push(c);
            len += 1;
            added += 1;
        }

        added
    }
}

/// A message confirmed by the device while a buffer was open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedMessage {
    pub text: Box<str>,
    pub expected_length: u32,
    pub fragments: usize,
    /// Text rebuilt from the fragment codes.
    pub reassembled: String,
    /// Whether a progress line reported the buffer full before completion.
    pub progress_complete: bool,
}

impl CompletedMessage {
    /// Whether the rebuilt text agrees with the authoritative one.
    pub fn is_consistent(&self) -> bool {
        *self.text == *self.reassembled
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    OutOfSequence,
    IndexRegression { last: u32, got: u32 },
    EmptyMessage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Started { expected_length: u32 },
    /// A start code arrived while a buffer was already open.
    Restarted {
        expected_length: u32,
        dropped_fragments: usize,
    },
    Fragment { index: u32, added_chars: usize },
    /// Same index as the previous fragment; the radio repeats codes.
    DuplicateFragment { index: u32 },
    Progress { current: u32, total: u32, complete: bool },
    Completed(CompletedMessage),
    Discarded(DiscardReason),
    Reset { was_open: bool },
    /// Nothing to do with reassembly, or no buffer open.
    PassThrough,
}

impl Outcome {
    /// Discards that the device did not already report as an error line.
    pub fn counts_as_unrecognized(&self) -> bool {
        matches!(
            self,
            Outcome::Discarded(DiscardReason::IndexRegression { .. })
        )
    }
}

/// Two-state reassembler: closed when `buffer` is `None`.
#[derive(Debug, Default)]
pub struct Reassembler {
    buffer: Option<ReassemblyBuffer>,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.buffer.is_some()
    }

    pub fn buffer(&self) -> Option<&ReassemblyBuffer> {
        self.buffer.as_ref()
    }

    /// Feed one classified event. Must be called in read order.
    pub fn feed(&mut self, event: &TelemetryEvent) -> Outcome {
        match event {
            TelemetryEvent::MessageStarted { expected_len } => {
                let previous = self.buffer.replace(ReassemblyBuffer::new(*expected_len));
                match previous {
                    Some(old) => Outcome::Restarted {
                        expected_length: *expected_len,
                        dropped_fragments: old.fragments.len(),
                    },
                    None => Outcome::Started {
                        expected_length: *expected_len,
                    },
                }
            }
            TelemetryEvent::BufferReset => Outcome::Reset {
                was_open: self.buffer.take().is_some(),
            },
            _ if self.buffer.is_some() => self.feed_open(event),
            _ => Outcome::PassThrough,
        }
    }

    fn feed_open(&mut self, event: &TelemetryEvent) -> Outcome {
        match event {
            TelemetryEvent::PacketReceived { index, code, .. } => match self
                .buffer
                .as_ref()
                .and_then(ReassemblyBuffer::last_index)
            {
                Some(last) if *index < last => {
                    self.buffer = None;
                    Outcome::Discarded(DiscardReason::IndexRegression { last, got: *index })
                }
                Some(last) if *index == last => Outcome::DuplicateFragment { index: *index },
                _ => {
                    let Some(buffer) = self.buffer.as_mut() else {
                        return Outcome::PassThrough;
                    };
                    buffer.fragments.push(Fragment {
                        index: *index,
                        code: *code,
                    });
                    Outcome::Fragment {
                        index: *index,
                        added_chars: buffer.decode(*code),
                    }
                }
            },
            TelemetryEvent::BufferProgress { current, total, .. } => {
                let complete = current == total;
                if let Some(buffer) = self.buffer.as_mut() {
                    buffer.complete |= complete;
                }
                Outcome::Progress {
                    current: *current,
                    total: *total,
                    complete,
                }
            }
            TelemetryEvent::OutOfSequence { .. } => {
                self.buffer = None;
                Outcome::Discarded(DiscardReason::OutOfSequence)
            }
            TelemetryEvent::MessageEmptyError => {
                self.buffer = None;
                Outcome::Discarded(DiscardReason::EmptyMessage)
            }
            TelemetryEvent::MessageReceived { text } => match self.buffer.take() {
                Some(buffer) => Outcome::Completed(CompletedMessage {
                    text: text.clone(),
                    expected_length: buffer.expected_length,
                    fragments: buffer.fragments.len(),
                    reassembled: buffer.accumulated,
                    progress_complete: buffer.complete,
                }),
                None => Outcome::PassThrough,
            },
            _ => Outcome::PassThrough,
        }
    }
}
