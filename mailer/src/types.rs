//! Event types for camera notifications.
//!
//! An [`Event`] is produced once per recognised sensor token (or once per
//! single-shot run) and consumed by the debounce gate and the notifier.

use std::fmt;

use chrono::{DateTime, Utc};

/// Semantic alert reported by the camera's sensor feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    Motion,
    Sound,
    Human,
    BabyCry,
}

impl EventKind {
    /// All event kinds, in feed table order.
    pub const ALL: [EventKind; 4] = [
        EventKind::Motion,
        EventKind::Sound,
        EventKind::Human,
        EventKind::BabyCry,
    ];

    /// Label written into the `Event Type:` line of the message body.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Motion => "Motion",
            Self::Sound => "Sound",
            Self::Human => "Human",
            Self::BabyCry => "Baby",
        }
    }

    /// Initial letter used to disable this kind in configuration.
    #[must_use]
    pub fn skip_letter(self) -> char {
        match self {
            Self::Motion => 'm',
            Self::Sound => 's',
            Self::Human => 'h',
            Self::BabyCry => 'b',
        }
    }

    /// Looks up the kind disabled by a configuration letter.
    #[must_use]
    pub fn from_skip_letter(letter: char) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.skip_letter() == letter.to_ascii_lowercase())
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A classified sensor event.
///
/// Immutable once created; `observed_at` is the wall-clock time at which the
/// feed line was read, before any configured clock offset is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    /// What the sensor reported.
    pub kind: EventKind,

    /// When the feed line was read.
    pub observed_at: DateTime<Utc>,
}

impl Event {
    /// Creates an event observed at the given instant.
    #[must_use]
    pub fn new(kind: EventKind, observed_at: DateTime<Utc>) -> Self {
        Self { kind, observed_at }
    }
}
