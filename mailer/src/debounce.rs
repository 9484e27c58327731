//! Cooldown gate for accepted events.
//!
//! A single window applies across every event kind: accepting any kind
//! pushes `next_allowed_at` forward for all of them. Kinds that are not
//! enabled never consult or advance the window.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, trace};

use crate::types::{Event, EventKind};

/// Default cooldown between notifications (10 minutes).
pub const DEFAULT_COOLDOWN_SECS: u64 = 600;

/// Set of event kinds that may trigger a notification.
///
/// Built once from configuration and not changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnabledEvents {
    kinds: HashSet<EventKind>,
}

impl EnabledEvents {
    /// Every kind enabled.
    #[must_use]
    pub fn all() -> Self {
        Self {
            kinds: EventKind::ALL.into_iter().collect(),
        }
    }

    /// Enables every kind except those named by initial letter in `skip`
    /// (`m`otion, `s`ound, `h`uman, `b`aby). Unknown letters are ignored.
    #[must_use]
    pub fn from_skip_letters(skip: &str) -> Self {
        let mut enabled = Self::all();
        for kind in skip.chars().filter_map(EventKind::from_skip_letter) {
            enabled.kinds.remove(&kind);
        }
        enabled
    }

    #[must_use]
    pub fn contains(&self, kind: EventKind) -> bool {
        self.kinds.contains(&kind)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

impl Default for EnabledEvents {
    fn default() -> Self {
        Self::all()
    }
}

impl FromIterator<EventKind> for EnabledEvents {
    fn from_iter<I: IntoIterator<Item = EventKind>>(iter: I) -> Self {
        Self {
            kinds: iter.into_iter().collect(),
        }
    }
}

/// Mutable debounce state, owned by the notifier for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceState {
    /// Events observed strictly before this instant are suppressed.
    pub next_allowed_at: DateTime<Utc>,
}

impl Default for DebounceState {
    fn default() -> Self {
        Self {
            next_allowed_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

/// Decides whether an event is sent or suppressed.
#[derive(Debug, Clone)]
pub struct DebounceGate {
    cooldown: TimeDelta,
    enabled: EnabledEvents,
    state: DebounceState,
}

impl DebounceGate {
    /// Creates a gate with a fresh state, so the first enabled event is
    /// always accepted.
    #[must_use]
    pub fn new(cooldown: Duration, enabled: EnabledEvents) -> Self {
        Self {
            cooldown: TimeDelta::from_std(cooldown).unwrap_or(TimeDelta::MAX),
            enabled,
            state: DebounceState::default(),
        }
    }

    /// Returns `true` when the event should be notified, advancing the
    /// window to `observed_at + cooldown`.
    ///
    /// Disabled kinds return `false` without touching the state. The
    /// boundary is closed on the accept side: an event observed exactly at
    /// `next_allowed_at` is accepted.
    pub fn should_notify(&mut self, event: &Event) -> bool {
        should_notify(
            event.kind,
            event.observed_at,
            &mut self.state,
            &self.enabled,
            self.cooldown,
        )
    }

    #[must_use]
    pub fn state(&self) -> DebounceState {
        self.state
    }
}

/// Free-function form of [`DebounceGate::should_notify`] over explicit state.
pub fn should_notify(
    kind: EventKind,
    now: DateTime<Utc>,
    state: &mut DebounceState,
    enabled: &EnabledEvents,
    cooldown: TimeDelta,
) -> bool {
    if !enabled.contains(kind) {
        trace!(kind = %kind, "Event kind disabled");
        return false;
    }

    if now < state.next_allowed_at {
        debug!(
            kind = %kind,
            next_allowed_at = %state.next_allowed_at,
            "Event suppressed by cooldown"
        );
        return false;
    }

    state.next_allowed_at = now
        .checked_add_signed(cooldown)
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    true
}
