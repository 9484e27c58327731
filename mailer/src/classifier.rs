//! Sensor feed token classification.
//!
//! The camera's IPC multiplexer prints every message it relays as a line of
//! space-separated hex bytes. Four of those lines are alerts we care about;
//! everything else is ordinary telemetry and is ignored.

use crate::types::EventKind;

/// Width of every known token, in bytes (16 hex pairs, each followed by a space).
pub const TOKEN_LEN: usize = 48;

/// Known alert tokens, matched by exact byte equality.
const TOKEN_TABLE: [(&[u8; TOKEN_LEN], EventKind); 4] = [
    (
        b"01 00 00 00 02 00 00 00 7c 00 7c 00 00 00 00 00 ",
        EventKind::Motion,
    ),
    (
        b"04 00 00 00 02 00 00 00 04 60 04 60 00 00 00 00 ",
        EventKind::Sound,
    ),
    (
        b"01 00 00 00 02 00 00 00 f5 00 f5 00 00 00 00 00 ",
        EventKind::Human,
    ),
    (
        b"04 00 00 00 02 00 00 00 02 60 02 60 00 00 00 00 ",
        EventKind::BabyCry,
    ),
];

/// Maps one feed line to an event kind.
///
/// Returns `None` for anything that is not byte-for-byte one of the known
/// tokens, including lines that merely contain or prefix one.
#[must_use]
pub fn classify(token: &[u8]) -> Option<EventKind> {
    TOKEN_TABLE
        .iter()
        .find(|(pattern, _)| pattern.as_slice() == token)
        .map(|(_, kind)| *kind)
}

/// Returns the feed token that announces `kind`.
#[must_use]
pub fn token_for(kind: EventKind) -> &'static [u8] {
    TOKEN_TABLE
        .iter()
        .find(|(_, k)| *k == kind)
        .map(|(pattern, _)| pattern.as_slice())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_tokens_classify() {
        assert_eq!(
            classify(b"01 00 00 00 02 00 00 00 7c 00 7c 00 00 00 00 00 "),
            Some(EventKind::Motion)
        );
        assert_eq!(
            classify(b"04 00 00 00 02 00 00 00 04 60 04 60 00 00 00 00 "),
            Some(EventKind::Sound)
        );
        assert_eq!(
            classify(b"01 00 00 00 02 00 00 00 f5 00 f5 00 00 00 00 00 "),
            Some(EventKind::Human)
        );
        assert_eq!(
            classify(b"04 00 00 00 02 00 00 00 02 60 02 60 00 00 00 00 "),
            Some(EventKind::BabyCry)
        );
    }

    #[test]
    fn token_for_is_inverse_of_classify() {
        for kind in EventKind::ALL {
            let token = token_for(kind);
            assert_eq!(token.len(), TOKEN_LEN);
            assert_eq!(classify(token), Some(kind));
        }
    }

    #[test]
    fn trailing_space_is_significant() {
        assert_eq!(
            classify(b"01 00 00 00 02 00 00 00 7c 00 7c 00 00 00 00 00"),
            None
        );
    }

    #[test]
    fn prefix_and_suffix_matches_are_rejected() {
        let motion = token_for(EventKind::Motion);
        assert_eq!(classify(&motion[..TOKEN_LEN - 3]), None);

        let mut longer = motion.to_vec();
        longer.extend_from_slice(b"00 ");
        assert_eq!(classify(&longer), None);
    }

    #[test]
    fn telemetry_and_empty_lines_are_ignored() {
        assert_eq!(
            classify(b"02 00 00 00 02 00 00 00 7c 00 7c 00 00 00 00 00 "),
            None
        );
        assert_eq!(classify(b""), None);
        assert_eq!(classify(b"hello"), None);
    }

    #[test]
    fn matching_is_case_sensitive() {
        assert_eq!(
            classify(b"01 00 00 00 02 00 00 00 F5 00 F5 00 00 00 00 00 "),
            None
        );
    }
}
