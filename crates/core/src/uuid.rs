//! Canonical identifiers and sharded archive paths.
//!
//! Session and evidence identifiers are UUIDv4 values carried in a *canonical* text form:
//! **32 lowercase hexadecimal characters**, no hyphens (`Uuid::simple()`), e.g.
//! `550e8400e29b41d4a716446655440000`.
//!
//! Externally supplied identifiers (CLI arguments, archived JSON) must already be canonical;
//! uppercase or hyphenated forms are rejected rather than normalised, so that the same case
//! never maps to two archive directories.
//!
//! ## Sharded directory layout
//! For a canonical id `u`, archives live under `parent_dir/<u[0..2]>/<u[2..4]>/<u>/`, which
//! keeps directory fan-out small when many sessions are archived.

use crate::{SessionError, SessionResult};
use std::path::{Path, PathBuf};
use std::{fmt, str::FromStr};

pub(crate) use ::uuid::Uuid;

/// Returns true if `input` is in canonical form (32 lowercase hex characters).
pub fn is_canonical(input: &str) -> bool {
    input.len() == 32
        && input
            .bytes()
            .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

fn parse_canonical(kind: &str, input: &str) -> SessionResult<Uuid> {
    if is_canonical(input) {
        return Uuid::parse_str(input).map_err(|e| {
            SessionError::InvalidInput(format!("{} '{}' is not a valid UUID: {}", kind, input, e))
        });
    }
    Err(SessionError::InvalidInput(format!(
        "{} must be 32 lowercase hex characters without hyphens, got: '{}'",
        kind, input
    )))
}

macro_rules! canonical_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a fresh random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Validates an identifier that must already be canonical.
            ///
            /// # Errors
            ///
            /// Returns [`SessionError::InvalidInput`] if `input` is not canonical.
            pub fn parse(input: &str) -> SessionResult<Self> {
                parse_canonical($kind, input).map(Self)
            }

            /// Returns the underlying UUID.
            pub fn uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0.simple())
            }
        }

        impl FromStr for $name {
            type Err = SessionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.collect_str(self)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Self::parse(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

canonical_id!(
    /// Identifier of one diagnostic session (and of its Patient Record).
    CaseId,
    "case id"
);

canonical_id!(
    /// Identifier of one recorded evidence item.
    EvidenceId,
    "evidence id"
);

impl CaseId {
    /// Returns `parent_dir/<s1>/<s2>/<id>/` where `s1`/`s2` are the first two pairs of hex
    /// characters of the canonical id.
    pub fn sharded_dir(&self, parent_dir: &Path) -> PathBuf {
        let canonical = self.0.simple().to_string();
        let s1 = &canonical[0..2];
        let s2 = &canonical[2..4];
        parent_dir.join(s1).join(s2).join(&canonical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_generates_canonical_ids() {
        let id = CaseId::new();
        let canonical = id.to_string();
        assert_eq!(canonical.len(), 32);
        assert!(is_canonical(&canonical));
        assert_eq!(CaseId::parse(&canonical).unwrap(), id);
    }

    #[test]
    fn parse_rejects_hyphenated_and_uppercase() {
        let err = CaseId::parse("550e8400-e29b-41d4-a716-446655440000").unwrap_err();
        match err {
            SessionError::InvalidInput(msg) => {
                assert!(msg.contains("32 lowercase hex characters"));
                assert!(msg.starts_with("case id"));
            }
            other => panic!("expected InvalidInput, got {other:?}"),
        }
        assert!(EvidenceId::parse("550E8400E29B41D4A716446655440000").is_err());
        assert!(EvidenceId::parse("").is_err());
    }

    #[test]
    fn sharded_dir_uses_first_four_hex_characters() {
        let id = CaseId::parse("550e8400e29b41d4a716446655440000").unwrap();
        let dir = id.sharded_dir(Path::new("/archive"));
        assert_eq!(
            dir,
            PathBuf::from("/archive/55/0e/550e8400e29b41d4a716446655440000")
        );
    }

    #[test]
    fn serde_uses_canonical_form() {
        let id = EvidenceId::parse("0123456789abcdef0123456789abcdef").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"0123456789abcdef0123456789abcdef\"");
        let back: EvidenceId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<EvidenceId>("\"not-an-id\"").is_err());
    }
}
