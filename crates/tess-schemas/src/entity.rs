use std::fmt;

use serde::{Deserialize, Serialize};

use crate::TemporalError;

/// Immutable hardware identifier of a photometer.
///
/// TESS-W firmware reports MAC strings without zero padding
/// (`"5C:CF:7F:76:6:DB"`). Parsing accepts six colon-separated groups of one or
/// two hex digits and stores the canonical upper-case padded form
/// (`"5C:CF:7F:76:06:DB"`), so ids coming from different stores compare equal.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId(String);

impl EntityId {
    pub fn parse(raw: &str) -> Result<Self, TemporalError> {
        let invalid = || TemporalError::InvalidEntityId {
            raw: raw.to_string(),
        };

        let groups: Vec<&str> = raw.trim().split(':').collect();
        if groups.len() != 6 {
            return Err(invalid());
        }

        let mut out = Vec::with_capacity(6);
        for g in groups {
            if g.is_empty() || g.len() > 2 || !g.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            let byte = u8::from_str_radix(g, 16).map_err(|_| invalid())?;
            out.push(format!("{byte:02X}"));
        }

        Ok(Self(out.join(":")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `true` when `raw` is already in canonical 17-char padded form.
    pub fn is_strict_mac(raw: &str) -> bool {
        raw.len() == 17 && Self::parse(raw).is_ok()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for EntityId {
    type Error = TemporalError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<EntityId> for String {
    fn from(value: EntityId) -> Self {
        value.0
    }
}

impl std::str::FromStr for EntityId {
    type Err = TemporalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
