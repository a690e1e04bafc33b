//! Default registry key.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Opaque identity of a tracked entity.
///
/// Registries are generic over their key type; this is the stock choice for
/// entities that do not bring their own identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityUid(Uuid);

impl EntityUid {
    /// A fresh, time-ordered (UUIDv7) identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// The all-zero identifier, used for not-yet-keyed default values.
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EntityUid {
    fn default() -> Self {
        Self::nil()
    }
}

impl core::fmt::Display for EntityUid {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for EntityUid {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<EntityUid> for Uuid {
    fn from(value: EntityUid) -> Self {
        value.0
    }
}

impl FromStr for EntityUid {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::from_str(s)
            .map(Self)
            .map_err(|e| DomainError::invalid_id(format!("EntityUid: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_its_own_display_form() {
        let uid = EntityUid::new();
        let parsed: EntityUid = uid.to_string().parse().unwrap();
        assert_eq!(uid, parsed);
    }

    #[test]
    fn rejects_garbage() {
        let err = "not-a-uuid".parse::<EntityUid>().unwrap_err();
        assert!(matches!(err, DomainError::InvalidId(msg) if msg.starts_with("EntityUid")));
    }

    #[test]
    fn default_is_nil() {
        assert!(EntityUid::default().is_nil());
        assert!(!EntityUid::new().is_nil());
    }
}
