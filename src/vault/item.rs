//! Vault item types and input validation.
//!
//! A `VaultItem` always holds its secret `value` as an envelope once it
//! has passed through the engine; `NewItem` and `ItemPatch` carry the
//! plaintext the caller typed and never leave process memory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::errors::{KeysafeError, Result};

/// Maximum length of a label or username, in characters.
const MAX_FIELD_LEN: usize = 256;

/// Maximum length of a secret value, in bytes (64 KiB).
const MAX_VALUE_LEN: usize = 64 * 1024;

/// Coarse password strength classification shown next to an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strength {
    Weak,
    Fair,
    Strong,
}

impl std::fmt::Display for Strength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Weak => "weak",
            Self::Fair => "fair",
            Self::Strong => "strong",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Strength {
    type Err = KeysafeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "weak" => Ok(Self::Weak),
            "fair" => Ok(Self::Fair),
            "strong" => Ok(Self::Strong),
            other => Err(KeysafeError::Validation(format!(
                "unknown strength '{other}' — expected weak, fair, or strong"
            ))),
        }
    }
}

/// A single credential held in the local collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultItem {
    /// Opaque unique id (UUID v4).
    pub id: String,

    /// Display name (e.g. "GitHub").
    pub label: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// The secret value as a `ks1:` envelope.
    pub value: String,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength: Option<Strength>,
}

/// Fields supplied by the caller when adding an item.
///
/// Deliberately not `Debug`: the value is plaintext.
#[derive(Clone)]
pub struct NewItem {
    pub label: String,
    pub username: Option<String>,
    pub value: Zeroizing<String>,
    pub strength: Option<Strength>,
}

impl NewItem {
    /// Convenience constructor for the common label + value case.
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            username: None,
            value: Zeroizing::new(value.into()),
            strength: None,
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_strength(mut self, strength: Strength) -> Self {
        self.strength = Some(strength);
        self
    }

    /// Reject malformed input before anything is mutated.
    pub fn validate(&self) -> Result<()> {
        validate_label(&self.label)?;
        if let Some(username) = &self.username {
            validate_username(username)?;
        }
        validate_value(&self.value)
    }
}

/// A partial update.  `None` leaves the field untouched; for `username`
/// `Some(None)` clears it.
#[derive(Clone, Default)]
pub struct ItemPatch {
    pub label: Option<String>,
    pub username: Option<Option<String>>,
    pub value: Option<Zeroizing<String>>,
    pub strength: Option<Option<Strength>>,
}

impl ItemPatch {
    pub fn is_empty(&self) -> bool {
        self.label.is_none()
            && self.username.is_none()
            && self.value.is_none()
            && self.strength.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(label) = &self.label {
            validate_label(label)?;
        }
        if let Some(Some(username)) = &self.username {
            validate_username(username)?;
        }
        if let Some(value) = &self.value {
            validate_value(value)?;
        }
        Ok(())
    }
}

fn validate_label(label: &str) -> Result<()> {
    if label.trim().is_empty() {
        return Err(KeysafeError::Validation("label cannot be empty".into()));
    }
    if label.chars().count() > MAX_FIELD_LEN {
        return Err(KeysafeError::Validation(format!(
            "label cannot exceed {MAX_FIELD_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_username(username: &str) -> Result<()> {
    if username.chars().count() > MAX_FIELD_LEN {
        return Err(KeysafeError::Validation(format!(
            "username cannot exceed {MAX_FIELD_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_value(value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(KeysafeError::Validation("secret value cannot be empty".into()));
    }
    if value.len() > MAX_VALUE_LEN {
        return Err(KeysafeError::Validation(format!(
            "secret value cannot exceed {MAX_VALUE_LEN} bytes"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_item_validation() {
        assert!(NewItem::new("GitHub", "pw").validate().is_ok());
        assert!(NewItem::new("   ", "pw").validate().is_err());
        assert!(NewItem::new("GitHub", "").validate().is_err());
        assert!(NewItem::new("a".repeat(257), "pw").validate().is_err());
        assert!(NewItem::new("GitHub", "pw")
            .with_username("u".repeat(257))
            .validate()
            .is_err());
    }

    #[test]
    fn patch_validation_only_checks_present_fields() {
        assert!(ItemPatch::default().validate().is_ok());
        let patch = ItemPatch {
            label: Some(String::new()),
            ..ItemPatch::default()
        };
        assert!(patch.validate().is_err());
        let clear_username = ItemPatch {
            username: Some(None),
            ..ItemPatch::default()
        };
        assert!(clear_username.validate().is_ok());
        assert!(!clear_username.is_empty());
    }

    #[test]
    fn strength_parses_case_insensitively() {
        assert_eq!("Strong".parse::<Strength>().unwrap(), Strength::Strong);
        assert_eq!("weak".parse::<Strength>().unwrap(), Strength::Weak);
        assert!("excellent".parse::<Strength>().is_err());
    }

    #[test]
    fn strength_serializes_lowercase() {
        let json = serde_json::to_string(&Strength::Fair).unwrap();
        assert_eq!(json, "\"fair\"");
    }
}
