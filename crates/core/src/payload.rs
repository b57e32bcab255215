//! Structure descriptor payloads.
//!
//! A [`StructurePayload`] is an opaque line-notation string (typically
//! SMILES) that has passed the admission screen. The orchestrator never
//! interprets it; only the configured validator does.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum accepted payload length in characters.
pub const MAX_PAYLOAD_LENGTH: usize = 5_000;

/// Maximum structure name length in characters.
pub const MAX_NAME_LENGTH: usize = 256;

/// Characters that never appear in a structure descriptor and indicate an
/// injection attempt or a mangled upload.
const FORBIDDEN_CHARS: &[char] = &['<', '>', '"', '\'', ';', '`'];

// ---------------------------------------------------------------------------
// PayloadError
// ---------------------------------------------------------------------------

/// Reasons a raw payload string is rejected at admission.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    #[error("structure descriptor is empty")]
    Empty,

    #[error("structure descriptor exceeds {MAX_PAYLOAD_LENGTH} characters")]
    TooLong,

    #[error("structure descriptor contains forbidden character {0:?}")]
    ForbiddenCharacter(char),

    #[error("structure descriptor contains a control character")]
    ControlCharacter,
}

// ---------------------------------------------------------------------------
// StructurePayload
// ---------------------------------------------------------------------------

/// An admitted, immutable structure descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct StructurePayload(String);

impl StructurePayload {
    /// Screen and wrap a raw descriptor.
    ///
    /// Surrounding whitespace is trimmed before the checks run.
    pub fn parse(raw: &str) -> Result<Self, PayloadError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PayloadError::Empty);
        }
        if trimmed.chars().count() > MAX_PAYLOAD_LENGTH {
            return Err(PayloadError::TooLong);
        }
        if let Some(c) = trimmed.chars().find(|c| FORBIDDEN_CHARS.contains(c)) {
            return Err(PayloadError::ForbiddenCharacter(c));
        }
        if trimmed.chars().any(char::is_control) {
            return Err(PayloadError::ControlCharacter);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StructurePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StructurePayload {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Submission input
// ---------------------------------------------------------------------------

/// One structure as submitted by a client, before admission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmittedStructure {
    /// Raw line-notation descriptor.
    pub payload: String,
    /// Optional display name or compound identifier.
    #[serde(default)]
    pub name: Option<String>,
}

impl SubmittedStructure {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            name: None,
        }
    }

    pub fn named(payload: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            name: Some(name.into()),
        }
    }
}

/// Strip control characters from a structure name and truncate it.
///
/// Returns `None` when nothing printable remains.
pub fn sanitize_name(name: &str) -> Option<String> {
    let cleaned: String = name
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_NAME_LENGTH)
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}
