use thiserror::Error;

use crate::kind::DocumentKind;

/// Error raised while parsing, detecting, or upgrading a document.
///
/// "Already upgraded" is not represented here; see [`Upgrade::NotApplicable`](crate::Upgrade).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpgradeError {
    /// The text cannot be decomposed into section headers and key/value lines.
    #[error("malformed document at line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    /// The document lacks a usable `general.version` declaration.
    #[error("unrecognized format: {0}")]
    UnrecognizedFormat(String),

    /// A stack's container chain is missing one of the slots the shift reads.
    #[error("container chain is missing slot \"{slot}\"")]
    MissingContainerSlot { slot: u8 },

    /// No upgrade step is registered for this kind at all.
    #[error("no upgrade steps registered for {kind} (document at v{from})")]
    NoPath { kind: DocumentKind, from: u64 },

    /// A step for this kind and source version is already registered.
    #[error("duplicate upgrade step for {kind} at v{from}")]
    DuplicateStep { kind: DocumentKind, from: u64 },

    /// The step chain has a gap: nothing consumes `missing`.
    #[error("missing upgrade step for {kind} at v{missing}")]
    GapInChain { kind: DocumentKind, missing: u64 },

    /// The document is newer than the newest version known for its kind.
    #[error("{kind} document version v{found} is newer than current v{current}")]
    FutureVersion {
        kind: DocumentKind,
        found: u64,
        current: u64,
    },

    /// A step in the chain failed.
    #[error("upgrade {kind} v{from}->v{to} failed: {reason}")]
    StepFailed {
        kind: DocumentKind,
        from: u64,
        to: u64,
        reason: String,
    },
}

impl UpgradeError {
    pub(crate) fn malformed(line: usize, reason: impl Into<String>) -> Self {
        Self::Malformed {
            line,
            reason: reason.into(),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, UpgradeError>;
