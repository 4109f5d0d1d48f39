use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::version::VersionPair;

/// Which rule set applies to a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleSet {
    /// Application preferences.
    Preferences,
    /// Quality, quality-changes, definition-changes, user containers.
    InstanceContainer,
    /// Machine and extruder stacks.
    Stack,
}

/// Kind of persisted document, as the dispatcher sorts them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Preferences,
    MachineStack,
    ExtruderTrain,
    DefinitionChanges,
    QualityChanges,
    Quality,
    User,
}

impl DocumentKind {
    /// Every kind, in dispatch order.
    pub const ALL: [DocumentKind; 7] = [
        Self::Preferences,
        Self::MachineStack,
        Self::ExtruderTrain,
        Self::DefinitionChanges,
        Self::QualityChanges,
        Self::Quality,
        Self::User,
    ];

    /// Name used in configuration files and on the command line.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Preferences => "preferences",
            Self::MachineStack => "machine_stack",
            Self::ExtruderTrain => "extruder_train",
            Self::DefinitionChanges => "definition_changes",
            Self::QualityChanges => "quality_changes",
            Self::Quality => "quality",
            Self::User => "user",
        }
    }

    /// Rule set used to upgrade documents of this kind.
    pub const fn rule_set(&self) -> RuleSet {
        match self {
            Self::Preferences => RuleSet::Preferences,
            Self::MachineStack | Self::ExtruderTrain => RuleSet::Stack,
            Self::DefinitionChanges | Self::QualityChanges | Self::Quality | Self::User => {
                RuleSet::InstanceContainer
            }
        }
    }

    /// Format version documents of this kind declare in `general.version`.
    pub const fn format_version(&self) -> u32 {
        match self {
            Self::Preferences => 6,
            _ => 4,
        }
    }

    /// Version consumed by the 4.3 to 4.4 step.
    pub const fn source_version(&self) -> VersionPair {
        VersionPair::new(self.format_version(), crate::rules::SOURCE_SETTING_VERSION)
    }

    /// Version produced by the 4.3 to 4.4 step.
    pub const fn target_version(&self) -> VersionPair {
        VersionPair::new(self.format_version(), crate::rules::TARGET_SETTING_VERSION)
    }

    /// Sub-directory of a data directory holding documents of this kind.
    pub const fn default_location(&self) -> &'static str {
        match self {
            Self::Preferences => ".",
            Self::MachineStack => "machine_instances",
            Self::ExtruderTrain => "extruders",
            Self::DefinitionChanges => "definition_changes",
            Self::QualityChanges => "quality_changes",
            Self::Quality => "quality",
            Self::User => "user",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error parsing a [`DocumentKind`] name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown document kind: {0}")]
pub struct UnknownKind(pub String);

impl FromStr for DocumentKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}
