use core::fmt;

use serde::Serialize;

use crate::document::ConfigDocument;
use crate::error::{Result, UpgradeError};

/// Multiplier that packs a format version above the setting version.
///
/// Assumes a setting version never exceeds 999 999. Not checked.
pub const FORMAT_VERSION_FACTOR: u64 = 1_000_000;

/// Declared version of a document: structural format plus setting semantics.
///
/// Combined into one comparable number as:
/// ```text
/// format_version * 1_000_000 + setting_version
/// ```
///
/// # Example
///
/// ```
/// use slicecfg_upgrade::{detect_version, VersionPair};
///
/// let text = "[general]\nversion = 4\n\n[metadata]\nsetting_version = 9\n";
/// let version = detect_version(text).unwrap();
///
/// assert_eq!(version, VersionPair::new(4, 9));
/// assert_eq!(version.combined(), 4_000_009);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct VersionPair {
    /// `general.version`.
    pub format_version: u32,
    /// `metadata.setting_version`, 0 when absent.
    pub setting_version: u32,
}

impl VersionPair {
    /// Create a version pair.
    pub const fn new(format_version: u32, setting_version: u32) -> Self {
        Self {
            format_version,
            setting_version,
        }
    }

    /// Single orderable number for this pair.
    pub const fn combined(&self) -> u64 {
        self.format_version as u64 * FORMAT_VERSION_FACTOR + self.setting_version as u64
    }

    /// Split a combined number back into its pair.
    ///
    /// `None` if the format part does not fit a `u32`.
    pub fn from_combined(combined: u64) -> Option<Self> {
        let format_version = u32::try_from(combined / FORMAT_VERSION_FACTOR).ok()?;
        let setting_version = u32::try_from(combined % FORMAT_VERSION_FACTOR).ok()?;
        Some(Self {
            format_version,
            setting_version,
        })
    }

    /// Read the declared version of a parsed document.
    pub fn of(doc: &ConfigDocument) -> Result<Self> {
        let raw = doc.get("general", "version").ok_or_else(|| {
            UpgradeError::UnrecognizedFormat("missing general.version".to_string())
        })?;
        let format_version = parse_version_number(raw, "general.version")?;

        let setting_version = match doc.get("metadata", "setting_version") {
            Some(raw) => parse_version_number(raw, "metadata.setting_version")?,
            None => 0,
        };

        Ok(Self::new(format_version, setting_version))
    }
}

impl fmt::Display for VersionPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "format {} / setting {} ({})",
            self.format_version,
            self.setting_version,
            self.combined()
        )
    }
}

/// Parse `text` and read its declared version.
///
/// Fails with [`UpgradeError::Malformed`] if the text is not a document at
/// all, and with [`UpgradeError::UnrecognizedFormat`] if it is one but has no
/// integer `general.version`.
pub fn detect_version(text: &str) -> Result<VersionPair> {
    let doc = ConfigDocument::parse(text)?;
    VersionPair::of(&doc)
}

fn parse_version_number(raw: &str, field: &str) -> Result<u32> {
    raw.trim().parse::<u32>().map_err(|_| {
        UpgradeError::UnrecognizedFormat(format!(
            "{field} must be a non-negative integer, found {raw:?}"
        ))
    })
}
