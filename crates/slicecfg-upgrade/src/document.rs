use core::fmt;
use core::str::FromStr;

use crate::error::{Result, UpgradeError};

/// A named, ordered group of `key = value` entries.
///
/// Keys keep their insertion order on write. Values are plain strings;
/// interpreting them is the caller's business.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    name: String,
    entries: Vec<(String, String)>,
}

impl Section {
    /// Create an empty section.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    /// Section name as written in its `[header]`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a value by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Set a value. An existing key keeps its position; a new key is appended.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Remove a key, returning its previous value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    /// Iterate over `(key, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the section has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn append_line(&mut self, line: &str) -> bool {
        match self.entries.last_mut() {
            Some((_, value)) => {
                value.push('\n');
                value.push_str(line);
                true
            }
            None => false,
        }
    }
}

/// An in-memory configuration document: ordered, uniquely named sections.
///
/// Parsed from and serialized back to the INI dialect the slicer writes:
///
/// ```text
/// [general]
/// version = 4
/// name = My Printer
///
/// [metadata]
/// setting_version = 9
/// ```
///
/// # Example
///
/// ```
/// use slicecfg_upgrade::ConfigDocument;
///
/// let mut doc = ConfigDocument::parse("[general]\nversion = 4\n").unwrap();
/// doc.set("metadata", "setting_version", "10");
///
/// assert_eq!(doc.get("general", "version"), Some("4"));
/// assert_eq!(
///     doc.serialize(),
///     "[general]\nversion = 4\n\n[metadata]\nsetting_version = 10\n\n"
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDocument {
    sections: Vec<Section>,
}

impl ConfigDocument {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse document text.
    ///
    /// Full-line `#`/`;` comments are skipped. An indented line after an
    /// entry continues that entry's value; blank lines between continuation
    /// lines are kept as empty lines of the value, trailing ones are dropped.
    /// Duplicate sections, duplicate keys, entries outside a section, and
    /// lines that are none of the above are rejected.
    pub fn parse(text: &str) -> Result<Self> {
        let mut doc = Self::new();
        // Continuation lines are only legal after an entry.
        let mut in_value = false;
        // Blank lines seen inside an open value, not yet known to be interior.
        let mut pending_blank = 0usize;

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();

            if line.is_empty() {
                if in_value {
                    pending_blank += 1;
                }
                continue;
            }
            if line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if in_value && raw.starts_with(char::is_whitespace) {
                if let Some(section) = doc.sections.last_mut() {
                    for _ in 0..pending_blank {
                        section.append_line("");
                    }
                    pending_blank = 0;
                    if section.append_line(line) {
                        continue;
                    }
                }
            }
            pending_blank = 0;

            if let Some(inner) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                if inner.is_empty() {
                    return Err(UpgradeError::malformed(line_no, "empty section name"));
                }
                if doc.contains_section(inner) {
                    return Err(UpgradeError::malformed(
                        line_no,
                        format!("duplicate section [{inner}]"),
                    ));
                }
                doc.sections.push(Section::new(inner));
                in_value = false;
                continue;
            }

            let Some(pos) = line.find(|c: char| c == '=' || c == ':') else {
                return Err(UpgradeError::malformed(
                    line_no,
                    format!("expected `key = value`, found {line:?}"),
                ));
            };
            let key = line[..pos].trim();
            let value = line[pos + 1..].trim();
            if key.is_empty() {
                return Err(UpgradeError::malformed(line_no, "empty key"));
            }

            let Some(section) = doc.sections.last_mut() else {
                return Err(UpgradeError::malformed(
                    line_no,
                    "entry before any section header",
                ));
            };
            if section.contains_key(key) {
                return Err(UpgradeError::malformed(
                    line_no,
                    format!("duplicate key {key:?} in [{}]", section.name),
                ));
            }
            section.entries.push((key.to_string(), value.to_string()));
            in_value = true;
        }

        Ok(doc)
    }

    /// Serialize to text. Never fails.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for section in &self.sections {
            out.push('[');
            out.push_str(&section.name);
            out.push_str("]\n");
            for (key, value) in &section.entries {
                out.push_str(key);
                out.push_str(" = ");
                out.push_str(&value.replace('\n', "\n\t"));
                out.push('\n');
            }
            out.push('\n');
        }
        out
    }

    /// Look up a section by name (case-sensitive).
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Mutable section lookup.
    pub fn section_mut(&mut self, name: &str) -> Option<&mut Section> {
        self.sections.iter_mut().find(|s| s.name == name)
    }

    /// Whether a section named `name` exists.
    pub fn contains_section(&self, name: &str) -> bool {
        self.sections.iter().any(|s| s.name == name)
    }

    /// Get the named section, appending an empty one if absent.
    pub fn ensure_section(&mut self, name: &str) -> &mut Section {
        let pos = match self.sections.iter().position(|s| s.name == name) {
            Some(pos) => pos,
            None => {
                self.sections.push(Section::new(name));
                self.sections.len() - 1
            }
        };
        &mut self.sections[pos]
    }

    /// Remove a whole section.
    pub fn remove_section(&mut self, name: &str) -> Option<Section> {
        let pos = self.sections.iter().position(|s| s.name == name)?;
        Some(self.sections.remove(pos))
    }

    /// Shorthand for `section(section)?.get(key)`.
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.section(section)?.get(key)
    }

    /// Set `section.key`, creating the section if needed.
    pub fn set(&mut self, section: &str, key: impl Into<String>, value: impl Into<String>) {
        self.ensure_section(section).set(key, value);
    }

    /// Remove `section.key`. Absent section or key is not an error.
    pub fn remove_key(&mut self, section: &str, key: &str) -> Option<String> {
        self.section_mut(section)?.remove(key)
    }

    /// Iterate sections in document order.
    pub fn sections(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter()
    }
}

impl FromStr for ConfigDocument {
    type Err = UpgradeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ConfigDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}
