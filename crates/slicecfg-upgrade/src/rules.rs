//! Upgrade rules for the 4.3 to 4.4 boundary (setting version 9 to 10).
//!
//! Three rule sets, one per [`RuleSet`]. Each takes a parsed document and
//! returns a fresh one; the input is never touched.

use serde::Serialize;
use tracing::debug;

use crate::document::{ConfigDocument, Section};
use crate::engine::UpgradeStep;
use crate::error::{Result, UpgradeError};
use crate::kind::{DocumentKind, RuleSet};
use crate::remap;
use crate::version::VersionPair;

/// Setting version the rules consume.
pub const SOURCE_SETTING_VERSION: u32 = 9;

/// Setting version the rules produce.
pub const TARGET_SETTING_VERSION: u32 = 10;

/// Container id that fills the new intent slot of a stack.
pub const EMPTY_INTENT: &str = "empty_intent";

/// Intent category given to quality-changes profiles that predate intents.
pub const DEFAULT_INTENT_CATEGORY: &str = "default";

const METADATA: &str = "metadata";
const CONTAINERS: &str = "containers";

/// Slot the intent container takes; everything from here on moves down one.
const INTENT_SLOT: u8 = 2;
/// Highest slot of an un-upgraded chain.
const LAST_SLOT: u8 = 6;

/// Outcome of one upgrade.
///
/// `NotApplicable` means "already current, write nothing". It is distinct
/// from an upgrade that produced an empty document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upgrade<T> {
    /// The upgraded value.
    Upgraded(T),
    /// Nothing to do.
    NotApplicable,
}

impl<T> Upgrade<T> {
    /// Whether this is [`Upgrade::Upgraded`].
    pub fn is_upgraded(&self) -> bool {
        matches!(self, Self::Upgraded(_))
    }

    /// The upgraded value, if any.
    pub fn upgraded(self) -> Option<T> {
        match self {
            Self::Upgraded(v) => Some(v),
            Self::NotApplicable => None,
        }
    }

    /// Transform the upgraded value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Upgrade<U> {
        match self {
            Self::Upgraded(v) => Upgrade::Upgraded(f(v)),
            Self::NotApplicable => Upgrade::NotApplicable,
        }
    }
}

/// One serialized output document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpgradedFile {
    /// Identifying name, usually the file name.
    pub name: String,
    /// Serialized document.
    pub text: String,
}

impl Upgrade<Vec<UpgradedFile>> {
    /// Parallel `(names, texts)` sequences; both empty for `NotApplicable`.
    pub fn into_sequences(self) -> (Vec<String>, Vec<String>) {
        match self {
            Self::Upgraded(files) => files.into_iter().map(|f| (f.name, f.text)).unzip(),
            Self::NotApplicable => (Vec::new(), Vec::new()),
        }
    }
}

/// Bump the setting version of a preferences document. Nothing else changes.
pub fn upgrade_preferences(doc: &ConfigDocument) -> ConfigDocument {
    let mut doc = doc.clone();
    doc.set(METADATA, "setting_version", TARGET_SETTING_VERSION.to_string());
    doc
}

/// Upgrade a quality, quality-changes, definition-changes or user container.
///
/// Quality-changes profiles predate intents, so they are pinned to the
/// default intent category.
pub fn upgrade_instance_container(doc: &ConfigDocument) -> ConfigDocument {
    let mut doc = doc.clone();
    let metadata = doc.ensure_section(METADATA);
    metadata.set("setting_version", TARGET_SETTING_VERSION.to_string());
    if metadata.get("type") == Some("quality_changes") {
        metadata.set("intent_category", DEFAULT_INTENT_CATEGORY);
    }
    doc
}

/// Upgrade a machine or extruder stack.
///
/// Inserts the intent slot at position 2 of the container chain, moving
/// slots 2..=6 to 3..=7. A chain that already has slot 7 is reported as
/// [`Upgrade::NotApplicable`]. Stacks without a `containers` section only get
/// their version bumped.
///
/// # Example
///
/// ```
/// use slicecfg_upgrade::{upgrade_stack, ConfigDocument};
///
/// let doc = ConfigDocument::parse(
///     "[general]\nversion = 4\n\n[metadata]\nsetting_version = 9\n\n\
///      [containers]\n0 = user\n1 = qc\n2 = quality\n3 = material\n\
///      4 = ultimaker2_0.4\n5 = definition_changes\n6 = ultimaker2\n",
/// )
/// .unwrap();
///
/// let upgraded = upgrade_stack(&doc).unwrap().upgraded().unwrap();
/// assert_eq!(upgraded.get("containers", "2"), Some("empty_intent"));
/// assert_eq!(upgraded.get("containers", "5"), Some("ultimaker2_olsson_0.4"));
/// assert_eq!(upgraded.get("containers", "7"), Some("ultimaker2"));
///
/// // Running it again changes nothing.
/// assert!(!upgrade_stack(&upgraded).unwrap().is_upgraded());
/// ```
pub fn upgrade_stack(doc: &ConfigDocument) -> Result<Upgrade<ConfigDocument>> {
    let mut doc = doc.clone();

    if let Some(metadata) = doc.section_mut(METADATA) {
        metadata.set("setting_version", TARGET_SETTING_VERSION.to_string());
    }

    if !doc.contains_section(CONTAINERS) {
        debug!("stack has no container chain; version bump only");
        return Ok(Upgrade::Upgraded(doc));
    }

    // Must see the original slot 6, so it runs before the shift.
    normalize_olsson_definition(&mut doc);

    if doc.get(CONTAINERS, &(LAST_SLOT + 1).to_string()).is_some() {
        debug!("container chain already has an intent slot; skipping");
        return Ok(Upgrade::NotApplicable);
    }

    if let Some(containers) = doc.section_mut(CONTAINERS) {
        shift_containers(containers)?;
        rename_containers(containers);
    }

    Ok(Upgrade::Upgraded(doc))
}

/// Run the rule set for `rule` on a parsed document.
pub fn apply(rule: RuleSet, doc: &ConfigDocument) -> Result<Upgrade<ConfigDocument>> {
    match rule {
        RuleSet::Preferences => Ok(Upgrade::Upgraded(upgrade_preferences(doc))),
        RuleSet::InstanceContainer => Ok(Upgrade::Upgraded(upgrade_instance_container(doc))),
        RuleSet::Stack => upgrade_stack(doc),
    }
}

/// Parse, upgrade and serialize one document.
pub fn upgrade_text(
    rule: RuleSet,
    serialized: &str,
    name: &str,
) -> Result<Upgrade<Vec<UpgradedFile>>> {
    let doc = ConfigDocument::parse(serialized)?;
    Ok(apply(rule, &doc)?.map(|doc| {
        vec![UpgradedFile {
            name: name.to_string(),
            text: doc.serialize(),
        }]
    }))
}

/// An Ultimaker 2 (Extended) with `has_variants = True` carries an Olsson
/// block, which is now its own machine definition.
fn normalize_olsson_definition(doc: &mut ConfigDocument) {
    let slot = LAST_SLOT.to_string();
    let Some(replacement) = doc.get(CONTAINERS, &slot).and_then(olsson_definition) else {
        return;
    };
    if doc.get(METADATA, "has_variants") != Some("True") {
        return;
    }

    debug!(definition = replacement, "rewriting definition to olsson variant");
    doc.set(CONTAINERS, slot, replacement);
    doc.remove_key(METADATA, "has_variants");
}

fn olsson_definition(id: &str) -> Option<&'static str> {
    match id {
        "ultimaker2" => Some("ultimaker2_olsson"),
        "ultimaker2_extended" => Some("ultimaker2_extended_olsson"),
        _ => None,
    }
}

/// Move slots 2..=6 to 3..=7 and put [`EMPTY_INTENT`] in slot 2.
///
/// All source slots are checked before anything is written.
pub(crate) fn shift_containers(containers: &mut Section) -> Result<()> {
    for slot in INTENT_SLOT..=LAST_SLOT {
        if !containers.contains_key(&slot.to_string()) {
            return Err(UpgradeError::MissingContainerSlot { slot });
        }
    }

    // Highest first, so no slot is overwritten before it is read.
    for slot in (INTENT_SLOT + 1..=LAST_SLOT + 1).rev() {
        let moved = containers
            .get(&(slot - 1).to_string())
            .map(str::to_string)
            .ok_or(UpgradeError::MissingContainerSlot { slot: slot - 1 })?;
        containers.set(slot.to_string(), moved);
    }
    containers.set(INTENT_SLOT.to_string(), EMPTY_INTENT);
    Ok(())
}

/// Replace every retired container id in the chain.
pub(crate) fn rename_containers(containers: &mut Section) {
    let renames: Vec<(String, &'static str)> = containers
        .iter()
        .filter_map(|(slot, id)| remap::lookup(id).map(|new| (slot.to_string(), new)))
        .collect();

    for (slot, new) in renames {
        debug!(slot = %slot, id = new, "renamed retired container");
        containers.set(slot, new);
    }
}

/// The 4.3 to 4.4 upgrade for one document kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionUpgrade43to44 {
    kind: DocumentKind,
}

impl VersionUpgrade43to44 {
    /// Step for `kind`.
    pub const fn new(kind: DocumentKind) -> Self {
        Self { kind }
    }

    /// One step per document kind.
    pub fn all() -> Vec<Self> {
        DocumentKind::ALL.into_iter().map(Self::new).collect()
    }
}

impl UpgradeStep for VersionUpgrade43to44 {
    fn kind(&self) -> DocumentKind {
        self.kind
    }

    fn source_version(&self) -> VersionPair {
        self.kind.source_version()
    }

    fn target_version(&self) -> VersionPair {
        self.kind.target_version()
    }

    fn upgrade(&self, serialized: &str, name: &str) -> Result<Upgrade<Vec<UpgradedFile>>> {
        upgrade_text(self.kind.rule_set(), serialized, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(slots: &[(&str, &str)]) -> Section {
        let mut section = Section::new(CONTAINERS);
        for (k, v) in slots {
            section.set(*k, *v);
        }
        section
    }

    fn stack(metadata: &str, containers: &str) -> ConfigDocument {
        ConfigDocument::parse(&format!(
            "[general]\nversion = 4\nname = Printer\n\n[metadata]\n{metadata}\n\n[containers]\n{containers}\n"
        ))
        .unwrap()
    }

    const CHAIN: &str = "0 = user\n1 = qc\n2 = A\n3 = B\n4 = C\n5 = D\n6 = E";

    #[test]
    fn shift_moves_every_slot_down_one() {
        let mut section = chain(&[
            ("0", "user"),
            ("1", "qc"),
            ("2", "A"),
            ("3", "B"),
            ("4", "C"),
            ("5", "D"),
            ("6", "E"),
        ]);
        shift_containers(&mut section).unwrap();

        let got: Vec<_> = section.iter().collect();
        assert_eq!(
            got,
            vec![
                ("0", "user"),
                ("1", "qc"),
                ("2", "empty_intent"),
                ("3", "A"),
                ("4", "B"),
                ("5", "C"),
                ("6", "D"),
                ("7", "E"),
            ]
        );
    }

    #[test]
    fn shift_leaves_renaming_to_the_rename_pass() {
        let mut section = chain(&[
            ("2", "ultimaker2_0.4"),
            ("3", "B"),
            ("4", "C"),
            ("5", "D"),
            ("6", "E"),
        ]);
        shift_containers(&mut section).unwrap();
        assert_eq!(section.get("3"), Some("ultimaker2_0.4"));

        rename_containers(&mut section);
        assert_eq!(section.get("3"), Some("ultimaker2_olsson_0.4"));
    }

    #[test]
    fn shift_rejects_incomplete_chain_untouched() {
        let mut section = chain(&[("2", "A"), ("3", "B"), ("5", "D"), ("6", "E")]);
        let before = section.clone();
        let err = shift_containers(&mut section).unwrap_err();
        assert_eq!(err, UpgradeError::MissingContainerSlot { slot: 4 });
        assert_eq!(section, before);
    }

    #[test]
    fn rename_touches_only_retired_ids() {
        let mut section = chain(&[
            ("0", "ultimaker2_0.25"),
            ("1", "ultimaker2"),
            ("2", "ultimaker2_0.8"),
        ]);
        rename_containers(&mut section);
        assert_eq!(section.get("0"), Some("ultimaker2_olsson_0.25"));
        assert_eq!(section.get("1"), Some("ultimaker2"));
        assert_eq!(section.get("2"), Some("ultimaker2_olsson_0.8"));
    }

    #[test]
    fn preferences_only_bump_version() {
        let doc = ConfigDocument::parse(
            "[general]\nversion = 6\n\n[metadata]\nsetting_version = 9\n\n[cura]\nactive_machine = UM2\n",
        )
        .unwrap();
        let out = upgrade_preferences(&doc);
        assert_eq!(out.get("metadata", "setting_version"), Some("10"));
        assert_eq!(out.get("cura", "active_machine"), Some("UM2"));
        assert_eq!(out.get("general", "version"), Some("6"));
        // Input is untouched.
        assert_eq!(doc.get("metadata", "setting_version"), Some("9"));
    }

    #[test]
    fn preferences_without_metadata_gain_it() {
        let doc = ConfigDocument::parse("[general]\nversion = 6\n").unwrap();
        let out = upgrade_preferences(&doc);
        assert_eq!(out.get("metadata", "setting_version"), Some("10"));
    }

    #[test]
    fn quality_changes_get_default_intent() {
        let doc = ConfigDocument::parse(
            "[general]\nversion = 4\n\n[metadata]\ntype = quality_changes\nsetting_version = 9\n",
        )
        .unwrap();
        let out = upgrade_instance_container(&doc);
        assert_eq!(out.get("metadata", "intent_category"), Some("default"));
        assert_eq!(out.get("metadata", "setting_version"), Some("10"));
    }

    #[test]
    fn other_containers_get_no_intent() {
        for meta in ["type = quality\n", "type = user\n", ""] {
            let doc = ConfigDocument::parse(&format!(
                "[general]\nversion = 4\n\n[metadata]\n{meta}setting_version = 7\n"
            ))
            .unwrap();
            let out = upgrade_instance_container(&doc);
            assert_eq!(out.get("metadata", "intent_category"), None);
            assert_eq!(out.get("metadata", "setting_version"), Some("10"));
        }
    }

    #[test]
    fn stack_full_upgrade() {
        let doc = stack("setting_version = 9\ntype = machine", CHAIN);
        let out = upgrade_stack(&doc).unwrap().upgraded().unwrap();

        assert_eq!(out.get("metadata", "setting_version"), Some("10"));
        let ids: Vec<_> = (0..=7)
            .map(|i| out.get("containers", &i.to_string()).unwrap())
            .collect();
        assert_eq!(ids, ["user", "qc", "empty_intent", "A", "B", "C", "D", "E"]);
    }

    #[test]
    fn stack_with_slot_seven_is_not_applicable() {
        let doc = stack("setting_version = 9", &format!("{CHAIN}\n7 = F"));
        assert_eq!(upgrade_stack(&doc).unwrap(), Upgrade::NotApplicable);
    }

    #[test]
    fn stack_without_containers_only_bumps() {
        let doc = ConfigDocument::parse(
            "[general]\nversion = 4\n\n[metadata]\nsetting_version = 8\nhas_variants = True\n",
        )
        .unwrap();
        let out = upgrade_stack(&doc).unwrap().upgraded().unwrap();
        assert_eq!(out.get("metadata", "setting_version"), Some("10"));
        assert_eq!(out.get("metadata", "has_variants"), Some("True"));
    }

    #[test]
    fn stack_without_metadata_does_not_gain_it() {
        let doc = ConfigDocument::parse(&format!(
            "[general]\nversion = 4\n\n[containers]\n{CHAIN}\n"
        ))
        .unwrap();
        let out = upgrade_stack(&doc).unwrap().upgraded().unwrap();
        assert!(!out.contains_section("metadata"));
        assert_eq!(out.get("containers", "7"), Some("E"));
    }

    #[test]
    fn olsson_um2_is_reclassified() {
        let doc = stack(
            "setting_version = 9\nhas_variants = True",
            "0 = u\n1 = qc\n2 = q\n3 = m\n4 = ultimaker2_0.6\n5 = dc\n6 = ultimaker2",
        );
        let out = upgrade_stack(&doc).unwrap().upgraded().unwrap();
        assert_eq!(out.get("containers", "7"), Some("ultimaker2_olsson"));
        assert_eq!(out.get("containers", "5"), Some("ultimaker2_olsson_0.6"));
        assert_eq!(out.get("metadata", "has_variants"), None);
    }

    #[test]
    fn olsson_um2_extended_is_reclassified() {
        let doc = stack(
            "has_variants = True",
            "2 = q\n3 = m\n4 = v\n5 = dc\n6 = ultimaker2_extended",
        );
        let out = upgrade_stack(&doc).unwrap().upgraded().unwrap();
        assert_eq!(out.get("containers", "7"), Some("ultimaker2_extended_olsson"));
        assert!(!out.section("metadata").unwrap().contains_key("has_variants"));
    }

    #[test]
    fn plain_um2_keeps_definition() {
        for meta in ["has_variants = False", "setting_version = 9"] {
            let doc = stack(meta, "2 = q\n3 = m\n4 = v\n5 = dc\n6 = ultimaker2");
            let out = upgrade_stack(&doc).unwrap().upgraded().unwrap();
            assert_eq!(out.get("containers", "7"), Some("ultimaker2"));
        }
    }

    #[test]
    fn has_variants_on_other_machines_is_kept() {
        let doc = stack(
            "has_variants = True",
            "2 = q\n3 = m\n4 = v\n5 = dc\n6 = ultimaker3",
        );
        let out = upgrade_stack(&doc).unwrap().upgraded().unwrap();
        assert_eq!(out.get("metadata", "has_variants"), Some("True"));
        assert_eq!(out.get("containers", "7"), Some("ultimaker3"));
    }

    #[test]
    fn olsson_rewrite_applies_even_when_already_upgraded() {
        // The rewrite runs before the guard; the guard still discards the result.
        let doc = stack(
            "has_variants = True",
            "2 = empty_intent\n3 = q\n4 = m\n5 = v\n6 = ultimaker2\n7 = ultimaker2",
        );
        assert_eq!(upgrade_stack(&doc).unwrap(), Upgrade::NotApplicable);
    }

    #[test]
    fn stack_missing_slot_is_an_error() {
        let doc = stack("setting_version = 9", "2 = q\n3 = m\n6 = d");
        let err = upgrade_stack(&doc).unwrap_err();
        assert_eq!(err, UpgradeError::MissingContainerSlot { slot: 4 });
    }

    #[test]
    fn upgrade_text_reports_sequences() {
        let text = "[general]\nversion = 4\n\n[metadata]\nsetting_version = 9\n";
        let (names, texts) = upgrade_text(RuleSet::InstanceContainer, text, "q.inst.cfg")
            .unwrap()
            .into_sequences();
        assert_eq!(names, vec!["q.inst.cfg".to_string()]);
        assert_eq!(
            texts,
            vec!["[general]\nversion = 4\n\n[metadata]\nsetting_version = 10\n\n".to_string()]
        );
    }

    #[test]
    fn not_applicable_has_empty_sequences() {
        let (names, texts) = Upgrade::<Vec<UpgradedFile>>::NotApplicable.into_sequences();
        assert!(names.is_empty());
        assert!(texts.is_empty());
    }

    #[test]
    fn upgrade_text_propagates_parse_errors() {
        let err = upgrade_text(RuleSet::Stack, "garbage", "x.cfg").unwrap_err();
        assert!(matches!(err, UpgradeError::Malformed { line: 1, .. }));
    }
}
