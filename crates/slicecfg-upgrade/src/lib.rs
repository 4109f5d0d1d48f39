//! # slicecfg-upgrade
//!
//! Schema upgrades for persisted slicer configuration: printing profiles,
//! machine and extruder stacks, and application preferences.
//!
//! Given a document written under an older schema, produce an equivalent
//! document valid under the next one. Each step handles exactly one version
//! increment; [`UpgradeEngine`] chains steps when a document is further behind.
//!
//! ## How It Works
//!
//! 1. The text is parsed into a [`ConfigDocument`] (ordered sections of
//!    `key = value` entries).
//! 2. [`detect_version`] combines `general.version` and
//!    `metadata.setting_version` into one comparable [`VersionPair`].
//! 3. The rule set for the document's [`DocumentKind`] builds a new document.
//! 4. The result is serialized back to text.
//!
//! ## Key Concepts
//!
//! - **Pure**: text in, text out. No I/O, no shared mutable state.
//! - **Deterministic**: the same input always yields the same output.
//! - **Explicit no-op**: a stack that was already upgraded yields
//!   [`Upgrade::NotApplicable`], never an error and never a second shift.
//!
//! ## Example
//!
//! ```
//! use slicecfg_upgrade::{DocumentKind, UpgradeEngine};
//!
//! let stack = "\
//! [general]
//! version = 4
//! name = UM2
//!
//! [metadata]
//! type = machine
//! setting_version = 9
//!
//! [containers]
//! 0 = user
//! 1 = empty_quality_changes
//! 2 = normal
//! 3 = generic_pla
//! 4 = ultimaker2_0.4
//! 5 = um2_settings
//! 6 = ultimaker2
//! ";
//!
//! let engine = UpgradeEngine::with_default_steps();
//! let (names, texts) = engine
//!     .upgrade_to_current(DocumentKind::MachineStack, stack, "UM2.global.cfg")
//!     .unwrap()
//!     .into_sequences();
//!
//! assert_eq!(names, vec!["UM2.global.cfg"]);
//! assert!(texts[0].contains("2 = empty_intent"));
//! assert!(texts[0].contains("5 = ultimaker2_olsson_0.4"));
//! ```

mod document;
mod engine;
mod error;
mod kind;
pub mod remap;
mod rules;
mod version;

pub use document::{ConfigDocument, Section};
pub use engine::{UpgradeEngine, UpgradeStep};
pub use error::{Result, UpgradeError};
pub use kind::{DocumentKind, RuleSet, UnknownKind};
pub use rules::{
    apply, upgrade_instance_container, upgrade_preferences, upgrade_stack, upgrade_text, Upgrade,
    UpgradedFile, VersionUpgrade43to44, DEFAULT_INTENT_CATEGORY, EMPTY_INTENT,
    SOURCE_SETTING_VERSION, TARGET_SETTING_VERSION,
};
pub use version::{detect_version, VersionPair, FORMAT_VERSION_FACTOR};
