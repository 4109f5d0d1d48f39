/// Container identifiers retired at the 4.4 boundary and their replacements.
///
/// The bare Ultimaker 2 nozzle variants moved under the Olsson block machine
/// definitions.
pub const RENAMED_CONTAINER_IDS: &[(&str, &str)] = &[
    ("ultimaker2_0.25", "ultimaker2_olsson_0.25"),
    ("ultimaker2_0.4", "ultimaker2_olsson_0.4"),
    ("ultimaker2_0.6", "ultimaker2_olsson_0.6"),
    ("ultimaker2_0.8", "ultimaker2_olsson_0.8"),
];

/// Replacement for a retired container identifier, if it has one.
pub fn lookup(id: &str) -> Option<&'static str> {
    RENAMED_CONTAINER_IDS
        .iter()
        .find(|(old, _)| *old == id)
        .map(|(_, new)| *new)
}
