use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::json;
use slicecfg_upgrade::{detect_version, DocumentKind, Upgrade, UpgradeEngine, VersionPair};
use tracing::{debug, info, warn};

use crate::config::Config;

type Result = std::result::Result<(), Box<dyn std::error::Error>>;

/// `slicecfg version <file>` — Show the declared version of a document.
pub fn version(file: &Path, as_json: bool) -> Result {
    let text = read(file)?;
    let version = detect_version(&text)?;

    if as_json {
        let output = json!({
            "file": file.display().to_string(),
            "format_version": version.format_version,
            "setting_version": version.setting_version,
            "combined": version.combined(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("File: {}", file.display());
        println!("Format version: {}", version.format_version);
        println!("Setting version: {}", version.setting_version);
        println!("Combined: {}", version.combined());
    }
    Ok(())
}

/// `slicecfg upgrade <file> --kind <kind>` — Upgrade a single document.
pub fn upgrade(
    engine: &UpgradeEngine,
    file: &Path,
    kind: DocumentKind,
    output: Option<&Path>,
    dry_run: bool,
    as_json: bool,
) -> Result {
    let text = read(file)?;
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| format!("not a file: {}", file.display()))?;
    let dir = match output {
        Some(dir) => dir.to_path_buf(),
        None => file.parent().map(Path::to_path_buf).unwrap_or_default(),
    };

    let from = detect_version(&text)?;
    let files = match engine.upgrade_to_current(kind, &text, &name)? {
        Upgrade::Upgraded(files) => files,
        Upgrade::NotApplicable => {
            if as_json {
                let output = json!({
                    "file": file.display().to_string(),
                    "kind": kind,
                    "status": FileStatus::NotApplicable,
                    "from": from,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                println!("{}: already current, nothing to write", file.display());
            }
            return Ok(());
        }
    };

    let mut written = Vec::with_capacity(files.len());
    for out in &files {
        let target = dir.join(&out.name);
        if dry_run {
            if !as_json {
                println!("--- {} ---", target.display());
                print!("{}", out.text);
            }
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, &out.text)?;
            info!(path = %target.display(), "wrote upgraded document");
        }
        written.push(target.display().to_string());
    }

    if as_json {
        let output = json!({
            "file": file.display().to_string(),
            "kind": kind,
            "status": FileStatus::Upgraded,
            "from": from,
            "to": engine.current_version(kind),
            "dry_run": dry_run,
            "outputs": written,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if !dry_run {
        for path in &written {
            println!("  Upgraded: {path}");
        }
    }
    Ok(())
}

/// `slicecfg steps` — List registered upgrade steps.
pub fn steps(engine: &UpgradeEngine) -> Result {
    println!("  {:<20} {:>10} {:>10}", "Kind", "From", "To");
    println!("  {}", "-".repeat(42));
    for (kind, from, to) in engine.registered_steps() {
        println!(
            "  {:<20} {:>10} {:>10}",
            kind.as_str(),
            from.combined(),
            to.combined()
        );
    }
    Ok(())
}

/// Outcome for one file of a directory migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileStatus {
    Upgraded,
    Current,
    NotApplicable,
    Failed,
}

impl FileStatus {
    fn label(&self) -> &'static str {
        match self {
            Self::Upgraded => "upgraded",
            Self::Current => "current",
            Self::NotApplicable => "not-applicable",
            Self::Failed => "failed",
        }
    }
}

/// Per-file line of a migration report.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub kind: DocumentKind,
    pub path: PathBuf,
    pub status: FileStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<VersionPair>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `slicecfg migrate <root>` — Upgrade every outdated document under a data directory.
pub fn migrate(
    engine: &UpgradeEngine,
    root: &Path,
    config_path: Option<&Path>,
    dry_run: bool,
    as_json: bool,
) -> Result {
    if !root.is_dir() {
        return Err(format!("Data directory not found: {}", root.display()).into());
    }
    let config = Config::load(config_path, root)?;
    let reports = migrate_dir(engine, root, &config, dry_run)?;
    let failed = reports
        .iter()
        .filter(|r| r.status == FileStatus::Failed)
        .count();

    if as_json {
        let output = json!({
            "root": root.display().to_string(),
            "dry_run": dry_run,
            "files": reports,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if reports.is_empty() {
        println!("No documents found under {}", root.display());
    } else {
        println!("  {:<16} {:<20} Path", "Status", "Kind");
        println!("  {}", "-".repeat(60));
        for report in &reports {
            println!(
                "  {:<16} {:<20} {}",
                report.status.label(),
                report.kind.as_str(),
                report.path.display()
            );
            if let Some(error) = &report.error {
                println!("      {error}");
            }
        }
        let upgraded = reports
            .iter()
            .filter(|r| r.status == FileStatus::Upgraded)
            .count();
        println!();
        if dry_run {
            println!("Dry run: {upgraded} of {} documents would be upgraded", reports.len());
        } else {
            println!("Upgraded {upgraded} of {} documents", reports.len());
        }
    }

    if failed > 0 {
        return Err(format!("{failed} documents failed to upgrade").into());
    }
    Ok(())
}

/// Discover and upgrade documents of every kind under `root`.
///
/// A failure on one file is recorded in its report; the run continues.
pub fn migrate_dir(
    engine: &UpgradeEngine,
    root: &Path,
    config: &Config,
    dry_run: bool,
) -> std::io::Result<Vec<FileReport>> {
    let mut reports = Vec::new();

    for kind in DocumentKind::ALL {
        for path in discover(root, kind, config)? {
            let report = migrate_file(engine, kind, &path, dry_run);
            if report.status == FileStatus::Failed {
                warn!(path = %path.display(), %kind, "upgrade failed");
            }
            reports.push(report);
        }
    }

    Ok(reports)
}

fn migrate_file(
    engine: &UpgradeEngine,
    kind: DocumentKind,
    path: &Path,
    dry_run: bool,
) -> FileReport {
    let mut report = FileReport {
        kind,
        path: path.to_path_buf(),
        status: FileStatus::Failed,
        from: None,
        error: None,
    };

    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            report.error = Some(e.to_string());
            return report;
        }
    };
    let from = match detect_version(&text) {
        Ok(v) => v,
        Err(e) => {
            report.error = Some(e.to_string());
            return report;
        }
    };
    report.from = Some(from);

    if engine.current_version(kind) == Some(from) {
        report.status = FileStatus::Current;
        return report;
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match engine.upgrade_to_current(kind, &text, &name) {
        Ok(Upgrade::Upgraded(files)) => {
            let dir = path.parent().unwrap_or(Path::new("."));
            if !dry_run {
                for out in &files {
                    if let Err(e) = fs::write(dir.join(&out.name), &out.text) {
                        report.error = Some(e.to_string());
                        return report;
                    }
                }
            }
            debug!(path = %path.display(), outputs = files.len(), "upgraded");
            report.status = FileStatus::Upgraded;
        }
        Ok(Upgrade::NotApplicable) => report.status = FileStatus::NotApplicable,
        Err(e) => report.error = Some(e.to_string()),
    }
    report
}

/// Files of `kind` under its configured source directory, sorted by name.
fn discover(root: &Path, kind: DocumentKind, config: &Config) -> std::io::Result<Vec<PathBuf>> {
    let dir = root.join(config.location(kind));
    if !dir.is_dir() {
        debug!(%kind, dir = %dir.display(), "source directory missing, skipping");
        return Ok(Vec::new());
    }

    if kind == DocumentKind::Preferences {
        let path = dir.join(&config.output.preferences_file);
        return Ok(if path.is_file() { vec![path] } else { Vec::new() });
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(&dir)? {
        let path = entry?.path();
        let matches = path
            .extension()
            .is_some_and(|ext| ext == config.output.extension.as_str());
        if path.is_file() && matches {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn read(file: &Path) -> std::result::Result<String, Box<dyn std::error::Error>> {
    if !file.is_file() {
        return Err(format!("File not found: {}", file.display()).into());
    }
    Ok(fs::read_to_string(file)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const STACK: &str = "\
[general]
version = 4
name = UM2

[metadata]
type = machine
setting_version = 9

[containers]
0 = user
1 = empty_quality_changes
2 = normal
3 = generic_pla
4 = ultimaker2_0.4
5 = UM2_settings
6 = ultimaker2
";

    const QUALITY_CHANGES: &str = "\
[general]
version = 4
name = Mine

[metadata]
type = quality_changes
setting_version = 9
";

    const PREFERENCES: &str = "\
[general]
version = 6

[metadata]
setting_version = 9
";

    fn data_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("machine_instances")).unwrap();
        fs::create_dir_all(root.join("quality_changes")).unwrap();
        fs::write(root.join("machine_instances/UM2.global.cfg"), STACK).unwrap();
        fs::write(root.join("machine_instances/notes.txt"), "not a profile").unwrap();
        fs::write(root.join("quality_changes/mine.inst.cfg"), QUALITY_CHANGES).unwrap();
        fs::write(root.join("cura.cfg"), PREFERENCES).unwrap();
        dir
    }

    fn status_of(reports: &[FileReport], file: &str) -> FileStatus {
        reports
            .iter()
            .find(|r| r.path.ends_with(file))
            .map(|r| r.status)
            .unwrap()
    }

    #[test]
    fn migrate_dir_upgrades_every_kind() {
        let dir = data_dir();
        let engine = UpgradeEngine::with_default_steps();
        let reports = migrate_dir(&engine, dir.path(), &Config::default(), false).unwrap();

        assert_eq!(reports.len(), 3);
        assert!(reports.iter().all(|r| r.status == FileStatus::Upgraded));

        let stack = fs::read_to_string(dir.path().join("machine_instances/UM2.global.cfg")).unwrap();
        assert!(stack.contains("2 = empty_intent"));
        assert!(stack.contains("5 = ultimaker2_olsson_0.4"));
        let qc = fs::read_to_string(dir.path().join("quality_changes/mine.inst.cfg")).unwrap();
        assert!(qc.contains("intent_category = default"));
        let prefs = fs::read_to_string(dir.path().join("cura.cfg")).unwrap();
        assert!(prefs.contains("setting_version = 10"));
    }

    #[test]
    fn second_run_reports_current() {
        let dir = data_dir();
        let engine = UpgradeEngine::with_default_steps();
        migrate_dir(&engine, dir.path(), &Config::default(), false).unwrap();
        let reports = migrate_dir(&engine, dir.path(), &Config::default(), false).unwrap();
        assert!(reports.iter().all(|r| r.status == FileStatus::Current));
    }

    #[test]
    fn dry_run_writes_nothing() {
        let dir = data_dir();
        let engine = UpgradeEngine::with_default_steps();
        let reports = migrate_dir(&engine, dir.path(), &Config::default(), true).unwrap();
        assert_eq!(status_of(&reports, "UM2.global.cfg"), FileStatus::Upgraded);
        let stack = fs::read_to_string(dir.path().join("machine_instances/UM2.global.cfg")).unwrap();
        assert_eq!(stack, STACK);
    }

    #[test]
    fn failures_do_not_stop_the_run() {
        let dir = data_dir();
        fs::write(dir.path().join("quality_changes/broken.inst.cfg"), "garbage").unwrap();
        let engine = UpgradeEngine::with_default_steps();
        let reports = migrate_dir(&engine, dir.path(), &Config::default(), false).unwrap();

        assert_eq!(status_of(&reports, "broken.inst.cfg"), FileStatus::Failed);
        assert_eq!(status_of(&reports, "mine.inst.cfg"), FileStatus::Upgraded);
        let broken = reports
            .iter()
            .find(|r| r.path.ends_with("broken.inst.cfg"))
            .unwrap();
        assert!(broken.error.as_deref().unwrap().contains("malformed"));
    }

    #[test]
    fn already_shifted_stack_is_not_applicable() {
        let dir = data_dir();
        let shifted = STACK.replace("6 = ultimaker2\n", "6 = ultimaker2\n7 = ultimaker2\n");
        fs::write(dir.path().join("machine_instances/UM2.global.cfg"), &shifted).unwrap();
        let engine = UpgradeEngine::with_default_steps();
        let reports = migrate_dir(&engine, dir.path(), &Config::default(), false).unwrap();

        assert_eq!(status_of(&reports, "UM2.global.cfg"), FileStatus::NotApplicable);
        let stack = fs::read_to_string(dir.path().join("machine_instances/UM2.global.cfg")).unwrap();
        assert_eq!(stack, shifted);
    }

    #[test]
    fn configured_locations_are_used() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("stacks")).unwrap();
        fs::write(dir.path().join("stacks/UM2.global.cfg"), STACK).unwrap();
        let config = Config::from_toml("[sources]\nmachine_stack = \"stacks\"\n").unwrap();
        let engine = UpgradeEngine::with_default_steps();
        let reports = migrate_dir(&engine, dir.path(), &config, false).unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].kind, DocumentKind::MachineStack);
        assert_eq!(reports[0].status, FileStatus::Upgraded);
    }

    #[test]
    fn upgrade_writes_to_output_dir() {
        let dir = data_dir();
        let out = tempfile::tempdir().unwrap();
        let engine = UpgradeEngine::with_default_steps();
        upgrade(
            &engine,
            &dir.path().join("quality_changes/mine.inst.cfg"),
            DocumentKind::QualityChanges,
            Some(out.path()),
            false,
            false,
        )
        .unwrap();

        let written = fs::read_to_string(out.path().join("mine.inst.cfg")).unwrap();
        assert!(written.contains("setting_version = 10"));
        let original = fs::read_to_string(dir.path().join("quality_changes/mine.inst.cfg")).unwrap();
        assert_eq!(original, QUALITY_CHANGES);
    }

    #[test]
    fn upgrade_missing_file_fails() {
        let engine = UpgradeEngine::with_default_steps();
        let err = upgrade(
            &engine,
            Path::new("/definitely/not/here.cfg"),
            DocumentKind::User,
            None,
            true,
            false,
        )
        .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn report_serializes_status_in_kebab_case() {
        let report = FileReport {
            kind: DocumentKind::ExtruderTrain,
            path: PathBuf::from("extruders/left.extruder.cfg"),
            status: FileStatus::NotApplicable,
            from: Some(VersionPair::new(4, 9)),
            error: None,
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["status"], "not-applicable");
        assert_eq!(value["kind"], "extruder_train");
        assert_eq!(value["from"]["setting_version"], 9);
        assert!(value.get("error").is_none());
    }
}
