//! End-to-end runs of the `linkback` binary

mod common;

use anyhow::Result;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Workspace with `source = {a.txt, b/c.txt}` and an empty `target` path
fn workspace() -> Result<(TempDir, String, String)> {
    let temp = TempDir::new()?;
    let source = temp.path().join("source");
    fs::create_dir_all(source.join("b"))?;
    fs::write(source.join("a.txt"), "AAA")?;
    fs::write(source.join("b/c.txt"), "CCC")?;
    let source = fs::canonicalize(&source)?;
    let target = temp.path().join("target");
    Ok((temp, path_str(&source), path_str(&target)))
}

#[test]
fn test_snapshot_then_status() -> Result<()> {
    let (temp, source, target) = workspace()?;
    let dir = temp.path();

    let result = linkback!(dir, "-q", "snapshot", source, target, "S1").assert_success()?;
    assert!(result.contains_stdout("S1"));

    let target_path = temp.path().join("target");
    assert_eq!(fs::read_to_string(target_path.join("S1/a.txt"))?, "AAA");
    assert_eq!(fs::read_to_string(target_path.join("S1/b/c.txt"))?, "CCC");
    assert!(target_path.join("previous").is_file());
    assert!(!target_path.join(".lock").exists());

    let status = linkback!(dir, "status", target, "--json").assert_success()?;
    let json: serde_json::Value = serde_json::from_str(&status.stdout)?;
    assert_eq!(json["previous"], "S1");
    assert_eq!(json["snapshots"], serde_json::json!(["S1"]));
    assert!(json["locked_by"].is_null());

    Ok(())
}

#[test]
fn test_stale_lock_is_reclaimed() -> Result<()> {
    let (temp, source, target) = workspace()?;
    let dir = temp.path();
    let target_path = temp.path().join("target");
    fs::create_dir_all(&target_path)?;
    fs::write(
        target_path.join(".lock"),
        r#"{"pid":4194305,"command":"snapshot","started_at":"2026-01-01T00:00:00Z"}"#,
    )?;

    let status = linkback!(dir, "status", target, "--json").assert_success()?;
    let json: serde_json::Value = serde_json::from_str(&status.stdout)?;
    assert_eq!(json["locked_by"]["pid"], 4194305);

    linkback!(dir, "-q", "snapshot", source, target, "S1").assert_success()?;
    assert!(target_path.join("S1/a.txt").is_file());
    assert!(!target_path.join(".lock").exists());

    Ok(())
}

#[test]
fn test_duplicate_name_fails() -> Result<()> {
    let (temp, source, target) = workspace()?;
    let dir = temp.path();

    linkback!(dir, "-q", "snapshot", source, target, "S1").assert_success()?;
    let result = linkback!(dir, "-q", "snapshot", source, target, "S1").assert_failure()?;

    assert_eq!(result.exit_code, 1);
    assert!(result.contains_stderr("already exists"));
    Ok(())
}

#[test]
fn test_missing_source_fails() -> Result<()> {
    let (temp, _, target) = workspace()?;
    let dir = temp.path();
    let missing = path_str(&temp.path().join("missing"));

    let result = linkback!(dir, "-q", "snapshot", missing, target, "S1").assert_failure()?;

    assert_eq!(result.exit_code, 1);
    assert!(result.contains_stderr("does not exist"));
    Ok(())
}

#[test]
fn test_default_name_is_timestamp() -> Result<()> {
    let (temp, source, target) = workspace()?;
    let dir = temp.path();

    linkback!(dir, "-q", "snapshot", source, target).assert_success()?;

    let status = linkback!(dir, "status", target, "--json").assert_success()?;
    let json: serde_json::Value = serde_json::from_str(&status.stdout)?;
    let name = json["previous"].as_str().unwrap_or_default().to_string();
    assert_eq!(name.len(), 15);
    assert!(temp.path().join("target").join(&name).is_dir());
    Ok(())
}

#[test]
fn test_exclude_add_list_remove() -> Result<()> {
    let (temp, source, target) = workspace()?;
    let dir = temp.path();
    fs::create_dir_all(&target)?;
    let excluded = format!("{}/b", source);

    linkback!(dir, "exclude", target, "add", excluded).assert_success()?;
    let list = linkback!(dir, "exclude", target, "list").assert_success()?;
    assert!(list.stdout.trim_end().ends_with("/b"));

    linkback!(dir, "-q", "snapshot", source, target, "S1").assert_success()?;
    let snap = temp.path().join("target/S1");
    assert!(snap.join("a.txt").is_file());
    assert!(!snap.join("b").exists());

    linkback!(dir, "exclude", target, "remove", excluded).assert_success()?;
    let list = linkback!(dir, "exclude", target, "list").assert_success()?;
    assert!(list.contains_stdout("No exclusions"));
    Ok(())
}

#[test]
fn test_invalid_config_fails() -> Result<()> {
    let (temp, source, target) = workspace()?;
    let dir = temp.path();
    let config = temp.path().join("bad.toml");
    fs::write(&config, "[snapshot]\ncopy_chunk_bytes = 12\n")?;
    let config = path_str(&config);

    let result =
        linkback!(dir, "--config", config, "snapshot", source, target, "S1").assert_failure()?;

    assert_eq!(result.exit_code, 1);
    assert!(result.contains_stderr("copy_chunk_bytes"));
    assert!(!temp.path().join("target/S1").exists());
    Ok(())
}

#[test]
fn test_no_journal_flag() -> Result<()> {
    let (temp, source, target) = workspace()?;
    let dir = temp.path();

    linkback!(dir, "-q", "snapshot", source, target, "S1", "--no-journal").assert_success()?;
    let result =
        linkback!(dir, "-q", "snapshot", source, target, "S2", "--no-journal").assert_success()?;

    assert!(result.contains_stdout("disabled"));
    assert_eq!(
        fs::read_to_string(temp.path().join("target/S2/b/c.txt"))?,
        "CCC"
    );
    Ok(())
}
