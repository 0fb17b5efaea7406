use anyhow::Result;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

const PROJECT: &str = r#"
[audio]
remove_missing = true

[audio.default]
opus_bitrate = "32k"
mp3_quality = "9"
mono = false

[[audio.group]]
src = "raw/*.wav"
dest = "out"
"#;

fn project(temp_dir: &TempDir) -> Result<()> {
    fs::write(temp_dir.path().join("ave.toml"), PROJECT)?;
    fs::create_dir_all(temp_dir.path().join("raw"))?;
    fs::write(temp_dir.path().join("raw/jump.wav"), b"RIFF....WAVE")?;
    Ok(())
}

#[test]
fn test_missing_project_file_fails() -> Result<()> {
    let temp_dir = TempDir::new()?;

    Command::cargo_bin("ave")?
        .current_dir(temp_dir.path())
        .args(["audio", "--dry-run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no project file found at"));

    Ok(())
}

#[test]
fn test_missing_section_fails() -> Result<()> {
    let temp_dir = TempDir::new()?;
    fs::write(temp_dir.path().join("ave.toml"), "[audio]\n")?;

    Command::cargo_bin("ave")?
        .current_dir(temp_dir.path())
        .args(["video", "--dry-run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no [video] section"));

    Ok(())
}

#[test]
fn test_dry_run_reports_without_writing_cache() -> Result<()> {
    let temp_dir = TempDir::new()?;
    project(&temp_dir)?;

    Command::cargo_bin("ave")?
        .current_dir(temp_dir.path())
        .args(["audio", "--dry-run"])
        .assert()
        .success()
        .stderr(predicate::str::contains("stale output(s)"));

    assert!(!temp_dir.path().join(".aveaudiocache").exists());
    assert!(!temp_dir.path().join("out").join("jump.opus").exists());

    Ok(())
}

#[test]
fn test_explicit_config_path() -> Result<()> {
    let temp_dir = TempDir::new()?;
    project(&temp_dir)?;
    fs::rename(
        temp_dir.path().join("ave.toml"),
        temp_dir.path().join("project.toml"),
    )?;

    Command::cargo_bin("ave")?
        .current_dir(temp_dir.path())
        .args(["--config", "project.toml", "audio", "--dry-run"])
        .assert()
        .success();

    Ok(())
}

#[test]
fn test_broken_project_file_names_the_file() -> Result<()> {
    let temp_dir = TempDir::new()?;
    fs::write(temp_dir.path().join("ave.toml"), "[audio\nbroken")?;

    Command::cargo_bin("ave")?
        .current_dir(temp_dir.path())
        .args(["audio", "--dry-run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ave.toml"));

    Ok(())
}

#[test]
fn test_quiet_suppresses_summary() -> Result<()> {
    let temp_dir = TempDir::new()?;
    project(&temp_dir)?;

    Command::cargo_bin("ave")?
        .current_dir(temp_dir.path())
        .args(["--quiet", "audio", "--dry-run"])
        .assert()
        .success()
        .stderr(predicate::str::contains("stale").not());

    Ok(())
}

#[test]
fn test_help_lists_subcommands() -> Result<()> {
    Command::cargo_bin("ave")?
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("audio"))
        .stdout(predicate::str::contains("video"))
        .stdout(predicate::str::contains("all"));

    Ok(())
}

#[test]
fn test_version_flag() -> Result<()> {
    Command::cargo_bin("ave")?
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));

    Ok(())
}

#[test]
fn test_completion_generates_script() -> Result<()> {
    Command::cargo_bin("ave")?
        .args(["completion", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ave"));

    Ok(())
}
