use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::Result;
use assert_cmd::prelude::*;
use assert_fs::TempDir;
use opencv::core::{CV_8UC3, Mat, Scalar};
use predicates::prelude::*;
use rstest::*;
use serde_json::Value;

macro_rules! cargo_run {
    ($cmd:expr, $($args:expr),*) => {
        {
            let mut cmd = Command::cargo_bin($cmd)?;
            cmd.env_remove("IMCHECK_EXTERNAL_API_KEY");
            $(cmd.arg($args);)*
            cmd.assert()
        }
    };
}

const RED: (f64, f64, f64) = (0.0, 0.0, 255.0);
const BLUE: (f64, f64, f64) = (255.0, 0.0, 0.0);

fn write_solid(dir: &Path, name: &str, bgr: (f64, f64, f64)) -> Result<PathBuf> {
    let img =
        Mat::new_rows_cols_with_default(64, 64, CV_8UC3, Scalar::new(bgr.0, bgr.1, bgr.2, 0.0))?;
    let path = dir.join(name);
    imcheck::utils::imwrite(&path, &img)?;
    Ok(path)
}

#[test]
fn validate_identical() -> Result<()> {
    let dir = TempDir::new()?;
    let red = write_solid(dir.path(), "red.png", RED)?;
    let out = dir.path().join("validation");

    cargo_run!("imcheck", "-c", dir.path(), "-o", &out, "validate", &red, &red, "--name", "same")
        .success()
        .stdout(predicate::str::contains("overall\texcellent"));

    assert!(out.join("same/validation_results.json").is_file());
    assert!(out.join("same/validation_report.html").is_file());
    Ok(())
}

#[test]
fn validate_with_metadata() -> Result<()> {
    let dir = TempDir::new()?;
    let red = write_solid(dir.path(), "red.png", RED)?;
    let out = dir.path().join("validation");

    cargo_run!(
        "imcheck", "-c", dir.path(), "-o", &out, "validate", &red, &red, "--name", "meta", "--meta",
        "prompt=a red square", "--meta", "seed=42"
    )
    .success();

    let json: Value = serde_json::from_slice(&fs::read(out.join("meta/validation_results.json"))?)?;
    assert_eq!(json["metadata"]["prompt"], "a red square");
    assert_eq!(json["metadata"]["seed"], "42");
    Ok(())
}

#[rstest]
#[case(false, true)]
#[case(true, false)]
fn validate_reject_exit_status(#[case] fail_on_reject: bool, #[case] success: bool) -> Result<()> {
    let dir = TempDir::new()?;
    let red = write_solid(dir.path(), "red.png", RED)?;
    let blue = write_solid(dir.path(), "blue.png", BLUE)?;
    let out = dir.path().join("validation");

    let mut cmd = Command::cargo_bin("imcheck")?;
    cmd.env_remove("IMCHECK_EXTERNAL_API_KEY")
        .arg("-c")
        .arg(dir.path())
        .arg("-o")
        .arg(&out)
        .arg("validate")
        .arg(&red)
        .arg(&blue);
    if fail_on_reject {
        cmd.arg("--fail-on-reject");
    }
    let assert = cmd.assert().stdout(predicate::str::contains("overall\treject"));
    if success {
        assert.success();
    } else {
        assert.failure();
    }
    Ok(())
}

#[test]
fn validate_missing_input() -> Result<()> {
    let dir = TempDir::new()?;
    let red = write_solid(dir.path(), "red.png", RED)?;
    let out = dir.path().join("validation");

    cargo_run!("imcheck", "-c", dir.path(), "-o", &out, "validate", "missing.png", &red)
        .failure()
        .stderr(predicate::str::contains("missing.png"));

    assert!(!out.exists());
    Ok(())
}

#[test]
fn validate_external_without_key() -> Result<()> {
    let dir = TempDir::new()?;
    let red = write_solid(dir.path(), "red.png", RED)?;
    let out = dir.path().join("validation");

    cargo_run!("imcheck", "-c", dir.path(), "-o", &out, "validate", &red, &red, "--external")
        .failure()
        .stderr(predicate::str::contains("API key"));
    Ok(())
}

#[test]
fn validate_external_with_key() -> Result<()> {
    let dir = TempDir::new()?;
    let red = write_solid(dir.path(), "red.png", RED)?;
    let out = dir.path().join("validation");

    cargo_run!(
        "imcheck", "-c", dir.path(), "-o", &out, "--external-api-key", "secret", "validate", &red,
        &red, "--external", "--project-name", "Knights"
    )
    .success()
    .stdout(predicate::str::contains("overall\texcellent"));

    let run = fs::read_dir(&out)?.next().unwrap()?;
    assert!(run.file_name().to_string_lossy().starts_with("external_"));
    let json: Value = serde_json::from_slice(&fs::read(run.path().join("validation_results.json"))?)?;
    assert_eq!(json["external_service"]["integration"], "not_integrated");
    assert_eq!(json["external_service"]["project_name"], "Knights");
    Ok(())
}

#[test]
fn compare_json() -> Result<()> {
    let dir = TempDir::new()?;
    let red = write_solid(dir.path(), "red.png", RED)?;
    let blue = write_solid(dir.path(), "blue.png", BLUE)?;
    let diagnostics = dir.path().join("diag");

    cargo_run!(
        "imcheck", "-c", dir.path(), "compare", &red, &blue, "--output-format", "json",
        "--diagnostics", &diagnostics
    )
    .success()
    .stdout(predicate::str::contains("\"overall\": \"reject\""))
    .stdout(predicate::str::contains("\"edge_accuracy\": 1.0"));

    assert!(diagnostics.join("side_by_side_comparison.png").is_file());
    assert!(diagnostics.join("difference_visualization.png").is_file());
    Ok(())
}

#[test]
fn thresholds_from_config_file() -> Result<()> {
    let dir = TempDir::new()?;

    cargo_run!("imcheck", "-c", dir.path(), "thresholds")
        .success()
        .stdout(predicate::str::contains("[ssim]"))
        .stdout(predicate::str::contains("reject = 0.6"));

    fs::write(
        dir.path().join("imcheck.toml"),
        "[thresholds.ssim]\nreject = 0.5\nacceptable = 0.7\n",
    )?;
    cargo_run!("imcheck", "-c", dir.path(), "thresholds")
        .success()
        .stdout(predicate::str::contains("reject = 0.5"))
        .stdout(predicate::str::contains("acceptable = 0.7"));

    fs::write(
        dir.path().join("imcheck.toml"),
        "[thresholds.ssim]\nreject = 0.9\nacceptable = 0.7\n",
    )?;
    cargo_run!("imcheck", "-c", dir.path(), "thresholds")
        .failure()
        .stderr(predicate::str::contains("imcheck.toml"));
    Ok(())
}

#[test]
fn batch_pairs_by_name() -> Result<()> {
    let dir = TempDir::new()?;
    let generated = dir.path().join("generated");
    let reference = dir.path().join("reference");
    let out = dir.path().join("validation");
    fs::create_dir_all(&generated)?;
    fs::create_dir_all(&reference)?;

    write_solid(&generated, "a.png", RED)?;
    write_solid(&generated, "b.png", RED)?;
    write_solid(&generated, "c.png", RED)?;
    write_solid(&reference, "a.png", RED)?;
    write_solid(&reference, "b.png", BLUE)?;

    cargo_run!(
        "imcheck", "-c", dir.path(), "-o", &out, "batch", &generated, &reference, "--name", "nightly"
    )
    .success()
    .stdout(predicate::str::contains("excellent\t1"))
    .stdout(predicate::str::contains("reject\t1"))
    .stdout(predicate::str::contains("error\t1"));

    let summary: Value =
        serde_json::from_slice(&fs::read(out.join("nightly/batch_summary.json"))?)?;
    assert_eq!(summary["total"], 3);
    assert_eq!(summary["validations"].as_array().unwrap().len(), 2);
    assert_eq!(summary["failures"].as_array().unwrap().len(), 1);
    assert!(out.join("nightly/batch_report.html").is_file());
    Ok(())
}
