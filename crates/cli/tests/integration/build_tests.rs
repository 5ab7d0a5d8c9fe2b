//! `kiln build` tests.

use predicates::prelude::*;

use super::common::{GAME_PROJECT, TestProject};

#[test]
fn missing_compiler_fails_and_skips_dependents() {
  let project = TestProject::new(GAME_PROJECT);

  project
    .kiln_cmd("build")
    .env("KILN_CC", "/nonexistent/kiln-cc")
    .env("KILN_CXX", "/nonexistent/kiln-cxx")
    .assert()
    .failure()
    .stderr(predicate::str::contains("noc: failed to compile"))
    .stdout(predicate::str::contains("hmm: skipped because 'noc' failed"))
    .stdout(predicate::str::contains("garden: skipped because 'hmm' failed"))
    .stdout(predicate::str::contains("Failed: 1"))
    .stdout(predicate::str::contains("Skipped: 2"));
}

#[cfg(unix)]
#[test]
fn build_succeeds_with_working_toolchain() {
  let project = TestProject::new(GAME_PROJECT);

  project
    .kiln_cmd_with_noop_toolchain("build")
    .assert()
    .success()
    .stdout(predicate::str::contains("Succeeded: 3"))
    .stdout(predicate::str::contains("Failed: 0"));

  assert!(project.output_root().join("Debug").join("obj").exists());
}

#[cfg(unix)]
#[test]
fn json_summary_reports_every_target() {
  let project = TestProject::new(GAME_PROJECT);

  let output = project
    .kiln_cmd_with_noop_toolchain("build")
    .args(["--build-type", "Release", "-o", "json"])
    .assert()
    .success()
    .get_output()
    .stdout
    .clone();
  let json: serde_json::Value = serde_json::from_slice(&output).unwrap();

  assert_eq!(json["build_type"], "Release");
  assert_eq!(json["success"], true);
  assert_eq!(json["env_status"], "degraded");
  let names: Vec<_> = json["targets"]
    .as_array()
    .unwrap()
    .iter()
    .map(|t| t["name"].as_str().unwrap().to_string())
    .collect();
  assert_eq!(names, vec!["noc", "hmm", "garden"]);
}

#[cfg(unix)]
#[test]
fn only_preprocessor_links_nothing() {
  let project = TestProject::new(GAME_PROJECT);

  let output = project
    .kiln_cmd_with_noop_toolchain("build")
    .args(["--only-preprocessor", "-o", "json"])
    .assert()
    .success()
    .get_output()
    .stdout
    .clone();
  let json: serde_json::Value = serde_json::from_slice(&output).unwrap();

  for target in json["targets"].as_array().unwrap() {
    assert_eq!(target["artifact"]["kind"], "ObjectSet");
  }
}
