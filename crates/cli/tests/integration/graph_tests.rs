//! `kiln graph` tests.

use predicates::prelude::*;

use super::common::{GAME_PROJECT, TestProject};

#[test]
fn graph_lists_targets_in_dependency_order() {
  let project = TestProject::new(GAME_PROJECT);

  let output = project.kiln_cmd("graph").assert().success().get_output().stdout.clone();
  let stdout = String::from_utf8(output).unwrap();

  let noc = stdout.find("noc (library)").unwrap();
  let hmm = stdout.find("hmm (library)").unwrap();
  let garden = stdout.find("garden (executable)").unwrap();
  assert!(noc < hmm && hmm < garden, "{}", stdout);
  assert!(stdout.contains("links: hmm"));
}

#[test]
fn graph_json_exports_public_includes() {
  let project = TestProject::new(GAME_PROJECT);

  let output = project
    .kiln_cmd("graph")
    .args(["-o", "json"])
    .assert()
    .success()
    .get_output()
    .stdout
    .clone();
  let json: serde_json::Value = serde_json::from_slice(&output).unwrap();

  let targets = json["targets"].as_array().unwrap();
  assert_eq!(targets.len(), 3);
  let garden = targets.iter().find(|t| t["name"] == "garden").unwrap();
  assert_eq!(garden["kind"], "executable");
  let includes = garden["public_includes"].as_array().unwrap();
  assert_eq!(includes.len(), 1);
  assert!(includes[0].as_str().unwrap().ends_with("noc"));
}

#[test]
fn graph_json_keeps_includes_exported_by_dependencies() {
  let project = TestProject::new(
    r#"
    local noc = kiln.add_library{ name = "noc", sources = { "noc/noc.c" } }
    kiln.target_includes(noc, "public", { "shared" })
    local hmm = kiln.add_library{ name = "hmm", sources = { "hmm/hmm.c" } }
    kiln.target_includes(hmm, "private", { "shared" })
    kiln.target_links(hmm, { noc })
    "#,
  );

  let output = project
    .kiln_cmd("graph")
    .args(["-o", "json"])
    .assert()
    .success()
    .get_output()
    .stdout
    .clone();
  let json: serde_json::Value = serde_json::from_slice(&output).unwrap();

  let hmm = json["targets"].as_array().unwrap().iter().find(|t| t["name"] == "hmm").unwrap();
  let includes = hmm["public_includes"].as_array().unwrap();
  assert_eq!(includes.len(), 1);
  assert!(includes[0].as_str().unwrap().ends_with("shared"));
}

#[test]
fn duplicate_target_is_reported() {
  let project = TestProject::new(
    r#"
    kiln.add_library{ name = "noc", sources = { "noc/noc.c" } }
    kiln.add_library{ name = "noc", sources = { "hmm/hmm.c" } }
    "#,
  );

  project
    .kiln_cmd("graph")
    .assert()
    .failure()
    .stderr(predicate::str::contains("duplicate target: 'noc'"));
}

#[test]
fn unknown_declaration_key_is_reported() {
  let project = TestProject::new(r#"kiln.add_executable{ name = "garden", sources = { "code/garden.c" }, optimize = 3 }"#);

  project
    .kiln_cmd("graph")
    .assert()
    .failure()
    .stderr(predicate::str::contains("unknown key 'optimize'"));
}
