//! `kiln clean` tests.

use super::common::{GAME_PROJECT, TestProject};

#[test]
fn clean_removes_only_the_requested_build_type() {
  let project = TestProject::new(GAME_PROJECT);
  project.write_file("build/Debug/garden", "old");
  project.write_file("build/Release/garden", "old");

  project.kiln_cmd("clean").assert().success();

  assert!(!project.output_root().join("Debug").exists());
  assert!(project.output_root().join("Release/garden").exists());
}

#[test]
fn clean_honors_output_root() {
  let project = TestProject::new(GAME_PROJECT);
  project.write_file("out/Release/garden", "old");

  project
    .kiln_cmd("clean")
    .arg("--output-root")
    .arg(project.temp.path().join("out"))
    .args(["--build-type", "Release"])
    .assert()
    .success();

  assert!(!project.temp.path().join("out/Release").exists());
}
