use std::fs;
use std::path::PathBuf;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

/// A project directory plus an isolated HOME so global settings and skills
/// never leak in from the machine running the tests
struct Fixture {
    temp: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("home")).unwrap();
        fs::create_dir_all(temp.path().join("project")).unwrap();
        Self { temp }
    }

    fn project(&self) -> PathBuf {
        self.temp.path().join("project")
    }

    fn write(&self, relative: &str, content: &str) {
        let path = self.project().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn cmd(&self) -> assert_cmd::Command {
        let mut cmd = cargo_bin_cmd!("nodedoc");
        cmd.env("HOME", self.temp.path().join("home"))
            .env_remove("NODEDOC_LOG")
            .arg("--dir")
            .arg(self.project());
        cmd
    }
}

const LOCKFILE: &str = r#"{
  "name": "app",
  "lockfileVersion": 3,
  "packages": {
    "": { "name": "app", "version": "1.0.0" },
    "node_modules/lodash": { "version": "4.17.21" },
    "node_modules/legacy/node_modules/lodash": { "version": "3.10.1" },
    "node_modules/legacy": { "version": "1.0.0" }
  }
}"#;

#[test]
fn test_cli_help() {
    let mut cmd = cargo_bin_cmd!("nodedoc");
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Diagnose and fix Node.js dependency problems"))
        .stdout(predicate::str::contains("diagnose"))
        .stdout(predicate::str::contains("rn-doctor"))
        .stdout(predicate::str::contains("skills"));
}

#[test]
fn test_lock_reports_duplicates() {
    let fixture = Fixture::new();
    fixture.write("package.json", r#"{"name": "app"}"#);
    fixture.write("package-lock.json", LOCKFILE);

    fixture
        .cmd()
        .arg("lock")
        .assert()
        .success()
        .stdout(predicate::str::contains("Found 1 packages with multiple versions"))
        .stdout(predicate::str::contains("├─ version 3.10.1"))
        .stdout(predicate::str::contains("Run: npm dedupe"));
}

#[test]
fn test_lock_json_output() {
    let fixture = Fixture::new();
    fixture.write("package-lock.json", LOCKFILE);

    fixture
        .cmd()
        .args(["--json", "lock"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""kind": "npm""#))
        .stdout(predicate::str::contains(r#""name": "lodash""#));
}

#[test]
fn test_lock_without_lockfile_fails() {
    let fixture = Fixture::new();
    fixture
        .cmd()
        .arg("lock")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No lock file found"));
}

#[test]
fn test_strict_exit_code() {
    let fixture = Fixture::new();
    fixture.write("package.json", r#"{"dependencies": {"react": "18.2.0"}}"#);

    fixture
        .cmd()
        .arg("rn-doctor")
        .assert()
        .success()
        .stdout(predicate::str::contains("Not a React Native project"));

    fixture.cmd().args(["--strict", "rn-doctor"]).assert().code(1);
}

#[test]
fn test_missing_manifest_is_an_error() {
    let fixture = Fixture::new();
    fixture
        .cmd()
        .arg("eslint")
        .assert()
        .failure()
        .stderr(predicate::str::contains("package.json not found"));
}

#[test]
fn test_audit_from_saved_output() {
    let fixture = Fixture::new();
    fixture.write(
        "audit.json",
        r#"{
          "vulnerabilities": {
            "minimist": {"severity": "critical", "via": [], "range": "<=0.2.3", "fixAvailable": true}
          },
          "metadata": {"dependencies": {"prod": 1, "dev": 0, "total": 1}}
        }"#,
    );
    let input = fixture.project().join("audit.json");

    fixture
        .cmd()
        .arg("audit")
        .arg("--input")
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("Found 1 vulnerabilities"))
        .stdout(predicate::str::contains("Package: minimist"));

    fixture
        .cmd()
        .args(["--strict", "audit", "--input"])
        .arg(&input)
        .assert()
        .code(1);
}

#[test]
fn test_tsconfig_json() {
    let fixture = Fixture::new();
    fixture.write("package.json", "{}");

    fixture
        .cmd()
        .args(["--json", "tsconfig"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""found": false"#));
}

#[test]
fn test_skills_lifecycle() {
    let fixture = Fixture::new();

    fixture
        .cmd()
        .args(["skills", "new", "peer-deps", "--description", "Peer dependency help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created skill 'peer-deps'"));
    assert!(fixture
        .project()
        .join(".claude/skills/peer-deps/SKILL.md")
        .is_file());

    fixture
        .cmd()
        .args(["skills", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("peer-deps v0.1.0 [project] - Peer dependency help"));

    fixture
        .cmd()
        .args(["skills", "show", "peer-deps"])
        .assert()
        .success()
        .stdout(predicate::str::contains("# Peer Deps"));

    fixture.write(
        "skills/skill-rules.json",
        r#"{"skills": {"peer-deps": {"priority": "high", "promptTriggers": {"keywords": ["ERESOLVE"]}}}}"#,
    );
    fixture
        .cmd()
        .args(["skills", "match", "--prompt", "npm ERR! code ERESOLVE"])
        .assert()
        .success()
        .stdout(predicate::str::contains("peer-deps (high) - matched keyword 'ERESOLVE'"));

    fixture
        .cmd()
        .args(["--strict", "skills", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 rule(s) compiled"));
}

#[test]
fn test_skills_match_binary_file_uses_path_only() {
    let fixture = Fixture::new();
    fixture.write(
        "skills/skill-rules.json",
        r#"{"skills": {"assets": {"fileTriggers": {"pathPatterns": ["assets/*.png"], "contentPatterns": ["PNG"]}}}}"#,
    );
    let image = fixture.project().join("assets/logo.png");
    fs::create_dir_all(image.parent().unwrap()).unwrap();
    fs::write(&image, [0x89, b'P', b'N', b'G', 0xff, 0xfe, 0x00, 0x01]).unwrap();

    fixture
        .cmd()
        .args(["skills", "match", "--file", "assets/logo.png"])
        .assert()
        .success()
        .stdout(predicate::str::contains("assets (medium) - matched path"));
}

#[test]
fn test_skills_show_unknown() {
    let fixture = Fixture::new();
    fixture
        .cmd()
        .args(["skills", "show", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("skill 'nope' not found"));
}

#[test]
fn test_config_commands() {
    let fixture = Fixture::new();
    fixture.write(".nodedoc.toml", "[display]\nmax_items = 3\n");

    fixture
        .cmd()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("max_items = 3"));

    fixture
        .cmd()
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains(".nodedoc.toml"))
        .stdout(predicate::str::contains("config.toml"));
}
