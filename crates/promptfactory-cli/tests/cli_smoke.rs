use assert_cmd::Command;
use predicates::prelude::*;
use predicates::str::contains;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const CONFIG: &str = r#"
version: 1
storage:
  path: state/workspace.db
provider:
  kind: fake
dispatch:
  timeout_seconds: 5
  stagger_ms: 0
log_level: warn
"#;

fn pf(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("promptfactory").unwrap();
    cmd.current_dir(dir)
        .env_remove("PROMPTFACTORY_DB")
        .env_remove("PROMPTFACTORY_PROVIDER")
        .env_remove("PROMPTFACTORY_LOG")
        .env_remove("PROMPTFACTORY_CONFIG");
    cmd
}

fn workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("promptfactory.yaml"), CONFIG).unwrap();
    dir
}

fn seed(dir: &Path) {
    pf(dir).args(["prompt", "set-models", "a", "b"]).assert().success();
    pf(dir)
        .args(["prompt", "set-section", "characterSettings", "Be terse."])
        .assert()
        .success();
    pf(dir)
        .args(["version", "save", "first"])
        .assert()
        .success()
        .stdout(contains("first"));
}

#[test]
fn test_init_writes_sample_config_once() {
    let dir = TempDir::new().unwrap();
    pf(dir.path())
        .args(["init", "--gitignore"])
        .assert()
        .success()
        .stderr(contains("created promptfactory.yaml"));
    let written = fs::read_to_string(dir.path().join("promptfactory.yaml")).unwrap();
    assert!(written.contains("max_document_bytes"));
    assert!(dir.path().join(".gitignore").exists());

    pf(dir.path())
        .arg("init")
        .assert()
        .success()
        .stderr(contains("already exists"));
}

#[test]
fn test_chat_then_evaluate_records_accuracy() {
    let dir = workspace();
    let d = dir.path();
    seed(d);

    pf(d)
        .args(["prompt", "show"])
        .assert()
        .success()
        .stdout(contains("## Character\nBe terse."));

    pf(d)
        .args(["chat", "send", "hello"])
        .assert()
        .success()
        .stdout(contains("[a] hello"))
        .stdout(contains("[b] hello"));

    pf(d)
        .args(["chat", "show", "--model", "a"])
        .assert()
        .success()
        .stdout(contains("you: hello"));

    // fake judge scores overall 80 against a seeded accuracy of 0
    pf(d)
        .args(["evaluate", "first", "--model", "a"])
        .assert()
        .success()
        .stdout(contains("accuracy:   0.0 -> 56.0"));

    pf(d)
        .args(["version", "list"])
        .assert()
        .success()
        .stdout(contains("a=56.0"))
        .stdout(contains("b=0.0"));
}

#[test]
fn test_compare_sends_to_each_compared_version() {
    let dir = workspace();
    let d = dir.path();
    seed(d);
    pf(d).args(["prompt", "set-models", "c"]).assert().success();
    pf(d).args(["version", "save", "second"]).assert().success();

    pf(d).args(["compare", "start"]).assert().success();
    pf(d).args(["compare", "toggle", "first"]).assert().success();
    pf(d)
        .args(["compare", "toggle", "second"])
        .assert()
        .success()
        .stdout(contains("selected second"));
    pf(d)
        .args(["compare", "confirm"])
        .assert()
        .success()
        .stdout(contains("comparing 2 versions"));

    pf(d)
        .args(["chat", "send", "hi"])
        .assert()
        .success()
        .stdout(contains("[first / a]"))
        .stdout(contains("[second / c]"));

    pf(d).args(["compare", "exit"]).assert().success();
    pf(d)
        .args(["compare", "show"])
        .assert()
        .success()
        .stdout(contains("phase: idle"));
    // exiting twice is refused
    pf(d).args(["compare", "exit"]).assert().code(1);
}

#[test]
fn test_rubric_scores_show_in_report() {
    let dir = workspace();
    let d = dir.path();
    seed(d);

    pf(d).args(["rubric", "add-category", "Tone"]).assert().success();
    pf(d).args(["rubric", "add", "Tone", "Polite"]).assert().success();
    pf(d)
        .args(["score", "set", "first", "a", "Polite", "4"])
        .assert()
        .success();
    pf(d)
        .args(["score", "set", "first", "a", "Polite", "9"])
        .assert()
        .code(1);

    pf(d)
        .args(["report", "first"])
        .assert()
        .success()
        .stdout(contains("Polite"))
        .stdout(contains("4.00"));

    pf(d).args(["rubric", "retire", "Polite"]).assert().success();
    pf(d)
        .args(["rubric", "list"])
        .assert()
        .success()
        .stdout(contains("Polite (deprecated)"));
}

#[test]
fn test_export_then_import_gets_a_fresh_name() {
    let dir = workspace();
    let d = dir.path();
    seed(d);

    pf(d)
        .args(["version", "export", "first", "--out", "first.json"])
        .assert()
        .success();
    pf(d)
        .args(["version", "import", "first.json"])
        .assert()
        .success()
        .stdout(contains("first (imported)"));

    fs::write(d.join("broken.json"), r#"{"name": "x"}"#).unwrap();
    pf(d)
        .args(["version", "import", "broken.json"])
        .assert()
        .code(2)
        .stderr(contains("data"));
}

#[test]
fn test_exit_codes_for_refusals_and_bad_input() {
    let dir = workspace();
    let d = dir.path();
    seed(d);

    pf(d)
        .args(["version", "show", "frist"])
        .assert()
        .code(1)
        .stderr(contains("version not found"))
        .stderr(contains("did you mean: first"));

    pf(d)
        .args(["prompt", "set-section", "mood", "x"])
        .assert()
        .code(2)
        .stderr(contains("unknown section"));

    pf(d)
        .args(["chat", "rate", "nope", "sideways"])
        .assert()
        .code(2);
}

#[test]
fn test_oversized_prompt_is_logged_and_not_saved() {
    let dir = TempDir::new().unwrap();
    let d = dir.path();
    let config = CONFIG.replace(
        "  path: state/workspace.db\n",
        "  path: state/workspace.db\n  max_document_bytes: 2048\n",
    );
    fs::write(d.join("promptfactory.yaml"), config).unwrap();

    let long = "x".repeat(4096);
    pf(d)
        .args(["prompt", "set-section", "characterSettings", long.as_str()])
        .assert()
        .success()
        .stderr(contains("was not saved"))
        .stderr(contains("prompt-workspace"));

    pf(d)
        .args(["prompt", "show"])
        .assert()
        .success()
        .stdout(contains(long.as_str()).not());
}

#[test]
fn test_bad_config_exits_with_config_error() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("promptfactory.yaml"), "version: 7\n").unwrap();
    pf(dir.path())
        .args(["version", "list"])
        .assert()
        .code(2)
        .stderr(contains("config error"));
}
