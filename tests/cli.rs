use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let inbox = root.join("notes/inbox");
    fs::create_dir_all(inbox.join("phone")).unwrap();
    fs::write(inbox.join("groceries.md"), "buy milk\neggs").unwrap();
    fs::write(inbox.join("phone/movies.txt"), "Dune, Alien").unwrap();
    fs::write(inbox.join("scan.pdf"), "%PDF").unwrap();

    let config_content = format!(
        r#"[paths]
inbox = "{root}/notes/inbox"
processed = "{root}/notes/processed"
structured = "{root}/notes/structured"

[classifier]
provider = "disabled"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("notesort.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_notesort(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = env!("CARGO_BIN_EXE_notesort");
    let output = Command::new(binary)
        .arg("--config")
        .arg(config_path)
        .arg("--progress")
        .arg("off")
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run notesort binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn structured(tmp: &TempDir) -> PathBuf {
    tmp.path().join("notes/structured")
}

fn write_consistent_snapshots(tmp: &TempDir) {
    let dir = structured(tmp);
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("notes.json"),
        r#"[{"id":0,"title":"groceries","content":"buy milk"},{"id":1,"title":"phone","content":"847-555-0123"}]"#,
    )
    .unwrap();
    fs::write(
        dir.join("extractions.json"),
        r#"[{"note_id":0,"extractions":[{"category":"Shopping","content":"buy milk"}],"unused":false},{"note_id":1,"extractions":[],"unused":true}]"#,
    )
    .unwrap();
    fs::write(dir.join("taxonomy.json"), r#"{"Shopping List":["Shopping"]}"#).unwrap();
}

#[test]
fn test_ingest_moves_sources_and_writes_notes() {
    let (tmp, config) = setup_test_env();
    let (stdout, stderr, success) = run_notesort(&config, &["ingest"]);
    assert!(success, "ingest failed: {}", stderr);
    assert!(stdout.contains("notes captured: 2"), "{}", stdout);
    assert!(stdout.contains("sources relocated: 2"), "{}", stdout);

    let inbox = tmp.path().join("notes/inbox");
    assert!(!inbox.join("groceries.md").exists());
    assert!(inbox.join("scan.pdf").exists());
    assert!(tmp.path().join("notes/processed/phone/movies.txt").exists());

    let notes = fs::read_to_string(structured(&tmp).join("notes.json")).unwrap();
    let notes: serde_json::Value = serde_json::from_str(&notes).unwrap();
    assert_eq!(notes[0]["id"], 0);
    assert_eq!(notes[0]["title"], "groceries");
    assert_eq!(notes[1]["id"], 1);
}

#[test]
fn test_second_ingest_is_noop() {
    let (tmp, config) = setup_test_env();
    assert!(run_notesort(&config, &["ingest"]).2);
    let before = fs::read_to_string(structured(&tmp).join("notes.json")).unwrap();

    let (stdout, _, success) = run_notesort(&config, &["ingest"]);
    assert!(success);
    assert!(stdout.contains("nothing to ingest"), "{}", stdout);
    let after = fs::read_to_string(structured(&tmp).join("notes.json")).unwrap();
    assert_eq!(before, after);
}

#[test]
fn test_ingest_dry_run_touches_nothing() {
    let (tmp, config) = setup_test_env();
    let (stdout, _, success) = run_notesort(&config, &["ingest", "--dry-run"]);
    assert!(success);
    assert!(stdout.contains("sources found: 2"), "{}", stdout);
    assert!(tmp.path().join("notes/inbox/groceries.md").exists());
    assert!(!structured(&tmp).join("notes.json").exists());
}

#[test]
fn test_extract_with_disabled_classifier_fails() {
    let (tmp, config) = setup_test_env();
    assert!(run_notesort(&config, &["ingest"]).2);

    let (_, stderr, success) = run_notesort(&config, &["extract"]);
    assert!(!success);
    assert!(stderr.contains("disabled"), "{}", stderr);
    assert!(!structured(&tmp).join("extractions.json").exists());
}

#[test]
fn test_extract_without_notes_snapshot_fails() {
    let (_tmp, config) = setup_test_env();
    let (_, stderr, success) = run_notesort(&config, &["extract"]);
    assert!(!success);
    assert!(stderr.contains("notes.json"), "{}", stderr);
}

#[test]
fn test_index_show_and_status() {
    let (tmp, config) = setup_test_env();
    write_consistent_snapshots(&tmp);

    let (stdout, stderr, success) = run_notesort(&config, &["index"]);
    assert!(success, "index failed: {}", stderr);
    assert!(stdout.contains("fragments filed: 1"), "{}", stdout);

    let index = fs::read_to_string(structured(&tmp).join("index.json")).unwrap();
    let index: serde_json::Value = serde_json::from_str(&index).unwrap();
    assert_eq!(
        index,
        serde_json::json!({"Shopping List": [{"note_id": 0, "content": "buy milk"}]})
    );

    let (stdout, _, success) = run_notesort(&config, &["show"]);
    assert!(success);
    assert!(stdout.contains("Shopping List"));

    let (stdout, _, success) = run_notesort(&config, &["show", "shopping list", "--json"]);
    assert!(success);
    let entries: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(entries[0]["content"], "buy milk");

    let (_, _, success) = run_notesort(&config, &["show", "Recipes"]);
    assert!(!success);

    let (stdout, stderr, success) = run_notesort(&config, &["status"]);
    assert!(success, "status failed: {}", stderr);
    assert!(stdout.contains("consistency: ok"), "{}", stdout);
}

#[test]
fn test_status_counts_only_ingestible_sources() {
    let (tmp, config) = setup_test_env();
    fs::write(tmp.path().join("notes/inbox/.DS_Store"), "junk").unwrap();

    let (stdout, _, success) = run_notesort(&config, &["status"]);
    assert!(success);
    assert!(stdout.contains("(2 file(s) waiting)"), "{}", stdout);

    assert!(run_notesort(&config, &["ingest"]).2);
    let (stdout, _, success) = run_notesort(&config, &["status"]);
    assert!(success);
    assert!(tmp.path().join("notes/inbox/scan.pdf").exists());
    assert!(stdout.contains("(0 file(s) waiting)"), "{}", stdout);
}

#[test]
fn test_status_flags_inconsistent_index() {
    let (tmp, config) = setup_test_env();
    write_consistent_snapshots(&tmp);
    fs::write(structured(&tmp).join("index.json"), r#"{"Shopping List":[]}"#).unwrap();

    let (stdout, _, success) = run_notesort(&config, &["status"]);
    assert!(!success);
    assert!(stdout.contains("index-conservation"), "{}", stdout);
}

#[test]
fn test_unknown_provider_rejected() {
    let (tmp, _) = setup_test_env();
    let config_path = tmp.path().join("config/bad.toml");
    fs::write(
        &config_path,
        r#"[paths]
inbox = "inbox"
processed = "processed"
structured = "structured"

[classifier]
provider = "mystery"
"#,
    )
    .unwrap();

    let (_, stderr, success) = run_notesort(&config_path, &["status"]);
    assert!(!success);
    assert!(stderr.contains("mystery"), "{}", stderr);
}
