use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn ssearch_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_ssearch"))
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    // Pre-fetched content
    let scriptures_dir = root.join("content/scriptures/en");
    fs::create_dir_all(&scriptures_dir).unwrap();
    fs::write(
        scriptures_dir.join("bookofmormon.json"),
        r#"{
  "books": {
    "1-ne": {
      "chapters": {
        "1": {"verses": [
          {"text": "I, Nephi, having been born of goodly parents."},
          {"text": "Yea, I make a record in the language of my father."},
          {"text": "And I know that the record which I make is true."}
        ]},
        "2": {"verses": [
          {"text": "For behold, it came to pass that the Lord spake unto my father."}
        ]}
      }
    }
  }
}"#,
    )
    .unwrap();

    let cfm_dir = root.join("content/cfm/en");
    fs::create_dir_all(&cfm_dir).unwrap();
    fs::write(
        cfm_dir.join("cfm_bom_2024.json"),
        r#"{
  "lessons": {
    "1": {
      "title": "Introductory Pages of the Book of Mormon",
      "date_range": "January 1-7",
      "scripture_refs": ["1 Nephi 1:1-3"],
      "plain_text": "The Book of Mormon is another testament of Jesus Christ."
    },
    "2": {
      "title": "1 Nephi 1-5",
      "date_range": "January 8-14",
      "scripture_refs": [],
      "plain_text": "I will go and do."
    }
  }
}"#,
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/ssearch.sqlite"

[content]
data_dir = "{root}/content"
request_delay_ms = 0

[ingest]
commit_every = 2
"#,
        root = root.display()
    );

    let config_path = config_dir.join("ssearch.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_ssearch(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = ssearch_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run ssearch binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

const INGEST_BOM: &[&str] = &[
    "ingest",
    "scriptures",
    "--volume",
    "bookofmormon",
    "--lang",
    "en",
];

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_ssearch(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("ok"));

    let (_, _, success) = run_ssearch(&config_path, &["init"]);
    assert!(success, "Second init failed (not idempotent)");
}

#[test]
fn test_ingest_scriptures() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_ssearch(&config_path, INGEST_BOM);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("ingest bookofmormon/en"));
    assert!(stdout.contains("verses: 4"));
    assert!(stdout.contains("records written: 4"));
    assert!(stdout.contains("ok"));
}

#[test]
fn test_existing_partition_is_skipped() {
    let (_tmp, config_path) = setup_test_env();

    run_ssearch(&config_path, INGEST_BOM);
    let (stdout, stderr, success) = run_ssearch(&config_path, INGEST_BOM);
    assert!(success, "skip must not be an error: stderr={}", stderr);
    assert!(stdout.contains("skipped: 4 existing records"));
    assert!(stdout.contains("--force"));
}

#[test]
fn test_force_reloads_partition() {
    let (_tmp, config_path) = setup_test_env();

    run_ssearch(&config_path, INGEST_BOM);
    let mut args = INGEST_BOM.to_vec();
    args.push("--force");
    let (stdout, stderr, success) = run_ssearch(&config_path, &args);
    assert!(success, "force failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("replaced: 4 records"));
    assert!(stdout.contains("records written: 4"));
}

#[test]
fn test_missing_scripture_file_fails() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_ssearch(
        &config_path,
        &["ingest", "scriptures", "--volume", "oldtestament", "--lang", "en"],
    );
    assert!(!success);
    assert!(stderr.contains("oldtestament.json"), "stderr={}", stderr);
}

#[test]
fn test_ingest_lessons() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_ssearch(
        &config_path,
        &["ingest", "lessons", "--year", "2024", "--lang", "en"],
    );
    assert!(success, "lessons failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("ingest cfm 2024/en"));
    assert!(stdout.contains("lessons: 2"));
}

#[test]
fn test_lesson_testament_mismatch_fails() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_ssearch(
        &config_path,
        &[
            "ingest",
            "lessons",
            "--year",
            "2024",
            "--lang",
            "en",
            "--testament",
            "nt",
        ],
    );
    assert!(!success);
    assert!(stderr.contains("2024 lessons cover 'bom'"), "stderr={}", stderr);
}

#[test]
fn test_conference_requires_month_with_year() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_ssearch(
        &config_path,
        &["ingest", "conference", "--year", "2024", "--lang", "en"],
    );
    assert!(!success);
    assert!(stderr.contains("--month"), "stderr={}", stderr);

    let (_, stderr, success) =
        run_ssearch(&config_path, &["ingest", "conference", "--lang", "en"]);
    assert!(!success);
    assert!(stderr.contains("required"), "stderr={}", stderr);
}

#[test]
fn test_stats_lists_partitions() {
    let (_tmp, config_path) = setup_test_env();

    run_ssearch(&config_path, INGEST_BOM);
    let (stdout, stderr, success) = run_ssearch(&config_path, &["stats"]);
    assert!(success, "stats failed: stderr={}", stderr);
    assert!(stdout.contains("scriptures: 4 records, 0 embedded"));
    assert!(stdout.contains("bookofmormon/en"));
    assert!(stdout.contains("conference: 0 records"));
}

#[test]
fn test_embed_dry_run_counts_pending() {
    let (_tmp, config_path) = setup_test_env();

    run_ssearch(&config_path, INGEST_BOM);
    let (stdout, stderr, success) = run_ssearch(
        &config_path,
        &["embed", "scriptures", "--lang", "en", "--dry-run"],
    );
    assert!(success, "dry run failed: stderr={}", stderr);
    assert!(stdout.contains("records needing embeddings: 4"));
}

#[test]
fn test_embed_without_provider_fails() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) =
        run_ssearch(&config_path, &["embed", "scriptures", "--lang", "en"]);
    assert!(!success);
    assert!(stderr.contains("disabled"), "stderr={}", stderr);
}

#[test]
fn test_export_empty_conference_to_file() {
    let (tmp, config_path) = setup_test_env();
    let out = tmp.path().join("exports/2024-10-en.json");

    let (_, stderr, success) = run_ssearch(
        &config_path,
        &[
            "export",
            "conference",
            "--year",
            "2024",
            "--month",
            "10",
            "--lang",
            "en",
            "--output",
            out.to_str().unwrap(),
        ],
    );
    assert!(success, "export failed: stderr={}", stderr);
    assert!(stderr.contains("Exported 0 talks"));

    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(json["year"], 2024);
    assert_eq!(json["month"], "10");
    assert_eq!(json["talk_count"], 0);
}
