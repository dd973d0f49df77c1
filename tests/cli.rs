mod common;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use common::{build_pdf, pdfqa_binary, FixtureImage, FixturePage};
use tempfile::TempDir;

fn setup_test_env() -> (TempDir, PathBuf, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let docs = root.join("docs");
    fs::create_dir_all(docs.join("nested")).unwrap();
    fs::write(
        docs.join("france.pdf"),
        build_pdf(&[FixturePage::text(&["The capital of France is Paris."])
            .with_image(FixtureImage::gray("Im1", 2, 2))]),
    )
    .unwrap();
    fs::write(
        docs.join("nested/rivers.pdf"),
        build_pdf(&[
            FixturePage::text(&["The Seine flows through Paris."]),
            FixturePage::text(&["The Rhine flows through Germany."]),
        ]),
    )
    .unwrap();
    fs::write(docs.join("readme.txt"), "not a pdf").unwrap();

    let config_path = root.join("pdfqa.toml");
    fs::write(
        &config_path,
        r#"[pdf]
resolve_timeout_ms = 1000

[chunking]
max_tokens = 64
tokenizer = "approx"

[retrieval]
max_results = 3
similarity_threshold = 0.5

[embedding]
provider = "hashing"
dims = 128

[generation]
provider = "disabled"
"#,
    )
    .unwrap();

    (tmp, config_path, docs)
}

fn run_pdfqa(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = pdfqa_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run pdfqa binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn extract_prints_pages_and_images() {
    let (_tmp, config_path, docs) = setup_test_env();
    let file = docs.join("france.pdf");

    let (stdout, stderr, success) = run_pdfqa(&config_path, &["extract", file.to_str().unwrap()]);
    assert!(success, "extract failed: stdout={}, stderr={}", stdout, stderr);

    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(value["page_count"], 1);
    assert_eq!(value["pages"][0]["page_number"], 1);
    assert!(value["pages"][0]["text"]
        .as_str()
        .unwrap()
        .contains("capital of France"));
    assert_eq!(value["pages"][0]["images"][0]["object_id"], "Im1");
    assert!(value["pages"][0]["images"][0].get("raw_data").is_none());
}

#[test]
fn extract_can_include_image_data() {
    let (_tmp, config_path, docs) = setup_test_env();
    let file = docs.join("france.pdf");

    let (stdout, stderr, success) = run_pdfqa(
        &config_path,
        &["extract", file.to_str().unwrap(), "--include-image-data"],
    );
    assert!(success, "extract failed: stderr={}", stderr);

    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    // 4 gray pixels 0,1,2,3
    assert_eq!(value["pages"][0]["images"][0]["raw_data"], "AAECAw==");
}

#[test]
fn extract_rejects_non_pdf() {
    let (_tmp, config_path, docs) = setup_test_env();
    let file = docs.join("readme.txt");

    let (_, stderr, success) = run_pdfqa(&config_path, &["extract", file.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("not a PDF"), "stderr={}", stderr);
}

#[test]
fn chunks_walks_directories() {
    let (_tmp, config_path, docs) = setup_test_env();

    let (stdout, stderr, success) = run_pdfqa(&config_path, &["chunks", docs.to_str().unwrap()]);
    assert!(success, "chunks failed: stderr={}", stderr);

    let chunks: Vec<serde_json::Value> = serde_json::from_str(&stdout).unwrap();
    assert_eq!(chunks.len(), 3);
    assert!(chunks[0]["source_ref"]["source"]
        .as_str()
        .unwrap()
        .ends_with("france.pdf"));
    assert_eq!(chunks[2]["source_ref"]["page_number"], 2);
    assert_eq!(chunks[2]["source_ref"]["document_index"], 1);
}

#[test]
fn search_returns_scored_matches() {
    let (_tmp, config_path, docs) = setup_test_env();

    let (stdout, stderr, success) = run_pdfqa(
        &config_path,
        &[
            "search",
            "The capital of France is Paris.",
            "--input",
            docs.to_str().unwrap(),
        ],
    );
    assert!(success, "search failed: stderr={}", stderr);

    let results: Vec<serde_json::Value> = serde_json::from_str(&stdout).unwrap();
    assert!(!results.is_empty());
    assert!(results[0]["chunk"]["text"]
        .as_str()
        .unwrap()
        .contains("capital of France"));
    assert!(results[0]["score"].as_f64().unwrap() > 0.99);
}

#[test]
fn chat_reads_lines_until_end_of_input() {
    let (_tmp, config_path, docs) = setup_test_env();
    let binary = pdfqa_binary();
    let mut child = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(["chat", "--input", docs.to_str().unwrap()])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    // Blank lines are skipped, so no answer is requested before EOF.
    child.stdin.take().unwrap().write_all(b"\n   \n").unwrap();
    let output = child.wait_with_output().unwrap();

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "chat failed: stderr={}", stderr);
    assert!(stderr.contains("Session ready"), "stderr={}", stderr);
    assert!(output.stdout.is_empty());
}

#[test]
fn invalid_config_is_reported() {
    let (tmp, _, docs) = setup_test_env();
    let bad = tmp.path().join("bad.toml");
    fs::write(&bad, "[chunking]\nmax_tokens = 1\n").unwrap();

    let (_, stderr, success) = run_pdfqa(
        &bad,
        &["extract", docs.join("france.pdf").to_str().unwrap()],
    );
    assert!(!success);
    assert!(stderr.contains("max_tokens"), "stderr={}", stderr);
}

#[test]
fn completions_need_no_config() {
    let missing = PathBuf::from("/nonexistent/pdfqa.toml");
    let (stdout, _, success) = run_pdfqa(&missing, &["completions", "bash"]);
    assert!(success);
    assert!(stdout.contains("pdfqa"));
}
