use image::{Rgba, RgbaImage};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn sctx_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("sctx");
    path
}

/// Two screens with very different layouts.
fn write_screens(dir: &Path) {
    let left = RgbaImage::from_fn(160, 90, |x, _| {
        if x < 80 {
            Rgba([235, 235, 235, 255])
        } else {
            Rgba([25, 25, 25, 255])
        }
    });
    left.save(dir.join("left.png")).unwrap();

    let top = RgbaImage::from_fn(160, 90, |_, y| {
        if y < 45 {
            Rgba([235, 235, 235, 255])
        } else {
            Rgba([25, 25, 25, 255])
        }
    });
    top.save(dir.join("top.png")).unwrap();
}

/// Config whose capture command prints `screen.png`; tests swap that file
/// to change what the "screen" shows.
fn setup_test_env(extra: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let fixtures = root.join("fixtures");
    fs::create_dir_all(&fixtures).unwrap();
    write_screens(&fixtures);
    fs::copy(fixtures.join("left.png"), root.join("screen.png")).unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/sctx.sqlite"

[capture]
hash_threshold = 5
{extra}

[capture.source]
kind = "command"
command = ["cat", "{root}/screen.png"]

[storage]
screenshot_dir = "{root}/screenshots"
max_screenshots = 10

[server]
bind = "127.0.0.1:0"
"#,
        root = root.display(),
        extra = extra,
    );

    let config_path = config_dir.join("sctx.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn show(tmp: &TempDir, fixture: &str) {
    fs::copy(
        tmp.path().join("fixtures").join(fixture),
        tmp.path().join("screen.png"),
    )
    .unwrap();
}

fn run_sctx(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = sctx_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run sctx binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env("");

    let (stdout, stderr, success) = run_sctx(&config_path, &["init"]);
    assert!(success, "init failed: {}", stderr);
    assert!(stdout.contains("Database initialized successfully"));
    assert!(tmp.path().join("data/sctx.sqlite").exists());
}

#[test]
fn test_init_is_idempotent() {
    let (_tmp, config_path) = setup_test_env("");

    let (_, stderr, success) = run_sctx(&config_path, &["init"]);
    assert!(success, "first init failed: {}", stderr);
    let (_, stderr, success) = run_sctx(&config_path, &["init"]);
    assert!(success, "second init failed: {}", stderr);
}

#[test]
fn test_capture_then_duplicate_across_runs() {
    let (tmp, config_path) = setup_test_env("");
    run_sctx(&config_path, &["init"]);

    let (stdout, stderr, success) = run_sctx(&config_path, &["capture"]);
    assert!(success, "capture failed: {}", stderr);
    assert!(stdout.starts_with("accepted"), "unexpected: {}", stdout);

    // New process, same screen: rejected thanks to warm start.
    let (stdout, stderr, success) = run_sctx(&config_path, &["capture"]);
    assert!(success, "capture failed: {}", stderr);
    assert!(stdout.starts_with("duplicate"), "unexpected: {}", stdout);
    assert!(stdout.contains("distance=0"));

    show(&tmp, "top.png");
    let (stdout, _, _) = run_sctx(&config_path, &["capture"]);
    assert!(stdout.starts_with("accepted"), "unexpected: {}", stdout);

    let files = fs::read_dir(tmp.path().join("screenshots")).unwrap().count();
    assert_eq!(files, 2);
}

#[test]
fn test_capture_without_warm_start_accepts_again() {
    let (_tmp, config_path) = setup_test_env("warm_start = false");

    let (stdout, _, _) = run_sctx(&config_path, &["capture"]);
    assert!(stdout.starts_with("accepted"));
    let (stdout, _, _) = run_sctx(&config_path, &["capture"]);
    assert!(stdout.starts_with("accepted"), "unexpected: {}", stdout);
}

#[test]
fn test_list_and_delete() {
    let (_tmp, config_path) = setup_test_env("");

    let (stdout, _, success) = run_sctx(&config_path, &["list"]);
    assert!(success);
    assert!(stdout.contains("No screenshots stored"));

    run_sctx(&config_path, &["capture"]);
    let (stdout, stderr, success) = run_sctx(&config_path, &["list", "--limit", "5"]);
    assert!(success, "list failed: {}", stderr);
    assert!(stdout.contains("screenshot_"));
    assert!(stdout.contains(".jpg"));

    let (stdout, stderr, success) = run_sctx(&config_path, &["delete", "1"]);
    assert!(success, "delete failed: {}", stderr);
    assert!(stdout.contains("Deleted screenshot 1"));

    let (_, stderr, success) = run_sctx(&config_path, &["delete", "1"]);
    assert!(!success);
    assert!(stderr.contains("screenshot not found"));
}

#[test]
fn test_list_rejects_out_of_range_paging() {
    let (_tmp, config_path) = setup_test_env("");

    for args in [
        ["list", "--limit", "-1"],
        ["list", "--limit", "0"],
        ["list", "--limit", "501"],
        ["list", "--offset", "-5"],
    ] {
        let (_, stderr, success) = run_sctx(&config_path, &args);
        assert!(!success, "{:?} should fail", args);
        assert!(
            stderr.contains("limit must be between 1 and 500")
                || stderr.contains("offset must be >= 0"),
            "unexpected stderr for {:?}: {}",
            args,
            stderr
        );
    }
}

#[test]
fn test_list_date_range() {
    let (_tmp, config_path) = setup_test_env("");
    run_sctx(&config_path, &["capture"]);

    let (stdout, stderr, success) =
        run_sctx(&config_path, &["list", "--start-date", "2000-01-01"]);
    assert!(success, "list failed: {}", stderr);
    assert!(stdout.contains("screenshot_"));

    let (stdout, _, success) = run_sctx(&config_path, &["list", "--end-date", "2000-01-01"]);
    assert!(success);
    assert!(stdout.contains("No screenshots stored"));

    let (_, stderr, success) = run_sctx(&config_path, &["list", "--start-date", "soon"]);
    assert!(!success);
    assert!(stderr.contains("invalid date"));
}

#[test]
fn test_stats() {
    let (_tmp, config_path) = setup_test_env("");
    run_sctx(&config_path, &["capture"]);

    let (stdout, stderr, success) = run_sctx(&config_path, &["stats"]);
    assert!(success, "stats failed: {}", stderr);
    assert!(stdout.contains("Screenshots:  1 / 10"));
}

#[test]
fn test_failing_capture_command_reports_error() {
    let (tmp, config_path) = setup_test_env("");
    fs::remove_file(tmp.path().join("screen.png")).unwrap();

    let (_, stderr, success) = run_sctx(&config_path, &["capture"]);
    assert!(!success);
    assert!(stderr.contains("Capture failed"));
}

#[test]
fn test_invalid_config_rejected() {
    let (_tmp, config_path) = setup_test_env("history_capacity = 0");
    let (_, stderr, success) = run_sctx(&config_path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("history_capacity"));
}

#[test]
fn test_missing_config_fails() {
    let (_, stderr, success) = run_sctx(Path::new("/nonexistent/sctx.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
