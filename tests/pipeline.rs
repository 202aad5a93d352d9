//! Library-level tests: configuration → service → SQLite, without the CLI.

use image::{Rgba, RgbaImage};
use screen_context::config::Config;
use screen_context::screenshots;
use screen_context::service::Service;
use screen_context::sink::recent_fingerprints;
use std::path::Path;
use tempfile::TempDir;

fn write_screen(path: &Path, split_vertical: bool, invert: bool) {
    let img = RgbaImage::from_fn(128, 96, |x, y| {
        let bright = (if split_vertical { x < 64 } else { y < 48 }) ^ invert;
        if bright {
            Rgba([230, 230, 230, 255])
        } else {
            Rgba([30, 30, 30, 255])
        }
    });
    img.save(path).unwrap();
}

fn config(dir: &TempDir, extra_capture: &str, max_screenshots: u64) -> Config {
    let root = dir.path().display();
    let src = format!(
        r#"[db]
path = "{root}/sctx.sqlite"

[capture]
{extra_capture}

[capture.source]
kind = "command"
command = ["cat", "{root}/screen.png"]

[storage]
screenshot_dir = "{root}/shots"
max_screenshots = {max_screenshots}
"#
    );
    let path = dir.path().join("sctx.toml");
    std::fs::write(&path, src).unwrap();
    screen_context::config::load_config(&path).unwrap()
}

#[tokio::test]
async fn test_warm_start_rejects_frame_stored_by_previous_run() {
    let dir = TempDir::new().unwrap();
    write_screen(&dir.path().join("screen.png"), true, false);
    let cfg = config(&dir, "", 100);

    let svc = Service::open(&cfg).await.unwrap();
    let first = svc.scheduler.trigger_now().await.unwrap();
    assert!(first.decision.accepted);
    let id = first.stored_as.unwrap();
    svc.close().await;

    let svc = Service::open(&cfg).await.unwrap();
    assert_eq!(svc.scheduler.gate_summary().fingerprints, 1);
    let second = svc.scheduler.trigger_now().await.unwrap();
    assert!(!second.decision.accepted);
    assert_eq!(second.decision.matched_reference, Some(id));
    assert_eq!(screenshots::count_screenshots(&svc.pool).await.unwrap(), 1);
    svc.close().await;
}

#[tokio::test]
async fn test_distinct_screens_are_all_kept() {
    let dir = TempDir::new().unwrap();
    let screen = dir.path().join("screen.png");
    let cfg = config(&dir, "", 100);
    let svc = Service::open(&cfg).await.unwrap();

    for (vertical, invert) in [(true, false), (false, false), (true, true), (false, true)] {
        write_screen(&screen, vertical, invert);
        let eval = svc.scheduler.trigger_now().await.unwrap();
        assert!(eval.decision.accepted, "screen {:?} rejected", (vertical, invert));
    }

    let status = svc.scheduler.status();
    assert_eq!(status.captures_count, 4);
    assert_eq!(status.duplicates_skipped, 0);

    let listed = screenshots::list_screenshots(&svc.pool, &Default::default(), 10, 0).await.unwrap();
    assert_eq!(listed.len(), 4);
    assert!(listed.windows(2).all(|w| w[0].captured_at >= w[1].captured_at));
    svc.close().await;
}

#[tokio::test]
async fn test_retention_bounds_stored_screenshots() {
    let dir = TempDir::new().unwrap();
    let screen = dir.path().join("screen.png");
    let cfg = config(&dir, "", 2);
    let svc = Service::open(&cfg).await.unwrap();

    for (vertical, invert) in [(true, false), (false, false), (true, true)] {
        write_screen(&screen, vertical, invert);
        svc.scheduler.trigger_now().await.unwrap();
    }

    assert_eq!(screenshots::count_screenshots(&svc.pool).await.unwrap(), 2);
    let files = std::fs::read_dir(dir.path().join("shots")).unwrap().count();
    assert_eq!(files, 2);
    assert_eq!(recent_fingerprints(&svc.pool, 10).await.unwrap().len(), 2);
    svc.close().await;
}

#[tokio::test]
async fn test_dedup_disabled_keeps_every_frame() {
    let dir = TempDir::new().unwrap();
    write_screen(&dir.path().join("screen.png"), true, false);
    let cfg = config(&dir, "deduplicate = false", 100);
    let svc = Service::open(&cfg).await.unwrap();

    for _ in 0..3 {
        assert!(svc.scheduler.trigger_now().await.unwrap().decision.accepted);
    }
    assert_eq!(screenshots::count_screenshots(&svc.pool).await.unwrap(), 3);
    svc.close().await;
}

#[tokio::test]
async fn test_lower_threshold_via_configure() {
    let dir = TempDir::new().unwrap();
    write_screen(&dir.path().join("screen.png"), true, false);
    let cfg = config(&dir, "hash_threshold = 0", 100);
    let svc = Service::open(&cfg).await.unwrap();

    svc.scheduler.trigger_now().await.unwrap();
    // Identical frame is still within an inclusive threshold of 0.
    assert!(!svc.scheduler.trigger_now().await.unwrap().decision.accepted);

    svc.scheduler.configure(Some(10), Some(1)).await;
    let summary = svc.scheduler.gate_summary();
    assert_eq!((summary.threshold, summary.capacity), (10, 1));
    svc.close().await;
}
