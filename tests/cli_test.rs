mod common;

use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::Path;
use std::process::{Command, Output};
use std::thread;
use tempfile::tempdir;

use common::record;
use venue_sync::pipeline::storage::dataset::DatasetWriter;

fn venue_sync(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_venue_sync"))
        .args(args)
        .current_dir(dir)
        .env_remove("VENUE_SYNC_CONFIG")
        .env_remove("VENUE_SYNC_METRICS_PORT")
        .env("RUST_LOG", "info")
        .env("NO_PROXY", "127.0.0.1")
        .env("no_proxy", "127.0.0.1")
        .output()
        .unwrap()
}

/// Answers every request on a local port with an empty listing page.
fn serve_empty_listing() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            // headers, then whatever body Content-Length announces
            loop {
                let n = stream.read(&mut buf).unwrap_or(0);
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request).to_lowercase();
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if request.len() >= end + 4 + length {
                        break;
                    }
                }
            }
            let body = r#"{"ResultCount":"0","BOARDLIST":[]}"#;
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes());
        }
    });
    port
}

#[test]
fn test_collect_dry_run_stdout_is_only_json() {
    let dir = tempdir().unwrap();
    let port = serve_empty_listing();
    let config = dir.path().join("config.toml");
    std::fs::write(
        &config,
        format!(
            r#"
            [crawl]
            delay_min_secs = 0.0
            delay_max_secs = 0.0
            max_attempts = 1
            retry_delay_secs = 0.0
            slow_threshold_secs = 0.0
            lagging_threshold_secs = 0.0

            [listing]
            endpoint = "http://127.0.0.1:{}/getParishList.asp"
            "#,
            port
        ),
    )
    .unwrap();

    let output = venue_sync(
        dir.path(),
        &["--config", config.to_str().unwrap(), "collect", "--dry-run", "--skip-details"],
    );

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8(output.stdout).unwrap();
    let records: Vec<serde_json::Value> = serde_json::from_str(&stdout).unwrap();
    assert!(records.is_empty());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Collection results"));
    assert!(stderr.contains("INFO"));
}

#[test]
fn test_load_summary_lists_succeeded_ids() {
    let dir = tempdir().unwrap();
    let artifact = dir.path().join("venues.json");
    DatasetWriter::new(&artifact)
        .write(&[record("a", "Alpha"), record("b", "Bravo")])
        .unwrap();

    let output = venue_sync(
        dir.path(),
        &["load", "--dry-run", "--artifact", artifact.to_str().unwrap()],
    );

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Succeeded: 2"));
    assert!(stdout.contains("✓ a"));
    assert!(stdout.contains("✓ b"));
    assert!(!stdout.contains("INFO"));
}
