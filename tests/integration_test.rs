use image::{Rgb, RgbImage};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::process::{Child, Command, Output};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;
use tokio_test::assert_ok;

// Use atomic counter to give each test a unique port
static PORT_COUNTER: AtomicU16 = AtomicU16::new(9500);

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct InfoResponse {
    version: String,
    supported_formats: Vec<String>,
    rasterizer: String,
    layout: serde_json::Value,
    max_file_size_bytes: usize,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    code: String,
}

/// Three-column page with a binding line at x=96 and two question blocks per column
fn exam_page() -> RgbImage {
    let mut img = RgbImage::from_pixel(1200, 1600, Rgb([255, 255, 255]));
    for y in 0..1600 {
        for x in 96..99 {
            img.put_pixel(x, y, Rgb([20, 20, 20]));
        }
    }
    for col_x in [116u32, 477, 838] {
        for (top, bottom) in [(300u32, 500u32), (700, 900)] {
            for y in top..bottom {
                for x in col_x + 30..col_x + 300 {
                    img.put_pixel(x, y, Rgb([0, 0, 0]));
                }
            }
        }
    }
    img
}

fn png_bytes(img: &RgbImage) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
    buf.into_inner()
}

fn cut_command(input: &Path, output: &Path) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_exam-cutter"));
    command
        .arg("cut")
        .arg("--input")
        .arg(input)
        .arg("--output")
        .arg(output);
    command
}

fn run_cut(input: &Path, output: &Path) -> Output {
    cut_command(input, output)
        .output()
        .expect("Failed to run exam-cutter")
}

fn crop_names(dir: &Path, base: &str) -> Vec<String> {
    jpg_names(dir)
        .into_iter()
        .filter(|n| n.starts_with(&format!("{}_", base)))
        .collect()
}

fn jpg_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .filter(|n| n.ends_with(".jpg"))
        .collect();
    names.sort();
    names
}

#[test]
fn test_cut_writes_crops_overlay_and_report() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("scans");
    let output = dir.path().join("questions");
    fs::create_dir(&input).unwrap();
    exam_page().save(input.join("exam.png")).unwrap();

    let result = run_cut(&input, &output);
    assert!(
        result.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&result.stderr)
    );

    let names = jpg_names(&output);
    let crops: Vec<_> = names.iter().filter(|n| n.starts_with("exam_")).collect();
    assert_eq!(crops.len(), 6, "crops: {:?}", crops);
    assert!(names.contains(&"exam_p1_c1_q1.jpg".to_string()));
    assert!(names.contains(&"exam_p1_c3_q2.jpg".to_string()));
    assert!(names.contains(&"debug_exam_p1.jpg".to_string()));

    let report: serde_json::Value =
        serde_json::from_slice(&fs::read(output.join("cut_report.json")).unwrap()).unwrap();
    assert_eq!(report["questions"], 6);
    assert_eq!(report["pages_failed"], 0);
    assert_eq!(report["files"][0]["pages"][0]["anchor"]["x"], 116);
}

#[test]
fn test_cut_on_empty_directory_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out");

    let result = run_cut(dir.path(), &output);
    assert!(result.status.success());
    assert!(!output.join("cut_report.json").exists());
}

#[test]
fn test_cut_isolates_broken_files() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("scans");
    let output = dir.path().join("out");
    fs::create_dir(&input).unwrap();
    fs::write(input.join("broken.pdf"), b"%PDF-1.4 truncated").unwrap();
    exam_page().save(input.join("good.png")).unwrap();

    let result = run_cut(&input, &output);
    assert!(result.status.success());

    let report: serde_json::Value =
        serde_json::from_slice(&fs::read(output.join("cut_report.json")).unwrap()).unwrap();
    assert_eq!(report["files_failed"], 1);
    assert_eq!(report["questions"], 6);
    assert!(report["files"][0]["error"].is_string());
}

#[test]
fn test_cut_honours_layout_flags() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("scans");
    let output = dir.path().join("out");
    fs::create_dir(&input).unwrap();
    exam_page().save(input.join("exam.png")).unwrap();

    // Two columns, and no gap on the page is taller than 400 rows
    let result = cut_command(&input, &output)
        .args(["--columns", "2", "--gap-min-height", "400"])
        .output()
        .expect("Failed to run exam-cutter");
    assert!(
        result.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&result.stderr)
    );

    assert_eq!(
        crop_names(&output, "exam"),
        vec!["exam_p1_c1_q1.jpg", "exam_p1_c2_q1.jpg"]
    );
}

#[test]
fn test_cut_reads_layout_from_environment() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("scans");
    let output = dir.path().join("out");
    fs::create_dir(&input).unwrap();
    exam_page().save(input.join("exam.png")).unwrap();

    let result = cut_command(&input, &output)
        .env("CUTTER_COLUMNS", "2")
        .output()
        .expect("Failed to run exam-cutter");
    assert!(result.status.success());

    assert_eq!(
        crop_names(&output, "exam"),
        vec![
            "exam_p1_c1_q1.jpg",
            "exam_p1_c1_q2.jpg",
            "exam_p1_c2_q1.jpg",
            "exam_p1_c2_q2.jpg"
        ]
    );
    let report: serde_json::Value =
        serde_json::from_slice(&fs::read(output.join("cut_report.json")).unwrap()).unwrap();
    assert_eq!(
        report["files"][0]["pages"][0]["columns"]
            .as_array()
            .unwrap()
            .len(),
        2
    );
}

#[test]
fn test_cut_rejects_invalid_layout() {
    let dir = tempfile::tempdir().unwrap();
    let result = cut_command(dir.path(), &dir.path().join("out"))
        .args(["--rule-kernel-width", "600"])
        .output()
        .expect("Failed to run exam-cutter");
    assert!(!result.status.success());
}

#[test]
fn test_cut_on_missing_directory_fails() {
    let dir = tempfile::tempdir().unwrap();
    let result = run_cut(&dir.path().join("missing"), &dir.path().join("out"));
    assert!(!result.status.success());
}

struct TestServer {
    child: Child,
    port: u16,
}

impl TestServer {
    fn start() -> Self {
        let port = PORT_COUNTER.fetch_add(1, Ordering::SeqCst);

        let child = Command::new(env!("CARGO_BIN_EXE_exam-cutter"))
            .args(["serve", "--host", "127.0.0.1", "--port", &port.to_string()])
            .spawn()
            .expect("Failed to start server");

        // Wait for server to be ready
        std::thread::sleep(Duration::from_secs(2));

        Self { child, port }
    }

    fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
    }
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = TestServer::start();
    let client = reqwest::Client::new();

    let response = assert_ok!(
        client
            .get(format!("{}/health", server.base_url()))
            .send()
            .await
    );
    let health: HealthResponse = assert_ok!(response.json().await);

    assert_eq!(health.status, "ok");
}

#[tokio::test]
async fn test_info_endpoint() {
    let server = TestServer::start();
    let client = reqwest::Client::new();

    let response = assert_ok!(client.get(format!("{}/info", server.base_url())).send().await);
    let info: InfoResponse = assert_ok!(response.json().await);

    assert_eq!(info.supported_formats, vec!["pdf", "jpg", "png"]);
    assert_eq!(info.rasterizer, "embedded");
    assert_eq!(info.layout["columns"], 3);
    assert_eq!(info.max_file_size_bytes, 52428800);
}

#[tokio::test]
async fn test_segment_png() {
    let server = TestServer::start();
    let client = reqwest::Client::new();

    let part = Part::bytes(png_bytes(&exam_page()))
        .file_name("exam.png")
        .mime_str("image/png")
        .unwrap();
    let form = Form::new().part("file", part);

    let response = assert_ok!(
        client
            .post(format!("{}/segment", server.base_url()))
            .multipart(form)
            .send()
            .await
    );
    assert!(response.status().is_success(), "status: {}", response.status());

    let body: serde_json::Value = assert_ok!(response.json().await);
    assert_eq!(body["file"], "exam.png");
    assert_eq!(body["pages"][0]["status"], "segmented");
    assert_eq!(body["pages"][0]["questions"], 6);
    assert_eq!(body["pages"][0]["columns"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_segment_without_file() {
    let server = TestServer::start();
    let client = reqwest::Client::new();

    let form = Form::new().text("note", "no file here");
    let response = assert_ok!(
        client
            .post(format!("{}/segment", server.base_url()))
            .multipart(form)
            .send()
            .await
    );
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

    let error: ErrorResponse = assert_ok!(response.json().await);
    assert_eq!(error.code, "MISSING_FILE");
}

#[tokio::test]
async fn test_segment_undecodable_upload() {
    let server = TestServer::start();
    let client = reqwest::Client::new();

    let part = Part::bytes(b"definitely not an image".to_vec())
        .file_name("scan.png")
        .mime_str("image/png")
        .unwrap();
    let response = assert_ok!(
        client
            .post(format!("{}/segment", server.base_url()))
            .multipart(Form::new().part("file", part))
            .send()
            .await
    );
    assert_eq!(response.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);

    let error: ErrorResponse = assert_ok!(response.json().await);
    assert_eq!(error.code, "DECODE_ERROR");
}
