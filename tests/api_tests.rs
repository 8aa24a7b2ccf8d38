//! HTTP-level tests for the catalog API, run against the in-memory store.
//!
//! Background removal and upscaling are disabled so the pipeline only composes,
//! which needs no external tools.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use product_catalog::pipeline::ComposeSettings;
use product_catalog::transport::http::{create_router, AppState};
use product_catalog::{CatalogService, ImagePipeline, MemoryProductStore, ProductStore};
use serde_json::Value;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot` method

const BOUNDARY: &str = "catalog-test-boundary";

const MAX_UPLOAD_BYTES: usize = 1024 * 1024;

struct TestApp {
    router: Router,
    store: Arc<MemoryProductStore>,
    /// Served uploads; the service's scratch directory is its sibling under `_root`.
    upload_dir: PathBuf,
    _root: TempDir,
}

impl TestApp {
    fn new() -> Self {
        let root = TempDir::new().unwrap();
        let upload_dir = root.path().join("uploads");
        std::fs::create_dir_all(&upload_dir).unwrap();
        let store = Arc::new(MemoryProductStore::new());
        let settings = ComposeSettings {
            target_size: 64,
            ..ComposeSettings::default()
        };
        let pipeline = Arc::new(ImagePipeline::new(None, None, settings));
        let catalog = Arc::new(CatalogService::new(
            store.clone(),
            pipeline,
            upload_dir.clone(),
        ));
        let state = AppState {
            catalog,
            client_dir: None,
            max_upload_bytes: MAX_UPLOAD_BYTES,
        };
        Self {
            router: create_router(state),
            store,
            upload_dir,
            _root: root,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    async fn upload(&self, fields: &[(&str, &str)], with_image: bool) -> (StatusCode, Value) {
        let image = with_image.then(png_bytes);
        self.send(multipart_request("POST", "/api/upload", fields, image.as_deref()))
            .await
    }

    async fn create(&self, name: &str) -> Value {
        let (status, body) = self.upload(&[("name", name), ("mrp", "10")], true).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["product"].clone()
    }
}

/// Red square on a white field, small enough to keep the pipeline fast.
fn png_bytes() -> Vec<u8> {
    let img = RgbaImage::from_fn(40, 30, |x, y| {
        if (10..30).contains(&x) && (5..25).contains(&y) {
            Rgba([220, 30, 30, 255])
        } else {
            Rgba([255, 255, 255, 255])
        }
    });
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(img)
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

fn multipart_request(
    method: &str,
    uri: &str,
    fields: &[(&str, &str)],
    image: Option<&[u8]>,
) -> Request<Body> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some(data) = image {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"shot.png\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(method)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn json_request(method: &str, uri: &str, json: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_and_ping() {
    let app = TestApp::new();

    let (status, body) = app.send(request("GET", "/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["status"], "ok");

    let (status, body) = app.send(request("GET", "/api/ping")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({ "ok": true }));
}

// =============================================================================
// Upload
// =============================================================================

#[tokio::test]
async fn test_upload_assigns_sequential_ids_from_zero() {
    let app = TestApp::new();

    let first = app.create("Masala Chips").await;
    let second = app.create("Lemon Soda").await;

    assert_eq!(first["product_id"], 0);
    assert_eq!(second["product_id"], 1);
    assert_eq!(first["name"], "Masala Chips");
    assert_eq!(first["mrp"], 10.0);
    assert_eq!(first["gst"], 0.0);
    assert_eq!(app.store.counter_value().await.unwrap(), 1);

    let image_path = first["image_path"].as_str().unwrap();
    assert!(image_path.starts_with("uploads/masala-chips-"), "{image_path}");
    assert!(image_path.ends_with(".jpg"));
}

#[tokio::test]
async fn test_upload_writes_servable_jpeg() {
    let app = TestApp::new();
    let product = app.create("Biscuit").await;
    let image_path = product["image_path"].as_str().unwrap();

    let file_name = image_path.trim_start_matches("uploads/");
    let on_disk = app.upload_dir.as_path().join(file_name);
    let decoded = image::open(&on_disk).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (64, 64));

    // Only the final image remains; scratch directories are gone.
    let entries: Vec<_> = std::fs::read_dir(app.upload_dir.as_path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(entries.len(), 1, "{entries:?}");

    for prefix in ["", "server/"] {
        let response = app
            .router
            .clone()
            .oneshot(request("GET", &format!("/{prefix}{image_path}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
    }
}

#[tokio::test]
async fn test_upload_without_image_is_rejected_and_consumes_no_id() {
    let app = TestApp::new();

    let (status, body) = app.upload(&[("name", "No Picture")], false).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);
    assert_eq!(body["error"], "name and image are required");

    let (status, _) = app.upload(&[("brand", "Nameless")], true).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(app.store.counter_value().await.unwrap(), -1);
    assert_eq!(std::fs::read_dir(app.upload_dir.as_path()).unwrap().count(), 0);

    // The next successful upload still gets 0.
    assert_eq!(app.create("Finally").await["product_id"], 0);
}

#[tokio::test]
async fn test_upload_rejects_bad_number_and_non_multipart_body() {
    let app = TestApp::new();

    let (status, body) = app.upload(&[("name", "Tea"), ("mrp", "ten")], true).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("mrp"));

    let (status, body) = app
        .send(json_request("POST", "/api/upload", r#"{"name":"Tea"}"#))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);

    assert_eq!(app.store.counter_value().await.unwrap(), -1);
}

#[tokio::test]
async fn test_upload_over_size_limit_is_rejected() {
    let app = TestApp::new();
    let oversized = vec![0u8; 2 * MAX_UPLOAD_BYTES];

    let (status, body) = app
        .send(multipart_request(
            "POST",
            "/api/upload",
            &[("name", "Huge")],
            Some(&oversized),
        ))
        .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["ok"], false);
    assert!(body["error"].is_string());

    assert_eq!(app.store.counter_value().await.unwrap(), -1);
    assert_eq!(std::fs::read_dir(&app.upload_dir).unwrap().count(), 0);
}

#[tokio::test]
async fn test_upload_with_undecodable_image_fails_cleanly() {
    let app = TestApp::new();
    let garbage = b"definitely not an image".to_vec();

    let (status, body) = app
        .send(multipart_request(
            "POST",
            "/api/upload",
            &[("name", "Broken")],
            Some(&garbage),
        ))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["ok"], false);
    assert_eq!(app.store.counter_value().await.unwrap(), -1);
    assert_eq!(std::fs::read_dir(app.upload_dir.as_path()).unwrap().count(), 0);
}

// =============================================================================
// Products
// =============================================================================

#[tokio::test]
async fn test_list_sorting_and_paging() {
    let app = TestApp::new();
    for name in ["A", "B", "C"] {
        app.create(name).await;
    }

    let (status, body) = app.send(request("GET", "/api/products?sort=id")).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<i64> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["product_id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![0, 1, 2]);

    let (_, body) = app.send(request("GET", "/api/products")).await;
    assert_eq!(body[0]["name"], "C");

    let (_, body) = app
        .send(request("GET", "/api/products?sort=id&limit=1&offset=1"))
        .await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["name"], "B");
}

#[tokio::test]
async fn test_get_product_and_invalid_ids() {
    let app = TestApp::new();
    app.create("Peanut Bar").await;

    let (status, body) = app.send(request("GET", "/api/products/0")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Peanut Bar");

    let (status, body) = app.send(request("GET", "/api/products/7")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["ok"], false);

    for bad in ["abc", "-1", "1.5"] {
        let (status, body) = app
            .send(request("GET", &format!("/api/products/{bad}")))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{bad}");
        assert!(body["error"].as_str().unwrap().contains("invalid product id"));
    }
}

#[tokio::test]
async fn test_update_merges_submitted_fields_only() {
    let app = TestApp::new();
    let (_, created) = app
        .upload(
            &[("name", "Cola"), ("brand", "Fizz"), ("mrp", "40"), ("gst", "12")],
            true,
        )
        .await;
    let original_image = created["product"]["image_path"].clone();

    let (status, body) = app
        .send(multipart_request(
            "PUT",
            "/api/products/0",
            &[("mrp", "45.5")],
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let product = &body["product"];
    assert_eq!(product["mrp"], 45.5);
    assert_eq!(product["name"], "Cola");
    assert_eq!(product["brand"], "Fizz");
    assert_eq!(product["gst"], 12.0);
    assert_eq!(product["image_path"], original_image);
    assert_eq!(product["product_id"], 0);

    let (status, _) = app
        .send(multipart_request("PUT", "/api/products/0", &[("name", "  ")], None))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(multipart_request("PUT", "/api/products/9", &[("mrp", "1")], None))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_with_new_image_replaces_file() {
    let app = TestApp::new();
    let product = app.create("Juice").await;
    let old_path = product["image_path"].as_str().unwrap().to_string();
    let image = png_bytes();

    let (status, body) = app
        .send(multipart_request(
            "PUT",
            "/api/products/0",
            &[("name", "Orange Juice")],
            Some(&image),
        ))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let new_path = body["product"]["image_path"].as_str().unwrap();
    assert_ne!(new_path, old_path);
    assert!(new_path.starts_with("uploads/orange-juice-"));

    let dir = app.upload_dir.as_path();
    assert!(!dir.join(old_path.trim_start_matches("uploads/")).exists());
    assert!(dir.join(new_path.trim_start_matches("uploads/")).exists());
}

#[tokio::test]
async fn test_delete_removes_record_and_image() {
    let app = TestApp::new();
    let product = app.create("Gum").await;
    let file = app
        .upload_dir
        .join(product["image_path"].as_str().unwrap().trim_start_matches("uploads/"));
    assert!(file.exists());

    let (status, body) = app.send(request("DELETE", "/api/products/0")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({ "ok": true, "product_id": 0 }));
    assert!(!file.exists());

    let (status, _) = app.send(request("GET", "/api/products/0")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.send(request("DELETE", "/api/products/0")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Deleted numbers are not reused.
    assert_eq!(app.create("Mint").await["product_id"], 1);
}

// =============================================================================
// Admin
// =============================================================================

#[tokio::test]
async fn test_repair_requires_confirmation() {
    let app = TestApp::new();

    let (status, body) = app
        .send(json_request("POST", "/admin/repair-ids", r#"{"confirm":false}"#))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);

    let (status, _) = app
        .send(json_request("POST", "/admin/repair-ids", "{not json"))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_repair_closes_gaps_in_creation_order() {
    let app = TestApp::new();
    for name in ["First", "Second", "Third"] {
        app.create(name).await;
    }
    app.send(request("DELETE", "/api/products/1")).await;
    assert!(app.store.force_product_id(2, 40).await);

    let (status, body) = app
        .send(json_request("POST", "/admin/repair-ids", r#"{"confirm":true}"#))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["report"]["total"], 2);
    assert_eq!(body["report"]["changed"], 1);
    assert_eq!(body["report"]["counter"], 1);

    let (_, body) = app.send(request("GET", "/api/products?sort=id")).await;
    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["First", "Third"]);
    assert_eq!(body[1]["product_id"], 1);

    assert_eq!(app.create("Fourth").await["product_id"], 2);
}
