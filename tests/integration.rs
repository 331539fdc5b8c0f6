use cdn_fileserver::config::{Config, LogFormat};
use cdn_fileserver::server::{self, AppState};
use cdn_fileserver::service::FileService;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use tempfile::TempDir;

const ADMIN_TOKEN: &str = "admin-secret";
const UPLOADER_TOKEN: &str = "uploader-secret";
const READER_TOKEN: &str = "reader-secret";

/// Spin up a test server on a random port, return the base URL.
async fn start_server() -> (String, TempDir) {
    let tmp = TempDir::new().unwrap();
    let data_dir = tmp.path().to_str().unwrap().to_string();

    let config = Config {
        port: 0,
        address: "127.0.0.1".to_string(),
        data_dir,
        base_url: Some("http://cdn.test".to_string()),
        max_file_size: 64 * 1024,
        allowed_extensions: vec!["txt".into(), "png".into(), "pdf".into()],
        tokens: vec![
            format!("admin:{}:upload+list+delete", ADMIN_TOKEN).parse().unwrap(),
            format!("uploader:{}:upload", UPLOADER_TOKEN).parse().unwrap(),
            format!("reader:{}:list", READER_TOKEN).parse().unwrap(),
        ],
        cors_origins: vec!["*".to_string()],
        log_format: LogFormat::Text,
    };
    config.validate().unwrap();

    let files = FileService::new(config.storage_settings()).await.unwrap();
    let state = AppState::new(files, config);

    let app = server::build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let base_url = format!("http://{}", addr);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (base_url, tmp)
}

/// Regular files anywhere under `dir`.
fn stored_files(dir: &std::path::Path) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .map(|p| if p.is_dir() { stored_files(&p) } else { 1 })
        .sum()
}

fn client() -> reqwest::Client {
    reqwest::Client::new()
}

fn upload_form(tag: &str, filename: &str, data: &[u8], public: bool) -> Form {
    Form::new()
        .text("tag", tag.to_string())
        .text("public", public.to_string())
        .part("file", Part::bytes(data.to_vec()).file_name(filename.to_string()))
}

/// Upload as admin and return the `data` object of the response.
async fn upload(base: &str, tag: &str, filename: &str, data: &[u8], public: bool) -> Value {
    let resp = client()
        .post(format!("{}/upload", base))
        .bearer_auth(ADMIN_TOKEN)
        .multipart(upload_form(tag, filename, data, public))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
    body["data"].clone()
}

#[tokio::test]
async fn test_health() {
    let (base, _tmp) = start_server().await;
    let resp = client().get(format!("{}/health", base)).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["storage"]["total_files"], 0);
    assert_eq!(body["storage"]["total_size"], "0 B");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_security_headers() {
    let (base, _tmp) = start_server().await;
    let resp = client().get(format!("{}/health", base)).send().await.unwrap();
    assert_eq!(resp.headers()["x-content-type-options"], "nosniff");
    assert_eq!(resp.headers()["x-frame-options"], "DENY");
}

#[tokio::test]
async fn test_upload_requires_token() {
    let (base, _tmp) = start_server().await;

    let resp = client()
        .post(format!("{}/upload", base))
        .multipart(upload_form("docs", "a.txt", b"hi", true))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    assert!(resp.headers().contains_key("x-request-id"));
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "Unauthorized");

    let resp = client()
        .post(format!("{}/upload", base))
        .bearer_auth("wrong")
        .multipart(upload_form("docs", "a.txt", b"hi", true))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_permissions_enforced() {
    let (base, _tmp) = start_server().await;

    // Reader can list but not upload.
    let resp = client()
        .post(format!("{}/upload", base))
        .bearer_auth(READER_TOKEN)
        .multipart(upload_form("docs", "a.txt", b"hi", true))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    // Uploader can upload but not list or delete.
    let resp = client()
        .post(format!("{}/upload", base))
        .bearer_auth(UPLOADER_TOKEN)
        .multipart(upload_form("docs", "a.txt", b"hi", true))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["uploaded_by"], "uploader");
    let file_id = body["data"]["file_id"].as_str().unwrap().to_string();

    let resp = client()
        .get(format!("{}/api/files", base))
        .bearer_auth(UPLOADER_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = client()
        .delete(format!("{}/api/files/docs/{}", base, file_id))
        .bearer_auth(READER_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = client()
        .get(format!("{}/api/files", base))
        .bearer_auth(READER_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_upload_and_download_public() {
    let (base, _tmp) = start_server().await;

    let data = upload(&base, "docs", "hello world.txt", b"Hello, CDN!", true).await;
    let file_id = data["file_id"].as_str().unwrap();
    assert_eq!(data["original_name"], "hello world.txt");
    assert_eq!(data["size"], 11);
    assert_eq!(data["public"], true);
    assert_eq!(data["uploaded_by"], "admin");
    assert_eq!(data["url"], format!("http://cdn.test/docs/{}", file_id));

    let resp = client()
        .get(format!("{}/docs/{}", base, file_id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert!(resp.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    assert_eq!(resp.headers()["content-length"], "11");
    assert_eq!(
        resp.headers()["cache-control"],
        "public, max-age=31536000, immutable"
    );
    assert!(resp.headers().get("content-disposition").is_none());
    assert_eq!(resp.bytes().await.unwrap().as_ref(), b"Hello, CDN!");

    let resp = client()
        .get(format!("{}/docs/{}?download=true", base, file_id))
        .send()
        .await
        .unwrap();
    let disposition = resp.headers()["content-disposition"].to_str().unwrap();
    assert!(disposition.starts_with("attachment;"));
    assert!(disposition.contains("filename*=UTF-8''hello%20world%2Etxt"));
}

#[tokio::test]
async fn test_private_download_requires_token() {
    let (base, _tmp) = start_server().await;

    let data = upload(&base, "private", "secret.txt", b"classified", false).await;
    let file_id = data["file_id"].as_str().unwrap();
    let url = format!("{}/private/{}", base, file_id);

    let resp = client().get(&url).send().await.unwrap();
    assert_eq!(resp.status(), 403);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "Forbidden");

    // Any valid token will do, whatever its permissions.
    let resp = client().get(&url).bearer_auth(READER_TOKEN).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert!(resp.headers().get("cache-control").is_none());
    assert_eq!(resp.bytes().await.unwrap().as_ref(), b"classified");

    let resp = client()
        .get(format!("{}?token={}", url, UPLOADER_TOKEN))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client().get(&url).bearer_auth("bogus").send().await.unwrap();
    assert_eq!(resp.status(), 403);
}

#[tokio::test]
async fn test_download_not_found() {
    let (base, _tmp) = start_server().await;
    let resp = client()
        .get(format!("{}/docs/missing_12345678.txt", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "NotFound");
}

#[tokio::test]
async fn test_upload_validation_errors() {
    let (base, tmp) = start_server().await;

    let post = |form: Form| {
        let base = base.clone();
        async move {
            client()
                .post(format!("{}/upload", base))
                .bearer_auth(ADMIN_TOKEN)
                .multipart(form)
                .send()
                .await
                .unwrap()
        }
    };

    let resp = post(upload_form("docs", "run.exe", b"MZ", true)).await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "ExtensionNotAllowed");

    let resp = post(upload_form("bad tag!", "a.txt", b"x", true)).await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "InvalidNamespace");

    let resp = post(upload_form("docs", "empty.txt", b"", true)).await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "EmptyFile");

    let big = vec![b'x'; 64 * 1024 + 1];
    let resp = post(upload_form("docs", "big.txt", &big, true)).await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "FileTooLarge");

    let resp = post(Form::new().text("tag", "docs")).await;
    assert_eq!(resp.status(), 400);

    let resp = post(
        Form::new().part("file", Part::bytes(b"x".to_vec()).file_name("a.txt")),
    )
    .await;
    assert_eq!(resp.status(), 400);

    assert_eq!(stored_files(tmp.path()), 0);
}

#[tokio::test]
async fn test_upload_fields_must_precede_file() {
    let (base, tmp) = start_server().await;

    let form = Form::new()
        .part("file", Part::bytes(b"late tag".to_vec()).file_name("a.txt"))
        .text("tag", "docs");
    let resp = client()
        .post(format!("{}/upload", base))
        .bearer_auth(ADMIN_TOKEN)
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "ValidationFailed");
    assert_eq!(stored_files(tmp.path()), 0);
}

#[tokio::test]
async fn test_truncated_form_field_is_rejected() {
    let (base, tmp) = start_server().await;

    // The `public` part never terminates.
    let raw = "--XBOUNDARY\r\n\
               Content-Disposition: form-data; name=\"tag\"\r\n\r\n\
               docs\r\n\
               --XBOUNDARY\r\n\
               Content-Disposition: form-data; name=\"public\"\r\n\r\n\
               tru";
    let resp = client()
        .post(format!("{}/upload", base))
        .bearer_auth(ADMIN_TOKEN)
        .header("content-type", "multipart/form-data; boundary=XBOUNDARY")
        .body(raw)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "ValidationFailed");
    assert_eq!(stored_files(tmp.path()), 0);
}

#[tokio::test]
async fn test_list_files() {
    let (base, _tmp) = start_server().await;
    for i in 0..5 {
        upload(&base, "docs", &format!("report{}.txt", i), b"data", i % 2 == 0).await;
    }
    upload(&base, "images", "logo.png", b"not a real png", true).await;

    let list = |query: &'static str| {
        let base = base.clone();
        async move {
            let resp = client()
                .get(format!("{}/api/files{}", base, query))
                .bearer_auth(ADMIN_TOKEN)
                .send()
                .await
                .unwrap();
            assert_eq!(resp.status(), 200);
            let body: Value = resp.json().await.unwrap();
            body["data"].clone()
        }
    };

    let all = list("").await;
    assert_eq!(all["files"].as_array().unwrap().len(), 6);
    assert_eq!(all["pagination"]["total_items"], 6);
    assert_eq!(all["pagination"]["total_pages"], 1);
    assert!(all["files"][0]["url"].as_str().unwrap().starts_with("http://cdn.test/"));

    let page = list("?tag=docs&limit=2&page=1").await;
    assert_eq!(page["files"].as_array().unwrap().len(), 2);
    assert_eq!(page["pagination"]["total_items"], 5);
    assert_eq!(page["pagination"]["total_pages"], 3);
    assert_eq!(page["pagination"]["has_next"], true);
    assert_eq!(page["pagination"]["has_prev"], false);

    let last = list("?tag=docs&limit=2&page=3").await;
    assert_eq!(last["files"].as_array().unwrap().len(), 1);
    assert_eq!(last["pagination"]["has_next"], false);

    let beyond = list("?tag=docs&limit=2&page=10").await;
    assert!(beyond["files"].as_array().unwrap().is_empty());
    assert_eq!(beyond["pagination"]["total_items"], 5);

    let public = list("?tag=docs&public=true").await;
    let files = public["files"].as_array().unwrap();
    assert_eq!(files.len(), 3);
    assert!(files.iter().all(|f| f["public"] == true));

    let search = list("?search=LOGO").await;
    assert_eq!(search["files"].as_array().unwrap().len(), 1);

    // Out-of-range limits are clamped.
    let clamped = list("?limit=1000").await;
    assert_eq!(clamped["pagination"]["items_per_page"], 100);
    let clamped = list("?limit=0&page=-1").await;
    assert_eq!(clamped["pagination"]["items_per_page"], 50);
    assert_eq!(clamped["pagination"]["current_page"], 1);
}

#[tokio::test]
async fn test_delete_file() {
    let (base, _tmp) = start_server().await;
    let data = upload(&base, "docs", "temp.txt", b"delete me", true).await;
    let file_id = data["file_id"].as_str().unwrap();

    let resp = client()
        .delete(format!("{}/api/files/docs/{}", base, file_id))
        .bearer_auth(ADMIN_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["file_id"], file_id);
    assert_eq!(body["data"]["tag"], "docs");

    let resp = client()
        .get(format!("{}/docs/{}", base, file_id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = client()
        .delete(format!("{}/api/files/docs/{}", base, file_id))
        .bearer_auth(ADMIN_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_health_reports_stats() {
    let (base, _tmp) = start_server().await;
    upload(&base, "docs", "a.txt", &[b'a'; 2048], true).await;

    let body: Value = client()
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["storage"]["total_files"], 1);
    assert_eq!(body["storage"]["total_bytes"], 2048);
    assert_eq!(body["storage"]["total_size"], "2.0 KB");
}
